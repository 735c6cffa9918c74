//! Settings of the command line tool.
//!
//! Read from an optional `ledgerline.toml` (or the file given with
//! `--config`), then overridden by `LEDGERLINE__<SECTION>__<KEY>` environment
//! variables:
//!
//! ```toml
//! [app]
//! level = "info"
//!
//! [database]
//! sqlite = "ledgerline.db"   # or: database = "memory"
//!
//! [engine]
//! page_size = 50
//! ```
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct App {
    pub level: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    Memory,
    Sqlite(String),
}

impl Default for Database {
    fn default() -> Self {
        Self::Sqlite("ledgerline.db".to_string())
    }
}

impl Database {
    pub fn url(&self) -> String {
        match self {
            Database::Memory => String::from("sqlite::memory:"),
            Database::Sqlite(path) => format!("sqlite:{path}?mode=rwc"),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Engine {
    pub page_size: u64,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub app: App,
    #[serde(default)]
    pub database: Database,
    pub engine: Engine,
}

impl Settings {
    pub fn new(path: Option<&str>) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .set_default("app.level", "info")?
            .set_default("engine.page_size", 50)?
            .add_source(File::with_name(path.unwrap_or("ledgerline")).required(path.is_some()))
            .add_source(
                Environment::with_prefix("LEDGERLINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}
