//! Transaction categories.

use sea_orm::entity::{ActiveValue, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::normalize_name_key;

/// Categories created by [`Engine::ensure_default_categories`](crate::Engine::ensure_default_categories).
pub const DEFAULT_CATEGORIES: [&str; 9] = [
    "Food",
    "Transport",
    "Utilities",
    "Entertainment",
    "Health",
    "Education",
    "Housing",
    "Clothing",
    "Other",
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    /// Comparison key used to detect duplicates ("Food" and " food " collide).
    pub name_norm: String,
}

impl Category {
    pub fn new(name: String) -> Self {
        let name_norm = normalize_name_key(&name);
        Self {
            id: Uuid::new_v4(),
            name,
            name_norm,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "categories")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(unique)]
    pub name_norm: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::transactions::Entity")]
    Transactions,
}

impl Related<super::transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Category> for ActiveModel {
    fn from(value: &Category) -> Self {
        Self {
            id: ActiveValue::Set(value.id),
            name: ActiveValue::Set(value.name.clone()),
            name_norm: ActiveValue::Set(value.name_norm.clone()),
        }
    }
}

impl From<Model> for Category {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            name_norm: model.name_norm,
        }
    }
}
