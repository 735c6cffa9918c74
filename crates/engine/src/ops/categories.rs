use uuid::Uuid;

use crate::{
    Category, DEFAULT_CATEGORIES, EngineError, ResultEngine,
    util::{normalize_name_key, normalize_required_name},
};

use super::Engine;

impl Engine {
    pub(super) async fn require_category(&self, category_id: Uuid) -> ResultEngine<Category> {
        self.store
            .category(category_id)
            .await?
            .ok_or_else(|| EngineError::NotFound("category".to_string()))
    }

    /// Creates a category. Names colliding after normalization are a
    /// `Conflict`.
    pub async fn create_category(&self, name: &str) -> ResultEngine<Category> {
        let category = Category::new(normalize_required_name(name, "category")?);
        self.store.insert_category(&category).await?;
        tracing::info!(category_id = %category.id, name = %category.name, "category created");
        Ok(category)
    }

    pub async fn category(&self, category_id: Uuid) -> ResultEngine<Category> {
        self.require_category(category_id).await
    }

    /// Looks a category up by name, ignoring case and spacing differences.
    pub async fn category_by_name(&self, name: &str) -> ResultEngine<Category> {
        self.store
            .category_by_key(&normalize_name_key(name))
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("category {name}")))
    }

    pub async fn categories(&self) -> ResultEngine<Vec<Category>> {
        self.store.categories().await
    }

    pub async fn rename_category(&self, category_id: Uuid, name: &str) -> ResultEngine<Category> {
        let name = normalize_required_name(name, "category")?;
        let mut category = self.require_category(category_id).await?;
        category.name_norm = normalize_name_key(&name);
        category.name = name;
        self.store.update_category(&category).await?;
        tracing::info!(category_id = %category.id, name = %category.name, "category renamed");
        Ok(category)
    }

    /// Deletes a category no transaction references.
    pub async fn delete_category(&self, category_id: Uuid) -> ResultEngine<()> {
        self.require_category(category_id).await?;
        if self.store.category_in_use(category_id).await? {
            return Err(EngineError::Conflict(format!(
                "category {category_id} is used by transactions"
            )));
        }
        self.store.delete_category(category_id).await?;
        tracing::info!(category_id = %category_id, "category deleted");
        Ok(())
    }

    /// Creates the missing default categories and returns the full list.
    pub async fn ensure_default_categories(&self) -> ResultEngine<Vec<Category>> {
        for name in DEFAULT_CATEGORIES {
            if self
                .store
                .category_by_key(&normalize_name_key(name))
                .await?
                .is_some()
            {
                continue;
            }
            match self.store.insert_category(&Category::new(name.to_string())).await {
                Ok(()) | Err(EngineError::Conflict(_)) => {}
                Err(err) => return Err(err),
            }
        }
        self.store.categories().await
    }
}
