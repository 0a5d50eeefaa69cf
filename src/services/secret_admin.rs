use crate::api::error::AppError;
use crate::entities::{prelude::*, *};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use tracing::info;
use uuid::Uuid;

/// Management of upload credentials and method mappings.
pub struct SecretAdmin {
    db: DatabaseConnection,
}

impl SecretAdmin {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Creates a credential with a fresh 32 character hex key.
    pub async fn create_secret(
        &self,
        username: &str,
        email: Option<&str>,
    ) -> Result<secrets::Model, AppError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AppError::BadRequest("Username cannot be empty".to_string()));
        }

        let existing = Secrets::find()
            .filter(secrets::Column::Username.eq(username))
            .one(&self.db)
            .await?;
        if existing.is_some() {
            return Err(AppError::Conflict("User already exists".to_string()));
        }

        let secret = secrets::ActiveModel {
            id: Set(Uuid::new_v4().simple().to_string()),
            username: Set(username.to_string()),
            email: Set(email.map(str::to_string)),
            secret_key: Set(Uuid::new_v4().simple().to_string()),
            created_at: Set(Some(Utc::now())),
        }
        .insert(&self.db)
        .await?;

        info!("🔑 Secret created for '{}'", secret.username);
        Ok(secret)
    }

    pub async fn list_secrets(&self) -> Result<Vec<secrets::Model>, AppError> {
        Ok(Secrets::find()
            .order_by_asc(secrets::Column::Username)
            .all(&self.db)
            .await?)
    }

    /// Deletes a credential together with its method grants.
    pub async fn delete_secret(&self, id: &str) -> Result<secrets::Model, AppError> {
        let secret = Secrets::find_by_id(id.to_string())
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Secret not found".to_string()))?;

        let txn = self.db.begin().await?;
        SecretMethods::delete_many()
            .filter(secret_methods::Column::SecretId.eq(&secret.id))
            .exec(&txn)
            .await?;
        Secrets::delete_by_id(secret.id.clone()).exec(&txn).await?;
        txn.commit().await?;

        info!("🗑️  Secret for '{}' deleted", secret.username);
        Ok(secret)
    }

    /// Registers an upload method. An empty header list disables the schema check.
    pub async fn create_method(
        &self,
        method: &str,
        uri: &str,
        description: &str,
        mandatory_headers: &[String],
    ) -> Result<method_mappings::Model, AppError> {
        if method.trim().is_empty() || uri.trim().is_empty() {
            return Err(AppError::BadRequest(
                "Method and uri are required".to_string(),
            ));
        }
        if mandatory_headers
            .iter()
            .any(|h| h.is_empty() || h.contains(','))
        {
            return Err(AppError::BadRequest(
                "Header names must be non-empty and cannot contain commas".to_string(),
            ));
        }

        let mapping = method_mappings::ActiveModel {
            id: Set(Uuid::new_v4().simple().to_string()),
            method: Set(method.trim().to_string()),
            uri: Set(uri.trim().to_string()),
            description: Set(description.to_string()),
            mandatory_headers: Set(mandatory_headers.join(",")),
        }
        .insert(&self.db)
        .await?;

        info!("🧭 Method '{}' mapped to {}", mapping.method, mapping.uri);
        Ok(mapping)
    }

    pub async fn list_methods(&self) -> Result<Vec<method_mappings::Model>, AppError> {
        Ok(MethodMappings::find()
            .order_by_asc(method_mappings::Column::Method)
            .all(&self.db)
            .await?)
    }

    /// Grants a method mapping to a credential. Granting the same mapping twice is a no-op;
    /// a second mapping with the same method name for one user is refused.
    pub async fn grant_method(
        &self,
        username: &str,
        method_mapping_id: &str,
    ) -> Result<(), AppError> {
        let secret = Secrets::find()
            .filter(secrets::Column::Username.eq(username))
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Secret not found".to_string()))?;

        let mapping = MethodMappings::find_by_id(method_mapping_id.to_string())
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Method mapping not found".to_string()))?;

        let granted_ids: Vec<String> = SecretMethods::find()
            .filter(secret_methods::Column::SecretId.eq(&secret.id))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|link| link.method_mapping_id)
            .collect();

        if granted_ids.contains(&mapping.id) {
            return Ok(());
        }

        let clash = MethodMappings::find()
            .filter(method_mappings::Column::Id.is_in(granted_ids))
            .filter(method_mappings::Column::Method.eq(&mapping.method))
            .one(&self.db)
            .await?;
        if clash.is_some() {
            return Err(AppError::Conflict(format!(
                "'{}' already has a mapping for method '{}'",
                secret.username, mapping.method
            )));
        }

        secret_methods::ActiveModel {
            secret_id: Set(secret.id),
            method_mapping_id: Set(mapping.id),
        }
        .insert(&self.db)
        .await?;

        info!("🔗 Method '{}' granted to '{}'", mapping.method, secret.username);
        Ok(())
    }
}
