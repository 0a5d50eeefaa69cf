use crate::entities::{prelude::*, *};
use crate::models::MethodContract;
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect};

/// Read-only lookups the upload pipeline needs from the credential store.
///
/// Implementations must be safe for concurrent reads.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Whether (username, secret_key) matches a stored credential exactly.
    async fn find_credential(&self, username: &str, secret_key: &str) -> Result<bool>;

    /// The method contract granted to `username` for `method`, if any.
    async fn find_method_contract(
        &self,
        username: &str,
        method: &str,
    ) -> Result<Option<MethodContract>>;

    /// Check if the backing store is reachable
    async fn health_check(&self) -> bool {
        true
    }
}

pub struct DbSecretStore {
    db: DatabaseConnection,
}

impl DbSecretStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SecretStore for DbSecretStore {
    async fn find_credential(&self, username: &str, secret_key: &str) -> Result<bool> {
        let found = Secrets::find()
            .filter(secrets::Column::Username.eq(username))
            .filter(secrets::Column::SecretKey.eq(secret_key))
            .one(&self.db)
            .await?;

        Ok(found.is_some())
    }

    async fn find_method_contract(
        &self,
        username: &str,
        method: &str,
    ) -> Result<Option<MethodContract>> {
        let Some(secret) = Secrets::find()
            .filter(secrets::Column::Username.eq(username))
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };

        let granted: Vec<String> = SecretMethods::find()
            .select_only()
            .column(secret_methods::Column::MethodMappingId)
            .filter(secret_methods::Column::SecretId.eq(&secret.id))
            .into_tuple()
            .all(&self.db)
            .await?;

        if granted.is_empty() {
            return Ok(None);
        }

        let mapping = MethodMappings::find()
            .filter(method_mappings::Column::Id.is_in(granted))
            .filter(method_mappings::Column::Method.eq(method))
            .one(&self.db)
            .await?;

        Ok(mapping.map(|m| MethodContract::from_header_list(&m.method, &m.uri, &m.mandatory_headers)))
    }

    async fn health_check(&self) -> bool {
        self.db.ping().await.is_ok()
    }
}

/// In-memory store, used by tests and local runs without a database.
#[derive(Default)]
pub struct InMemorySecretStore {
    credentials: DashMap<String, String>,
    contracts: DashMap<(String, String), MethodContract>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(self, username: &str, secret_key: &str) -> Self {
        self.credentials
            .insert(username.to_string(), secret_key.to_string());
        self
    }

    pub fn with_contract(self, username: &str, contract: MethodContract) -> Self {
        self.contracts
            .insert((username.to_string(), contract.method.clone()), contract);
        self
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn find_credential(&self, username: &str, secret_key: &str) -> Result<bool> {
        Ok(self
            .credentials
            .get(username)
            .is_some_and(|stored| stored.value() == secret_key))
    }

    async fn find_method_contract(
        &self,
        username: &str,
        method: &str,
    ) -> Result<Option<MethodContract>> {
        Ok(self
            .contracts
            .get(&(username.to_string(), method.to_string()))
            .map(|entry| entry.value().clone()))
    }
}
