use crate::services::secret_store::SecretStore;
use anyhow::Result;
use std::sync::Arc;

/// Checks shared-secret credentials against the secret store.
///
/// Fails closed: a missing or empty username or key, or a pair that does not
/// match exactly, all produce `false`. Callers cannot tell which half was wrong.
#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn SecretStore>,
}

impl Authenticator {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }

    /// Store outages are returned as errors, never as `false`.
    pub async fn authenticate(
        &self,
        username: Option<&str>,
        secret_key: Option<&str>,
    ) -> Result<bool> {
        let (Some(username), Some(secret_key)) = (username, secret_key) else {
            return Ok(false);
        };

        if username.is_empty() || secret_key.is_empty() {
            return Ok(false);
        }

        self.store.find_credential(username, secret_key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MethodContract;
    use crate::services::secret_store::InMemorySecretStore;
    use async_trait::async_trait;

    fn authenticator() -> Authenticator {
        let store = InMemorySecretStore::new().with_credential("anyname", "d3a4646728a9de9a");
        Authenticator::new(Arc::new(store))
    }

    #[tokio::test]
    async fn test_authenticate_valid_pair() {
        let auth = authenticator();
        assert!(
            auth.authenticate(Some("anyname"), Some("d3a4646728a9de9a"))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_authenticate_empty_key() {
        let auth = authenticator();
        assert!(!auth.authenticate(None, None).await.unwrap());
        assert!(!auth.authenticate(Some("anyname"), None).await.unwrap());
        assert!(!auth.authenticate(Some("anyname"), Some("")).await.unwrap());
    }

    #[tokio::test]
    async fn test_authenticate_empty_username() {
        let auth = authenticator();
        assert!(!auth.authenticate(None, Some("d3a4646728a9de9a")).await.unwrap());
        assert!(!auth.authenticate(Some(""), Some("d3a4646728a9de9a")).await.unwrap());
    }

    #[tokio::test]
    async fn test_authenticate_wrong_key() {
        let auth = authenticator();
        assert!(!auth.authenticate(Some("anyname"), Some("wrongkey")).await.unwrap());
    }

    #[tokio::test]
    async fn test_authenticate_user_doesnt_match_secret() {
        let auth = authenticator();
        assert!(
            !auth
                .authenticate(Some("othername"), Some("d3a4646728a9de9a"))
                .await
                .unwrap()
        );
    }

    struct BrokenStore;

    #[async_trait]
    impl SecretStore for BrokenStore {
        async fn find_credential(&self, _username: &str, _secret_key: &str) -> Result<bool> {
            Err(anyhow::anyhow!("store unavailable"))
        }

        async fn find_method_contract(
            &self,
            _username: &str,
            _method: &str,
        ) -> Result<Option<MethodContract>> {
            Err(anyhow::anyhow!("store unavailable"))
        }
    }

    #[tokio::test]
    async fn test_store_outage_is_an_error() {
        let auth = Authenticator::new(Arc::new(BrokenStore));
        assert!(auth.authenticate(Some("anyname"), Some("key")).await.is_err());
        // Incomplete credentials never reach the store
        assert!(!auth.authenticate(Some("anyname"), None).await.unwrap());
    }
}
