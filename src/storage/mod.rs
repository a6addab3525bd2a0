//! Trait-based storage abstractions with an in-memory backend.

pub mod inmemory;
pub mod traits;

// Re-export commonly used types and traits
pub use inmemory::{
    MemoryNonceStorage, MemoryProviderStorage, MemoryRelyingPartyAssociationStore,
    MemoryServiceProviderStorage, MemoryTemporaryCredentialStore,
};
pub use traits::*;

use crate::errors::StorageError;
use std::sync::Arc;

/// Storage backend configuration and factory
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
}

/// The stores a Provider needs
#[derive(Clone)]
pub struct ProviderStores {
    pub secrets: Arc<dyn AssociationSecretStore>,
    pub keys: Arc<dyn CryptoKeyStore>,
    pub nonces: Arc<dyn NonceStorage>,
}

/// Create the Provider stores for a backend
pub fn create_storage_backend(backend: StorageBackend) -> ProviderStores {
    match backend {
        StorageBackend::Memory => {
            let provider = Arc::new(MemoryProviderStorage::new());
            ProviderStores {
                secrets: provider.clone(),
                keys: provider,
                nonces: Arc::new(MemoryNonceStorage::new()),
            }
        }
    }
}

/// Parse storage backend from configuration string
pub fn parse_storage_backend(backend_name: &str) -> std::result::Result<StorageBackend, StorageError> {
    match backend_name {
        "memory" => Ok(StorageBackend::Memory),
        other => Err(StorageError::UnsupportedBackend(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_storage_backend() {
        assert_eq!(parse_storage_backend("memory").unwrap(), StorageBackend::Memory);
        assert!(matches!(
            parse_storage_backend("postgres"),
            Err(StorageError::UnsupportedBackend(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_backend_shares_provider_storage() {
        let stores = create_storage_backend(StorageBackend::Memory);
        let expires = chrono::Utc::now() + chrono::Duration::minutes(1);
        stores.secrets.store_secret("b", "h", &[1], expires).await.unwrap();
        stores
            .keys
            .store_key("b", "k", CryptoKey { key: vec![0; 32], expires_at: expires })
            .await
            .unwrap();

        assert!(stores.secrets.retrieve_secret("b", "h").await.unwrap().is_some());
        assert!(stores.keys.get_key("b", "k").await.unwrap().is_some());
    }
}
