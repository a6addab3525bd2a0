//! In-memory Provider storage for association secrets and handle-sealing keys.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::errors::StorageError;
use crate::storage::traits::*;

/// In-memory implementation for Provider secret and key storage
#[derive(Default)]
pub struct MemoryProviderStorage {
    /// (bucket, handle) -> secret
    secrets: Mutex<HashMap<(String, String), StoredSecret>>,
    /// bucket -> key id -> key
    keys: Mutex<HashMap<String, HashMap<String, CryptoKey>>>,
}

impl MemoryProviderStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::LockFailed(format!("Lock error: {}", e))
}

#[async_trait]
impl AssociationSecretStore for MemoryProviderStorage {
    async fn store_secret(
        &self,
        bucket: &str,
        handle: &str,
        secret: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut secrets = self.secrets.lock().map_err(lock_error)?;
        secrets.insert(
            (bucket.to_string(), handle.to_string()),
            StoredSecret {
                secret: secret.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn retrieve_secret(&self, bucket: &str, handle: &str) -> Result<Option<StoredSecret>> {
        let secrets = self.secrets.lock().map_err(lock_error)?;
        Ok(secrets
            .get(&(bucket.to_string(), handle.to_string()))
            .cloned())
    }

    async fn remove_secret(&self, bucket: &str, handle: &str) -> Result<bool> {
        let mut secrets = self.secrets.lock().map_err(lock_error)?;
        Ok(secrets
            .remove(&(bucket.to_string(), handle.to_string()))
            .is_some())
    }

    async fn cleanup_expired_secrets(&self) -> Result<usize> {
        let mut secrets = self.secrets.lock().map_err(lock_error)?;
        let now = Utc::now();
        let before = secrets.len();
        secrets.retain(|_, stored| stored.expires_at > now);
        Ok(before - secrets.len())
    }
}

#[async_trait]
impl CryptoKeyStore for MemoryProviderStorage {
    async fn get_key(&self, bucket: &str, handle: &str) -> Result<Option<CryptoKey>> {
        let keys = self.keys.lock().map_err(lock_error)?;
        Ok(keys.get(bucket).and_then(|b| b.get(handle)).cloned())
    }

    async fn get_keys(&self, bucket: &str) -> Result<Vec<(String, CryptoKey)>> {
        let keys = self.keys.lock().map_err(lock_error)?;
        let mut found: Vec<(String, CryptoKey)> = keys
            .get(bucket)
            .map(|b| b.iter().map(|(id, key)| (id.clone(), key.clone())).collect())
            .unwrap_or_default();
        found.sort_by(|a, b| b.1.expires_at.cmp(&a.1.expires_at));
        Ok(found)
    }

    async fn store_key(&self, bucket: &str, handle: &str, key: CryptoKey) -> Result<()> {
        let mut keys = self.keys.lock().map_err(lock_error)?;
        let bucket_keys = keys.entry(bucket.to_string()).or_default();
        if bucket_keys.contains_key(handle) {
            return Err(StorageError::InvalidData(format!(
                "key {handle} already exists in {bucket}"
            )));
        }
        bucket_keys.insert(handle.to_string(), key);
        Ok(())
    }

    async fn remove_key(&self, bucket: &str, handle: &str) -> Result<()> {
        let mut keys = self.keys.lock().map_err(lock_error)?;
        if let Some(bucket_keys) = keys.get_mut(bucket) {
            bucket_keys.remove(handle);
        }
        Ok(())
    }
}
