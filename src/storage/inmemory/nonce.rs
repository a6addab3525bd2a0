//! In-memory nonce storage implementation
//!
//! This module provides in-memory storage for used nonces to prevent replay attacks.
//! Nonces are keyed by `(context, nonce, timestamp)` and kept until they age out.

use crate::errors::StorageError;
use crate::storage::traits::{NonceStorage, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory nonce store
#[derive(Default)]
pub struct MemoryNonceStorage {
    nonces: Mutex<HashMap<(String, String, i64), DateTime<Utc>>>,
}

impl MemoryNonceStorage {
    /// Create a new memory nonce storage
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NonceStorage for MemoryNonceStorage {
    async fn try_consume(&self, context: &str, nonce: &str, timestamp: DateTime<Utc>) -> Result<bool> {
        let mut nonces = self.nonces.lock().map_err(|e| {
            StorageError::LockFailed(format!("Failed to acquire nonce store lock: {}", e))
        })?;

        let key = (context.to_string(), nonce.to_string(), timestamp.timestamp());
        if nonces.contains_key(&key) {
            return Ok(false); // Nonce already used
        }

        nonces.insert(key, timestamp);
        Ok(true)
    }

    async fn cleanup_expired_nonces(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut nonces = self.nonces.lock().map_err(|e| {
            StorageError::LockFailed(format!("Failed to acquire nonce store lock: {}", e))
        })?;

        let before = nonces.len();
        nonces.retain(|_, timestamp| *timestamp >= cutoff);
        Ok(before - nonces.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_nonce_store() {
        let store = MemoryNonceStorage::new();
        let now = Utc::now();

        // First use should succeed
        assert!(store.try_consume("ctx", "abc", now).await.unwrap());

        // Second use should fail (replay attack)
        assert!(!store.try_consume("ctx", "abc", now).await.unwrap());

        // Same nonce in another context is independent
        assert!(store.try_consume("other", "abc", now).await.unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let store = MemoryNonceStorage::new();
        let old = Utc::now() - Duration::minutes(30);

        store.try_consume("ctx", "abc", old).await.unwrap();

        // Cleanup should remove old nonces
        let removed = store
            .cleanup_expired_nonces(Utc::now() - Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(removed, 1);

        // The nonce is forgotten after cleanup
        assert!(store.try_consume("ctx", "abc", old).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_consumers_accept_once() {
        let store = Arc::new(MemoryNonceStorage::new());
        let now = Utc::now();

        let attempts = (0..16).map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.try_consume("ctx", "race", now).await.unwrap() })
        });
        let results = futures::future::join_all(attempts).await;

        let accepted = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();
        assert_eq!(accepted, 1);
    }
}
