//! In-memory OAuth 1.0a storage
//!
//! Temporary credentials for a consumer session, and the Service Provider's
//! consumer and token registry.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::errors::StorageError;
use crate::oauth1::types::{ConsumerRecord, Credentials, ServiceProviderToken};
use crate::storage::traits::{Result, ServiceProviderTokenStore, TemporaryCredentialStore};

/// Holds at most one pending temporary credential
#[derive(Default)]
pub struct MemoryTemporaryCredentialStore {
    pending: Mutex<Option<Credentials>>,
}

impl MemoryTemporaryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TemporaryCredentialStore for MemoryTemporaryCredentialStore {
    async fn save(&self, identifier: &str, secret: &str) -> Result<()> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|e| StorageError::LockFailed(format!("Lock error: {}", e)))?;
        *pending = Some(Credentials::new(identifier, secret));
        Ok(())
    }

    async fn retrieve(&self) -> Result<Option<Credentials>> {
        let pending = self
            .pending
            .lock()
            .map_err(|e| StorageError::LockFailed(format!("Lock error: {}", e)))?;
        Ok(pending.clone())
    }

    async fn clear(&self) -> Result<()> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|e| StorageError::LockFailed(format!("Lock error: {}", e)))?;
        *pending = None;
        Ok(())
    }
}

/// In-memory Service Provider registry
#[derive(Default)]
pub struct MemoryServiceProviderStorage {
    consumers: Mutex<HashMap<String, ConsumerRecord>>,
    tokens: Mutex<HashMap<String, ServiceProviderToken>>,
}

impl MemoryServiceProviderStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ServiceProviderTokenStore for MemoryServiceProviderStorage {
    async fn store_consumer(&self, consumer: &ConsumerRecord) -> Result<()> {
        let mut consumers = self
            .consumers
            .lock()
            .map_err(|e| StorageError::LockFailed(format!("Lock error: {}", e)))?;
        consumers.insert(consumer.consumer_key.clone(), consumer.clone());
        Ok(())
    }

    async fn get_consumer(&self, consumer_key: &str) -> Result<Option<ConsumerRecord>> {
        let consumers = self
            .consumers
            .lock()
            .map_err(|e| StorageError::LockFailed(format!("Lock error: {}", e)))?;
        Ok(consumers.get(consumer_key).cloned())
    }

    async fn store_token(&self, token: &ServiceProviderToken) -> Result<()> {
        let mut tokens = self
            .tokens
            .lock()
            .map_err(|e| StorageError::LockFailed(format!("Lock error: {}", e)))?;
        tokens.insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn get_token(&self, token: &str) -> Result<Option<ServiceProviderToken>> {
        let tokens = self
            .tokens
            .lock()
            .map_err(|e| StorageError::LockFailed(format!("Lock error: {}", e)))?;
        Ok(tokens.get(token).cloned())
    }

    async fn remove_token(&self, token: &str) -> Result<bool> {
        let mut tokens = self
            .tokens
            .lock()
            .map_err(|e| StorageError::LockFailed(format!("Lock error: {}", e)))?;
        Ok(tokens.remove(token).is_some())
    }
}
