//! In-memory relying party association storage

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::errors::StorageError;
use crate::openid::association::Association;
use crate::storage::traits::{RelyingPartyAssociationStore, Result};

/// Associations the relying party holds, grouped by Provider endpoint
#[derive(Default)]
pub struct MemoryRelyingPartyAssociationStore {
    associations: Mutex<HashMap<String, HashMap<String, Association>>>,
}

impl MemoryRelyingPartyAssociationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RelyingPartyAssociationStore for MemoryRelyingPartyAssociationStore {
    async fn store_association(&self, provider_endpoint: &str, association: &Association) -> Result<()> {
        let mut associations = self
            .associations
            .lock()
            .map_err(|e| StorageError::LockFailed(format!("Lock error: {}", e)))?;
        associations
            .entry(provider_endpoint.to_string())
            .or_default()
            .insert(association.handle().to_string(), association.clone());
        Ok(())
    }

    async fn get_association(
        &self,
        provider_endpoint: &str,
        handle: Option<&str>,
    ) -> Result<Option<Association>> {
        let associations = self
            .associations
            .lock()
            .map_err(|e| StorageError::LockFailed(format!("Lock error: {}", e)))?;
        let Some(for_provider) = associations.get(provider_endpoint) else {
            return Ok(None);
        };

        let now = Utc::now();
        let found = match handle {
            Some(handle) => for_provider.get(handle).filter(|a| !a.is_expired_at(now)),
            None => for_provider
                .values()
                .filter(|a| !a.is_expired_at(now))
                .max_by_key(|a| a.expires_at()),
        };
        Ok(found.cloned())
    }

    async fn remove_association(&self, provider_endpoint: &str, handle: &str) -> Result<bool> {
        let mut associations = self
            .associations
            .lock()
            .map_err(|e| StorageError::LockFailed(format!("Lock error: {}", e)))?;
        Ok(associations
            .get_mut(provider_endpoint)
            .and_then(|for_provider| for_provider.remove(handle))
            .is_some())
    }
}
