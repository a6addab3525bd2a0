//! Storage trait definitions for association secrets, crypto keys, nonces,
//! relying party associations, and OAuth 1.0a credentials.
//!
//! Implementations must be safe to share across concurrent requests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::StorageError;
use crate::oauth1::types::{ConsumerRecord, Credentials, ServiceProviderToken};
use crate::openid::association::Association;

pub type Result<T> = std::result::Result<T, StorageError>;

/// A stored association secret and when it stops being valid
#[derive(Clone)]
pub struct StoredSecret {
    pub secret: Vec<u8>,
    pub expires_at: DateTime<Utc>,
}

/// A symmetric key used to seal self-encoded association handles
#[derive(Clone)]
pub struct CryptoKey {
    pub key: Vec<u8>,
    pub expires_at: DateTime<Utc>,
}

/// Provider-side association secret persistence, keyed by `(bucket, handle)`
#[async_trait]
pub trait AssociationSecretStore: Send + Sync {
    /// Store a secret under a handle
    async fn store_secret(
        &self,
        bucket: &str,
        handle: &str,
        secret: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Retrieve a secret; expired entries may still be returned and are filtered by callers
    async fn retrieve_secret(&self, bucket: &str, handle: &str) -> Result<Option<StoredSecret>>;

    /// Remove a secret, returning whether it existed
    async fn remove_secret(&self, bucket: &str, handle: &str) -> Result<bool>;

    /// Clean up expired secrets
    async fn cleanup_expired_secrets(&self) -> Result<usize>;
}

/// Rotating symmetric keys, grouped by purpose bucket
#[async_trait]
pub trait CryptoKeyStore: Send + Sync {
    /// Look up one key
    async fn get_key(&self, bucket: &str, handle: &str) -> Result<Option<CryptoKey>>;

    /// All keys in a bucket, newest expiry first
    async fn get_keys(&self, bucket: &str) -> Result<Vec<(String, CryptoKey)>>;

    /// Store a new key
    async fn store_key(&self, bucket: &str, handle: &str, key: CryptoKey) -> Result<()>;

    /// Remove a key
    async fn remove_key(&self, bucket: &str, handle: &str) -> Result<()>;
}

/// Single-use nonce persistence
#[async_trait]
pub trait NonceStorage: Send + Sync {
    /// Record `(context, nonce, timestamp)`. Returns `true` the first time a
    /// tuple is seen and `false` afterwards. Must be atomic across callers.
    async fn try_consume(&self, context: &str, nonce: &str, timestamp: DateTime<Utc>) -> Result<bool>;

    /// Forget nonces whose timestamp is older than `cutoff`
    async fn cleanup_expired_nonces(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// Relying party copies of associations negotiated with Providers
#[async_trait]
pub trait RelyingPartyAssociationStore: Send + Sync {
    /// Store an association for a Provider endpoint
    async fn store_association(&self, provider_endpoint: &str, association: &Association) -> Result<()>;

    /// Look up a specific handle, or when `handle` is `None` the unexpired
    /// association with the most time left
    async fn get_association(
        &self,
        provider_endpoint: &str,
        handle: Option<&str>,
    ) -> Result<Option<Association>>;

    /// Remove an association, returning whether it existed
    async fn remove_association(&self, provider_endpoint: &str, handle: &str) -> Result<bool>;
}

/// Consumer-side storage of the temporary (request) credential between the
/// redirect to the Service Provider and the callback.
#[async_trait]
pub trait TemporaryCredentialStore: Send + Sync {
    async fn save(&self, identifier: &str, secret: &str) -> Result<()>;

    async fn retrieve(&self) -> Result<Option<Credentials>>;

    async fn clear(&self) -> Result<()>;
}

/// Service Provider registry of consumers and issued tokens
#[async_trait]
pub trait ServiceProviderTokenStore: Send + Sync {
    /// Register or replace a consumer
    async fn store_consumer(&self, consumer: &ConsumerRecord) -> Result<()>;

    /// Look up a consumer by key
    async fn get_consumer(&self, consumer_key: &str) -> Result<Option<ConsumerRecord>>;

    /// Insert or replace a token
    async fn store_token(&self, token: &ServiceProviderToken) -> Result<()>;

    /// Look up a token
    async fn get_token(&self, token: &str) -> Result<Option<ServiceProviderToken>>;

    /// Remove a token, returning whether it existed
    async fn remove_token(&self, token: &str) -> Result<bool>;
}
