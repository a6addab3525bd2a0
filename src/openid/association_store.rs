//! Provider association persistence.
//!
//! Two interchangeable strategies sit behind [`ProviderAssociationStore`]:
//! [`KeyStorageAssociationStore`] keeps secrets server side under a random
//! handle, and [`HandleEncodingAssociationStore`] seals the secret into the
//! handle itself so the Provider keeps no per-association state.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use async_trait::async_trait;
use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use ulid::Ulid;

use super::association::{Association, AssociationUsage};
use crate::crypto::{generate_token, random_bytes};
use crate::errors::{AssociationError, CryptoError};
use crate::storage::traits::{AssociationSecretStore, CryptoKey, CryptoKeyStore};

/// Key bucket holding the keys that seal self-encoded handles
pub const HANDLE_KEY_BUCKET: &str = "signet.association.handle-keys";

const HANDLE_KEY_LEN: usize = 32;
const GCM_NONCE_LEN: usize = 12;

#[async_trait]
pub trait ProviderAssociationStore: Send + Sync {
    /// Persist (or seal) a secret and return the handle that names it
    async fn serialize(
        &self,
        secret: &[u8],
        expires_at: DateTime<Utc>,
        usage: AssociationUsage,
    ) -> Result<String, AssociationError>;

    /// Recover an association.
    ///
    /// `Ok(None)` covers both unknown and expired handles. `Err` means the
    /// handle could not be decoded or was issued for the other usage; callers
    /// log it and otherwise treat it as not found.
    async fn deserialize(
        &self,
        handle: &str,
        usage: AssociationUsage,
    ) -> Result<Option<Association>, AssociationError>;
}

/// Pick the association strategy once, at startup.
pub fn association_store_for(
    encode_in_handles: bool,
    secrets: Arc<dyn AssociationSecretStore>,
    keys: Arc<dyn CryptoKeyStore>,
    key_lifetime: Duration,
) -> Arc<dyn ProviderAssociationStore> {
    if encode_in_handles {
        Arc::new(HandleEncodingAssociationStore::new(keys, key_lifetime))
    } else {
        Arc::new(KeyStorageAssociationStore::new(secrets))
    }
}

/// Secrets stored server side under random handles
pub struct KeyStorageAssociationStore {
    secrets: Arc<dyn AssociationSecretStore>,
}

impl KeyStorageAssociationStore {
    pub fn new(secrets: Arc<dyn AssociationSecretStore>) -> Self {
        Self { secrets }
    }
}

#[async_trait]
impl ProviderAssociationStore for KeyStorageAssociationStore {
    async fn serialize(
        &self,
        secret: &[u8],
        expires_at: DateTime<Utc>,
        usage: AssociationUsage,
    ) -> Result<String, AssociationError> {
        let handle = generate_token();
        self.secrets
            .store_secret(usage.bucket(), &handle, secret, expires_at)
            .await?;
        Ok(handle)
    }

    async fn deserialize(
        &self,
        handle: &str,
        usage: AssociationUsage,
    ) -> Result<Option<Association>, AssociationError> {
        let Some(stored) = self.secrets.retrieve_secret(usage.bucket(), handle).await? else {
            return Ok(None);
        };
        if stored.expires_at <= Utc::now() {
            return Ok(None);
        }
        Association::from_secret(handle, stored.secret, stored.expires_at, usage).map(Some)
    }
}

/// Secrets sealed with AES-256-GCM into the handle.
///
/// Handle layout: `<key id>.<base64url(nonce || ciphertext)>`, where the
/// plaintext is `[usage flag][expiry seconds, i64 BE][secret]` and the key id
/// is bound in as associated data.
pub struct HandleEncodingAssociationStore {
    keys: Arc<dyn CryptoKeyStore>,
    key_lifetime: Duration,
}

impl HandleEncodingAssociationStore {
    pub fn new(keys: Arc<dyn CryptoKeyStore>, key_lifetime: Duration) -> Self {
        Self { keys, key_lifetime }
    }

    /// A key that outlives `needed_until`, minting one if none does.
    async fn current_key(&self, needed_until: DateTime<Utc>) -> Result<(String, Vec<u8>), AssociationError> {
        let existing = self.keys.get_keys(HANDLE_KEY_BUCKET).await?;
        if let Some((key_id, key)) = existing
            .into_iter()
            .find(|(_, key)| key.expires_at >= needed_until && key.key.len() == HANDLE_KEY_LEN)
        {
            return Ok((key_id, key.key));
        }

        let key_id = Ulid::new().to_string();
        let key = random_bytes(HANDLE_KEY_LEN);
        let expires_at = (Utc::now() + self.key_lifetime).max(needed_until);
        self.keys
            .store_key(
                HANDLE_KEY_BUCKET,
                &key_id,
                CryptoKey {
                    key: key.clone(),
                    expires_at,
                },
            )
            .await?;
        tracing::debug!(key_id = %key_id, %expires_at, "minted association handle key");
        Ok((key_id, key))
    }
}

fn usage_flag(usage: AssociationUsage) -> u8 {
    match usage {
        AssociationUsage::Shared => 0,
        AssociationUsage::Private => 1,
    }
}

fn encode_payload(secret: &[u8], expires_at: DateTime<Utc>, usage: AssociationUsage) -> Vec<u8> {
    let mut payload = Vec::with_capacity(1 + 8 + secret.len());
    payload.push(usage_flag(usage));
    payload.extend_from_slice(&expires_at.timestamp().to_be_bytes());
    payload.extend_from_slice(secret);
    payload
}

fn decode_payload(payload: &[u8]) -> Result<(u8, DateTime<Utc>, Vec<u8>), AssociationError> {
    if payload.len() < 9 {
        return Err(AssociationError::Undecodable("payload too short".into()));
    }
    let mut seconds = [0u8; 8];
    seconds.copy_from_slice(&payload[1..9]);
    let expires_at = Utc
        .timestamp_opt(i64::from_be_bytes(seconds), 0)
        .single()
        .ok_or_else(|| AssociationError::Undecodable("expiry out of range".into()))?;
    Ok((payload[0], expires_at, payload[9..].to_vec()))
}

fn cipher(key: &[u8]) -> Result<Aes256Gcm, CryptoError> {
    Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::InvalidKeyLength(e.to_string()))
}

#[async_trait]
impl ProviderAssociationStore for HandleEncodingAssociationStore {
    async fn serialize(
        &self,
        secret: &[u8],
        expires_at: DateTime<Utc>,
        usage: AssociationUsage,
    ) -> Result<String, AssociationError> {
        let (key_id, key) = self.current_key(expires_at).await?;
        let nonce = random_bytes(GCM_NONCE_LEN);
        let plaintext = encode_payload(secret, expires_at, usage);

        let ciphertext = cipher(&key)?
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &plaintext,
                    aad: key_id.as_bytes(),
                },
            )
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut sealed = nonce;
        sealed.extend_from_slice(&ciphertext);
        Ok(format!("{key_id}.{}", BASE64_URL_SAFE_NO_PAD.encode(sealed)))
    }

    async fn deserialize(
        &self,
        handle: &str,
        usage: AssociationUsage,
    ) -> Result<Option<Association>, AssociationError> {
        let (key_id, sealed) = handle
            .split_once('.')
            .ok_or_else(|| AssociationError::Undecodable("missing key id".into()))?;
        let key = self
            .keys
            .get_key(HANDLE_KEY_BUCKET, key_id)
            .await?
            .ok_or_else(|| AssociationError::Undecodable("unknown key id".into()))?;
        let sealed = BASE64_URL_SAFE_NO_PAD
            .decode(sealed)
            .map_err(|e| AssociationError::Undecodable(e.to_string()))?;
        if sealed.len() <= GCM_NONCE_LEN {
            return Err(AssociationError::Undecodable("sealed payload too short".into()));
        }
        let (nonce, ciphertext) = sealed.split_at(GCM_NONCE_LEN);

        let plaintext = cipher(&key.key)?
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: key_id.as_bytes(),
                },
            )
            .map_err(|_| AssociationError::Undecodable("authentication failed".into()))?;

        let (flag, expires_at, secret) = decode_payload(&plaintext)?;
        if flag != usage_flag(usage) {
            return Err(AssociationError::UsageMismatch(format!(
                "expected {usage:?} association"
            )));
        }
        if expires_at <= Utc::now() {
            return Ok(None);
        }
        Association::from_secret(handle, secret, expires_at, usage).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openid::association::validate_handle;
    use crate::openid::protocol::AssociationType;
    use crate::storage::inmemory::MemoryProviderStorage;

    fn handle_store() -> (Arc<MemoryProviderStorage>, HandleEncodingAssociationStore) {
        let storage = Arc::new(MemoryProviderStorage::new());
        let store = HandleEncodingAssociationStore::new(storage.clone(), Duration::days(30));
        (storage, store)
    }

    #[tokio::test]
    async fn test_key_storage_round_trip() {
        let storage = Arc::new(MemoryProviderStorage::new());
        let store = KeyStorageAssociationStore::new(storage);

        let association = Association::create(
            &store,
            AssociationType::HmacSha256,
            AssociationUsage::Shared,
            Duration::minutes(10),
        )
        .await
        .unwrap();

        let found = store
            .deserialize(association.handle(), AssociationUsage::Shared)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.secret(), association.secret());
        assert_eq!(found.association_type(), AssociationType::HmacSha256);

        // Buckets are separate per usage
        assert!(store
            .deserialize(association.handle(), AssociationUsage::Private)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .deserialize("unknown", AssociationUsage::Shared)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_key_storage_hides_expired() {
        let storage = Arc::new(MemoryProviderStorage::new());
        let store = KeyStorageAssociationStore::new(storage);
        let handle = store
            .serialize(&[1u8; 20], Utc::now() - Duration::seconds(1), AssociationUsage::Private)
            .await
            .unwrap();
        assert!(store
            .deserialize(&handle, AssociationUsage::Private)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_handle_encoding_round_trip() {
        let (_, store) = handle_store();
        let expires_at = Utc::now() + Duration::minutes(5);
        let handle = store
            .serialize(&[4u8; 20], expires_at, AssociationUsage::Private)
            .await
            .unwrap();

        assert!(validate_handle(&handle).is_ok());

        let association = store
            .deserialize(&handle, AssociationUsage::Private)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(association.secret(), &[4u8; 20]);
        assert_eq!(association.expires_at().timestamp(), expires_at.timestamp());
        assert_eq!(association.usage(), AssociationUsage::Private);
    }

    #[tokio::test]
    async fn test_handle_encoding_checks_usage() {
        let (_, store) = handle_store();
        let handle = store
            .serialize(&[4u8; 32], Utc::now() + Duration::minutes(5), AssociationUsage::Private)
            .await
            .unwrap();

        let result = store.deserialize(&handle, AssociationUsage::Shared).await;
        assert!(matches!(result, Err(AssociationError::UsageMismatch(_))));
    }

    #[tokio::test]
    async fn test_handle_encoding_rejects_tampering() {
        let (_, store) = handle_store();
        let handle = store
            .serialize(&[4u8; 20], Utc::now() + Duration::minutes(5), AssociationUsage::Shared)
            .await
            .unwrap();

        let (key_id, sealed) = handle.split_once('.').unwrap();
        let mut bytes = BASE64_URL_SAFE_NO_PAD.decode(sealed).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = format!("{key_id}.{}", BASE64_URL_SAFE_NO_PAD.encode(bytes));

        let result = store.deserialize(&tampered, AssociationUsage::Shared).await;
        assert!(matches!(result, Err(AssociationError::Undecodable(_))));

        let result = store.deserialize("not-a-handle", AssociationUsage::Shared).await;
        assert!(matches!(result, Err(AssociationError::Undecodable(_))));
    }

    #[tokio::test]
    async fn test_handle_encoding_expired_is_clean_miss() {
        let (_, store) = handle_store();
        let handle = store
            .serialize(&[4u8; 20], Utc::now() - Duration::seconds(5), AssociationUsage::Private)
            .await
            .unwrap();
        assert!(store
            .deserialize(&handle, AssociationUsage::Private)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_handle_keys_are_reused_until_too_short_lived() {
        let (storage, store) = handle_store();
        let soon = Utc::now() + Duration::minutes(5);
        store.serialize(&[0u8; 20], soon, AssociationUsage::Private).await.unwrap();
        store.serialize(&[0u8; 20], soon, AssociationUsage::Private).await.unwrap();
        assert_eq!(storage.get_keys(HANDLE_KEY_BUCKET).await.unwrap().len(), 1);

        // Outlives the existing key, so a new one is minted
        let later = Utc::now() + Duration::days(60);
        store.serialize(&[0u8; 20], later, AssociationUsage::Shared).await.unwrap();
        assert_eq!(storage.get_keys(HANDLE_KEY_BUCKET).await.unwrap().len(), 2);
    }
}
