//! Shared and private HMAC associations.

use chrono::{DateTime, Duration, Utc};
use std::fmt;

use super::association_store::ProviderAssociationStore;
use super::key_value_form;
use super::protocol::{AssociationType, MAX_HANDLE_LENGTH};
use crate::crypto::{equals_constant_time, random_bytes};
use crate::errors::AssociationError;

/// Default lifetime of an association handed out to relying parties
pub fn default_shared_lifetime() -> Duration {
    Duration::days(14)
}

/// Default lifetime of a Provider-only association. It only has to outlive
/// one authentication round trip.
pub fn default_private_lifetime() -> Duration {
    Duration::minutes(5)
}

/// Who may hold the association secret
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssociationUsage {
    /// Negotiated with a relying party
    Shared,
    /// Held by the Provider alone and checked through `check_authentication`
    Private,
}

impl AssociationUsage {
    /// Storage bucket for secrets of this usage
    pub fn bucket(&self) -> &'static str {
        match self {
            AssociationUsage::Shared => "signet.association.shared",
            AssociationUsage::Private => "signet.association.private",
        }
    }

    pub fn default_lifetime(&self) -> Duration {
        match self {
            AssociationUsage::Shared => default_shared_lifetime(),
            AssociationUsage::Private => default_private_lifetime(),
        }
    }
}

/// A symmetric secret identified by a handle.
#[derive(Clone)]
pub struct Association {
    handle: String,
    secret: Vec<u8>,
    association_type: AssociationType,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    usage: AssociationUsage,
}

impl fmt::Debug for Association {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Association")
            .field("handle", &self.handle)
            .field("association_type", &self.association_type)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("usage", &self.usage)
            .finish_non_exhaustive()
    }
}

impl Association {
    /// Build an association from already known parts, checking every invariant.
    pub fn new(
        handle: impl Into<String>,
        secret: Vec<u8>,
        association_type: AssociationType,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        usage: AssociationUsage,
    ) -> Result<Self, AssociationError> {
        let handle = handle.into();
        validate_handle(&handle)?;
        check_secret_len(association_type, &secret)?;
        if expires_at <= issued_at {
            return Err(AssociationError::InvalidLifetime);
        }
        Ok(Self {
            handle,
            secret,
            association_type,
            issued_at,
            expires_at,
            usage,
        })
    }

    /// Build an association whose type is implied by the secret length, as
    /// stores do when they only persist the secret and its expiry.
    pub fn from_secret(
        handle: impl Into<String>,
        secret: Vec<u8>,
        expires_at: DateTime<Utc>,
        usage: AssociationUsage,
    ) -> Result<Self, AssociationError> {
        let association_type = AssociationType::for_secret_len(secret.len()).ok_or(
            AssociationError::SecretLengthMismatch(AssociationType::HmacSha256.secret_len(), secret.len()),
        )?;
        Self::new(handle, secret, association_type, Utc::now(), expires_at, usage)
    }

    /// Create a fresh association with a random secret and register it with the store.
    pub async fn create(
        store: &dyn ProviderAssociationStore,
        association_type: AssociationType,
        usage: AssociationUsage,
        lifetime: Duration,
    ) -> Result<Self, AssociationError> {
        let secret = random_bytes(association_type.secret_len());
        let issued_at = Utc::now();
        let expires_at = issued_at + lifetime;
        let handle = store.serialize(&secret, expires_at, usage).await?;
        Self::new(handle, secret, association_type, issued_at, expires_at, usage)
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn secret(&self) -> &[u8] {
        &self.secret
    }

    pub fn association_type(&self) -> AssociationType {
        self.association_type
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn usage(&self) -> AssociationUsage {
        self.usage
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whole seconds left, never negative
    pub fn seconds_until_expiration(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds().max(0)
    }

    /// HMAC over `payload`. Expired associations never sign.
    pub fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, AssociationError> {
        if self.is_expired() {
            return Err(AssociationError::Expired(self.handle.clone()));
        }
        Ok(self
            .association_type
            .hash_algorithm()
            .hmac(&self.secret, payload)?)
    }

    /// Constant-time check of `signature` over `payload`. Expired associations never verify.
    pub fn verify(&self, payload: &[u8], signature: &[u8]) -> Result<bool, AssociationError> {
        if self.is_expired() {
            return Ok(false);
        }
        let expected = self
            .association_type
            .hash_algorithm()
            .hmac(&self.secret, payload)?;
        Ok(equals_constant_time(&expected, signature))
    }
}

/// Sign `name:value\n` lines in the given order.
pub fn sign<K, V>(
    secret: &[u8],
    association_type: AssociationType,
    ordered_parameters: &[(K, V)],
) -> Result<Vec<u8>, AssociationError>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    check_secret_len(association_type, secret)?;
    let payload = key_value_form::encode(ordered_parameters.iter().map(|(k, v)| (k, v)))?;
    Ok(association_type
        .hash_algorithm()
        .hmac(secret, payload.as_bytes())?)
}

/// Recompute and compare. A mismatch is `Ok(false)`; only a secret of the wrong length is an error.
pub fn verify<K, V>(
    secret: &[u8],
    association_type: AssociationType,
    ordered_parameters: &[(K, V)],
    claimed_signature: &[u8],
) -> Result<bool, AssociationError>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    check_secret_len(association_type, secret)?;
    let Ok(payload) = key_value_form::encode(ordered_parameters.iter().map(|(k, v)| (k, v))) else {
        return Ok(false);
    };
    let expected = association_type
        .hash_algorithm()
        .hmac(secret, payload.as_bytes())?;
    Ok(equals_constant_time(&expected, claimed_signature))
}

fn check_secret_len(association_type: AssociationType, secret: &[u8]) -> Result<(), AssociationError> {
    if secret.len() != association_type.secret_len() {
        return Err(AssociationError::SecretLengthMismatch(
            association_type.secret_len(),
            secret.len(),
        ));
    }
    Ok(())
}

/// Handles are 1 to 255 printable, non-space ASCII characters.
pub fn validate_handle(handle: &str) -> Result<(), AssociationError> {
    let well_formed = !handle.is_empty()
        && handle.len() <= MAX_HANDLE_LENGTH
        && handle.bytes().all(|b| (0x21..=0x7e).contains(&b));
    if well_formed {
        Ok(())
    } else {
        Err(AssociationError::InvalidHandle(
            handle.chars().take(MAX_HANDLE_LENGTH).collect(),
        ))
    }
}
