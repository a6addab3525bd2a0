//! Single-use nonces for OpenID assertions and OAuth requests.
//!
//! OpenID nonces embed their own timestamp (`2024-01-01T00:00:00Z` followed
//! by a random suffix). OAuth nonces are a random string sent next to a
//! separate `oauth_timestamp`. Both are checked by [`NonceTracker`].

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use std::fmt;
use std::sync::Arc;

use crate::crypto::random_alphanumeric;
use crate::errors::NonceError;
use crate::storage::traits::NonceStorage;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
const TIMESTAMP_LEN: usize = 20;
const SUFFIX_LEN: usize = 8;

/// Default replay window
pub fn default_max_age() -> Duration {
    Duration::minutes(13)
}

/// Why a nonce was refused
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NonceRejection {
    /// Timestamp outside the accepted window
    Expired,
    /// Already seen in this context
    Replayed,
}

/// Outcome of [`NonceTracker::check_and_record`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NonceVerdict {
    Accepted,
    Rejected(NonceRejection),
}

impl NonceVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, NonceVerdict::Accepted)
    }

    pub fn into_result(self) -> Result<(), NonceError> {
        match self {
            NonceVerdict::Accepted => Ok(()),
            NonceVerdict::Rejected(NonceRejection::Expired) => Err(NonceError::Expired),
            NonceVerdict::Rejected(NonceRejection::Replayed) => Err(NonceError::Replayed),
        }
    }
}

/// OpenID `response_nonce`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseNonce {
    timestamp: DateTime<Utc>,
    suffix: String,
}

impl ResponseNonce {
    pub fn generate() -> Self {
        Self::generate_at(Utc::now())
    }

    /// Nonce for a given time, truncated to whole seconds
    pub fn generate_at(timestamp: DateTime<Utc>) -> Self {
        let timestamp = Utc
            .timestamp_opt(timestamp.timestamp(), 0)
            .single()
            .unwrap_or(timestamp);
        Self {
            timestamp,
            suffix: random_alphanumeric(SUFFIX_LEN),
        }
    }

    pub fn parse(value: &str) -> Result<Self, NonceError> {
        let (stamp, suffix) = match (value.get(..TIMESTAMP_LEN), value.get(TIMESTAMP_LEN..)) {
            (Some(stamp), Some(suffix)) => (stamp, suffix),
            _ => return Err(NonceError::Malformed("timestamp missing".into())),
        };
        let timestamp = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
            .map_err(|e| NonceError::Malformed(e.to_string()))?
            .and_utc();
        if !suffix.bytes().all(|b| (0x21..=0x7e).contains(&b)) {
            return Err(NonceError::Malformed("suffix must be printable ASCII".into()));
        }
        Ok(Self {
            timestamp,
            suffix: suffix.to_string(),
        })
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }
}

impl fmt::Display for ResponseNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.timestamp.format(TIMESTAMP_FORMAT), self.suffix)
    }
}

/// OAuth `oauth_nonce` and `oauth_timestamp`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OAuthNonce {
    pub nonce: String,
    /// Seconds since the Unix epoch
    pub timestamp: i64,
}

impl OAuthNonce {
    pub fn generate() -> Self {
        Self {
            nonce: random_alphanumeric(SUFFIX_LEN),
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn new(nonce: impl Into<String>, timestamp: i64) -> Self {
        Self {
            nonce: nonce.into(),
            timestamp,
        }
    }
}

/// Checks nonces against a replay window and records them in a [`NonceStorage`].
#[derive(Clone)]
pub struct NonceTracker {
    storage: Arc<dyn NonceStorage>,
    max_age: Duration,
    max_skew: Duration,
}

impl NonceTracker {
    pub fn new(storage: Arc<dyn NonceStorage>, max_age: Duration) -> Self {
        Self {
            storage,
            max_age,
            max_skew: Duration::minutes(5),
        }
    }

    /// Tolerance for timestamps ahead of the local clock
    pub fn with_max_skew(mut self, max_skew: Duration) -> Self {
        self.max_skew = max_skew;
        self
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn generate_response_nonce(&self) -> ResponseNonce {
        ResponseNonce::generate()
    }

    pub fn generate_oauth_nonce(&self) -> OAuthNonce {
        OAuthNonce::generate()
    }

    /// Reject stale or future-dated nonces, then atomically record the rest.
    pub async fn check_and_record(
        &self,
        context: &str,
        nonce: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<NonceVerdict, NonceError> {
        let now = Utc::now();
        if now - timestamp > self.max_age || timestamp - now > self.max_skew {
            tracing::debug!(%context, %timestamp, "nonce outside accepted window");
            return Ok(NonceVerdict::Rejected(NonceRejection::Expired));
        }

        if self.storage.try_consume(context, nonce, timestamp).await? {
            Ok(NonceVerdict::Accepted)
        } else {
            tracing::warn!(%context, "replayed nonce rejected");
            Ok(NonceVerdict::Rejected(NonceRejection::Replayed))
        }
    }

    /// Check an OpenID `response_nonce` value
    pub async fn check_response_nonce(&self, context: &str, value: &str) -> Result<NonceVerdict, NonceError> {
        let nonce = ResponseNonce::parse(value)?;
        self.check_and_record(context, value, nonce.timestamp()).await
    }

    /// Check an OAuth nonce and its `oauth_timestamp`
    pub async fn check_oauth_nonce(&self, context: &str, nonce: &OAuthNonce) -> Result<NonceVerdict, NonceError> {
        let timestamp = Utc
            .timestamp_opt(nonce.timestamp, 0)
            .single()
            .ok_or_else(|| NonceError::Malformed("timestamp out of range".into()))?;
        self.check_and_record(context, &nonce.nonce, timestamp).await
    }

    /// Forget nonces that can no longer be replayed inside the window
    pub async fn purge(&self) -> Result<usize, NonceError> {
        let cutoff = Utc::now() - self.max_age;
        Ok(self.storage.cleanup_expired_nonces(cutoff).await?)
    }
}
