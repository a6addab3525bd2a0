//! OAuth 1.0a credential and token records.

use chrono::{DateTime, Utc};
use rsa::RsaPublicKey;
use std::fmt;

/// A token (or consumer key) and its shared secret
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(token: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

/// A consumer registered with the Service Provider
#[derive(Clone, Debug)]
pub struct ConsumerRecord {
    pub consumer_key: String,
    pub consumer_secret: String,
    /// Public key for consumers signing with RSA-SHA1
    pub rsa_public_key: Option<RsaPublicKey>,
}

/// Temporary (request) or token (access) credential
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Request,
    Access,
}

/// A token issued by the Service Provider
#[derive(Clone, Debug)]
pub struct ServiceProviderToken {
    pub token: String,
    pub secret: String,
    pub consumer_key: String,
    pub kind: TokenKind,
    /// Callback registered with a request token, or `oob`
    pub callback: Option<String>,
    /// Verifier issued when the user authorized the request token
    pub verifier: Option<String>,
    /// User who authorized the token
    pub authorized_user: Option<String>,
    pub issued_at: DateTime<Utc>,
}

impl ServiceProviderToken {
    pub fn is_authorized(&self) -> bool {
        self.authorized_user.is_some()
    }
}
