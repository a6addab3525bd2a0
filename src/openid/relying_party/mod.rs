//! OpenID relying party: association management, authentication requests
//! and positive assertion verification.

mod associate;
pub mod request;
pub mod return_to;
pub mod verify;

use chrono::Duration;
use std::sync::Arc;

use crate::config::Config;
use crate::crypto::random_bytes;
use crate::nonce::{NonceTracker, default_max_age};
use crate::openid::key_value_form::Conformance;
use crate::openid::protocol::{AssociationType, ProtocolVersion};
use crate::storage::traits::{NonceStorage, RelyingPartyAssociationStore};
use crate::transport::HttpTransport;

pub use request::CheckIdRequest;
pub use verify::{AuthenticationResponse, VerifiedAssertion};

#[derive(Clone, Debug)]
pub struct RelyingPartySettings {
    pub minimum_hash_bit_length: usize,
    pub maximum_hash_bit_length: usize,
    /// Refuse Provider endpoints that are not https
    pub require_ssl: bool,
    /// Tolerate sloppy Key-Value Form and empty `session_type` from Providers
    pub openid11_lenient: bool,
    pub max_nonce_age: Duration,
    /// Bound for each direct request to a Provider
    pub request_timeout: std::time::Duration,
    /// Never associate; verify every assertion with check_authentication
    pub stateless: bool,
    /// Refuse assertions whose return_to this relying party did not sign
    pub reject_unsolicited_assertions: bool,
}

impl Default for RelyingPartySettings {
    fn default() -> Self {
        Self {
            minimum_hash_bit_length: 160,
            maximum_hash_bit_length: 256,
            require_ssl: false,
            openid11_lenient: true,
            max_nonce_age: default_max_age(),
            request_timeout: std::time::Duration::from_secs(10),
            stateless: false,
            reject_unsolicited_assertions: false,
        }
    }
}

impl From<&Config> for RelyingPartySettings {
    fn from(config: &Config) -> Self {
        Self {
            minimum_hash_bit_length: config.hash_bit_lengths.minimum,
            maximum_hash_bit_length: config.hash_bit_lengths.maximum,
            require_ssl: *config.require_ssl.as_ref(),
            openid11_lenient: *config.openid11_lenient.as_ref(),
            max_nonce_age: *config.max_nonce_age.as_ref(),
            request_timeout: *config.http_client_timeout.as_ref(),
            ..Self::default()
        }
    }
}

impl RelyingPartySettings {
    pub fn is_permitted(&self, association_type: AssociationType, version: ProtocolVersion) -> bool {
        let bits = association_type.bit_length();
        association_type.is_supported_by(version)
            && bits >= self.minimum_hash_bit_length
            && bits <= self.maximum_hash_bit_length
    }

    /// Key-Value Form strictness for direct responses from a Provider speaking `version`
    pub(crate) fn conformance(&self, version: ProtocolVersion) -> Conformance {
        match (version, self.openid11_lenient) {
            (ProtocolVersion::V1_1, _) => Conformance::OpenId11,
            (ProtocolVersion::V2_0, true) => Conformance::Loose,
            (ProtocolVersion::V2_0, false) => Conformance::OpenId20,
        }
    }
}

pub struct RelyingParty {
    transport: Arc<dyn HttpTransport>,
    associations: Arc<dyn RelyingPartyAssociationStore>,
    nonces: NonceTracker,
    settings: RelyingPartySettings,
    return_to_key: Vec<u8>,
}

impl RelyingParty {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        associations: Arc<dyn RelyingPartyAssociationStore>,
        nonce_storage: Arc<dyn NonceStorage>,
        settings: RelyingPartySettings,
    ) -> Self {
        Self {
            transport,
            associations,
            nonces: NonceTracker::new(nonce_storage, settings.max_nonce_age),
            settings,
            return_to_key: random_bytes(32),
        }
    }

    /// Share the return_to signing key between relying party instances
    pub fn with_return_to_key(mut self, key: Vec<u8>) -> Self {
        self.return_to_key = key;
        self
    }

    pub fn settings(&self) -> &RelyingPartySettings {
        &self.settings
    }
}
