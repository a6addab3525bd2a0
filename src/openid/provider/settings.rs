//! Provider security policy.

use chrono::Duration;

use crate::config::Config;
use crate::nonce::default_max_age;
use crate::openid::association::{default_private_lifetime, default_shared_lifetime};
use crate::openid::protocol::{AssociationType, ProtocolVersion, SessionType};

#[derive(Clone, Debug)]
pub struct ProviderSecuritySettings {
    /// Weakest association accepted, in bits
    pub minimum_hash_bit_length: usize,
    /// Strongest association offered, in bits
    pub maximum_hash_bit_length: usize,
    pub shared_association_lifetime: Duration,
    /// Also the longest a user may take to authenticate
    pub private_association_lifetime: Duration,
    pub max_nonce_age: Duration,
    /// Refuse relying parties whose return_to is not https
    pub require_ssl: bool,
    /// Accept empty `session_type` from peers claiming 2.0
    pub openid11_lenient: bool,
    /// Sign extension fields of positive assertions
    pub sign_outgoing_extensions: bool,
    pub private_association_type: AssociationType,
}

impl Default for ProviderSecuritySettings {
    fn default() -> Self {
        Self {
            minimum_hash_bit_length: 160,
            maximum_hash_bit_length: 256,
            shared_association_lifetime: default_shared_lifetime(),
            private_association_lifetime: default_private_lifetime(),
            max_nonce_age: default_max_age(),
            require_ssl: false,
            openid11_lenient: true,
            sign_outgoing_extensions: true,
            private_association_type: AssociationType::HmacSha256,
        }
    }
}

impl From<&Config> for ProviderSecuritySettings {
    fn from(config: &Config) -> Self {
        Self {
            minimum_hash_bit_length: config.hash_bit_lengths.minimum,
            maximum_hash_bit_length: config.hash_bit_lengths.maximum,
            shared_association_lifetime: *config.shared_association_lifetime.as_ref(),
            private_association_lifetime: *config.private_association_lifetime.as_ref(),
            max_nonce_age: *config.max_nonce_age.as_ref(),
            require_ssl: *config.require_ssl.as_ref(),
            openid11_lenient: *config.openid11_lenient.as_ref(),
            ..Self::default()
        }
    }
}

impl ProviderSecuritySettings {
    /// Whether associations of this type may be handed out to a peer speaking `version`
    pub fn is_permitted(&self, association_type: AssociationType, version: ProtocolVersion) -> bool {
        let bits = association_type.bit_length();
        association_type.is_supported_by(version)
            && bits >= self.minimum_hash_bit_length
            && bits <= self.maximum_hash_bit_length
    }

    /// Strongest permitted association type for `version`
    pub fn preferred_association_type(&self, version: ProtocolVersion) -> Option<AssociationType> {
        AssociationType::ALL
            .into_iter()
            .find(|t| self.is_permitted(*t, version))
    }

    /// Association and session types to suggest after refusing a request
    pub fn suggestion(
        &self,
        version: ProtocolVersion,
        secure_transport: bool,
        requested_session: Option<SessionType>,
    ) -> Option<(AssociationType, SessionType)> {
        let association_type = self.preferred_association_type(version)?;
        let session_type = match requested_session {
            Some(SessionType::NoEncryption) if secure_transport => SessionType::NoEncryption,
            _ => SessionType::diffie_hellman_for(association_type),
        };
        Some((association_type, session_type))
    }
}
