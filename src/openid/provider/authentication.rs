//! checkid_setup and checkid_immediate requests.
//!
//! Unlike the direct requests these need the host application: it decides
//! whether the user is authenticated (and, for directed identity, which
//! identifier they chose) before a response can be produced.

use async_trait::async_trait;
use url::Url;

use super::request::RequestState;
use crate::errors::{ProtocolError, ProviderError};
use crate::openid::message::{CHECKID_REQUEST, Message};
use crate::openid::protocol::{IDENTIFIER_SELECT, ProtocolVersion};

#[derive(Clone, Debug)]
pub struct AuthenticationRequest {
    message: Message,
    version: ProtocolVersion,
    immediate: bool,
    return_to: Url,
    realm: Url,
    requested_claimed_id: Option<String>,
    requested_identity: Option<String>,
    claimed_identifier: Option<String>,
    local_identifier: Option<String>,
    authenticated: Option<bool>,
    response_extensions: Vec<(String, String)>,
    sent: bool,
}

impl AuthenticationRequest {
    pub(crate) fn from_message(
        message: Message,
        version: ProtocolVersion,
        immediate: bool,
    ) -> Result<Self, ProtocolError> {
        message.validate(CHECKID_REQUEST, version)?;

        let return_to = parse_url("openid.return_to", message.require("return_to")?)?;
        let realm = match version {
            ProtocolVersion::V2_0 => message.get("realm"),
            ProtocolVersion::V1_1 => message.get("trust_root"),
        };
        let realm = match realm {
            Some(realm) => parse_url("openid.realm", &realm.replacen("://*.", "://", 1))
                .map(|parsed| (parsed, realm.contains("://*.")))?,
            None => (return_to.clone(), false),
        };
        if !return_to_matches_realm(&return_to, &realm.0, realm.1) {
            return Err(ProtocolError::InvalidParameter(
                "openid.return_to".into(),
                "not within the realm".into(),
            ));
        }

        let identity = message.get("identity").map(str::to_string);
        let claimed_id = match version {
            ProtocolVersion::V2_0 => message.get("claimed_id").map(str::to_string),
            ProtocolVersion::V1_1 => identity.clone(),
        };
        match (version, &claimed_id, &identity) {
            (ProtocolVersion::V2_0, Some(_), None) | (ProtocolVersion::V2_0, None, Some(_)) => {
                return Err(ProtocolError::MalformedMessage(
                    "claimed_id and identity must be sent together".into(),
                ));
            }
            (ProtocolVersion::V1_1, _, None) => {
                return Err(ProtocolError::MissingParameter("openid.identity".into()));
            }
            _ => {}
        }

        let directed = identity.as_deref() == Some(IDENTIFIER_SELECT);
        Ok(Self {
            message,
            version,
            immediate,
            return_to,
            realm: realm.0,
            claimed_identifier: claimed_id.clone().filter(|_| !directed),
            local_identifier: identity.clone().filter(|_| !directed),
            requested_claimed_id: claimed_id,
            requested_identity: identity,
            authenticated: None,
            response_extensions: Vec::new(),
            sent: false,
        })
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    /// checkid_immediate: the user cannot be interacted with
    pub fn is_immediate(&self) -> bool {
        self.immediate
    }

    pub fn return_to(&self) -> &Url {
        &self.return_to
    }

    pub fn realm(&self) -> &Url {
        &self.realm
    }

    /// The relying party left the choice of identifier to the Provider
    pub fn is_directed_identity(&self) -> bool {
        self.requested_identity.as_deref() == Some(IDENTIFIER_SELECT)
    }

    /// Whether the request asserts any identifier at all. OpenID 2.0 allows
    /// extension-only requests.
    pub fn has_identifier(&self) -> bool {
        self.requested_identity.is_some()
    }

    pub fn requested_claimed_identifier(&self) -> Option<&str> {
        self.requested_claimed_id.as_deref()
    }

    pub fn claimed_identifier(&self) -> Option<&str> {
        self.claimed_identifier.as_deref()
    }

    pub fn local_identifier(&self) -> Option<&str> {
        self.local_identifier.as_deref()
    }

    pub fn is_authenticated(&self) -> Option<bool> {
        self.authenticated
    }

    pub fn set_authenticated(&mut self, authenticated: bool) {
        self.authenticated = Some(authenticated);
    }

    /// Resolve a directed identity request to the identifier the user chose.
    pub fn set_claimed_identifier(
        &mut self,
        claimed_identifier: impl Into<String>,
        local_identifier: impl Into<String>,
    ) -> Result<(), ProviderError> {
        if !self.is_directed_identity() {
            return Err(ProviderError::Rejected(
                "identifier was chosen by the relying party".into(),
            ));
        }
        self.claimed_identifier = Some(claimed_identifier.into());
        self.local_identifier = Some(local_identifier.into());
        Ok(())
    }

    /// Extension field to include in a positive assertion (unprefixed name)
    pub fn add_response_extension(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.response_extensions.push((name.into(), value.into()));
    }

    pub fn response_extensions(&self) -> &[(String, String)] {
        &self.response_extensions
    }

    pub fn is_response_ready(&self) -> bool {
        match self.authenticated {
            None => false,
            Some(false) => true,
            Some(true) => {
                !self.is_directed_identity()
                    || (self.claimed_identifier.is_some() && self.local_identifier.is_some())
            }
        }
    }

    pub fn state(&self) -> RequestState {
        if self.sent {
            RequestState::Sent
        } else if self.is_response_ready() {
            RequestState::ResponseReady
        } else {
            RequestState::ResponsePending
        }
    }

    pub(crate) fn mark_sent(&mut self) {
        self.sent = true;
    }
}

/// Supplies authentication decisions for pending requests
#[async_trait]
pub trait AuthenticationDecider: Send + Sync {
    async fn decide(&self, request: &mut AuthenticationRequest) -> Result<(), ProviderError>;
}

/// Declines every request
pub struct RejectingDecider;

#[async_trait]
impl AuthenticationDecider for RejectingDecider {
    async fn decide(&self, request: &mut AuthenticationRequest) -> Result<(), ProviderError> {
        tracing::debug!(return_to = %request.return_to(), "declining authentication request");
        request.set_authenticated(false);
        Ok(())
    }
}

fn parse_url(name: &str, value: &str) -> Result<Url, ProtocolError> {
    Url::parse(value).map_err(|e| ProtocolError::InvalidParameter(name.to_string(), e.to_string()))
}

/// `return_to` must share the realm's scheme and port, sit on its host (or a
/// subdomain of a wildcard realm) and under its path.
fn return_to_matches_realm(return_to: &Url, realm: &Url, wildcard: bool) -> bool {
    let (Some(host), Some(realm_host)) = (return_to.host_str(), realm.host_str()) else {
        return false;
    };
    let host_matches = host == realm_host
        || (wildcard && host.ends_with(realm_host) && host[..host.len() - realm_host.len()].ends_with('.'));

    return_to.scheme() == realm.scheme()
        && return_to.port_or_known_default() == realm.port_or_known_default()
        && host_matches
        && path_within_realm(return_to.path(), realm.path())
}

/// A longer path only counts when the realm path ends at a segment boundary.
fn path_within_realm(path: &str, realm_path: &str) -> bool {
    match path.strip_prefix(realm_path) {
        Some("") => true,
        Some(rest) => realm_path.ends_with('/') || rest.starts_with('/'),
        None => false,
    }
}
