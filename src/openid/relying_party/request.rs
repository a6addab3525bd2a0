//! Authentication requests sent through the user agent to the Provider.

use tokio_util::sync::CancellationToken;
use url::Url;

use super::RelyingParty;
use super::return_to;
use crate::errors::{ConsumerError, ProtocolError};
use crate::openid::message::Message;
use crate::openid::protocol::{IDENTIFIER_SELECT, Mode, ProtocolVersion};

#[derive(Clone, Debug)]
pub struct CheckIdRequest {
    pub op_endpoint: Url,
    pub version: ProtocolVersion,
    pub return_to: Url,
    pub realm: Option<Url>,
    pub claimed_identifier: Option<String>,
    pub local_identifier: Option<String>,
    pub immediate: bool,
    /// Unprefixed extension fields
    pub extensions: Vec<(String, String)>,
}

impl CheckIdRequest {
    /// Request with the identifier left to the Provider
    pub fn new(op_endpoint: Url, version: ProtocolVersion, return_to: Url) -> Self {
        Self {
            op_endpoint,
            version,
            return_to,
            realm: None,
            claimed_identifier: Some(IDENTIFIER_SELECT.to_string()),
            local_identifier: Some(IDENTIFIER_SELECT.to_string()),
            immediate: false,
            extensions: Vec::new(),
        }
    }

    pub fn with_identifier(mut self, claimed: impl Into<String>, local: impl Into<String>) -> Self {
        self.claimed_identifier = Some(claimed.into());
        self.local_identifier = Some(local.into());
        self
    }

    /// Extension-only request, asserting no identifier
    pub fn without_identifier(mut self) -> Self {
        self.claimed_identifier = None;
        self.local_identifier = None;
        self
    }

    pub fn with_realm(mut self, realm: Url) -> Self {
        self.realm = Some(realm);
        self
    }

    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    pub fn with_extension(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extensions.push((name.into(), value.into()));
        self
    }
}

impl RelyingParty {
    /// The URL to redirect the user agent to.
    ///
    /// Associates with the Provider first unless an association is already
    /// held or the relying party runs stateless.
    pub async fn create_request_url(
        &self,
        request: &CheckIdRequest,
        cancel: &CancellationToken,
    ) -> Result<Url, ConsumerError> {
        if self.settings.require_ssl && request.op_endpoint.scheme() != "https" {
            return Err(ProtocolError::InsecureTransport(request.op_endpoint.to_string()).into());
        }
        let version = request.version;
        let local_identifier = match (version, &request.local_identifier) {
            (ProtocolVersion::V1_1, None) => {
                return Err(ProtocolError::MissingParameter("openid.identity".into()).into());
            }
            (_, local) => local.as_deref(),
        };

        let association = self.associate(&request.op_endpoint, version, cancel).await?;

        let mode = if request.immediate {
            Mode::CheckIdImmediate
        } else {
            Mode::CheckIdSetup
        };
        // 1.x assertions have no response_nonce of their own
        let request_nonce = match version {
            ProtocolVersion::V1_1 => Some(self.nonces.generate_response_nonce()),
            ProtocolVersion::V2_0 => None,
        };
        let bound_return_to = return_to::bind(&request.return_to, request_nonce.as_ref(), &self.return_to_key)?;

        let mut message = Message::with_mode(version, mode);
        message.set("return_to", bound_return_to.as_str());
        if let Some(realm) = &request.realm {
            let realm_field = match version {
                ProtocolVersion::V2_0 => "realm",
                ProtocolVersion::V1_1 => "trust_root",
            };
            message.set(realm_field, realm.as_str());
        }
        if let (Some(claimed), Some(local)) = (&request.claimed_identifier, local_identifier) {
            if version >= ProtocolVersion::V2_0 {
                message.set("claimed_id", claimed.as_str());
            }
            message.set("identity", local);
        }
        if let Some(association) = &association {
            message.set("assoc_handle", association.handle());
        }
        for (name, value) in &request.extensions {
            message.set(name.clone(), value.clone());
        }

        Ok(message.to_url(&request.op_endpoint))
    }
}
