//! Verifying indirect responses from Providers.

use tokio_util::sync::CancellationToken;
use url::Url;

use super::RelyingParty;
use super::return_to::{REQUEST_NONCE_CONTEXT, ReturnToBinding, check as check_return_to};
use crate::errors::{ConsumerError, ProtocolError, SignatureError, TransportError};
use crate::openid::message::{CHECK_AUTHENTICATION_RESPONSE, Message, POSITIVE_ASSERTION, is_assertion_field};
use crate::openid::protocol::{Mode, ProtocolVersion};
use crate::openid::signing::{ensure_required_fields_signed, signed_fields, verify_message};
use crate::transport::{DirectRequest, send_direct};

/// What the Provider said about the user
#[derive(Clone, Debug)]
pub enum AuthenticationResponse {
    Authenticated(VerifiedAssertion),
    Canceled,
    /// An immediate request needs user interaction. OpenID 1.x Providers say
    /// where to send the user.
    SetupRequired { user_setup_url: Option<Url> },
}

/// A positive assertion whose signature, return_to and nonce all checked out
#[derive(Clone, Debug)]
pub struct VerifiedAssertion {
    pub version: ProtocolVersion,
    pub provider_endpoint: Url,
    pub claimed_identifier: Option<String>,
    pub local_identifier: Option<String>,
    pub return_to: Url,
    /// Extension fields covered by the signature
    pub signed_extensions: Vec<(String, String)>,
}

impl RelyingParty {
    /// Verify the indirect response the user agent brought back to `received_at`.
    ///
    /// `provider_endpoint` is the endpoint the request was sent to. OpenID 1.x
    /// assertions do not name their Provider, so it is required for them.
    pub async fn verify_assertion(
        &self,
        received_at: &Url,
        parameters: Vec<(String, String)>,
        provider_endpoint: Option<&Url>,
        cancel: &CancellationToken,
    ) -> Result<AuthenticationResponse, ConsumerError> {
        let message = Message::from_parameters(parameters)?;
        let version = message.version()?;

        match message.mode()? {
            Mode::Cancel => return Ok(AuthenticationResponse::Canceled),
            Mode::SetupNeeded => return Ok(AuthenticationResponse::SetupRequired { user_setup_url: None }),
            Mode::Error => {
                return Err(ConsumerError::RemoteError(
                    message.get("error").unwrap_or_default().to_string(),
                ));
            }
            Mode::IdRes => {
                if let Some(setup) = message.get("user_setup_url") {
                    return Ok(AuthenticationResponse::SetupRequired {
                        user_setup_url: Url::parse(setup).ok(),
                    });
                }
            }
            other => return Err(ProtocolError::UnsupportedMode(other.to_string()).into()),
        }

        message.validate(POSITIVE_ASSERTION, version)?;
        let return_to = parse_url("openid.return_to", message.require("return_to")?)?;
        if !return_to_matches(&return_to, received_at) {
            tracing::warn!(%return_to, %received_at, "assertion delivered to the wrong return_to");
            return Err(ProtocolError::InvalidParameter(
                "openid.return_to".into(),
                "does not match the receiving URL".into(),
            )
            .into());
        }
        ensure_required_fields_signed(&message, version)?;

        let op_endpoint = match (version, provider_endpoint) {
            (ProtocolVersion::V2_0, _) => parse_url("openid.op_endpoint", message.require("op_endpoint")?)?,
            (ProtocolVersion::V1_1, Some(expected)) => expected.clone(),
            (ProtocolVersion::V1_1, None) => {
                return Err(ProtocolError::MissingParameter("openid.op_endpoint".into()).into());
            }
        };
        if let Some(expected) = provider_endpoint {
            if *expected != op_endpoint {
                return Err(ProtocolError::InvalidParameter(
                    "openid.op_endpoint".into(),
                    "assertion is from an unexpected Provider".into(),
                )
                .into());
            }
        }

        self.verify_signature(&message, version, &op_endpoint, cancel).await?;
        self.check_return_to_binding(&return_to, version).await?;

        if version >= ProtocolVersion::V2_0 {
            self.nonces
                .check_response_nonce(op_endpoint.as_str(), message.require("response_nonce")?)
                .await?
                .into_result()?;
        }

        let signed = signed_fields(&message)?;
        let signed_extensions = signed
            .iter()
            .filter(|name| !is_assertion_field(name))
            .filter_map(|name| message.get(name).map(|value| (name.clone(), value.to_string())))
            .collect();
        tracing::info!(
            op_endpoint = %op_endpoint,
            claimed_id = message.get("claimed_id").or(message.get("identity")),
            "assertion verified"
        );
        Ok(AuthenticationResponse::Authenticated(VerifiedAssertion {
            version,
            claimed_identifier: match version {
                ProtocolVersion::V2_0 => message.get("claimed_id").map(str::to_string),
                ProtocolVersion::V1_1 => message.get("identity").map(str::to_string),
            },
            local_identifier: message.get("identity").map(str::to_string),
            provider_endpoint: op_endpoint,
            return_to,
            signed_extensions,
        }))
    }

    /// Solicited assertions carry our signature in return_to. On 1.x it also
    /// covers a request nonce that is good for one verification.
    async fn check_return_to_binding(&self, return_to: &Url, version: ProtocolVersion) -> Result<(), ConsumerError> {
        let request_nonce = match check_return_to(return_to, &self.return_to_key)? {
            ReturnToBinding::Forged => {
                tracing::warn!(%return_to, "return_to signature mismatch");
                return Err(SignatureError::Invalid.into());
            }
            ReturnToBinding::Unsolicited
                if version == ProtocolVersion::V1_1 || self.settings.reject_unsolicited_assertions =>
            {
                tracing::warn!(%return_to, "unsolicited assertion refused");
                return Err(ConsumerError::UnsolicitedAssertion);
            }
            ReturnToBinding::Unsolicited => return Ok(()),
            ReturnToBinding::Solicited { request_nonce } => request_nonce,
        };
        if version == ProtocolVersion::V1_1 {
            let nonce = request_nonce.ok_or(ConsumerError::UnsolicitedAssertion)?;
            self.nonces
                .check_response_nonce(REQUEST_NONCE_CONTEXT, &nonce)
                .await?
                .into_result()?;
        }
        Ok(())
    }

    /// Verify locally when the handle is ours, otherwise ask the Provider.
    async fn verify_signature(
        &self,
        message: &Message,
        version: ProtocolVersion,
        op_endpoint: &Url,
        cancel: &CancellationToken,
    ) -> Result<(), ConsumerError> {
        let handle = message.require("assoc_handle")?;
        let association = self
            .associations
            .get_association(op_endpoint.as_str(), Some(handle))
            .await?;

        match association {
            Some(association) => {
                if verify_message(message, &association)? {
                    Ok(())
                } else {
                    tracing::warn!(%handle, "assertion signature mismatch");
                    Err(SignatureError::Invalid.into())
                }
            }
            None => self.check_authentication(message, version, op_endpoint, cancel).await,
        }
    }

    async fn check_authentication(
        &self,
        message: &Message,
        version: ProtocolVersion,
        op_endpoint: &Url,
        cancel: &CancellationToken,
    ) -> Result<(), ConsumerError> {
        tracing::debug!(%op_endpoint, "verifying assertion with check_authentication");
        let mut request = message.clone();
        request.set("mode", Mode::CheckAuthentication.as_str());

        let response = send_direct(
            self.transport.as_ref(),
            DirectRequest::post_form(op_endpoint.clone(), request.to_parameters()),
            self.settings.request_timeout,
            cancel,
        )
        .await?;
        let body = Message::from_key_value_form(response.text()?, self.settings.conformance(version))?;
        match response.status {
            200 => {}
            400 => {
                return Err(ConsumerError::RemoteError(
                    body.get("error").unwrap_or("check_authentication refused").to_string(),
                ));
            }
            status => return Err(TransportError::UnexpectedStatus(status).into()),
        }
        body.validate(CHECK_AUTHENTICATION_RESPONSE, version)?;

        // Empty values come from broken 1.x Providers and mean nothing
        if let Some(invalidate) = body.get("invalidate_handle").filter(|h| !h.is_empty()) {
            if self.associations.remove_association(op_endpoint.as_str(), invalidate).await? {
                tracing::info!(handle = invalidate, "provider invalidated association");
            }
        }

        if body.get("is_valid") == Some("true") {
            Ok(())
        } else {
            tracing::warn!(%op_endpoint, "provider did not confirm assertion");
            Err(SignatureError::Invalid.into())
        }
    }
}

fn parse_url(name: &str, value: &str) -> Result<Url, ProtocolError> {
    Url::parse(value).map_err(|e| ProtocolError::InvalidParameter(name.to_string(), e.to_string()))
}

/// The assertion must arrive at the URL it names: same scheme, authority and
/// path, with every return_to query parameter present and unchanged.
fn return_to_matches(return_to: &Url, received_at: &Url) -> bool {
    if return_to.scheme() != received_at.scheme()
        || return_to.host_str() != received_at.host_str()
        || return_to.port_or_known_default() != received_at.port_or_known_default()
        || return_to.path() != received_at.path()
    {
        return false;
    }
    let received: Vec<(String, String)> = received_at.query_pairs().into_owned().collect();
    return_to
        .query_pairs()
        .all(|(k, v)| received.iter().any(|(rk, rv)| *rk == k && *rv == v))
}

#[cfg(test)]
mod tests {
    use super::super::RelyingPartySettings;
    use super::super::test_support::{InProcessTransport, provider};
    use super::*;
    use crate::errors::NonceError;
    use crate::openid::provider::{
        Handled, IncomingRequest, OpenIdProvider, ProviderResponse, ProviderSecuritySettings,
    };
    use crate::openid::relying_party::CheckIdRequest;
    use crate::storage::inmemory::{MemoryNonceStorage, MemoryRelyingPartyAssociationStore};
    use http::Method;
    use std::sync::Arc;

    const OP: &str = "https://op.example.com/openid";
    const RETURN_TO: &str = "https://rp.example.com/return?session=42";

    struct Fixture {
        provider: Arc<OpenIdProvider>,
        rp: RelyingParty,
    }

    fn fixture(settings: RelyingPartySettings) -> Fixture {
        let provider = provider(OP, ProviderSecuritySettings::default());
        let rp = RelyingParty::new(
            Arc::new(InProcessTransport {
                provider: provider.clone(),
            }),
            Arc::new(MemoryRelyingPartyAssociationStore::new()),
            Arc::new(MemoryNonceStorage::new()),
            settings,
        );
        Fixture { provider, rp }
    }

    /// Run the user agent leg: RP request URL -> Provider decision -> assertion URL
    async fn round_trip(fixture: &Fixture, authenticated: bool) -> Url {
        let request = CheckIdRequest::new(
            Url::parse(OP).unwrap(),
            ProtocolVersion::V2_0,
            Url::parse(RETURN_TO).unwrap(),
        )
        .with_identifier("https://op.example.com/user/alice", "https://op.example.com/user/alice");
        let url = fixture
            .rp
            .create_request_url(&request, &CancellationToken::new())
            .await
            .unwrap();

        let incoming = IncomingRequest::new(Method::GET, url.clone(), url.query_pairs().into_owned().collect());
        let Handled::Pending(mut pending) = fixture.provider.handle(&incoming).await.unwrap() else {
            panic!("expected pending authentication");
        };
        pending.set_authenticated(authenticated);
        pending.add_response_extension("ns.sreg", "http://openid.net/extensions/sreg/1.1");
        pending.add_response_extension("sreg.nickname", "alice");
        match fixture.provider.prepare_authentication_response(&mut pending).await.unwrap() {
            ProviderResponse::Redirect { location } => location,
            other => panic!("expected redirect, got {other:?}"),
        }
    }

    fn pairs(url: &Url) -> Vec<(String, String)> {
        url.query_pairs().into_owned().collect()
    }

    #[tokio::test]
    async fn test_verifies_with_shared_association() {
        let fixture = fixture(Default::default());
        let assertion = round_trip(&fixture, true).await;
        let op = Url::parse(OP).unwrap();

        let response = fixture
            .rp
            .verify_assertion(&assertion, pairs(&assertion), Some(&op), &CancellationToken::new())
            .await
            .unwrap();
        let AuthenticationResponse::Authenticated(verified) = response else {
            panic!("expected authenticated");
        };
        assert_eq!(
            verified.claimed_identifier.as_deref(),
            Some("https://op.example.com/user/alice")
        );
        assert!(
            verified
                .signed_extensions
                .contains(&("sreg.nickname".to_string(), "alice".to_string()))
        );

        let replay = fixture
            .rp
            .verify_assertion(&assertion, pairs(&assertion), Some(&op), &CancellationToken::new())
            .await;
        assert!(matches!(replay, Err(ConsumerError::Nonce(NonceError::Replayed))));
    }

    #[tokio::test]
    async fn test_stateless_verification_uses_check_authentication() {
        let fixture = fixture(RelyingPartySettings {
            stateless: true,
            ..Default::default()
        });
        let assertion = round_trip(&fixture, true).await;

        let response = fixture
            .rp
            .verify_assertion(&assertion, pairs(&assertion), None, &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(response, AuthenticationResponse::Authenticated(_)));
    }

    #[tokio::test]
    async fn test_tampered_assertion_is_rejected() {
        let fixture = fixture(Default::default());
        let assertion = round_trip(&fixture, true).await;
        let tampered: Vec<(String, String)> = pairs(&assertion)
            .into_iter()
            .map(|(k, v)| match k.as_str() {
                "openid.sreg.nickname" => (k, "mallory".to_string()),
                _ => (k, v),
            })
            .collect();

        let result = fixture
            .rp
            .verify_assertion(&assertion, tampered, None, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(ConsumerError::Signature(SignatureError::Invalid))));
    }

    #[tokio::test]
    async fn test_wrong_return_to_is_rejected() {
        let fixture = fixture(Default::default());
        let assertion = round_trip(&fixture, true).await;
        let elsewhere = Url::parse("https://rp.example.com/other").unwrap();

        let result = fixture
            .rp
            .verify_assertion(&elsewhere, pairs(&assertion), None, &CancellationToken::new())
            .await;
        assert!(matches!(
            result,
            Err(ConsumerError::Protocol(ProtocolError::InvalidParameter(..)))
        ));
    }

    #[tokio::test]
    async fn test_negative_assertion() {
        let fixture = fixture(Default::default());
        let assertion = round_trip(&fixture, false).await;

        let response = fixture
            .rp
            .verify_assertion(&assertion, pairs(&assertion), None, &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(response, AuthenticationResponse::Canceled));
    }

    #[test]
    fn test_return_to_matching() {
        let return_to = Url::parse(RETURN_TO).unwrap();
        assert!(return_to_matches(
            &return_to,
            &Url::parse("https://rp.example.com/return?openid.mode=id_res&session=42").unwrap()
        ));
        assert!(!return_to_matches(
            &return_to,
            &Url::parse("https://rp.example.com/return?session=43").unwrap()
        ));
        assert!(!return_to_matches(
            &return_to,
            &Url::parse("http://rp.example.com/return?session=42").unwrap()
        ));
    }
}
