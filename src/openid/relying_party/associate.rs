//! Establishing shared associations with Providers.

use base64::{Engine, prelude::BASE64_STANDARD};
use chrono::{Duration, Utc};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::RelyingParty;
use crate::errors::{ConsumerError, ProtocolError, TransportError};
use crate::openid::association::{Association, AssociationUsage};
use crate::openid::diffie_hellman::{DiffieHellman, btwoc, decrypt_association_secret, from_btwoc};
use crate::openid::message::{ASSOCIATE_SUCCESS_RESPONSE, Message};
use crate::openid::protocol::{
    AssociationType, Mode, ProtocolVersion, SessionType, UNSUPPORTED_TYPE_ERROR_CODE,
};
use crate::transport::{DirectRequest, send_direct};

enum AssociateOutcome {
    Established(Association),
    /// Refused with a suggestion of what the Provider would accept
    Suggested(AssociationType, SessionType),
    Refused,
}

impl RelyingParty {
    /// A usable shared association with `op_endpoint`, creating one if needed.
    ///
    /// `Ok(None)` means no association could be agreed and assertions from
    /// this Provider must be verified with check_authentication. Transport
    /// failures are returned, not swallowed.
    pub async fn associate(
        &self,
        op_endpoint: &Url,
        version: ProtocolVersion,
        cancel: &CancellationToken,
    ) -> Result<Option<Association>, ConsumerError> {
        if self.settings.stateless {
            return Ok(None);
        }
        if let Some(existing) = self
            .associations
            .get_association(op_endpoint.as_str(), None)
            .await?
        {
            return Ok(Some(existing));
        }

        let secure = op_endpoint.scheme() == "https";
        let Some(association_type) = AssociationType::ALL
            .into_iter()
            .find(|t| self.settings.is_permitted(*t, version))
        else {
            return Ok(None);
        };
        let session_type = if secure {
            SessionType::NoEncryption
        } else {
            SessionType::diffie_hellman_for(association_type)
        };

        let mut outcome = self
            .request_association(op_endpoint, version, association_type, session_type, cancel)
            .await?;

        // One retry with whatever the Provider suggested, if we can live with it
        if let AssociateOutcome::Suggested(suggested_type, suggested_session) = outcome {
            let acceptable = self.settings.is_permitted(suggested_type, version)
                && suggested_session.is_compatible_with(suggested_type)
                && (suggested_session != SessionType::NoEncryption || secure);
            outcome = if acceptable {
                tracing::debug!(
                    assoc_type = suggested_type.as_str(),
                    session_type = ?suggested_session,
                    "retrying association with provider suggestion"
                );
                self.request_association(op_endpoint, version, suggested_type, suggested_session, cancel)
                    .await?
            } else {
                AssociateOutcome::Refused
            };
        }

        match outcome {
            AssociateOutcome::Established(association) => {
                self.associations
                    .store_association(op_endpoint.as_str(), &association)
                    .await?;
                tracing::info!(
                    op_endpoint = %op_endpoint,
                    assoc_type = association.association_type().as_str(),
                    expires_in = association.seconds_until_expiration(),
                    "association established"
                );
                Ok(Some(association))
            }
            AssociateOutcome::Suggested(..) | AssociateOutcome::Refused => {
                tracing::info!(op_endpoint = %op_endpoint, "no association agreed, continuing stateless");
                Ok(None)
            }
        }
    }

    async fn request_association(
        &self,
        op_endpoint: &Url,
        version: ProtocolVersion,
        association_type: AssociationType,
        session_type: SessionType,
        cancel: &CancellationToken,
    ) -> Result<AssociateOutcome, ConsumerError> {
        let mut request = Message::with_mode(version, Mode::Associate);
        request.set("assoc_type", association_type.as_str());
        let session_name = session_type.as_str(version);
        if !session_name.is_empty() {
            request.set("session_type", session_name);
        }
        let exchange = match session_type {
            SessionType::NoEncryption => None,
            SessionType::DhSha1 | SessionType::DhSha256 => {
                let exchange = DiffieHellman::with_defaults();
                request.set(
                    "dh_consumer_public",
                    BASE64_STANDARD.encode(btwoc(exchange.public_value())),
                );
                Some(exchange)
            }
        };

        let response = send_direct(
            self.transport.as_ref(),
            DirectRequest::post_form(op_endpoint.clone(), request.to_parameters()),
            self.settings.request_timeout,
            cancel,
        )
        .await?;
        let body = Message::from_key_value_form(response.text()?, self.settings.conformance(version))?;

        match response.status {
            200 => self
                .parse_association(&body, version, association_type, session_type, exchange)
                .map(AssociateOutcome::Established),
            400 => {
                tracing::info!(
                    error = body.get("error"),
                    error_code = body.get("error_code"),
                    "provider refused association"
                );
                if body.get("error_code") != Some(UNSUPPORTED_TYPE_ERROR_CODE) {
                    return Ok(AssociateOutcome::Refused);
                }
                let suggested_type = body.get("assoc_type").and_then(|t| t.parse().ok());
                let suggested_session =
                    SessionType::parse(body.get("session_type"), version, self.settings.openid11_lenient).ok();
                Ok(match (suggested_type, suggested_session) {
                    (Some(t), Some(s)) => AssociateOutcome::Suggested(t, s),
                    _ => AssociateOutcome::Refused,
                })
            }
            status => Err(TransportError::UnexpectedStatus(status).into()),
        }
    }

    fn parse_association(
        &self,
        body: &Message,
        version: ProtocolVersion,
        association_type: AssociationType,
        session_type: SessionType,
        exchange: Option<DiffieHellman>,
    ) -> Result<Association, ConsumerError> {
        body.validate(ASSOCIATE_SUCCESS_RESPONSE, version)?;

        let returned_type: AssociationType = body.require("assoc_type")?.parse()?;
        if returned_type != association_type {
            return Err(ProtocolError::InvalidParameter(
                "openid.assoc_type".into(),
                format!("requested {association_type}, received {returned_type}"),
            )
            .into());
        }
        let returned_session =
            SessionType::parse(body.get("session_type"), version, self.settings.openid11_lenient)?;
        if returned_session != session_type {
            return Err(ProtocolError::InvalidParameter(
                "openid.session_type".into(),
                format!("requested {}", session_type.as_str(version)),
            )
            .into());
        }

        let expires_in: i64 = body
            .require("expires_in")?
            .parse()
            .map_err(|_| ProtocolError::InvalidParameter("openid.expires_in".into(), "not an integer".into()))?;

        let secret = match (exchange, session_type.hash_algorithm()) {
            (Some(exchange), Some(hash)) => {
                let server_public = from_btwoc(&decode(body, "dh_server_public")?);
                let shared_secret = exchange.derive_shared_secret(&server_public)?;
                decrypt_association_secret(&shared_secret, &decode(body, "enc_mac_key")?, hash)?
            }
            _ => decode(body, "mac_key")?,
        };

        let issued_at = Utc::now();
        Ok(Association::new(
            body.require("assoc_handle")?,
            secret,
            association_type,
            issued_at,
            issued_at + Duration::seconds(expires_in),
            AssociationUsage::Shared,
        )?)
    }
}

fn decode(message: &Message, name: &str) -> Result<Vec<u8>, ProtocolError> {
    BASE64_STANDARD
        .decode(message.require(name)?)
        .map_err(|e| ProtocolError::InvalidParameter(format!("openid.{name}"), e.to_string()))
}
