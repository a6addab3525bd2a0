//! Answering `check_authentication` requests from stateless relying parties.

use super::request::CheckAuthenticationRequest;
use super::response::ProviderResponse;
use crate::errors::ProviderError;
use crate::nonce::NonceTracker;
use crate::openid::association::{AssociationUsage, validate_handle};
use crate::openid::association_store::ProviderAssociationStore;
use crate::openid::message::{Message, POSITIVE_ASSERTION};
use crate::openid::protocol::ProtocolVersion;
use crate::openid::signing::verify_message;

pub(crate) async fn respond(
    request: &CheckAuthenticationRequest,
    associations: &dyn ProviderAssociationStore,
    nonces: &NonceTracker,
    nonce_context: &str,
) -> Result<ProviderResponse, ProviderError> {
    let version = request.version;
    let assertion = request.assertion();
    assertion.validate(POSITIVE_ASSERTION, version)?;
    let handle = assertion.require("assoc_handle")?;

    let mut response = Message::new();
    if let Some(namespace) = version.namespace() {
        response.set("ns", namespace);
    }

    // Only Provider-private associations may be checked this way
    let is_valid = match associations.deserialize(handle, AssociationUsage::Private).await {
        Ok(Some(association)) => verify_message(&assertion, &association)?,
        Ok(None) => {
            tracing::info!(%handle, "check_authentication for unknown or expired handle");
            response.set("invalidate_handle", handle);
            false
        }
        Err(error) => {
            tracing::warn!(?error, "check_authentication handle could not be decoded");
            if validate_handle(handle).is_ok() {
                response.set("invalidate_handle", handle);
            }
            false
        }
    };

    // The relying party may ask whether its own shared handle is still good
    if let Some(invalidate) = assertion.get("invalidate_handle").filter(|h| !h.is_empty()) {
        let still_valid = matches!(
            associations.deserialize(invalidate, AssociationUsage::Shared).await,
            Ok(Some(_))
        );
        if !still_valid {
            response.set("invalidate_handle", invalidate);
        }
    }

    // Confirm each assertion at most once
    if is_valid && version >= ProtocolVersion::V2_0 {
        let nonce = assertion.require("response_nonce")?;
        nonces
            .check_response_nonce(nonce_context, nonce)
            .await?
            .into_result()?;
    }

    if !is_valid {
        tracing::warn!(%handle, "check_authentication signature rejected");
    }
    response.set("is_valid", if is_valid { "true" } else { "false" });
    Ok(ProviderResponse::direct(200, &response)?)
}
