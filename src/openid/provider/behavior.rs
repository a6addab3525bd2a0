//! Provider behaviors: policy hooks applied, in order, to every request and
//! to every positive assertion before it is signed.

use super::authentication::AuthenticationRequest;
use super::request::ProviderRequest;
use crate::errors::ProviderError;
use crate::openid::message::Message;

pub trait ProviderBehavior: Send + Sync {
    fn name(&self) -> &'static str;

    /// Inspect a classified request. An error refuses it.
    fn on_incoming_request(&self, _request: &ProviderRequest) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Adjust a positive assertion before it is signed.
    fn on_outgoing_assertion(
        &self,
        _request: &AuthenticationRequest,
        _assertion: &mut Message,
    ) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Refuse authentication requests whose `return_to` is not https
pub struct RequireSecureReturnTo;

impl ProviderBehavior for RequireSecureReturnTo {
    fn name(&self) -> &'static str {
        "require-secure-return-to"
    }

    fn on_incoming_request(&self, request: &ProviderRequest) -> Result<(), ProviderError> {
        if let ProviderRequest::Authentication(authentication) = request {
            if authentication.return_to().scheme() != "https" {
                tracing::warn!(return_to = %authentication.return_to(), "refusing insecure return_to");
                return Err(ProviderError::Rejected("return_to must use https".into()));
            }
        }
        Ok(())
    }
}
