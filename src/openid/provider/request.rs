//! Typed Provider requests and their response lifecycle.

use http::Method;
use url::Url;

use super::authentication::AuthenticationRequest;
use crate::errors::{ProtocolError, ProviderError};
use crate::openid::message::{ASSOCIATE_REQUEST, Message};
use crate::openid::protocol::{Mode, ProtocolVersion};

/// Where a request is in its lifecycle.
///
/// `Received -> ResponsePending -> ResponseReady -> Sent`. Associate and
/// check_authentication requests answer themselves and start out ready.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestState {
    Received,
    ResponsePending,
    ResponseReady,
    Sent,
}

/// An HTTP request as seen by the Provider endpoint
#[derive(Clone, Debug)]
pub struct IncomingRequest {
    pub method: Method,
    pub url: Url,
    /// Query parameters for GET, form parameters for POST
    pub parameters: Vec<(String, String)>,
    /// Received over a confidential channel
    pub secure: bool,
}

impl IncomingRequest {
    pub fn new(method: Method, url: Url, parameters: Vec<(String, String)>) -> Self {
        let secure = url.scheme() == "https";
        Self {
            method,
            url,
            parameters,
            secure,
        }
    }
}

/// `associate` direct request
#[derive(Clone, Debug)]
pub struct AssociateRequest {
    pub(crate) message: Message,
    pub(crate) version: ProtocolVersion,
    pub(crate) secure: bool,
    pub(crate) state: RequestState,
}

/// `check_authentication` direct request
#[derive(Clone, Debug)]
pub struct CheckAuthenticationRequest {
    pub(crate) message: Message,
    pub(crate) version: ProtocolVersion,
    pub(crate) state: RequestState,
}

impl CheckAuthenticationRequest {
    /// The assertion being checked, with its original mode restored
    pub fn assertion(&self) -> Message {
        let mut assertion = self.message.clone();
        assertion.set("mode", Mode::IdRes.as_str());
        assertion
    }
}

#[derive(Clone, Debug)]
pub enum ProviderRequest {
    Associate(AssociateRequest),
    Authentication(AuthenticationRequest),
    CheckAuthentication(CheckAuthenticationRequest),
}

impl ProviderRequest {
    /// Classify a parsed message. Direct modes must arrive by POST.
    pub(crate) fn classify(message: Message, incoming: &IncomingRequest) -> Result<Self, ProviderError> {
        let version = message.version()?;
        let mode = message.mode()?;
        if mode.is_direct() && incoming.method != Method::POST {
            return Err(ProtocolError::MalformedMessage(format!("{mode} must be sent by POST")).into());
        }

        match mode {
            Mode::Associate => {
                message.validate(ASSOCIATE_REQUEST, version)?;
                Ok(ProviderRequest::Associate(AssociateRequest {
                    message,
                    version,
                    secure: incoming.secure,
                    state: RequestState::ResponseReady,
                }))
            }
            Mode::CheckAuthentication => {
                Ok(ProviderRequest::CheckAuthentication(CheckAuthenticationRequest {
                    message,
                    version,
                    state: RequestState::ResponseReady,
                }))
            }
            Mode::CheckIdSetup | Mode::CheckIdImmediate => Ok(ProviderRequest::Authentication(
                AuthenticationRequest::from_message(message, version, mode == Mode::CheckIdImmediate)?,
            )),
            other => Err(ProtocolError::UnsupportedMode(other.to_string()).into()),
        }
    }

    pub fn version(&self) -> ProtocolVersion {
        match self {
            ProviderRequest::Associate(request) => request.version,
            ProviderRequest::Authentication(request) => request.version(),
            ProviderRequest::CheckAuthentication(request) => request.version,
        }
    }

    pub fn message(&self) -> &Message {
        match self {
            ProviderRequest::Associate(request) => &request.message,
            ProviderRequest::Authentication(request) => request.message(),
            ProviderRequest::CheckAuthentication(request) => &request.message,
        }
    }

    pub fn state(&self) -> RequestState {
        match self {
            ProviderRequest::Associate(request) => request.state,
            ProviderRequest::Authentication(request) => request.state(),
            ProviderRequest::CheckAuthentication(request) => request.state,
        }
    }

    pub fn is_response_ready(&self) -> bool {
        self.state() == RequestState::ResponseReady
    }
}
