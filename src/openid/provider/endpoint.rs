//! The OpenID Provider endpoint: turns incoming messages into typed requests
//! and typed requests into signed responses.

use std::sync::Arc;
use ulid::Ulid;
use url::Url;

use super::associate;
use super::authentication::AuthenticationRequest;
use super::behavior::{ProviderBehavior, RequireSecureReturnTo};
use super::check_auth;
use super::request::{IncomingRequest, ProviderRequest, RequestState};
use super::response::ProviderResponse;
use super::settings::ProviderSecuritySettings;
use crate::errors::ProviderError;
use crate::nonce::NonceTracker;
use crate::openid::association::{Association, AssociationUsage};
use crate::openid::association_store::ProviderAssociationStore;
use crate::openid::message::{Message, is_assertion_field};
use crate::openid::protocol::{AssociationType, Mode, ProtocolVersion};
use crate::openid::signing::{default_signed_order, sign_message};
use crate::storage::traits::NonceStorage;

/// Indirect messages up to this many bytes are sent as redirects
pub const DEFAULT_FORM_POST_THRESHOLD: usize = 2048;

/// Outcome of [`OpenIdProvider::handle`]
#[derive(Debug)]
pub enum Handled {
    /// Send this to the user agent or relying party
    Response(ProviderResponse),
    /// Needs an authentication decision from the host
    Pending(AuthenticationRequest),
    /// Not an OpenID message
    Ignored,
}

pub struct OpenIdProvider {
    endpoint: Url,
    settings: ProviderSecuritySettings,
    associations: Arc<dyn ProviderAssociationStore>,
    nonces: NonceTracker,
    behaviors: Vec<Arc<dyn ProviderBehavior>>,
    form_post_threshold: usize,
}

impl OpenIdProvider {
    pub fn new(
        endpoint: Url,
        settings: ProviderSecuritySettings,
        associations: Arc<dyn ProviderAssociationStore>,
        nonce_storage: Arc<dyn NonceStorage>,
    ) -> Self {
        let mut behaviors: Vec<Arc<dyn ProviderBehavior>> = Vec::new();
        if settings.require_ssl {
            behaviors.push(Arc::new(RequireSecureReturnTo));
        }
        Self {
            endpoint,
            nonces: NonceTracker::new(nonce_storage, settings.max_nonce_age),
            settings,
            associations,
            behaviors,
            form_post_threshold: DEFAULT_FORM_POST_THRESHOLD,
        }
    }

    /// Append a behavior. Behaviors run in the order they were added.
    pub fn with_behavior(mut self, behavior: Arc<dyn ProviderBehavior>) -> Self {
        self.behaviors.push(behavior);
        self
    }

    pub fn with_form_post_threshold(mut self, threshold: usize) -> Self {
        self.form_post_threshold = threshold;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn settings(&self) -> &ProviderSecuritySettings {
        &self.settings
    }

    pub fn behaviors(&self) -> impl Iterator<Item = &str> {
        self.behaviors.iter().map(|b| b.name())
    }

    /// Parse and classify an incoming request. `Ok(None)` when it carries no OpenID message.
    pub fn get_request(&self, incoming: &IncomingRequest) -> Result<Option<ProviderRequest>, ProviderError> {
        let message = Message::from_parameters(incoming.parameters.clone())?;
        if message.iter().next().is_none() {
            return Ok(None);
        }

        let request = ProviderRequest::classify(message, incoming)?;
        for behavior in &self.behaviors {
            behavior.on_incoming_request(&request)?;
        }
        tracing::debug!(
            mode = request.message().get("mode"),
            version = ?request.version(),
            "received openid request"
        );
        Ok(Some(request))
    }

    /// Produce the response for a request whose response is ready.
    pub async fn prepare_response(&self, request: &mut ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        match request {
            ProviderRequest::Authentication(authentication) => {
                self.prepare_authentication_response(authentication).await
            }
            ProviderRequest::Associate(associate_request) => {
                check_ready(associate_request.state)?;
                let response =
                    associate::respond(associate_request, &self.settings, self.associations.as_ref()).await?;
                associate_request.state = RequestState::Sent;
                Ok(response)
            }
            ProviderRequest::CheckAuthentication(check_request) => {
                check_ready(check_request.state)?;
                let response = check_auth::respond(
                    check_request,
                    self.associations.as_ref(),
                    &self.nonces,
                    self.endpoint.as_str(),
                )
                .await?;
                check_request.state = RequestState::Sent;
                Ok(response)
            }
        }
    }

    /// Produce the positive or negative assertion once the host has decided.
    pub async fn prepare_authentication_response(
        &self,
        request: &mut AuthenticationRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        check_ready(request.state())?;
        let response = match request.is_authenticated() {
            Some(true) => self.positive_assertion(request).await?,
            _ => self.negative_assertion(request),
        };
        request.mark_sent();
        tracing::info!(
            return_to = %request.return_to(),
            authenticated = request.is_authenticated().unwrap_or(false),
            "authentication response prepared"
        );
        Ok(response)
    }

    /// Classify, and answer whatever can be answered without the host.
    pub async fn handle(&self, incoming: &IncomingRequest) -> Result<Handled, ProviderError> {
        let request = match self.get_request(incoming) {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(Handled::Ignored),
            Err(error) => return self.error_response(incoming, &error).map(Handled::Response).ok_or(error),
        };

        match request {
            ProviderRequest::Authentication(authentication) => Ok(Handled::Pending(authentication)),
            mut direct => match self.prepare_response(&mut direct).await {
                Ok(response) => Ok(Handled::Response(response)),
                Err(error) => self.error_response(incoming, &error).map(Handled::Response).ok_or(error),
            },
        }
    }

    /// Error response for a failed request.
    ///
    /// The failure is logged under an opaque reference that is the only
    /// detail besides a short description sent to the remote party. `None`
    /// when there is nowhere to send an error.
    pub fn error_response(&self, incoming: &IncomingRequest, error: &ProviderError) -> Option<ProviderResponse> {
        let reference = Ulid::new().to_string();
        tracing::error!(%reference, ?error, "openid request failed");

        let description = match error {
            ProviderError::Protocol(e) => e.to_string(),
            ProviderError::Nonce(e) => e.to_string(),
            ProviderError::Rejected(reason) => reason.clone(),
            _ => "The request could not be processed".to_string(),
        };

        let message = Message::from_parameters(incoming.parameters.clone()).ok();
        let version = message
            .as_ref()
            .and_then(|m| m.version().ok())
            .unwrap_or(ProtocolVersion::V2_0);
        let mode = message.as_ref().and_then(|m| m.mode().ok());

        let mut response = Message::new();
        if let Some(namespace) = version.namespace() {
            response.set("ns", namespace);
        }
        response.set("error", description);
        if version >= ProtocolVersion::V2_0 {
            response.set("reference", reference);
        }

        let return_to = message
            .as_ref()
            .and_then(|m| m.get("return_to"))
            .and_then(|r| Url::parse(r).ok());
        match (mode, return_to) {
            (Some(Mode::CheckIdSetup | Mode::CheckIdImmediate), Some(return_to)) => {
                response.set("mode", Mode::Error.as_str());
                Some(ProviderResponse::indirect(&return_to, &response, self.form_post_threshold))
            }
            (Some(mode), _) if mode.is_direct() => ProviderResponse::direct(400, &response).ok(),
            _ if incoming.method == http::Method::POST => ProviderResponse::direct(400, &response).ok(),
            _ => None,
        }
    }

    async fn positive_assertion(&self, request: &AuthenticationRequest) -> Result<ProviderResponse, ProviderError> {
        let version = request.version();
        let mut assertion = Message::with_mode(version, Mode::IdRes);
        if version >= ProtocolVersion::V2_0 {
            assertion.set("op_endpoint", self.endpoint.as_str());
            assertion.set("response_nonce", self.nonces.generate_response_nonce().to_string());
        }
        if let (Some(claimed), Some(local)) = (request.claimed_identifier(), request.local_identifier()) {
            if version >= ProtocolVersion::V2_0 {
                assertion.set("claimed_id", claimed);
            }
            assertion.set("identity", local);
        }
        assertion.set("return_to", request.message().require("return_to")?);
        for (name, value) in request.response_extensions() {
            if is_assertion_field(name) {
                tracing::warn!(field = %name, "response extension would replace a protocol field, skipped");
                continue;
            }
            assertion.set(name.clone(), value.clone());
        }
        for behavior in &self.behaviors {
            behavior.on_outgoing_assertion(request, &mut assertion)?;
        }

        let association = self.signing_association(request, &mut assertion).await?;
        let order = default_signed_order(&assertion, version, self.settings.sign_outgoing_extensions);
        sign_message(&mut assertion, &association, &order)?;

        Ok(ProviderResponse::indirect(
            request.return_to(),
            &assertion,
            self.form_post_threshold,
        ))
    }

    /// The relying party's shared association when it is still good, otherwise
    /// a fresh private one. A rejected handle is echoed in `invalidate_handle`.
    async fn signing_association(
        &self,
        request: &AuthenticationRequest,
        assertion: &mut Message,
    ) -> Result<Association, ProviderError> {
        if let Some(handle) = request.message().get("assoc_handle") {
            match self.associations.deserialize(handle, AssociationUsage::Shared).await {
                Ok(Some(association)) => return Ok(association),
                Ok(None) => tracing::info!(%handle, "relying party handle unknown or expired"),
                Err(error) => tracing::warn!(?error, "relying party handle could not be decoded"),
            }
            assertion.set("invalidate_handle", handle);
        }

        let association_type = if self
            .settings
            .private_association_type
            .is_supported_by(request.version())
        {
            self.settings.private_association_type
        } else {
            AssociationType::HmacSha1
        };
        Ok(Association::create(
            self.associations.as_ref(),
            association_type,
            AssociationUsage::Private,
            self.settings.private_association_lifetime,
        )
        .await?)
    }

    fn negative_assertion(&self, request: &AuthenticationRequest) -> ProviderResponse {
        let version = request.version();
        let message = match (request.is_immediate(), version) {
            (true, ProtocolVersion::V2_0) => Message::with_mode(version, Mode::SetupNeeded),
            (true, ProtocolVersion::V1_1) => {
                let mut setup = request.message().clone();
                setup.set("mode", Mode::CheckIdSetup.as_str());
                let mut message = Message::with_mode(version, Mode::IdRes);
                message.set("user_setup_url", setup.to_url(&self.endpoint).as_str());
                message
            }
            (false, _) => Message::with_mode(version, Mode::Cancel),
        };
        ProviderResponse::indirect(request.return_to(), &message, self.form_post_threshold)
    }
}

fn check_ready(state: RequestState) -> Result<(), ProviderError> {
    match state {
        RequestState::ResponseReady => Ok(()),
        RequestState::Sent => Err(ProviderError::ResponseAlreadySent),
        RequestState::Received | RequestState::ResponsePending => Err(ProviderError::ResponseNotReady),
    }
}
