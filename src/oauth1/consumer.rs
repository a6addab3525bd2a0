//! OAuth 1.0a consumer: request signing and the three-legged token exchange.

use rsa::RsaPrivateKey;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::OUT_OF_BAND_CALLBACK;
use super::request::{OAuthRequest, ParameterPlacement, RequestSigner, SignedRequest};
use super::signing::SignatureMethod;
use super::types::Credentials;
use crate::crypto::equals_constant_time;
use crate::errors::{ConsumerError, ProtocolError};
use crate::nonce::OAuthNonce;
use crate::storage::traits::TemporaryCredentialStore;
use crate::transport::{HttpTransport, send_direct};

/// The Service Provider's three token endpoints
#[derive(Clone, Debug)]
pub struct ServiceProviderEndpoints {
    pub request_token_url: Url,
    pub user_authorization_url: Url,
    pub access_token_url: Url,
}

/// Where a consumer is in the token exchange
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenExchangeState {
    /// Holding a request token the user has not yet authorized
    Unauthorized(Credentials),
    /// The user authorized the request token and the callback carried a verifier
    UserAuthorized {
        request_token: Credentials,
        verifier: String,
    },
    Authorized(Credentials),
}

pub struct Consumer {
    credentials: Credentials,
    endpoints: ServiceProviderEndpoints,
    signature_method: SignatureMethod,
    rsa_private_key: Option<RsaPrivateKey>,
    placement: ParameterPlacement,
    realm: Option<String>,
    transport: Arc<dyn HttpTransport>,
    temporary_credentials: Arc<dyn TemporaryCredentialStore>,
    timeout: Duration,
}

impl Consumer {
    pub fn new(
        credentials: Credentials,
        endpoints: ServiceProviderEndpoints,
        transport: Arc<dyn HttpTransport>,
        temporary_credentials: Arc<dyn TemporaryCredentialStore>,
    ) -> Self {
        Self {
            credentials,
            endpoints,
            signature_method: SignatureMethod::HmacSha1,
            rsa_private_key: None,
            placement: ParameterPlacement::AuthorizationHeader,
            realm: None,
            transport,
            temporary_credentials,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_signature_method(mut self, method: SignatureMethod) -> Self {
        self.signature_method = method;
        self
    }

    /// Key for RSA-SHA1; switches the signature method
    pub fn with_rsa_key(mut self, private_key: RsaPrivateKey) -> Self {
        self.rsa_private_key = Some(private_key);
        self.signature_method = SignatureMethod::RsaSha1;
        self
    }

    pub fn with_placement(mut self, placement: ParameterPlacement) -> Self {
        self.placement = placement;
        self
    }

    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sign `request` with a fresh nonce, as the holder of `token` if given.
    pub fn authorize(&self, request: OAuthRequest, token: Option<&Credentials>) -> Result<SignedRequest, ConsumerError> {
        self.authorize_with(request, token, &OAuthNonce::generate(), &[])
    }

    /// Sign with a caller-chosen nonce and extra protocol parameters such as
    /// `oauth_callback` or `oauth_verifier`.
    pub fn authorize_with(
        &self,
        request: OAuthRequest,
        token: Option<&Credentials>,
        nonce: &OAuthNonce,
        extra: &[(&str, &str)],
    ) -> Result<SignedRequest, ConsumerError> {
        let signer = RequestSigner {
            consumer: &self.credentials,
            token,
            method: self.signature_method,
            rsa_private_key: self.rsa_private_key.as_ref(),
        };
        Ok(signer.sign(request, nonce, extra)?)
    }

    /// First leg: obtain a request token and remember it for the callback.
    pub async fn obtain_request_token(
        &self,
        callback: Option<&Url>,
        cancel: &CancellationToken,
    ) -> Result<TokenExchangeState, ConsumerError> {
        let callback = callback.map(Url::as_str).unwrap_or(OUT_OF_BAND_CALLBACK);
        let request = OAuthRequest::post(self.endpoints.request_token_url.clone(), Vec::new());
        let signed = self.authorize_with(request, None, &OAuthNonce::generate(), &[("oauth_callback", callback)])?;
        let response = self.send(signed, cancel).await?;

        if response.iter().all(|(k, v)| k != "oauth_callback_confirmed" || v != "true") {
            return Err(ProtocolError::InvalidParameter(
                "oauth_callback_confirmed".into(),
                "callback was not confirmed".into(),
            )
            .into());
        }
        let request_token = credentials_from(&response)?;
        self.temporary_credentials
            .save(&request_token.token, &request_token.secret)
            .await?;
        tracing::debug!(token = %request_token.token, "obtained request token");
        Ok(TokenExchangeState::Unauthorized(request_token))
    }

    /// Where to send the user to authorize `request_token`
    pub fn user_authorization_url(&self, request_token: &Credentials) -> Url {
        let mut url = self.endpoints.user_authorization_url.clone();
        url.query_pairs_mut().append_pair("oauth_token", &request_token.token);
        url
    }

    /// First leg plus the redirect target for the user agent
    pub async fn request_user_authorization(
        &self,
        callback: Option<&Url>,
        cancel: &CancellationToken,
    ) -> Result<Url, ConsumerError> {
        match self.obtain_request_token(callback, cancel).await? {
            TokenExchangeState::Unauthorized(request_token) => Ok(self.user_authorization_url(&request_token)),
            _ => Err(ProtocolError::MalformedMessage("unexpected token exchange state".into()).into()),
        }
    }

    /// Second leg: the user agent came back to the callback.
    pub async fn receive_callback(&self, parameters: &[(String, String)]) -> Result<TokenExchangeState, ConsumerError> {
        let request_token = self
            .temporary_credentials
            .retrieve()
            .await?
            .ok_or(ConsumerError::MissingTemporaryCredential)?;

        let token = find(parameters, "oauth_token")?;
        if !equals_constant_time(token.as_bytes(), request_token.token.as_bytes()) {
            tracing::warn!(received = token, "callback token does not match the pending request token");
            return Err(ConsumerError::TokenMismatch(token.to_string()));
        }
        let verifier = find(parameters, "oauth_verifier")?.to_string();
        Ok(TokenExchangeState::UserAuthorized {
            request_token,
            verifier,
        })
    }

    /// Third leg: trade an authorized request token for an access token.
    pub async fn exchange(
        &self,
        state: TokenExchangeState,
        cancel: &CancellationToken,
    ) -> Result<TokenExchangeState, ConsumerError> {
        let (request_token, verifier) = match state {
            TokenExchangeState::UserAuthorized {
                request_token,
                verifier,
            } => (request_token, verifier),
            authorized @ TokenExchangeState::Authorized(_) => return Ok(authorized),
            TokenExchangeState::Unauthorized(_) => {
                return Err(ProtocolError::MalformedMessage("request token is not authorized yet".into()).into());
            }
        };

        let request = OAuthRequest::post(self.endpoints.access_token_url.clone(), Vec::new());
        let signed = self.authorize_with(
            request,
            Some(&request_token),
            &OAuthNonce::generate(),
            &[("oauth_verifier", verifier.as_str())],
        )?;
        let response = self.send(signed, cancel).await?;
        let access_token = credentials_from(&response)?;
        self.temporary_credentials.clear().await?;
        tracing::info!(token = %access_token.token, "obtained access token");
        Ok(TokenExchangeState::Authorized(access_token))
    }

    /// Second and third legs together
    pub async fn process_user_authorization(
        &self,
        parameters: &[(String, String)],
        cancel: &CancellationToken,
    ) -> Result<Credentials, ConsumerError> {
        let state = self.receive_callback(parameters).await?;
        match self.exchange(state, cancel).await? {
            TokenExchangeState::Authorized(access_token) => Ok(access_token),
            _ => Err(ProtocolError::MalformedMessage("unexpected token exchange state".into()).into()),
        }
    }

    /// Send a signed token request and decode its form-encoded response
    async fn send(&self, signed: SignedRequest, cancel: &CancellationToken) -> Result<Vec<(String, String)>, ConsumerError> {
        let request = signed.into_direct_request(self.placement, self.realm.as_deref());
        let response = send_direct(self.transport.as_ref(), request, self.timeout, cancel).await?;
        let body = response.text()?;
        if response.status != 200 {
            tracing::warn!(status = response.status, "service provider refused token request");
            return Err(ConsumerError::RemoteError(format!("{}: {}", response.status, body.trim())));
        }
        Ok(url::form_urlencoded::parse(body.as_bytes()).into_owned().collect())
    }
}

fn find<'a>(parameters: &'a [(String, String)], name: &str) -> Result<&'a str, ProtocolError> {
    parameters
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
        .ok_or_else(|| ProtocolError::MissingParameter(name.to_string()))
}

fn credentials_from(parameters: &[(String, String)]) -> Result<Credentials, ProtocolError> {
    Ok(Credentials::new(
        find(parameters, "oauth_token")?,
        find(parameters, "oauth_token_secret")?,
    ))
}
