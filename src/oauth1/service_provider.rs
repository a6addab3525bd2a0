//! OAuth 1.0a Service Provider: verifies signed requests and issues tokens.

use chrono::{Duration, Utc};
use std::sync::Arc;
use url::Url;

use super::OUT_OF_BAND_CALLBACK;
use super::base_string::signature_base_string;
use super::encoding::parse_authorization_header;
use super::signing::{SignatureMethod, SigningSecrets, verify};
use super::types::{ConsumerRecord, ServiceProviderToken, TokenKind};
use crate::crypto::{equals_constant_time, generate_token, random_alphanumeric};
use crate::errors::{ProtocolError, ServiceProviderError, SignatureError};
use crate::nonce::{NonceTracker, OAuthNonce};
use crate::storage::traits::{NonceStorage, ServiceProviderTokenStore};
use crate::transport::DirectRequest;

const VERIFIER_LEN: usize = 20;

/// A request whose signature, token and nonce checked out
#[derive(Clone, Debug)]
pub struct VerifiedRequest {
    pub consumer_key: String,
    pub token: Option<ServiceProviderToken>,
    /// `oauth_*` parameters from the header, query and body
    pub oauth_parameters: Vec<(String, String)>,
    /// Everything else from the query and body
    pub parameters: Vec<(String, String)>,
}

impl VerifiedRequest {
    pub fn oauth_parameter(&self, name: &str) -> Option<&str> {
        lookup(&self.oauth_parameters, name)
    }
}

pub struct ServiceProvider {
    store: Arc<dyn ServiceProviderTokenStore>,
    nonces: NonceTracker,
}

impl ServiceProvider {
    pub fn new(
        store: Arc<dyn ServiceProviderTokenStore>,
        nonce_storage: Arc<dyn NonceStorage>,
        max_nonce_age: Duration,
    ) -> Self {
        Self {
            store,
            nonces: NonceTracker::new(nonce_storage, max_nonce_age),
        }
    }

    pub async fn register_consumer(&self, consumer: ConsumerRecord) -> Result<(), ServiceProviderError> {
        self.store.store_consumer(&consumer).await?;
        tracing::info!(consumer_key = %consumer.consumer_key, "consumer registered");
        Ok(())
    }

    /// Verify a signed request.
    ///
    /// `expected` is the kind of token the request must carry, or `None` for
    /// requests made with consumer credentials only.
    pub async fn verify_request(
        &self,
        request: &DirectRequest,
        expected: Option<TokenKind>,
    ) -> Result<VerifiedRequest, ServiceProviderError> {
        let header_parameters = match request.header("Authorization") {
            Some(header) => parse_authorization_header(header)?,
            None => Vec::new(),
        };
        let query: Vec<(String, String)> = request.url.query_pairs().into_owned().collect();
        let body = request.form_parameters();

        let (mut oauth_parameters, parameters): (Vec<_>, Vec<_>) = query
            .into_iter()
            .chain(body.iter().cloned())
            .partition(|(k, _)| k.starts_with("oauth_"));
        oauth_parameters.extend(header_parameters.iter().cloned());

        if let Some(version) = lookup(&oauth_parameters, "oauth_version") {
            if version != super::OAUTH_VERSION {
                return Err(ProtocolError::InvalidParameter("oauth_version".into(), version.to_string()).into());
            }
        }
        let consumer_key = require(&oauth_parameters, "oauth_consumer_key")?;
        let method: SignatureMethod = require(&oauth_parameters, "oauth_signature_method")?.parse()?;
        let signature = require(&oauth_parameters, "oauth_signature")?;

        let consumer = self
            .store
            .get_consumer(consumer_key)
            .await?
            .ok_or_else(|| ServiceProviderError::UnknownConsumer(consumer_key.to_string()))?;

        let token = match (lookup(&oauth_parameters, "oauth_token"), expected) {
            (Some(token), Some(kind)) => Some(
                self.store
                    .get_token(token)
                    .await?
                    .filter(|t| t.kind == kind && t.consumer_key == consumer.consumer_key)
                    .ok_or_else(|| ServiceProviderError::InvalidToken(token.to_string()))?,
            ),
            (None, Some(_)) => return Err(ProtocolError::MissingParameter("oauth_token".into()).into()),
            (Some(token), None) => return Err(ServiceProviderError::InvalidToken(token.to_string())),
            (None, None) => None,
        };

        // The query is folded into the base string from the URL itself
        let signed: Vec<(String, String)> = header_parameters.into_iter().chain(body).collect();
        let base_string = signature_base_string(request.method.as_str(), &request.url, &signed);
        let secrets = SigningSecrets {
            rsa_public_key: consumer.rsa_public_key.as_ref(),
            ..SigningSecrets::shared(
                &consumer.consumer_secret,
                token.as_ref().map(|t| t.secret.as_str()).unwrap_or_default(),
            )
        };
        if !verify(method, &base_string, signature, secrets) {
            tracing::warn!(consumer_key = %consumer.consumer_key, %method, "request signature rejected");
            return Err(SignatureError::Invalid.into());
        }

        // Checked after the signature so forged requests cannot burn nonces
        if method.signs_base_string() || lookup(&oauth_parameters, "oauth_nonce").is_some() {
            let timestamp: i64 = require(&oauth_parameters, "oauth_timestamp")?
                .parse()
                .map_err(|_| ProtocolError::InvalidParameter("oauth_timestamp".into(), "not an integer".into()))?;
            let nonce = OAuthNonce::new(require(&oauth_parameters, "oauth_nonce")?, timestamp);
            self.nonces
                .check_oauth_nonce(&consumer.consumer_key, &nonce)
                .await?
                .into_result()?;
        }

        Ok(VerifiedRequest {
            consumer_key: consumer.consumer_key,
            token,
            oauth_parameters,
            parameters,
        })
    }

    /// Temporary credential request
    pub async fn issue_request_token(&self, request: &DirectRequest) -> Result<ServiceProviderToken, ServiceProviderError> {
        let verified = self.verify_request(request, None).await?;
        let callback = verified
            .oauth_parameter("oauth_callback")
            .ok_or_else(|| ProtocolError::MissingParameter("oauth_callback".into()))?;
        if callback != OUT_OF_BAND_CALLBACK && Url::parse(callback).is_err() {
            return Err(ProtocolError::InvalidParameter("oauth_callback".into(), callback.to_string()).into());
        }

        let token = ServiceProviderToken {
            token: generate_token(),
            secret: generate_token(),
            consumer_key: verified.consumer_key.clone(),
            kind: TokenKind::Request,
            callback: Some(callback.to_string()),
            verifier: None,
            authorized_user: None,
            issued_at: Utc::now(),
        };
        self.store.store_token(&token).await?;
        tracing::debug!(consumer_key = %token.consumer_key, "request token issued");
        Ok(token)
    }

    /// Record that `user` authorized the request token. The returned record
    /// carries the verifier the consumer must present with the access token
    /// request; see [`callback_url`].
    pub async fn authorize_request_token(
        &self,
        token: &str,
        user: &str,
    ) -> Result<ServiceProviderToken, ServiceProviderError> {
        let mut request_token = self
            .store
            .get_token(token)
            .await?
            .filter(|t| t.kind == TokenKind::Request)
            .ok_or_else(|| ServiceProviderError::InvalidToken(token.to_string()))?;

        request_token.verifier = Some(random_alphanumeric(VERIFIER_LEN));
        request_token.authorized_user = Some(user.to_string());
        self.store.store_token(&request_token).await?;
        tracing::info!(consumer_key = %request_token.consumer_key, user, "request token authorized");
        Ok(request_token)
    }

    /// Token credential request: trade an authorized request token for an access token
    pub async fn issue_access_token(&self, request: &DirectRequest) -> Result<ServiceProviderToken, ServiceProviderError> {
        let verified = self.verify_request(request, Some(TokenKind::Request)).await?;
        let Some(request_token) = verified.token.as_ref() else {
            return Err(ProtocolError::MissingParameter("oauth_token".into()).into());
        };
        if !request_token.is_authorized() {
            return Err(ServiceProviderError::InvalidToken(request_token.token.clone()));
        }
        let verifier = verified
            .oauth_parameter("oauth_verifier")
            .ok_or_else(|| ProtocolError::MissingParameter("oauth_verifier".into()))?;
        match &request_token.verifier {
            Some(expected) if equals_constant_time(expected.as_bytes(), verifier.as_bytes()) => {}
            _ => {
                tracing::warn!(consumer_key = %verified.consumer_key, "access token request with wrong verifier");
                return Err(ServiceProviderError::VerifierMismatch);
            }
        }

        // Request tokens are single use; only the exchange that removes it wins
        if !self.store.remove_token(&request_token.token).await? {
            tracing::warn!(consumer_key = %verified.consumer_key, "request token already exchanged");
            return Err(ServiceProviderError::InvalidToken(request_token.token.clone()));
        }
        let access_token = ServiceProviderToken {
            token: generate_token(),
            secret: generate_token(),
            consumer_key: verified.consumer_key.clone(),
            kind: TokenKind::Access,
            callback: None,
            verifier: None,
            authorized_user: request_token.authorized_user.clone(),
            issued_at: Utc::now(),
        };
        self.store.store_token(&access_token).await?;
        tracing::info!(consumer_key = %access_token.consumer_key, "access token issued");
        Ok(access_token)
    }

    /// Verify a request for a protected resource
    pub async fn verify_access(&self, request: &DirectRequest) -> Result<VerifiedRequest, ServiceProviderError> {
        self.verify_request(request, Some(TokenKind::Access)).await
    }
}

/// Form-encoded body answering a token request
pub fn token_response(token: &ServiceProviderToken) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    serializer
        .append_pair("oauth_token", &token.token)
        .append_pair("oauth_token_secret", &token.secret);
    if token.kind == TokenKind::Request {
        serializer.append_pair("oauth_callback_confirmed", "true");
    }
    serializer.finish()
}

/// Where to send the user after authorization; `None` for out-of-band consumers
pub fn callback_url(token: &ServiceProviderToken) -> Option<Url> {
    let callback = token.callback.as_deref().filter(|c| *c != OUT_OF_BAND_CALLBACK)?;
    let verifier = token.verifier.as_deref()?;
    let mut url = Url::parse(callback).ok()?;
    url.query_pairs_mut()
        .append_pair("oauth_token", &token.token)
        .append_pair("oauth_verifier", verifier);
    Some(url)
}

fn lookup<'a>(parameters: &'a [(String, String)], name: &str) -> Option<&'a str> {
    parameters
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

fn require<'a>(parameters: &'a [(String, String)], name: &str) -> Result<&'a str, ProtocolError> {
    lookup(parameters, name).ok_or_else(|| ProtocolError::MissingParameter(name.to_string()))
}
