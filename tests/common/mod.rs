//! In-process plumbing shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Duration;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

use signet::errors::TransportError;
use signet::oauth1::{ServiceProvider, token_response};
use signet::openid::provider::{
    Handled, IncomingRequest, OpenIdProvider, ProviderResponse, ProviderSecuritySettings,
};
use signet::openid::relying_party::{CheckIdRequest, RelyingPartySettings};
use signet::openid::{ProviderAssociationStore, RelyingParty, association_store_for};
use signet::storage::{
    MemoryNonceStorage, MemoryRelyingPartyAssociationStore, StorageBackend, create_storage_backend,
};
use signet::transport::{DirectRequest, DirectResponse, HttpTransport};

pub const IDENTITY: &str = "https://op.example.com/user/alice";

/// Answers direct requests by handing them to an in-process Provider
pub struct ProviderTransport {
    pub provider: Arc<OpenIdProvider>,
}

#[async_trait]
impl HttpTransport for ProviderTransport {
    async fn send(&self, request: DirectRequest) -> Result<DirectResponse, TransportError> {
        let incoming = IncomingRequest::new(request.method.clone(), request.url.clone(), request.form_parameters());
        match self.provider.handle(&incoming).await {
            Ok(Handled::Response(ProviderResponse::Direct { status, body })) => Ok(DirectResponse::new(status, body)),
            other => Err(TransportError::InvalidResponse(format!("{other:?}"))),
        }
    }
}

pub fn association_store(encode_in_handles: bool) -> Arc<dyn ProviderAssociationStore> {
    let stores = create_storage_backend(StorageBackend::Memory);
    association_store_for(encode_in_handles, stores.secrets, stores.keys, Duration::days(30))
}

pub fn provider_with_store(
    endpoint: &str,
    settings: ProviderSecuritySettings,
    associations: Arc<dyn ProviderAssociationStore>,
) -> Arc<OpenIdProvider> {
    Arc::new(OpenIdProvider::new(
        Url::parse(endpoint).unwrap(),
        settings,
        associations,
        Arc::new(MemoryNonceStorage::new()),
    ))
}

pub fn provider(endpoint: &str, settings: ProviderSecuritySettings, encode_in_handles: bool) -> Arc<OpenIdProvider> {
    provider_with_store(endpoint, settings, association_store(encode_in_handles))
}

pub fn relying_party(provider: Arc<OpenIdProvider>, settings: RelyingPartySettings) -> RelyingParty {
    RelyingParty::new(
        Arc::new(ProviderTransport { provider }),
        Arc::new(MemoryRelyingPartyAssociationStore::new()),
        Arc::new(MemoryNonceStorage::new()),
        settings,
    )
}

/// The user agent leg: follow the relying party's redirect to the Provider,
/// let the user decide, and return where the Provider sends them back to.
pub async fn authenticate(
    provider: &OpenIdProvider,
    rp: &RelyingParty,
    request: &CheckIdRequest,
    approve: bool,
) -> Url {
    let url = rp.create_request_url(request, &CancellationToken::new()).await.unwrap();
    let incoming = IncomingRequest::new(http::Method::GET, url.clone(), url.query_pairs().into_owned().collect());
    let Handled::Pending(mut pending) = provider.handle(&incoming).await.unwrap() else {
        panic!("expected a pending authentication request");
    };
    pending.set_authenticated(approve);
    if approve && pending.is_directed_identity() {
        pending.set_claimed_identifier(IDENTITY, IDENTITY).unwrap();
    }
    match provider.prepare_authentication_response(&mut pending).await.unwrap() {
        ProviderResponse::Redirect { location } => location,
        other => panic!("expected a redirect, got {other:?}"),
    }
}

pub fn pairs(url: &Url) -> Vec<(String, String)> {
    url.query_pairs().into_owned().collect()
}

/// Routes consumer requests to an in-process Service Provider by path
pub struct ServiceProviderTransport {
    pub service_provider: Arc<ServiceProvider>,
}

#[async_trait]
impl HttpTransport for ServiceProviderTransport {
    async fn send(&self, request: DirectRequest) -> Result<DirectResponse, TransportError> {
        let result = match request.url.path() {
            "/request_token" => self
                .service_provider
                .issue_request_token(&request)
                .await
                .map(|token| token_response(&token)),
            "/access_token" => self
                .service_provider
                .issue_access_token(&request)
                .await
                .map(|token| token_response(&token)),
            _ => self
                .service_provider
                .verify_access(&request)
                .await
                .map(|verified| format!("hello {}", verified.token.and_then(|t| t.authorized_user).unwrap_or_default())),
        };
        Ok(match result {
            Ok(body) => DirectResponse::new(200, body),
            Err(error) => DirectResponse::new(401, format!("oauth_problem={error}")),
        })
    }
}
