//! OAuth 1.0a signing and the three-legged token exchange.

mod common;

use chrono::Duration;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

use common::ServiceProviderTransport;
use signet::errors::ConsumerError;
use signet::nonce::OAuthNonce;
use signet::oauth1::{
    Consumer, ConsumerRecord, Credentials, OAuthRequest, ParameterPlacement, ServiceProvider,
    ServiceProviderEndpoints, TokenExchangeState, callback_url, signature_base_string,
};
use signet::storage::{MemoryNonceStorage, MemoryServiceProviderStorage, MemoryTemporaryCredentialStore};
use signet::transport::HttpTransport;

const EXPECTED_BASE_STRING: &str = "GET&http%3A%2F%2Fexample.com%2Fresource&foo%3Dbar%26oauth_consumer_key%3Dck%26oauth_nonce%3Dabcdefgh%26oauth_signature_method%3DHMAC-SHA1%26oauth_timestamp%3D1234567890%26oauth_token%3Drt%26oauth_version%3D1.0";

fn endpoints(base: &str) -> ServiceProviderEndpoints {
    let base = Url::parse(base).unwrap();
    ServiceProviderEndpoints {
        request_token_url: base.join("/request_token").unwrap(),
        user_authorization_url: base.join("/authorize").unwrap(),
        access_token_url: base.join("/access_token").unwrap(),
    }
}

fn service_provider() -> Arc<ServiceProvider> {
    Arc::new(ServiceProvider::new(
        Arc::new(MemoryServiceProviderStorage::new()),
        Arc::new(MemoryNonceStorage::new()),
        Duration::minutes(13),
    ))
}

fn consumer(service_provider: Arc<ServiceProvider>) -> Consumer {
    Consumer::new(
        Credentials::new("ck", "cs"),
        endpoints("https://sp.example.com/"),
        Arc::new(ServiceProviderTransport { service_provider }),
        Arc::new(MemoryTemporaryCredentialStore::new()),
    )
}

#[tokio::test]
async fn test_fixed_vector_signature() {
    let consumer = consumer(service_provider());
    let request = OAuthRequest::get(Url::parse("http://example.com/resource?foo=bar").unwrap());
    let signed = consumer
        .authorize_with(
            request,
            Some(&Credentials::new("rt", "rts")),
            &OAuthNonce::new("abcdefgh", 1234567890),
            &[],
        )
        .unwrap();

    assert_eq!(signed.base_string, EXPECTED_BASE_STRING);
    assert_eq!(signed.signature(), Some("rzX9x3P/CHqJwYQqO7NqmW1aock="));
    assert!(
        signed
            .authorization_header(None)
            .contains(r#"oauth_signature="rzX9x3P%2FCHqJwYQqO7NqmW1aock%3D""#)
    );
}

#[test]
fn test_base_string_ignores_parameter_order() {
    let url = Url::parse("http://example.com/resource?foo=bar").unwrap();
    let mut parameters: Vec<(String, String)> = [
        ("oauth_consumer_key", "ck"),
        ("oauth_nonce", "abcdefgh"),
        ("oauth_signature_method", "HMAC-SHA1"),
        ("oauth_timestamp", "1234567890"),
        ("oauth_token", "rt"),
        ("oauth_version", "1.0"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let forward = signature_base_string("GET", &url, &parameters);
    parameters.reverse();
    let reversed = signature_base_string("get", &url, &parameters);
    assert_eq!(forward, EXPECTED_BASE_STRING);
    assert_eq!(forward, reversed);
}

#[tokio::test]
async fn test_three_legged_exchange() {
    let service_provider = service_provider();
    service_provider
        .register_consumer(ConsumerRecord {
            consumer_key: "ck".into(),
            consumer_secret: "cs".into(),
            rsa_public_key: None,
        })
        .await
        .unwrap();
    let consumer = consumer(service_provider.clone()).with_placement(ParameterPlacement::FormBody);
    let cancel = CancellationToken::new();
    let callback = Url::parse("https://consumer.example.com/callback").unwrap();

    // First leg
    let authorize_url = consumer
        .request_user_authorization(Some(&callback), &cancel)
        .await
        .unwrap();
    let request_token = authorize_url
        .query_pairs()
        .find(|(k, _)| k == "oauth_token")
        .map(|(_, v)| v.into_owned())
        .unwrap();

    // The user approves at the Service Provider and is sent back
    let authorized = service_provider
        .authorize_request_token(&request_token, "alice")
        .await
        .unwrap();
    let back = callback_url(&authorized).unwrap();
    assert!(back.as_str().starts_with(callback.as_str()));

    // Second and third legs
    let callback_parameters: Vec<(String, String)> = back.query_pairs().into_owned().collect();
    let access_token = consumer
        .process_user_authorization(&callback_parameters, &cancel)
        .await
        .unwrap();
    assert_ne!(access_token.token, request_token);

    // The access token opens protected resources
    let transport = ServiceProviderTransport {
        service_provider: service_provider.clone(),
    };
    let resource = OAuthRequest::get(Url::parse("https://sp.example.com/photos?size=original").unwrap());
    let request = consumer
        .authorize(resource, Some(&access_token))
        .unwrap()
        .into_direct_request(ParameterPlacement::AuthorizationHeader, None);
    let response = transport.send(request.clone()).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.text().unwrap(), "hello alice");

    // The same signed request cannot be replayed
    let replay = transport.send(request).await.unwrap();
    assert_eq!(replay.status, 401);
}

#[tokio::test]
async fn test_unregistered_consumer_is_refused() {
    let consumer = consumer(service_provider());
    let result = consumer
        .obtain_request_token(None, &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(ConsumerError::RemoteError(_))));
}

#[tokio::test]
async fn test_callback_for_another_token_is_refused() {
    let service_provider = service_provider();
    service_provider
        .register_consumer(ConsumerRecord {
            consumer_key: "ck".into(),
            consumer_secret: "cs".into(),
            rsa_public_key: None,
        })
        .await
        .unwrap();
    let consumer = consumer(service_provider);
    let cancel = CancellationToken::new();

    let state = consumer.obtain_request_token(None, &cancel).await.unwrap();
    assert!(matches!(state, TokenExchangeState::Unauthorized(_)));

    let forged = vec![
        ("oauth_token".to_string(), "someone-elses".to_string()),
        ("oauth_verifier".to_string(), "v".to_string()),
    ];
    assert!(matches!(
        consumer.process_user_authorization(&forged, &cancel).await,
        Err(ConsumerError::TokenMismatch(_))
    ));
}
