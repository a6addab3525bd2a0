//! Positive and negative assertions, verified by the relying party.

mod common;

use chrono::{Duration, Utc};
use http::Method;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

use common::{IDENTITY, association_store, authenticate, pairs, provider, provider_with_store, relying_party};
use signet::errors::{ConsumerError, NonceError, SignatureError};
use signet::nonce::ResponseNonce;
use signet::openid::key_value_form::Conformance;
use signet::openid::provider::{Handled, IncomingRequest, OpenIdProvider, ProviderResponse, ProviderSecuritySettings};
use signet::openid::relying_party::{AuthenticationResponse, CheckIdRequest, RelyingPartySettings};
use signet::openid::signing::{default_signed_order, sign_message};
use signet::openid::{Association, AssociationType, AssociationUsage, Message, Mode, ProtocolVersion};

const OP: &str = "https://op.example.com/openid";
const RETURN_TO: &str = "https://rp.example.com/return?session=7";

fn op() -> Url {
    Url::parse(OP).unwrap()
}

fn checkid(version: ProtocolVersion) -> CheckIdRequest {
    CheckIdRequest::new(op(), version, Url::parse(RETURN_TO).unwrap())
}

#[tokio::test]
async fn test_shared_association_assertion_cannot_be_replayed() {
    for encode_in_handles in [true, false] {
        let provider = provider(OP, ProviderSecuritySettings::default(), encode_in_handles);
        let rp = relying_party(provider.clone(), RelyingPartySettings::default());
        let cancel = CancellationToken::new();

        let association = rp
            .associate(&op(), ProtocolVersion::V2_0, &cancel)
            .await
            .unwrap()
            .unwrap();
        let assertion = authenticate(&provider, &rp, &checkid(ProtocolVersion::V2_0), true).await;
        let message = Message::from_parameters(assertion.query_pairs()).unwrap();
        assert_eq!(message.get("assoc_handle"), Some(association.handle()));

        let first = rp
            .verify_assertion(&assertion, pairs(&assertion), Some(&op()), &cancel)
            .await
            .unwrap();
        assert!(matches!(first, AuthenticationResponse::Authenticated(_)));

        let replay = rp
            .verify_assertion(&assertion, pairs(&assertion), Some(&op()), &cancel)
            .await;
        assert!(matches!(replay, Err(ConsumerError::Nonce(NonceError::Replayed))));
    }
}

#[tokio::test]
async fn test_stateless_relying_party_falls_back_to_check_authentication() {
    let provider = provider(OP, ProviderSecuritySettings::default(), true);
    let rp = relying_party(
        provider.clone(),
        RelyingPartySettings {
            stateless: true,
            ..Default::default()
        },
    );
    let cancel = CancellationToken::new();

    let assertion = authenticate(&provider, &rp, &checkid(ProtocolVersion::V2_0), true).await;
    let response = rp
        .verify_assertion(&assertion, pairs(&assertion), Some(&op()), &cancel)
        .await
        .unwrap();
    let AuthenticationResponse::Authenticated(verified) = response else {
        panic!("expected an authenticated response");
    };
    assert_eq!(verified.claimed_identifier.as_deref(), Some(IDENTITY));
    assert_eq!(verified.provider_endpoint, op());

    // The Provider confirms an assertion only once
    let replay = rp
        .verify_assertion(&assertion, pairs(&assertion), Some(&op()), &cancel)
        .await;
    assert!(matches!(replay, Err(ConsumerError::RemoteError(_))));
}

#[tokio::test]
async fn test_forged_identity_is_rejected() {
    let provider = provider(OP, ProviderSecuritySettings::default(), true);
    let rp = relying_party(provider.clone(), RelyingPartySettings::default());

    let assertion = authenticate(&provider, &rp, &checkid(ProtocolVersion::V2_0), true).await;
    let forged: Vec<(String, String)> = pairs(&assertion)
        .into_iter()
        .map(|(k, v)| match k.as_str() {
            "openid.claimed_id" | "openid.identity" => (k, "https://op.example.com/user/mallory".to_string()),
            _ => (k, v),
        })
        .collect();

    let result = rp
        .verify_assertion(&assertion, forged, Some(&op()), &CancellationToken::new())
        .await;
    assert!(matches!(
        result,
        Err(ConsumerError::Signature(SignatureError::Invalid))
    ));
}

#[tokio::test]
async fn test_openid11_round_trip() {
    let provider = provider(OP, ProviderSecuritySettings::default(), true);
    let rp = relying_party(provider.clone(), RelyingPartySettings::default());
    let request = checkid(ProtocolVersion::V1_1).with_identifier(IDENTITY, IDENTITY);

    let assertion = authenticate(&provider, &rp, &request, true).await;
    let message = Message::from_parameters(assertion.query_pairs()).unwrap();
    assert!(!message.contains("ns"));
    assert!(!message.contains("response_nonce"));

    let response = rp
        .verify_assertion(&assertion, pairs(&assertion), Some(&op()), &CancellationToken::new())
        .await
        .unwrap();
    let AuthenticationResponse::Authenticated(verified) = response else {
        panic!("expected an authenticated response");
    };
    assert_eq!(verified.version, ProtocolVersion::V1_1);
    assert_eq!(verified.local_identifier.as_deref(), Some(IDENTITY));
}

#[tokio::test]
async fn test_openid11_assertion_cannot_be_replayed() {
    let provider = provider(OP, ProviderSecuritySettings::default(), true);
    let rp = relying_party(provider.clone(), RelyingPartySettings::default());
    let cancel = CancellationToken::new();
    let request = checkid(ProtocolVersion::V1_1).with_identifier(IDENTITY, IDENTITY);

    let assertion = authenticate(&provider, &rp, &request, true).await;
    let first = rp
        .verify_assertion(&assertion, pairs(&assertion), Some(&op()), &cancel)
        .await
        .unwrap();
    assert!(matches!(first, AuthenticationResponse::Authenticated(_)));

    let replay = rp
        .verify_assertion(&assertion, pairs(&assertion), Some(&op()), &cancel)
        .await;
    assert!(matches!(replay, Err(ConsumerError::Nonce(NonceError::Replayed))));
}

/// An assertion the Provider sends without the relying party asking for it
async fn unsolicited_assertion(provider: &OpenIdProvider, version: ProtocolVersion) -> Url {
    let mut request = Message::with_mode(version, Mode::CheckIdSetup);
    request.set("return_to", RETURN_TO);
    if version >= ProtocolVersion::V2_0 {
        request.set("claimed_id", IDENTITY);
    }
    request.set("identity", IDENTITY);
    let url = request.to_url(&op());

    let incoming = IncomingRequest::new(Method::GET, url.clone(), pairs(&url));
    let Handled::Pending(mut pending) = provider.handle(&incoming).await.unwrap() else {
        panic!("expected a pending authentication request");
    };
    pending.set_authenticated(true);
    match provider.prepare_authentication_response(&mut pending).await.unwrap() {
        ProviderResponse::Redirect { location } => location,
        other => panic!("expected a redirect, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unsolicited_assertions() {
    let provider = provider(OP, ProviderSecuritySettings::default(), true);
    let cancel = CancellationToken::new();

    let accepting = relying_party(provider.clone(), RelyingPartySettings::default());
    let assertion = unsolicited_assertion(&provider, ProtocolVersion::V2_0).await;
    let response = accepting
        .verify_assertion(&assertion, pairs(&assertion), Some(&op()), &cancel)
        .await
        .unwrap();
    assert!(matches!(response, AuthenticationResponse::Authenticated(_)));

    let refusing = relying_party(
        provider.clone(),
        RelyingPartySettings {
            reject_unsolicited_assertions: true,
            ..Default::default()
        },
    );
    let assertion = unsolicited_assertion(&provider, ProtocolVersion::V2_0).await;
    let result = refusing
        .verify_assertion(&assertion, pairs(&assertion), Some(&op()), &cancel)
        .await;
    assert!(matches!(result, Err(ConsumerError::UnsolicitedAssertion)));

    // Without a request nonce a 1.x assertion could be replayed at will
    let assertion = unsolicited_assertion(&provider, ProtocolVersion::V1_1).await;
    let result = accepting
        .verify_assertion(&assertion, pairs(&assertion), Some(&op()), &cancel)
        .await;
    assert!(matches!(result, Err(ConsumerError::UnsolicitedAssertion)));
}

#[tokio::test]
async fn test_declined_immediate_request_needs_setup() {
    let provider = provider(OP, ProviderSecuritySettings::default(), true);
    let rp = relying_party(provider.clone(), RelyingPartySettings::default());

    let assertion = authenticate(&provider, &rp, &checkid(ProtocolVersion::V2_0).immediate(), false).await;
    let response = rp
        .verify_assertion(&assertion, pairs(&assertion), Some(&op()), &CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(response, AuthenticationResponse::SetupRequired { .. }));

    let assertion = authenticate(&provider, &rp, &checkid(ProtocolVersion::V2_0), false).await;
    let response = rp
        .verify_assertion(&assertion, pairs(&assertion), Some(&op()), &CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(response, AuthenticationResponse::Canceled));
}

#[tokio::test]
async fn test_check_authentication_for_expired_private_association() {
    let associations = association_store(true);
    let provider = provider_with_store(OP, ProviderSecuritySettings::default(), associations.clone());

    // A private association whose sealed expiry has passed
    let secret = vec![9u8; 32];
    let handle = associations
        .serialize(&secret, Utc::now() - Duration::seconds(1), AssociationUsage::Private)
        .await
        .unwrap();
    let lapsed = Association::new(
        handle.clone(),
        secret,
        AssociationType::HmacSha256,
        Utc::now() - Duration::minutes(10),
        Utc::now() + Duration::minutes(1),
        AssociationUsage::Private,
    )
    .unwrap();

    let mut assertion = Message::with_mode(ProtocolVersion::V2_0, Mode::IdRes);
    assertion.set("op_endpoint", OP);
    assertion.set("return_to", RETURN_TO);
    assertion.set("response_nonce", ResponseNonce::generate().to_string());
    assertion.set("claimed_id", IDENTITY);
    assertion.set("identity", IDENTITY);
    let order = default_signed_order(&assertion, ProtocolVersion::V2_0, true);
    sign_message(&mut assertion, &lapsed, &order).unwrap();
    assertion.set("mode", Mode::CheckAuthentication.as_str());

    let incoming = IncomingRequest::new(Method::POST, op(), assertion.to_parameters());
    let Handled::Response(ProviderResponse::Direct { status, body }) = provider.handle(&incoming).await.unwrap() else {
        panic!("expected a direct response");
    };
    assert_eq!(status, 200);
    let response = Message::from_key_value_form(&body, Conformance::OpenId20).unwrap();
    assert_eq!(response.get("is_valid"), Some("false"));
    assert_eq!(response.get("invalidate_handle"), Some(handle.as_str()));
}

#[tokio::test]
async fn test_shared_handle_is_not_confirmed_for_another_relying_party() {
    let provider = provider(OP, ProviderSecuritySettings::default(), true);
    let first = relying_party(provider.clone(), RelyingPartySettings::default());
    let second = relying_party(Arc::clone(&provider), RelyingPartySettings::default());
    let cancel = CancellationToken::new();

    let a = first.associate(&op(), ProtocolVersion::V2_0, &cancel).await.unwrap().unwrap();
    let b = second.associate(&op(), ProtocolVersion::V2_0, &cancel).await.unwrap().unwrap();
    assert_ne!(a.handle(), b.handle());

    let assertion = authenticate(&provider, &second, &checkid(ProtocolVersion::V2_0), true).await;

    // The first relying party does not hold the handle and must ask the
    // Provider, which only confirms assertions signed with private handles
    let result = first
        .verify_assertion(&assertion, pairs(&assertion), Some(&op()), &cancel)
        .await;
    assert!(matches!(
        result,
        Err(ConsumerError::Signature(SignatureError::Invalid))
    ));

    let response = second
        .verify_assertion(&assertion, pairs(&assertion), Some(&op()), &cancel)
        .await
        .unwrap();
    assert!(matches!(response, AuthenticationResponse::Authenticated(_)));
}
