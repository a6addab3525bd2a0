//! Answering `associate` requests.

use base64::{Engine, prelude::BASE64_STANDARD};

use super::request::AssociateRequest;
use super::response::ProviderResponse;
use super::settings::ProviderSecuritySettings;
use crate::errors::{ProtocolError, ProviderError};
use crate::openid::association::{Association, AssociationUsage};
use crate::openid::association_store::ProviderAssociationStore;
use crate::openid::diffie_hellman::{DiffieHellman, btwoc, encrypt_association_secret, from_btwoc};
use crate::openid::message::Message;
use crate::openid::protocol::{AssociationType, ProtocolVersion, SessionType, UNSUPPORTED_TYPE_ERROR_CODE};

pub(crate) async fn respond(
    request: &AssociateRequest,
    settings: &ProviderSecuritySettings,
    associations: &dyn ProviderAssociationStore,
) -> Result<ProviderResponse, ProviderError> {
    let message = &request.message;
    let version = request.version;

    let association_type = message.require("assoc_type")?.parse::<AssociationType>();
    let session_type = SessionType::parse(message.get("session_type"), version, settings.openid11_lenient);

    let (association_type, session_type) = match (association_type, session_type) {
        (Ok(association_type), Ok(session_type))
            if settings.is_permitted(association_type, version)
                && session_type.is_compatible_with(association_type)
                && (session_type != SessionType::NoEncryption || request.secure) =>
        {
            (association_type, session_type)
        }
        (_, session_type) => {
            tracing::info!(
                assoc_type = message.get("assoc_type"),
                session_type = message.get("session_type"),
                secure = request.secure,
                "refusing association type"
            );
            return unsupported(request, settings, session_type.ok());
        }
    };

    // Agree on the mask before anything is persisted
    let diffie_hellman = match session_type {
        SessionType::NoEncryption => None,
        _ => {
            let modulus = decode_optional(message, "dh_modulus")?;
            let generator = decode_optional(message, "dh_gen")?;
            let consumer_public = from_btwoc(&decode(message, "dh_consumer_public")?);
            let exchange = DiffieHellman::from_advertised(modulus.as_deref(), generator.as_deref())?;
            let shared_secret = exchange.derive_shared_secret(&consumer_public)?;
            Some((exchange, shared_secret))
        }
    };

    let association = Association::create(
        associations,
        association_type,
        AssociationUsage::Shared,
        settings.shared_association_lifetime,
    )
    .await?;

    let mut response = Message::new();
    if let Some(namespace) = version.namespace() {
        response.set("ns", namespace);
    }
    response.set("assoc_handle", association.handle());
    response.set("assoc_type", association_type.as_str());
    response.set("expires_in", association.seconds_until_expiration().to_string());
    let session_name = session_type.as_str(version);
    if !session_name.is_empty() {
        response.set("session_type", session_name);
    }

    match (diffie_hellman, session_type.hash_algorithm()) {
        (Some((exchange, shared_secret)), Some(hash)) => {
            let encrypted = encrypt_association_secret(&shared_secret, association.secret(), hash)?;
            response.set("dh_server_public", BASE64_STANDARD.encode(btwoc(exchange.public_value())));
            response.set("enc_mac_key", BASE64_STANDARD.encode(encrypted));
        }
        _ => response.set("mac_key", BASE64_STANDARD.encode(association.secret())),
    }

    tracing::debug!(
        assoc_type = association_type.as_str(),
        session_type = ?session_type,
        expires_in = association.seconds_until_expiration(),
        "association created"
    );
    Ok(ProviderResponse::direct(200, &response)?)
}

/// Unsuccessful response suggesting what the Provider would accept instead.
///
/// OpenID 1.x has no such response, so those peers get a plain error.
fn unsupported(
    request: &AssociateRequest,
    settings: &ProviderSecuritySettings,
    requested_session: Option<SessionType>,
) -> Result<ProviderResponse, ProviderError> {
    let version = request.version;
    let mut response = Message::new();
    response.set("error", "The requested association type is not supported");

    if version == ProtocolVersion::V2_0 {
        if let Some(namespace) = version.namespace() {
            response.set("ns", namespace);
        }
        response.set("error_code", UNSUPPORTED_TYPE_ERROR_CODE);
        if let Some((association_type, session_type)) =
            settings.suggestion(version, request.secure, requested_session)
        {
            response.set("assoc_type", association_type.as_str());
            response.set("session_type", session_type.as_str(version));
        }
    }
    Ok(ProviderResponse::direct(400, &response)?)
}

fn decode(message: &Message, name: &str) -> Result<Vec<u8>, ProtocolError> {
    let value = message.require(name)?;
    BASE64_STANDARD
        .decode(value)
        .map_err(|e| ProtocolError::InvalidParameter(format!("openid.{name}"), e.to_string()))
}

fn decode_optional(message: &Message, name: &str) -> Result<Option<Vec<u8>>, ProtocolError> {
    match message.get(name) {
        None => Ok(None),
        Some(_) => decode(message, name).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openid::association_store::KeyStorageAssociationStore;
    use crate::openid::diffie_hellman::decrypt_association_secret;
    use crate::openid::protocol::{Mode, OPENID2_NAMESPACE};
    use crate::openid::provider::request::RequestState;
    use crate::storage::inmemory::MemoryProviderStorage;
    use std::sync::Arc;

    fn store() -> KeyStorageAssociationStore {
        KeyStorageAssociationStore::new(Arc::new(MemoryProviderStorage::new()))
    }

    fn request(secure: bool, fields: &[(&str, &str)]) -> AssociateRequest {
        let mut message = Message::with_mode(ProtocolVersion::V2_0, Mode::Associate);
        for (name, value) in fields {
            message.set(*name, *value);
        }
        AssociateRequest {
            version: message.version().unwrap(),
            message,
            secure,
            state: RequestState::ResponseReady,
        }
    }

    async fn answer(request: &AssociateRequest) -> (u16, Message) {
        let response = respond(request, &ProviderSecuritySettings::default(), &store())
            .await
            .unwrap();
        (response.status(), response.to_message().unwrap())
    }

    #[tokio::test]
    async fn test_plaintext_session_over_https() {
        let (status, response) = answer(&request(
            true,
            &[("assoc_type", "HMAC-SHA1"), ("session_type", "no-encryption")],
        ))
        .await;

        assert_eq!(status, 200);
        assert_eq!(response.get("ns"), Some(OPENID2_NAMESPACE));
        assert_eq!(response.get("assoc_type"), Some("HMAC-SHA1"));
        assert_eq!(response.get("session_type"), Some("no-encryption"));
        let mac_key = BASE64_STANDARD.decode(response.get("mac_key").unwrap()).unwrap();
        assert_eq!(mac_key.len(), 20);
        assert!(response.get("expires_in").unwrap().parse::<i64>().unwrap() > 0);
        assert!(!response.contains("enc_mac_key"));
    }

    #[tokio::test]
    async fn test_plaintext_session_refused_over_http() {
        let (status, response) = answer(&request(
            false,
            &[("assoc_type", "HMAC-SHA1"), ("session_type", "no-encryption")],
        ))
        .await;

        assert_eq!(status, 400);
        assert_eq!(response.get("error_code"), Some(UNSUPPORTED_TYPE_ERROR_CODE));
        assert_eq!(response.get("assoc_type"), Some("HMAC-SHA256"));
        assert_eq!(response.get("session_type"), Some("DH-SHA256"));
        assert!(!response.contains("mac_key"));
    }

    #[tokio::test]
    async fn test_diffie_hellman_session() {
        let consumer = DiffieHellman::with_defaults();
        let consumer_public = BASE64_STANDARD.encode(btwoc(consumer.public_value()));
        let (status, response) = answer(&request(
            false,
            &[
                ("assoc_type", "HMAC-SHA256"),
                ("session_type", "DH-SHA256"),
                ("dh_consumer_public", consumer_public.as_str()),
            ],
        ))
        .await;

        assert_eq!(status, 200);
        assert!(!response.contains("mac_key"));
        let server_public = from_btwoc(
            &BASE64_STANDARD
                .decode(response.get("dh_server_public").unwrap())
                .unwrap(),
        );
        let shared = consumer.derive_shared_secret(&server_public).unwrap();
        let encrypted = BASE64_STANDARD.decode(response.get("enc_mac_key").unwrap()).unwrap();
        let secret = decrypt_association_secret(&shared, &encrypted, crate::crypto::HashAlgorithm::Sha256).unwrap();
        assert_eq!(secret.len(), 32);
    }

    #[tokio::test]
    async fn test_mismatched_session_hash_is_refused() {
        let consumer = DiffieHellman::with_defaults();
        let consumer_public = BASE64_STANDARD.encode(btwoc(consumer.public_value()));
        let (status, response) = answer(&request(
            false,
            &[
                ("assoc_type", "HMAC-SHA256"),
                ("session_type", "DH-SHA1"),
                ("dh_consumer_public", consumer_public.as_str()),
            ],
        ))
        .await;
        assert_eq!(status, 400);
        assert_eq!(response.get("session_type"), Some("DH-SHA256"));
    }

    #[tokio::test]
    async fn test_unknown_type_suggests_alternative() {
        let (status, response) = answer(&request(
            true,
            &[("assoc_type", "HMAC-MD5"), ("session_type", "no-encryption")],
        ))
        .await;
        assert_eq!(status, 400);
        assert_eq!(response.get("assoc_type"), Some("HMAC-SHA256"));
        assert_eq!(response.get("session_type"), Some("no-encryption"));
    }

    #[tokio::test]
    async fn test_bad_public_value_is_an_error() {
        let result = respond(
            &request(
                false,
                &[
                    ("assoc_type", "HMAC-SHA1"),
                    ("session_type", "DH-SHA1"),
                    ("dh_consumer_public", "AQ=="),
                ],
            ),
            &ProviderSecuritySettings::default(),
            &store(),
        )
        .await;
        assert!(matches!(
            result,
            Err(ProviderError::Protocol(ProtocolError::InvalidDiffieHellmanValue(_)))
        ));
    }
}
