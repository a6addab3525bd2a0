//! Signatures over OpenID indirect messages.
//!
//! The `signed` field lists, in order, the unprefixed names covered by `sig`.
//! The payload is those fields rendered as `name:value\n` in exactly that
//! order, so verifiers always replay the sender's order.

use base64::{Engine, prelude::BASE64_STANDARD};

use super::association::Association;
use super::key_value_form;
use super::message::Message;
use super::protocol::ProtocolVersion;
use crate::errors::{AssociationError, ProtocolError};

/// Fields that belong to the authentication protocol itself. Everything else
/// in an assertion is an extension field.
const CORE_FIELDS: &[&str] = &[
    "ns",
    "mode",
    "op_endpoint",
    "claimed_id",
    "identity",
    "return_to",
    "response_nonce",
    "invalidate_handle",
    "assoc_handle",
    "signed",
    "sig",
    "user_setup_url",
];

/// Names listed in the message's `signed` field
pub fn signed_fields(message: &Message) -> Result<Vec<String>, ProtocolError> {
    let signed = message.require("signed")?;
    let fields: Vec<String> = signed.split(',').map(str::to_string).collect();
    if fields.iter().any(String::is_empty) {
        return Err(ProtocolError::InvalidParameter(
            "openid.signed".into(),
            "empty field name".into(),
        ));
    }
    Ok(fields)
}

/// `name:value\n` for each name in `order`. A listed field that is absent is malformed.
pub fn build_signed_payload<S: AsRef<str>>(message: &Message, order: &[S]) -> Result<String, ProtocolError> {
    let pairs = order
        .iter()
        .map(|name| {
            let name = name.as_ref();
            message.require(name).map(|value| (name, value))
        })
        .collect::<Result<Vec<_>, _>>()?;
    key_value_form::encode(pairs)
}

/// Sign `message` with `association` over `order`, setting `assoc_handle`, `signed` and `sig`.
pub fn sign_message<S: AsRef<str>>(
    message: &mut Message,
    association: &Association,
    order: &[S],
) -> Result<(), AssociationError> {
    message.set("assoc_handle", association.handle());
    let order: Vec<&str> = order.iter().map(AsRef::as_ref).collect();
    message.set("signed", order.join(","));

    let payload = build_signed_payload(message, &order)?;
    let signature = association.sign(payload.as_bytes())?;
    message.set("sig", BASE64_STANDARD.encode(signature));
    Ok(())
}

/// Recompute `sig` over the message's own `signed` order.
///
/// Any mismatch, including an undecodable `sig`, is `Ok(false)`.
pub fn verify_message(message: &Message, association: &Association) -> Result<bool, AssociationError> {
    let order = signed_fields(message)?;
    let Ok(payload) = build_signed_payload(message, &order) else {
        return Ok(false);
    };
    let Some(signature) = message
        .get("sig")
        .and_then(|sig| BASE64_STANDARD.decode(sig).ok())
    else {
        return Ok(false);
    };
    association.verify(payload.as_bytes(), &signature)
}

/// Extension fields present in the message, in name order
pub fn extension_fields(message: &Message) -> Vec<String> {
    message
        .iter()
        .map(|(name, _)| name)
        .filter(|name| !CORE_FIELDS.contains(name))
        .map(str::to_string)
        .collect()
}

/// Signed order for an outgoing positive assertion.
///
/// `assoc_handle` is always listed because [`sign_message`] sets it.
pub fn default_signed_order(
    message: &Message,
    version: ProtocolVersion,
    sign_extensions: bool,
) -> Vec<String> {
    let mut order: Vec<String> = match version {
        ProtocolVersion::V2_0 => ["op_endpoint", "return_to", "response_nonce", "assoc_handle"]
            .into_iter()
            .chain(["claimed_id", "identity"].into_iter().filter(|f| message.contains(f)))
            .map(str::to_string)
            .collect(),
        ProtocolVersion::V1_1 => ["mode", "identity", "return_to"]
            .into_iter()
            .filter(|f| message.contains(f))
            .map(str::to_string)
            .collect(),
    };
    if sign_extensions {
        order.extend(extension_fields(message));
    }
    order
}

/// Reject assertions that leave any protected field outside the signature.
pub fn ensure_required_fields_signed(message: &Message, version: ProtocolVersion) -> Result<(), ProtocolError> {
    let signed = signed_fields(message)?;
    let required: &[&str] = match version {
        ProtocolVersion::V2_0 => &["op_endpoint", "return_to", "response_nonce", "assoc_handle"],
        ProtocolVersion::V1_1 => &["return_to"],
    };
    let conditional = ["claimed_id", "identity"]
        .into_iter()
        .filter(|f| message.contains(f));

    for field in required.iter().copied().chain(conditional) {
        if !signed.iter().any(|s| s == field) {
            tracing::warn!(field, "assertion leaves a protected field unsigned");
            return Err(ProtocolError::UnsignedRequiredParameter(field.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openid::association::AssociationUsage;
    use crate::openid::protocol::{AssociationType, Mode};
    use chrono::{Duration, Utc};

    fn association() -> Association {
        Association::new(
            "handle-1",
            vec![9u8; 32],
            AssociationType::HmacSha256,
            Utc::now(),
            Utc::now() + Duration::minutes(5),
            AssociationUsage::Shared,
        )
        .unwrap()
    }

    fn assertion() -> Message {
        let mut message = Message::with_mode(ProtocolVersion::V2_0, Mode::IdRes);
        message.set("op_endpoint", "https://op.example.com/openid");
        message.set("return_to", "https://rp.example.com/return");
        message.set("response_nonce", "2024-01-01T00:00:00Zabcdefgh");
        message.set("claimed_id", "https://op.example.com/user/alice");
        message.set("identity", "https://op.example.com/user/alice");
        message.set("ns.sreg", "http://openid.net/extensions/sreg/1.1");
        message.set("sreg.nickname", "alice");
        message
    }

    #[test]
    fn test_payload_follows_given_order() {
        let message = assertion();
        let payload = build_signed_payload(&message, &["return_to", "op_endpoint"]).unwrap();
        assert_eq!(
            payload,
            "return_to:https://rp.example.com/return\nop_endpoint:https://op.example.com/openid\n"
        );
        assert!(build_signed_payload(&message, &["missing"]).is_err());
    }

    #[test]
    fn test_sign_then_verify() {
        let association = association();
        let mut message = assertion();
        let order = default_signed_order(&message, ProtocolVersion::V2_0, true);
        sign_message(&mut message, &association, &order).unwrap();

        assert_eq!(
            message.get("signed"),
            Some("op_endpoint,return_to,response_nonce,assoc_handle,claimed_id,identity,ns.sreg,sreg.nickname")
        );
        assert!(verify_message(&message, &association).unwrap());
        ensure_required_fields_signed(&message, ProtocolVersion::V2_0).unwrap();
    }

    #[test]
    fn test_tampering_is_detected() {
        let association = association();
        let mut message = assertion();
        let order = default_signed_order(&message, ProtocolVersion::V2_0, false);
        sign_message(&mut message, &association, &order).unwrap();

        let mut altered = message.clone();
        altered.set("claimed_id", "https://op.example.com/user/mallory");
        assert!(!verify_message(&altered, &association).unwrap());

        let mut reordered = message.clone();
        reordered.set(
            "signed",
            "return_to,op_endpoint,response_nonce,assoc_handle,claimed_id,identity",
        );
        assert!(!verify_message(&reordered, &association).unwrap());

        let mut garbled = message;
        garbled.set("sig", "not base64!");
        assert!(!verify_message(&garbled, &association).unwrap());
    }

    #[test]
    fn test_unsigned_extension_ignored_when_not_signing_extensions() {
        let message = assertion();
        let order = default_signed_order(&message, ProtocolVersion::V2_0, false);
        assert!(!order.iter().any(|f| f.starts_with("sreg")));
        assert_eq!(extension_fields(&message), vec!["ns.sreg", "sreg.nickname"]);
    }

    #[test]
    fn test_required_fields_must_be_signed() {
        let mut message = assertion();
        message.set("signed", "op_endpoint,return_to,assoc_handle,claimed_id,identity");
        assert!(matches!(
            ensure_required_fields_signed(&message, ProtocolVersion::V2_0),
            Err(ProtocolError::UnsignedRequiredParameter(field)) if field == "response_nonce"
        ));

        message.set("signed", "op_endpoint,return_to,response_nonce,assoc_handle,claimed_id");
        assert!(matches!(
            ensure_required_fields_signed(&message, ProtocolVersion::V2_0),
            Err(ProtocolError::UnsignedRequiredParameter(field)) if field == "identity"
        ));
    }

    #[test]
    fn test_openid11_order() {
        let mut message = Message::with_mode(ProtocolVersion::V1_1, Mode::IdRes);
        message.set("identity", "https://op.example.com/user/alice");
        message.set("return_to", "https://rp.example.com/return");
        assert_eq!(
            default_signed_order(&message, ProtocolVersion::V1_1, false),
            vec!["mode", "identity", "return_to"]
        );
    }
}
