//! Binding `return_to` URLs to the requests that produced them.
//!
//! The relying party signs the query of every `return_to` it sends out.
//! OpenID 1.x assertions carry no `response_nonce`, so requests to 1.x
//! Providers also get a request nonce inside the signed query.

use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use url::Url;

use crate::crypto::{HashAlgorithm, equals_constant_time};
use crate::errors::CryptoError;
use crate::nonce::ResponseNonce;

pub const REQUEST_NONCE_PARAMETER: &str = "signet.request_nonce";
pub const SIGNATURE_PARAMETER: &str = "signet.return_to_sig";

/// Nonce context for request nonces, kept apart from Provider endpoints
pub(crate) const REQUEST_NONCE_CONTEXT: &str = "signet:return_to";

#[derive(Debug, PartialEq)]
pub(crate) enum ReturnToBinding {
    /// No signature: the relying party never sent this URL out
    Unsolicited,
    /// Signed, but not under our key or not over this query
    Forged,
    Solicited { request_nonce: Option<String> },
}

/// `return_to` with `nonce` added, then signed under `key`.
pub(crate) fn bind(return_to: &Url, nonce: Option<&ResponseNonce>, key: &[u8]) -> Result<Url, CryptoError> {
    let mut bound = without_signature(return_to);
    if let Some(nonce) = nonce {
        bound
            .query_pairs_mut()
            .append_pair(REQUEST_NONCE_PARAMETER, &nonce.to_string());
    }
    let signature = sign(&bound, key)?;
    bound.query_pairs_mut().append_pair(SIGNATURE_PARAMETER, &signature);
    Ok(bound)
}

pub(crate) fn check(return_to: &Url, key: &[u8]) -> Result<ReturnToBinding, CryptoError> {
    let Some(signature) = parameter(return_to, SIGNATURE_PARAMETER) else {
        return Ok(ReturnToBinding::Unsolicited);
    };
    let expected = sign(&without_signature(return_to), key)?;
    if !equals_constant_time(expected.as_bytes(), signature.as_bytes()) {
        return Ok(ReturnToBinding::Forged);
    }
    Ok(ReturnToBinding::Solicited {
        request_nonce: parameter(return_to, REQUEST_NONCE_PARAMETER),
    })
}

fn sign(url: &Url, key: &[u8]) -> Result<String, CryptoError> {
    let mac = HashAlgorithm::Sha256.hmac(key, url.as_str().as_bytes())?;
    Ok(BASE64_URL_SAFE_NO_PAD.encode(mac))
}

fn parameter(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Re-serializes the query so signing and checking see the same bytes
fn without_signature(url: &Url) -> Url {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .into_owned()
        .filter(|(name, _)| name != SIGNATURE_PARAMETER)
        .collect();
    let mut stripped = url.clone();
    stripped.set_query(None);
    if !pairs.is_empty() {
        stripped.query_pairs_mut().extend_pairs(&pairs);
    }
    stripped
}
