//! OAuth 1.0a signature methods.

use base64::{Engine, prelude::BASE64_STANDARD};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use std::fmt;
use std::str::FromStr;

use super::encoding::percent_encode;
use crate::crypto::{HashAlgorithm, equals_constant_time};
use crate::errors::{CryptoError, ProtocolError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignatureMethod {
    HmacSha1,
    /// The signature is the signing key itself; only safe over TLS
    Plaintext,
    RsaSha1,
}

impl SignatureMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureMethod::HmacSha1 => "HMAC-SHA1",
            SignatureMethod::Plaintext => "PLAINTEXT",
            SignatureMethod::RsaSha1 => "RSA-SHA1",
        }
    }

    /// Whether the method covers a base string, and so needs a timestamp and nonce
    pub fn signs_base_string(&self) -> bool {
        !matches!(self, SignatureMethod::Plaintext)
    }
}

impl FromStr for SignatureMethod {
    type Err = ProtocolError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "HMAC-SHA1" => Ok(SignatureMethod::HmacSha1),
            "PLAINTEXT" => Ok(SignatureMethod::Plaintext),
            "RSA-SHA1" => Ok(SignatureMethod::RsaSha1),
            other => Err(ProtocolError::UnsupportedSignatureMethod(other.to_string())),
        }
    }
}

impl fmt::Display for SignatureMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `enc(consumer_secret)&enc(token_secret)`; the token secret may be empty
pub fn signing_key(consumer_secret: &str, token_secret: &str) -> String {
    format!("{}&{}", percent_encode(consumer_secret), percent_encode(token_secret))
}

pub fn hmac_sha1(base_string: &str, key: &str) -> Result<String, CryptoError> {
    let mac = HashAlgorithm::Sha1.hmac(key.as_bytes(), base_string.as_bytes())?;
    Ok(BASE64_STANDARD.encode(mac))
}

pub fn rsa_sha1(base_string: &str, private_key: &RsaPrivateKey) -> Result<String, CryptoError> {
    let signing_key = SigningKey::<Sha1>::new(private_key.clone());
    let signature = signing_key
        .try_sign(base_string.as_bytes())
        .map_err(|e| CryptoError::RsaFailed(e.to_string()))?;
    Ok(BASE64_STANDARD.encode(signature.to_bytes()))
}

pub fn verify_rsa_sha1(base_string: &str, signature: &str, public_key: &RsaPublicKey) -> bool {
    let Ok(bytes) = BASE64_STANDARD.decode(signature) else {
        return false;
    };
    let Ok(signature) = Signature::try_from(bytes.as_slice()) else {
        return false;
    };
    VerifyingKey::<Sha1>::new(public_key.clone())
        .verify(base_string.as_bytes(), &signature)
        .is_ok()
}

/// Secrets available to whoever signs or verifies a request
#[derive(Clone, Copy)]
pub struct SigningSecrets<'a> {
    pub consumer_secret: &'a str,
    pub token_secret: &'a str,
    pub rsa_private_key: Option<&'a RsaPrivateKey>,
    pub rsa_public_key: Option<&'a RsaPublicKey>,
}

impl<'a> SigningSecrets<'a> {
    pub fn shared(consumer_secret: &'a str, token_secret: &'a str) -> Self {
        Self {
            consumer_secret,
            token_secret,
            rsa_private_key: None,
            rsa_public_key: None,
        }
    }
}

/// Produce `oauth_signature` for `base_string`
pub fn sign(method: SignatureMethod, base_string: &str, secrets: SigningSecrets<'_>) -> Result<String, CryptoError> {
    match method {
        SignatureMethod::HmacSha1 => hmac_sha1(
            base_string,
            &signing_key(secrets.consumer_secret, secrets.token_secret),
        ),
        SignatureMethod::Plaintext => Ok(signing_key(secrets.consumer_secret, secrets.token_secret)),
        SignatureMethod::RsaSha1 => {
            let private_key = secrets
                .rsa_private_key
                .ok_or_else(|| CryptoError::RsaFailed("no RSA private key configured".into()))?;
            rsa_sha1(base_string, private_key)
        }
    }
}

/// Check `signature`. Failure never says why.
pub fn verify(method: SignatureMethod, base_string: &str, signature: &str, secrets: SigningSecrets<'_>) -> bool {
    match method {
        SignatureMethod::HmacSha1 => {
            match hmac_sha1(base_string, &signing_key(secrets.consumer_secret, secrets.token_secret)) {
                Ok(expected) => equals_constant_time(expected.as_bytes(), signature.as_bytes()),
                Err(_) => false,
            }
        }
        SignatureMethod::Plaintext => equals_constant_time(
            signing_key(secrets.consumer_secret, secrets.token_secret).as_bytes(),
            signature.as_bytes(),
        ),
        SignatureMethod::RsaSha1 => match secrets.rsa_public_key {
            Some(public_key) => verify_rsa_sha1(base_string, signature, public_key),
            None => false,
        },
    }
}
