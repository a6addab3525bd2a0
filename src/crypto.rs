//! Hashing, HMAC, constant-time comparison and random material shared by both protocols.

use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use rand::{Rng, RngCore, distributions::Alphanumeric};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::errors::CryptoError;

/// Digest used for HMAC signing and Diffie-Hellman secret masking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
}

impl HashAlgorithm {
    /// Digest output length in bytes
    pub fn output_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 => 32,
        }
    }

    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
            HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
        }
    }

    pub fn hmac(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match self {
            HashAlgorithm::Sha1 => {
                let mut mac = Hmac::<Sha1>::new_from_slice(key)
                    .map_err(|e| CryptoError::InvalidKeyLength(e.to_string()))?;
                mac.update(data);
                Ok(mac.finalize().into_bytes().to_vec())
            }
            HashAlgorithm::Sha256 => {
                let mut mac = Hmac::<Sha256>::new_from_slice(key)
                    .map_err(|e| CryptoError::InvalidKeyLength(e.to_string()))?;
                mac.update(data);
                Ok(mac.finalize().into_bytes().to_vec())
            }
        }
    }
}

/// Compares two byte strings without leaking how many leading bytes match.
///
/// Lengths are not secret, so a length mismatch returns early. Equal-length
/// inputs are compared over every byte.
pub fn equals_constant_time(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.ct_eq(right).into()
}

pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Generate a secure random token
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().r#gen();
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

/// Random `[A-Za-z0-9]` string
pub fn random_alphanumeric(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_sha1_known_vector() {
        // RFC 2202 test case 2
        let mac = HashAlgorithm::Sha1
            .hmac(b"Jefe", b"what do ya want for nothing?")
            .unwrap();
        assert_eq!(
            mac,
            [
                0xef, 0xfc, 0xdf, 0x6a, 0xe5, 0xeb, 0x2f, 0xa2, 0xd2, 0x74, 0x16, 0xd5, 0xf1, 0x84,
                0xdf, 0x9c, 0x25, 0x9a, 0x7c, 0x79
            ]
        );
    }

    #[test]
    fn test_output_lengths() {
        assert_eq!(HashAlgorithm::Sha1.digest(b"x").len(), 20);
        assert_eq!(HashAlgorithm::Sha256.digest(b"x").len(), 32);
        assert_eq!(HashAlgorithm::Sha256.hmac(b"k", b"x").unwrap().len(), 32);
    }

    #[test]
    fn test_equals_constant_time() {
        assert!(equals_constant_time(b"abc", b"abc"));
        assert!(!equals_constant_time(b"abc", b"abd"));
        assert!(!equals_constant_time(b"abc", b"abcd"));
        assert!(equals_constant_time(b"", b""));
    }

    #[test]
    fn test_random_material() {
        assert_eq!(random_bytes(20).len(), 20);
        assert_eq!(generate_token().len(), 43);

        let value = random_alphanumeric(8);
        assert_eq!(value.len(), 8);
        assert!(value.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
