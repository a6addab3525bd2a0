//! Diffie-Hellman agreement used to transport association secrets over plain HTTP.

use num_bigint::BigUint;

use super::protocol::{DEFAULT_DH_GENERATOR, DEFAULT_DH_MODULUS};
use crate::crypto::{HashAlgorithm, random_bytes};
use crate::errors::ProtocolError;

/// Private exponents are drawn from this many random bytes before reduction.
const PRIVATE_EXPONENT_BYTES: usize = 128;

/// One side of a Diffie-Hellman exchange. The private exponent never leaves
/// this value and is dropped with it.
pub struct DiffieHellman {
    modulus: BigUint,
    generator: BigUint,
    private_exponent: BigUint,
    public_value: BigUint,
}

impl DiffieHellman {
    /// Start an exchange over the given group.
    pub fn new(modulus: BigUint, generator: BigUint) -> Result<Self, ProtocolError> {
        let three = BigUint::from(3u32);
        if modulus <= three {
            return Err(ProtocolError::InvalidDiffieHellmanValue(
                "modulus too small".into(),
            ));
        }
        if generator <= BigUint::from(1u32) || generator >= modulus {
            return Err(ProtocolError::InvalidDiffieHellmanValue(
                "generator out of range".into(),
            ));
        }

        Ok(Self::generate(modulus, generator))
    }

    /// Start an exchange over the default OpenID group.
    pub fn with_defaults() -> Self {
        Self::generate(default_modulus(), default_generator())
    }

    fn generate(modulus: BigUint, generator: BigUint) -> Self {
        // Reduce into [2, p - 2]
        let random = BigUint::from_bytes_be(&random_bytes(PRIVATE_EXPONENT_BYTES));
        let private_exponent = (random % (&modulus - BigUint::from(3u32))) + BigUint::from(2u32);
        let public_value = generator.modpow(&private_exponent, &modulus);

        Self {
            modulus,
            generator,
            private_exponent,
            public_value,
        }
    }

    /// Start an exchange over the group a peer advertised as btwoc bytes,
    /// falling back to the defaults for whichever part is absent.
    pub fn from_advertised(
        modulus: Option<&[u8]>,
        generator: Option<&[u8]>,
    ) -> Result<Self, ProtocolError> {
        let modulus = modulus.map(from_btwoc).unwrap_or_else(default_modulus);
        let generator = generator.map(from_btwoc).unwrap_or_else(default_generator);
        Self::new(modulus, generator)
    }

    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    pub fn generator(&self) -> &BigUint {
        &self.generator
    }

    pub fn public_value(&self) -> &BigUint {
        &self.public_value
    }

    pub fn uses_default_group(&self) -> bool {
        self.modulus == default_modulus() && self.generator == default_generator()
    }

    /// `counterparty ^ private mod p`. Public values outside `[2, p - 2]` are refused.
    pub fn derive_shared_secret(&self, counterparty_public: &BigUint) -> Result<BigUint, ProtocolError> {
        let two = BigUint::from(2u32);
        if *counterparty_public < two || *counterparty_public > &self.modulus - &two {
            return Err(ProtocolError::InvalidDiffieHellmanValue(
                "public value out of range".into(),
            ));
        }
        Ok(counterparty_public.modpow(&self.private_exponent, &self.modulus))
    }
}

pub fn default_modulus() -> BigUint {
    BigUint::from_bytes_be(&DEFAULT_DH_MODULUS)
}

pub fn default_generator() -> BigUint {
    BigUint::from(DEFAULT_DH_GENERATOR)
}

/// Big-endian bytes with a leading zero when the top bit would otherwise be set.
pub fn btwoc(value: &BigUint) -> Vec<u8> {
    let bytes = value.to_bytes_be();
    match bytes.first() {
        Some(first) if first & 0x80 != 0 => {
            let mut prefixed = Vec::with_capacity(bytes.len() + 1);
            prefixed.push(0);
            prefixed.extend_from_slice(&bytes);
            prefixed
        }
        _ => bytes,
    }
}

pub fn from_btwoc(bytes: &[u8]) -> BigUint {
    BigUint::from_bytes_be(bytes)
}

/// `H(btwoc(shared)) XOR secret`. The hash output must be exactly as long as
/// the secret; a mismatch is refused before anything is combined.
pub fn encrypt_association_secret(
    shared_secret: &BigUint,
    association_secret: &[u8],
    hash: HashAlgorithm,
) -> Result<Vec<u8>, ProtocolError> {
    if hash.output_len() != association_secret.len() {
        return Err(ProtocolError::SessionTypeMismatch(
            format!("{hash:?}"),
            format!("{}-byte secret", association_secret.len()),
        ));
    }
    let mask = hash.digest(&btwoc(shared_secret));
    Ok(mask
        .iter()
        .zip(association_secret)
        .map(|(m, s)| m ^ s)
        .collect())
}

/// XOR is its own inverse.
pub fn decrypt_association_secret(
    shared_secret: &BigUint,
    encrypted_secret: &[u8],
    hash: HashAlgorithm,
) -> Result<Vec<u8>, ProtocolError> {
    encrypt_association_secret(shared_secret, encrypted_secret, hash)
}
