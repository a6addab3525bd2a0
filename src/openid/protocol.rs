//! OpenID protocol constants, modes, and association/session type negotiation rules.

use std::fmt;
use std::str::FromStr;

use crate::crypto::HashAlgorithm;
use crate::errors::ProtocolError;

/// Prefix carried by every OpenID parameter on the wire
pub const PARAMETER_PREFIX: &str = "openid.";

pub const OPENID2_NAMESPACE: &str = "http://specs.openid.net/auth/2.0";

/// Claimed/local identifier value that asks the Provider to choose the identity
pub const IDENTIFIER_SELECT: &str = "http://specs.openid.net/auth/2.0/identifier_select";

/// Association handles are limited to this many printable ASCII characters
pub const MAX_HANDLE_LENGTH: usize = 255;

/// `error_code` used when an associate request names a type the Provider will not use
pub const UNSUPPORTED_TYPE_ERROR_CODE: &str = "unsupported-type";

/// Default OpenID Diffie-Hellman modulus (1024 bits, big-endian)
pub const DEFAULT_DH_MODULUS: [u8; 128] = [
    0xdc, 0xf9, 0x3a, 0x0b, 0x88, 0x39, 0x72, 0xec, 0x0e, 0x19, 0x98, 0x9a, 0xc5, 0xa2, 0xce, 0x31,
    0x0e, 0x1d, 0x37, 0x71, 0x7e, 0x8d, 0x95, 0x71, 0xbb, 0x76, 0x23, 0x73, 0x18, 0x66, 0xe6, 0x1e,
    0xf7, 0x5a, 0x2e, 0x27, 0x89, 0x8b, 0x05, 0x7f, 0x98, 0x91, 0xc2, 0xe2, 0x7a, 0x63, 0x9c, 0x3f,
    0x29, 0xb6, 0x08, 0x14, 0x58, 0x1c, 0xd3, 0xb2, 0xca, 0x39, 0x86, 0xd2, 0x68, 0x37, 0x05, 0x57,
    0x7d, 0x45, 0xc2, 0xe7, 0xe5, 0x2d, 0xc8, 0x1c, 0x7a, 0x17, 0x18, 0x76, 0xe5, 0xce, 0xa7, 0x4b,
    0x14, 0x48, 0xbf, 0xdf, 0xaf, 0x18, 0x82, 0x8e, 0xfd, 0x25, 0x19, 0xf1, 0x4e, 0x45, 0xe3, 0x82,
    0x66, 0x34, 0xaf, 0x19, 0x49, 0xe5, 0xb5, 0x35, 0xcc, 0x82, 0x9a, 0x48, 0x3b, 0x8a, 0x76, 0x22,
    0x3e, 0x5d, 0x49, 0x0a, 0x25, 0x7f, 0x05, 0xbd, 0xff, 0x16, 0xf2, 0xfb, 0x22, 0xc5, 0x83, 0xab,
];

pub const DEFAULT_DH_GENERATOR: u32 = 2;

/// OpenID protocol version, detected from `openid.ns`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProtocolVersion {
    V1_1,
    V2_0,
}

impl ProtocolVersion {
    /// Detect the version from the (unprefixed) `ns` value.
    ///
    /// OpenID 1.x messages carry no namespace at all.
    pub fn detect(namespace: Option<&str>) -> Result<Self, ProtocolError> {
        match namespace {
            None => Ok(ProtocolVersion::V1_1),
            Some(OPENID2_NAMESPACE) => Ok(ProtocolVersion::V2_0),
            Some(other) => Err(ProtocolError::UnsupportedVersion(other.to_string())),
        }
    }

    pub fn namespace(&self) -> Option<&'static str> {
        match self {
            ProtocolVersion::V1_1 => None,
            ProtocolVersion::V2_0 => Some(OPENID2_NAMESPACE),
        }
    }
}

/// Value of `openid.mode`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    Associate,
    CheckIdSetup,
    CheckIdImmediate,
    CheckAuthentication,
    IdRes,
    SetupNeeded,
    Cancel,
    Error,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Associate => "associate",
            Mode::CheckIdSetup => "checkid_setup",
            Mode::CheckIdImmediate => "checkid_immediate",
            Mode::CheckAuthentication => "check_authentication",
            Mode::IdRes => "id_res",
            Mode::SetupNeeded => "setup_needed",
            Mode::Cancel => "cancel",
            Mode::Error => "error",
        }
    }

    /// Whether a request in this mode is a direct (machine to machine) request
    pub fn is_direct(&self) -> bool {
        matches!(self, Mode::Associate | Mode::CheckAuthentication)
    }
}

impl FromStr for Mode {
    type Err = ProtocolError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "associate" => Ok(Mode::Associate),
            "checkid_setup" => Ok(Mode::CheckIdSetup),
            "checkid_immediate" => Ok(Mode::CheckIdImmediate),
            "check_authentication" => Ok(Mode::CheckAuthentication),
            "id_res" => Ok(Mode::IdRes),
            "setup_needed" => Ok(Mode::SetupNeeded),
            "cancel" => Ok(Mode::Cancel),
            "error" => Ok(Mode::Error),
            other => Err(ProtocolError::UnsupportedMode(other.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Association signing algorithm
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssociationType {
    HmacSha1,
    HmacSha256,
}

impl AssociationType {
    /// Strongest first
    pub const ALL: [AssociationType; 2] = [AssociationType::HmacSha256, AssociationType::HmacSha1];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssociationType::HmacSha1 => "HMAC-SHA1",
            AssociationType::HmacSha256 => "HMAC-SHA256",
        }
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        match self {
            AssociationType::HmacSha1 => HashAlgorithm::Sha1,
            AssociationType::HmacSha256 => HashAlgorithm::Sha256,
        }
    }

    /// Secret length in bytes
    pub fn secret_len(&self) -> usize {
        self.hash_algorithm().output_len()
    }

    pub fn bit_length(&self) -> usize {
        self.secret_len() * 8
    }

    /// Association type whose secret has the given length
    pub fn for_secret_len(len: usize) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.secret_len() == len)
    }

    /// Whether this type exists in the given protocol version
    pub fn is_supported_by(&self, version: ProtocolVersion) -> bool {
        match self {
            AssociationType::HmacSha1 => true,
            AssociationType::HmacSha256 => version >= ProtocolVersion::V2_0,
        }
    }
}

impl FromStr for AssociationType {
    type Err = ProtocolError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "HMAC-SHA1" => Ok(AssociationType::HmacSha1),
            "HMAC-SHA256" => Ok(AssociationType::HmacSha256),
            other => Err(ProtocolError::UnsupportedAssociationType(other.to_string())),
        }
    }
}

impl fmt::Display for AssociationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the association secret travels in the associate response
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionType {
    NoEncryption,
    DhSha1,
    DhSha256,
}

impl SessionType {
    /// Wire spelling. OpenID 1.x spells the unencrypted session as the empty string.
    pub fn as_str(&self, version: ProtocolVersion) -> &'static str {
        match (self, version) {
            (SessionType::NoEncryption, ProtocolVersion::V1_1) => "",
            (SessionType::NoEncryption, ProtocolVersion::V2_0) => "no-encryption",
            (SessionType::DhSha1, _) => "DH-SHA1",
            (SessionType::DhSha256, _) => "DH-SHA256",
        }
    }

    /// Parse the `session_type` parameter.
    ///
    /// OpenID 1.x omits the parameter or sends it empty for unencrypted
    /// sessions. Some 2.0 peers do the same; that is tolerated only when
    /// `lenient` is set.
    pub fn parse(
        value: Option<&str>,
        version: ProtocolVersion,
        lenient: bool,
    ) -> Result<Self, ProtocolError> {
        match value {
            None | Some("") if version == ProtocolVersion::V1_1 || lenient => {
                Ok(SessionType::NoEncryption)
            }
            None => Err(ProtocolError::MissingParameter("session_type".into())),
            Some("no-encryption") if version >= ProtocolVersion::V2_0 => {
                Ok(SessionType::NoEncryption)
            }
            Some("DH-SHA1") => Ok(SessionType::DhSha1),
            Some("DH-SHA256") if version >= ProtocolVersion::V2_0 => Ok(SessionType::DhSha256),
            Some(other) => Err(ProtocolError::UnsupportedSessionType(other.to_string())),
        }
    }

    /// Hash used to mask the secret; `None` when the secret is sent in the clear
    pub fn hash_algorithm(&self) -> Option<HashAlgorithm> {
        match self {
            SessionType::NoEncryption => None,
            SessionType::DhSha1 => Some(HashAlgorithm::Sha1),
            SessionType::DhSha256 => Some(HashAlgorithm::Sha256),
        }
    }

    /// Diffie-Hellman session matching the association's hash
    pub fn diffie_hellman_for(association_type: AssociationType) -> Self {
        match association_type {
            AssociationType::HmacSha1 => SessionType::DhSha1,
            AssociationType::HmacSha256 => SessionType::DhSha256,
        }
    }

    /// The session hash output must be exactly as long as the association secret.
    pub fn is_compatible_with(&self, association_type: AssociationType) -> bool {
        match self.hash_algorithm() {
            None => true,
            Some(hash) => hash.output_len() == association_type.secret_len(),
        }
    }
}
