//! Environment-based configuration types for signet runtime settings.

use anyhow::Result;
use std::time::Duration;
use url::Url;

use crate::errors::ConfigError;

/// Path of the OpenID Provider endpoint, relative to the external base.
pub const OPENID_ENDPOINT_PATH: &str = "/openid";

/// HTTP server port configuration
#[derive(Clone, Debug)]
pub struct HttpPort(u16);

/// HTTP client timeout configuration
#[derive(Clone, Debug)]
pub struct HttpClientTimeout(Duration);

/// Lifetime setting parsed from a duration string such as `14d` or `5m`
#[derive(Clone, Copy, Debug)]
pub struct Lifetime(chrono::Duration);

/// Boolean setting accepting true/false/1/0/yes/no/on/off
#[derive(Clone, Copy, Debug)]
pub struct Flag(bool);

/// Size limit for indirect messages sent as a redirect
#[derive(Clone, Copy, Debug)]
pub struct FormPostThreshold(usize);

/// Permitted association strength in bits
#[derive(Clone, Copy, Debug)]
pub struct HashBitLengths {
    pub minimum: usize,
    pub maximum: usize,
}

/// Main application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub version: String,
    pub http_port: HttpPort,
    pub external_base: String,
    pub user_agent: String,
    pub http_client_timeout: HttpClientTimeout,
    pub storage_backend: String,
    pub shared_association_lifetime: Lifetime,
    pub private_association_lifetime: Lifetime,
    pub max_nonce_age: Lifetime,
    pub encode_associations_in_handles: Flag,
    pub require_ssl: Flag,
    pub openid11_lenient: Flag,
    pub hash_bit_lengths: HashBitLengths,
    pub form_post_threshold: FormPostThreshold,
}

impl Config {
    /// Create a new configuration from environment variables
    pub fn new() -> Result<Self> {
        let default_user_agent = format!("signet/{}", version()?);
        let external_base = require_env("EXTERNAL_BASE")?;
        Url::parse(&external_base)
            .map_err(|e| ConfigError::InvalidUrl(external_base.clone(), e))?;
        let http_port: HttpPort = default_env("HTTP_PORT", "8080").try_into()?;
        let http_client_timeout: HttpClientTimeout =
            default_env("HTTP_CLIENT_TIMEOUT", "10s").try_into()?;
        let user_agent = default_env("USER_AGENT", &default_user_agent);
        let storage_backend = default_env("STORAGE_BACKEND", "memory");
        let shared_association_lifetime: Lifetime =
            default_env("SHARED_ASSOCIATION_LIFETIME", "14d").try_into()?;
        let private_association_lifetime: Lifetime =
            default_env("PRIVATE_ASSOCIATION_LIFETIME", "5m").try_into()?;
        let max_nonce_age: Lifetime = default_env("MAX_NONCE_AGE", "13m").try_into()?;
        let encode_associations_in_handles: Flag =
            default_env("ENCODE_ASSOCIATIONS_IN_HANDLES", "true").try_into()?;
        let require_ssl: Flag = default_env("REQUIRE_SSL", "false").try_into()?;
        let openid11_lenient: Flag = default_env("OPENID11_LENIENT", "true").try_into()?;
        let hash_bit_lengths = HashBitLengths::new(
            default_env("MIN_HASH_BIT_LENGTH", "160"),
            default_env("MAX_HASH_BIT_LENGTH", "256"),
        )?;
        let form_post_threshold: FormPostThreshold =
            default_env("FORM_POST_THRESHOLD", "2048").try_into()?;

        Ok(Self {
            version: version()?,
            http_port,
            external_base,
            user_agent,
            http_client_timeout,
            storage_backend,
            shared_association_lifetime,
            private_association_lifetime,
            max_nonce_age,
            encode_associations_in_handles,
            require_ssl,
            openid11_lenient,
            hash_bit_lengths,
            form_post_threshold,
        })
    }

    /// Absolute URL of the OpenID Provider endpoint
    pub fn openid_endpoint(&self) -> Result<Url, ConfigError> {
        let endpoint = format!(
            "{}{}",
            self.external_base.trim_end_matches('/'),
            OPENID_ENDPOINT_PATH
        );
        Url::parse(&endpoint).map_err(|e| ConfigError::InvalidUrl(endpoint, e))
    }
}

/// Get application version from build environment
pub fn version() -> Result<String> {
    option_env!("GIT_HASH")
        .or(option_env!("CARGO_PKG_VERSION"))
        .map(|val| val.to_string())
        .ok_or(ConfigError::VersionNotSet.into())
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| ConfigError::EnvVarRequired(name.to_string()).into())
}

pub(crate) fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn default_env(name: &str, default_value: &str) -> String {
    optional_env(name).unwrap_or_else(|| default_value.to_string())
}

fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    duration_str::parse(value)
        .map_err(|e| ConfigError::DurationParsingFailed(value.to_string(), e.to_string()))
}

impl TryFrom<String> for HttpPort {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Ok(Self(8080))
        } else {
            value
                .parse::<u16>()
                .map(Self)
                .map_err(|err| ConfigError::PortParsingFailed(err).into())
        }
    }
}

impl AsRef<u16> for HttpPort {
    fn as_ref(&self) -> &u16 {
        &self.0
    }
}

impl TryFrom<String> for HttpClientTimeout {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Ok(Self(Duration::from_secs(10)));
        }
        parse_duration(&value).map(Self)
    }
}

impl AsRef<Duration> for HttpClientTimeout {
    fn as_ref(&self) -> &Duration {
        &self.0
    }
}

impl TryFrom<String> for Lifetime {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let duration = parse_duration(&value)?;
        if duration.is_zero() {
            return Err(ConfigError::DurationParsingFailed(value, "must be positive".into()).into());
        }
        Ok(Self(chrono::Duration::from_std(duration)?))
    }
}

impl AsRef<chrono::Duration> for Lifetime {
    fn as_ref(&self) -> &chrono::Duration {
        &self.0
    }
}

impl TryFrom<String> for Flag {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Self(true)),
            "false" | "0" | "no" | "off" => Ok(Self(false)),
            _ => Err(ConfigError::BoolParsingFailed(value).into()),
        }
    }
}

impl AsRef<bool> for Flag {
    fn as_ref(&self) -> &bool {
        &self.0
    }
}

impl TryFrom<String> for FormPostThreshold {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value
            .parse::<usize>()
            .map(Self)
            .map_err(|e| ConfigError::IntegerParsingFailed(value, e).into())
    }
}

impl AsRef<usize> for FormPostThreshold {
    fn as_ref(&self) -> &usize {
        &self.0
    }
}

impl HashBitLengths {
    fn new(minimum: String, maximum: String) -> Result<Self, ConfigError> {
        let minimum_bits = minimum
            .parse::<usize>()
            .map_err(|e| ConfigError::IntegerParsingFailed(minimum.clone(), e))?;
        let maximum_bits = maximum
            .parse::<usize>()
            .map_err(|e| ConfigError::IntegerParsingFailed(maximum.clone(), e))?;

        // Only 160 (SHA1) and 256 (SHA256) bit associations exist.
        if minimum_bits > maximum_bits || minimum_bits > 256 || maximum_bits < 160 {
            return Err(ConfigError::InvalidHashBitLength(format!(
                "{minimum_bits}..={maximum_bits}"
            )));
        }

        Ok(Self {
            minimum: minimum_bits,
            maximum: maximum_bits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifetime_parsing() {
        let lifetime: Lifetime = "14d".to_string().try_into().unwrap();
        assert_eq!(*lifetime.as_ref(), chrono::Duration::days(14));

        let lifetime: Lifetime = "5m".to_string().try_into().unwrap();
        assert_eq!(*lifetime.as_ref(), chrono::Duration::minutes(5));

        assert!(Lifetime::try_from("0s".to_string()).is_err());
        assert!(Lifetime::try_from("soon".to_string()).is_err());
    }

    #[test]
    fn test_flag_parsing() {
        assert!(*Flag::try_from("on".to_string()).unwrap().as_ref());
        assert!(!*Flag::try_from("FALSE".to_string()).unwrap().as_ref());
        assert!(Flag::try_from("maybe".to_string()).is_err());
    }

    #[test]
    fn test_http_client_timeout() {
        let timeout: HttpClientTimeout = "".to_string().try_into().unwrap();
        assert_eq!(*timeout.as_ref(), Duration::from_secs(10));

        let timeout: HttpClientTimeout = "3s".to_string().try_into().unwrap();
        assert_eq!(*timeout.as_ref(), Duration::from_secs(3));
    }

    #[test]
    fn test_hash_bit_lengths() {
        let range = HashBitLengths::new("160".into(), "256".into()).unwrap();
        assert_eq!(range.minimum, 160);
        assert_eq!(range.maximum, 256);

        // Empty range
        assert!(HashBitLengths::new("256".into(), "160".into()).is_err());
        // Nothing can satisfy this
        assert!(HashBitLengths::new("512".into(), "1024".into()).is_err());
    }
}
