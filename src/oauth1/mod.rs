//! OAuth 1.0a (RFC 5849) for both sides of the exchange.
//!
//! [`Consumer`] signs requests and walks the three-legged token exchange.
//! [`ServiceProvider`] verifies signed requests and issues request and
//! access tokens. Both share the base string and signature code.

pub mod base_string;
pub mod consumer;
pub mod encoding;
pub mod request;
pub mod service_provider;
pub mod signing;
pub mod types;

/// Value of `oauth_version` when sent
pub const OAUTH_VERSION: &str = "1.0";

/// `oauth_callback` value for consumers that cannot receive redirects
pub const OUT_OF_BAND_CALLBACK: &str = "oob";

pub use base_string::{normalize_parameters, signature_base_string};
pub use consumer::{Consumer, ServiceProviderEndpoints, TokenExchangeState};
pub use request::{OAuthRequest, ParameterPlacement, RequestSigner, SignedRequest};
pub use service_provider::{ServiceProvider, VerifiedRequest, callback_url, token_response};
pub use signing::{SignatureMethod, SigningSecrets};
pub use types::{ConsumerRecord, Credentials, ServiceProviderToken, TokenKind};
