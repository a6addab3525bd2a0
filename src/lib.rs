//! signet: OpenID 1.1/2.0 associations and assertions, and OAuth 1.0a
//! request signing.
//!
//! The [`openid`] module holds both the Provider (association, positive and
//! negative assertions, check_authentication) and the relying party
//! (association negotiation, assertion verification). The [`oauth1`] module
//! holds the consumer signing pipeline and a Service Provider. Storage is
//! reached through the traits in [`storage::traits`]; outbound requests go
//! through [`transport::HttpTransport`].

pub mod config;
pub mod crypto;
pub mod errors;
pub mod http;
pub mod nonce;
pub mod oauth1;
pub mod openid;
pub mod storage;
pub mod templates;
pub mod transport;
