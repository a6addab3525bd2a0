//! OpenID Provider: association, authentication and check_authentication.

mod associate;
pub mod authentication;
pub mod behavior;
mod check_auth;
pub mod endpoint;
pub mod request;
pub mod response;
pub mod settings;

pub use authentication::{AuthenticationDecider, AuthenticationRequest, RejectingDecider};
pub use behavior::{ProviderBehavior, RequireSecureReturnTo};
pub use endpoint::{DEFAULT_FORM_POST_THRESHOLD, Handled, OpenIdProvider};
pub use request::{
    AssociateRequest, CheckAuthenticationRequest, IncomingRequest, ProviderRequest, RequestState,
};
pub use response::ProviderResponse;
pub use settings::ProviderSecuritySettings;
