//! Axum binding of the OpenID Provider endpoint.

pub mod context;
mod handler_index;
mod handler_openid;
pub mod server;

pub use context::{AppEngine, AppState};
pub use server::build_router;
