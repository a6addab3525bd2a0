//! Application state shared by the HTTP handlers.

use axum_template::engine::Engine;
use minijinja::Environment;
use std::sync::Arc;

use crate::config::Config;
use crate::openid::provider::{AuthenticationDecider, OpenIdProvider};

/// Template engine for rendering HTML responses.
pub type AppEngine = Engine<Environment<'static>>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Template engine for rendering HTML responses.
    pub template_env: AppEngine,
    /// The OpenID Provider served at the endpoint
    pub provider: Arc<OpenIdProvider>,
    /// Decides pending authentication requests
    pub decider: Arc<dyn AuthenticationDecider>,
}
