//! Router assembling the Provider endpoint.

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use super::{
    context::AppState,
    handler_index::handle_index,
    handler_openid::{handle_openid_get, handle_openid_post},
};
use crate::config::OPENID_ENDPOINT_PATH;

/// Build the application router
pub fn build_router(ctx: AppState) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route(
            OPENID_ENDPOINT_PATH,
            get(handle_openid_get).post(handle_openid_post),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
