//! Handles GET / - Describes the OpenID Provider endpoint

use axum::{extract::State, response::IntoResponse};
use axum_template::RenderHtml;
use minijinja::context;

use super::context::AppState;
use crate::errors::Result;

/// Handle requests to the index page
pub async fn handle_index(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(RenderHtml(
        "index.html",
        state.template_env.clone(),
        context! {
            endpoint => state.provider.endpoint().as_str(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::context::test_support::create_test_app_state;

    #[tokio::test]
    async fn test_handle_index() {
        let app_state = create_test_app_state();
        let result = handle_index(State(app_state)).await;
        assert!(result.is_ok());
    }
}
