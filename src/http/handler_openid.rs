//! Handles GET and POST /openid - The OpenID Provider endpoint

use axum::{
    Form,
    extract::{Query, State},
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use axum_template::RenderHtml;
use serde::Serialize;

use super::context::AppState;
use crate::errors::{HttpError, ProviderError, Result};
use crate::openid::provider::{Handled, IncomingRequest, ProviderResponse};

const ENDPOINT_NOTICE: &str = "This is an OpenID Provider endpoint.";

/// Context for the auto-submitting form page
#[derive(Serialize)]
struct FormPostPage<'a> {
    action: &'a str,
    fields: &'a [(String, String)],
}

/// Indirect requests arrive as query parameters
pub async fn handle_openid_get(
    State(state): State<AppState>,
    Query(parameters): Query<Vec<(String, String)>>,
) -> Result<Response> {
    dispatch(&state, Method::GET, parameters).await
}

/// Direct requests, and indirect requests delivered by form post
pub async fn handle_openid_post(
    State(state): State<AppState>,
    Form(parameters): Form<Vec<(String, String)>>,
) -> Result<Response> {
    dispatch(&state, Method::POST, parameters).await
}

async fn dispatch(state: &AppState, method: Method, parameters: Vec<(String, String)>) -> Result<Response> {
    let incoming = IncomingRequest::new(method, state.provider.endpoint().clone(), parameters);

    let response = match state.provider.handle(&incoming).await {
        Ok(Handled::Response(response)) => response,
        Ok(Handled::Pending(mut request)) => {
            let decided = match state.decider.decide(&mut request).await {
                Ok(()) => state.provider.prepare_authentication_response(&mut request).await,
                Err(error) => Err(error),
            };
            match decided {
                Ok(response) => response,
                Err(error) => recover(state, &incoming, error)?,
            }
        }
        Ok(Handled::Ignored) => return Ok((StatusCode::OK, ENDPOINT_NOTICE).into_response()),
        Err(error) => {
            tracing::warn!(error = %error, "openid request rejected");
            return Ok((StatusCode::BAD_REQUEST, error.to_string()).into_response());
        }
    };

    Ok(render(state, response))
}

/// Turn a failure after the request was parsed into a protocol error response
fn recover(state: &AppState, incoming: &IncomingRequest, error: ProviderError) -> Result<ProviderResponse> {
    state
        .provider
        .error_response(incoming, &error)
        .ok_or_else(|| HttpError::RequestProcessingFailed(error.to_string()))
}

fn render(state: &AppState, response: ProviderResponse) -> Response {
    match response {
        ProviderResponse::Direct { status, body } => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_REQUEST),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            body,
        )
            .into_response(),
        ProviderResponse::Redirect { location } => {
            (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
        }
        ProviderResponse::FormPost { action, fields } => RenderHtml(
            "form_post.html",
            state.template_env.clone(),
            FormPostPage {
                action: action.as_str(),
                fields: &fields,
            },
        )
        .into_response(),
    }
}
