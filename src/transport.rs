//! Outbound direct requests.
//!
//! Relying parties and OAuth consumers talk to their counterparty through
//! [`HttpTransport`], so tests can answer in-process instead of over the network.

use async_trait::async_trait;
use http::Method;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::errors::TransportError;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// An outbound request
#[derive(Clone, Debug)]
pub struct DirectRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl DirectRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    /// POST with a form-encoded body
    pub fn post_form<I, K, V>(url: Url, parameters: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(parameters)
            .finish();
        Self {
            method: Method::POST,
            url,
            headers: vec![("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string())],
            body: Some(body),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Decoded form body parameters
    pub fn form_parameters(&self) -> Vec<(String, String)> {
        self.body
            .as_deref()
            .map(|body| {
                url::form_urlencoded::parse(body.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// A response to a [`DirectRequest`]
#[derive(Clone, Debug)]
pub struct DirectResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl DirectResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn text(&self) -> Result<&str, TransportError> {
        std::str::from_utf8(&self.body).map_err(|e| TransportError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: DirectRequest) -> Result<DirectResponse, TransportError>;
}

/// [`HttpTransport`] backed by a shared `reqwest::Client`
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    /// The timeout `client` was built with, reported when it fires
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn build(user_agent: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::RequestFailed(e.to_string()))?;
        Ok(Self::new(client, timeout))
    }
}

impl ReqwestTransport {
    fn classify(&self, error: reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else {
            TransportError::RequestFailed(error.to_string())
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: DirectRequest) -> Result<DirectResponse, TransportError> {
        let mut builder = self.client.request(request.method, request.url);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| self.classify(e))?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(self.timeout)
            } else {
                TransportError::InvalidResponse(e.to_string())
            }
        })?;
        Ok(DirectResponse::new(status, body.to_vec()))
    }
}

/// Send `request`, giving up after `timeout` or as soon as `cancel` fires.
pub async fn send_direct(
    transport: &dyn HttpTransport,
    request: DirectRequest,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<DirectResponse, TransportError> {
    let url = request.url.clone();
    tracing::debug!(method = %request.method, %url, "sending direct request");

    tokio::select! {
        biased;
        () = cancel.cancelled() => {
            tracing::debug!(%url, "direct request cancelled");
            Err(TransportError::Cancelled)
        }
        result = tokio::time::timeout(timeout, transport.send(request)) => {
            match result {
                Ok(response) => response,
                Err(_) => {
                    tracing::warn!(%url, ?timeout, "direct request timed out");
                    Err(TransportError::Timeout(timeout))
                }
            }
        }
    }
}
