//! API client for the gym backend.
//!
//! `ApiClient` knows the endpoint behind each `TransportMethod` and hands the
//! resource cache one transport function per configured resource. It does
//! not retry: retries belong to the cache's retry driver, so each transport
//! call is exactly one HTTP request.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::TransportError;
use crate::resource::{transport_fn, RawResult, TransportFn};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Backend operation behind a cached resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMethod {
    Config,
    Stats,
    Services,
    Products,
    Plans,
}

impl TransportMethod {
    pub const ALL: [TransportMethod; 5] = [
        TransportMethod::Config,
        TransportMethod::Stats,
        TransportMethod::Services,
        TransportMethod::Products,
        TransportMethod::Plans,
    ];

    pub fn path(self) -> &'static str {
        match self {
            TransportMethod::Config => "/config",
            TransportMethod::Stats => "/admin/stats",
            TransportMethod::Services => "/services",
            TransportMethod::Products => "/products",
            TransportMethod::Plans => "/plans",
        }
    }
}

/// API client for the gym backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Arc<String>,
    token: Option<Arc<String>>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        let base_url: String = base_url.into();
        Ok(Self {
            client,
            base_url: Arc::new(base_url.trim_end_matches('/').to_string()),
            token: None,
        })
    }

    /// Set the bearer token for authenticated requests
    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(Arc::new(token.into()));
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// One GET for `method`, body returned unvalidated.
    /// A body that is not JSON comes back as a JSON string so the envelope
    /// check rejects it instead of the transport.
    pub async fn fetch_envelope(&self, method: TransportMethod) -> Result<RawResult, ApiError> {
        let url = self.url(method.path());
        debug!(url = %url, "GET");

        let mut request = self.client.get(&url);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token.as_str());
        }
        let response = Self::check_response(request.send().await?).await?;
        let body = response.text().await?;

        Ok(RawResult(
            serde_json::from_str(&body).unwrap_or_else(|_| Value::String(body)),
        ))
    }

    /// Transport function for the resource cache.
    pub fn transport(&self, method: TransportMethod) -> TransportFn {
        let api = self.clone();
        transport_fn(move |_key| {
            let api = api.clone();
            async move {
                api.fetch_envelope(method)
                    .await
                    .map_err(TransportError::from)
            }
        })
    }
}
