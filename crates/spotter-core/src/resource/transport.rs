use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;

use crate::error::TransportError;

/// Transport for one resource: takes the resource key, yields the raw
/// response envelope.
pub type TransportFn =
    Arc<dyn Fn(String) -> BoxFuture<'static, Result<RawResult, TransportError>> + Send + Sync>;

/// Wrap an async closure as a [`TransportFn`].
pub fn transport_fn<F, Fut>(f: F) -> TransportFn
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<RawResult, TransportError>> + Send + 'static,
{
    Arc::new(move |key| f(key).boxed())
}

/// Response body as received: `{"success": true, "data": ...}` when well formed.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResult(pub Value);

impl RawResult {
    pub fn ok(data: Value) -> Self {
        RawResult(serde_json::json!({ "success": true, "data": data }))
    }

    /// Extract `data` after checking the envelope shape.
    pub fn into_data(self) -> Result<Value, String> {
        let Value::Object(mut body) = self.0 else {
            return Err("expected a JSON object envelope".to_string());
        };
        match body.get("success") {
            Some(Value::Bool(true)) => {}
            Some(Value::Bool(false)) => {
                let message = body
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("no message");
                return Err(format!("server reported failure: {}", message));
            }
            _ => return Err("missing boolean `success` field".to_string()),
        }
        body.remove("data")
            .ok_or_else(|| "missing `data` field".to_string())
    }
}
