//! Folding transport outcomes into [`CallResult`]s.
//!
//! [`normalize`] never fails. Whatever the transport produced (a 2xx
//! response, an error status, a body that is not JSON, or no response at
//! all) comes out as exactly one `(status, body)` pair.

use bytes::Bytes;
use serde_json::{json, Value};
use tracing::warn;

use crate::error::{valid_status, WipiResult};
use crate::types::CallResult;

/// A complete HTTP response as returned by a one-shot transport exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// `Content-Type` header value, if present.
    pub content_type: Option<String>,
    /// Raw response body.
    pub body: Bytes,
}

impl RawResponse {
    /// Create a response with a JSON content type.
    pub fn json(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type: Some("application/json".to_string()),
            body: body.into(),
        }
    }

    /// Create a response with an arbitrary content type.
    pub fn new(status: u16, content_type: Option<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
        }
    }

    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Convert the outcome of one exchange into a [`CallResult`].
///
/// - JSON body: `(status, parsed body)`, for success and error statuses alike.
/// - Empty body: `(status, null)`.
/// - Body that is not JSON: `(status, {"error": <parse error>, "raw": <body text>})`.
/// - Transport failure: `(err.status_hint(), {"error": <message>})`.
pub fn normalize(outcome: WipiResult<RawResponse>) -> CallResult {
    match outcome {
        Ok(response) => normalize_response(response),
        Err(err) => {
            warn!("API call failed: {}", err);
            CallResult::new(err.status_hint(), err.to_body())
        }
    }
}

fn normalize_response(response: RawResponse) -> CallResult {
    let status = valid_status(response.status);
    if status != response.status {
        warn!("API call returned invalid status {}", response.status);
    }

    if response.body.iter().all(u8::is_ascii_whitespace) {
        return CallResult::new(status, Value::Null);
    }

    match serde_json::from_slice::<Value>(&response.body) {
        Ok(body) => {
            if !response.is_success() {
                warn!("API call returned status {}", status);
            }
            CallResult::new(status, body)
        }
        Err(e) => {
            let raw = String::from_utf8_lossy(&response.body).into_owned();
            warn!(
                "API call returned status {} with a body that is not JSON ({:?}): {}",
                status, response.content_type, e
            );
            CallResult::new(
                status,
                json!({
                    "error": format!("invalid JSON in response body: {e}"),
                    "raw": raw,
                }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WipiError;

    #[test]
    fn success_body_is_unchanged() {
        let result = normalize(Ok(RawResponse::json(
            200,
            r#"[{"name":"lamp1","at":"18:00"}]"#,
        )));
        assert_eq!(
            result,
            CallResult::new(200, json!([{"name": "lamp1", "at": "18:00"}]))
        );
    }

    #[test]
    fn error_status_keeps_service_error_body() {
        let result = normalize(Ok(RawResponse::json(
            404,
            r#"{"error":"No such controller or not enabled"}"#,
        )));
        assert_eq!(result.status, 404);
        assert_eq!(
            result.error_message(),
            Some("No such controller or not enabled")
        );
    }

    #[test]
    fn empty_body_is_null() {
        let result = normalize(Ok(RawResponse::json(204, "")));
        assert_eq!(result, CallResult::new(204, Value::Null));
    }

    #[test]
    fn non_json_body_falls_back_to_raw() {
        let result = normalize(Ok(RawResponse::new(
            500,
            Some("text/html".to_string()),
            "<h1>Internal Server Error</h1>",
        )));
        assert_eq!(result.status, 500);
        assert_eq!(result.body["raw"], "<h1>Internal Server Error</h1>");
        assert!(result.error_message().is_some());
    }

    #[test]
    fn out_of_range_status_becomes_bad_gateway() {
        for status in [0, 99, 600, 999] {
            let result = normalize(Ok(RawResponse::json(status, r#"{"x":1}"#)));
            assert_eq!(result, CallResult::new(502, json!({"x": 1})));
        }

        let empty = normalize(Ok(RawResponse::json(600, "")));
        assert_eq!(empty, CallResult::new(502, Value::Null));
    }

    #[test]
    fn transport_failure_gets_status_and_error_body() {
        let result = normalize(Err(WipiError::Transport("connection refused".into())));
        assert_eq!(result.status, 503);
        assert!(result.error_message().unwrap().contains("connection refused"));
    }

    #[test]
    fn timeout_maps_to_gateway_timeout() {
        let result = normalize(Err(WipiError::Timeout("30s elapsed".into())));
        assert_eq!(result.status, 504);
    }
}
