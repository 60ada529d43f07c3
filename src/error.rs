//! Error types for the wipi client.
//!
//! Errors never escape the non-streaming facade operations: the response
//! normalizer folds them into a [`CallResult`](crate::types::CallResult)
//! using [`WipiError::status_hint()`] and [`WipiError::to_body()`]. Streaming
//! operations carry them in [`StreamEnd`](crate::client::StreamEnd).

use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Best-effort status codes for failures that produced no HTTP response
// ---------------------------------------------------------------------------

/// Status reported for a malformed request (missing name or payload).
pub const STATUS_BAD_REQUEST: u16 = 400;

/// Status reported for unclassified client-side failures.
pub const STATUS_INTERNAL_ERROR: u16 = 500;

/// Status reported when the remote answered with something that is not JSON.
pub const STATUS_BAD_GATEWAY: u16 = 502;

/// Status reported when the remote could not be reached.
pub const STATUS_SERVICE_UNAVAILABLE: u16 = 503;

/// Status reported when the exchange timed out.
pub const STATUS_GATEWAY_TIMEOUT: u16 = 504;

// ---------------------------------------------------------------------------
// WipiError enum
// ---------------------------------------------------------------------------

/// Unified error type for the wipi client.
///
/// The variants mirror the ways an exchange with the controller service can
/// go wrong. They are `Clone` so a streaming query can hand the same error to
/// its completion signal and to logs.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WipiError {
    /// Transport-level error (connection failed, request failed, etc.).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Request or stream timed out.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// HTTP error with status code and response body.
    #[error("HTTP {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// Invalid JSON received from the remote (parse or deserialization failure).
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    /// The request could not be built (missing controller name or payload).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Catch-all for errors that don't fit other categories.
    #[error("{0}")]
    Other(String),
}

/// `status` if it is a valid HTTP status code, otherwise 502.
pub(crate) fn valid_status(status: u16) -> u16 {
    if (100..=599).contains(&status) {
        status
    } else {
        STATUS_BAD_GATEWAY
    }
}

/// Convenience result type for wipi operations.
pub type WipiResult<T> = Result<T, WipiError>;

impl WipiError {
    /// Create an `InvalidRequest` error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// The error raised when a streaming query is cancelled by its consumer.
    pub fn cancelled() -> Self {
        Self::Other("cancelled".to_string())
    }

    /// Best-effort HTTP status code for this error.
    ///
    /// Always within 100..=599, so callers can treat every status the same
    /// way regardless of whether the service or the client produced it.
    pub fn status_hint(&self) -> u16 {
        match self {
            WipiError::Http { status, .. } => valid_status(*status),
            WipiError::Timeout(_) => STATUS_GATEWAY_TIMEOUT,
            WipiError::Transport(_) => STATUS_SERVICE_UNAVAILABLE,
            WipiError::InvalidJson(_) => STATUS_BAD_GATEWAY,
            WipiError::InvalidRequest(_) => STATUS_BAD_REQUEST,
            WipiError::Other(_) => STATUS_INTERNAL_ERROR,
        }
    }

    /// Render the error in the service's error form, `{"error": "<message>"}`.
    ///
    /// For `Http` errors whose body is itself JSON, that body is returned
    /// as-is since it already is the service's structured error.
    pub fn to_body(&self) -> Value {
        if let WipiError::Http { body, .. } = self {
            if let Ok(value) = serde_json::from_str::<Value>(body) {
                return value;
            }
        }
        json!({ "error": self.to_string() })
    }

    /// Returns `true` if the error was produced by [`WipiError::cancelled()`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WipiError::Other(message) if message == "cancelled")
    }
}

impl From<serde_json::Error> for WipiError {
    fn from(err: serde_json::Error) -> Self {
        WipiError::InvalidJson(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_hints_stay_in_http_range() {
        let errors = [
            WipiError::Transport("connection refused".into()),
            WipiError::Timeout("slow".into()),
            WipiError::Http {
                status: 404,
                body: String::new(),
            },
            WipiError::Http {
                status: 0,
                body: String::new(),
            },
            WipiError::InvalidJson("eof".into()),
            WipiError::invalid_request("missing name"),
            WipiError::Other("boom".into()),
        ];
        for err in errors {
            let status = err.status_hint();
            assert!((100..=599).contains(&status), "{err:?} -> {status}");
        }
    }

    #[test]
    fn http_status_is_kept() {
        let err = WipiError::Http {
            status: 404,
            body: "Not Found".into(),
        };
        assert_eq!(err.status_hint(), 404);
    }

    #[test]
    fn transport_error_maps_to_unavailable() {
        let err = WipiError::Transport("connection refused".into());
        assert_eq!(err.status_hint(), STATUS_SERVICE_UNAVAILABLE);
        assert_eq!(
            err.to_body(),
            json!({"error": "Transport error: connection refused"})
        );
    }

    #[test]
    fn http_json_body_is_passed_through() {
        let err = WipiError::Http {
            status: 404,
            body: r#"{"error":"No such controller or not enabled"}"#.into(),
        };
        assert_eq!(
            err.to_body(),
            json!({"error": "No such controller or not enabled"})
        );
    }

    #[test]
    fn cancelled_is_recognised() {
        assert!(WipiError::cancelled().is_cancelled());
        assert!(!WipiError::Other("other".into()).is_cancelled());
    }

    #[test]
    fn serde_error_converts_to_invalid_json() {
        let err: WipiError = serde_json::from_str::<Value>("{").unwrap_err().into();
        assert!(matches!(err, WipiError::InvalidJson(_)));
    }
}
