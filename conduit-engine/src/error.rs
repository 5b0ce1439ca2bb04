//! Engine error taxonomy
//!
//! Every failure the engine can observe maps onto [`EngineError`]. The
//! resilience layer decides retry eligibility with [`is_transient_error`].

use std::time::Duration;

use conduit_client::ClientError;
use thiserror::Error;

use crate::parser::ParseError;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Longest raw response body kept inside an error message
pub const MAX_MESSAGE_LEN: usize = 500;

/// Error codes reported by dependencies that are worth retrying
const TRANSIENT_CODES: &[&str] = &[
    "ThrottlingException",
    "TooManyRequestsException",
    "ServiceUnavailable",
    "InternalServerError",
    "RequestTimeout",
    "ECONNRESET",
    "ETIMEDOUT",
    "ECONNREFUSED",
    "EPIPE",
];

/// Message fragments that indicate a dropped or stalled connection
const TRANSIENT_FRAGMENTS: &[&str] = &[
    "econnreset",
    "etimedout",
    "connection reset",
    "connection refused",
    "broken pipe",
    "timed out",
];

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to parse pipeline definition: {0}")]
    Parse(#[from] ParseError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid pipeline definition: {0}")]
    InvalidDefinition(String),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Unsupported artifact type '{0}'")]
    UnsupportedArtifactType(String),

    /// A dependency answered with an error
    #[error("{}", describe_external(*status, code.as_deref(), message))]
    External {
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },

    #[error("{operation} timed out after {}ms", after.as_millis())]
    Timeout { operation: String, after: Duration },

    #[error("Circuit breaker '{0}' is open")]
    BreakerOpen(String),

    /// Transport failure before a response arrived
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),
}

fn describe_external(status: Option<u16>, code: Option<&str>, message: &str) -> String {
    match (status, code) {
        (Some(status), Some(code)) => format!("External call failed ({} {}): {}", status, code, message),
        (Some(status), None) => format!("External call failed ({}): {}", status, message),
        (None, Some(code)) => format!("External call failed ({}): {}", code, message),
        (None, None) => format!("External call failed: {}", message),
    }
}

impl EngineError {
    /// Build an external error from an HTTP status and raw response body
    ///
    /// A JSON body carrying `code`, `__type` or `error.code` contributes the
    /// error code; the body itself is truncated.
    pub fn from_response(status: u16, body: &str) -> Self {
        let code = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| {
                v.get("code")
                    .or_else(|| v.get("__type"))
                    .or_else(|| v.get("error").and_then(|e| e.get("code")))
                    .and_then(|c| c.as_str())
                    .map(str::to_string)
            });

        Self::External {
            status: Some(status),
            code,
            message: truncate(body, MAX_MESSAGE_LEN),
        }
    }

    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Whether this failure says something about the dependency's health
    ///
    /// Lookups that simply found nothing, and errors in the caller's own
    /// input, leave circuit breakers untouched.
    pub fn counts_against_breaker(&self) -> bool {
        matches!(
            self,
            Self::External { .. } | Self::Timeout { .. } | Self::Http(_)
        )
    }
}

impl From<ClientError> for EngineError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::RequestFailed(e) => Self::Http(e),
            ClientError::ApiError { status: 404, message } => {
                Self::NotFound(truncate(&message, MAX_MESSAGE_LEN))
            }
            ClientError::ApiError { status, message } => Self::from_response(status, &message),
            ClientError::ParseError(message) | ClientError::InvalidRequest(message) => {
                Self::External {
                    status: None,
                    code: None,
                    message: truncate(&message, MAX_MESSAGE_LEN),
                }
            }
        }
    }
}

/// Classify an error as transient (worth retrying) or permanent
///
/// Transient: throttling and availability codes, HTTP 429 and 5xx,
/// timeouts, and dropped connections. Everything else is permanent.
pub fn is_transient_error(err: &EngineError) -> bool {
    match err {
        EngineError::External {
            status,
            code,
            message,
        } => {
            matches!(status, Some(429) | Some(500..=599))
                || code.as_deref().is_some_and(|c| TRANSIENT_CODES.contains(&c))
                || has_transient_fragment(message)
        }
        EngineError::Timeout { .. } => true,
        EngineError::Http(e) => {
            e.is_timeout()
                || e.is_connect()
                || e.status()
                    .is_some_and(|s| s.as_u16() == 429 || s.is_server_error())
                || has_transient_fragment(&e.to_string())
        }
        _ => false,
    }
}

fn has_transient_fragment(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    TRANSIENT_FRAGMENTS.iter().any(|f| lower.contains(f))
        || TRANSIENT_CODES.iter().any(|c| message.contains(c))
}

/// Truncate `text` to at most `max` bytes on a char boundary
pub fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }

    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn external(status: Option<u16>, code: Option<&str>, message: &str) -> EngineError {
        EngineError::External {
            status,
            code: code.map(str::to_string),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(is_transient_error(&external(Some(429), None, "slow down")));
        assert!(is_transient_error(&external(Some(503), None, "")));
        assert!(is_transient_error(&external(
            None,
            Some("ThrottlingException"),
            "rate exceeded"
        )));
        assert!(is_transient_error(&external(None, None, "read ECONNRESET")));
        assert!(is_transient_error(&external(None, None, "operation timed out")));
        assert!(is_transient_error(&EngineError::timeout(
            "fetch_issue",
            Duration::from_secs(1)
        )));

        assert!(!is_transient_error(&external(Some(401), None, "bad token")));
        assert!(!is_transient_error(&external(Some(404), None, "missing")));
        assert!(!is_transient_error(&EngineError::NotFound("x".into())));
        assert!(!is_transient_error(&EngineError::BreakerOpen("store".into())));
        assert!(!is_transient_error(&EngineError::MissingCredentials(
            "no token".into()
        )));
    }

    #[test]
    fn test_from_response_extracts_code_and_truncates() {
        let body = format!(
            r#"{{"code":"ServiceUnavailable","detail":"{}"}}"#,
            "x".repeat(800)
        );
        match EngineError::from_response(502, &body) {
            EngineError::External {
                status,
                code,
                message,
            } => {
                assert_eq!(status, Some(502));
                assert_eq!(code.as_deref(), Some("ServiceUnavailable"));
                assert!(message.len() <= MAX_MESSAGE_LEN + 3);
            }
            other => panic!("expected external error, got {:?}", other),
        }
    }

    #[test]
    fn test_client_not_found_maps_to_not_found() {
        let err = EngineError::from(ClientError::api_error(404, "no such credential"));
        assert!(matches!(err, EngineError::NotFound(_)));
        assert!(!err.counts_against_breaker());

        let err = EngineError::from(ClientError::api_error(500, "boom"));
        assert!(err.counts_against_breaker());
        assert!(is_transient_error(&err));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        let text = "é".repeat(10);
        let cut = truncate(&text, 5);
        assert!(cut.starts_with("éé"));
        assert!(cut.ends_with("..."));
    }
}
