use std::time::Duration;
use thiserror::Error;

/// Errors produced by the execution core and its components.
///
/// Variants map onto the error taxonomy of semantic kinds (not wire types):
/// retryable/non-retryable transport, parse errors, configuration errors,
/// server-down trips, and record-level fatals. See [`ErrorKind`] for the
/// caller-facing classification attached to a failed record's output.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Low-level HTTP transport failure (connection refused, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON parsing failed at the serde level.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing failed while loading graph or model configuration.
    #[error("YAML parsing failed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The pipeline or payload was cancelled via the cancellation flag.
    #[error("execution was cancelled")]
    Cancelled,

    /// Invalid configuration detected at build time: missing required key,
    /// unknown node type, unknown function reference. Fatal; aborts the
    /// batch at startup (spec §7 "Configuration error").
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// HTTP error with status code, response body, and optional Retry-After hint.
    ///
    /// Returned by [`ModelAdapter`](crate::adapter::ModelAdapter) implementations
    /// when the provider returns a non-success status code. `retry_after` is
    /// populated from the `Retry-After` response header when present.
    #[error("HTTP {status}: {body}")]
    HttpError {
        /// HTTP status code (e.g. 429, 500, 503).
        status: u16,
        /// Response body text.
        body: String,
        /// Parsed `Retry-After` header value, if present.
        retry_after: Option<Duration>,
    },

    /// A record-level fatal: step-limit exceeded, unresolvable routing, or an
    /// exception escaping a Lambda node body. Fails only the record that
    /// produced it; the batch orchestrator records this as the record's
    /// `error` field and continues with the next record (spec §7
    /// "Record-level fatal").
    #[error("node '{node}' failed: {message}")]
    RecordFatal { node: String, message: String },

    /// The server-down circuit breaker tripped: `MAX_FAILED_ERROR` failures
    /// for one model within `MODEL_FAILURE_WINDOW_IN_SEC` seconds. Fatal;
    /// terminates the process (spec §4.2 "Server-down circuit breaker").
    #[error("model '{model}' considered down: {count} failures within {window_secs}s")]
    ServerDown {
        model: String,
        count: usize,
        window_secs: u64,
    },

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Caller-facing classification of a failed record, written into a record's
/// `error.kind` field in the output sink (spec §7 "User-visible failure").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimited,
    ServerError,
    ParseError,
    SchemaViolation,
    RecordFatal,
    Cancelled,
    Other,
}

impl PipelineError {
    /// Classify this error for the record-level error report.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::HttpError { status, .. } if *status == 429 => ErrorKind::RateLimited,
            PipelineError::HttpError { status, .. } if is_retryable_status(*status) => {
                ErrorKind::ServerError
            }
            PipelineError::HttpError { .. } => ErrorKind::Other,
            PipelineError::Json(_) | PipelineError::Yaml(_) => ErrorKind::ParseError,
            PipelineError::RecordFatal { .. } => ErrorKind::RecordFatal,
            PipelineError::Cancelled => ErrorKind::Cancelled,
            _ => ErrorKind::Other,
        }
    }
}

/// The fixed retryable HTTP status set (spec §4.2 "Retry loop").
pub const RETRYABLE_STATUS_CODES: &[u16] = &[429, 500, 502, 503, 504, 599, 444];

/// The server-down status set (spec §4.2 "Server-down circuit breaker").
pub const SERVER_DOWN_STATUS_CODES: &[u16] = &[404, 500, 502, 503];

pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUS_CODES.contains(&status)
}

pub fn is_server_down_status(status: u16) -> bool {
    SERVER_DOWN_STATUS_CODES.contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_set() {
        for code in [429, 500, 502, 503, 504, 599, 444] {
            assert!(is_retryable_status(code), "{code} should be retryable");
        }
        for code in [200, 400, 401, 403, 413] {
            assert!(!is_retryable_status(code), "{code} should not be retryable");
        }
    }

    #[test]
    fn test_server_down_set() {
        assert!(is_server_down_status(404));
        assert!(is_server_down_status(503));
        assert!(!is_server_down_status(429));
    }

    #[test]
    fn test_error_kind_classification() {
        let e = PipelineError::HttpError {
            status: 429,
            body: String::new(),
            retry_after: None,
        };
        assert_eq!(e.kind(), ErrorKind::RateLimited);

        let e = PipelineError::RecordFatal {
            node: "n".into(),
            message: "boom".into(),
        };
        assert_eq!(e.kind(), ErrorKind::RecordFatal);
    }
}
