//! Per-model call statistics: response-code histogram and categorized errors.
//!
//! Grounded in `BaseCustomModel._update_model_stats` in the original Python
//! source: every completed call (success or failure) updates a status-code
//! histogram and, on failure, bumps one of a small set of error categories
//! derived from keyword-scanning the error text. A summary is logged via
//! `tracing::info!` every `stats_interval` calls.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::PipelineError;

/// Coarse error categories for the periodic stats summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Timeout,
    TokensExceeded,
    ConnectionError,
    Other,
}

impl ErrorCategory {
    /// Categorize an error the way the original scans exception text for
    /// keywords ("timeout", "context length"/"maximum context", "connection").
    pub fn classify(err: &PipelineError) -> Self {
        let text = err.to_string().to_lowercase();
        if text.contains("timeout") || text.contains("timed out") {
            ErrorCategory::Timeout
        } else if text.contains("context length") || text.contains("maximum context") || text.contains("tokens_exceeded") {
            ErrorCategory::TokensExceeded
        } else if text.contains("connection") || text.contains("connect") {
            ErrorCategory::ConnectionError
        } else {
            ErrorCategory::Other
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    calls: u64,
    status_histogram: HashMap<u16, u64>,
    error_categories: HashMap<ErrorCategory, u64>,
}

/// Accumulates per-model call statistics behind a plain mutex (call volume
/// here is bounded by `batch_size`, not hot-path-sensitive).
#[derive(Debug)]
pub struct ModelStats {
    model_name: String,
    stats_interval: u64,
    inner: Mutex<Counters>,
}

impl ModelStats {
    pub fn new(model_name: impl Into<String>, stats_interval: u64) -> Self {
        Self {
            model_name: model_name.into(),
            stats_interval: stats_interval.max(1),
            inner: Mutex::new(Counters::default()),
        }
    }

    /// Record a successful call with its HTTP status code.
    pub fn record_success(&self, status: u16) {
        let mut c = self.inner.lock().expect("stats mutex poisoned");
        c.calls += 1;
        *c.status_histogram.entry(status).or_insert(0) += 1;
        self.maybe_log(&c);
    }

    /// Record a failed call, categorizing the error.
    pub fn record_failure(&self, err: &PipelineError) {
        let mut c = self.inner.lock().expect("stats mutex poisoned");
        c.calls += 1;
        if let PipelineError::HttpError { status, .. } = err {
            *c.status_histogram.entry(*status).or_insert(0) += 1;
        }
        let category = ErrorCategory::classify(err);
        *c.error_categories.entry(category).or_insert(0) += 1;
        self.maybe_log(&c);
    }

    fn maybe_log(&self, counters: &Counters) {
        if counters.calls % self.stats_interval == 0 {
            tracing::info!(
                model = %self.model_name,
                calls = counters.calls,
                status_histogram = ?counters.status_histogram,
                error_categories = ?counters.error_categories,
                "model call stats"
            );
        }
    }

    /// Total calls recorded so far (successes and failures).
    pub fn total_calls(&self) -> u64 {
        self.inner.lock().expect("stats mutex poisoned").calls
    }

    /// Snapshot of the count recorded for one error category.
    pub fn error_count(&self, category: ErrorCategory) -> u64 {
        self.inner
            .lock()
            .expect("stats mutex poisoned")
            .error_categories
            .get(&category)
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_classify_timeout() {
        let err = PipelineError::Other("request timed out after 30s".into());
        assert_eq!(ErrorCategory::classify(&err), ErrorCategory::Timeout);
    }

    #[test]
    fn test_classify_tokens_exceeded() {
        let err = PipelineError::Other("maximum context length exceeded".into());
        assert_eq!(ErrorCategory::classify(&err), ErrorCategory::TokensExceeded);
    }

    #[test]
    fn test_classify_connection_error() {
        let err = PipelineError::HttpError {
            status: 502,
            body: "connection refused".into(),
            retry_after: None,
        };
        assert_eq!(ErrorCategory::classify(&err), ErrorCategory::ConnectionError);
    }

    #[test]
    fn test_classify_other() {
        let err = PipelineError::Other("unexpected gremlin".into());
        assert_eq!(ErrorCategory::classify(&err), ErrorCategory::Other);
    }

    #[test]
    fn test_stats_accumulate() {
        let stats = ModelStats::new("test-model", 100);
        stats.record_success(200);
        stats.record_failure(&PipelineError::HttpError {
            status: 429,
            body: String::new(),
            retry_after: Some(Duration::from_secs(1)),
        });
        assert_eq!(stats.total_calls(), 2);
    }
}
