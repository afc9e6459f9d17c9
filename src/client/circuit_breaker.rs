//! Server-down circuit breaker: trips when a model fails too often too fast.
//!
//! Grounded in `BaseCustomModel._handle_server_down` in the original Python
//! source: a sliding window of failure timestamps is kept per model; once
//! `MAX_FAILED_ERROR` failures land within `MODEL_FAILURE_WINDOW_IN_SEC`
//! seconds, the model is considered down and the process aborts (spec §4.2
//! "Server-down circuit breaker"). A process-wide flag lets embedders opt out
//! (the original's equivalent of a `--disable-server-down-check` knob).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Failures within this window trip the breaker.
pub const MAX_FAILED_ERROR: usize = 10;
/// Width of the sliding window, in seconds.
pub const MODEL_FAILURE_WINDOW_IN_SEC: u64 = 30;

static GLOBALLY_DISABLED: AtomicBool = AtomicBool::new(false);

/// Disable the server-down circuit breaker for the whole process.
pub fn disable_globally() {
    GLOBALLY_DISABLED.store(true, Ordering::Relaxed);
}

/// Whether the circuit breaker has been globally disabled.
pub fn is_globally_disabled() -> bool {
    GLOBALLY_DISABLED.load(Ordering::Relaxed)
}

/// Sliding window of recent failure timestamps for one model.
#[derive(Debug)]
pub struct ServerDownWindow {
    max_failures: usize,
    window: Duration,
    failures: Mutex<VecDeque<Instant>>,
}

impl ServerDownWindow {
    pub fn new() -> Self {
        Self {
            max_failures: MAX_FAILED_ERROR,
            window: Duration::from_secs(MODEL_FAILURE_WINDOW_IN_SEC),
            failures: Mutex::new(VecDeque::new()),
        }
    }

    #[cfg(test)]
    fn with_params(max_failures: usize, window: Duration) -> Self {
        Self {
            max_failures,
            window,
            failures: Mutex::new(VecDeque::new()),
        }
    }

    /// Record a failure at the current instant. Returns `Some(count)` if the
    /// window now holds `max_failures` or more entries (breaker tripped) and
    /// the breaker has not been globally disabled; `None` otherwise.
    pub fn record_failure(&self) -> Option<usize> {
        if is_globally_disabled() {
            return None;
        }
        let now = Instant::now();
        let mut failures = self.failures.lock().expect("circuit breaker mutex poisoned");
        failures.push_back(now);
        while let Some(&front) = failures.front() {
            if now.duration_since(front) > self.window {
                failures.pop_front();
            } else {
                break;
            }
        }
        if failures.len() >= self.max_failures {
            Some(failures.len())
        } else {
            None
        }
    }

    /// Clear the window, e.g. after a successful call.
    pub fn reset(&self) {
        self.failures.lock().expect("circuit breaker mutex poisoned").clear();
    }
}

impl Default for ServerDownWindow {
    fn default() -> Self {
        Self::new()
    }
}
