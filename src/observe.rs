use std::time::Duration;

use http::Method;

use crate::error::Error;

/// Where in the retry loop a call currently is.
#[derive(Clone, Debug)]
pub struct AttemptContext {
    method: Method,
    uri: String,
    attempt: usize,
    max_attempts: Option<usize>,
}

impl AttemptContext {
    pub(crate) fn new(
        method: Method,
        uri: String,
        attempt: usize,
        max_attempts: Option<usize>,
    ) -> Self {
        Self {
            method,
            uri,
            attempt,
            max_attempts,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Redacted target uri.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// 1-based attempt number.
    pub fn attempt(&self) -> usize {
        self.attempt
    }

    /// `None` when only the elapsed-time bound limits the call.
    pub fn max_attempts(&self) -> Option<usize> {
        self.max_attempts
    }
}

/// Hooks invoked synchronously from the retry loop. Implementations must not
/// block.
pub trait Observer: Send + Sync {
    fn on_attempt_start(&self, _context: &AttemptContext) {}

    fn on_retry_scheduled(&self, _context: &AttemptContext, _error: &Error, _delay: Duration) {}

    fn on_rate_limited(&self, _context: &AttemptContext, _delay: Duration) {}
}

#[derive(Debug, Default)]
pub(crate) struct NoopObserver;

impl Observer for NoopObserver {}
