use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Bookkeeping for one logical call: how many attempts were started and how
/// long the successful one took.
///
/// One instance backs exactly one in-flight call. Reusing a context for
/// overlapping calls interleaves their counters.
#[derive(Debug, Default)]
pub(crate) struct AttemptMetadata {
    attempts: AtomicUsize,
    successful_duration_nanos: AtomicU64,
}

impl AttemptMetadata {
    pub(crate) fn reset(&self) {
        self.attempts.store(0, Ordering::Relaxed);
        self.successful_duration_nanos.store(0, Ordering::Relaxed);
    }

    pub(crate) fn begin_attempt(&self) -> usize {
        self.attempts.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Relaxed)
    }

    pub(crate) fn record_success(&self, duration: Duration) {
        let nanos = duration.as_nanos().min(u64::MAX as u128) as u64;
        self.successful_duration_nanos
            .store(nanos, Ordering::Relaxed);
    }

    pub(crate) fn successful_duration(&self) -> Duration {
        Duration::from_nanos(self.successful_duration_nanos.load(Ordering::Relaxed))
    }
}

/// Call-scoped carrier handed to [`RetryableClient::execute`](crate::RetryableClient::execute).
///
/// A context created with [`CallContext::new`] records attempt metadata that
/// can be read back once the call returns. [`CallContext::background`] carries
/// none; the call still runs, the accessors just return `None`.
///
/// Every context also owns a cancellation token. Cancelling it interrupts the
/// in-flight attempt or backoff wait.
#[derive(Clone, Debug)]
pub struct CallContext {
    metadata: Option<Arc<AttemptMetadata>>,
    cancellation: CancellationToken,
}

impl CallContext {
    pub fn new() -> Self {
        Self {
            metadata: Some(Arc::new(AttemptMetadata::default())),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn background() -> Self {
        Self {
            metadata: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Ties the call to an externally owned token, e.g. a child of a
    /// server-wide shutdown token.
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Number of attempts the last call made, if this context records metadata.
    pub fn attempts(&self) -> Option<usize> {
        self.metadata.as_deref().map(AttemptMetadata::attempts)
    }

    /// Duration of the successful attempt. Zero while no attempt has succeeded.
    pub fn successful_duration(&self) -> Option<Duration> {
        self.metadata
            .as_deref()
            .map(AttemptMetadata::successful_duration)
    }

    pub(crate) fn metadata(&self) -> Option<Arc<AttemptMetadata>> {
        self.metadata.clone()
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}
