use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{Instrument, debug, info_span, warn};

use crate::Result;
use crate::backoff::{BackoffFactory, ExponentialBackoffPolicy};
use crate::classify::{DEFAULT_RATE_LIMIT_WAIT, Outcome, classify};
use crate::context::{AttemptMetadata, CallContext};
use crate::error::Error;
use crate::metrics::{ClientMetrics, MetricsSnapshot};
use crate::observe::{AttemptContext, NoopObserver, Observer};
use crate::request::Request;
use crate::response::Response;
use crate::retry::RetryConfig;
use crate::transport::{HyperTransport, Transport, TransportOptions};
use crate::util::{bounded_retry_delay, redact_uri_for_logs};

const DEFAULT_CLIENT_NAME: &str = "retryable";

pub struct RetryableClientBuilder {
    retry_config: RetryConfig,
    default_rate_limit_wait: Duration,
    transport_options: TransportOptions,
    transport: Option<Arc<dyn Transport>>,
    backoff_factory: Arc<dyn BackoffFactory>,
    observer: Arc<dyn Observer>,
    client_name: String,
}

impl RetryableClientBuilder {
    fn new() -> Self {
        Self {
            retry_config: RetryConfig::default(),
            default_rate_limit_wait: DEFAULT_RATE_LIMIT_WAIT,
            transport_options: TransportOptions::default(),
            transport: None,
            backoff_factory: Arc::new(ExponentialBackoffPolicy::default()),
            observer: Arc::new(NoopObserver),
            client_name: DEFAULT_CLIENT_NAME.to_owned(),
        }
    }

    pub fn retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.retry_config = self.retry_config.max_retries(max_retries);
        self
    }

    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.retry_config = self.retry_config.max_interval(max_interval);
        self
    }

    pub fn max_elapsed_time(mut self, max_elapsed_time: Duration) -> Self {
        self.retry_config = self.retry_config.max_elapsed_time(max_elapsed_time);
        self
    }

    /// Wait applied to a 429 response without a `Retry-After` header.
    pub fn default_rate_limit_wait(mut self, wait: Duration) -> Self {
        self.default_rate_limit_wait = wait;
        self
    }

    /// Timeout for each hop of a single attempt. Has no effect with a custom
    /// [`transport`](Self::transport).
    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.transport_options.request_timeout = request_timeout.max(Duration::from_millis(1));
        self
    }

    /// Redirects followed within one attempt; zero disables following.
    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.transport_options.max_redirects = max_redirects;
        self
    }

    pub fn max_response_body_bytes(mut self, max_response_body_bytes: usize) -> Self {
        self.transport_options.max_response_body_bytes = max_response_body_bytes.max(1);
        self
    }

    pub fn pool_idle_timeout(mut self, pool_idle_timeout: Duration) -> Self {
        self.transport_options.pool_idle_timeout = pool_idle_timeout;
        self
    }

    pub fn pool_max_idle_per_host(mut self, pool_max_idle_per_host: usize) -> Self {
        self.transport_options.pool_max_idle_per_host = pool_max_idle_per_host;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn backoff_factory(mut self, backoff_factory: Arc<dyn BackoffFactory>) -> Self {
        self.backoff_factory = backoff_factory;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn client_name(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = client_name.into();
        self
    }

    pub fn try_build(self) -> Result<RetryableClient> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HyperTransport::with_options(self.transport_options)?),
        };
        Ok(RetryableClient {
            transport,
            backoff_factory: self.backoff_factory,
            observer: self.observer,
            retry_config: self.retry_config,
            default_rate_limit_wait: self.default_rate_limit_wait,
            client_name: self.client_name,
            metrics: ClientMetrics::default(),
        })
    }
}

/// Executes requests with exponential backoff, 429 cooperation and bounded
/// attempts.
///
/// Cloning is cheap; clones share the transport and metrics. Backoff state is
/// created per call, so one client can serve concurrent calls.
#[derive(Clone)]
pub struct RetryableClient {
    transport: Arc<dyn Transport>,
    backoff_factory: Arc<dyn BackoffFactory>,
    observer: Arc<dyn Observer>,
    retry_config: RetryConfig,
    default_rate_limit_wait: Duration,
    client_name: String,
    metrics: ClientMetrics,
}

impl std::fmt::Debug for RetryableClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RetryableClient")
            .field("client_name", &self.client_name)
            .field("retry_config", &self.retry_config)
            .field("default_rate_limit_wait", &self.default_rate_limit_wait)
            .finish()
    }
}

impl RetryableClient {
    pub fn new() -> Result<Self> {
        Self::builder().try_build()
    }

    pub fn builder() -> RetryableClientBuilder {
        RetryableClientBuilder::new()
    }

    pub fn retry_config(&self) -> RetryConfig {
        self.retry_config
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Sends `request`, retrying transient failures.
    ///
    /// Returns early when the server redirects too many times, presents an
    /// untrusted certificate, answers with a 4xx other than 429, or sends a
    /// 429 whose `Retry-After` is not a whole number of seconds. 429 and 5xx
    /// responses and other transport failures are retried until
    /// [`RetryConfig`] runs out.
    ///
    /// Attempt count and the duration of the successful attempt are written to
    /// `context` when it was created with [`CallContext::new`].
    pub async fn execute(&self, context: &CallContext, request: &Request) -> Result<Response> {
        self.metrics.record_call_started();
        let _in_flight = self.metrics.enter_in_flight();
        let started_at = Instant::now();
        let redacted_uri = redact_uri_for_logs(&request.uri().to_string());
        let span = info_span!(
            "retryable.call",
            client = %self.client_name,
            method = %request.method(),
            uri = %redacted_uri,
        );

        let result = self
            .execute_with_retry(context, request, redacted_uri)
            .instrument(span)
            .await;
        self.metrics
            .record_call_completed(&result, started_at.elapsed());
        result
    }

    async fn execute_with_retry(
        &self,
        context: &CallContext,
        request: &Request,
        redacted_uri: String,
    ) -> Result<Response> {
        // Contexts without metadata still get the same bookkeeping; nobody reads it.
        let metadata = context.metadata().unwrap_or_default();
        metadata.reset();

        let mut backoff = self
            .backoff_factory
            .build(self.retry_config.configured_max_interval());
        let attempt_limit = self.retry_config.attempt_limit();
        let elapsed_limit = self.retry_config.elapsed_limit();
        let method = request.method();
        let call_started_at = Instant::now();

        loop {
            if context.is_cancelled() {
                return Err(cancelled_error(&metadata));
            }

            let attempt = metadata.begin_attempt();
            self.metrics.record_attempt();
            let attempt_context =
                AttemptContext::new(method.clone(), redacted_uri.clone(), attempt, attempt_limit);
            self.observer.on_attempt_start(&attempt_context);
            debug!(attempt, "sending request");

            let started = Instant::now();
            let result = tokio::select! {
                biased;
                _ = context.cancellation_token().cancelled() => {
                    debug!(attempt, "request cancelled in flight");
                    return Err(cancelled_error(&metadata));
                }
                result = self.transport.execute(request) => result,
            };
            let attempt_duration = started.elapsed();

            let (retry_delay, error, rate_limited) = match classify(method, &redacted_uri, result) {
                Outcome::Success(response) => {
                    metadata.record_success(attempt_duration);
                    debug!(
                        attempt,
                        status = response.status().as_u16(),
                        elapsed_ms = attempt_duration.as_millis() as u64,
                        "request completed"
                    );
                    return Ok(response);
                }
                Outcome::PermanentFailure(error) => {
                    debug!(attempt, error = %error, "request failed permanently");
                    return Err(error);
                }
                Outcome::TransientFailure(error) => (backoff.next_delay(), error, false),
                Outcome::RateLimited { wait, response } => {
                    // Being throttled says nothing about the connection; start
                    // backoff growth over.
                    backoff.reset();
                    self.metrics.record_rate_limited();
                    let error = Error::HttpStatus {
                        status: response.status().as_u16(),
                        method: method.clone(),
                        uri: redacted_uri.clone(),
                        response: Box::new(response),
                    };
                    (wait.unwrap_or(self.default_rate_limit_wait), error, true)
                }
            };

            if attempt_limit.is_some_and(|limit| attempt >= limit) {
                warn!(attempt, error = %error, "attempt budget exhausted");
                return Err(Error::MaxAttemptsReached {
                    attempts: attempt,
                    last: Some(Box::new(error)),
                });
            }

            let Some(retry_delay) = bounded_retry_delay(retry_delay, elapsed_limit, call_started_at)
            else {
                let max_elapsed_time = self.retry_config.configured_max_elapsed_time();
                warn!(
                    attempt,
                    max_elapsed_ms = max_elapsed_time.as_millis() as u64,
                    error = %error,
                    "max elapsed time exceeded"
                );
                return Err(Error::ElapsedTimeExceeded {
                    max_elapsed_ms: max_elapsed_time.as_millis(),
                    attempts: attempt,
                    last: Some(Box::new(error)),
                });
            };

            warn!(
                attempt,
                delay_ms = retry_delay.as_millis() as u64,
                error = %error,
                "retrying request"
            );
            if rate_limited {
                self.observer.on_rate_limited(&attempt_context, retry_delay);
            }
            self.observer
                .on_retry_scheduled(&attempt_context, &error, retry_delay);
            self.metrics.record_retry();

            if !retry_delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = context.cancellation_token().cancelled() => {
                        debug!(attempt, "request cancelled during backoff");
                        return Err(cancelled_error(&metadata));
                    }
                    _ = sleep(retry_delay) => {}
                }
            }
        }
    }
}

fn cancelled_error(metadata: &AttemptMetadata) -> Error {
    Error::Cancelled {
        attempts: metadata.attempts(),
    }
}
