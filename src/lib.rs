//! `retryable` wraps an HTTP transport with exponential backoff, `429 Too Many
//! Requests` cooperation and per-call attempt metadata.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use retryable::prelude::{CallContext, Request, RetryableClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = RetryableClient::builder()
//!         .max_retries(4)
//!         .max_interval(Duration::from_secs(5))
//!         .max_elapsed_time(Duration::from_secs(30))
//!         .try_build()?;
//!
//!     let request = Request::with_bytes(
//!         http::Method::POST,
//!         "https://api.example.com/v1/uploads",
//!         r#"{"msg":"hello, world!"}"#,
//!     )?;
//!     let context = CallContext::new();
//!     let response = client.execute(&context, &request).await?;
//!
//!     println!("status={}", response.status());
//!     println!("attempts={:?}", context.attempts());
//!     println!("successful attempt took {:?}", context.successful_duration());
//!     Ok(())
//! }
//! ```
//!
//! # Retry Rules
//!
//! - Redirect loops, untrusted certificates and 4xx responses other than 429
//!   fail immediately.
//! - 429 waits for `Retry-After` seconds (one second when absent) and restarts
//!   backoff growth. A `Retry-After` that is not a whole number of seconds
//!   fails the call.
//! - Everything else is retried with exponential backoff until `max_retries`
//!   or `max_elapsed_time` runs out.

#[cfg(all(not(feature = "tls-rustls-ring"), not(feature = "tls-rustls-aws-lc-rs")))]
compile_error!(
    "retryable requires one TLS backend feature: enable `tls-rustls-ring` or `tls-rustls-aws-lc-rs`"
);

mod backoff;
mod classify;
mod client;
mod context;
mod error;
mod metrics;
mod observe;
mod request;
mod response;
mod retry;
mod transport;
mod util;

pub use crate::backoff::{Backoff, BackoffFactory, ExponentialBackoff, ExponentialBackoffPolicy};
pub use crate::classify::{
    DEFAULT_RATE_LIMIT_WAIT, Outcome, classify, is_redirect_loop_message,
    is_untrusted_certificate_message,
};
pub use crate::client::{RetryableClient, RetryableClientBuilder};
pub use crate::context::CallContext;
pub use crate::error::{Error, ErrorCode, TransportError, TransportErrorKind};
pub use crate::metrics::MetricsSnapshot;
pub use crate::observe::{AttemptContext, Observer};
pub use crate::request::{ReplayableBody, Request};
pub use crate::response::Response;
pub use crate::retry::RetryConfig;
pub use crate::transport::{HyperTransport, Transport};

pub use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, Error>;

pub mod prelude {
    pub use crate::{
        CallContext, Error, ErrorCode, MetricsSnapshot, Outcome, ReplayableBody, Request,
        Response, Result, RetryConfig, RetryableClient, Transport, TransportError,
        TransportErrorKind,
    };
}

#[cfg(test)]
mod tests;
