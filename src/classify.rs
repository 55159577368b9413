//! Outcome classification for a single attempt.
//!
//! Typed [`TransportErrorKind`]s decide first. The message patterns below are a
//! compatibility shim for transports that only report redirect loops and
//! certificate trust failures as text.

use std::time::Duration;

use http::{Method, StatusCode};

use crate::error::{Error, TransportError, TransportErrorKind};
use crate::response::Response;
use crate::util::parse_retry_after_seconds;

/// Wait applied to a 429 that carries no `Retry-After` header.
pub const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(1);

const REDIRECT_LOOP_PREFIX: &str = "stopped after";
const REDIRECT_LOOP_SUFFIX: &str = "redirects";
const UNTRUSTED_CERTIFICATE_PATTERNS: [&str; 4] = [
    "certificate is not trusted",
    "unknownissuer",
    "unknown issuer",
    "certificate signed by unknown authority",
];

/// What the retry loop should do with the result of one attempt.
#[derive(Debug)]
pub enum Outcome {
    Success(Response),
    PermanentFailure(Error),
    TransientFailure(Error),
    /// The server asked us to slow down. `wait` is `None` when it did not say
    /// for how long.
    RateLimited {
        wait: Option<Duration>,
        response: Response,
    },
}

impl Outcome {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientFailure(_) | Self::RateLimited { .. })
    }
}

pub fn is_redirect_loop_message(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message
        .find(REDIRECT_LOOP_PREFIX)
        .is_some_and(|start| message[start..].contains(REDIRECT_LOOP_SUFFIX))
}

pub fn is_untrusted_certificate_message(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    UNTRUSTED_CERTIFICATE_PATTERNS
        .iter()
        .any(|pattern| message.contains(pattern))
}

pub(crate) fn is_permanent_transport_error(error: &TransportError) -> bool {
    match error.kind() {
        TransportErrorKind::RedirectLimit | TransportErrorKind::UntrustedCertificate => true,
        _ => {
            is_redirect_loop_message(error.message())
                || is_untrusted_certificate_message(error.message())
        }
    }
}

/// Classifies one attempt of `method uri`.
pub fn classify(method: &Method, uri: &str, result: Result<Response, TransportError>) -> Outcome {
    let response = match result {
        Ok(response) => response,
        Err(source) => {
            let permanent = is_permanent_transport_error(&source);
            let error = Error::Transport {
                kind: source.kind(),
                method: method.clone(),
                uri: uri.to_owned(),
                source,
            };
            return if permanent {
                Outcome::PermanentFailure(error)
            } else {
                Outcome::TransientFailure(error)
            };
        }
    };

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return match parse_retry_after_seconds(response.headers()) {
            Ok(wait) => Outcome::RateLimited { wait, response },
            Err(value) => Outcome::PermanentFailure(Error::InvalidRetryAfter {
                value,
                response: Box::new(response),
            }),
        };
    }

    if status.is_success() {
        return Outcome::Success(response);
    }

    let error = Error::HttpStatus {
        status: status.as_u16(),
        method: method.clone(),
        uri: uri.to_owned(),
        response: Box::new(response),
    };
    if status.is_client_error() {
        Outcome::PermanentFailure(error)
    } else {
        Outcome::TransientFailure(error)
    }
}
