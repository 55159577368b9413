use http::Method;
use thiserror::Error;

use crate::classify::is_permanent_transport_error;
use crate::response::Response;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransportErrorKind {
    Dns,
    Connect,
    Tls,
    UntrustedCertificate,
    RedirectLimit,
    Read,
    Timeout,
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Dns => "dns",
            Self::Connect => "connect",
            Self::Tls => "tls",
            Self::UntrustedCertificate => "untrusted_certificate",
            Self::RedirectLimit => "redirect_limit",
            Self::Read => "read",
            Self::Timeout => "timeout",
            Self::Other => "other",
        };
        formatter.write_str(text)
    }
}

/// Failure reported by a [`Transport`](crate::Transport) before any response
/// was produced.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        kind: TransportErrorKind,
        source: impl Into<BoxError>,
    ) -> Self {
        let source = source.into();
        Self {
            kind,
            message: source.to_string(),
            source: Some(source),
        }
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    InvalidUri,
    RequestBuild,
    Io,
    Transport,
    HttpStatus,
    Deserialize,
    MaxAttemptsReached,
    ElapsedTimeExceeded,
    Cancelled,
    TlsBackendInit,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidUri => "invalid_uri",
            Self::RequestBuild => "request_build",
            Self::Io => "io",
            Self::Transport => "transport",
            Self::HttpStatus => "http_status",
            Self::Deserialize => "deserialize",
            Self::MaxAttemptsReached => "max_attempts_reached",
            Self::ElapsedTimeExceeded => "elapsed_time_exceeded",
            Self::Cancelled => "cancelled",
            Self::TlsBackendInit => "tls_backend_init",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid request uri: {uri}")]
    InvalidUri { uri: String },
    #[error("failed to build http request: {source}")]
    RequestBuild {
        #[source]
        source: http::Error,
    },
    #[error("failed to buffer request body: {source}")]
    ReadRequestBody {
        #[source]
        source: std::io::Error,
    },
    #[error("invalid retry-after header value {value:?}: expected delay in whole seconds")]
    InvalidRetryAfter {
        value: String,
        response: Box<Response>,
    },
    #[error("http transport error ({kind}) for {method} {uri}: {source}")]
    Transport {
        kind: TransportErrorKind,
        method: Method,
        uri: String,
        #[source]
        source: TransportError,
    },
    #[error("http status error {status} for {method} {uri}")]
    HttpStatus {
        status: u16,
        method: Method,
        uri: String,
        response: Box<Response>,
    },
    #[error("failed to decode response json: {source}; body={body}")]
    Deserialize {
        #[source]
        source: serde_json::Error,
        body: String,
    },
    #[error("request failed {attempts} times")]
    MaxAttemptsReached {
        attempts: usize,
        #[source]
        last: Option<Box<Error>>,
    },
    #[error("retries gave up after {attempts} attempts: max elapsed time of {max_elapsed_ms}ms exceeded")]
    ElapsedTimeExceeded {
        max_elapsed_ms: u128,
        attempts: usize,
        #[source]
        last: Option<Box<Error>>,
    },
    #[error("request cancelled after {attempts} attempts")]
    Cancelled { attempts: usize },
    #[error("failed to initialize tls backend {backend}: {message}")]
    TlsBackendInit {
        backend: &'static str,
        message: String,
    },
}

impl Error {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidUri { .. } => ErrorCode::InvalidUri,
            Self::RequestBuild { .. } => ErrorCode::RequestBuild,
            Self::ReadRequestBody { .. } | Self::InvalidRetryAfter { .. } => ErrorCode::Io,
            Self::Transport { .. } => ErrorCode::Transport,
            Self::HttpStatus { .. } => ErrorCode::HttpStatus,
            Self::Deserialize { .. } => ErrorCode::Deserialize,
            Self::MaxAttemptsReached { .. } => ErrorCode::MaxAttemptsReached,
            Self::ElapsedTimeExceeded { .. } => ErrorCode::ElapsedTimeExceeded,
            Self::Cancelled { .. } => ErrorCode::Cancelled,
            Self::TlsBackendInit { .. } => ErrorCode::TlsBackendInit,
        }
    }

    /// The response that accompanied the failure, if the server produced one.
    ///
    /// Budget errors report the response of the last attempt.
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::HttpStatus { response, .. } | Self::InvalidRetryAfter { response, .. } => {
                Some(response)
            }
            Self::MaxAttemptsReached { last, .. } | Self::ElapsedTimeExceeded { last, .. } => {
                last.as_deref().and_then(Error::response)
            }
            _ => None,
        }
    }

    /// The error produced by the last attempt before a retry budget ran out.
    pub fn last_error(&self) -> Option<&Error> {
        match self {
            Self::MaxAttemptsReached { last, .. } | Self::ElapsedTimeExceeded { last, .. } => {
                last.as_deref()
            }
            _ => None,
        }
    }

    /// Attempts made before a retry budget ran out or the call was cancelled.
    pub fn attempts(&self) -> Option<usize> {
        match self {
            Self::MaxAttemptsReached { attempts, .. }
            | Self::ElapsedTimeExceeded { attempts, .. }
            | Self::Cancelled { attempts } => Some(*attempts),
            _ => None,
        }
    }

    /// Whether the failure is final for this request.
    ///
    /// Exhausted retry budgets count as final so that an outer retry layer
    /// does not start over. Cancellation does not.
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::InvalidUri { .. }
            | Self::RequestBuild { .. }
            | Self::ReadRequestBody { .. }
            | Self::InvalidRetryAfter { .. }
            | Self::Deserialize { .. }
            | Self::TlsBackendInit { .. }
            | Self::MaxAttemptsReached { .. }
            | Self::ElapsedTimeExceeded { .. } => true,
            Self::Transport { source, .. } => is_permanent_transport_error(source),
            Self::HttpStatus { status, .. } => (400..500).contains(status) && *status != 429,
            Self::Cancelled { .. } => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        self.response().map(|response| response.status().as_u16())
    }

    pub fn transport_error_kind(&self) -> Option<TransportErrorKind> {
        match self {
            Self::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
