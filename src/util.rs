use std::sync::Mutex;
use std::time::{Duration, Instant};

use http::HeaderMap;
use http::header::{HeaderName, HeaderValue, RETRY_AFTER};

use crate::classify::is_untrusted_certificate_message;
use crate::error::{Error, TransportErrorKind};

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub(crate) fn redact_uri_for_logs(uri_text: &str) -> String {
    let Ok(mut parsed) = url::Url::parse(uri_text) else {
        return uri_text.split('?').next().unwrap_or(uri_text).to_owned();
    };

    let _ = parsed.set_username("");
    let _ = parsed.set_password(None);
    parsed.set_query(None);
    parsed.set_fragment(None);
    parsed.to_string()
}

pub(crate) fn parse_header_name(name: &str) -> Result<HeaderName, Error> {
    name.parse().map_err(|source| Error::RequestBuild {
        source: http::Error::from(source),
    })
}

pub(crate) fn parse_header_value(value: &str) -> Result<HeaderValue, Error> {
    value.parse().map_err(|source| Error::RequestBuild {
        source: http::Error::from(source),
    })
}

/// Parses `Retry-After` as delta-seconds.
///
/// `Ok(None)` when the header is absent or blank. `Err` carries the raw value
/// when it is present but not a non-negative integer.
pub(crate) fn parse_retry_after_seconds(headers: &HeaderMap) -> Result<Option<Duration>, String> {
    let Some(value) = headers.get(RETRY_AFTER) else {
        return Ok(None);
    };
    let raw_value = String::from_utf8_lossy(value.as_bytes());
    let trimmed = raw_value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<u64>()
        .map(|seconds| Some(Duration::from_secs(seconds)))
        .map_err(|_| raw_value.into_owned())
}

/// `None` when sleeping for `retry_delay` would overrun the elapsed-time bound.
pub(crate) fn bounded_retry_delay(
    retry_delay: Duration,
    max_elapsed_time: Option<Duration>,
    call_started_at: Instant,
) -> Option<Duration> {
    let Some(max_elapsed_time) = max_elapsed_time else {
        return Some(retry_delay);
    };

    let elapsed = call_started_at.elapsed();
    if elapsed >= max_elapsed_time {
        return None;
    }

    let remaining = max_elapsed_time - elapsed;
    if retry_delay > remaining {
        return None;
    }
    Some(retry_delay)
}

pub(crate) fn classify_transport_error(
    error: &hyper_util::client::legacy::Error,
) -> TransportErrorKind {
    let text = error_chain_text(error);
    if error.is_connect() {
        if text.contains("dns")
            || text.contains("name or service not known")
            || text.contains("failed to lookup address")
        {
            return TransportErrorKind::Dns;
        }
        if is_untrusted_certificate_message(&text) {
            return TransportErrorKind::UntrustedCertificate;
        }
        if text.contains("tls") || text.contains("certificate") || text.contains("handshake") {
            return TransportErrorKind::Tls;
        }
        return TransportErrorKind::Connect;
    }

    if text.contains("read")
        || text.contains("connection reset")
        || text.contains("broken pipe")
        || text.contains("unexpected eof")
        || text.contains("connection closed")
    {
        return TransportErrorKind::Read;
    }

    TransportErrorKind::Other
}

/// Lowercased messages of the error and all of its sources.
pub(crate) fn error_chain_text(error: &(dyn std::error::Error + 'static)) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text.to_ascii_lowercase()
}
