use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, LOCATION};
use http::{HeaderMap, Method, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tokio::time::timeout;
use tracing::debug;

use crate::Result;
use crate::error::{Error, TransportError, TransportErrorKind};
use crate::request::Request;
use crate::response::Response;
use crate::util::classify_transport_error;

pub(crate) const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const DEFAULT_MAX_REDIRECTS: usize = 10;
pub(crate) const DEFAULT_MAX_RESPONSE_BODY_BYTES: usize = 8 * 1024 * 1024;
const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 8;

#[cfg(feature = "tls-rustls-ring")]
const TLS_BACKEND: &str = "tls-rustls-ring";
#[cfg(all(not(feature = "tls-rustls-ring"), feature = "tls-rustls-aws-lc-rs"))]
const TLS_BACKEND: &str = "tls-rustls-aws-lc-rs";

/// Performs one exchange with the server. Retrying is the caller's job.
///
/// The request is borrowed so the same request can be sent on every attempt.
pub trait Transport: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: &'a Request,
    ) -> BoxFuture<'a, std::result::Result<Response, TransportError>>;
}

#[derive(Clone, Debug)]
pub(crate) struct TransportOptions {
    pub(crate) request_timeout: Duration,
    pub(crate) max_redirects: usize,
    pub(crate) max_response_body_bytes: usize,
    pub(crate) pool_idle_timeout: Duration,
    pub(crate) pool_max_idle_per_host: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            max_response_body_bytes: DEFAULT_MAX_RESPONSE_BODY_BYTES,
            pool_idle_timeout: DEFAULT_POOL_IDLE_TIMEOUT,
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
        }
    }
}

type HyperClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// hyper-based transport with rustls, connection pooling, a per-hop timeout
/// and redirect following.
///
/// Following more than the configured number of redirects fails with
/// [`TransportErrorKind::RedirectLimit`].
#[derive(Clone)]
pub struct HyperTransport {
    client: HyperClient,
    options: TransportOptions,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HyperTransport")
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(feature = "tls-rustls-ring")]
fn crypto_provider() -> rustls::crypto::CryptoProvider {
    rustls::crypto::ring::default_provider()
}

#[cfg(all(not(feature = "tls-rustls-ring"), feature = "tls-rustls-aws-lc-rs"))]
fn crypto_provider() -> rustls::crypto::CryptoProvider {
    rustls::crypto::aws_lc_rs::default_provider()
}

impl HyperTransport {
    pub fn try_new() -> Result<Self> {
        Self::with_options(TransportOptions::default())
    }

    pub(crate) fn with_options(options: TransportOptions) -> Result<Self> {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        let https = HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(crypto_provider())
            .map_err(|source| Error::TlsBackendInit {
                backend: TLS_BACKEND,
                message: source.to_string(),
            })?
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .wrap_connector(http);
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(options.pool_idle_timeout)
            .pool_max_idle_per_host(options.pool_max_idle_per_host)
            .build(https);
        Ok(Self { client, options })
    }

    async fn send_once(
        &self,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: Bytes,
    ) -> std::result::Result<http::Response<Incoming>, TransportError> {
        let mut request_builder = http::Request::builder()
            .method(method.clone())
            .uri(uri.clone());
        for (name, value) in headers {
            request_builder = request_builder.header(name, value);
        }
        let request = request_builder
            .body(Full::new(body))
            .map_err(|source| TransportError::with_source(TransportErrorKind::Other, source))?;

        match timeout(self.options.request_timeout, self.client.request(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(source)) => {
                let kind = classify_transport_error(&source);
                Err(TransportError::with_source(kind, source))
            }
            Err(_) => Err(self.timeout_error()),
        }
    }

    async fn read_body(&self, body: Incoming) -> std::result::Result<Bytes, TransportError> {
        match timeout(
            self.options.request_timeout,
            read_all_body_limited(body, self.options.max_response_body_bytes),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(self.timeout_error()),
        }
    }

    fn timeout_error(&self) -> TransportError {
        TransportError::new(
            TransportErrorKind::Timeout,
            format!(
                "request timed out after {}ms",
                self.options.request_timeout.as_millis()
            ),
        )
    }

    async fn execute_following_redirects(
        &self,
        request: &Request,
    ) -> std::result::Result<Response, TransportError> {
        let mut method = request.method().clone();
        let mut uri = request.uri().clone();
        let mut headers = request.headers().clone();
        let mut body = request.body_bytes();
        let mut redirect_count = 0_usize;

        loop {
            let response = self
                .send_once(&method, &uri, &headers, body.clone())
                .await?;
            let status = response.status();

            let location = redirect_target(status, response.headers());
            if self.options.max_redirects > 0
                && let Some(location) = location
            {
                if redirect_count >= self.options.max_redirects {
                    return Err(TransportError::new(
                        TransportErrorKind::RedirectLimit,
                        format!("stopped after {} redirects", self.options.max_redirects),
                    ));
                }
                let Some(next_uri) = join_location(&uri, &location) else {
                    return Err(TransportError::new(
                        TransportErrorKind::Other,
                        format!("invalid redirect location {location}"),
                    ));
                };
                let switches_to_get = method != Method::GET
                    && (status == StatusCode::SEE_OTHER
                        || (method == Method::POST
                            && matches!(status, StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND)));
                if switches_to_get {
                    method = Method::GET;
                    body = Bytes::new();
                    headers.remove(CONTENT_LENGTH);
                    headers.remove(CONTENT_TYPE);
                }
                if origin(&uri) != origin(&next_uri) {
                    headers.remove(AUTHORIZATION);
                    headers.remove(COOKIE);
                }
                debug!(
                    status = status.as_u16(),
                    redirect = redirect_count + 1,
                    "following redirect"
                );
                uri = next_uri;
                redirect_count += 1;
                continue;
            }

            let (parts, incoming) = response.into_parts();
            let body = self.read_body(incoming).await?;
            return Ok(Response::new(parts.status, parts.headers, body));
        }
    }
}

impl Transport for HyperTransport {
    fn execute<'a>(
        &'a self,
        request: &'a Request,
    ) -> BoxFuture<'a, std::result::Result<Response, TransportError>> {
        Box::pin(self.execute_following_redirects(request))
    }
}

/// `Location` of a 301, 302, 303, 307 or 308 response.
fn redirect_target(status: StatusCode, headers: &HeaderMap) -> Option<String> {
    if !matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308) {
        return None;
    }
    headers
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(ToOwned::to_owned)
}

fn join_location(current: &Uri, location: &str) -> Option<Uri> {
    let joined = url::Url::parse(&current.to_string())
        .ok()?
        .join(location)
        .ok()?;
    joined.as_str().parse().ok()
}

/// Scheme, lowercased host and effective port.
fn origin(uri: &Uri) -> (Option<String>, Option<String>, Option<u16>) {
    let scheme = uri.scheme_str().map(str::to_ascii_lowercase);
    let port = uri.port_u16().or(match scheme.as_deref() {
        Some("https") => Some(443),
        Some("http") => Some(80),
        _ => None,
    });
    (scheme, uri.host().map(str::to_ascii_lowercase), port)
}

async fn read_all_body_limited(
    mut body: Incoming,
    max_bytes: usize,
) -> std::result::Result<Bytes, TransportError> {
    let mut collected = Vec::new();

    while let Some(frame) = body.frame().await {
        let frame =
            frame.map_err(|source| TransportError::with_source(TransportErrorKind::Read, source))?;
        if let Some(data) = frame.data_ref() {
            if collected.len().saturating_add(data.len()) > max_bytes {
                return Err(TransportError::new(
                    TransportErrorKind::Other,
                    format!("response body exceeds {max_bytes} bytes"),
                ));
            }
            collected.extend_from_slice(data);
        }
    }

    Ok(Bytes::from(collected))
}

#[cfg(test)]
mod tests {
    use http::{StatusCode, Uri};

    use super::{join_location, origin, redirect_target};

    fn location(value: &'static str) -> http::HeaderMap {
        let mut headers = http::HeaderMap::new();
        headers.insert(http::header::LOCATION, http::HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn only_redirect_statuses_yield_a_target() {
        let headers = location("/next");
        assert_eq!(
            redirect_target(StatusCode::TEMPORARY_REDIRECT, &headers).as_deref(),
            Some("/next")
        );
        assert_eq!(redirect_target(StatusCode::NOT_MODIFIED, &headers), None);
        assert_eq!(redirect_target(StatusCode::OK, &headers), None);
    }

    #[test]
    fn relative_location_resolves_against_current_uri() {
        let current: Uri = "http://127.0.0.1:8080/a/b?x=1".parse().expect("valid uri");
        let next = join_location(&current, "../loop").expect("location should resolve");
        assert_eq!(next.to_string(), "http://127.0.0.1:8080/loop");
    }

    #[test]
    fn default_ports_share_an_origin() {
        let explicit: Uri = "https://API.example.com:443/x".parse().expect("valid uri");
        let implicit: Uri = "https://api.example.com/y".parse().expect("valid uri");
        let other: Uri = "http://api.example.com/y".parse().expect("valid uri");
        assert_eq!(origin(&explicit), origin(&implicit));
        assert_ne!(origin(&implicit), origin(&other));
    }
}
