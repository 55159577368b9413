use std::io::{Cursor, Read};

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, Uri};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::Result;
use crate::error::Error;
use crate::util::{parse_header_name, parse_header_value};

/// A request body that can be read from the start any number of times.
///
/// The whole payload is held in memory for as long as the request lives, so
/// every attempt sends the same bytes even when an earlier attempt failed part
/// way through an upload. Large uploads pay for that copy.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplayableBody {
    bytes: Bytes,
}

impl ReplayableBody {
    pub fn from_reader<R>(mut reader: R) -> Result<Self>
    where
        R: Read,
    {
        let mut buffer = Vec::new();
        reader
            .read_to_end(&mut buffer)
            .map_err(|source| Error::ReadRequestBody { source })?;
        Ok(Self {
            bytes: Bytes::from(buffer),
        })
    }

    pub async fn from_async_reader<R>(mut reader: R) -> Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        let mut buffer = Vec::new();
        reader
            .read_to_end(&mut buffer)
            .await
            .map_err(|source| Error::ReadRequestBody { source })?;
        Ok(Self {
            bytes: Bytes::from(buffer),
        })
    }

    /// A fresh cursor positioned at the first byte.
    pub fn reader(&self) -> Cursor<Bytes> {
        Cursor::new(self.bytes.clone())
    }

    pub fn bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<Bytes> for ReplayableBody {
    fn from(bytes: Bytes) -> Self {
        Self { bytes }
    }
}

impl From<Vec<u8>> for ReplayableBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Bytes::from(bytes),
        }
    }
}

impl From<&'static str> for ReplayableBody {
    fn from(text: &'static str) -> Self {
        Self {
            bytes: Bytes::from_static(text.as_bytes()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Option<ReplayableBody>,
}

impl Request {
    pub fn new(method: Method, uri: &str) -> Result<Self> {
        let uri = parse_uri(uri)?;
        Ok(Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: None,
        })
    }

    pub fn get(uri: &str) -> Result<Self> {
        Self::new(Method::GET, uri)
    }

    /// Builds a request whose body is buffered from `body` up front.
    pub fn replayable<R>(method: Method, uri: &str, body: R) -> Result<Self>
    where
        R: Read,
    {
        let body = ReplayableBody::from_reader(body)?;
        Ok(Self::new(method, uri)?.body(body))
    }

    pub async fn replayable_async<R>(method: Method, uri: &str, body: R) -> Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        let body = ReplayableBody::from_async_reader(body).await?;
        Ok(Self::new(method, uri)?.body(body))
    }

    pub fn with_bytes(method: Method, uri: &str, body: impl Into<Bytes>) -> Result<Self> {
        Ok(Self::new(method, uri)?.body(ReplayableBody::from(body.into())))
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn try_header(self, name: &str, value: &str) -> Result<Self> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(value)?;
        Ok(self.header(name, value))
    }

    pub fn body(mut self, body: impl Into<ReplayableBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn replayable_body(&self) -> Option<&ReplayableBody> {
        self.body.as_ref()
    }

    /// The payload for one attempt; empty when the request carries no body.
    pub fn body_bytes(&self) -> Bytes {
        self.body
            .as_ref()
            .map(ReplayableBody::bytes)
            .unwrap_or_default()
    }
}

fn parse_uri(uri: &str) -> Result<Uri> {
    let parsed: Uri = uri.parse().map_err(|_| Error::InvalidUri {
        uri: uri.to_owned(),
    })?;
    let scheme_ok = parsed.scheme_str().is_some_and(|scheme| {
        scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")
    });
    if !scheme_ok || parsed.host().is_none() {
        return Err(Error::InvalidUri {
            uri: uri.to_owned(),
        });
    }
    Ok(parsed)
}
