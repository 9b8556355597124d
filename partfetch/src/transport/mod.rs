//! HTTP transport abstraction.
//!
//! Every request the engine makes is a plain `GET`, optionally carrying a
//! `Range` header. The [`Transport`] trait captures exactly that, so the
//! download engine can be driven by the real reqwest client
//! ([`ReqwestTransport`]) or by an in-memory server in tests.
//!
//! The trait is dyn-compatible: async methods return [`BoxFuture`] so
//! transports can be shared as `Arc<dyn Transport>` across worker tasks.

mod body;
mod connectivity;
mod http;

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION, CONTENT_TYPE};
use thiserror::Error;

pub use body::{body_reader, read_step, BodyReader};
pub use connectivity::{wait_for_connection, AlwaysOnline, Connectivity, HttpConnectivity};
pub use http::{ReqwestTransport, DEFAULT_USER_AGENT, MAX_REDIRECTS};

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Response body as a stream of byte chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Errors raised by a single HTTP exchange.
///
/// The transport never retries on its own; callers decide whether an error
/// is worth another attempt.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The request could not be sent or the connection failed.
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    /// The server answered with a non-2xx status.
    #[error("received status code {status} from {url}")]
    Status { url: String, status: u16 },

    /// The redirect chain exceeded [`MAX_REDIRECTS`].
    #[error("stopped after {} redirects while fetching {url}", MAX_REDIRECTS)]
    TooManyRedirects { url: String },

    /// The request did not complete within the configured timeout.
    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// The HTTP client could not be constructed.
    #[error("failed to create HTTP client: {0}")]
    ClientBuild(String),
}

/// A byte range for the `Range` request header.
///
/// `end` is inclusive, matching the wire format. An open range (`end: None`)
/// requests everything from `start` to the end of the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    /// Range covering `length` bytes starting at `start`.
    ///
    /// `length` must be non-zero.
    pub fn span(start: u64, length: u64) -> Self {
        debug_assert!(length > 0, "byte range must not be empty");
        Self {
            start,
            end: Some(start + length.saturating_sub(1)),
        }
    }

    /// Open-ended range from `start` to the end of the resource.
    pub fn from(start: u64) -> Self {
        Self { start, end: None }
    }

    /// Number of bytes the range asks for, if bounded.
    pub fn len(&self) -> Option<u64> {
        self.end.map(|end| end - self.start + 1)
    }

    /// Returns the `Range` header value, e.g. `bytes=0-299`.
    pub fn header_value(&self) -> String {
        match self.end {
            Some(end) => format!("bytes={}-{}", self.start, end),
            None => format!("bytes={}-", self.start),
        }
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.header_value())
    }
}

/// A successful (2xx) HTTP response with an unread body.
pub struct HttpResponse {
    /// HTTP status code (200 or 206 in practice).
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Value of `Content-Length`, if the server sent one.
    pub content_length: Option<u64>,
    /// The response body.
    pub body: BodyStream,
}

impl HttpResponse {
    /// Whether the server answered a ranged request with partial content.
    pub fn is_partial(&self) -> bool {
        self.status == 206
    }

    /// Raw `Content-Disposition` header, if present and valid UTF-8.
    pub fn content_disposition(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.trim().is_empty())
    }

    /// Raw `Content-Type` header, if present and valid UTF-8.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.trim().is_empty())
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Trait for HTTP GET operations.
///
/// Implementations must:
/// - send a default user-agent unless configured otherwise
/// - follow at most [`MAX_REDIRECTS`] redirects
/// - return [`TransportError::Status`] for any non-2xx status
pub trait Transport: Send + Sync {
    /// Issue a `GET` for `url`, with a `Range` header when `range` is set.
    fn get<'a>(
        &'a self,
        url: &'a str,
        range: Option<ByteRange>,
    ) -> BoxFuture<'a, Result<HttpResponse, TransportError>>;
}

#[cfg(any(test, feature = "test-util"))]
pub mod mock;
