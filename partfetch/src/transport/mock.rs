//! In-memory transport for tests.
//!
//! Compiled for this crate's unit tests and, with the `test-util` feature,
//! for integration tests and downstream crates.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE};
use tokio_util::sync::CancellationToken;

use super::{BodyStream, BoxFuture, ByteRange, HttpResponse, Transport, TransportError};

/// Serves one fixed resource from memory for every URL except those
/// registered with [`with_page`](Self::with_page).
pub struct MemoryTransport {
    data: Bytes,
    pages: HashMap<String, Bytes>,
    honor_ranges: bool,
    chunk_size: usize,
    /// Remaining injected failures keyed by requested range start.
    failures: Mutex<HashMap<u64, usize>>,
    requests: AtomicUsize,
    ranges: Mutex<Vec<Option<ByteRange>>>,
    headers: HeaderMap,
    /// Cancel this token when the body chunk at this position is read.
    cancel_at: Option<(usize, CancellationToken)>,
}

impl MemoryTransport {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pages: HashMap::new(),
            honor_ranges: true,
            chunk_size: 64,
            failures: Mutex::new(HashMap::new()),
            requests: AtomicUsize::new(0),
            ranges: Mutex::new(Vec::new()),
            headers: HeaderMap::new(),
            cancel_at: None,
        }
    }

    /// Serve `body` with status 200 for exactly `url`.
    pub fn with_page(mut self, url: &str, body: &str) -> Self {
        self.pages
            .insert(url.to_string(), Bytes::copy_from_slice(body.as_bytes()));
        self
    }

    /// Answer every request with the full body and status 200.
    pub fn ignoring_ranges(mut self) -> Self {
        self.honor_ranges = false;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_content_disposition(mut self, value: &'static str) -> Self {
        self.headers
            .insert(CONTENT_DISPOSITION, HeaderValue::from_static(value));
        self
    }

    pub fn with_content_type(mut self, value: &'static str) -> Self {
        self.headers.insert(CONTENT_TYPE, HeaderValue::from_static(value));
        self
    }

    /// Fail the next `times` requests whose range starts at `start`.
    pub fn fail_range(self, start: u64, times: usize) -> Self {
        self.failures.lock().insert(start, times);
        self
    }

    /// Cancel `token` once a body yields its chunk number `chunk`.
    pub fn cancelling_at(mut self, chunk: usize, token: CancellationToken) -> Self {
        self.cancel_at = Some((chunk, token));
        self
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Ranges requested so far, in arrival order.
    pub fn ranges(&self) -> Vec<Option<ByteRange>> {
        self.ranges.lock().clone()
    }

    fn respond(&self, url: &str, range: Option<ByteRange>) -> Result<HttpResponse, TransportError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.ranges.lock().push(range);

        let start = range.map(|r| r.start).unwrap_or(0);
        {
            let mut failures = self.failures.lock();
            if let Some(remaining) = failures.get_mut(&start) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(TransportError::Request {
                        url: url.to_string(),
                        reason: "injected failure".to_string(),
                    });
                }
            }
        }

        if let Some(page) = self.pages.get(url) {
            return Ok(HttpResponse {
                status: 200,
                headers: HeaderMap::new(),
                content_length: Some(page.len() as u64),
                body: chunked(page.clone(), self.chunk_size, None),
            });
        }

        let len = self.data.len() as u64;
        let (status, body) = match range {
            Some(range) if self.honor_ranges => {
                if range.start >= len {
                    return Err(TransportError::Status {
                        url: url.to_string(),
                        status: 416,
                    });
                }
                let end = range.end.map(|e| e.min(len - 1)).unwrap_or(len - 1);
                (206, self.data.slice(range.start as usize..=end as usize))
            }
            _ => (200, self.data.clone()),
        };

        Ok(HttpResponse {
            status,
            headers: self.headers.clone(),
            content_length: Some(body.len() as u64),
            body: chunked(body, self.chunk_size, self.cancel_at.clone()),
        })
    }
}

impl Transport for MemoryTransport {
    fn get<'a>(
        &'a self,
        url: &'a str,
        range: Option<ByteRange>,
    ) -> BoxFuture<'a, Result<HttpResponse, TransportError>> {
        Box::pin(async move { self.respond(url, range) })
    }
}

fn chunked(
    body: Bytes,
    chunk_size: usize,
    cancel_at: Option<(usize, CancellationToken)>,
) -> BodyStream {
    let mut chunks: Vec<io::Result<Bytes>> = Vec::new();
    let mut offset = 0;
    while offset < body.len() {
        let end = (offset + chunk_size).min(body.len());
        chunks.push(Ok(body.slice(offset..end)));
        offset = end;
    }
    match cancel_at {
        Some((at, token)) => Box::pin(stream::iter(chunks).enumerate().map(move |(i, chunk)| {
            if i == at {
                token.cancel();
            }
            chunk
        })),
        None => Box::pin(stream::iter(chunks)),
    }
}

/// Deterministic test payload of `len` bytes.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
