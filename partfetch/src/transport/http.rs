//! reqwest-backed [`Transport`].

use std::time::Duration;

use futures::TryStreamExt;
use reqwest::header::{HeaderValue, RANGE, USER_AGENT};
use reqwest::{redirect, Client};
use tracing::debug;

use super::{BoxFuture, ByteRange, HttpResponse, Transport, TransportError};

/// User-agent sent when the caller does not override it.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/93.0.4573.0 Safari/537.36";

/// Maximum number of redirects followed before a request fails.
pub const MAX_REDIRECTS: usize = 10;

/// Default timeout for HTTP requests in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 300; // 5 minutes

/// HTTP transport using an async reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    user_agent: HeaderValue,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Create a transport with the default user-agent and timeout.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_settings(DEFAULT_USER_AGENT, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a transport with a custom user-agent and request timeout.
    pub fn with_settings(user_agent: &str, timeout: Duration) -> Result<Self, TransportError> {
        let user_agent = HeaderValue::from_str(user_agent)
            .map_err(|e| TransportError::ClientBuild(format!("invalid user-agent: {}", e)))?;

        let client = Client::builder()
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            user_agent,
            timeout,
        })
    }

    /// The configured request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn send(&self, url: &str, range: Option<ByteRange>) -> Result<HttpResponse, TransportError> {
        let mut request = self.client.get(url).header(USER_AGENT, self.user_agent.clone());
        if let Some(range) = range {
            request = request.header(RANGE, range.header_value());
        }

        let response = request.send().await.map_err(|e| classify(url, e))?;

        let status = response.status();
        debug!(url, status = status.as_u16(), range = ?range, "GET");
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let headers = response.headers().clone();
        let content_length = response.content_length();
        let body = Box::pin(response.bytes_stream().map_err(std::io::Error::other));

        Ok(HttpResponse {
            status: status.as_u16(),
            headers,
            content_length,
            body,
        })
    }
}

impl Transport for ReqwestTransport {
    fn get<'a>(
        &'a self,
        url: &'a str,
        range: Option<ByteRange>,
    ) -> BoxFuture<'a, Result<HttpResponse, TransportError>> {
        Box::pin(self.send(url, range))
    }
}

fn classify(url: &str, e: reqwest::Error) -> TransportError {
    if e.is_redirect() {
        TransportError::TooManyRedirects {
            url: url.to_string(),
        }
    } else if e.is_timeout() {
        TransportError::Timeout {
            url: url.to_string(),
        }
    } else {
        TransportError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reqwest_transport_new() {
        let transport = ReqwestTransport::new().unwrap();
        assert_eq!(transport.timeout().as_secs(), DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_reqwest_transport_with_settings() {
        let transport =
            ReqwestTransport::with_settings("partfetch-test/1.0", Duration::from_secs(60)).unwrap();
        assert_eq!(transport.timeout().as_secs(), 60);
        assert_eq!(transport.user_agent, "partfetch-test/1.0");
    }

    #[test]
    fn test_reqwest_transport_rejects_invalid_user_agent() {
        let result = ReqwestTransport::with_settings("bad\nagent", Duration::from_secs(1));
        assert!(matches!(result, Err(TransportError::ClientBuild(_))));
    }
}
