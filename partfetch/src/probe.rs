//! Capability probing.
//!
//! Establishes what is being downloaded before any segment is planned: the
//! resolved file name, the total size, and whether the server honours byte
//! ranges.

use tracing::{debug, info};

use crate::download::{DownloadError, DownloadResult};
use crate::naming;
use crate::retry::{retry_with_policy, RetryContext, RetryPolicy};
use crate::transport::{ByteRange, Transport};

/// Offset of the ranged request used to detect resumability.
pub const RESUME_PROBE_OFFSET: u64 = 1024;

/// A remote file and its probed metadata.
///
/// A `total_size` of zero means the server did not report a length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    /// Source URL.
    pub url: String,
    /// Resolved, sanitized file name.
    pub name: String,
    /// Total size in bytes.
    pub total_size: u64,
}

impl DownloadTarget {
    /// Creates a target from already-known metadata.
    pub fn new(url: impl Into<String>, name: impl Into<String>, total_size: u64) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            total_size,
        }
    }

    /// Fails with [`DownloadError::Probe`] when the size is unknown.
    pub fn require_size(&self) -> DownloadResult<u64> {
        if self.total_size == 0 {
            Err(DownloadError::Probe {
                url: self.url.clone(),
                reason: "server did not report a content length".to_string(),
            })
        } else {
            Ok(self.total_size)
        }
    }
}

/// Fetch headers for `url` and resolve the target's name and size.
///
/// The request is a plain `GET` whose body is discarded. Transient failures
/// are retried according to `policy`.
pub async fn probe_headers(
    transport: &dyn Transport,
    url: &str,
    policy: &RetryPolicy,
    ctx: RetryContext<'_>,
) -> DownloadResult<DownloadTarget> {
    let response = retry_with_policy(policy, ctx, "probe", |attempt| async move {
        debug!(url, attempt, "Probing headers");
        transport.get(url, None).await.map_err(DownloadError::from)
    })
    .await?;

    let name = naming::resolve_filename(
        url,
        response.content_disposition(),
        response.content_type(),
    );
    let total_size = response.content_length.unwrap_or(0);

    info!(url, name = %name, size = total_size, "Probed target");

    Ok(DownloadTarget {
        url: url.to_string(),
        name,
        total_size,
    })
}

/// Whether the server honours byte ranges for `url`.
///
/// Issues a plain request and a `Range: bytes=1024-` request concurrently.
/// The resource is resumable only if both report a positive length and the
/// lengths differ. Any failure counts as not resumable.
pub async fn can_resume(transport: &dyn Transport, url: &str) -> bool {
    let (plain, ranged) = tokio::join!(
        transport.get(url, None),
        transport.get(url, Some(ByteRange::from(RESUME_PROBE_OFFSET))),
    );

    let plain = plain.ok().and_then(|r| r.content_length).unwrap_or(0);
    let ranged = ranged.ok().and_then(|r| r.content_length).unwrap_or(0);
    let resumable = plain > 0 && ranged > 0 && plain != ranged;

    debug!(url, plain, ranged, resumable, "Resume probe");
    resumable
}
