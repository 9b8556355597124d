//! Single-segment download with retry.
//!
//! A segment is streamed into `<base>-part-<N>.tmp` in fixed copy steps,
//! size-checked, then promoted to its committed path. A committed file with
//! the right size short-circuits the whole operation.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::{DownloadError, DownloadResult};
use super::progress::ProgressCounters;
use crate::config::FetchConfig;
use crate::retry::{retry_with_policy, RetryContext, RetryPolicy};
use crate::segment::{Segment, SegmentLayout};
use crate::transport::{body_reader, read_step, Connectivity, Transport};

/// How a segment ended up committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentOutcome {
    /// A correctly sized committed file already existed; no request was made.
    AlreadyCommitted,
    /// The segment was downloaded and promoted.
    Downloaded,
}

/// Downloads individual segments of one target.
pub struct SegmentDownloader {
    transport: Arc<dyn Transport>,
    connectivity: Arc<dyn Connectivity>,
    url: String,
    layout: SegmentLayout,
    retry: RetryPolicy,
    copy_step: usize,
    connectivity_poll: Duration,
    counters: Option<Arc<ProgressCounters>>,
}

impl SegmentDownloader {
    /// Create a downloader for `url` writing into `layout`.
    pub fn new(
        transport: Arc<dyn Transport>,
        connectivity: Arc<dyn Connectivity>,
        url: impl Into<String>,
        layout: SegmentLayout,
        config: &FetchConfig,
    ) -> Self {
        Self {
            transport,
            connectivity,
            url: url.into(),
            layout,
            retry: config.segment_retry.clone(),
            copy_step: config.copy_step,
            connectivity_poll: config.connectivity_poll,
            counters: None,
        }
    }

    /// Report received and committed bytes to `counters`.
    pub fn with_counters(mut self, counters: Arc<ProgressCounters>) -> Self {
        self.counters = Some(counters);
        self
    }

    pub fn layout(&self) -> &SegmentLayout {
        &self.layout
    }

    /// Whether `segment` has a committed file of exactly its length.
    pub async fn is_committed(&self, segment: &Segment) -> bool {
        matches!(
            fs::metadata(self.layout.part_path(segment.part())).await,
            Ok(meta) if meta.is_file() && meta.len() == segment.length
        )
    }

    /// Make sure `segment` is committed, downloading it if needed.
    ///
    /// Failed attempts are retried per the segment retry policy. The
    /// temporary file never survives this call.
    pub async fn fetch_segment(
        &self,
        segment: &Segment,
        cancel: &CancellationToken,
    ) -> DownloadResult<SegmentOutcome> {
        let part = segment.part();
        let committed = self.layout.part_path(part);

        match fs::metadata(&committed).await {
            Ok(meta) if meta.len() == segment.length => {
                debug!(part, "Segment already committed");
                return Ok(SegmentOutcome::AlreadyCommitted);
            }
            Ok(meta) => {
                warn!(
                    part,
                    expected = segment.length,
                    actual = meta.len(),
                    "Discarding committed segment with wrong size"
                );
                fs::remove_file(&committed)
                    .await
                    .map_err(|e| DownloadError::write(&committed, e))?;
            }
            Err(_) => {}
        }

        let ctx = RetryContext {
            connectivity: self.connectivity.as_ref(),
            poll_interval: self.connectivity_poll,
            cancel,
        };
        let label = format!("part {}", part);
        let result = retry_with_policy(&self.retry, ctx, &label, |attempt| {
            debug!(part, attempt, range = %segment.range(), "Downloading segment");
            self.attempt(segment, cancel)
        })
        .await;

        let temp = self.layout.temp_path(part);
        if let Err(e) = fs::remove_file(&temp).await {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %temp.display(), error = %e, "Failed to remove temp file");
            }
        }

        result?;
        if let Some(counters) = &self.counters {
            counters.mark_committed(segment.length);
        }
        Ok(SegmentOutcome::Downloaded)
    }

    /// One download attempt: ranged GET, stream to temp, size check, promote.
    async fn attempt(&self, segment: &Segment, cancel: &CancellationToken) -> DownloadResult<()> {
        let part = segment.part();
        let response = self.transport.get(&self.url, Some(segment.range())).await?;

        let reported = response.content_length.unwrap_or(0);
        if reported != segment.length {
            return Err(DownloadError::SizeMismatch {
                part,
                expected: segment.length,
                actual: reported,
            });
        }

        let temp = self.layout.temp_path(part);
        let mut file = File::create(&temp)
            .await
            .map_err(|e| DownloadError::write(&temp, e))?;
        let mut reader = body_reader(response.body);
        let mut buf = vec![0u8; self.copy_step];
        let mut written = 0u64;

        loop {
            if cancel.is_cancelled() {
                return Err(DownloadError::Cancelled);
            }
            let n = read_step(&mut reader, &mut buf)
                .await
                .map_err(|e| DownloadError::Stream {
                    url: self.url.clone(),
                    source: e,
                })?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])
                .await
                .map_err(|e| DownloadError::write(&temp, e))?;
            written += n as u64;
            if let Some(counters) = &self.counters {
                counters.add_received(n as u64);
            }
            if written > segment.length || n < buf.len() {
                break;
            }
        }

        file.flush().await.map_err(|e| DownloadError::write(&temp, e))?;
        drop(file);

        let on_disk = fs::metadata(&temp)
            .await
            .map_err(|e| DownloadError::read(&temp, e))?
            .len();
        if on_disk != segment.length {
            return Err(DownloadError::SizeMismatch {
                part,
                expected: segment.length,
                actual: on_disk,
            });
        }

        promote(&temp, &self.layout.part_path(part)).await
    }
}

/// Move `from` to `to`, copying and deleting when a rename is not possible.
pub(crate) async fn promote(from: &Path, to: &Path) -> DownloadResult<()> {
    if fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    fs::copy(from, to)
        .await
        .map_err(|e| DownloadError::write(to, e))?;
    fs::remove_file(from)
        .await
        .map_err(|e| DownloadError::write(from, e))
}
