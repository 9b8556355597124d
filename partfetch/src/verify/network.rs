//! Network cross-check.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::fs::{self, File};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::read_window;
use crate::config::{FetchConfig, VerifyStrictness};
use crate::download::{DownloadError, DownloadResult};
use crate::probe::DownloadTarget;
use crate::segment::{plan, Segment, SegmentLayout};
use crate::transport::{body_reader, read_step, ByteRange, Transport};

/// Result of a network cross-check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrossCheckReport {
    /// Segment files compared.
    pub checked: usize,
    /// Parts that differed from the server and were deleted.
    pub rejected: Vec<u32>,
}

impl CrossCheckReport {
    /// Whether every segment matched.
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }

    /// Convert a report with rejected parts into [`DownloadError::Rejected`].
    pub fn into_result(self) -> DownloadResult<usize> {
        if self.is_clean() {
            Ok(self.checked)
        } else {
            Err(DownloadError::Rejected {
                parts: self.rejected,
            })
        }
    }
}

/// Compares committed segments with fresh samples from the server.
pub struct NetworkVerifier {
    transport: Arc<dyn Transport>,
    strictness: VerifyStrictness,
    concurrency: usize,
    segment_length: u64,
}

impl NetworkVerifier {
    pub fn new(transport: Arc<dyn Transport>, config: &FetchConfig) -> Self {
        Self {
            transport,
            strictness: config.verify,
            concurrency: config.verify_concurrency.max(1),
            segment_length: config.segment_length,
        }
    }

    /// Cross-check every committed segment of `target` against the server.
    ///
    /// Gap detection runs first: a missing part fails with
    /// [`DownloadError::Gap`] before any request is made. A failed sample
    /// request fails the whole check without deleting anything. Segment
    /// files that differ from their sample, or that lie beyond the plan, are
    /// deleted and listed in the report.
    pub async fn cross_check(
        &self,
        target: &DownloadTarget,
        layout: &SegmentLayout,
        cancel: &CancellationToken,
    ) -> DownloadResult<CrossCheckReport> {
        let total = target.require_size()?;
        let segments = plan(total, self.segment_length);
        let files = layout.sorted_parts(Some(segments.len() as u32))?;

        let url = target.url.as_str();
        let fetches = stream::iter(segments.values().copied())
            .map(move |segment| async move {
                (segment.index, self.fetch_sample(url, &segment).await)
            })
            .buffer_unordered(self.concurrency)
            .collect::<Vec<_>>();
        let fetched = tokio::select! {
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
            fetched = fetches => fetched,
        };

        let mut samples = BTreeMap::new();
        for (index, sample) in fetched {
            samples.insert(index, sample?);
        }
        debug!(samples = samples.len(), "Fetched verification samples");

        let mut report = CrossCheckReport::default();
        for file in files {
            let matches = match samples.get(&(file.part - 1)) {
                Some(sample) => {
                    let mut handle = File::open(&file.path)
                        .await
                        .map_err(|e| DownloadError::read(&file.path, e))?;
                    let local =
                        read_window(&mut handle, &file.path, 0, sample.len() as u64).await?;
                    local == *sample
                }
                None => false,
            };
            report.checked += 1;

            if !matches {
                warn!(part = file.part, path = %file.path.display(), "Segment differs from server, deleting");
                fs::remove_file(&file.path)
                    .await
                    .map_err(|e| DownloadError::write(&file.path, e))?;
                report.rejected.push(file.part);
            }
        }

        info!(
            checked = report.checked,
            rejected = report.rejected.len(),
            "Network verification finished"
        );
        Ok(report)
    }

    /// Fetch the verification window at the start of `segment`.
    async fn fetch_sample(&self, url: &str, segment: &Segment) -> DownloadResult<Vec<u8>> {
        let window = self.strictness.window_for(segment.length);
        let response = self
            .transport
            .get(url, Some(ByteRange::span(segment.start, window)))
            .await?;

        let reported = response.content_length.unwrap_or(window);
        if reported != window {
            return Err(DownloadError::SizeMismatch {
                part: segment.part(),
                expected: window,
                actual: reported,
            });
        }

        let mut reader = body_reader(response.body);
        let mut buf = vec![0u8; window as usize];
        let n = read_step(&mut reader, &mut buf)
            .await
            .map_err(|e| DownloadError::Stream {
                url: url.to_string(),
                source: e,
            })?;
        if n as u64 != window {
            return Err(DownloadError::SizeMismatch {
                part: segment.part(),
                expected: window,
                actual: n as u64,
            });
        }
        Ok(buf)
    }
}
