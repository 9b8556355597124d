//! Merge engine.
//!
//! Concatenates committed segments into the output file in part order, then
//! removes the segment files once the output is confirmed consistent.

use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::{FetchConfig, VerifyStrictness};
use crate::download::{DownloadError, DownloadResult};
use crate::naming::format_bytes;
use crate::segment::{segment_count, SegmentLayout};
use crate::verify::check_consistency;

/// Result of a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
    /// Size of the output file.
    pub bytes: u64,
    /// Segment files merged (or confirmed, when reused).
    pub parts: usize,
    /// The existing output was already complete and was kept.
    pub reused: bool,
    /// Segment files removed after the merge.
    pub purged: usize,
}

/// Reassembles segments into the output file.
#[derive(Debug, Clone)]
pub struct MergeEngine {
    segment_length: u64,
    strictness: VerifyStrictness,
}

impl MergeEngine {
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            segment_length: config.segment_length,
            strictness: config.verify,
        }
    }

    /// Merge the segments of `layout` into its output file.
    ///
    /// Fails with [`DownloadError::Gap`] if a part is missing and with
    /// [`DownloadError::Incomplete`] if the committed parts do not add up to
    /// `total_size`. An existing output of the right size that passes the
    /// self-consistency check is kept rather than rebuilt. Segment files are
    /// deleted only after the output is confirmed.
    pub async fn merge(
        &self,
        layout: &SegmentLayout,
        total_size: u64,
    ) -> DownloadResult<MergeReport> {
        let expected_parts = segment_count(total_size, self.segment_length);
        let files = layout.sorted_parts(Some(expected_parts))?;

        let committed: u64 = files.iter().map(|f| f.size).sum();
        if committed != total_size {
            return Err(DownloadError::Incomplete {
                expected: total_size,
                actual: committed,
            });
        }

        let output_path = layout.output_path();
        if let Ok(meta) = fs::metadata(&output_path).await {
            if meta.len() == total_size {
                match check_consistency(layout, self.segment_length, self.strictness).await {
                    Ok(_) => {
                        info!(path = %output_path.display(), "Output already merged");
                        let purged = layout.remove_segments()?;
                        return Ok(MergeReport {
                            bytes: total_size,
                            parts: files.len(),
                            reused: true,
                            purged,
                        });
                    }
                    Err(e) => {
                        warn!(path = %output_path.display(), error = %e, "Existing output is inconsistent, rebuilding");
                    }
                }
            }
        }

        info!(
            path = %output_path.display(),
            parts = files.len(),
            size = %format_bytes(total_size),
            "Merging files"
        );
        let mut output = File::create(&output_path)
            .await
            .map_err(|e| DownloadError::write(&output_path, e))?;

        let mut merged = 0u64;
        for (done, file) in files.iter().enumerate() {
            let mut input = File::open(&file.path)
                .await
                .map_err(|e| DownloadError::read(&file.path, e))?;
            merged += tokio::io::copy(&mut input, &mut output)
                .await
                .map_err(|e| DownloadError::write(&output_path, e))?;

            let progress = (done + 1) as f64 * 100.0 / files.len() as f64;
            info!(
                "Merged {}/{}: progress {:.2}%",
                format_bytes(merged),
                format_bytes(total_size),
                progress
            );
        }
        output
            .flush()
            .await
            .map_err(|e| DownloadError::write(&output_path, e))?;
        output
            .sync_all()
            .await
            .map_err(|e| DownloadError::write(&output_path, e))?;
        drop(output);

        if merged != total_size {
            return Err(DownloadError::Incomplete {
                expected: total_size,
                actual: merged,
            });
        }

        let report = check_consistency(layout, self.segment_length, self.strictness).await?;
        debug!(checked = report.checked, "Merged output verified");

        let purged = layout.remove_segments()?;
        Ok(MergeReport {
            bytes: merged,
            parts: files.len(),
            reused: false,
            purged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::plan;
    use crate::transport::mock::payload;
    use tempfile::TempDir;

    fn engine() -> MergeEngine {
        MergeEngine::new(&FetchConfig::default().with_segment_length(300))
    }

    fn setup() -> (TempDir, SegmentLayout, Vec<u8>) {
        let temp = TempDir::new().unwrap();
        let layout = SegmentLayout::new(temp.path(), "dump.rar");
        let data = payload(1000);
        for segment in plan(1000, 300).values() {
            let bytes = &data[segment.start as usize..segment.end() as usize];
            std::fs::write(layout.part_path(segment.part()), bytes).unwrap();
        }
        (temp, layout, data)
    }

    #[tokio::test]
    async fn test_merge_reassembles_source_bytes() {
        let (_temp, layout, data) = setup();

        let report = engine().merge(&layout, 1000).await.unwrap();

        assert_eq!(report.bytes, 1000);
        assert_eq!(report.parts, 4);
        assert!(!report.reused);
        assert_eq!(report.purged, 4);
        assert_eq!(std::fs::read(layout.output_path()).unwrap(), data);
        assert!(layout.discover().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_merge_truncates_wrong_size_output() {
        let (_temp, layout, data) = setup();
        std::fs::write(layout.output_path(), vec![9u8; 4000]).unwrap();

        engine().merge(&layout, 1000).await.unwrap();

        assert_eq!(std::fs::read(layout.output_path()).unwrap(), data);
    }

    #[tokio::test]
    async fn test_merge_keeps_consistent_output() {
        let (_temp, layout, data) = setup();
        std::fs::write(layout.output_path(), &data).unwrap();

        let report = engine().merge(&layout, 1000).await.unwrap();

        assert!(report.reused);
        assert_eq!(report.purged, 4);
    }

    #[tokio::test]
    async fn test_merge_fails_on_gap() {
        let (_temp, layout, _data) = setup();
        std::fs::remove_file(layout.part_path(3)).unwrap();

        let err = engine().merge(&layout, 1000).await.unwrap_err();

        assert!(matches!(err, DownloadError::Gap { part: 3 }));
        assert!(!layout.output_path().exists());
        assert_eq!(layout.discover().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_merge_fails_when_incomplete() {
        let (_temp, layout, data) = setup();
        std::fs::write(layout.part_path(4), &data[900..950]).unwrap();

        let err = engine().merge(&layout, 1000).await.unwrap_err();

        assert!(matches!(
            err,
            DownloadError::Incomplete {
                expected: 1000,
                actual: 950
            }
        ));
        assert!(!layout.output_path().exists());
    }
}
