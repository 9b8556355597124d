//! Self-consistency check of the merged output.

use std::io::SeekFrom;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

use super::read_window;
use crate::config::VerifyStrictness;
use crate::download::{DownloadError, DownloadResult};
use crate::segment::SegmentLayout;

/// Result of a self-consistency check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// Segment files compared.
    pub checked: usize,
    /// Parts whose output region was re-copied.
    pub repaired: Vec<u32>,
}

/// Compare every committed segment of `layout` with its region of the
/// merged output.
///
/// Part `N` is expected at offset `segment_length * (N - 1)`. A mismatched
/// region is re-copied from the segment file once and compared again; a
/// second mismatch fails with [`DownloadError::Integrity`]. Missing parts
/// fail with [`DownloadError::Gap`].
pub async fn check_consistency(
    layout: &SegmentLayout,
    segment_length: u64,
    strictness: VerifyStrictness,
) -> DownloadResult<ConsistencyReport> {
    let output_path = layout.output_path();
    let mut output = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&output_path)
        .await
        .map_err(|e| DownloadError::read(&output_path, e))?;
    let output_len = output
        .metadata()
        .await
        .map_err(|e| DownloadError::read(&output_path, e))?
        .len();

    let mut report = ConsistencyReport::default();
    for file in layout.sorted_parts(None)? {
        let offset = segment_length * u64::from(file.part - 1);
        if offset + file.size > output_len {
            return Err(DownloadError::Integrity {
                path: output_path,
                offset,
            });
        }

        let window = strictness.window_for(file.size);
        let mut part = File::open(&file.path)
            .await
            .map_err(|e| DownloadError::read(&file.path, e))?;
        let expected = read_window(&mut part, &file.path, 0, window).await?;
        let actual = read_window(&mut output, &output_path, offset, window).await?;
        report.checked += 1;
        if actual == expected {
            continue;
        }

        warn!(part = file.part, offset, "Output differs from segment, re-copying");
        part.seek(SeekFrom::Start(0))
            .await
            .map_err(|e| DownloadError::read(&file.path, e))?;
        output
            .seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| DownloadError::write(&output_path, e))?;
        let copied = tokio::io::copy(&mut part, &mut output)
            .await
            .map_err(|e| DownloadError::write(&output_path, e))?;
        output
            .flush()
            .await
            .map_err(|e| DownloadError::write(&output_path, e))?;

        let actual = read_window(&mut output, &output_path, offset, window).await?;
        if copied != file.size || actual != expected {
            return Err(DownloadError::Integrity {
                path: output_path,
                offset,
            });
        }
        report.repaired.push(file.part);
    }

    debug!(
        checked = report.checked,
        repaired = report.repaired.len(),
        "Self-consistency check finished"
    );
    Ok(report)
}
