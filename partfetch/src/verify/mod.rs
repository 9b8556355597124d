//! Segment verification.
//!
//! Two independent checks guard against silent corruption:
//!
//! - [`NetworkVerifier`] re-fetches a window at the start of every planned
//!   segment and compares it with the committed file, deleting files that
//!   differ.
//! - [`check_consistency`] compares each committed file with its region of
//!   the merged output, re-copying a mismatched region once before failing.
//!
//! Both compare bytes exactly and size their windows with
//! [`VerifyStrictness::window_for`](crate::config::VerifyStrictness::window_for).

mod consistency;
mod network;

use std::io::SeekFrom;
use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::download::{DownloadError, DownloadResult};

pub use consistency::{check_consistency, ConsistencyReport};
pub use network::{CrossCheckReport, NetworkVerifier};

/// Read up to `len` bytes of `file` starting at `offset`.
///
/// The result is shorter than `len` only when the file ends first.
pub(crate) async fn read_window(
    file: &mut File,
    path: &Path,
    offset: u64,
    len: u64,
) -> DownloadResult<Vec<u8>> {
    file.seek(SeekFrom::Start(offset))
        .await
        .map_err(|e| DownloadError::read(path, e))?;
    let mut buf = Vec::with_capacity(len as usize);
    (&mut *file)
        .take(len)
        .read_to_end(&mut buf)
        .await
        .map_err(|e| DownloadError::read(path, e))?;
    Ok(buf)
}
