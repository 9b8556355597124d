//! Segmented download engine.
//!
//! [`SegmentDownloader`] fetches one segment into its committed slot with
//! retry. [`Coordinator`] runs waves of segment downloads under a
//! concurrency ceiling until every planned segment is committed.

mod coordinator;
mod error;
mod progress;
mod segment;

pub use coordinator::{Coordinator, WaveReport, WaveState};
pub use error::{DownloadError, DownloadResult};
pub use progress::{
    log_progress, ProgressCallback, ProgressCounters, ProgressReporter, ProgressSnapshot,
};
pub use segment::{SegmentDownloader, SegmentOutcome};

pub(crate) use segment::promote;
