//! Segment planning and on-disk segment bookkeeping.
//!
//! - [`plan`] partitions a target into fixed-size [`Segment`]s
//! - [`SegmentLayout`] names, discovers and gap-checks segment files
//! - [`AssetDirectory`] scopes all files of the current target
//! - [`PendingSet`] tracks which segments still need downloading

mod files;
mod pending;
mod plan;

pub use files::{check_contiguous, AssetDirectory, SegmentFile, SegmentLayout, TEMP_EXTENSION};
pub use pending::PendingSet;
pub use plan::{check_plan, plan, segment_count, Segment, SegmentPlan};
