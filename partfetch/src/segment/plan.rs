//! Chunk planning.

use std::collections::BTreeMap;

use crate::download::{DownloadError, DownloadResult};
use crate::transport::ByteRange;

/// One contiguous byte range of the target, downloaded independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Segment {
    /// 0-based position in the plan.
    pub index: u32,
    /// Offset of the first byte.
    pub start: u64,
    /// Number of bytes.
    pub length: u64,
}

impl Segment {
    /// 1-based number used in segment file names.
    pub fn part(&self) -> u32 {
        self.index + 1
    }

    /// Offset one past the last byte.
    pub fn end(&self) -> u64 {
        self.start + self.length
    }

    /// The `Range` covering exactly this segment.
    pub fn range(&self) -> ByteRange {
        ByteRange::span(self.start, self.length)
    }
}

/// Ordered map from segment index to segment.
pub type SegmentPlan = BTreeMap<u32, Segment>;

/// Partition `total_size` bytes into segments of `segment_length` bytes.
///
/// All segments but the last have exactly `segment_length` bytes. Returns an
/// empty plan when either argument is zero.
pub fn plan(total_size: u64, segment_length: u64) -> SegmentPlan {
    let mut segments = SegmentPlan::new();
    if total_size == 0 || segment_length == 0 {
        return segments;
    }

    let mut start = 0;
    let mut index = 0;
    while start < total_size {
        let length = segment_length.min(total_size - start);
        segments.insert(
            index,
            Segment {
                index,
                start,
                length,
            },
        );
        start += length;
        index += 1;
    }
    segments
}

/// Number of segments `plan` produces, saturating at `u32::MAX`.
pub fn segment_count(total_size: u64, segment_length: u64) -> u32 {
    if segment_length == 0 {
        return 0;
    }
    u32::try_from(total_size.div_ceil(segment_length)).unwrap_or(u32::MAX)
}

/// Reject a plan whose parts cannot all be numbered.
///
/// Part numbers are 1-based `u32`s, so at most `u32::MAX` segments fit.
pub fn check_plan(total_size: u64, segment_length: u64) -> DownloadResult<u32> {
    if segment_length == 0 {
        return Err(DownloadError::InvalidConfig(
            "segment length must be greater than zero".to_string(),
        ));
    }
    let count = total_size.div_ceil(segment_length);
    u32::try_from(count).map_err(|_| {
        DownloadError::InvalidConfig(format!(
            "{} bytes in {}-byte segments needs {} segments, more than {} allowed",
            total_size,
            segment_length,
            count,
            u32::MAX
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_plan_uneven_tail() {
        let segments = plan(1000, 300);
        let layout: Vec<(u64, u64)> = segments.values().map(|s| (s.start, s.length)).collect();
        assert_eq!(layout, vec![(0, 300), (300, 300), (600, 300), (900, 100)]);
        assert_eq!(segments[&3].part(), 4);
        assert_eq!(segments[&3].range().header_value(), "bytes=900-999");
    }

    #[test]
    fn test_plan_exact_multiple() {
        let segments = plan(900, 300);
        assert_eq!(segments.len(), 3);
        assert!(segments.values().all(|s| s.length == 300));
    }

    #[test]
    fn test_plan_smaller_than_segment() {
        let segments = plan(10, 300);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[&0], Segment { index: 0, start: 0, length: 10 });
    }

    #[test]
    fn test_check_plan_limits_segment_count() {
        assert_eq!(check_plan(1000, 300).unwrap(), 4);
        assert_eq!(check_plan(u32::MAX as u64, 1).unwrap(), u32::MAX);

        let err = check_plan(u32::MAX as u64 + 1, 1).unwrap_err();
        assert!(matches!(err, DownloadError::InvalidConfig(_)));
        assert!(!err.is_retryable());
        assert!(matches!(check_plan(1000, 0), Err(DownloadError::InvalidConfig(_))));
        assert_eq!(segment_count(u64::MAX, 1), u32::MAX);
    }

    #[test]
    fn test_plan_zero() {
        assert!(plan(0, 300).is_empty());
        assert!(plan(300, 0).is_empty());
        assert_eq!(segment_count(0, 300), 0);
    }

    proptest! {
        #[test]
        fn prop_plan_partitions_exactly(total in 1u64..1_000_000, len in 500u64..100_000) {
            let segments = plan(total, len);

            prop_assert_eq!(segments.len() as u32, segment_count(total, len));

            let mut expected_start = 0;
            for (i, (key, seg)) in segments.iter().enumerate() {
                prop_assert_eq!(*key, i as u32);
                prop_assert_eq!(seg.index, i as u32);
                prop_assert_eq!(seg.start, expected_start);
                prop_assert!(seg.length > 0);
                if (i + 1) < segments.len() {
                    prop_assert_eq!(seg.length, len);
                } else {
                    prop_assert!(seg.length <= len);
                }
                expected_start = seg.end();
            }
            prop_assert_eq!(expected_start, total);
        }
    }
}
