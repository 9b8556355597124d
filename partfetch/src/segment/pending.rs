//! Shared set of segments still to be downloaded.

use std::sync::Arc;

use parking_lot::Mutex;

use super::plan::{Segment, SegmentPlan};

/// Segments not yet committed, shared between the coordinator and its
/// workers.
///
/// The set only shrinks. Cloning yields another handle to the same set.
#[derive(Debug, Clone, Default)]
pub struct PendingSet {
    inner: Arc<Mutex<SegmentPlan>>,
}

impl PendingSet {
    pub fn new(segments: SegmentPlan) -> Self {
        Self {
            inner: Arc::new(Mutex::new(segments)),
        }
    }

    /// Mark `index` as committed. Returns `false` if it was not pending.
    pub fn complete(&self, index: u32) -> bool {
        self.inner.lock().remove(&index).is_some()
    }

    /// Snapshot of the pending segments in index order.
    pub fn snapshot(&self) -> Vec<Segment> {
        self.inner.lock().values().copied().collect()
    }

    pub fn contains(&self, index: u32) -> bool {
        self.inner.lock().contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Total bytes of the pending segments.
    pub fn pending_bytes(&self) -> u64 {
        self.inner.lock().values().map(|s| s.length).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::plan;

    #[test]
    fn test_pending_set_shrinks() {
        let pending = PendingSet::new(plan(1000, 300));
        assert_eq!(pending.len(), 4);
        assert_eq!(pending.pending_bytes(), 1000);

        assert!(pending.complete(1));
        assert!(!pending.complete(1));
        assert!(!pending.contains(1));
        assert_eq!(pending.len(), 3);
        assert_eq!(pending.pending_bytes(), 700);

        let indices: Vec<u32> = pending.snapshot().iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 2, 3]);
    }

    #[test]
    fn test_pending_set_shared_between_handles() {
        let pending = PendingSet::new(plan(600, 300));
        let worker = pending.clone();

        worker.complete(0);
        worker.complete(1);

        assert!(pending.is_empty());
    }
}
