//! Progress reporting for segmented downloads.
//!
//! Workers bump shared atomic counters; a reporter task polls them at a fixed
//! interval and hands snapshots to a callback.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::naming::format_bytes;

/// Point-in-time view of a run's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Bytes in committed segments.
    pub committed_bytes: u64,
    /// Bytes received over the network this run, including in-flight
    /// segments.
    pub received_bytes: u64,
    /// Number of committed segments.
    pub committed_segments: usize,
    /// Target size in bytes.
    pub total_bytes: u64,
    /// Number of planned segments.
    pub total_segments: usize,
}

impl ProgressSnapshot {
    /// Committed share of the target, 0.0 to 100.0.
    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.committed_bytes as f64 * 100.0 / self.total_bytes as f64
    }
}

/// Callback receiving progress snapshots.
pub type ProgressCallback = Arc<dyn Fn(ProgressSnapshot) + Send + Sync>;

/// Progress callback that logs at `info` level.
pub fn log_progress() -> ProgressCallback {
    Arc::new(|p: ProgressSnapshot| {
        info!(
            "Downloaded {}/{} ({}/{} parts): progress {:.2}%",
            format_bytes(p.committed_bytes),
            format_bytes(p.total_bytes),
            p.committed_segments,
            p.total_segments,
            p.percent()
        );
    })
}

/// Shared progress counters for one run.
#[derive(Debug)]
pub struct ProgressCounters {
    committed_bytes: AtomicU64,
    received_bytes: AtomicU64,
    committed_segments: AtomicUsize,
    total_bytes: u64,
    total_segments: usize,
}

impl ProgressCounters {
    /// Counters for a target of `total_bytes` split into `total_segments`.
    pub fn new(total_bytes: u64, total_segments: usize) -> Self {
        Self {
            committed_bytes: AtomicU64::new(0),
            received_bytes: AtomicU64::new(0),
            committed_segments: AtomicUsize::new(0),
            total_bytes,
            total_segments,
        }
    }

    /// Record bytes already committed before this run started.
    pub fn add_existing(&self, segments: usize, bytes: u64) {
        self.committed_segments.fetch_add(segments, Ordering::SeqCst);
        self.committed_bytes.fetch_add(bytes, Ordering::SeqCst);
    }

    /// Record bytes received from the network.
    pub fn add_received(&self, bytes: u64) {
        self.received_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a committed segment.
    pub fn mark_committed(&self, bytes: u64) {
        self.committed_bytes.fetch_add(bytes, Ordering::SeqCst);
        self.committed_segments.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            committed_bytes: self.committed_bytes.load(Ordering::SeqCst),
            received_bytes: self.received_bytes.load(Ordering::Relaxed),
            committed_segments: self.committed_segments.load(Ordering::SeqCst),
            total_bytes: self.total_bytes,
            total_segments: self.total_segments,
        }
    }
}

/// Background task that reports progress periodically.
pub struct ProgressReporter {
    handle: JoinHandle<()>,
    stop: CancellationToken,
}

impl ProgressReporter {
    /// Start reporting `counters` to `callback` every `interval`.
    pub fn start(
        counters: Arc<ProgressCounters>,
        callback: ProgressCallback,
        interval: Duration,
    ) -> Self {
        let stop = CancellationToken::new();
        let token = stop.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => callback(counters.snapshot()),
                }
            }
            // Final report
            callback(counters.snapshot());
        });

        Self { handle, stop }
    }

    /// Stop the reporter after a final report.
    pub async fn stop(self) {
        self.stop.cancel();
        let _ = self.handle.await;
    }
}
