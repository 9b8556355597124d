//! Live status of a single-stream download.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::naming::format_bytes;

/// Snapshot of a [`StreamSession`](super::StreamSession).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamStatus {
    /// Destination file name.
    pub name: String,
    /// Bytes in the destination or temp file so far.
    pub downloaded: u64,
    /// Total size, zero when unknown.
    pub total: u64,
    /// Whole percent complete.
    pub percent: u8,
    /// Transfer rate in bytes per second over the last measurement window.
    pub rate: f64,
    /// Estimated time remaining.
    pub eta: Option<Duration>,
    /// A stop was observed by the running download.
    pub stopped: bool,
    /// A download is running.
    pub in_progress: bool,
}

impl StreamStatus {
    /// Rate formatted like `1.5 MB/s`.
    pub fn rate_display(&self) -> String {
        format!("{}/s", format_bytes(self.rate as u64))
    }

    pub(crate) fn set_progress(&mut self, downloaded: u64) {
        self.downloaded = downloaded;
        if self.total > 0 {
            self.percent = (downloaded.min(self.total) * 100 / self.total) as u8;
        }
    }

    pub(crate) fn set_rate(&mut self, rate: f64) {
        self.rate = rate;
        self.eta = if rate > 0.0 && self.total > self.downloaded {
            Some(Duration::from_secs(
                ((self.total - self.downloaded) as f64 / rate) as u64,
            ))
        } else {
            None
        };
    }

    pub(crate) fn mark_complete(&mut self) {
        self.downloaded = self.total.max(self.downloaded);
        self.percent = 100;
        self.eta = Some(Duration::ZERO);
    }
}

/// How a single-stream download ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The download finished and the temp file was promoted.
    Completed { path: PathBuf, bytes: u64 },
    /// The destination already held a complete file.
    AlreadyComplete { path: PathBuf },
    /// A stop was observed; the temp file is kept for a later resume.
    Stopped { temp: PathBuf, bytes: u64 },
}

/// Measures throughput over windows of at least `window`.
#[derive(Debug)]
pub(crate) struct RateMeter {
    window: Duration,
    started: Instant,
    bytes: u64,
}

impl RateMeter {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            window,
            started: Instant::now(),
            bytes: 0,
        }
    }

    /// Record `bytes`; returns the rate once the current window has elapsed.
    pub(crate) fn record(&mut self, bytes: u64) -> Option<f64> {
        self.record_at(bytes, Instant::now())
    }

    fn record_at(&mut self, bytes: u64, now: Instant) -> Option<f64> {
        self.bytes += bytes;
        let elapsed = now.saturating_duration_since(self.started);
        if elapsed < self.window {
            return None;
        }
        let rate = self.bytes as f64 / elapsed.as_secs_f64();
        self.started = now;
        self.bytes = 0;
        Some(rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_progress_and_eta() {
        let mut status = StreamStatus {
            total: 1000,
            ..Default::default()
        };
        status.set_progress(250);
        status.set_rate(75.0);

        assert_eq!(status.percent, 25);
        assert_eq!(status.eta, Some(Duration::from_secs(10)));
        assert_eq!(status.rate_display(), "75 B/s");
    }

    #[test]
    fn test_status_unknown_total() {
        let mut status = StreamStatus::default();
        status.set_progress(500);
        status.set_rate(100.0);

        assert_eq!(status.percent, 0);
        assert_eq!(status.eta, None);
    }

    #[test]
    fn test_rate_meter_reports_after_window() {
        let start = Instant::now();
        let mut meter = RateMeter {
            window: Duration::from_secs(1),
            started: start,
            bytes: 0,
        };

        assert_eq!(meter.record_at(1024, start + Duration::from_millis(400)), None);
        let rate = meter
            .record_at(1024, start + Duration::from_secs(2))
            .unwrap();
        assert!((rate - 1024.0).abs() < 1e-6);
        assert_eq!(meter.bytes, 0);
    }
}
