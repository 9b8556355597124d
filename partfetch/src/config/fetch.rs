//! Engine configuration.

use std::time::Duration;

use crate::download::{DownloadError, DownloadResult};
use crate::retry::RetryPolicy;
use crate::transport::DEFAULT_USER_AGENT;

/// Default segment length (20 MiB).
pub const DEFAULT_SEGMENT_LENGTH: u64 = 20 * 1024 * 1024;

/// Default number of segments downloaded concurrently.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default attempts per segment within one wave.
pub const DEFAULT_SEGMENT_ATTEMPTS: u32 = 5;

/// Default attempts for the header probe (initial request plus five retries).
pub const DEFAULT_PROBE_ATTEMPTS: u32 = 6;

/// Default window compared by sampled verification (1 KiB).
pub const DEFAULT_SAMPLE_WINDOW: u64 = 1024;

/// Default copy step for segment downloads (20 KiB).
pub const DEFAULT_COPY_STEP: usize = 20 * 1024;

/// Default copy step for single-stream downloads (2 KiB).
pub const DEFAULT_STREAM_COPY_STEP: usize = 2 * 1024;

/// Default maximum concurrent network verification requests.
pub const DEFAULT_VERIFY_CONCURRENCY: usize = 5;

/// Default consecutive waves without progress before a run gives up.
pub const DEFAULT_MAX_STALLED_WAVES: u32 = 3;

/// Default URL used to check connectivity.
pub const DEFAULT_CONNECTIVITY_URL: &str = "http://clients3.google.com/generate_204";

/// How much of each segment the verifier compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyStrictness {
    /// Compare a window of at most `window` bytes at the start of each
    /// segment.
    Sample { window: u64 },
    /// Compare every byte of every segment.
    Full,
}

impl Default for VerifyStrictness {
    fn default() -> Self {
        Self::Sample {
            window: DEFAULT_SAMPLE_WINDOW,
        }
    }
}

impl VerifyStrictness {
    /// Number of bytes compared for a segment of `segment_length` bytes.
    pub fn window_for(&self, segment_length: u64) -> u64 {
        match self {
            Self::Sample { window } => (*window).min(segment_length),
            Self::Full => segment_length,
        }
    }
}

/// Configuration for the segmented download engine.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Length of every segment except possibly the last.
    pub segment_length: u64,

    /// Maximum segments downloaded at once.
    pub concurrency: usize,

    /// Retry policy for a single segment within a wave.
    pub segment_retry: RetryPolicy,

    /// Retry policy for the header probe.
    pub probe_retry: RetryPolicy,

    /// Delay between whole-run attempts.
    pub run_retry_delay: Duration,

    /// Pause between waves.
    pub wave_pause: Duration,

    /// Consecutive waves without a committed segment before the run fails.
    pub max_stalled_waves: u32,

    /// Verification strictness for both verifier checks.
    pub verify: VerifyStrictness,

    /// Maximum concurrent network verification requests.
    pub verify_concurrency: usize,

    /// Bytes copied per step when writing a segment.
    pub copy_step: usize,

    /// Bytes copied per step by the single-stream resumer.
    pub stream_copy_step: usize,

    /// URL fetched to check connectivity.
    pub connectivity_url: String,

    /// Poll interval while waiting for connectivity.
    pub connectivity_poll: Duration,

    /// Interval between progress reports.
    pub progress_interval: Duration,

    /// HTTP request timeout.
    pub request_timeout: Duration,

    /// User-agent sent with every request.
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            segment_length: DEFAULT_SEGMENT_LENGTH,
            concurrency: DEFAULT_CONCURRENCY,
            segment_retry: RetryPolicy::fixed(DEFAULT_SEGMENT_ATTEMPTS, Duration::from_secs(1)),
            probe_retry: RetryPolicy::fixed(DEFAULT_PROBE_ATTEMPTS, Duration::from_millis(1500)),
            run_retry_delay: Duration::from_secs(10),
            wave_pause: Duration::from_secs(2),
            max_stalled_waves: DEFAULT_MAX_STALLED_WAVES,
            verify: VerifyStrictness::default(),
            verify_concurrency: DEFAULT_VERIFY_CONCURRENCY,
            copy_step: DEFAULT_COPY_STEP,
            stream_copy_step: DEFAULT_STREAM_COPY_STEP,
            connectivity_url: DEFAULT_CONNECTIVITY_URL.to_string(),
            connectivity_poll: Duration::from_millis(1500),
            progress_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(300),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FetchConfig {
    /// Set the segment length.
    pub fn with_segment_length(mut self, length: u64) -> Self {
        self.segment_length = length;
        self
    }

    /// Set the concurrency ceiling.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the per-segment retry policy.
    pub fn with_segment_retry(mut self, policy: RetryPolicy) -> Self {
        self.segment_retry = policy;
        self
    }

    /// Set the probe retry policy.
    pub fn with_probe_retry(mut self, policy: RetryPolicy) -> Self {
        self.probe_retry = policy;
        self
    }

    /// Set the delay between whole-run attempts.
    pub fn with_run_retry_delay(mut self, delay: Duration) -> Self {
        self.run_retry_delay = delay;
        self
    }

    /// Set the pause between waves.
    pub fn with_wave_pause(mut self, pause: Duration) -> Self {
        self.wave_pause = pause;
        self
    }

    /// Set the stalled-wave limit.
    pub fn with_max_stalled_waves(mut self, waves: u32) -> Self {
        self.max_stalled_waves = waves;
        self
    }

    /// Set the verification strictness.
    pub fn with_verify(mut self, verify: VerifyStrictness) -> Self {
        self.verify = verify;
        self
    }

    /// Set the segment copy step.
    pub fn with_copy_step(mut self, step: usize) -> Self {
        self.copy_step = step;
        self
    }

    /// Set the single-stream copy step.
    pub fn with_stream_copy_step(mut self, step: usize) -> Self {
        self.stream_copy_step = step;
        self
    }

    /// Set the connectivity probe URL.
    pub fn with_connectivity_url(mut self, url: impl Into<String>) -> Self {
        self.connectivity_url = url.into();
        self
    }

    /// Set the connectivity poll interval.
    pub fn with_connectivity_poll(mut self, poll: Duration) -> Self {
        self.connectivity_poll = poll;
        self
    }

    /// Set the progress report interval.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Set the HTTP request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the user-agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> DownloadResult<()> {
        let checks = [
            (self.segment_length == 0, "segment length must be greater than zero"),
            (self.concurrency == 0, "concurrency must be greater than zero"),
            (self.copy_step == 0, "copy step must be greater than zero"),
            (self.stream_copy_step == 0, "stream copy step must be greater than zero"),
            (self.verify_concurrency == 0, "verify concurrency must be greater than zero"),
            (self.max_stalled_waves == 0, "stalled wave limit must be greater than zero"),
            (
                matches!(self.verify, VerifyStrictness::Sample { window: 0 }),
                "verify window must be greater than zero",
            ),
        ];

        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, reason)) => Err(DownloadError::InvalidConfig(reason.to_string())),
            None => Ok(()),
        }
    }
}
