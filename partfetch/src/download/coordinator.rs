//! Bounded-concurrency download waves.
//!
//! ```text
//! PLANNING ──► WAVE_RUNNING ──► WAVE_DRAINED ──┬──► DONE (nothing pending)
//!                   ▲                          │
//!                   └──── pause ◄──────────────┘ (segments still pending)
//! ```
//!
//! Each wave launches one worker per pending segment, admitting at most
//! `concurrency` at a time through a semaphore. A failed segment stays in the
//! [`PendingSet`] for the next wave; it never aborts its siblings. After
//! `max_stalled_waves` consecutive waves that commit nothing the run fails
//! with [`DownloadError::Stalled`] so the caller can start over.

use std::fmt;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::{DownloadError, DownloadResult};
use super::progress::{ProgressCallback, ProgressCounters, ProgressReporter};
use super::segment::{SegmentDownloader, SegmentOutcome};
use crate::config::FetchConfig;
use crate::probe::DownloadTarget;
use crate::segment::{check_plan, plan, PendingSet, Segment, SegmentLayout};
use crate::transport::{Connectivity, Transport};

/// Coordinator lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveState {
    Planning,
    WaveRunning { wave: u32 },
    WaveDrained { wave: u32, pending: usize },
    Done,
}

impl fmt::Display for WaveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Planning => write!(f, "PLANNING"),
            Self::WaveRunning { wave } => write!(f, "WAVE_RUNNING({})", wave),
            Self::WaveDrained { wave, pending } => {
                write!(f, "WAVE_DRAINED({}, {} pending)", wave, pending)
            }
            Self::Done => write!(f, "DONE"),
        }
    }
}

/// Summary of a coordinator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WaveReport {
    /// Waves executed.
    pub waves: u32,
    /// Segments found committed on disk before the first wave.
    pub already_committed: usize,
    /// Segments committed by this run.
    pub downloaded: usize,
}

/// Drives all pending segments of a target to the committed state.
pub struct Coordinator {
    transport: Arc<dyn Transport>,
    connectivity: Arc<dyn Connectivity>,
    config: FetchConfig,
    progress: Option<ProgressCallback>,
}

impl Coordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        connectivity: Arc<dyn Connectivity>,
        config: FetchConfig,
    ) -> Self {
        Self {
            transport,
            connectivity,
            config,
            progress: None,
        }
    }

    /// Report progress to `callback` every `progress_interval`.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Download every segment of `target` not already committed in `layout`.
    pub async fn run(
        &self,
        target: &DownloadTarget,
        layout: &SegmentLayout,
        cancel: &CancellationToken,
    ) -> DownloadResult<WaveReport> {
        let total = target.require_size()?;
        check_plan(total, self.config.segment_length)?;
        self.transition(WaveState::Planning);

        let segments = plan(total, self.config.segment_length);
        let counters = Arc::new(ProgressCounters::new(total, segments.len()));
        let downloader = Arc::new(
            SegmentDownloader::new(
                Arc::clone(&self.transport),
                Arc::clone(&self.connectivity),
                target.url.clone(),
                layout.clone(),
                &self.config,
            )
            .with_counters(Arc::clone(&counters)),
        );

        let pending = PendingSet::new(segments.clone());
        let mut already_committed = 0;
        for segment in segments.values() {
            if downloader.is_committed(segment).await {
                pending.complete(segment.index);
                counters.add_existing(1, segment.length);
                already_committed += 1;
            }
        }
        info!(
            target = %target.name,
            segments = segments.len(),
            already_committed,
            pending = pending.len(),
            "Planned download"
        );

        let reporter = self.progress.clone().map(|callback| {
            ProgressReporter::start(
                Arc::clone(&counters),
                callback,
                self.config.progress_interval,
            )
        });

        let result = self.run_waves(&downloader, &pending, &counters, cancel).await;

        if let Some(reporter) = reporter {
            reporter.stop().await;
        }

        let (waves, downloaded) = result?;
        Ok(WaveReport {
            waves,
            already_committed,
            downloaded,
        })
    }

    async fn run_waves(
        &self,
        downloader: &Arc<SegmentDownloader>,
        pending: &PendingSet,
        counters: &Arc<ProgressCounters>,
        cancel: &CancellationToken,
    ) -> DownloadResult<(u32, usize)> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut wave = 0;
        let mut stalled = 0;
        let mut downloaded = 0;

        while !pending.is_empty() {
            wave += 1;
            let batch = pending.snapshot();
            self.transition(WaveState::WaveRunning { wave });
            info!(wave, parts = batch.len(), "Downloading {} parts", batch.len());

            let committed = self
                .run_wave(downloader, pending, counters, &semaphore, batch, cancel)
                .await?;
            downloaded += committed;

            let remaining = pending.len();
            self.transition(WaveState::WaveDrained {
                wave,
                pending: remaining,
            });
            if remaining == 0 {
                break;
            }

            if committed == 0 {
                stalled += 1;
                warn!(wave, stalled, remaining, "Wave committed no segments");
                if stalled >= self.config.max_stalled_waves {
                    return Err(DownloadError::Stalled {
                        waves: stalled,
                        pending: remaining,
                    });
                }
            } else {
                stalled = 0;
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
                _ = tokio::time::sleep(self.config.wave_pause) => {}
            }
        }

        self.transition(WaveState::Done);
        Ok((wave, downloaded))
    }

    /// Run one wave and return the number of segments it committed.
    async fn run_wave(
        &self,
        downloader: &Arc<SegmentDownloader>,
        pending: &PendingSet,
        counters: &Arc<ProgressCounters>,
        semaphore: &Arc<Semaphore>,
        batch: Vec<Segment>,
        cancel: &CancellationToken,
    ) -> DownloadResult<usize> {
        let mut workers = JoinSet::new();

        for segment in batch {
            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = Arc::clone(semaphore).acquire_owned() => {
                    permit.map_err(|e| DownloadError::Worker(e.to_string()))?
                }
            };

            let downloader = Arc::clone(downloader);
            let pending = pending.clone();
            let counters = Arc::clone(counters);
            let cancel = cancel.clone();
            workers.spawn(async move {
                let _permit = permit;
                let result = downloader.fetch_segment(&segment, &cancel).await;
                if let Ok(outcome) = &result {
                    if *outcome == SegmentOutcome::AlreadyCommitted {
                        counters.add_existing(1, segment.length);
                    }
                    pending.complete(segment.index);
                }
                (segment, result)
            });
        }

        let mut committed = 0;
        let mut cancelled = false;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((segment, Ok(_))) => {
                    debug!(part = segment.part(), "Segment committed");
                    committed += 1;
                }
                Ok((_, Err(DownloadError::Cancelled))) => cancelled = true,
                Ok((segment, Err(e))) => {
                    warn!(part = segment.part(), error = %e, "Segment failed, left pending");
                }
                Err(e) => warn!(error = %e, "Segment worker ended abnormally"),
            }
        }

        if cancelled || cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }
        Ok(committed)
    }

    fn transition(&self, state: WaveState) {
        debug!(state = %state, "Coordinator state");
    }
}
