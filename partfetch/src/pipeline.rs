//! End-to-end run pipeline.
//!
//! One run is probe → plan → coordinate → network cross-check → merge →
//! purge. [`Pipeline::run_until_complete`] repeats runs with a fixed delay
//! until one succeeds, then writes the sentinel file that makes later
//! invocations return immediately.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::FetchConfig;
use crate::download::{Coordinator, DownloadError, DownloadResult, ProgressCallback, WaveReport};
use crate::merge::{MergeEngine, MergeReport};
use crate::probe::{probe_headers, DownloadTarget};
use crate::retry::{retry_with_policy, RetryContext, RetryPolicy};
use crate::segment::{check_plan, AssetDirectory, SegmentLayout};
use crate::source::{select_target, ArtifactSource};
use crate::transport::{Connectivity, Transport};
use crate::verify::NetworkVerifier;

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// The probed target.
    pub target: DownloadTarget,
    /// Download waves.
    pub waves: WaveReport,
    /// Segments confirmed against the server.
    pub verified: usize,
    /// Merge result.
    pub merge: MergeReport,
}

/// Result of [`Pipeline::run_until_complete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The sentinel already existed; nothing was done.
    AlreadyComplete,
    /// A run finished and the sentinel was written.
    Completed(RunReport),
}

/// Drives whole download runs for one asset directory.
pub struct Pipeline {
    transport: Arc<dyn Transport>,
    connectivity: Arc<dyn Connectivity>,
    config: FetchConfig,
    assets: AssetDirectory,
    sentinel: Option<PathBuf>,
    progress: Option<ProgressCallback>,
}

impl Pipeline {
    pub fn new(
        transport: Arc<dyn Transport>,
        connectivity: Arc<dyn Connectivity>,
        config: FetchConfig,
        assets: AssetDirectory,
    ) -> Self {
        Self {
            transport,
            connectivity,
            config,
            assets,
            sentinel: None,
            progress: None,
        }
    }

    /// Gate [`run_until_complete`](Self::run_until_complete) on `path`.
    pub fn with_sentinel(mut self, path: impl Into<PathBuf>) -> Self {
        self.sentinel = Some(path.into());
        self
    }

    /// Report download progress to `callback`.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub fn assets(&self) -> &AssetDirectory {
        &self.assets
    }

    fn retry_context<'a>(&'a self, cancel: &'a CancellationToken) -> RetryContext<'a> {
        RetryContext {
            connectivity: self.connectivity.as_ref(),
            poll_interval: self.config.connectivity_poll,
            cancel,
        }
    }

    /// Download, verify and merge `url` once.
    pub async fn run_once(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> DownloadResult<RunReport> {
        self.config.validate()?;
        self.assets.ensure()?;

        let target = probe_headers(
            self.transport.as_ref(),
            url,
            &self.config.probe_retry,
            self.retry_context(cancel),
        )
        .await?;
        let total = target.require_size()?;
        check_plan(total, self.config.segment_length)?;
        let layout = self.assets.layout(&target.name);

        if self.already_merged(&layout, total).await? {
            info!(path = %layout.output_path().display(), "Output already complete");
            return Ok(RunReport {
                target,
                waves: WaveReport::default(),
                verified: 0,
                merge: MergeReport {
                    bytes: total,
                    parts: 0,
                    reused: true,
                    purged: 0,
                },
            });
        }

        let mut coordinator = Coordinator::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.connectivity),
            self.config.clone(),
        );
        if let Some(progress) = &self.progress {
            coordinator = coordinator.with_progress(Arc::clone(progress));
        }
        let waves = coordinator.run(&target, &layout, cancel).await?;
        info!(
            waves = waves.waves,
            downloaded = waves.downloaded,
            already_committed = waves.already_committed,
            "All segments committed"
        );

        let verified = NetworkVerifier::new(Arc::clone(&self.transport), &self.config)
            .cross_check(&target, &layout, cancel)
            .await?
            .into_result()?;

        let merge = MergeEngine::new(&self.config).merge(&layout, total).await?;
        info!(
            path = %layout.output_path().display(),
            bytes = merge.bytes,
            reused = merge.reused,
            "Download complete"
        );

        Ok(RunReport {
            target,
            waves,
            verified,
            merge,
        })
    }

    /// Output of the right size with no segment files left means a previous
    /// run merged and purged but stopped before writing the sentinel.
    async fn already_merged(&self, layout: &SegmentLayout, total: u64) -> DownloadResult<bool> {
        let merged = matches!(
            fs::metadata(layout.output_path()).await,
            Ok(meta) if meta.is_file() && meta.len() == total
        );
        Ok(merged && layout.discover()?.is_empty())
    }

    /// Repeat runs over `source` until one succeeds.
    ///
    /// Returns immediately if the sentinel exists and writes it after a
    /// successful run. Failed runs are retried after `run_retry_delay`,
    /// waiting for connectivity first. The target is selected again before
    /// every run.
    pub async fn run_until_complete(
        &self,
        source: &dyn ArtifactSource,
        cancel: &CancellationToken,
    ) -> DownloadResult<RunOutcome> {
        self.complete(Target::Select(source), cancel).await
    }

    /// Repeat runs of `url` until one succeeds.
    ///
    /// Unlike [`run_until_complete`](Self::run_until_complete) no target is
    /// selected or recorded, so the asset directory is never cleared.
    pub async fn fetch_until_complete(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> DownloadResult<RunOutcome> {
        self.complete(Target::Url(url), cancel).await
    }

    async fn complete(
        &self,
        target: Target<'_>,
        cancel: &CancellationToken,
    ) -> DownloadResult<RunOutcome> {
        if let Some(sentinel) = &self.sentinel {
            if fs::metadata(sentinel).await.is_ok() {
                info!(sentinel = %sentinel.display(), "Already fully processed");
                return Ok(RunOutcome::AlreadyComplete);
            }
        }

        let policy = RetryPolicy::forever(self.config.run_retry_delay);
        let report = retry_with_policy(
            &policy,
            self.retry_context(cancel),
            "run",
            |attempt| async move {
                info!(attempt, "Starting run");
                let url = match target {
                    Target::Select(source) => select_target(source, &self.assets, cancel).await?,
                    Target::Url(url) => url.to_string(),
                };
                let result = self.run_once(&url, cancel).await;
                if let Err(e) = &result {
                    if !matches!(e, DownloadError::Cancelled) {
                        error!(attempt, error = %e, "Run failed");
                    }
                }
                result
            },
        )
        .await?;

        if let Some(sentinel) = &self.sentinel {
            if let Some(parent) = sentinel.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| DownloadError::CreateDirFailed {
                        path: parent.to_path_buf(),
                        source: e,
                    })?;
            }
            fs::write(sentinel, b"")
                .await
                .map_err(|e| DownloadError::write(sentinel, e))?;
            info!(sentinel = %sentinel.display(), "Wrote completion sentinel");
        }

        Ok(RunOutcome::Completed(report))
    }
}

/// Where each run of [`Pipeline::complete`] gets its URL.
#[derive(Clone, Copy)]
enum Target<'a> {
    Select(&'a dyn ArtifactSource),
    Url(&'a str),
}
