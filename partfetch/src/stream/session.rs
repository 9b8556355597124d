//! Single-stream resumable download.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::status::{RateMeter, StreamOutcome, StreamStatus};
use crate::config::FetchConfig;
use crate::download::{promote, DownloadError, DownloadResult};
use crate::naming::sanitize_filename;
use crate::probe::{can_resume, probe_headers};
use crate::retry::{retry_with_policy, RetryContext, RetryPolicy};
use crate::segment::TEMP_EXTENSION;
use crate::transport::{
    body_reader, read_step, wait_for_connection, ByteRange, Connectivity, HttpResponse,
    Transport,
};

/// Interval between rate, ETA and percent updates.
const RATE_WINDOW: Duration = Duration::from_secs(1);

/// One resumable download of a single URL over one HTTP stream.
///
/// Data is written to `<name>.tmp` next to the destination and promoted when
/// the stream ends. A later call resumes from the temp file's size when the
/// server honours byte ranges. Only one download runs per session at a time.
pub struct StreamSession {
    transport: Arc<dyn Transport>,
    connectivity: Arc<dyn Connectivity>,
    url: String,
    copy_step: usize,
    request_retry: RetryPolicy,
    connectivity_poll: Duration,
    status: Mutex<StreamStatus>,
    stop: Mutex<CancellationToken>,
    active: tokio::sync::Mutex<()>,
}

impl StreamSession {
    pub fn new(
        transport: Arc<dyn Transport>,
        connectivity: Arc<dyn Connectivity>,
        url: impl Into<String>,
        config: &FetchConfig,
    ) -> Self {
        Self {
            transport,
            connectivity,
            url: url.into(),
            copy_step: config.stream_copy_step.max(1),
            request_retry: config.probe_retry.clone(),
            connectivity_poll: config.connectivity_poll,
            status: Mutex::new(StreamStatus::default()),
            stop: Mutex::new(CancellationToken::new()),
            active: tokio::sync::Mutex::new(()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current status snapshot.
    pub fn status(&self) -> StreamStatus {
        self.status.lock().clone()
    }

    /// Ask the running download to stop after its current copy step.
    pub fn stop(&self) {
        self.stop.lock().cancel();
    }

    /// Whether a stop has been requested for the current download.
    pub fn is_stopped(&self) -> bool {
        self.stop.lock().is_cancelled()
    }

    /// Download into `dir`, stoppable through [`stop`](Self::stop).
    ///
    /// `name` overrides the probed file name.
    pub async fn download(&self, dir: &Path, name: Option<&str>) -> DownloadResult<StreamOutcome> {
        let _active = self.active.lock().await;
        let cancel = CancellationToken::new();
        *self.stop.lock() = cancel.clone();
        self.run(dir, name, &cancel).await
    }

    /// Download into `dir`, stopping when `cancel` fires.
    pub async fn download_with_cancel(
        &self,
        dir: &Path,
        name: Option<&str>,
        cancel: &CancellationToken,
    ) -> DownloadResult<StreamOutcome> {
        let _active = self.active.lock().await;
        *self.stop.lock() = cancel.clone();
        self.run(dir, name, cancel).await
    }

    async fn run(
        &self,
        dir: &Path,
        name: Option<&str>,
        cancel: &CancellationToken,
    ) -> DownloadResult<StreamOutcome> {
        {
            let mut status = self.status.lock();
            status.in_progress = true;
            status.stopped = false;
        }

        let result = self.transfer(dir, name, cancel).await;

        let mut status = self.status.lock();
        status.in_progress = false;
        status.stopped = matches!(
            result,
            Ok(StreamOutcome::Stopped { .. }) | Err(DownloadError::Cancelled)
        );
        result
    }

    async fn transfer(
        &self,
        dir: &Path,
        name: Option<&str>,
        cancel: &CancellationToken,
    ) -> DownloadResult<StreamOutcome> {
        let ctx = RetryContext {
            connectivity: self.connectivity.as_ref(),
            poll_interval: self.connectivity_poll,
            cancel,
        };
        let temp_for = |dir: &Path, name: &str| dir.join(format!("{}.{}", name, TEMP_EXTENSION));

        if !wait_for_connection(ctx.connectivity, ctx.poll_interval, cancel).await {
            return Err(DownloadError::Cancelled);
        }

        let target = probe_headers(
            self.transport.as_ref(),
            &self.url,
            &self.request_retry,
            ctx,
        )
        .await?;
        let name = name.map(sanitize_filename).unwrap_or(target.name);
        let dest = dir.join(&name);
        let temp = temp_for(dir, &name);
        let mut total = target.total_size;
        {
            let mut status = self.status.lock();
            status.name = name.clone();
            status.total = total;
        }

        fs::create_dir_all(dir)
            .await
            .map_err(|e| DownloadError::CreateDirFailed {
                path: dir.to_path_buf(),
                source: e,
            })?;

        if total > 0 && file_len(&dest).await == Some(total) {
            info!(path = %dest.display(), "Destination already complete");
            remove_if_exists(&temp).await?;
            self.status.lock().mark_complete();
            return Ok(StreamOutcome::AlreadyComplete { path: dest });
        }

        let existing = file_len(&temp).await;
        let mut offset = existing.unwrap_or(0);
        self.status.lock().set_progress(offset);
        if total > 0 && existing == Some(total) {
            return self.finish(&temp, &dest, total).await;
        }

        let mut resumed = None;
        if offset > 0 && can_resume(self.transport.as_ref(), &self.url).await {
            match self.request(Some(ByteRange::from(offset)), ctx).await {
                Ok(response) => resumed = Some(response),
                Err(DownloadError::Cancelled) => return Err(DownloadError::Cancelled),
                Err(e) => warn!(error = %e, "Resume request failed, restarting"),
            }
        }

        let (response, append) = match resumed {
            Some(response) if response.is_partial() => (response, true),
            Some(response) => {
                warn!(offset, "Server ignored the range, restarting from zero");
                (response, false)
            }
            None => (self.request(None, ctx).await?, false),
        };

        if append {
            if let Some(len) = response.content_length {
                total = offset + len;
            }
            info!(path = %temp.display(), offset, "Resuming download");
        } else {
            offset = 0;
            if let Some(len) = response.content_length {
                total = len;
            }
            debug!(path = %temp.display(), "Starting download from zero");
        }
        {
            let mut status = self.status.lock();
            status.total = total;
            status.set_progress(offset);
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&temp)
            .await
            .map_err(|e| DownloadError::write(&temp, e))?;

        let mut reader = body_reader(response.body);
        let mut buf = vec![0u8; self.copy_step];
        let mut downloaded = offset;
        let mut meter = RateMeter::new(RATE_WINDOW);

        loop {
            if cancel.is_cancelled() {
                file.flush()
                    .await
                    .map_err(|e| DownloadError::write(&temp, e))?;
                info!(path = %temp.display(), bytes = downloaded, "Download stopped");
                return Ok(StreamOutcome::Stopped {
                    temp,
                    bytes: downloaded,
                });
            }

            let n = read_step(&mut reader, &mut buf)
                .await
                .map_err(|e| DownloadError::Stream {
                    url: self.url.clone(),
                    source: e,
                })?;
            if n > 0 {
                file.write_all(&buf[..n])
                    .await
                    .map_err(|e| DownloadError::write(&temp, e))?;
                downloaded += n as u64;

                let mut status = self.status.lock();
                status.set_progress(downloaded);
                if let Some(rate) = meter.record(n as u64) {
                    status.set_rate(rate);
                }
            }
            if n < buf.len() {
                break;
            }
        }

        file.flush()
            .await
            .map_err(|e| DownloadError::write(&temp, e))?;
        drop(file);

        if total > 0 && downloaded != total {
            return Err(DownloadError::Incomplete {
                expected: total,
                actual: downloaded,
            });
        }
        self.finish(&temp, &dest, downloaded).await
    }

    async fn request(
        &self,
        range: Option<ByteRange>,
        ctx: RetryContext<'_>,
    ) -> DownloadResult<HttpResponse> {
        let url = self.url.as_str();
        let transport = self.transport.as_ref();
        retry_with_policy(&self.request_retry, ctx, "stream", |attempt| async move {
            debug!(url, attempt, ?range, "Requesting stream");
            transport.get(url, range).await.map_err(DownloadError::from)
        })
        .await
    }

    /// Replace any previous destination with the completed temp file.
    async fn finish(&self, temp: &Path, dest: &Path, bytes: u64) -> DownloadResult<StreamOutcome> {
        remove_if_exists(dest).await?;
        promote(temp, dest).await?;
        self.status.lock().mark_complete();
        info!(path = %dest.display(), bytes, "Download complete");
        Ok(StreamOutcome::Completed {
            path: dest.to_path_buf(),
            bytes,
        })
    }
}

async fn file_len(path: &Path) -> Option<u64> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Some(meta.len()),
        _ => None,
    }
}

async fn remove_if_exists(path: &Path) -> DownloadResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DownloadError::write(PathBuf::from(path), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{payload, MemoryTransport};
    use crate::transport::AlwaysOnline;
    use tempfile::TempDir;

    const URL: &str = "http://example.com/files/dump.rar";

    fn session(transport: Arc<MemoryTransport>) -> StreamSession {
        let config = FetchConfig::default()
            .with_stream_copy_step(64)
            .with_probe_retry(RetryPolicy::fixed(2, Duration::from_millis(1)));
        StreamSession::new(transport, Arc::new(AlwaysOnline), URL, &config)
    }

    #[tokio::test]
    async fn test_download_fresh() {
        let temp = TempDir::new().unwrap();
        let data = payload(1000);
        let transport = Arc::new(MemoryTransport::new(data.clone()));
        let session = session(transport);

        let outcome = session.download(temp.path(), None).await.unwrap();

        let dest = temp.path().join("dump.rar");
        assert_eq!(
            outcome,
            StreamOutcome::Completed {
                path: dest.clone(),
                bytes: 1000
            }
        );
        assert_eq!(std::fs::read(&dest).unwrap(), data);
        assert!(!temp.path().join("dump.rar.tmp").exists());

        let status = session.status();
        assert_eq!(status.percent, 100);
        assert_eq!(status.name, "dump.rar");
        assert!(!status.in_progress);
        assert!(!status.stopped);
    }

    #[tokio::test]
    async fn test_download_resumes_from_temp() {
        let temp = TempDir::new().unwrap();
        let data = payload(4000);
        std::fs::write(temp.path().join("dump.rar.tmp"), &data[..1500]).unwrap();
        let transport = Arc::new(MemoryTransport::new(data.clone()));

        let outcome = session(Arc::clone(&transport))
            .download(temp.path(), None)
            .await
            .unwrap();

        assert!(matches!(outcome, StreamOutcome::Completed { bytes: 4000, .. }));
        assert_eq!(std::fs::read(temp.path().join("dump.rar")).unwrap(), data);
        // probe, two resume probes, ranged request
        assert_eq!(transport.requests(), 4);
    }

    #[tokio::test]
    async fn test_download_restarts_without_range_support() {
        let temp = TempDir::new().unwrap();
        let data = payload(1000);
        std::fs::write(temp.path().join("dump.rar.tmp"), vec![0xEEu8; 500]).unwrap();
        let transport = Arc::new(MemoryTransport::new(data.clone()).ignoring_ranges());

        session(transport)
            .download(temp.path(), None)
            .await
            .unwrap();

        assert_eq!(std::fs::read(temp.path().join("dump.rar")).unwrap(), data);
    }

    #[tokio::test]
    async fn test_download_skips_complete_destination() {
        let temp = TempDir::new().unwrap();
        let data = payload(1000);
        std::fs::write(temp.path().join("dump.rar"), &data).unwrap();
        std::fs::write(temp.path().join("dump.rar.tmp"), &data[..10]).unwrap();
        let transport = Arc::new(MemoryTransport::new(data));

        let outcome = session(Arc::clone(&transport))
            .download(temp.path(), None)
            .await
            .unwrap();

        assert!(matches!(outcome, StreamOutcome::AlreadyComplete { .. }));
        assert!(!temp.path().join("dump.rar.tmp").exists());
        assert_eq!(transport.requests(), 1);
    }

    #[tokio::test]
    async fn test_download_finishes_complete_temp() {
        let temp = TempDir::new().unwrap();
        let data = payload(1000);
        std::fs::write(temp.path().join("dump.rar"), b"old").unwrap();
        std::fs::write(temp.path().join("dump.rar.tmp"), &data).unwrap();
        let transport = Arc::new(MemoryTransport::new(data.clone()));

        session(Arc::clone(&transport))
            .download(temp.path(), None)
            .await
            .unwrap();

        assert_eq!(std::fs::read(temp.path().join("dump.rar")).unwrap(), data);
        assert_eq!(transport.requests(), 1);
    }

    #[tokio::test]
    async fn test_download_with_explicit_name() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(MemoryTransport::new(payload(100)));

        let outcome = session(transport)
            .download(temp.path(), Some("my:copy.rar"))
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            StreamOutcome::Completed { path, .. } if path == temp.path().join("my_copy.rar")
        ));
    }

    #[tokio::test]
    async fn test_stop_leaves_step_aligned_temp() {
        let temp = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        let transport = Arc::new(
            MemoryTransport::new(payload(1000))
                .with_chunk_size(64)
                .cancelling_at(3, cancel.clone()),
        );
        let session = session(transport);

        let outcome = session
            .download_with_cancel(temp.path(), None, &cancel)
            .await
            .unwrap();

        let temp_path = temp.path().join("dump.rar.tmp");
        assert_eq!(
            outcome,
            StreamOutcome::Stopped {
                temp: temp_path.clone(),
                bytes: 256
            }
        );
        let len = std::fs::metadata(&temp_path).unwrap().len();
        assert_eq!(len % 64, 0);
        assert!(!temp.path().join("dump.rar").exists());
        assert!(session.status().stopped);
    }

    #[tokio::test]
    async fn test_cancel_before_connection_is_cancelled() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(MemoryTransport::new(payload(1000)));
        let session = session(Arc::clone(&transport));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = session
            .download_with_cancel(temp.path(), None, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::Cancelled));
        assert_eq!(transport.requests(), 0);
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
        assert!(session.status().stopped);
    }
}
