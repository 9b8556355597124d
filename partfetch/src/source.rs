//! Artifact sources and target selection.
//!
//! A source lists the remote artifacts that could be downloaded. Selection
//! prefers the artifact recorded in the asset directory so an interrupted
//! target is resumed rather than abandoned.

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use reqwest::Url;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{FetchConfig, SourceSettings};
use crate::download::{DownloadError, DownloadResult};
use crate::naming::{name_from_url, split_extension};
use crate::retry::{retry_with_policy, RetryContext, RetryPolicy};
use crate::segment::AssetDirectory;
use crate::transport::{body_reader, BoxFuture, Connectivity, Transport};

/// Lists the artifacts available for download.
pub trait ArtifactSource: Send + Sync {
    /// Absolute URLs of every available artifact.
    fn list_artifacts<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, DownloadResult<Vec<String>>>;
}

/// A fixed list of URLs.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    urls: Vec<String>,
}

impl StaticSource {
    pub fn new(urls: Vec<String>) -> Self {
        Self { urls }
    }
}

impl ArtifactSource for StaticSource {
    fn list_artifacts<'a>(
        &'a self,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, DownloadResult<Vec<String>>> {
        Box::pin(async move { Ok(self.urls.clone()) })
    }
}

/// Artifacts linked from an HTML index page.
///
/// Every `href` ending in `suffix` (and matching `pattern`, when set) is
/// resolved against the index URL.
pub struct DirectoryListing {
    transport: Arc<dyn Transport>,
    connectivity: Arc<dyn Connectivity>,
    index_url: String,
    suffix: String,
    pattern: Option<Regex>,
    retry: RetryPolicy,
    connectivity_poll: Duration,
}

impl DirectoryListing {
    pub fn new(
        transport: Arc<dyn Transport>,
        connectivity: Arc<dyn Connectivity>,
        index_url: impl Into<String>,
        suffix: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            connectivity,
            index_url: index_url.into(),
            suffix: suffix.into(),
            pattern: None,
            retry: RetryPolicy::None,
            connectivity_poll: Duration::from_millis(1500),
        }
    }

    /// Keep only artifacts whose file name matches `pattern`.
    pub fn with_pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Retry policy for fetching the index page.
    pub fn with_retry(mut self, retry: RetryPolicy, connectivity_poll: Duration) -> Self {
        self.retry = retry;
        self.connectivity_poll = connectivity_poll;
        self
    }

    /// Extract matching artifact URLs from an index page.
    pub fn extract_links(&self, html: &str) -> Vec<String> {
        let base = Url::parse(&self.index_url).ok();
        let mut links = Vec::new();

        for capture in href_regex().captures_iter(html) {
            let href = &capture[1];
            if !href.ends_with(self.suffix.as_str()) {
                continue;
            }
            let resolved = match &base {
                Some(base) => match base.join(href) {
                    Ok(url) => url.to_string(),
                    Err(_) => continue,
                },
                None => href.to_string(),
            };
            if let Some(pattern) = &self.pattern {
                let name = name_from_url(&resolved).unwrap_or_default();
                if !pattern.is_match(&name) {
                    continue;
                }
            }
            if !links.contains(&resolved) {
                links.push(resolved);
            }
        }
        links
    }

    async fn fetch_index(&self, cancel: &CancellationToken) -> DownloadResult<String> {
        let ctx = RetryContext {
            connectivity: self.connectivity.as_ref(),
            poll_interval: self.connectivity_poll,
            cancel,
        };
        let url = self.index_url.as_str();
        let transport = self.transport.as_ref();

        retry_with_policy(&self.retry, ctx, "index", |attempt| async move {
            debug!(url, attempt, "Fetching artifact index");
            let response = transport.get(url, None).await.map_err(DownloadError::from)?;
            let mut body = Vec::new();
            body_reader(response.body)
                .read_to_end(&mut body)
                .await
                .map_err(|e| DownloadError::Stream {
                    url: url.to_string(),
                    source: e,
                })?;
            Ok::<_, DownloadError>(String::from_utf8_lossy(&body).into_owned())
        })
        .await
    }
}

impl ArtifactSource for DirectoryListing {
    fn list_artifacts<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, DownloadResult<Vec<String>>> {
        Box::pin(async move {
            let html = self.fetch_index(cancel).await?;
            let links = self.extract_links(&html);
            debug!(index = %self.index_url, found = links.len(), "Listed artifacts");
            Ok(links)
        })
    }
}

fn href_regex() -> &'static Regex {
    static HREF: OnceLock<Regex> = OnceLock::new();
    HREF.get_or_init(|| {
        Regex::new(r#"(?i)href\s*=\s*["']([^"'#]+)["']"#).expect("href pattern is valid")
    })
}

/// Which artifact to download and whether it continues tracked work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// The artifact is recorded in, or has segments in, the asset directory.
    Resume(String),
    /// An artifact with no tracked segments.
    Fresh(String),
}

impl Selection {
    pub fn url(&self) -> &str {
        match self {
            Self::Resume(url) | Self::Fresh(url) => url,
        }
    }
}

/// Base name (file name without extension) of an artifact URL.
fn artifact_base_name(url: &str) -> Option<String> {
    let name = name_from_url(url)?;
    Some(split_extension(&name).0.to_string())
}

/// Pick an artifact from `artifacts`.
///
/// Prefers the `recorded` URL when it is still listed. Without a record,
/// falls back to the newest (highest sorting) artifact whose URL base name
/// is in `tracked`; otherwise the newest artifact overall.
pub fn select_artifact(
    artifacts: &[String],
    recorded: Option<&str>,
    tracked: &BTreeSet<String>,
) -> Option<Selection> {
    if let Some(recorded) = recorded {
        if artifacts.iter().any(|url| url == recorded) {
            return Some(Selection::Resume(recorded.to_string()));
        }
    }

    let mut sorted: Vec<&String> = artifacts.iter().collect();
    sorted.sort_by(|a, b| b.cmp(a));

    let resumable = recorded.is_none().then(|| {
        sorted.iter().find(|url| {
            artifact_base_name(url)
                .map(|base| tracked.contains(&base))
                .unwrap_or(false)
        })
    });
    match resumable.flatten() {
        Some(url) => Some(Selection::Resume((*url).clone())),
        None => sorted.first().map(|url| Selection::Fresh((*url).clone())),
    }
}

/// List `source` and select the artifact to download.
///
/// The selected URL is recorded in the asset directory. Moving on from a
/// recorded artifact that is no longer listed clears the directory; segments
/// with no recorded owner are left alone.
pub async fn select_target(
    source: &dyn ArtifactSource,
    assets: &AssetDirectory,
    cancel: &CancellationToken,
) -> DownloadResult<String> {
    let artifacts = source.list_artifacts(cancel).await?;
    let recorded = assets.recorded_target()?;
    let tracked = assets.tracked_base_names()?;

    let url = match select_artifact(&artifacts, recorded.as_deref(), &tracked) {
        Some(Selection::Resume(url)) => {
            info!(url = %url, "Resuming tracked artifact");
            url
        }
        Some(Selection::Fresh(url)) => {
            match &recorded {
                Some(stale) => {
                    info!(stale = %stale, "Tracked artifact no longer listed, clearing assets");
                    assets.clear()?;
                }
                None if !tracked.is_empty() => {
                    warn!(untracked = ?tracked, "Keeping segments with no recorded artifact");
                }
                None => {}
            }
            info!(url = %url, "Selected artifact");
            url
        }
        None => {
            return Err(DownloadError::NoArtifact(format!(
                "{} artifacts listed, none usable",
                artifacts.len()
            )));
        }
    };

    if recorded.as_deref() != Some(url.as_str()) {
        assets.record_target(&url)?;
    }
    Ok(url)
}

/// Build the source described by the `[source]` config section.
///
/// An index URL takes precedence over explicit URLs. Fails with
/// [`DownloadError::InvalidConfig`] when neither is set or the pattern does
/// not compile.
pub fn source_from_settings(
    settings: &SourceSettings,
    transport: Arc<dyn Transport>,
    connectivity: Arc<dyn Connectivity>,
    config: &FetchConfig,
) -> DownloadResult<Box<dyn ArtifactSource>> {
    if let Some(index_url) = &settings.index_url {
        let mut listing = DirectoryListing::new(
            transport,
            connectivity,
            index_url.as_str(),
            settings.suffix.as_str(),
        )
        .with_retry(config.probe_retry.clone(), config.connectivity_poll);
        if let Some(pattern) = &settings.pattern {
            let regex = Regex::new(pattern).map_err(|e| {
                DownloadError::InvalidConfig(format!("source pattern '{}': {}", pattern, e))
            })?;
            listing = listing.with_pattern(regex);
        }
        return Ok(Box::new(listing));
    }

    if settings.urls.is_empty() {
        return Err(DownloadError::InvalidConfig(
            "no source configured: set source.index_url or source.urls".to_string(),
        ));
    }
    Ok(Box::new(StaticSource::new(settings.urls.clone())))
}
