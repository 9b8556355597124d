//! The INI configuration file.
//!
//! ```ini
//! [download]
//! segment_size = 20MB
//! parallel = 4
//!
//! [verify]
//! mode = sample
//! sample_size = 1KB
//!
//! [source]
//! index_url = https://example.com/dumps/
//! suffix = .rar
//!
//! [paths]
//! asset_dir = ~/.partfetch/assets
//! ```
//!
//! Missing sections and keys fall back to defaults. Values are read and
//! written through [`ConfigKey`] so the file, the CLI and the defaults agree.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;

use super::fetch::{
    FetchConfig, VerifyStrictness, DEFAULT_CONCURRENCY, DEFAULT_CONNECTIVITY_URL,
    DEFAULT_COPY_STEP, DEFAULT_MAX_STALLED_WAVES, DEFAULT_SAMPLE_WINDOW, DEFAULT_SEGMENT_ATTEMPTS,
    DEFAULT_SEGMENT_LENGTH, DEFAULT_STREAM_COPY_STEP, DEFAULT_VERIFY_CONCURRENCY,
};
use super::keys::ConfigKey;
use super::ConfigError;
use crate::retry::RetryPolicy;
use crate::transport::DEFAULT_USER_AGENT;

/// Name of the per-user application directory.
const APP_DIR: &str = ".partfetch";

/// Application directory (`~/.partfetch`).
pub fn app_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Path of the configuration file (`~/.partfetch/config.ini`).
pub fn config_file_path() -> PathBuf {
    app_dir().join("config.ini")
}

/// `[download]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadSettings {
    pub segment_size: u64,
    pub parallel: usize,
    pub segment_attempts: u32,
    pub retry_delay_ms: u64,
    pub wave_pause_ms: u64,
    pub run_retry_secs: u64,
    pub stalled_waves: u32,
    pub copy_step: usize,
    pub stream_copy_step: usize,
    pub timeout_secs: u64,
    /// Overrides the built-in user-agent when set.
    pub user_agent: Option<String>,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            segment_size: DEFAULT_SEGMENT_LENGTH,
            parallel: DEFAULT_CONCURRENCY,
            segment_attempts: DEFAULT_SEGMENT_ATTEMPTS,
            retry_delay_ms: 1000,
            wave_pause_ms: 2000,
            run_retry_secs: 10,
            stalled_waves: DEFAULT_MAX_STALLED_WAVES,
            copy_step: DEFAULT_COPY_STEP,
            stream_copy_step: DEFAULT_STREAM_COPY_STEP,
            timeout_secs: 300,
            user_agent: None,
        }
    }
}

/// Verification mode stored in `[verify] mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerifyMode {
    #[default]
    Sample,
    Full,
}

impl VerifyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sample => "sample",
            Self::Full => "full",
        }
    }
}

impl std::str::FromStr for VerifyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sample" => Ok(Self::Sample),
            "full" => Ok(Self::Full),
            other => Err(format!("expected 'sample' or 'full', got '{}'", other)),
        }
    }
}

/// `[verify]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifySettings {
    pub mode: VerifyMode,
    pub sample_size: u64,
    pub concurrency: usize,
}

impl Default for VerifySettings {
    fn default() -> Self {
        Self {
            mode: VerifyMode::Sample,
            sample_size: DEFAULT_SAMPLE_WINDOW,
            concurrency: DEFAULT_VERIFY_CONCURRENCY,
        }
    }
}

/// `[source]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSettings {
    /// Explicit artifact URLs.
    pub urls: Vec<String>,
    /// Directory listing page scraped for artifacts.
    pub index_url: Option<String>,
    /// Required artifact suffix.
    pub suffix: String,
    /// Optional regular expression artifact names must match.
    pub pattern: Option<String>,
    /// URL fetched to check connectivity.
    pub connectivity_url: String,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            index_url: None,
            suffix: ".rar".to_string(),
            pattern: None,
            connectivity_url: DEFAULT_CONNECTIVITY_URL.to_string(),
        }
    }
}

/// `[paths]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct PathSettings {
    pub asset_dir: PathBuf,
    pub sentinel: PathBuf,
    pub lock_file: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        let base = app_dir();
        Self {
            asset_dir: base.join("assets"),
            sentinel: base.join("downloaded"),
            lock_file: base.join("partfetch.lock"),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    /// Default filter level when `RUST_LOG` is unset.
    pub level: String,
    /// Log file; empty disables file logging.
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some(app_dir().join("partfetch.log")),
        }
    }
}

/// The whole configuration file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigFile {
    pub download: DownloadSettings,
    pub verify: VerifySettings,
    pub source: SourceSettings,
    pub paths: PathSettings,
    pub logging: LoggingSettings,
}

impl ConfigFile {
    /// Load from [`config_file_path`], or defaults if the file is absent.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load from `path`.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    /// Parse from INI text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<string>"),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for key in ConfigKey::all() {
            if let Some(value) = ini.get_from(Some(key.section()), key.key_name()) {
                key.set(&mut config, value)?;
            }
        }
        Ok(config)
    }

    fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            ini.with_section(Some(key.section()))
                .set(key.key_name(), key.get(self));
        }
        ini
    }

    /// Save to [`config_file_path`].
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Save to `path`, creating its parent directory.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        self.to_ini()
            .write_to_file(path)
            .map_err(|e| ConfigError::Write {
                path: path.to_path_buf(),
                source: e,
            })
    }

    /// Engine configuration derived from this file.
    pub fn to_fetch_config(&self) -> FetchConfig {
        let d = &self.download;
        let verify = match self.verify.mode {
            VerifyMode::Sample => VerifyStrictness::Sample {
                window: self.verify.sample_size,
            },
            VerifyMode::Full => VerifyStrictness::Full,
        };

        FetchConfig {
            segment_length: d.segment_size,
            concurrency: d.parallel,
            segment_retry: RetryPolicy::fixed(
                d.segment_attempts,
                Duration::from_millis(d.retry_delay_ms),
            ),
            run_retry_delay: Duration::from_secs(d.run_retry_secs),
            wave_pause: Duration::from_millis(d.wave_pause_ms),
            max_stalled_waves: d.stalled_waves,
            verify,
            verify_concurrency: self.verify.concurrency,
            copy_step: d.copy_step,
            stream_copy_step: d.stream_copy_step,
            connectivity_url: self.source.connectivity_url.clone(),
            request_timeout: Duration::from_secs(d.timeout_secs),
            user_agent: d
                .user_agent
                .clone()
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            ..FetchConfig::default()
        }
    }
}
