//! Addressable configuration keys (`section.key`).

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::file::{ConfigFile, VerifyMode};
use super::size::{format_size, parse_size};
use super::ConfigError;

/// Every setting in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    DownloadSegmentSize,
    DownloadParallel,
    DownloadSegmentAttempts,
    DownloadRetryDelayMs,
    DownloadWavePauseMs,
    DownloadRunRetrySecs,
    DownloadStalledWaves,
    DownloadCopyStep,
    DownloadStreamCopyStep,
    DownloadTimeoutSecs,
    DownloadUserAgent,
    VerifyMode,
    VerifySampleSize,
    VerifyConcurrency,
    SourceUrls,
    SourceIndexUrl,
    SourceSuffix,
    SourcePattern,
    SourceConnectivityUrl,
    PathsAssetDir,
    PathsSentinel,
    PathsLockFile,
    LoggingLevel,
    LoggingFile,
}

const ALL_KEYS: &[ConfigKey] = &[
    ConfigKey::DownloadSegmentSize,
    ConfigKey::DownloadParallel,
    ConfigKey::DownloadSegmentAttempts,
    ConfigKey::DownloadRetryDelayMs,
    ConfigKey::DownloadWavePauseMs,
    ConfigKey::DownloadRunRetrySecs,
    ConfigKey::DownloadStalledWaves,
    ConfigKey::DownloadCopyStep,
    ConfigKey::DownloadStreamCopyStep,
    ConfigKey::DownloadTimeoutSecs,
    ConfigKey::DownloadUserAgent,
    ConfigKey::VerifyMode,
    ConfigKey::VerifySampleSize,
    ConfigKey::VerifyConcurrency,
    ConfigKey::SourceUrls,
    ConfigKey::SourceIndexUrl,
    ConfigKey::SourceSuffix,
    ConfigKey::SourcePattern,
    ConfigKey::SourceConnectivityUrl,
    ConfigKey::PathsAssetDir,
    ConfigKey::PathsSentinel,
    ConfigKey::PathsLockFile,
    ConfigKey::LoggingLevel,
    ConfigKey::LoggingFile,
];

impl ConfigKey {
    /// All keys, grouped by section in file order.
    pub fn all() -> &'static [ConfigKey] {
        ALL_KEYS
    }

    /// Section and key name.
    fn parts(&self) -> (&'static str, &'static str) {
        match self {
            Self::DownloadSegmentSize => ("download", "segment_size"),
            Self::DownloadParallel => ("download", "parallel"),
            Self::DownloadSegmentAttempts => ("download", "segment_attempts"),
            Self::DownloadRetryDelayMs => ("download", "retry_delay_ms"),
            Self::DownloadWavePauseMs => ("download", "wave_pause_ms"),
            Self::DownloadRunRetrySecs => ("download", "run_retry_secs"),
            Self::DownloadStalledWaves => ("download", "stalled_waves"),
            Self::DownloadCopyStep => ("download", "copy_step"),
            Self::DownloadStreamCopyStep => ("download", "stream_copy_step"),
            Self::DownloadTimeoutSecs => ("download", "timeout_secs"),
            Self::DownloadUserAgent => ("download", "user_agent"),
            Self::VerifyMode => ("verify", "mode"),
            Self::VerifySampleSize => ("verify", "sample_size"),
            Self::VerifyConcurrency => ("verify", "concurrency"),
            Self::SourceUrls => ("source", "urls"),
            Self::SourceIndexUrl => ("source", "index_url"),
            Self::SourceSuffix => ("source", "suffix"),
            Self::SourcePattern => ("source", "pattern"),
            Self::SourceConnectivityUrl => ("source", "connectivity_url"),
            Self::PathsAssetDir => ("paths", "asset_dir"),
            Self::PathsSentinel => ("paths", "sentinel"),
            Self::PathsLockFile => ("paths", "lock_file"),
            Self::LoggingLevel => ("logging", "level"),
            Self::LoggingFile => ("logging", "file"),
        }
    }

    /// INI section name.
    pub fn section(&self) -> &'static str {
        self.parts().0
    }

    /// Key name within the section.
    pub fn key_name(&self) -> &'static str {
        self.parts().1
    }

    /// Full `section.key` name.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as a string; empty when unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        let d = &config.download;
        match self {
            Self::DownloadSegmentSize => format_size(d.segment_size),
            Self::DownloadParallel => d.parallel.to_string(),
            Self::DownloadSegmentAttempts => d.segment_attempts.to_string(),
            Self::DownloadRetryDelayMs => d.retry_delay_ms.to_string(),
            Self::DownloadWavePauseMs => d.wave_pause_ms.to_string(),
            Self::DownloadRunRetrySecs => d.run_retry_secs.to_string(),
            Self::DownloadStalledWaves => d.stalled_waves.to_string(),
            Self::DownloadCopyStep => format_size(d.copy_step as u64),
            Self::DownloadStreamCopyStep => format_size(d.stream_copy_step as u64),
            Self::DownloadTimeoutSecs => d.timeout_secs.to_string(),
            Self::DownloadUserAgent => d.user_agent.clone().unwrap_or_default(),
            Self::VerifyMode => config.verify.mode.as_str().to_string(),
            Self::VerifySampleSize => format_size(config.verify.sample_size),
            Self::VerifyConcurrency => config.verify.concurrency.to_string(),
            Self::SourceUrls => config.source.urls.join(", "),
            Self::SourceIndexUrl => config.source.index_url.clone().unwrap_or_default(),
            Self::SourceSuffix => config.source.suffix.clone(),
            Self::SourcePattern => config.source.pattern.clone().unwrap_or_default(),
            Self::SourceConnectivityUrl => config.source.connectivity_url.clone(),
            Self::PathsAssetDir => config.paths.asset_dir.display().to_string(),
            Self::PathsSentinel => config.paths.sentinel.display().to_string(),
            Self::PathsLockFile => config.paths.lock_file.display().to_string(),
            Self::LoggingLevel => config.logging.level.clone(),
            Self::LoggingFile => config
                .logging
                .file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        }
    }

    /// Parse `value` and store it in `config`.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        let d = &mut config.download;
        match self {
            Self::DownloadSegmentSize => d.segment_size = self.size(value)?,
            Self::DownloadParallel => d.parallel = self.number(value)?,
            Self::DownloadSegmentAttempts => d.segment_attempts = self.number(value)?,
            Self::DownloadRetryDelayMs => d.retry_delay_ms = self.number(value)?,
            Self::DownloadWavePauseMs => d.wave_pause_ms = self.number(value)?,
            Self::DownloadRunRetrySecs => d.run_retry_secs = self.number(value)?,
            Self::DownloadStalledWaves => d.stalled_waves = self.number(value)?,
            Self::DownloadCopyStep => d.copy_step = self.size(value)? as usize,
            Self::DownloadStreamCopyStep => d.stream_copy_step = self.size(value)? as usize,
            Self::DownloadTimeoutSecs => d.timeout_secs = self.number(value)?,
            Self::DownloadUserAgent => d.user_agent = optional(value),
            Self::VerifyMode => {
                config.verify.mode = value
                    .parse::<VerifyMode>()
                    .map_err(|reason| self.invalid(value, reason))?
            }
            Self::VerifySampleSize => config.verify.sample_size = self.size(value)?,
            Self::VerifyConcurrency => config.verify.concurrency = self.number(value)?,
            Self::SourceUrls => {
                config.source.urls = value
                    .split(',')
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
                    .map(str::to_string)
                    .collect()
            }
            Self::SourceIndexUrl => config.source.index_url = optional(value),
            Self::SourceSuffix => config.source.suffix = value.to_string(),
            Self::SourcePattern => {
                if !value.is_empty() {
                    regex::Regex::new(value).map_err(|e| self.invalid(value, e.to_string()))?;
                }
                config.source.pattern = optional(value)
            }
            Self::SourceConnectivityUrl => config.source.connectivity_url = value.to_string(),
            Self::PathsAssetDir => config.paths.asset_dir = self.path(value)?,
            Self::PathsSentinel => config.paths.sentinel = self.path(value)?,
            Self::PathsLockFile => config.paths.lock_file = self.path(value)?,
            Self::LoggingLevel => config.logging.level = value.to_string(),
            Self::LoggingFile => config.logging.file = optional(value).map(PathBuf::from),
        }
        Ok(())
    }

    fn invalid(&self, value: &str, reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidValue {
            key: self.name(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    fn number<T: FromStr>(&self, value: &str) -> Result<T, ConfigError> {
        value
            .parse()
            .map_err(|_| self.invalid(value, "expected a non-negative integer"))
    }

    fn size(&self, value: &str) -> Result<u64, ConfigError> {
        parse_size(value).map_err(|reason| self.invalid(value, reason))
    }

    fn path(&self, value: &str) -> Result<PathBuf, ConfigError> {
        if value.is_empty() {
            return Err(self.invalid(value, "path must not be empty"));
        }
        Ok(expand_home(value))
    }
}

fn optional(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Expand a leading `~/` to the home directory.
fn expand_home(value: &str) -> PathBuf {
    match value.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(value)),
        None => PathBuf::from(value),
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ALL_KEYS
            .iter()
            .copied()
            .find(|key| key.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}
