//! Configuration.
//!
//! [`FetchConfig`] is the typed configuration the engine runs with.
//! [`ConfigFile`] is its persistent INI form at `~/.partfetch/config.ini`,
//! addressed key by key through [`ConfigKey`].

mod fetch;
mod file;
mod keys;
mod size;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use fetch::{
    FetchConfig, VerifyStrictness, DEFAULT_CONCURRENCY, DEFAULT_CONNECTIVITY_URL,
    DEFAULT_COPY_STEP, DEFAULT_MAX_STALLED_WAVES, DEFAULT_SAMPLE_WINDOW, DEFAULT_SEGMENT_LENGTH,
    DEFAULT_STREAM_COPY_STEP,
};
pub use file::{
    app_dir, config_file_path, ConfigFile, DownloadSettings, LoggingSettings, PathSettings,
    SourceSettings, VerifyMode, VerifySettings,
};
pub use keys::ConfigKey;
pub use size::{format_size, parse_size};

/// Errors reading or writing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or parsed.
    #[error("failed to parse {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    /// The file could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    /// No setting has this name.
    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),

    /// A value could not be parsed for its key.
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}
