//! CLI error type.

use std::fmt;

use partfetch::config::ConfigError;
use partfetch::logging::LoggingError;
use partfetch::transport::TransportError;
use partfetch::DownloadError;

/// Errors surfaced by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Bad configuration or arguments.
    Config(String),
    /// Logging could not be set up.
    Logging(LoggingError),
    /// The async runtime could not be started.
    Runtime(std::io::Error),
    /// The download engine failed.
    Download(DownloadError),
    /// Another instance holds the lock.
    AlreadyRunning { lock: String, pid: Option<u32> },
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Download(DownloadError::Cancelled) => 130,
            CliError::AlreadyRunning { .. } => 75,
            _ => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Logging(e) => write!(f, "Logging error: {}", e),
            CliError::Runtime(e) => write!(f, "Failed to start runtime: {}", e),
            CliError::Download(e) => write!(f, "Download failed: {}", e),
            CliError::AlreadyRunning { lock, pid } => match pid {
                Some(pid) => write!(f, "Another instance (pid {}) holds {}", pid, lock),
                None => write!(f, "Another instance holds {}", lock),
            },
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<DownloadError> for CliError {
    fn from(e: DownloadError) -> Self {
        CliError::Download(e)
    }
}

impl From<TransportError> for CliError {
    fn from(e: TransportError) -> Self {
        CliError::Download(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::Download(DownloadError::Cancelled).exit_code(), 130);
        assert_eq!(
            CliError::AlreadyRunning {
                lock: "x.lock".to_string(),
                pid: Some(42)
            }
            .exit_code(),
            75
        );
        assert_eq!(CliError::Config("bad".to_string()).exit_code(), 1);
    }

    #[test]
    fn test_display_already_running() {
        let err = CliError::AlreadyRunning {
            lock: "/tmp/partfetch.lock".to_string(),
            pid: Some(42),
        };
        assert_eq!(
            err.to_string(),
            "Another instance (pid 42) holds /tmp/partfetch.lock"
        );
    }
}
