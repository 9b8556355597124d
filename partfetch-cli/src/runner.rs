//! Shared setup for commands that touch the network.
//!
//! [`CliRunner`] loads `config.ini`, applies the global flags, installs
//! logging and owns the tokio runtime the engine runs on.

use std::future::Future;
use std::sync::Arc;

use partfetch::config::{parse_size, ConfigFile};
use partfetch::logging::{effective_level, init_logging, LoggingGuard};
use partfetch::segment::AssetDirectory;
use partfetch::transport::{Connectivity, HttpConnectivity, ReqwestTransport, Transport};
use partfetch::FetchConfig;
use tokio::runtime::Runtime;
use tracing::info;

use crate::error::CliError;
use crate::GlobalArgs;

/// Configuration, logging and runtime for one CLI invocation.
pub struct CliRunner {
    config: ConfigFile,
    fetch: FetchConfig,
    runtime: Runtime,
    _logging: LoggingGuard,
}

impl CliRunner {
    pub fn new(global: &GlobalArgs) -> Result<Self, CliError> {
        let config = apply_overrides(ConfigFile::load()?, global)?;
        let fetch = config.to_fetch_config();

        let level = effective_level(global.verbose, &config.logging.level);
        let logging = init_logging(level, config.logging.file.as_deref())?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(CliError::Runtime)?;

        Ok(Self {
            config,
            fetch,
            runtime,
            _logging: logging,
        })
    }

    /// Log the command being run with the effective settings.
    pub fn log_startup(&self, command: &str) {
        info!(
            command,
            version = env!("CARGO_PKG_VERSION"),
            asset_dir = %self.config.paths.asset_dir.display(),
            segment_size = self.fetch.segment_length,
            parallel = self.fetch.concurrency,
            "partfetch starting"
        );
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn fetch_config(&self) -> &FetchConfig {
        &self.fetch
    }

    pub fn assets(&self) -> AssetDirectory {
        AssetDirectory::new(&self.config.paths.asset_dir)
    }

    /// HTTP transport built from the configured user-agent and timeout.
    pub fn transport(&self) -> Result<Arc<dyn Transport>, CliError> {
        let transport =
            ReqwestTransport::with_settings(&self.fetch.user_agent, self.fetch.request_timeout)?;
        Ok(Arc::new(transport))
    }

    /// Connectivity check against the configured probe URL.
    pub fn connectivity(&self, transport: &Arc<dyn Transport>) -> Arc<dyn Connectivity> {
        Arc::new(HttpConnectivity::new(
            Arc::clone(transport),
            self.fetch.connectivity_url.clone(),
        ))
    }

    /// Run `future` to completion on the runner's runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

/// Apply command-line overrides on top of the loaded file.
fn apply_overrides(mut config: ConfigFile, global: &GlobalArgs) -> Result<ConfigFile, CliError> {
    if let Some(dir) = &global.asset_dir {
        config.paths.asset_dir = dir.clone();
    }
    if let Some(size) = &global.segment_size {
        let bytes = parse_size(size)
            .map_err(|e| CliError::Config(format!("Invalid --segment-size '{}': {}", size, e)))?;
        if bytes == 0 {
            return Err(CliError::Config(
                "--segment-size must be greater than zero".to_string(),
            ));
        }
        config.download.segment_size = bytes;
    }
    if let Some(parallel) = global.parallel {
        if parallel == 0 {
            return Err(CliError::Config(
                "--parallel must be at least 1".to_string(),
            ));
        }
        config.download.parallel = parallel;
    }
    Ok(config)
}
