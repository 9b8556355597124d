//! Fetch command - segmented download of a single URL.

use std::sync::Arc;

use partfetch::naming::format_bytes;
use partfetch::{Pipeline, RunOutcome};
use tokio_util::sync::CancellationToken;

use super::common::{
    acquire_instance_lock, install_shutdown_handler, print_progress, print_report,
    report_cancelled,
};
use crate::error::CliError;
use crate::runner::CliRunner;
use crate::GlobalArgs;

/// Run the fetch command.
///
/// Unlike `run`, no sentinel is consulted and no artifact is selected: the
/// URL is downloaded, verified and merged, retrying whole runs until one
/// succeeds. The instance lock is shared with `run`, and segments of the
/// target `run` has recorded are left in place.
pub fn run(global: &GlobalArgs, url: &str) -> Result<(), CliError> {
    let runner = CliRunner::new(global)?;
    runner.log_startup("fetch");
    let _lock = acquire_instance_lock(&runner.config().paths.lock_file)?;

    let transport = runner.transport()?;
    let connectivity = runner.connectivity(&transport);
    let config = runner.fetch_config().clone();
    let assets = runner.assets();

    println!("partfetch v{}", env!("CARGO_PKG_VERSION"));
    println!("============");
    println!();
    println!("URL:          {}", url);
    println!("Asset dir:    {}", assets.path().display());
    println!(
        "Segments:     {} x {} parallel",
        format_bytes(config.segment_length),
        config.concurrency
    );
    println!();
    println!("Press Ctrl+C to stop; progress is kept for the next run");
    println!();

    let cancel = CancellationToken::new();
    install_shutdown_handler(cancel.clone())?;

    let pipeline = Pipeline::new(Arc::clone(&transport), connectivity, config, assets)
        .with_progress(print_progress());

    let outcome = report_cancelled(runner.block_on(pipeline.fetch_until_complete(url, &cancel)))?;

    if let RunOutcome::Completed(report) = outcome {
        print_report(&report);
    }
    Ok(())
}
