//! Run command - download the configured artifact until complete.

use std::sync::Arc;

use partfetch::source::source_from_settings;
use partfetch::{Pipeline, RunOutcome};
use tokio_util::sync::CancellationToken;

use super::common::{
    acquire_instance_lock, install_shutdown_handler, print_progress, print_report,
    report_cancelled,
};
use crate::error::CliError;
use crate::runner::CliRunner;
use crate::GlobalArgs;

/// Run the run command.
pub fn run(global: &GlobalArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(global)?;
    runner.log_startup("run");
    let config = runner.config();

    let _lock = acquire_instance_lock(&config.paths.lock_file)?;

    let transport = runner.transport()?;
    let connectivity = runner.connectivity(&transport);
    let source = source_from_settings(
        &config.source,
        Arc::clone(&transport),
        Arc::clone(&connectivity),
        runner.fetch_config(),
    )?;

    println!("partfetch v{}", env!("CARGO_PKG_VERSION"));
    println!("============");
    println!();
    match &config.source.index_url {
        Some(index) => println!("Source:    {} (*{})", index, config.source.suffix),
        None => println!("Source:    {} configured URL(s)", config.source.urls.len()),
    }
    println!("Asset dir: {}", config.paths.asset_dir.display());
    println!("Sentinel:  {}", config.paths.sentinel.display());
    println!();
    println!("Press Ctrl+C to stop; progress is kept for the next run");
    println!();

    let cancel = CancellationToken::new();
    install_shutdown_handler(cancel.clone())?;

    let pipeline = Pipeline::new(
        transport,
        connectivity,
        runner.fetch_config().clone(),
        runner.assets(),
    )
    .with_sentinel(&config.paths.sentinel)
    .with_progress(print_progress());

    let outcome = report_cancelled(
        runner.block_on(pipeline.run_until_complete(source.as_ref(), &cancel)),
    )?;

    match outcome {
        RunOutcome::AlreadyComplete => {
            println!(
                "Already complete ({} exists). Delete it to download again.",
                config.paths.sentinel.display()
            );
        }
        RunOutcome::Completed(report) => print_report(&report),
    }
    Ok(())
}
