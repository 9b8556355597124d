//! Probe command - show what a URL would download.

use partfetch::naming::format_bytes;
use partfetch::probe::{can_resume, probe_headers};
use partfetch::retry::RetryContext;
use partfetch::segment::segment_count;
use tokio_util::sync::CancellationToken;

use crate::error::CliError;
use crate::runner::CliRunner;
use crate::GlobalArgs;

/// Run the probe command.
pub fn run(global: &GlobalArgs, url: &str) -> Result<(), CliError> {
    let runner = CliRunner::new(global)?;
    runner.log_startup("probe");

    let transport = runner.transport()?;
    let connectivity = runner.connectivity(&transport);
    let config = runner.fetch_config();
    let cancel = CancellationToken::new();

    let (target, resumable) = runner.block_on(async {
        let ctx = RetryContext {
            connectivity: connectivity.as_ref(),
            poll_interval: config.connectivity_poll,
            cancel: &cancel,
        };
        let target = probe_headers(transport.as_ref(), url, &config.probe_retry, ctx).await?;
        let resumable = can_resume(transport.as_ref(), url).await;
        Ok::<_, CliError>((target, resumable))
    })?;

    println!("URL:       {}", target.url);
    println!("Name:      {}", target.name);
    if target.total_size > 0 {
        println!(
            "Size:      {} ({} bytes)",
            format_bytes(target.total_size),
            target.total_size
        );
        println!(
            "Segments:  {} of {}",
            segment_count(target.total_size, config.segment_length),
            format_bytes(config.segment_length)
        );
    } else {
        println!("Size:      unknown (segmented download not possible)");
    }
    println!("Resumable: {}", if resumable { "yes" } else { "no" });

    Ok(())
}
