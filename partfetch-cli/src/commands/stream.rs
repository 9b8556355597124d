//! Stream command - single-stream resumable download with a progress bar.

use std::path::PathBuf;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use partfetch::naming::format_bytes;
use partfetch::stream::{StreamOutcome, StreamSession, StreamStatus};
use tokio_util::sync::CancellationToken;

use super::common::{install_shutdown_handler, report_cancelled};
use crate::error::CliError;
use crate::runner::CliRunner;
use crate::GlobalArgs;

const BAR_TEMPLATE: &str =
    "{spinner:.green} {msg} [{elapsed_precise}] {wide_bar:.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

const REFRESH: Duration = Duration::from_millis(250);

/// Arguments for the stream command.
pub struct StreamArgs {
    pub url: String,
    pub output: Option<PathBuf>,
}

/// Run the stream command.
pub fn run(global: &GlobalArgs, args: StreamArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(global)?;
    runner.log_startup("stream");

    let (dir, name) = destination(args.output, runner.config().paths.asset_dir.clone());

    let transport = runner.transport()?;
    let connectivity = runner.connectivity(&transport);
    let session = StreamSession::new(
        transport,
        connectivity,
        args.url.as_str(),
        runner.fetch_config(),
    );

    println!("Streaming {}", args.url);
    println!("Into      {}", dir.display());
    println!();

    let cancel = CancellationToken::new();
    install_shutdown_handler(cancel.clone())?;

    let bar = progress_bar();
    let outcome = runner.block_on(async {
        let download = session.download_with_cancel(&dir, name.as_deref(), &cancel);
        tokio::pin!(download);
        let mut ticker = tokio::time::interval(REFRESH);
        loop {
            tokio::select! {
                result = &mut download => break result,
                _ = ticker.tick() => update_bar(&bar, &session.status()),
            }
        }
    });
    update_bar(&bar, &session.status());

    match report_cancelled(outcome) {
        Ok(StreamOutcome::Completed { path, bytes }) => {
            bar.finish_with_message("done");
            println!("Saved {} ({})", path.display(), format_bytes(bytes));
        }
        Ok(StreamOutcome::AlreadyComplete { path }) => {
            bar.finish_and_clear();
            println!("{} is already complete", path.display());
        }
        Ok(StreamOutcome::Stopped { temp, bytes }) => {
            bar.abandon_with_message("stopped");
            println!(
                "Stopped after {}. Partial data kept in {}; run again to resume.",
                format_bytes(bytes),
                temp.display()
            );
        }
        Err(e) => {
            bar.abandon_with_message("failed");
            return Err(e);
        }
    }
    Ok(())
}

/// Split `--output` into a directory and an optional name override.
fn destination(output: Option<PathBuf>, asset_dir: PathBuf) -> (PathBuf, Option<String>) {
    match output {
        Some(path) if path.is_dir() => (path, None),
        Some(path) => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned());
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            (dir, name)
        }
        None => (asset_dir, None),
    }
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::with_template(BAR_TEMPLATE) {
        bar.set_style(style.progress_chars("=> "));
    }
    bar
}

fn update_bar(bar: &ProgressBar, status: &StreamStatus) {
    if status.total > 0 {
        bar.set_length(status.total);
    }
    bar.set_position(status.downloaded);
    if !status.name.is_empty() {
        bar.set_message(status.name.clone());
    }
}
