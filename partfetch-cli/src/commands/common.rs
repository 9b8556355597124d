//! Common utilities shared across CLI commands.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use partfetch::download::{ProgressCallback, ProgressSnapshot};
use partfetch::instance::{read_pid, InstanceLock};
use partfetch::naming::format_bytes;
use partfetch::{DownloadError, RunReport};
use tokio_util::sync::CancellationToken;

use crate::error::CliError;

/// Cancel `cancel` on Ctrl+C. A second Ctrl+C exits immediately.
pub fn install_shutdown_handler(cancel: CancellationToken) -> Result<(), CliError> {
    let requested = Arc::new(AtomicBool::new(false));

    ctrlc::set_handler(move || {
        if requested.swap(true, Ordering::SeqCst) {
            eprintln!("Forced exit.");
            std::process::exit(130);
        }
        println!();
        println!("Received shutdown signal, stopping after the current step...");
        cancel.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))
}

/// Take the single-instance lock guarding the asset directory.
pub fn acquire_instance_lock(lock_path: &Path) -> Result<InstanceLock, CliError> {
    InstanceLock::acquire(lock_path)?.ok_or_else(|| CliError::AlreadyRunning {
        lock: lock_path.display().to_string(),
        pid: read_pid(lock_path),
    })
}

/// Progress callback printing one line per report.
pub fn print_progress() -> ProgressCallback {
    Arc::new(|p: ProgressSnapshot| {
        println!(
            "  {} / {} ({}/{} parts, {:.1}%)",
            format_bytes(p.committed_bytes),
            format_bytes(p.total_bytes),
            p.committed_segments,
            p.total_segments,
            p.percent()
        );
    })
}

/// Print the summary of a completed run.
pub fn print_report(report: &RunReport) {
    println!();
    println!("Download Complete");
    println!("─────────────────");
    println!("  File:     {}", report.target.name);
    println!("  Size:     {}", format_bytes(report.target.total_size));
    if report.merge.reused {
        println!("  Output:   already merged, kept");
    } else {
        println!(
            "  Segments: {} ({} downloaded, {} already on disk)",
            report.merge.parts, report.waves.downloaded, report.waves.already_committed
        );
        println!("  Waves:    {}", report.waves.waves);
        println!("  Verified: {} segments", report.verified);
    }
}

/// Map a cancelled engine result to a friendly message.
pub fn report_cancelled<T>(result: Result<T, DownloadError>) -> Result<T, CliError> {
    result.map_err(|e| {
        if matches!(e, DownloadError::Cancelled) {
            println!("Stopped. Progress is kept on disk; run the command again to resume.");
        }
        CliError::from(e)
    })
}
