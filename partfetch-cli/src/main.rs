//! partfetch CLI - Command-line interface
//!
//! Segmented, resumable downloads of very large remote archives.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};

use commands::config::ConfigCommands;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "partfetch")]
#[command(version, about = "Segmented, resumable downloads of very large archives", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Flags accepted by every command. They override `config.ini`.
#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory holding segments and merged output
    #[arg(long, global = true, value_name = "DIR")]
    pub asset_dir: Option<PathBuf>,

    /// Segment size, e.g. 20MB
    #[arg(long, global = true, value_name = "SIZE")]
    pub segment_size: Option<String>,

    /// Maximum segments downloaded at once
    #[arg(long, global = true, value_name = "N")]
    pub parallel: Option<usize>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Select the artifact from the configured source and download it until complete
    Run,

    /// Segmented download of one URL, retried until complete
    Fetch {
        /// URL of the file to download
        url: String,
    },

    /// Single-stream resumable download of one URL
    Stream {
        /// URL of the file to download
        url: String,

        /// Destination file (defaults to the probed name in the asset directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the name, size and resumability of a URL
    Probe {
        /// URL to probe
        url: String,
    },

    /// View or change configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run => commands::run::run(&cli.global),
        Commands::Fetch { url } => commands::fetch::run(&cli.global, &url),
        Commands::Stream { url, output } => commands::stream::run(
            &cli.global,
            commands::stream::StreamArgs { url, output },
        ),
        Commands::Probe { url } => commands::probe::run(&cli.global, &url),
        Commands::Config { command } => commands::config::run(command),
    };

    if let Err(e) = result {
        exit_with(e);
    }
}

fn exit_with(error: CliError) -> ! {
    eprintln!("Error: {}", error);
    process::exit(error.exit_code());
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "partfetch",
            "fetch",
            "http://example.com/dump.rar",
            "--parallel",
            "8",
            "--segment-size",
            "10MB",
            "-v",
        ])
        .unwrap();

        assert!(cli.global.verbose);
        assert_eq!(cli.global.parallel, Some(8));
        assert_eq!(cli.global.segment_size.as_deref(), Some("10MB"));
        assert!(matches!(cli.command, Commands::Fetch { ref url } if url.ends_with("dump.rar")));
    }

    #[test]
    fn test_stream_output_flag() {
        let cli = Cli::try_parse_from([
            "partfetch",
            "stream",
            "http://example.com/a.bin",
            "-o",
            "/tmp/a.bin",
        ])
        .unwrap();

        assert!(matches!(
            cli.command,
            Commands::Stream { output: Some(ref p), .. } if p == &PathBuf::from("/tmp/a.bin")
        ));
    }

    #[test]
    fn test_config_list_changed_flag() {
        let cli = Cli::try_parse_from(["partfetch", "config", "list", "--changed"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                command: ConfigCommands::List { changed: true }
            }
        ));
    }
}
