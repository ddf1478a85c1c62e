//! CLI entry point for the mangas tool.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use mangas_core::config::{Settings, load_default_file_config};
use tracing::{debug, error};

mod cli;
mod commands;
mod exit_handler;
mod progress_ui;

use cli::{Cli, Command};

/// Process outcome mapped to the exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    Success,
    /// Some chapters of a batch failed, others were written.
    Partial,
    Failure,
}

impl From<ProcessExit> for ExitCode {
    fn from(outcome: ProcessExit) -> Self {
        match outcome {
            ProcessExit::Success => ExitCode::SUCCESS,
            ProcessExit::Failure => ExitCode::from(1),
            ProcessExit::Partial => ExitCode::from(2),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?cli, "CLI arguments parsed");

    match run(cli).await {
        Ok(outcome) => outcome.into(),
        Err(e) => {
            error!("{e:#}");
            eprintln!("error: {e:#}");
            ProcessExit::Failure.into()
        }
    }
}

async fn run(cli: Cli) -> Result<ProcessExit> {
    if let Command::Devices = cli.command {
        commands::run_devices_command();
        return Ok(ProcessExit::Success);
    }

    let file_config = load_default_file_config()?;
    let mut settings = Settings::resolve(file_config.as_ref())?;
    if let Some(database) = cli.database.clone() {
        settings.database_path = database;
    }
    debug!(?settings, "settings resolved");

    match &cli.command {
        Command::Search { query } => commands::run_search_command(query).await?,
        Command::Add { series_id } => commands::run_add_command(series_id, &settings).await?,
        Command::List => commands::run_list_command(&settings).await?,
        Command::Download(args) => {
            if let Some(dir) = args.output_dir.clone() {
                settings.output_dir = dir;
            }
            if let Some(concurrency) = args.concurrency {
                settings.concurrency = usize::from(concurrency);
            }
            if let Some(ms) = args.rate_limit {
                settings.rate_limit = std::time::Duration::from_millis(ms);
            }
            return commands::run_download_command(args, &settings, cli.quiet).await;
        }
        Command::Export(args) => commands::run_export_command(args, &settings).await?,
        Command::Devices => commands::run_devices_command(),
    }
    Ok(ProcessExit::Success)
}
