//! Download command handler: select chapters and run one batch.

use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::{Context, Result};
use mangas_core::config::Settings;
use mangas_core::download::{
    BatchReport, ChapterAcquirer, ChapterSelection, HttpClient, RateLimiter, SeriesOrchestrator,
    progress_channel,
};
use mangas_core::library::LibraryError;
use mangas_core::source::{MangaDex, Source};
use tracing::{debug, info, warn};

use super::open_library;
use crate::ProcessExit;
use crate::cli::DownloadArgs;
use crate::exit_handler::determine_exit_outcome;
use crate::progress_ui::{finish_progress_ui, spawn_progress_ui};

pub async fn run_download_command(
    args: &DownloadArgs,
    settings: &Settings,
    quiet: bool,
) -> Result<ProcessExit> {
    let library = open_library(settings).await?;
    let source: Arc<dyn Source> = Arc::new(MangaDex::new()?);

    let series = match library.get_series(&args.series_id).await {
        Ok(series) => series,
        Err(LibraryError::SeriesNotFound(_)) => {
            debug!(series_id = %args.series_id, "series not in library, looking it up");
            source.get_series(&args.series_id).await?
        }
        Err(e) => return Err(e.into()),
    };

    let selection = ChapterSelection {
        language: args.language.clone(),
        chapter_ids: args.chapters.clone(),
        range: args.range.clone(),
    };
    let chapters = selection.select(source.get_chapters(&series).await?)?;
    info!(
        series = %series.name,
        chapters = chapters.len(),
        concurrency = settings.concurrency,
        "starting download"
    );

    tokio::fs::create_dir_all(&settings.output_dir)
        .await
        .with_context(|| format!("failed to create {}", settings.output_dir.display()))?;

    let rate_limiter = if settings.rate_limit.is_zero() {
        debug!("rate limiting disabled");
        Arc::new(RateLimiter::disabled())
    } else {
        debug!(rate_limit_ms = settings.rate_limit.as_millis(), "rate limiting enabled");
        Arc::new(RateLimiter::new(settings.rate_limit))
    };
    let fetcher = Arc::new(HttpClient::new_with_timeouts(
        settings.connect_timeout_secs,
        settings.read_timeout_secs,
    )?);
    let (progress, events) = progress_channel(settings.progress_buffer);

    let acquirer = ChapterAcquirer::new(
        source,
        fetcher,
        Arc::new(library),
        rate_limiter,
        progress,
        settings.output_dir.clone(),
    );
    let orchestrator = Arc::new(SeriesOrchestrator::new(acquirer, settings.concurrency)?);

    let show_progress = !quiet && std::io::stderr().is_terminal();
    let ui = spawn_progress_ui(show_progress, events, chapters.len());

    let interrupt = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, finishing chapters in flight");
                orchestrator.shutdown();
            }
        })
    };

    let result = orchestrator.acquire_all(&series, Some(chapters)).await;
    interrupt.abort();

    // The UI task ends once the last progress sender (held by the acquirer) is gone.
    drop(orchestrator);
    finish_progress_ui(ui).await;

    let report = result?;
    print_report(&series.name, &report);

    if args.strict {
        report.into_result()?;
        return Ok(ProcessExit::Success);
    }
    Ok(determine_exit_outcome(
        report.completed.len(),
        report.failures.len(),
    ))
}

fn print_report(series_name: &str, report: &BatchReport) {
    println!(
        "{series_name}: {}/{} chapters downloaded [{}]",
        report.completed.len(),
        report.total(),
        report.status
    );
    for (_, path) in &report.completed {
        println!("  {}", path.display());
    }
    for failure in &report.failures {
        println!(
            "  chapter {} ({}) failed: {}",
            failure.chapter_number, failure.chapter_id, failure.error
        );
    }
}
