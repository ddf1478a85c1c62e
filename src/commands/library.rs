//! Library command handlers: add a series and list tracked series.

use anyhow::Result;
use mangas_core::config::Settings;
use mangas_core::library::LibraryError;
use mangas_core::source::{MangaDex, Source};
use tracing::info;

use super::open_library;

pub async fn run_add_command(series_id: &str, settings: &Settings) -> Result<()> {
    let library = open_library(settings).await?;

    match library.get_series(series_id).await {
        Ok(existing) => {
            println!("{} is already in the library [{}]", existing.name, existing.status);
            return Ok(());
        }
        Err(LibraryError::SeriesNotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }

    let source = MangaDex::new()?;
    let series = source.get_series(series_id).await?;
    library.save_series(&series).await?;
    info!(series_id = %series.id, name = %series.name, "series added");
    println!("Added {} ({})", series.name, series.id);
    Ok(())
}

pub async fn run_list_command(settings: &Settings) -> Result<()> {
    let library = open_library(settings).await?;
    let all = library.list_series().await?;

    if all.is_empty() {
        println!("The library is empty. Use `mangas add <series-id>` to track a series.");
        return Ok(());
    }

    for series in &all {
        let chapters = library.get_chapters(&series.id).await?;
        let materialized = chapters.iter().filter(|c| c.materialized).count();
        println!(
            "{:<40} {:<12} {}/{} chapters  {}",
            series.name,
            series.status.as_str(),
            materialized,
            chapters.len(),
            series.id
        );
    }
    Ok(())
}
