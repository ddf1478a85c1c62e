//! Export command handler: combine downloaded chapters for a device.

use std::path::PathBuf;

use anyhow::{Result, anyhow, bail};
use mangas_core::config::Settings;
use mangas_core::document::sanitize_filename;
use mangas_core::export::{DeviceExporter, ExportFormat, ExportOptions};
use mangas_core::model::ChapterUnit;
use tracing::{info, warn};

use super::open_library;
use crate::cli::ExportArgs;

pub async fn run_export_command(args: &ExportArgs, settings: &Settings) -> Result<()> {
    let format: ExportFormat = args.format.parse().map_err(|e: String| anyhow!(e))?;

    let library = open_library(settings).await?;
    let series = library
        .find_series_by_name(&args.series_name)
        .await?
        .ok_or_else(|| anyhow!("no series named \"{}\" in the library", args.series_name))?;

    let chapters = library.get_chapters(&series.id).await?;
    let containers = select_containers(chapters, &args.chapters);
    if containers.is_empty() {
        bail!(
            "no downloaded chapters of {} to export; run `mangas download {}` first",
            series.name,
            series.id
        );
    }
    info!(series = %series.name, chapters = containers.len(), device = %args.device, %format, "exporting");

    let output = args.output.clone().unwrap_or_else(|| {
        PathBuf::from(format!(
            "{}_{}",
            sanitize_filename(&series.name),
            args.device
        ))
    });
    let mut options = ExportOptions::new(
        args.device.clone(),
        args.title.clone().unwrap_or_else(|| series.name.clone()),
        output,
    );
    options.format = format;
    options.author.clone_from(&args.author);
    options.optimize = !args.no_optimize;
    options.right_to_left = !args.ltr;

    match DeviceExporter::new().convert(&containers, &options).await {
        Ok(outcome) => {
            match outcome.converter {
                Some(tool) => println!(
                    "Wrote {} ({} pages, converted with {tool})",
                    outcome.path.display(),
                    outcome.pages
                ),
                None => println!("Wrote {} ({} pages)", outcome.path.display(), outcome.pages),
            }
            Ok(())
        }
        Err(e) => {
            if let Some(fallback) = e.fallback_path() {
                warn!(fallback = %fallback.display(), "conversion failed, EPUB kept");
                println!("Conversion failed; the combined EPUB is at {}", fallback.display());
            }
            Err(e.into())
        }
    }
}

/// Container paths of materialized chapters, restricted to `wanted` ids
/// when any are given. Library order is kept.
fn select_containers(chapters: Vec<ChapterUnit>, wanted: &[String]) -> Vec<PathBuf> {
    chapters
        .into_iter()
        .filter(|c| c.materialized)
        .filter(|c| wanted.is_empty() || wanted.contains(&c.id))
        .filter_map(|c| c.container_path)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(id: &str, materialized: bool) -> ChapterUnit {
        ChapterUnit {
            id: id.to_string(),
            materialized,
            container_path: materialized.then(|| PathBuf::from(format!("{id}.epub"))),
            ..ChapterUnit::default()
        }
    }

    #[test]
    fn test_select_containers_skips_unmaterialized() {
        let chapters = vec![chapter("a", true), chapter("b", false), chapter("c", true)];
        assert_eq!(
            select_containers(chapters, &[]),
            vec![PathBuf::from("a.epub"), PathBuf::from("c.epub")]
        );
    }

    #[test]
    fn test_select_containers_filters_ids_in_library_order() {
        let chapters = vec![chapter("a", true), chapter("b", true), chapter("c", true)];
        let wanted = vec!["c".to_string(), "a".to_string()];
        assert_eq!(
            select_containers(chapters, &wanted),
            vec![PathBuf::from("a.epub"), PathBuf::from("c.epub")]
        );
    }
}
