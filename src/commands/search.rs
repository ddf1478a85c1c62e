//! Search command handler: query the catalogue by title.

use anyhow::Result;
use mangas_core::source::{MangaDex, Source};

const DESCRIPTION_PREVIEW_CHARS: usize = 80;

pub async fn run_search_command(query: &str) -> Result<()> {
    let source = MangaDex::new()?;
    let results = source.search(query).await?;

    if results.is_empty() {
        println!("No series found for \"{query}\".");
        return Ok(());
    }

    for summary in &results {
        println!("{}  {}", summary.id, summary.name);
        let preview = preview(&summary.description);
        if !preview.is_empty() {
            println!("    {preview}");
        }
    }
    println!("{} result(s)", results.len());
    Ok(())
}

fn preview(description: &str) -> String {
    let line = description.lines().next().unwrap_or_default().trim();
    if line.chars().count() <= DESCRIPTION_PREVIEW_CHARS {
        return line.to_string();
    }
    let cut: String = line.chars().take(DESCRIPTION_PREVIEW_CHARS).collect();
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_keeps_short_first_line() {
        assert_eq!(preview("Short.\nSecond line"), "Short.");
        assert_eq!(preview(""), "");
    }

    #[test]
    fn test_preview_truncates_long_line() {
        let long = "word ".repeat(40);
        let out = preview(&long);
        assert!(out.ends_with("..."));
        assert!(out.chars().count() <= DESCRIPTION_PREVIEW_CHARS + 3);
    }
}
