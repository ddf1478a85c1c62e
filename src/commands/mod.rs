//! CLI command handlers.

mod devices;
mod download;
mod export;
mod library;
mod search;

use anyhow::{Context, Result};
use mangas_core::config::Settings;
use mangas_core::library::Library;
use mangas_core::Database;

pub use devices::run_devices_command;
pub use download::run_download_command;
pub use export::run_export_command;
pub use library::{run_add_command, run_list_command};
pub use search::run_search_command;

/// Opens the library database named by `settings`, creating it if needed.
async fn open_library(settings: &Settings) -> Result<Library> {
    let db = Database::new(&settings.database_path)
        .await
        .with_context(|| {
            format!(
                "failed to open library database {}",
                settings.database_path.display()
            )
        })?;
    Ok(Library::new(db))
}
