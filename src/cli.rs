//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Archive illustrated series from online catalogues as EPUB files.
///
/// Series are tracked in a local library; each chapter becomes one
/// container file that can later be combined and optimized for a reading
/// device.
#[derive(Parser, Debug)]
#[command(name = "mangas")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Library database file (overrides config)
    #[arg(long, global = true, value_name = "PATH")]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search the catalogue by title
    Search {
        /// Title to search for
        query: String,
    },

    /// Add a series to the library by catalogue id
    Add {
        /// Catalogue id of the series
        series_id: String,
    },

    /// List series in the library
    List,

    /// Download chapters of a series
    Download(DownloadArgs),

    /// Combine downloaded chapters into one file optimized for a device
    Export(ExportArgs),

    /// List supported reading devices
    Devices,
}

#[derive(Args, Debug, Clone)]
pub struct DownloadArgs {
    /// Catalogue id of the series
    pub series_id: String,

    /// Only chapters in this language. Pass an empty value to take every
    /// language; translations of one chapter number then share a file name
    #[arg(short, long, default_value = "en")]
    pub language: Option<String>,

    /// Inclusive chapter number range, e.g. 1-10
    #[arg(short, long)]
    pub range: Option<String>,

    /// Specific chapter ids (repeatable)
    #[arg(long = "chapter", value_name = "ID")]
    pub chapters: Vec<String>,

    /// Output directory for chapter files (overrides config)
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Chapters downloaded in parallel (1-16)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub concurrency: Option<u8>,

    /// Minimum delay between requests in milliseconds (0 to disable, max 60000)
    #[arg(short = 'l', long, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub rate_limit: Option<u64>,

    /// Exit with an error if any chapter fails
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Name of a series in the library
    pub series_name: String,

    /// Target device id (see `mangas devices`)
    #[arg(short, long)]
    pub device: String,

    /// Output format: epub, mobi, azw3 or kfx
    #[arg(short, long, default_value = "epub")]
    pub format: String,

    /// Output file; defaults to "<series>_<device>" in the current directory
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Title of the combined work (defaults to the series name)
    #[arg(long)]
    pub title: Option<String>,

    /// Author recorded in the output
    #[arg(long)]
    pub author: Option<String>,

    /// Only these chapter ids (repeatable); defaults to every downloaded chapter
    #[arg(long = "chapter", value_name = "ID")]
    pub chapters: Vec<String>,

    /// Copy pages without re-encoding them for the device
    #[arg(long)]
    pub no_optimize: bool,

    /// Left-to-right page progression
    #[arg(long)]
    pub ltr: bool,
}
