//! File configuration and resolved runtime settings.
//!
//! The config file is optional TOML at:
//! 1. `$XDG_CONFIG_HOME/mangas/config.toml`
//! 2. `$HOME/.config/mangas/config.toml`
//!
//! Every key is optional; command-line flags override file values, and
//! file values override built-in defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::download::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_CONCURRENCY, DEFAULT_PROGRESS_BUFFER, DEFAULT_RATE_LIMIT_MS,
    READ_TIMEOUT_SECS,
};

const APP_DIR: &str = "mangas";
const DATA_DIR: &str = ".mangas";
const SUPPORTED_SOURCES: [&str; 1] = ["mangadex"];

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config value for `{field}`: {value}. Expected {expected}")]
    OutOfRange {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("cannot determine home directory (HOME is not set)")]
    NoHome,
}

/// TOML-backed file configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Directory chapter containers are written to.
    pub output_dir: Option<PathBuf>,
    /// Library database file.
    pub database_path: Option<PathBuf>,
    /// Chapters acquired in parallel (1..=16).
    pub concurrency: Option<usize>,
    /// Interval between rate-limiter permits in ms (0..=60000, 0 disables).
    pub rate_limit_ms: Option<u64>,
    /// Progress events buffered before dropping (1..=10000).
    pub progress_buffer: Option<usize>,
    pub connect_timeout_secs: Option<u64>,
    pub read_timeout_secs: Option<u64>,
    /// Catalogue to use. Only `mangadex` is supported.
    pub source: Option<String>,
}

impl FileConfig {
    /// Parses config text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on invalid TOML or unknown keys, and
    /// [`ConfigError::OutOfRange`] if a value fails validation.
    pub fn from_toml(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates values against runtime constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("concurrency", self.concurrency, 1, 16, "1..=16")?;
        check_range("rate_limit_ms", self.rate_limit_ms, 0, 60_000, "0..=60000")?;
        check_range(
            "progress_buffer",
            self.progress_buffer,
            1,
            10_000,
            "1..=10000",
        )?;
        check_range(
            "connect_timeout_secs",
            self.connect_timeout_secs,
            1,
            3600,
            "1..=3600",
        )?;
        check_range(
            "read_timeout_secs",
            self.read_timeout_secs,
            1,
            3600,
            "1..=3600",
        )?;
        if let Some(source) = &self.source
            && !SUPPORTED_SOURCES.contains(&source.as_str())
        {
            return Err(ConfigError::OutOfRange {
                field: "source",
                value: source.clone(),
                expected: "one of: mangadex",
            });
        }
        Ok(())
    }
}

fn check_range<T>(
    field: &'static str,
    value: Option<T>,
    min: T,
    max: T,
    expected: &'static str,
) -> Result<(), ConfigError>
where
    T: PartialOrd + ToString,
{
    match value {
        Some(v) if v < min || v > max => Err(ConfigError::OutOfRange {
            field,
            value: v.to_string(),
            expected,
        }),
        _ => Ok(()),
    }
}

/// Resolves the config file path, if a base directory is known.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    if let Some(xdg) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg).join(APP_DIR).join("config.toml"));
    }
    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads `path`, returning `None` when it does not exist.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file exists but cannot be read or is invalid.
pub fn load_file_config(path: &Path) -> Result<Option<FileConfig>, ConfigError> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file");
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = FileConfig::from_toml(&raw, path)?;
    debug!(path = %path.display(), "config file loaded");
    Ok(Some(config))
}

/// Loads the config file from [`default_config_path`] if present.
///
/// # Errors
///
/// Same as [`load_file_config`].
pub fn load_default_file_config() -> Result<Option<FileConfig>, ConfigError> {
    match default_config_path() {
        Some(path) => load_file_config(&path),
        None => Ok(None),
    }
}

/// Fully resolved settings used to wire the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub output_dir: PathBuf,
    pub database_path: PathBuf,
    pub concurrency: usize,
    pub rate_limit: Duration,
    pub progress_buffer: usize,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
}

impl Settings {
    /// Applies file values over built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoHome`] if a default path is needed and
    /// `HOME` is unset.
    pub fn resolve(file: Option<&FileConfig>) -> Result<Self, ConfigError> {
        let file = file.cloned().unwrap_or_default();
        let data_dir = || -> Result<PathBuf, ConfigError> {
            env_var_non_empty_os("HOME")
                .map(|home| PathBuf::from(home).join(DATA_DIR))
                .ok_or(ConfigError::NoHome)
        };

        let output_dir = match file.output_dir {
            Some(dir) => dir,
            None => data_dir()?.join("downloads"),
        };
        let database_path = match file.database_path {
            Some(path) => path,
            None => data_dir()?.join("library.db"),
        };

        Ok(Self {
            output_dir,
            database_path,
            concurrency: file.concurrency.unwrap_or(DEFAULT_CONCURRENCY),
            rate_limit: Duration::from_millis(file.rate_limit_ms.unwrap_or(DEFAULT_RATE_LIMIT_MS)),
            progress_buffer: file.progress_buffer.unwrap_or(DEFAULT_PROGRESS_BUFFER),
            connect_timeout_secs: file.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS),
            read_timeout_secs: file.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<FileConfig, ConfigError> {
        FileConfig::from_toml(raw, Path::new("config.toml"))
    }

    // ==================== Parsing Tests ====================

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(parse("").unwrap(), FileConfig::default());
    }

    #[test]
    fn test_full_config_parses() {
        let config = parse(
            r#"
            output_dir = "/srv/manga"
            database_path = "/srv/manga/library.db"
            concurrency = 4
            rate_limit_ms = 0
            progress_buffer = 50
            connect_timeout_secs = 10
            read_timeout_secs = 60
            source = "mangadex"
            "#,
        )
        .unwrap();
        assert_eq!(config.output_dir, Some(PathBuf::from("/srv/manga")));
        assert_eq!(config.concurrency, Some(4));
        assert_eq!(config.rate_limit_ms, Some(0));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = parse("colour = \"blue\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    // ==================== Validation Tests ====================

    #[test]
    fn test_out_of_range_values_rejected() {
        for raw in [
            "concurrency = 0",
            "concurrency = 17",
            "rate_limit_ms = 60001",
            "progress_buffer = 0",
            "read_timeout_secs = 0",
            "source = \"elsewhere\"",
        ] {
            let err = parse(raw).unwrap_err();
            assert!(matches!(err, ConfigError::OutOfRange { .. }), "{raw}");
        }
    }

    #[test]
    fn test_out_of_range_message_names_field() {
        let msg = parse("concurrency = 99").unwrap_err().to_string();
        assert!(msg.contains("`concurrency`"));
        assert!(msg.contains("1..=16"));
    }

    // ==================== Resolution Tests ====================

    #[test]
    fn test_settings_prefer_file_values() {
        let file = FileConfig {
            output_dir: Some(PathBuf::from("/out")),
            database_path: Some(PathBuf::from("/db.sqlite")),
            concurrency: Some(5),
            rate_limit_ms: Some(250),
            ..FileConfig::default()
        };
        let settings = Settings::resolve(Some(&file)).unwrap();
        assert_eq!(settings.output_dir, PathBuf::from("/out"));
        assert_eq!(settings.concurrency, 5);
        assert_eq!(settings.rate_limit, Duration::from_millis(250));
        assert_eq!(settings.progress_buffer, DEFAULT_PROGRESS_BUFFER);
        assert_eq!(settings.read_timeout_secs, READ_TIMEOUT_SECS);
    }

    #[test]
    fn test_load_missing_file_is_none() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(
            load_file_config(&dir.path().join("config.toml"))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_load_file_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "concurrency = 2\n").unwrap();
        let config = load_file_config(&path).unwrap().unwrap();
        assert_eq!(config.concurrency, Some(2));
    }
}
