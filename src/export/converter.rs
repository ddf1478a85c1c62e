//! External e-book converters tried in cascade after an export.
//!
//! - [`EbookConvert`] wraps Calibre's `ebook-convert`
//! - [`Kindlegen`] wraps Amazon's `kindlegen` (MOBI only)

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

use super::error::ConvertError;

/// Final output format of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    /// The native container, no conversion needed.
    #[default]
    Epub,
    Mobi,
    Azw3,
    Kfx,
}

impl ExportFormat {
    /// File extension, which is also the lowercase name.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Epub => "epub",
            Self::Mobi => "mobi",
            Self::Azw3 => "azw3",
            Self::Kfx => "kfx",
        }
    }

    /// True when the format requires an external converter.
    #[must_use]
    pub fn needs_conversion(&self) -> bool {
        *self != Self::Epub
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "epub" => Ok(Self::Epub),
            "mobi" => Ok(Self::Mobi),
            "azw3" => Ok(Self::Azw3),
            "kfx" => Ok(Self::Kfx),
            other => Err(format!("unsupported export format: {other}")),
        }
    }
}

/// Metadata passed to converters.
#[derive(Debug, Clone, Default)]
pub struct ConversionRequest {
    pub format: ExportFormat,
    pub title: Option<String>,
    pub author: Option<String>,
    pub right_to_left: bool,
}

/// One external conversion tool.
#[async_trait]
pub trait ExternalConverter: Send + Sync {
    /// Tool name used in logs and error reports.
    fn name(&self) -> &'static str;

    /// Converts `input` into `output`.
    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        request: &ConversionRequest,
    ) -> Result<(), ConvertError>;
}

/// Calibre's `ebook-convert`.
#[derive(Debug, Clone, Default)]
pub struct EbookConvert {
    program: Option<PathBuf>,
}

impl EbookConvert {
    const TOOL: &'static str = "ebook-convert";

    /// Uses `ebook-convert` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses an explicit executable.
    #[must_use]
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: Some(program.into()),
        }
    }

    /// Builds the argument list for one conversion.
    #[must_use]
    pub fn arguments(input: &Path, output: &Path, request: &ConversionRequest) -> Vec<String> {
        let mut args = vec![
            input.display().to_string(),
            output.display().to_string(),
            "--output-profile".to_string(),
            "kindle".to_string(),
            "--no-inline-toc".to_string(),
        ];
        if let Some(title) = request.title.as_deref().filter(|t| !t.is_empty()) {
            args.extend(["--title".to_string(), title.to_string()]);
        }
        if let Some(author) = request.author.as_deref().filter(|a| !a.is_empty()) {
            args.extend(["--authors".to_string(), author.to_string()]);
        }
        if request.right_to_left {
            args.extend([
                "--page-progression-direction".to_string(),
                "rtl".to_string(),
            ]);
        }
        args
    }
}

#[async_trait]
impl ExternalConverter for EbookConvert {
    fn name(&self) -> &'static str {
        Self::TOOL
    }

    #[instrument(skip(self, request), fields(input = %input.display(), output = %output.display()))]
    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        request: &ConversionRequest,
    ) -> Result<(), ConvertError> {
        let program = locate(Self::TOOL, self.program.as_deref())?;
        let mut command = Command::new(program);
        command.args(Self::arguments(input, output, request));
        run(Self::TOOL, command).await
    }
}

/// Amazon's `kindlegen`. Only produces MOBI.
#[derive(Debug, Clone, Default)]
pub struct Kindlegen {
    program: Option<PathBuf>,
}

impl Kindlegen {
    const TOOL: &'static str = "kindlegen";

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: Some(program.into()),
        }
    }
}

#[async_trait]
impl ExternalConverter for Kindlegen {
    fn name(&self) -> &'static str {
        Self::TOOL
    }

    #[instrument(skip(self, request), fields(input = %input.display(), output = %output.display()))]
    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        request: &ConversionRequest,
    ) -> Result<(), ConvertError> {
        if request.format != ExportFormat::Mobi {
            return Err(ConvertError::Unsupported {
                tool: Self::TOOL,
                format: request.format.extension(),
            });
        }
        let program = locate(Self::TOOL, self.program.as_deref())?;

        // kindlegen writes next to its input under the name given with -o.
        // It runs inside that directory, so the input is passed by file name.
        let work_dir = parent_dir(input);
        let input_name = input.file_name().unwrap_or(input.as_os_str());
        let file_name = output
            .file_name()
            .map_or_else(|| "output.mobi".into(), |n| n.to_string_lossy().into_owned());
        let mut command = Command::new(program);
        command
            .arg(input_name)
            .arg("-o")
            .arg(&file_name)
            .current_dir(&work_dir);
        run(Self::TOOL, command).await?;

        let generated = work_dir.join(&file_name);
        if generated != output {
            tokio::fs::rename(&generated, output)
                .await
                .map_err(|source| ConvertError::Io {
                    tool: Self::TOOL,
                    source,
                })?;
        }
        Ok(())
    }
}

fn locate(tool: &'static str, explicit: Option<&Path>) -> Result<PathBuf, ConvertError> {
    match explicit {
        Some(path) if path.exists() => Ok(path.to_path_buf()),
        Some(_) => Err(ConvertError::NotInstalled { tool }),
        None => which::which(tool).map_err(|_| ConvertError::NotInstalled { tool }),
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

async fn run(tool: &'static str, mut command: Command) -> Result<(), ConvertError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    debug!(tool, command = ?command.as_std(), "running converter");

    let output = command
        .output()
        .await
        .map_err(|source| ConvertError::Io { tool, source })?;
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    let tail: String = stderr
        .char_indices()
        .rev()
        .nth(499)
        .map_or(stderr, |(i, _)| &stderr[i..])
        .to_string();
    Err(ConvertError::Failed {
        tool,
        status: output.status.to_string(),
        stderr: tail,
    })
}
