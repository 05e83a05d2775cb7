//! Format normalisation: bring every upload to the target e-book format.
//!
//! The decision is made purely on the file extension. Matching is ASCII
//! case-insensitive, so `Book.EPUB` is treated as already converted.
//! Anything else is handed to an external [`Converter`], by default
//! calibre's `ebook-convert`, which infers input and output formats from the
//! two path extensions.

use crate::error::BridgeError;
use crate::store::{TransientFile, TransientStore};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info};

/// Default converter executable.
pub const DEFAULT_CONVERTER: &str = "ebook-convert";

/// Extension of a file name including the leading dot, or `""`.
///
/// Only the final segment counts: `archive.tar.gz` yields `.gz`.
pub fn extension_of(file_name: &str) -> &str {
    let base_start = file_name.rfind(['/', '\\']).map_or(0, |i| i + 1);
    match file_name[base_start..].rfind('.') {
        Some(dot) => &file_name[base_start + dot..],
        None => "",
    }
}

/// Swap the final extension of `file_name` for `extension`.
///
/// `extension` may be given with or without the leading dot. A name with
/// no extension gains one. Applying the same swap twice is a no-op.
pub fn replace_extension(file_name: &str, extension: &str) -> String {
    let stem = &file_name[..file_name.len() - extension_of(file_name).len()];
    format!("{}.{}", stem, extension.trim_start_matches('.'))
}

/// True when `path` does not already carry `target_extension`.
pub fn needs_conversion(path: &Path, target_extension: &str) -> bool {
    let target = target_extension.trim_start_matches('.');
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => !ext.eq_ignore_ascii_case(target),
        None => true,
    }
}

/// An external e-book converter.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Convert `input` into `output`. The output format follows from the
    /// output path's extension.
    async fn convert(&self, input: &Path, output: &Path) -> Result<(), BridgeError>;

    /// Check that the converter can be started at all.
    async fn validate(&self) -> Result<(), BridgeError>;
}

/// Converter backed by calibre's `ebook-convert` command line tool.
#[derive(Debug, Clone)]
pub struct EbookConvert {
    program: PathBuf,
    extra_args: Vec<String>,
}

impl EbookConvert {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
        }
    }

    /// Arguments appended after the input and output paths.
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    fn build_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let mut args = vec![
            input.to_string_lossy().to_string(),
            output.to_string_lossy().to_string(),
        ];
        args.extend(self.extra_args.iter().cloned());
        args
    }

    fn unavailable(&self, source: std::io::Error) -> BridgeError {
        BridgeError::ConverterUnavailable {
            program: self.program.clone(),
            source,
        }
    }
}

impl Default for EbookConvert {
    fn default() -> Self {
        Self::new(DEFAULT_CONVERTER)
    }
}

#[async_trait]
impl Converter for EbookConvert {
    fn name(&self) -> &str {
        "ebook-convert"
    }

    async fn convert(&self, input: &Path, output: &Path) -> Result<(), BridgeError> {
        let args = self.build_args(input, output);
        debug!("Running {} {:?}", self.program.display(), args);

        let result = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.unavailable(e))?;

        if result.status.success() {
            return Ok(());
        }

        // calibre reports most problems on stdout; prefer stderr when present.
        let stderr = String::from_utf8_lossy(&result.stderr);
        let stdout = String::from_utf8_lossy(&result.stdout);
        let diagnostic = [stderr.trim(), stdout.trim()]
            .into_iter()
            .find(|s| !s.is_empty())
            .map(str::to_string);

        Err(BridgeError::ConversionFailed {
            reason: result.status.to_string(),
            diagnostic,
        })
    }

    async fn validate(&self) -> Result<(), BridgeError> {
        let status = Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| self.unavailable(e))?;

        if status.success() {
            Ok(())
        } else {
            Err(BridgeError::ConversionFailed {
                reason: format!("`{} --version` {}", self.program.display(), status),
                diagnostic: None,
            })
        }
    }
}

/// Decides whether a fetched file needs conversion and runs the converter.
#[derive(Clone)]
pub struct FormatNormalizer {
    converter: Arc<dyn Converter>,
    target_extension: String,
}

impl FormatNormalizer {
    pub fn new(converter: Arc<dyn Converter>, target_extension: impl Into<String>) -> Self {
        Self {
            converter,
            target_extension: target_extension.into().trim_start_matches('.').to_string(),
        }
    }

    /// Target extension without the leading dot, e.g. `"epub"`.
    pub fn target_extension(&self) -> &str {
        &self.target_extension
    }

    pub fn needs_conversion(&self, path: &Path) -> bool {
        needs_conversion(path, &self.target_extension)
    }

    /// Convert `source` into a sibling file with the target extension.
    ///
    /// The sibling is reserved in `store` before the converter runs, so it is
    /// cleaned up even when the converter fails halfway through writing it.
    pub async fn convert(
        &self,
        store: &TransientStore,
        source: &TransientFile,
    ) -> Result<TransientFile, BridgeError> {
        let target = store.reserve_sibling(source, &self.target_extension);
        let start = Instant::now();
        info!(
            "Converting {} -> {} with {}",
            source.path().display(),
            target.path().display(),
            self.converter.name()
        );

        // On error `target` drops here and removes any partial output.
        self.converter.convert(source.path(), target.path()).await?;

        info!("Conversion finished in {}ms", start.elapsed().as_millis());
        Ok(target)
    }
}
