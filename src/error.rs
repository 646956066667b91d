//! Error types for kicad-outputs.
//!
//! Each module owns its error enum; [`OutputError`] gathers them for the
//! full output run so the binary has a single error to report.

use std::path::PathBuf;

use thiserror::Error;

use crate::bom::BomError;
use crate::bundle::BundleError;
use crate::compositor::ImageError;
use crate::kicad::KicadError;
use crate::pdfmerge::PdfMergeError;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Errors from a full output run.
#[derive(Error, Debug)]
pub enum OutputError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// BOM extraction failed.
    #[error(transparent)]
    Bom(#[from] BomError),

    /// Cropping or animation failed.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// Creating the release archive failed.
    #[error(transparent)]
    Bundle(#[from] BundleError),

    /// Merging PDFs failed.
    #[error(transparent)]
    PdfMerge(#[from] PdfMergeError),

    /// A KiCad tool failed.
    #[error(transparent)]
    Kicad(#[from] KicadError),

    /// Output directory housekeeping failed.
    #[error("I/O error on {path}")]
    Io {
        /// Path being created or removed.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl OutputError {
    /// Creates an I/O error for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for the output run.
pub type OutputResult<T> = Result<T, OutputError>;
