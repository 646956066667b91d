//! Error types for BOM extraction.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for BOM operations.
pub type BomResult<T> = Result<T, BomError>;

/// Errors that can occur while reading a netlist export or writing a BOM.
#[derive(Debug, Error)]
pub enum BomError {
    /// Failed to open or read the netlist export.
    #[error("Failed to read file: {path}")]
    FileRead {
        /// Path to the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Failed to write the BOM table.
    #[error("Failed to write file: {path}")]
    FileWrite {
        /// Path to the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The document is not well-formed XML.
    #[error("XML parse error at offset {offset}: {message}")]
    Parse {
        /// Byte offset where the error occurred.
        offset: u64,
        /// Description of what's wrong.
        message: String,
    },

    /// A required attribute is missing from an otherwise well-formed document.
    #[error("Missing attribute '{attribute}' on <{element}> element")]
    Schema {
        /// Element that is missing the attribute.
        element: &'static str,
        /// Name of the missing attribute.
        attribute: &'static str,
    },
}

impl BomError {
    /// Creates a file read error.
    pub fn file_read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a file write error.
    pub fn file_write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::FileWrite {
            path: path.into(),
            source,
        }
    }

    /// Creates a parse error.
    pub fn parse(offset: u64, message: impl Into<String>) -> Self {
        Self::Parse {
            offset,
            message: message.into(),
        }
    }

    /// Creates a schema error for a missing attribute.
    #[must_use]
    pub const fn schema(element: &'static str, attribute: &'static str) -> Self {
        Self::Schema { element, attribute }
    }
}
