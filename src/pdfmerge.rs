//! PDF merging through whichever external tool is installed.
//!
//! Backends are probed in a fixed order and the first one found on `PATH`
//! is used for the whole run:
//!
//! 1. `pdfunite` (poppler-utils)
//! 2. `qpdf`

use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

/// Errors that can occur while merging PDFs.
#[derive(Debug, Error)]
pub enum PdfMergeError {
    /// No backend is installed.
    #[error("No PDF merging backend available. Install 'pdfunite' (poppler-utils) or 'qpdf'.")]
    NoBackend,

    /// Nothing to merge.
    #[error("No input PDFs supplied")]
    NoInputs,

    /// The backend executable could not be started.
    #[error("Failed to run {backend}")]
    Spawn {
        /// Backend name.
        backend: &'static str,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The backend exited with a failure status.
    #[error("{backend} failed: {stderr}")]
    Failed {
        /// Backend name.
        backend: &'static str,
        /// Captured standard error.
        stderr: String,
    },
}

/// A way of merging PDF files.
pub trait PdfMergeBackend: fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether the backend can be used on this machine.
    fn is_available(&self) -> bool;

    /// Concatenates `inputs`, in order, into `output`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<(), PdfMergeError>;
}

/// An external merge executable located on `PATH`.
#[derive(Debug, Clone)]
struct ExternalTool {
    name: &'static str,
    args: fn(&[PathBuf], &Path) -> Vec<OsString>,
}

impl ExternalTool {
    fn run(&self, program: &Path, inputs: &[PathBuf], output: &Path) -> Result<(), PdfMergeError> {
        let result = Command::new(program)
            .args((self.args)(inputs, output))
            .output()
            .map_err(|source| PdfMergeError::Spawn {
                backend: self.name,
                source,
            })?;

        if !result.status.success() {
            return Err(PdfMergeError::Failed {
                backend: self.name,
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

impl PdfMergeBackend for ExternalTool {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_available(&self) -> bool {
        which::which(self.name).is_ok()
    }

    fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<(), PdfMergeError> {
        let program = which::which(self.name).map_err(|_| PdfMergeError::NoBackend)?;
        self.run(&program, inputs, output)
    }
}

/// `pdfunite in1.pdf in2.pdf out.pdf`
fn pdfunite_args(inputs: &[PathBuf], output: &Path) -> Vec<OsString> {
    inputs
        .iter()
        .map(|p| p.clone().into_os_string())
        .chain(std::iter::once(output.as_os_str().to_os_string()))
        .collect()
}

/// `qpdf --empty --pages in1.pdf in2.pdf -- out.pdf`
fn qpdf_args(inputs: &[PathBuf], output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["--empty".into(), "--pages".into()];
    args.extend(inputs.iter().map(|p| p.clone().into_os_string()));
    args.push("--".into());
    args.push(output.as_os_str().to_os_string());
    args
}

/// Backends in priority order.
#[must_use]
pub fn candidates() -> Vec<Box<dyn PdfMergeBackend>> {
    vec![
        Box::new(ExternalTool {
            name: "pdfunite",
            args: pdfunite_args,
        }),
        Box::new(ExternalTool {
            name: "qpdf",
            args: qpdf_args,
        }),
    ]
}

/// Returns the first available backend from `candidates`.
#[must_use]
pub fn select_backend(
    candidates: Vec<Box<dyn PdfMergeBackend>>,
) -> Option<Box<dyn PdfMergeBackend>> {
    let backend = candidates.into_iter().find(|b| b.is_available());
    match &backend {
        Some(b) => tracing::debug!(backend = b.name(), "Selected PDF merge backend"),
        None => tracing::debug!("No PDF merge backend found"),
    }
    backend
}

/// Probes the installed tools and returns the preferred backend.
#[must_use]
pub fn resolve_backend() -> Option<Box<dyn PdfMergeBackend>> {
    select_backend(candidates())
}

/// Merges `inputs` into `output` with `backend`.
///
/// # Errors
///
/// Returns [`PdfMergeError::NoInputs`] for an empty list, or the backend's
/// error.
pub fn merge_pdf(
    backend: &dyn PdfMergeBackend,
    inputs: &[PathBuf],
    output: &Path,
) -> Result<(), PdfMergeError> {
    if inputs.is_empty() {
        return Err(PdfMergeError::NoInputs);
    }
    backend.merge(inputs, output)?;
    tracing::info!(
        backend = backend.name(),
        inputs = inputs.len(),
        output = %output.display(),
        "Merged PDFs"
    );
    Ok(())
}
