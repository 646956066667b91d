//! Release bundles.
//!
//! Packs the generated deliverables into a single archive. The archive
//! format follows the output file name: `.zip` or `.tar.gz`.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use atomicwrites::{AtomicFile, OverwriteBehavior};
use flate2::write::GzEncoder;
use flate2::Compression;
use thiserror::Error;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Errors that can occur while bundling.
#[derive(Debug, Error)]
pub enum BundleError {
    /// The output name does not end in a supported suffix.
    #[error("Unknown compression format: \"{path}\" (supported: {supported})")]
    UnsupportedFormat {
        /// Requested output path.
        path: PathBuf,
        /// Comma-separated list of supported formats.
        supported: String,
    },

    /// Failed to list or read an input.
    #[error("Failed to read {path}")]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The zip writer failed.
    #[error("Failed to write zip archive: {path}")]
    Zip {
        /// Archive path.
        path: PathBuf,
        /// Underlying zip error.
        #[source]
        source: zip::result::ZipError,
    },

    /// Failed to write or rename the archive.
    #[error("Failed to write file: {path}")]
    FileWrite {
        /// Archive path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Archive container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleFormat {
    /// Deflate-compressed zip.
    Zip,
    /// Gzip-compressed tarball.
    TarGz,
}

impl BundleFormat {
    /// All formats, in the order they are matched against file names.
    pub const ALL: [Self; 2] = [Self::Zip, Self::TarGz];

    /// File name suffix, including the leading dot.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Zip => ".zip",
            Self::TarGz => ".tar.gz",
        }
    }

    /// Format name as used in configuration (`zip`, `tar.gz`).
    #[must_use]
    pub fn name(self) -> &'static str {
        &self.suffix()[1..]
    }

    /// Looks a format up by configuration name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    /// Picks the format from the end of an output file name.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        Self::ALL.into_iter().find(|f| name.ends_with(f.suffix()))
    }
}

/// Names of all supported formats.
#[must_use]
pub fn supported_formats() -> Vec<&'static str> {
    BundleFormat::ALL.iter().map(|f| f.name()).collect()
}

/// Bundles `files` (names relative to `input_dir`) into `output_file`.
///
/// With `files == None` every entry of `input_dir` is bundled, sorted by
/// name, except the archive itself. Directories are added recursively.
///
/// # Errors
///
/// Returns [`BundleError::UnsupportedFormat`] before touching the file system
/// if the output suffix is unknown, or an I/O / archive error otherwise. The
/// archive is written atomically.
pub fn bundle(
    input_dir: &Path,
    output_file: &Path,
    files: Option<&[String]>,
) -> Result<Vec<String>, BundleError> {
    let format = BundleFormat::from_path(output_file).ok_or_else(|| {
        BundleError::UnsupportedFormat {
            path: output_file.to_path_buf(),
            supported: supported_formats().join(", "),
        }
    })?;

    let entries = match files {
        Some(files) => files.to_vec(),
        None => list_entries(input_dir, output_file)?,
    };

    let result = AtomicFile::new(output_file, OverwriteBehavior::AllowOverwrite).write(|file| {
        match format {
            BundleFormat::Zip => write_zip(file, input_dir, &entries),
            BundleFormat::TarGz => write_tar_gz(file, input_dir, &entries),
        }
    });
    result.map_err(|e| match e {
        atomicwrites::Error::Internal(source) => BundleError::FileWrite {
            path: output_file.to_path_buf(),
            source,
        },
        atomicwrites::Error::User(ArchiveError::Io(path, source)) => {
            BundleError::Io { path, source }
        }
        atomicwrites::Error::User(ArchiveError::Zip(source)) => BundleError::Zip {
            path: output_file.to_path_buf(),
            source,
        },
    })?;

    tracing::info!(
        path = %output_file.display(),
        format = format.name(),
        entries = entries.len(),
        "Wrote bundle"
    );
    Ok(entries)
}

/// Failure inside the archive writer, before it is tied to the output path.
#[derive(Debug)]
enum ArchiveError {
    Io(PathBuf, io::Error),
    Zip(zip::result::ZipError),
}

impl From<zip::result::ZipError> for ArchiveError {
    fn from(e: zip::result::ZipError) -> Self {
        Self::Zip(e)
    }
}

fn list_entries(input_dir: &Path, output_file: &Path) -> Result<Vec<String>, BundleError> {
    let io_err = |source| BundleError::Io {
        path: input_dir.to_path_buf(),
        source,
    };
    let parent = output_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let output = fs::canonicalize(parent)
        .ok()
        .zip(output_file.file_name())
        .map(|(dir, name)| dir.join(name));

    let mut names = Vec::new();
    for entry in fs::read_dir(input_dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let path = fs::canonicalize(entry.path()).map_err(io_err)?;
        if output.as_deref() == Some(path.as_path()) {
            continue;
        }
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

/// Expands `entries` into `(archive name, path)` pairs; directories recurse.
fn expand(input_dir: &Path, entries: &[String]) -> Result<Vec<(String, PathBuf)>, ArchiveError> {
    let mut out = Vec::new();
    for entry in entries {
        let root = input_dir.join(entry);
        for item in WalkDir::new(&root).sort_by_file_name() {
            let item = item.map_err(|e| {
                let path = e.path().unwrap_or(&root).to_path_buf();
                ArchiveError::Io(path, io::Error::other(e))
            })?;
            let relative = item
                .path()
                .strip_prefix(input_dir)
                .unwrap_or_else(|_| item.path());
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push((name, item.path().to_path_buf()));
        }
    }
    Ok(out)
}

fn zip_options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated)
}

fn write_zip(file: &mut File, input_dir: &Path, entries: &[String]) -> Result<(), ArchiveError> {
    let mut zip = ZipWriter::new(file);

    for (name, path) in expand(input_dir, entries)? {
        if path.is_dir() {
            zip.add_directory(name, zip_options())?;
        } else {
            let content = fs::read(&path).map_err(|e| ArchiveError::Io(path.clone(), e))?;
            zip.start_file(name, zip_options())?;
            zip.write_all(&content)
                .map_err(|e| ArchiveError::Io(path.clone(), e))?;
        }
    }
    zip.finish()?;
    Ok(())
}

fn write_tar_gz(
    file: &mut File,
    input_dir: &Path,
    entries: &[String],
) -> Result<(), ArchiveError> {
    let mut tar = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    let to_err = |path: &Path| {
        let path = path.to_path_buf();
        move |e| ArchiveError::Io(path, e)
    };

    for (name, path) in expand(input_dir, entries)? {
        if path.is_dir() {
            tar.append_dir(&name, &path).map_err(to_err(&path))?;
        } else {
            tar.append_path_with_name(&path, &name)
                .map_err(to_err(&path))?;
        }
    }
    let encoder = tar.into_inner().map_err(to_err(input_dir))?;
    encoder.finish().map_err(to_err(input_dir))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_suffix() {
        assert_eq!(
            BundleFormat::from_path(Path::new("out/board.zip")),
            Some(BundleFormat::Zip)
        );
        assert_eq!(
            BundleFormat::from_path(Path::new("board.tar.gz")),
            Some(BundleFormat::TarGz)
        );
        assert_eq!(BundleFormat::from_path(Path::new("board.7z")), None);
        assert_eq!(BundleFormat::from_path(Path::new("board.gz")), None);
    }

    #[test]
    fn format_names() {
        assert_eq!(supported_formats(), ["zip", "tar.gz"]);
        assert_eq!(BundleFormat::from_name("tar.gz"), Some(BundleFormat::TarGz));
        assert_eq!(BundleFormat::from_name(".zip"), None);
    }

    #[test]
    fn unknown_format_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("board.rar");
        let err = bundle(dir.path(), &out, None).unwrap_err();
        assert!(matches!(err, BundleError::UnsupportedFormat { .. }));
        assert!(err.to_string().contains("zip, tar.gz"));
        assert!(!out.exists());
    }
}
