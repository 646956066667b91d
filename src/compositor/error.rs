//! Error types for image cropping and animation assembly.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for compositor operations.
pub type ImageResult<T> = Result<T, ImageError>;

/// Errors that can occur while cropping images or assembling animations.
#[derive(Debug, Error)]
pub enum ImageError {
    /// Failed to open or decode a source image.
    #[error("Failed to load image: {path}")]
    Load {
        /// Path to the image.
        path: PathBuf,
        /// Underlying decoder error.
        #[source]
        source: image::ImageError,
    },

    /// Failed to encode a still image.
    #[error("Failed to encode image: {path}")]
    Encode {
        /// Destination path.
        path: PathBuf,
        /// Underlying encoder error.
        #[source]
        source: image::ImageError,
    },

    /// Failed to encode an animation.
    #[error("Failed to encode animation: {path}")]
    AnimationEncode {
        /// Destination path.
        path: PathBuf,
        /// Underlying GIF encoder error.
        #[source]
        source: gif::EncodingError,
    },

    /// Failed to write or rename the output file.
    #[error("Failed to write file: {path}")]
    FileWrite {
        /// Destination path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// No pixel with non-zero alpha was found.
    #[error("{subject} is fully transparent")]
    EmptyImage {
        /// What was inspected (an image path, or a frame count).
        subject: String,
    },

    /// Destination extension is not a format this module can write.
    #[error("Unsupported output format for {path}: {reason}")]
    UnsupportedFormat {
        /// Destination path.
        path: PathBuf,
        /// Why the format was rejected.
        reason: String,
    },

    /// An animation was requested with no frames.
    #[error("No frames supplied")]
    NoFrames,

    /// Framerate must be at least one frame per second.
    #[error("Invalid framerate: {framerate}")]
    InvalidFramerate {
        /// Requested framerate.
        framerate: u32,
    },

    /// Frame dimensions exceed what the GIF container can store.
    #[error("Frame too large for GIF: {width}x{height}")]
    TooLarge {
        /// Frame width in pixels.
        width: u32,
        /// Frame height in pixels.
        height: u32,
    },

    /// Animation frames do not share the same dimensions.
    #[error("Frame {index} is {actual_width}x{actual_height}, expected {width}x{height}")]
    FrameSizeMismatch {
        /// Index of the offending frame.
        index: usize,
        /// Expected width.
        width: u32,
        /// Expected height.
        height: u32,
        /// Actual width.
        actual_width: u32,
        /// Actual height.
        actual_height: u32,
    },
}

impl ImageError {
    /// Creates a load error.
    pub fn load(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Self::Load {
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

    /// Creates a fully-transparent error.
    pub fn empty_image(subject: impl Into<String>) -> Self {
        Self::EmptyImage {
            subject: subject.into(),
        }
    }

    /// Creates an unsupported format error.
    pub fn unsupported_format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
