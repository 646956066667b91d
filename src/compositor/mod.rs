//! Render post-processing: cropping and turntable animations.
//!
//! KiCad renders boards onto a large transparent canvas. Two operations
//! trim that canvas down:
//!
//! - [`Compositor::crop_image`] crops one render to its opaque pixels
//! - [`Compositor::make_animation`] crops a frame sequence to the union of
//!   every frame's opaque pixels and writes a looping GIF
//!
//! Cropping every frame with the same box keeps the board in the same place
//! from frame to frame; cropping frames individually would make it jitter.
//!
//! Decoding and encoding sit behind [`RasterBackend`], implemented for files
//! by [`FileBackend`].

pub mod bbox;
pub mod error;

use std::fs::File;
use std::path::Path;

use atomicwrites::{AtomicFile, OverwriteBehavior};
use image::{ImageFormat, RgbaImage};

pub use bbox::{bounding_box, crop, union_all, BoundingBox};
pub use error::{ImageError, ImageResult};

/// An in-memory RGBA raster.
pub type RasterFrame = RgbaImage;

/// Extension accepted for animations.
pub const ANIMATION_EXTENSION: &str = "gif";

/// `NeuQuant` sampling factor used when quantising GIF frames (1 = best, 30 = fastest).
const GIF_QUANTIZE_SPEED: i32 = 10;

/// Image decoding, measuring, cropping and encoding.
pub trait RasterBackend {
    /// Loads an image, adding an opaque alpha channel if it has none.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::Load`] if the image cannot be read or decoded.
    fn load_with_alpha(&self, path: &Path) -> ImageResult<RasterFrame>;

    /// Bounding box of non-transparent pixels.
    fn bounding_box(&self, frame: &RasterFrame) -> Option<BoundingBox> {
        bbox::bounding_box(frame)
    }

    /// Crops `frame` to `bbox`.
    fn crop(&self, frame: &RasterFrame, bbox: BoundingBox) -> RasterFrame {
        bbox::crop(frame, bbox)
    }

    /// Writes a still image in the format implied by the path extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the format is unsupported or writing fails.
    fn save(&self, frame: &RasterFrame, path: &Path) -> ImageResult<()>;

    /// Writes a looping animation, each frame shown for `frame_duration_ms`.
    ///
    /// # Errors
    ///
    /// Returns an error if the frames are unusable or writing fails.
    fn save_animation(
        &self,
        frames: &[RasterFrame],
        path: &Path,
        frame_duration_ms: u32,
    ) -> ImageResult<()>;
}

/// Backend reading and writing image files with the `image` and `gif` crates.
///
/// Outputs are written atomically.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileBackend;

impl RasterBackend for FileBackend {
    fn load_with_alpha(&self, path: &Path) -> ImageResult<RasterFrame> {
        let img = image::open(path).map_err(|e| ImageError::load(path, e))?;
        tracing::debug!(
            path = %path.display(),
            width = img.width(),
            height = img.height(),
            has_alpha = img.color().has_alpha(),
            "Loaded image"
        );
        Ok(img.into_rgba8())
    }

    fn save(&self, frame: &RasterFrame, path: &Path) -> ImageResult<()> {
        let format = still_format(path)?;

        AtomicFile::new(path, OverwriteBehavior::AllowOverwrite)
            .write(|file: &mut File| frame.write_to(file, format))
            .map_err(|e| match e {
                atomicwrites::Error::Internal(io) => ImageError::file_write(path, io),
                atomicwrites::Error::User(source) => ImageError::Encode {
                    path: path.to_path_buf(),
                    source,
                },
            })
    }

    fn save_animation(
        &self,
        frames: &[RasterFrame],
        path: &Path,
        frame_duration_ms: u32,
    ) -> ImageResult<()> {
        check_animation_path(path)?;
        let first = frames.first().ok_or(ImageError::NoFrames)?;
        let (width, height) = first.dimensions();

        for (index, frame) in frames.iter().enumerate() {
            let (actual_width, actual_height) = frame.dimensions();
            if (actual_width, actual_height) != (width, height) {
                return Err(ImageError::FrameSizeMismatch {
                    index,
                    width,
                    height,
                    actual_width,
                    actual_height,
                });
            }
        }

        let (Ok(gif_width), Ok(gif_height)) = (u16::try_from(width), u16::try_from(height))
        else {
            return Err(ImageError::TooLarge { width, height });
        };
        let delay = gif_delay(frame_duration_ms);

        AtomicFile::new(path, OverwriteBehavior::AllowOverwrite)
            .write(|file: &mut File| -> Result<(), gif::EncodingError> {
                let mut encoder = gif::Encoder::new(file, gif_width, gif_height, &[])?;
                encoder.set_repeat(gif::Repeat::Infinite)?;
                for frame in frames {
                    let mut pixels = frame.as_raw().clone();
                    let mut gif_frame = gif::Frame::from_rgba_speed(
                        gif_width,
                        gif_height,
                        &mut pixels,
                        GIF_QUANTIZE_SPEED,
                    );
                    gif_frame.delay = delay;
                    gif_frame.dispose = gif::DisposalMethod::Background;
                    encoder.write_frame(&gif_frame)?;
                }
                encoder.into_inner()?;
                Ok(())
            })
            .map_err(|e| match e {
                atomicwrites::Error::Internal(io) => ImageError::file_write(path, io),
                atomicwrites::Error::User(source) => ImageError::AnimationEncode {
                    path: path.to_path_buf(),
                    source,
                },
            })?;

        tracing::debug!(
            path = %path.display(),
            frames = frames.len(),
            width,
            height,
            delay_cs = delay,
            "Wrote animation"
        );
        Ok(())
    }
}

/// Format for a still image destination, rejected if it cannot be written.
fn still_format(path: &Path) -> ImageResult<ImageFormat> {
    let format = ImageFormat::from_path(path)
        .map_err(|e| ImageError::unsupported_format(path, e.to_string()))?;
    if !format.writing_enabled() {
        return Err(ImageError::unsupported_format(
            path,
            format!("{format:?} encoding is not enabled"),
        ));
    }
    Ok(format)
}

fn check_animation_path(path: &Path) -> ImageResult<()> {
    let is_gif = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(ANIMATION_EXTENSION));
    if is_gif {
        Ok(())
    } else {
        Err(ImageError::unsupported_format(
            path,
            "animations must be written as .gif",
        ))
    }
}

/// GIF delays are in hundredths of a second.
fn gif_delay(frame_duration_ms: u32) -> u16 {
    u16::try_from(frame_duration_ms.saturating_add(5) / 10).unwrap_or(u16::MAX)
}

/// Display time per frame: `1000 / framerate` rounded to the nearest millisecond.
///
/// # Errors
///
/// Returns [`ImageError::InvalidFramerate`] for a framerate of zero.
pub fn frame_duration_ms(framerate: u32) -> ImageResult<u32> {
    if framerate == 0 {
        return Err(ImageError::InvalidFramerate { framerate });
    }
    Ok((1000 + framerate / 2) / framerate)
}

/// Crops every frame to the union of their opaque bounding boxes.
///
/// Frames without opaque pixels add nothing to the union but are still
/// cropped and kept, so frame order and count are unchanged.
///
/// # Errors
///
/// Returns [`ImageError::NoFrames`] for an empty sequence and
/// [`ImageError::EmptyImage`] if every frame is fully transparent.
pub fn crop_to_union<B: RasterBackend + ?Sized>(
    backend: &B,
    frames: &[RasterFrame],
) -> ImageResult<(Vec<RasterFrame>, BoundingBox)> {
    if frames.is_empty() {
        return Err(ImageError::NoFrames);
    }

    let union = union_all(frames.iter().map(|frame| backend.bounding_box(frame)))
        .ok_or_else(|| ImageError::empty_image(format!("All {} frames", frames.len())))?;

    let cropped = frames.iter().map(|frame| backend.crop(frame, union)).collect();
    Ok((cropped, union))
}

/// Crops renders and assembles animations using a [`RasterBackend`].
#[derive(Debug, Clone, Default)]
pub struct Compositor<B = FileBackend> {
    backend: B,
}

impl Compositor<FileBackend> {
    /// Creates a compositor working on image files.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            backend: FileBackend,
        }
    }
}

impl<B: RasterBackend> Compositor<B> {
    /// Creates a compositor over a custom backend.
    #[must_use]
    pub const fn with_backend(backend: B) -> Self {
        Self { backend }
    }

    /// Crops `src` to its opaque pixels and writes the result to `dst`.
    ///
    /// Returns the box that was cropped to, in source coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::EmptyImage`] if `src` is fully transparent (no
    /// output is written), or any load/save error.
    pub fn crop_image(&self, src: &Path, dst: &Path) -> ImageResult<BoundingBox> {
        let frame = self.backend.load_with_alpha(src)?;
        let bbox = self
            .backend
            .bounding_box(&frame)
            .ok_or_else(|| ImageError::empty_image(src.display().to_string()))?;

        let cropped = self.backend.crop(&frame, bbox);
        self.backend.save(&cropped, dst)?;

        tracing::info!(
            src = %src.display(),
            dst = %dst.display(),
            width = bbox.width(),
            height = bbox.height(),
            "Cropped image"
        );
        Ok(bbox)
    }

    /// Crops `sources` to their shared bounding box and writes a looping GIF.
    ///
    /// Frames keep the order of `sources`. Any frame that fails to load
    /// aborts the whole animation.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero framerate, a non-GIF destination, an empty
    /// or fully transparent sequence, or any load/save failure.
    pub fn make_animation<P: AsRef<Path>>(
        &self,
        sources: &[P],
        dst: &Path,
        framerate: u32,
    ) -> ImageResult<BoundingBox> {
        let duration = frame_duration_ms(framerate)?;
        check_animation_path(dst)?;

        let frames = sources
            .iter()
            .map(|src| self.backend.load_with_alpha(src.as_ref()))
            .collect::<ImageResult<Vec<_>>>()?;

        let (cropped, union) = crop_to_union(&self.backend, &frames)?;
        self.backend.save_animation(&cropped, dst, duration)?;

        tracing::info!(
            dst = %dst.display(),
            frames = cropped.len(),
            width = union.width(),
            height = union.height(),
            frame_duration_ms = duration,
            "Wrote animation"
        );
        Ok(union)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use image::Rgba;

    fn frame_with(width: u32, height: u32, opaque: &[(u32, u32)]) -> RasterFrame {
        let mut frame = RgbaImage::new(width, height);
        for &(x, y) in opaque {
            frame.put_pixel(x, y, Rgba([0, 128, 255, 255]));
        }
        frame
    }

    #[test]
    fn duration_from_framerate() {
        assert_eq!(frame_duration_ms(10).unwrap(), 100);
        assert_eq!(frame_duration_ms(20).unwrap(), 50);
        assert_eq!(frame_duration_ms(3).unwrap(), 333);
        assert_eq!(frame_duration_ms(7).unwrap(), 143);
        assert!(matches!(
            frame_duration_ms(0),
            Err(ImageError::InvalidFramerate { framerate: 0 })
        ));
    }

    #[test]
    fn gif_delay_in_centiseconds() {
        assert_eq!(gif_delay(100), 10);
        assert_eq!(gif_delay(50), 5);
        assert_eq!(gif_delay(333), 33);
    }

    #[test]
    fn union_crop_aligns_frames() {
        let frames = vec![
            frame_with(20, 20, &[(2, 3)]),
            frame_with(20, 20, &[(10, 12)]),
        ];
        let (cropped, union) = crop_to_union(&FileBackend, &frames).unwrap();

        assert_eq!(union, BoundingBox::new(2, 3, 11, 13));
        assert_eq!(cropped.len(), 2);
        for frame in &cropped {
            assert_eq!(frame.dimensions(), (9, 10));
        }
        assert_eq!(cropped[0].get_pixel(0, 0)[3], 255);
        assert_eq!(cropped[1].get_pixel(8, 9)[3], 255);
    }

    #[test]
    fn transparent_frames_are_kept() {
        let frames = vec![
            RgbaImage::new(10, 10),
            frame_with(10, 10, &[(4, 4), (5, 6)]),
            RgbaImage::new(10, 10),
        ];
        let (cropped, union) = crop_to_union(&FileBackend, &frames).unwrap();

        assert_eq!(union, BoundingBox::new(4, 4, 6, 7));
        assert_eq!(cropped.len(), 3);
        assert!(cropped.iter().all(|f| f.dimensions() == (2, 3)));
        assert!(cropped[0].pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn all_transparent_frames_fail() {
        let frames = vec![RgbaImage::new(5, 5), RgbaImage::new(5, 5)];
        let err = crop_to_union(&FileBackend, &frames).unwrap_err();
        assert!(matches!(err, ImageError::EmptyImage { .. }));
    }

    #[test]
    fn empty_sequence_fails() {
        let err = crop_to_union(&FileBackend, &[]).unwrap_err();
        assert!(matches!(err, ImageError::NoFrames));
    }

    #[test]
    fn animation_path_must_be_gif() {
        assert!(check_animation_path(Path::new("board.gif")).is_ok());
        assert!(check_animation_path(Path::new("board.GIF")).is_ok());
        assert!(matches!(
            check_animation_path(Path::new("board.png")),
            Err(ImageError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn unknown_still_format_rejected() {
        assert!(still_format(Path::new("render.png")).is_ok());
        assert!(matches!(
            still_format(Path::new("render.xyz")),
            Err(ImageError::UnsupportedFormat { .. })
        ));
    }

    /// Serves frames from memory and records what would have been written.
    #[derive(Default)]
    struct MemoryBackend {
        frames: Vec<(&'static str, RasterFrame)>,
        stills: std::cell::RefCell<Vec<(PathBuf, (u32, u32))>>,
        animations: std::cell::RefCell<Vec<(PathBuf, usize, u32)>>,
    }

    impl RasterBackend for MemoryBackend {
        fn load_with_alpha(&self, path: &Path) -> ImageResult<RasterFrame> {
            self.frames
                .iter()
                .find(|(name, _)| Path::new(name) == path)
                .map(|(_, frame)| frame.clone())
                .ok_or_else(|| {
                    ImageError::load(
                        path,
                        image::ImageError::IoError(std::io::ErrorKind::NotFound.into()),
                    )
                })
        }

        fn save(&self, frame: &RasterFrame, path: &Path) -> ImageResult<()> {
            self.stills
                .borrow_mut()
                .push((path.to_path_buf(), frame.dimensions()));
            Ok(())
        }

        fn save_animation(
            &self,
            frames: &[RasterFrame],
            path: &Path,
            frame_duration_ms: u32,
        ) -> ImageResult<()> {
            self.animations
                .borrow_mut()
                .push((path.to_path_buf(), frames.len(), frame_duration_ms));
            Ok(())
        }
    }

    #[test]
    fn custom_backend_drives_crop_and_animation() {
        let backend = MemoryBackend {
            frames: vec![
                ("a.png", frame_with(8, 8, &[(1, 1), (2, 3)])),
                ("b.png", frame_with(8, 8, &[(5, 6)])),
            ],
            ..MemoryBackend::default()
        };
        let compositor = Compositor::with_backend(backend);

        let bbox = compositor
            .crop_image(Path::new("a.png"), Path::new("a_cropped.png"))
            .unwrap();
        assert_eq!(bbox, BoundingBox::new(1, 1, 3, 4));

        let union = compositor
            .make_animation(&["a.png", "b.png"], Path::new("spin.gif"), 4)
            .unwrap();
        assert_eq!(union, BoundingBox::new(1, 1, 6, 7));

        let missing = compositor.make_animation(&["a.png", "c.png"], Path::new("x.gif"), 4);
        assert!(matches!(missing, Err(ImageError::Load { .. })));

        let backend = &compositor.backend;
        assert_eq!(
            *backend.stills.borrow(),
            [(PathBuf::from("a_cropped.png"), (2, 3))]
        );
        assert_eq!(
            *backend.animations.borrow(),
            [(PathBuf::from("spin.gif"), 2, 250)]
        );
    }

    #[test]
    fn mismatched_frames_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let frames = vec![RgbaImage::new(4, 4), RgbaImage::new(5, 4)];
        let err = FileBackend
            .save_animation(&frames, &dir.path().join("a.gif"), 100)
            .unwrap_err();
        assert!(matches!(err, ImageError::FrameSizeMismatch { index: 1, .. }));
        assert!(!dir.path().join("a.gif").exists());
    }
}
