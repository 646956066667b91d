//! Opaque-pixel bounding boxes.

use image::{Rgba, RgbaImage};

/// Smallest rectangle containing every pixel with non-zero alpha.
///
/// `right` and `bottom` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    /// First column.
    pub left: u32,
    /// First row.
    pub top: u32,
    /// One past the last column.
    pub right: u32,
    /// One past the last row.
    pub bottom: u32,
}

impl BoundingBox {
    /// Creates a box from its edges.
    #[must_use]
    pub const fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    /// Smallest box containing both `self` and `other`.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }

    fn include(self, x: u32, y: u32) -> Self {
        self.union(Self::new(x, y, x + 1, y + 1))
    }
}

/// Bounding box of the non-transparent pixels of `frame`.
///
/// Returns `None` when every pixel has zero alpha.
#[must_use]
pub fn bounding_box(frame: &RgbaImage) -> Option<BoundingBox> {
    frame
        .enumerate_pixels()
        .filter(|(_, _, pixel)| pixel[3] != 0)
        .fold(None, |bbox: Option<BoundingBox>, (x, y, _)| {
            Some(bbox.map_or_else(
                || BoundingBox::new(x, y, x + 1, y + 1),
                |b| b.include(x, y),
            ))
        })
}

/// Union of all present boxes; `None` if there are none.
pub fn union_all<I>(boxes: I) -> Option<BoundingBox>
where
    I: IntoIterator<Item = Option<BoundingBox>>,
{
    boxes
        .into_iter()
        .flatten()
        .reduce(BoundingBox::union)
}

/// Copies the `bbox` region of `frame` into a new image.
///
/// Parts of the box that fall outside the frame come out fully transparent,
/// so every frame cropped with the same box has the same size.
#[must_use]
pub fn crop(frame: &RgbaImage, bbox: BoundingBox) -> RgbaImage {
    RgbaImage::from_fn(bbox.width(), bbox.height(), |x, y| {
        frame
            .get_pixel_checked(bbox.left + x, bbox.top + y)
            .copied()
            .unwrap_or(Rgba([0, 0, 0, 0]))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPAQUE: Rgba<u8> = Rgba([255, 0, 0, 255]);

    fn frame_with(width: u32, height: u32, opaque: &[(u32, u32)]) -> RgbaImage {
        let mut frame = RgbaImage::new(width, height);
        for &(x, y) in opaque {
            frame.put_pixel(x, y, OPAQUE);
        }
        frame
    }

    #[test]
    fn transparent_frame_has_no_box() {
        assert_eq!(bounding_box(&RgbaImage::new(8, 8)), None);
    }

    #[test]
    fn single_pixel_box() {
        let frame = frame_with(8, 8, &[(3, 5)]);
        assert_eq!(bounding_box(&frame), Some(BoundingBox::new(3, 5, 4, 6)));
    }

    #[test]
    fn box_spans_extremes() {
        let frame = frame_with(10, 10, &[(2, 7), (6, 1), (4, 4)]);
        let bbox = bounding_box(&frame).unwrap();
        assert_eq!(bbox, BoundingBox::new(2, 1, 7, 8));
        assert_eq!(bbox.width(), 5);
        assert_eq!(bbox.height(), 7);
    }

    #[test]
    fn faint_alpha_counts_as_opaque() {
        let mut frame = RgbaImage::new(4, 4);
        frame.put_pixel(1, 2, Rgba([0, 0, 0, 1]));
        assert_eq!(bounding_box(&frame), Some(BoundingBox::new(1, 2, 2, 3)));
    }

    #[test]
    fn union_is_coordinate_wise() {
        let a = BoundingBox::new(2, 5, 10, 12);
        let b = BoundingBox::new(4, 1, 14, 9);
        assert_eq!(a.union(b), BoundingBox::new(2, 1, 14, 12));
    }

    #[test]
    fn contained_box_does_not_change_union() {
        let outer = BoundingBox::new(0, 0, 20, 20);
        let inner = BoundingBox::new(5, 5, 10, 10);
        assert_eq!(union_all([Some(outer), Some(inner)]), Some(outer));
    }

    #[test]
    fn union_skips_empty_frames() {
        let a = BoundingBox::new(3, 3, 4, 4);
        assert_eq!(union_all([None, Some(a), None]), Some(a));
        assert_eq!(union_all([None, None]), None);
    }

    #[test]
    fn crop_copies_region() {
        let frame = frame_with(10, 10, &[(4, 6)]);
        let cropped = crop(&frame, BoundingBox::new(3, 5, 6, 8));
        assert_eq!(cropped.dimensions(), (3, 3));
        assert_eq!(*cropped.get_pixel(1, 1), OPAQUE);
        assert_eq!(cropped.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn crop_pads_outside_frame() {
        let frame = frame_with(4, 4, &[(3, 3)]);
        let cropped = crop(&frame, BoundingBox::new(2, 2, 6, 6));
        assert_eq!(cropped.dimensions(), (4, 4));
        assert_eq!(*cropped.get_pixel(1, 1), OPAQUE);
        assert_eq!(cropped.get_pixel(3, 3)[3], 0);
    }
}
