//! EXIF orientation and the pixel remap that normalizes it.

use imgref::{ImgRef, ImgRefMut};

/// EXIF orientation tag values.
///
/// Describes how the stored pixels should be transformed for display.
/// Values match the EXIF Orientation tag (TIFF tag 274).
///
/// Decoders report the stored orientation in
/// [`ImageHeader::orientation`](crate::ImageHeader::orientation). When
/// [`ImageOptions::normalize_orientation`](crate::ImageOptions) is set the
/// orchestrator remaps every frame with [`apply`](Orientation::apply) before
/// resizing, so the output is upright and carries no orientation tag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Orientation {
    /// No rotation or flip needed.
    #[default]
    Normal = 1,
    /// Flip horizontally (mirror left-right).
    FlipHorizontal = 2,
    /// Rotate 180 degrees.
    Rotate180 = 3,
    /// Flip vertically (mirror top-bottom).
    FlipVertical = 4,
    /// Transpose (rotate 90 CW then flip horizontally).
    Transpose = 5,
    /// Rotate 90 degrees clockwise.
    Rotate90 = 6,
    /// Transverse (rotate 90 CCW then flip horizontally).
    Transverse = 7,
    /// Rotate 270 degrees clockwise (= 90 CCW).
    Rotate270 = 8,
}

impl Orientation {
    /// Create from EXIF orientation value (1-8).
    ///
    /// Returns [`Normal`](Orientation::Normal) for out-of-range values.
    pub fn from_exif(value: u16) -> Self {
        match value {
            1 => Self::Normal,
            2 => Self::FlipHorizontal,
            3 => Self::Rotate180,
            4 => Self::FlipVertical,
            5 => Self::Transpose,
            6 => Self::Rotate90,
            7 => Self::Transverse,
            8 => Self::Rotate270,
            _ => Self::Normal,
        }
    }

    /// EXIF tag value (1-8).
    pub fn exif_value(self) -> u16 {
        self as u16
    }

    /// Whether this orientation swaps width and height (values 5-8).
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Self::Transpose | Self::Rotate90 | Self::Transverse | Self::Rotate270
        )
    }

    /// Display dimensions for the given stored dimensions.
    pub fn display_dimensions(self, stored_width: u32, stored_height: u32) -> (u32, u32) {
        if self.swaps_dimensions() {
            (stored_height, stored_width)
        } else {
            (stored_width, stored_height)
        }
    }

    /// Whether any transformation is needed.
    pub fn is_identity(self) -> bool {
        matches!(self, Self::Normal)
    }

    /// Stored pixel that lands at display position `(dx, dy)`.
    ///
    /// `width` and `height` are the *stored* dimensions.
    pub fn source_coords(self, dx: u32, dy: u32, width: u32, height: u32) -> (u32, u32) {
        let (w1, h1) = (width - 1, height - 1);
        match self {
            Self::Normal => (dx, dy),
            Self::FlipHorizontal => (w1 - dx, dy),
            Self::Rotate180 => (w1 - dx, h1 - dy),
            Self::FlipVertical => (dx, h1 - dy),
            Self::Transpose => (dy, dx),
            Self::Rotate90 => (dy, h1 - dx),
            Self::Transverse => (w1 - dy, h1 - dx),
            Self::Rotate270 => (w1 - dy, dx),
        }
    }

    /// Remap `src` (stored layout) into `dst` (display layout).
    ///
    /// `dst` must already have the display dimensions of `src`; pixels are
    /// copied one to one, so the operation is lossless and exact.
    pub fn apply<T: Copy>(self, src: ImgRef<'_, T>, mut dst: ImgRefMut<'_, T>) {
        let (w, h) = (src.width() as u32, src.height() as u32);
        debug_assert_eq!(
            (dst.width() as u32, dst.height() as u32),
            self.display_dimensions(w, h)
        );
        if w == 0 || h == 0 {
            return;
        }
        let src_stride = src.stride();
        let src_buf = src.buf();
        for (dy, row) in dst.rows_mut().enumerate() {
            for (dx, px) in row.iter_mut().enumerate() {
                let (sx, sy) = self.source_coords(dx as u32, dy as u32, w, h);
                *px = src_buf[sy as usize * src_stride + sx as usize];
            }
        }
    }
}
