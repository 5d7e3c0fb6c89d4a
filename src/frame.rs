//! Canonical RGBA8 frame buffer with per-frame animation metadata.

use std::time::Duration;

use imgref::{ImgRef, ImgRefMut};
use rgb::{ComponentBytes, FromSlice, RGBA8};

use crate::PixelLayout;
use crate::error::{Error, Result};
use crate::limits::DEFAULT_MAX_FRAME_DIMENSION;

/// What happens to a frame's patch once it has been displayed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Disposal {
    /// Leave the canvas as it is.
    #[default]
    None,
    /// Keep the patch; the next frame draws over it.
    DoNotDispose,
    /// Clear the patch to the background color.
    RestoreBackground,
    /// Revert the patch to the canvas state from before this frame was drawn.
    RestorePrevious,
}

/// How a frame's patch is written onto the canvas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Blend {
    /// Patch pixels replace canvas pixels.
    #[default]
    NoBlend,
    /// Patch pixels are composited over the canvas by their alpha.
    AlphaBlend,
}

/// Convert a `0xAARRGGBB` color to a pixel.
pub fn rgba_from_argb(argb: u32) -> RGBA8 {
    let [a, r, g, b] = argb.to_be_bytes();
    RGBA8::new(r, g, b, a)
}

/// Mutable RGBA8 pixel buffer carrying the animation fields of one frame.
///
/// The logical size changes with [`resize`](Self::resize); the backing
/// storage only ever grows, so reusing one buffer for every frame of an
/// animation allocates at most as often as the largest frame grows.
#[derive(Clone, Debug, Default)]
pub struct Framebuffer {
    pixels: Vec<RGBA8>,
    width: u32,
    height: u32,
    /// Display time of this frame.
    pub duration: Duration,
    /// Disposal applied before the next frame.
    pub disposal: Disposal,
    /// How the patch is drawn.
    pub blend: Blend,
    /// Left edge of the patch within the canvas.
    pub x_offset: u32,
    /// Top edge of the patch within the canvas.
    pub y_offset: u32,
}

impl Framebuffer {
    /// A transparent buffer of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        let mut fb = Self::default();
        fb.resize(width, height);
        fb
    }

    /// An empty buffer with room for a `max_dimension`² frame.
    ///
    /// The hint is capped at [`DEFAULT_MAX_FRAME_DIMENSION`]; larger frames
    /// still fit by growing.
    pub fn with_capacity(max_dimension: u32) -> Self {
        let dim = max_dimension.min(DEFAULT_MAX_FRAME_DIMENSION) as usize;
        let n = dim * dim;
        Self {
            pixels: Vec::with_capacity(n),
            ..Self::default()
        }
    }

    /// Change the logical size. New pixels are transparent black; pixels
    /// kept from a previous size are left as they were.
    pub fn resize(&mut self, width: u32, height: u32) {
        let n = width as usize * height as usize;
        if self.pixels.len() < n {
            self.pixels.resize(n, RGBA8::default());
        }
        self.width = width;
        self.height = height;
    }

    /// Logical width.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Logical height.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Allocated pixel slots (never less than `width * height`).
    pub fn capacity(&self) -> usize {
        self.pixels.capacity()
    }

    fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Pixels in row-major order.
    pub fn pixels(&self) -> &[RGBA8] {
        &self.pixels[..self.len()]
    }

    /// Mutable pixels in row-major order.
    pub fn pixels_mut(&mut self) -> &mut [RGBA8] {
        let n = self.len();
        &mut self.pixels[..n]
    }

    /// Pixels as tightly packed RGBA bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.pixels().as_bytes()
    }

    /// Mutable RGBA bytes, for decoders writing straight into the buffer.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.pixels_mut().as_bytes_mut()
    }

    /// Borrow as an image view.
    pub fn as_img(&self) -> ImgRef<'_, RGBA8> {
        ImgRef::new(self.pixels(), self.width as usize, self.height as usize)
    }

    /// Borrow as a mutable image view.
    pub fn as_img_mut(&mut self) -> ImgRefMut<'_, RGBA8> {
        let (w, h) = (self.width as usize, self.height as usize);
        ImgRefMut::new(self.pixels_mut(), w, h)
    }

    /// Copy duration, disposal, blend and offsets from `other`.
    pub fn copy_metadata_from(&mut self, other: &Framebuffer) {
        self.duration = other.duration;
        self.disposal = other.disposal;
        self.blend = other.blend;
        self.x_offset = other.x_offset;
        self.y_offset = other.y_offset;
    }

    /// Reset animation fields to a plain full-canvas frame.
    pub fn reset_metadata(&mut self) {
        self.duration = Duration::ZERO;
        self.disposal = Disposal::None;
        self.blend = Blend::NoBlend;
        self.x_offset = 0;
        self.y_offset = 0;
    }

    /// Fill from tightly packed samples in `layout`, resizing to `width`×`height`.
    ///
    /// Fails with [`Error::InvalidImage`] when `data` is shorter than the
    /// frame it describes.
    pub fn copy_from_raw(
        &mut self,
        data: &[u8],
        width: u32,
        height: u32,
        layout: PixelLayout,
    ) -> Result<()> {
        let n = width as usize * height as usize;
        let needed = n
            .checked_mul(layout.bytes_per_pixel())
            .ok_or(Error::InvalidImage)?;
        if data.len() < needed {
            return Err(Error::InvalidImage);
        }
        let data = &data[..needed];
        self.resize(width, height);
        let dst = self.pixels_mut();
        match layout {
            PixelLayout::Rgba8 => dst.copy_from_slice(data.as_rgba()),
            PixelLayout::Rgb8 => {
                for (px, s) in dst.iter_mut().zip(data.chunks_exact(3)) {
                    *px = RGBA8::new(s[0], s[1], s[2], 255);
                }
            }
            PixelLayout::Gray8 => {
                for (px, &v) in dst.iter_mut().zip(data) {
                    *px = RGBA8::new(v, v, v, 255);
                }
            }
            PixelLayout::GrayAlpha8 => {
                for (px, s) in dst.iter_mut().zip(data.chunks_exact(2)) {
                    *px = RGBA8::new(s[0], s[0], s[0], s[1]);
                }
            }
        }
        Ok(())
    }

    /// Set every pixel to `color`.
    pub fn fill(&mut self, color: RGBA8) {
        self.pixels_mut().fill(color);
    }

    /// Whether the rectangle lies entirely inside the buffer.
    pub fn contains_rect(&self, x: u32, y: u32, width: u32, height: u32) -> bool {
        x as u64 + width as u64 <= self.width as u64
            && y as u64 + height as u64 <= self.height as u64
    }

    fn rows_in(
        &mut self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> impl Iterator<Item = &mut [RGBA8]> {
        debug_assert!(self.contains_rect(x, y, width, height));
        let stride = self.width as usize;
        let (x, w) = (x as usize, width as usize);
        self.pixels_mut()
            .chunks_exact_mut(stride.max(1))
            .skip(y as usize)
            .take(height as usize)
            .map(move |row| &mut row[x..x + w])
    }

    /// Set a rectangle to `color`. The rectangle must lie inside the buffer.
    pub fn fill_region(&mut self, x: u32, y: u32, width: u32, height: u32, color: RGBA8) {
        for row in self.rows_in(x, y, width, height) {
            row.fill(color);
        }
    }

    /// Overwrite the rectangle at `(x, y)` with `src`.
    pub fn copy_region(&mut self, src: ImgRef<'_, RGBA8>, x: u32, y: u32) {
        let (w, h) = (src.width() as u32, src.height() as u32);
        for (dst_row, src_row) in self.rows_in(x, y, w, h).zip(src.rows()) {
            dst_row.copy_from_slice(src_row);
        }
    }

    /// Composite `src` over the rectangle at `(x, y)` (straight alpha, source-over).
    pub fn blend_region(&mut self, src: ImgRef<'_, RGBA8>, x: u32, y: u32) {
        let (w, h) = (src.width() as u32, src.height() as u32);
        for (dst_row, src_row) in self.rows_in(x, y, w, h).zip(src.rows()) {
            for (d, &s) in dst_row.iter_mut().zip(src_row) {
                *d = blend_over(*d, s);
            }
        }
    }

    /// Resize to `width`×`height` and copy that rectangle of `src` at `(x, y)`.
    pub fn crop_from(&mut self, src: &Framebuffer, x: u32, y: u32, width: u32, height: u32) {
        debug_assert!(src.contains_rect(x, y, width, height));
        self.resize(width, height);
        let stride = src.width as usize;
        let (x, w) = (x as usize, width as usize);
        let src_rows = src
            .pixels()
            .chunks_exact(stride.max(1))
            .skip(y as usize)
            .take(height as usize);
        for (dst_row, src_row) in self.pixels_mut().chunks_exact_mut(w.max(1)).zip(src_rows) {
            dst_row.copy_from_slice(&src_row[x..x + w]);
        }
    }
}

/// `src` over `dst`, both straight alpha.
fn blend_over(dst: RGBA8, src: RGBA8) -> RGBA8 {
    match src.a {
        255 => return src,
        0 => return dst,
        _ => {}
    }
    let sa = src.a as u32;
    let dw = dst.a as u32 * (255 - sa) / 255;
    let out_a = sa + dw;
    let ch = |s: u8, d: u8| ((s as u32 * sa + d as u32 * dw + out_a / 2) / out_a) as u8;
    RGBA8::new(
        ch(src.r, dst.r),
        ch(src.g, dst.g),
        ch(src.b, dst.b),
        out_a as u8,
    )
}
