//! Resolve per-format patch animation into full canvas frames.

use rgb::RGBA8;

use crate::error::{Error, Result};
use crate::frame::{Blend, Disposal, Framebuffer, rgba_from_argb};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Rect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl Rect {
    fn of(patch: &Framebuffer) -> Self {
        Self {
            x: patch.x_offset,
            y: patch.y_offset,
            width: patch.width(),
            height: patch.height(),
        }
    }
}

/// Running canvas that frame patches are drawn onto.
///
/// Each call to [`composite`](Self::composite) first disposes the previous
/// frame's patch, then draws the new patch, and returns the full canvas.
/// `RestorePrevious` keeps a snapshot of only the patch area, taken right
/// before the patch is drawn.
#[derive(Debug, Default)]
pub struct Compositor {
    canvas: Framebuffer,
    snapshot: Framebuffer,
    background: RGBA8,
    pending: Option<(Disposal, Rect)>,
}

impl Compositor {
    /// An empty compositor; call [`reset`](Self::reset) before use.
    pub fn new() -> Self {
        Self::default()
    }

    /// A compositor whose canvas and snapshot are pre-sized for
    /// `max_dimension`² pixels.
    pub fn with_capacity(max_dimension: u32) -> Self {
        Self {
            canvas: Framebuffer::with_capacity(max_dimension),
            snapshot: Framebuffer::with_capacity(max_dimension),
            ..Self::default()
        }
    }

    /// Start a new animation on a `width`×`height` canvas filled with
    /// `background` (`0xAARRGGBB`).
    pub fn reset(&mut self, width: u32, height: u32, background: u32) {
        self.background = rgba_from_argb(background);
        self.canvas.resize(width, height);
        self.canvas.fill(self.background);
        self.canvas.reset_metadata();
        self.pending = None;
    }

    /// The current canvas.
    pub fn canvas(&self) -> &Framebuffer {
        &self.canvas
    }

    /// Draw `patch` and return the resulting canvas.
    ///
    /// The canvas takes the patch's duration; its disposal, blend and
    /// offsets stay at their full-frame defaults. A patch that does not fit
    /// inside the canvas is [`Error::InvalidImage`].
    pub fn composite(&mut self, patch: &Framebuffer) -> Result<&Framebuffer> {
        let rect = Rect::of(patch);
        if !self.canvas.contains_rect(rect.x, rect.y, rect.width, rect.height) {
            tracing::debug!(?rect, canvas = ?self.canvas.dimensions(), "patch outside canvas");
            return Err(Error::InvalidImage);
        }

        match self.pending.take() {
            Some((Disposal::RestoreBackground, r)) => {
                self.canvas
                    .fill_region(r.x, r.y, r.width, r.height, self.background);
            }
            Some((Disposal::RestorePrevious, r)) => {
                self.canvas.copy_region(self.snapshot.as_img(), r.x, r.y);
            }
            _ => {}
        }

        if patch.disposal == Disposal::RestorePrevious {
            self.snapshot
                .crop_from(&self.canvas, rect.x, rect.y, rect.width, rect.height);
        }

        match patch.blend {
            Blend::NoBlend => self.canvas.copy_region(patch.as_img(), rect.x, rect.y),
            Blend::AlphaBlend => self.canvas.blend_region(patch.as_img(), rect.x, rect.y),
        }

        self.pending = Some((patch.disposal, rect));
        self.canvas.duration = patch.duration;
        Ok(&self.canvas)
    }
}
