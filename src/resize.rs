//! Output geometry: orientation normalization followed by resize.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgba};

use crate::PixelLayout;
use crate::error::{Error, Result};
use crate::frame::Framebuffer;
use crate::orientation::Orientation;

/// How the source is mapped onto the requested box.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ResizeMethod {
    /// Scale to fit inside the box, keeping aspect ratio. One axis may come
    /// out smaller than requested; nothing is cropped or padded.
    #[default]
    Fit,
    /// Scale to cover the box, keeping aspect ratio, then center-crop.
    Fill,
    /// Scale each axis independently to exactly the box.
    Stretch,
    /// Keep the source dimensions.
    NoResize,
}

/// A source rectangle in display coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Crop {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Geometry decided once per transcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResizePlan {
    source: (u32, u32),
    crop: Option<Crop>,
    width: u32,
    height: u32,
}

impl ResizePlan {
    /// Plan the resize of a `source_width`×`source_height` (display) frame.
    ///
    /// A requested width or height of zero means "the source's size on that
    /// axis". Output dimensions are never zero for a non-empty source.
    pub fn new(
        source_width: u32,
        source_height: u32,
        width: u32,
        height: u32,
        method: ResizeMethod,
    ) -> Self {
        let (sw, sh) = (source_width, source_height);
        let tw = if width == 0 { sw } else { width };
        let th = if height == 0 { sh } else { height };
        let identity = Self {
            source: (sw, sh),
            crop: None,
            width: sw,
            height: sh,
        };
        if sw == 0 || sh == 0 || tw == 0 || th == 0 {
            return identity;
        }
        match method {
            ResizeMethod::NoResize => identity,
            ResizeMethod::Stretch => Self {
                width: tw,
                height: th,
                ..identity
            },
            ResizeMethod::Fit => {
                let scale = f64::min(tw as f64 / sw as f64, th as f64 / sh as f64);
                let fit = |src: u32, max: u32| ((src as f64 * scale).round() as u32).clamp(1, max);
                Self {
                    width: fit(sw, tw),
                    height: fit(sh, th),
                    ..identity
                }
            }
            ResizeMethod::Fill => {
                let (sw64, sh64, tw64, th64) = (sw as u64, sh as u64, tw as u64, th as u64);
                let crop = if sw64 * th64 > sh64 * tw64 {
                    // source is wider than the box: trim left and right
                    let cw = ((sh64 * tw64 + th64 / 2) / th64).clamp(1, sw64) as u32;
                    Crop {
                        x: (sw - cw) / 2,
                        y: 0,
                        width: cw,
                        height: sh,
                    }
                } else {
                    let ch = ((sw64 * th64 + tw64 / 2) / tw64).clamp(1, sh64) as u32;
                    Crop {
                        x: 0,
                        y: (sh - ch) / 2,
                        width: sw,
                        height: ch,
                    }
                };
                let crop = (crop.width != sw || crop.height != sh).then_some(crop);
                Self {
                    crop,
                    width: tw,
                    height: th,
                    ..identity
                }
            }
        }
    }

    /// Output `(width, height)`.
    pub fn output_dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Source area that is scaled into the output, if cropping.
    pub fn crop(&self) -> Option<Crop> {
        self.crop
    }

    /// Whether the plan leaves pixels untouched.
    pub fn is_identity(&self) -> bool {
        self.crop.is_none() && self.source == (self.width, self.height)
    }
}

/// Per-frame orientation and resize with reusable scratch buffers.
#[derive(Debug, Default)]
pub struct Transformer {
    oriented: Framebuffer,
    cropped: Framebuffer,
    output: Framebuffer,
}

impl Transformer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scratch buffers pre-sized for `max_dimension`² pixels.
    pub fn with_capacity(max_dimension: u32) -> Self {
        Self {
            oriented: Framebuffer::with_capacity(max_dimension),
            cropped: Framebuffer::new(0, 0),
            output: Framebuffer::with_capacity(max_dimension),
        }
    }

    /// Orient `src` then resize it per `plan`.
    ///
    /// Returns `src` itself when neither step changes anything. The result
    /// carries `src`'s duration.
    pub fn apply<'a>(
        &'a mut self,
        src: &'a Framebuffer,
        orientation: Orientation,
        plan: &ResizePlan,
    ) -> Result<&'a Framebuffer> {
        let oriented = if orientation.is_identity() {
            src
        } else {
            let (w, h) = orientation.display_dimensions(src.width(), src.height());
            self.oriented.resize(w, h);
            orientation.apply(src.as_img(), self.oriented.as_img_mut());
            self.oriented.copy_metadata_from(src);
            &self.oriented
        };
        if oriented.dimensions() != plan.source {
            tracing::debug!(
                frame = ?oriented.dimensions(),
                planned = ?plan.source,
                "frame geometry differs from the planned source"
            );
            return Err(Error::InvalidImage);
        }
        if plan.is_identity() {
            return Ok(oriented);
        }

        let source = match plan.crop {
            Some(c) => {
                self.cropped.crop_from(oriented, c.x, c.y, c.width, c.height);
                &self.cropped
            }
            None => oriented,
        };
        let (w, h) = source.dimensions();
        let view = ImageBuffer::<Rgba<u8>, &[u8]>::from_raw(w, h, source.as_bytes())
            .ok_or(Error::InvalidImage)?;
        let resized = imageops::resize(&view, plan.width, plan.height, FilterType::CatmullRom);
        self.output
            .copy_from_raw(resized.as_raw(), plan.width, plan.height, PixelLayout::Rgba8)?;
        self.output.copy_metadata_from(src);
        self.output.x_offset = 0;
        self.output.y_offset = 0;
        Ok(&self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rgb::RGBA8;
    use std::time::Duration;

    #[test]
    fn zero_request_uses_source() {
        for method in [
            ResizeMethod::Fit,
            ResizeMethod::Fill,
            ResizeMethod::Stretch,
            ResizeMethod::NoResize,
        ] {
            let plan = ResizePlan::new(640, 480, 0, 0, method);
            assert_eq!(plan.output_dimensions(), (640, 480), "{method:?}");
            assert!(plan.is_identity(), "{method:?}");
        }
    }

    #[test]
    fn zero_on_one_axis() {
        let plan = ResizePlan::new(640, 480, 320, 0, ResizeMethod::Stretch);
        assert_eq!(plan.output_dimensions(), (320, 480));
        let plan = ResizePlan::new(640, 480, 320, 0, ResizeMethod::Fit);
        assert_eq!(plan.output_dimensions(), (320, 240));
    }

    #[test]
    fn fit_stays_inside_box() {
        let cases = [
            (640, 480, 100, 100),
            (480, 640, 100, 100),
            (1, 1000, 50, 50),
            (1000, 1, 50, 50),
            (1, 1, 7, 3),
            (333, 777, 21, 1000),
        ];
        for (sw, sh, bw, bh) in cases {
            let (w, h) = ResizePlan::new(sw, sh, bw, bh, ResizeMethod::Fit).output_dimensions();
            assert!(w <= bw && h <= bh, "{sw}x{sh} in {bw}x{bh} -> {w}x{h}");
            assert!(w >= 1 && h >= 1);
            assert!(w == bw || h == bh, "{sw}x{sh} in {bw}x{bh} -> {w}x{h}");
        }
        assert_eq!(
            ResizePlan::new(640, 480, 100, 100, ResizeMethod::Fit).output_dimensions(),
            (100, 75)
        );
    }

    #[test]
    fn stretch_is_exact() {
        let plan = ResizePlan::new(640, 480, 17, 300, ResizeMethod::Stretch);
        assert_eq!(plan.output_dimensions(), (17, 300));
        assert_eq!(plan.crop(), None);
    }

    #[test]
    fn fill_center_crops() {
        let plan = ResizePlan::new(400, 200, 100, 100, ResizeMethod::Fill);
        assert_eq!(plan.output_dimensions(), (100, 100));
        assert_eq!(
            plan.crop(),
            Some(Crop {
                x: 100,
                y: 0,
                width: 200,
                height: 200
            })
        );
        let plan = ResizePlan::new(200, 400, 100, 50, ResizeMethod::Fill);
        assert_eq!(
            plan.crop(),
            Some(Crop {
                x: 0,
                y: 150,
                width: 200,
                height: 100
            })
        );
        // same aspect ratio needs no crop
        let plan = ResizePlan::new(400, 200, 200, 100, ResizeMethod::Fill);
        assert_eq!(plan.crop(), None);
    }

    #[test]
    fn one_by_one_is_stable() {
        for method in [ResizeMethod::Fit, ResizeMethod::Fill, ResizeMethod::Stretch] {
            let plan = ResizePlan::new(1, 1, 1, 1, method);
            assert!(plan.is_identity(), "{method:?}");
            let plan = ResizePlan::new(1, 1, 3, 2, method);
            let (w, h) = plan.output_dimensions();
            assert!(w >= 1 && h >= 1);
        }
    }

    #[test]
    fn transformer_identity_borrows_source() {
        let src = Framebuffer::new(4, 4);
        let plan = ResizePlan::new(4, 4, 0, 0, ResizeMethod::Fit);
        let mut t = Transformer::new();
        let out = t.apply(&src, Orientation::Normal, &plan).unwrap();
        assert!(std::ptr::eq(out, &src));
    }

    #[test]
    fn transformer_orients_then_resizes() {
        let mut src = Framebuffer::new(4, 2);
        src.fill(RGBA8::new(10, 20, 30, 255));
        src.duration = Duration::from_millis(70);
        let plan = ResizePlan::new(2, 4, 1, 2, ResizeMethod::Stretch);
        let mut t = Transformer::with_capacity(8);
        let out = t.apply(&src, Orientation::Rotate90, &plan).unwrap();
        assert_eq!(out.dimensions(), (1, 2));
        assert_eq!(out.duration, Duration::from_millis(70));
        assert!(out.pixels().iter().all(|p| *p == RGBA8::new(10, 20, 30, 255)));
    }

    #[test]
    fn transformer_rejects_unplanned_geometry() {
        let src = Framebuffer::new(4, 2);
        let plan = ResizePlan::new(3, 3, 1, 1, ResizeMethod::Fit);
        let mut t = Transformer::new();
        assert!(matches!(
            t.apply(&src, Orientation::Normal, &plan),
            Err(Error::InvalidImage)
        ));
    }
}
