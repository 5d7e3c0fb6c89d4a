//! Single-image output (JPEG, WebP, AVIF) through the `image` crate encoders.

use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder};

use super::Encoder;
use crate::error::{Error, Result};
use crate::frame::Framebuffer;
use crate::options::{AVIF_QUALITY, AVIF_SPEED, EncodeOptions, JPEG_QUALITY, WEBP_QUALITY};
use crate::ImageFormat;

const DEFAULT_JPEG_QUALITY: i32 = 85;
const DEFAULT_AVIF_QUALITY: i32 = 80;
const DEFAULT_AVIF_SPEED: i32 = 4;

fn attach_icc(encoder: &mut impl ImageEncoder, icc: Option<&Vec<u8>>) {
    let Some(icc) = icc else { return };
    if let Err(err) = encoder.set_icc_profile(icc.clone()) {
        tracing::debug!(%err, "icc profile not embedded");
    }
}

/// Encoder for formats that hold a single image. Frames after the first
/// are ignored.
pub struct StillEncoder {
    format: ImageFormat,
    icc: Option<Vec<u8>>,
    dst: Vec<u8>,
    written: bool,
    finished: bool,
    rgb: Vec<u8>,
}

impl StillEncoder {
    /// `format` must be JPEG, WebP or AVIF.
    pub fn new(format: ImageFormat, icc: Option<Vec<u8>>, dst: Vec<u8>) -> Self {
        Self {
            format,
            icc,
            dst,
            written: false,
            finished: false,
            rgb: Vec::new(),
        }
    }

    fn write(&mut self, frame: &Framebuffer, options: &EncodeOptions) -> Result<()> {
        let (w, h) = frame.dimensions();
        let icc = self.icc.as_ref();
        let written = match self.format {
            ImageFormat::Jpeg => {
                let quality = options.get_clamped(JPEG_QUALITY, 1, 100, DEFAULT_JPEG_QUALITY);
                // JPEG has no alpha channel; it is dropped.
                self.rgb.clear();
                self.rgb
                    .extend(frame.pixels().iter().flat_map(|p| [p.r, p.g, p.b]));
                let mut enc = JpegEncoder::new_with_quality(&mut self.dst, quality as u8);
                attach_icc(&mut enc, icc);
                enc.write_image(&self.rgb, w, h, ExtendedColorType::Rgb8)
            }
            ImageFormat::WebP => {
                if options.get(WEBP_QUALITY).is_some() {
                    tracing::debug!("webp quality ignored by the lossless encoder");
                }
                let mut enc = WebPEncoder::new_lossless(&mut self.dst);
                attach_icc(&mut enc, icc);
                enc.write_image(frame.as_bytes(), w, h, ExtendedColorType::Rgba8)
            }
            ImageFormat::Avif => {
                let quality = options.get_clamped(AVIF_QUALITY, 1, 100, DEFAULT_AVIF_QUALITY);
                let speed = options.get_clamped(AVIF_SPEED, 1, 10, DEFAULT_AVIF_SPEED);
                let mut enc =
                    AvifEncoder::new_with_speed_quality(&mut self.dst, speed as u8, quality as u8);
                attach_icc(&mut enc, icc);
                enc.write_image(frame.as_bytes(), w, h, ExtendedColorType::Rgba8)
            }
            format => return Err(Error::UnsupportedFormat(format)),
        };
        written.map_err(Error::encode)
    }
}

impl Encoder for StillEncoder {
    fn format(&self) -> ImageFormat {
        self.format
    }

    fn add_frame(&mut self, frame: &Framebuffer, options: &EncodeOptions) -> Result<()> {
        if self.finished {
            return Err(Error::StreamAlreadyFinalized);
        }
        if self.written {
            tracing::trace!(format = %self.format, "extra frame ignored");
            return Ok(());
        }
        self.write(frame, options)?;
        self.written = true;
        tracing::debug!(format = %self.format, bytes = self.dst.len(), "still image encoded");
        Ok(())
    }

    fn finish(&mut self) -> Result<Vec<u8>> {
        if self.finished {
            return Err(Error::StreamAlreadyFinalized);
        }
        self.finished = true;
        if !self.written {
            return Err(Error::Encode("no frames to encode".into()));
        }
        Ok(std::mem::take(&mut self.dst))
    }
}
