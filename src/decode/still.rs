//! JPEG through the `image` crate's decoder.

use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, ImageDecoder, codecs::jpeg};

use super::{Decoder, check_frame};
use crate::error::{Error, Result};
use crate::frame::Framebuffer;
use crate::info::{AnimationInfo, ImageHeader, PixelLayout};
use crate::limits::ResourceLimits;
use crate::{ImageFormat, Orientation};

fn invalid(err: image::ImageError) -> Error {
    tracing::debug!(%err, "jpeg decode error");
    Error::InvalidImage
}

/// Single-frame JPEG backend.
pub struct JpegDecoder {
    data: Arc<[u8]>,
    header: ImageHeader,
    icc: Option<Vec<u8>>,
    done: bool,
}

impl JpegDecoder {
    pub fn new(data: Arc<[u8]>, limits: ResourceLimits) -> Result<Self> {
        let mut decoder = jpeg::JpegDecoder::new(Cursor::new(Arc::clone(&data))).map_err(invalid)?;
        let (width, height) = decoder.dimensions();
        check_frame(&limits, width, height)?;
        let icc = decoder.icc_profile().map_err(invalid)?;
        // A broken EXIF block should not fail the decode.
        let orientation = decoder
            .orientation()
            .map(|o| Orientation::from_exif(u16::from(o.to_exif())))
            .unwrap_or_default();
        let layout = match decoder.color_type().channel_count() {
            1 => PixelLayout::Gray8,
            _ => PixelLayout::Rgb8,
        };
        tracing::debug!(width, height, ?orientation, "jpeg opened");
        Ok(Self {
            header: ImageHeader::new(width, height)
                .with_layout(layout)
                .with_orientation(orientation)
                .with_content_length(data.len() as u64),
            data,
            icc,
            done: false,
        })
    }
}

impl Decoder for JpegDecoder {
    fn format(&self) -> ImageFormat {
        ImageFormat::Jpeg
    }

    fn header(&mut self) -> Result<ImageHeader> {
        Ok(self.header)
    }

    fn frame_header(&mut self) -> Result<ImageHeader> {
        if self.done {
            return Err(Error::EndOfStream);
        }
        Ok(ImageHeader::new(self.header.width, self.header.height).with_layout(self.header.layout))
    }

    fn decode_to(&mut self, frame: &mut Framebuffer) -> Result<()> {
        if self.done {
            return Err(Error::EndOfStream);
        }
        self.done = true;
        let decoder =
            jpeg::JpegDecoder::new(Cursor::new(Arc::clone(&self.data))).map_err(invalid)?;
        let rgba = DynamicImage::from_decoder(decoder)
            .map_err(invalid)?
            .into_rgba8();
        let (w, h) = rgba.dimensions();
        frame.copy_from_raw(rgba.as_raw(), w, h, PixelLayout::Rgba8)?;
        frame.reset_metadata();
        Ok(())
    }

    fn skip_frame(&mut self) -> Result<()> {
        if self.done {
            return Err(Error::EndOfStream);
        }
        self.done = true;
        Ok(())
    }

    fn animation(&mut self) -> Result<AnimationInfo> {
        Ok(AnimationInfo::still())
    }

    fn icc(&self) -> Option<&[u8]> {
        self.icc.as_deref()
    }
}
