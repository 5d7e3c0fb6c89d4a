//! Pull-based frame decoding over every supported source format.
//!
//! [`new_decoder`] sniffs the source bytes and returns the matching backend
//! behind the [`Decoder`] trait. The orchestrator drives every backend the
//! same way: read the [`header`](Decoder::header), then call
//! [`decode_to`](Decoder::decode_to) until it returns
//! [`Error::EndOfStream`].
//!
//! Frames come out as patches: a decoder resizes the target
//! [`Framebuffer`] to the patch size and fills in its offset, duration,
//! disposal and blend. Formats whose frames already cover the full canvas
//! report offset zero, `Disposal::None` and `Blend::NoBlend`.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::frame::Framebuffer;
use crate::info::{AnimationInfo, ImageHeader};
use crate::limits::ResourceLimits;
use crate::{CodecCapabilities, ImageFormat};

mod gif;
mod png;
mod still;
mod webp;

pub use self::gif::GifDecoder;
pub use self::png::PngDecoder;
pub use self::still::JpegDecoder;
pub use self::webp::WebPDecoder;

/// One source, decoded frame by frame.
///
/// Dropping a decoder releases everything it owns; views it lent out are
/// borrows and cannot outlive it.
pub trait Decoder: Send {
    /// Source container format.
    fn format(&self) -> ImageFormat;

    /// Short human-readable format name.
    fn description(&self) -> &'static str {
        match self.format() {
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Png => "PNG",
            ImageFormat::Gif => "GIF",
            ImageFormat::WebP => "WEBP",
            ImageFormat::Avif => "AVIF",
        }
    }

    /// Canvas geometry, orientation, declared frame count and source length.
    fn header(&mut self) -> Result<ImageHeader>;

    /// Patch geometry of the next undecoded frame.
    ///
    /// Returns [`Error::EndOfStream`] when no frames remain.
    fn frame_header(&mut self) -> Result<ImageHeader>;

    /// Decode the next frame into `frame`.
    ///
    /// `frame` is resized to the patch and its animation fields are set.
    /// Fails with [`Error::FrameTooLarge`] before allocating when the patch
    /// exceeds the decoder's limits, and with [`Error::EndOfStream`] once
    /// every frame has been produced.
    fn decode_to(&mut self, frame: &mut Framebuffer) -> Result<()>;

    /// Advance past the next frame without producing pixels.
    fn skip_frame(&mut self) -> Result<()>;

    /// Animation side-channel data, parsed on first call and cached.
    fn animation(&mut self) -> Result<AnimationInfo>;

    /// Embedded ICC profile.
    fn icc(&self) -> Option<&[u8]>;

    /// Global palette as packed RGB triples, when the format has one.
    fn global_palette(&self) -> Option<&[u8]> {
        None
    }

    /// Local palette of the frame most recently decoded or skipped, as
    /// packed RGB triples. `None` when that frame used the global palette.
    fn frame_palette(&self) -> Option<&[u8]> {
        None
    }

    /// Total animation duration.
    fn duration(&mut self) -> Result<Duration> {
        Ok(self.animation()?.duration)
    }

    /// Number of plays; `0` means forever.
    fn loop_count(&mut self) -> Result<u32> {
        Ok(self.animation()?.loop_count)
    }

    /// Frames in the source.
    fn frame_count(&mut self) -> Result<u32> {
        Ok(self.animation()?.frame_count)
    }

    /// Canvas background as `0xAARRGGBB`.
    fn background_color(&mut self) -> Result<u32> {
        Ok(self.animation()?.background)
    }
}

/// Open a decoder for `data`.
///
/// Errors with [`Error::BufferTooSmall`] when the bytes cannot hold a
/// header, [`Error::InvalidImage`] when the header is not recognized or is
/// malformed, and [`Error::UnsupportedFormat`] for recognized formats without
/// a backend. `limits` bounds input size and frame geometry.
pub fn new_decoder(
    data: impl Into<Arc<[u8]>>,
    limits: ResourceLimits,
) -> Result<Box<dyn Decoder>> {
    let data: Arc<[u8]> = data.into();
    limits
        .check_file_size(data.len() as u64)
        .map_err(Error::LimitExceeded)?;
    let format = ImageFormat::sniff(&data)?;
    tracing::debug!(%format, bytes = data.len(), "opening decoder");
    if !CodecCapabilities::for_format(format).has_decoder() {
        return Err(Error::UnsupportedFormat(format));
    }
    Ok(match format {
        ImageFormat::Gif => Box::new(GifDecoder::new(data, limits)?),
        ImageFormat::Png => Box::new(PngDecoder::new(data, limits)?),
        ImageFormat::WebP => Box::new(WebPDecoder::new(data, limits)?),
        ImageFormat::Jpeg => Box::new(JpegDecoder::new(data, limits)?),
        ImageFormat::Avif => return Err(Error::UnsupportedFormat(format)),
    })
}

/// Reject a frame that exceeds the geometry limits.
pub(crate) fn check_frame(limits: &ResourceLimits, width: u32, height: u32) -> Result<()> {
    limits
        .check_dimensions(width, height)
        .map_err(Error::FrameTooLarge)
}
