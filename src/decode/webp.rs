//! WebP: the `image-webp` decoder composites animation itself, so every
//! frame arrives as a full canvas.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use image_webp::{DecodingError, LoopCount};

use super::{Decoder, check_frame};
use crate::error::{Error, Result};
use crate::frame::Framebuffer;
use crate::info::{AnimationCache, AnimationInfo, ImageHeader, PixelLayout};
use crate::limits::ResourceLimits;
use crate::ImageFormat;

type Reader = image_webp::WebPDecoder<Cursor<Arc<[u8]>>>;

fn invalid(err: DecodingError) -> Error {
    match err {
        DecodingError::NoMoreFrames => Error::EndOfStream,
        err => {
            tracing::debug!(%err, "webp decode error");
            Error::InvalidImage
        }
    }
}

/// WebP backend; still images are a one-frame animation.
pub struct WebPDecoder {
    reader: Reader,
    header: ImageHeader,
    icc: Option<Vec<u8>>,
    buf: Vec<u8>,
    decoded: u32,
    animation: AnimationCache,
}

impl WebPDecoder {
    pub fn new(data: Arc<[u8]>, limits: ResourceLimits) -> Result<Self> {
        let len = data.len() as u64;
        let mut reader = Reader::new(Cursor::new(data)).map_err(invalid)?;
        let (width, height) = reader.dimensions();
        check_frame(&limits, width, height)?;
        let frames = if reader.is_animated() {
            reader.num_frames().max(1)
        } else {
            1
        };
        let layout = if reader.has_alpha() {
            PixelLayout::Rgba8
        } else {
            PixelLayout::Rgb8
        };
        let icc = reader.icc_profile().map_err(invalid)?;
        tracing::debug!(width, height, frames, "webp opened");
        Ok(Self {
            reader,
            header: ImageHeader::new(width, height)
                .with_layout(layout)
                .with_frame_count(frames)
                .with_content_length(len),
            icc,
            buf: Vec::new(),
            decoded: 0,
            animation: AnimationCache::new(),
        })
    }

    fn remaining(&self) -> Result<()> {
        if self.decoded >= self.header.frame_count {
            return Err(Error::EndOfStream);
        }
        Ok(())
    }

    /// Decode the next frame into `buf`, returning its display time.
    fn read_next(&mut self) -> Result<Duration> {
        self.remaining()?;
        let size = self.reader.output_buffer_size().ok_or(Error::InvalidImage)?;
        self.buf.resize(size, 0);
        let delay = if self.reader.is_animated() {
            Duration::from_millis(u64::from(
                self.reader.read_frame(&mut self.buf).map_err(invalid)?,
            ))
        } else {
            self.reader.read_image(&mut self.buf).map_err(invalid)?;
            Duration::ZERO
        };
        self.decoded += 1;
        Ok(delay)
    }

    fn scan(&self) -> AnimationInfo {
        if !self.reader.is_animated() {
            return AnimationInfo::still();
        }
        let loop_count = match self.reader.loop_count() {
            LoopCount::Forever => 0,
            LoopCount::Times(n) => u32::from(n.get()),
        };
        // ANIM stores the color as B, G, R, A
        let background = self
            .reader
            .background_color_hint()
            .map_or(0, |[b, g, r, a]| u32::from_be_bytes([a, r, g, b]));
        AnimationInfo {
            loop_count,
            frame_count: self.header.frame_count,
            background,
            duration: Duration::from_millis(self.reader.loop_duration()),
        }
    }
}

impl Decoder for WebPDecoder {
    fn format(&self) -> ImageFormat {
        ImageFormat::WebP
    }

    fn header(&mut self) -> Result<ImageHeader> {
        Ok(self.header)
    }

    fn frame_header(&mut self) -> Result<ImageHeader> {
        self.remaining()?;
        Ok(ImageHeader::new(self.header.width, self.header.height).with_layout(self.header.layout))
    }

    fn decode_to(&mut self, frame: &mut Framebuffer) -> Result<()> {
        let duration = self.read_next()?;
        let (w, h) = (self.header.width, self.header.height);
        frame.copy_from_raw(&self.buf, w, h, self.header.layout)?;
        frame.reset_metadata();
        frame.duration = duration;
        tracing::trace!(index = self.decoded, ?duration, "webp frame");
        Ok(())
    }

    fn skip_frame(&mut self) -> Result<()> {
        // Animated frames depend on their predecessors, so skipping still decodes.
        self.read_next().map(drop)
    }

    fn animation(&mut self) -> Result<AnimationInfo> {
        let mut cache = std::mem::take(&mut self.animation);
        let info = cache.get_or_parse(|| Ok(self.scan()));
        self.animation = cache;
        info
    }

    fn icc(&self) -> Option<&[u8]> {
        self.icc.as_deref()
    }
}
