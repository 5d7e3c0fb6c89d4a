//! PNG and APNG: fcTL patches with dispose and blend ops.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use ::png::{BlendOp, ColorType, DisposeOp, FrameControl, Transformations};

use super::{Decoder, check_frame};
use crate::error::{Error, Result};
use crate::frame::{Blend, Disposal, Framebuffer};
use crate::info::{AnimationCache, AnimationInfo, ImageHeader, PixelLayout};
use crate::limits::ResourceLimits;
use crate::ImageFormat;

type Reader = ::png::Reader<Cursor<Arc<[u8]>>>;

fn invalid(err: ::png::DecodingError) -> Error {
    tracing::debug!(%err, "png decode error");
    Error::InvalidImage
}

fn layout(color: ColorType) -> Result<PixelLayout> {
    Ok(match color {
        ColorType::Rgba => PixelLayout::Rgba8,
        ColorType::Rgb => PixelLayout::Rgb8,
        ColorType::Grayscale => PixelLayout::Gray8,
        ColorType::GrayscaleAlpha => PixelLayout::GrayAlpha8,
        ColorType::Indexed => return Err(Error::InvalidImage),
    })
}

fn frame_delay(num: u16, den: u16) -> Duration {
    let den = if den == 0 { 100 } else { den };
    Duration::from_millis(u64::from(num) * 1000 / u64::from(den))
}

/// A frame decoded by `frame_header` ahead of `decode_to`.
#[derive(Debug)]
struct Decoded {
    width: u32,
    height: u32,
    control: Option<FrameControl>,
}

/// PNG backend over the `png` crate. Still PNGs are a one-frame animation.
pub struct PngDecoder {
    data: Arc<[u8]>,
    reader: Reader,
    header: ImageHeader,
    icc: Option<Vec<u8>>,
    /// Frames in the animation (acTL), or 1.
    frames: u32,
    plays: u32,
    /// The IDAT image is not part of the animation and must be skipped.
    hidden_default: bool,
    decoded: u32,
    buf: Vec<u8>,
    pending: Option<Decoded>,
    animation: AnimationCache,
}

impl PngDecoder {
    pub fn new(data: Arc<[u8]>, limits: ResourceLimits) -> Result<Self> {
        let mut decoder = ::png::Decoder::new(Cursor::new(Arc::clone(&data)));
        decoder.set_transformations(Transformations::EXPAND | Transformations::STRIP_16);
        let reader = decoder.read_info().map_err(invalid)?;
        let info = reader.info();
        let (width, height) = (info.width, info.height);
        check_frame(&limits, width, height)?;

        let (frames, plays) = match info.animation_control {
            Some(ac) => (ac.num_frames.max(1), ac.num_plays),
            None => (1, 0),
        };
        let hidden_default = info.animation_control.is_some() && info.frame_control.is_none();
        let icc = info.icc_profile.as_ref().map(|p| p.to_vec());
        let (color, _) = reader.output_color_type();
        let header = ImageHeader::new(width, height)
            .with_layout(layout(color)?)
            .with_frame_count(frames)
            .with_content_length(data.len() as u64);
        tracing::debug!(width, height, frames, hidden_default, "png opened");

        let mut png = Self {
            data,
            reader,
            header,
            icc,
            frames,
            plays,
            hidden_default,
            decoded: 0,
            buf: Vec::new(),
            pending: None,
            animation: AnimationCache::new(),
        };
        if png.hidden_default {
            png.read_next()?;
        }
        Ok(png)
    }

    /// Decode the next image in the stream into `buf`.
    fn read_next(&mut self) -> Result<Decoded> {
        self.buf.resize(self.reader.output_buffer_size(), 0);
        let out = self.reader.next_frame(&mut self.buf).map_err(invalid)?;
        Ok(Decoded {
            width: out.width,
            height: out.height,
            control: self.reader.info().frame_control,
        })
    }

    fn advance(&mut self) -> Result<&Decoded> {
        if self.pending.is_none() {
            if self.decoded >= self.frames {
                return Err(Error::EndOfStream);
            }
            let next = self.read_next()?;
            self.pending = Some(next);
        }
        self.pending.as_ref().ok_or(Error::EndOfStream)
    }

    /// Sum fcTL delays by walking the chunk list.
    fn scan(&self) -> Result<AnimationInfo> {
        let mut total = Duration::ZERO;
        let mut pos = 8;
        while let Some(head) = self.data.get(pos..pos + 8) {
            let len = u32::from_be_bytes([head[0], head[1], head[2], head[3]]) as usize;
            let body = pos + 8;
            let chunk = self
                .data
                .get(body..body.saturating_add(len))
                .ok_or(Error::InvalidImage)?;
            match &head[4..8] {
                b"fcTL" if chunk.len() >= 26 => {
                    let num = u16::from_be_bytes([chunk[20], chunk[21]]);
                    let den = u16::from_be_bytes([chunk[22], chunk[23]]);
                    total += frame_delay(num, den);
                }
                b"IEND" => break,
                _ => {}
            }
            pos = body.saturating_add(len).saturating_add(4);
        }
        Ok(AnimationInfo {
            loop_count: self.plays,
            frame_count: self.frames,
            background: 0,
            duration: total,
        })
    }
}

impl Decoder for PngDecoder {
    fn format(&self) -> ImageFormat {
        ImageFormat::Png
    }

    fn description(&self) -> &'static str {
        if self.frames > 1 { "APNG" } else { "PNG" }
    }

    fn header(&mut self) -> Result<ImageHeader> {
        Ok(self.header)
    }

    fn frame_header(&mut self) -> Result<ImageHeader> {
        let layout = self.header.layout;
        let next = self.advance()?;
        Ok(ImageHeader::new(next.width, next.height).with_layout(layout))
    }

    fn decode_to(&mut self, frame: &mut Framebuffer) -> Result<()> {
        self.advance()?;
        let Some(next) = self.pending.take() else {
            return Err(Error::EndOfStream);
        };
        self.decoded += 1;
        frame.copy_from_raw(&self.buf, next.width, next.height, self.header.layout)?;
        match next.control {
            Some(fc) => {
                frame.duration = frame_delay(fc.delay_num, fc.delay_den);
                frame.disposal = match fc.dispose_op {
                    DisposeOp::None => Disposal::None,
                    DisposeOp::Background => Disposal::RestoreBackground,
                    DisposeOp::Previous => Disposal::RestorePrevious,
                };
                frame.blend = match fc.blend_op {
                    BlendOp::Source => Blend::NoBlend,
                    BlendOp::Over => Blend::AlphaBlend,
                };
                frame.x_offset = fc.x_offset;
                frame.y_offset = fc.y_offset;
            }
            None => frame.reset_metadata(),
        }
        tracing::trace!(index = self.decoded, ?next, "png frame");
        Ok(())
    }

    fn skip_frame(&mut self) -> Result<()> {
        self.advance()?;
        self.pending = None;
        self.decoded += 1;
        Ok(())
    }

    fn animation(&mut self) -> Result<AnimationInfo> {
        let mut cache = std::mem::take(&mut self.animation);
        let info = cache.get_or_parse(|| self.scan());
        self.animation = cache;
        info
    }

    fn icc(&self) -> Option<&[u8]> {
        self.icc.as_deref()
    }
}
