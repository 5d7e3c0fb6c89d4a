//! PNG and APNG output over the `png` crate.
//!
//! The acTL chunk precedes the image data and carries the frame count, so
//! frames are held until [`finish`](Encoder::finish). One frame is written
//! as a plain PNG.

use std::borrow::Cow;
use std::time::Duration;

use ::png::{AdaptiveFilterType, BitDepth, BlendOp, ColorType, Compression, DisposeOp, Info};

use super::Encoder;
use crate::decode::Decoder;
use crate::error::{Error, Result};
use crate::frame::Framebuffer;
use crate::options::{EncodeOptions, PNG_COMPRESSION};
use crate::ImageFormat;

const DEFAULT_COMPRESSION: i32 = 6;

fn compression(level: i32) -> Compression {
    match level {
        0..=3 => Compression::Fast,
        4..=6 => Compression::Default,
        _ => Compression::Best,
    }
}

struct HeldFrame {
    rgba: Vec<u8>,
    delay: Duration,
}

/// PNG encoder; more than one frame makes an APNG.
pub struct PngEncoder {
    plays: u32,
    icc: Option<Vec<u8>>,
    dst: Vec<u8>,
    size: Option<(u32, u32)>,
    frames: Vec<HeldFrame>,
    compression: Compression,
    finished: bool,
}

impl PngEncoder {
    /// Loop count comes from `source`; without one the animation loops forever.
    pub fn new(
        source: Option<&mut dyn Decoder>,
        icc: Option<Vec<u8>>,
        dst: Vec<u8>,
    ) -> Result<Self> {
        let plays = source.map(|s| s.loop_count()).transpose()?.unwrap_or(0);
        Ok(Self {
            plays,
            icc,
            dst,
            size: None,
            frames: Vec::new(),
            compression: Compression::Default,
            finished: false,
        })
    }

    fn write(&mut self) -> Result<()> {
        let Some((width, height)) = self.size else {
            return Err(Error::Encode("no frames to encode".into()));
        };
        let mut info = Info::with_size(width, height);
        info.icc_profile = self.icc.as_deref().map(Cow::Borrowed);
        let mut enc = ::png::Encoder::with_info(&mut self.dst, info).map_err(Error::encode)?;
        enc.set_color(ColorType::Rgba);
        enc.set_depth(BitDepth::Eight);
        enc.set_compression(self.compression);
        enc.set_adaptive_filter(AdaptiveFilterType::Adaptive);
        let animated = self.frames.len() > 1;
        if animated {
            let count = u32::try_from(self.frames.len())
                .map_err(|_| Error::Encode("too many frames".into()))?;
            enc.set_animated(count, self.plays).map_err(Error::encode)?;
        }

        let mut writer = enc.write_header().map_err(Error::encode)?;
        for frame in &self.frames {
            if animated {
                let ms = u16::try_from(frame.delay.as_millis()).unwrap_or(u16::MAX);
                writer.set_frame_delay(ms, 1000).map_err(Error::encode)?;
                writer
                    .set_dispose_op(DisposeOp::None)
                    .map_err(Error::encode)?;
                writer.set_blend_op(BlendOp::Source).map_err(Error::encode)?;
            }
            writer
                .write_image_data(&frame.rgba)
                .map_err(Error::encode)?;
        }
        writer.finish().map_err(Error::encode)?;
        tracing::debug!(
            frames = self.frames.len(),
            plays = self.plays,
            bytes = self.dst.len(),
            "png encoded"
        );
        Ok(())
    }
}

impl Encoder for PngEncoder {
    fn format(&self) -> ImageFormat {
        ImageFormat::Png
    }

    fn add_frame(&mut self, frame: &Framebuffer, options: &EncodeOptions) -> Result<()> {
        if self.finished {
            return Err(Error::StreamAlreadyFinalized);
        }
        let dims = frame.dimensions();
        match self.size {
            None => self.size = Some(dims),
            Some(size) if size == dims => {}
            Some((w, h)) => {
                return Err(Error::Encode(format!(
                    "frame {}x{} does not match the {w}x{h} canvas",
                    dims.0, dims.1
                )));
            }
        }
        self.compression = compression(options.get_clamped(
            PNG_COMPRESSION,
            0,
            9,
            DEFAULT_COMPRESSION,
        ));
        self.frames.push(HeldFrame {
            rgba: frame.as_bytes().to_vec(),
            delay: frame.duration,
        });
        Ok(())
    }

    fn finish(&mut self) -> Result<Vec<u8>> {
        if self.finished {
            return Err(Error::StreamAlreadyFinalized);
        }
        self.finished = true;
        let written = self.write();
        self.frames = Vec::new();
        written?;
        Ok(std::mem::take(&mut self.dst))
    }
}
