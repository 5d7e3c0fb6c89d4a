//! Frame encoders writing into a caller-owned destination buffer.
//!
//! An [`Encoder`] accepts frames one at a time and produces the finished
//! container on [`finish`](Encoder::finish). After that every call fails with
//! [`Error::StreamAlreadyFinalized`].

use crate::decode::Decoder;
use crate::error::{Error, Result};
use crate::frame::Framebuffer;
use crate::options::EncodeOptions;
use crate::{CodecCapabilities, ImageFormat};

mod gif;
mod png;
mod still;

pub use self::gif::GifEncoder;
pub use self::png::PngEncoder;
pub use self::still::StillEncoder;

/// Incremental encoder for one output image.
pub trait Encoder: Send {
    /// Target container format.
    fn format(&self) -> ImageFormat;

    /// Append one composited frame.
    fn add_frame(&mut self, frame: &Framebuffer, options: &EncodeOptions) -> Result<()>;

    /// Finalize the stream and hand back the encoded bytes.
    fn finish(&mut self) -> Result<Vec<u8>>;

    /// Color table the next frame was stored with in the source, as packed
    /// RGB triples. Only palette-based encoders use it.
    fn set_source_palette(&mut self, _palette: Option<&[u8]>) {}

    /// `Some(frame)` appends and returns `None`; `None` finalizes and
    /// returns the encoded bytes.
    fn encode(
        &mut self,
        frame: Option<&Framebuffer>,
        options: &EncodeOptions,
    ) -> Result<Option<Vec<u8>>> {
        match frame {
            Some(frame) => self.add_frame(frame, options).map(|()| None),
            None => self.finish().map(Some),
        }
    }
}

/// Build an encoder for `format` writing into `dst`.
///
/// `dst` is cleared; its capacity is reused. `source` is the decoder the
/// frames come from; animated encoders take the loop count from it and the
/// source ICC profile is embedded where the format allows. Encoders that
/// also need its palette fail with [`Error::EncoderRequiresSourceDecoder`]
/// when it is absent.
pub fn new_encoder(
    format: ImageFormat,
    source: Option<&mut dyn Decoder>,
    mut dst: Vec<u8>,
) -> Result<Box<dyn Encoder>> {
    let caps = CodecCapabilities::for_format(format);
    if !caps.has_encoder() {
        return Err(Error::UnsupportedFormat(format));
    }
    dst.clear();
    Ok(match (format, source) {
        (ImageFormat::Gif, Some(source)) => Box::new(GifEncoder::new(source, dst)?),
        (_, None) if caps.requires_source_decoder() => {
            return Err(Error::EncoderRequiresSourceDecoder);
        }
        (format, source) => {
            let icc = source
                .as_deref()
                .filter(|_| caps.encode_icc())
                .and_then(|s| s.icc().map(<[u8]>::to_vec));
            match format {
                ImageFormat::Png => Box::new(PngEncoder::new(source, icc, dst)?),
                format => Box::new(StillEncoder::new(format, icc, dst)),
            }
        }
    })
}
