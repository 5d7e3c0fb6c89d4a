//! GIF: sub-rectangle patches with per-frame disposal and binary alpha.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use ::gif::{ColorOutput, DecodeOptions, DisposalMethod, Repeat};

use super::{Decoder, check_frame};
use crate::error::{Error, Result};
use crate::frame::{Blend, Disposal, Framebuffer};
use crate::info::{AnimationCache, AnimationInfo, ImageHeader, PixelLayout};
use crate::limits::ResourceLimits;
use crate::ImageFormat;

type Reader = ::gif::Decoder<Cursor<Arc<[u8]>>>;

fn open(data: &Arc<[u8]>, output: ColorOutput) -> Result<Reader> {
    let mut options = DecodeOptions::new();
    options.set_color_output(output);
    options
        .read_info(Cursor::new(Arc::clone(data)))
        .map_err(invalid)
}

fn invalid(err: ::gif::DecodingError) -> Error {
    tracing::debug!(%err, "gif decode error");
    Error::InvalidImage
}

fn disposal(method: DisposalMethod) -> Disposal {
    match method {
        DisposalMethod::Any => Disposal::None,
        DisposalMethod::Keep => Disposal::DoNotDispose,
        DisposalMethod::Background => Disposal::RestoreBackground,
        DisposalMethod::Previous => Disposal::RestorePrevious,
    }
}

#[derive(Clone, Copy, Debug)]
struct FrameMeta {
    left: u32,
    top: u32,
    width: u32,
    height: u32,
    delay: u16,
    dispose: DisposalMethod,
}

/// GIF backend over the `gif` crate, decoding straight to RGBA.
pub struct GifDecoder {
    data: Arc<[u8]>,
    reader: Reader,
    limits: ResourceLimits,
    width: u32,
    height: u32,
    palette: Option<Vec<u8>>,
    bg_index: Option<usize>,
    animation: AnimationCache,
    /// Frame whose metadata was read by `frame_header` but not yet decoded.
    pending: Option<FrameMeta>,
    pending_palette: Option<Vec<u8>>,
    /// Local color table of the last frame handed out.
    local_palette: Option<Vec<u8>>,
    scratch: Vec<u8>,
}

impl GifDecoder {
    pub fn new(data: Arc<[u8]>, limits: ResourceLimits) -> Result<Self> {
        let reader = open(&data, ColorOutput::RGBA)?;
        let (width, height) = (u32::from(reader.width()), u32::from(reader.height()));
        check_frame(&limits, width, height)?;
        let palette = reader.global_palette().map(<[u8]>::to_vec);
        let bg_index = reader.bg_color();
        tracing::debug!(width, height, has_palette = palette.is_some(), "gif opened");
        Ok(Self {
            data,
            reader,
            limits,
            width,
            height,
            palette,
            bg_index,
            animation: AnimationCache::new(),
            pending: None,
            pending_palette: None,
            local_palette: None,
            scratch: Vec::new(),
        })
    }

    /// Read the next frame's metadata, checking its geometry.
    fn advance(&mut self) -> Result<FrameMeta> {
        if let Some(meta) = self.pending {
            return Ok(meta);
        }
        let frame = self
            .reader
            .next_frame_info()
            .map_err(invalid)?
            .ok_or(Error::EndOfStream)?;
        let meta = FrameMeta {
            left: u32::from(frame.left),
            top: u32::from(frame.top),
            width: u32::from(frame.width),
            height: u32::from(frame.height),
            delay: frame.delay,
            dispose: frame.dispose,
        };
        let palette = frame.palette.clone();
        check_frame(&self.limits, meta.width, meta.height)?;
        self.pending = Some(meta);
        self.pending_palette = palette;
        Ok(meta)
    }

    /// Consume the pending frame, returning its metadata.
    fn take_pending(&mut self) -> Result<FrameMeta> {
        let meta = self.advance()?;
        self.pending = None;
        self.local_palette = self.pending_palette.take();
        Ok(meta)
    }

    /// Second pass over the whole stream: frame count, delays, loop count.
    fn scan(&self) -> Result<AnimationInfo> {
        let mut reader = open(&self.data, ColorOutput::Indexed)?;
        let mut frame_count = 0u32;
        let mut total = Duration::ZERO;
        let mut first_transparent = None;
        let mut buf = Vec::new();
        while let Some(frame) = reader.next_frame_info().map_err(invalid)? {
            check_frame(&self.limits, u32::from(frame.width), u32::from(frame.height))?;
            if frame_count == 0 {
                first_transparent = frame.transparent;
            }
            total += Duration::from_millis(u64::from(frame.delay) * 10);
            frame_count += 1;
            buf.resize(reader.buffer_size(), 0);
            reader.read_into_buffer(&mut buf).map_err(invalid)?;
        }
        if frame_count == 0 {
            return Err(Error::InvalidImage);
        }
        let loop_count = match reader.repeat() {
            Repeat::Infinite => 0,
            Repeat::Finite(n) => u32::from(n) + 1,
        };
        Ok(AnimationInfo {
            loop_count,
            frame_count,
            background: self.background_argb(first_transparent),
            duration: total,
        })
    }

    fn background_argb(&self, first_transparent: Option<u8>) -> u32 {
        let (Some(index), Some(palette)) = (self.bg_index, self.palette.as_deref()) else {
            return 0;
        };
        if first_transparent.map(usize::from) == Some(index) {
            return 0;
        }
        match palette.get(index * 3..index * 3 + 3) {
            Some(&[r, g, b]) => u32::from_be_bytes([0xFF, r, g, b]),
            _ => 0,
        }
    }
}

impl Decoder for GifDecoder {
    fn format(&self) -> ImageFormat {
        ImageFormat::Gif
    }

    fn header(&mut self) -> Result<ImageHeader> {
        let frames = self.animation()?.frame_count;
        Ok(ImageHeader::new(self.width, self.height)
            .with_layout(PixelLayout::Rgba8)
            .with_frame_count(frames)
            .with_content_length(self.data.len() as u64))
    }

    fn frame_header(&mut self) -> Result<ImageHeader> {
        let meta = self.advance()?;
        Ok(ImageHeader::new(meta.width, meta.height))
    }

    fn decode_to(&mut self, out: &mut Framebuffer) -> Result<()> {
        let meta = self.take_pending()?;
        out.duration = Duration::from_millis(u64::from(meta.delay) * 10);
        out.disposal = disposal(meta.dispose);
        out.blend = Blend::AlphaBlend;
        out.x_offset = meta.left;
        out.y_offset = meta.top;
        out.resize(meta.width, meta.height);
        if self.reader.buffer_size() != out.as_bytes().len() {
            return Err(Error::InvalidImage);
        }
        self.reader
            .read_into_buffer(out.as_bytes_mut())
            .map_err(invalid)?;
        tracing::trace!(?meta, "gif frame");
        Ok(())
    }

    fn skip_frame(&mut self) -> Result<()> {
        self.take_pending()?;
        self.scratch.resize(self.reader.buffer_size(), 0);
        self.reader
            .read_into_buffer(&mut self.scratch)
            .map_err(invalid)
    }

    fn animation(&mut self) -> Result<AnimationInfo> {
        let mut cache = std::mem::take(&mut self.animation);
        let info = cache.get_or_parse(|| self.scan());
        self.animation = cache;
        info
    }

    fn icc(&self) -> Option<&[u8]> {
        None
    }

    fn global_palette(&self) -> Option<&[u8]> {
        self.palette.as_deref()
    }

    fn frame_palette(&self) -> Option<&[u8]> {
        self.local_palette.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::fixtures::{self, GifFrame};
    use rgb::RGBA8;

    fn open_fixture(data: Vec<u8>, limits: ResourceLimits) -> GifDecoder {
        GifDecoder::new(data.into(), limits).unwrap()
    }

    #[test]
    fn animated_metadata() {
        let mut dec = open_fixture(fixtures::animated_gif(), ResourceLimits::default());
        let header = dec.header().unwrap();
        assert_eq!((header.width, header.height), (4, 4));
        assert_eq!(header.frame_count, 3);
        assert!(header.is_animated());
        assert_eq!(dec.loop_count().unwrap(), 0);
        assert_eq!(dec.duration().unwrap(), Duration::from_millis(300));
        assert_eq!(dec.description(), "GIF");
        assert_eq!(dec.global_palette().map(<[u8]>::len), Some(12));
    }

    #[test]
    fn frame_loop_matches_metadata() {
        let mut dec = open_fixture(fixtures::animated_gif(), ResourceLimits::default());
        let expected = dec.frame_count().unwrap();
        let mut fb = Framebuffer::default();
        let mut frames = 0;
        let mut total = Duration::ZERO;
        loop {
            match dec.decode_to(&mut fb) {
                Ok(()) => {
                    frames += 1;
                    total += fb.duration;
                }
                Err(e) if e.is_end_of_stream() => break,
                Err(e) => panic!("{e}"),
            }
        }
        assert_eq!(frames, expected);
        assert_eq!(total, dec.duration().unwrap());
        assert!(dec.decode_to(&mut fb).unwrap_err().is_end_of_stream());
        assert!(dec.frame_header().unwrap_err().is_end_of_stream());
    }

    #[test]
    fn frames_decode_to_rgba() {
        let mut dec = open_fixture(fixtures::animated_gif(), ResourceLimits::default());
        let mut fb = Framebuffer::default();
        dec.decode_to(&mut fb).unwrap();
        assert_eq!(fb.dimensions(), (4, 4));
        assert_eq!(fb.disposal, Disposal::DoNotDispose);
        assert_eq!(fb.blend, Blend::AlphaBlend);
        assert!(fb.pixels().iter().all(|&p| p == RGBA8::new(255, 0, 0, 255)));
    }

    #[test]
    fn skip_and_frame_header() {
        let mut dec = open_fixture(fixtures::animated_gif(), ResourceLimits::default());
        dec.skip_frame().unwrap();
        let next = dec.frame_header().unwrap();
        assert_eq!((next.width, next.height), (4, 4));
        let mut fb = Framebuffer::default();
        dec.decode_to(&mut fb).unwrap();
        assert!(fb.pixels().iter().all(|&p| p == RGBA8::new(0, 255, 0, 255)));
    }

    #[test]
    fn patch_offsets_and_disposal() {
        let data = fixtures::gif(
            4,
            4,
            Repeat::Finite(2),
            &[
                GifFrame::full(4, 4, 0, 5),
                GifFrame {
                    left: 1,
                    top: 2,
                    width: 2,
                    height: 1,
                    index: 3,
                    delay: 7,
                    dispose: DisposalMethod::Background,
                },
            ],
        );
        let mut dec = open_fixture(data, ResourceLimits::default());
        assert_eq!(dec.loop_count().unwrap(), 3);
        let mut fb = Framebuffer::default();
        dec.skip_frame().unwrap();
        dec.decode_to(&mut fb).unwrap();
        assert_eq!(fb.dimensions(), (2, 1));
        assert_eq!((fb.x_offset, fb.y_offset), (1, 2));
        assert_eq!(fb.duration, Duration::from_millis(70));
        assert_eq!(fb.disposal, Disposal::RestoreBackground);
    }

    #[test]
    fn local_palette_follows_decoded_frame() {
        let red_green = [255, 0, 0, 0, 255, 0];
        let blue_grey = [0, 0, 255, 9, 9, 9];
        let data = fixtures::gif_local_palettes(2, 1, &[&red_green, &blue_grey]);
        let mut dec = open_fixture(data, ResourceLimits::default());
        assert_eq!(dec.global_palette().map(<[u8]>::len), Some(6));
        assert_eq!(dec.frame_palette(), None);

        let mut fb = Framebuffer::default();
        dec.frame_header().unwrap();
        assert_eq!(dec.frame_palette(), None);
        dec.decode_to(&mut fb).unwrap();
        assert_eq!(dec.frame_palette(), Some(&red_green[..]));
        assert_eq!(
            fb.pixels(),
            [RGBA8::new(255, 0, 0, 255), RGBA8::new(0, 255, 0, 255)]
        );
        dec.skip_frame().unwrap();
        assert_eq!(dec.frame_palette(), Some(&blue_grey[..]));
    }

    #[test]
    fn metadata_scan_runs_once() {
        let mut dec = open_fixture(fixtures::animated_gif(), ResourceLimits::default());
        let logs = fixtures::capture_logs(|| {
            dec.header().unwrap();
            dec.loop_count().unwrap();
            dec.duration().unwrap();
            dec.background_color().unwrap();
            dec.frame_count().unwrap();
        });
        assert_eq!(logs.matches("animation metadata parsed").count(), 1, "{logs}");
    }

    #[test]
    fn failed_metadata_scan_is_not_repeated() {
        let data = fixtures::gif(2, 2, Repeat::Infinite, &[GifFrame::full(8, 8, 1, 1)]);
        let mut dec = open_fixture(data, ResourceLimits::none().with_max_dimension(4));
        let mut errors = Vec::new();
        let logs = fixtures::capture_logs(|| {
            errors.push(dec.header().unwrap_err());
            errors.push(dec.loop_count().unwrap_err());
            errors.push(dec.duration().unwrap_err());
        });
        assert!(matches!(errors[0], Error::FrameTooLarge(_)));
        assert!(matches!(errors[1], Error::InvalidImage));
        assert!(matches!(errors[2], Error::InvalidImage));
        assert_eq!(logs.matches("animation metadata unreadable").count(), 1, "{logs}");
    }

    #[test]
    fn oversized_canvas_rejected_at_open() {
        let err = GifDecoder::new(
            fixtures::animated_gif().into(),
            ResourceLimits::none().with_max_dimension(3),
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::FrameTooLarge(_)));
    }

    #[test]
    fn oversized_patch_rejected_before_allocation() {
        let data = fixtures::gif(
            2,
            2,
            Repeat::Infinite,
            &[GifFrame::full(8, 8, 1, 1)],
        );
        let mut dec = open_fixture(data, ResourceLimits::none().with_max_dimension(4));
        let mut fb = Framebuffer::default();
        let err = dec.decode_to(&mut fb).unwrap_err();
        assert!(matches!(err, Error::FrameTooLarge(_)));
        assert_eq!(fb.capacity(), 0);
    }
}
