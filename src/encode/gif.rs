//! GIF output over the `gif` crate.
//!
//! When the source carries color tables, frames are mapped back onto them
//! so a GIF-to-GIF transcode keeps the source colors: a frame that had a
//! local table is written with that table, other frames use the global one.
//! Sources without any table are quantized frame by frame.

use ::gif::{DisposalMethod, Frame, Repeat};
use rgb::RGBA8;

use super::Encoder;
use crate::decode::Decoder;
use crate::error::{Error, Result};
use crate::frame::Framebuffer;
use crate::options::{EncodeOptions, GIF_SPEED};
use crate::ImageFormat;

const DEFAULT_SPEED: i32 = 10;

/// Alpha below this maps to the transparent index.
const ALPHA_THRESHOLD: u8 = 128;

const UNMAPPED: u16 = u16::MAX;

/// Nearest-entry lookup keyed on 5-bit-per-channel RGB.
struct PaletteMap {
    entries: Vec<[u8; 3]>,
    transparent: Option<u8>,
    cache: Box<[u16]>,
}

impl PaletteMap {
    fn new(rgb: &[u8]) -> Self {
        let entries: Vec<[u8; 3]> = rgb
            .chunks_exact(3)
            .take(256)
            .map(|c| [c[0], c[1], c[2]])
            .collect();
        // Room for one more entry means room for a transparent slot.
        let transparent = u8::try_from(entries.len()).ok();
        Self {
            entries,
            transparent,
            cache: vec![UNMAPPED; 1 << 15].into_boxed_slice(),
        }
    }

    fn matches(&self, rgb: &[u8]) -> bool {
        self.entries.len() == (rgb.len() / 3).min(256)
            && self
                .entries
                .iter()
                .zip(rgb.chunks_exact(3))
                .all(|(e, c)| e[..] == *c)
    }

    /// Packed RGB table, with the transparent slot when there is room.
    fn packed(&self) -> Vec<u8> {
        let mut out: Vec<u8> = self.entries.iter().flatten().copied().collect();
        if self.transparent.is_some() {
            out.extend_from_slice(&[0, 0, 0]);
        }
        out
    }

    fn index(&mut self, px: RGBA8) -> u8 {
        if let (true, Some(t)) = (px.a < ALPHA_THRESHOLD, self.transparent) {
            return t;
        }
        let key = (usize::from(px.r >> 3) << 10) | (usize::from(px.g >> 3) << 5) | usize::from(px.b >> 3);
        let cached = self.cache[key];
        if cached != UNMAPPED {
            return cached as u8;
        }
        let center = |c: u8| i32::from((c & 0xf8) | 4);
        let (r, g, b) = (center(px.r), center(px.g), center(px.b));
        let best = self
            .entries
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| {
                (r - i32::from(e[0])).abs() + (g - i32::from(e[1])).abs() + (b - i32::from(e[2])).abs()
            })
            .map_or(0, |(i, _)| i as u8);
        self.cache[key] = u16::from(best);
        best
    }
}

enum State {
    /// Nothing written yet; the screen size comes from the first frame.
    Pending(Vec<u8>),
    Writing {
        enc: ::gif::Encoder<Vec<u8>>,
        screen: (u16, u16),
    },
    Finished,
}

/// GIF encoder that takes loop count and palette from its source decoder.
pub struct GifEncoder {
    state: State,
    repeat: Option<Repeat>,
    palette: Option<PaletteMap>,
    /// Table of the most recent source frame that carried a local one.
    local: Option<PaletteMap>,
    use_local: bool,
    indices: Vec<u8>,
    scratch: Vec<u8>,
}

impl GifEncoder {
    pub fn new(source: &mut dyn Decoder, dst: Vec<u8>) -> Result<Self> {
        let plays = source.loop_count()?;
        let repeat = match plays {
            0 => Some(Repeat::Infinite),
            1 => None,
            n => Some(Repeat::Finite(u16::try_from(n - 1).unwrap_or(u16::MAX))),
        };
        let palette = source
            .global_palette()
            .filter(|p| p.len() >= 3)
            .map(PaletteMap::new);
        tracing::debug!(
            ?repeat,
            palette_entries = palette.as_ref().map(|p| p.entries.len()),
            "gif encoder"
        );
        Ok(Self {
            state: State::Pending(dst),
            repeat,
            palette,
            local: None,
            use_local: false,
            indices: Vec::new(),
            scratch: Vec::new(),
        })
    }

    fn writer(&mut self, width: u16, height: u16) -> Result<&mut ::gif::Encoder<Vec<u8>>> {
        if let State::Pending(dst) = &mut self.state {
            let dst = std::mem::take(dst);
            let global = self.palette.as_ref().map(PaletteMap::packed);
            let mut enc = ::gif::Encoder::new(dst, width, height, global.as_deref().unwrap_or(&[]))
                .map_err(Error::encode)?;
            if let Some(repeat) = self.repeat {
                enc.set_repeat(repeat).map_err(Error::encode)?;
            }
            self.state = State::Writing {
                enc,
                screen: (width, height),
            };
        }
        match &mut self.state {
            State::Writing { enc, screen } if *screen == (width, height) => Ok(enc),
            State::Writing { screen, .. } => Err(Error::Encode(format!(
                "frame {width}x{height} does not match the {}x{} screen",
                screen.0, screen.1
            ))),
            _ => Err(Error::StreamAlreadyFinalized),
        }
    }
}

fn dimension(v: u32) -> Result<u16> {
    u16::try_from(v).map_err(|_| Error::Encode(format!("{v} px exceeds the GIF limit")))
}

impl Encoder for GifEncoder {
    fn format(&self) -> ImageFormat {
        ImageFormat::Gif
    }

    fn add_frame(&mut self, frame: &Framebuffer, options: &EncodeOptions) -> Result<()> {
        if matches!(self.state, State::Finished) {
            return Err(Error::StreamAlreadyFinalized);
        }
        let (width, height) = (dimension(frame.width())?, dimension(frame.height())?);

        let map = match (self.use_local, self.local.as_mut()) {
            (true, Some(local)) => Some(local),
            _ => self.palette.as_mut(),
        };
        let mut out = match map {
            Some(map) => {
                self.indices.clear();
                self.indices
                    .extend(frame.pixels().iter().map(|&px| map.index(px)));
                let mut out =
                    Frame::from_indexed_pixels(width, height, &self.indices[..], map.transparent);
                if self.use_local {
                    out.palette = Some(map.packed());
                }
                out
            }
            None => {
                let speed = options.get_clamped(GIF_SPEED, 1, 30, DEFAULT_SPEED);
                self.scratch.clear();
                self.scratch.extend_from_slice(frame.as_bytes());
                Frame::from_rgba_speed(width, height, &mut self.scratch, speed)
            }
        };
        let cs = (frame.duration.as_millis() + 5) / 10;
        out.delay = u16::try_from(cs).unwrap_or(u16::MAX);
        out.dispose = DisposalMethod::Background;

        self.writer(width, height)?
            .write_frame(&out)
            .map_err(Error::encode)?;
        tracing::trace!(width, height, delay = out.delay, "gif frame written");
        Ok(())
    }

    fn set_source_palette(&mut self, palette: Option<&[u8]>) {
        let Some(rgb) = palette.filter(|p| p.len() >= 3) else {
            self.use_local = false;
            return;
        };
        if !self.local.as_ref().is_some_and(|map| map.matches(rgb)) {
            tracing::trace!(entries = rgb.len() / 3, "local color table");
            self.local = Some(PaletteMap::new(rgb));
        }
        self.use_local = true;
    }

    fn finish(&mut self) -> Result<Vec<u8>> {
        match std::mem::replace(&mut self.state, State::Finished) {
            State::Writing { enc, .. } => enc.into_inner().map_err(Error::encode),
            State::Pending(_) => Err(Error::Encode("no frames to encode".into())),
            State::Finished => Err(Error::StreamAlreadyFinalized),
        }
    }
}
