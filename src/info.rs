//! Source header and animation metadata.

use std::time::Duration;

use crate::Orientation;
use crate::error::{Error, Result};

/// Pixel layout of decoded samples before conversion to the RGBA8 canvas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PixelLayout {
    /// 8-bit RGBA, straight alpha.
    #[default]
    Rgba8,
    /// 8-bit RGB.
    Rgb8,
    /// 8-bit grayscale.
    Gray8,
    /// 8-bit grayscale with straight alpha.
    GrayAlpha8,
}

impl PixelLayout {
    /// Bytes per pixel.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba8 => 4,
            Self::Rgb8 => 3,
            Self::Gray8 => 1,
            Self::GrayAlpha8 => 2,
        }
    }
}

/// Immutable summary of a decoded source, or of one frame patch when
/// returned by [`Decoder::frame_header`](crate::Decoder::frame_header).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct ImageHeader {
    /// Stored width in pixels.
    pub width: u32,
    /// Stored height in pixels.
    pub height: u32,
    /// Layout the backend decodes natively.
    pub layout: PixelLayout,
    /// EXIF orientation of the stored pixels.
    pub orientation: Orientation,
    /// Declared number of frames (1 for stills and for patch headers).
    pub frame_count: u32,
    /// Length of the encoded source in bytes.
    pub content_length: u64,
}

impl ImageHeader {
    /// A single-frame RGBA8 header with normal orientation.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            layout: PixelLayout::Rgba8,
            orientation: Orientation::Normal,
            frame_count: 1,
            content_length: 0,
        }
    }

    /// Set the native pixel layout.
    pub fn with_layout(mut self, layout: PixelLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Set the orientation.
    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    /// Set the declared frame count.
    pub fn with_frame_count(mut self, count: u32) -> Self {
        self.frame_count = count;
        self
    }

    /// Set the encoded length.
    pub fn with_content_length(mut self, bytes: u64) -> Self {
        self.content_length = bytes;
        self
    }

    /// Dimensions after applying [`orientation`](Self::orientation).
    pub fn display_dimensions(&self) -> (u32, u32) {
        self.orientation.display_dimensions(self.width, self.height)
    }

    /// Whether the source declares more than one frame.
    pub fn is_animated(&self) -> bool {
        self.frame_count > 1
    }
}

/// Animation side-channel data, read once per decoder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AnimationInfo {
    /// Number of plays; `0` means loop forever.
    pub loop_count: u32,
    /// Total frames in the source.
    pub frame_count: u32,
    /// Canvas background as `0xAARRGGBB`.
    pub background: u32,
    /// Sum of all frame durations.
    pub duration: Duration,
}

impl AnimationInfo {
    /// Info describing a still image: one frame, played once.
    pub fn still() -> Self {
        Self {
            loop_count: 1,
            frame_count: 1,
            ..Self::default()
        }
    }
}

/// Lazily parsed [`AnimationInfo`].
///
/// Starts unparsed; the first call to [`get_or_parse`](Self::get_or_parse)
/// runs the parser and every later call returns its outcome without parsing
/// again. A failed parse is remembered as [`Error::InvalidImage`].
#[derive(Clone, Debug, Default)]
pub struct AnimationCache(CacheState);

#[derive(Clone, Copy, Debug, Default)]
enum CacheState {
    #[default]
    Unparsed,
    Parsed(AnimationInfo),
    Failed,
}

impl AnimationCache {
    /// An unparsed cache.
    pub const fn new() -> Self {
        Self(CacheState::Unparsed)
    }

    /// Cached info, running `parse` on first access only.
    pub fn get_or_parse(
        &mut self,
        parse: impl FnOnce() -> Result<AnimationInfo>,
    ) -> Result<AnimationInfo> {
        match self.0 {
            CacheState::Parsed(info) => return Ok(info),
            CacheState::Failed => return Err(Error::InvalidImage),
            CacheState::Unparsed => {}
        }
        match parse() {
            Ok(info) => {
                tracing::trace!(?info, "animation metadata parsed");
                self.0 = CacheState::Parsed(info);
                Ok(info)
            }
            Err(err) => {
                tracing::debug!(%err, "animation metadata unreadable");
                self.0 = CacheState::Failed;
                Err(err)
            }
        }
    }
}
