//! Transcode configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::ImageFormat;
use crate::resize::ResizeMethod;

/// JPEG quality, 0-100.
pub const JPEG_QUALITY: i32 = 1;
/// PNG compression effort, 0-9.
pub const PNG_COMPRESSION: i32 = 16;
/// WebP quality, 0-100. Accepted; the lossless WebP backend ignores it.
pub const WEBP_QUALITY: i32 = 64;
/// GIF quantizer speed, 1-30. Higher is faster and coarser.
pub const GIF_SPEED: i32 = 100;
/// AVIF quality, 1-100.
pub const AVIF_QUALITY: i32 = 1;
/// AVIF encoder speed, 1-10. Higher is faster.
pub const AVIF_SPEED: i32 = 2;

/// Per-format encoder tunables keyed by integer option ids.
///
/// Ids are scoped to the target format, so the same number can mean
/// different things for different encoders. Encoders ignore ids they do
/// not know.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EncodeOptions(BTreeMap<i32, i32>);

impl EncodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`.
    pub fn with(mut self, key: i32, value: i32) -> Self {
        self.0.insert(key, value);
        self
    }

    /// Value for `key`, if set.
    pub fn get(&self, key: i32) -> Option<i32> {
        self.0.get(&key).copied()
    }

    /// Value for `key` clamped to `min..=max`, or `default` when unset.
    pub fn get_clamped(&self, key: i32, min: i32, max: i32, default: i32) -> i32 {
        self.get(key).map_or(default, |v| v.clamp(min, max))
    }

}

impl FromIterator<(i32, i32)> for EncodeOptions {
    fn from_iter<T: IntoIterator<Item = (i32, i32)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[(i32, i32); N]> for EncodeOptions {
    fn from(pairs: [(i32, i32); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// Options for one [`ImageOps::transform`](crate::ImageOps::transform) call.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use zentranscode::{ImageFormat, ImageOptions, ResizeMethod};
///
/// let opts = ImageOptions::new(ImageFormat::Gif)
///     .with_size(320, 0)
///     .with_resize_method(ResizeMethod::Fit)
///     .with_encode_timeout(Duration::from_secs(30));
/// assert_eq!(opts.height, 0);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct ImageOptions {
    /// Target container.
    pub file_type: ImageFormat,
    /// Apply the header orientation to the pixels before resizing.
    pub normalize_orientation: bool,
    /// Tunables passed to the target encoder.
    pub encode_options: EncodeOptions,
    /// How the source maps onto `width`×`height`.
    pub resize_method: ResizeMethod,
    /// Target width; `0` keeps the source width.
    pub width: u32,
    /// Target height; `0` keeps the source height.
    pub height: u32,
    /// Wall-clock ceiling for the whole transcode.
    pub encode_timeout: Option<Duration>,
    /// Emit only the first composited frame even if the target can animate.
    pub disable_animated_output: bool,
}

impl ImageOptions {
    /// Defaults: native size, `Fit`, orientation normalized, no timeout.
    pub fn new(file_type: ImageFormat) -> Self {
        Self {
            file_type,
            normalize_orientation: true,
            encode_options: EncodeOptions::default(),
            resize_method: ResizeMethod::Fit,
            width: 0,
            height: 0,
            encode_timeout: None,
            disable_animated_output: false,
        }
    }

    /// Options for a file type given as an extension such as `".gif"`.
    pub fn for_file_type(ext: &str) -> Option<Self> {
        ImageFormat::from_extension(ext).map(Self::new)
    }

    pub fn with_normalize_orientation(mut self, normalize: bool) -> Self {
        self.normalize_orientation = normalize;
        self
    }

    pub fn with_encode_options(mut self, options: EncodeOptions) -> Self {
        self.encode_options = options;
        self
    }

    pub fn with_resize_method(mut self, method: ResizeMethod) -> Self {
        self.resize_method = method;
        self
    }

    /// Target box; zero on an axis keeps the source size there.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_encode_timeout(mut self, timeout: Duration) -> Self {
        self.encode_timeout = Some(timeout);
        self
    }

    pub fn with_disable_animated_output(mut self, disable: bool) -> Self {
        self.disable_animated_output = disable;
        self
    }
}
