//! Per-format codec capability table.
//!
//! The orchestrator consults [`CodecCapabilities::for_format`] to decide
//! whether an animated source may stay animated in the target format, and
//! whether the target encoder needs the source decoder.

use crate::ImageFormat;

/// Describes what the shipped backend for one format supports.
///
/// Built with `const` builder methods so each format's entry is a `static`.
/// Fields are private and read through getters so new ones can be added
/// without breaking callers.
///
/// # Example
///
/// ```
/// use zentranscode::{CodecCapabilities, ImageFormat};
///
/// let gif = CodecCapabilities::for_format(ImageFormat::Gif);
/// assert!(gif.encode_animation());
/// assert!(gif.requires_source_decoder());
///
/// let avif = CodecCapabilities::for_format(ImageFormat::Avif);
/// assert!(avif.has_encoder() && !avif.has_decoder());
/// assert!(!avif.encode_animation());
/// ```
#[non_exhaustive]
pub struct CodecCapabilities {
    has_decoder: bool,
    has_encoder: bool,
    encode_animation: bool,
    encode_icc: bool,
    requires_source_decoder: bool,
}

impl Default for CodecCapabilities {
    fn default() -> Self {
        Self::new()
    }
}

static JPEG: CodecCapabilities = CodecCapabilities::new()
    .with_decoder(true)
    .with_encoder(true)
    .with_encode_icc(true);

static PNG: CodecCapabilities = CodecCapabilities::new()
    .with_decoder(true)
    .with_encoder(true)
    .with_encode_animation(true)
    .with_encode_icc(true);

static GIF: CodecCapabilities = CodecCapabilities::new()
    .with_decoder(true)
    .with_encoder(true)
    .with_encode_animation(true)
    .with_requires_source_decoder(true);

static WEBP: CodecCapabilities = CodecCapabilities::new()
    .with_decoder(true)
    .with_encoder(true);

static AVIF: CodecCapabilities = CodecCapabilities::new().with_encoder(true);

impl CodecCapabilities {
    /// Create capabilities with everything disabled.
    pub const fn new() -> Self {
        Self {
            has_decoder: false,
            has_encoder: false,
            encode_animation: false,
            encode_icc: false,
            requires_source_decoder: false,
        }
    }

    /// Capabilities of the backend shipped for `format`.
    pub fn for_format(format: ImageFormat) -> &'static Self {
        match format {
            ImageFormat::Jpeg => &JPEG,
            ImageFormat::Png => &PNG,
            ImageFormat::Gif => &GIF,
            ImageFormat::WebP => &WEBP,
            ImageFormat::Avif => &AVIF,
        }
    }

    /// Whether a decoder backend exists.
    pub const fn has_decoder(&self) -> bool {
        self.has_decoder
    }

    /// Whether an encoder backend exists.
    pub const fn has_encoder(&self) -> bool {
        self.has_encoder
    }

    /// Whether the encoder writes multi-frame output.
    pub const fn encode_animation(&self) -> bool {
        self.encode_animation
    }

    /// Whether the encoder embeds the source ICC profile.
    pub const fn encode_icc(&self) -> bool {
        self.encode_icc
    }

    /// Whether the encoder must be built with the decoder that produced its frames.
    pub const fn requires_source_decoder(&self) -> bool {
        self.requires_source_decoder
    }

    // --- const builder methods for static construction ---

    /// Set decoder availability.
    pub const fn with_decoder(mut self, v: bool) -> Self {
        self.has_decoder = v;
        self
    }

    /// Set encoder availability.
    pub const fn with_encoder(mut self, v: bool) -> Self {
        self.has_encoder = v;
        self
    }

    /// Set animation encoding support.
    pub const fn with_encode_animation(mut self, v: bool) -> Self {
        self.encode_animation = v;
        self
    }

    /// Set ICC embed support on encode.
    pub const fn with_encode_icc(mut self, v: bool) -> Self {
        self.encode_icc = v;
        self
    }

    /// Set whether the encoder needs the source decoder.
    pub const fn with_requires_source_decoder(mut self, v: bool) -> Self {
        self.requires_source_decoder = v;
        self
    }
}

impl core::fmt::Debug for CodecCapabilities {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CodecCapabilities")
            .field("has_decoder", &self.has_decoder)
            .field("has_encoder", &self.has_encoder)
            .field("encode_animation", &self.encode_animation)
            .field("encode_icc", &self.encode_icc)
            .field("requires_source_decoder", &self.requires_source_decoder)
            .finish()
    }
}
