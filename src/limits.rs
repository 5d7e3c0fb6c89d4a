//! Resource limits for untrusted input.
//!
//! [`ResourceLimits`] caps what a decoder may allocate and what the
//! orchestrator may emit. [`LimitExceeded`] is returned when a check fails.
//! Geometry checks run on frame headers, before any pixel buffer for that
//! frame exists.

/// Largest frame width or height accepted by default.
pub const DEFAULT_MAX_FRAME_DIMENSION: u32 = 10_000;

/// Resource limits for a decode/transcode.
///
/// `None` means no limit for that resource. [`Default`] applies
/// [`DEFAULT_MAX_FRAME_DIMENSION`] to width and height and leaves the rest
/// open; [`none()`](ResourceLimits::none) disables everything.
///
/// # Example
///
/// ```
/// use zentranscode::ResourceLimits;
///
/// let limits = ResourceLimits::default()
///     .with_max_pixels(50_000_000)
///     .with_max_frames(500);
/// assert!(limits.check_dimensions(4000, 3000).is_ok());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct ResourceLimits {
    /// Maximum total pixels (width × height) of any frame.
    pub max_pixels: Option<u64>,
    /// Maximum frame width in pixels.
    pub max_width: Option<u32>,
    /// Maximum frame height in pixels.
    pub max_height: Option<u32>,
    /// Maximum input size in bytes.
    pub max_file_size: Option<u64>,
    /// Maximum encoded output size in bytes.
    pub max_output_bytes: Option<u64>,
    /// Maximum number of animation frames processed.
    pub max_frames: Option<u32>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self::none()
            .with_max_width(DEFAULT_MAX_FRAME_DIMENSION)
            .with_max_height(DEFAULT_MAX_FRAME_DIMENSION)
    }
}

impl ResourceLimits {
    /// No limits (all fields `None`).
    pub const fn none() -> Self {
        Self {
            max_pixels: None,
            max_width: None,
            max_height: None,
            max_file_size: None,
            max_output_bytes: None,
            max_frames: None,
        }
    }

    /// Set maximum total pixels.
    pub fn with_max_pixels(mut self, max: u64) -> Self {
        self.max_pixels = Some(max);
        self
    }

    /// Set maximum frame width in pixels.
    pub fn with_max_width(mut self, width: u32) -> Self {
        self.max_width = Some(width);
        self
    }

    /// Set maximum frame height in pixels.
    pub fn with_max_height(mut self, height: u32) -> Self {
        self.max_height = Some(height);
        self
    }

    /// Set both width and height ceilings.
    pub fn with_max_dimension(self, dim: u32) -> Self {
        self.with_max_width(dim).with_max_height(dim)
    }

    /// Set maximum input size in bytes.
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = Some(bytes);
        self
    }

    /// Set maximum encoded output size in bytes.
    pub fn with_max_output(mut self, bytes: u64) -> Self {
        self.max_output_bytes = Some(bytes);
        self
    }

    /// Set maximum number of animation frames.
    pub fn with_max_frames(mut self, frames: u32) -> Self {
        self.max_frames = Some(frames);
        self
    }

    // --- Validation methods ---

    /// Check frame dimensions against `max_width`, `max_height`, and `max_pixels`.
    pub fn check_dimensions(&self, width: u32, height: u32) -> Result<(), LimitExceeded> {
        if let Some(max) = self.max_width
            && width > max
        {
            return Err(LimitExceeded::Width { actual: width, max });
        }
        if let Some(max) = self.max_height
            && height > max
        {
            return Err(LimitExceeded::Height {
                actual: height,
                max,
            });
        }
        if let Some(max) = self.max_pixels {
            let pixels = width as u64 * height as u64;
            if pixels > max {
                return Err(LimitExceeded::Pixels {
                    actual: pixels,
                    max,
                });
            }
        }
        Ok(())
    }

    /// Check input size against `max_file_size`.
    pub fn check_file_size(&self, bytes: u64) -> Result<(), LimitExceeded> {
        if let Some(max) = self.max_file_size
            && bytes > max
        {
            return Err(LimitExceeded::FileSize { actual: bytes, max });
        }
        Ok(())
    }

    /// Check encoded output size against `max_output_bytes`.
    pub fn check_output_size(&self, bytes: u64) -> Result<(), LimitExceeded> {
        if let Some(max) = self.max_output_bytes
            && bytes > max
        {
            return Err(LimitExceeded::OutputSize { actual: bytes, max });
        }
        Ok(())
    }

    /// Check a running frame count against `max_frames`.
    pub fn check_frames(&self, count: u32) -> Result<(), LimitExceeded> {
        if let Some(max) = self.max_frames
            && count > max
        {
            return Err(LimitExceeded::Frames { actual: count, max });
        }
        Ok(())
    }

    /// Check an [`ImageHeader`](crate::ImageHeader) against the geometry limits.
    pub fn check_header(&self, header: &crate::ImageHeader) -> Result<(), LimitExceeded> {
        self.check_dimensions(header.width, header.height)
    }
}

/// A resource limit was exceeded.
///
/// Each variant carries the actual value and the limit that was exceeded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LimitExceeded {
    /// Frame width exceeded `max_width`.
    Width {
        /// Actual width.
        actual: u32,
        /// Maximum allowed.
        max: u32,
    },
    /// Frame height exceeded `max_height`.
    Height {
        /// Actual height.
        actual: u32,
        /// Maximum allowed.
        max: u32,
    },
    /// Pixel count exceeded `max_pixels`.
    Pixels {
        /// Actual pixel count.
        actual: u64,
        /// Maximum allowed.
        max: u64,
    },
    /// Input size exceeded `max_file_size`.
    FileSize {
        /// Actual input size in bytes.
        actual: u64,
        /// Maximum allowed.
        max: u64,
    },
    /// Encoded output exceeded `max_output_bytes`.
    OutputSize {
        /// Actual output size in bytes.
        actual: u64,
        /// Maximum allowed.
        max: u64,
    },
    /// Frame count exceeded `max_frames`.
    Frames {
        /// Frames seen so far.
        actual: u32,
        /// Maximum allowed.
        max: u32,
    },
}

impl core::fmt::Display for LimitExceeded {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Width { actual, max } => write!(f, "width {actual} exceeds limit {max}"),
            Self::Height { actual, max } => write!(f, "height {actual} exceeds limit {max}"),
            Self::Pixels { actual, max } => {
                write!(f, "pixel count {actual} exceeds limit {max}")
            }
            Self::FileSize { actual, max } => {
                write!(f, "file size {actual} bytes exceeds limit {max}")
            }
            Self::OutputSize { actual, max } => {
                write!(f, "output size {actual} bytes exceeds limit {max}")
            }
            Self::Frames { actual, max } => {
                write!(f, "frame count {actual} exceeds limit {max}")
            }
        }
    }
}

impl core::error::Error for LimitExceeded {}
