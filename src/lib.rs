//! Still and animated image transcoding under a time budget.
//!
//! The pipeline pulls frames from a [`Decoder`], resolves per-format patch
//! animation on a [`Compositor`] canvas, orients and resizes each canvas with
//! a [`Transformer`], and feeds the result to an [`Encoder`]:
//!
//! - [`new_decoder`]: format sniffing and decoder dispatch (GIF, PNG/APNG,
//!   WebP, JPEG)
//! - [`new_encoder`]: encoders writing into a caller-owned buffer; GIF and
//!   PNG keep animation, JPEG, WebP and AVIF get the first frame
//! - [`ImageOps`]: the orchestrator, with pooled buffers and an optional
//!   timeout raced on a worker thread
//! - [`ImageOptions`] / [`EncodeOptions`]: target format, geometry and
//!   encoder tunables
//! - [`ResourceLimits`]: ceilings on input size, frame geometry, frame count
//!   and output size
//!
//! Nothing here installs a `tracing` subscriber; events are emitted at
//! `debug` and `trace` level and go nowhere unless the caller sets one up.
//!
//! ```
//! use std::time::Duration;
//! use zentranscode::{ImageFormat, ImageOps, ImageOptions, ResizeMethod, ResourceLimits};
//!
//! # fn main() -> zentranscode::Result<()> {
//! # let source = {
//! #     let mut out = Vec::new();
//! #     let mut enc = gif::Encoder::new(&mut out, 4, 2, &[0, 0, 0, 255, 0, 0]).unwrap();
//! #     enc.write_frame(&gif::Frame::from_indexed_pixels(4, 2, &[1u8; 8][..], None)).unwrap();
//! #     drop(enc);
//! #     out
//! # };
//! let opts = ImageOptions::new(ImageFormat::Gif)
//!     .with_size(2, 2)
//!     .with_resize_method(ResizeMethod::Fit)
//!     .with_encode_timeout(Duration::from_secs(10));
//! let decoder = zentranscode::new_decoder(source, ResourceLimits::default())?;
//! let out = ImageOps::new(64).transform(decoder, &opts, Vec::new())?;
//! assert_eq!(ImageFormat::detect(&out), Some(ImageFormat::Gif));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

mod capabilities;
mod compose;
pub mod decode;
pub mod encode;
mod error;
mod format;
mod frame;
mod info;
mod limits;
mod ops;
mod options;
mod orientation;
mod resize;

pub use capabilities::CodecCapabilities;
pub use compose::Compositor;
pub use decode::{Decoder, new_decoder};
pub use encode::{Encoder, new_encoder};
pub use error::{Error, Result};
pub use format::ImageFormat;
pub use frame::{Blend, Disposal, Framebuffer, rgba_from_argb};
pub use info::{AnimationCache, AnimationInfo, ImageHeader, PixelLayout};
pub use limits::{DEFAULT_MAX_FRAME_DIMENSION, LimitExceeded, ResourceLimits};
pub use ops::ImageOps;
pub use options::{
    AVIF_QUALITY, AVIF_SPEED, EncodeOptions, GIF_SPEED, ImageOptions, JPEG_QUALITY,
    PNG_COMPRESSION, WEBP_QUALITY,
};
pub use orientation::Orientation;
pub use resize::{Crop, ResizeMethod, ResizePlan, Transformer};

// Re-exports for implementors of custom decoders and encoders.
pub use enough::{Stop, Unstoppable};
pub use imgref::{ImgRef, ImgRefMut};
pub use rgb;
pub use rgb::RGBA8;
