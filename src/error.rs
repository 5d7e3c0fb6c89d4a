//! Error taxonomy shared by decoders, encoders and the orchestrator.

use crate::ImageFormat;
use crate::limits::LimitExceeded;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors produced while decoding, compositing, resizing or encoding.
///
/// [`EndOfStream`](Error::EndOfStream) is the normal termination signal of a
/// decoder's frame loop; [`ImageOps`](crate::ImageOps) never surfaces it.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Malformed or unsupported container or frame data.
    #[error("invalid or unsupported image")]
    InvalidImage,

    /// The input is too short to hold a header, or an output exceeded its budget.
    #[error("buffer too small")]
    BufferTooSmall,

    /// A frame's declared geometry exceeds the configured ceiling.
    #[error("frame too large: {0}")]
    FrameTooLarge(LimitExceeded),

    /// A non-geometric limit (frame count, input size) was exceeded.
    #[error("resource limit exceeded: {0}")]
    LimitExceeded(LimitExceeded),

    /// No more frames in the source.
    #[error("end of stream")]
    EndOfStream,

    /// The encoder needs the decoder that produced its frames.
    #[error("encoder requires the decoder that produced its source frames")]
    EncoderRequiresSourceDecoder,

    /// `encode` was called after the stream was finalized.
    #[error("encoder stream already finalized")]
    StreamAlreadyFinalized,

    /// The transcode exceeded its wall-clock budget.
    #[error("transcode timed out")]
    Timeout,

    /// The transcode was cancelled through its stop token.
    #[error("transcode cancelled")]
    Cancelled,

    /// The format was recognized but no codec backend handles it.
    #[error("no codec backend for {0}")]
    UnsupportedFormat(ImageFormat),

    /// The encoder backend rejected a frame or failed to finalize.
    #[error("encode failed: {0}")]
    Encode(String),

    /// The transcode worker terminated without reporting a result.
    #[error("transcode worker exited without a result")]
    WorkerLost,
}

impl Error {
    /// Whether this is the expected end-of-stream signal.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::EndOfStream)
    }

    pub(crate) fn encode(err: impl core::fmt::Display) -> Self {
        Self::Encode(err.to_string())
    }
}

impl From<enough::StopReason> for Error {
    fn from(reason: enough::StopReason) -> Self {
        match reason {
            enough::StopReason::TimedOut => Self::Timeout,
            _ => Self::Cancelled,
        }
    }
}
