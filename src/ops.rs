//! The transcode pipeline: decode, composite, orient and resize, encode.
//!
//! [`ImageOps`] owns the per-frame buffers and reuses them across calls.
//! With [`ImageOptions::encode_timeout`] set the pipeline runs on a worker
//! thread; the caller waits at most the timeout and gets
//! [`Error::Timeout`] when it expires. The worker checks a cancellable
//! [`Stopper`] with the same deadline between stages, so it finishes on its
//! own and drops everything it owns. Its buffers are never handed back, so the next call starts from a
//! fresh pool.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;

use almost_enough::{Stopper, TimeoutExt};
use enough::{Stop, Unstoppable};

use crate::compose::Compositor;
use crate::decode::Decoder;
use crate::encode::new_encoder;
use crate::error::{Error, Result};
use crate::frame::Framebuffer;
use crate::limits::{DEFAULT_MAX_FRAME_DIMENSION, ResourceLimits};
use crate::options::ImageOptions;
use crate::resize::{ResizePlan, Transformer};
use crate::{CodecCapabilities, Orientation};

/// Buffers reused from frame to frame and from call to call.
#[derive(Debug)]
struct FramePool {
    patch: Framebuffer,
    compositor: Compositor,
    transformer: Transformer,
}

impl FramePool {
    fn new(max_dimension: u32) -> Self {
        Self {
            patch: Framebuffer::with_capacity(max_dimension),
            compositor: Compositor::with_capacity(max_dimension),
            transformer: Transformer::with_capacity(max_dimension),
        }
    }
}

/// Reusable transcoder.
///
/// `max_dimension` pre-sizes the frame buffers; larger frames still work
/// and grow the buffers. Geometry, frame count and output size are bounded
/// by [`ResourceLimits`].
///
/// # Example
///
/// ```
/// use zentranscode::{ImageFormat, ImageOps, ImageOptions, new_decoder, ResourceLimits};
/// # fn main() -> zentranscode::Result<()> {
/// # let gif = {
/// #     let mut out = Vec::new();
/// #     let mut enc = gif::Encoder::new(&mut out, 2, 2, &[0, 0, 0, 255, 255, 255]).unwrap();
/// #     enc.write_frame(&gif::Frame::from_indexed_pixels(2, 2, &[0u8, 1, 1, 0][..], None)).unwrap();
/// #     drop(enc);
/// #     out
/// # };
/// let mut ops = ImageOps::new(256);
/// let decoder = new_decoder(gif, ResourceLimits::default())?;
/// let png = ops.transform(decoder, &ImageOptions::new(ImageFormat::Png), Vec::new())?;
/// assert_eq!(ImageFormat::detect(&png), Some(ImageFormat::Png));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ImageOps {
    max_dimension: u32,
    limits: ResourceLimits,
    pool: Option<FramePool>,
}

impl ImageOps {
    /// A transcoder whose buffers are pre-sized for `max_dimension`² frames.
    ///
    /// The hint is capped at [`DEFAULT_MAX_FRAME_DIMENSION`].
    pub fn new(max_dimension: u32) -> Self {
        let max_dimension = max_dimension.min(DEFAULT_MAX_FRAME_DIMENSION);
        Self {
            max_dimension,
            limits: ResourceLimits::default(),
            pool: Some(FramePool::new(max_dimension)),
        }
    }

    /// Replace the resource limits.
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Transcode everything `decoder` produces into `opts.file_type`.
    ///
    /// `dst` is cleared and reused for the output. Animated sources stay
    /// animated when the target format can animate and
    /// `disable_animated_output` is off; otherwise only the first
    /// composited frame is encoded.
    #[tracing::instrument(skip_all, fields(source = decoder.description(), target = %opts.file_type))]
    pub fn transform(
        &mut self,
        decoder: Box<dyn Decoder>,
        opts: &ImageOptions,
        dst: Vec<u8>,
    ) -> Result<Vec<u8>> {
        let mut pool = self
            .pool
            .take()
            .unwrap_or_else(|| FramePool::new(self.max_dimension));
        let Some(timeout) = opts.encode_timeout else {
            let result = run(&mut pool, decoder, opts, &self.limits, dst, &Unstoppable);
            self.pool = Some(pool);
            return result;
        };

        let stop = Stopper::new();
        let worker_stop = stop.clone().with_timeout(timeout);
        let worker_opts = opts.clone();
        let limits = self.limits;
        let (tx, rx) = mpsc::sync_channel(1);
        thread::Builder::new()
            .name("zentranscode-worker".into())
            .spawn(move || {
                let result = run(&mut pool, decoder, &worker_opts, &limits, dst, &worker_stop);
                // The caller may have stopped waiting; the pool is dropped then.
                let _ = tx.send((result, pool));
            })
            .map_err(|err| {
                tracing::warn!(%err, "failed to spawn transcode worker");
                Error::WorkerLost
            })?;

        match rx.recv_timeout(timeout) {
            Ok((result, pool)) => {
                self.pool = Some(pool);
                result
            }
            Err(RecvTimeoutError::Timeout) => {
                stop.cancel();
                tracing::warn!(?timeout, "transcode timed out, abandoning worker");
                Err(Error::Timeout)
            }
            Err(RecvTimeoutError::Disconnected) => {
                tracing::warn!("transcode worker exited without a result");
                Err(Error::WorkerLost)
            }
        }
    }
}

fn run(
    pool: &mut FramePool,
    mut decoder: Box<dyn Decoder>,
    opts: &ImageOptions,
    limits: &ResourceLimits,
    dst: Vec<u8>,
    stop: &dyn Stop,
) -> Result<Vec<u8>> {
    stop.check()?;
    let header = decoder.header()?;
    limits.check_header(&header).map_err(Error::FrameTooLarge)?;

    let caps = CodecCapabilities::for_format(opts.file_type);
    let animate =
        !opts.disable_animated_output && caps.encode_animation() && header.is_animated();
    let orientation = if opts.normalize_orientation {
        header.orientation
    } else {
        Orientation::Normal
    };
    let (display_w, display_h) = orientation.display_dimensions(header.width, header.height);
    let plan = ResizePlan::new(
        display_w,
        display_h,
        opts.width,
        opts.height,
        opts.resize_method,
    );
    let (out_w, out_h) = plan.output_dimensions();
    limits
        .check_dimensions(out_w, out_h)
        .map_err(Error::FrameTooLarge)?;
    tracing::debug!(
        width = header.width,
        height = header.height,
        frames = header.frame_count,
        animate,
        ?orientation,
        output = ?plan.output_dimensions(),
        "transcode planned"
    );

    let background = decoder.background_color()?;
    pool.compositor.reset(header.width, header.height, background);
    let mut encoder = new_encoder(opts.file_type, Some(&mut *decoder), dst)?;

    let mut frames = 0u32;
    loop {
        stop.check()?;
        match decoder.frame_header() {
            Ok(_) => {}
            Err(err) if err.is_end_of_stream() => break,
            Err(err) => return Err(err),
        }
        limits.check_frames(frames + 1).map_err(Error::LimitExceeded)?;
        decoder.decode_to(&mut pool.patch)?;
        frames += 1;

        let canvas = pool.compositor.composite(&pool.patch)?;
        stop.check()?;
        let out = pool.transformer.apply(canvas, orientation, &plan)?;
        encoder.set_source_palette(decoder.frame_palette());
        encoder.add_frame(out, &opts.encode_options)?;
        tracing::trace!(frame = frames, duration = ?out.duration, "frame encoded");
        if !animate {
            break;
        }
    }
    if frames == 0 {
        return Err(Error::InvalidImage);
    }

    stop.check()?;
    let out = encoder.finish()?;
    limits
        .check_output_size(out.len() as u64)
        .map_err(|err| {
            tracing::debug!(%err, "output over budget");
            Error::BufferTooSmall
        })?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{fixtures, new_decoder};
    use crate::frame::{Disposal, rgba_from_argb};
    use crate::info::{AnimationInfo, ImageHeader};
    use crate::resize::ResizeMethod;
    use crate::ImageFormat;
    use rgb::RGBA8;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn decoder(data: Vec<u8>) -> Box<dyn Decoder> {
        new_decoder(data, ResourceLimits::default()).unwrap()
    }

    fn transcode(ops: &mut ImageOps, data: Vec<u8>, opts: &ImageOptions) -> Result<Vec<u8>> {
        ops.transform(decoder(data), opts, Vec::new())
    }

    /// Decode `data` to (frame count, total duration, first frame size).
    fn inspect(data: Vec<u8>) -> (u32, Duration, (u32, u32)) {
        let mut dec = decoder(data);
        let mut fb = Framebuffer::default();
        let mut frames = 0;
        let mut total = Duration::ZERO;
        let mut size = (0, 0);
        while dec.decode_to(&mut fb).is_ok() {
            if frames == 0 {
                size = fb.dimensions();
            }
            frames += 1;
            total += fb.duration;
        }
        (frames, total, size)
    }

    /// Frames served from memory with a chosen header.
    struct Synthetic {
        header: ImageHeader,
        frames: Vec<Framebuffer>,
        next: usize,
        decoded: Arc<AtomicUsize>,
    }

    impl Synthetic {
        fn new(header: ImageHeader, frames: Vec<Framebuffer>) -> Self {
            Self {
                header,
                frames,
                next: 0,
                decoded: Arc::default(),
            }
        }
    }

    impl Decoder for Synthetic {
        fn format(&self) -> ImageFormat {
            ImageFormat::Png
        }
        fn header(&mut self) -> Result<ImageHeader> {
            Ok(self.header)
        }
        fn frame_header(&mut self) -> Result<ImageHeader> {
            let f = self.frames.get(self.next).ok_or(Error::EndOfStream)?;
            Ok(ImageHeader::new(f.width(), f.height()))
        }
        fn decode_to(&mut self, frame: &mut Framebuffer) -> Result<()> {
            let f = self.frames.get(self.next).ok_or(Error::EndOfStream)?;
            frame.resize(f.width(), f.height());
            frame.pixels_mut().copy_from_slice(f.pixels());
            frame.copy_metadata_from(f);
            self.next += 1;
            self.decoded.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
        fn skip_frame(&mut self) -> Result<()> {
            self.next += 1;
            Ok(())
        }
        fn animation(&mut self) -> Result<AnimationInfo> {
            Ok(AnimationInfo::still())
        }
        fn icc(&self) -> Option<&[u8]> {
            None
        }
    }

    #[test]
    fn gif_to_gif_stays_animated() {
        let mut ops = ImageOps::new(16);
        let out = transcode(&mut ops, fixtures::animated_gif(), &ImageOptions::new(ImageFormat::Gif))
            .unwrap();
        assert_eq!(ImageFormat::detect(&out), Some(ImageFormat::Gif));
        let (frames, total, size) = inspect(out.clone());
        assert_eq!((frames, total, size), (3, Duration::from_millis(300), (4, 4)));
        assert_eq!(decoder(out).loop_count().unwrap(), 0);
    }

    #[test]
    fn gif_to_png_becomes_apng() {
        let mut ops = ImageOps::new(16);
        let out = transcode(&mut ops, fixtures::animated_gif(), &ImageOptions::new(ImageFormat::Png))
            .unwrap();
        let mut dec = decoder(out.clone());
        assert_eq!(dec.description(), "APNG");
        assert_eq!(dec.loop_count().unwrap(), 0);
        assert_eq!(inspect(out), (3, Duration::from_millis(300), (4, 4)));
    }

    #[test]
    fn gif_to_jpeg_is_first_frame() {
        let mut ops = ImageOps::new(16);
        let out = transcode(&mut ops, fixtures::animated_gif(), &ImageOptions::new(ImageFormat::Jpeg))
            .unwrap();
        let mut dec = decoder(out);
        assert_eq!(dec.frame_count().unwrap(), 1);
        let mut fb = Framebuffer::default();
        dec.decode_to(&mut fb).unwrap();
        assert!(
            fb.pixels().iter().all(|p| p.r > 240 && p.g < 16 && p.b < 16),
            "{:?}",
            fb.pixels()[0]
        );
    }

    #[test]
    fn disabled_animation_emits_one_frame() {
        let mut ops = ImageOps::new(16);
        let opts = ImageOptions::new(ImageFormat::Gif).with_disable_animated_output(true);
        let out = transcode(&mut ops, fixtures::animated_gif(), &opts).unwrap();
        assert_eq!(inspect(out).0, 1);
    }

    #[test]
    fn zero_size_keeps_native_dimensions() {
        let mut ops = ImageOps::new(16);
        let opts = ImageOptions::new(ImageFormat::Png).with_size(0, 0);
        let out = transcode(&mut ops, fixtures::png(7, 3, [1, 2, 3, 255]), &opts).unwrap();
        assert_eq!(inspect(out).2, (7, 3));
    }

    #[test]
    fn fit_stays_within_box() {
        let mut ops = ImageOps::new(16);
        let opts = ImageOptions::new(ImageFormat::Png)
            .with_size(4, 4)
            .with_resize_method(ResizeMethod::Fit);
        let out = transcode(&mut ops, fixtures::png(8, 4, [9, 9, 9, 255]), &opts).unwrap();
        assert_eq!(inspect(out).2, (4, 2));
    }

    #[test]
    fn stretch_hits_exact_size() {
        let mut ops = ImageOps::new(16);
        let opts = ImageOptions::new(ImageFormat::Gif)
            .with_size(3, 7)
            .with_resize_method(ResizeMethod::Stretch);
        let out = transcode(&mut ops, fixtures::animated_gif(), &opts).unwrap();
        let (frames, _, size) = inspect(out);
        assert_eq!((frames, size), (3, (3, 7)));
    }

    #[test]
    fn orientation_normalized_unless_disabled() {
        let mut frame = Framebuffer::new(3, 2);
        frame.fill(RGBA8::new(0, 0, 255, 255));
        let source = || {
            Box::new(Synthetic::new(
                ImageHeader::new(3, 2).with_orientation(Orientation::Rotate90),
                vec![frame.clone()],
            ))
        };
        let mut ops = ImageOps::new(8);
        let opts = ImageOptions::new(ImageFormat::Png);
        let out = ops.transform(source(), &opts, Vec::new()).unwrap();
        assert_eq!(inspect(out).2, (2, 3));

        let opts = opts.with_normalize_orientation(false);
        let out = ops.transform(source(), &opts, Vec::new()).unwrap();
        assert_eq!(inspect(out).2, (3, 2));
    }

    #[test]
    fn patches_are_composited_before_encoding() {
        let mut base = Framebuffer::new(4, 4);
        base.fill(RGBA8::new(255, 0, 0, 255));
        base.disposal = Disposal::DoNotDispose;
        let mut dot = Framebuffer::new(1, 1);
        dot.fill(RGBA8::new(0, 255, 0, 255));
        dot.x_offset = 3;
        dot.y_offset = 3;
        let source = Synthetic::new(ImageHeader::new(4, 4).with_frame_count(2), vec![base, dot]);
        let mut ops = ImageOps::new(8);
        let opts = ImageOptions::new(ImageFormat::Gif);
        let out = ops.transform(Box::new(source), &opts, Vec::new()).unwrap();

        let mut dec = decoder(out);
        let mut fb = Framebuffer::default();
        dec.skip_frame().unwrap();
        dec.decode_to(&mut fb).unwrap();
        // the encoder writes full canvases, so the second frame still shows the base
        assert_eq!(fb.dimensions(), (4, 4));
        let (base, dot) = (fb.pixels()[0], fb.pixels()[15]);
        assert!(base.r > 240 && base.g < 16, "{base:?}");
        assert!(dot.g > 240 && dot.r < 16, "{dot:?}");
    }

    #[test]
    fn empty_source_is_invalid() {
        let source = Synthetic::new(ImageHeader::new(2, 2), Vec::new());
        let mut ops = ImageOps::new(8);
        let err = ops
            .transform(Box::new(source), &ImageOptions::new(ImageFormat::Png), Vec::new())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidImage));
    }

    #[test]
    fn oversized_header_is_frame_too_large() {
        let source = Synthetic::new(ImageHeader::new(20_000, 10), Vec::new());
        let mut ops = ImageOps::new(8);
        let err = ops
            .transform(Box::new(source), &ImageOptions::new(ImageFormat::Png), Vec::new())
            .unwrap_err();
        assert_eq!(err.to_string(), "frame too large: width 20000 exceeds limit 10000");
    }

    #[test]
    fn frame_and_output_limits() {
        let mut ops = ImageOps::new(16).with_limits(ResourceLimits::default().with_max_frames(2));
        let err = transcode(&mut ops, fixtures::animated_gif(), &ImageOptions::new(ImageFormat::Gif))
            .unwrap_err();
        assert!(matches!(err, Error::LimitExceeded(_)));

        let mut ops = ImageOps::new(16).with_limits(ResourceLimits::default().with_max_output(16));
        let err = transcode(&mut ops, fixtures::animated_gif(), &ImageOptions::new(ImageFormat::Png))
            .unwrap_err();
        assert!(matches!(err, Error::BufferTooSmall));
    }

    #[test]
    fn output_geometry_checked_before_decoding() {
        let source = Synthetic::new(ImageHeader::new(4, 4), vec![Framebuffer::new(4, 4)]);
        let decoded = Arc::clone(&source.decoded);
        let mut ops = ImageOps::new(8);
        let opts = ImageOptions::new(ImageFormat::Png)
            .with_size(60_000, 60_000)
            .with_resize_method(ResizeMethod::Stretch);
        let err = ops.transform(Box::new(source), &opts, Vec::new()).unwrap_err();
        assert!(matches!(err, Error::FrameTooLarge(_)), "{err}");
        assert_eq!(decoded.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn frame_over_limit_is_never_decoded() {
        let frames = (0..3).map(|_| Framebuffer::new(2, 2)).collect();
        let source = Synthetic::new(ImageHeader::new(2, 2).with_frame_count(3), frames);
        let decoded = Arc::clone(&source.decoded);
        let mut ops = ImageOps::new(8).with_limits(ResourceLimits::default().with_max_frames(2));
        let err = ops
            .transform(Box::new(source), &ImageOptions::new(ImageFormat::Gif), Vec::new())
            .unwrap_err();
        assert!(matches!(err, Error::LimitExceeded(_)));
        assert_eq!(decoded.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn gif_local_tables_survive_gif_output() {
        let first = [10, 20, 30, 200, 100, 50];
        let second = [0, 0, 255, 255, 255, 0, 0, 128, 0, 240, 240, 240];
        let data = fixtures::gif_local_palettes(4, 1, &[&first, &second]);
        let mut ops = ImageOps::new(8);
        let out = transcode(&mut ops, data, &ImageOptions::new(ImageFormat::Gif)).unwrap();

        let mut dec = decoder(out);
        let mut fb = Framebuffer::default();
        dec.decode_to(&mut fb).unwrap();
        let expected: Vec<RGBA8> = first
            .chunks_exact(3)
            .cycle()
            .take(4)
            .map(|c| RGBA8::new(c[0], c[1], c[2], 255))
            .collect();
        assert_eq!(fb.pixels(), &expected[..]);
        dec.decode_to(&mut fb).unwrap();
        let expected: Vec<RGBA8> = second
            .chunks_exact(3)
            .map(|c| RGBA8::new(c[0], c[1], c[2], 255))
            .collect();
        assert_eq!(fb.pixels(), &expected[..]);
    }

    #[test]
    fn plan_is_logged() {
        let mut ops = ImageOps::new(16);
        let logs = fixtures::capture_logs(|| {
            transcode(&mut ops, fixtures::animated_gif(), &ImageOptions::new(ImageFormat::Gif))
                .unwrap();
        });
        let planned = logs
            .lines()
            .find(|line| line.contains("transcode planned"))
            .unwrap_or_else(|| panic!("{logs}"));
        assert!(planned.contains("animate=true"), "{planned}");
        assert!(planned.contains("frames=3"), "{planned}");
        assert_eq!(logs.matches("frame encoded").count(), 3, "{logs}");
    }

    #[test]
    fn timeout_abandons_worker() {
        let big = fixtures::gif(
            512,
            512,
            ::gif::Repeat::Infinite,
            &[
                fixtures::GifFrame::full(512, 512, 1, 5),
                fixtures::GifFrame::full(512, 512, 2, 5),
            ],
        );
        let mut ops = ImageOps::new(16);
        let opts = ImageOptions::new(ImageFormat::Gif)
            .with_size(700, 300)
            .with_encode_timeout(Duration::from_nanos(1));
        let err = transcode(&mut ops, big, &opts).unwrap_err();
        assert!(matches!(err, Error::Timeout));

        // a later call still works, on a fresh pool if the worker kept the old one
        let opts = ImageOptions::new(ImageFormat::Png).with_encode_timeout(Duration::from_secs(60));
        let out = transcode(&mut ops, fixtures::animated_gif(), &opts).unwrap();
        assert_eq!(ImageFormat::detect(&out), Some(ImageFormat::Png));
        assert!(ops.pool.is_some());
    }

    #[test]
    fn pool_survives_consecutive_calls() {
        let mut ops = ImageOps::new(4);
        for (w, h) in [(2, 2), (9, 5), (3, 3)] {
            let opts = ImageOptions::new(ImageFormat::Png);
            let out = transcode(&mut ops, fixtures::png(w, h, [5, 6, 7, 255]), &opts).unwrap();
            assert_eq!(inspect(out).2, (w, h));
        }
    }

    #[test]
    fn gif_background_fills_first_canvas() {
        let data = fixtures::gif(
            4,
            4,
            ::gif::Repeat::Infinite,
            &[fixtures::GifFrame {
                left: 1,
                top: 1,
                width: 2,
                height: 2,
                index: 2,
                delay: 1,
                dispose: ::gif::DisposalMethod::Keep,
            }],
        );
        let mut source = decoder(data.clone());
        let background = rgba_from_argb(source.background_color().unwrap());
        let mut ops = ImageOps::new(8);
        let out = transcode(&mut ops, data, &ImageOptions::new(ImageFormat::Png)).unwrap();
        let mut dec = decoder(out);
        let mut fb = Framebuffer::default();
        dec.decode_to(&mut fb).unwrap();
        assert_eq!(fb.pixels()[0], background);
        assert_eq!(fb.pixels()[5], RGBA8::new(0, 255, 0, 255));
    }
}
