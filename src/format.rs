//! Image format detection and metadata.

use crate::error::{Error, Result};

/// Container formats the transcoder recognizes.
///
/// Recognition does not imply a codec backend: see
/// [`CodecCapabilities::for_format`](crate::CodecCapabilities::for_format).
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Jpeg,
    WebP,
    Gif,
    Png,
    Avif,
}

impl ImageFormat {
    /// Bytes needed before detection is meaningful for every format.
    pub const MIN_DETECT_BYTES: usize = 12;

    /// Detect format from magic bytes. Returns `None` if unrecognized.
    pub fn detect(data: &[u8]) -> Option<Self> {
        const PNG_SIG: &[u8] = b"\x89PNG\r\n\x1a\n";
        match data {
            [0xFF, 0xD8, 0xFF, ..] => Some(Self::Jpeg),
            _ if data.starts_with(PNG_SIG) => Some(Self::Png),
            [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some(Self::Gif),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some(Self::WebP),
            [_, _, _, _, b'f', b't', b'y', b'p', brand @ ..]
                if brand.starts_with(b"avif") || brand.starts_with(b"avis") =>
            {
                Some(Self::Avif)
            }
            _ => None,
        }
    }

    /// Detect the format of an encoded source, rejecting inputs too short to
    /// carry a header.
    ///
    /// Unrecognized data shorter than [`MIN_DETECT_BYTES`](Self::MIN_DETECT_BYTES)
    /// is [`Error::BufferTooSmall`]; longer unrecognized data is
    /// [`Error::InvalidImage`]. Recognized data shorter than the format's
    /// [`min_header_bytes`](Self::min_header_bytes) is also `BufferTooSmall`.
    pub fn sniff(data: &[u8]) -> Result<Self> {
        match Self::detect(data) {
            Some(format) if data.len() < format.min_header_bytes() => Err(Error::BufferTooSmall),
            Some(format) => Ok(format),
            None if data.len() < Self::MIN_DETECT_BYTES => Err(Error::BufferTooSmall),
            None => Err(Error::InvalidImage),
        }
    }

    /// Detect format from a file extension or file type (case-insensitive).
    ///
    /// A leading `.` is accepted, so `".gif"` and `"gif"` are equivalent.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.strip_prefix('.').unwrap_or(ext);
        let lower = ext.to_ascii_lowercase();
        match lower.as_str() {
            "jpg" | "jpeg" | "jpe" | "jfif" => Some(ImageFormat::Jpeg),
            "webp" => Some(ImageFormat::WebP),
            "gif" => Some(ImageFormat::Gif),
            "png" | "apng" => Some(ImageFormat::Png),
            "avif" => Some(ImageFormat::Avif),
            _ => None,
        }
    }

    /// Smallest input that can hold this format's signature and image header.
    pub fn min_header_bytes(self) -> usize {
        match self {
            ImageFormat::Png => 33,  // 8 sig + 25 IHDR
            ImageFormat::Gif => 13,  // 6 header + 7 LSD
            ImageFormat::WebP => 30, // RIFF(12) + chunk header + VP8X dims
            ImageFormat::Jpeg => 4,  // SOI + first marker
            ImageFormat::Avif => 12, // ftyp box head
        }
    }
}

impl core::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::WebP => "WebP",
            ImageFormat::Gif => "GIF",
            ImageFormat::Png => "PNG",
            ImageFormat::Avif => "AVIF",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_by_magic() {
        let cases: &[(&[u8], Option<ImageFormat>)] = &[
            (&[0xFF, 0xD8, 0xFF, 0xE0], Some(ImageFormat::Jpeg)),
            (b"\x89PNG\r\n\x1a\n", Some(ImageFormat::Png)),
            (b"GIF87a", Some(ImageFormat::Gif)),
            (b"GIF89a\x00\x00", Some(ImageFormat::Gif)),
            (b"GIF88a", None),
            (b"RIFF\x00\x00\x00\x00WEBP", Some(ImageFormat::WebP)),
            (b"RIFF\x00\x00\x00\x00WAVE", None),
            (b"\x00\x00\x00\x18ftypavif", Some(ImageFormat::Avif)),
            (b"\x00\x00\x00\x18ftypavis", Some(ImageFormat::Avif)),
            (b"\x00\x00\x00\x18ftypheic", None),
            (b"nope", None),
            (&[], None),
        ];
        for &(data, expected) in cases {
            assert_eq!(ImageFormat::detect(data), expected, "{data:?}");
        }
    }

    #[test]
    fn sniff_short_inputs_are_buffer_too_small() {
        assert!(matches!(ImageFormat::sniff(&[]), Err(Error::BufferTooSmall)));
        assert!(matches!(ImageFormat::sniff(b"GIF89a"), Err(Error::BufferTooSmall)));
        assert!(matches!(
            ImageFormat::sniff(b"\x89PNG\r\n\x1a\n\0\0\0\x0dIHDR"),
            Err(Error::BufferTooSmall)
        ));
    }

    #[test]
    fn sniff_garbage_is_invalid() {
        assert!(matches!(
            ImageFormat::sniff(b"definitely not an image"),
            Err(Error::InvalidImage)
        ));
    }

    #[test]
    fn sniff_accepts_full_header() {
        let gif = b"GIF89a\x01\x00\x01\x00\x00\x00\x00";
        assert_eq!(ImageFormat::sniff(gif).unwrap(), ImageFormat::Gif);
    }

    #[test]
    fn file_types() {
        for (ext, format) in [
            ("JPG", Some(ImageFormat::Jpeg)),
            ("jfif", Some(ImageFormat::Jpeg)),
            (".gif", Some(ImageFormat::Gif)),
            ("apng", Some(ImageFormat::Png)),
            ("WebP", Some(ImageFormat::WebP)),
            ("avif", Some(ImageFormat::Avif)),
            ("", None),
            (".", None),
            ("tiff", None),
        ] {
            assert_eq!(ImageFormat::from_extension(ext), format, "{ext}");
        }
        assert_eq!(ImageFormat::WebP.to_string(), "WebP");
    }
}
