//! Encoder selection from a file extension.
//!
//! The output codec is always the one implied by the source file's extension:
//! a `.png` upload comes back as PNG, a `.jpeg` as JPEG. There is no
//! transcoding across formats. [`select_encoder`] owns the whole dispatch
//! table; everything downstream matches on [`EncoderKind`].

use std::fmt;

/// Codec family used to serialize a resized image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncoderKind {
    Png,
    Gif,
    Jpeg,
    /// Extension not in the table. Encoding with this kind is a job error.
    Unsupported,
}

/// Recognized extensions and the codec each maps to.
///
/// `jpg` and `jpeg` share the JPEG codec.
const EXTENSION_TABLE: &[(&str, EncoderKind)] = &[
    ("png", EncoderKind::Png),
    ("gif", EncoderKind::Gif),
    ("jpg", EncoderKind::Jpeg),
    ("jpeg", EncoderKind::Jpeg),
];

/// Map a file extension to its encoder.
///
/// A single leading `.` is stripped and matching is case-insensitive, so
/// `".PNG"`, `"png"` and `"Png"` all select [`EncoderKind::Png`]. Anything
/// else, including the empty string, yields [`EncoderKind::Unsupported`].
///
/// ```
/// # use resize_worker::imaging::{EncoderKind, select_encoder};
/// assert_eq!(select_encoder(".JPG"), EncoderKind::Jpeg);
/// assert_eq!(select_encoder("bmp"), EncoderKind::Unsupported);
/// ```
pub fn select_encoder(extension: &str) -> EncoderKind {
    let normalized = extension.strip_prefix('.').unwrap_or(extension);
    EXTENSION_TABLE
        .iter()
        .find(|(ext, _)| ext.eq_ignore_ascii_case(normalized))
        .map(|(_, kind)| *kind)
        .unwrap_or(EncoderKind::Unsupported)
}

/// Extensions [`select_encoder`] recognizes, lower-case and dot-less.
pub fn supported_extensions() -> impl Iterator<Item = &'static str> {
    EXTENSION_TABLE.iter().map(|(ext, _)| *ext)
}

impl EncoderKind {
    /// Select the encoder for a blob or file name by its final extension.
    pub fn from_file_name(name: &str) -> Self {
        crate::naming::file_extension(name)
            .map(select_encoder)
            .unwrap_or(EncoderKind::Unsupported)
    }

    pub fn is_supported(self) -> bool {
        self != EncoderKind::Unsupported
    }

    /// MIME type of the encoded output, `None` for [`EncoderKind::Unsupported`].
    pub fn content_type(self) -> Option<&'static str> {
        match self {
            EncoderKind::Png => Some("image/png"),
            EncoderKind::Gif => Some("image/gif"),
            EncoderKind::Jpeg => Some("image/jpeg"),
            EncoderKind::Unsupported => None,
        }
    }
}

impl fmt::Display for EncoderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EncoderKind::Png => "png",
            EncoderKind::Gif => "gif",
            EncoderKind::Jpeg => "jpeg",
            EncoderKind::Unsupported => "unsupported",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_every_supported_extension_in_any_case() {
        let cases = [
            ("png", EncoderKind::Png),
            ("PNG", EncoderKind::Png),
            (".png", EncoderKind::Png),
            ("gif", EncoderKind::Gif),
            (".GiF", EncoderKind::Gif),
            ("jpg", EncoderKind::Jpeg),
            (".JPG", EncoderKind::Jpeg),
            ("jpeg", EncoderKind::Jpeg),
            ("JPEG", EncoderKind::Jpeg),
        ];
        for (ext, expected) in cases {
            assert_eq!(select_encoder(ext), expected, "extension {ext:?}");
        }
    }

    #[test]
    fn anything_else_is_unsupported() {
        for ext in ["", ".", "bmp", ".bmp", "tiff", "webp", "png.bak", "..png", " png", "jp"] {
            assert_eq!(
                select_encoder(ext),
                EncoderKind::Unsupported,
                "extension {ext:?}"
            );
        }
    }

    #[test]
    fn only_one_leading_dot_is_stripped() {
        assert_eq!(select_encoder("..gif"), EncoderKind::Unsupported);
    }

    #[test]
    fn from_file_name_uses_final_extension() {
        assert_eq!(EncoderKind::from_file_name("cat.png"), EncoderKind::Png);
        assert_eq!(EncoderKind::from_file_name("a.b.JPEG"), EncoderKind::Jpeg);
        assert_eq!(
            EncoderKind::from_file_name("archive.png.zip"),
            EncoderKind::Unsupported
        );
        assert_eq!(EncoderKind::from_file_name("README"), EncoderKind::Unsupported);
        assert_eq!(EncoderKind::from_file_name("photo."), EncoderKind::Unsupported);
    }

    #[test]
    fn content_types() {
        assert_eq!(EncoderKind::Png.content_type(), Some("image/png"));
        assert_eq!(EncoderKind::Gif.content_type(), Some("image/gif"));
        assert_eq!(EncoderKind::Jpeg.content_type(), Some("image/jpeg"));
        assert_eq!(EncoderKind::Unsupported.content_type(), None);
    }

    #[test]
    fn supported_extensions_round_trip_through_selector() {
        let exts: Vec<_> = supported_extensions().collect();
        assert_eq!(exts, ["png", "gif", "jpg", "jpeg"]);
        for ext in exts {
            assert!(select_encoder(ext).is_supported());
        }
    }
}
