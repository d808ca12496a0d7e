//! Blob naming conventions shared by the worker and the storage layer.
//!
//! A resized image is stored under the source blob's name with a `resize_`
//! prefix. The extension is kept verbatim, since the output codec is chosen
//! from that same extension:
//!
//! - `cat.png` → `resize_cat.png`
//! - `2024/holiday.JPEG` → `resize_2024/holiday.JPEG`

/// Prefix prepended to every output blob name.
pub const OUTPUT_PREFIX: &str = "resize_";

/// Derive the destination blob name for a source blob.
pub fn output_file_name(source_file_name: &str) -> String {
    format!("{OUTPUT_PREFIX}{source_file_name}")
}

/// Extension of the final path segment, without the dot.
///
/// Returns `None` when the name has no dot in its last segment or ends in a
/// dot. Dotfiles such as `.png` count as having the extension `png`, which
/// matches how blob names are usually written by uploaders.
pub fn file_extension(name: &str) -> Option<&str> {
    let segment = name.rsplit('/').next().unwrap_or(name);
    let dot = segment.rfind('.')?;
    let ext = &segment[dot + 1..];
    if ext.is_empty() { None } else { Some(ext) }
}
