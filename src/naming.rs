//! Output filename derivation.
//!
//! Exported files are named after the item's right caption, which is the
//! per-image caption a user types for that photo:
//!
//! - `"Hello, World!"` → `Hello_World.jpg`
//! - `"Île de Ré"` → `Île_de_Ré.jpg`
//! - `""` with source `IMG_0042.HEIC.jpg` → `captioned-IMG_0042.HEIC.jpg`
//!
//! Any run of characters that are not alphanumeric collapses into a single
//! underscore, leading and trailing underscores are trimmed, and the slug is
//! capped at [`MAX_SLUG_CHARS`] characters before the extension. A caption
//! that slugs to nothing (e.g. `"!!!"`) falls back to the source filename.

/// Maximum length of the caption-derived part of a filename, in characters.
pub const MAX_SLUG_CHARS: usize = 50;

/// Prefix of the fallback name used when no caption is available.
const FALLBACK_PREFIX: &str = "captioned-";

/// Filename-safe rendering of arbitrary caption text.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_sep = false;
    for c in text.chars() {
        if c.is_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(c);
        } else {
            pending_sep = true;
        }
    }
    slug
}

/// Slug truncated to [`MAX_SLUG_CHARS`] characters, without a dangling `_`.
pub fn caption_slug(text: &str) -> String {
    let slug: String = slugify(text).chars().take(MAX_SLUG_CHARS).collect();
    slug.trim_end_matches('_').to_string()
}

/// File stem of `filename` (everything before the last `.`), or the whole
/// name when it has no extension.
pub fn file_stem(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(0) | None => filename,
        Some(dot) => &filename[..dot],
    }
}

/// Name for an item's exported output.
///
/// Pure function of the right caption, with the original filename used only
/// when the caption yields no usable slug.
pub fn output_filename(right_caption: &str, original_filename: &str, extension: &str) -> String {
    let slug = caption_slug(right_caption);
    if slug.is_empty() {
        format!("{FALLBACK_PREFIX}{}.{extension}", file_stem(original_filename))
    } else {
        format!("{slug}.{extension}")
    }
}
