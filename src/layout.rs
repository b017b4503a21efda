//! Caption line wrapping.
//!
//! Words are accumulated greedily into lines no wider than a pixel budget,
//! as judged by whatever measurement function the caller supplies. Explicit
//! newlines always break, and a blank paragraph survives as an empty line so
//! the band keeps the user's vertical spacing.
//!
//! A word that is wider than the budget on its own is never split: it gets
//! a line to itself and is allowed to overflow.

/// Wrap `text` into lines whose measured width does not exceed `max_width`.
///
/// `measure` returns the pixel width of a candidate string. The candidate
/// tested before each word is appended includes a trailing space, matching
/// how browsers lay out space-separated runs; committed lines are trimmed.
///
/// ```
/// # use caption_band::layout::wrap;
/// let lines = wrap("a bb ccc", 4.0, |s| s.chars().count() as f32);
/// assert_eq!(lines, vec!["a", "bb", "ccc"]);
/// ```
pub fn wrap(text: &str, max_width: f32, measure: impl Fn(&str) -> f32) -> Vec<String> {
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let mut line = String::new();

        for word in paragraph.split_whitespace() {
            let candidate = format!("{line}{word} ");
            if measure(&candidate) > max_width && !line.is_empty() {
                lines.push(line.trim().to_string());
                line = format!("{word} ");
            } else {
                line = candidate;
            }
        }

        lines.push(line.trim().to_string());
    }

    lines
}

/// Wrapped lines for one caption, or nothing at all for an empty caption.
///
/// An empty caption draws no text, while a caption consisting of blank
/// lines keeps them.
pub fn wrap_caption(text: &str, max_width: f32, measure: impl Fn(&str) -> f32) -> Vec<String> {
    if text.is_empty() {
        Vec::new()
    } else {
        wrap(text, max_width, measure)
    }
}
