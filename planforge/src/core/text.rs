//! Small text helpers shared by plan, action, and prompt handling.

use std::sync::LazyLock;

use regex::Regex;

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*```[A-Za-z0-9_+-]*[ \t]*\r?(?:\n|$)").expect("fence regex")
});

/// Remove Markdown code fence lines (```` ``` ````, ```` ```json ````, ...) and trim.
///
/// Generation backends often wrap their answer in a fenced block even when
/// told not to. Only the fence lines are removed; their content is kept.
pub fn strip_code_fences(text: &str) -> String {
    FENCE_RE.replace_all(text, "").trim().to_string()
}

/// Truncate to at most `max_chars` characters, never splitting a code point.
///
/// Returns the input unchanged (borrowed) when it already fits.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn char_len(text: &str) -> usize {
    text.chars().count()
}
