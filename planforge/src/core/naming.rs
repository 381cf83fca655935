//! Filesystem-safe project identifiers.

use std::sync::LazyLock;

use regex::Regex;

/// Identifier used when sanitizing leaves nothing behind.
pub const FALLBACK_NAME: &str = "unnamed_project";

/// Maximum identifier length in characters.
pub const MAX_NAME_CHARS: usize = 100;

static UNSAFE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\-]").expect("unsafe char regex"));
static UNDERSCORES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_+").expect("underscore regex"));

/// Map a display name to a directory name.
///
/// Characters other than word characters and `-` become `_`, runs of `_`
/// collapse, leading/trailing `_` are trimmed, and the result is capped at
/// [`MAX_NAME_CHARS`]. Never returns an empty string.
pub fn sanitize_name(name: &str) -> String {
    let replaced = UNSAFE_RE.replace_all(name, "_");
    let collapsed = UNDERSCORES_RE.replace_all(&replaced, "_");
    let trimmed = collapsed.trim_matches('_');
    if trimmed.is_empty() {
        return FALLBACK_NAME.to_string();
    }
    trimmed.chars().take(MAX_NAME_CHARS).collect()
}
