//! Character budgets for prompts sent to the generation backend.

use crate::core::text::{char_len, truncate_chars};

/// Marker appended to any prompt cut down to fit the budget.
pub const TRUNCATION_MARKER: &str = "\n\n[... Content truncated due to length ...]";

/// Truncate `text` to `max_chars`, preferring to cut just after the last `.`
/// or newline when that boundary lies past 80% of the allowance.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if char_len(text) <= max_chars {
        return text.to_string();
    }
    let head = truncate_chars(text, max_chars);
    let boundary = head.rfind(['.', '\n']);
    let cut = match boundary {
        Some(idx) if char_len(&head[..idx]) * 5 > max_chars * 4 => &head[..=idx],
        _ => head,
    };
    format!("{cut}{TRUNCATION_MARKER}")
}

/// Fit a system/user prompt pair into `max_chars` total.
///
/// When over budget the system prompt keeps at most a quarter of the budget
/// and the user prompt receives the remainder.
pub fn fit_prompts(system: &str, user: &str, max_chars: usize) -> (String, String) {
    let system_len = char_len(system);
    if system_len + char_len(user) <= max_chars {
        return (system.to_string(), user.to_string());
    }
    let system_chars = system_len.min(max_chars / 4);
    let user_chars = max_chars - system_chars;
    (
        truncate_text(system, system_chars),
        truncate_text(user, user_chars),
    )
}
