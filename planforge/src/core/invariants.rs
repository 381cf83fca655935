//! Structural checks on a plan document that parsing alone does not enforce.

use std::collections::HashMap;

use crate::core::plan::parse_steps;

/// Check plan invariants:
/// - Step titles are unique (checking off is keyed by title)
/// - Step titles are non-empty
pub fn validate_plan(document: &str) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for (idx, step) in parse_steps(document).iter().enumerate() {
        let position = idx + 1;
        if step.title.is_empty() {
            errors.push(format!("step {position}: title must not be empty"));
            continue;
        }
        if let Some(first) = seen.get(&step.title) {
            errors.push(format!(
                "duplicate step title '{}' at steps {} and {}",
                step.title, first, position
            ));
        } else {
            seen.insert(step.title.clone(), position);
        }
    }

    errors
}
