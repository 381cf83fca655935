//! Plan document interpreter.
//!
//! The plan is a Markdown document and the single source of truth for build
//! progress. Each step is a checkbox followed by a bold title:
//!
//! ```text
//! - [ ] **Create entry point**
//!   *File:* `src/main.py`
//!   *Description:* Print a greeting.
//! - [x] **Run it**
//!   *Command:* `python src/main.py`
//! ```
//!
//! A step's body runs until the next step header, the next Markdown heading,
//! or the end of the document. Lines inside fenced code blocks are never
//! headings or step headers. Everything here is pure string handling.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::text::strip_code_fences;
use crate::core::types::{PlanProgress, Step, StepKind};

/// Heading prepended to generated plans that lack one.
pub const PLAN_HEADING: &str = "# Build Plan";

static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*[-*][ \t]+\[([ xX])\][ \t]+\*\*(.+?)\*\*").expect("step header regex")
});

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}[ \t]").expect("heading regex"));

static FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^[ \t]*(?:[-+*][ \t]+)?\*{0,2}(file|command|description|action)\*{0,2}:\*{0,2}[ \t]*(.*)$",
    )
    .expect("field regex")
});

static PLAN_HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#[ \t].*Build Plan").expect("plan heading regex"));

/// A step header located in the document.
struct Header {
    /// Byte offset of the checkbox character (space or `x`).
    mark: usize,
    /// Byte offset just past the closing `**` of the title.
    end: usize,
    /// Byte offset where the whole header match starts.
    start: usize,
    checked: bool,
    title: String,
}

/// Byte ranges covered by fenced code blocks (```` ``` ```` or `~~~`),
/// including the fence lines. An unclosed fence runs to the end.
fn fence_spans(document: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut open: Option<(usize, &str)> = None;
    let mut offset = 0;
    for line in document.split_inclusive('\n') {
        let trimmed = line.trim_start();
        let marker = ["```", "~~~"]
            .into_iter()
            .find(|marker| trimmed.starts_with(marker));
        match (open, marker) {
            (None, Some(marker)) => open = Some((offset, marker)),
            (Some((start, fence)), Some(marker)) if marker == fence => {
                spans.push((start, offset + line.len()));
                open = None;
            }
            _ => {}
        }
        offset += line.len();
    }
    if let Some((start, _)) = open {
        spans.push((start, document.len()));
    }
    spans
}

fn in_fence(spans: &[(usize, usize)], pos: usize) -> bool {
    spans.iter().any(|&(start, end)| start <= pos && pos < end)
}

fn headers(document: &str) -> Vec<Header> {
    let fences = fence_spans(document);
    HEADER_RE
        .captures_iter(document)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            if in_fence(&fences, whole.start()) {
                return None;
            }
            let mark = caps.get(1)?;
            let title = caps.get(2)?;
            Some(Header {
                mark: mark.start(),
                end: whole.end(),
                start: whole.start(),
                checked: !mark.as_str().trim().is_empty(),
                title: title.as_str().trim().to_string(),
            })
        })
        .collect()
}

/// Parse every step in order of appearance.
pub fn parse_steps(document: &str) -> Vec<Step> {
    let headers = headers(document);
    let fences = fence_spans(document);
    let headings: Vec<usize> = HEADING_RE
        .find_iter(document)
        .map(|m| m.start())
        .filter(|&pos| !in_fence(&fences, pos))
        .collect();
    let mut steps = Vec::with_capacity(headers.len());

    for (idx, header) in headers.iter().enumerate() {
        let next_header = headers.get(idx + 1).map_or(document.len(), |h| h.start);
        let next_heading = headings
            .iter()
            .copied()
            .find(|&pos| pos >= header.end)
            .unwrap_or(document.len());
        let body_end = next_header.min(next_heading);
        let body = document[header.end..body_end].trim();
        steps.push(step_from_body(header, body));
    }

    steps
}

fn step_from_body(header: &Header, body: &str) -> Step {
    let fields = parse_fields(body);
    Step {
        checked: header.checked,
        title: header.title.clone(),
        kind: fields.kind(),
        file_path: fields.file,
        command: fields.command,
        description: fields.description,
        body: body.to_string(),
    }
}

/// Labeled fields found in a step body.
#[derive(Debug, Default)]
struct Fields {
    has_file: bool,
    has_command: bool,
    has_action: bool,
    file: Option<String>,
    command: Option<String>,
    description: Option<String>,
}

impl Fields {
    fn kind(&self) -> StepKind {
        if self.has_file && !self.has_command {
            StepKind::File
        } else if self.has_command || self.has_action {
            StepKind::Command
        } else {
            StepKind::Other
        }
    }
}

fn parse_fields(body: &str) -> Fields {
    let mut fields = Fields::default();
    let lines: Vec<&str> = body.lines().collect();

    for (idx, line) in lines.iter().enumerate() {
        let Some(caps) = FIELD_RE.captures(line) else {
            continue;
        };
        let label = caps.get(1).map_or("", |m| m.as_str()).to_ascii_lowercase();
        let value = caps.get(2).map_or("", |m| m.as_str());
        match label.as_str() {
            "file" => {
                fields.has_file = true;
                if fields.file.is_none() {
                    fields.file = inline_value(value);
                }
            }
            "command" => {
                fields.has_command = true;
                if fields.command.is_none() {
                    fields.command = inline_value(value);
                }
            }
            "action" => fields.has_action = true,
            "description" => {
                if fields.description.is_none() {
                    fields.description = description_value(value, &lines[idx + 1..]);
                }
            }
            _ => {}
        }
    }

    fields
}

/// Single-line field value with optional surrounding backticks removed.
fn inline_value(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let value = match raw.strip_prefix('`') {
        Some(rest) => rest.split('`').next().unwrap_or(rest),
        None => raw,
    };
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Description text, continuing over following lines until a blank line,
/// another field, or an emphasized line.
fn description_value(first: &str, rest: &[&str]) -> Option<String> {
    let mut parts = vec![first.trim().to_string()];
    for line in rest {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('*') || FIELD_RE.is_match(line) {
            break;
        }
        parts.push(trimmed.to_string());
    }
    let text = parts.join("\n").trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// Classify a step body by its field markers.
///
/// `file` when a File marker is present without a Command marker, `command`
/// when a Command or Action marker is present, otherwise `other`.
pub fn classify_step(body: &str) -> StepKind {
    parse_fields(body).kind()
}

/// First step whose checkbox is empty.
pub fn find_next_unchecked(document: &str) -> Option<Step> {
    parse_steps(document).into_iter().find(|step| !step.checked)
}

/// Check off the unchecked step titled `title`.
///
/// Only the checkbox character changes; every other byte is preserved. An
/// already-checked or unknown title returns the document unchanged.
pub fn mark_complete(document: &str, title: &str) -> String {
    let title = title.trim();
    let target = headers(document)
        .into_iter()
        .find(|header| !header.checked && header.title == title);

    let mut updated = document.to_string();
    if let Some(header) = target {
        updated.replace_range(header.mark..header.mark + 1, "x");
    }
    updated
}

/// Completed/total counts for the document.
pub fn plan_progress(document: &str) -> PlanProgress {
    let steps = parse_steps(document);
    let total = steps.len();
    let completed = steps.iter().filter(|step| step.checked).count();
    let percent = if total == 0 {
        100.0
    } else {
        completed as f64 * 100.0 / total as f64
    };
    PlanProgress {
        total,
        completed,
        percent,
        all_complete: completed == total,
    }
}

/// Clean up a freshly generated plan: strip code fences and make sure the
/// document starts with a plan heading.
pub fn normalize_generated_plan(raw: &str) -> String {
    let cleaned = strip_code_fences(raw);
    let mut plan = if PLAN_HEADING_RE.is_match(&cleaned) {
        cleaned
    } else {
        format!("{PLAN_HEADING}\n\n{cleaned}")
    };
    if !plan.ends_with('\n') {
        plan.push('\n');
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = "# Build Plan\n\n## Phase 1\n\
- [x] **Create main**\n  *File:* `src/main.py`\n  *Description:* Entry point\n  that prints.\n\
- [ ] **Run main**\n  *Command:* `python src/main.py`\n\
### Notes\nnot part of any step\n\
- [ ] **Review**\n  Look it over.\n";

    #[test]
    fn parse_steps_extracts_fields_in_order() {
        let steps = parse_steps(PLAN);
        let titles: Vec<&str> = steps.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Create main", "Run main", "Review"]);

        assert!(steps[0].checked);
        assert_eq!(steps[0].kind, StepKind::File);
        assert_eq!(steps[0].file_path.as_deref(), Some("src/main.py"));
        assert_eq!(
            steps[0].description.as_deref(),
            Some("Entry point\nthat prints.")
        );

        assert!(!steps[1].checked);
        assert_eq!(steps[1].kind, StepKind::Command);
        assert_eq!(steps[1].command.as_deref(), Some("python src/main.py"));

        assert_eq!(steps[2].kind, StepKind::Other);
    }

    #[test]
    fn body_stops_at_heading() {
        let steps = parse_steps(PLAN);
        assert!(!steps[1].body.contains("not part of any step"));
        assert_eq!(steps[2].body, "Look it over.");
    }

    #[test]
    fn comments_in_code_blocks_do_not_end_the_body() {
        let doc = "- [ ] **Setup**\n```bash\n# create venv\npython -m venv .venv\n```\n\
*Command:* `python -m venv .venv`\n## Next\n- [ ] **Later**\n";
        let steps = parse_steps(doc);
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].kind, StepKind::Command);
        assert_eq!(steps[0].command.as_deref(), Some("python -m venv .venv"));
        assert!(steps[0].body.contains("# create venv"));
        assert!(!steps[0].body.contains("## Next"));
    }

    #[test]
    fn checkboxes_in_code_blocks_are_not_steps() {
        let doc = "- [ ] **Write docs**\n  ~~~markdown\n  - [ ] **Example item**\n  ~~~\n  *File:* `README.md`\n";
        let steps = parse_steps(doc);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].kind, StepKind::File);
        assert_eq!(mark_complete(doc, "Example item"), doc);
    }

    #[test]
    fn classify_accepts_bold_and_bulleted_markers() {
        assert_eq!(classify_step("**File:** a.py"), StepKind::File);
        assert_eq!(classify_step("- *Command:* `ls`"), StepKind::Command);
        assert_eq!(classify_step("*Action:* install deps"), StepKind::Command);
        assert_eq!(
            classify_step("*File:* a.py\n*Command:* python a.py"),
            StepKind::Command
        );
        assert_eq!(classify_step("just prose"), StepKind::Other);
    }

    #[test]
    fn find_next_unchecked_skips_checked_steps() {
        let step = find_next_unchecked(PLAN).expect("unchecked step");
        assert_eq!(step.title, "Run main");
    }

    /// Verifies mark_complete flips exactly one checkbox and nothing else.
    #[test]
    fn mark_complete_changes_only_named_step() {
        let updated = mark_complete(PLAN, "Run main");
        assert_eq!(updated.len(), PLAN.len());
        assert_eq!(updated, PLAN.replacen("- [ ] **Run main**", "- [x] **Run main**", 1));

        let steps = parse_steps(&updated);
        assert!(steps[1].checked);
        assert!(!steps[2].checked);
    }

    #[test]
    fn mark_complete_is_idempotent() {
        let once = mark_complete(PLAN, "Run main");
        let twice = mark_complete(&once, "Run main");
        assert_eq!(once, twice);
        assert_eq!(mark_complete(PLAN, "Missing"), PLAN);
    }

    #[test]
    fn title_with_regex_metacharacters_is_matched_literally() {
        let doc = "- [ ] **Install (deps) [v2]?**\n*Command:* `pip install .`\n";
        let updated = mark_complete(doc, "Install (deps) [v2]?");
        assert!(updated.starts_with("- [x] **Install (deps) [v2]?**"));
    }

    #[test]
    fn plan_progress_counts_steps() {
        let progress = plan_progress(PLAN);
        assert_eq!(progress.total, 3);
        assert_eq!(progress.completed, 1);
        assert!(!progress.all_complete);

        let empty = plan_progress("# Build Plan\n");
        assert_eq!(empty.total, 0);
        assert!((empty.percent - 100.0).abs() < f64::EPSILON);
        assert!(empty.all_complete);
    }

    #[test]
    fn normalize_generated_plan_adds_heading_and_strips_fences() {
        let plan = normalize_generated_plan("```markdown\n- [ ] **A**\n```");
        assert_eq!(plan, "# Build Plan\n\n- [ ] **A**\n");

        let kept = normalize_generated_plan("# 🏗️ Build Plan\n- [ ] **A**\n");
        assert!(kept.starts_with("# 🏗️ Build Plan"));
    }
}
