//! Bounded text snapshots of a project's files for prompts and reports.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::text::{char_len, truncate_chars};
use crate::io::editor::{EntryKind, list_dir};

/// Placeholder used when the code directory holds no readable files.
pub const EMPTY_SNAPSHOT: &str = "No files created yet.";

/// Recursion depth used when collecting files.
const SNAPSHOT_DEPTH: usize = 3;

/// Render up to `max_files` files under `code_dir`, each cut at
/// `max_file_chars` characters with a `... [truncated]` marker.
///
/// Files are taken in listing order (directories first, then by name).
/// Non-UTF-8 files are skipped.
pub fn render_file_snapshot(
    code_dir: &Path,
    max_files: usize,
    max_file_chars: usize,
) -> Result<String> {
    if !code_dir.is_dir() {
        return Ok(EMPTY_SNAPSHOT.to_string());
    }
    let listing = list_dir(code_dir, true, SNAPSHOT_DEPTH, false)
        .with_context(|| format!("list {}", code_dir.display()))?;

    let mut parts = Vec::new();
    let mut included = 0usize;
    for item in listing.items.iter().filter(|i| i.kind == EntryKind::File) {
        if included >= max_files {
            parts.push(format!("\n... and more files (showing first {max_files})"));
            break;
        }
        let path = code_dir.join(&item.path);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) => {
                debug!(path = %path.display(), err = %err, "skipping unreadable file");
                continue;
            }
        };
        let body = if char_len(&content) > max_file_chars {
            format!("{}\n... [truncated]", truncate_chars(&content, max_file_chars))
        } else {
            content
        };
        parts.push(format!("--- {} ---\n{}\n", item.path, body));
        included += 1;
    }

    if parts.is_empty() {
        return Ok(EMPTY_SNAPSHOT.to_string());
    }
    Ok(parts.join("\n"))
}
