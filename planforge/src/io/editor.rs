//! Surgical file editing primitives.
//!
//! Each operation either fully succeeds or leaves the filesystem untouched.
//! Errors are typed so a caller (or a follow-up generation request) can see
//! exactly why an edit was refused: how many times a target occurred and on
//! which lines, or whether a whitespace-trimmed target would have matched.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::io::atomic::replace_file;

/// Most candidate line numbers reported for an ambiguous target.
pub const MAX_REPORTED_LINES: usize = 10;

#[derive(Debug, Error)]
pub enum EditError {
    #[error("file not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("file already exists: {} (set overwrite to replace it)", .path.display())]
    AlreadyExists { path: PathBuf },

    #[error("path is a directory: {}", .path.display())]
    IsDirectory { path: PathBuf },

    #[error("not a directory: {}", .path.display())]
    NotADirectory { path: PathBuf },

    #[error("search string must not be empty")]
    EmptyTarget,

    #[error(
        "old_str not found in {}{}",
        .path.display(),
        whitespace_note(.whitespace_hint)
    )]
    NoMatch { path: PathBuf, whitespace_hint: bool },

    #[error(
        "old_str occurs {occurrences} times in {} (lines {}); include more surrounding context",
        .path.display(),
        join_lines(.line_numbers)
    )]
    Ambiguous {
        path: PathBuf,
        occurrences: usize,
        line_numbers: Vec<usize>,
    },

    #[error("anchor not found in {}", .path.display())]
    AnchorNotFound { path: PathBuf },

    #[error(
        "anchor occurs {occurrences} times in {} (lines {}); provide a more specific anchor",
        .path.display(),
        join_lines(.line_numbers)
    )]
    AnchorAmbiguous {
        path: PathBuf,
        occurrences: usize,
        line_numbers: Vec<usize>,
    },

    #[error("invalid search pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("{op} {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn whitespace_note(hint: &bool) -> &'static str {
    if *hint {
        " (a whitespace-trimmed version exists; check indentation and line endings)"
    } else {
        ""
    }
}

fn join_lines(lines: &[usize]) -> String {
    lines
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn io_err<'a>(op: &'static str, path: &'a Path) -> impl FnOnce(io::Error) -> EditError + 'a {
    move |source| EditError::Io {
        op,
        path: path.to_path_buf(),
        source,
    }
}

/// Outcome of a successful mutation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EditReport {
    pub path: PathBuf,
    pub message: String,
}

impl EditReport {
    fn new(path: &Path, message: String) -> Self {
        Self {
            path: path.to_path_buf(),
            message,
        }
    }
}

/// Create `path` (and its parents) with `content`.
///
/// An existing file is replaced only when `overwrite` is set.
pub fn create_file(path: &Path, content: &str, overwrite: bool) -> Result<EditReport, EditError> {
    if path.is_dir() {
        return Err(EditError::IsDirectory {
            path: path.to_path_buf(),
        });
    }
    let existed = path.exists();
    if existed && !overwrite {
        return Err(EditError::AlreadyExists {
            path: path.to_path_buf(),
        });
    }
    replace_file(path, content.as_bytes()).map_err(io_err("write", path))?;
    let verb = if existed { "Overwrote" } else { "Created" };
    Ok(EditReport::new(
        path,
        format!("{verb} {} ({} bytes)", path.display(), content.len()),
    ))
}

/// A line range read from a file.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FileContent {
    pub path: PathBuf,
    pub content: String,
    pub total_lines: usize,
    /// First line returned (1-indexed); 0 for an empty file.
    pub start_line: usize,
    /// Last line returned (inclusive); 0 for an empty file.
    pub end_line: usize,
}

/// Read lines `start_line..=end_line` (1-indexed). Missing bounds mean the
/// whole file; out-of-range bounds are clamped.
pub fn read_file(
    path: &Path,
    start_line: Option<usize>,
    end_line: Option<usize>,
) -> Result<FileContent, EditError> {
    let text = read_existing(path)?;
    let lines: Vec<&str> = text.lines().collect();
    let total_lines = lines.len();
    if total_lines == 0 {
        return Ok(FileContent {
            path: path.to_path_buf(),
            content: String::new(),
            total_lines,
            start_line: 0,
            end_line: 0,
        });
    }
    let start = start_line.unwrap_or(1).clamp(1, total_lines);
    let end = end_line.unwrap_or(total_lines).clamp(start, total_lines);
    Ok(FileContent {
        path: path.to_path_buf(),
        content: lines[start - 1..end].join("\n"),
        total_lines,
        start_line: start,
        end_line: end,
    })
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SearchMatch {
    pub line_number: usize,
    pub line: String,
    pub context_before: Vec<String>,
    pub context_after: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SearchReport {
    pub path: PathBuf,
    pub query: String,
    pub matches: Vec<SearchMatch>,
}

/// Find every line matching `query` (literal or regex) with surrounding context.
pub fn search_in_file(
    path: &Path,
    query: &str,
    is_regex: bool,
    context_lines: usize,
) -> Result<SearchReport, EditError> {
    let pattern = if is_regex {
        query.to_string()
    } else {
        regex::escape(query)
    };
    let re = Regex::new(&pattern).map_err(|source| EditError::InvalidPattern {
        pattern: query.to_string(),
        source,
    })?;
    let text = read_existing(path)?;
    let lines: Vec<&str> = text.lines().collect();

    let matches = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| re.is_match(line))
        .map(|(idx, line)| {
            let before_start = idx.saturating_sub(context_lines);
            let after_end = (idx + 1 + context_lines).min(lines.len());
            SearchMatch {
                line_number: idx + 1,
                line: (*line).to_string(),
                context_before: lines[before_start..idx]
                    .iter()
                    .map(|l| (*l).to_string())
                    .collect(),
                context_after: lines[idx + 1..after_end]
                    .iter()
                    .map(|l| (*l).to_string())
                    .collect(),
            }
        })
        .collect();

    Ok(SearchReport {
        path: path.to_path_buf(),
        query: query.to_string(),
        matches,
    })
}

/// Replace the single occurrence of `old` with `new`.
///
/// Zero or multiple occurrences leave the file byte-for-byte unchanged.
pub fn str_replace(path: &Path, old: &str, new: &str) -> Result<EditReport, EditError> {
    if old.is_empty() {
        return Err(EditError::EmptyTarget);
    }
    let text = read_existing(path)?;
    let positions: Vec<usize> = text.match_indices(old).map(|(idx, _)| idx).collect();
    match positions.len() {
        0 => {
            let trimmed = old.trim();
            let whitespace_hint = trimmed != old && !trimmed.is_empty() && text.contains(trimmed);
            Err(EditError::NoMatch {
                path: path.to_path_buf(),
                whitespace_hint,
            })
        }
        1 => {
            let line = line_of(&text, positions[0]);
            let updated = text.replacen(old, new, 1);
            replace_file(path, updated.as_bytes()).map_err(io_err("write", path))?;
            Ok(EditReport::new(
                path,
                format!("Replaced 1 occurrence at line {line} in {}", path.display()),
            ))
        }
        occurrences => Err(EditError::Ambiguous {
            path: path.to_path_buf(),
            occurrences,
            line_numbers: candidate_lines(&text, &positions),
        }),
    }
}

/// Append `content`, creating the file if needed.
///
/// With `ensure_newline`, a newline is inserted first when the existing
/// content is non-empty and lacks a trailing newline.
pub fn append_to_file(
    path: &Path,
    content: &str,
    ensure_newline: bool,
) -> Result<EditReport, EditError> {
    if path.is_dir() {
        return Err(EditError::IsDirectory {
            path: path.to_path_buf(),
        });
    }
    if !path.exists() {
        replace_file(path, content.as_bytes()).map_err(io_err("write", path))?;
        return Ok(EditReport::new(
            path,
            format!("Created {} and wrote content", path.display()),
        ));
    }
    let mut updated = fs::read(path).map_err(io_err("read", path))?;
    if ensure_newline && !updated.is_empty() && !updated.ends_with(b"\n") {
        updated.push(b'\n');
    }
    updated.extend_from_slice(content.as_bytes());
    replace_file(path, &updated).map_err(io_err("write", path))?;
    Ok(EditReport::new(
        path,
        format!("Appended {} bytes to {}", content.len(), path.display()),
    ))
}

/// Insert `content` immediately after the single occurrence of `anchor`.
pub fn insert_after(path: &Path, anchor: &str, content: &str) -> Result<EditReport, EditError> {
    if anchor.is_empty() {
        return Err(EditError::EmptyTarget);
    }
    let text = read_existing(path)?;
    let positions: Vec<usize> = text.match_indices(anchor).map(|(idx, _)| idx).collect();
    match positions.len() {
        0 => Err(EditError::AnchorNotFound {
            path: path.to_path_buf(),
        }),
        1 => {
            let at = positions[0] + anchor.len();
            let mut updated = String::with_capacity(text.len() + content.len());
            updated.push_str(&text[..at]);
            updated.push_str(content);
            updated.push_str(&text[at..]);
            replace_file(path, updated.as_bytes()).map_err(io_err("write", path))?;
            Ok(EditReport::new(
                path,
                format!(
                    "Inserted content after anchor at line {} in {}",
                    line_of(&text, positions[0]),
                    path.display()
                ),
            ))
        }
        occurrences => Err(EditError::AnchorAmbiguous {
            path: path.to_path_buf(),
            occurrences,
            line_numbers: candidate_lines(&text, &positions),
        }),
    }
}

/// Remove a single file. Directories are refused.
pub fn delete_file(path: &Path) -> Result<EditReport, EditError> {
    if !path.exists() {
        return Err(EditError::NotFound {
            path: path.to_path_buf(),
        });
    }
    if path.is_dir() {
        return Err(EditError::IsDirectory {
            path: path.to_path_buf(),
        });
    }
    fs::remove_file(path).map_err(io_err("delete", path))?;
    Ok(EditReport::new(path, format!("Deleted {}", path.display())))
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DirItem {
    pub name: String,
    pub kind: EntryKind,
    /// Path relative to the listed directory, `/`-separated.
    pub path: String,
    /// Size in bytes; `None` for directories.
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DirListing {
    pub path: PathBuf,
    pub items: Vec<DirItem>,
    pub tree: String,
    pub total_files: usize,
    pub total_dirs: usize,
}

/// List a directory as a flat item list plus an indented tree.
///
/// Entries sort directories first, then by case-insensitive name. Hidden
/// (dot-prefixed) entries are skipped unless `include_hidden`. When
/// `recursive`, subdirectories are descended while their depth is below
/// `max_depth` (the directory's own entries are depth 0).
pub fn list_dir(
    path: &Path,
    recursive: bool,
    max_depth: usize,
    include_hidden: bool,
) -> Result<DirListing, EditError> {
    if !path.exists() {
        return Err(EditError::NotFound {
            path: path.to_path_buf(),
        });
    }
    if !path.is_dir() {
        return Err(EditError::NotADirectory {
            path: path.to_path_buf(),
        });
    }

    let root_name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
    let mut walk = DirWalk {
        recursive,
        max_depth,
        include_hidden,
        items: Vec::new(),
        tree_lines: vec![format!("{root_name}/")],
        total_files: 0,
        total_dirs: 0,
    };
    walk.scan(path, "", 0, "")?;

    Ok(DirListing {
        path: path.to_path_buf(),
        items: walk.items,
        tree: walk.tree_lines.join("\n"),
        total_files: walk.total_files,
        total_dirs: walk.total_dirs,
    })
}

struct DirWalk {
    recursive: bool,
    max_depth: usize,
    include_hidden: bool,
    items: Vec<DirItem>,
    tree_lines: Vec<String>,
    total_files: usize,
    total_dirs: usize,
}

impl DirWalk {
    fn scan(
        &mut self,
        dir: &Path,
        rel_prefix: &str,
        depth: usize,
        indent: &str,
    ) -> Result<(), EditError> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(dir).map_err(io_err("read directory", dir))? {
            let entry = entry.map_err(io_err("read directory", dir))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !self.include_hidden && name.starts_with('.') {
                continue;
            }
            let entry_path = entry.path();
            let is_dir = entry_path.is_dir();
            entries.push((is_dir, name, entry_path));
        }
        entries.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| a.1.to_lowercase().cmp(&b.1.to_lowercase()))
        });

        let count = entries.len();
        for (idx, (is_dir, name, entry_path)) in entries.into_iter().enumerate() {
            let is_last = idx + 1 == count;
            let connector = if is_last { "└── " } else { "├── " };
            let rel = if rel_prefix.is_empty() {
                name.clone()
            } else {
                format!("{rel_prefix}/{name}")
            };

            if is_dir {
                self.total_dirs += 1;
                self.tree_lines.push(format!("{indent}{connector}{name}/"));
                self.items.push(DirItem {
                    name,
                    kind: EntryKind::Directory,
                    path: rel.clone(),
                    size: None,
                });
                if self.recursive && depth < self.max_depth {
                    let child_indent = format!("{indent}{}", if is_last { "    " } else { "│   " });
                    self.scan(&entry_path, &rel, depth + 1, &child_indent)?;
                }
            } else {
                self.total_files += 1;
                let size = fs::metadata(&entry_path)
                    .map_err(io_err("stat", &entry_path))?
                    .len();
                self.tree_lines.push(format!("{indent}{connector}{name}"));
                self.items.push(DirItem {
                    name,
                    kind: EntryKind::File,
                    path: rel,
                    size: Some(size),
                });
            }
        }
        Ok(())
    }
}

/// Read an existing regular file as UTF-8 text.
fn read_existing(path: &Path) -> Result<String, EditError> {
    if !path.exists() {
        return Err(EditError::NotFound {
            path: path.to_path_buf(),
        });
    }
    if path.is_dir() {
        return Err(EditError::IsDirectory {
            path: path.to_path_buf(),
        });
    }
    fs::read_to_string(path).map_err(io_err("read", path))
}

/// 1-indexed line containing byte offset `pos`.
fn line_of(text: &str, pos: usize) -> usize {
    text[..pos].matches('\n').count() + 1
}

fn candidate_lines(text: &str, positions: &[usize]) -> Vec<usize> {
    positions
        .iter()
        .take(MAX_REPORTED_LINES)
        .map(|&pos| line_of(text, pos))
        .collect()
}
