//! Lexical path helpers for workspace containment checks.
//!
//! Containment is decided on path components, so `/ws/proj2` is never
//! considered inside `/ws/proj`.

use std::path::{Component, Path, PathBuf};

/// Resolve `.` and `..` components without touching the filesystem.
///
/// `..` at the root stays at the root; leading `..` on a relative path is kept.
pub fn normalize_lexical(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// True if `candidate` equals `root` or lies beneath it, compared component-wise
/// after lexical normalization of both.
pub fn is_within(root: &Path, candidate: &Path) -> bool {
    normalize_lexical(candidate).starts_with(normalize_lexical(root))
}

/// Join a relative path onto `base`, refusing absolute paths and results that
/// escape `base`.
pub fn join_contained(base: &Path, relative: &Path) -> Option<PathBuf> {
    if relative.is_absolute() || relative.has_root() {
        return None;
    }
    let joined = normalize_lexical(&base.join(relative));
    is_within(base, &joined).then_some(joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_resolves_dots() {
        assert_eq!(
            normalize_lexical(Path::new("/ws/proj/./code/../src")),
            PathBuf::from("/ws/proj/src")
        );
        assert_eq!(normalize_lexical(Path::new("/../a")), PathBuf::from("/a"));
        assert_eq!(normalize_lexical(Path::new("../a")), PathBuf::from("../a"));
    }

    /// Verifies a sibling directory sharing a string prefix is not contained.
    #[test]
    fn prefix_sibling_is_not_within() {
        let root = Path::new("/ws/proj");
        assert!(is_within(root, Path::new("/ws/proj")));
        assert!(is_within(root, Path::new("/ws/proj/code/src")));
        assert!(!is_within(root, Path::new("/ws/proj2")));
        assert!(!is_within(root, Path::new("/ws/proj2/code")));
        assert!(!is_within(root, Path::new("/ws/proj/../other")));
    }

    #[test]
    fn join_contained_rejects_escapes() {
        let base = Path::new("/ws/proj/code");
        assert_eq!(
            join_contained(base, Path::new("src/app.py")),
            Some(PathBuf::from("/ws/proj/code/src/app.py"))
        );
        assert_eq!(join_contained(base, Path::new("../build_plan.md")), None);
        assert_eq!(join_contained(base, Path::new("/etc/passwd")), None);
    }
}
