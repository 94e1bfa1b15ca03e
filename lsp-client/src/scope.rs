//! Scope guard: every path a workspace edit touches must fall inside one of
//! the configured root directories, or the whole edit is refused.

use std::path::{Component, Path, PathBuf};

/// Canonical comparison key: `.`/`..` collapsed, forward slashes, lowercase.
fn key(path: &Path) -> String {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned.to_string_lossy().replace('\\', "/").to_lowercase()
}

#[derive(Debug, Clone)]
pub struct ScopeGuard {
    root_keys: Vec<String>,
}

impl ScopeGuard {
    /// An empty root list means "allow everything".
    pub fn new(roots: &[PathBuf]) -> Self {
        Self {
            root_keys: roots.iter().map(|root| key(root)).collect(),
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.root_keys.is_empty()
    }

    pub fn allows(&self, path: &Path) -> bool {
        if self.root_keys.is_empty() {
            return true;
        }
        let path_key = key(path);
        self.root_keys.iter().any(|root| {
            path_key == *root || path_key.starts_with(&format!("{root}/"))
        })
    }

    /// Split into (allowed, blocked), preserving order.
    pub fn partition(&self, paths: &[PathBuf]) -> (Vec<PathBuf>, Vec<PathBuf>) {
        let mut allowed = Vec::new();
        let mut blocked = Vec::new();
        for path in paths {
            if self.allows(path) {
                allowed.push(path.clone());
            } else {
                blocked.push(path.clone());
            }
        }
        (allowed, blocked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_inside_a_root_are_allowed() {
        let guard = ScopeGuard::new(&[PathBuf::from("/work/app")]);
        assert!(guard.allows(Path::new("/work/app/src/a.cpp")));
        assert!(guard.allows(Path::new("/work/app")));
        assert!(!guard.allows(Path::new("/work/apprentice/a.cpp")));
        assert!(!guard.allows(Path::new("/other/file.cpp")));
    }

    #[test]
    fn dotdot_cannot_escape() {
        let guard = ScopeGuard::new(&[PathBuf::from("/work/app")]);
        assert!(!guard.allows(Path::new("/work/app/../other/x.cpp")));
    }

    #[test]
    fn comparison_is_case_and_separator_insensitive() {
        let guard = ScopeGuard::new(&[PathBuf::from("C:\\Work\\App")]);
        assert!(guard.allows(Path::new("C:\\Work\\App\\src\\a.cpp")));
    }

    #[test]
    fn empty_roots_allow_everything() {
        let guard = ScopeGuard::new(&[]);
        assert!(guard.is_unrestricted());
        assert!(guard.allows(Path::new("/anywhere/at/all.cpp")));
    }

    #[test]
    fn partition_preserves_order() {
        let guard = ScopeGuard::new(&[PathBuf::from("/app")]);
        let (allowed, blocked) = guard.partition(&[
            PathBuf::from("/app/a.cpp"),
            PathBuf::from("/elsewhere/b.cpp"),
            PathBuf::from("/app/c.hpp"),
        ]);
        assert_eq!(allowed.len(), 2);
        assert_eq!(blocked, vec![PathBuf::from("/elsewhere/b.cpp")]);
    }
}
