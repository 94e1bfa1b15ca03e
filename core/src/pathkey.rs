//! Path normalization used for every cross-file comparison.
//!
//! Diagnostics, `compile_commands.json` entries, and rename candidates all
//! carry paths written by different tools on different platforms. Comparison
//! happens on a canonical string key: absolute, `.`/`..` collapsed, forward
//! slashes, lowercased.

use std::path::{Component, Path, PathBuf};

/// Make `path` absolute against `base` and collapse `.` / `..` components
/// without touching the filesystem (the file may not exist yet).
pub fn absolutize(path: &Path, base: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonical comparison key for a path.
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/").to_lowercase()
}

/// Key of the directory containing `path`.
pub fn dir_key(path: &Path) -> String {
    match path.parent() {
        Some(parent) => path_key(parent),
        None => String::new(),
    }
}

/// True when `path` lies within `root` (by normalized key prefix).
pub fn is_under(path: &Path, root: &Path) -> bool {
    let path_k = path_key(path);
    let root_k = path_key(root);
    if root_k.is_empty() {
        return false;
    }
    path_k == root_k || path_k.starts_with(&format!("{root_k}/"))
}

/// True for C/C++ header suffixes.
pub fn is_header(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).as_deref(),
        Some("h" | "hpp" | "hh" | "hxx")
    )
}

/// Sibling implementation files of a header: same stem, `.cpp`/`.cc`/`.cxx`,
/// same directory. Only existing files are returned.
pub fn sibling_sources(header: &Path) -> Vec<PathBuf> {
    let Some(parent) = header.parent() else {
        return Vec::new();
    };
    let Some(stem) = header.file_stem() else {
        return Vec::new();
    };
    ["cpp", "cc", "cxx"]
        .iter()
        .map(|ext| parent.join(format!("{}.{ext}", stem.to_string_lossy())))
        .filter(|p| p.is_file())
        .collect()
}
