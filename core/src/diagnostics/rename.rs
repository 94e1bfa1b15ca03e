//! Rename candidates derived from `readability-identifier-naming`
//! diagnostics.
//!
//! The diagnostic message names the offending symbol (`invalid case style
//! for <kind> '<old>'`); the fix-it display that follows carries the
//! suggested replacement on a `| <identifier>` line. Candidates missing
//! either side, or suggesting the unchanged name, are dropped.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use super::Diagnostic;
use crate::pathkey;

#[allow(clippy::unwrap_used)]
fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap()
}

static CASE_STYLE_RE: LazyLock<Regex> =
    LazyLock::new(|| re(r"invalid case style for ([A-Za-z][A-Za-z ]*?) '([A-Za-z_][A-Za-z0-9_]*)'"));

static SUGGESTION_RE: LazyLock<Regex> =
    LazyLock::new(|| re(r"\|\s*([A-Za-z_][A-Za-z0-9_]*)\s*$"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenameCandidate {
    pub file: String,
    pub line: u32,
    pub col: u32,
    pub old_name: String,
    pub new_name: String,
    pub symbol_kind: String,
    /// The task log this candidate was extracted from, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_log: Option<PathBuf>,
}

/// Deduplication key: `(normalized-absolute-path, line, col, new_name)`.
pub fn candidate_key(candidate: &RenameCandidate, base: &Path) -> (String, u32, u32, String) {
    let abs = pathkey::absolutize(Path::new(&candidate.file), base);
    (
        pathkey::path_key(&abs),
        candidate.line,
        candidate.col,
        candidate.new_name.clone(),
    )
}

/// Keep only diagnostics of the configured naming check and pull a complete
/// candidate out of each.
pub fn extract_rename_candidates(diags: &[Diagnostic], check_name: &str) -> Vec<RenameCandidate> {
    let mut candidates = Vec::new();

    for diag in diags {
        if diag.check != check_name {
            continue;
        }
        let Some(caps) = CASE_STYLE_RE.captures(&diag.message) else {
            continue;
        };
        let symbol_kind = caps[1].trim().to_string();
        let old_name = caps[2].to_string();

        // The header line may itself end in `'old'`; the suggestion only
        // appears in the fix-it display below it.
        let new_name = diag.raw_lines.iter().skip(1).find_map(|raw| {
            let stripped = super::strip_ansi(raw);
            SUGGESTION_RE
                .captures(&stripped)
                .map(|suggestion| suggestion[1].to_string())
        });
        let Some(new_name) = new_name else {
            continue;
        };
        if new_name == old_name {
            continue;
        }

        candidates.push(RenameCandidate {
            file: diag.file.clone(),
            line: diag.line,
            col: diag.col,
            old_name,
            new_name,
            symbol_kind,
            task_log: None,
        });
    }

    candidates
}

/// Drop duplicates, first occurrence wins. `base` anchors relative paths.
pub fn dedup_candidates(candidates: Vec<RenameCandidate>, base: &Path) -> Vec<RenameCandidate> {
    let mut seen: HashSet<(String, u32, u32, String)> = HashSet::new();
    candidates
        .into_iter()
        .filter(|candidate| seen.insert(candidate_key(candidate, base)))
        .collect()
}
