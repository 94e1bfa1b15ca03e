//! The rename pipeline: plan → apply → audit, driven by candidates
//! extracted from identifier-naming diagnostics.

mod apply;
mod audit;
mod plan;
mod report;

pub use apply::{
    ApplyOptions, ApplyReport, ApplyResult, ApplySummary, REASON_ALREADY_RENAMED, apply,
};
pub use audit::{AuditReport, AuditResult, AuditSummary, audit};
pub use plan::{CandidateSet, PlanOptions, load_candidates, plan};

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use tidyctl_lsp_client::ClangdClient;

use crate::config::{AppContext, TidyConfig};
use crate::error::Result;
use crate::paths::BuildLayout;
use crate::pathkey;

pub use tidyctl_lsp_client::RenameOutcome;

/// Everything the three stages share.
#[derive(Debug, Clone)]
pub struct RenameContext {
    pub app: String,
    pub app_dir: PathBuf,
    pub layout: BuildLayout,
    pub naming_check: String,
    pub allowed_kinds: Vec<String>,
    pub risky_kinds: Vec<String>,
    pub skip_header_single_edit: bool,
    pub allowed_roots: Vec<PathBuf>,
}

impl RenameContext {
    pub fn from_app(config: &TidyConfig, app: &AppContext) -> Self {
        Self {
            app: app.name.clone(),
            app_dir: app.app_dir.clone(),
            layout: app.layout.clone(),
            naming_check: config.naming_check.clone(),
            allowed_kinds: config.allowed_symbol_kinds.clone(),
            risky_kinds: config.risky_symbol_kinds.clone(),
            skip_header_single_edit: config.skip_header_single_edit,
            allowed_roots: app.allowed_roots.clone(),
        }
    }

    pub fn is_risky_kind(&self, kind: &str) -> bool {
        self.risky_kinds.iter().any(|k| k == kind)
    }

    pub fn kind_allowed(&self, kind: &str) -> bool {
        self.allowed_kinds.is_empty() || self.allowed_kinds.iter().any(|k| k == kind)
    }

    pub fn in_app(&self, path: &Path) -> bool {
        pathkey::is_under(path, &self.app_dir)
    }

    pub fn absolutize(&self, path: &Path) -> PathBuf {
        pathkey::absolutize(path, &self.app_dir)
    }
}

/// The seam to the LSP client, so the pipeline is testable without clangd.
#[async_trait]
pub trait Renamer: Send {
    async fn rename(
        &mut self,
        path: &Path,
        line: u32,
        col: u32,
        new_name: &str,
        dry_run: bool,
    ) -> Result<RenameOutcome>;
}

#[async_trait]
impl Renamer for tidyctl_lsp_client::ClangdClient {
    async fn rename(
        &mut self,
        path: &Path,
        line: u32,
        col: u32,
        new_name: &str,
        dry_run: bool,
    ) -> Result<RenameOutcome> {
        Ok(ClangdClient::rename(self, path, line, col, new_name, dry_run).await?)
    }
}

// ── Word-boundary scanning ───────────────────────────────────────────────
// Identifiers are plain `[A-Za-z0-9_]` words; a direct scan is both exact
// and immune to regex metacharacter surprises.

fn is_word_byte(byte: u8) -> bool {
    byte == b'_' || byte.is_ascii_alphanumeric()
}

/// Count word-boundary occurrences of `name` in `text`.
pub fn count_word_occurrences(text: &str, name: &str) -> usize {
    let mut count = 0;
    let mut offset = 0;
    while let Some(position) = find_word_from(text, name, offset) {
        count += 1;
        offset = position + name.len();
    }
    count
}

pub fn contains_word(text: &str, name: &str) -> bool {
    find_word_from(text, name, 0).is_some()
}

/// First word-boundary occurrence of `name` at or after `from`.
pub fn find_word_from(text: &str, name: &str, from: usize) -> Option<usize> {
    if name.is_empty() || from > text.len() {
        return None;
    }
    let bytes = text.as_bytes();
    let mut offset = from;
    while let Some(relative) = text[offset..].find(name) {
        let start = offset + relative;
        let end = start + name.len();
        let boundary_before = start == 0 || !is_word_byte(bytes[start - 1]);
        let boundary_after = end >= bytes.len() || !is_word_byte(bytes[end]);
        if boundary_before && boundary_after {
            return Some(start);
        }
        offset = start + 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_boundaries_are_respected() {
        let text = "int foo; int food; int foo_bar; foo(foo);";
        assert_eq!(count_word_occurrences(text, "foo"), 3);
        assert!(contains_word(text, "foo"));
        assert!(!contains_word(text, "fooz"));
        assert!(contains_word(text, "foo_bar"));
    }

    #[test]
    fn substrings_inside_words_do_not_match() {
        assert_eq!(count_word_occurrences("prefoo foobar", "foo"), 0);
        assert_eq!(find_word_from("xfoo foo", "foo", 0), Some(5));
    }

    #[test]
    fn empty_and_out_of_range_inputs() {
        assert_eq!(count_word_occurrences("abc", ""), 0);
        assert_eq!(find_word_from("abc", "abc", 9), None);
    }
}
