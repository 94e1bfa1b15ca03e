//! Structured diagnostics extracted from a clang-tidy build log.

mod parser;
mod rename;

pub use parser::{parse_diagnostics, split_sections, strip_ansi};
pub use rename::{RenameCandidate, candidate_key, dedup_candidates, extract_rename_candidates};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// One clang-tidy finding. `raw_lines` keeps the original bytes (ANSI
/// escapes included) for later display; the parsed fields come from the
/// escape-stripped view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub file: String,
    pub line: u32,
    pub col: u32,
    pub severity: Severity,
    /// Never empty: synthesized as `clang-diagnostic-<severity>` when the
    /// output carried no `[check-name]` suffix.
    pub check: String,
    pub message: String,
    pub raw_lines: Vec<String>,
}

/// One ninja progress section: the `[done/total] description` header plus
/// every following line until the next header.
#[derive(Debug, Clone, PartialEq)]
pub struct NinjaSection {
    pub done: u32,
    pub total: u32,
    pub description: String,
    pub lines: Vec<String>,
}
