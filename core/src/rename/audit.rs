//! `rename-audit`: verify rename outcomes by counting word-boundary
//! occurrences on disk, without touching the LSP.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::plan::load_candidates;
use super::{RenameContext, count_word_occurrences, report};
use crate::error::Result;
use crate::pathkey;
use crate::state;

pub const STATUS_RESOLVED: &str = "resolved";
pub const STATUS_PENDING: &str = "pending";
pub const STATUS_MISSING_FILE: &str = "missing_file";
pub const STATUS_OUT_OF_SCOPE: &str = "out_of_scope";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditResult {
    pub id: usize,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub file: String,
    pub line: u32,
    pub col: u32,
    pub old_name: String,
    pub new_name: String,
    pub old_count: usize,
    pub new_count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSummary {
    pub resolved: usize,
    pub pending: usize,
    pub missing_file: usize,
    pub out_of_scope: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditReport {
    pub app: String,
    pub summary: AuditSummary,
    pub results: Vec<AuditResult>,
}

/// Returns `(exit_code, report)`. Exit is non-zero only in strict mode and
/// only when some candidate is not `resolved`.
pub fn audit(ctx: &RenameContext, strict: bool) -> Result<(i32, AuditReport)> {
    let set = load_candidates(ctx)?;
    let mut report_out = AuditReport {
        app: ctx.app.clone(),
        ..Default::default()
    };

    for (index, candidate) in set.candidates.iter().enumerate() {
        let path = ctx.absolutize(Path::new(&candidate.file));
        let mut result = AuditResult {
            id: index + 1,
            status: String::new(),
            reason: None,
            file: path.display().to_string(),
            line: candidate.line,
            col: candidate.col,
            old_name: candidate.old_name.clone(),
            new_name: candidate.new_name.clone(),
            old_count: 0,
            new_count: 0,
        };

        audit_one(ctx, candidate, &path, &mut result);

        match result.status.as_str() {
            STATUS_RESOLVED => report_out.summary.resolved += 1,
            STATUS_MISSING_FILE => report_out.summary.missing_file += 1,
            STATUS_OUT_OF_SCOPE => report_out.summary.out_of_scope += 1,
            _ => report_out.summary.pending += 1,
        }
        report_out.results.push(result);
    }

    state::save_json(&ctx.layout.rename_audit_report_json(), &report_out)?;
    report::write_audit_md(ctx, &report_out)?;

    let unresolved = report_out.summary.pending
        + report_out.summary.missing_file
        + report_out.summary.out_of_scope;
    let exit = if strict && unresolved > 0 { 1 } else { 0 };
    Ok((exit, report_out))
}

fn audit_one(
    ctx: &RenameContext,
    candidate: &crate::diagnostics::RenameCandidate,
    path: &Path,
    result: &mut AuditResult,
) {
    if !ctx.in_app(path) {
        result.status = STATUS_OUT_OF_SCOPE.to_string();
        return;
    }
    let Ok(text) = std::fs::read_to_string(path) else {
        result.status = STATUS_MISSING_FILE.to_string();
        return;
    };

    result.old_count = count_word_occurrences(&text, &candidate.old_name);
    result.new_count = count_word_occurrences(&text, &candidate.new_name);

    if result.old_count > 0 || result.new_count == 0 {
        result.status = STATUS_PENDING.to_string();
        return;
    }

    // The header itself looks done, but a risky-kind rename can leave the
    // matching implementation files behind.
    if pathkey::is_header(path) && ctx.is_risky_kind(&candidate.symbol_kind) {
        let mut sibling_old = 0usize;
        for sibling in pathkey::sibling_sources(path) {
            if let Ok(sibling_text) = std::fs::read_to_string(&sibling) {
                sibling_old += count_word_occurrences(&sibling_text, &candidate.old_name);
            }
        }
        if sibling_old > 0 {
            result.old_count += sibling_old;
            result.reason = Some("old_name_in_sibling_source".to_string());
            result.status = STATUS_PENDING.to_string();
            return;
        }
    }

    result.status = STATUS_RESOLVED.to_string();
}
