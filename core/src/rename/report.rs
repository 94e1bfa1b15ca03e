//! Markdown twins of the JSON rename artifacts, for human review.

use super::apply::ApplyReport;
use super::audit::AuditReport;
use super::plan::CandidateSet;
use super::RenameContext;
use crate::error::{OrchestratorError, Result};

fn write_md(path: &std::path::Path, text: String) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| OrchestratorError::DirectoryCreate {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, text).map_err(|source| OrchestratorError::FileWrite {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_plan_md(ctx: &RenameContext, set: &CandidateSet) -> Result<()> {
    let mut out = String::from("# Rename plan\n\n");
    out.push_str(&format!("App: {}\n", ctx.app));
    out.push_str(&format!("Check: {}\n", set.check_name));
    out.push_str(&format!(
        "Selected: {} of {} extracted{}\n\n",
        set.selected,
        set.total,
        if set.truncated { " (truncated)" } else { "" }
    ));
    out.push_str("| id | file | line:col | kind | rename |\n");
    out.push_str("|---|---|---|---|---|\n");
    for (index, candidate) in set.candidates.iter().enumerate() {
        out.push_str(&format!(
            "| {} | {} | {}:{} | {} | `{}` -> `{}` |\n",
            index + 1,
            candidate.file,
            candidate.line,
            candidate.col,
            candidate.symbol_kind,
            candidate.old_name,
            candidate.new_name,
        ));
    }
    write_md(&ctx.layout.rename_plan_md(), out)
}

pub fn write_apply_md(ctx: &RenameContext, report: &ApplyReport) -> Result<()> {
    let mut out = String::from("# Rename apply report\n\n");
    out.push_str(&format!("App: {}\n", report.app));
    out.push_str(&format!("Dry run: {}\n", report.dry_run));
    out.push_str(&format!(
        "Applied: {} | Skipped: {} | Failed: {}\n\n",
        report.summary.applied, report.summary.skipped, report.summary.failed
    ));
    out.push_str("| id | status | reason | file | line:col | rename | edits |\n");
    out.push_str("|---|---|---|---|---|---|---|\n");
    for result in &report.results {
        out.push_str(&format!(
            "| {} | {} | {} | {} | {}:{} | `{}` -> `{}` | {} |\n",
            result.id,
            result.status,
            result.reason.as_deref().unwrap_or("-"),
            result.file,
            result.line,
            result.col,
            result.old_name,
            result.new_name,
            result.edit_count,
        ));
    }
    write_md(&ctx.layout.rename_apply_report_md(), out)
}

pub fn write_audit_md(ctx: &RenameContext, report: &AuditReport) -> Result<()> {
    let mut out = String::from("# Rename audit report\n\n");
    out.push_str(&format!("App: {}\n", report.app));
    out.push_str(&format!(
        "Resolved: {} | Pending: {} | Missing: {} | Out of scope: {}\n\n",
        report.summary.resolved,
        report.summary.pending,
        report.summary.missing_file,
        report.summary.out_of_scope
    ));
    out.push_str("| id | status | file | line:col | rename | old left | new found |\n");
    out.push_str("|---|---|---|---|---|---|---|\n");
    for result in &report.results {
        out.push_str(&format!(
            "| {} | {} | {} | {}:{} | `{}` -> `{}` | {} | {} |\n",
            result.id,
            result.status,
            result.file,
            result.line,
            result.col,
            result.old_name,
            result.new_name,
            result.old_count,
            result.new_count,
        ));
    }
    write_md(&ctx.layout.rename_audit_report_md(), out)
}
