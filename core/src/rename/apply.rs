//! `rename-apply`: walk the planned candidates in order and drive each one
//! through the LSP client, preview first.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::plan::load_candidates;
use super::{RenameContext, Renamer, contains_word, find_word_from, report};
use crate::error::Result;
use crate::pathkey;
use crate::state;

pub const REASON_ALREADY_RENAMED: &str = "already_renamed";
pub const REASON_HEADER_SINGLE_EDIT: &str = "skip_risky_header_single_edit";
pub const REASON_NO_EDIT: &str = "no_edit_generated";
pub const REASON_BLOCKED: &str = "out_of_scope_workspace_edit_blocked";

#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    pub limit: Option<usize>,
    pub dry_run: bool,
    pub strict: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyResult {
    pub id: usize,
    /// `applied`, `skipped`, or `failed`.
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub file: String,
    pub line: u32,
    pub col: u32,
    pub old_name: String,
    pub new_name: String,
    pub edit_count: usize,
    pub changed_files: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplySummary {
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyReport {
    pub app: String,
    pub dry_run: bool,
    pub summary: ApplySummary,
    pub results: Vec<ApplyResult>,
}

/// Returns `(exit_code, report)`. Exit is non-zero only in strict mode and
/// only when at least one candidate failed.
pub async fn apply(
    ctx: &RenameContext,
    renamer: &mut dyn Renamer,
    opts: &ApplyOptions,
) -> Result<(i32, ApplyReport)> {
    let set = load_candidates(ctx)?;
    let mut report_out = ApplyReport {
        app: ctx.app.clone(),
        dry_run: opts.dry_run,
        ..Default::default()
    };

    let limit = opts.limit.unwrap_or(usize::MAX);
    for (index, candidate) in set.candidates.iter().take(limit).enumerate() {
        let id = index + 1;
        let path = ctx.absolutize(Path::new(&candidate.file));
        let mut result = ApplyResult {
            id,
            status: String::new(),
            reason: None,
            file: path.display().to_string(),
            line: candidate.line,
            col: candidate.col,
            old_name: candidate.old_name.clone(),
            new_name: candidate.new_name.clone(),
            edit_count: 0,
            changed_files: Vec::new(),
        };

        apply_one(ctx, renamer, opts, candidate, &path, &mut result).await;

        match result.status.as_str() {
            "applied" => report_out.summary.applied += 1,
            "skipped" => report_out.summary.skipped += 1,
            _ => report_out.summary.failed += 1,
        }
        report_out.results.push(result);
    }

    state::save_json(&ctx.layout.rename_apply_report_json(), &report_out)?;
    report::write_apply_md(ctx, &report_out)?;

    let exit = if opts.strict && report_out.summary.failed > 0 {
        1
    } else {
        0
    };
    Ok((exit, report_out))
}

async fn apply_one(
    ctx: &RenameContext,
    renamer: &mut dyn Renamer,
    opts: &ApplyOptions,
    candidate: &crate::diagnostics::RenameCandidate,
    path: &Path,
    result: &mut ApplyResult,
) {
    // 1. Scope and basic validity.
    if !ctx.in_app(path) {
        fail(result, "out_of_scope");
        return;
    }
    let Ok(text) = std::fs::read_to_string(path) else {
        fail(result, "missing_file");
        return;
    };
    if candidate.line == 0 || candidate.col == 0 {
        fail(result, "invalid_position");
        return;
    }

    // 2. Already renamed by an earlier candidate or a previous run.
    if contains_word(&text, &candidate.new_name) && !contains_word(&text, &candidate.old_name) {
        skip(result, REASON_ALREADY_RENAMED);
        return;
    }

    // 3. Authoritative position: trust the reported column only when it
    // points at old_name; otherwise search the line, then the whole file.
    let Some((line, col)) = resolve_position(&text, candidate) else {
        fail(result, "old_name_not_found");
        return;
    };

    // 4. Preview.
    let preview = match renamer
        .rename(path, line, col, &candidate.new_name, true)
        .await
    {
        Ok(preview) => preview,
        Err(e) => {
            fail(result, &e.to_string());
            return;
        }
    };
    if !preview.blocked_files.is_empty() {
        result.changed_files = display_paths(&preview.blocked_files);
        fail(result, REASON_BLOCKED);
        return;
    }
    if !preview.ok {
        let reason = preview.error.unwrap_or_else(|| "rename_failed".to_string());
        fail(result, &reason);
        return;
    }

    // 5. Header-single-edit guard: a one-edit header rename of a risky
    // symbol usually misses the matching .cpp references.
    if ctx.skip_header_single_edit
        && pathkey::is_header(path)
        && ctx.is_risky_kind(&candidate.symbol_kind)
        && preview.edit_count == 1
        && preview.changed_files.iter().all(|f| pathkey::is_header(f))
    {
        result.edit_count = preview.edit_count;
        result.changed_files = display_paths(&preview.changed_files);
        skip(result, REASON_HEADER_SINGLE_EDIT);
        return;
    }

    // 6. Apply (or keep the preview in dry-run mode).
    if opts.dry_run {
        result.status = "applied".to_string();
        result.edit_count = preview.edit_count;
        result.changed_files = display_paths(&preview.changed_files);
        return;
    }

    let outcome = match renamer
        .rename(path, line, col, &candidate.new_name, false)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            fail(result, &e.to_string());
            return;
        }
    };
    if !outcome.blocked_files.is_empty() {
        result.changed_files = display_paths(&outcome.blocked_files);
        fail(result, REASON_BLOCKED);
        return;
    }
    if !outcome.ok {
        let reason = outcome.error.unwrap_or_else(|| "rename_failed".to_string());
        fail(result, &reason);
        return;
    }

    result.edit_count = outcome.edit_count;
    result.changed_files = display_paths(&outcome.changed_files);
    if outcome.edit_count > 0 {
        result.status = "applied".to_string();
    } else {
        skip(result, REASON_NO_EDIT);
    }
}

/// Where `old_name` actually is: the reported `(line, col)` when it points
/// at the identifier, else the first word hit on that line, else the first
/// word hit anywhere in the file.
fn resolve_position(
    text: &str,
    candidate: &crate::diagnostics::RenameCandidate,
) -> Option<(u32, u32)> {
    let lines: Vec<&str> = text.lines().collect();
    let line_index = (candidate.line as usize).checked_sub(1)?;

    if let Some(line_text) = lines.get(line_index) {
        let byte_col = (candidate.col as usize).saturating_sub(1);
        if line_text
            .get(byte_col..)
            .is_some_and(|rest| rest.starts_with(&candidate.old_name))
        {
            return Some((candidate.line, candidate.col));
        }
        if let Some(found) = find_word_from(line_text, &candidate.old_name, 0) {
            return Some((candidate.line, found as u32 + 1));
        }
    }

    let offset = find_word_from(text, &candidate.old_name, 0)?;
    let mut line_number = 1u32;
    let mut line_start = 0usize;
    for (index, byte) in text.bytes().enumerate() {
        if index == offset {
            break;
        }
        if byte == b'\n' {
            line_number += 1;
            line_start = index + 1;
        }
    }
    Some((line_number, (offset - line_start) as u32 + 1))
}

fn fail(result: &mut ApplyResult, reason: &str) {
    result.status = "failed".to_string();
    result.reason = Some(reason.to_string());
}

fn skip(result: &mut ApplyResult, reason: &str) {
    result.status = "skipped".to_string();
    result.reason = Some(reason.to_string());
}

fn display_paths(paths: &[std::path::PathBuf]) -> Vec<String> {
    paths.iter().map(|p| p.display().to_string()).collect()
}
