//! `rename-plan`: collect, deduplicate, filter, and persist candidates.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use super::{RenameContext, report};
use crate::diagnostics::{RenameCandidate, dedup_candidates, extract_rename_candidates,
    parse_diagnostics};
use crate::error::{OrchestratorError, Result};
use crate::state;

#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    pub max_candidates: Option<usize>,
}

/// The persisted shape of `rename_candidates.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateSet {
    pub check_name: String,
    pub total: usize,
    pub selected: usize,
    pub truncated: bool,
    pub candidates: Vec<RenameCandidate>,
}

/// Walk the tasks tree in padded-id order, extract and filter candidates,
/// and write `rename_candidates.json` + `rename_plan.md`.
pub fn plan(ctx: &RenameContext, opts: &PlanOptions) -> Result<CandidateSet> {
    let mut collected: Vec<RenameCandidate> = Vec::new();

    for task_log in sorted_task_logs(&ctx.layout.tasks_dir()) {
        let Ok(content) = std::fs::read_to_string(&task_log) else {
            continue;
        };
        let lines: Vec<String> = content.lines().map(str::to_string).collect();
        let diags = parse_diagnostics(&lines);
        let mut candidates = extract_rename_candidates(&diags, &ctx.naming_check);
        candidates.sort_by(|a, b| {
            (&a.file, a.line, a.col).cmp(&(&b.file, b.line, b.col))
        });
        for mut candidate in candidates {
            candidate.task_log = Some(task_log.clone());
            collected.push(candidate);
        }
    }

    let deduped = dedup_candidates(collected, &ctx.app_dir);
    let total = deduped.len();

    let filtered: Vec<RenameCandidate> = deduped
        .into_iter()
        .filter(|candidate| ctx.kind_allowed(&candidate.symbol_kind))
        .filter(|candidate| {
            let abs = ctx.absolutize(Path::new(&candidate.file));
            let inside = ctx.in_app(&abs);
            if !inside {
                tracing::warn!(file = %candidate.file, "candidate outside app dir, dropped");
            }
            inside
        })
        .collect();

    let truncated = opts
        .max_candidates
        .is_some_and(|max| filtered.len() > max);
    let mut candidates = filtered;
    if let Some(max) = opts.max_candidates {
        candidates.truncate(max);
    }

    let set = CandidateSet {
        check_name: ctx.naming_check.clone(),
        total,
        selected: candidates.len(),
        truncated,
        candidates,
    };

    state::save_json(&ctx.layout.rename_candidates_json(), &set)?;
    report::write_plan_md(ctx, &set)?;
    tracing::info!(
        total = set.total,
        selected = set.selected,
        truncated = set.truncated,
        "rename plan written"
    );
    Ok(set)
}

/// Load the candidate set written by `plan`.
pub fn load_candidates(ctx: &RenameContext) -> Result<CandidateSet> {
    let path = ctx.layout.rename_candidates_json();
    let text = std::fs::read_to_string(&path).map_err(|source| OrchestratorError::FileRead {
        path: path.clone(),
        source,
    })?;
    serde_json::from_str(&text)
        .map_err(|e| OrchestratorError::Other(format!("malformed {}: {e}", path.display())))
}

/// `task_*.log` files under `tasks/`, globally sorted by padded file name
/// (which equals id order).
pub fn sorted_task_logs(tasks_dir: &Path) -> Vec<PathBuf> {
    let mut logs: Vec<PathBuf> = WalkDir::new(tasks_dir)
        .into_iter()
        .flatten()
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy();
            name.starts_with("task_") && name.ends_with(".log")
        })
        .map(|entry| entry.into_path())
        .collect();
    logs.sort_by_key(|path| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    logs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::BuildLayout;
    use pretty_assertions::assert_eq;

    fn ctx(build_dir: &Path, app_dir: &Path) -> RenameContext {
        RenameContext {
            app: "demo".to_string(),
            app_dir: app_dir.to_path_buf(),
            layout: BuildLayout::new(build_dir.to_path_buf()),
            naming_check: "readability-identifier-naming".to_string(),
            allowed_kinds: vec!["member".to_string(), "method".to_string()],
            risky_kinds: vec!["method".to_string()],
            skip_header_single_edit: true,
            allowed_roots: vec![app_dir.to_path_buf()],
        }
    }

    fn write_task(tasks_dir: &Path, batch: &str, task: &str, body: &str) {
        let dir = tasks_dir.join(batch);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(task), body).unwrap();
    }

    fn naming_entry(file: &str, line: u32, old: &str, new: &str, kind: &str) -> String {
        format!(
            "{file}:{line}:5: warning: invalid case style for {kind} '{old}' [readability-identifier-naming]\n    | {new}\n"
        )
    }

    #[test]
    fn plan_walks_tasks_in_id_order_and_dedups() {
        let tmp = tempfile::TempDir::new().unwrap();
        let app_dir = tmp.path().join("app");
        std::fs::create_dir_all(app_dir.join("src")).unwrap();
        let build = app_dir.join("build_tidy");
        let ctx = ctx(&build, &app_dir);
        let tasks = ctx.layout.tasks_dir();

        let file = app_dir.join("src/a.hpp");
        write_task(
            &tasks,
            "batch_002",
            "task_011.log",
            &naming_entry(&file.display().to_string(), 9, "later_one", "laterOne", "member"),
        );
        write_task(
            &tasks,
            "batch_001",
            "task_001.log",
            &format!(
                "{}{}",
                naming_entry(&file.display().to_string(), 3, "m_x", "mX", "member"),
                naming_entry(&file.display().to_string(), 3, "m_x", "mX", "member")
            ),
        );

        let set = plan(&ctx, &PlanOptions::default()).unwrap();
        assert_eq!(set.total, 2);
        assert_eq!(set.selected, 2);
        assert!(!set.truncated);
        // task_001 candidates come first.
        assert_eq!(set.candidates[0].old_name, "m_x");
        assert_eq!(set.candidates[1].old_name, "later_one");
        assert!(ctx.layout.rename_candidates_json().is_file());
        assert!(ctx.layout.rename_plan_md().is_file());

        let loaded = load_candidates(&ctx).unwrap();
        assert_eq!(loaded.selected, 2);
    }

    #[test]
    fn plan_filters_kinds_and_out_of_app_paths() {
        let tmp = tempfile::TempDir::new().unwrap();
        let app_dir = tmp.path().join("app");
        std::fs::create_dir_all(&app_dir).unwrap();
        let build = app_dir.join("build_tidy");
        let ctx = ctx(&build, &app_dir);
        let tasks = ctx.layout.tasks_dir();

        let inside = app_dir.join("a.hpp");
        let body = format!(
            "{}{}{}",
            naming_entry(&inside.display().to_string(), 1, "ok_one", "okOne", "member"),
            naming_entry(&inside.display().to_string(), 2, "a_param", "aParam", "parameter"),
            naming_entry("/elsewhere/b.hpp", 3, "out_side", "outSide", "member"),
        );
        write_task(&tasks, "batch_001", "task_001.log", &body);

        let set = plan(&ctx, &PlanOptions::default()).unwrap();
        assert_eq!(set.selected, 1);
        assert_eq!(set.candidates[0].old_name, "ok_one");
    }

    #[test]
    fn plan_truncates_to_max_candidates() {
        let tmp = tempfile::TempDir::new().unwrap();
        let app_dir = tmp.path().join("app");
        std::fs::create_dir_all(&app_dir).unwrap();
        let ctx = ctx(&app_dir.join("build_tidy"), &app_dir);
        let tasks = ctx.layout.tasks_dir();

        let file = app_dir.join("a.hpp");
        let mut body = String::new();
        for i in 0..5 {
            body.push_str(&naming_entry(
                &file.display().to_string(),
                i + 1,
                &format!("old_{i}"),
                &format!("new{i}"),
                "member",
            ));
        }
        write_task(&tasks, "batch_001", "task_001.log", &body);

        let set = plan(
            &ctx,
            &PlanOptions {
                max_candidates: Some(2),
            },
        )
        .unwrap();
        assert_eq!(set.selected, 2);
        assert!(set.truncated);
        assert_eq!(set.total, 5);
    }
}
