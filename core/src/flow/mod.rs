//! The outer control surfaces: the task loop, task archiving, the five-phase
//! flow state machine, and the per-batch composites.

mod batch;
mod clean;
mod tidy_flow;
mod tidy_loop;

pub use batch::{BatchRunOptions, run_tidy_batch, run_tidy_close};
pub use clean::{CleanOptions, CleanOutcome, clean};
pub use tidy_flow::{FlowOptions, run_tidy_flow};
pub use tidy_loop::{LoopOptions, LoopOutcome, run_tidy_loop};

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::diagnostics::{Diagnostic, parse_diagnostics};
use crate::error::Result;
use crate::paths::parse_task_id;

/// Exit code for "blocked by a manual task".
pub const EXIT_BLOCKED: i32 = 2;
/// Exit code for a `tidy-batch` wall-clock timeout.
pub const EXIT_TIMEOUT: i32 = 124;

/// What the loop can do with a task without a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskClass {
    /// No diagnostics at all; archive directly.
    Empty,
    /// Every diagnostic is the configured naming check; the rename pipeline
    /// handles it.
    RenameOnly,
    /// Anything else stops the loop.
    Manual,
}

/// One task file on disk, classified.
#[derive(Debug, Clone)]
pub struct TaskEntry {
    pub id: usize,
    pub path: PathBuf,
    /// Relative to the tasks dir; preserved when archiving.
    pub rel: PathBuf,
    pub class: TaskClass,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn classify_diagnostics(diags: &[Diagnostic], naming_check: &str) -> TaskClass {
    if diags.is_empty() {
        return TaskClass::Empty;
    }
    if diags.iter().all(|diag| diag.check == naming_check) {
        return TaskClass::RenameOnly;
    }
    TaskClass::Manual
}

/// Every `task_*.log` under `tasks_dir`, classified and sorted by id.
pub fn list_tasks(tasks_dir: &Path, naming_check: &str) -> Vec<TaskEntry> {
    let mut entries: Vec<TaskEntry> = Vec::new();
    for walked in walkdir::WalkDir::new(tasks_dir).into_iter().flatten() {
        if !walked.file_type().is_file() {
            continue;
        }
        let name = walked.file_name().to_string_lossy().into_owned();
        let Some(id) = parse_task_id(&name) else {
            continue;
        };
        let path = walked.into_path();
        let rel = path
            .strip_prefix(tasks_dir)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| PathBuf::from(&name));
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        let lines: Vec<String> = content.lines().map(str::to_string).collect();
        let diagnostics = parse_diagnostics(&lines);
        let class = classify_diagnostics(&diagnostics, naming_check);
        entries.push(TaskEntry {
            id,
            path,
            rel,
            class,
            diagnostics,
        });
    }
    entries.sort_by_key(|entry| entry.id);
    entries
}

/// The collaborators the flow machines drive. Production wiring lives in the
/// CLI; tests substitute scripted fakes.
#[async_trait]
pub trait FlowCollaborators {
    /// plan, then apply (strict), then audit (strict); worst exit code wins.
    async fn rename_pipeline(&mut self) -> Result<i32>;
    /// Configure + build + test suite; true on green.
    async fn verify(&mut self) -> Result<bool>;
    /// One full tidy pass, regenerating `tasks/`.
    async fn full_tidy(&mut self) -> Result<i32>;
    /// The clang-tidy-fix pre-pass.
    async fn tidy_fix(&mut self) -> Result<i32>;
    /// `tidy-refresh` for one batch; `None` falls back to the last counted
    /// batch (the `tidy-close` path).
    async fn refresh(&mut self, batch_id: Option<&str>, final_full: bool) -> Result<i32>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn diag(check: &str) -> Diagnostic {
        Diagnostic {
            file: "/a.cpp".to_string(),
            line: 1,
            col: 1,
            severity: crate::diagnostics::Severity::Warning,
            check: check.to_string(),
            message: "m".to_string(),
            raw_lines: vec!["raw".to_string()],
        }
    }

    #[test]
    fn classification_matrix() {
        let naming = "readability-identifier-naming";
        assert_eq!(classify_diagnostics(&[], naming), TaskClass::Empty);
        assert_eq!(
            classify_diagnostics(&[diag(naming), diag(naming)], naming),
            TaskClass::RenameOnly
        );
        assert_eq!(
            classify_diagnostics(&[diag(naming), diag("bugprone-use-after-move")], naming),
            TaskClass::Manual
        );
    }

    #[test]
    fn listing_sorts_by_id_across_batches() {
        let tmp = tempfile::TempDir::new().unwrap();
        let tasks = tmp.path().join("tasks");
        for (batch, task, body) in [
            ("batch_002", "task_011.log", "/x.cpp:1:1: warning: w [bugprone-x]\n"),
            ("batch_001", "task_002.log", ""),
            (
                "batch_001",
                "task_001.log",
                "/x.cpp:1:1: warning: invalid case style for member 'a_b' [readability-identifier-naming]\n    | aB\n",
            ),
        ] {
            let dir = tasks.join(batch);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join(task), body).unwrap();
        }

        let listed = list_tasks(&tasks, "readability-identifier-naming");
        let ids: Vec<usize> = listed.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2, 11]);
        assert_eq!(listed[0].class, TaskClass::RenameOnly);
        assert_eq!(listed[1].class, TaskClass::Empty);
        assert_eq!(listed[2].class, TaskClass::Manual);
        assert_eq!(listed[2].rel, PathBuf::from("batch_002/task_011.log"));
    }
}
