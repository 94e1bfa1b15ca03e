//! Prioritized task files partitioned out of a tidy build log.

mod partition;
mod score;
mod summary;

pub use partition::{
    PartitionOptions, PartitionStats, partition_build_log, partition_lines,
    remove_empty_batch_dirs, render_task_content,
};
pub use score::{check_weight, file_factor, task_score};
pub use summary::write_tasks_summary;

use std::path::PathBuf;

use crate::diagnostics::Diagnostic;

/// A task before ids are assigned: diagnostics attributed to one file.
#[derive(Debug, Clone)]
pub struct TaskDraft {
    pub file: PathBuf,
    pub diagnostics: Vec<Diagnostic>,
}

/// A scored, id-assigned task ready to be written.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: usize,
    pub file: PathBuf,
    pub score: f64,
    /// Character count of the rendered content; the tie-breaker.
    pub size: usize,
    pub diagnostics: Vec<Diagnostic>,
    pub content: String,
}

impl Task {
    /// Distinct check names in first-seen order.
    pub fn distinct_checks(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for diag in &self.diagnostics {
            if !seen.contains(&diag.check) {
                seen.push(diag.check.clone());
            }
        }
        seen
    }
}
