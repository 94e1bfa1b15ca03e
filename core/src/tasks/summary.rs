//! `tasks_summary.md` — one row per generated task.

use std::path::Path;

use super::Task;
use crate::error::{OrchestratorError, Result};

pub fn write_tasks_summary(tasks_dir: &Path, tasks: &[Task]) -> Result<()> {
    std::fs::create_dir_all(tasks_dir).map_err(|source| OrchestratorError::DirectoryCreate {
        path: tasks_dir.to_path_buf(),
        source,
    })?;

    let mut out = String::from("# Task summary\n\n");
    out.push_str(&format!("Total tasks: {}\n\n", tasks.len()));
    out.push_str("| id | file | score | checks |\n");
    out.push_str("|---|---|---|---|\n");
    for task in tasks {
        out.push_str(&format!(
            "| {:03} | {} | {:.2} | {} |\n",
            task.id,
            task.file.display(),
            task.score,
            task.distinct_checks().join(", ")
        ));
    }

    let path = tasks_dir.join("tasks_summary.md");
    std::fs::write(&path, out).map_err(|source| OrchestratorError::FileWrite { path, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{Diagnostic, Severity};
    use std::path::PathBuf;

    #[test]
    fn summary_lists_every_task() {
        let tmp = tempfile::TempDir::new().unwrap();
        let diag = Diagnostic {
            file: "/src/a.hpp".to_string(),
            line: 1,
            col: 1,
            severity: Severity::Warning,
            check: "readability-identifier-naming".to_string(),
            message: "m".to_string(),
            raw_lines: vec!["raw".to_string()],
        };
        let tasks = vec![Task {
            id: 1,
            file: PathBuf::from("/src/a.hpp"),
            score: 2.05,
            size: 10,
            diagnostics: vec![diag],
            content: String::new(),
        }];

        write_tasks_summary(tmp.path(), &tasks).unwrap();
        let text = std::fs::read_to_string(tmp.path().join("tasks_summary.md")).unwrap();
        assert!(text.contains("Total tasks: 1"));
        assert!(text.contains("| 001 | /src/a.hpp | 2.05 | readability-identifier-naming |"));
    }
}
