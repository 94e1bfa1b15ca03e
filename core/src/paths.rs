//! On-disk layout of the tidy build directory.
//!
//! ```text
//! <app>/build_tidy/
//!   build.log
//!   .ninja_log
//!   compile_commands.json
//!   tasks/batch_NNN/task_MMM.log, tasks/tasks_summary.md
//!   tasks_done/...
//!   refresh/<batch>/incremental_tidy_NNN.log
//!   rename/rename_candidates.json, rename_plan.md, rename_*_report.{json,md}
//!   batch_state.json / refresh_state.json / flow_state.json
//!   verify_result.json
//! ```

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct BuildLayout {
    build_dir: PathBuf,
}

impl BuildLayout {
    pub fn new(build_dir: PathBuf) -> Self {
        Self { build_dir }
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    pub fn build_log(&self) -> PathBuf {
        self.build_dir.join("build.log")
    }

    pub fn ninja_log(&self) -> PathBuf {
        self.build_dir.join(".ninja_log")
    }

    pub fn cmake_cache(&self) -> PathBuf {
        self.build_dir.join("CMakeCache.txt")
    }

    pub fn compile_commands(&self) -> PathBuf {
        self.build_dir.join("compile_commands.json")
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.build_dir.join("tasks")
    }

    pub fn tasks_done_dir(&self) -> PathBuf {
        self.build_dir.join("tasks_done")
    }

    pub fn tasks_summary(&self) -> PathBuf {
        self.tasks_dir().join("tasks_summary.md")
    }

    pub fn refresh_dir(&self, batch: &str) -> PathBuf {
        self.build_dir.join("refresh").join(batch)
    }

    pub fn rename_dir(&self) -> PathBuf {
        self.build_dir.join("rename")
    }

    pub fn rename_candidates_json(&self) -> PathBuf {
        self.rename_dir().join("rename_candidates.json")
    }

    pub fn rename_plan_md(&self) -> PathBuf {
        self.rename_dir().join("rename_plan.md")
    }

    pub fn rename_apply_report_json(&self) -> PathBuf {
        self.rename_dir().join("rename_apply_report.json")
    }

    pub fn rename_apply_report_md(&self) -> PathBuf {
        self.rename_dir().join("rename_apply_report.md")
    }

    pub fn rename_audit_report_json(&self) -> PathBuf {
        self.rename_dir().join("rename_audit_report.json")
    }

    pub fn rename_audit_report_md(&self) -> PathBuf {
        self.rename_dir().join("rename_audit_report.md")
    }

    pub fn batch_state(&self) -> PathBuf {
        self.build_dir.join("batch_state.json")
    }

    pub fn refresh_state(&self) -> PathBuf {
        self.build_dir.join("refresh_state.json")
    }

    pub fn flow_state(&self) -> PathBuf {
        self.build_dir.join("flow_state.json")
    }

    pub fn verify_result(&self) -> PathBuf {
        self.build_dir.join("verify_result.json")
    }
}

/// `batch_001`-style directory name.
pub fn batch_dir_name(batch_id: usize) -> String {
    format!("batch_{batch_id:03}")
}

/// `task_001.log`-style file name.
pub fn task_file_name(task_id: usize) -> String {
    format!("task_{task_id:03}.log")
}

/// Parse a task id out of `task_NNN.log`.
pub fn parse_task_id(file_name: &str) -> Option<usize> {
    file_name
        .strip_prefix("task_")?
        .strip_suffix(".log")?
        .parse()
        .ok()
}

/// Parse a batch id out of `batch_NNN`.
pub fn parse_batch_id(dir_name: &str) -> Option<usize> {
    dir_name.strip_prefix("batch_")?.parse().ok()
}

/// Accept `3`, `003`, or `batch_003` and return the canonical `batch_003`.
pub fn normalize_batch_name(raw: &str) -> String {
    let digits = raw.strip_prefix("batch_").unwrap_or(raw);
    match digits.parse::<usize>() {
        Ok(n) => batch_dir_name(n),
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_zero_padded() {
        assert_eq!(batch_dir_name(1), "batch_001");
        assert_eq!(batch_dir_name(123), "batch_123");
        assert_eq!(task_file_name(7), "task_007.log");
    }

    #[test]
    fn ids_parse_back() {
        assert_eq!(parse_task_id("task_042.log"), Some(42));
        assert_eq!(parse_task_id("task_xx.log"), None);
        assert_eq!(parse_task_id("notes.md"), None);
        assert_eq!(parse_batch_id("batch_002"), Some(2));
    }

    #[test]
    fn batch_names_normalize() {
        assert_eq!(normalize_batch_name("1"), "batch_001");
        assert_eq!(normalize_batch_name("012"), "batch_012");
        assert_eq!(normalize_batch_name("batch_7"), "batch_007");
        assert_eq!(normalize_batch_name("batch_007"), "batch_007");
    }
}
