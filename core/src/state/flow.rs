//! `flow_state.json` — one outer-loop run, checkpointed per phase.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Phase order of `tidy-flow`.
pub const FLOW_PHASES: &[&str] = &["prepare_tasks", "rename", "verify", "loop", "clean"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseResult {
    pub status: String,
    pub exit_code: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowKnobs {
    pub n: Option<usize>,
    pub all: bool,
    pub test_every: usize,
    pub resume: bool,
    pub with_tidy_fix: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowState {
    pub schema_version: u32,
    pub app: Option<String>,
    pub mode: String,
    /// `running`, then `completed` or `stopped`.
    pub status: String,
    pub knobs: FlowKnobs,
    pub phases: BTreeMap<String, PhaseResult>,
    pub pending_task_ids: Vec<usize>,
    pub blocked_task_id: Option<String>,
    pub cleaned_empty_task_ids: Vec<usize>,
    pub updated_at: Option<String>,
}

impl FlowState {
    pub fn load(path: &Path) -> Self {
        super::load_or_default(path)
    }

    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.schema_version = super::SCHEMA_VERSION;
        self.updated_at = Some(super::now_utc());
        super::save_json(path, self)
    }

    /// Record a phase result and checkpoint to disk.
    pub fn checkpoint(&mut self, path: &Path, phase: &str, status: &str, exit_code: i32) -> Result<()> {
        self.phases.insert(
            phase.to_string(),
            PhaseResult {
                status: status.to_string(),
                exit_code,
            },
        );
        self.save(path)
    }

    pub fn phase_completed(&self, phase: &str) -> bool {
        self.phases
            .get(phase)
            .is_some_and(|result| result.status == "completed" && result.exit_code == 0)
    }
}
