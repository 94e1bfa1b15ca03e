//! `batch_state.json` — owned by the loop controller.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchState {
    pub schema_version: u32,
    pub app: Option<String>,
    pub batch_id: Option<String>,
    /// Every task id ever archived through `clean`, deduplicated, in
    /// insertion order.
    pub cleaned_task_ids: Vec<usize>,
    pub last_verify_success: Option<bool>,
    pub last_refresh_ok: Option<bool>,
    pub last_clean_ok: Option<bool>,
    pub last_tidy_batch_ok: Option<bool>,
    /// Last completed `tidy-batch` stage, for resume.
    pub tidy_batch_checkpoint: Option<String>,
    pub updated_at: Option<String>,
}

/// Fields to merge into the existing state. `None` leaves the field alone.
#[derive(Debug, Clone, Default)]
pub struct BatchStatePatch {
    pub app: Option<String>,
    pub batch_id: Option<String>,
    pub cleaned_task_ids: Option<Vec<usize>>,
    pub last_verify_success: Option<bool>,
    pub last_refresh_ok: Option<bool>,
    pub last_clean_ok: Option<bool>,
    pub last_tidy_batch_ok: Option<bool>,
    pub tidy_batch_checkpoint: Option<Option<String>>,
}

impl BatchState {
    pub fn load(path: &Path) -> Self {
        super::load_or_default(path)
    }

    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.schema_version = super::SCHEMA_VERSION;
        self.updated_at = Some(super::now_utc());
        super::save_json(path, self)
    }

    /// Merge `patch` into the state on disk and rewrite the file.
    pub fn update_state(path: &Path, patch: BatchStatePatch) -> Result<Self> {
        let mut state = Self::load(path);
        if let Some(app) = patch.app {
            state.app = Some(app);
        }
        if let Some(batch_id) = patch.batch_id {
            state.batch_id = Some(batch_id);
        }
        if let Some(ids) = patch.cleaned_task_ids {
            for id in ids {
                state.append_cleaned(id);
            }
        }
        if let Some(v) = patch.last_verify_success {
            state.last_verify_success = Some(v);
        }
        if let Some(v) = patch.last_refresh_ok {
            state.last_refresh_ok = Some(v);
        }
        if let Some(v) = patch.last_clean_ok {
            state.last_clean_ok = Some(v);
        }
        if let Some(v) = patch.last_tidy_batch_ok {
            state.last_tidy_batch_ok = Some(v);
        }
        if let Some(checkpoint) = patch.tidy_batch_checkpoint {
            state.tidy_batch_checkpoint = checkpoint;
        }
        state.save(path)?;
        Ok(state)
    }

    fn append_cleaned(&mut self, id: usize) {
        if !self.cleaned_task_ids.contains(&id) {
            self.cleaned_task_ids.push(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn update_merges_without_clobbering() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("batch_state.json");

        BatchState::update_state(
            &path,
            BatchStatePatch {
                app: Some("demo".to_string()),
                last_verify_success: Some(true),
                ..Default::default()
            },
        )
        .unwrap();

        let state = BatchState::update_state(
            &path,
            BatchStatePatch {
                last_clean_ok: Some(true),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(state.app.as_deref(), Some("demo"));
        assert_eq!(state.last_verify_success, Some(true));
        assert_eq!(state.last_clean_ok, Some(true));
        assert!(state.updated_at.is_some());
    }

    #[test]
    fn cleaned_ids_dedup_in_insertion_order() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("batch_state.json");

        BatchState::update_state(
            &path,
            BatchStatePatch {
                cleaned_task_ids: Some(vec![3, 1, 3]),
                ..Default::default()
            },
        )
        .unwrap();
        let state = BatchState::update_state(
            &path,
            BatchStatePatch {
                cleaned_task_ids: Some(vec![1, 2]),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(state.cleaned_task_ids, vec![3, 1, 2]);
    }

    #[test]
    fn checkpoint_can_be_cleared() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("batch_state.json");

        BatchState::update_state(
            &path,
            BatchStatePatch {
                tidy_batch_checkpoint: Some(Some("clean".to_string())),
                ..Default::default()
            },
        )
        .unwrap();
        let state = BatchState::update_state(
            &path,
            BatchStatePatch {
                tidy_batch_checkpoint: Some(None),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(state.tidy_batch_checkpoint, None);
    }
}
