//! `refresh_state.json` — owned by the refresh engine. Tracks the
//! incremental/full cadence counter and which batches already counted.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Rolling window of batch ids counted toward cadence.
pub const PROCESSED_WINDOW: usize = 300;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshState {
    pub schema_version: u32,
    pub batches_since_full: u32,
    pub processed_batches: Vec<String>,
    pub last_batch: Option<String>,
    pub last_full_batch: Option<String>,
    pub last_full_reason: Option<String>,
    pub last_full_at: Option<String>,
    pub last_seen_build_log_mtime_ns: Option<u64>,
    pub last_seen_rename_report_mtime_ns: Option<u64>,
    pub full_every: u32,
}

impl RefreshState {
    pub fn load(path: &Path) -> Self {
        super::load_or_default(path)
    }

    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.schema_version = super::SCHEMA_VERSION;
        super::save_json(path, self)
    }

    /// Count `batch_name` toward cadence. Idempotent: returns `true` when
    /// the batch was already counted (and changes nothing beyond
    /// `last_batch`).
    pub fn register_batch(&mut self, batch_name: &str) -> bool {
        let already = self.processed_batches.iter().any(|b| b == batch_name);
        self.last_batch = Some(batch_name.to_string());
        if already {
            return true;
        }
        self.processed_batches.push(batch_name.to_string());
        if self.processed_batches.len() > PROCESSED_WINDOW {
            let excess = self.processed_batches.len() - PROCESSED_WINDOW;
            self.processed_batches.drain(..excess);
        }
        self.batches_since_full += 1;
        false
    }

    /// A full tidy is due once the counter reaches `full_every` (and the
    /// cadence is enabled at all).
    pub fn cadence_due(&self) -> bool {
        self.full_every > 0 && self.batches_since_full >= self.full_every
    }

    /// Record a completed full pass and reset the cadence counter.
    pub fn mark_full(&mut self, batch_name: &str, reason: &str) {
        self.batches_since_full = 0;
        self.last_full_batch = Some(batch_name.to_string());
        self.last_full_reason = Some(reason.to_string());
        self.last_full_at = Some(super::now_utc());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn register_batch_is_idempotent() {
        let mut state = RefreshState::default();
        assert!(!state.register_batch("batch_001"));
        assert_eq!(state.batches_since_full, 1);
        assert!(state.register_batch("batch_001"));
        assert_eq!(state.batches_since_full, 1);
        assert_eq!(state.processed_batches, vec!["batch_001".to_string()]);
        assert_eq!(state.last_batch.as_deref(), Some("batch_001"));
    }

    #[test]
    fn cadence_fires_at_full_every() {
        let mut state = RefreshState {
            full_every: 3,
            ..Default::default()
        };
        state.register_batch("batch_001");
        assert!(!state.cadence_due());
        state.register_batch("batch_002");
        assert!(!state.cadence_due());
        state.register_batch("batch_003");
        assert!(state.cadence_due());

        state.mark_full("batch_003", "cadence_3");
        assert_eq!(state.batches_since_full, 0);
        assert!(!state.cadence_due());
        assert_eq!(state.last_full_batch.as_deref(), Some("batch_003"));
        assert!(state.last_full_at.is_some());
    }

    #[test]
    fn cadence_disabled_when_full_every_is_zero() {
        let mut state = RefreshState::default();
        for i in 0..10 {
            state.register_batch(&format!("batch_{i:03}"));
        }
        assert!(!state.cadence_due());
    }

    #[test]
    fn processed_batches_is_a_rolling_window() {
        let mut state = RefreshState::default();
        for i in 0..(PROCESSED_WINDOW + 25) {
            state.register_batch(&format!("batch_{i:04}"));
        }
        assert_eq!(state.processed_batches.len(), PROCESSED_WINDOW);
        assert_eq!(
            state.processed_batches.first().map(String::as_str),
            Some("batch_0025")
        );
        assert_eq!(state.batches_since_full, (PROCESSED_WINDOW + 25) as u32);
    }

    #[test]
    fn state_round_trips_through_disk() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("refresh_state.json");
        let mut state = RefreshState {
            full_every: 5,
            ..Default::default()
        };
        state.register_batch("batch_001");
        state.save(&path).unwrap();

        let loaded = RefreshState::load(&path);
        assert_eq!(loaded.batches_since_full, 1);
        assert_eq!(loaded.full_every, 5);
    }
}
