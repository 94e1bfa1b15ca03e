//! Persisted orchestrator state: flat JSON files under the tidy build dir.
//!
//! Load paths return the default-valued record when the file is missing or
//! unparseable; every write is a full rewrite through a `.tmp` sibling, so a
//! torn write self-corrects on the next invocation.

mod batch;
mod flow;
mod refresh;

pub use batch::{BatchState, BatchStatePatch};
pub use flow::{FLOW_PHASES, FlowKnobs, FlowState, PhaseResult};
pub use refresh::{PROCESSED_WINDOW, RefreshState};

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{OrchestratorError, Result};

pub const SCHEMA_VERSION: u32 = 1;

/// Read a state blob; missing or malformed files yield the default.
pub fn load_or_default<T: Default + DeserializeOwned>(path: &Path) -> T {
    match std::fs::read_to_string(path) {
        Ok(text) => match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(path = %path.display(), "malformed state file, using defaults: {e}");
                T::default()
            }
        },
        Err(_) => T::default(),
    }
}

/// Serialize with stable indentation and rewrite atomically.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| OrchestratorError::DirectoryCreate {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let json =
        serde_json::to_string_pretty(value).map_err(|source| OrchestratorError::JsonSerialize {
            path: path.to_path_buf(),
            source,
        })?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json.as_bytes()).map_err(|source| OrchestratorError::FileWrite {
        path: tmp.clone(),
        source,
    })?;
    std::fs::rename(&tmp, path).map_err(|source| OrchestratorError::FileWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// RFC-3339 UTC timestamp, second precision.
pub fn now_utc() -> String {
    chrono::Utc::now()
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Nanosecond mtime of a file, if it exists.
pub fn mtime_ns(path: &Path) -> Option<u64> {
    let meta = std::fs::metadata(path).ok()?;
    let modified = meta.modified().ok()?;
    let since_epoch = modified.duration_since(std::time::UNIX_EPOCH).ok()?;
    u64::try_from(since_epoch.as_nanos()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Blob {
        n: u32,
    }

    #[test]
    fn missing_and_malformed_files_yield_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("state.json");

        let loaded: Blob = load_or_default(&path);
        assert_eq!(loaded, Blob::default());

        std::fs::write(&path, "{not json").unwrap();
        let loaded: Blob = load_or_default(&path);
        assert_eq!(loaded, Blob::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("deep/state.json");
        save_json(&path, &Blob { n: 9 }).unwrap();
        let loaded: Blob = load_or_default(&path);
        assert_eq!(loaded.n, 9);
        assert!(!path.with_extension("tmp").exists());
    }
}
