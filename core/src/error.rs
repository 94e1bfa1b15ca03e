//! Error taxonomy for the orchestrator.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("unknown app '{0}' (expected an [apps.{0}] entry in tidyctl.toml)")]
    UnknownApp(String),

    #[error("failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize JSON for {path}: {source}")]
    JsonSerialize {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("compile_commands.json not found at {0} (configure the tidy build dir first)")]
    MissingCompileCommands(PathBuf),

    #[error("batch '{0}' not found under tasks_done/")]
    BatchNotFound(String),

    #[error("rename client error: {0}")]
    Lsp(#[from] tidyctl_lsp_client::LspError),

    #[error("{0}")]
    Other(String),
}

impl From<String> for OrchestratorError {
    fn from(s: String) -> Self {
        OrchestratorError::Other(s)
    }
}
