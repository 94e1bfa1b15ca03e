//! JSON-RPC client for clangd, spoken over the child's stdin/stdout with
//! LSP `Content-Length` framing.
//!
//! The client is a single-threaded state machine: it owns the child's pipes,
//! holds exactly one outstanding request at a time, and keeps an in-memory
//! twin of every opened document so workspace edits can be computed (dry
//! run) or applied and re-synchronized (`textDocument/didChange`).

mod client;
mod documents;
mod scope;
mod transport;
mod uri;

pub use client::{ClangdClient, ClangdConfig, RenameOutcome};
pub use documents::{DocumentStore, apply_edits, byte_col_to_utf16, position_to_byte_offset};
pub use scope::ScopeGuard;
pub use transport::Transport;
pub use uri::{path_to_uri, uri_to_path};

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LspError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("I/O error on LSP pipe: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("initialize failed: {0}")]
    Initialize(String),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("server error {code}: {message}")]
    Server { code: i64, message: String },

    #[error("cannot convert path {0} to a file:// URI")]
    BadPath(PathBuf),

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

    #[error("edit out of bounds in {0}")]
    EditOutOfBounds(String),
}

pub type Result<T> = std::result::Result<T, LspError>;
