//! The clangd rename client.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use lsp_types::{
    ClientCapabilities, DidChangeTextDocumentParams, DidOpenTextDocumentParams, InitializeParams,
    InitializeResult, Position, RenameParams, TextDocumentContentChangeEvent,
    TextDocumentIdentifier, TextDocumentItem, VersionedTextDocumentIdentifier,
    WorkspaceClientCapabilities, WorkspaceEdit, WorkspaceEditClientCapabilities, methods,
};
use serde_json::Value;
use tokio::process::{Child, Command};

use crate::documents::{DocumentStore, apply_edits, byte_col_to_utf16};
use crate::scope::ScopeGuard;
use crate::transport::Transport;
use crate::uri::{path_to_uri, uri_to_path};
use crate::{LspError, Result};

#[derive(Debug, Clone)]
pub struct ClangdConfig {
    pub binary: String,
    /// The app directory; becomes the rootUri.
    pub root_dir: PathBuf,
    /// Scope-guard roots. Empty means unrestricted.
    pub allowed_roots: Vec<PathBuf>,
    /// Settle time before the first rename, for background indexing.
    pub warmup: Duration,
    pub request_timeout: Duration,
    /// Environment overrides for the child (e.g. a prepended PATH).
    pub env: Vec<(String, String)>,
    pub extra_args: Vec<String>,
}

impl Default for ClangdConfig {
    fn default() -> Self {
        Self {
            binary: "clangd".to_string(),
            root_dir: PathBuf::from("."),
            allowed_roots: Vec::new(),
            warmup: Duration::ZERO,
            request_timeout: Duration::from_secs(30),
            env: Vec::new(),
            extra_args: Vec::new(),
        }
    }
}

/// The result of one rename call, whether previewed or applied.
#[derive(Debug, Clone, Default)]
pub struct RenameOutcome {
    pub ok: bool,
    pub edit_count: usize,
    pub changed_files: Vec<PathBuf>,
    pub blocked_files: Vec<PathBuf>,
    pub error: Option<String>,
}

pub struct ClangdClient {
    child: Child,
    transport: Transport,
    store: DocumentStore,
    scope: ScopeGuard,
    config: ClangdConfig,
    initialized: bool,
    warmed_up: bool,
}

impl ClangdClient {
    /// Spawn clangd with piped stdio. The server is not initialized yet.
    pub fn spawn(config: ClangdConfig) -> Result<Self> {
        let mut command = Command::new(&config.binary);
        command
            .args(&config.extra_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        for (key, value) in &config.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|source| LspError::Spawn {
            program: config.binary.clone(),
            source,
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LspError::Protocol("no stdin pipe".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LspError::Protocol("no stdout pipe".to_string()))?;

        Ok(Self {
            child,
            transport: Transport::new(stdin, stdout),
            store: DocumentStore::default(),
            scope: ScopeGuard::new(&config.allowed_roots),
            config,
            initialized: false,
            warmed_up: false,
        })
    }

    /// `initialize` + `initialized`, advertising documentChanges support.
    pub async fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        let params = InitializeParams {
            process_id: Some(std::process::id()),
            root_uri: Some(path_to_uri(&self.config.root_dir)?),
            capabilities: ClientCapabilities {
                workspace: Some(WorkspaceClientCapabilities {
                    workspace_edit: Some(WorkspaceEditClientCapabilities {
                        document_changes: Some(true),
                    }),
                }),
            },
        };
        let params = serde_json::to_value(&params)
            .map_err(|e| LspError::Protocol(format!("encode initialize: {e}")))?;

        let id = self.transport.request(methods::INITIALIZE, Some(params)).await?;
        let result = self
            .wait_with_timeout(id)
            .await
            .map_err(|e| LspError::Initialize(e.to_string()))?;
        let parsed: std::result::Result<InitializeResult, _> = serde_json::from_value(result);
        match parsed {
            Ok(init) => {
                if let Some(info) = init.server_info {
                    tracing::debug!(server = %info.name, version = ?info.version, "initialized");
                }
            }
            Err(e) => tracing::debug!("unreadable initialize result: {e}"),
        }

        self.transport
            .notify(methods::INITIALIZED, Some(Value::Object(Default::default())))
            .await?;
        self.initialized = true;
        Ok(())
    }

    async fn wait_with_timeout(&mut self, id: i64) -> Result<Value> {
        let timeout = self.config.request_timeout;
        tokio::time::timeout(timeout, self.transport.wait_response(id))
            .await
            .map_err(|_| LspError::Timeout(timeout))?
    }

    /// Open the file over LSP (or reuse the cached document) and return its
    /// URI. The language id is derived from the suffix.
    pub async fn ensure_open(&mut self, path: &Path) -> Result<String> {
        let uri = path_to_uri(path)?;
        if self.store.contains(&uri) {
            return Ok(uri);
        }
        let text = std::fs::read_to_string(path).map_err(|source| LspError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

        let item = TextDocumentItem {
            uri: uri.clone(),
            language_id: language_id_for(path).to_string(),
            version: 1,
            text: text.clone(),
        };
        let params = serde_json::to_value(&DidOpenTextDocumentParams { text_document: item })
            .map_err(|e| LspError::Protocol(format!("encode didOpen: {e}")))?;
        self.transport.notify(methods::DID_OPEN, Some(params)).await?;
        self.store.insert(uri.clone(), text);
        Ok(uri)
    }

    /// Request a rename at a 1-based (line, col) byte position and apply or
    /// preview the resulting workspace edit.
    ///
    /// Server-side failures come back as `ok = false` with `error` set;
    /// transport-level failures are `Err`.
    pub async fn rename(
        &mut self,
        path: &Path,
        line: u32,
        col: u32,
        new_name: &str,
        dry_run: bool,
    ) -> Result<RenameOutcome> {
        self.initialize().await?;
        if !self.warmed_up {
            if !self.config.warmup.is_zero() {
                tokio::time::sleep(self.config.warmup).await;
            }
            self.warmed_up = true;
        }

        let uri = self.ensure_open(path).await?;
        let position = self.to_position(&uri, line, col);

        let params = RenameParams {
            text_document: TextDocumentIdentifier { uri: uri.clone() },
            position,
            new_name: new_name.to_string(),
        };
        let params = serde_json::to_value(&params)
            .map_err(|e| LspError::Protocol(format!("encode rename: {e}")))?;
        let id = self.transport.request(methods::RENAME, Some(params)).await?;

        let result = match self.wait_with_timeout(id).await {
            Ok(result) => result,
            Err(LspError::Server { code, message }) => {
                return Ok(RenameOutcome {
                    ok: false,
                    error: Some(format!("server error {code}: {message}")),
                    ..Default::default()
                });
            }
            Err(other) => return Err(other),
        };

        if result.is_null() {
            return Ok(RenameOutcome {
                ok: true,
                ..Default::default()
            });
        }

        let edit: WorkspaceEdit = serde_json::from_value(result)
            .map_err(|e| LspError::Protocol(format!("malformed workspace edit: {e}")))?;
        self.apply_workspace_edit(&edit, dry_run).await
    }

    /// 1-based byte (line, col) to 0-based UTF-16 position, using the cached
    /// document text for the code-unit translation.
    fn to_position(&self, uri: &str, line: u32, col: u32) -> Position {
        let line0 = line.saturating_sub(1);
        let byte_col = col.saturating_sub(1) as usize;
        let character = self
            .store
            .get(uri)
            .and_then(|doc| doc.text.lines().nth(line0 as usize))
            .map(|text| byte_col_to_utf16(text, byte_col))
            .unwrap_or(col.saturating_sub(1));
        Position {
            line: line0,
            character,
        }
    }

    /// Scope-check every touched path, then compute (and in apply mode
    /// write) the new file contents, largest offsets first.
    async fn apply_workspace_edit(
        &mut self,
        edit: &WorkspaceEdit,
        dry_run: bool,
    ) -> Result<RenameOutcome> {
        let pairs = edit.edits_by_uri();

        let mut touched: Vec<PathBuf> = Vec::new();
        for (uri, _) in &pairs {
            touched.push(uri_to_path(uri)?);
        }
        let (_, blocked) = self.scope.partition(&touched);
        if !blocked.is_empty() {
            tracing::warn!(?blocked, "workspace edit refused by scope guard");
            return Ok(RenameOutcome {
                ok: false,
                edit_count: 0,
                changed_files: Vec::new(),
                blocked_files: blocked,
                error: Some("workspace edit touches files outside the allowed roots".to_string()),
            });
        }

        let mut edit_count = 0usize;
        let mut changed_files: Vec<PathBuf> = Vec::new();

        for ((uri, edits), path) in pairs.iter().zip(touched.iter()) {
            if edits.is_empty() {
                continue;
            }
            let open_uri = self.ensure_open(path).await?;
            let current = self
                .store
                .get(&open_uri)
                .map(|doc| doc.text.clone())
                .unwrap_or_default();
            let new_text = apply_edits(uri, &current, edits)?;

            edit_count += edits.len();
            changed_files.push(path.clone());

            if dry_run {
                continue;
            }

            std::fs::write(path, new_text.as_bytes()).map_err(|source| LspError::FileWrite {
                path: path.clone(),
                source,
            })?;
            let version = self.store.update(&open_uri, new_text.clone()).unwrap_or(1);
            let params = DidChangeTextDocumentParams {
                text_document: VersionedTextDocumentIdentifier {
                    uri: open_uri.clone(),
                    version,
                },
                content_changes: vec![TextDocumentContentChangeEvent { text: new_text }],
            };
            let params = serde_json::to_value(&params)
                .map_err(|e| LspError::Protocol(format!("encode didChange: {e}")))?;
            self.transport.notify(methods::DID_CHANGE, Some(params)).await?;
        }

        Ok(RenameOutcome {
            ok: true,
            edit_count,
            changed_files,
            blocked_files: Vec::new(),
            error: None,
        })
    }

    /// `shutdown` + `exit`, then reap the child, killing it if it lingers.
    pub async fn shutdown(mut self) -> Result<()> {
        if self.initialized {
            if let Ok(id) = self.transport.request(methods::SHUTDOWN, None).await {
                let _ = tokio::time::timeout(
                    Duration::from_secs(2),
                    self.transport.wait_response(id),
                )
                .await;
            }
            let _ = self.transport.notify(methods::EXIT, None).await;
        }

        match tokio::time::timeout(Duration::from_secs(2), self.child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                tracing::warn!("clangd did not exit, killing");
                let _ = self.child.kill().await;
            }
        }
        Ok(())
    }
}

fn language_id_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).as_deref() {
        Some("c") => "c",
        _ => "cpp",
    }
}
