//! Serde types for the slice of the Language Server Protocol the rename
//! client speaks: JSON-RPC 2.0 envelopes, lifecycle messages, text document
//! synchronization, and `textDocument/rename` with its workspace-edit result.
//!
//! Only the fields the client actually reads or writes are modeled; unknown
//! fields are ignored on deserialization and omitted on serialization.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Request id. The client only ever issues integer ids.
pub type RequestId = i64;

// ── JSON-RPC envelopes ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponseError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// ── Lifecycle ────────────────────────────────────────────────────────────

pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "initialized";
    pub const SHUTDOWN: &str = "shutdown";
    pub const EXIT: &str = "exit";
    pub const DID_OPEN: &str = "textDocument/didOpen";
    pub const DID_CHANGE: &str = "textDocument/didChange";
    pub const DID_CLOSE: &str = "textDocument/didClose";
    pub const RENAME: &str = "textDocument/rename";
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_uri: Option<String>,
    pub capabilities: ClientCapabilities,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClientCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<WorkspaceClientCapabilities>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceClientCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_edit: Option<WorkspaceEditClientCapabilities>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceEditClientCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_changes: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    #[serde(default)]
    pub capabilities: Value,
    #[serde(default)]
    pub server_info: Option<ServerInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

// ── Text documents ───────────────────────────────────────────────────────

/// Zero-based line and UTF-16 character offset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TextEdit {
    pub range: Range,
    pub new_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextDocumentIdentifier {
    pub uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionedTextDocumentIdentifier {
    pub uri: String,
    pub version: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionalVersionedTextDocumentIdentifier {
    pub uri: String,
    #[serde(default)]
    pub version: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentItem {
    pub uri: String,
    pub language_id: String,
    pub version: i32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidOpenTextDocumentParams {
    pub text_document: TextDocumentItem,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidChangeTextDocumentParams {
    pub text_document: VersionedTextDocumentIdentifier,
    pub content_changes: Vec<TextDocumentContentChangeEvent>,
}

/// Full-document sync only: the event carries the complete new text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextDocumentContentChangeEvent {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidCloseTextDocumentParams {
    pub text_document: TextDocumentIdentifier,
}

// ── Rename ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameParams {
    pub text_document: TextDocumentIdentifier,
    pub position: Position,
    pub new_name: String,
}

/// The result of `textDocument/rename`. Servers answer either with the
/// legacy `changes` map or, when `documentChanges` support was advertised,
/// with an ordered list of document edits (possibly interleaved with file
/// operations, which this client does not perform).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceEdit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<HashMap<String, Vec<TextEdit>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_changes: Option<Vec<DocumentChangeOperation>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentChangeOperation {
    Edit(TextDocumentEdit),
    /// Create/rename/delete file operations; preserved but not applied.
    Other(Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentEdit {
    pub text_document: OptionalVersionedTextDocumentIdentifier,
    pub edits: Vec<TextEdit>,
}

impl WorkspaceEdit {
    /// Flatten the edit into `(uri, edits)` pairs regardless of which
    /// representation the server chose. `documentChanges` wins when both
    /// are present, per the protocol.
    pub fn edits_by_uri(&self) -> Vec<(String, Vec<TextEdit>)> {
        if let Some(doc_changes) = &self.document_changes {
            return doc_changes
                .iter()
                .filter_map(|change| match change {
                    DocumentChangeOperation::Edit(edit) => {
                        Some((edit.text_document.uri.clone(), edit.edits.clone()))
                    }
                    DocumentChangeOperation::Other(_) => None,
                })
                .collect();
        }
        if let Some(changes) = &self.changes {
            let mut pairs: Vec<(String, Vec<TextEdit>)> = changes
                .iter()
                .map(|(uri, edits)| (uri.clone(), edits.clone()))
                .collect();
            pairs.sort_by(|a, b| a.0.cmp(&b.0));
            return pairs;
        }
        Vec::new()
    }

    /// Total number of individual text edits.
    pub fn edit_count(&self) -> usize {
        self.edits_by_uri().iter().map(|(_, edits)| edits.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn workspace_edit_prefers_document_changes() {
        let edit: WorkspaceEdit = serde_json::from_value(json!({
            "changes": {
                "file:///a.cpp": [
                    {"range": {"start": {"line": 0, "character": 0},
                               "end": {"line": 0, "character": 3}},
                     "newText": "x"}
                ]
            },
            "documentChanges": [
                {"textDocument": {"uri": "file:///b.cpp", "version": 2},
                 "edits": [
                     {"range": {"start": {"line": 1, "character": 4},
                                "end": {"line": 1, "character": 7}},
                      "newText": "y"},
                     {"range": {"start": {"line": 5, "character": 0},
                                "end": {"line": 5, "character": 3}},
                      "newText": "y"}
                 ]}
            ]
        }))
        .unwrap();

        let pairs = edit.edits_by_uri();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0, "file:///b.cpp");
        assert_eq!(edit.edit_count(), 2);
    }

    #[test]
    fn workspace_edit_falls_back_to_changes_map() {
        let edit: WorkspaceEdit = serde_json::from_value(json!({
            "changes": {
                "file:///z.hpp": [
                    {"range": {"start": {"line": 0, "character": 0},
                               "end": {"line": 0, "character": 3}},
                     "newText": "renamed"}
                ]
            }
        }))
        .unwrap();

        assert_eq!(edit.edit_count(), 1);
        assert_eq!(edit.edits_by_uri()[0].0, "file:///z.hpp");
    }

    #[test]
    fn document_change_file_operations_are_preserved_not_applied() {
        let edit: WorkspaceEdit = serde_json::from_value(json!({
            "documentChanges": [
                {"kind": "create", "uri": "file:///new.cpp"},
                {"textDocument": {"uri": "file:///c.cpp", "version": null},
                 "edits": []}
            ]
        }))
        .unwrap();

        assert_eq!(edit.edits_by_uri().len(), 1);
        assert_eq!(edit.edit_count(), 0);
    }

    #[test]
    fn request_round_trips() {
        let req = JsonRpcRequest::new(7, methods::RENAME, Some(json!({"x": 1})));
        let text = serde_json::to_string(&req).unwrap();
        let back: JsonRpcRequest = serde_json::from_str(&text).unwrap();
        assert_eq!(back, req);
        assert_eq!(back.jsonrpc, JSONRPC_VERSION);
    }
}
