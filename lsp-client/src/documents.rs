//! In-memory twins of opened documents, plus the position arithmetic the
//! protocol requires: LSP positions are zero-based lines with UTF-16 code
//! unit columns, while everything local is bytes.

use std::collections::HashMap;

use lsp_types::{Position, TextEdit};

use crate::{LspError, Result};

#[derive(Debug, Clone)]
pub struct Document {
    pub text: String,
    pub version: i32,
}

#[derive(Debug, Default)]
pub struct DocumentStore {
    docs: HashMap<String, Document>,
}

impl DocumentStore {
    pub fn contains(&self, uri: &str) -> bool {
        self.docs.contains_key(uri)
    }

    pub fn get(&self, uri: &str) -> Option<&Document> {
        self.docs.get(uri)
    }

    pub fn insert(&mut self, uri: String, text: String) {
        self.docs.insert(uri, Document { text, version: 1 });
    }

    /// Replace the text and bump the version; returns the new version.
    pub fn update(&mut self, uri: &str, text: String) -> Option<i32> {
        let doc = self.docs.get_mut(uri)?;
        doc.text = text;
        doc.version += 1;
        Some(doc.version)
    }
}

/// Byte offset of the start of each line, plus one sentinel for EOF.
fn line_starts(text: &str) -> Vec<usize> {
    let mut starts = vec![0usize];
    for (index, byte) in text.bytes().enumerate() {
        if byte == b'\n' {
            starts.push(index + 1);
        }
    }
    starts
}

/// Convert an LSP position (line, UTF-16 character) to a byte offset.
/// Positions past the end of a line clamp to the line end, per the protocol.
pub fn position_to_byte_offset(text: &str, position: Position) -> Option<usize> {
    let starts = line_starts(text);
    let line_index = position.line as usize;
    if line_index >= starts.len() {
        return None;
    }
    let line_start = starts[line_index];
    let line_end = starts
        .get(line_index + 1)
        .map(|next| next - 1)
        .unwrap_or(text.len());
    let line = &text[line_start..line_end.max(line_start)];

    let mut utf16_seen: u32 = 0;
    for (byte_index, ch) in line.char_indices() {
        if utf16_seen >= position.character {
            return Some(line_start + byte_index);
        }
        utf16_seen += ch.len_utf16() as u32;
    }
    Some(line_start + line.len())
}

/// UTF-16 column of a zero-based byte column within one line.
pub fn byte_col_to_utf16(line: &str, byte_col: usize) -> u32 {
    let mut utf16: u32 = 0;
    for (index, ch) in line.char_indices() {
        if index >= byte_col {
            return utf16;
        }
        utf16 += ch.len_utf16() as u32;
    }
    utf16
}

/// Apply a batch of edits to `text`. Edits are applied in descending start
/// offset so earlier ranges stay valid while later ones splice.
pub fn apply_edits(uri: &str, text: &str, edits: &[TextEdit]) -> Result<String> {
    let mut resolved: Vec<(usize, usize, &str)> = Vec::with_capacity(edits.len());
    for edit in edits {
        let start = position_to_byte_offset(text, edit.range.start)
            .ok_or_else(|| LspError::EditOutOfBounds(uri.to_string()))?;
        let end = position_to_byte_offset(text, edit.range.end)
            .ok_or_else(|| LspError::EditOutOfBounds(uri.to_string()))?;
        if end < start {
            return Err(LspError::EditOutOfBounds(uri.to_string()));
        }
        resolved.push((start, end, edit.new_text.as_str()));
    }
    resolved.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

    let mut out = text.to_string();
    for (start, end, new_text) in resolved {
        if end > out.len() {
            return Err(LspError::EditOutOfBounds(uri.to_string()));
        }
        out.replace_range(start..end, new_text);
    }
    Ok(out)
}
