//
// document.rs
//
// In-memory text buffer for an open document, with position/offset mapping
// and incremental edit application
//

#![allow(dead_code)]

use lsp_types::{Position, Range, TextDocumentContentChangeEvent};
use ropey::Rope;

/// One incremental edit against a document.
///
/// A missing `range` signals a whole-buffer replacement.
#[derive(Debug, Clone)]
pub struct ContentChange {
    pub range: Option<Range>,
    pub new_text: String,
}

impl From<TextDocumentContentChangeEvent> for ContentChange {
    fn from(event: TextDocumentContentChangeEvent) -> Self {
        Self {
            range: event.range,
            new_text: event.text,
        }
    }
}

/// An open text buffer.
///
/// The buffer is kept as a rope so edits index by Unicode code point; the
/// `version` counter advances by one per applied edit batch.
#[derive(Debug, Clone)]
pub struct Document {
    pub uri: String,
    pub version: i32,
    pub language_id: String,
    pub contents: Rope,
}

impl Document {
    pub fn new(uri: impl Into<String>, text: &str, version: i32, language_id: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            version,
            language_id: language_id.into(),
            contents: Rope::from_str(text),
        }
    }

    pub fn text(&self) -> String {
        self.contents.to_string()
    }

    /// Apply a batch of edits.
    ///
    /// Edits are applied in reverse order of appearance, so each earlier
    /// edit's range is still valid against the pre-update buffer when its
    /// turn comes. The version advances by one per batch, regardless of how
    /// many edits the batch carries.
    pub fn update(&mut self, edits: &[ContentChange]) {
        for edit in edits.iter().rev() {
            self.apply_edit(edit);
        }
        self.version += 1;
    }

    fn apply_edit(&mut self, edit: &ContentChange) {
        let Some(range) = edit.range else {
            // Whole-buffer replacement.
            self.contents = Rope::from_str(&edit.new_text);
            return;
        };

        let start = self.position_to_offset(range.start);
        let end = self.position_to_offset(range.end);
        if start > end {
            return;
        }

        self.contents.remove(start..end);
        self.contents.insert(start, &edit.new_text);
    }

    /// Convert an LSP position to a code-point offset into the buffer.
    ///
    /// `character` counts Unicode code points here, not UTF-16 code units.
    /// Out-of-range lines clamp to the end of the buffer; an out-of-range
    /// character saturates at the end of its line, before the newline.
    pub fn position_to_offset(&self, position: Position) -> usize {
        let line = position.line as usize;
        if line >= self.contents.len_lines() {
            return self.contents.len_chars();
        }

        let line_start = self.contents.line_to_char(line);
        let line_len = self.line_char_len(line);
        line_start + (position.character as usize).min(line_len)
    }

    /// Position of the end of the buffer: the last line index and the
    /// code-point count of the last line.
    pub fn end_position(&self) -> Position {
        let last_line = self.contents.len_lines().saturating_sub(1);
        Position {
            line: last_line as u32,
            character: self.line_char_len(last_line) as u32,
        }
    }

    /// Code-point length of a line, excluding its trailing newline.
    fn line_char_len(&self, line: usize) -> usize {
        let slice = self.contents.line(line);
        let mut len = slice.len_chars();
        if len > 0 && slice.char(len - 1) == '\n' {
            len -= 1;
        }
        len
    }
}

// ============================================================================
// Tests
// ============================================================================
