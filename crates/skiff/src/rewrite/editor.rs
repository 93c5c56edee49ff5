//! Offset-preserving source editor.
//!
//! The rewriter collects byte-span replacements against the original source
//! and applies them in one pass. Edits must not overlap; offsets always
//! refer to the unmodified input, so span math stays valid no matter how
//! many edits accumulate. Prepended blocks land before the first byte in
//! insertion order.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum EditError {
    #[error("edit range {start}..{end} is out of bounds (len {len})")]
    OutOfBounds { start: usize, end: usize, len: usize },

    #[error("edit range {start}..{end} overlaps a previous edit")]
    Overlap { start: usize, end: usize },
}

#[derive(Debug)]
struct Edit {
    start: usize,
    end: usize,
    replacement: String,
}

/// A string editor over immutable source offsets.
#[derive(Debug)]
pub struct SourceEditor<'s> {
    source: &'s str,
    prepends: Vec<String>,
    edits: Vec<Edit>,
}

impl<'s> SourceEditor<'s> {
    pub fn new(source: &'s str) -> Self {
        Self {
            source,
            prepends: Vec::new(),
            edits: Vec::new(),
        }
    }

    /// Insert a block before the start of the source.
    pub fn prepend(&mut self, text: impl Into<String>) {
        self.prepends.push(text.into());
    }

    /// Replace the bytes at `start..end` of the original source.
    pub fn overwrite(
        &mut self,
        start: usize,
        end: usize,
        replacement: impl Into<String>,
    ) -> Result<(), EditError> {
        let len = self.source.len();
        if start > end || end > len {
            return Err(EditError::OutOfBounds { start, end, len });
        }
        if self
            .edits
            .iter()
            .any(|e| start < e.end && e.start < end)
        {
            return Err(EditError::Overlap { start, end });
        }
        self.edits.push(Edit {
            start,
            end,
            replacement: replacement.into(),
        });
        Ok(())
    }

    /// Whether any edit or prepend has been recorded.
    pub fn is_dirty(&self) -> bool {
        !self.edits.is_empty() || !self.prepends.is_empty()
    }

    /// Produce the edited source. Edits are applied in ascending offset
    /// order regardless of insertion order.
    pub fn into_string(mut self) -> String {
        self.edits.sort_by_key(|e| e.start);

        let mut out = String::with_capacity(self.source.len() + 64 * self.prepends.len());
        for block in &self.prepends {
            out.push_str(block);
        }
        let mut cursor = 0;
        for edit in &self.edits {
            out.push_str(&self.source[cursor..edit.start]);
            out.push_str(&edit.replacement);
            cursor = edit.end;
        }
        out.push_str(&self.source[cursor..]);
        out
    }
}
