use serde::Serialize;

/// One line of the log: where its bytes live and how many there are.
///
/// `size` counts the stored bytes including the line's terminator byte;
/// non-regex matching works on `size - 1` bytes (see
/// [`MatchStrategy::effective_len`](crate::search::MatchStrategy::effective_len)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TextItem {
    /// Byte offset of the line start in the log file
    pub offset: u64,
    /// Stored byte count of the line, terminator included
    pub size: u32,
}

impl TextItem {
    /// Byte offset one past the end of the line
    pub fn end_offset(&self) -> u64 {
        self.offset + u64::from(self.size)
    }
}

/// Ordered index of log line offsets and lengths.
///
/// Produced by an external collaborator (the log loader), immutable for the
/// duration of a search or filter pass, read-only to the engine.
#[derive(Debug, Clone, Default)]
pub struct TextItemArray {
    items: Vec<TextItem>,
}

impl TextItemArray {
    pub fn new(items: Vec<TextItem>) -> Self {
        Self { items }
    }

    /// Number of rows in the index
    pub fn rows(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, row: usize) -> Option<TextItem> {
        self.items.get(row).copied()
    }

    pub fn items(&self) -> &[TextItem] {
        &self.items
    }

    /// Byte offset one past the last stored byte, 0 for an empty index
    pub fn end_offset(&self) -> u64 {
        self.items.last().map(TextItem::end_offset).unwrap_or(0)
    }
}
