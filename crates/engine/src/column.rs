use serde::{Deserialize, Serialize};

/// Stable identity for a column.
///
/// Allocated monotonically by the grid and never reused, so a removed
/// column's id stays dangling rather than silently re-pointing at a
/// newer column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnId(u64);

impl ColumnId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ColumnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "col{}", self.0)
    }
}

/// A column definition: how cells in this column get their value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnHeader {
    pub id: ColumnId,

    /// Display label shown in the header row.
    pub label: String,

    /// Instruction sent as the system prompt when this column generates.
    /// Empty for the entry column.
    pub prompt: String,

    /// Column whose cell value feeds this column's generation.
    /// `None` only for the entry column (or after a misconfiguration).
    pub source: Option<ColumnId>,

    /// Entry columns hold user-typed values and are never generated.
    pub is_entry: bool,
}

impl ColumnHeader {
    /// The user-input column. Exactly one per grid, conventionally first.
    pub fn entry(id: ColumnId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            prompt: String::new(),
            source: None,
            is_entry: true,
        }
    }

    /// A generated column fed by `source`.
    pub fn generated(
        id: ColumnId,
        label: impl Into<String>,
        prompt: impl Into<String>,
        source: ColumnId,
    ) -> Self {
        Self {
            id,
            label: label.into(),
            prompt: prompt.into(),
            source: Some(source),
            is_entry: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_header() {
        let h = ColumnHeader::entry(ColumnId::from_raw(1), "Input");
        assert!(h.is_entry);
        assert!(h.source.is_none());
        assert!(h.prompt.is_empty());
    }

    #[test]
    fn test_generated_header() {
        let src = ColumnId::from_raw(1);
        let h = ColumnHeader::generated(ColumnId::from_raw(2), "Summarize", "Summarize the text", src);
        assert!(!h.is_entry);
        assert_eq!(h.source, Some(src));
    }

    #[test]
    fn test_column_id_display() {
        assert_eq!(ColumnId::from_raw(7).to_string(), "col7");
    }
}
