use serde::{Deserialize, Serialize};

use crate::column::ColumnId;
use crate::grid::RowId;

/// Generation lifecycle of a cell.
///
/// Idle → Pending when generation starts, then Succeeded or Failed when
/// the call completes. A manual edit puts the cell back to Idle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellStatus {
    #[default]
    Idle,
    Pending,
    Succeeded,
    Failed,
}

impl CellStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CellStatus::Idle => "idle",
            CellStatus::Pending => "pending",
            CellStatus::Succeeded => "succeeded",
            CellStatus::Failed => "failed",
        }
    }
}

/// One cell: current text plus generation state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cell {
    pub value: String,

    pub status: CellStatus,

    /// Populated only while `status` is Failed.
    pub error: Option<String>,
}

impl Cell {
    /// True when the value is empty after trimming.
    pub fn is_blank(&self) -> bool {
        self.value.trim().is_empty()
    }

    pub(crate) fn set_pending(&mut self) {
        self.status = CellStatus::Pending;
        self.error = None;
    }

    pub(crate) fn set_succeeded(&mut self, value: String) {
        self.value = value;
        self.status = CellStatus::Succeeded;
        self.error = None;
    }

    /// Failure keeps the previous value; only status and error change.
    pub(crate) fn set_failed(&mut self, error: String) {
        self.status = CellStatus::Failed;
        self.error = Some(error);
    }

    pub(crate) fn reset_idle(&mut self, value: String) {
        self.value = value;
        self.status = CellStatus::Idle;
        self.error = None;
    }
}

/// Address of one cell: row identity plus column identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRef {
    pub row: RowId,
    pub col: ColumnId,
}

impl CellRef {
    pub fn new(row: RowId, col: ColumnId) -> Self {
        Self { row, col }
    }
}

impl std::fmt::Display for CellRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.row, self.col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        let mut cell = Cell::default();
        assert_eq!(cell.status, CellStatus::Idle);

        cell.set_pending();
        assert_eq!(cell.status, CellStatus::Pending);

        cell.set_succeeded("result".into());
        assert_eq!(cell.status, CellStatus::Succeeded);
        assert_eq!(cell.value, "result");
        assert!(cell.error.is_none());

        cell.set_failed("boom".into());
        assert_eq!(cell.status, CellStatus::Failed);
        assert_eq!(cell.value, "result", "failure keeps the previous value");
        assert_eq!(cell.error.as_deref(), Some("boom"));

        cell.reset_idle("typed".into());
        assert_eq!(cell.status, CellStatus::Idle);
        assert_eq!(cell.value, "typed");
        assert!(cell.error.is_none());
    }

    #[test]
    fn test_pending_clears_error() {
        let mut cell = Cell::default();
        cell.set_failed("old failure".into());
        cell.set_pending();
        assert!(cell.error.is_none());
    }

    #[test]
    fn test_is_blank() {
        let mut cell = Cell::default();
        assert!(cell.is_blank());
        cell.value = "  \t ".into();
        assert!(cell.is_blank());
        cell.value = " x ".into();
        assert!(!cell.is_blank());
    }
}
