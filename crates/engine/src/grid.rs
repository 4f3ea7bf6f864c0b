//! The grid: column list, row store, and the dependency graph that ties
//! them together.
//!
//! Columns and rows are independently owned collections; cells are owned by
//! their row and positionally aligned with the column list. Every structural
//! operation keeps that alignment: `row.cells.len() == columns.len()` for
//! every row, always.

use serde::{Deserialize, Serialize};

use crate::cell::{Cell, CellRef};
use crate::column::{ColumnHeader, ColumnId};
use crate::executor::{CellUpdate, ChainContext, ChainExecutor, ChainReport, Generator};
use crate::graph::{ColumnGraph, CycleError};

/// Stable identity for a row. Allocated monotonically, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowId(u64);

impl RowId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "row{}", self.0)
    }
}

/// One row: identity plus one cell per column, aligned by position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Row {
    pub id: RowId,
    pub cells: Vec<Cell>,
}

/// Errors from structural operations.
#[derive(Debug, Clone)]
pub enum GridError {
    /// The entry column cannot be removed or rewired.
    EntryColumn,
    /// No column with this id exists.
    UnknownColumn(ColumnId),
    /// No row with this id exists.
    UnknownRow(RowId),
    /// The source assignment would close a cycle.
    Cycle(CycleError),
}

impl std::fmt::Display for GridError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GridError::EntryColumn => write!(f, "the entry column cannot be removed or rewired"),
            GridError::UnknownColumn(id) => write!(f, "no column {}", id),
            GridError::UnknownRow(id) => write!(f, "no row {}", id),
            GridError::Cycle(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for GridError {}

impl From<CycleError> for GridError {
    fn from(err: CycleError) -> Self {
        GridError::Cycle(err)
    }
}

/// The pipeline grid. All mutation goes through these methods; there is no
/// ambient state anywhere in the engine.
#[derive(Debug, Clone)]
pub struct Grid {
    columns: Vec<ColumnHeader>,
    rows: Vec<Row>,
    graph: ColumnGraph,
    next_column: u64,
    next_row: u64,
}

impl Grid {
    /// A grid with a single entry column and no rows.
    pub fn new(entry_label: impl Into<String>) -> Self {
        let entry = ColumnHeader::entry(ColumnId::from_raw(1), entry_label);
        Self {
            columns: vec![entry],
            rows: Vec::new(),
            graph: ColumnGraph::new(),
            next_column: 2,
            next_row: 1,
        }
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn columns(&self) -> &[ColumnHeader] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn column(&self, id: ColumnId) -> Option<&ColumnHeader> {
        self.columns.iter().find(|h| h.id == id)
    }

    pub fn column_index(&self, id: ColumnId) -> Option<usize> {
        self.columns.iter().position(|h| h.id == id)
    }

    pub fn entry_column(&self) -> &ColumnHeader {
        // Invariant: exactly one entry column, created in new()
        self.columns
            .iter()
            .find(|h| h.is_entry)
            .expect("grid always has an entry column")
    }

    pub fn row(&self, id: RowId) -> Option<&Row> {
        self.rows.iter().find(|r| r.id == id)
    }

    fn row_index(&self, id: RowId) -> Option<usize> {
        self.rows.iter().position(|r| r.id == id)
    }

    pub fn cell(&self, row: RowId, col: ColumnId) -> Option<&Cell> {
        let row = self.row(row)?;
        let idx = self.column_index(col)?;
        row.cells.get(idx)
    }

    fn cell_mut(&mut self, row: RowId, col: ColumnId) -> Option<&mut Cell> {
        let row_idx = self.row_index(row)?;
        let col_idx = self.column_index(col)?;
        self.rows[row_idx].cells.get_mut(col_idx)
    }

    /// Direct dependents of `col`, in header order.
    pub fn dependents_of(&self, col: ColumnId) -> Vec<ColumnId> {
        self.columns
            .iter()
            .filter(|h| h.source == Some(col))
            .map(|h| h.id)
            .collect()
    }

    /// How many columns are generated from `col`'s value.
    pub fn dependent_count(&self, col: ColumnId) -> usize {
        self.graph.dependent_count(col)
    }

    // ── Structural operations ───────────────────────────────────────

    /// Append a column whose default source is the current last column, and
    /// give every row one idle cell at the new position.
    pub fn add_column(&mut self, label: impl Into<String>, prompt: impl Into<String>) -> ColumnId {
        let source = self.columns.last().map(|h| h.id);
        let id = self.alloc_column();
        let header = ColumnHeader {
            id,
            label: label.into(),
            prompt: prompt.into(),
            source,
            is_entry: false,
        };
        // A fresh node cannot close a cycle
        if let Some(source) = source {
            self.graph
                .set_source(id, Some(source))
                .expect("new column cannot form a cycle");
        }
        self.columns.push(header);
        for row in &mut self.rows {
            row.cells.push(Cell::default());
        }
        id
    }

    /// Remove a column, its graph node, and the positional cell in every
    /// row. The entry column is protected. Other columns' dangling source
    /// references are left in place; they surface as configuration errors
    /// at generation time.
    pub fn remove_column(&mut self, id: ColumnId) -> Result<(), GridError> {
        let idx = self.column_index(id).ok_or(GridError::UnknownColumn(id))?;
        if self.columns[idx].is_entry {
            return Err(GridError::EntryColumn);
        }
        self.columns.remove(idx);
        self.graph.remove_column(id);
        for row in &mut self.rows {
            row.cells.remove(idx);
        }
        Ok(())
    }

    /// Rewire a column's source, rejecting cycles. The grid is untouched on
    /// error.
    pub fn set_column_source(
        &mut self,
        id: ColumnId,
        source: Option<ColumnId>,
    ) -> Result<(), GridError> {
        let idx = self.column_index(id).ok_or(GridError::UnknownColumn(id))?;
        if self.columns[idx].is_entry {
            return Err(GridError::EntryColumn);
        }
        self.graph.set_source(id, source)?;
        self.columns[idx].source = source;
        Ok(())
    }

    pub fn set_column_prompt(&mut self, id: ColumnId, prompt: impl Into<String>) -> Result<(), GridError> {
        let idx = self.column_index(id).ok_or(GridError::UnknownColumn(id))?;
        self.columns[idx].prompt = prompt.into();
        Ok(())
    }

    /// Append a row with one idle cell per column.
    pub fn add_row(&mut self) -> RowId {
        let id = RowId::from_raw(self.next_row);
        self.next_row += 1;
        self.rows.push(Row {
            id,
            cells: vec![Cell::default(); self.columns.len()],
        });
        id
    }

    pub fn remove_row(&mut self, id: RowId) -> Result<(), GridError> {
        let idx = self.row_index(id).ok_or(GridError::UnknownRow(id))?;
        self.rows.remove(idx);
        Ok(())
    }

    fn alloc_column(&mut self) -> ColumnId {
        let id = ColumnId::from_raw(self.next_column);
        self.next_column += 1;
        id
    }

    // ── Cell mutation ───────────────────────────────────────────────

    /// Manual edit (typing): value replaced, status back to idle, error
    /// cleared. Does not trigger propagation — that happens at the commit
    /// point.
    pub fn edit_cell(&mut self, row: RowId, col: ColumnId, text: &str) -> Result<(), GridError> {
        match self.cell_mut(row, col) {
            Some(cell) => {
                cell.reset_idle(text.to_string());
                Ok(())
            }
            None => {
                if self.row(row).is_none() {
                    Err(GridError::UnknownRow(row))
                } else {
                    Err(GridError::UnknownColumn(col))
                }
            }
        }
    }

    /// Apply one executor update to the stored cell.
    ///
    /// Updates for cells that no longer exist (row or column removed while
    /// a chain was in flight) are dropped silently.
    pub fn apply_update(&mut self, update: &CellUpdate) {
        let cell_ref = update.cell();
        let Some(cell) = self.cell_mut(cell_ref.row, cell_ref.col) else {
            return;
        };
        match update {
            CellUpdate::Pending { .. } => cell.set_pending(),
            CellUpdate::Succeeded { value, .. } => cell.set_succeeded(value.clone()),
            CellUpdate::Failed { error, .. } => cell.set_failed(error.clone()),
        }
    }

    // ── Chain execution ─────────────────────────────────────────────

    /// Snapshot everything a chain run needs for `row`, detached from the
    /// live grid (so the walk can also run on a worker thread).
    pub fn chain_context(&self, row: RowId) -> Option<ChainContext> {
        let row_ref = self.row(row)?;
        Some(ChainContext {
            row,
            headers: self.columns.clone(),
            values: row_ref.cells.iter().map(|c| c.value.clone()).collect(),
        })
    }

    /// Regenerate one cell (and, on success, its downstream chain) in place.
    ///
    /// `direct_input` carries a just-produced upstream value; `None` forces
    /// a fresh lookup from the current source cell.
    pub fn run_generation(
        &mut self,
        row: RowId,
        col: ColumnId,
        direct_input: Option<&str>,
        generator: &dyn Generator,
    ) -> ChainReport {
        let Some(ctx) = self.chain_context(row) else {
            return ChainReport::new();
        };
        let executor = ChainExecutor::new(generator);
        let mut updates = Vec::new();
        let report = executor.run(&ctx, col, direct_input, &mut |u| updates.push(u));
        for update in &updates {
            self.apply_update(update);
        }
        report
    }

    /// Commit point (blur): apply the edit, then regenerate each direct
    /// dependent using the committed text as its input.
    pub fn commit_edit(
        &mut self,
        row: RowId,
        col: ColumnId,
        text: &str,
        generator: &dyn Generator,
    ) -> Result<ChainReport, GridError> {
        self.edit_cell(row, col, text)?;
        let mut report = ChainReport::new();
        for dep in self.dependents_of(col) {
            report.merge(self.run_generation(row, dep, Some(text), generator));
        }
        Ok(report)
    }

    /// Per-cell "regenerate" action: fresh lookup from the current source
    /// cell value.
    pub fn regenerate(
        &mut self,
        row: RowId,
        col: ColumnId,
        generator: &dyn Generator,
    ) -> ChainReport {
        self.run_generation(row, col, None, generator)
    }

    /// Check structural invariants. Panics if any are violated.
    ///
    /// Only available in test builds.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        let entries = self.columns.iter().filter(|h| h.is_entry).count();
        assert_eq!(entries, 1, "exactly one entry column");
        for row in &self.rows {
            assert_eq!(
                row.cells.len(),
                self.columns.len(),
                "row {} out of lockstep with columns",
                row.id
            );
        }
    }
}
