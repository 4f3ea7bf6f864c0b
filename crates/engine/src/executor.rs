//! Chain execution: regenerate a cell and propagate to its dependents.
//!
//! The walker is deliberately detached from the live grid: it runs over a
//! [`ChainContext`] snapshot and reports every cell transition through a
//! sink callback. The grid drives it with a sink that applies updates in
//! place; the TUI drives it on a worker thread with a channel-sending sink
//! so the interface stays responsive during a long chain.
//!
//! # Sequencing
//!
//! Propagation is depth-first and each generation call completes before its
//! dependents are issued. A dependent always receives the value produced in
//! this pass as `direct_input` — never a re-read of stored state, which
//! could be stale by the time the call returns.

use std::time::Instant;

use crate::cell::CellRef;
use crate::column::{ColumnHeader, ColumnId};
use crate::grid::RowId;

/// Error returned by a generation adapter.
#[derive(Debug, Clone)]
pub struct GenerateError {
    message: String,
}

impl GenerateError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for GenerateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for GenerateError {}

/// The generation seam.
///
/// Implemented by the provider adapters and by scripted mocks in tests.
/// `prompt` is the column's instruction; `input` is the source cell's
/// value (or the value just produced upstream during propagation).
pub trait Generator {
    fn generate(&self, prompt: &str, input: &str) -> Result<String, GenerateError>;
}

/// One cell transition emitted during a chain run.
#[derive(Debug, Clone, PartialEq)]
pub enum CellUpdate {
    /// Generation started; any prior error is cleared.
    Pending { cell: CellRef },

    /// Generation produced `value`.
    Succeeded { cell: CellRef, value: String },

    /// Generation failed (adapter error) or could not start
    /// (configuration error). The cell keeps its previous value.
    Failed { cell: CellRef, error: String },
}

impl CellUpdate {
    pub fn cell(&self) -> CellRef {
        match self {
            CellUpdate::Pending { cell }
            | CellUpdate::Succeeded { cell, .. }
            | CellUpdate::Failed { cell, .. } => *cell,
        }
    }
}

/// Everything a chain run needs, detached from the live grid so the walk
/// can run on another thread.
#[derive(Debug, Clone)]
pub struct ChainContext {
    pub row: RowId,

    /// Column definitions in display order.
    pub headers: Vec<ColumnHeader>,

    /// Cell values for `row`, aligned with `headers`.
    pub values: Vec<String>,
}

impl ChainContext {
    fn header(&self, id: ColumnId) -> Option<&ColumnHeader> {
        self.headers.iter().find(|h| h.id == id)
    }

    fn value_of(&self, id: ColumnId) -> Option<&str> {
        self.headers
            .iter()
            .position(|h| h.id == id)
            .map(|idx| self.values[idx].as_str())
    }

    /// Direct dependents of `col`, in header order (deterministic).
    fn dependents_of(&self, col: ColumnId) -> impl Iterator<Item = ColumnId> + '_ {
        self.headers
            .iter()
            .filter(move |h| h.source == Some(col))
            .map(|h| h.id)
    }
}

/// An error recorded against a specific cell during a chain run.
#[derive(Debug, Clone)]
pub struct ChainError {
    pub cell: CellRef,
    pub error: String,
}

/// Report from one chain run.
#[derive(Debug, Clone, Default)]
pub struct ChainReport {
    /// Number of adapter calls issued.
    pub generated: usize,

    /// Cells that ended the run Succeeded.
    pub succeeded: usize,

    /// Cells that ended the run Failed (adapter and configuration errors).
    pub failed: usize,

    /// Longest dependency chain walked, counting the initial target as 1.
    pub max_depth: usize,

    /// Wall time for the whole run in milliseconds.
    pub duration_ms: u64,

    /// Cells whose value or status changed, in the order they changed.
    pub cells_changed: Vec<CellRef>,

    /// Errors encountered, one per failed cell.
    pub errors: Vec<ChainError>,
}

impl ChainReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold another run's counters into this one (commit points trigger one
    /// run per direct dependent).
    pub fn merge(&mut self, other: ChainReport) {
        self.generated += other.generated;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.max_depth = self.max_depth.max(other.max_depth);
        self.duration_ms += other.duration_ms;
        self.cells_changed.extend(other.cells_changed);
        self.errors.extend(other.errors);
    }

    /// Format as a one-line log entry.
    ///
    /// Format: `[chain] 1240ms  3 generated  depth=3  failed=0`
    pub fn log_line(&self) -> String {
        format!(
            "[chain] {:>4}ms  {} generated  depth={}  failed={}",
            self.duration_ms, self.generated, self.max_depth, self.failed
        )
    }
}

/// Walks dependency chains, calling the generator once per cell.
pub struct ChainExecutor<'a> {
    generator: &'a dyn Generator,
}

impl<'a> ChainExecutor<'a> {
    pub fn new(generator: &'a dyn Generator) -> Self {
        Self { generator }
    }

    /// Regenerate `target` for the context's row and propagate to its
    /// dependents, reporting each transition through `sink`.
    ///
    /// `direct_input` carries the value just produced upstream; when absent
    /// the input is read from the target's source column in the snapshot.
    pub fn run(
        &self,
        ctx: &ChainContext,
        target: ColumnId,
        direct_input: Option<&str>,
        sink: &mut dyn FnMut(CellUpdate),
    ) -> ChainReport {
        let start = Instant::now();
        let mut report = ChainReport::new();
        self.run_inner(ctx, target, direct_input, 1, sink, &mut report);
        report.duration_ms = start.elapsed().as_millis() as u64;
        report
    }

    fn run_inner(
        &self,
        ctx: &ChainContext,
        target: ColumnId,
        direct_input: Option<&str>,
        depth: usize,
        sink: &mut dyn FnMut(CellUpdate),
        report: &mut ChainReport,
    ) {
        let Some(header) = ctx.header(target) else {
            return; // target column no longer exists; nothing to do
        };

        // Entry columns are user-supplied, never generated.
        if header.is_entry {
            return;
        }

        let cell = CellRef::new(ctx.row, target);

        // Resolve the input text. Propagation passes it directly; a manual
        // regenerate reads the source cell from the snapshot.
        let input = match direct_input {
            Some(text) => text.to_string(),
            None => {
                let Some(source_id) = header.source else {
                    self.fail(
                        cell,
                        format!("column \"{}\" has no source column configured", header.label),
                        sink,
                        report,
                    );
                    return;
                };
                match ctx.value_of(source_id) {
                    Some(value) => value.to_string(),
                    None => {
                        self.fail(
                            cell,
                            format!(
                                "source column for \"{}\" no longer exists ({})",
                                header.label, source_id
                            ),
                            sink,
                            report,
                        );
                        return;
                    }
                }
            }
        };

        // Nothing to transform: no call, no status change.
        if input.trim().is_empty() {
            return;
        }

        report.max_depth = report.max_depth.max(depth);
        sink(CellUpdate::Pending { cell });

        report.generated += 1;
        match self.generator.generate(&header.prompt, &input) {
            Ok(value) => {
                report.succeeded += 1;
                report.cells_changed.push(cell);
                sink(CellUpdate::Succeeded {
                    cell,
                    value: value.clone(),
                });

                // Feed the just-produced value straight into each dependent.
                // A failure above never reaches here, so a failed branch
                // halts without touching downstream cells.
                for dep in ctx.dependents_of(target) {
                    self.run_inner(ctx, dep, Some(&value), depth + 1, sink, report);
                }
            }
            Err(err) => {
                self.fail(cell, err.to_string(), sink, report);
            }
        }
    }

    fn fail(
        &self,
        cell: CellRef,
        error: String,
        sink: &mut dyn FnMut(CellUpdate),
        report: &mut ChainReport,
    ) {
        report.failed += 1;
        report.cells_changed.push(cell);
        report.errors.push(ChainError {
            cell,
            error: error.clone(),
        });
        sink(CellUpdate::Failed { cell, error });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::MockGenerator;

    fn ctx(headers: Vec<ColumnHeader>, values: Vec<&str>) -> ChainContext {
        ChainContext {
            row: RowId::from_raw(1),
            headers,
            values: values.into_iter().map(String::from).collect(),
        }
    }

    fn cid(raw: u64) -> ColumnId {
        ColumnId::from_raw(raw)
    }

    fn three_step_headers() -> Vec<ColumnHeader> {
        vec![
            ColumnHeader::entry(cid(1), "Input"),
            ColumnHeader::generated(cid(2), "Summarize", "Summarize the text", cid(1)),
            ColumnHeader::generated(cid(3), "Translate", "Translate to French", cid(2)),
        ]
    }

    #[test]
    fn test_entry_column_is_never_generated() {
        let gen = MockGenerator::new();
        let ctx = ctx(three_step_headers(), vec!["Long text...", "", ""]);

        let mut updates = Vec::new();
        let report =
            ChainExecutor::new(&gen).run(&ctx, cid(1), None, &mut |u| updates.push(u));

        assert!(updates.is_empty());
        assert_eq!(gen.call_count(), 0);
        assert_eq!(report.generated, 0);
    }

    #[test]
    fn test_chain_propagates_depth_first_with_fresh_values() {
        let gen = MockGenerator::new()
            .respond("Summarize the text", "Short summary")
            .respond("Translate to French", "Résumé court");
        let ctx = ctx(three_step_headers(), vec!["Long text...", "", ""]);

        let mut updates = Vec::new();
        let report =
            ChainExecutor::new(&gen).run(&ctx, cid(2), Some("Long text..."), &mut |u| {
                updates.push(u)
            });

        // Pending/Succeeded for Summarize, then Pending/Succeeded for Translate
        assert_eq!(updates.len(), 4);
        assert_eq!(updates[0], CellUpdate::Pending { cell: CellRef::new(ctx.row, cid(2)) });
        assert_eq!(
            updates[1],
            CellUpdate::Succeeded {
                cell: CellRef::new(ctx.row, cid(2)),
                value: "Short summary".into()
            }
        );
        assert_eq!(
            updates[3],
            CellUpdate::Succeeded {
                cell: CellRef::new(ctx.row, cid(3)),
                value: "Résumé court".into()
            }
        );

        // Translate received the freshly produced summary, not grid state
        let calls = gen.calls();
        assert_eq!(calls[0], ("Summarize the text".into(), "Long text...".into()));
        assert_eq!(calls[1], ("Translate to French".into(), "Short summary".into()));

        assert_eq!(report.generated, 2);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(report.max_depth, 2);
    }

    #[test]
    fn test_failure_halts_branch_only() {
        // 2 and 4 both feed from 1; 2 fails, 4's branch still runs
        let headers = vec![
            ColumnHeader::entry(cid(1), "Input"),
            ColumnHeader::generated(cid(2), "Left", "left prompt", cid(1)),
            ColumnHeader::generated(cid(3), "LeftChild", "left child prompt", cid(2)),
            ColumnHeader::generated(cid(4), "Right", "right prompt", cid(1)),
        ];
        let gen = MockGenerator::new()
            .fail("left prompt", "model unavailable")
            .respond("right prompt", "right value");
        let ctx = ctx(headers, vec!["seed", "", "", ""]);

        let executor = ChainExecutor::new(&gen);
        let mut updates = Vec::new();
        let mut report = ChainReport::new();
        for dep in [cid(2), cid(4)] {
            report.merge(executor.run(&ctx, dep, Some("seed"), &mut |u| updates.push(u)));
        }

        assert_eq!(report.failed, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].cell.col, cid(2));
        // LeftChild never ran: no update mentions col3
        assert!(updates.iter().all(|u| u.cell().col != cid(3)));
        // Right ran to success
        assert!(updates.iter().any(|u| matches!(
            u,
            CellUpdate::Succeeded { cell, .. } if cell.col == cid(4)
        )));
    }

    #[test]
    fn test_dangling_source_fails_without_adapter_call() {
        let headers = vec![
            ColumnHeader::entry(cid(1), "Input"),
            // source id 9 matches no header
            ColumnHeader::generated(cid(2), "Orphan", "orphan prompt", cid(9)),
        ];
        let gen = MockGenerator::new();
        let ctx = ctx(headers, vec!["seed", ""]);

        let mut updates = Vec::new();
        let report =
            ChainExecutor::new(&gen).run(&ctx, cid(2), None, &mut |u| updates.push(u));

        assert_eq!(gen.call_count(), 0);
        assert_eq!(report.generated, 0);
        assert_eq!(report.failed, 1);
        assert_eq!(updates.len(), 1, "no Pending precedes a configuration error");
        match &updates[0] {
            CellUpdate::Failed { error, .. } => {
                assert!(error.contains("no longer exists"), "error: {}", error)
            }
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_source_config_fails_without_adapter_call() {
        let mut header = ColumnHeader::generated(cid(2), "Detached", "prompt", cid(1));
        header.source = None;
        let headers = vec![ColumnHeader::entry(cid(1), "Input"), header];
        let gen = MockGenerator::new();
        let ctx = ctx(headers, vec!["seed", ""]);

        let mut updates = Vec::new();
        ChainExecutor::new(&gen).run(&ctx, cid(2), None, &mut |u| updates.push(u));

        assert_eq!(gen.call_count(), 0);
        assert!(matches!(&updates[0], CellUpdate::Failed { error, .. }
            if error.contains("no source column configured")));
    }

    #[test]
    fn test_blank_input_is_a_no_op() {
        let gen = MockGenerator::new();
        let ctx = ctx(three_step_headers(), vec!["   \t ", "", ""]);

        let mut updates = Vec::new();
        let report =
            ChainExecutor::new(&gen).run(&ctx, cid(2), None, &mut |u| updates.push(u));

        assert!(updates.is_empty());
        assert_eq!(gen.call_count(), 0);
        assert_eq!(report.generated, 0);
        assert_eq!(report.failed, 0);
    }

    #[test]
    fn test_blank_direct_input_is_a_no_op() {
        let gen = MockGenerator::new();
        let ctx = ctx(three_step_headers(), vec!["ignored", "", ""]);

        let mut updates = Vec::new();
        ChainExecutor::new(&gen).run(&ctx, cid(2), Some("  "), &mut |u| updates.push(u));

        assert!(updates.is_empty());
        assert_eq!(gen.call_count(), 0);
    }

    #[test]
    fn test_regenerate_reads_current_source_value() {
        let gen = MockGenerator::new().respond("Translate to French", "Résumé court");
        // Summarize already holds a value; regenerating Translate reads it
        let ctx = ctx(three_step_headers(), vec!["Long text...", "Short summary", "old"]);

        let mut updates = Vec::new();
        ChainExecutor::new(&gen).run(&ctx, cid(3), None, &mut |u| updates.push(u));

        assert_eq!(
            gen.calls()[0],
            ("Translate to French".into(), "Short summary".into())
        );
        assert!(updates.iter().any(|u| matches!(
            u,
            CellUpdate::Succeeded { value, .. } if value == "Résumé court"
        )));
    }

    #[test]
    fn test_report_log_line() {
        let report = ChainReport {
            generated: 3,
            succeeded: 3,
            failed: 0,
            max_depth: 3,
            duration_ms: 1240,
            ..Default::default()
        };
        assert_eq!(report.log_line(), "[chain] 1240ms  3 generated  depth=3  failed=0");
    }

    #[test]
    fn test_unknown_target_is_ignored() {
        let gen = MockGenerator::new();
        let ctx = ctx(three_step_headers(), vec!["seed", "", ""]);

        let mut updates = Vec::new();
        let report =
            ChainExecutor::new(&gen).run(&ctx, cid(42), Some("seed"), &mut |u| updates.push(u));

        assert!(updates.is_empty());
        assert_eq!(report.generated, 0);
    }
}
