//! Dependency graph for pipeline columns.
//!
//! Tracks, for each generated column, the column its input comes from,
//! plus the reverse adjacency for cycle checks.
//!
//! # Edge Direction
//!
//! ```text
//! A → B  means  "B is generated from A's value"  (A is B's source)
//! ```
//!
//! Unlike a formula grid, a column has at most one source, so the forward
//! side is a plain map. Source assignments are cycle-checked up front:
//! a chain that loops would otherwise recurse without bound at generation
//! time, where nothing guards against it.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::column::ColumnId;

/// Persistent dependency graph for pipeline columns.
///
/// # Invariants
///
/// 1. **Bidirectional consistency:** `source[B] == A` iff `B ∈ dependents[A]`.
/// 2. **No dangling entries:** empty dependent sets are removed, not stored.
/// 3. **Acyclic:** `set_source` is the only edge mutator and rejects cycles.
#[derive(Default, Debug, Clone)]
pub struct ColumnGraph {
    /// For each generated column B, the column A its input comes from.
    source: FxHashMap<ColumnId, ColumnId>,

    /// Reverse adjacency: for each column A, the columns generated from it.
    dependents: FxHashMap<ColumnId, FxHashSet<ColumnId>>,
}

impl ColumnGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// The configured source of `col`, if any.
    ///
    /// May name a column that no longer exists — removal leaves dangling
    /// references in place (they surface as configuration errors when the
    /// column next generates).
    pub fn source_of(&self, col: ColumnId) -> Option<ColumnId> {
        self.source.get(&col).copied()
    }

    /// Columns generated directly from `col`'s value.
    pub fn dependents(&self, col: ColumnId) -> impl Iterator<Item = ColumnId> + '_ {
        self.dependents
            .get(&col)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    pub fn dependent_count(&self, col: ColumnId) -> usize {
        self.dependents.get(&col).map_or(0, |s| s.len())
    }

    /// Rewire `col`'s source edge atomically. Pass `None` to clear it.
    ///
    /// Rejects assignments that would close a cycle; the graph is left
    /// untouched on error.
    pub fn set_source(
        &mut self,
        col: ColumnId,
        new_source: Option<ColumnId>,
    ) -> Result<(), CycleError> {
        if let Some(source) = new_source {
            if let Some(err) = self.would_create_cycle(col, source) {
                return Err(err);
            }
        }

        // Remove the old edge
        if let Some(old) = self.source.remove(&col) {
            if let Some(deps) = self.dependents.get_mut(&old) {
                deps.remove(&col);
                if deps.is_empty() {
                    self.dependents.remove(&old);
                }
            }
        }

        // Add the new one
        if let Some(source) = new_source {
            self.source.insert(col, source);
            self.dependents.entry(source).or_default().insert(col);
        }

        Ok(())
    }

    /// Drop a removed column's own edges.
    ///
    /// Edges *into* the removed column (other columns naming it as their
    /// source) are intentionally kept: the headers keep the dangling id, and
    /// the graph stays in lockstep with them.
    pub fn remove_column(&mut self, col: ColumnId) {
        if let Some(old) = self.source.remove(&col) {
            if let Some(deps) = self.dependents.get_mut(&old) {
                deps.remove(&col);
                if deps.is_empty() {
                    self.dependents.remove(&old);
                }
            }
        }
    }

    /// Check if assigning `new_source` as `col`'s source would close a cycle.
    ///
    /// Does not modify the graph. A cycle is created when `new_source` is
    /// reachable from `col` by following dependent edges (then `new_source`
    /// already depends, transitively, on `col`).
    pub fn would_create_cycle(&self, col: ColumnId, new_source: ColumnId) -> Option<CycleError> {
        if new_source == col {
            return Some(CycleError::self_reference(col));
        }

        let mut visited = FxHashSet::default();
        let mut stack = vec![(col, vec![col])];

        while let Some((current, path)) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }

            if let Some(deps) = self.dependents.get(&current) {
                for &dep in deps {
                    let mut next_path = path.clone();
                    next_path.push(dep);
                    if dep == new_source {
                        return Some(CycleError::cycle(next_path));
                    }
                    stack.push((dep, next_path));
                }
            }
        }

        None
    }

    /// Check all invariants. Panics if any are violated.
    ///
    /// Only available in test builds.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        for (col, source) in &self.source {
            assert!(
                self.dependents
                    .get(source)
                    .map_or(false, |s| s.contains(col)),
                "Missing dependent edge: {:?} should list {:?}",
                source,
                col
            );
        }

        for (col, deps) in &self.dependents {
            assert!(!deps.is_empty(), "Empty dependent set stored for {:?}", col);
            for dep in deps {
                assert_eq!(
                    self.source.get(dep),
                    Some(col),
                    "Dependent edge without matching source: {:?} -> {:?}",
                    col,
                    dep
                );
            }
        }
    }
}

/// Reported when a source assignment would close a cycle.
#[derive(Debug, Clone)]
pub struct CycleError {
    /// Columns along the offending path, in dependency order.
    pub columns: Vec<ColumnId>,

    /// Human-readable description of the cycle.
    pub message: String,
}

impl CycleError {
    pub fn self_reference(col: ColumnId) -> Self {
        Self {
            columns: vec![col],
            message: format!("column {} cannot use itself as a source", col),
        }
    }

    pub fn cycle(columns: Vec<ColumnId>) -> Self {
        let names: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        let message = format!("source assignment closes a cycle: {}", names.join(" → "));
        Self { columns, message }
    }
}

impl std::fmt::Display for CycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CycleError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(raw: u64) -> ColumnId {
        ColumnId::from_raw(raw)
    }

    #[test]
    fn test_empty_graph() {
        let graph = ColumnGraph::new();
        assert!(graph.source_of(col(1)).is_none());
        assert_eq!(graph.dependents(col(1)).count(), 0);
        graph.assert_consistent();
    }

    #[test]
    fn test_single_edge() {
        let mut graph = ColumnGraph::new();
        graph.set_source(col(2), Some(col(1))).unwrap();
        graph.assert_consistent();

        assert_eq!(graph.source_of(col(2)), Some(col(1)));
        assert_eq!(graph.dependents(col(1)).collect::<Vec<_>>(), vec![col(2)]);
        assert_eq!(graph.dependent_count(col(1)), 1);
    }

    #[test]
    fn test_multiple_dependents() {
        let mut graph = ColumnGraph::new();
        graph.set_source(col(2), Some(col(1))).unwrap();
        graph.set_source(col(3), Some(col(1))).unwrap();
        graph.assert_consistent();

        let mut deps: Vec<_> = graph.dependents(col(1)).collect();
        deps.sort();
        assert_eq!(deps, vec![col(2), col(3)]);
    }

    #[test]
    fn test_rewiring() {
        let mut graph = ColumnGraph::new();
        graph.set_source(col(3), Some(col(1))).unwrap();
        graph.set_source(col(3), Some(col(2))).unwrap();
        graph.assert_consistent();

        assert_eq!(graph.source_of(col(3)), Some(col(2)));
        assert_eq!(graph.dependents(col(1)).count(), 0);
        assert_eq!(graph.dependents(col(2)).collect::<Vec<_>>(), vec![col(3)]);
    }

    #[test]
    fn test_clear_source() {
        let mut graph = ColumnGraph::new();
        graph.set_source(col(2), Some(col(1))).unwrap();
        graph.set_source(col(2), None).unwrap();
        graph.assert_consistent();

        assert!(graph.source_of(col(2)).is_none());
        assert_eq!(graph.dependents(col(1)).count(), 0);
    }

    #[test]
    fn test_self_reference_rejected() {
        let mut graph = ColumnGraph::new();
        let err = graph.set_source(col(1), Some(col(1))).unwrap_err();
        assert!(err.message.contains("itself"));
        graph.assert_consistent();
    }

    #[test]
    fn test_two_column_cycle_rejected() {
        let mut graph = ColumnGraph::new();
        graph.set_source(col(2), Some(col(1))).unwrap();
        let err = graph.set_source(col(1), Some(col(2))).unwrap_err();
        assert!(err.message.contains("cycle"));
        // Graph unchanged by the failed assignment
        assert!(graph.source_of(col(1)).is_none());
        graph.assert_consistent();
    }

    #[test]
    fn test_indirect_cycle_rejected() {
        // 1 → 2 → 3, then 1's source = 3 would close the loop
        let mut graph = ColumnGraph::new();
        graph.set_source(col(2), Some(col(1))).unwrap();
        graph.set_source(col(3), Some(col(2))).unwrap();

        let err = graph.set_source(col(1), Some(col(3))).unwrap_err();
        assert_eq!(err.columns.first(), Some(&col(1)));
        assert_eq!(err.columns.last(), Some(&col(3)));
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        // 1 → 2, 1 → 3, and 4 fed by 2; rewiring 4 to 3 is fine
        let mut graph = ColumnGraph::new();
        graph.set_source(col(2), Some(col(1))).unwrap();
        graph.set_source(col(3), Some(col(1))).unwrap();
        graph.set_source(col(4), Some(col(2))).unwrap();
        graph.set_source(col(4), Some(col(3))).unwrap();
        graph.assert_consistent();
    }

    #[test]
    fn test_remove_column_keeps_dangling_inbound() {
        // 2 is generated from 1; removing 1 leaves 2's source dangling
        let mut graph = ColumnGraph::new();
        graph.set_source(col(2), Some(col(1))).unwrap();

        graph.remove_column(col(1));

        assert_eq!(graph.source_of(col(2)), Some(col(1)));
    }

    #[test]
    fn test_remove_column_drops_own_edge() {
        let mut graph = ColumnGraph::new();
        graph.set_source(col(2), Some(col(1))).unwrap();

        graph.remove_column(col(2));

        assert!(graph.source_of(col(2)).is_none());
        assert_eq!(graph.dependents(col(1)).count(), 0);
    }

    #[test]
    fn test_would_create_cycle_is_read_only() {
        let mut graph = ColumnGraph::new();
        graph.set_source(col(2), Some(col(1))).unwrap();

        assert!(graph.would_create_cycle(col(1), col(2)).is_some());
        assert!(graph.would_create_cycle(col(3), col(1)).is_none());
        graph.assert_consistent();
    }
}
