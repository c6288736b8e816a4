//! In-memory graph store
//!
//! Keeps the merged graph as one [`GraphBatch`], which already has the
//! store's merge semantics (key identity, property overwrite only when
//! known, unioned source tags). Used for dry runs, impact queries and tests.

use crate::impact::ImpactGraph;
use crate::store::{GraphStore, StoreError};
use lineagegraph_core::GraphBatch;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory graph store
///
/// Cloning shares the underlying graph.
#[derive(Debug, Clone, Default)]
pub struct MemoryGraphStore {
    graph: Arc<RwLock<GraphBatch>>,

    /// Units applied successfully
    applied: Arc<AtomicUsize>,

    /// Reject every unit after this many have been applied
    fail_after: Option<usize>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a store that starts rejecting writes after `units` units
    pub fn with_failure_after(mut self, units: usize) -> Self {
        self.fail_after = Some(units);
        self
    }

    /// A copy of the current graph
    pub async fn snapshot(&self) -> GraphBatch {
        self.graph.read().await.clone()
    }

    pub fn units_applied(&self) -> usize {
        self.applied.load(Ordering::SeqCst)
    }

    /// Traversal view over the current graph
    pub async fn impact(&self) -> ImpactGraph {
        ImpactGraph::from_batch(&*self.graph.read().await)
    }

    pub async fn clear(&self) {
        *self.graph.write().await = GraphBatch::new();
        self.applied.store(0, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl GraphStore for MemoryGraphStore {
    fn name(&self) -> &'static str {
        "Memory"
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn apply(&self, unit: &GraphBatch) -> Result<(), StoreError> {
        let mut graph = self.graph.write().await;

        if let Some(limit) = self.fail_after {
            if self.applied.load(Ordering::SeqCst) >= limit {
                return Err(StoreError::Rejected {
                    code: "Memory.Simulated".to_string(),
                    message: format!("write rejected after {} unit(s)", limit),
                });
            }
        }

        graph.extend(unit.clone());
        self.applied.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn test_connection(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineagegraph_core::{ColumnNode, ColumnKey, Nullability, TableKey, TableNode};
    use pretty_assertions::assert_eq;

    fn unit() -> GraphBatch {
        let mut batch = GraphBatch::new();
        batch.merge_table(TableNode::new(TableKey::new("analytics", "raw", "orders")).with_source("shop"));
        batch.merge_column(
            ColumnNode::new(ColumnKey::new("analytics", "raw", "orders", "id")).with_data_type("integer"),
        );
        batch
    }

    #[tokio::test]
    async fn applying_twice_is_a_no_op() {
        let store = MemoryGraphStore::new();
        store.apply(&unit()).await.unwrap();
        let once = store.snapshot().await;

        store.apply(&unit()).await.unwrap();
        assert_eq!(store.snapshot().await, once);
        assert_eq!(store.units_applied(), 2);
    }

    #[tokio::test]
    async fn later_writes_only_fill_known_properties() {
        let store = MemoryGraphStore::new();
        store.apply(&unit()).await.unwrap();

        // a bare SQL-discovered column must not blank the catalog type
        let mut bare = GraphBatch::new();
        bare.merge_column(ColumnNode::new(ColumnKey::new("analytics", "raw", "orders", "id")));
        bare.merge_table(TableNode::new(TableKey::new("analytics", "raw", "orders")).with_source("redshift"));
        store.apply(&bare).await.unwrap();

        let graph = store.snapshot().await;
        let column = graph.column(&ColumnKey::new("analytics", "raw", "orders", "id")).unwrap();
        assert_eq!(column.data_type.as_deref(), Some("integer"));
        assert_eq!(column.nullable, Nullability::Unknown);

        let table = graph.table(&TableKey::new("analytics", "raw", "orders")).unwrap();
        assert_eq!(table.sources.len(), 2);
    }

    #[tokio::test]
    async fn simulated_failure() {
        let store = MemoryGraphStore::new().with_failure_after(1);

        store.apply(&unit()).await.unwrap();
        assert!(matches!(store.apply(&unit()).await, Err(StoreError::Rejected { .. })));
        assert_eq!(store.units_applied(), 1);
    }

    #[tokio::test]
    async fn clones_share_the_graph() {
        let store = MemoryGraphStore::new();
        let clone = store.clone();

        clone.apply(&unit()).await.unwrap();
        assert_eq!(store.snapshot().await.node_count(), 2);

        store.clear().await;
        assert!(clone.snapshot().await.is_empty());
    }
}
