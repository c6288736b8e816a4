//! Graph upsert engine
//!
//! Splits an assembled [`GraphBatch`] into units of work and applies them to a
//! [`GraphStore`] in dependency order: tables, models, columns (with their
//! `BELONGS_TO` edges), then relationships by type. Every unit is itself a
//! valid batch, so a relationship unit also merges its endpoints and a run
//! interrupted between units never leaves an edge on a missing node.

use crate::store::{GraphStore, StoreError};
use lineagegraph_core::{GraphBatch, GraphConfig, NodeKind, RelType};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// What a unit of work carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Nodes(NodeKind),
    Relationships(RelType),
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nodes(kind) => write!(f, "{} nodes", kind),
            Self::Relationships(rel_type) => write!(f, "{} relationships", rel_type),
        }
    }
}

/// One transaction's worth of merges
#[derive(Debug, Clone, PartialEq)]
pub struct UnitOfWork {
    pub phase: Phase,
    pub batch: GraphBatch,
}

/// Outcome of applying a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub units: usize,
    pub nodes: usize,
    pub relationships: usize,
}

/// Applies batches to a graph store
#[derive(Clone)]
pub struct UpsertEngine {
    store: Arc<dyn GraphStore>,
    batch_size: usize,
}

impl UpsertEngine {
    /// A batch size of 0 is treated as 1
    pub fn new(store: Arc<dyn GraphStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    pub fn from_config(store: Arc<dyn GraphStore>, config: &GraphConfig) -> Self {
        Self::new(store, config.batch_size)
    }

    pub fn store(&self) -> &dyn GraphStore {
        self.store.as_ref()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Split a batch into ordered, self-contained units
    pub fn plan(&self, batch: &GraphBatch) -> Vec<UnitOfWork> {
        let mut units = Vec::new();

        let tables: Vec<_> = batch.tables().collect();
        for chunk in tables.chunks(self.batch_size) {
            let mut unit = GraphBatch::new();
            for table in chunk {
                unit.merge_table((*table).clone());
            }
            units.push(UnitOfWork { phase: Phase::Nodes(NodeKind::Table), batch: unit });
        }

        let models: Vec<_> = batch.models().collect();
        for chunk in models.chunks(self.batch_size) {
            let mut unit = GraphBatch::new();
            for model in chunk {
                unit.merge_model((*model).clone());
            }
            units.push(UnitOfWork { phase: Phase::Nodes(NodeKind::Model), batch: unit });
        }

        // merge_column also merges the table and the BELONGS_TO edge
        let columns: Vec<_> = batch.columns().collect();
        for chunk in columns.chunks(self.batch_size) {
            let mut unit = GraphBatch::new();
            for column in chunk {
                unit.merge_column((*column).clone());
            }
            units.push(UnitOfWork { phase: Phase::Nodes(NodeKind::Column), batch: unit });
        }

        for rel_type in RelType::ALL.into_iter().filter(|t| *t != RelType::BelongsTo) {
            let relationships: Vec<_> = batch.relationships_of(rel_type).collect();
            for chunk in relationships.chunks(self.batch_size) {
                let mut unit = GraphBatch::new();
                for relationship in chunk {
                    unit.relate((*relationship).clone());
                }
                units.push(UnitOfWork { phase: Phase::Relationships(rel_type), batch: unit });
            }
        }

        units
    }

    /// Create store constraints; call once before the first apply
    pub async fn prepare(&self) -> Result<(), StoreError> {
        self.store.ensure_schema().await
    }

    /// Apply every unit in order, stopping at the first store error
    ///
    /// Units already applied stay applied.
    pub async fn apply(&self, batch: &GraphBatch) -> Result<UpsertSummary, StoreError> {
        let units = self.plan(batch);
        info!(
            store = self.store.name(),
            units = units.len(),
            nodes = batch.node_count(),
            relationships = batch.relationship_count(),
            "Applying batch"
        );

        for (index, unit) in units.iter().enumerate() {
            debug!(unit = index + 1, of = units.len(), phase = %unit.phase, "Applying unit");
            self.store.apply(&unit.batch).await?;
        }

        Ok(UpsertSummary {
            units: units.len(),
            nodes: batch.node_count(),
            relationships: batch.relationship_count(),
        })
    }
}
