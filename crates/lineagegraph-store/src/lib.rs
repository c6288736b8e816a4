//! Graph store and upsert engine
//!
//! This crate handles:
//! - The graph store trait with in-memory and Neo4j implementations
//! - Rendering units of work as idempotent Cypher merges
//! - Splitting batches into ordered units of work and applying them
//! - Import pipelines for the manifest and the warehouse catalog
//! - Upstream/downstream impact traversal

pub mod store;
pub mod memory;
pub mod cypher;
pub mod neo4j;
pub mod upsert;
pub mod impact;
pub mod import;

pub use store::{GraphStore, StoreError};
pub use memory::MemoryGraphStore;
pub use neo4j::Neo4jStore;
pub use upsert::{Phase, UnitOfWork, UpsertEngine, UpsertSummary};
pub use impact::ImpactGraph;
pub use import::{ImportError, Importer};
