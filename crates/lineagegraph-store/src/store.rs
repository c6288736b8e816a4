//! Graph store trait

use lineagegraph_core::GraphBatch;

/// Errors raised by a graph store
///
/// Any of these fails the import that hit it. Units applied before the
/// failure stay applied; re-running the import converges because every
/// write is a merge.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Cannot reach graph store: {0}")]
    Connection(String),

    #[error("Graph store authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Graph store rejected the write ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("Invalid response from graph store: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// A property graph that accepts merge-by-key writes
///
/// `apply` must be idempotent: applying the same unit twice leaves the graph
/// as applying it once. Properties absent from the unit are left untouched,
/// and source tags on tables are unioned.
#[async_trait::async_trait]
pub trait GraphStore: Send + Sync {
    /// Get the store name (e.g., "Neo4j", "Memory")
    fn name(&self) -> &'static str;

    /// Create uniqueness constraints on node keys if missing
    async fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Merge one self-contained unit of work as a single transaction
    async fn apply(&self, unit: &GraphBatch) -> Result<(), StoreError>;

    /// Test the connection to the store
    async fn test_connection(&self) -> Result<(), StoreError>;
}
