//! Mock catalog source for testing
//!
//! Returns predefined rows without connecting to any warehouse. Useful for
//! unit tests of the introspector and import pipeline, and for simulating
//! connection or per-schema failures.
//!
//! ```rust,ignore
//! let source = MockCatalog::new("analytics")
//!     .with_rows("public", vec![CatalogRow::new("public", "users", "id")]);
//! let rows = source.fetch_rows("public").await?;
//! ```

use crate::adapter::{CatalogRow, CatalogSource, FetchError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Mock catalog source
///
/// Cloning shares the stored rows and errors.
#[derive(Clone)]
pub struct MockCatalog {
    database: String,
    source_tag: String,

    /// Rows by schema
    rows: Arc<RwLock<HashMap<String, Vec<CatalogRow>>>>,

    /// Errors to return for specific schemas
    errors: Arc<RwLock<HashMap<String, FetchError>>>,

    fail_connection: bool,

    /// Simulate query latency (milliseconds)
    latency_ms: u64,
}

impl MockCatalog {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            source_tag: "mock".to_string(),
            rows: Arc::new(RwLock::new(HashMap::new())),
            errors: Arc::new(RwLock::new(HashMap::new())),
            fail_connection: false,
            latency_ms: 0,
        }
    }

    pub fn with_source_tag(mut self, tag: impl Into<String>) -> Self {
        self.source_tag = tag.into();
        self
    }

    /// Predefine the rows of one schema (builder form, before sharing)
    pub fn with_rows(self, schema: impl Into<String>, rows: Vec<CatalogRow>) -> Self {
        if let Ok(mut map) = self.rows.try_write() {
            map.insert(schema.into(), rows);
        }
        self
    }

    /// Fail every fetch and connection test as if the warehouse were unreachable
    pub fn with_connection_failure(mut self) -> Self {
        self.fail_connection = true;
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub async fn add_rows(&self, schema: &str, rows: Vec<CatalogRow>) {
        self.rows.write().await.entry(schema.to_string()).or_default().extend(rows);
    }

    /// Configure an error to be returned for one schema
    pub async fn add_error_for_schema(&self, schema: &str, error: FetchError) {
        self.errors.write().await.insert(schema.to_string(), error);
    }

    pub async fn clear_errors(&self) {
        self.errors.write().await.clear();
    }

    async fn simulate_latency(&self) {
        if self.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.latency_ms)).await;
        }
    }
}

#[async_trait::async_trait]
impl CatalogSource for MockCatalog {
    fn name(&self) -> &'static str {
        "Mock"
    }

    fn database(&self) -> &str {
        &self.database
    }

    fn source_tag(&self) -> &str {
        &self.source_tag
    }

    async fn fetch_rows(&self, schema: &str) -> Result<Vec<CatalogRow>, FetchError> {
        self.simulate_latency().await;

        if self.fail_connection {
            return Err(FetchError::Connection("Simulated connection failure".to_string()));
        }

        if let Some(error) = self.errors.read().await.get(schema) {
            return Err(error.clone());
        }

        // An unknown schema is simply empty, as in information_schema
        Ok(self.rows.read().await.get(schema).cloned().unwrap_or_default())
    }

    async fn test_connection(&self) -> Result<(), FetchError> {
        self.simulate_latency().await;

        if self.fail_connection {
            Err(FetchError::Connection("Simulated connection failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_rows_for_known_schema() {
        let source = MockCatalog::new("analytics")
            .with_rows("public", vec![CatalogRow::new("public", "users", "id")]);

        let rows = source.fetch_rows("public").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].table_name, "users");

        assert!(source.fetch_rows("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn connection_failure() {
        let source = MockCatalog::new("analytics").with_connection_failure();

        assert!(source.test_connection().await.is_err());
        let err = source.fetch_rows("public").await.unwrap_err();
        assert!(err.is_connection_error());
    }

    #[tokio::test]
    async fn per_schema_error_and_shared_clone() {
        let source = MockCatalog::new("analytics");
        let clone = source.clone();

        source
            .add_error_for_schema("secret", FetchError::PermissionDenied("secret".into()))
            .await;
        clone.add_rows("public", vec![CatalogRow::new("public", "users", "id")]).await;

        assert!(matches!(
            clone.fetch_rows("secret").await,
            Err(FetchError::PermissionDenied(_))
        ));
        assert_eq!(source.fetch_rows("public").await.unwrap().len(), 1);

        source.clear_errors().await;
        assert!(clone.fetch_rows("secret").await.unwrap().is_empty());
    }
}
