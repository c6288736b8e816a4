//! Catalog source trait for reading warehouse metadata rows

use serde::{Deserialize, Serialize};

/// One row of the catalog query: a (table, column) pair plus its constraint
///
/// A column with several constraints appears once per constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRow {
    pub schema_name: String,
    pub table_name: String,
    pub column_name: String,
    pub data_type: Option<String>,

    /// `YES` / `NO` as reported by `information_schema.columns`
    pub is_nullable: Option<String>,

    pub constraint_type: Option<String>,
    pub constraint_name: Option<String>,

    /// Only set for foreign keys
    pub referenced_schema: Option<String>,
    pub referenced_table: Option<String>,
    pub referenced_column: Option<String>,

    /// `BASE TABLE`, `VIEW`, ...
    pub object_type: Option<String>,
}

impl CatalogRow {
    /// A plain column row with no constraint
    pub fn new(schema_name: impl Into<String>, table_name: impl Into<String>, column_name: impl Into<String>) -> Self {
        Self {
            schema_name: schema_name.into(),
            table_name: table_name.into(),
            column_name: column_name.into(),
            ..Self::default()
        }
    }

    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    pub fn with_nullable(mut self, flag: impl Into<String>) -> Self {
        self.is_nullable = Some(flag.into());
        self
    }

    pub fn with_object_type(mut self, object_type: impl Into<String>) -> Self {
        self.object_type = Some(object_type.into());
        self
    }

    pub fn with_constraint(mut self, constraint_type: impl Into<String>, constraint_name: impl Into<String>) -> Self {
        self.constraint_type = Some(constraint_type.into());
        self.constraint_name = Some(constraint_name.into());
        self
    }

    /// Foreign key target; also sets the constraint type
    pub fn with_reference(
        mut self,
        constraint_name: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        self.constraint_type = Some("FOREIGN KEY".to_string());
        self.constraint_name = Some(constraint_name.into());
        self.referenced_schema = Some(schema.into());
        self.referenced_table = Some(table.into());
        self.referenced_column = Some(column.into());
        self
    }

    /// True when the row describes a foreign key with a target table
    pub fn is_foreign_key(&self) -> bool {
        let is_fk = self
            .constraint_type
            .as_deref()
            .is_some_and(|t| t.trim().eq_ignore_ascii_case("FOREIGN KEY"));
        let has_target = self
            .referenced_table
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty());

        is_fk && has_target
    }
}

/// Errors that can occur when reading the catalog
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Schema not found: {0}")]
    SchemaNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Query failed: {0}")]
    QueryError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl FetchError {
    /// Connection-level failures are fatal to a warehouse import
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::AuthenticationError(_))
    }
}

/// A warehouse whose system catalog can be read
#[async_trait::async_trait]
pub trait CatalogSource: Send + Sync {
    /// Get the source name (e.g., "Redshift", "PostgreSQL")
    fn name(&self) -> &'static str;

    /// Database the rows belong to; the first segment of every key
    fn database(&self) -> &str;

    /// Tag recorded on every table this source produces
    fn source_tag(&self) -> &str;

    /// Read every (table, column) row of one schema
    ///
    /// Rows come back ordered by table then column position.
    async fn fetch_rows(&self, schema: &str) -> Result<Vec<CatalogRow>, FetchError>;

    /// Test the connection to the warehouse
    async fn test_connection(&self) -> Result<(), FetchError>;
}
