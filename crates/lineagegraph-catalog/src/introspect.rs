//! Warehouse schema introspection
//!
//! Turns catalog rows into table and column nodes, `BELONGS_TO` edges and
//! `REFERENCES` edges for foreign keys. The rows of one fetch are treated as
//! a single snapshot; nothing is re-read.

use crate::adapter::{CatalogRow, CatalogSource, FetchError};
use lineagegraph_core::{
    ColumnKey, ColumnNode, Diagnostic, DiagnosticCode, GraphBatch, ImportReport, ImportSource,
    Nullability, Relationship, TableKey, TableNode,
};
use tracing::{debug, info, warn};

/// Result of one introspection pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogLineage {
    pub batch: GraphBatch,
    pub diagnostics: Vec<Diagnostic>,

    /// Number of catalog rows consumed
    pub rows: usize,
}

impl CatalogLineage {
    pub fn to_report(&self) -> ImportReport {
        ImportReport::from_batch(ImportSource::Warehouse, &self.batch, self.diagnostics.clone())
    }
}

/// Builds graph batches from catalog rows of one database
#[derive(Debug, Clone)]
pub struct SchemaIntrospector {
    database: String,
    source_tag: String,
}

impl SchemaIntrospector {
    pub fn new(database: impl Into<String>, source_tag: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            source_tag: source_tag.into(),
        }
    }

    /// Introspector keyed on the source's database and tag
    pub fn for_source(source: &dyn CatalogSource) -> Self {
        Self::new(source.database(), source.source_tag())
    }

    pub fn introspect(&self, rows: &[CatalogRow]) -> CatalogLineage {
        let mut lineage = CatalogLineage {
            rows: rows.len(),
            ..CatalogLineage::default()
        };

        for row in rows {
            self.add_row(row, &mut lineage);
        }

        info!(
            rows = lineage.rows,
            tables = lineage.batch.tables().count(),
            columns = lineage.batch.columns().count(),
            "Introspected catalog"
        );
        lineage
    }

    fn add_row(&self, row: &CatalogRow, lineage: &mut CatalogLineage) {
        let table = TableKey::new(&self.database, &row.schema_name, &row.table_name);

        let mut table_node = TableNode::new(table.clone()).with_source(&self.source_tag);
        if let Some(object_type) = row.object_type.as_deref().filter(|t| !t.trim().is_empty()) {
            table_node = table_node.with_object_type(object_kind(object_type));
        }
        lineage.batch.merge_table(table_node);

        let column = table.column(&row.column_name);
        let mut column_node = ColumnNode::new(column.clone())
            .with_nullability(Nullability::from_flag(row.is_nullable.as_deref()))
            .with_constraint(non_blank(&row.constraint_type), non_blank(&row.constraint_name));
        if let Some(data_type) = non_blank(&row.data_type) {
            column_node = column_node.with_data_type(data_type);
        }
        lineage.batch.merge_column(column_node);

        if row.is_foreign_key() {
            self.add_reference(row, column, lineage);
        }
    }

    fn add_reference(&self, row: &CatalogRow, column: ColumnKey, lineage: &mut CatalogLineage) {
        let Some(referenced_column) = non_blank(&row.referenced_column) else {
            warn!(column = %column, "Foreign key without a referenced column");
            lineage.diagnostics.push(
                Diagnostic::warn(
                    DiagnosticCode::IncompleteForeignKey,
                    format!(
                        "Foreign key {} references {} but no column",
                        row.constraint_name.as_deref().unwrap_or("<unnamed>"),
                        row.referenced_table.as_deref().unwrap_or_default()
                    ),
                )
                .with_subject(column.key()),
            );
            return;
        };

        let schema = non_blank(&row.referenced_schema).unwrap_or_else(|| row.schema_name.clone());
        let referenced_table = TableKey::new(
            &self.database,
            &schema,
            row.referenced_table.as_deref().unwrap_or_default(),
        );
        let referenced = referenced_table.column(&referenced_column);

        debug!(from = %column, to = %referenced, "Foreign key");
        lineage.batch.merge_table(TableNode::new(referenced_table).with_source(&self.source_tag));
        lineage.batch.relate(Relationship::references(column, referenced));
    }
}

/// Read one schema from a source and introspect it
pub async fn introspect_schema(
    source: &dyn CatalogSource,
    schema: &str,
) -> Result<CatalogLineage, FetchError> {
    info!(source = source.name(), database = source.database(), schema, "Reading catalog");
    let rows = source.fetch_rows(schema).await?;
    Ok(SchemaIntrospector::for_source(source).introspect(&rows))
}

/// `BASE TABLE` → `table`, `VIEW` → `view`, anything else lowercased
pub fn object_kind(object_type: &str) -> String {
    match object_type.trim().to_uppercase().as_str() {
        "BASE TABLE" | "TABLE" => "table".to_string(),
        "VIEW" => "view".to_string(),
        other => other.to_lowercase(),
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
