//! Cypher rendering of units of work
//!
//! Every write is `UNWIND $rows ... MERGE` keyed on the node's canonical
//! `key` property. Optional properties go through `coalesce` so a bare
//! reference never erases what another producer set, and table `sources`
//! are unioned rather than replaced. Column constraints read from the
//! catalog (`constraint_known`) are set as given, null included.

use lineagegraph_core::{GraphBatch, NodeKind, RelType, Relationship};
use serde::Serialize;
use serde_json::{json, Value};

/// One parameterised statement of the transactional HTTP API
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    pub statement: String,
    pub parameters: Value,
}

impl Statement {
    fn with_rows(statement: impl Into<String>, rows: Vec<Value>) -> Self {
        Self {
            statement: statement.into(),
            parameters: json!({ "rows": rows }),
        }
    }
}

const MERGE_TABLES: &str = "\
UNWIND $rows AS row
MERGE (t:Table {key: row.key})
SET t.database = row.database,
    t.schema = row.schema,
    t.name = row.name,
    t.object_type = coalesce(row.object_type, t.object_type),
    t.sources = reduce(acc = coalesce(t.sources, []), s IN row.sources |
        CASE WHEN s IN acc THEN acc ELSE acc + s END)";

const MERGE_MODELS: &str = "\
UNWIND $rows AS row
MERGE (m:Model {key: row.key})
SET m.name = coalesce(row.name, m.name),
    m.description = coalesce(row.description, m.description),
    m.tags = coalesce(row.tags, m.tags),
    m.materialized = coalesce(row.materialized, m.materialized)";

const MERGE_COLUMNS: &str = "\
UNWIND $rows AS row
MERGE (c:Column {key: row.key})
SET c.name = row.name,
    c.table_key = row.table_key,
    c.data_type = coalesce(row.data_type, c.data_type),
    c.nullable = coalesce(row.nullable, c.nullable),
    c.constraint_type = CASE WHEN row.constraint_known THEN row.constraint_type
        ELSE coalesce(row.constraint_type, c.constraint_type) END,
    c.constraint_name = CASE WHEN row.constraint_known THEN row.constraint_name
        ELSE coalesce(row.constraint_name, c.constraint_name) END
WITH c, row
MERGE (t:Table {key: row.table_key})
ON CREATE SET t.database = row.database, t.schema = row.schema, t.name = row.table, t.sources = []
MERGE (c)-[:BELONGS_TO]->(t)";

/// Uniqueness constraints on the key property of every label
pub fn schema_statements() -> Vec<Statement> {
    [NodeKind::Table, NodeKind::Column, NodeKind::Model]
        .iter()
        .map(|kind| Statement {
            statement: format!(
                "CREATE CONSTRAINT {}_key IF NOT EXISTS FOR (n:{}) REQUIRE n.key IS UNIQUE",
                kind.label().to_lowercase(),
                kind.label()
            ),
            parameters: json!({}),
        })
        .collect()
}

/// Statements for one unit, nodes before relationships
///
/// Run in one transaction, so every relationship's endpoints are merged
/// in the same unit of work.
pub fn unit_statements(unit: &GraphBatch) -> Vec<Statement> {
    let mut statements = Vec::new();

    let tables: Vec<Value> = unit
        .tables()
        .map(|t| {
            json!({
                "key": t.key.key(),
                "database": t.key.database(),
                "schema": t.key.schema(),
                "name": t.key.name(),
                "object_type": t.object_type,
                "sources": t.sources,
            })
        })
        .collect();
    if !tables.is_empty() {
        statements.push(Statement::with_rows(MERGE_TABLES, tables));
    }

    let models: Vec<Value> = unit
        .models()
        .map(|m| {
            json!({
                "key": m.key.as_str(),
                "name": m.name,
                "description": m.description,
                "tags": m.tags,
                "materialized": m.materialized,
            })
        })
        .collect();
    if !models.is_empty() {
        statements.push(Statement::with_rows(MERGE_MODELS, models));
    }

    let columns: Vec<Value> = unit
        .columns()
        .map(|c| {
            let table = c.key.table();
            json!({
                "key": c.key.key(),
                "name": c.key.column(),
                "table_key": table.key(),
                "database": table.database(),
                "schema": table.schema(),
                "table": table.name(),
                "data_type": c.data_type,
                "nullable": c.nullable.as_flag(),
                "constraint_type": c.constraint_type,
                "constraint_name": c.constraint_name,
                "constraint_known": c.constraint_known,
            })
        })
        .collect();
    if !columns.is_empty() {
        statements.push(Statement::with_rows(MERGE_COLUMNS, columns));
    }

    // BELONGS_TO is written with its column above
    for rel_type in RelType::ALL.iter().filter(|t| **t != RelType::BelongsTo) {
        let rows: Vec<Value> = unit
            .relationships_of(*rel_type)
            .map(relationship_row)
            .collect();
        if !rows.is_empty() {
            statements.push(Statement::with_rows(merge_relationships(*rel_type), rows));
        }
    }

    statements
}

fn relationship_row(relationship: &Relationship) -> Value {
    json!({
        "source": relationship.source().key(),
        "target": relationship.target().key(),
    })
}

/// `MERGE` for one relationship type; endpoints are merged, never matched
pub fn merge_relationships(rel_type: RelType) -> String {
    let (source, target) = rel_type.endpoints();
    format!(
        "UNWIND $rows AS row\n\
         MERGE (s:{} {{key: row.source}})\n\
         MERGE (t:{} {{key: row.target}})\n\
         MERGE (s)-[:{}]->(t)",
        source.label(),
        target.label(),
        rel_type.as_str()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineagegraph_core::{ColumnKey, ColumnNode, ModelKey, ModelNode, TableKey, TableNode};
    use pretty_assertions::assert_eq;

    #[test]
    fn relationship_merge_creates_endpoints() {
        assert_eq!(
            merge_relationships(RelType::FeedsDataInto),
            "UNWIND $rows AS row\n\
             MERGE (s:Table {key: row.source})\n\
             MERGE (t:Model {key: row.target})\n\
             MERGE (s)-[:FEEDS_DATA_INTO]->(t)"
        );
    }

    #[test]
    fn nodes_come_before_relationships() {
        let mut unit = GraphBatch::new();
        unit.merge_model(ModelNode {
            name: Some("stg_orders".to_string()),
            ..ModelNode::new(ModelKey::new("model.shop.stg_orders"))
        });
        unit.relate(Relationship::transformed_to(
            ColumnKey::new("analytics", "raw", "orders", "id"),
            ColumnKey::new("analytics", "staging", "stg_orders", "order_id"),
        ));

        let statements = unit_statements(&unit);
        let heads: Vec<&str> = statements
            .iter()
            .map(|s| s.statement.lines().nth(1).unwrap_or_default())
            .collect();

        assert_eq!(
            heads,
            vec![
                "MERGE (t:Table {key: row.key})",
                "MERGE (m:Model {key: row.key})",
                "MERGE (c:Column {key: row.key})",
                "MERGE (s:Column {key: row.source})",
            ]
        );
    }

    #[test]
    fn table_rows_carry_sources_and_nulls() {
        let mut unit = GraphBatch::new();
        unit.merge_table(TableNode::new(TableKey::new("analytics", "raw", "orders")).with_source("shop"));

        let statements = unit_statements(&unit);
        assert_eq!(statements.len(), 1);
        assert_eq!(
            statements[0].parameters,
            json!({
                "rows": [{
                    "key": "analytics.raw.orders",
                    "database": "analytics",
                    "schema": "raw",
                    "name": "orders",
                    "object_type": null,
                    "sources": ["shop"],
                }]
            })
        );
    }

    #[test]
    fn catalog_columns_set_constraints_as_given() {
        let key = TableKey::new("analytics", "raw", "orders").column("customer_id");
        let mut unit = GraphBatch::new();
        unit.merge_column(ColumnNode::new(key).with_constraint(None, None));

        let statements = unit_statements(&unit);
        let columns = statements.last().unwrap();
        assert!(columns.statement.contains("CASE WHEN row.constraint_known THEN row.constraint_type"));

        let row = &columns.parameters["rows"][0];
        assert_eq!(row["constraint_known"], json!(true));
        assert_eq!(row["constraint_type"], Value::Null);
    }

    #[test]
    fn constraints_for_every_label() {
        let statements = schema_statements();
        assert_eq!(statements.len(), 3);
        assert_eq!(
            statements[0].statement,
            "CREATE CONSTRAINT table_key IF NOT EXISTS FOR (n:Table) REQUIRE n.key IS UNIQUE"
        );
    }

    #[test]
    fn empty_unit_renders_nothing() {
        assert!(unit_statements(&GraphBatch::new()).is_empty());
    }
}
