//! End-to-end tests: fixture manifest and mock warehouse into one graph

use lineagegraph_catalog::{CatalogRow, MockCatalog};
use lineagegraph_core::{
    ColumnKey, Config, NodeKind, NodeRef, ProjectConfig, RelType, TableKey, WarehouseConfig,
};
use lineagegraph_store::{GraphStore, ImportError, Importer, MemoryGraphStore, UpsertEngine};
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::sync::Arc;

fn fixture_config() -> Config {
    Config {
        project: ProjectConfig {
            path: PathBuf::from("../../fixtures/shop-project"),
            ..ProjectConfig::default()
        },
        warehouse: Some(WarehouseConfig {
            database: "analytics".to_string(),
            schema: "raw".to_string(),
            ..WarehouseConfig::default()
        }),
        ..Config::default()
    }
}

fn warehouse() -> MockCatalog {
    MockCatalog::new("analytics").with_source_tag("redshift").with_rows(
        "raw",
        vec![
            CatalogRow::new("raw", "customers", "id")
                .with_data_type("integer")
                .with_nullable("NO")
                .with_object_type("BASE TABLE")
                .with_constraint("PRIMARY KEY", "customers_pkey"),
            CatalogRow::new("raw", "customers", "first_name")
                .with_data_type("character varying")
                .with_nullable("YES")
                .with_object_type("BASE TABLE"),
            CatalogRow::new("raw", "orders", "id")
                .with_data_type("integer")
                .with_nullable("NO")
                .with_object_type("BASE TABLE"),
            CatalogRow::new("raw", "orders", "customer_id")
                .with_data_type("integer")
                .with_object_type("BASE TABLE")
                .with_reference("orders_customer_fk", "raw", "customers", "id"),
        ],
    )
}

fn importer<'a>(config: &'a Config, store: &MemoryGraphStore) -> Importer<'a> {
    Importer::new(config, UpsertEngine::new(Arc::new(store.clone()), 3))
}

#[tokio::test]
async fn manifest_import_is_idempotent() {
    let config = fixture_config();
    let store = MemoryGraphStore::new();
    let importer = importer(&config, &store);

    importer.import_manifest().await.unwrap();
    let once = store.snapshot().await;

    importer.import_manifest().await.unwrap();
    assert_eq!(store.snapshot().await, once);
}

#[tokio::test]
async fn manifest_and_warehouse_converge_on_one_table() {
    let config = fixture_config();
    let store = MemoryGraphStore::new();
    let importer = importer(&config, &store);

    let reports = importer.import_all(Some(&warehouse())).await.unwrap();
    assert_eq!(reports.len(), 2);

    let graph = store.snapshot().await;
    let orders = TableKey::new("analytics", "raw", "orders");
    assert_eq!(graph.tables().filter(|t| t.key == orders).count(), 1);

    let table = graph.table(&orders).unwrap();
    assert_eq!(table.object_type.as_deref(), Some("table"));
    assert!(table.sources.contains("raw"), "declared source tag missing: {:?}", table.sources);
    assert!(table.sources.contains("redshift"));

    // SQL lineage found the column, the catalog supplied its type
    let first_name = graph
        .column(&ColumnKey::new("analytics", "raw", "customers", "first_name"))
        .unwrap();
    assert_eq!(first_name.data_type.as_deref(), Some("character varying"));

    assert_eq!(graph.relationships_of(RelType::References).count(), 1);
}

#[tokio::test]
async fn import_order_does_not_matter() {
    let config = fixture_config();

    let manifest_first = MemoryGraphStore::new();
    let importer_a = importer(&config, &manifest_first);
    importer_a.import_manifest().await.unwrap();
    importer_a.import_warehouse(&warehouse()).await.unwrap();

    let warehouse_first = MemoryGraphStore::new();
    let importer_b = importer(&config, &warehouse_first);
    importer_b.import_warehouse(&warehouse()).await.unwrap();
    importer_b.import_manifest().await.unwrap();

    assert_eq!(manifest_first.snapshot().await, warehouse_first.snapshot().await);
}

#[tokio::test]
async fn warehouse_reimport_clears_a_dropped_constraint() {
    let config = fixture_config();
    let store = MemoryGraphStore::new();
    let importer = importer(&config, &store);
    let customer_id = ColumnKey::new("analytics", "raw", "orders", "customer_id");

    importer.import_warehouse(&warehouse()).await.unwrap();
    let before = store.snapshot().await;
    assert_eq!(before.column(&customer_id).unwrap().constraint_type.as_deref(), Some("FOREIGN KEY"));

    let dropped = MockCatalog::new("analytics").with_source_tag("redshift").with_rows(
        "raw",
        vec![CatalogRow::new("raw", "orders", "customer_id")
            .with_data_type("integer")
            .with_object_type("BASE TABLE")],
    );
    importer.import_warehouse(&dropped).await.unwrap();

    // a manifest pass afterwards must not bring it back either
    importer.import_manifest().await.unwrap();

    let graph = store.snapshot().await;
    let column = graph.column(&customer_id).unwrap();
    assert_eq!(column.constraint_type, None);
    assert_eq!(column.constraint_name, None);
    assert_eq!(column.data_type.as_deref(), Some("integer"));
}

#[tokio::test]
async fn column_impact_across_models() {
    let config = fixture_config();
    let store = MemoryGraphStore::new();
    importer(&config, &store).import_manifest().await.unwrap();

    let impact = store.impact().await;
    let raw_first_name = NodeRef::Column(ColumnKey::new("analytics", "raw", "customers", "first_name"));

    let downstream: Vec<String> = impact.downstream(&raw_first_name).iter().map(NodeRef::key).collect();
    assert!(downstream.contains(&"analytics.staging.stg_customers.first_name".to_string()));
    assert!(downstream.contains(&"analytics.marts.customer_orders.customer_name".to_string()));
}

#[tokio::test]
async fn store_failure_midway_leaves_a_consistent_graph() {
    let config = fixture_config();
    let store = MemoryGraphStore::new().with_failure_after(5);

    let err = importer(&config, &store).import_manifest().await.unwrap_err();
    assert!(matches!(err, ImportError::Store(_)));

    let partial = store.snapshot().await;
    assert!(partial.node_count_of(NodeKind::Table) > 0);
    for relationship in partial.relationships() {
        assert!(partial.contains(relationship.source()));
        assert!(partial.contains(relationship.target()));
    }

    // a retry against a healthy store converges to the full graph
    let healthy = MemoryGraphStore::new();
    importer(&config, &healthy).import_manifest().await.unwrap();
    let reference = healthy.snapshot().await;

    let retry = MemoryGraphStore::new();
    retry.apply(&partial).await.unwrap();
    importer(&config, &retry).import_manifest().await.unwrap();
    assert_eq!(retry.snapshot().await, reference);
}
