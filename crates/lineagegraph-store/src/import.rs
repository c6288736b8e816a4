//! Import pipelines: manifest and warehouse into the graph store
//!
//! Each pipeline assembles a full batch first, then hands it to the upsert
//! engine. Per-item problems end up as diagnostics in the report; only a
//! missing manifest, an unreachable warehouse or a store failure abort.

use crate::store::StoreError;
use crate::upsert::UpsertEngine;
use lineagegraph_catalog::{introspect_schema, CatalogLineage, CatalogSource, FetchError};
use lineagegraph_core::{Config, GraphBatch, ImportReport};
use lineagegraph_dbt::{Manifest, ManifestAssembler, ManifestError, ManifestLineage};
use std::path::PathBuf;
use tracing::info;

const DEFAULT_SCHEMA: &str = "public";

/// Errors that abort an import
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Manifest not found at {0}; compile the project first")]
    ArtifactMissing(PathBuf),

    #[error(transparent)]
    Manifest(ManifestError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ManifestError> for ImportError {
    fn from(e: ManifestError) -> Self {
        match e {
            ManifestError::ArtifactMissing(path) => Self::ArtifactMissing(path),
            other => Self::Manifest(other),
        }
    }
}

/// Runs imports against one configuration
///
/// Without an engine every import is a dry run: batches are assembled and
/// reported but nothing is written.
pub struct Importer<'a> {
    config: &'a Config,
    engine: Option<UpsertEngine>,
}

impl<'a> Importer<'a> {
    pub fn new(config: &'a Config, engine: UpsertEngine) -> Self {
        Self {
            config,
            engine: Some(engine),
        }
    }

    pub fn dry_run(config: &'a Config) -> Self {
        Self { config, engine: None }
    }

    pub fn is_dry_run(&self) -> bool {
        self.engine.is_none()
    }

    /// Load the manifest and assemble its lineage without writing anything
    pub fn assemble_manifest(&self) -> Result<ManifestLineage, ImportError> {
        let path = self.config.project.manifest_path();
        info!(manifest = %path.display(), "Loading manifest");

        let manifest = Manifest::from_file(&path)?;
        Ok(ManifestAssembler::from_config(self.config).assemble(&manifest))
    }

    pub async fn import_manifest(&self) -> Result<ImportReport, ImportError> {
        let lineage = self.assemble_manifest()?;
        let units = self.write(&lineage.batch).await?;
        Ok(lineage.to_report().with_units_applied(units))
    }

    /// Schema named in `[warehouse]`, or `public`
    pub fn warehouse_schema(&self) -> &str {
        self.config
            .warehouse
            .as_ref()
            .map(|w| w.schema.as_str())
            .unwrap_or(DEFAULT_SCHEMA)
    }

    /// Read and introspect the configured schema without writing anything
    pub async fn introspect_warehouse(&self, source: &dyn CatalogSource) -> Result<CatalogLineage, ImportError> {
        Ok(introspect_schema(source, self.warehouse_schema()).await?)
    }

    pub async fn import_warehouse(&self, source: &dyn CatalogSource) -> Result<ImportReport, ImportError> {
        let lineage = self.introspect_warehouse(source).await?;
        let units = self.write(&lineage.batch).await?;
        Ok(lineage.to_report().with_units_applied(units))
    }

    /// Manifest pass, then the warehouse pass when a source is given
    pub async fn import_all(&self, source: Option<&dyn CatalogSource>) -> Result<Vec<ImportReport>, ImportError> {
        let mut reports = vec![self.import_manifest().await?];
        if let Some(source) = source {
            reports.push(self.import_warehouse(source).await?);
        }
        Ok(reports)
    }

    async fn write(&self, batch: &GraphBatch) -> Result<usize, ImportError> {
        let Some(engine) = &self.engine else {
            info!(nodes = batch.node_count(), relationships = batch.relationship_count(), "Dry run; nothing written");
            return Ok(0);
        };

        engine.prepare().await?;
        let summary = engine.apply(batch).await?;
        Ok(summary.units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryGraphStore;
    use lineagegraph_catalog::{CatalogRow, MockCatalog};
    use lineagegraph_core::{ImportSource, ProjectConfig};
    use serde_json::json;
    use std::sync::Arc;

    fn project() -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("target")).unwrap();

        let manifest = json!({
            "metadata": {"adapter_type": "redshift"},
            "nodes": {
                "model.shop.stg_orders": {
                    "unique_id": "model.shop.stg_orders",
                    "name": "stg_orders",
                    "resource_type": "model",
                    "database": "analytics",
                    "schema": "staging",
                    "relation_name": "\"analytics\".\"staging\".\"stg_orders\"",
                    "compiled_code": "select o.id as order_id, o.amount from analytics.raw.orders o",
                    "config": {"materialized": "view"},
                    "depends_on": {"nodes": ["source.shop.raw.orders"]}
                }
            },
            "sources": {}
        });
        std::fs::write(dir.path().join("target/manifest.json"), manifest.to_string()).unwrap();

        let config = Config {
            project: ProjectConfig {
                path: dir.path().to_path_buf(),
                ..ProjectConfig::default()
            },
            ..Config::default()
        };
        (dir, config)
    }

    #[tokio::test]
    async fn manifest_import_writes_and_reports() {
        let (_dir, config) = project();
        let store = MemoryGraphStore::new();
        let importer = Importer::new(&config, UpsertEngine::new(Arc::new(store.clone()), 500));

        let report = importer.import_manifest().await.unwrap();
        assert_eq!(report.source, ImportSource::Manifest);
        assert_eq!(report.summary.models, 1);
        assert!(report.summary.units_applied > 0);
        assert_eq!(store.snapshot().await.node_count(), report.summary.tables + report.summary.columns + 1);
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let (_dir, config) = project();
        let importer = Importer::dry_run(&config);

        let report = importer.import_manifest().await.unwrap();
        assert!(importer.is_dry_run());
        assert_eq!(report.summary.units_applied, 0);
        assert_eq!(report.summary.models, 1);
    }

    #[tokio::test]
    async fn missing_manifest_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            project: ProjectConfig {
                path: dir.path().to_path_buf(),
                ..ProjectConfig::default()
            },
            ..Config::default()
        };

        let err = Importer::dry_run(&config).import_manifest().await.unwrap_err();
        assert!(matches!(err, ImportError::ArtifactMissing(_)));
    }

    #[tokio::test]
    async fn warehouse_import_uses_default_schema() {
        let (_dir, config) = project();
        let source = MockCatalog::new("analytics")
            .with_rows("public", vec![CatalogRow::new("public", "users", "id")]);

        let importer = Importer::dry_run(&config);
        assert_eq!(importer.warehouse_schema(), "public");

        let report = importer.import_warehouse(&source).await.unwrap();
        assert_eq!(report.source, ImportSource::Warehouse);
        assert_eq!(report.summary.columns, 1);
    }

    #[tokio::test]
    async fn store_failure_fails_the_import() {
        let (_dir, config) = project();
        let store = MemoryGraphStore::new().with_failure_after(0);
        let importer = Importer::new(&config, UpsertEngine::new(Arc::new(store), 500));

        assert!(matches!(importer.import_manifest().await, Err(ImportError::Store(_))));
    }

    #[tokio::test]
    async fn unreachable_warehouse_fails_only_the_warehouse_pass() {
        let (_dir, config) = project();
        let source = MockCatalog::new("analytics").with_connection_failure();
        let importer = Importer::dry_run(&config);

        assert!(importer.import_manifest().await.is_ok());
        assert!(matches!(
            importer.import_warehouse(&source).await,
            Err(ImportError::Fetch(FetchError::Connection(_)))
        ));
    }
}
