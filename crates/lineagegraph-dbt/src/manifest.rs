//! dbt manifest.json parsing
//!
//! Only the subset of the artifact that lineage needs is modelled. Every
//! field is defaulted so manifests from different dbt versions load.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// dbt manifest.json structure (subset of fields we care about)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub metadata: ManifestMetadata,

    /// Model, test, seed and snapshot nodes keyed by unique_id
    #[serde(default)]
    pub nodes: BTreeMap<String, ManifestNode>,

    /// Source definitions keyed by unique_id
    #[serde(default)]
    pub sources: BTreeMap<String, ManifestSource>,
}

impl Manifest {
    /// Load manifest from file
    ///
    /// A missing file is [`ManifestError::ArtifactMissing`]: the project has
    /// not been compiled yet.
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        if !path.exists() {
            return Err(ManifestError::ArtifactMissing(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| ManifestError::IoError(path.display().to_string(), e.to_string()))?;

        Self::from_str(&contents)
    }

    /// Parse manifest from JSON string
    pub fn from_str(json: &str) -> Result<Self, ManifestError> {
        serde_json::from_str(json)
            .map_err(|e| ManifestError::ParseError(e.to_string()))
    }

    /// Model nodes in unique_id order (tests, seeds, snapshots and macros are skipped)
    pub fn models(&self) -> impl Iterator<Item = (&str, &ManifestNode)> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.is_model())
            .map(|(id, node)| (id.as_str(), node))
    }

    pub fn get_node(&self, unique_id: &str) -> Option<&ManifestNode> {
        self.nodes.get(unique_id)
    }

    pub fn get_source(&self, unique_id: &str) -> Option<&ManifestSource> {
        self.sources.get(unique_id)
    }

    /// Name of the active adapter (`redshift`, `postgres`, ...)
    pub fn adapter_type(&self) -> &str {
        &self.metadata.adapter_type
    }
}

/// Manifest metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestMetadata {
    #[serde(default)]
    pub dbt_schema_version: String,

    #[serde(default)]
    pub dbt_version: String,

    #[serde(default)]
    pub generated_at: String,

    #[serde(default)]
    pub adapter_type: String,
}

/// A node in the manifest (model, test, snapshot, etc.)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestNode {
    /// Unique identifier (e.g., "model.my_project.users")
    #[serde(default)]
    pub unique_id: String,

    /// Node name (e.g., "users")
    #[serde(default)]
    pub name: String,

    /// Resource type (model, test, snapshot, etc.)
    #[serde(default)]
    pub resource_type: String,

    #[serde(default)]
    pub package_name: String,

    /// Original file path, relative to the project root
    #[serde(default)]
    pub original_file_path: String,

    #[serde(default)]
    pub database: Option<String>,

    #[serde(default)]
    pub schema: Option<String>,

    /// Alias (output table name)
    #[serde(default)]
    pub alias: Option<String>,

    /// Physical relation, e.g. `"analytics"."marts"."orders"` (absent for ephemeral models)
    #[serde(default)]
    pub relation_name: Option<String>,

    /// Compiled SQL (`compiled_sql` in manifests before v7)
    #[serde(default, alias = "compiled_sql")]
    pub compiled_code: Option<String>,

    #[serde(default)]
    pub config: NodeConfig,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub depends_on: DependsOn,
}

impl ManifestNode {
    pub fn is_model(&self) -> bool {
        self.resource_type == "model"
    }

    /// Materialization kind, `table` when not configured
    pub fn materialized(&self) -> &str {
        self.config.materialized.as_deref().unwrap_or("table")
    }

    pub fn database(&self) -> &str {
        self.database.as_deref().unwrap_or("")
    }

    pub fn schema(&self) -> &str {
        self.schema.as_deref().unwrap_or("")
    }

    /// Compiled SQL, if the model has been compiled and is not blank
    pub fn compiled_sql(&self) -> Option<&str> {
        self.compiled_code
            .as_deref()
            .filter(|sql| !sql.trim().is_empty())
    }
}

/// Node configuration (from dbt_project.yml or model config)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub materialized: Option<String>,
}

/// Dependencies structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependsOn {
    /// List of node unique_ids this node depends on
    #[serde(default)]
    pub nodes: Vec<String>,
}

/// A source in the manifest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestSource {
    /// Unique identifier (e.g., "source.my_project.raw.users")
    #[serde(default)]
    pub unique_id: String,

    /// Source name (e.g., "raw")
    #[serde(default)]
    pub source_name: String,

    /// Table name (e.g., "users")
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub database: Option<String>,

    #[serde(default)]
    pub schema: Option<String>,

    /// Identifier (actual table name)
    #[serde(default)]
    pub identifier: Option<String>,
}

impl ManifestSource {
    /// Physical table name (`identifier`, falling back to `name`)
    pub fn table_name(&self) -> &str {
        self.identifier.as_deref().unwrap_or(&self.name)
    }
}

/// Manifest loading errors
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Manifest not found at {0}; compile the project first")]
    ArtifactMissing(PathBuf),

    #[error("Failed to read manifest file {0}: {1}")]
    IoError(String, String),

    #[error("Failed to parse manifest JSON: {0}")]
    ParseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_minimal_manifest() {
        let manifest = Manifest::from_str(
            &json!({
                "metadata": { "adapter_type": "redshift", "dbt_version": "1.7.0" },
                "nodes": {
                    "model.shop.orders": {
                        "unique_id": "model.shop.orders",
                        "name": "orders",
                        "resource_type": "model",
                        "database": "analytics",
                        "schema": "marts",
                        "relation_name": "\"analytics\".\"marts\".\"orders\"",
                        "compiled_sql": "select 1 as id",
                        "tags": ["finance"],
                        "depends_on": { "nodes": ["source.shop.raw.orders"], "macros": [] }
                    },
                    "test.shop.not_null_orders_id": {
                        "resource_type": "test",
                        "name": "not_null_orders_id"
                    }
                },
                "sources": {}
            })
            .to_string(),
        )
        .unwrap();

        assert_eq!(manifest.adapter_type(), "redshift");

        let models: Vec<_> = manifest.models().map(|(id, _)| id).collect();
        assert_eq!(models, vec!["model.shop.orders"]);

        let orders = manifest.get_node("model.shop.orders").unwrap();
        assert_eq!(orders.compiled_sql(), Some("select 1 as id"));
        assert_eq!(orders.materialized(), "table");
        assert_eq!(orders.depends_on.nodes, vec!["source.shop.raw.orders"]);
    }

    #[test]
    fn null_fields_are_tolerated() {
        let manifest = Manifest::from_str(
            &json!({
                "nodes": {
                    "model.shop.eph": {
                        "resource_type": "model",
                        "name": "eph",
                        "relation_name": null,
                        "description": null,
                        "config": { "materialized": "ephemeral" }
                    }
                }
            })
            .to_string(),
        )
        .unwrap();

        let node = manifest.get_node("model.shop.eph").unwrap();
        assert!(node.relation_name.is_none());
        assert!(node.compiled_sql().is_none());
        assert_eq!(node.materialized(), "ephemeral");
    }

    #[test]
    fn missing_file_is_artifact_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("target/manifest.json");

        match Manifest::from_file(&path) {
            Err(ManifestError::ArtifactMissing(missing)) => assert_eq!(missing, path),
            other => panic!("expected ArtifactMissing, got {:?}", other),
        }
    }

    #[test]
    fn invalid_json_is_parse_error() {
        assert!(matches!(Manifest::from_str("{ nodes"), Err(ManifestError::ParseError(_))));
    }

    #[test]
    fn source_table_name_prefers_identifier() {
        let source = ManifestSource {
            name: "orders".to_string(),
            identifier: Some("orders_v2".to_string()),
            ..ManifestSource::default()
        };
        assert_eq!(source.table_name(), "orders_v2");
    }
}
