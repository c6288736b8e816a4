//! Configuration schema (lineagegraph.toml)
//!
//! Built once at process start and passed by reference to every component.
//! Environment variables (usually loaded from `.env`) override file values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// SQL dialect configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectConfig {
    /// BigQuery SQL dialect
    BigQuery,

    /// Snowflake SQL dialect
    Snowflake,

    /// PostgreSQL SQL dialect
    Postgres,

    /// Amazon Redshift SQL dialect
    Redshift,

    /// Generic ANSI SQL
    #[default]
    Ansi,
}

/// What to do with an unqualified column when FROM has more than one table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnqualifiedColumnPolicy {
    /// Attribute it to the first table in FROM/JOIN order
    #[default]
    FirstTable,

    /// Leave it unattributed and record a diagnostic
    Omit,
}

/// Transformation project settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Root of the transformation project
    #[serde(default = "default_project_path")]
    pub path: PathBuf,

    /// Manifest location, relative to the project root unless absolute
    #[serde(default = "default_manifest_path")]
    pub manifest: PathBuf,

    /// Compiler executable
    #[serde(default = "default_compiler")]
    pub compiler: String,
}

fn default_project_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_manifest_path() -> PathBuf {
    PathBuf::from("target/manifest.json")
}

fn default_compiler() -> String {
    "dbt".to_string()
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            path: default_project_path(),
            manifest: default_manifest_path(),
            compiler: default_compiler(),
        }
    }
}

impl ProjectConfig {
    /// Absolute-or-project-relative manifest path
    pub fn manifest_path(&self) -> PathBuf {
        if self.manifest.is_absolute() {
            self.manifest.clone()
        } else {
            self.path.join(&self.manifest)
        }
    }
}

/// Graph store connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// HTTP endpoint of the graph store (e.g. http://localhost:7474)
    #[serde(default = "default_graph_uri")]
    pub uri: String,

    #[serde(default = "default_graph_user")]
    pub user: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_graph_database")]
    pub database: String,

    /// Maximum nodes or relationships per unit of work
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_graph_uri() -> String {
    "http://localhost:7474".to_string()
}

fn default_graph_user() -> String {
    "neo4j".to_string()
}

fn default_graph_database() -> String {
    "neo4j".to_string()
}

fn default_batch_size() -> usize {
    500
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: default_graph_uri(),
            user: default_graph_user(),
            password: String::new(),
            database: default_graph_database(),
            batch_size: default_batch_size(),
        }
    }
}

/// Warehouse connection configuration for catalog introspection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// Warehouse type (redshift, postgres)
    #[serde(rename = "type", default = "default_warehouse_type")]
    pub warehouse_type: String,

    #[serde(default)]
    pub host: String,

    /// Defaults to 5439 for Redshift and 5432 otherwise
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub database: String,

    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub password: String,

    /// Schema to introspect
    #[serde(default = "default_warehouse_schema")]
    pub schema: String,

    #[serde(default)]
    pub tls: bool,

    /// Source-system tag put on introspected tables (defaults to the type)
    #[serde(default)]
    pub source_tag: Option<String>,
}

fn default_warehouse_type() -> String {
    "redshift".to_string()
}

fn default_warehouse_schema() -> String {
    "public".to_string()
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            warehouse_type: default_warehouse_type(),
            host: String::new(),
            port: None,
            database: String::new(),
            user: String::new(),
            password: String::new(),
            schema: default_warehouse_schema(),
            tls: false,
            source_tag: None,
        }
    }
}

impl WarehouseConfig {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| {
            if self.warehouse_type.eq_ignore_ascii_case("redshift") {
                5439
            } else {
                5432
            }
        })
    }

    pub fn source_tag(&self) -> String {
        self.source_tag
            .clone()
            .unwrap_or_else(|| self.warehouse_type.to_lowercase())
    }
}

/// Column lineage settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineageConfig {
    #[serde(default)]
    pub unqualified_columns: UnqualifiedColumnPolicy,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// SQL dialect used to parse compiled SQL
    #[serde(default)]
    pub dialect: DialectConfig,

    #[serde(default)]
    pub project: ProjectConfig,

    #[serde(default)]
    pub graph: GraphConfig,

    /// Warehouse connection (required only for warehouse imports)
    #[serde(default)]
    pub warehouse: Option<WarehouseConfig>,

    #[serde(default)]
    pub lineage: LineageConfig,
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

        Self::from_toml(&contents)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Apply overrides from the process environment
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable lookup
    ///
    /// Recognised variables: `DBT_PROJECT_PATH`, `NEO4J_URI`, `NEO4J_USERNAME`,
    /// `NEO4J_PASSWORD`, `NEO4J_DATABASE`, `RED_SHIFT_HOST`, `RED_SHIFT_DBNAME`,
    /// `RED_SHIFT_USER`, `RED_SHIFT_PASSWORD`, `RED_SHIFT_SCHEMA`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("DBT_PROJECT_PATH") {
            self.project.path = PathBuf::from(path);
        }
        if let Some(uri) = lookup("NEO4J_URI") {
            self.graph.uri = uri;
        }
        if let Some(user) = lookup("NEO4J_USERNAME") {
            self.graph.user = user;
        }
        if let Some(password) = lookup("NEO4J_PASSWORD") {
            self.graph.password = password;
        }
        if let Some(database) = lookup("NEO4J_DATABASE") {
            self.graph.database = database;
        }

        let warehouse_vars = [
            "RED_SHIFT_HOST",
            "RED_SHIFT_DBNAME",
            "RED_SHIFT_USER",
            "RED_SHIFT_PASSWORD",
            "RED_SHIFT_SCHEMA",
        ];
        if warehouse_vars.iter().any(|name| lookup(name).is_some()) {
            let warehouse = self.warehouse.get_or_insert_with(WarehouseConfig::default);

            if let Some(host) = lookup("RED_SHIFT_HOST") {
                warehouse.host = host;
            }
            if let Some(database) = lookup("RED_SHIFT_DBNAME") {
                warehouse.database = database;
            }
            if let Some(user) = lookup("RED_SHIFT_USER") {
                warehouse.user = user;
            }
            if let Some(password) = lookup("RED_SHIFT_PASSWORD") {
                warehouse.password = password;
            }
            if let Some(schema) = lookup("RED_SHIFT_SCHEMA") {
                warehouse.schema = schema;
            }
        }

        self
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}
