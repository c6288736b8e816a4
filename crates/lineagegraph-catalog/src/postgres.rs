//! Redshift/PostgreSQL catalog source using information_schema
//!
//! One query joins `information_schema.columns` with the key, constraint and
//! referential views so every (table, column) row carries its constraint and,
//! for foreign keys, the referenced schema/table/column. It works with:
//! - Amazon Redshift
//! - PostgreSQL 9.4+
//!
//! ## Usage
//!
//! ```rust,ignore
//! let source = PostgresCatalog::from_config(&config.warehouse).await?;
//! let rows = source.fetch_rows("public").await?;
//! ```
//!
//! Reference: https://www.postgresql.org/docs/current/information-schema.html

use crate::adapter::{CatalogRow, CatalogSource, FetchError};
use lineagegraph_core::WarehouseConfig;

#[cfg(feature = "postgres")]
use tokio_postgres::{Client, NoTls};

#[cfg(feature = "postgres")]
use postgres_native_tls::MakeTlsConnector;

#[cfg(feature = "postgres")]
use native_tls::TlsConnector;

/// Catalog query, filtered by schema and ordered by table then column position
///
/// Identifier columns are cast to text because their declared types are
/// information_schema domains.
pub const CATALOG_QUERY: &str = r#"
SELECT
    c.table_schema::text          AS schema_name,
    c.table_name::text            AS table_name,
    c.column_name::text           AS column_name,
    c.data_type::text             AS data_type,
    c.is_nullable::text           AS is_nullable,
    tc.constraint_type::text      AS constraint_type,
    kcu.constraint_name::text     AS constraint_name,
    rc.unique_constraint_schema::text AS referenced_schema,
    kcu2.table_name::text         AS referenced_table,
    kcu2.column_name::text        AS referenced_column,
    t.table_type::text            AS object_type
FROM information_schema.columns c
LEFT JOIN information_schema.key_column_usage kcu
    ON c.table_schema = kcu.table_schema
    AND c.table_name = kcu.table_name
    AND c.column_name = kcu.column_name
LEFT JOIN information_schema.table_constraints tc
    ON kcu.constraint_schema = tc.table_schema
    AND kcu.constraint_name = tc.constraint_name
LEFT JOIN information_schema.referential_constraints rc
    ON tc.constraint_name = rc.constraint_name
    AND tc.table_schema = rc.constraint_schema
LEFT JOIN information_schema.key_column_usage kcu2
    ON rc.unique_constraint_name = kcu2.constraint_name
    AND rc.unique_constraint_schema = kcu2.table_schema
LEFT JOIN information_schema.tables t
    ON c.table_schema = t.table_schema
    AND c.table_name = t.table_name
WHERE c.table_schema = $1
ORDER BY c.table_name, c.ordinal_position
"#;

const NOT_COMPILED: &str =
    "PostgreSQL support not compiled. Rebuild with: cargo build --features postgres";

/// Redshift/PostgreSQL catalog source
///
/// Owns its client; the connection task ends when the source is dropped.
pub struct PostgresCatalog {
    /// PostgreSQL client (only available with postgres feature)
    #[cfg(feature = "postgres")]
    client: Client,

    /// "Redshift" or "PostgreSQL"
    name: &'static str,

    host: String,
    port: u16,
    database: String,
    source_tag: String,

    /// Placeholder for when feature is disabled
    #[cfg(not(feature = "postgres"))]
    _phantom: std::marker::PhantomData<()>,
}

impl PostgresCatalog {
    /// Connect using the `[warehouse]` section of the configuration
    ///
    /// TLS is used when `tls = true`.
    #[cfg(feature = "postgres")]
    pub async fn from_config(config: &WarehouseConfig) -> Result<Self, FetchError> {
        let name = display_name(&config.warehouse_type);
        let port = config.port();
        let conn_str = connection_string(config);

        tracing::debug!(host = %config.host, port, database = %config.database, tls = config.tls, "Connecting to {}", name);

        let client = if config.tls {
            let connector = TlsConnector::builder()
                .build()
                .map_err(|e| FetchError::ConfigError(format!("Failed to create TLS connector: {}", e)))?;
            let tls = MakeTlsConnector::new(connector);

            let (client, connection) = tokio_postgres::connect(&conn_str, tls)
                .await
                .map_err(|e| map_connect_error(&config.host, port, e))?;
            spawn_connection(connection, config.host.clone(), port);
            client
        } else {
            let (client, connection) = tokio_postgres::connect(&conn_str, NoTls)
                .await
                .map_err(|e| map_connect_error(&config.host, port, e))?;
            spawn_connection(connection, config.host.clone(), port);
            client
        };

        Ok(Self {
            client,
            name,
            host: config.host.clone(),
            port,
            database: config.database.clone(),
            source_tag: config.source_tag(),
        })
    }

    /// Create source without postgres feature (returns error)
    #[cfg(not(feature = "postgres"))]
    pub async fn from_config(_config: &WarehouseConfig) -> Result<Self, FetchError> {
        Err(FetchError::ConfigError(NOT_COMPILED.to_string()))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

#[cfg(feature = "postgres")]
fn display_name(warehouse_type: &str) -> &'static str {
    if warehouse_type.eq_ignore_ascii_case("redshift") {
        "Redshift"
    } else {
        "PostgreSQL"
    }
}

/// Key/value connection string for the driver
pub fn connection_string(config: &WarehouseConfig) -> String {
    format!(
        "host={} port={} dbname={} user={} password={}",
        config.host,
        config.port(),
        config.database,
        config.user,
        config.password
    )
}

#[cfg(feature = "postgres")]
fn spawn_connection<F>(connection: F, host: String, port: u16)
where
    F: std::future::Future<Output = Result<(), tokio_postgres::Error>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(host = %host, port, "Warehouse connection error: {}", e);
        }
    });
}

#[cfg(feature = "postgres")]
fn map_connect_error(host: &str, port: u16, e: tokio_postgres::Error) -> FetchError {
    let message = e.to_string();
    if message.contains("password authentication failed") {
        FetchError::AuthenticationError(format!("{}:{}: {}", host, port, message))
    } else {
        FetchError::Connection(format!("Failed to connect to {}:{}: {}", host, port, message))
    }
}

#[cfg(feature = "postgres")]
fn map_query_error(schema: &str, e: tokio_postgres::Error) -> FetchError {
    let message = e.to_string();
    if message.contains("does not exist") {
        FetchError::SchemaNotFound(format!("{}: {}", schema, message))
    } else if message.contains("permission denied") {
        FetchError::PermissionDenied(format!("{}: {}", schema, message))
    } else if e.is_closed() {
        FetchError::Connection(message)
    } else {
        FetchError::QueryError(message)
    }
}

#[cfg(feature = "postgres")]
fn row_to_catalog_row(row: &tokio_postgres::Row) -> Result<CatalogRow, tokio_postgres::Error> {
    let required = |idx: usize| -> Result<String, tokio_postgres::Error> {
        Ok(row.try_get::<_, Option<String>>(idx)?.unwrap_or_default())
    };

    Ok(CatalogRow {
        schema_name: required(0)?,
        table_name: required(1)?,
        column_name: required(2)?,
        data_type: row.try_get(3)?,
        is_nullable: row.try_get(4)?,
        constraint_type: row.try_get(5)?,
        constraint_name: row.try_get(6)?,
        referenced_schema: row.try_get(7)?,
        referenced_table: row.try_get(8)?,
        referenced_column: row.try_get(9)?,
        object_type: row.try_get(10)?,
    })
}

#[async_trait::async_trait]
impl CatalogSource for PostgresCatalog {
    fn name(&self) -> &'static str {
        self.name
    }

    fn database(&self) -> &str {
        &self.database
    }

    fn source_tag(&self) -> &str {
        &self.source_tag
    }

    #[cfg(feature = "postgres")]
    async fn fetch_rows(&self, schema: &str) -> Result<Vec<CatalogRow>, FetchError> {
        let rows = self
            .client
            .query(CATALOG_QUERY, &[&schema])
            .await
            .map_err(|e| map_query_error(schema, e))?;

        let rows = rows
            .iter()
            .map(row_to_catalog_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| FetchError::QueryError(format!("Unexpected catalog row: {}", e)))?;

        tracing::info!(schema, rows = rows.len(), "Read catalog rows from {}", self.name);
        Ok(rows)
    }

    #[cfg(not(feature = "postgres"))]
    async fn fetch_rows(&self, _schema: &str) -> Result<Vec<CatalogRow>, FetchError> {
        Err(FetchError::ConfigError(NOT_COMPILED.to_string()))
    }

    #[cfg(feature = "postgres")]
    async fn test_connection(&self) -> Result<(), FetchError> {
        self.client
            .query("SELECT 1", &[])
            .await
            .map_err(|e| FetchError::Connection(format!("Connection test failed: {}", e)))?;
        Ok(())
    }

    #[cfg(not(feature = "postgres"))]
    async fn test_connection(&self) -> Result<(), FetchError> {
        Err(FetchError::ConfigError(NOT_COMPILED.to_string()))
    }
}
