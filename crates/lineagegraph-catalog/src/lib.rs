//! Warehouse catalog introspection
//!
//! Reads a warehouse's `information_schema` into catalog rows and turns them
//! into table/column nodes and foreign-key edges keyed exactly like the ones
//! built from the transformation manifest.
//!
//! ## Features
//!
//! Enable warehouse support via Cargo features:
//! - `postgres` - PostgreSQL/Redshift support
//!
//! ## Example
//!
//! ```rust,ignore
//! use lineagegraph_catalog::{introspect_schema, PostgresCatalog};
//!
//! let source = PostgresCatalog::from_config(&config.warehouse).await?;
//! let lineage = introspect_schema(&source, "public").await?;
//! ```

pub mod adapter;
pub mod introspect;
pub mod mock;
pub mod postgres;

pub use adapter::{CatalogRow, CatalogSource, FetchError};
pub use introspect::{introspect_schema, CatalogLineage, SchemaIntrospector};
pub use mock::MockCatalog;
pub use postgres::PostgresCatalog;
