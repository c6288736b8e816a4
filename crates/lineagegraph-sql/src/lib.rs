//! SQL parsing and column lineage
//!
//! This crate handles:
//! - Parsing compiled SQL using datafusion-sqlparser-rs
//! - Resolving table aliases in FROM/JOIN clauses
//! - Extracting output column -> source column lineage

pub mod parser;
pub mod resolver;
pub mod lineage;

pub use parser::{SqlParser, ParsedSql, ParseError, ParseErrorKind};
pub use resolver::{TableScope, TableName, ScopedRelation, RelationKind};
pub use lineage::{ColumnLineageExtractor, ColumnLineage, SourceColumn};
