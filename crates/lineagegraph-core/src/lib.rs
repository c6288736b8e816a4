//! LineageGraph Core
//!
//! Identity scheme and graph entity model shared by every producer.
//! Never rename relationship types or diagnostic codes - they are part of the
//! graph and report formats.

pub mod identity;
pub mod graph;
pub mod diagnostic;
pub mod report;
pub mod config;

pub use identity::{ColumnKey, IdentifierError, ModelKey, TableKey, UNKNOWN_SEGMENT};
pub use graph::{
    ColumnNode, GraphBatch, ModelNode, NodeKind, NodeRef, Nullability, RelType, Relationship,
    TableNode,
};
pub use diagnostic::{Diagnostic, DiagnosticCode, Severity};
pub use report::{ImportReport, ImportSource, ImportSummary, ReportVersion};
pub use config::{
    Config, ConfigError, DialectConfig, GraphConfig, LineageConfig, ProjectConfig,
    UnqualifiedColumnPolicy, WarehouseConfig,
};
