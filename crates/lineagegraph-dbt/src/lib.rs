//! dbt artifact parsing and lineage assembly
//!
//! This crate handles:
//! - Parsing manifest.json (dbt-generated artifacts)
//! - Classifying model dependencies (sources vs. models)
//! - Assembling model- and column-level lineage into a graph batch
//! - Invoking the dbt compiler

pub mod manifest;
pub mod dependency;
pub mod assembler;
pub mod compile;

pub use manifest::{DependsOn, Manifest, ManifestError, ManifestMetadata, ManifestNode, ManifestSource, NodeConfig};
pub use dependency::Dependency;
pub use assembler::{ManifestAssembler, ManifestLineage};
pub use compile::{CompileError, CompileSummary, ProjectCompiler};
