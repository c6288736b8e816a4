//! Import report schema (stable v1)
//!
//! This schema is STABLE and VERSIONED.
//! Breaking changes require a new version.

use crate::diagnostic::{Diagnostic, Severity};
use crate::graph::{GraphBatch, NodeKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Report schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVersion {
    /// Major version (breaking changes)
    pub major: u32,

    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl ReportVersion {
    /// Current report schema version
    pub const CURRENT: ReportVersion = ReportVersion { major: 1, minor: 0 };
}

impl std::fmt::Display for ReportVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Which producer an import came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportSource {
    Manifest,
    Warehouse,
}

impl std::fmt::Display for ImportSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manifest => write!(f, "manifest"),
            Self::Warehouse => write!(f, "warehouse"),
        }
    }
}

/// Summary statistics for an import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub tables: usize,
    pub columns: usize,
    pub models: usize,

    /// Relationship counts by type name
    pub relationships: BTreeMap<String, usize>,

    /// Models with column-level lineage
    pub models_with_lineage: usize,

    /// Models whose SQL yielded no column lineage
    pub models_without_lineage: usize,

    /// Units of work sent to the graph store (0 on a dry run)
    pub units_applied: usize,

    pub warnings: usize,
    pub errors: usize,
}

/// Import report (import-report.json v1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    /// Schema version
    pub version: ReportVersion,

    /// Timestamp (ISO 8601)
    pub timestamp: String,

    pub source: ImportSource,

    pub summary: ImportSummary,

    /// Per-item problems that were skipped
    pub diagnostics: Vec<Diagnostic>,
}

impl ImportReport {
    /// Build a report from an assembled batch and the diagnostics collected on the way
    pub fn from_batch(source: ImportSource, batch: &GraphBatch, diagnostics: Vec<Diagnostic>) -> Self {
        let summary = ImportSummary {
            tables: batch.node_count_of(NodeKind::Table),
            columns: batch.node_count_of(NodeKind::Column),
            models: batch.node_count_of(NodeKind::Model),
            relationships: batch.relationship_counts(),
            warnings: diagnostics.iter().filter(|d| d.severity == Severity::Warn).count(),
            errors: diagnostics.iter().filter(|d| d.severity == Severity::Error).count(),
            ..ImportSummary::default()
        };

        Self {
            version: ReportVersion::CURRENT,
            timestamp: chrono::Utc::now().to_rfc3339(),
            source,
            summary,
            diagnostics,
        }
    }

    /// Record model lineage coverage
    pub fn with_model_coverage(mut self, with_lineage: usize, without_lineage: usize) -> Self {
        self.summary.models_with_lineage = with_lineage;
        self.summary.models_without_lineage = without_lineage;
        self
    }

    /// Record how many units of work were applied
    pub fn with_units_applied(mut self, units: usize) -> Self {
        self.summary.units_applied = units;
        self
    }

    pub fn total_relationships(&self) -> usize {
        self.summary.relationships.values().sum()
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Save to file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let json = self.to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }
}
