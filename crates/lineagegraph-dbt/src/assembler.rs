//! Manifest lineage assembly
//!
//! Turns a manifest into one [`GraphBatch`]: model nodes, declared source
//! tables, model-to-model edges, generated tables and column lineage from
//! each model's compiled SQL. Per-model problems become diagnostics; the
//! pass itself never fails.

use crate::dependency::Dependency;
use crate::manifest::{Manifest, ManifestNode};
use lineagegraph_core::{
    ColumnKey, ColumnNode, Config, Diagnostic, DiagnosticCode, GraphBatch, ImportReport,
    ImportSource, ModelKey, ModelNode, Relationship, TableKey, TableNode,
};
use lineagegraph_sql::{ColumnLineageExtractor, SqlParser, TableName};
use tracing::{debug, info, warn};

/// Result of assembling one manifest
#[derive(Debug, Clone, Default)]
pub struct ManifestLineage {
    pub batch: GraphBatch,
    pub diagnostics: Vec<Diagnostic>,

    /// Model entries processed
    pub models: usize,

    /// Models whose SQL yielded at least one column edge
    pub models_with_lineage: usize,

    /// Models without column lineage (unparsable, uncompiled or sourceless SQL)
    pub models_without_lineage: usize,
}

impl ManifestLineage {
    pub fn to_report(&self) -> ImportReport {
        ImportReport::from_batch(ImportSource::Manifest, &self.batch, self.diagnostics.clone())
            .with_model_coverage(self.models_with_lineage, self.models_without_lineage)
    }
}

/// Assembles lineage from a manifest
#[derive(Debug)]
pub struct ManifestAssembler {
    extractor: ColumnLineageExtractor,
}

impl ManifestAssembler {
    pub fn new(extractor: ColumnLineageExtractor) -> Self {
        Self { extractor }
    }

    /// Assembler using the configured dialect and unqualified-column policy
    pub fn from_config(config: &Config) -> Self {
        let extractor = ColumnLineageExtractor::new(SqlParser::from_dialect(&config.dialect))
            .with_unqualified_policy(config.lineage.unqualified_columns);
        Self::new(extractor)
    }

    pub fn assemble(&self, manifest: &Manifest) -> ManifestLineage {
        let mut lineage = ManifestLineage::default();
        let adapter = manifest.adapter_type();

        for (unique_id, node) in manifest.models() {
            debug!(model = unique_id, "Assembling model");
            lineage.models += 1;

            let model = ModelKey::new(unique_id);
            lineage.batch.merge_model(model_node(&model, node));

            self.add_dependencies(manifest, &model, node, &mut lineage);
            self.add_generated_table(&model, node, adapter, &mut lineage);

            if self.add_column_lineage(&model, node, adapter, &mut lineage) {
                lineage.models_with_lineage += 1;
            } else {
                lineage.models_without_lineage += 1;
            }
        }

        info!(
            models = lineage.models,
            nodes = lineage.batch.node_count(),
            relationships = lineage.batch.relationship_count(),
            diagnostics = lineage.diagnostics.len(),
            "Assembled manifest lineage"
        );

        lineage
    }

    fn add_dependencies(
        &self,
        manifest: &Manifest,
        model: &ModelKey,
        node: &ManifestNode,
        lineage: &mut ManifestLineage,
    ) {
        for dependency_id in &node.depends_on.nodes {
            match Dependency::parse(dependency_id) {
                Ok(Dependency::Source { unique_id, source_name, table_name, .. }) => {
                    // Prefer the declared source's own location; fall back to the model's
                    let table = match manifest.get_source(&unique_id) {
                        Some(source) => TableKey::new(
                            source.database.as_deref().unwrap_or(node.database()),
                            source.schema.as_deref().unwrap_or(node.schema()),
                            source.table_name(),
                        ),
                        None => TableKey::new(node.database(), node.schema(), &table_name),
                    };

                    lineage.batch.merge_table(TableNode::new(table.clone()).with_source(source_name));
                    lineage.batch.relate(Relationship::feeds_data_into(table, model.clone()));
                }
                Ok(Dependency::Model(dependency)) => {
                    lineage.batch.relate(Relationship::proceeds_to(dependency, model.clone()));
                }
                Err(e) => {
                    warn!(model = %model, dependency = %dependency_id, "Skipping dependency: {}", e);
                    lineage.diagnostics.push(
                        Diagnostic::warn(DiagnosticCode::MalformedDependency, e.to_string())
                            .with_subject(model.to_string()),
                    );
                }
            }
        }
    }

    fn add_generated_table(
        &self,
        model: &ModelKey,
        node: &ManifestNode,
        adapter: &str,
        lineage: &mut ManifestLineage,
    ) {
        let Some(relation) = node.relation_name.as_deref().filter(|r| !r.trim().is_empty()) else {
            return;
        };

        match TableKey::parse_relation(relation) {
            Ok(table) => {
                lineage.batch.merge_table(tagged_table(table.clone(), adapter));
                lineage.batch.relate(Relationship::generates(model.clone(), table));
            }
            Err(e) => {
                warn!(model = %model, "Skipping generated table: {}", e);
                lineage.diagnostics.push(
                    Diagnostic::warn(DiagnosticCode::MalformedRelationName, e.to_string())
                        .with_subject(model.to_string()),
                );
            }
        }
    }

    /// Returns whether any column edge was added
    fn add_column_lineage(
        &self,
        model: &ModelKey,
        node: &ManifestNode,
        adapter: &str,
        lineage: &mut ManifestLineage,
    ) -> bool {
        let Some(sql) = node.compiled_sql() else {
            debug!(model = %model, "No compiled SQL; skipping column lineage");
            return false;
        };

        let columns = match self.extractor.extract(sql) {
            Ok(columns) => columns,
            Err(e) => {
                warn!(model = %model, "No column lineage: {}", e);
                lineage.diagnostics.push(e.to_diagnostic().with_subject(model.to_string()));
                return false;
            }
        };

        for diagnostic in &columns.diagnostics {
            let subject = match &diagnostic.subject {
                Some(subject) => format!("{}:{}", model, subject),
                None => model.to_string(),
            };
            lineage.diagnostics.push(diagnostic.clone().with_subject(subject));
        }

        let output_table = TableKey::new(node.database(), node.schema(), &node.name);
        lineage.batch.merge_table(tagged_table(output_table.clone(), adapter));

        let mut edges = 0;
        for (output, sources) in columns.outputs() {
            let output_column = output_table.column(output);
            lineage.batch.merge_column(ColumnNode::new(output_column.clone()));

            for source in sources {
                let source_column = qualify(&source.table, node).column(&source.column);
                lineage.batch.merge_table(tagged_table(source_column.table().clone(), adapter));
                lineage.batch.merge_column(ColumnNode::new(source_column.clone()));
                lineage
                    .batch
                    .relate(Relationship::transformed_to(source_column, output_column.clone()));
                edges += 1;
            }
        }

        debug!(model = %model, outputs = columns.len(), edges, "Column lineage extracted");
        edges > 0
    }
}

impl Default for ManifestAssembler {
    fn default() -> Self {
        Self::new(ColumnLineageExtractor::default())
    }
}

fn model_node(key: &ModelKey, node: &ManifestNode) -> ModelNode {
    let mut model = ModelNode::new(key.clone());
    model.name = Some(node.name.clone());
    model.description = Some(node.description.clone().unwrap_or_default());
    model.tags = Some(node.tags.clone());
    model.materialized = Some(node.materialized().to_string());
    model
}

fn tagged_table(key: TableKey, adapter: &str) -> TableNode {
    let table = TableNode::new(key);
    if adapter.is_empty() {
        table
    } else {
        table.with_source(adapter)
    }
}

/// Table key for a name as written in the model's SQL
///
/// Missing database/schema parts are taken from the model, which is where an
/// unqualified name resolves when the model runs.
fn qualify(table: &TableName, node: &ManifestNode) -> TableKey {
    match table.parts() {
        [name] => TableKey::new(node.database(), node.schema(), name),
        [schema, name] => TableKey::new(node.database(), schema, name),
        [.., database, schema, name] => TableKey::new(database, schema, name),
        [] => TableKey::new(node.database(), node.schema(), ""),
    }
}

/// Convenience: the column key an output column of `node` gets
pub fn output_column(node: &ManifestNode, column: &str) -> ColumnKey {
    TableKey::new(node.database(), node.schema(), &node.name).column(column)
}
