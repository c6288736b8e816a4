//! Graph entity model: nodes, relationships and batches
//!
//! A [`GraphBatch`] is what every producer emits and what the upsert engine
//! consumes. Nodes are deduplicated by key and relationships by
//! `(type, source, target)`; merging a node into a batch only overwrites the
//! properties the incoming node actually carries.

use crate::identity::{ColumnKey, ModelKey, TableKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Kind of graph node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Table,
    Column,
    Model,
}

impl NodeKind {
    /// Label used in the property graph
    pub fn label(&self) -> &'static str {
        match self {
            Self::Table => "Table",
            Self::Column => "Column",
            Self::Model => "Model",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Relationship types
///
/// These names are what ends up in the graph. Do not rename them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelType {
    /// Table -> Model (declared source dependency)
    FeedsDataInto,

    /// Model -> Model (dependency -> dependent)
    ProceedsTo,

    /// Model -> Table (materialized output)
    Generates,

    /// Column -> Column (foreign key from the warehouse catalog)
    References,

    /// Column -> Column (column lineage from compiled SQL)
    TransformedTo,

    /// Column -> Table (containment)
    BelongsTo,
}

impl RelType {
    pub const ALL: [RelType; 6] = [
        Self::FeedsDataInto,
        Self::ProceedsTo,
        Self::Generates,
        Self::References,
        Self::TransformedTo,
        Self::BelongsTo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FeedsDataInto => "FEEDS_DATA_INTO",
            Self::ProceedsTo => "PROCEEDS_TO",
            Self::Generates => "GENERATES",
            Self::References => "REFERENCES",
            Self::TransformedTo => "TRANSFORMED_TO",
            Self::BelongsTo => "BELONGS_TO",
        }
    }

    /// Node kinds at the (source, target) ends of this relationship
    pub fn endpoints(&self) -> (NodeKind, NodeKind) {
        match self {
            Self::FeedsDataInto => (NodeKind::Table, NodeKind::Model),
            Self::ProceedsTo => (NodeKind::Model, NodeKind::Model),
            Self::Generates => (NodeKind::Model, NodeKind::Table),
            Self::References | Self::TransformedTo => (NodeKind::Column, NodeKind::Column),
            Self::BelongsTo => (NodeKind::Column, NodeKind::Table),
        }
    }

    /// Whether data flows along this relationship (used for impact traversal)
    pub fn is_data_flow(&self) -> bool {
        matches!(
            self,
            Self::FeedsDataInto | Self::ProceedsTo | Self::Generates | Self::TransformedTo
        )
    }
}

impl fmt::Display for RelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Reference to a node by kind and identity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "lowercase")]
pub enum NodeRef {
    Table(TableKey),
    Column(ColumnKey),
    Model(ModelKey),
}

impl NodeRef {
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Table(_) => NodeKind::Table,
            Self::Column(_) => NodeKind::Column,
            Self::Model(_) => NodeKind::Model,
        }
    }

    /// The canonical string key of the referenced node
    pub fn key(&self) -> String {
        match self {
            Self::Table(key) => key.key(),
            Self::Column(key) => key.key(),
            Self::Model(key) => key.as_str().to_string(),
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) {}", self.kind(), self.key())
    }
}

/// A directed relationship between two nodes
///
/// Only constructible through the typed constructors, so the endpoint kinds
/// always match [`RelType::endpoints`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Relationship {
    rel_type: RelType,
    source: NodeRef,
    target: NodeRef,
}

impl Relationship {
    pub fn feeds_data_into(table: TableKey, model: ModelKey) -> Self {
        Self { rel_type: RelType::FeedsDataInto, source: NodeRef::Table(table), target: NodeRef::Model(model) }
    }

    /// `dependency -[:PROCEEDS_TO]-> dependent`
    pub fn proceeds_to(dependency: ModelKey, dependent: ModelKey) -> Self {
        Self { rel_type: RelType::ProceedsTo, source: NodeRef::Model(dependency), target: NodeRef::Model(dependent) }
    }

    pub fn generates(model: ModelKey, table: TableKey) -> Self {
        Self { rel_type: RelType::Generates, source: NodeRef::Model(model), target: NodeRef::Table(table) }
    }

    pub fn references(column: ColumnKey, referenced: ColumnKey) -> Self {
        Self { rel_type: RelType::References, source: NodeRef::Column(column), target: NodeRef::Column(referenced) }
    }

    pub fn transformed_to(source: ColumnKey, output: ColumnKey) -> Self {
        Self { rel_type: RelType::TransformedTo, source: NodeRef::Column(source), target: NodeRef::Column(output) }
    }

    pub fn belongs_to(column: ColumnKey) -> Self {
        let table = column.table().clone();
        Self { rel_type: RelType::BelongsTo, source: NodeRef::Column(column), target: NodeRef::Table(table) }
    }

    pub fn rel_type(&self) -> RelType {
        self.rel_type
    }

    pub fn source(&self) -> &NodeRef {
        &self.source
    }

    pub fn target(&self) -> &NodeRef {
        &self.target
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -[:{}]-> {}", self.source, self.rel_type, self.target)
    }
}

/// Nullability of a catalog column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Nullability {
    /// Definitely nullable
    Yes,

    /// Definitely not nullable
    No,

    /// Not known (e.g. the column was only seen in SQL)
    #[default]
    Unknown,
}

impl Nullability {
    /// Parse an `information_schema` style `YES`/`NO` flag
    pub fn from_flag(flag: Option<&str>) -> Self {
        match flag.map(|f| f.trim().to_uppercase()).as_deref() {
            Some("YES") | Some("Y") | Some("TRUE") => Self::Yes,
            Some("NO") | Some("N") | Some("FALSE") => Self::No,
            _ => Self::Unknown,
        }
    }

    pub fn as_flag(&self) -> Option<&'static str> {
        match self {
            Self::Yes => Some("YES"),
            Self::No => Some("NO"),
            Self::Unknown => None,
        }
    }
}

/// A table or view node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableNode {
    pub key: TableKey,

    /// `table` or `view`; only known from catalog introspection
    #[serde(default)]
    pub object_type: Option<String>,

    /// Every source-system tag that has asserted this table
    #[serde(default)]
    pub sources: BTreeSet<String>,
}

impl TableNode {
    pub fn new(key: TableKey) -> Self {
        Self { key, object_type: None, sources: BTreeSet::new() }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.sources.insert(source.into());
        self
    }

    pub fn with_object_type(mut self, object_type: impl Into<String>) -> Self {
        self.object_type = Some(object_type.into());
        self
    }

    /// Fold another assertion of the same table into this one
    pub fn merge(&mut self, other: TableNode) {
        if other.object_type.is_some() {
            self.object_type = other.object_type;
        }
        self.sources.extend(other.sources);
    }
}

/// A column node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnNode {
    pub key: ColumnKey,

    #[serde(default)]
    pub data_type: Option<String>,

    #[serde(default)]
    pub nullable: Nullability,

    #[serde(default)]
    pub constraint_type: Option<String>,

    #[serde(default)]
    pub constraint_name: Option<String>,

    /// The producer read the column's constraints, so `None` above means
    /// "no constraint" and clears a stale one on merge
    #[serde(default)]
    pub constraint_known: bool,
}

impl ColumnNode {
    /// A column with no catalog attributes (as discovered from SQL)
    pub fn new(key: ColumnKey) -> Self {
        Self {
            key,
            data_type: None,
            nullable: Nullability::Unknown,
            constraint_type: None,
            constraint_name: None,
            constraint_known: false,
        }
    }

    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    pub fn with_nullability(mut self, nullable: Nullability) -> Self {
        self.nullable = nullable;
        self
    }

    /// Constraint as read from the catalog; `None` asserts there is none
    pub fn with_constraint(mut self, constraint_type: Option<String>, constraint_name: Option<String>) -> Self {
        self.constraint_type = constraint_type;
        self.constraint_name = constraint_name;
        self.constraint_known = true;
        self
    }

    pub fn merge(&mut self, other: ColumnNode) {
        if other.data_type.is_some() {
            self.data_type = other.data_type;
        }
        if other.nullable != Nullability::Unknown {
            self.nullable = other.nullable;
        }
        if other.constraint_known {
            self.constraint_type = other.constraint_type;
            self.constraint_name = other.constraint_name;
            self.constraint_known = true;
        } else {
            if other.constraint_type.is_some() {
                self.constraint_type = other.constraint_type;
            }
            if other.constraint_name.is_some() {
                self.constraint_name = other.constraint_name;
            }
        }
    }
}

/// A transformation model node
///
/// Properties are optional so that a bare reference (e.g. the far end of a
/// `PROCEEDS_TO` edge) never blanks out what the model's own record set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelNode {
    pub key: ModelKey,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub tags: Option<Vec<String>>,

    #[serde(default)]
    pub materialized: Option<String>,
}

impl ModelNode {
    pub fn new(key: ModelKey) -> Self {
        Self { key, name: None, description: None, tags: None, materialized: None }
    }

    pub fn merge(&mut self, other: ModelNode) {
        if other.name.is_some() {
            self.name = other.name;
        }
        if other.description.is_some() {
            self.description = other.description;
        }
        if other.tags.is_some() {
            self.tags = other.tags;
        }
        if other.materialized.is_some() {
            self.materialized = other.materialized;
        }
    }
}

/// A deduplicated set of nodes and relationships
///
/// Invariant: every endpoint of every relationship is present as a node, and
/// every column has a `BELONGS_TO` edge to its table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphBatch {
    tables: BTreeMap<TableKey, TableNode>,
    columns: BTreeMap<ColumnKey, ColumnNode>,
    models: BTreeMap<ModelKey, ModelNode>,
    relationships: BTreeSet<Relationship>,
}

impl GraphBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge_table(&mut self, node: TableNode) {
        match self.tables.get_mut(&node.key) {
            Some(existing) => existing.merge(node),
            None => {
                self.tables.insert(node.key.clone(), node);
            }
        }
    }

    /// Merge a column, its table and the `BELONGS_TO` edge between them
    pub fn merge_column(&mut self, node: ColumnNode) {
        let key = node.key.clone();

        match self.columns.get_mut(&key) {
            Some(existing) => existing.merge(node),
            None => {
                self.columns.insert(key.clone(), node);
            }
        }

        self.merge_table(TableNode::new(key.table().clone()));
        self.relationships.insert(Relationship::belongs_to(key));
    }

    pub fn merge_model(&mut self, node: ModelNode) {
        match self.models.get_mut(&node.key) {
            Some(existing) => existing.merge(node),
            None => {
                self.models.insert(node.key.clone(), node);
            }
        }
    }

    /// Make sure a node exists, without setting any property
    pub fn ensure(&mut self, node: &NodeRef) {
        match node {
            NodeRef::Table(key) => self.merge_table(TableNode::new(key.clone())),
            NodeRef::Column(key) => self.merge_column(ColumnNode::new(key.clone())),
            NodeRef::Model(key) => self.merge_model(ModelNode::new(key.clone())),
        }
    }

    /// Add a relationship, creating bare endpoint nodes when missing
    pub fn relate(&mut self, relationship: Relationship) {
        self.ensure(relationship.source());
        self.ensure(relationship.target());
        self.relationships.insert(relationship);
    }

    /// Fold another batch into this one
    pub fn extend(&mut self, other: GraphBatch) {
        for (_, table) in other.tables {
            self.merge_table(table);
        }
        for (_, column) in other.columns {
            self.merge_column(column);
        }
        for (_, model) in other.models {
            self.merge_model(model);
        }
        self.relationships.extend(other.relationships);
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableNode> {
        self.tables.values()
    }

    pub fn columns(&self) -> impl Iterator<Item = &ColumnNode> {
        self.columns.values()
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelNode> {
        self.models.values()
    }

    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.iter()
    }

    pub fn relationships_of(&self, rel_type: RelType) -> impl Iterator<Item = &Relationship> {
        self.relationships.iter().filter(move |r| r.rel_type() == rel_type)
    }

    pub fn table(&self, key: &TableKey) -> Option<&TableNode> {
        self.tables.get(key)
    }

    pub fn column(&self, key: &ColumnKey) -> Option<&ColumnNode> {
        self.columns.get(key)
    }

    pub fn model(&self, key: &ModelKey) -> Option<&ModelNode> {
        self.models.get(key)
    }

    pub fn contains(&self, node: &NodeRef) -> bool {
        match node {
            NodeRef::Table(key) => self.tables.contains_key(key),
            NodeRef::Column(key) => self.columns.contains_key(key),
            NodeRef::Model(key) => self.models.contains_key(key),
        }
    }

    pub fn has_relationship(&self, relationship: &Relationship) -> bool {
        self.relationships.contains(relationship)
    }

    pub fn node_count(&self) -> usize {
        self.tables.len() + self.columns.len() + self.models.len()
    }

    pub fn node_count_of(&self, kind: NodeKind) -> usize {
        match kind {
            NodeKind::Table => self.tables.len(),
            NodeKind::Column => self.columns.len(),
            NodeKind::Model => self.models.len(),
        }
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    /// Relationship counts keyed by type name
    pub fn relationship_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for relationship in &self.relationships {
            *counts.entry(relationship.rel_type().as_str().to_string()).or_insert(0) += 1;
        }
        counts
    }

    pub fn is_empty(&self) -> bool {
        self.node_count() == 0 && self.relationships.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn orders() -> TableKey {
        TableKey::new("analytics", "raw", "orders")
    }

    #[test]
    fn relate_creates_missing_endpoints() {
        let mut batch = GraphBatch::new();
        let source = orders().column("amount");
        let output = TableKey::new("analytics", "marts", "revenue").column("total");

        batch.relate(Relationship::transformed_to(source.clone(), output.clone()));

        assert!(batch.contains(&NodeRef::Column(source.clone())));
        assert!(batch.contains(&NodeRef::Column(output.clone())));
        assert!(batch.contains(&NodeRef::Table(orders())));
        assert!(batch.has_relationship(&Relationship::belongs_to(source)));
        assert!(batch.has_relationship(&Relationship::belongs_to(output)));
        assert_eq!(batch.relationship_count(), 3);
    }

    #[test]
    fn duplicate_relationships_collapse() {
        let mut batch = GraphBatch::new();
        let model = ModelKey::new("model.shop.orders");

        batch.relate(Relationship::feeds_data_into(orders(), model.clone()));
        batch.relate(Relationship::feeds_data_into(orders(), model));

        assert_eq!(batch.relationships_of(RelType::FeedsDataInto).count(), 1);
    }

    #[test]
    fn bare_reference_does_not_erase_properties() {
        let mut batch = GraphBatch::new();
        let key = ModelKey::new("model.shop.orders");

        let mut model = ModelNode::new(key.clone());
        model.name = Some("orders".to_string());
        model.tags = Some(vec!["finance".to_string()]);
        batch.merge_model(model);
        batch.ensure(&NodeRef::Model(key.clone()));

        let stored = batch.model(&key).unwrap();
        assert_eq!(stored.name.as_deref(), Some("orders"));
        assert_eq!(stored.tags, Some(vec!["finance".to_string()]));
    }

    #[test]
    fn table_sources_accumulate() {
        let mut batch = GraphBatch::new();
        batch.merge_table(TableNode::new(orders()).with_source("raw"));
        batch.merge_table(TableNode::new(orders()).with_source("redshift").with_object_type("table"));

        let table = batch.table(&orders()).unwrap();
        assert_eq!(table.sources.iter().cloned().collect::<Vec<_>>(), vec!["raw", "redshift"]);
        assert_eq!(table.object_type.as_deref(), Some("table"));
        assert_eq!(batch.node_count_of(NodeKind::Table), 1);
    }

    #[test]
    fn column_merge_keeps_catalog_attributes() {
        let mut batch = GraphBatch::new();
        let key = orders().column("id");

        batch.merge_column(
            ColumnNode::new(key.clone())
                .with_data_type("integer")
                .with_nullability(Nullability::No)
                .with_constraint(Some("PRIMARY KEY".to_string()), Some("orders_pkey".to_string())),
        );
        batch.merge_column(ColumnNode::new(key.clone()));

        let column = batch.column(&key).unwrap();
        assert_eq!(column.data_type.as_deref(), Some("integer"));
        assert_eq!(column.nullable, Nullability::No);
        assert_eq!(column.constraint_type.as_deref(), Some("PRIMARY KEY"));
    }

    #[test]
    fn catalog_without_constraint_clears_a_dropped_one() {
        let mut batch = GraphBatch::new();
        let key = orders().column("customer_id");

        batch.merge_column(
            ColumnNode::new(key.clone())
                .with_constraint(Some("FOREIGN KEY".to_string()), Some("orders_customer_fk".to_string())),
        );
        batch.merge_column(ColumnNode::new(key.clone()).with_constraint(None, None));

        let column = batch.column(&key).unwrap();
        assert_eq!(column.constraint_type, None);
        assert_eq!(column.constraint_name, None);
        assert!(column.constraint_known);
    }

    #[test]
    fn relationship_endpoint_kinds_match_type() {
        let rel = Relationship::generates(ModelKey::new("model.shop.orders"), orders());
        let (source, target) = rel.rel_type().endpoints();
        assert_eq!(rel.source().kind(), source);
        assert_eq!(rel.target().kind(), target);
    }

    #[test]
    fn nullability_flags() {
        assert_eq!(Nullability::from_flag(Some("YES")), Nullability::Yes);
        assert_eq!(Nullability::from_flag(Some("no")), Nullability::No);
        assert_eq!(Nullability::from_flag(None), Nullability::Unknown);
    }
}
