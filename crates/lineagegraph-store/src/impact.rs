//! Upstream/downstream impact traversal
//!
//! Follows data-flow relationships (`FEEDS_DATA_INTO`, `PROCEEDS_TO`,
//! `GENERATES`, `TRANSFORMED_TO`) in either direction. Structural edges
//! (`BELONGS_TO`, `REFERENCES`) are not followed.

use lineagegraph_core::{GraphBatch, NodeRef};
use std::collections::{HashMap, HashSet, VecDeque};

/// Forward and reverse data-flow edges of a graph
#[derive(Debug, Clone, Default)]
pub struct ImpactGraph {
    /// node -> nodes it reads from
    parents: HashMap<NodeRef, Vec<NodeRef>>,

    /// node -> nodes that read from it
    children: HashMap<NodeRef, Vec<NodeRef>>,
}

impl ImpactGraph {
    pub fn from_batch(batch: &GraphBatch) -> Self {
        let mut graph = Self::default();

        for relationship in batch.relationships().filter(|r| r.rel_type().is_data_flow()) {
            let source = relationship.source().clone();
            let target = relationship.target().clone();

            graph.children.entry(source.clone()).or_default().push(target.clone());
            graph.parents.entry(target).or_default().push(source);
        }

        graph
    }

    /// Find a node by its canonical key, at any granularity
    pub fn find(&self, key: &str) -> Option<&NodeRef> {
        self.parents
            .keys()
            .chain(self.children.keys())
            .find(|node| node.key() == key)
    }

    pub fn parents(&self, node: &NodeRef) -> Vec<&NodeRef> {
        self.parents
            .get(node)
            .map(|nodes| nodes.iter().collect())
            .unwrap_or_default()
    }

    pub fn children(&self, node: &NodeRef) -> Vec<&NodeRef> {
        self.children
            .get(node)
            .map(|nodes| nodes.iter().collect())
            .unwrap_or_default()
    }

    /// Everything affected if this node changes, nearest first
    pub fn downstream(&self, node: &NodeRef) -> Vec<NodeRef> {
        Self::walk(&self.children, node)
    }

    /// Everything this node is derived from, nearest first
    pub fn upstream(&self, node: &NodeRef) -> Vec<NodeRef> {
        Self::walk(&self.parents, node)
    }

    fn walk(edges: &HashMap<NodeRef, Vec<NodeRef>>, start: &NodeRef) -> Vec<NodeRef> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        let mut result = Vec::new();

        visited.insert(start.clone());
        if let Some(next) = edges.get(start) {
            queue.extend(next.iter().cloned());
        }

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }

            if let Some(next) = edges.get(&current) {
                queue.extend(next.iter().filter(|n| !visited.contains(*n)).cloned());
            }
            result.push(current);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineagegraph_core::{ColumnKey, ModelKey, Relationship, TableKey};

    fn graph() -> GraphBatch {
        let raw = TableKey::new("analytics", "raw", "orders");
        let stg = ModelKey::new("model.shop.stg_orders");
        let mart = ModelKey::new("model.shop.revenue");

        let mut batch = GraphBatch::new();
        batch.relate(Relationship::feeds_data_into(raw.clone(), stg.clone()));
        batch.relate(Relationship::proceeds_to(stg.clone(), mart.clone()));
        batch.relate(Relationship::generates(mart, TableKey::new("analytics", "marts", "revenue")));
        batch.relate(Relationship::transformed_to(
            raw.column("amount"),
            ColumnKey::new("analytics", "staging", "stg_orders", "amount"),
        ));
        batch.relate(Relationship::transformed_to(
            ColumnKey::new("analytics", "staging", "stg_orders", "amount"),
            ColumnKey::new("analytics", "marts", "revenue", "total"),
        ));
        batch
    }

    #[test]
    fn downstream_of_a_source_table() {
        let impact = ImpactGraph::from_batch(&graph());
        let raw = NodeRef::Table(TableKey::new("analytics", "raw", "orders"));

        let keys: Vec<String> = impact.downstream(&raw).iter().map(NodeRef::key).collect();
        assert_eq!(
            keys,
            vec![
                "model.shop.stg_orders".to_string(),
                "model.shop.revenue".to_string(),
                "analytics.marts.revenue".to_string(),
            ]
        );
    }

    #[test]
    fn upstream_of_a_column() {
        let impact = ImpactGraph::from_batch(&graph());
        let total = impact.find("analytics.marts.revenue.total").unwrap().clone();

        let keys: Vec<String> = impact.upstream(&total).iter().map(NodeRef::key).collect();
        assert_eq!(
            keys,
            vec![
                "analytics.staging.stg_orders.amount".to_string(),
                "analytics.raw.orders.amount".to_string(),
            ]
        );
    }

    #[test]
    fn structural_edges_are_not_followed() {
        let impact = ImpactGraph::from_batch(&graph());

        // BELONGS_TO exists for every column but is not data flow
        let raw_amount = NodeRef::Column(ColumnKey::new("analytics", "raw", "orders", "amount"));
        assert!(impact.parents(&raw_amount).is_empty());
        assert_eq!(impact.children(&raw_amount).len(), 1);
    }

    #[test]
    fn cycles_terminate() {
        let a = ModelKey::new("model.shop.a");
        let b = ModelKey::new("model.shop.b");

        let mut batch = GraphBatch::new();
        batch.relate(Relationship::proceeds_to(a.clone(), b.clone()));
        batch.relate(Relationship::proceeds_to(b, a.clone()));

        let impact = ImpactGraph::from_batch(&batch);
        assert_eq!(impact.downstream(&NodeRef::Model(a)).len(), 1);
    }

    #[test]
    fn unknown_key() {
        assert!(ImpactGraph::from_batch(&graph()).find("nope").is_none());
    }
}
