//! Table alias resolution for a single SELECT
//!
//! Collects the FROM/JOIN relations in encounter order and maps each alias
//! (or bare table name) to the qualified name written in the SQL.

use sqlparser::ast::{Cte, Ident, ObjectName, Query, Select, TableFactor, TableWithJoins};
use std::collections::HashSet;
use std::fmt;

/// A table name as written in SQL, one entry per dotted part
///
/// Missing parts are omitted, never defaulted. Quoting is already removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableName(Vec<String>);

impl TableName {
    pub fn new(parts: Vec<String>) -> Self {
        Self(parts)
    }

    pub(crate) fn from_object_name(name: &ObjectName) -> Self {
        Self(name.0.iter().map(|ident| ident.value.clone()).collect())
    }

    pub(crate) fn from_idents(idents: &[Ident]) -> Self {
        Self(idents.iter().map(|ident| ident.value.clone()).collect())
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// Last part (the table itself)
    pub fn base(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or("")
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// What a FROM/JOIN entry refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// A physical table or view
    Table,

    /// A name defined in the query's WITH clause
    Cte,

    /// A parenthesised subquery with an alias
    Derived,
}

/// One relation in scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedRelation {
    pub name: TableName,
    pub alias: Option<String>,
    pub kind: RelationKind,
}

impl ScopedRelation {
    /// Whether `qualifier` (as written before the column name) refers to this relation
    fn answers_to(&self, qualifier: &TableName) -> bool {
        match &self.alias {
            Some(alias) => qualifier.parts().len() == 1 && alias.eq_ignore_ascii_case(qualifier.base()),
            None => {
                let own = self.name.parts();
                let wanted = qualifier.parts();
                // `orders.id` matches `raw.orders`; `raw.orders.id` matches too
                wanted.len() <= own.len()
                    && own[own.len() - wanted.len()..]
                        .iter()
                        .zip(wanted)
                        .all(|(a, b)| a.eq_ignore_ascii_case(b))
            }
        }
    }
}

/// Ordered scope of the relations in one SELECT's FROM clause
#[derive(Debug, Clone, Default)]
pub struct TableScope {
    relations: Vec<ScopedRelation>,
}

impl TableScope {
    /// Build the scope of the outermost SELECT of `select`, with `ctes` naming
    /// the WITH-clause relations visible to it
    pub fn from_select(select: &Select, ctes: &HashSet<String>) -> Self {
        let mut scope = Self::default();
        for table_with_joins in &select.from {
            scope.collect_table_with_joins(table_with_joins, ctes);
        }
        scope
    }

    fn collect_table_with_joins(&mut self, table_with_joins: &TableWithJoins, ctes: &HashSet<String>) {
        self.collect_factor(&table_with_joins.relation, ctes);
        for join in &table_with_joins.joins {
            self.collect_factor(&join.relation, ctes);
        }
    }

    fn collect_factor(&mut self, factor: &TableFactor, ctes: &HashSet<String>) {
        match factor {
            TableFactor::Table { name, alias, .. } => {
                let name = TableName::from_object_name(name);
                let kind = if name.parts().len() == 1 && ctes.contains(&name.base().to_lowercase()) {
                    RelationKind::Cte
                } else {
                    RelationKind::Table
                };

                self.relations.push(ScopedRelation {
                    name,
                    alias: alias.as_ref().map(|a| a.name.value.clone()),
                    kind,
                });
            }
            TableFactor::Derived { alias: Some(alias), .. } => {
                self.relations.push(ScopedRelation {
                    name: TableName::new(vec![alias.name.value.clone()]),
                    alias: Some(alias.name.value.clone()),
                    kind: RelationKind::Derived,
                });
            }
            TableFactor::NestedJoin { table_with_joins, .. } => {
                self.collect_table_with_joins(table_with_joins, ctes);
            }
            _ => {}
        }
    }

    /// Resolve a column qualifier to the relation it names
    pub fn resolve(&self, qualifier: &TableName) -> Option<&ScopedRelation> {
        // Exact-case match first so `"A"` and `a` can coexist
        self.relations
            .iter()
            .find(|r| r.alias.as_deref() == Some(qualifier.base()) && qualifier.parts().len() == 1)
            .or_else(|| self.relations.iter().find(|r| r.answers_to(qualifier)))
    }

    /// First relation in FROM/JOIN order
    pub fn first(&self) -> Option<&ScopedRelation> {
        self.relations.first()
    }

    pub fn relations(&self) -> &[ScopedRelation] {
        &self.relations
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

/// Lower-cased names defined in a query's WITH clause
pub fn cte_names(query: &Query) -> HashSet<String> {
    query
        .with
        .as_ref()
        .map(|with| with.cte_tables.iter().map(cte_name).collect())
        .unwrap_or_default()
}

fn cte_name(cte: &Cte) -> String {
    cte.alias.name.value.to_lowercase()
}
