//! Canonical identity for tables, columns and models
//!
//! Both producers (manifest assembly and catalog introspection) build their
//! keys through this module, so a table seen in compiled SQL and the same
//! table seen in the warehouse catalog converge on one graph node.
//!
//! Policy: quoting characters are stripped, case is preserved as given, and
//! empty segments become [`UNKNOWN_SEGMENT`]. Case is never folded because
//! warehouses disagree on case sensitivity. In the rendered key a segment
//! that contains a dot is wrapped in double quotes, so `("my.db", "raw", "t")`
//! and `("my", "db.raw", "t")` stay distinct.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder for a missing database/schema/table/column segment
pub const UNKNOWN_SEGMENT: &str = "<unknown>";

const QUOTE_CHARS: [char; 4] = ['"', '`', '[', ']'];

/// Strip quoting characters and surrounding whitespace from one segment
///
/// Returns [`UNKNOWN_SEGMENT`] when nothing is left.
pub fn normalize_segment(raw: &str) -> String {
    let stripped: String = raw.trim().chars().filter(|c| !QUOTE_CHARS.contains(c)).collect();
    let stripped = stripped.trim();

    if stripped.is_empty() {
        UNKNOWN_SEGMENT.to_string()
    } else {
        stripped.to_string()
    }
}

/// Split a dotted identifier into its raw parts
///
/// Dots inside a quoted part (`"my.db"."raw"."users"`) do not split.
pub fn split_qualified(raw: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut closing: Option<char> = None;

    for ch in raw.chars() {
        match closing {
            Some(end) if ch == end => {
                closing = None;
                current.push(ch);
            }
            Some(_) => current.push(ch),
            None => match ch {
                '"' | '`' => {
                    closing = Some(ch);
                    current.push(ch);
                }
                '[' => {
                    closing = Some(']');
                    current.push(ch);
                }
                '.' => parts.push(std::mem::take(&mut current)),
                _ => current.push(ch),
            },
        }
    }

    parts.push(current);
    parts
}

/// One segment as rendered in a key
///
/// Segments never contain `"` (normalisation strips it), so quoting the ones
/// with a dot keeps keys unambiguous.
struct KeySegment<'a>(&'a str);

impl fmt::Display for KeySegment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.contains('.') {
            write!(f, "\"{}\"", self.0)
        } else {
            f.write_str(self.0)
        }
    }
}

/// Identity of a physical table or view: `database.schema.name`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableKey {
    database: String,
    schema: String,
    name: String,
}

impl TableKey {
    /// Create a key from raw (possibly quoted) segments
    pub fn new(database: &str, schema: &str, name: &str) -> Self {
        Self {
            database: normalize_segment(database),
            schema: normalize_segment(schema),
            name: normalize_segment(name),
        }
    }

    /// Parse a physical relation name that must have exactly three parts
    ///
    /// This is the `relation_name` format the transformation compiler emits,
    /// e.g. `"analytics"."marts"."orders"`.
    pub fn parse_relation(relation: &str) -> Result<Self, IdentifierError> {
        let parts = split_qualified(relation);

        match parts.as_slice() {
            [database, schema, name] => Ok(Self::new(database, schema, name)),
            _ => Err(IdentifierError::MalformedRelation {
                relation: relation.to_string(),
                parts: parts.len(),
            }),
        }
    }

    /// Build a key from a dotted name of one to three parts
    ///
    /// Parts are right-aligned: `users` has only a table segment, `raw.users`
    /// a schema and a table. Missing leading segments become the placeholder.
    /// Names with more than three parts keep the last three.
    pub fn from_dotted(name: &str) -> Self {
        let parts = split_qualified(name);
        let mut segments = parts.iter().rev();
        let table = segments.next().map(String::as_str).unwrap_or("");
        let schema = segments.next().map(String::as_str).unwrap_or("");
        let database = segments.next().map(String::as_str).unwrap_or("");

        Self::new(database, schema, table)
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The canonical string key
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// Key of a column inside this table
    pub fn column(&self, column: &str) -> ColumnKey {
        ColumnKey {
            table: self.clone(),
            column: normalize_segment(column),
        }
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            KeySegment(&self.database),
            KeySegment(&self.schema),
            KeySegment(&self.name)
        )
    }
}

/// Identity of a column: always four segments, `database.schema.table.column`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColumnKey {
    table: TableKey,
    column: String,
}

impl ColumnKey {
    pub fn new(database: &str, schema: &str, table: &str, column: &str) -> Self {
        TableKey::new(database, schema, table).column(column)
    }

    /// The table this column belongs to
    pub fn table(&self) -> &TableKey {
        &self.table
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, KeySegment(&self.column))
    }
}

/// Identity of a transformation model: the manifest's opaque unique id
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModelKey(String);

impl ModelKey {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier errors (a relation name or dependency string of the wrong shape)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("Relation name '{relation}' has {parts} part(s), expected database.schema.table")]
    MalformedRelation { relation: String, parts: usize },

    #[error("Dependency '{0}' is neither a source nor a model reference")]
    UnknownDependencyKind(String),

    #[error("Source dependency '{0}' does not have kind.project.source.table parts")]
    MalformedSourceDependency(String),
}
