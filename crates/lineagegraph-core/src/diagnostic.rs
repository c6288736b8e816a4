//! Diagnostic codes for isolated, non-fatal import problems
//!
//! IMPORTANT: Diagnostic codes are versioned and stable.
//! NEVER rename or remove codes - they end up in import reports.
//! Add new codes with new names only.

use serde::{Deserialize, Serialize};

/// Diagnostic code registry (v1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    // SQL lineage (1xxx)
    /// Compiled SQL could not be parsed; the model has no column lineage
    SqlParseError,

    /// Compiled SQL parsed but is not a SELECT query
    SqlNotAQuery,

    /// A qualified column referenced an alias not present in FROM/JOIN
    UnresolvedTableAlias,

    /// An unqualified column in a multi-table query was left unattributed
    AmbiguousUnqualifiedColumn,

    /// `*` or `alias.*` in the select list; no per-column lineage recorded
    UnsupportedWildcard,

    // Identifiers (2xxx)
    /// A relation name was not database.schema.table
    MalformedRelationName,

    /// A dependency string was neither a source nor a model reference
    MalformedDependency,

    // Catalog (3xxx)
    /// A foreign key row without a referenced column
    IncompleteForeignKey,

    // General (9xxx)
    /// General informational message
    Info,

    /// General warning message
    Warning,
}

impl DiagnosticCode {
    /// Get the diagnostic code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SqlParseError => "SQL_PARSE_ERROR",
            Self::SqlNotAQuery => "SQL_NOT_A_QUERY",
            Self::UnresolvedTableAlias => "UNRESOLVED_TABLE_ALIAS",
            Self::AmbiguousUnqualifiedColumn => "AMBIGUOUS_UNQUALIFIED_COLUMN",
            Self::UnsupportedWildcard => "UNSUPPORTED_WILDCARD",
            Self::MalformedRelationName => "MALFORMED_RELATION_NAME",
            Self::MalformedDependency => "MALFORMED_DEPENDENCY",
            Self::IncompleteForeignKey => "INCOMPLETE_FOREIGN_KEY",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,

    /// Something was skipped; the rest of the import went ahead
    Warn,

    /// Something was skipped and the graph is visibly incomplete for it
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A diagnostic message with structured metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable diagnostic code
    pub code: DiagnosticCode,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// What the diagnostic is about (model id, table key, dependency string)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with minimal fields
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            subject: None,
        }
    }

    /// Shorthand for a warning, the usual severity for a skipped item
    pub fn warn(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Warn, message)
    }

    /// Set the subject
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.subject {
            Some(subject) => write!(f, "[{}] {} ({})", self.code, self.message, subject),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_code_stability() {
        assert_eq!(DiagnosticCode::SqlParseError.as_str(), "SQL_PARSE_ERROR");
        assert_eq!(DiagnosticCode::MalformedRelationName.as_str(), "MALFORMED_RELATION_NAME");
    }

    #[test]
    fn diagnostic_serialization() {
        let diag = Diagnostic::warn(DiagnosticCode::SqlParseError, "Expected FROM")
            .with_subject("model.shop.orders");

        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains("SQL_PARSE_ERROR"));
        assert!(json.contains("warn"));
        assert!(json.contains("model.shop.orders"));
    }

    #[test]
    fn display_includes_subject() {
        let diag = Diagnostic::warn(DiagnosticCode::MalformedDependency, "unknown prefix")
            .with_subject("seed.shop.countries");
        assert_eq!(diag.to_string(), "[MALFORMED_DEPENDENCY] unknown prefix (seed.shop.countries)");
    }
}
