//! SQL parsing using datafusion-sqlparser-rs
//!
//! Compiled model SQL is parsed into an AST with a configurable dialect.
//! Only the first statement is analysed and it has to be a query.

use lineagegraph_core::{Diagnostic, DiagnosticCode, DialectConfig};
use sqlparser::ast::{Query, Statement};
use sqlparser::dialect::{
    BigQueryDialect, Dialect, GenericDialect, PostgreSqlDialect, RedshiftSqlDialect,
    SnowflakeDialect,
};
use sqlparser::parser::{Parser, ParserError};

/// SQL parser with configurable dialect
pub struct SqlParser {
    dialect: Box<dyn Dialect + Send + Sync>,
}

impl SqlParser {
    /// Create a new SQL parser with the default (generic) dialect
    pub fn new() -> Self {
        Self {
            dialect: Box::new(GenericDialect {}),
        }
    }

    pub fn bigquery() -> Self {
        Self {
            dialect: Box::new(BigQueryDialect {}),
        }
    }

    pub fn postgres() -> Self {
        Self {
            dialect: Box::new(PostgreSqlDialect {}),
        }
    }

    pub fn redshift() -> Self {
        Self {
            dialect: Box::new(RedshiftSqlDialect {}),
        }
    }

    pub fn snowflake() -> Self {
        Self {
            dialect: Box::new(SnowflakeDialect {}),
        }
    }

    /// Create a parser from a dialect config
    pub fn from_dialect(dialect: &DialectConfig) -> Self {
        match dialect {
            DialectConfig::BigQuery => Self::bigquery(),
            DialectConfig::Snowflake => Self::snowflake(),
            DialectConfig::Postgres => Self::postgres(),
            DialectConfig::Redshift => Self::redshift(),
            DialectConfig::Ansi => Self::new(),
        }
    }

    /// Parse SQL string into AST
    pub fn parse(&self, sql: &str) -> Result<ParsedSql, ParseError> {
        let statements = Parser::parse_sql(&*self.dialect, sql)
            .map_err(|e| ParseError::syntax(sql, e))?;

        if statements.is_empty() {
            return Err(ParseError {
                sql: sql.to_string(),
                kind: ParseErrorKind::Empty,
            });
        }

        Ok(ParsedSql {
            sql: sql.to_string(),
            statements,
        })
    }

    /// Parse SQL that must be a single query (SELECT, WITH ... SELECT, set operation)
    pub fn parse_query(&self, sql: &str) -> Result<Query, ParseError> {
        let parsed = self.parse(sql)?;

        match parsed.statements.into_iter().next() {
            Some(Statement::Query(query)) => Ok(*query),
            Some(other) => Err(ParseError {
                sql: sql.to_string(),
                kind: ParseErrorKind::NotAQuery(statement_kind(&other)),
            }),
            None => Err(ParseError {
                sql: sql.to_string(),
                kind: ParseErrorKind::Empty,
            }),
        }
    }
}

impl Default for SqlParser {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SqlParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlParser")
            .field("dialect", &self.dialect)
            .finish()
    }
}

fn statement_kind(statement: &Statement) -> String {
    let rendered = statement.to_string();
    rendered
        .split_whitespace()
        .next()
        .unwrap_or("statement")
        .to_uppercase()
}

/// Successfully parsed SQL with AST
#[derive(Debug, Clone)]
pub struct ParsedSql {
    /// Original SQL string
    pub sql: String,

    /// Parsed statements
    pub statements: Vec<Statement>,
}

/// Why compiled SQL could not be analysed
#[derive(Debug, Clone, PartialEq)]
pub enum ParseErrorKind {
    /// Rejected by the parser
    Syntax(ParserError),

    /// Parsed, but the first statement is not a query
    NotAQuery(String),

    /// No statement at all (blank or comment-only SQL)
    Empty,
}

/// SQL parsing error
#[derive(Debug, Clone)]
pub struct ParseError {
    /// Original SQL string
    pub sql: String,

    pub kind: ParseErrorKind,
}

impl ParseError {
    fn syntax(sql: &str, error: ParserError) -> Self {
        Self {
            sql: sql.to_string(),
            kind: ParseErrorKind::Syntax(error),
        }
    }

    /// Convert to a diagnostic
    pub fn to_diagnostic(&self) -> Diagnostic {
        let code = match self.kind {
            ParseErrorKind::NotAQuery(_) => DiagnosticCode::SqlNotAQuery,
            ParseErrorKind::Syntax(_) | ParseErrorKind::Empty => DiagnosticCode::SqlParseError,
        };

        Diagnostic::warn(code, self.to_string())
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ParseErrorKind::Syntax(error) => write!(f, "SQL parse error: {}", error),
            ParseErrorKind::NotAQuery(kind) => {
                write!(f, "SQL is a {} statement, not a query", kind)
            }
            ParseErrorKind::Empty => write!(f, "SQL contains no statement"),
        }
    }
}

impl std::error::Error for ParseError {}
