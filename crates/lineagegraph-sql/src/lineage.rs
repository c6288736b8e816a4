//! Column-level lineage for one compiled SELECT
//!
//! For every output column of the outermost SELECT, collects the
//! `(table, column)` references its expression reads. No semantic analysis
//! is done beyond a successful parse.
//!
//! Known approximations:
//! - an unqualified column in a multi-table query is attributed to the first
//!   FROM/JOIN relation (or left out, with [`UnqualifiedColumnPolicy::Omit`])
//! - an unaliased expression that is not a plain column reference is keyed by
//!   its rendered SQL text
//! - CTE and derived-table references are reported under their own name; the
//!   lineage is not traced through them
//! - for set operations only the left-most SELECT is analysed

use crate::parser::{ParseError, SqlParser};
use crate::resolver::{cte_names, TableName, TableScope};
use indexmap::IndexMap;
use lineagegraph_core::{Diagnostic, DiagnosticCode, UnqualifiedColumnPolicy};
use sqlparser::ast::{
    Expr, Function, FunctionArg, FunctionArgExpr, FunctionArguments, GroupByExpr, Ident, Query,
    Select, SelectItem, SetExpr, Value, Visit, Visitor,
};
use std::ops::ControlFlow;

/// One source reference of an output column
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceColumn {
    /// Resolved table name, or the raw qualifier when it did not resolve
    pub table: TableName,

    pub column: String,
}

impl SourceColumn {
    pub fn new(table: TableName, column: impl Into<String>) -> Self {
        Self {
            table,
            column: column.into(),
        }
    }
}

impl std::fmt::Display for SourceColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// Lineage of one statement: output column name -> source columns
#[derive(Debug, Clone, Default)]
pub struct ColumnLineage {
    /// Output columns in SELECT-list order
    outputs: IndexMap<String, Vec<SourceColumn>>,

    /// Output names referenced by GROUP BY ordinals (`GROUP BY 1, 2`)
    grouped_by: Vec<String>,

    /// Non-fatal problems found while resolving references
    pub diagnostics: Vec<Diagnostic>,
}

impl ColumnLineage {
    /// Sources of one output column
    pub fn sources(&self, output: &str) -> Option<&[SourceColumn]> {
        self.outputs.get(output).map(Vec::as_slice)
    }

    pub fn outputs(&self) -> impl Iterator<Item = (&str, &[SourceColumn])> {
        self.outputs.iter().map(|(name, sources)| (name.as_str(), sources.as_slice()))
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }

    pub fn grouped_by(&self) -> &[String] {
        &self.grouped_by
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Whether at least one output column has a source
    pub fn has_sources(&self) -> bool {
        self.outputs.values().any(|sources| !sources.is_empty())
    }

    fn record(&mut self, output: String, sources: Vec<SourceColumn>) {
        let entry = self.outputs.entry(output).or_default();
        for source in sources {
            if !entry.contains(&source) {
                entry.push(source);
            }
        }
    }
}

/// Extracts column lineage from compiled SQL
#[derive(Debug)]
pub struct ColumnLineageExtractor {
    parser: SqlParser,
    unqualified: UnqualifiedColumnPolicy,
}

impl ColumnLineageExtractor {
    pub fn new(parser: SqlParser) -> Self {
        Self {
            parser,
            unqualified: UnqualifiedColumnPolicy::default(),
        }
    }

    pub fn with_unqualified_policy(mut self, policy: UnqualifiedColumnPolicy) -> Self {
        self.unqualified = policy;
        self
    }

    /// Parse `sql` and extract its column lineage
    pub fn extract(&self, sql: &str) -> Result<ColumnLineage, ParseError> {
        let query = self.parser.parse_query(sql)?;
        Ok(self.extract_query(&query))
    }

    /// Extract column lineage from an already-parsed query
    pub fn extract_query(&self, query: &Query) -> ColumnLineage {
        let mut lineage = ColumnLineage::default();

        match outermost_select(&query.body) {
            Some(select) => {
                let ctes = cte_names(query);
                let scope = TableScope::from_select(select, &ctes);
                self.extract_select(select, &scope, &mut lineage);
            }
            None => {
                lineage.diagnostics.push(Diagnostic::warn(
                    DiagnosticCode::SqlNotAQuery,
                    "Query body has no SELECT to take lineage from",
                ));
            }
        }

        lineage
    }

    fn extract_select(&self, select: &Select, scope: &TableScope, lineage: &mut ColumnLineage) {
        let mut names = Vec::with_capacity(select.projection.len());

        for item in &select.projection {
            match item {
                SelectItem::UnnamedExpr(expr) => {
                    let output = output_name(expr);
                    let sources = self.sources_of(expr, scope, &output, &mut lineage.diagnostics);
                    names.push(Some(output.clone()));
                    lineage.record(output, sources);
                }
                SelectItem::ExprWithAlias { expr, alias } => {
                    let output = alias.value.clone();
                    let sources = self.sources_of(expr, scope, &output, &mut lineage.diagnostics);
                    names.push(Some(output.clone()));
                    lineage.record(output, sources);
                }
                SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(_, _) => {
                    names.push(None);
                    lineage.diagnostics.push(
                        Diagnostic::warn(
                            DiagnosticCode::UnsupportedWildcard,
                            "Wildcard in select list; no column lineage recorded for it",
                        )
                        .with_subject(item.to_string()),
                    );
                }
            }
        }

        // GROUP BY ordinals point back into the select list; they are not sources
        if let GroupByExpr::Expressions(exprs, _) = &select.group_by {
            for expr in exprs {
                if let Some(position) = ordinal(expr) {
                    if let Some(Some(name)) = position.checked_sub(1).and_then(|i| names.get(i)) {
                        lineage.grouped_by.push(name.clone());
                    }
                }
            }
        }
    }

    fn sources_of(
        &self,
        expr: &Expr,
        scope: &TableScope,
        output: &str,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Vec<SourceColumn> {
        let mut collector = ColumnRefCollector::default();
        let _ = expr.visit(&mut collector);

        let mut sources = Vec::new();
        for reference in collector.references {
            match reference {
                ColumnRef::Qualified { qualifier, column } => match scope.resolve(&qualifier) {
                    Some(relation) => sources.push(SourceColumn::new(relation.name.clone(), column)),
                    None => {
                        diagnostics.push(
                            Diagnostic::warn(
                                DiagnosticCode::UnresolvedTableAlias,
                                format!("Qualifier '{}' is not a relation in FROM", qualifier),
                            )
                            .with_subject(output.to_string()),
                        );
                        sources.push(SourceColumn::new(qualifier, column));
                    }
                },
                ColumnRef::Unqualified(column) => {
                    if self.unqualified == UnqualifiedColumnPolicy::Omit && scope.len() > 1 {
                        diagnostics.push(
                            Diagnostic::warn(
                                DiagnosticCode::AmbiguousUnqualifiedColumn,
                                format!(
                                    "Unqualified column '{}' with {} relations in FROM",
                                    column,
                                    scope.len()
                                ),
                            )
                            .with_subject(output.to_string()),
                        );
                        continue;
                    }

                    if let Some(relation) = scope.first() {
                        sources.push(SourceColumn::new(relation.name.clone(), column));
                    }
                }
            }
        }

        sources
    }
}

impl Default for ColumnLineageExtractor {
    fn default() -> Self {
        Self::new(SqlParser::new())
    }
}

/// Left-most SELECT of a query body
fn outermost_select(body: &SetExpr) -> Option<&Select> {
    match body {
        SetExpr::Select(select) => Some(select),
        SetExpr::Query(query) => outermost_select(&query.body),
        SetExpr::SetOperation { left, .. } => outermost_select(left),
        _ => None,
    }
}

/// Name of an unaliased select-list expression
fn output_name(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(ident) => ident.value.clone(),
        Expr::CompoundIdentifier(idents) => idents
            .last()
            .map(|ident| ident.value.clone())
            .unwrap_or_else(|| expr.to_string()),
        Expr::Nested(inner) => output_name(inner),
        _ => expr.to_string(),
    }
}

fn ordinal(expr: &Expr) -> Option<usize> {
    match expr {
        Expr::Value(Value::Number(n, _)) => n.parse().ok(),
        _ => None,
    }
}

enum ColumnRef {
    Qualified { qualifier: TableName, column: String },
    Unqualified(String),
}

/// Functions whose first argument is a date part, e.g. `DATEADD(day, 7, created_at)`
const DATE_PART_FUNCTIONS: &[&str] = &[
    "dateadd",
    "date_add",
    "datediff",
    "datepart",
    "date_part",
    "date_trunc",
    "timestampadd",
    "timestampdiff",
];

const DATE_PARTS: &[&str] = &[
    "millennium", "millennia", "century", "centuries", "decade", "decades", "year", "years", "y",
    "yy", "yyy", "yyyy", "yr", "yrs", "quarter", "quarters", "qtr", "qtrs", "q", "month",
    "months", "mon", "mons", "mm", "week", "weeks", "w", "wk", "weekday", "dow", "dw", "day",
    "days", "d", "dd", "dayofyear", "doy", "dy", "hour", "hours", "h", "hh", "hr", "hrs",
    "minute", "minutes", "m", "mi", "min", "mins", "second", "seconds", "s", "sec", "secs",
    "millisecond", "milliseconds", "ms", "msec", "msecs", "microsecond", "microseconds",
    "microsec", "microsecs", "us", "usec", "usecs", "epoch",
];

/// The leading date-part keyword of a date function, if it has one
///
/// Only unquoted identifiers naming a date part qualify, so a real column in
/// first position (`DATE_ADD(created_at, INTERVAL 1 DAY)`) is still collected.
fn date_part_argument(function: &Function) -> Option<&Ident> {
    let name = function.name.0.last()?.value.to_lowercase();
    if !DATE_PART_FUNCTIONS.contains(&name.as_str()) {
        return None;
    }

    let FunctionArguments::List(list) = &function.args else {
        return None;
    };
    match list.args.first()? {
        FunctionArg::Unnamed(FunctionArgExpr::Expr(Expr::Identifier(ident)))
            if ident.quote_style.is_none()
                && DATE_PARTS.contains(&ident.value.to_lowercase().as_str()) =>
        {
            Some(ident)
        }
        _ => None,
    }
}

/// Collects column references of one expression, skipping nested queries
#[derive(Default)]
struct ColumnRefCollector {
    query_depth: usize,
    references: Vec<ColumnRef>,
    /// Date-part keyword of the function being entered; its next visit is skipped
    date_part: Option<String>,
}

impl ColumnRefCollector {
    fn push_compound(&mut self, idents: &[Ident]) {
        match idents.split_last() {
            Some((column, [])) => self.references.push(ColumnRef::Unqualified(column.value.clone())),
            Some((column, qualifier)) => self.references.push(ColumnRef::Qualified {
                qualifier: TableName::from_idents(qualifier),
                column: column.value.clone(),
            }),
            None => {}
        }
    }
}

impl Visitor for ColumnRefCollector {
    type Break = ();

    fn pre_visit_query(&mut self, _query: &Query) -> ControlFlow<Self::Break> {
        self.query_depth += 1;
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &Query) -> ControlFlow<Self::Break> {
        self.query_depth -= 1;
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        if self.query_depth > 0 {
            return ControlFlow::Continue(());
        }

        match expr {
            Expr::Function(function) => {
                self.date_part = date_part_argument(function).map(|ident| ident.value.clone());
            }
            Expr::Identifier(ident) => {
                if self.date_part.take().as_deref() != Some(ident.value.as_str()) {
                    self.references.push(ColumnRef::Unqualified(ident.value.clone()));
                }
            }
            Expr::CompoundIdentifier(idents) => self.push_compound(idents),
            _ => {}
        }

        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineagegraph_core::DialectConfig;
    use pretty_assertions::assert_eq;

    fn table(parts: &[&str]) -> TableName {
        TableName::new(parts.iter().map(|p| p.to_string()).collect())
    }

    fn extract(sql: &str) -> ColumnLineage {
        ColumnLineageExtractor::default().extract(sql).unwrap()
    }

    #[test]
    fn alias_resolves_to_qualified_table() {
        let lineage = extract("SELECT a.x AS y FROM db.raw.t1 a");

        assert_eq!(
            lineage.sources("y").unwrap(),
            &[SourceColumn::new(table(&["db", "raw", "t1"]), "x")]
        );
    }

    #[test]
    fn alias_resolves_without_catalog_parts() {
        let lineage = extract("SELECT a.x AS y FROM t1 a");
        assert_eq!(lineage.sources("y").unwrap(), &[SourceColumn::new(table(&["t1"]), "x")]);
    }

    #[test]
    fn unqualified_column_uses_single_table() {
        let lineage = extract("SELECT x FROM t1");
        assert_eq!(lineage.sources("x").unwrap(), &[SourceColumn::new(table(&["t1"]), "x")]);
    }

    #[test]
    fn date_part_keywords_are_not_columns() {
        let extractor = ColumnLineageExtractor::new(SqlParser::from_dialect(&DialectConfig::Redshift));
        let lineage = extractor
            .extract(
                "SELECT DATEADD(day, 7, o.created_at) AS due, \
                        DATEDIFF(DAY, o.created_at, o.shipped_at) AS lead_days \
                 FROM raw.orders o",
            )
            .unwrap();

        assert_eq!(
            lineage.sources("due").unwrap(),
            &[SourceColumn::new(table(&["raw", "orders"]), "created_at")]
        );
        assert_eq!(
            lineage.sources("lead_days").unwrap(),
            &[
                SourceColumn::new(table(&["raw", "orders"]), "created_at"),
                SourceColumn::new(table(&["raw", "orders"]), "shipped_at"),
            ]
        );
    }

    #[test]
    fn leading_column_of_date_function_is_kept() {
        // not a date part, so it is a column
        let lineage = extract("SELECT DATEADD(unit_col, 1, created_at) AS shifted FROM orders");
        assert_eq!(
            lineage.sources("shifted").unwrap(),
            &[
                SourceColumn::new(table(&["orders"]), "unit_col"),
                SourceColumn::new(table(&["orders"]), "created_at"),
            ]
        );
    }

    #[test]
    fn unqualified_column_falls_back_to_first_table() {
        let lineage = extract("SELECT amount FROM orders o JOIN customers c ON o.customer_id = c.id");
        assert_eq!(
            lineage.sources("amount").unwrap(),
            &[SourceColumn::new(table(&["orders"]), "amount")]
        );
    }

    #[test]
    fn omit_policy_leaves_ambiguous_columns_out() {
        let extractor = ColumnLineageExtractor::default()
            .with_unqualified_policy(UnqualifiedColumnPolicy::Omit);
        let lineage = extractor
            .extract("SELECT amount, c.name FROM orders o JOIN customers c ON o.customer_id = c.id")
            .unwrap();

        assert_eq!(lineage.sources("amount").unwrap(), &[] as &[SourceColumn]);
        assert_eq!(lineage.sources("name").unwrap(), &[SourceColumn::new(table(&["customers"]), "name")]);
        assert_eq!(lineage.diagnostics.len(), 1);
        assert_eq!(lineage.diagnostics[0].code, DiagnosticCode::AmbiguousUnqualifiedColumn);
    }

    #[test]
    fn omit_policy_keeps_single_table_columns() {
        let extractor = ColumnLineageExtractor::default()
            .with_unqualified_policy(UnqualifiedColumnPolicy::Omit);
        let lineage = extractor.extract("SELECT amount FROM orders").unwrap();
        assert_eq!(lineage.sources("amount").unwrap().len(), 1);
    }

    #[test]
    fn expression_collects_every_column() {
        let lineage = extract(
            "SELECT o.price * o.quantity + COALESCE(d.amount, 0) AS net \
             FROM shop.orders o LEFT JOIN shop.discounts d ON o.id = d.order_id",
        );

        assert_eq!(
            lineage.sources("net").unwrap(),
            &[
                SourceColumn::new(table(&["shop", "orders"]), "price"),
                SourceColumn::new(table(&["shop", "orders"]), "quantity"),
                SourceColumn::new(table(&["shop", "discounts"]), "amount"),
            ]
        );
    }

    #[test]
    fn unaliased_expression_is_keyed_by_its_text() {
        let lineage = extract("SELECT upper(name) FROM users");
        let names: Vec<_> = lineage.output_names().collect();
        assert_eq!(names, vec!["upper(name)"]);
        assert_eq!(lineage.sources("upper(name)").unwrap(), &[SourceColumn::new(table(&["users"]), "name")]);
    }

    #[test]
    fn qualified_unaliased_column_is_named_by_its_column() {
        let lineage = extract("SELECT u.email FROM users u");
        assert!(lineage.sources("email").is_some());
    }

    #[test]
    fn literal_output_has_no_sources() {
        let lineage = extract("SELECT 1 AS one, id FROM users");
        assert_eq!(lineage.sources("one").unwrap(), &[] as &[SourceColumn]);
        assert!(lineage.has_sources());
    }

    #[test]
    fn group_by_ordinals_are_not_sources() {
        let lineage = extract("SELECT customer_id, SUM(amount) AS total FROM orders GROUP BY 1");

        assert_eq!(lineage.grouped_by(), &["customer_id".to_string()]);
        assert_eq!(
            lineage.sources("total").unwrap(),
            &[SourceColumn::new(table(&["orders"]), "amount")]
        );
    }

    #[test]
    fn unresolved_qualifier_keeps_raw_alias() {
        let lineage = extract("SELECT z.x AS y FROM t1 a");

        assert_eq!(lineage.sources("y").unwrap(), &[SourceColumn::new(table(&["z"]), "x")]);
        assert_eq!(lineage.diagnostics[0].code, DiagnosticCode::UnresolvedTableAlias);
    }

    #[test]
    fn scalar_subquery_columns_are_skipped() {
        let lineage = extract(
            "SELECT o.id, (SELECT MAX(p.amount) FROM payments p WHERE p.order_id = o.id) AS paid \
             FROM orders o",
        );

        assert_eq!(lineage.sources("paid").unwrap(), &[] as &[SourceColumn]);
        assert_eq!(lineage.sources("id").unwrap(), &[SourceColumn::new(table(&["orders"]), "id")]);
    }

    #[test]
    fn wildcard_is_reported() {
        let lineage = extract("SELECT * FROM users");
        assert!(lineage.is_empty());
        assert_eq!(lineage.diagnostics[0].code, DiagnosticCode::UnsupportedWildcard);
    }

    #[test]
    fn cte_reference_is_reported_under_cte_name() {
        let lineage = extract("WITH base AS (SELECT id FROM users) SELECT b.id FROM base b");
        assert_eq!(lineage.sources("id").unwrap(), &[SourceColumn::new(table(&["base"]), "id")]);
    }

    #[test]
    fn set_operation_uses_left_select() {
        let lineage = extract("SELECT id FROM a UNION ALL SELECT id FROM b");
        assert_eq!(lineage.sources("id").unwrap(), &[SourceColumn::new(table(&["a"]), "id")]);
    }

    #[test]
    fn duplicate_sources_collapse() {
        let lineage = extract("SELECT a.x + a.x AS doubled FROM t a");
        assert_eq!(lineage.sources("doubled").unwrap().len(), 1);
    }

    #[test]
    fn parse_failure_is_an_error() {
        let result = ColumnLineageExtractor::default().extract("SELECT id FROM (((");
        assert!(result.is_err());
    }
}
