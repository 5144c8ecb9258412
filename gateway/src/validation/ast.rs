// Path and File Name : /root/crate/gateway/src/validation/ast.rs
// Details of functionality of this file: a thin wrapper over sqlparser's Postgres dialect, giving
// the rest of the validator a typed view of statement shape instead of re-parsing text with regex.

use sqlparser::ast::{BinaryOperator, Expr, Join, JoinConstraint, JoinOperator, SetExpr, Statement, TableFactor};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

#[derive(Debug)]
pub struct ParsedStatement {
    pub statement: Statement,
}

#[derive(Debug, Clone)]
pub struct JoinRef {
    pub left_table: String,
    pub right_table: String,
    pub join_operator: String,
    pub has_on_clause: bool,
    /// The bare column names of the ON clause's equality comparison, when the ON clause is a
    /// single equality (or an AND-chain containing one). `None` if the ON clause has no recognizable
    /// equality - e.g. a CROSS JOIN with no constraint, or a non-equality predicate.
    pub left_col: Option<String>,
    pub right_col: Option<String>,
}

impl ParsedStatement {
    pub fn parse(sql: &str) -> Result<Self, String> {
        let dialect = PostgreSqlDialect {};
        let mut statements = Parser::parse_sql(&dialect, sql).map_err(|e| e.to_string())?;
        if statements.len() != 1 {
            return Err(format!("expected exactly one statement, found {}", statements.len()));
        }
        Ok(Self { statement: statements.remove(0) })
    }

    pub fn is_select(&self) -> bool {
        matches!(self.statement, Statement::Query(_))
    }

    /// Flattens every FROM-clause join across every SELECT in the statement (including set
    /// operations like UNION) into a single list the join validator can check against the graph.
    pub fn joins(&self) -> Vec<JoinRef> {
        let Statement::Query(query) = &self.statement else { return Vec::new() };
        let mut joins = Vec::new();
        Self::collect_joins_from_set_expr(&query.body, &mut joins);
        joins
    }

    /// Every table name referenced in a FROM clause or JOIN, across every SELECT in the statement,
    /// including names still carrying their original schema qualifier if the query supplied one.
    pub fn tables(&self) -> Vec<String> {
        let Statement::Query(query) = &self.statement else { return Vec::new() };
        let mut tables = Vec::new();
        Self::collect_tables_from_set_expr(&query.body, &mut tables);
        tables
    }

    /// Lowercased names bound by a WITH clause - these are not physical tables and must be
    /// excluded from table-existence and join-path checks.
    pub fn cte_names(&self) -> std::collections::HashSet<String> {
        let Statement::Query(query) = &self.statement else { return std::collections::HashSet::new() };
        query
            .with
            .as_ref()
            .map(|w| w.cte_tables.iter().map(|c| c.alias.name.value.to_lowercase()).collect())
            .unwrap_or_default()
    }

    fn collect_tables_from_set_expr(body: &SetExpr, out: &mut Vec<String>) {
        match body {
            SetExpr::Select(select) => {
                for table_with_joins in &select.from {
                    out.push(table_factor_name(&table_with_joins.relation));
                    for join in &table_with_joins.joins {
                        out.push(table_factor_name(&join.relation));
                    }
                }
            }
            SetExpr::SetOperation { left, right, .. } => {
                Self::collect_tables_from_set_expr(left, out);
                Self::collect_tables_from_set_expr(right, out);
            }
            SetExpr::Query(q) => Self::collect_tables_from_set_expr(&q.body, out),
            _ => {}
        }
    }

    fn collect_joins_from_set_expr(body: &SetExpr, out: &mut Vec<JoinRef>) {
        match body {
            SetExpr::Select(select) => {
                for table_with_joins in &select.from {
                    let left_name = table_factor_name(&table_with_joins.relation);
                    let mut current_left = left_name;
                    for join in &table_with_joins.joins {
                        let right_name = table_factor_name(&join.relation);
                        out.push(join_ref(&current_left, &right_name, join));
                        current_left = right_name;
                    }
                }
            }
            SetExpr::SetOperation { left, right, .. } => {
                Self::collect_joins_from_set_expr(left, out);
                Self::collect_joins_from_set_expr(right, out);
            }
            SetExpr::Query(q) => Self::collect_joins_from_set_expr(&q.body, out),
            _ => {}
        }
    }
}

fn table_factor_name(factor: &TableFactor) -> String {
    match factor {
        TableFactor::Table { name, .. } => name.to_string(),
        TableFactor::Derived { alias, .. } => alias.as_ref().map(|a| a.name.value.clone()).unwrap_or_default(),
        _ => String::new(),
    }
}

fn join_ref(left: &str, right: &str, join: &Join) -> JoinRef {
    let (operator_name, has_on, columns) = match &join.join_operator {
        JoinOperator::Inner(constraint) => ("INNER".to_string(), has_on_constraint(constraint), equality_columns(constraint)),
        JoinOperator::LeftOuter(constraint) => ("LEFT".to_string(), has_on_constraint(constraint), equality_columns(constraint)),
        JoinOperator::RightOuter(constraint) => ("RIGHT".to_string(), has_on_constraint(constraint), equality_columns(constraint)),
        JoinOperator::FullOuter(constraint) => ("FULL".to_string(), has_on_constraint(constraint), equality_columns(constraint)),
        JoinOperator::CrossJoin => ("CROSS".to_string(), true, None),
        _ => ("OTHER".to_string(), false, None),
    };

    let (left_col, right_col) = match columns {
        Some((l, r)) => (Some(l), Some(r)),
        None => (None, None),
    };

    JoinRef {
        left_table: left.to_string(),
        right_table: right.to_string(),
        join_operator: operator_name,
        has_on_clause: has_on,
        left_col,
        right_col,
    }
}

fn has_on_constraint(constraint: &JoinConstraint) -> bool {
    matches!(constraint, JoinConstraint::On(_))
}

/// Extracts the `(left_column, right_column)` pair from an ON clause's equality comparison - this
/// is the single most safety-critical check the validator performs, since a join accepted here
/// without a real equality is a join the FK-edge check downstream can never refute.
fn equality_columns(constraint: &JoinConstraint) -> Option<(String, String)> {
    let JoinConstraint::On(expr) = constraint else { return None };
    extract_equality(expr)
}

fn extract_equality(expr: &Expr) -> Option<(String, String)> {
    match expr {
        Expr::BinaryOp { left, op: BinaryOperator::Eq, right } => {
            let l = column_name(left)?;
            let r = column_name(right)?;
            Some((l, r))
        }
        Expr::BinaryOp { left, op: BinaryOperator::And, right } => {
            extract_equality(left).or_else(|| extract_equality(right))
        }
        Expr::Nested(inner) => extract_equality(inner),
        _ => None,
    }
}

fn column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.clone()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.clone()),
        _ => None,
    }
}
