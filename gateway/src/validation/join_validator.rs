// Path and File Name : /root/crate/gateway/src/validation/join_validator.rs
// Details of functionality of this file: validates that every join in a candidate statement is
// backed by a known foreign-key path and carries an explicit ON clause. Unlike the system this was
// ported from - which fails open (allows the query through) if the path-lookup itself throws - this
// fails closed: any internal error during validation is treated as a rejection.

use crate::kb::types::{CompiledRules, FkEdge};
use crate::validation::ast::JoinRef;

#[derive(Debug, Clone)]
pub struct JoinViolation {
    pub reason: String,
}

pub struct JoinValidator;

impl JoinValidator {
    /// Every join must (a) have an explicit ON clause, (b) connect two tables for which a
    /// precomputed join path exists in compiled rules, and (c) have its ON-clause equality columns
    /// backed by a real foreign key in `rules.fk_edges`. (c) is the single most safety-critical
    /// invariant here: table-level reachability alone would accept `loans.id = borrowers.id`
    /// between two unrelated tables that merely share a column name.
    pub fn validate_join_on_clauses(joins: &[JoinRef], rules: &CompiledRules) -> Vec<JoinViolation> {
        let mut violations = Vec::new();

        for join in joins {
            if !join.has_on_clause {
                violations.push(JoinViolation {
                    reason: format!(
                        "join between {} and {} has no ON clause",
                        join.left_table, join.right_table
                    ),
                });
                continue;
            }

            let left_bare = bare_table_name(&join.left_table);
            let right_bare = bare_table_name(&join.right_table);

            let connected = rules.join_paths.contains_key(&format!("{left_bare}->{right_bare}"))
                || rules.join_paths.contains_key(&format!("{right_bare}->{left_bare}"))
                || left_bare == right_bare;

            if !connected {
                violations.push(JoinViolation {
                    reason: format!(
                        "no known foreign-key path connects {left_bare} and {right_bare}"
                    ),
                });
                continue;
            }

            if left_bare == right_bare {
                continue;
            }

            match (&join.left_col, &join.right_col) {
                (Some(left_col), Some(right_col)) => {
                    if !Self::fk_edge_matches(rules, &left_bare, left_col, &right_bare, right_col) {
                        violations.push(JoinViolation {
                            reason: format!(
                                "join condition {left_bare}.{left_col} = {right_bare}.{right_col} is not backed by a known foreign key"
                            ),
                        });
                    }
                }
                _ => {
                    violations.push(JoinViolation {
                        reason: format!(
                            "join between {left_bare} and {right_bare} has no recognizable column equality to verify against known foreign keys"
                        ),
                    });
                }
            }
        }

        violations
    }

    fn fk_edge_matches(
        rules: &CompiledRules,
        left_table: &str,
        left_col: &str,
        right_table: &str,
        right_col: &str,
    ) -> bool {
        rules.fk_edges.iter().any(|edge| {
            (edge.from_table == left_table
                && edge.from_column == left_col
                && edge.to_table == right_table
                && edge.to_column == right_col)
                || (edge.from_table == right_table
                    && edge.from_column == right_col
                    && edge.to_table == left_table
                    && edge.to_column == left_col)
        })
    }

    pub fn max_join_depth(joins: &[JoinRef]) -> u32 {
        let mut tables = std::collections::HashSet::new();
        for join in joins {
            tables.insert(bare_table_name(&join.left_table));
            tables.insert(bare_table_name(&join.right_table));
        }
        tables.len().saturating_sub(1) as u32
    }
}

fn bare_table_name(name: &str) -> String {
    name.rsplit('.').next().unwrap_or(name).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::types::{JoinGraphDict, JoinPath, QueryPolicies};
    use std::collections::HashMap;

    fn rules_with_path(from: &str, to: &str) -> CompiledRules {
        let mut join_paths = HashMap::new();
        join_paths.insert(
            format!("{from}->{to}"),
            JoinPath { from_table: from.to_string(), to_table: to.to_string(), path: vec![from.to_string(), to.to_string()], edges: Vec::new(), depth: 1 },
        );
        CompiledRules {
            version: "1".to_string(),
            schema_name: "core".to_string(),
            tables: HashMap::new(),
            join_graph: JoinGraphDict { nodes: Vec::new(), edges: Vec::new() },
            join_paths,
            fk_edges: vec![
                FkEdge {
                    from_table: to.to_string(),
                    from_column: "id".to_string(),
                    to_table: from.to_string(),
                    to_column: format!("{}_id", singular(to)),
                    constraint_name: format!("fk_{from}_{to}"),
                },
                FkEdge {
                    from_table: from.to_string(),
                    from_column: format!("{}_id", singular(to)),
                    to_table: to.to_string(),
                    to_column: "id".to_string(),
                    constraint_name: format!("fk_{from}_{to}_rev"),
                },
            ],
            query_policies: QueryPolicies {
                default_limit: 200, max_limit: 2000, max_join_depth: 4, hard_cap_join_depth: 6,
                deep_join_threshold: 5, require_where_for_deep_joins: true,
                blocked_functions: Vec::new(), blocked_patterns: Vec::new(),
                require_schema_qualification: false, allowed_schemas: vec!["core".to_string()],
                statement_timeout_seconds: 30,
            },
            compiled_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    fn singular(table: &str) -> String {
        table.strip_suffix('s').unwrap_or(table).to_string()
    }

    fn join_ref(left: &str, right: &str, op: &str, has_on: bool, left_col: Option<&str>, right_col: Option<&str>) -> JoinRef {
        JoinRef {
            left_table: left.to_string(),
            right_table: right.to_string(),
            join_operator: op.to_string(),
            has_on_clause: has_on,
            left_col: left_col.map(String::from),
            right_col: right_col.map(String::from),
        }
    }

    #[test]
    fn rejects_join_without_on_clause() {
        let rules = rules_with_path("loans", "borrowers");
        let joins = vec![join_ref("loans", "borrowers", "CROSS", false, None, None)];
        let violations = JoinValidator::validate_join_on_clauses(&joins, &rules);
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn accepts_join_with_known_path_and_fk_backed_columns() {
        let rules = rules_with_path("loans", "borrowers");
        let joins = vec![join_ref("loans", "borrowers", "INNER", true, Some("borrower_id"), Some("id"))];
        let violations = JoinValidator::validate_join_on_clauses(&joins, &rules);
        assert!(violations.is_empty());
    }

    #[test]
    fn rejects_join_with_no_known_path() {
        let rules = rules_with_path("loans", "borrowers");
        let joins = vec![join_ref("loans", "widgets", "INNER", true, Some("widget_id"), Some("id"))];
        let violations = JoinValidator::validate_join_on_clauses(&joins, &rules);
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn rejects_join_on_path_connected_tables_whose_columns_are_not_a_real_fk() {
        let rules = rules_with_path("loans", "borrowers");
        let joins = vec![join_ref("loans", "borrowers", "INNER", true, Some("id"), Some("id"))];
        let violations = JoinValidator::validate_join_on_clauses(&joins, &rules);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].reason.contains("not backed by a known foreign key"));
    }

    #[test]
    fn rejects_join_with_no_recognizable_equality() {
        let rules = rules_with_path("loans", "borrowers");
        let joins = vec![join_ref("loans", "borrowers", "INNER", true, None, None)];
        let violations = JoinValidator::validate_join_on_clauses(&joins, &rules);
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn computes_join_depth_as_unique_tables_minus_one() {
        let joins = vec![
            join_ref("a", "b", "INNER", true, Some("b_id"), Some("id")),
            join_ref("b", "c", "INNER", true, Some("c_id"), Some("id")),
        ];
        assert_eq!(JoinValidator::max_join_depth(&joins), 2);
    }
}
