// Path and File Name : /root/crate/gateway/src/validation/mod.rs
// Details of functionality of this file: the SQL Validator (spec §4.9). Runs the deny-list scan,
// parses the statement, and checks structural invariants (read-only, table existence, schema
// qualification, join legality, join depth, WHERE-for-deep-joins, LIMIT enforcement) before
// anything reaches the executor.

pub mod ast;
pub mod blocked_patterns;
pub mod join_validator;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::kb::types::CompiledRules;
use crate::validation::ast::ParsedStatement;
use crate::validation::join_validator::JoinValidator;

static LIMIT_CLAUSE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bLIMIT\s+(\d+)\b").expect("static regex"));

#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    /// The statement to execute - identical to the input unless LIMIT enforcement injected or
    /// capped a value.
    pub sql: String,
    pub violations: Vec<String>,
    pub warnings: Vec<String>,
    /// Human-readable rationale for why this statement is safe to run, empty when invalid.
    pub safety_explanation: String,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

pub struct SqlValidator;

impl SqlValidator {
    pub fn validate(sql: &str, rules: &CompiledRules) -> ValidationOutcome {
        let mut violations = Vec::new();
        let mut warnings = Vec::new();
        let mut final_sql = sql.to_string();
        let mut table_count = 0usize;
        let mut join_depth = 0u32;
        let has_where = sql.to_uppercase().contains("WHERE");

        let keyword_hits = blocked_patterns::check_blocked_keywords(sql);
        if !keyword_hits.is_empty() {
            violations.push(format!("statement contains blocked keyword(s): {}", keyword_hits.join(", ")));
        }

        let function_hits = blocked_patterns::check_blocked_functions(sql);
        if !function_hits.is_empty() {
            violations.push(format!("statement calls blocked function(s): {}", function_hits.join(", ")));
        }

        let join_type_hits = blocked_patterns::check_blocked_join_types(sql);
        if !join_type_hits.is_empty() {
            violations.push(format!("statement uses blocked join type(s): {}", join_type_hits.join(", ")));
        }

        if blocked_patterns::check_non_select_statement(sql) {
            violations.push("statement is not a read-only SELECT".to_string());
        }

        match ParsedStatement::parse(sql) {
            Ok(parsed) => {
                if !parsed.is_select() {
                    violations.push("parsed statement is not a query".to_string());
                }

                let cte_names = parsed.cte_names();
                let schema_name = rules
                    .query_policies
                    .allowed_schemas
                    .first()
                    .cloned()
                    .unwrap_or_else(|| rules.schema_name.clone());

                let tables = parsed.tables();
                let physical_tables: Vec<&String> = tables
                    .iter()
                    .filter(|t| !cte_names.contains(&bare_table_name(t).to_lowercase()))
                    .collect();
                table_count = physical_tables.len();

                for table in &physical_tables {
                    if let Some((table_schema, table_name_only)) = table.split_once('.') {
                        if table_schema != schema_name {
                            violations.push(format!(
                                "schema '{table_schema}' is not allowed; use only schema '{schema_name}'"
                            ));
                            continue;
                        }
                        if !rules.tables.contains_key(table_name_only) {
                            violations.push(format!(
                                "table '{table}' does not exist in schema '{schema_name}'"
                            ));
                        }
                    } else {
                        if !rules.tables.contains_key(table.as_str()) {
                            violations.push(format!(
                                "table '{schema_name}.{table}' does not exist in schema '{schema_name}'"
                            ));
                        }
                        if rules.query_policies.require_schema_qualification {
                            violations.push(format!(
                                "table '{table}' must be schema-qualified as '{schema_name}.{table}'"
                            ));
                        }
                    }
                }

                let joins = parsed.joins();
                let join_violations = JoinValidator::validate_join_on_clauses(&joins, rules);
                violations.extend(join_violations.into_iter().map(|v| v.reason));

                join_depth = JoinValidator::max_join_depth(&joins);
                if join_depth > rules.query_policies.hard_cap_join_depth {
                    violations.push(format!(
                        "join depth {join_depth} exceeds hard cap {}",
                        rules.query_policies.hard_cap_join_depth
                    ));
                } else if join_depth >= rules.query_policies.deep_join_threshold
                    && rules.query_policies.require_where_for_deep_joins
                    && !has_where
                {
                    violations.push(format!(
                        "join depth {join_depth} reaches the deep-join threshold and requires a WHERE clause"
                    ));
                }
            }
            Err(e) => {
                // Fail closed: an unparsable statement is never a safe statement to execute,
                // regardless of what the upstream keyword scan concluded.
                warn!(error = %e, "sql_parse_failed_rejecting_statement");
                violations.push(format!("statement failed to parse: {e}"));
            }
        }

        // LIMIT enforcement (spec §4.9 step 14): inject the default when absent, cap when the
        // requested value exceeds the policy maximum.
        if let Some(caps) = LIMIT_CLAUSE_RE.captures(sql) {
            let limit_value: i64 = caps[1].parse().unwrap_or(i64::MAX);
            if limit_value > rules.query_policies.max_limit {
                final_sql = LIMIT_CLAUSE_RE
                    .replace(sql, format!("LIMIT {}", rules.query_policies.max_limit).as_str())
                    .to_string();
                warnings.push(format!(
                    "LIMIT {limit_value} exceeds maximum {}; capped",
                    rules.query_policies.max_limit
                ));
            }
        } else {
            let trimmed = sql.trim_end().trim_end_matches(';');
            final_sql = format!("{trimmed}\nLIMIT {}", rules.query_policies.default_limit);
            warnings.push(format!(
                "no LIMIT specified; auto-injected LIMIT {}",
                rules.query_policies.default_limit
            ));
        }

        let is_valid = violations.is_empty();
        let safety_explanation = if is_valid {
            build_safety_explanation(table_count, join_depth, has_where)
        } else {
            String::new()
        };

        ValidationOutcome { sql: final_sql, violations, warnings, safety_explanation }
    }
}

fn bare_table_name(name: &str) -> String {
    name.rsplit('.').next().unwrap_or(name).to_string()
}

/// Human-readable explanation of why a passed statement is safe to run (spec §4.9 step 15).
fn build_safety_explanation(table_count: usize, join_depth: u32, has_where: bool) -> String {
    let mut lines = vec![
        "Query validated as SELECT-only (no data modification)".to_string(),
        "All tables exist in the allowed schema".to_string(),
        "No blocked functions or keywords detected".to_string(),
    ];

    if table_count > 1 {
        lines.push(format!("Join path validated against the foreign-key graph (depth: {join_depth})"));
    }
    if has_where {
        lines.push("WHERE clause present for result scoping".to_string());
    }
    lines.push("LIMIT enforced to prevent excessive results".to_string());
    lines.push("Will execute with a read-only role and statement timeout".to_string());

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::types::{ColumnMetadata, JoinGraphDict, QueryPolicies, SemanticEntry, TableMetadata};
    use std::collections::HashMap;

    fn table(name: &str) -> TableMetadata {
        TableMetadata {
            schema: "core".to_string(),
            table: name.to_string(),
            schema_qualified_name: format!("core.{name}"),
            columns: vec![ColumnMetadata {
                column_name: "id".to_string(),
                data_type: "uuid".to_string(),
                is_nullable: false,
                column_default: None,
                character_maximum_length: None,
                numeric_precision: None,
                numeric_scale: None,
                ordinal_position: 1,
                enum_values: None,
                check_constraint_values: None,
            }],
            primary_keys: vec!["id".to_string()],
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
            check_constraints: Vec::new(),
            domain: "microfinance".to_string(),
            date_columns: Vec::new(),
            status_columns: Vec::new(),
            natural_key_candidates: Vec::new(),
            semantic: SemanticEntry { table_name: name.to_string(), ..Default::default() },
        }
    }

    fn rules() -> CompiledRules {
        let mut tables = HashMap::new();
        tables.insert("loans".to_string(), table("loans"));
        CompiledRules {
            version: "1".to_string(),
            schema_name: "core".to_string(),
            tables,
            join_graph: JoinGraphDict { nodes: Vec::new(), edges: Vec::new() },
            join_paths: HashMap::new(),
            fk_edges: Vec::new(),
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

    #[test]
    fn accepts_plain_select() {
        let outcome = SqlValidator::validate("SELECT id FROM loans LIMIT 10", &rules());
        assert!(outcome.is_valid());
        assert!(!outcome.safety_explanation.is_empty());
    }

    #[test]
    fn rejects_update_statement() {
        let outcome = SqlValidator::validate("UPDATE loans SET status = 'x'", &rules());
        assert!(!outcome.is_valid());
        assert!(outcome.safety_explanation.is_empty());
    }

    #[test]
    fn rejects_cross_join() {
        let outcome = SqlValidator::validate("SELECT * FROM a CROSS JOIN b", &rules());
        assert!(!outcome.is_valid());
    }

    #[test]
    fn rejects_unparsable_statement() {
        let outcome = SqlValidator::validate("SELECT FROM FROM FROM", &rules());
        assert!(!outcome.is_valid());
    }

    #[test]
    fn rejects_unknown_table() {
        let outcome = SqlValidator::validate("SELECT id FROM widgets LIMIT 10", &rules());
        assert!(!outcome.is_valid());
        assert!(outcome.violations.iter().any(|v| v.contains("widgets")));
    }

    #[test]
    fn rejects_disallowed_schema_qualifier() {
        let outcome = SqlValidator::validate("SELECT id FROM other.loans LIMIT 10", &rules());
        assert!(!outcome.is_valid());
        assert!(outcome.violations.iter().any(|v| v.contains("not allowed")));
    }

    #[test]
    fn accepts_correctly_schema_qualified_table() {
        let outcome = SqlValidator::validate("SELECT id FROM core.loans LIMIT 10", &rules());
        assert!(outcome.is_valid());
    }

    #[test]
    fn requires_schema_qualification_when_policy_demands_it() {
        let mut r = rules();
        r.query_policies.require_schema_qualification = true;
        let outcome = SqlValidator::validate("SELECT id FROM loans LIMIT 10", &r);
        assert!(!outcome.is_valid());
        assert!(outcome.violations.iter().any(|v| v.contains("schema-qualified")));
    }

    #[test]
    fn injects_default_limit_when_absent() {
        let outcome = SqlValidator::validate("SELECT id FROM loans", &rules());
        assert!(outcome.sql.contains("LIMIT 200"));
        assert!(outcome.warnings.iter().any(|w| w.contains("auto-injected")));
    }

    #[test]
    fn caps_limit_exceeding_policy_maximum() {
        let outcome = SqlValidator::validate("SELECT id FROM loans LIMIT 99999", &rules());
        assert!(outcome.sql.contains("LIMIT 2000"));
        assert!(outcome.warnings.iter().any(|w| w.contains("exceeds maximum")));
    }

    #[test]
    fn leaves_compliant_limit_untouched() {
        let outcome = SqlValidator::validate("SELECT id FROM loans LIMIT 50", &rules());
        assert_eq!(outcome.sql, "SELECT id FROM loans LIMIT 50");
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn ctes_are_excluded_from_table_existence_checks() {
        let outcome = SqlValidator::validate(
            "WITH recent AS (SELECT id FROM loans) SELECT * FROM recent LIMIT 10",
            &rules(),
        );
        assert!(outcome.is_valid());
    }
}
