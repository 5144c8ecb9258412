// Path and File Name : /root/crate/gateway/src/retrieval/mod.rs
// Details of functionality of this file: the KB Retriever (spec §4.7). Scores every table against
// the tokenized question and prior context, keeps the top-N tables and their top-N columns, and
// falls back to a minimal, un-ranked context if anything about retrieval fails - generation should
// never hard-fail because RAG did.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::config::Settings;
use crate::kb::types::{CompiledRules, JoinPath, TableMetadata};
use crate::session::IntentSummary;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w+\b").expect("static regex"));

const TABLE_NAME_WEIGHT: f64 = 10.0;
const ALIAS_WEIGHT: f64 = 8.0;
const COLUMN_WEIGHT: f64 = 3.0;
const CONTEXT_HINT_WEIGHT: f64 = 15.0;
const PARTIAL_INTENT_WEIGHT: f64 = 12.0;
const METRIC_OVERLAP_WEIGHT: f64 = 5.0;

pub fn tokenize_text(text: &str) -> HashSet<String> {
    let normalized = text.to_lowercase().replace(['_', '-'], " ");
    TOKEN_RE.find_iter(&normalized).map(|m| m.as_str().to_string()).collect()
}

#[derive(Debug, Clone)]
pub struct RetrievedContext {
    pub selected_tables: HashMap<String, TableMetadata>,
    pub join_paths: HashMap<String, JoinPath>,
    pub rag_enabled: bool,
    pub fallback: bool,
}

pub struct KbRetriever;

impl KbRetriever {
    pub fn retrieve(
        question: &str,
        clarification_answer: Option<&str>,
        context_hint_tables: &[String],
        partial_intent: Option<&IntentSummary>,
        rules: &CompiledRules,
        settings: &Settings,
    ) -> RetrievedContext {
        if !settings.rag_enabled {
            return Self::minimal_fallback(rules, settings, false);
        }

        match Self::try_retrieve(question, clarification_answer, context_hint_tables, partial_intent, rules, settings) {
            Ok(context) => context,
            Err(e) => {
                warn!(error = %e, "rag_retrieval_failed_using_fallback");
                Self::minimal_fallback(rules, settings, true)
            }
        }
    }

    fn try_retrieve(
        question: &str,
        clarification_answer: Option<&str>,
        context_hint_tables: &[String],
        partial_intent: Option<&IntentSummary>,
        rules: &CompiledRules,
        settings: &Settings,
    ) -> Result<RetrievedContext, String> {
        let mut combined = question.to_string();
        if let Some(answer) = clarification_answer {
            combined.push(' ');
            combined.push_str(answer);
        }
        let tokens = tokenize_text(&combined);

        let mut scored: Vec<(String, f64)> = rules
            .tables
            .iter()
            .map(|(name, table)| {
                (name.clone(), Self::score_table(table, &tokens, context_hint_tables, partial_intent))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let top_names: Vec<String> = scored
            .into_iter()
            .take(settings.rag_max_tables)
            .map(|(name, _)| name)
            .collect();
        let top_set: HashSet<String> = top_names.iter().cloned().collect();

        let mut selected_tables = HashMap::new();
        for name in &top_names {
            let table = rules.tables.get(name).ok_or_else(|| format!("missing table {name}"))?;
            let mut reduced = table.clone();
            reduced.columns = Self::select_top_columns(table, &tokens, settings.rag_max_columns_per_table);
            selected_tables.insert(name.clone(), reduced);
        }

        let join_paths = Self::filter_join_paths(&rules.join_paths, &top_set, settings.rag_max_join_paths);

        Ok(RetrievedContext { selected_tables, join_paths, rag_enabled: true, fallback: false })
    }

    fn score_table(
        table: &TableMetadata,
        tokens: &HashSet<String>,
        context_hint_tables: &[String],
        partial_intent: Option<&IntentSummary>,
    ) -> f64 {
        let mut score = 0.0;

        let name_tokens = tokenize_text(&table.table);
        score += name_tokens.intersection(tokens).count() as f64 * TABLE_NAME_WEIGHT;

        for alias in &table.semantic.aliases {
            let alias_tokens = tokenize_text(alias);
            let overlap_count = alias_tokens.intersection(tokens).count();
            score += overlap_count as f64 * ALIAS_WEIGHT;
        }

        let matched_columns = table
            .columns
            .iter()
            .filter(|c| tokens.contains(&c.column_name.to_lowercase()))
            .count();
        score += matched_columns as f64 * COLUMN_WEIGHT;

        if context_hint_tables.iter().any(|t| t == &table.table) {
            score += CONTEXT_HINT_WEIGHT;
        }

        if let Some(intent) = partial_intent {
            if intent.tables.iter().any(|t| t == &table.table) {
                score += PARTIAL_INTENT_WEIGHT;
            }

            if let Some(metric) = &intent.metric {
                let metric_tokens = tokenize_text(metric);
                if !metric_tokens.is_disjoint(&name_tokens) {
                    score += METRIC_OVERLAP_WEIGHT;
                }
            }
        }

        score
    }

    /// Primary keys and foreign keys are always included; the remaining budget is filled by
    /// token-overlap descending.
    fn select_top_columns(
        table: &TableMetadata,
        tokens: &HashSet<String>,
        max_columns: usize,
    ) -> Vec<crate::kb::types::ColumnMetadata> {
        let fk_names: HashSet<&str> = table.foreign_keys.iter().map(|f| f.column_name.as_str()).collect();
        let mut mandatory = Vec::new();
        let mut rest = Vec::new();

        for col in &table.columns {
            if table.primary_keys.contains(&col.column_name) || fk_names.contains(col.column_name.as_str()) {
                mandatory.push(col.clone());
            } else {
                rest.push(col.clone());
            }
        }

        rest.sort_by_key(|c| {
            let overlap = if tokens.contains(&c.column_name.to_lowercase()) { 1 } else { 0 };
            std::cmp::Reverse(overlap)
        });

        let remaining_budget = max_columns.saturating_sub(mandatory.len());
        mandatory.extend(rest.into_iter().take(remaining_budget));
        mandatory
    }

    fn filter_join_paths(
        paths: &HashMap<String, JoinPath>,
        selected: &HashSet<String>,
        max_paths: usize,
    ) -> HashMap<String, JoinPath> {
        paths
            .iter()
            .filter(|(_, path)| selected.contains(&path.from_table) && selected.contains(&path.to_table))
            .take(max_paths)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Bounded, deterministic fallback used when RAG is disabled or retrieval errors: at most 5
    /// tables, 10 columns each, fk edges preserved so the validator can still check join legality.
    fn minimal_fallback(rules: &CompiledRules, _settings: &Settings, fallback: bool) -> RetrievedContext {
        let mut selected_tables = HashMap::new();
        for (name, table) in rules.tables.iter().take(5) {
            let mut reduced = table.clone();
            reduced.columns.truncate(10);
            selected_tables.insert(name.clone(), reduced);
        }
        let selected_set: HashSet<String> = selected_tables.keys().cloned().collect();
        let join_paths = Self::filter_join_paths(&rules.join_paths, &selected_set, 30);

        RetrievedContext { selected_tables, join_paths, rag_enabled: false, fallback }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::types::{ColumnMetadata, JoinGraphDict, QueryPolicies, SemanticEntry};

    fn sample_table(name: &str, aliases: Vec<&str>) -> TableMetadata {
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
            semantic: SemanticEntry {
                table_name: name.to_string(),
                aliases: aliases.into_iter().map(String::from).collect(),
                ..Default::default()
            },
        }
    }

    fn sample_rules() -> CompiledRules {
        let mut tables = HashMap::new();
        tables.insert("loans".to_string(), sample_table("loans", vec!["loan"]));
        tables.insert("branches".to_string(), sample_table("branches", vec!["branch"]));
        CompiledRules {
            version: "1".to_string(),
            schema_name: "core".to_string(),
            tables,
            join_graph: JoinGraphDict { nodes: Vec::new(), edges: Vec::new() },
            join_paths: HashMap::new(),
            fk_edges: Vec::new(),
            query_policies: QueryPolicies {
                default_limit: 200,
                max_limit: 2000,
                max_join_depth: 4,
                hard_cap_join_depth: 6,
                deep_join_threshold: 5,
                require_where_for_deep_joins: true,
                blocked_functions: Vec::new(),
                blocked_patterns: Vec::new(),
                require_schema_qualification: false,
                allowed_schemas: vec!["core".to_string()],
                statement_timeout_seconds: 30,
            },
            compiled_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    fn settings() -> Settings {
        Settings {
            db_host: "localhost".to_string(), db_port: 5432, db_name: "t".to_string(),
            db_metadata_user: "p".to_string(), db_metadata_password: "p".to_string(),
            db_query_user: "p".to_string(), db_query_password: "p".to_string(),
            schema_name: "core".to_string(), llm_api_key: "k".to_string(),
            llm_model: "m".to_string(), llm_temperature: 0.0, llm_max_tokens: 2000,
            llm_timeout_seconds: 10, default_limit: 200, max_limit: 2000,
            statement_timeout_seconds: 30, max_join_depth: 4, hard_cap_join_depth: 6,
            deep_join_threshold: 5, kb_refresh_interval_hours: 1, api_host: "0.0.0.0".to_string(),
            api_port: 8000, log_level: "info".to_string(), rag_enabled: true,
            rag_max_tables: 8, rag_max_columns_per_table: 25, rag_max_join_paths: 30,
            metadata_cache_ttl_minutes: 15,
        }
    }

    #[test]
    fn scores_table_name_match_above_unrelated_table() {
        let rules = sample_rules();
        let settings = settings();
        let result = KbRetriever::retrieve("show me all loans", None, &[], None, &rules, &settings);
        assert!(result.selected_tables.contains_key("loans"));
    }

    #[test]
    fn disabled_rag_returns_bounded_fallback() {
        let rules = sample_rules();
        let mut settings = settings();
        settings.rag_enabled = false;
        let result = KbRetriever::retrieve("loans", None, &[], None, &rules, &settings);
        assert!(!result.rag_enabled);
        assert!(result.selected_tables.len() <= 5);
    }

    #[test]
    fn context_hint_table_gets_priority() {
        let table = sample_table("branches", vec!["branch"]);
        let tokens = tokenize_text("something unrelated entirely");
        let score_with_hint = KbRetriever::score_table(&table, &tokens, &["branches".to_string()], None);
        let score_without_hint = KbRetriever::score_table(&table, &tokens, &[], None);
        assert!(score_with_hint > score_without_hint);
    }

    #[test]
    fn alias_overlap_scales_with_matched_token_count() {
        let table = sample_table("loans", vec!["loan portfolio"]);
        let one_token = tokenize_text("loan");
        let two_tokens = tokenize_text("loan portfolio");
        let score_one = KbRetriever::score_table(&table, &one_token, &[], None);
        let score_two = KbRetriever::score_table(&table, &two_tokens, &[], None);
        assert!(score_two > score_one);
    }

    #[test]
    fn partial_intent_table_gets_priority() {
        let table = sample_table("branches", vec!["branch"]);
        let tokens = tokenize_text("something unrelated entirely");
        let intent = IntentSummary { tables: vec!["branches".to_string()], ..Default::default() };
        let score_with_intent = KbRetriever::score_table(&table, &tokens, &[], Some(&intent));
        let score_without_intent = KbRetriever::score_table(&table, &tokens, &[], None);
        assert!(score_with_intent > score_without_intent);
    }

    #[test]
    fn metric_overlap_with_partial_intent_boosts_score() {
        let table = sample_table("loans", vec!["loan"]);
        let tokens = tokenize_text("something unrelated entirely");
        let intent = IntentSummary { metric: Some("loans".to_string()), ..Default::default() };
        let score_with_metric = KbRetriever::score_table(&table, &tokens, &[], Some(&intent));
        let score_without_metric = KbRetriever::score_table(&table, &tokens, &[], None);
        assert!(score_with_metric > score_without_metric);
    }
}
