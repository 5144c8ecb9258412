// Path and File Name : /root/crate/gateway/src/kb/rules_compiler.rs
// Details of functionality of this file: the Rules Compiler (spec §4.4). Merges raw schema,
// semantic annotations, and the join graph into one Compiled Rules artifact, validates it, and
// atomically publishes it to disk via write-to-temp-then-rename.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;

use crate::config::Settings;
use crate::error::{GatewayError, GatewayResult};
use crate::kb::join_graph::JoinGraphBuilder;
use crate::kb::semantic_store::SemanticStore;
use crate::kb::types::{CompiledRules, KbSchema, QueryPolicies, TableMetadata};

pub const COMPILED_RULES_VERSION: &str = "1";

pub struct RulesCompiler;

impl RulesCompiler {
    pub fn compile_rules(schema: &KbSchema, semantic: &SemanticStore, settings: &Settings) -> CompiledRules {
        let join_graph = JoinGraphBuilder::build_fk_graph(schema);
        let fk_edges = join_graph.get_fk_edges(schema);
        let join_paths = join_graph.compute_join_paths(settings.hard_cap_join_depth);

        let mut tables = HashMap::new();
        for (name, raw) in &schema.tables {
            let schema_qualified_name = format!("{}.{}", raw.schema, raw.table);
            tables.insert(
                name.clone(),
                TableMetadata {
                    schema: raw.schema.clone(),
                    table: raw.table.clone(),
                    schema_qualified_name,
                    columns: raw.columns.clone(),
                    primary_keys: raw.primary_keys.clone(),
                    foreign_keys: raw.foreign_keys.clone(),
                    indexes: raw.indexes.clone(),
                    check_constraints: raw.check_constraints.clone(),
                    domain: raw.domain.clone(),
                    date_columns: raw.date_columns.clone(),
                    status_columns: raw.status_columns.clone(),
                    natural_key_candidates: raw.natural_key_candidates.clone(),
                    semantic: semantic.get_table_semantic(name),
                },
            );
        }

        CompiledRules {
            version: COMPILED_RULES_VERSION.to_string(),
            schema_name: schema.schema_name.clone(),
            tables,
            join_graph: join_graph.to_dict(),
            join_paths,
            fk_edges,
            query_policies: QueryPolicies {
                default_limit: settings.default_limit,
                max_limit: settings.max_limit,
                max_join_depth: settings.max_join_depth,
                hard_cap_join_depth: settings.hard_cap_join_depth,
                deep_join_threshold: settings.deep_join_threshold,
                require_where_for_deep_joins: true,
                blocked_functions: crate::validation::blocked_patterns::blocked_functions(),
                blocked_patterns: crate::validation::blocked_patterns::blocked_keywords(),
                require_schema_qualification: false,
                allowed_schemas: vec![schema.schema_name.clone()],
                statement_timeout_seconds: settings.statement_timeout_seconds,
            },
            compiled_at: Utc::now().to_rfc3339(),
        }
    }

    /// Writes `kb_schema.json`, `kb_semantic.json`, and `compiled_rules.json` to `dir`, each via
    /// its own sibling `.tmp` file and rename, so a reader never observes a partial write of any
    /// one artifact. The three are written independently rather than as one combined rename
    /// because `kb_schema.json` and `kb_semantic.json` are also the inputs `KbScheduler` reloads
    /// from disk on a failed refresh - they must survive even if `compiled_rules.json` itself
    /// later fails validation before this call.
    pub async fn atomic_swap(
        dir: impl AsRef<Path>,
        schema: &KbSchema,
        semantic: &SemanticStore,
        rules: &CompiledRules,
    ) -> GatewayResult<()> {
        rules.validate().map_err(GatewayError::KbCompilation)?;

        let dir: PathBuf = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;

        let semantic_list: Vec<&crate::kb::types::SemanticEntry> = semantic.entries().values().collect();
        let semantic_wrapped = serde_json::json!({ "tables": semantic_list });

        Self::write_atomic(&dir, "kb_schema.json", schema).await?;
        Self::write_atomic(&dir, "kb_semantic.json", &semantic_wrapped).await?;
        Self::write_atomic(&dir, "compiled_rules.json", rules).await?;
        Ok(())
    }

    async fn write_atomic<T: serde::Serialize>(dir: &Path, file_name: &str, value: &T) -> GatewayResult<()> {
        let target = dir.join(file_name);
        let tmp = dir.join(format!("{file_name}.tmp"));
        fs::write(&tmp, serde_json::to_vec_pretty(value)?).await?;
        fs::rename(&tmp, &target).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::types::RawTableMetadata;

    fn settings() -> Settings {
        Settings {
            db_host: "localhost".to_string(),
            db_port: 5432,
            db_name: "test".to_string(),
            db_metadata_user: "postgres".to_string(),
            db_metadata_password: "x".to_string(),
            db_query_user: "postgres".to_string(),
            db_query_password: "x".to_string(),
            schema_name: "core".to_string(),
            llm_api_key: "key".to_string(),
            llm_model: "model".to_string(),
            llm_temperature: 0.0,
            llm_max_tokens: 2000,
            llm_timeout_seconds: 10,
            default_limit: 200,
            max_limit: 2000,
            statement_timeout_seconds: 30,
            max_join_depth: 4,
            hard_cap_join_depth: 6,
            deep_join_threshold: 5,
            kb_refresh_interval_hours: 1,
            api_host: "0.0.0.0".to_string(),
            api_port: 8000,
            log_level: "info".to_string(),
            rag_enabled: true,
            rag_max_tables: 8,
            rag_max_columns_per_table: 25,
            rag_max_join_paths: 30,
            metadata_cache_ttl_minutes: 15,
        }
    }

    fn minimal_schema() -> KbSchema {
        let mut tables = HashMap::new();
        tables.insert(
            "loans".to_string(),
            RawTableMetadata {
                schema: "core".to_string(),
                table: "loans".to_string(),
                columns: Vec::new(),
                primary_keys: vec!["id".to_string()],
                foreign_keys: Vec::new(),
                indexes: Vec::new(),
                check_constraints: Vec::new(),
                domain: "microfinance".to_string(),
                date_columns: Vec::new(),
                status_columns: Vec::new(),
                natural_key_candidates: Vec::new(),
            },
        );
        KbSchema { schema_name: "core".to_string(), tables, generated_at: None }
    }

    #[test]
    fn compiles_rules_with_populated_query_policies() {
        let schema = minimal_schema();
        let mut semantic = SemanticStore::new("/tmp/does-not-exist.json");
        semantic.merge_with_schema(&schema);
        let settings = settings();

        let rules = RulesCompiler::compile_rules(&schema, &semantic, &settings);
        assert_eq!(rules.schema_name, "core");
        assert_eq!(rules.query_policies.default_limit, 200);
        assert!(rules.tables.contains_key("loans"));
        assert!(rules.validate().is_ok());
    }

    #[tokio::test]
    async fn atomic_swap_writes_all_three_artifacts() {
        let schema = minimal_schema();
        let mut semantic = SemanticStore::new("/tmp/does-not-exist.json");
        semantic.merge_with_schema(&schema);
        let settings = settings();
        let rules = RulesCompiler::compile_rules(&schema, &semantic, &settings);

        let dir = std::env::temp_dir().join(format!("gateway-rules-test-{}", std::process::id()));
        RulesCompiler::atomic_swap(&dir, &schema, &semantic, &rules).await.unwrap();

        let rules_contents = tokio::fs::read_to_string(dir.join("compiled_rules.json")).await.unwrap();
        let round_tripped: CompiledRules = serde_json::from_str(&rules_contents).unwrap();
        assert_eq!(round_tripped.schema_name, "core");

        let schema_contents = tokio::fs::read_to_string(dir.join("kb_schema.json")).await.unwrap();
        let schema_round_tripped: KbSchema = serde_json::from_str(&schema_contents).unwrap();
        assert!(schema_round_tripped.tables.contains_key("loans"));

        let semantic_contents = tokio::fs::read_to_string(dir.join("kb_semantic.json")).await.unwrap();
        let semantic_value: serde_json::Value = serde_json::from_str(&semantic_contents).unwrap();
        assert!(semantic_value["tables"].is_array());

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
