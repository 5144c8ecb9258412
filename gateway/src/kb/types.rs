// Path and File Name : /root/crate/gateway/src/kb/types.rs
// Details of functionality of this file: the data model shared by every KB-pipeline stage and by
// the Validator/Retriever/Executor that consume Compiled Rules (spec §3).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub column_name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub column_default: Option<String>,
    pub character_maximum_length: Option<i32>,
    pub numeric_precision: Option<i32>,
    pub numeric_scale: Option<i32>,
    pub ordinal_position: i32,
    pub enum_values: Option<Vec<String>>,
    pub check_constraint_values: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKeyMetadata {
    pub constraint_name: String,
    pub table_name: String,
    pub column_name: String,
    pub referenced_schema: String,
    pub referenced_table_name: String,
    pub referenced_column_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub index_name: String,
    pub table_name: String,
    pub columns: Vec<String>,
    pub is_unique: bool,
    pub is_primary: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SemanticEntry {
    pub table_name: String,
    pub purpose: String,
    pub aliases: Vec<String>,
    pub pii_columns: Vec<String>,
    pub default_filters: Vec<serde_json::Value>,
    pub recommended_dimensions: Vec<String>,
    pub recommended_metrics: Vec<String>,
    pub join_policies: JoinPolicy,
    pub business_rules: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JoinPolicy {
    pub max_depth: u32,
    pub blocked_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMetadata {
    pub schema: String,
    pub table: String,
    pub schema_qualified_name: String,
    pub columns: Vec<ColumnMetadata>,
    pub primary_keys: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyMetadata>,
    pub indexes: Vec<IndexMetadata>,
    pub check_constraints: Vec<serde_json::Value>,
    pub domain: String,
    pub date_columns: Vec<String>,
    pub status_columns: Vec<String>,
    pub natural_key_candidates: Vec<String>,
    pub semantic: SemanticEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinGraphEdge {
    pub from: String,
    pub to: String,
    pub from_column: String,
    pub to_column: String,
    pub constraint_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinGraphDict {
    pub nodes: Vec<String>,
    pub edges: Vec<JoinGraphEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinPathHop {
    pub from: String,
    pub to: String,
    pub column: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinPath {
    pub from_table: String,
    pub to_table: String,
    pub path: Vec<String>,
    pub edges: Vec<JoinPathHop>,
    pub depth: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FkEdge {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    pub constraint_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPolicies {
    pub default_limit: i64,
    pub max_limit: i64,
    pub max_join_depth: u32,
    pub hard_cap_join_depth: u32,
    pub deep_join_threshold: u32,
    pub require_where_for_deep_joins: bool,
    pub blocked_functions: Vec<String>,
    pub blocked_patterns: Vec<String>,
    pub require_schema_qualification: bool,
    pub allowed_schemas: Vec<String>,
    pub statement_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledRules {
    pub version: String,
    pub schema_name: String,
    pub tables: HashMap<String, TableMetadata>,
    pub join_graph: JoinGraphDict,
    pub join_paths: HashMap<String, JoinPath>,
    pub fk_edges: Vec<FkEdge>,
    pub query_policies: QueryPolicies,
    pub compiled_at: String,
}

impl CompiledRules {
    /// Validation gate before publication (spec §4.4): every invariant here must hold or the
    /// candidate artifact is rejected and the previous one keeps serving.
    pub fn validate(&self) -> Result<(), String> {
        if self.tables.is_empty() {
            return Err("compiled rules has no tables".to_string());
        }
        for edge in &self.fk_edges {
            if !self.tables.contains_key(&edge.from_table) {
                return Err(format!("fk_edges references unknown from_table {}", edge.from_table));
            }
            if !self.tables.contains_key(&edge.to_table) {
                return Err(format!("fk_edges references unknown to_table {}", edge.to_table));
            }
        }
        for path in self.join_paths.values() {
            if !self.tables.contains_key(&path.from_table) {
                return Err(format!("join_paths references unknown table {}", path.from_table));
            }
            if !self.tables.contains_key(&path.to_table) {
                return Err(format!("join_paths references unknown table {}", path.to_table));
            }
        }
        Ok(())
    }
}

/// A fresh, unmerged schema snapshot - the Catalog Introspector's output, before semantic merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbSchema {
    pub schema_name: String,
    pub tables: HashMap<String, RawTableMetadata>,
    pub generated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTableMetadata {
    pub schema: String,
    pub table: String,
    pub columns: Vec<ColumnMetadata>,
    pub primary_keys: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyMetadata>,
    pub indexes: Vec<IndexMetadata>,
    pub check_constraints: Vec<serde_json::Value>,
    pub domain: String,
    pub date_columns: Vec<String>,
    pub status_columns: Vec<String>,
    pub natural_key_candidates: Vec<String>,
}
