// Path and File Name : /root/crate/gateway/src/kb/semantic_store.rs
// Details of functionality of this file: the Semantic Store (spec §4.2). Holds the
// human-curated annotations layered over raw schema, and merges new tables discovered by the
// Catalog Introspector without disturbing entries a human already enriched.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::GatewayResult;
use crate::kb::types::{JoinPolicy, KbSchema, SemanticEntry};

pub struct SemanticStore {
    path: PathBuf,
    entries: HashMap<String, SemanticEntry>,
}

impl SemanticStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            entries: HashMap::new(),
        }
    }

    /// Loads the on-disk store, tolerating either a bare array or a `{"tables": [...]}` wrapper.
    /// A missing file is not an error - it means no human annotations exist yet.
    pub async fn load(&mut self) -> GatewayResult<()> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let value: serde_json::Value = serde_json::from_str(&raw)?;
        let list = match value {
            serde_json::Value::Array(items) => items,
            serde_json::Value::Object(mut map) => map
                .remove("tables")
                .and_then(|v| v.as_array().cloned())
                .unwrap_or_default(),
            _ => Vec::new(),
        };

        self.entries.clear();
        for item in list {
            let entry: SemanticEntry = serde_json::from_value(item)?;
            self.entries.insert(entry.table_name.clone(), entry);
        }
        Ok(())
    }

    pub async fn save(&self) -> GatewayResult<()> {
        let list: Vec<&SemanticEntry> = self.entries.values().collect();
        let wrapped = serde_json::json!({ "tables": list });
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&wrapped)?).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// For every table the raw schema found but the store has no entry for yet, synthesize a
    /// default entry and append it - entries a human already curated are preserved verbatim.
    pub fn merge_with_schema(&mut self, schema: &KbSchema) {
        for (name, table) in &schema.tables {
            if self.entries.contains_key(name) {
                continue;
            }
            let columns: Vec<String> = table.columns.iter().map(|c| c.column_name.clone()).collect();
            self.entries.insert(name.clone(), default_semantic_entry(name, &columns));
        }
    }

    pub fn get_table_semantic(&self, table: &str) -> SemanticEntry {
        self.entries.get(table).cloned().unwrap_or_else(|| {
            default_semantic_entry(table, &[])
        })
    }

    pub fn entries(&self) -> &HashMap<String, SemanticEntry> {
        &self.entries
    }

    pub fn get_all_aliases(&self) -> HashMap<String, Vec<String>> {
        self.entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.aliases.clone()))
            .collect()
    }

    pub fn get_pii_columns(&self, table: &str) -> Vec<String> {
        self.entries.get(table).map(|e| e.pii_columns.clone()).unwrap_or_default()
    }
}

/// Builds a plausible default alias set for a table name: plural/singular variants and an
/// underscore-to-space rendering, matching the heuristics a human annotator would start from.
fn default_semantic_entry(table_name: &str, _columns: &[String]) -> SemanticEntry {
    let mut aliases = Vec::new();
    let spaced = table_name.replace('_', " ");
    if spaced != table_name {
        aliases.push(spaced);
    }

    if let Some(singular) = singularize(table_name) {
        if singular != table_name {
            aliases.push(singular);
        }
    } else if let Some(plural) = pluralize(table_name) {
        if plural != table_name {
            aliases.push(plural);
        }
    }

    aliases.sort();
    aliases.dedup();

    SemanticEntry {
        table_name: table_name.to_string(),
        purpose: "unknown, needs enrichment".to_string(),
        aliases,
        pii_columns: Vec::new(),
        default_filters: Vec::new(),
        recommended_dimensions: Vec::new(),
        recommended_metrics: Vec::new(),
        join_policies: JoinPolicy { max_depth: 4, blocked_paths: Vec::new() },
        business_rules: Vec::new(),
    }
}

fn singularize(word: &str) -> Option<String> {
    if let Some(stem) = word.strip_suffix("ies") {
        return Some(format!("{stem}y"));
    }
    if let Some(stem) = word.strip_suffix('s') {
        if !word.ends_with("ss") {
            return Some(stem.to_string());
        }
    }
    None
}

fn pluralize(word: &str) -> Option<String> {
    if word.ends_with('y') && !word.ends_with("ay") && !word.ends_with("ey") {
        return Some(format!("{}ies", &word[..word.len() - 1]));
    }
    Some(format!("{word}s"))
}
