// Path and File Name : /root/crate/gateway/src/kb/schema_introspector.rs
// Details of functionality of this file: the Catalog Introspector (spec §4.1). Reads
// information_schema / pg_catalog over the metadata pool and builds a raw, unmerged KbSchema.

use std::collections::HashMap;

use deadpool_postgres::Object;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::error::GatewayResult;
use crate::kb::types::{
    ColumnMetadata, ForeignKeyMetadata, IndexMetadata, KbSchema, RawTableMetadata,
};

static CHECK_ARRAY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"ARRAY\[([^\]]+)\]").expect("static regex"));
static CHECK_QUOTED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'([^']+)'").expect("static regex"));
static CHECK_EQ_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\w+\s*=\s*'([^']+)'").expect("static regex"));

const DATE_KEYWORDS: &[&str] = &["date", "created_at", "updated_at", "_at", "_date", "timestamp"];
const STATUS_KEYWORDS: &[&str] = &["status", "state", "type", "stage", "phase"];
const STATUS_TEXT_TYPES: &[&str] = &["character varying", "varchar", "text", "char", "USER-DEFINED"];
const NATURAL_KEY_KEYWORDS: &[&str] = &["number", "code", "name", "email", "username"];

pub struct SchemaIntrospector;

impl SchemaIntrospector {
    pub async fn build_kb_schema(conn: &Object, schema_name: &str) -> GatewayResult<KbSchema> {
        let table_names = Self::extract_tables(conn, schema_name).await?;
        let mut tables = HashMap::new();

        for table in table_names {
            let columns = Self::extract_columns(conn, schema_name, &table).await?;
            let primary_keys = Self::extract_primary_keys(conn, schema_name, &table).await?;
            let foreign_keys = Self::extract_foreign_keys(conn, schema_name, &table).await?;
            let indexes = Self::extract_indexes(conn, schema_name, &table).await;
            let check_constraints = Self::extract_check_constraints(conn, schema_name, &table).await?;

            let columns = Self::merge_enum_types(conn, schema_name, &table, columns).await?;

            let date_columns = Self::identify_date_columns(&columns);
            let status_columns = Self::identify_status_columns(&columns);
            let natural_key_candidates = Self::identify_natural_key_candidates(&columns);
            let domain = Self::infer_domain(&table, &columns);

            tables.insert(
                table.clone(),
                RawTableMetadata {
                    schema: schema_name.to_string(),
                    table: table.clone(),
                    columns,
                    primary_keys,
                    foreign_keys,
                    indexes,
                    check_constraints,
                    domain,
                    date_columns,
                    status_columns,
                    natural_key_candidates,
                },
            );
        }

        Ok(KbSchema {
            schema_name: schema_name.to_string(),
            tables,
            generated_at: None,
        })
    }

    async fn extract_tables(conn: &Object, schema_name: &str) -> GatewayResult<Vec<String>> {
        let rows = conn
            .query(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_type = 'BASE TABLE' ORDER BY table_name",
                &[&schema_name],
            )
            .await?;
        Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
    }

    async fn extract_columns(
        conn: &Object,
        schema_name: &str,
        table: &str,
    ) -> GatewayResult<Vec<ColumnMetadata>> {
        let rows = conn
            .query(
                "SELECT column_name, data_type, is_nullable, column_default, \
                        character_maximum_length, numeric_precision, numeric_scale, ordinal_position \
                 FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = $2 ORDER BY ordinal_position",
                &[&schema_name, &table],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| ColumnMetadata {
                column_name: row.get(0),
                data_type: row.get(1),
                is_nullable: row.get::<_, String>(2) == "YES",
                column_default: row.get(3),
                character_maximum_length: row.get(4),
                numeric_precision: row.get(5),
                numeric_scale: row.get(6),
                ordinal_position: row.get(7),
                enum_values: None,
                check_constraint_values: None,
            })
            .collect())
    }

    async fn extract_primary_keys(
        conn: &Object,
        schema_name: &str,
        table: &str,
    ) -> GatewayResult<Vec<String>> {
        let rows = conn
            .query(
                "SELECT kcu.column_name \
                 FROM information_schema.table_constraints tc \
                 JOIN information_schema.key_column_usage kcu \
                   ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
                 WHERE tc.table_schema = $1 AND tc.table_name = $2 AND tc.constraint_type = 'PRIMARY KEY' \
                 ORDER BY kcu.ordinal_position",
                &[&schema_name, &table],
            )
            .await?;
        Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
    }

    async fn extract_foreign_keys(
        conn: &Object,
        schema_name: &str,
        table: &str,
    ) -> GatewayResult<Vec<ForeignKeyMetadata>> {
        let rows = conn
            .query(
                "SELECT tc.constraint_name, kcu.column_name, ccu.table_schema, ccu.table_name, ccu.column_name \
                 FROM information_schema.table_constraints tc \
                 JOIN information_schema.key_column_usage kcu \
                   ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
                 JOIN information_schema.constraint_column_usage ccu \
                   ON tc.constraint_name = ccu.constraint_name AND tc.table_schema = ccu.table_schema \
                 WHERE tc.table_schema = $1 AND tc.table_name = $2 AND tc.constraint_type = 'FOREIGN KEY'",
                &[&schema_name, &table],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| ForeignKeyMetadata {
                constraint_name: row.get(0),
                table_name: table.to_string(),
                column_name: row.get(1),
                referenced_schema: row.get(2),
                referenced_table_name: row.get(3),
                referenced_column_name: row.get(4),
            })
            .collect())
    }

    /// Index metadata is best-effort: a pg_catalog failure degrades to an empty list rather than
    /// aborting the whole introspection pass.
    async fn extract_indexes(conn: &Object, schema_name: &str, table: &str) -> Vec<IndexMetadata> {
        let result = conn
            .query(
                "SELECT i.relname AS index_name, ix.indisunique, ix.indisprimary, \
                        array_agg(a.attname ORDER BY a.attnum) AS columns \
                 FROM pg_class t \
                 JOIN pg_namespace n ON n.oid = t.relnamespace \
                 JOIN pg_index ix ON ix.indrelid = t.oid \
                 JOIN pg_class i ON i.oid = ix.indexrelid \
                 JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey) \
                 WHERE n.nspname = $1 AND t.relname = $2 \
                 GROUP BY i.relname, ix.indisunique, ix.indisprimary",
                &[&schema_name, &table],
            )
            .await;

        match result {
            Ok(rows) => rows
                .iter()
                .map(|row| IndexMetadata {
                    index_name: row.get(0),
                    table_name: table.to_string(),
                    is_unique: row.get(1),
                    is_primary: row.get(2),
                    columns: row.get(3),
                })
                .collect(),
            Err(e) => {
                warn!(table, error = %e, "index_introspection_degraded");
                Vec::new()
            }
        }
    }

    async fn extract_check_constraints(
        conn: &Object,
        schema_name: &str,
        table: &str,
    ) -> GatewayResult<Vec<serde_json::Value>> {
        let rows = conn
            .query(
                "SELECT cc.constraint_name, cc.check_clause \
                 FROM information_schema.check_constraints cc \
                 JOIN information_schema.table_constraints tc \
                   ON cc.constraint_name = tc.constraint_name AND cc.constraint_schema = tc.constraint_schema \
                 WHERE tc.table_schema = $1 AND tc.table_name = $2",
                &[&schema_name, &table],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let name: String = row.get(0);
                let clause: String = row.get(1);
                serde_json::json!({
                    "constraint_name": name,
                    "check_clause": clause,
                    "parsed_values": Self::parse_check_constraint_values(&clause),
                })
            })
            .collect())
    }

    fn parse_check_constraint_values(clause: &str) -> Vec<String> {
        if let Some(caps) = CHECK_ARRAY_RE.captures(clause) {
            return CHECK_QUOTED_RE
                .captures_iter(&caps[1])
                .map(|c| c[1].to_string())
                .collect();
        }
        CHECK_EQ_RE
            .captures_iter(clause)
            .map(|c| c[1].to_string())
            .collect()
    }

    async fn merge_enum_types(
        conn: &Object,
        schema_name: &str,
        table: &str,
        mut columns: Vec<ColumnMetadata>,
    ) -> GatewayResult<Vec<ColumnMetadata>> {
        let rows = conn
            .query(
                "SELECT c.column_name, e.enumlabel \
                 FROM information_schema.columns c \
                 JOIN pg_type t ON t.typname = c.udt_name \
                 JOIN pg_enum e ON e.enumtypid = t.oid \
                 WHERE c.table_schema = $1 AND c.table_name = $2 \
                 ORDER BY c.column_name, e.enumsortorder",
                &[&schema_name, &table],
            )
            .await?;

        let mut by_column: HashMap<String, Vec<String>> = HashMap::new();
        for row in &rows {
            let col: String = row.get(0);
            let label: String = row.get(1);
            by_column.entry(col).or_default().push(label);
        }

        for col in columns.iter_mut() {
            if let Some(values) = by_column.remove(&col.column_name) {
                col.enum_values = Some(values);
            }
        }
        Ok(columns)
    }

    fn identify_date_columns(columns: &[ColumnMetadata]) -> Vec<String> {
        columns
            .iter()
            .filter(|c| {
                let name = c.column_name.to_lowercase();
                let dtype = c.data_type.to_lowercase();
                dtype.contains("date") || dtype.contains("timestamp") || DATE_KEYWORDS.iter().any(|k| name.contains(k))
            })
            .map(|c| c.column_name.clone())
            .collect()
    }

    /// Heuristic (name + type): status-like columns are only reported when their type is
    /// text-ish, so a boolean `is_active` or a numeric `state_code` doesn't qualify.
    fn identify_status_columns(columns: &[ColumnMetadata]) -> Vec<String> {
        columns
            .iter()
            .filter(|c| {
                let name = c.column_name.to_lowercase();
                STATUS_KEYWORDS.iter().any(|k| name.contains(k))
                    && STATUS_TEXT_TYPES.iter().any(|t| c.data_type.contains(t))
            })
            .map(|c| c.column_name.clone())
            .collect()
    }

    /// Heuristic (name pattern, not FK): columns ending in `_id` are excluded since those are
    /// almost always foreign keys rather than natural business keys.
    fn identify_natural_key_candidates(columns: &[ColumnMetadata]) -> Vec<String> {
        columns
            .iter()
            .filter(|c| {
                let name = c.column_name.to_lowercase();
                NATURAL_KEY_KEYWORDS.iter().any(|k| name.contains(k)) && !name.ends_with("_id")
            })
            .map(|c| c.column_name.clone())
            .collect()
    }

    fn infer_domain(table: &str, columns: &[ColumnMetadata]) -> String {
        let joined: String = std::iter::once(table.to_lowercase())
            .chain(columns.iter().map(|c| c.column_name.to_lowercase()))
            .collect::<Vec<_>>()
            .join(" ");

        let microfinance = ["loan", "borrower", "repayment", "collection", "branch"];
        let ecommerce = ["order", "product", "cart", "customer", "sku"];
        let audit = ["audit", "log", "event", "trail"];

        if microfinance.iter().any(|k| joined.contains(k)) {
            "microfinance".to_string()
        } else if ecommerce.iter().any(|k| joined.contains(k)) {
            "ecommerce".to_string()
        } else if audit.iter().any(|k| joined.contains(k)) {
            "audit".to_string()
        } else {
            "general".to_string()
        }
    }
}
