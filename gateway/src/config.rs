// Path and File Name : /root/crate/gateway/src/config.rs
// Details of functionality of this file: environment-driven configuration, constructed once at
// startup and passed by reference into request scope. Required variables fail closed; optional
// ones fall back to the defaults the original Python settings module used.

use std::env;

use crate::error::{GatewayError, GatewayResult};

#[derive(Debug, Clone)]
pub struct Settings {
    pub db_host: String,
    pub db_port: u16,
    pub db_name: String,
    pub db_metadata_user: String,
    pub db_metadata_password: String,
    pub db_query_user: String,
    pub db_query_password: String,
    pub schema_name: String,

    pub llm_api_key: String,
    pub llm_model: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    pub llm_timeout_seconds: u64,

    pub default_limit: i64,
    pub max_limit: i64,
    pub statement_timeout_seconds: u64,
    pub max_join_depth: u32,
    pub hard_cap_join_depth: u32,
    pub deep_join_threshold: u32,

    pub kb_refresh_interval_hours: u64,

    pub api_host: String,
    pub api_port: u16,

    pub log_level: String,

    pub rag_enabled: bool,
    pub rag_max_tables: usize,
    pub rag_max_columns_per_table: usize,
    pub rag_max_join_paths: usize,

    pub metadata_cache_ttl_minutes: i64,
}

fn required(key: &str) -> GatewayResult<String> {
    env::var(key).map_err(|_| {
        GatewayError::EnvironmentValidation(format!("required environment variable {key} is not set"))
    })
}

fn optional(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn optional_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Settings {
    /// Build settings from the process environment. Fails closed: missing credentials or an
    /// unparsable required value aborts startup rather than silently defaulting.
    pub fn from_env() -> GatewayResult<Self> {
        let db_user = optional("DB_USER", "postgres");
        let db_password = required("DB_PASSWORD")?;

        Ok(Self {
            db_host: optional("DB_HOST", "localhost"),
            db_port: optional_parsed("DB_PORT", 5432),
            db_name: optional("DB_NAME", "nl_sql_gateway"),
            db_metadata_user: optional("DB_METADATA_USER", &db_user),
            db_metadata_password: optional("DB_METADATA_PASSWORD", &db_password),
            db_query_user: optional("DB_QUERY_USER", &db_user),
            db_query_password: optional("DB_QUERY_PASSWORD", &db_password),
            schema_name: optional("SCHEMA_NAME", "core"),

            llm_api_key: required("LLM_API_KEY")?,
            llm_model: optional("LLM_MODEL", "meta-llama/llama-3-70b-8192"),
            llm_temperature: optional_parsed("LLM_TEMPERATURE", 0.0),
            llm_max_tokens: optional_parsed("LLM_MAX_TOKENS", 2000),
            llm_timeout_seconds: optional_parsed("LLM_TIMEOUT_SECONDS", 10),

            default_limit: optional_parsed("DEFAULT_LIMIT", 200),
            max_limit: optional_parsed("MAX_LIMIT", 2000),
            statement_timeout_seconds: optional_parsed("STATEMENT_TIMEOUT_SECONDS", 30),
            max_join_depth: optional_parsed("MAX_JOIN_DEPTH", 4),
            hard_cap_join_depth: optional_parsed("HARD_CAP_JOIN_DEPTH", 6),
            deep_join_threshold: optional_parsed("DEEP_JOIN_THRESHOLD", 5),

            kb_refresh_interval_hours: optional_parsed("KB_REFRESH_INTERVAL_HOURS", 1),

            api_host: optional("API_HOST", "0.0.0.0"),
            api_port: optional_parsed("API_PORT", 8000),

            log_level: optional("LOG_LEVEL", "info"),

            rag_enabled: optional_parsed("RAG_ENABLED", true),
            rag_max_tables: optional_parsed("RAG_MAX_TABLES", 8),
            rag_max_columns_per_table: optional_parsed("RAG_MAX_COLUMNS_PER_TABLE", 25),
            rag_max_join_paths: optional_parsed("RAG_MAX_JOIN_PATHS", 30),

            metadata_cache_ttl_minutes: optional_parsed("METADATA_CACHE_TTL_MINUTES", 15),
        })
    }
}
