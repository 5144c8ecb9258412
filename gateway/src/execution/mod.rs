// Path and File Name : /root/crate/gateway/src/execution/mod.rs
// Details of functionality of this file: the Safe Executor (spec §4.10). Runs a validated SELECT
// inside an explicit read-only transaction with a per-statement timeout, converts rows to JSON, and
// sanitizes any error before it leaves the process.

use std::time::Instant;

use serde_json::Value;
use tokio_postgres::types::Type;
use tracing::error;

use crate::config::Settings;
use crate::db::DbPools;
use crate::error::{GatewayError, GatewayResult};

#[derive(Debug, Clone, serde::Serialize)]
pub struct QueryExecutionResult {
    pub rows: Vec<serde_json::Map<String, Value>>,
    pub row_count: usize,
    pub execution_time_ms: f64,
}

pub struct SafeExecutor;

impl SafeExecutor {
    pub async fn execute_query(
        pools: &DbPools,
        settings: &Settings,
        sql: &str,
    ) -> GatewayResult<QueryExecutionResult> {
        let started = Instant::now();
        let mut conn = pools.acquire_query_connection(settings).await?;
        let transaction = conn
            .build_transaction()
            .read_only(true)
            .start()
            .await
            .map_err(|e| GatewayError::Execution(sanitize_error(&e.to_string())))?;

        transaction
            .batch_execute(&format!(
                "SET LOCAL statement_timeout = '{}ms'",
                settings.statement_timeout_seconds * 1000
            ))
            .await
            .map_err(|e| GatewayError::Execution(sanitize_error(&e.to_string())))?;

        let query_result = transaction.query(sql, &[]).await;

        let rows = match query_result {
            Ok(rows) => rows,
            Err(e) => {
                let _ = transaction.rollback().await;
                error!(error = %e, "query_execution_failed");
                return Err(GatewayError::Execution(sanitize_error(&e.to_string())));
            }
        };

        transaction
            .commit()
            .await
            .map_err(|e| GatewayError::Execution(sanitize_error(&e.to_string())))?;

        let converted: Vec<serde_json::Map<String, Value>> = rows.iter().map(row_to_json_map).collect();
        let execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        Ok(QueryExecutionResult {
            row_count: converted.len(),
            rows: converted,
            execution_time_ms,
        })
    }
}

fn row_to_json_map(row: &tokio_postgres::Row) -> serde_json::Map<String, Value> {
    let mut map = serde_json::Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value = column_value_to_json(row, i, column.type_());
        map.insert(column.name().to_string(), value);
    }
    map
}

fn column_value_to_json(row: &tokio_postgres::Row, idx: usize, ty: &Type) -> Value {
    match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx).ok().flatten().map(Value::from).unwrap_or(Value::Null),
        Type::INT2 => row.try_get::<_, Option<i16>>(idx).ok().flatten().map(Value::from).unwrap_or(Value::Null),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx).ok().flatten().map(Value::from).unwrap_or(Value::Null),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx).ok().flatten().map(Value::from).unwrap_or(Value::Null),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx).ok().flatten().map(|v| v as f64).and_then(serde_json::Number::from_f64).map(Value::Number).unwrap_or(Value::Null),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx).ok().flatten().and_then(serde_json::Number::from_f64).map(Value::Number).unwrap_or(Value::Null),
        Type::UUID => row.try_get::<_, Option<uuid::Uuid>>(idx).ok().flatten().map(|v| Value::String(v.to_string())).unwrap_or(Value::Null),
        Type::TIMESTAMP | Type::TIMESTAMPTZ => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null),
        Type::JSON | Type::JSONB => row.try_get::<_, Option<Value>>(idx).ok().flatten().unwrap_or(Value::Null),
        _ => row.try_get::<_, Option<String>>(idx).ok().flatten().map(Value::String).unwrap_or(Value::Null),
    }
}

/// Maps a raw driver error to a generic, non-leaking message - we never surface internal hostnames,
/// table names from constraint errors, or driver stack detail to the caller.
fn sanitize_error(raw: &str) -> String {
    let lower = raw.to_lowercase();
    if lower.contains("timeout") {
        "Query execution time limit exceeded. Try narrowing the date range or adding more filters.".to_string()
    } else if lower.contains("connection") {
        "Database connection error. Please try again shortly.".to_string()
    } else if lower.contains("syntax") {
        "SQL syntax error in generated query.".to_string()
    } else {
        "Query execution failed.".to_string()
    }
}
