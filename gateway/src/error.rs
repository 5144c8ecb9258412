// Path and File Name : /root/crate/gateway/src/error.rs
// Details of functionality of this file: top-level error type for the gateway, covering startup,
// KB compilation, validation, and execution failures. Mirrors the categorized-error-enum pattern
// used throughout the orchestrator crate this workspace was built from.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("environment validation failed: {0}")]
    EnvironmentValidation(String),

    #[error("database connection failed: {0}")]
    DatabaseConnection(String),

    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] tokio_postgres::Error),

    #[error("pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("knowledge base not ready: {0}")]
    KbNotReady(String),

    #[error("knowledge base compilation failed: {0}")]
    KbCompilation(String),

    #[error("sql generation failed: {0}")]
    Generation(String),

    #[error("sql validation rejected the statement")]
    ValidationRejected(Vec<String>),

    #[error("query execution failed: {0}")]
    Execution(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type GatewayResult<T> = Result<T, GatewayError>;
