// Path and File Name : /root/crate/gateway/src/db/mod.rs
// Details of functionality of this file: two disjoint connection pools (metadata, query), matching
// the read-only "two-role" database manager the original system used. Pools are owned by a single
// DbPools value constructed at startup and closed on shutdown.

use deadpool_postgres::{Config as PoolConfig, Pool, Runtime};
use tokio_postgres::NoTls;
use tracing::info;

use crate::config::Settings;
use crate::error::{GatewayError, GatewayResult};

#[derive(Clone)]
pub struct DbPools {
    pub metadata: Pool,
    pub query: Pool,
}

fn build_pool(
    settings: &Settings,
    user: &str,
    password: &str,
    max_size: usize,
) -> GatewayResult<Pool> {
    let mut cfg = PoolConfig::new();
    cfg.host = Some(settings.db_host.clone());
    cfg.port = Some(settings.db_port);
    cfg.dbname = Some(settings.db_name.clone());
    cfg.user = Some(user.to_string());
    cfg.password = Some(password.to_string());
    cfg.pool = Some(deadpool_postgres::PoolConfig::new(max_size));

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| GatewayError::DatabaseConnection(e.to_string()))
}

impl DbPools {
    /// Initializes both pools. Metadata pool is sized 2-5 (we size by max only, deadpool has no
    /// min-size concept distinct from lazy connection), query pool 5-20, per spec §5.
    pub async fn connect(settings: &Settings) -> GatewayResult<Self> {
        let metadata = build_pool(settings, &settings.db_metadata_user, &settings.db_metadata_password, 5)?;
        let query = build_pool(settings, &settings.db_query_user, &settings.db_query_password, 20)?;

        // Sanity probe both pools before declaring success - fail closed.
        {
            let conn = metadata.get().await.map_err(|e| GatewayError::DatabaseConnection(e.to_string()))?;
            conn.query_one("SELECT 1", &[]).await?;
        }
        {
            let conn = query.get().await.map_err(|e| GatewayError::DatabaseConnection(e.to_string()))?;
            conn.query_one("SELECT 1", &[]).await?;
        }

        info!("db_pools_initialized", metadata_max = 5, query_max = 20);
        Ok(Self { metadata, query })
    }

    /// Acquire a query-pool connection with the read-only session defaults applied. The Safe
    /// Executor layers its own per-transaction `SET LOCAL statement_timeout` on top of this.
    pub async fn acquire_query_connection(
        &self,
        settings: &Settings,
    ) -> GatewayResult<deadpool_postgres::Object> {
        let conn = self.query.get().await?;
        conn.batch_execute(&format!(
            "SET default_transaction_read_only = on; \
             SET statement_timeout = '{}s'; \
             SET idle_in_transaction_session_timeout = '60s';",
            settings.statement_timeout_seconds
        ))
        .await?;
        Ok(conn)
    }

    pub async fn acquire_metadata_connection(&self) -> GatewayResult<deadpool_postgres::Object> {
        Ok(self.metadata.get().await?)
    }

    pub fn health(&self) -> PoolHealth {
        PoolHealth {
            metadata_size: self.metadata.status().size,
            metadata_available: self.metadata.status().available,
            query_size: self.query.status().size,
            query_available: self.query.status().available,
        }
    }
}

pub struct PoolHealth {
    pub metadata_size: usize,
    pub metadata_available: isize,
    pub query_size: usize,
    pub query_available: isize,
}
