// Path and File Name : /root/crate/gateway/src/app.rs
// Details of functionality of this file: the top-level Application struct. Wires every subsystem
// together at startup: config, database pools, KB scheduler (with its first synchronous refresh),
// metadata cache, session store, LLM client, and metrics.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;

use crate::audit::AuditLog;
use crate::cache::MetadataCache;
use crate::config::Settings;
use crate::db::DbPools;
use crate::error::{GatewayError, GatewayResult};
use crate::generation::llm::{HttpLlmClient, LlmClient};
use crate::kb::{KbScheduler, KbState};
use crate::metrics::MetricsCollector;
use crate::session::SessionStore;

pub struct Application {
    pub settings: Settings,
    pub db: DbPools,
    pub kb_scheduler: Arc<KbScheduler>,
    pub cache: MetadataCache,
    pub sessions: SessionStore,
    pub llm: Box<dyn LlmClient>,
    pub metrics: MetricsCollector,
    pub audit: AuditLog,
}

impl Application {
    /// Builds every subsystem and runs the first KB compilation synchronously, so the process
    /// either starts serving with a ready knowledge base or fails closed before accepting traffic.
    pub async fn bootstrap(settings: Settings, rules_dir: PathBuf) -> GatewayResult<Arc<Self>> {
        let db = DbPools::connect(&settings).await?;
        let kb_scheduler = Arc::new(KbScheduler::new(rules_dir));

        if let Err(e) = kb_scheduler.refresh_once(&db, &settings).await {
            warn!(error = %e, "initial_kb_refresh_failed_checking_for_last_known_good");
        }

        // Neither a fresh compile nor a prior on-disk artifact succeeded - there is nothing safe
        // to serve, so the process must fail closed before it starts accepting traffic (spec §4.5).
        if kb_scheduler.state() == KbState::FailedNoFallback {
            return Err(GatewayError::KbCompilation(
                "initial knowledge base compilation failed and no last-known-good artifact was available".to_string(),
            ));
        }

        let cache = MetadataCache::new(settings.metadata_cache_ttl_minutes);
        let sessions = SessionStore::new();
        let llm: Box<dyn LlmClient> = Box::new(HttpLlmClient::new(settings.clone())?);
        let metrics = MetricsCollector::new();
        let audit = AuditLog::new();

        let app = Arc::new(Self {
            settings,
            db,
            kb_scheduler,
            cache,
            sessions,
            llm,
            metrics,
            audit,
        });

        let pools_for_scheduler = Arc::new(app.db_handle());
        app.kb_scheduler.clone().spawn_periodic(pools_for_scheduler, Arc::new(app.settings.clone()));

        Ok(app)
    }

    /// `spawn_periodic` wants an owned `Arc<DbPools>`, but `DbPools` lives inside `Application`
    /// without its own Arc. Pool handles (`deadpool_postgres::Pool`) are themselves cheap to clone,
    /// so the scheduler gets its own lightweight `DbPools` wrapping cloned pool handles.
    fn db_handle(&self) -> DbPools {
        DbPools {
            metadata: self.db.metadata.clone(),
            query: self.db.query.clone(),
        }
    }
}
