// Path and File Name : /root/crate/gateway/src/kb/scheduler.rs
// Details of functionality of this file: the KB Scheduler (spec §4.5). Owns the published Compiled
// Rules snapshot behind a parking_lot RwLock and drives the periodic refresh state machine, mirroring
// the orchestrator's state-machine pattern elsewhere in this workspace.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::db::DbPools;
use crate::error::{GatewayError, GatewayResult};
use crate::kb::rules_compiler::RulesCompiler;
use crate::kb::schema_introspector::SchemaIntrospector;
use crate::kb::semantic_store::SemanticStore;
use crate::kb::types::{CompiledRules, KbSchema};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KbState {
    Idle,
    Refreshing,
    Ready,
    DegradedLastKnownGood,
    FailedNoFallback,
}

pub struct KbScheduler {
    state: RwLock<KbState>,
    current: RwLock<Option<Arc<CompiledRules>>>,
    semantic_path: PathBuf,
    rules_dir: PathBuf,
}

impl KbScheduler {
    pub fn new(rules_dir: PathBuf) -> Self {
        Self {
            state: RwLock::new(KbState::Idle),
            current: RwLock::new(None),
            semantic_path: rules_dir.join("semantic.json"),
            rules_dir,
        }
    }

    pub fn state(&self) -> KbState {
        *self.state.read()
    }

    pub fn snapshot(&self) -> Option<Arc<CompiledRules>> {
        self.current.read().clone()
    }

    /// Runs one compile-and-publish cycle. On success, republishes and moves to Ready. On failure,
    /// keeps the prior in-memory snapshot serving if there is one; otherwise tries to reload the
    /// last artifact this process (or a predecessor) published to disk before giving up.
    pub async fn refresh_once(&self, pools: &DbPools, settings: &Settings) -> GatewayResult<()> {
        *self.state.write() = KbState::Refreshing;

        match self.compile_candidate(pools, settings).await {
            Ok((schema, semantic, rules)) => {
                if let Err(e) = RulesCompiler::atomic_swap(&self.rules_dir, &schema, &semantic, &rules).await {
                    warn!(error = %e, "kb_publish_failed_keeping_prior_snapshot");
                    self.degrade_or_fail().await;
                    return Err(e);
                }
                *self.current.write() = Some(Arc::new(rules));
                *self.state.write() = KbState::Ready;
                info!("kb_refresh_succeeded");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "kb_refresh_failed");
                self.degrade_or_fail().await;
                Err(e)
            }
        }
    }

    /// Falls back to the in-memory snapshot if one is already held; otherwise tries to reload the
    /// last artifact published to disk, so a process restart right after a bad refresh doesn't
    /// strand the gateway with nothing to serve (spec §4.5).
    async fn degrade_or_fail(&self) {
        if self.current.read().is_some() {
            *self.state.write() = KbState::DegradedLastKnownGood;
            return;
        }

        match self.load_last_known_good_from_disk().await {
            Some(rules) => {
                info!("using_last_known_good");
                *self.current.write() = Some(Arc::new(rules));
                *self.state.write() = KbState::DegradedLastKnownGood;
            }
            None => {
                *self.state.write() = KbState::FailedNoFallback;
            }
        }
    }

    async fn load_last_known_good_from_disk(&self) -> Option<CompiledRules> {
        let path = self.rules_dir.join("compiled_rules.json");
        let raw = tokio::fs::read_to_string(&path).await.ok()?;
        let rules: CompiledRules = serde_json::from_str(&raw).ok()?;
        rules.validate().ok()?;
        Some(rules)
    }

    async fn compile_candidate(
        &self,
        pools: &DbPools,
        settings: &Settings,
    ) -> GatewayResult<(KbSchema, SemanticStore, CompiledRules)> {
        let conn = pools.acquire_metadata_connection().await?;
        let schema = SchemaIntrospector::build_kb_schema(&conn, &settings.schema_name).await?;

        let mut semantic = SemanticStore::new(&self.semantic_path);
        semantic.load().await?;
        semantic.merge_with_schema(&schema);
        semantic.save().await?;

        let rules = RulesCompiler::compile_rules(&schema, &semantic, settings);
        rules.validate().map_err(GatewayError::KbCompilation)?;
        Ok((schema, semantic, rules))
    }

    /// Spawns the periodic refresh loop on the current tokio runtime. Callers are expected to have
    /// already run one `refresh_once` synchronously at startup (see `Application::bootstrap`), so
    /// this loop sleeps first and only then refreshes on the configured interval.
    pub fn spawn_periodic(self: Arc<Self>, pools: Arc<DbPools>, settings: Arc<Settings>) {
        let interval = Duration::from_secs(settings.kb_refresh_interval_hours.max(1) * 3600);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if let Err(e) = self.refresh_once(&pools, &settings).await {
                    error!(error = %e, "scheduled_kb_refresh_failed");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle_with_no_snapshot() {
        let scheduler = KbScheduler::new(PathBuf::from("/tmp/gateway-kb-test"));
        assert_eq!(scheduler.state(), KbState::Idle);
        assert!(scheduler.snapshot().is_none());
    }

    #[tokio::test]
    async fn degrades_to_failed_when_no_prior_snapshot_and_nothing_on_disk() {
        let scheduler = KbScheduler::new(PathBuf::from("/tmp/gateway-kb-test-nonexistent"));
        scheduler.degrade_or_fail().await;
        assert_eq!(scheduler.state(), KbState::FailedNoFallback);
    }

    #[tokio::test]
    async fn falls_back_to_disk_artifact_when_no_in_memory_snapshot_exists() {
        use crate::kb::rules_compiler::RulesCompiler;
        use crate::kb::semantic_store::SemanticStore;
        use crate::kb::types::RawTableMetadata;
        use std::collections::HashMap;

        let dir = std::env::temp_dir().join(format!("gateway-scheduler-test-{}", std::process::id()));
        let mut tables = HashMap::new();
        tables.insert(
            "loans".to_string(),
            RawTableMetadata {
                schema: "core".to_string(), table: "loans".to_string(), columns: Vec::new(),
                primary_keys: vec!["id".to_string()], foreign_keys: Vec::new(), indexes: Vec::new(),
                check_constraints: Vec::new(), domain: "microfinance".to_string(),
                date_columns: Vec::new(), status_columns: Vec::new(), natural_key_candidates: Vec::new(),
            },
        );
        let schema = KbSchema { schema_name: "core".to_string(), tables, generated_at: None };
        let mut semantic = SemanticStore::new(dir.join("kb_semantic.json"));
        semantic.merge_with_schema(&schema);
        let settings = Settings {
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
        };
        let rules = RulesCompiler::compile_rules(&schema, &semantic, &settings);
        RulesCompiler::atomic_swap(&dir, &schema, &semantic, &rules).await.unwrap();

        let scheduler = KbScheduler::new(dir.clone());
        scheduler.degrade_or_fail().await;
        assert_eq!(scheduler.state(), KbState::DegradedLastKnownGood);
        assert!(scheduler.snapshot().is_some());

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
