// Path and File Name : /root/crate/gateway/src/http/mod.rs
// Details of functionality of this file: the axum HTTP surface - /query, /clarify, /health,
// /kb-status, /metrics. Every handler takes a shared Application state and returns typed JSON.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::app::Application;
use crate::context::{ContextResolver, ResolvedContext};
use crate::execution::SafeExecutor;
use crate::generation::{GenerationOutcome, SqlGenerator};
use crate::session::{IntentSummary, Turn};
use crate::validation::SqlValidator;

pub fn router(app: Arc<Application>) -> Router {
    Router::new()
        .route("/query", post(handle_query))
        .route("/clarify", post(handle_clarify))
        .route("/health", get(handle_health))
        .route("/kb-status", get(handle_kb_status))
        .route("/metrics", get(handle_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app)
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub session_id: String,
    pub question: String,
}

#[derive(Debug, Deserialize)]
pub struct ClarifyRequest {
    pub session_id: String,
    pub question: String,
    pub clarification_answer: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum QueryResponse {
    #[serde(rename = "result")]
    Result {
        sql: String,
        confidence: f64,
        tables_used: Vec<String>,
        intent_summary: IntentSummary,
        rows: Vec<serde_json::Map<String, serde_json::Value>>,
        row_count: usize,
        execution_time_ms: f64,
        warnings: Vec<String>,
        safety_explanation: String,
    },
    #[serde(rename = "clarification")]
    Clarification { question: String },
    #[serde(rename = "rejected")]
    Rejected { reasons: Vec<String> },
    #[serde(rename = "refused")]
    Refused { refusal_message: String },
}

async fn handle_query(
    State(app): State<Arc<Application>>,
    Json(request): Json<QueryRequest>,
) -> impl IntoResponse {
    let session = app.sessions.get_or_create(&request.session_id);
    let resolved = ContextResolver::resolve(&request.question, &session, None);
    respond_to_turn(&app, &request.session_id, &request.question, None, resolved).await
}

async fn handle_clarify(
    State(app): State<Arc<Application>>,
    Json(request): Json<ClarifyRequest>,
) -> impl IntoResponse {
    let session = app.sessions.get_or_create(&request.session_id);
    let resolved = ContextResolver::resolve(&request.question, &session, Some(request.clarification_answer.clone()));
    respond_to_turn(&app, &request.session_id, &request.question, Some(request.clarification_answer), resolved).await
}

async fn respond_to_turn(
    app: &Arc<Application>,
    session_id: &str,
    question: &str,
    clarification_answer: Option<String>,
    resolved: ResolvedContext,
) -> axum::response::Response {
    let Some(rules) = app.kb_scheduler.snapshot() else {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({
            "error": "knowledge base is not ready yet",
        }))).into_response();
    };

    let generation_started = Instant::now();
    let generation = SqlGenerator::generate_sql(question, &resolved, &rules, &app.settings, app.llm.as_ref()).await;
    let generation_elapsed_ms = generation_started.elapsed().as_secs_f64() * 1000.0;

    let generation = match generation {
        Ok(outcome) => {
            app.metrics.record_llm_request(true, generation_elapsed_ms);
            outcome
        }
        Err(e) => {
            app.metrics.record_llm_request(false, generation_elapsed_ms);
            error!(error = %e, "sql_generation_failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({
                "error": "sql generation failed",
            }))).into_response();
        }
    };

    match generation {
        GenerationOutcome::ClarificationNeeded(clarification) => {
            app.metrics.record_clarification();
            app.sessions.record_turn(session_id, Turn {
                question: question.to_string(),
                sql: None,
                tables_used: Vec::new(),
                intent_summary: None,
                clarification_answer: clarification_answer.clone(),
                partial_intent: Some(clarification.partial_intent.clone()),
            });
            Json(QueryResponse::Clarification { question: clarification.question }).into_response()
        }
        GenerationOutcome::Refused(refusal_message) => {
            Json(QueryResponse::Refused { refusal_message }).into_response()
        }
        GenerationOutcome::Generated(generated) => {
            let validation = SqlValidator::validate(&generated.sql, &rules);
            if !validation.is_valid() {
                for reason in &validation.violations {
                    app.metrics.record_validation_failure(reason);
                }
                return Json(QueryResponse::Rejected { reasons: validation.violations }).into_response();
            }

            let started = Instant::now();
            let execution = SafeExecutor::execute_query(&app.db, &app.settings, &validation.sql).await;
            let elapsed = started.elapsed().as_secs_f64() * 1000.0;

            match execution {
                Ok(result) => {
                    app.metrics.record_query(true, elapsed);
                    app.audit.record(session_id, &validation.sql, result.row_count);
                    app.sessions.record_turn(session_id, Turn {
                        question: question.to_string(),
                        sql: Some(validation.sql.clone()),
                        tables_used: generated.tables_used.clone(),
                        intent_summary: Some(generated.intent_summary.clone()),
                        clarification_answer,
                        partial_intent: None,
                    });
                    Json(QueryResponse::Result {
                        sql: validation.sql,
                        confidence: generated.confidence,
                        tables_used: generated.tables_used,
                        intent_summary: generated.intent_summary,
                        rows: result.rows,
                        row_count: result.row_count,
                        execution_time_ms: result.execution_time_ms,
                        warnings: validation.warnings,
                        safety_explanation: validation.safety_explanation,
                    })
                    .into_response()
                }
                Err(e) => {
                    app.metrics.record_query(false, elapsed);
                    error!(error = %e, "query_execution_failed");
                    (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({ "error": e.to_string() }))).into_response()
                }
            }
        }
    }
}

async fn handle_health(State(app): State<Arc<Application>>) -> impl IntoResponse {
    let pool_health = app.db.health();
    Json(serde_json::json!({
        "status": "ok",
        "kb_state": format!("{:?}", app.kb_scheduler.state()),
        "metadata_pool_size": pool_health.metadata_size,
        "metadata_pool_available": pool_health.metadata_available,
        "query_pool_size": pool_health.query_size,
        "query_pool_available": pool_health.query_available,
    }))
}

async fn handle_kb_status(State(app): State<Arc<Application>>) -> impl IntoResponse {
    let state = app.kb_scheduler.state();
    let snapshot = app.kb_scheduler.snapshot();
    Json(serde_json::json!({
        "state": format!("{:?}", state),
        "version": snapshot.as_ref().map(|r| r.version.clone()),
        "compiled_at": snapshot.as_ref().map(|r| r.compiled_at.clone()),
        "table_count": snapshot.as_ref().map(|r| r.tables.len()),
    }))
}

async fn handle_metrics(State(app): State<Arc<Application>>) -> impl IntoResponse {
    info!("metrics_requested");
    Json(app.metrics.to_snapshot())
}
