// Path and File Name : /root/crate/gateway/src/generation/mod.rs
// Details of functionality of this file: the SQL Generator Orchestrator (spec §4.8). Runs the
// refusal gate, the deterministic refinement shortcut, the clarification check, RAG retrieval, and
// finally the LLM call, in that priority order - the same order the system this was grounded on uses
// so that cheap, certain answers never wait on a network round trip.

pub mod llm;
pub mod prompt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::Settings;
use crate::context::{ContinuationType, RefinementInstruction, ResolvedContext};
use crate::generation::llm::LlmClient;
use crate::kb::types::CompiledRules;
use crate::retrieval::KbRetriever;
use crate::session::IntentSummary;

static MODIFICATION_KEYWORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(delete|remove|drop|update|insert|add row|create table|alter|truncate|grant|revoke)\b")
        .expect("static regex")
});
static LIMIT_IN_SQL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bLIMIT\s+\d+\b").expect("static regex"));
static ORDER_BY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bORDER\s+BY\s+[^;]*?(?=\bLIMIT\b|$)").expect("static regex"));

const VAGUE_PHRASES: &[&str] =
    &["show me data", "show data", "show details", "show info", "give me data", "tell me data"];
const TOP_BRANCH_METRIC_KEYWORDS: &[&str] =
    &["collections", "repayments", "outstanding", "principal", "number of loans", "loan count"];
const BARE_LIST_QUESTIONS: &[&str] =
    &["show loans", "list loans", "show borrowers", "list borrowers", "show branches", "list branches"];
const KNOWN_TABLE_HINTS: &[&str] = &[
    "borrowers", "loans", "branches", "collections", "repayments", "loan_documents",
    "loan_status_history", "field_officers",
];

#[derive(Debug, Clone)]
pub enum GenerationOutcome {
    Generated(GeneratedSql),
    ClarificationNeeded(ClarificationRequest),
    /// A write-intent request, distinct from a clarification: no ambiguity was involved, the
    /// request is simply out of scope for a read-only system.
    Refused(String),
}

#[derive(Debug, Clone)]
pub struct GeneratedSql {
    pub sql: String,
    pub confidence: f64,
    pub tables_used: Vec<String>,
    pub intent_summary: IntentSummary,
}

#[derive(Debug, Clone)]
pub struct ClarificationRequest {
    pub question: String,
    pub partial_intent: serde_json::Value,
}

pub struct SqlGenerator;

impl SqlGenerator {
    pub async fn generate_sql(
        question: &str,
        resolved: &ResolvedContext,
        rules: &CompiledRules,
        settings: &Settings,
        llm: &dyn LlmClient,
    ) -> crate::error::GatewayResult<GenerationOutcome> {
        // Step 0: refuse any request that smells like a write, regardless of phrasing. This is a
        // refusal, not a clarification - there is nothing ambiguous about it.
        if MODIFICATION_KEYWORD_RE.is_match(question) {
            return Ok(GenerationOutcome::Refused(
                "This system is read-only and cannot modify data. Please rephrase your question as a data retrieval request.".to_string(),
            ));
        }

        // Step 0.5: deterministic refinement - rewrite the prior statement without touching the LLM.
        // Only LIMIT and ORDER BY are cheap enough to rewrite by regex; the remaining refinement
        // families (metric/filter/time-window change) still need the LLM to re-derive the SQL, so
        // they fall through to retrieval below.
        if resolved.is_related() {
            if let (Some(instruction), Some(prior_sql)) = (&resolved.refinement_instruction, &resolved.prior_sql) {
                let rewritten = match instruction {
                    RefinementInstruction::LimitChange(n) => Some(rewrite_limit(prior_sql, *n)),
                    RefinementInstruction::OrderChange { column, direction } if !column.is_empty() => {
                        Some(rewrite_order(prior_sql, column, direction))
                    }
                    _ => None,
                };
                if let Some(sql) = rewritten {
                    let mut intent_summary = resolved.preserved_dimensions.clone().unwrap_or_default();
                    match instruction {
                        RefinementInstruction::LimitChange(n) => intent_summary.limit = Some(*n),
                        RefinementInstruction::OrderChange { column, direction } => {
                            intent_summary.ordering = Some(crate::session::IntentOrdering {
                                column: column.clone(),
                                direction: direction.clone(),
                            });
                        }
                        _ => {}
                    }
                    return Ok(GenerationOutcome::Generated(GeneratedSql {
                        sql,
                        confidence: 0.99,
                        tables_used: resolved.preserved_tables.clone(),
                        intent_summary,
                    }));
                }
            }
        }

        // Step 1: clarification check, only for a brand-new turn with no clarification answer yet.
        if resolved.continuation_type == ContinuationType::New && resolved.clarification_answer.is_none() {
            if let Some(clarification) = detect_incomplete_intent(question, rules) {
                return Ok(GenerationOutcome::ClarificationNeeded(clarification));
            }
        }

        // Step 2: RAG retrieval, scoped by the preserved-tables hint and preserved intent dimensions.
        let context = KbRetriever::retrieve(
            question,
            resolved.clarification_answer.as_deref(),
            &resolved.preserved_tables,
            resolved.preserved_dimensions.as_ref(),
            rules,
            settings,
        );

        // Step 3: prompt build.
        let conversation_hint = (!resolved.preserved_tables.is_empty())
            .then(|| resolved.preserved_tables.join(", "));
        let prompt_text = prompt::build_prompt(question, conversation_hint.as_deref(), &context);

        // Step 4: LLM call.
        let completion = llm.complete(&prompt_text).await?;
        Ok(GenerationOutcome::Generated(GeneratedSql {
            sql: completion.sql,
            confidence: completion.confidence,
            tables_used: completion.tables_used,
            intent_summary: completion.intent_summary,
        }))
    }
}

fn rewrite_limit(sql: &str, n: i64) -> String {
    let trimmed = sql.trim_end().trim_end_matches(';').to_string();
    if LIMIT_IN_SQL_RE.is_match(&trimmed) {
        LIMIT_IN_SQL_RE.replace(&trimmed, format!("LIMIT {n}")).to_string()
    } else {
        format!("{trimmed}\nLIMIT {n}")
    }
}

fn rewrite_order(sql: &str, column: &str, direction: &str) -> String {
    let trimmed = sql.trim_end().trim_end_matches(';').to_string();
    let replacement = format!("ORDER BY {column} {direction} ");

    if ORDER_BY_RE.is_match(&trimmed) {
        return ORDER_BY_RE.replace(&trimmed, replacement.as_str()).trim_end().to_string();
    }

    if let Some(pos) = trimmed.to_uppercase().find("LIMIT") {
        let (before, after) = trimmed.split_at(pos);
        format!("{}{}{}", before.trim_end(), format!("\n{replacement}\n"), after)
    } else {
        format!("{trimmed}\n{}", replacement.trim_end())
    }
}

/// Ports the three clarification rules verbatim from the system this generator was modeled on:
/// an exact vague-phrase set (or a short display-verb imperative naming no table), "top branches"
/// with no recognized metric keyword, and a bare exact `show/list {loans,borrowers,branches}`.
fn detect_incomplete_intent(question: &str, rules: &CompiledRules) -> Option<ClarificationRequest> {
    let q = question.trim().to_lowercase();

    let mut table_tokens: std::collections::HashSet<String> = rules
        .tables
        .keys()
        .flat_map(|t| {
            let bare = t.rsplit('.').next().unwrap_or(t).to_lowercase();
            [t.to_lowercase(), bare]
        })
        .collect();
    table_tokens.extend(KNOWN_TABLE_HINTS.iter().map(|t| t.to_string()));
    let table_mentioned = table_tokens.iter().any(|tok| q.contains(tok.as_str()));

    let starts_with_display_verb =
        ["show", "list", "display", "give", "get"].iter().any(|verb| q.starts_with(verb));

    if VAGUE_PHRASES.contains(&q.as_str())
        || (starts_with_display_verb && !table_mentioned && q.split_whitespace().count() <= 4)
    {
        return Some(ClarificationRequest {
            question: format!("Which table do you want ({})?", KNOWN_TABLE_HINTS.join(", ")),
            partial_intent: serde_json::json!({ "vague": true, "needs_table": true }),
        });
    }

    if q.contains("top") && q.contains("branch") && !TOP_BRANCH_METRIC_KEYWORDS.iter().any(|k| q.contains(k)) {
        return Some(ClarificationRequest {
            question: "Top branches by what metric: total collections, total repayments, total outstanding balance, total principal, or number of loans?".to_string(),
            partial_intent: serde_json::json!({ "entity": "branches", "needs_metric": true }),
        });
    }

    if BARE_LIST_QUESTIONS.contains(&q.as_str()) {
        let entity = q.split_whitespace().last().unwrap_or_default();
        return Some(ClarificationRequest {
            question: "How many records do you want (e.g., 10, 20, 50) and should it be latest-first?".to_string(),
            partial_intent: serde_json::json!({ "entity": entity, "needs_limit": true }),
        });
    }

    None
}
