// Path and File Name : /root/crate/gateway/src/session/mod.rs
// Details of functionality of this file: the conversational Session store. Each session keeps a
// bounded ring of the last 5 turns so the Context Resolver can reference prior tables/intent without
// unbounded memory growth.

use std::collections::VecDeque;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

const MAX_TURNS: usize = 5;

/// A single tagged record for conversational intent (spec §9: "a single tagged record type for
/// intent with optional fields... not a free-form map"). Carried on a `Turn` and copied forward by
/// the Context Resolver as `preserved_dimensions`, and consumed directly by the RAG retriever's
/// partial-intent scoring weights.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct IntentSummary {
    pub subject: Option<String>,
    pub metric: Option<String>,
    pub time_window: Option<String>,
    pub grouping: Vec<String>,
    pub ordering: Option<IntentOrdering>,
    pub limit: Option<i64>,
    pub tables: Vec<String>,
    pub result_scope: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntentOrdering {
    pub column: String,
    pub direction: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub sql: Option<String>,
    pub tables_used: Vec<String>,
    pub intent_summary: Option<IntentSummary>,
    pub clarification_answer: Option<String>,
    pub partial_intent: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    turns: VecDeque<Turn>,
}

impl Session {
    pub fn push(&mut self, turn: Turn) {
        if self.turns.len() == MAX_TURNS {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.back()
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, session_id: &str) -> Session {
        self.sessions.entry(session_id.to_string()).or_default().clone()
    }

    pub fn record_turn(&self, session_id: &str, turn: Turn) {
        let mut entry = self.sessions.entry(session_id.to_string()).or_default();
        entry.push(turn);
    }

    pub fn clear(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }
}
