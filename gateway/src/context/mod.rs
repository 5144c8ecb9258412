// Path and File Name : /root/crate/gateway/src/context/mod.rs
// Details of functionality of this file: the Context Resolver (spec §4.6). Decides whether an
// incoming question is a brand-new request, a REFINE of the anchor turn's intent, or a DRILLDOWN
// into the anchor turn's result set, and whether it carries a cheap, deterministic refinement
// (limit/order change) that never needs the LLM.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::session::{IntentSummary, Session, Turn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuationType {
    New,
    Refine,
    Drilldown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefinementInstruction {
    LimitChange(i64),
    OrderChange { column: String, direction: String },
    MetricChange(String),
    FilterChange(String),
    TimeWindowChange(String),
}

#[derive(Debug, Clone)]
pub struct ResolvedContext {
    pub continuation_type: ContinuationType,
    pub refinement_instruction: Option<RefinementInstruction>,
    pub preserved_dimensions: Option<IntentSummary>,
    pub preserved_tables: Vec<String>,
    pub prior_sql: Option<String>,
    pub clarification_answer: Option<String>,
}

impl ResolvedContext {
    pub fn is_related(&self) -> bool {
        !matches!(self.continuation_type, ContinuationType::New)
    }
}

static LIMIT_PHRASE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:make it|increase to|decrease to|change to|set to|limit to)\s+(\d+)$")
        .expect("static regex")
});
static LIMIT_BARE_NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)$").expect("static regex"));
static LIMIT_TOP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^top\s+(\d+)$").expect("static regex"));
static LIMIT_KEYWORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^limit\s+(\d+)$").expect("static regex"));
static LIMIT_SHOW_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:show|show me|give me)\s+(\d+)(?:\s+rows|\s+results)?$").expect("static regex"));

static METRIC_CHANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:now|instead)?\s*by\s+(outstanding balance|outstanding|principal|collections|repayments|loan count|number of loans)\b")
        .expect("static regex")
});

static ORDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:sort|order)\s+by\s+([\w_]+)(?:\s+(asc|desc|ascending|descending))?\b")
        .expect("static regex")
});
static ORDER_SUPERLATIVE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(highest|lowest|most|least)\b").expect("static regex"));
static ORDER_DIRECTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(asc|desc|ascending|descending)\b").expect("static regex"));

static FILTER_CHANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(only|just|exclude|include|without|with)\s+([\w_]+)\b").expect("static regex")
});

static TIME_WINDOW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:last|past|previous)\s+\d+\s+(?:day|days|week|weeks|month|months|quarter|quarters|year|years)\b\
        |\b(?:january|february|march|april|may|june|july|august|september|october|november|december)\b\
        |\bin\s+(?:19|20)\d{2}\b\
        |\bin\s+q[1-4]\b\
        |\b(?:this|current)\s+(?:day|week|month|quarter|year|period)\b\
        |\b(?:today|yesterday)\b",
    )
    .expect("static regex")
});

static DRILLDOWN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(they|them|those|these|their)\b|\b(?:from|in)\s+the\s+(?:above|previous|prior)\s+(?:results|data|rows|query)\b")
        .expect("static regex")
});

static REFERENTIAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(same|what about|also|too|similar|split by|group by|break down|show details)\b")
        .expect("static regex")
});

static SMART_QUOTE_CHARS: &[char] = &['\u{201c}', '\u{201d}', '\u{2018}', '\u{2019}'];

pub struct ContextResolver;

impl ContextResolver {
    pub fn resolve(question: &str, session: &Session, clarification_answer: Option<String>) -> ResolvedContext {
        let normalized = normalize_question(question);

        if session.is_empty() {
            return ResolvedContext {
                continuation_type: ContinuationType::New,
                refinement_instruction: None,
                preserved_dimensions: None,
                preserved_tables: Vec::new(),
                prior_sql: None,
                clarification_answer,
            };
        }

        let Some(anchor) = anchor_turn(session) else {
            return ResolvedContext {
                continuation_type: ContinuationType::New,
                refinement_instruction: None,
                preserved_dimensions: None,
                preserved_tables: Vec::new(),
                prior_sql: None,
                clarification_answer,
            };
        };

        let refinement_instruction = Self::detect_refinement(&normalized);
        let continuation_type = if refinement_instruction.is_some() {
            ContinuationType::Refine
        } else if DRILLDOWN_RE.is_match(&normalized) {
            ContinuationType::Drilldown
        } else if REFERENTIAL_RE.is_match(&normalized) {
            ContinuationType::Refine
        } else {
            ContinuationType::New
        };

        let (preserved_dimensions, preserved_tables, prior_sql) = match continuation_type {
            ContinuationType::New => (None, Vec::new(), None),
            _ => {
                let dims = anchor.intent_summary.clone();
                let tables = dims.as_ref().map(|d| d.tables.clone()).unwrap_or_else(|| anchor.tables_used.clone());
                (dims, tables, anchor.sql.clone())
            }
        };

        ResolvedContext {
            continuation_type,
            refinement_instruction,
            preserved_dimensions,
            preserved_tables,
            prior_sql,
            clarification_answer,
        }
    }

    /// Tries each refinement family in the priority order mandated by spec §4.6 step 4, returning
    /// the first match. LIMIT takes precedence, then metric, then order, then filter, then the
    /// time-window family - each is checked only after the preceding ones miss.
    fn detect_refinement(question: &str) -> Option<RefinementInstruction> {
        if let Some(n) = Self::parse_limit_value(question) {
            return Some(RefinementInstruction::LimitChange(n));
        }
        if let Some(caps) = METRIC_CHANGE_RE.captures(question) {
            return Some(RefinementInstruction::MetricChange(caps[1].to_lowercase()));
        }
        if let Some(instruction) = Self::detect_order_change(question) {
            return Some(instruction);
        }
        if let Some(caps) = FILTER_CHANGE_RE.captures(question) {
            return Some(RefinementInstruction::FilterChange(caps[2].to_lowercase()));
        }
        if let Some(m) = TIME_WINDOW_RE.find(question) {
            return Some(RefinementInstruction::TimeWindowChange(m.as_str().to_lowercase()));
        }
        None
    }

    fn detect_order_change(question: &str) -> Option<RefinementInstruction> {
        if let Some(caps) = ORDER_RE.captures(question) {
            let column = caps[1].to_string();
            let direction = caps
                .get(2)
                .map(|m| normalize_direction(m.as_str()))
                .unwrap_or_else(|| "DESC".to_string());
            return Some(RefinementInstruction::OrderChange { column, direction });
        }
        if let Some(caps) = ORDER_SUPERLATIVE_RE.captures(question) {
            let direction = match caps[1].to_lowercase().as_str() {
                "lowest" | "least" => "ASC",
                _ => "DESC",
            };
            return Some(RefinementInstruction::OrderChange { column: String::new(), direction: direction.to_string() });
        }
        if ORDER_DIRECTION_RE.is_match(question) {
            let direction = normalize_direction(&ORDER_DIRECTION_RE.captures(question).unwrap()[1]);
            return Some(RefinementInstruction::OrderChange { column: String::new(), direction });
        }
        None
    }

    fn parse_limit_value(question: &str) -> Option<i64> {
        for re in [&*LIMIT_PHRASE_RE, &*LIMIT_TOP_RE, &*LIMIT_KEYWORD_RE, &*LIMIT_SHOW_RE] {
            if let Some(caps) = re.captures(question) {
                if let Ok(n) = caps[1].parse::<i64>() {
                    return Some(n);
                }
            }
        }
        if let Some(caps) = LIMIT_BARE_NUMBER_RE.captures(question) {
            if let Ok(n) = caps[1].parse::<i64>() {
                return Some(n);
            }
        }
        None
    }
}

/// Strip smart/outer quotes, collapse internal whitespace, and drop trailing punctuation, per
/// spec §4.6 step 1, before any pattern matching runs.
fn normalize_question(question: &str) -> String {
    let without_smart_quotes: String = question.chars().filter(|c| !SMART_QUOTE_CHARS.contains(c)).collect();
    let trimmed = without_smart_quotes.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| trimmed.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
        .unwrap_or(trimmed);
    let collapsed = unquoted.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim_end_matches(['.', '?', '!']).to_string()
}

/// The most recent turn whose SQL is non-empty (spec GLOSSARY: "anchor turn"). A clarification-only
/// turn has `sql = None` and must be skipped so a follow-up still anchors on the last executed query.
fn anchor_turn(session: &Session) -> Option<&Turn> {
    session.turns().rev().find(|t| t.sql.is_some())
}

fn normalize_direction(raw: &str) -> String {
    match raw.to_lowercase().as_str() {
        "asc" | "ascending" => "ASC".to_string(),
        _ => "DESC".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Turn;

    fn executed_turn(question: &str, sql: &str, tables: Vec<&str>) -> Turn {
        Turn {
            question: question.to_string(),
            sql: Some(sql.to_string()),
            tables_used: tables.into_iter().map(String::from).collect(),
            intent_summary: Some(IntentSummary {
                tables: vec!["loans".to_string()],
                ..Default::default()
            }),
            clarification_answer: None,
            partial_intent: None,
        }
    }

    #[test]
    fn new_session_is_classified_as_new() {
        let session = Session::default();
        let resolved = ContextResolver::resolve("show loans", &session, None);
        assert_eq!(resolved.continuation_type, ContinuationType::New);
    }

    #[test]
    fn detects_limit_change_phrase() {
        let mut session = Session::default();
        session.push(executed_turn("show loans", "SELECT * FROM loans LIMIT 10", vec!["loans"]));
        let resolved = ContextResolver::resolve("make it 50", &session, None);
        assert_eq!(resolved.refinement_instruction, Some(RefinementInstruction::LimitChange(50)));
        assert_eq!(resolved.continuation_type, ContinuationType::Refine);
    }

    #[test]
    fn detects_bare_number_as_limit_change() {
        let mut session = Session::default();
        session.push(executed_turn("show loans", "SELECT * FROM loans LIMIT 10", vec!["loans"]));
        let resolved = ContextResolver::resolve("25", &session, None);
        assert_eq!(resolved.refinement_instruction, Some(RefinementInstruction::LimitChange(25)));
    }

    #[test]
    fn detects_metric_change_phrase() {
        let mut session = Session::default();
        session.push(executed_turn("top branches", "SELECT * FROM branches LIMIT 5", vec!["branches"]));
        let resolved = ContextResolver::resolve("now by outstanding balance", &session, None);
        assert_eq!(
            resolved.refinement_instruction,
            Some(RefinementInstruction::MetricChange("outstanding balance".to_string()))
        );
    }

    #[test]
    fn detects_order_by_with_direction() {
        let mut session = Session::default();
        session.push(executed_turn("show loans", "SELECT * FROM loans LIMIT 10", vec!["loans"]));
        let resolved = ContextResolver::resolve("sort by amount ascending", &session, None);
        assert_eq!(
            resolved.refinement_instruction,
            Some(RefinementInstruction::OrderChange { column: "amount".to_string(), direction: "ASC".to_string() })
        );
    }

    #[test]
    fn detects_filter_change_phrase() {
        let mut session = Session::default();
        session.push(executed_turn("show loans", "SELECT * FROM loans LIMIT 10", vec!["loans"]));
        let resolved = ContextResolver::resolve("only active", &session, None);
        assert_eq!(resolved.refinement_instruction, Some(RefinementInstruction::FilterChange("active".to_string())));
    }

    #[test]
    fn detects_time_window_change_phrase() {
        let mut session = Session::default();
        session.push(executed_turn("show loans", "SELECT * FROM loans LIMIT 10", vec!["loans"]));
        let resolved = ContextResolver::resolve("last 3 months", &session, None);
        assert!(matches!(resolved.refinement_instruction, Some(RefinementInstruction::TimeWindowChange(_))));
    }

    #[test]
    fn detects_drilldown_pronoun() {
        let mut session = Session::default();
        session.push(executed_turn("show borrowers", "SELECT * FROM borrowers LIMIT 3", vec!["borrowers"]));
        let resolved = ContextResolver::resolve("for those borrowers, show their loans", &session, None);
        assert_eq!(resolved.continuation_type, ContinuationType::Drilldown);
    }

    #[test]
    fn detects_referential_phrase_as_refine_with_no_instruction() {
        let mut session = Session::default();
        session.push(executed_turn("show loans by branch", "SELECT * FROM loans LIMIT 10", vec!["loans"]));
        let resolved = ContextResolver::resolve("what about collections", &session, None);
        assert_eq!(resolved.continuation_type, ContinuationType::Refine);
        assert!(resolved.refinement_instruction.is_none());
    }

    #[test]
    fn preserves_tables_from_anchor_turn() {
        let mut session = Session::default();
        session.push(executed_turn("show loans", "SELECT * FROM loans", vec!["loans"]));
        let resolved = ContextResolver::resolve("limit 10", &session, None);
        assert_eq!(resolved.preserved_tables, vec!["loans".to_string()]);
        assert_eq!(resolved.continuation_type, ContinuationType::Refine);
    }

    #[test]
    fn anchor_skips_clarification_only_turn() {
        let mut session = Session::default();
        session.push(executed_turn("show loans", "SELECT * FROM loans LIMIT 10", vec!["loans"]));
        session.push(Turn {
            question: "show loans".to_string(),
            sql: None,
            tables_used: Vec::new(),
            intent_summary: None,
            clarification_answer: None,
            partial_intent: None,
        });
        let resolved = ContextResolver::resolve("make it 20", &session, None);
        assert_eq!(resolved.prior_sql, Some("SELECT * FROM loans LIMIT 10".to_string()));
    }

    #[test]
    fn normalizes_smart_quotes_and_trailing_punctuation() {
        let mut session = Session::default();
        session.push(executed_turn("show loans", "SELECT * FROM loans LIMIT 10", vec!["loans"]));
        let resolved = ContextResolver::resolve("\u{201c}make it 5\u{201d}.", &session, None);
        assert_eq!(resolved.refinement_instruction, Some(RefinementInstruction::LimitChange(5)));
    }
}
