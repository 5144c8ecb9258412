// Path and File Name : /root/crate/gateway/src/validation/blocked_patterns.rs
// Details of functionality of this file: the exact deny-lists and literal/comment-stripping scan
// used to reject statements before they ever reach the AST validator. Ported from the original
// blocked-patterns module with the same function and keyword lists.

use once_cell::sync::Lazy;
use regex::Regex;

pub const BLOCKED_FUNCTIONS: &[&str] = &[
    "pg_sleep",
    "pg_sleep_for",
    "pg_sleep_until",
    "pg_read_file",
    "pg_read_binary_file",
    "pg_ls_dir",
    "dblink",
    "dblink_connect",
    "dblink_exec",
    "lo_import",
    "lo_export",
    "lo_create",
    "lo_unlink",
    "pg_terminate_backend",
    "pg_cancel_backend",
    "pg_reload_conf",
    "pg_advisory_lock",
    "pg_try_advisory_lock",
];

pub const BLOCKED_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "TRUNCATE",
    "DROP", "CREATE", "ALTER", "RENAME",
    "GRANT", "REVOKE",
    "BEGIN", "COMMIT", "ROLLBACK", "SAVEPOINT",
    "VACUUM", "ANALYZE", "CLUSTER", "REINDEX",
    "DO", "CALL",
    "COPY", "LISTEN", "NOTIFY", "UNLISTEN",
];

pub const BLOCKED_JOIN_TYPES: &[&str] = &["CROSS"];

static COMMENT_BLOCK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\*.*?\*/").expect("static regex"));
static COMMENT_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"--[^\n]*").expect("static regex"));
static SINGLE_QUOTED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"'(?:[^'\\]|\\.)*'").expect("static regex"));
static DOUBLE_QUOTED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#""(?:[^"\\]|\\.)*""#).expect("static regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

pub fn blocked_functions() -> Vec<String> {
    BLOCKED_FUNCTIONS.iter().map(|s| s.to_string()).collect()
}

pub fn blocked_keywords() -> Vec<String> {
    BLOCKED_KEYWORDS.iter().map(|s| s.to_string()).collect()
}

/// Removes comments and string literals, then collapses whitespace, so downstream keyword/function
/// scans never false-positive on a literal that merely mentions a blocked word.
pub fn strip_sql_literals_and_comments(sql: &str) -> String {
    let without_block_comments = COMMENT_BLOCK_RE.replace_all(sql, " ");
    let without_line_comments = COMMENT_LINE_RE.replace_all(&without_block_comments, " ");
    let without_single_quoted = SINGLE_QUOTED_RE.replace_all(&without_line_comments, "''");
    let without_double_quoted = DOUBLE_QUOTED_RE.replace_all(&without_single_quoted, "\"\"");
    WHITESPACE_RE.replace_all(&without_double_quoted, " ").trim().to_string()
}

fn word_boundary_regex(word: &str) -> Regex {
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(word))).expect("dynamic keyword regex")
}

pub fn check_blocked_keywords(sql: &str) -> Vec<String> {
    let stripped = strip_sql_literals_and_comments(sql);
    BLOCKED_KEYWORDS
        .iter()
        .filter(|kw| word_boundary_regex(kw).is_match(&stripped))
        .map(|kw| kw.to_string())
        .collect()
}

pub fn check_blocked_functions(sql: &str) -> Vec<String> {
    let stripped = strip_sql_literals_and_comments(sql);
    BLOCKED_FUNCTIONS
        .iter()
        .filter(|f| word_boundary_regex(f).is_match(&stripped))
        .map(|f| f.to_string())
        .collect()
}

/// Tolerant prefix match: "CROSS JOIN" is blocked regardless of surrounding whitespace or case.
pub fn check_blocked_join_types(sql: &str) -> Vec<String> {
    let stripped = strip_sql_literals_and_comments(sql).to_uppercase();
    BLOCKED_JOIN_TYPES
        .iter()
        .filter(|jt| stripped.contains(&format!("{jt} JOIN")))
        .map(|jt| jt.to_string())
        .collect()
}

/// Secondary keyword-prefix check for whether the statement is a SELECT, used as a fallback when
/// the AST parser itself fails to parse the statement (fail closed rather than fail open).
pub fn check_non_select_statement(sql: &str) -> bool {
    let stripped = strip_sql_literals_and_comments(sql);
    let trimmed = stripped.trim_start();
    let upper = trimmed.to_uppercase();
    !(upper.starts_with("SELECT") || upper.starts_with("WITH") || upper.starts_with('('))
}
