// Path and File Name : /root/crate/gateway/src/audit.rs
// Details of functionality of this file: an in-memory, hash-chained audit trail of executed
// queries. Each entry's hash covers the previous entry's hash plus its own fields, so any entry
// removed or altered after the fact breaks the chain - the same tamper-evidence pattern the
// orchestrator crate used for its action log.

use chrono::Utc;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, serde::Serialize)]
pub struct AuditEntry {
    pub session_id: String,
    pub sql: String,
    pub row_count: usize,
    pub recorded_at: String,
    pub hash: String,
}

#[derive(Default)]
pub struct AuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, session_id: &str, sql: &str, row_count: usize) -> AuditEntry {
        let mut entries = self.entries.lock();
        let prior_hash = entries.last().map(|e| e.hash.clone()).unwrap_or_default();
        let recorded_at = Utc::now().to_rfc3339();

        let mut hasher = Sha256::new();
        hasher.update(prior_hash.as_bytes());
        hasher.update(session_id.as_bytes());
        hasher.update(sql.as_bytes());
        hasher.update(row_count.to_le_bytes());
        hasher.update(recorded_at.as_bytes());
        let hash = format!("{:x}", hasher.finalize());

        let entry = AuditEntry {
            session_id: session_id.to_string(),
            sql: sql.to_string(),
            row_count,
            recorded_at,
            hash,
        };
        entries.push(entry.clone());
        entry
    }

    pub fn verify_chain(&self) -> bool {
        let entries = self.entries.lock();
        let mut prior_hash = String::new();
        for entry in entries.iter() {
            let mut hasher = Sha256::new();
            hasher.update(prior_hash.as_bytes());
            hasher.update(entry.session_id.as_bytes());
            hasher.update(entry.sql.as_bytes());
            hasher.update(entry.row_count.to_le_bytes());
            hasher.update(entry.recorded_at.as_bytes());
            let expected = format!("{:x}", hasher.finalize());
            if expected != entry.hash {
                return false;
            }
            prior_hash = entry.hash.clone();
        }
        true
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_verifies_after_several_entries() {
        let log = AuditLog::new();
        log.record("s1", "SELECT 1 FROM loans", 1);
        log.record("s1", "SELECT 2 FROM loans", 2);
        log.record("s2", "SELECT 3 FROM borrowers", 3);
        assert!(log.verify_chain());
    }

    #[test]
    fn tampering_with_an_entry_breaks_the_chain() {
        let log = AuditLog::new();
        log.record("s1", "SELECT 1 FROM loans", 1);
        log.record("s1", "SELECT 2 FROM loans", 2);
        {
            let mut entries = log.entries.lock();
            entries[0].row_count = 999;
        }
        assert!(!log.verify_chain());
    }
}
