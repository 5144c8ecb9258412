// Path and File Name : /root/crate/gateway/src/metrics.rs
// Details of functionality of this file: in-process metrics collection, exposed at `/metrics` as
// plain JSON. Mirrors the original system's metrics surface field-for-field.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;

const MAX_EXECUTION_SAMPLES: usize = 1000;

#[derive(Default)]
pub struct MetricsCollector {
    total_queries: AtomicU64,
    successful_queries: AtomicU64,
    failed_queries: AtomicU64,
    clarification_requests: AtomicU64,
    validation_failures: AtomicU64,
    validation_failure_reasons: RwLock<HashMap<String, u64>>,
    execution_time_samples: RwLock<Vec<f64>>,
    execution_time_total_ms: RwLock<f64>,
    kb_refresh_count: AtomicU64,
    kb_refresh_failures: AtomicU64,
    kb_last_refresh: RwLock<Option<String>>,
    kb_version: RwLock<Option<String>>,
    llm_requests: AtomicU64,
    llm_failures: AtomicU64,
    llm_total_time_ms: RwLock<f64>,
    rag_requests: AtomicU64,
    rag_failures: AtomicU64,
    rag_total_time_ms: RwLock<f64>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_query(&self, success: bool, execution_time_ms: f64) {
        self.total_queries.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_queries.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_queries.fetch_add(1, Ordering::Relaxed);
        }

        let mut samples = self.execution_time_samples.write();
        samples.push(execution_time_ms);
        if samples.len() > MAX_EXECUTION_SAMPLES {
            let overflow = samples.len() - MAX_EXECUTION_SAMPLES;
            samples.drain(0..overflow);
        }
        *self.execution_time_total_ms.write() += execution_time_ms;
    }

    pub fn record_clarification(&self) {
        self.clarification_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_validation_failure(&self, reason: &str) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
        *self.validation_failure_reasons.write().entry(reason.to_string()).or_insert(0) += 1;
    }

    pub fn record_kb_refresh(&self, success: bool, version: &str, refreshed_at: &str) {
        self.kb_refresh_count.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.kb_refresh_failures.fetch_add(1, Ordering::Relaxed);
            return;
        }
        *self.kb_version.write() = Some(version.to_string());
        *self.kb_last_refresh.write() = Some(refreshed_at.to_string());
    }

    pub fn record_llm_request(&self, success: bool, duration_ms: f64) {
        self.llm_requests.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.llm_failures.fetch_add(1, Ordering::Relaxed);
        }
        *self.llm_total_time_ms.write() += duration_ms;
    }

    pub fn record_rag_request(&self, success: bool, duration_ms: f64) {
        self.rag_requests.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.rag_failures.fetch_add(1, Ordering::Relaxed);
        }
        *self.rag_total_time_ms.write() += duration_ms;
    }

    pub fn get_average_execution_time_ms(&self) -> f64 {
        let total = self.total_queries.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        *self.execution_time_total_ms.read() / total as f64
    }

    pub fn get_success_rate(&self) -> f64 {
        let total = self.total_queries.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.successful_queries.load(Ordering::Relaxed) as f64 / total as f64
    }

    pub fn get_clarification_rate(&self) -> f64 {
        let total = self.total_queries.load(Ordering::Relaxed) + self.clarification_requests.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.clarification_requests.load(Ordering::Relaxed) as f64 / total as f64
    }

    pub fn get_max_execution_time_ms(&self) -> f64 {
        self.execution_time_samples.read().iter().cloned().fold(0.0, f64::max)
    }

    pub fn to_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_queries: self.total_queries.load(Ordering::Relaxed),
            successful_queries: self.successful_queries.load(Ordering::Relaxed),
            failed_queries: self.failed_queries.load(Ordering::Relaxed),
            clarification_requests: self.clarification_requests.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            validation_failure_reasons: self.validation_failure_reasons.read().clone(),
            average_execution_time_ms: self.get_average_execution_time_ms(),
            max_execution_time_ms: self.get_max_execution_time_ms(),
            success_rate: self.get_success_rate(),
            clarification_rate: self.get_clarification_rate(),
            kb_refresh_count: self.kb_refresh_count.load(Ordering::Relaxed),
            kb_refresh_failures: self.kb_refresh_failures.load(Ordering::Relaxed),
            kb_last_refresh: self.kb_last_refresh.read().clone(),
            kb_version: self.kb_version.read().clone(),
            llm_requests: self.llm_requests.load(Ordering::Relaxed),
            llm_failures: self.llm_failures.load(Ordering::Relaxed),
            rag_requests: self.rag_requests.load(Ordering::Relaxed),
            rag_failures: self.rag_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub total_queries: u64,
    pub successful_queries: u64,
    pub failed_queries: u64,
    pub clarification_requests: u64,
    pub validation_failures: u64,
    pub validation_failure_reasons: HashMap<String, u64>,
    pub average_execution_time_ms: f64,
    pub max_execution_time_ms: f64,
    pub success_rate: f64,
    pub clarification_rate: f64,
    pub kb_refresh_count: u64,
    pub kb_refresh_failures: u64,
    pub kb_last_refresh: Option<String>,
    pub kb_version: Option<String>,
    pub llm_requests: u64,
    pub llm_failures: u64,
    pub rag_requests: u64,
    pub rag_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_execution_time_samples_at_one_thousand() {
        let metrics = MetricsCollector::new();
        for i in 0..1500 {
            metrics.record_query(true, i as f64);
        }
        assert_eq!(metrics.execution_time_samples.read().len(), MAX_EXECUTION_SAMPLES);
    }

    #[test]
    fn success_rate_reflects_failures() {
        let metrics = MetricsCollector::new();
        metrics.record_query(true, 10.0);
        metrics.record_query(false, 20.0);
        assert_eq!(metrics.get_success_rate(), 0.5);
    }

    #[test]
    fn validation_failures_are_tallied_by_reason() {
        let metrics = MetricsCollector::new();
        metrics.record_validation_failure("blocked_keyword");
        metrics.record_validation_failure("blocked_keyword");
        metrics.record_validation_failure("join_depth");
        let snapshot = metrics.to_snapshot();
        assert_eq!(snapshot.validation_failure_reasons.get("blocked_keyword"), Some(&2));
    }
}
