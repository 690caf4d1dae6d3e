use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Telemetry record emitted for every `search_grid` call (spec §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridTelemetry {
    pub requested_offset: usize,
    pub page_size: usize,
    pub candidate_limit: usize,
    pub max_candidate_results: usize,
    pub returned: usize,
    pub reported_total: usize,
    pub actual_total: usize,
    pub has_more: bool,
    pub is_truncated: bool,
}

/// Point-in-time snapshot of the search subsystem's counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub uptime_secs: u64,
    pub fts_queries: u64,
    pub trigram_queries: u64,
    pub avg_fts_latency_ms: f64,
    pub avg_trigram_latency_ms: f64,

    pub write_ahead_depth: u64,
    pub write_ahead_attempts: u64,
    pub dead_letter_count: u64,

    pub outbox_backlog: u64,
    pub idempotency_rejects: u64,

    pub last_audit_duration_ms: u64,
    pub last_audit_missing: u64,
    pub last_audit_drift: u64,
    pub last_audit_extra: u64,
}

/// Health check status, mirrored from the embedded-store probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub checks: Vec<HealthCheck>,
    pub timestamp: SystemTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
    pub latency_ms: u64,
}

/// Atomic counters backing a `Stats` snapshot; cheap to update from any
/// worker without a lock.
#[derive(Debug, Default)]
pub struct Telemetry {
    start: Option<std::time::Instant>,
    fts_queries: AtomicU64,
    trigram_queries: AtomicU64,
    fts_latency_ms_total: AtomicU64,
    trigram_latency_ms_total: AtomicU64,

    write_ahead_depth: AtomicU64,
    write_ahead_attempts: AtomicU64,
    dead_letter_count: AtomicU64,

    outbox_backlog: AtomicU64,
    idempotency_rejects: AtomicU64,

    last_audit_duration_ms: AtomicU64,
    last_audit_missing: AtomicU64,
    last_audit_drift: AtomicU64,
    last_audit_extra: AtomicU64,
}

impl Telemetry {
    pub fn new() -> Self {
        Telemetry {
            start: Some(std::time::Instant::now()),
            ..Default::default()
        }
    }

    pub fn record_fts_query(&self, latency_ms: u64) {
        self.fts_queries.fetch_add(1, Ordering::Relaxed);
        self.fts_latency_ms_total
            .fetch_add(latency_ms, Ordering::Relaxed);
    }

    pub fn record_trigram_query(&self, latency_ms: u64) {
        self.trigram_queries.fetch_add(1, Ordering::Relaxed);
        self.trigram_latency_ms_total
            .fetch_add(latency_ms, Ordering::Relaxed);
    }

    pub fn record_grid(&self, telemetry: &GridTelemetry) {
        tracing::info!(
            requested_offset = telemetry.requested_offset,
            page_size = telemetry.page_size,
            candidate_limit = telemetry.candidate_limit,
            max_candidate_results = telemetry.max_candidate_results,
            returned = telemetry.returned,
            reported_total = telemetry.reported_total,
            actual_total = telemetry.actual_total,
            has_more = telemetry.has_more,
            is_truncated = telemetry.is_truncated,
            "search_grid"
        );
    }

    pub fn set_write_ahead_depth(&self, depth: u64) {
        self.write_ahead_depth.store(depth, Ordering::Relaxed);
    }

    pub fn record_write_ahead_attempt(&self) {
        self.write_ahead_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_letter(&self) {
        self.dead_letter_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_outbox_backlog(&self, backlog: u64) {
        self.outbox_backlog.store(backlog, Ordering::Relaxed);
    }

    pub fn record_idempotency_reject(&self) {
        self.idempotency_rejects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audit(&self, duration_ms: u64, missing: u64, drift: u64, extra: u64) {
        self.last_audit_duration_ms
            .store(duration_ms, Ordering::Relaxed);
        self.last_audit_missing.store(missing, Ordering::Relaxed);
        self.last_audit_drift.store(drift, Ordering::Relaxed);
        self.last_audit_extra.store(extra, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Stats {
        let fts_queries = self.fts_queries.load(Ordering::Relaxed);
        let trigram_queries = self.trigram_queries.load(Ordering::Relaxed);
        let avg_fts_latency_ms = if fts_queries > 0 {
            self.fts_latency_ms_total.load(Ordering::Relaxed) as f64 / fts_queries as f64
        } else {
            0.0
        };
        let avg_trigram_latency_ms = if trigram_queries > 0 {
            self.trigram_latency_ms_total.load(Ordering::Relaxed) as f64 / trigram_queries as f64
        } else {
            0.0
        };

        Stats {
            uptime_secs: self
                .start
                .map(|s| s.elapsed().as_secs())
                .unwrap_or_default(),
            fts_queries,
            trigram_queries,
            avg_fts_latency_ms,
            avg_trigram_latency_ms,
            write_ahead_depth: self.write_ahead_depth.load(Ordering::Relaxed),
            write_ahead_attempts: self.write_ahead_attempts.load(Ordering::Relaxed),
            dead_letter_count: self.dead_letter_count.load(Ordering::Relaxed),
            outbox_backlog: self.outbox_backlog.load(Ordering::Relaxed),
            idempotency_rejects: self.idempotency_rejects.load(Ordering::Relaxed),
            last_audit_duration_ms: self.last_audit_duration_ms.load(Ordering::Relaxed),
            last_audit_missing: self.last_audit_missing.load(Ordering::Relaxed),
            last_audit_drift: self.last_audit_drift.load(Ordering::Relaxed),
            last_audit_extra: self.last_audit_extra.load(Ordering::Relaxed),
        }
    }
}
