// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for resource-governor.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host process is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `resource_governor_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//! - `_bytes` suffix for sizes
//!
//! # Labels
//! - `cache`: block, or any caller-chosen tiered cache name
//! - `tier`: hot, warm, cold
//! - `resolution`: minute, hour, day
//! - `state`: governor state name

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

// ═══════════════════════════════════════════════════════════════════════════
// Tiered cache
// ═══════════════════════════════════════════════════════════════════════════

/// Record a cache lookup
pub fn record_cache_lookup(cache: &'static str, hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!(
        "resource_governor_cache_lookups_total",
        "cache" => cache,
        "result" => result
    )
    .increment(1);
}

/// Set entry count of one tier
pub fn set_cache_entries(cache: &'static str, tier: &'static str, count: usize) {
    gauge!(
        "resource_governor_cache_entries",
        "cache" => cache,
        "tier" => tier
    )
    .set(count as f64);
}

/// Set tracked cache size in bytes
pub fn set_cache_bytes(cache: &'static str, bytes: usize) {
    gauge!("resource_governor_cache_bytes", "cache" => cache).set(bytes as f64);
}

/// Record eviction event
pub fn record_eviction(cache: &'static str, reason: &'static str, count: usize, bytes: usize) {
    counter!(
        "resource_governor_evictions_total",
        "cache" => cache,
        "reason" => reason
    )
    .increment(count as u64);
    counter!("resource_governor_evicted_bytes_total", "cache" => cache).increment(bytes as u64);
}

/// Record TTL sweep demotions
pub fn record_ttl_demotions(cache: &'static str, count: usize) {
    counter!("resource_governor_ttl_demotions_total", "cache" => cache).increment(count as u64);
}

/// Set highest block number seen
pub fn set_block_watermark(number: u64) {
    gauge!("resource_governor_block_watermark").set(number as f64);
}

// ═══════════════════════════════════════════════════════════════════════════
// Metrics aggregator
// ═══════════════════════════════════════════════════════════════════════════

/// Record ingested metric points
pub fn record_points_ingested(count: usize) {
    counter!("resource_governor_points_ingested_total").increment(count as u64);
}

/// Set number of points in the raw buffer
pub fn set_raw_buffer_points(count: usize) {
    gauge!("resource_governor_raw_buffer_points").set(count as f64);
}

/// Record one rollup pass
pub fn record_rollup(resolution: &'static str, metrics: usize, duration: Duration) {
    counter!(
        "resource_governor_rollups_total",
        "resolution" => resolution
    )
    .increment(1);
    histogram!(
        "resource_governor_rollup_metrics",
        "resolution" => resolution
    )
    .record(metrics as f64);
    histogram!(
        "resource_governor_rollup_seconds",
        "resolution" => resolution
    )
    .record(duration.as_secs_f64());
}

/// Record a detected anomaly
pub fn record_anomaly(severity: &'static str) {
    counter!(
        "resource_governor_anomalies_total",
        "severity" => severity
    )
    .increment(1);
}

/// Record a backpressure-driven aggregator cleanup
pub fn record_aggregator_cleanup() {
    counter!("resource_governor_aggregator_cleanups_total").increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// Resource manager
// ═══════════════════════════════════════════════════════════════════════════

/// Set sampled process memory
pub fn set_process_memory(heap_used: u64, heap_total: u64, rss: u64) {
    gauge!("resource_governor_heap_used_bytes").set(heap_used as f64);
    gauge!("resource_governor_heap_total_bytes").set(heap_total as f64);
    gauge!("resource_governor_rss_bytes").set(rss as f64);
}

/// Set memory usage ratio (0.0 - 1.0+)
pub fn set_memory_usage_ratio(ratio: f64) {
    gauge!("resource_governor_memory_usage_ratio").set(ratio);
}

/// Set memory level (0 = healthy, 1 = warning, 2 = critical, 3 = emergency)
pub fn set_memory_level(level: u8) {
    gauge!("resource_governor_memory_level").set(level as f64);
}

/// Set GC threshold after adaptive adjustment
pub fn set_effective_gc_threshold(threshold: f64) {
    gauge!("resource_governor_effective_gc_threshold").set(threshold);
}

/// Set heap growth rate in MB/min
pub fn set_growth_rate(mb_per_min: f64) {
    gauge!("resource_governor_heap_growth_mb_per_min").set(mb_per_min);
}

/// Record a collection request and how it was handled
pub fn record_gc_request(source: &'static str, outcome: &'static str) {
    counter!(
        "resource_governor_gc_requests_total",
        "source" => source,
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a cleanup run
pub fn record_cleanup(kind: &'static str, duration: Duration) {
    counter!("resource_governor_cleanups_total", "kind" => kind).increment(1);
    histogram!("resource_governor_cleanup_seconds", "kind" => kind)
        .record(duration.as_secs_f64());
}

/// Record heap snapshot capture
pub fn record_snapshot(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("resource_governor_snapshots_total", "status" => status).increment(1);
}

/// Record pool acquire outcome
pub fn record_pool_acquire(pool: &'static str, reused: bool) {
    let result = if reused { "reused" } else { "allocated" };
    counter!(
        "resource_governor_pool_acquires_total",
        "pool" => pool,
        "result" => result
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// Memory governor
// ═══════════════════════════════════════════════════════════════════════════

/// Record governor state transition
pub fn record_state_transition(from: &'static str, to: &'static str) {
    counter!(
        "resource_governor_state_transitions_total",
        "from" => from,
        "to" => to
    )
    .increment(1);
}

/// Set governor state (0 = normal .. 4 = critical)
pub fn set_governor_state(state: u8) {
    gauge!("resource_governor_state").set(state as f64);
}

/// Set shard counts
pub fn set_shard_counts(active: usize, hibernated: usize) {
    gauge!("resource_governor_shards", "status" => "active").set(active as f64);
    gauge!("resource_governor_shards", "status" => "hibernated").set(hibernated as f64);
}

/// Record an activation decision
pub fn record_activation_decision(deferred: bool, reason: &'static str) {
    let decision = if deferred { "deferred" } else { "allowed" };
    counter!(
        "resource_governor_activation_decisions_total",
        "decision" => decision,
        "reason" => reason
    )
    .increment(1);
}

/// Record shard hibernation
pub fn record_shard_hibernated() {
    counter!("resource_governor_shard_hibernations_total").increment(1);
}

/// Record shard wakeup attempt
pub fn record_shard_wakeup(accepted: bool) {
    let status = if accepted { "accepted" } else { "refused" };
    counter!("resource_governor_shard_wakeups_total", "status" => status).increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// Lifecycle
// ═══════════════════════════════════════════════════════════════════════════

/// Record how long an initialize/shutdown phase took
pub fn record_lifecycle_phase(phase: &'static str, duration: Duration) {
    histogram!("resource_governor_lifecycle_phase_seconds", "phase" => phase)
        .record(duration.as_secs_f64());
}

// ═══════════════════════════════════════════════════════════════════════════
// Periodic jobs
// ═══════════════════════════════════════════════════════════════════════════

/// Record a periodic job run
pub fn record_job_duration(job: &'static str, duration: Duration) {
    histogram!("resource_governor_job_seconds", "job" => job).record(duration.as_secs_f64());
}

/// A timing guard that records job duration on drop
pub struct JobTimer {
    job: &'static str,
    start: Instant,
}

impl JobTimer {
    /// Start a new job timer
    pub fn new(job: &'static str) -> Self {
        Self {
            job,
            start: Instant::now(),
        }
    }
}

impl Drop for JobTimer {
    fn drop(&mut self) {
        record_job_duration(self.job, self.start.elapsed());
    }
}

/// Convenience macro for timing periodic jobs
#[macro_export]
macro_rules! time_job {
    ($job:expr) => {
        $crate::metrics::JobTimer::new($job)
    };
}
