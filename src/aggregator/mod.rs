// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Multi-resolution metrics aggregation.
//!
//! # Pipeline
//!
//! ```text
//!   record() ──► raw RingBuffer ──1m job──► minute buckets ──1h job──► hour buckets ──1d job──► day buckets
//!        │
//!        └────► per-metric trend window ──30s scan──► anomalies
//! ```
//!
//! Hour and day rollups read only the previous resolution's buckets, never
//! raw points, so their cost is bounded by the bucket caps. Each resolution
//! keeps a bounded number of buckets; the oldest are dropped once the cap is
//! exceeded.
//!
//! Every job processes all *complete* windows since the last run, so a late
//! or skipped tick catches up instead of losing a window.

pub(crate) mod stats;
mod trend;
mod types;

pub use types::{
    AggregatedMetric, AggregatorStats, Anomaly, AnomalySeverity, MetricPoint, Resolution, Trend,
};

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::clock::{now_millis, window_start};
use crate::config::AggregatorConfig;
use crate::error::ConfigError;
use crate::events::{EventBus, GovernanceEvent};
use crate::prometheus::PromWriter;
use crate::resource::GcCoordinator;
use crate::ring_buffer::RingBuffer;
use crate::scheduler::JobSlot;
use stats::Summary;
use trend::TrendWindows;

/// Buckets kept per resolution after a forced cleanup.
const CLEANUP_KEEP_BUCKETS: usize = 10;
/// Trend values kept per metric after a forced cleanup.
const CLEANUP_KEEP_TREND: usize = 10;

type Buckets = BTreeMap<u64, HashMap<String, AggregatedMetric>>;

struct AggregatorState {
    raw: RingBuffer<MetricPoint>,
    minute: Buckets,
    hour: Buckets,
    day: Buckets,
    trends: TrendWindows,
    anomalies: VecDeque<Anomaly>,
    /// End (exclusive) of the last processed window per resolution
    minute_done: Option<u64>,
    hour_done: Option<u64>,
    day_done: Option<u64>,
}

impl AggregatorState {
    fn buckets(&self, resolution: Resolution) -> &Buckets {
        match resolution {
            Resolution::Minute => &self.minute,
            Resolution::Hour => &self.hour,
            Resolution::Day => &self.day,
        }
    }
}

/// Raw telemetry store with 1m/1h/1d rollups, trends and anomaly detection.
pub struct MetricsAggregator {
    config: AggregatorConfig,
    state: Mutex<AggregatorState>,
    gc: Arc<GcCoordinator>,
    events: EventBus,
    ingested: AtomicU64,
    rejected: AtomicU64,
    forced_cleanups: AtomicU64,
    jobs: JobSlot,
}

impl MetricsAggregator {
    pub fn new(
        config: AggregatorConfig,
        gc: Arc<GcCoordinator>,
        events: EventBus,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let state = AggregatorState {
            raw: RingBuffer::new(config.raw_buffer_capacity)?,
            minute: BTreeMap::new(),
            hour: BTreeMap::new(),
            day: BTreeMap::new(),
            trends: TrendWindows::new(config.trend_window),
            anomalies: VecDeque::with_capacity(config.max_anomalies),
            minute_done: None,
            hour_done: None,
            day_done: None,
        };
        Ok(Self {
            config,
            state: Mutex::new(state),
            gc,
            events,
            ingested: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            forced_cleanups: AtomicU64::new(0),
            jobs: JobSlot::default(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    // ═══════════════════════════════════════════════════════════════════
    // Ingestion
    // ═══════════════════════════════════════════════════════════════════

    /// Record a value stamped with the current time.
    pub fn record(&self, name: &str, value: f64, tags: Option<BTreeMap<String, String>>) -> bool {
        let mut point = MetricPoint::new(name, value, now_millis());
        point.tags = tags;
        self.record_point(point)
    }

    /// Record a pre-stamped point. Non-finite values are rejected.
    ///
    /// Points should arrive in non-decreasing timestamp order; the minute
    /// rollup relies on it to scan only recent points.
    pub fn record_point(&self, point: MetricPoint) -> bool {
        if !point.value.is_finite() {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        {
            let mut state = self.state.lock();
            state.trends.push(&point.name, point.value);
            state.raw.push(point);
        }
        self.ingested.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_points_ingested(1);
        true
    }

    /// Record many points under one lock acquisition. Returns how many were
    /// accepted.
    pub fn record_batch(&self, points: Vec<MetricPoint>) -> usize {
        let total = points.len();
        let mut accepted = 0;
        {
            let mut state = self.state.lock();
            for point in points {
                if !point.value.is_finite() {
                    continue;
                }
                state.trends.push(&point.name, point.value);
                state.raw.push(point);
                accepted += 1;
            }
        }
        self.ingested.fetch_add(accepted as u64, Ordering::Relaxed);
        self.rejected
            .fetch_add((total - accepted) as u64, Ordering::Relaxed);
        crate::metrics::record_points_ingested(accepted);
        accepted
    }

    // ═══════════════════════════════════════════════════════════════════
    // Rollups
    // ═══════════════════════════════════════════════════════════════════

    /// Roll raw points into minute buckets for every complete minute.
    pub fn aggregate_minute(&self) -> usize {
        self.aggregate_minute_at(now_millis())
    }

    /// [`aggregate_minute`](Self::aggregate_minute) with an explicit clock.
    pub fn aggregate_minute_at(&self, now_ms: u64) -> usize {
        let start = std::time::Instant::now();
        let width = Resolution::Minute.width_ms();
        let end = window_start(now_ms, width);

        let created = {
            let mut state = self.state.lock();
            let since = state.minute_done.unwrap_or(0);
            if end <= since {
                return 0;
            }

            // (window, name) -> values
            let mut grouped: BTreeMap<u64, HashMap<String, Vec<f64>>> = BTreeMap::new();
            for point in state.raw.filter_by_time_range(since, end.saturating_sub(1)) {
                grouped
                    .entry(window_start(point.timestamp_ms, width))
                    .or_default()
                    .entry(point.name)
                    .or_default()
                    .push(point.value);
            }

            let mut created = Vec::new();
            for (ws, by_name) in grouped {
                let mut bucket = HashMap::with_capacity(by_name.len());
                for (name, values) in by_name {
                    if let Some(summary) = stats::summarize(&values) {
                        let trend = state.trends.trend(&name, self.config.trend_dead_band);
                        let metric = build(name.clone(), Resolution::Minute, ws, summary, trend);
                        bucket.insert(name, metric);
                    }
                }
                if !bucket.is_empty() && !state.minute.contains_key(&ws) {
                    created.push((ws, bucket.len()));
                    state.minute.insert(ws, bucket);
                }
            }
            state.minute_done = Some(end);
            enforce_cap(&mut state.minute, self.config.max_minute_buckets);
            created
        };

        self.finish_rollup(Resolution::Minute, &created, start.elapsed());
        created.len()
    }

    /// Combine minute buckets into hour buckets for every complete hour.
    pub fn aggregate_hour(&self) -> usize {
        self.aggregate_hour_at(now_millis())
    }

    pub fn aggregate_hour_at(&self, now_ms: u64) -> usize {
        self.rollup_at(Resolution::Hour, now_ms)
    }

    /// Combine hour buckets into day buckets for every complete day.
    pub fn aggregate_day(&self) -> usize {
        self.aggregate_day_at(now_millis())
    }

    pub fn aggregate_day_at(&self, now_ms: u64) -> usize {
        self.rollup_at(Resolution::Day, now_ms)
    }

    fn rollup_at(&self, target: Resolution, now_ms: u64) -> usize {
        let start = std::time::Instant::now();
        let width = target.width_ms();
        let end = window_start(now_ms, width);
        let (source_res, cap) = match target {
            Resolution::Hour => (Resolution::Minute, self.config.max_hour_buckets),
            Resolution::Day => (Resolution::Hour, self.config.max_day_buckets),
            Resolution::Minute => return self.aggregate_minute_at(now_ms),
        };

        let created = {
            let mut state = self.state.lock();
            let done = match target {
                Resolution::Hour => state.hour_done,
                _ => state.day_done,
            };
            let since = done.unwrap_or(0);
            // Only windows whose source buckets are all closed
            let source_done = match target {
                Resolution::Hour => state.minute_done,
                _ => state.hour_done,
            };
            let end = window_start(end.min(source_done.unwrap_or(0)), width);
            if end <= since {
                return 0;
            }

            let mut grouped: BTreeMap<u64, HashMap<String, Vec<Summary>>> = BTreeMap::new();
            for (_, bucket) in state.buckets(source_res).range(since..end) {
                for metric in bucket.values() {
                    grouped
                        .entry(window_start(metric.window_start_ms, width))
                        .or_default()
                        .entry(metric.name.clone())
                        .or_default()
                        .push(summary_of(metric));
                }
            }

            let mut created = Vec::new();
            for (ws, by_name) in grouped {
                let mut bucket = HashMap::with_capacity(by_name.len());
                for (name, children) in by_name {
                    if let Some(summary) = stats::combine(&children) {
                        let trend = state.trends.trend(&name, self.config.trend_dead_band);
                        bucket.insert(name.clone(), build(name, target, ws, summary, trend));
                    }
                }
                let targets = match target {
                    Resolution::Hour => &mut state.hour,
                    _ => &mut state.day,
                };
                if !bucket.is_empty() && !targets.contains_key(&ws) {
                    created.push((ws, bucket.len()));
                    targets.insert(ws, bucket);
                }
            }
            match target {
                Resolution::Hour => {
                    state.hour_done = Some(end);
                    enforce_cap(&mut state.hour, cap);
                }
                _ => {
                    state.day_done = Some(end);
                    enforce_cap(&mut state.day, cap);
                }
            }
            created
        };

        self.finish_rollup(target, &created, start.elapsed());
        created.len()
    }

    fn finish_rollup(&self, resolution: Resolution, created: &[(u64, usize)], elapsed: Duration) {
        let metrics: usize = created.iter().map(|(_, n)| n).sum();
        crate::metrics::record_rollup(resolution.as_str(), metrics, elapsed);
        crate::metrics::set_raw_buffer_points(self.state.lock().raw.len());
        for &(window_start_ms, metrics) in created {
            self.events.emit(GovernanceEvent::Aggregated {
                resolution,
                window_start_ms,
                metrics,
            });
        }
        if !created.is_empty() {
            debug!(resolution = %resolution, buckets = created.len(), metrics, "rollup complete");
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Anomalies and backpressure
    // ═══════════════════════════════════════════════════════════════════

    /// Check every metric with new samples against its baseline.
    ///
    /// The baseline is the metric's trend window minus the newest sample;
    /// its standard deviation is floored at 1.
    pub fn detect_anomalies(&self) -> Vec<Anomaly> {
        let now = now_millis();
        let found: Vec<Anomaly> = {
            let mut state = self.state.lock();
            let candidates = state.trends.take_unscanned(self.config.min_anomaly_samples);
            let found: Vec<Anomaly> = candidates
                .into_iter()
                .filter_map(|(name, latest, mean, std)| {
                    let deviation = (latest - mean).abs() / std.max(1.0);
                    (deviation > self.config.anomaly_threshold).then(|| Anomaly {
                        name,
                        value: latest,
                        baseline_mean: mean,
                        baseline_std_dev: std,
                        deviation,
                        severity: AnomalySeverity::from_deviation(deviation),
                        detected_at_ms: now,
                    })
                })
                .collect();
            for anomaly in &found {
                if state.anomalies.len() >= self.config.max_anomalies {
                    state.anomalies.pop_front();
                }
                state.anomalies.push_back(anomaly.clone());
            }
            found
        };

        for anomaly in &found {
            warn!(
                metric = %anomaly.name,
                value = anomaly.value,
                baseline = anomaly.baseline_mean,
                deviation = anomaly.deviation,
                severity = anomaly.severity.as_str(),
                "Metric anomaly detected"
            );
            crate::metrics::record_anomaly(anomaly.severity.as_str());
            self.events
                .emit(GovernanceEvent::AnomalyDetected(anomaly.clone()));
        }
        found
    }

    /// Estimated bytes held by the raw buffer.
    #[must_use]
    pub fn estimated_raw_bytes(&self) -> usize {
        self.state.lock().raw.len() * self.config.point_size_bytes
    }

    /// Run a forced cleanup if the raw buffer exceeds its share of the
    /// memory budget. Returns whether cleanup ran.
    pub fn check_backpressure(&self) -> bool {
        let estimate = self.estimated_raw_bytes();
        let limit = self.config.memory_budget_bytes as f64 * self.config.raw_memory_fraction;
        if (estimate as f64) <= limit {
            return false;
        }
        warn!(estimate, limit, "Raw metric buffer over budget, forcing cleanup");
        self.force_cleanup();
        true
    }

    /// Drop raw points already rolled into minute buckets, trim rollups and
    /// trend windows to their most recent entries, then request a
    /// collection. Producers are never blocked.
    pub fn force_cleanup(&self) {
        let dropped = {
            let mut state = self.state.lock();
            let rolled_up = state.minute_done.unwrap_or(0);
            let dropped = state.raw.drop_before(rolled_up);
            enforce_cap(&mut state.minute, CLEANUP_KEEP_BUCKETS);
            enforce_cap(&mut state.hour, CLEANUP_KEEP_BUCKETS);
            enforce_cap(&mut state.day, CLEANUP_KEEP_BUCKETS);
            state.trends.trim(CLEANUP_KEEP_TREND);
            crate::metrics::set_raw_buffer_points(state.raw.len());
            dropped
        };
        self.forced_cleanups.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_aggregator_cleanup();
        self.gc.request("aggregator");
        info!(raw_dropped = dropped, "Aggregator raw points, rollups and trend windows trimmed");
    }

    // ═══════════════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════════════

    fn aggregates(&self, resolution: Resolution, name: &str, count: usize) -> Vec<AggregatedMetric> {
        let state = self.state.lock();
        let mut out: Vec<AggregatedMetric> = state
            .buckets(resolution)
            .values()
            .rev()
            .filter_map(|bucket| bucket.get(name).cloned())
            .take(count)
            .collect();
        out.reverse();
        out
    }

    /// Up to `count` most recent minute summaries of `name`, oldest first.
    pub fn minute_aggregates(&self, name: &str, count: usize) -> Vec<AggregatedMetric> {
        self.aggregates(Resolution::Minute, name, count)
    }

    pub fn hour_aggregates(&self, name: &str, count: usize) -> Vec<AggregatedMetric> {
        self.aggregates(Resolution::Hour, name, count)
    }

    pub fn day_aggregates(&self, name: &str, count: usize) -> Vec<AggregatedMetric> {
        self.aggregates(Resolution::Day, name, count)
    }

    /// Anomalies detected at or after `since_ms` (all when `None`).
    pub fn anomalies(&self, since_ms: Option<u64>) -> Vec<Anomaly> {
        let since = since_ms.unwrap_or(0);
        self.state
            .lock()
            .anomalies
            .iter()
            .filter(|a| a.detected_at_ms >= since)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn trend(&self, name: &str) -> Trend {
        self.state
            .lock()
            .trends
            .trend(name, self.config.trend_dead_band)
    }

    /// Raw points for `name` within `[since_ms, until_ms]`.
    pub fn raw_points(&self, name: &str, since_ms: u64, until_ms: u64) -> Vec<MetricPoint> {
        let state = self.state.lock();
        let mut points = state.raw.filter_by_time_range(since_ms, until_ms);
        points.retain(|p| p.name == name);
        points
    }

    #[must_use]
    pub fn stats(&self) -> AggregatorStats {
        let state = self.state.lock();
        AggregatorStats {
            raw_points: state.raw.len(),
            raw_capacity: state.raw.capacity(),
            raw_overwrites: state.raw.overwrites(),
            estimated_raw_bytes: state.raw.len() * self.config.point_size_bytes,
            minute_buckets: state.minute.len(),
            hour_buckets: state.hour.len(),
            day_buckets: state.day.len(),
            tracked_metrics: state.trends.len(),
            anomalies: state.anomalies.len(),
            points_ingested: self.ingested.load(Ordering::Relaxed),
            points_rejected: self.rejected.load(Ordering::Relaxed),
            forced_cleanups: self.forced_cleanups.load(Ordering::Relaxed),
        }
    }

    #[must_use]
    pub fn prometheus(&self) -> String {
        let s = self.stats();
        let mut w = PromWriter::new();
        w.gauge(
            "resource_governor_aggregator_raw_points",
            "Points held in the raw buffer",
            s.raw_points as f64,
        )
        .gauge(
            "resource_governor_aggregator_raw_capacity",
            "Raw buffer capacity",
            s.raw_capacity as f64,
        )
        .counter(
            "resource_governor_aggregator_raw_overwrites_total",
            "Raw points overwritten before rollup",
            s.raw_overwrites as f64,
        )
        .gauge_vec(
            "resource_governor_aggregator_buckets",
            "Materialized rollup buckets",
            "resolution",
            &[
                ("minute", s.minute_buckets as f64),
                ("hour", s.hour_buckets as f64),
                ("day", s.day_buckets as f64),
            ],
        )
        .gauge(
            "resource_governor_aggregator_tracked_metrics",
            "Distinct metric names with a trend window",
            s.tracked_metrics as f64,
        )
        .gauge(
            "resource_governor_aggregator_anomalies",
            "Anomalies currently retained",
            s.anomalies as f64,
        )
        .counter(
            "resource_governor_aggregator_points_total",
            "Points accepted",
            s.points_ingested as f64,
        )
        .counter(
            "resource_governor_aggregator_rejected_total",
            "Points rejected as non-finite",
            s.points_rejected as f64,
        )
        .counter(
            "resource_governor_aggregator_forced_cleanups_total",
            "Backpressure cleanups",
            s.forced_cleanups as f64,
        );
        w.finish()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════

    /// Start rollup and anomaly jobs. Idempotent.
    pub fn start(self: &Arc<Self>) -> bool {
        let me: Weak<Self> = Arc::downgrade(self);
        let c = &self.config;
        let (minute, hour, day, scan) = (
            Duration::from_millis(c.minute_interval_ms),
            Duration::from_millis(c.hour_interval_ms),
            Duration::from_millis(c.day_interval_ms),
            Duration::from_millis(c.anomaly_interval_ms),
        );
        self.jobs.start("aggregator", |jobs| {
            let w = me.clone();
            jobs.every("minute_rollup", minute, move || {
                if let Some(agg) = w.upgrade() {
                    let _t = crate::time_job!("minute_rollup");
                    agg.aggregate_minute();
                }
            });
            let w = me.clone();
            jobs.every("hour_rollup", hour, move || {
                if let Some(agg) = w.upgrade() {
                    let _t = crate::time_job!("hour_rollup");
                    agg.aggregate_hour();
                }
            });
            let w = me.clone();
            jobs.every("day_rollup", day, move || {
                if let Some(agg) = w.upgrade() {
                    let _t = crate::time_job!("day_rollup");
                    agg.aggregate_day();
                }
            });
            let w = me;
            jobs.every("anomaly_scan", scan, move || {
                if let Some(agg) = w.upgrade() {
                    let _t = crate::time_job!("anomaly_scan");
                    agg.detect_anomalies();
                    agg.check_backpressure();
                }
            });
        })
    }

    pub fn stop(&self) -> bool {
        self.jobs.stop()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.jobs.is_running()
    }
}

fn build(
    name: String,
    resolution: Resolution,
    window_start_ms: u64,
    s: Summary,
    trend: Trend,
) -> AggregatedMetric {
    AggregatedMetric {
        name,
        resolution,
        window_start_ms,
        count: s.count,
        sum: s.sum,
        avg: s.avg,
        min: s.min,
        max: s.max,
        p50: s.p50,
        p90: s.p90,
        p95: s.p95,
        p99: s.p99,
        std_dev: s.std_dev,
        trend,
    }
}

fn summary_of(m: &AggregatedMetric) -> Summary {
    Summary {
        count: m.count,
        sum: m.sum,
        avg: m.avg,
        min: m.min,
        max: m.max,
        p50: m.p50,
        p90: m.p90,
        p95: m.p95,
        p99: m.p99,
        std_dev: m.std_dev,
    }
}

/// Drop the oldest buckets beyond `cap`.
fn enforce_cap(buckets: &mut Buckets, cap: usize) {
    while buckets.len() > cap {
        if buckets.pop_first().is_none() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{DAY_MS, HOUR_MS, MINUTE_MS};
    use crate::resource::NoopCollector;

    fn aggregator(config: AggregatorConfig) -> MetricsAggregator {
        let events = EventBus::default();
        let gc = Arc::new(GcCoordinator::new(
            Arc::new(NoopCollector),
            Duration::ZERO,
            events.clone(),
        ));
        MetricsAggregator::new(config, gc, events).unwrap()
    }

    fn point(name: &str, value: f64, ts: u64) -> MetricPoint {
        MetricPoint::new(name, value, ts)
    }

    #[test]
    fn test_minute_rollup_groups_by_window_and_name() {
        let agg = aggregator(AggregatorConfig::default());
        agg.record_batch(vec![
            point("cpu", 1.0, 1_000),
            point("cpu", 3.0, 2_000),
            point("mem", 50.0, 3_000),
            point("cpu", 10.0, MINUTE_MS + 5),
        ]);

        // Only the first minute is complete.
        assert_eq!(agg.aggregate_minute_at(MINUTE_MS + 10), 1);
        let cpu = agg.minute_aggregates("cpu", 10);
        assert_eq!(cpu.len(), 1);
        assert_eq!(cpu[0].count, 2);
        assert_eq!(cpu[0].avg, 2.0);
        assert_eq!(cpu[0].window_start_ms, 0);
        assert_eq!(agg.minute_aggregates("mem", 10)[0].max, 50.0);

        // Re-running for the same clock produces nothing new.
        assert_eq!(agg.aggregate_minute_at(MINUTE_MS + 10), 0);

        assert_eq!(agg.aggregate_minute_at(2 * MINUTE_MS), 1);
        let cpu = agg.minute_aggregates("cpu", 10);
        assert_eq!(cpu.len(), 2);
        assert_eq!(cpu[1].sum, 10.0);
    }

    #[test]
    fn test_hour_rollup_reads_minute_buckets() {
        let agg = aggregator(AggregatorConfig::default());
        for m in 0..3u64 {
            agg.record_batch(vec![
                point("lat", (m + 1) as f64, m * MINUTE_MS),
                point("lat", (m + 1) as f64 * 10.0, m * MINUTE_MS + 1),
            ]);
        }
        agg.aggregate_minute_at(HOUR_MS);
        assert_eq!(agg.aggregate_hour_at(HOUR_MS), 1);

        let hour = agg.hour_aggregates("lat", 1);
        assert_eq!(hour.len(), 1);
        assert_eq!(hour[0].count, 6);
        assert_eq!(hour[0].sum, 66.0);
        assert_eq!(hour[0].min, 1.0);
        assert_eq!(hour[0].max, 30.0);
        assert_eq!(hour[0].resolution, Resolution::Hour);
    }

    #[test]
    fn test_bucket_cap_drops_oldest() {
        let agg = aggregator(AggregatorConfig {
            max_minute_buckets: 3,
            ..Default::default()
        });
        for m in 0..6u64 {
            agg.record_point(point("x", 1.0, m * MINUTE_MS));
        }
        agg.aggregate_minute_at(6 * MINUTE_MS);
        let kept = agg.minute_aggregates("x", 10);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].window_start_ms, 3 * MINUTE_MS);
    }

    #[test]
    fn test_anomaly_on_spike() {
        let agg = aggregator(AggregatorConfig::default());
        for i in 0..20 {
            let jitter = if i % 2 == 0 { 0.1 } else { -0.1 };
            agg.record_point(point("tps", 10.0 + jitter, i));
        }
        assert!(agg.detect_anomalies().is_empty());

        agg.record_point(point("tps", 100.0, 20));
        let found = agg.detect_anomalies();
        assert_eq!(found.len(), 1);
        assert!(found[0].severity >= AnomalySeverity::High);
        assert_eq!(agg.anomalies(None).len(), 1);
    }

    #[test]
    fn test_anomaly_needs_min_samples() {
        let agg = aggregator(AggregatorConfig::default());
        for i in 0..5 {
            agg.record_point(point("x", 1.0, i));
        }
        agg.record_point(point("x", 1_000.0, 5));
        assert!(agg.detect_anomalies().is_empty());
    }

    #[test]
    fn test_anomaly_list_is_capped() {
        let agg = aggregator(AggregatorConfig {
            max_anomalies: 2,
            ..Default::default()
        });
        for round in 0..4u64 {
            let name = format!("m{round}");
            for i in 0..10 {
                agg.record_point(point(&name, 1.0, i));
            }
            agg.record_point(point(&name, 500.0, 10));
            agg.detect_anomalies();
        }
        let kept = agg.anomalies(None);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[1].name, "m3");
    }

    #[test]
    fn test_non_finite_rejected() {
        let agg = aggregator(AggregatorConfig::default());
        assert!(!agg.record("x", f64::NAN, None));
        assert_eq!(agg.record_batch(vec![point("x", f64::INFINITY, 0), point("x", 1.0, 0)]), 1);
        assert_eq!(agg.stats().points_rejected, 2);
    }

    #[test]
    fn test_backpressure_trims_and_requests_collection() {
        let agg = aggregator(AggregatorConfig {
            memory_budget_bytes: 1000,
            raw_memory_fraction: 0.5,
            point_size_bytes: 100,
            ..Default::default()
        });
        for i in 0..5 {
            agg.record_point(point("x", 1.0, i));
        }
        assert!(!agg.check_backpressure());
        agg.record_point(point("x", 1.0, 5));
        assert!(agg.check_backpressure());
        assert_eq!(agg.stats().forced_cleanups, 1);
        assert_eq!(agg.gc.stats().requested, 1);
    }

    #[test]
    fn test_hour_rollup_waits_for_closing_minute() {
        let agg = aggregator(AggregatorConfig::default());
        agg.record_point(point("x", 1.0, 58 * MINUTE_MS));
        agg.aggregate_minute_at(59 * MINUTE_MS + 30_000);
        agg.record_point(point("x", 100.0, 59 * MINUTE_MS));

        // Hour job fires before the minute job closes minute 59
        let now = HOUR_MS + 30_000;
        assert_eq!(agg.aggregate_hour_at(now), 0);
        assert_eq!(agg.aggregate_minute_at(now), 1);
        assert_eq!(agg.aggregate_hour_at(now), 1);

        let hour = agg.hour_aggregates("x", 1);
        assert_eq!(hour[0].count, 2);
        assert_eq!(hour[0].max, 100.0);
    }

    #[test]
    fn test_day_rollup_waits_for_hours() {
        let agg = aggregator(AggregatorConfig::default());
        agg.record_point(point("x", 5.0, 23 * HOUR_MS));
        agg.aggregate_minute_at(DAY_MS);
        assert_eq!(agg.aggregate_day_at(DAY_MS), 0);
        assert_eq!(agg.aggregate_hour_at(DAY_MS), 1);
        assert_eq!(agg.aggregate_day_at(DAY_MS), 1);
        assert_eq!(agg.day_aggregates("x", 1)[0].count, 1);
    }

    #[test]
    fn test_backpressure_drops_rolled_up_raw_points() {
        let agg = aggregator(AggregatorConfig {
            memory_budget_bytes: 1000,
            raw_memory_fraction: 0.5,
            point_size_bytes: 100,
            ..Default::default()
        });
        for i in 0..5 {
            agg.record_point(point("x", 1.0, i));
        }
        agg.aggregate_minute_at(MINUTE_MS);
        agg.record_point(point("x", 2.0, MINUTE_MS + 1));

        assert!(agg.check_backpressure());
        assert_eq!(agg.stats().raw_points, 1);
        assert_eq!(agg.minute_aggregates("x", 1)[0].count, 5);
        assert!(!agg.check_backpressure());
        assert_eq!(agg.stats().forced_cleanups, 1);
    }

    #[test]
    fn test_trend_query() {
        let agg = aggregator(AggregatorConfig::default());
        for i in 0..30 {
            agg.record_point(point("grow", i as f64 + 1.0, i));
        }
        assert_eq!(agg.trend("grow"), Trend::Up);
        assert_eq!(agg.trend("missing"), Trend::Stable);
    }

    #[test]
    fn test_prometheus_block() {
        let agg = aggregator(AggregatorConfig::default());
        agg.record("x", 1.0, None);
        let text = agg.prometheus();
        assert!(text.contains("resource_governor_aggregator_points_total 1"));
        assert!(text.contains("resource_governor_aggregator_buckets{resolution=\"minute\"} 0"));
    }
}
