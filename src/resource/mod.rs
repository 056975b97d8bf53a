// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Process-level memory management.
//!
//! # Cleanup cascade
//!
//! ```text
//!   sample ──► usage ratio ──► level (effective thresholds)
//!                                 │
//!     Warning   ─► soft:       hooks, one collection
//!     Critical  ─► aggressive: evict a fraction of the block cache,
//!                              release pools, collect now and once more later
//!     Emergency ─► emergency:  clear the block cache, trim rollups,
//!                              release pools, staggered collections,
//!                              recovery check after a delay
//! ```
//!
//! The GC threshold is adaptive: when the heap grows fast the effective
//! threshold drops so collection starts earlier.

mod collector;
mod pool;
mod sampler;
mod snapshot;
mod types;

pub use collector::{Collector, GcCoordinator, GcOutcome, GcStats, NoopCollector, TrimCollector};
pub use pool::{BufferPool, ObjectPool, PoolStats, Poolable, Releasable};
pub use sampler::{ProcessSampler, ResourceSample, ResourceSampler, ScriptedSampler};
pub use snapshot::{HeapSnapshot, Snapshotter};
pub use types::{
    CleanupReport, CleanupStats, HealthReport, MemoryEventRecord, MemorySnapshot,
    ResourceMetrics, SlaReport, TrendAnalysis,
};

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::aggregator::{stats::mean_std, MetricsAggregator};
use crate::cache::BlockCache;
use crate::clock::{now_millis, MINUTE_MS};
use crate::config::ResourceConfig;
use crate::error::ConfigError;
use crate::events::{EventBus, GovernanceEvent};
use crate::pressure::{CleanupKind, LevelThresholds, MemoryLevel};
use crate::prometheus::PromWriter;
use crate::scheduler::JobSlot;
use types::SlaCounters;

const MB: f64 = 1024.0 * 1024.0;

type CleanupHook = Box<dyn Fn(CleanupKind) + Send + Sync>;
type EmergencyHook = Box<dyn Fn() + Send + Sync>;

struct ManagerState {
    /// Recent snapshots, oldest first
    history: VecDeque<MemorySnapshot>,
    level: MemoryLevel,
    samples: u64,
    /// Level and time of the last alert raised
    last_alert: Option<(MemoryLevel, Instant)>,
    consecutive_critical: u32,
    sla: SlaCounters,
    events: VecDeque<MemoryEventRecord>,
    cleanup: CleanupStats,
}

impl ManagerState {
    fn push_event(&mut self, record: MemoryEventRecord, cap: usize) {
        if self.events.len() >= cap {
            self.events.pop_front();
        }
        self.events.push_back(record);
    }
}

/// Samples process memory and escalates cleanup as usage rises.
pub struct ResourceManager {
    config: ResourceConfig,
    sampler: Arc<dyn ResourceSampler>,
    gc: Arc<GcCoordinator>,
    block_cache: Option<Arc<BlockCache>>,
    aggregator: Option<Arc<MetricsAggregator>>,
    buffers: Arc<BufferPool>,
    pools: RwLock<Vec<Arc<dyn Releasable>>>,
    cleanup_hooks: RwLock<Vec<(&'static str, CleanupHook)>>,
    emergency_hooks: RwLock<Vec<(&'static str, EmergencyHook)>>,
    snapshotter: Option<Snapshotter>,
    state: Arc<Mutex<ManagerState>>,
    events: EventBus,
    started_at: Instant,
    jobs: JobSlot,
}

impl ResourceManager {
    /// Build a manager. Thresholds must satisfy `gc < critical < emergency`.
    pub fn new(
        config: ResourceConfig,
        sampler: Arc<dyn ResourceSampler>,
        gc: Arc<GcCoordinator>,
        events: EventBus,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let snapshotter = config.snapshot_dir.as_ref().map(|dir| {
            Snapshotter::new(
                dir.clone(),
                Duration::from_millis(config.snapshot_min_interval_ms),
                config.max_snapshots,
            )
        });
        let buffers = Arc::new(BufferPool::new(
            "buffers",
            config.pool_max_size,
            config.buffer_capacity,
        ));
        Ok(Self {
            sampler,
            gc,
            block_cache: None,
            aggregator: None,
            pools: RwLock::new(vec![buffers.clone() as Arc<dyn Releasable>]),
            buffers,
            cleanup_hooks: RwLock::new(Vec::new()),
            emergency_hooks: RwLock::new(Vec::new()),
            snapshotter,
            state: Arc::new(Mutex::new(ManagerState {
                history: VecDeque::with_capacity(config.history_size),
                level: MemoryLevel::Healthy,
                samples: 0,
                last_alert: None,
                consecutive_critical: 0,
                sla: SlaCounters::default(),
                events: VecDeque::new(),
                cleanup: CleanupStats::default(),
            })),
            config,
            events,
            started_at: Instant::now(),
            jobs: JobSlot::default(),
        })
    }

    /// Evict from this cache under pressure.
    #[must_use]
    pub fn with_block_cache(mut self, cache: Arc<BlockCache>) -> Self {
        self.block_cache = Some(cache);
        self
    }

    /// Trim this aggregator's rollups in an emergency.
    #[must_use]
    pub fn with_aggregator(mut self, aggregator: Arc<MetricsAggregator>) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    #[must_use]
    pub fn config(&self) -> &ResourceConfig {
        &self.config
    }

    #[must_use]
    pub fn gc(&self) -> &Arc<GcCoordinator> {
        &self.gc
    }

    /// Shared byte-buffer pool released under pressure.
    #[must_use]
    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.buffers
    }

    /// Add a pool to release during critical and emergency cleanup.
    pub fn register_pool(&self, pool: Arc<dyn Releasable>) {
        self.pools.write().push(pool);
    }

    /// Run `hook` during every cleanup. A panicking hook is logged and skipped.
    pub fn register_cleanup_hook(
        &self,
        name: &'static str,
        hook: impl Fn(CleanupKind) + Send + Sync + 'static,
    ) {
        self.cleanup_hooks.write().push((name, Box::new(hook)));
    }

    /// Run `hook` during emergency cleanup only.
    pub fn register_emergency_hook(&self, name: &'static str, hook: impl Fn() + Send + Sync + 'static) {
        self.emergency_hooks.write().push((name, Box::new(hook)));
    }

    fn thresholds(&self, effective_gc: f64) -> LevelThresholds {
        LevelThresholds {
            gc: effective_gc,
            critical: self.config.critical_threshold,
            emergency: self.config.emergency_threshold,
        }
    }

    /// GC threshold lowered according to the heap growth rate.
    #[must_use]
    pub fn effective_gc_threshold(&self, growth_mb_per_min: f64) -> f64 {
        let c = &self.config;
        if !c.adaptive_thresholds {
            return c.gc_threshold;
        }
        let reduction = if growth_mb_per_min > c.fast_growth_mb_per_min {
            c.fast_growth_reduction
        } else if growth_mb_per_min > c.moderate_growth_mb_per_min {
            c.moderate_growth_reduction
        } else {
            0.0
        };
        (c.gc_threshold - reduction).max(0.0)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Monitor tick
    // ═══════════════════════════════════════════════════════════════════

    /// Sample memory, classify it and run the matching cleanup.
    pub fn check_memory(&self) -> MemorySnapshot {
        self.check_memory_at(now_millis())
    }

    /// [`check_memory`](Self::check_memory) with an explicit clock.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn check_memory_at(&self, now_ms: u64) -> MemorySnapshot {
        let sample = self.sampler.sample();
        let max_mb = self.config.max_heap_mb as f64;
        let heap_used_mb = sample.used_mb();
        let usage_ratio = sample.used_bytes as f64 / self.config.max_heap_bytes() as f64;

        let (snapshot, previous, consecutive) = {
            let mut state = self.state.lock();
            let window = self.config.growth_window;
            let mut points: Vec<(u64, f64)> = state
                .history
                .iter()
                .rev()
                .take(window - 1)
                .map(|s| (s.at_ms, s.heap_used_mb))
                .collect();
            points.reverse();
            points.push((now_ms, heap_used_mb));
            let growth = growth_rate(&points);

            let effective = self.effective_gc_threshold(growth);
            let level = MemoryLevel::classify(usage_ratio, &self.thresholds(effective));
            state.samples += 1;
            let snapshot = MemorySnapshot {
                seq: state.samples,
                at_ms: now_ms,
                sample,
                heap_used_mb,
                heap_total_mb: sample.total_mb(),
                rss_mb: sample.rss_mb(),
                usage_ratio,
                level,
                effective_gc_threshold: effective,
                growth_rate_mb_per_min: growth,
            };

            if state.history.len() >= self.config.history_size {
                state.history.pop_front();
            }
            state.history.push_back(snapshot);
            let previous = std::mem::replace(&mut state.level, level);
            state.sla.record(level, self.config.check_interval_ms);
            if level.is_critical_or_worse() {
                state.consecutive_critical += 1;
            } else {
                state.consecutive_critical = 0;
            }
            (snapshot, previous, state.consecutive_critical)
        };

        crate::metrics::set_process_memory(sample.used_bytes, sample.total_bytes, sample.rss_bytes);
        crate::metrics::set_memory_usage_ratio(usage_ratio);
        crate::metrics::set_memory_level(snapshot.level as u8);
        crate::metrics::set_effective_gc_threshold(snapshot.effective_gc_threshold);
        crate::metrics::set_growth_rate(snapshot.growth_rate_mb_per_min);

        let level = snapshot.level;
        if level != previous {
            debug!(from = %previous, to = %level, ratio = usage_ratio, "memory level changed");
        }
        if previous != MemoryLevel::Healthy && level == MemoryLevel::Healthy {
            info!(from = %previous, ratio = usage_ratio, "Memory recovered");
            self.record_event(&snapshot, "recovery", format!("Recovered from {previous} level"), None);
            self.events.emit(GovernanceEvent::MemoryRecovered {
                from: previous,
                ratio: usage_ratio,
            });
        }

        let persistent = self.config.persistent_critical_samples;
        if consecutive > 0 && consecutive % persistent == 0 {
            let growth = snapshot.growth_rate_mb_per_min;
            let time_to_oom_min = (growth > 0.0).then(|| (max_mb - heap_used_mb).max(0.0) / growth);
            error!(
                consecutive,
                ratio = usage_ratio,
                growth_mb_per_min = growth,
                time_to_oom_min,
                "Memory persistently critical"
            );
            self.record_event(
                &snapshot,
                "persistent_critical",
                format!("{consecutive} consecutive critical samples"),
                None,
            );
            self.events.emit(GovernanceEvent::PersistentCritical {
                consecutive,
                time_to_oom_min,
            });
            self.capture_snapshot("persistent_critical");
        }

        match level {
            MemoryLevel::Healthy => {}
            MemoryLevel::Warning => {
                self.record_event(&snapshot, "warning", level.description().to_string(), None);
                if self.alert_due(level) {
                    warn!(ratio = usage_ratio, heap_used_mb, max_heap_mb = max_mb, "Memory warning");
                    self.events.emit(GovernanceEvent::MemoryWarning {
                        heap_used_mb,
                        ratio: usage_ratio,
                    });
                }
                self.run_cleanup(CleanupKind::Soft, "warning", heap_used_mb);
            }
            MemoryLevel::Critical => {
                self.record_event(&snapshot, "critical", level.description().to_string(), None);
                if self.alert_due(level) {
                    error!(ratio = usage_ratio, heap_used_mb, max_heap_mb = max_mb, "Memory critical");
                    self.events.emit(GovernanceEvent::MemoryCritical {
                        heap_used_mb,
                        ratio: usage_ratio,
                    });
                }
                self.run_cleanup(CleanupKind::Aggressive, "critical", heap_used_mb);
                self.capture_snapshot("critical");
            }
            MemoryLevel::Emergency => {
                self.record_event(&snapshot, "emergency", level.description().to_string(), None);
                if self.alert_due(level) {
                    error!(ratio = usage_ratio, heap_used_mb, max_heap_mb = max_mb, "Memory emergency");
                    self.events.emit(GovernanceEvent::MemoryEmergency {
                        heap_used_mb,
                        ratio: usage_ratio,
                    });
                }
                self.capture_snapshot("emergency");
                self.run_cleanup(CleanupKind::Emergency, "emergency", heap_used_mb);
            }
        }
        snapshot
    }

    /// Whether an alert for `level` may be raised now. A repeat of the last
    /// alerted level inside `alert_cooldown_ms` is suppressed; any other
    /// level always alerts.
    fn alert_due(&self, level: MemoryLevel) -> bool {
        let cooldown = Duration::from_millis(self.config.alert_cooldown_ms);
        let now = Instant::now();
        let mut state = self.state.lock();
        match state.last_alert {
            Some((prev, at)) if prev == level && now.saturating_duration_since(at) < cooldown => {
                debug!(level = %level, "alert suppressed by cooldown");
                false
            }
            _ => {
                state.last_alert = Some((level, now));
                true
            }
        }
    }

    /// Run a cleanup of the given kind on demand.
    #[tracing::instrument(skip(self))]
    pub fn force_cleanup(&self, kind: CleanupKind) -> CleanupReport {
        let heap_used_mb = self.last_snapshot().map_or(0.0, |s| s.heap_used_mb);
        self.run_cleanup(kind, "manual", heap_used_mb)
    }

    fn run_cleanup(&self, kind: CleanupKind, source: &'static str, heap_used_mb: f64) -> CleanupReport {
        let start = std::time::Instant::now();
        let cache_before = self.block_cache.as_ref().map_or(0, |c| c.size_bytes());
        let mut evicted_blocks = 0;
        let mut released_pooled = 0;
        let mut gc_requests = 0u64;

        match kind {
            CleanupKind::Soft => {
                self.run_cleanup_hooks(kind);
                self.gc.request(source);
                gc_requests += 1;
            }
            CleanupKind::Aggressive => {
                if let Some(cache) = &self.block_cache {
                    evicted_blocks = cache.evict_fraction(self.config.critical_evict_fraction).entries;
                }
                released_pooled = self.release_pools();
                self.run_cleanup_hooks(kind);
                self.gc.request(source);
                gc_requests += 1;
                if self.spawn_delayed_gc(self.config.delayed_gc_ms, source) {
                    gc_requests += 1;
                }
            }
            CleanupKind::Emergency => {
                if let Some(cache) = &self.block_cache {
                    evicted_blocks = cache.clear();
                }
                if let Some(aggregator) = &self.aggregator {
                    aggregator.force_cleanup();
                }
                released_pooled = self.release_pools();
                self.run_cleanup_hooks(kind);
                self.run_emergency_hooks();
                for &delay in &self.config.emergency_gc_delays_ms {
                    if delay == 0 {
                        self.gc.request(source);
                        gc_requests += 1;
                    } else if self.spawn_delayed_gc(delay, source) {
                        gc_requests += 1;
                    }
                }
                self.spawn_recovery_check(heap_used_mb);
            }
        }

        let cache_after = self.block_cache.as_ref().map_or(0, |c| c.size_bytes());
        let freed_mb = cache_before.saturating_sub(cache_after) as f64 / MB;
        let elapsed = start.elapsed();
        let duration_ms = elapsed.as_millis() as u64;
        let now = now_millis();
        {
            let mut state = self.state.lock();
            state.cleanup.record(kind, freed_mb, duration_ms, now);
            state.cleanup.gc_requests += gc_requests;
            let level = state.level;
            let ratio = state.history.back().map_or(0.0, |s| s.usage_ratio);
            state.push_event(
                MemoryEventRecord {
                    at_ms: now,
                    kind: "cleanup",
                    level,
                    message: format!("{kind} cleanup completed"),
                    heap_used_mb,
                    ratio,
                    freed_mb: Some(freed_mb),
                },
                self.config.history_size,
            );
        }
        crate::metrics::record_cleanup(kind.as_str(), elapsed);
        info!(
            kind = %kind,
            freed_mb,
            evicted_blocks,
            released_pooled,
            duration_ms,
            "Cleanup completed"
        );
        self.events.emit(GovernanceEvent::CleanupCompleted {
            kind,
            freed_mb,
            duration_ms,
        });
        CleanupReport {
            kind,
            freed_mb,
            duration_ms,
            evicted_blocks,
            released_pooled,
        }
    }

    fn release_pools(&self) -> usize {
        self.pools.read().iter().map(|p| p.release_all()).sum()
    }

    fn run_cleanup_hooks(&self, kind: CleanupKind) {
        for (name, hook) in self.cleanup_hooks.read().iter() {
            if catch_unwind(AssertUnwindSafe(|| hook(kind))).is_err() {
                error!(hook = name, kind = %kind, "cleanup hook panicked");
            }
        }
    }

    fn run_emergency_hooks(&self) {
        for (name, hook) in self.emergency_hooks.read().iter() {
            if catch_unwind(AssertUnwindSafe(|| hook())).is_err() {
                error!(hook = name, "emergency hook panicked");
            }
        }
    }

    /// Request a collection after `delay_ms`. Needs a tokio runtime.
    fn spawn_delayed_gc(&self, delay_ms: u64, source: &'static str) -> bool {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return false;
        };
        let gc = Arc::clone(&self.gc);
        handle.spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            gc.request(source);
        });
        true
    }

    /// Re-sample after the recovery delay and report whether the emergency
    /// cleared.
    fn spawn_recovery_check(&self, before_mb: f64) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let sampler = Arc::clone(&self.sampler);
        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        let delay = Duration::from_millis(self.config.recovery_check_ms);
        let max_bytes = self.config.max_heap_bytes() as f64;
        let emergency = self.config.emergency_threshold;
        let history_size = self.config.history_size;

        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let after = sampler.sample();
            let ratio = after.used_bytes as f64 / max_bytes;
            let freed_mb = before_mb - after.used_mb();
            let recovered = ratio <= emergency;
            if recovered {
                info!(freed_mb, ratio, "Emergency cleanup recovered memory");
            } else {
                error!(freed_mb, ratio, "Memory still at emergency level after cleanup");
            }
            {
                let mut state = state.lock();
                if recovered {
                    state.consecutive_critical = 0;
                }
                let level = state.level;
                state.push_event(
                    MemoryEventRecord {
                        at_ms: now_millis(),
                        kind: if recovered { "recovery" } else { "emergency" },
                        level,
                        message: if recovered {
                            format!("Emergency cleanup freed {freed_mb:.1}MB")
                        } else {
                            "Emergency cleanup failed to reduce memory".to_string()
                        },
                        heap_used_mb: after.used_mb(),
                        ratio,
                        freed_mb: Some(freed_mb),
                    },
                    history_size,
                );
            }
            events.emit(GovernanceEvent::EmergencyRecovery {
                recovered,
                freed_mb,
                ratio,
            });
        });
    }

    fn record_event(
        &self,
        snapshot: &MemorySnapshot,
        kind: &'static str,
        message: String,
        freed_mb: Option<f64>,
    ) {
        self.state.lock().push_event(
            MemoryEventRecord {
                at_ms: snapshot.at_ms,
                kind,
                level: snapshot.level,
                message,
                heap_used_mb: snapshot.heap_used_mb,
                ratio: snapshot.usage_ratio,
                freed_mb,
            },
            self.config.history_size,
        );
    }

    /// Write a heap snapshot if a directory is configured and the rate limit
    /// allows. IO failures are logged and swallowed.
    pub fn capture_snapshot(&self, reason: &str) -> Option<PathBuf> {
        let snapshotter = self.snapshotter.as_ref()?;
        let snapshot = {
            let state = self.state.lock();
            let latest = state.history.back().copied();
            let window = self.config.trend_window_size;
            let skip = state.history.len().saturating_sub(window);
            HeapSnapshot {
                captured_at_ms: now_millis(),
                reason: reason.to_string(),
                level: state.level,
                usage_ratio: latest.map_or(0.0, |s| s.usage_ratio),
                sample: latest.map(|s| s.sample).unwrap_or_default(),
                growth_history_mb: state.history.iter().skip(skip).map(|s| s.heap_used_mb).collect(),
                growth_rate_mb_per_min: latest.map_or(0.0, |s| s.growth_rate_mb_per_min),
                total_checks: state.sla.total,
                gc_requests: state.cleanup.gc_requests,
                cleanups: state.cleanup.total(),
                total_freed_mb: state.cleanup.total_freed_mb,
            }
        };
        match snapshotter.capture(&snapshot) {
            Ok(Some(path)) => {
                crate::metrics::record_snapshot(true);
                info!(path = %path.display(), reason, "Heap snapshot captured");
                self.events
                    .emit(GovernanceEvent::SnapshotCaptured { path: path.clone() });
                Some(path)
            }
            Ok(None) => None,
            Err(e) => {
                crate::metrics::record_snapshot(false);
                warn!(error = %e, reason, "Heap snapshot failed");
                None
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Reporting
    // ═══════════════════════════════════════════════════════════════════

    #[must_use]
    pub fn last_snapshot(&self) -> Option<MemorySnapshot> {
        self.state.lock().history.back().copied()
    }

    #[must_use]
    pub fn level(&self) -> MemoryLevel {
        self.state.lock().level
    }

    #[must_use]
    pub fn consecutive_critical(&self) -> u32 {
        self.state.lock().consecutive_critical
    }

    /// Up to `limit` most recent event records, oldest first.
    pub fn event_history(&self, limit: usize) -> Vec<MemoryEventRecord> {
        let state = self.state.lock();
        let skip = state.events.len().saturating_sub(limit);
        state.events.iter().skip(skip).cloned().collect()
    }

    #[must_use]
    pub fn cleanup_stats(&self) -> CleanupStats {
        self.state.lock().cleanup.clone()
    }

    /// Heap statistics over the last `trend_window_size` samples.
    #[must_use]
    pub fn trend_analysis(&self) -> TrendAnalysis {
        let state = self.state.lock();
        let skip = state.history.len().saturating_sub(self.config.trend_window_size);
        let recent: Vec<&MemorySnapshot> = state.history.iter().skip(skip).collect();
        let (Some(first), Some(last)) = (recent.first(), recent.last()) else {
            return TrendAnalysis::default();
        };
        if recent.len() < 2 {
            return TrendAnalysis {
                samples: 1,
                avg_heap_mb: last.heap_used_mb,
                max_heap_mb: last.heap_used_mb,
                min_heap_mb: last.heap_used_mb,
                ..Default::default()
            };
        }

        let heap: Vec<f64> = recent.iter().map(|s| s.heap_used_mb).collect();
        let (avg, volatility) = mean_std(&heap);
        let growth = growth_rate(&[
            (first.at_ms, first.heap_used_mb),
            (last.at_ms, last.heap_used_mb),
        ]);
        let threshold_mb = self.config.max_heap_mb as f64 * last.effective_gc_threshold;
        let remaining = threshold_mb - last.heap_used_mb;
        TrendAnalysis {
            samples: recent.len(),
            avg_heap_mb: avg,
            max_heap_mb: heap.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            min_heap_mb: heap.iter().copied().fold(f64::INFINITY, f64::min),
            growth_rate_mb_per_min: growth,
            minutes_to_gc_threshold: (growth > 0.0 && remaining > 0.0).then(|| remaining / growth),
            volatility_mb: volatility,
        }
    }

    /// Healthy-uptime accounting against `sla_target_uptime`.
    #[must_use]
    pub fn sla_report(&self) -> SlaReport {
        let sla = self.state.lock().sla;
        let uptime_ms = self.started_at.elapsed().as_millis() as u64;
        let uptime_percent = if uptime_ms > 0 {
            uptime_ms.saturating_sub(sla.downtime_ms) as f64 / uptime_ms as f64 * 100.0
        } else {
            100.0
        };
        let healthy_percent = if sla.total > 0 {
            sla.healthy as f64 / sla.total as f64 * 100.0
        } else {
            100.0
        };
        SlaReport {
            total_checks: sla.total,
            healthy_checks: sla.healthy,
            warning_checks: sla.warning,
            critical_checks: sla.critical,
            emergency_checks: sla.emergency,
            uptime_ms,
            downtime_ms: sla.downtime_ms,
            uptime_percent,
            healthy_percent,
            target_uptime_percent: self.config.sla_target_uptime,
            meets_target: uptime_percent >= self.config.sla_target_uptime,
        }
    }

    #[must_use]
    pub fn metrics(&self) -> ResourceMetrics {
        let (snapshot, consecutive_critical, cleanup) = {
            let state = self.state.lock();
            (
                state.history.back().copied(),
                state.consecutive_critical,
                state.cleanup.clone(),
            )
        };
        ResourceMetrics {
            snapshot,
            consecutive_critical,
            max_heap_mb: self.config.max_heap_mb,
            cleanup,
            gc: self.gc.stats(),
            sla: self.sla_report(),
            trend: self.trend_analysis(),
            pools: self
                .pools
                .read()
                .iter()
                .map(|p| (p.name(), p.pool_stats()))
                .collect(),
            block_cache: self.block_cache.as_ref().map(|c| c.stats()),
            aggregator: self.aggregator.as_ref().map(|a| a.stats()),
        }
    }

    /// Current level with advice for operators.
    #[must_use]
    pub fn health_status(&self) -> HealthReport {
        let snapshot = self.last_snapshot();
        let level = snapshot.map_or(MemoryLevel::Healthy, |s| s.level);
        let usage_percent = snapshot.map_or(0.0, |s| s.usage_percent());
        let growth = snapshot.map_or(0.0, |s| s.growth_rate_mb_per_min);
        let consecutive = self.consecutive_critical();
        let mut recommendations = Vec::new();

        match level {
            MemoryLevel::Emergency => recommendations.push(format!(
                "Memory at {usage_percent:.1}% of {} MB: emergency cleanup active, shed load or raise max_heap_mb",
                self.config.max_heap_mb
            )),
            MemoryLevel::Critical => recommendations.push(format!(
                "Memory at {usage_percent:.1}%: block cache is being evicted, consider lowering in_memory_blocks"
            )),
            MemoryLevel::Warning => recommendations.push(format!(
                "Memory at {usage_percent:.1}% is above the collection threshold, watch growth"
            )),
            MemoryLevel::Healthy => {}
        }
        if growth > self.config.fast_growth_mb_per_min {
            recommendations.push(format!(
                "Heap growing at {growth:.1} MB/min, check for leaks or unbounded buffers"
            ));
        }
        if consecutive >= self.config.persistent_critical_samples {
            recommendations.push(format!(
                "Memory has stayed critical for {consecutive} consecutive checks"
            ));
        }
        if let Some(cache) = &self.block_cache {
            let stats = cache.stats().cache;
            if stats.hits + stats.misses >= 100 && stats.hit_rate < 0.5 {
                recommendations.push(format!(
                    "Block cache hit rate is {:.0}%, consider raising hot_cache_blocks",
                    stats.hit_rate * 100.0
                ));
            }
        }
        let sla = self.sla_report();
        if sla.total_checks > 0 && !sla.meets_target {
            recommendations.push(format!(
                "Healthy uptime {:.2}% is below the {:.2}% target",
                sla.uptime_percent, sla.target_uptime_percent
            ));
        }
        if recommendations.is_empty() {
            recommendations.push("No action needed".to_string());
        }

        HealthReport {
            level,
            healthy: level == MemoryLevel::Healthy,
            usage_percent,
            growth_rate_mb_per_min: growth,
            recommendations,
        }
    }

    #[must_use]
    pub fn prometheus(&self) -> String {
        let snapshot = self.last_snapshot().unwrap_or(MemorySnapshot {
            seq: 0,
            at_ms: 0,
            sample: ResourceSample::default(),
            heap_used_mb: 0.0,
            heap_total_mb: 0.0,
            rss_mb: 0.0,
            usage_ratio: 0.0,
            level: MemoryLevel::Healthy,
            effective_gc_threshold: self.config.gc_threshold,
            growth_rate_mb_per_min: 0.0,
        });
        let (sla, cleanup) = {
            let state = self.state.lock();
            (state.sla, state.cleanup.clone())
        };
        let gc = self.gc.stats();
        let report = self.sla_report();

        let mut w = PromWriter::new();
        w.gauge(
            "resource_governor_heap_used_bytes",
            "Heap used at the last check",
            snapshot.sample.used_bytes as f64,
        )
        .gauge(
            "resource_governor_heap_total_bytes",
            "Heap reserved at the last check",
            snapshot.sample.total_bytes as f64,
        )
        .gauge(
            "resource_governor_rss_bytes",
            "Resident set size at the last check",
            snapshot.sample.rss_bytes as f64,
        )
        .gauge(
            "resource_governor_heap_usage_ratio",
            "Heap used divided by the configured maximum",
            snapshot.usage_ratio,
        )
        .gauge(
            "resource_governor_memory_level",
            "0=healthy 1=warning 2=critical 3=emergency",
            f64::from(snapshot.level as u8),
        )
        .gauge(
            "resource_governor_effective_gc_threshold",
            "GC threshold after growth adjustment",
            snapshot.effective_gc_threshold,
        )
        .gauge(
            "resource_governor_heap_growth_mb_per_min",
            "Heap growth rate",
            snapshot.growth_rate_mb_per_min,
        )
        .counter_vec(
            "resource_governor_memory_checks_total",
            "Memory checks by level",
            "level",
            &[
                ("healthy", sla.healthy as f64),
                ("warning", sla.warning as f64),
                ("critical", sla.critical as f64),
                ("emergency", sla.emergency as f64),
            ],
        )
        .counter_vec(
            "resource_governor_cleanups_total",
            "Cleanups by kind",
            "kind",
            &[
                ("soft", cleanup.soft as f64),
                ("aggressive", cleanup.aggressive as f64),
                ("emergency", cleanup.emergency as f64),
            ],
        )
        .counter(
            "resource_governor_cleanup_freed_mb_total",
            "Memory released by cleanups",
            cleanup.total_freed_mb,
        )
        .counter_vec(
            "resource_governor_gc_requests_total",
            "Collection requests by outcome",
            "outcome",
            &[
                ("collected", gc.collected as f64),
                ("not_collected", gc.executed.saturating_sub(gc.collected) as f64),
                ("rate_limited", gc.rate_limited as f64),
            ],
        )
        .gauge(
            "resource_governor_sla_uptime_percent",
            "Healthy uptime percentage",
            report.uptime_percent,
        );
        w.finish()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════

    /// Start the periodic memory check. Idempotent.
    #[tracing::instrument(skip(self))]
    pub fn start(self: &Arc<Self>) -> bool {
        let me: Weak<Self> = Arc::downgrade(self);
        let every = Duration::from_millis(self.config.check_interval_ms);
        let started = self.jobs.start("resource_manager", |jobs| {
            jobs.every("memory_check", every, move || {
                if let Some(manager) = me.upgrade() {
                    let _t = crate::time_job!("memory_check");
                    manager.check_memory();
                }
            });
        });
        if started {
            info!(
                max_heap_mb = self.config.max_heap_mb,
                check_interval_ms = self.config.check_interval_ms,
                "Resource manager started"
            );
        }
        started
    }

    pub fn stop(&self) -> bool {
        self.jobs.stop()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.jobs.is_running()
    }
}

/// MB per minute between the first and last point.
fn growth_rate(points: &[(u64, f64)]) -> f64 {
    let (Some(&(t0, v0)), Some(&(t1, v1))) = (points.first(), points.last()) else {
        return 0.0;
    };
    if t1 <= t0 {
        return 0.0;
    }
    (v1 - v0) / ((t1 - t0) as f64 / MINUTE_MS as f64)
}
