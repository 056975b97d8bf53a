// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Predictive memory governor.
//!
//! Tracks per-shard memory, runs a hysteretic five-state machine over the
//! process usage percentage and sheds load by deferring shard activations
//! and hibernating cold shards.
//!
//! # States
//!
//! ```text
//!   Normal ─► Warning ─► Deferred ─► Hibernating ─► Critical
//!      ◄─────────◄───────────◄────────────◄─────────────┘
//!                  (down only below threshold − hysteresis;
//!                   Critical steps down to Hibernating only)
//! ```
//!
//! While Hibernating or Critical, each tick may run a hibernation round:
//! the coldest active shards are hibernated and a collection is requested.
//! Rounds are separated by a cooldown.

mod shard;
mod state;
mod types;

pub use shard::ShardMemoryInfo;
pub use state::GovernorState;
pub use types::{
    DeferDecision, DeferReason, GovernorHealth, GovernorMetrics, GovernorStats, WakeupResult,
};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::clock::now_millis;
use crate::config::GovernorConfig;
use crate::error::ConfigError;
use crate::events::{EventBus, GovernanceEvent};
use crate::prometheus::PromWriter;
use crate::resource::ResourceManager;
use crate::scheduler::JobSlot;

struct GovernorInner {
    state: GovernorState,
    usage_percent: f64,
    usage_history: VecDeque<f64>,
    /// Resource sample last fed in by `tick`
    last_sample_seq: Option<u64>,
    last_round: Option<Instant>,
}

/// Shard-level memory governor driven by the resource manager's samples.
pub struct MemoryGovernor {
    config: GovernorConfig,
    resource: Arc<ResourceManager>,
    shards: DashMap<String, ShardMemoryInfo>,
    inner: Mutex<GovernorInner>,
    events: EventBus,
    transitions: AtomicU64,
    rounds: AtomicU64,
    hibernated_total: AtomicU64,
    wakeups: AtomicU64,
    wakeups_refused: AtomicU64,
    deferred: AtomicU64,
    jobs: JobSlot,
}

impl MemoryGovernor {
    pub fn new(
        config: GovernorConfig,
        resource: Arc<ResourceManager>,
        events: EventBus,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            inner: Mutex::new(GovernorInner {
                state: GovernorState::Normal,
                usage_percent: 0.0,
                usage_history: VecDeque::with_capacity(config.usage_history_size),
                last_sample_seq: None,
                last_round: None,
            }),
            config,
            resource,
            shards: DashMap::new(),
            events,
            transitions: AtomicU64::new(0),
            rounds: AtomicU64::new(0),
            hibernated_total: AtomicU64::new(0),
            wakeups: AtomicU64::new(0),
            wakeups_refused: AtomicU64::new(0),
            deferred: AtomicU64::new(0),
            jobs: JobSlot::default(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> GovernorState {
        self.inner.lock().state
    }

    #[must_use]
    pub fn usage_percent(&self) -> f64 {
        self.inner.lock().usage_percent
    }

    // ═══════════════════════════════════════════════════════════════════
    // Shard bookkeeping
    // ═══════════════════════════════════════════════════════════════════

    /// Start tracking a shard. Returns `false` if it was already tracked.
    pub fn register_shard(&self, shard_id: impl Into<String>, estimated_mb: Option<f64>) -> bool {
        let shard_id = shard_id.into();
        let estimate = estimated_mb.unwrap_or(self.config.shard_memory_estimate_mb);
        let inserted = match self.shards.entry(shard_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(ShardMemoryInfo::new(shard_id.clone(), estimate, now_millis()));
                true
            }
        };
        if inserted {
            debug!(shard = %shard_id, estimated_mb = estimate, "shard registered");
            self.update_shard_gauges();
        }
        inserted
    }

    pub fn unregister_shard(&self, shard_id: &str) -> Option<ShardMemoryInfo> {
        let removed = self.shards.remove(shard_id).map(|(_, info)| info);
        if removed.is_some() {
            self.update_shard_gauges();
        }
        removed
    }

    /// Fold a memory sample into the shard's EWMA. Hibernated shards keep
    /// their frozen figures and the sample is ignored.
    pub fn update_shard_memory(&self, shard_id: &str, actual_mb: f64) -> bool {
        if !actual_mb.is_finite() || actual_mb < 0.0 {
            return false;
        }
        match self.shards.get_mut(shard_id) {
            Some(mut shard) if !shard.is_hibernated => {
                shard.observe(actual_mb, self.config.ewma_alpha);
                true
            }
            _ => false,
        }
    }

    /// Note an access to the shard.
    pub fn record_access(&self, shard_id: &str) -> bool {
        match self.shards.get_mut(shard_id) {
            Some(mut shard) => {
                shard.touch(now_millis());
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn shard(&self, shard_id: &str) -> Option<ShardMemoryInfo> {
        self.shards.get(shard_id).map(|s| s.clone())
    }

    /// All tracked shards ordered by id.
    #[must_use]
    pub fn shards(&self) -> Vec<ShardMemoryInfo> {
        let mut all: Vec<ShardMemoryInfo> = self.shards.iter().map(|s| s.clone()).collect();
        all.sort_by(|a, b| a.shard_id.cmp(&b.shard_id));
        all
    }

    /// Memory of non-hibernated shards, optionally leaving one out.
    #[must_use]
    pub fn active_memory_mb(&self, exclude: Option<&str>) -> f64 {
        self.shards
            .iter()
            .filter(|s| !s.is_hibernated && Some(s.shard_id.as_str()) != exclude)
            .map(|s| s.effective_mb())
            .sum()
    }

    fn shard_counts(&self) -> (usize, usize) {
        let hibernated = self.shards.iter().filter(|s| s.is_hibernated).count();
        (self.shards.len() - hibernated, hibernated)
    }

    fn update_shard_gauges(&self) {
        let (active, hibernated) = self.shard_counts();
        crate::metrics::set_shard_counts(active, hibernated);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Prediction and activation
    // ═══════════════════════════════════════════════════════════════════

    /// Least-squares projection of usage `prediction_horizon` samples ahead,
    /// fitted to the last `prediction_samples` samples.
    #[must_use]
    pub fn predicted_peak_percent(&self) -> Option<f64> {
        let inner = self.inner.lock();
        let skip = inner
            .usage_history
            .len()
            .saturating_sub(self.config.prediction_samples);
        let recent: Vec<f64> = inner.usage_history.iter().skip(skip).copied().collect();
        project(&recent, self.config.prediction_horizon)
    }

    /// Decide whether activating `shard_id` now should be postponed.
    pub fn should_defer_activation(&self, shard_id: &str) -> DeferDecision {
        let (state, usage_percent) = {
            let inner = self.inner.lock();
            (inner.state, inner.usage_percent)
        };
        let predicted_peak_percent = self.predicted_peak_percent();
        let shard_estimate_mb = self
            .shards
            .get(shard_id)
            .map_or(self.config.shard_memory_estimate_mb, |s| s.effective_mb());
        let active_memory_mb = self.active_memory_mb(Some(shard_id));
        let max_heap_mb = self.resource.config().max_heap_mb as f64;
        let c = &self.config;

        let reason = if state == GovernorState::Critical {
            DeferReason::CriticalState
        } else if state == GovernorState::Hibernating {
            DeferReason::HibernatingState
        } else if state == GovernorState::Deferred
            && usage_percent + shard_estimate_mb / max_heap_mb * 100.0 > c.hibernate_percent
        {
            DeferReason::ProjectedUsage
        } else if active_memory_mb + shard_estimate_mb > c.max_total_shard_memory_mb {
            DeferReason::ShardMemoryCeiling
        } else if predicted_peak_percent.is_some_and(|p| p > c.defer_percent) {
            DeferReason::PredictedPeak
        } else {
            DeferReason::Allowed
        };

        let defer = reason != DeferReason::Allowed;
        crate::metrics::record_activation_decision(defer, reason.as_str());
        if defer {
            self.deferred.fetch_add(1, Ordering::Relaxed);
            debug!(
                shard = shard_id,
                reason = %reason,
                state = %state,
                usage_percent,
                active_memory_mb,
                "shard activation deferred"
            );
        }
        DeferDecision {
            defer,
            reason,
            state,
            usage_percent,
            active_memory_mb,
            shard_estimate_mb,
            predicted_peak_percent,
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // State machine
    // ═══════════════════════════════════════════════════════════════════

    /// Feed one usage sample (percent of max heap) through the state machine.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn update_usage(&self, usage_percent: f64) -> GovernorState {
        let (from, to) = {
            let mut inner = self.inner.lock();
            if inner.usage_history.len() >= self.config.usage_history_size {
                inner.usage_history.pop_front();
            }
            inner.usage_history.push_back(usage_percent);
            inner.usage_percent = usage_percent;
            let from = inner.state;
            let to = from.next(usage_percent, &self.config);
            inner.state = to;
            (from, to)
        };

        crate::metrics::set_governor_state(to as u8);
        if from != to {
            self.transitions.fetch_add(1, Ordering::Relaxed);
            crate::metrics::record_state_transition(from.as_str(), to.as_str());
            if to > from {
                warn!(from = %from, to = %to, usage_percent, "Governor state escalated");
            } else {
                info!(from = %from, to = %to, usage_percent, "Governor state relaxed");
            }
            self.events.emit(GovernanceEvent::StateChange {
                from,
                to,
                usage_percent,
            });
        }
        if to >= GovernorState::Hibernating {
            self.hibernation_round(to);
        }
        to
    }

    /// Read the resource manager's latest sample and update the state.
    ///
    /// Each sample enters the usage history once. A tick that finds no new
    /// sample only retries a pending hibernation round.
    pub fn tick(&self) -> Option<GovernorState> {
        let snapshot = self.resource.last_snapshot()?;
        let fresh = {
            let mut inner = self.inner.lock();
            let seen = inner.last_sample_seq.replace(snapshot.seq);
            seen != Some(snapshot.seq)
        };
        let state = if fresh {
            self.update_usage(snapshot.usage_percent())
        } else {
            let state = self.state();
            if state >= GovernorState::Hibernating {
                self.hibernation_round(state);
            }
            state
        };
        self.update_shard_gauges();
        Some(state)
    }

    /// Hibernate the coldest active shards unless a round ran within the
    /// cooldown. Returns the shards hibernated by this round.
    fn hibernation_round(&self, state: GovernorState) -> Vec<String> {
        let mut candidates: Vec<(i128, String)> = self
            .shards
            .iter()
            .filter(|s| !s.is_hibernated)
            .map(|s| (s.coldness_score(), s.shard_id.clone()))
            .collect();
        if candidates.is_empty() {
            return Vec::new();
        }
        {
            let mut inner = self.inner.lock();
            let now = Instant::now();
            let cooldown = Duration::from_millis(self.config.hibernation_cooldown_ms);
            if let Some(prev) = inner.last_round {
                if now.saturating_duration_since(prev) < cooldown {
                    return Vec::new();
                }
            }
            inner.last_round = Some(now);
        }

        let batch = if state == GovernorState::Critical {
            self.config.critical_hibernate_batch
        } else {
            self.config.hibernate_batch
        };
        candidates.sort();
        let hibernated: Vec<String> = candidates
            .into_iter()
            .take(batch)
            .filter_map(|(_, id)| self.hibernate_shard(&id).then_some(id))
            .collect();

        self.rounds.fetch_add(1, Ordering::Relaxed);
        if !hibernated.is_empty() {
            self.resource.gc().request("governor");
        }
        warn!(state = %state, shards = ?hibernated, "Hibernation round");
        hibernated
    }

    /// Mark a shard hibernated and freeze its accounting. Returns `false` if
    /// it is unknown or already hibernated.
    pub fn hibernate_shard(&self, shard_id: &str) -> bool {
        let freed_mb = {
            let Some(mut shard) = self.shards.get_mut(shard_id) else {
                return false;
            };
            if shard.is_hibernated {
                return false;
            }
            shard.is_hibernated = true;
            shard.hibernated_at_ms = Some(now_millis());
            shard.effective_mb()
        };
        self.hibernated_total.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_shard_hibernated();
        self.update_shard_gauges();
        info!(shard = shard_id, freed_mb, "Shard hibernated");
        self.events.emit(GovernanceEvent::ShardHibernated {
            shard_id: shard_id.to_string(),
            freed_mb,
        });
        true
    }

    /// Wake a hibernated shard unless memory pressure says otherwise.
    pub fn wakeup_shard(&self, shard_id: &str) -> WakeupResult {
        match self.shards.get(shard_id).map(|s| s.is_hibernated) {
            None => return WakeupResult::UnknownShard,
            Some(false) => return WakeupResult::AlreadyActive,
            Some(true) => {}
        }

        let decision = self.should_defer_activation(shard_id);
        if decision.defer {
            self.wakeups_refused.fetch_add(1, Ordering::Relaxed);
            crate::metrics::record_shard_wakeup(false);
            debug!(shard = shard_id, reason = %decision.reason, "wakeup refused");
            return WakeupResult::Refused {
                reason: decision.reason,
            };
        }

        {
            let Some(mut shard) = self.shards.get_mut(shard_id) else {
                return WakeupResult::UnknownShard;
            };
            if !shard.is_hibernated {
                return WakeupResult::AlreadyActive;
            }
            shard.is_hibernated = false;
            shard.hibernated_at_ms = None;
            shard.last_accessed_ms = now_millis();
        }
        self.wakeups.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_shard_wakeup(true);
        self.update_shard_gauges();
        info!(shard = shard_id, "Shard woken");
        self.events.emit(GovernanceEvent::ShardWoken {
            shard_id: shard_id.to_string(),
        });
        WakeupResult::Woken
    }

    // ═══════════════════════════════════════════════════════════════════
    // Reporting
    // ═══════════════════════════════════════════════════════════════════

    #[must_use]
    pub fn stats(&self) -> GovernorStats {
        let (state, usage_percent) = {
            let inner = self.inner.lock();
            (inner.state, inner.usage_percent)
        };
        let (active, hibernated) = self.shard_counts();
        GovernorStats {
            state,
            usage_percent,
            registered_shards: active + hibernated,
            active_shards: active,
            hibernated_shards: hibernated,
            active_memory_mb: self.active_memory_mb(None),
            transitions: self.transitions.load(Ordering::Relaxed),
            hibernation_rounds: self.rounds.load(Ordering::Relaxed),
            shards_hibernated: self.hibernated_total.load(Ordering::Relaxed),
            wakeups: self.wakeups.load(Ordering::Relaxed),
            wakeups_refused: self.wakeups_refused.load(Ordering::Relaxed),
            activations_deferred: self.deferred.load(Ordering::Relaxed),
        }
    }

    #[must_use]
    pub fn metrics(&self) -> GovernorMetrics {
        GovernorMetrics {
            stats: self.stats(),
            predicted_peak_percent: self.predicted_peak_percent(),
            usage_history: self.inner.lock().usage_history.iter().copied().collect(),
            shards: self.shards(),
        }
    }

    #[must_use]
    pub fn health_status(&self) -> GovernorHealth {
        let stats = self.stats();
        let predicted = self.predicted_peak_percent();
        let c = &self.config;
        let mut recommendations = Vec::new();

        match stats.state {
            GovernorState::Critical => recommendations.push(format!(
                "Usage at {:.1}%: hibernating up to {} shards per round, reduce load",
                stats.usage_percent, c.critical_hibernate_batch
            )),
            GovernorState::Hibernating => recommendations
                .push("Cold shards are being hibernated to relieve memory".to_string()),
            GovernorState::Deferred => {
                recommendations.push("New shard activations are being deferred".to_string())
            }
            GovernorState::Warning => recommendations.push(format!(
                "Usage at {:.1}% is approaching the defer threshold of {:.0}%",
                stats.usage_percent, c.defer_percent
            )),
            GovernorState::Normal => {}
        }
        if let Some(peak) = predicted {
            if peak > c.defer_percent && stats.state < GovernorState::Deferred {
                recommendations.push(format!("Usage projected to reach {peak:.1}%"));
            }
        }
        if stats.active_memory_mb > 0.9 * c.max_total_shard_memory_mb {
            recommendations.push(format!(
                "Active shard memory {:.0} MB is near the {:.0} MB ceiling",
                stats.active_memory_mb, c.max_total_shard_memory_mb
            ));
        }
        if stats.hibernated_shards > 0 && stats.state == GovernorState::Normal {
            recommendations.push(format!(
                "{} shards remain hibernated and can be woken",
                stats.hibernated_shards
            ));
        }
        if recommendations.is_empty() {
            recommendations.push("No action needed".to_string());
        }

        GovernorHealth {
            state: stats.state,
            healthy: stats.state <= GovernorState::Warning,
            usage_percent: stats.usage_percent,
            predicted_peak_percent: predicted,
            recommendations,
        }
    }

    #[must_use]
    pub fn prometheus(&self) -> String {
        let s = self.stats();
        let mut w = PromWriter::new();
        w.gauge(
            "resource_governor_governor_state",
            "0=normal 1=warning 2=deferred 3=hibernating 4=critical",
            f64::from(s.state as u8),
        )
        .gauge(
            "resource_governor_governor_usage_percent",
            "Last usage sample",
            s.usage_percent,
        )
        .gauge_vec(
            "resource_governor_shards",
            "Tracked shards by status",
            "status",
            &[
                ("active", s.active_shards as f64),
                ("hibernated", s.hibernated_shards as f64),
            ],
        )
        .gauge(
            "resource_governor_active_shard_memory_mb",
            "Memory of active shards",
            s.active_memory_mb,
        )
        .counter(
            "resource_governor_state_transitions_total",
            "Governor state transitions",
            s.transitions as f64,
        )
        .counter(
            "resource_governor_hibernation_rounds_total",
            "Hibernation rounds run",
            s.hibernation_rounds as f64,
        )
        .counter(
            "resource_governor_shards_hibernated_total",
            "Shards hibernated",
            s.shards_hibernated as f64,
        )
        .counter_vec(
            "resource_governor_shard_wakeups_total",
            "Wakeup requests by outcome",
            "outcome",
            &[
                ("woken", s.wakeups as f64),
                ("refused", s.wakeups_refused as f64),
            ],
        )
        .counter(
            "resource_governor_activations_deferred_total",
            "Shard activations deferred",
            s.activations_deferred as f64,
        );
        w.finish()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════

    /// Start the monitor tick. Idempotent.
    #[tracing::instrument(skip(self))]
    pub fn start(self: &Arc<Self>) -> bool {
        let me: Weak<Self> = Arc::downgrade(self);
        let every = Duration::from_millis(self.config.monitor_interval_ms);
        self.jobs.start("memory_governor", |jobs| {
            jobs.every("governor_tick", every, move || {
                if let Some(governor) = me.upgrade() {
                    let _t = crate::time_job!("governor_tick");
                    governor.tick();
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

/// Linear least-squares fit of `samples` (x = index), evaluated `horizon`
/// steps past the last sample.
fn project(samples: &[f64], horizon: usize) -> Option<f64> {
    let n = samples.len();
    if n < 2 {
        return None;
    }
    let mean_x = (n as f64 - 1.0) / 2.0;
    let mean_y = samples.iter().sum::<f64>() / n as f64;
    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (i, y) in samples.iter().enumerate() {
        let dx = i as f64 - mean_x;
        sxy += dx * (y - mean_y);
        sxx += dx * dx;
    }
    let slope = sxy / sxx;
    let at = (n - 1 + horizon) as f64;
    Some(mean_y + slope * (at - mean_x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceConfig;
    use crate::resource::{GcCoordinator, NoopCollector, ScriptedSampler};

    fn resource(script: &[f64]) -> Arc<ResourceManager> {
        let events = EventBus::default();
        let gc = Arc::new(GcCoordinator::new(
            Arc::new(NoopCollector),
            Duration::ZERO,
            events.clone(),
        ));
        let config = ResourceConfig {
            max_heap_mb: 1000,
            ..Default::default()
        };
        let sampler = Arc::new(ScriptedSampler::from_used_mb(script.iter().copied()));
        Arc::new(ResourceManager::new(config, sampler, gc, events).unwrap())
    }

    fn governor(config: GovernorConfig) -> (MemoryGovernor, EventBus) {
        let events = EventBus::default();
        let gov = MemoryGovernor::new(config, resource(&[]), events.clone()).unwrap();
        (gov, events)
    }

    #[test]
    fn test_defer_at_shard_memory_ceiling() {
        let (gov, _) = governor(GovernorConfig {
            max_total_shard_memory_mb: 30.0,
            shard_memory_estimate_mb: 15.0,
            ..Default::default()
        });
        gov.register_shard("s1", None);
        assert!(!gov.should_defer_activation("s2").defer);
        gov.register_shard("s2", None);

        let decision = gov.should_defer_activation("s3");
        assert!(decision.defer);
        assert_eq!(decision.reason, DeferReason::ShardMemoryCeiling);
        assert_eq!(decision.active_memory_mb, 30.0);
        assert_eq!(gov.stats().activations_deferred, 1);
    }

    #[test]
    fn test_high_states_defer() {
        let (gov, _) = governor(GovernorConfig::default());
        gov.update_usage(96.0);
        assert_eq!(gov.should_defer_activation("x").reason, DeferReason::CriticalState);
        gov.update_usage(90.0);
        assert_eq!(gov.state(), GovernorState::Hibernating);
        assert_eq!(gov.should_defer_activation("x").reason, DeferReason::HibernatingState);
    }

    #[test]
    fn test_deferred_state_projects_one_activation() {
        // 1000 MB heap: a 150 MB shard adds 15 points.
        let (gov, _) = governor(GovernorConfig {
            max_total_shard_memory_mb: 10_000.0,
            prediction_samples: 2,
            prediction_horizon: 0,
            ..Default::default()
        });
        gov.register_shard("big", Some(150.0));
        gov.register_shard("small", Some(10.0));
        gov.update_usage(81.0);
        gov.update_usage(81.0);
        assert_eq!(gov.state(), GovernorState::Deferred);
        assert_eq!(gov.should_defer_activation("big").reason, DeferReason::ProjectedUsage);
        // 81 + 1 stays under the hibernate threshold; the flat projection is
        // above the defer threshold though.
        assert_eq!(gov.should_defer_activation("small").reason, DeferReason::PredictedPeak);
    }

    #[test]
    fn test_predicted_peak_defers_before_threshold() {
        let (gov, _) = governor(GovernorConfig::default());
        for u in [60.0, 62.0, 64.0, 66.0, 68.0] {
            gov.update_usage(u);
        }
        assert!((gov.predicted_peak_percent().unwrap() - 78.0).abs() < 1e-9);
        assert!(!gov.should_defer_activation("x").defer);

        for u in [70.0, 72.0, 74.0, 76.0, 78.0] {
            gov.update_usage(u);
        }
        assert_eq!(gov.state(), GovernorState::Warning);
        let decision = gov.should_defer_activation("x");
        assert_eq!(decision.reason, DeferReason::PredictedPeak);
        assert!((decision.predicted_peak_percent.unwrap() - 88.0).abs() < 1e-9);
    }

    #[test]
    fn test_state_change_events() {
        let (gov, events) = governor(GovernorConfig::default());
        let mut rx = events.subscribe();
        gov.update_usage(72.0);
        gov.update_usage(71.0);
        gov.update_usage(50.0);

        let mut changes = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let GovernanceEvent::StateChange { from, to, .. } = event {
                changes.push((from, to));
            }
        }
        assert_eq!(
            changes,
            vec![
                (GovernorState::Normal, GovernorState::Warning),
                (GovernorState::Warning, GovernorState::Normal),
            ]
        );
        assert_eq!(gov.stats().transitions, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hibernation_rounds_pick_coldest_with_cooldown() {
        let (gov, events) = governor(GovernorConfig::default());
        let mut rx = events.subscribe();
        for (i, id) in ["a", "b", "c", "d", "e", "f"].iter().enumerate() {
            gov.register_shard(*id, None);
            gov.shards.get_mut(*id).unwrap().last_accessed_ms = (i as u64 + 1) * 10_000;
        }

        // Critical: four coldest
        gov.update_usage(96.0);
        let hibernated: Vec<String> = gov
            .shards()
            .into_iter()
            .filter(|s| s.is_hibernated)
            .map(|s| s.shard_id)
            .collect();
        assert_eq!(hibernated, vec!["a", "b", "c", "d"]);
        assert_eq!(gov.resource.gc().stats().requested, 1);

        // Cooldown holds the next round back.
        gov.update_usage(96.0);
        assert_eq!(gov.stats().hibernated_shards, 4);

        tokio::time::advance(Duration::from_millis(30_000)).await;
        gov.update_usage(96.0);
        assert_eq!(gov.stats().hibernated_shards, 6);
        assert_eq!(gov.stats().hibernation_rounds, 2);

        let mut hibernated_events = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, GovernanceEvent::ShardHibernated { .. }) {
                hibernated_events += 1;
            }
        }
        assert_eq!(hibernated_events, 6);
    }

    #[test]
    fn test_hibernating_batch_is_smaller() {
        let (gov, _) = governor(GovernorConfig::default());
        for id in ["a", "b", "c", "d"] {
            gov.register_shard(id, None);
        }
        gov.update_usage(90.0);
        assert_eq!(gov.state(), GovernorState::Hibernating);
        assert_eq!(gov.stats().hibernated_shards, 2);
    }

    #[test]
    fn test_hibernate_is_idempotent_under_contention() {
        let (gov, _) = governor(GovernorConfig::default());
        gov.register_shard("s", None);
        let gov = Arc::new(gov);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gov = gov.clone();
                std::thread::spawn(move || gov.hibernate_shard("s"))
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
        assert!(!gov.hibernate_shard("s"));
        assert!(!gov.hibernate_shard("missing"));
    }

    #[test]
    fn test_wakeup_refused_under_pressure() {
        let (gov, _) = governor(GovernorConfig::default());
        gov.register_shard("s", None);
        assert_eq!(gov.wakeup_shard("s"), WakeupResult::AlreadyActive);
        assert_eq!(gov.wakeup_shard("nope"), WakeupResult::UnknownShard);

        gov.hibernate_shard("s");
        gov.update_usage(96.0);
        assert_eq!(
            gov.wakeup_shard("s"),
            WakeupResult::Refused {
                reason: DeferReason::CriticalState
            }
        );

        // Critical -> Hibernating -> Normal
        gov.update_usage(40.0);
        gov.update_usage(40.0);
        for _ in 0..5 {
            gov.update_usage(40.0);
        }
        assert_eq!(gov.state(), GovernorState::Normal);
        assert_eq!(gov.wakeup_shard("s"), WakeupResult::Woken);
        assert!(!gov.shard("s").unwrap().is_hibernated);
        let stats = gov.stats();
        assert_eq!(stats.wakeups, 1);
        assert_eq!(stats.wakeups_refused, 1);
    }

    #[test]
    fn test_hibernated_shard_accounting_is_frozen() {
        let (gov, _) = governor(GovernorConfig::default());
        gov.register_shard("s", Some(5.0));
        assert!(gov.update_shard_memory("s", 10.0));
        assert!(gov.update_shard_memory("s", 20.0));
        assert!((gov.shard("s").unwrap().effective_mb() - 13.0).abs() < 1e-9);

        gov.hibernate_shard("s");
        assert!(!gov.update_shard_memory("s", 500.0));
        assert!((gov.shard("s").unwrap().effective_mb() - 13.0).abs() < 1e-9);
        assert_eq!(gov.active_memory_mb(None), 0.0);
    }

    #[test]
    fn test_tick_reads_resource_snapshot() {
        let events = EventBus::default();
        let rm = resource(&[900.0]);
        let gov = MemoryGovernor::new(GovernorConfig::default(), rm.clone(), events).unwrap();
        assert_eq!(gov.tick(), None);
        rm.check_memory_at(0);
        assert_eq!(gov.tick(), Some(GovernorState::Hibernating));
    }

    #[test]
    fn test_tick_feeds_each_sample_once() {
        let rm = resource(&[500.0, 600.0]);
        let gov = MemoryGovernor::new(GovernorConfig::default(), rm.clone(), EventBus::default())
            .unwrap();

        rm.check_memory_at(0);
        gov.tick();
        gov.tick();
        assert_eq!(gov.inner.lock().usage_history.len(), 1);

        rm.check_memory_at(10_000);
        assert_eq!(gov.tick(), Some(GovernorState::Normal));
        let history: Vec<f64> = gov.inner.lock().usage_history.iter().copied().collect();
        assert_eq!(history.len(), 2);
        assert!((history[1] - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_health_and_prometheus() {
        let (gov, _) = governor(GovernorConfig::default());
        assert_eq!(gov.health_status().recommendations, vec!["No action needed".to_string()]);
        gov.register_shard("s", None);
        gov.update_usage(85.0);
        let health = gov.health_status();
        assert_eq!(health.state, GovernorState::Deferred);
        assert!(!health.healthy);

        let text = gov.prometheus();
        assert!(text.contains("resource_governor_governor_state 2"));
        assert!(text.contains("resource_governor_shards{status=\"active\"} 1"));
    }

    #[test]
    fn test_projection() {
        assert_eq!(project(&[1.0], 5), None);
        assert!((project(&[1.0, 2.0, 3.0], 2).unwrap() - 5.0).abs() < 1e-9);
        assert!((project(&[5.0, 5.0], 10).unwrap() - 5.0).abs() < 1e-9);
    }
}
