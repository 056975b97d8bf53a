// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! End-to-end scenarios across components.
//!
//! Everything runs in-process against scripted samplers and no-op
//! collectors, so no external services are required.
//!
//! # Running Tests
//! ```bash
//! cargo test --test scenarios
//! ```
//!
//! # Test Organization
//! - `cache_*` - tiered cache placement and TTL demotion
//! - `aggregator_*` - rollups and anomaly detection
//! - `governor_*` - activation deferral and hibernation
//! - `governance_*` - the full context driven through pressure

use std::sync::Arc;
use std::time::Duration;

use resource_governor::{
    AggregatorConfig, AnomalySeverity, Block, DeferReason, EventBus, GcCoordinator, Governance,
    GovernanceConfig, GovernanceEvent, GovernorConfig, GovernorState, LifecycleState,
    MemoryGovernor, MemoryLevel, MetricPoint, MetricsAggregator, NoopCollector, ResourceConfig,
    ResourceManager, ScriptedSampler, Tier, TieredCache, TieredCacheConfig, WakeupResult,
};

// =============================================================================
// Helpers
// =============================================================================

fn gc(events: &EventBus) -> Arc<GcCoordinator> {
    Arc::new(GcCoordinator::new(Arc::new(NoopCollector), Duration::ZERO, events.clone()))
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<GovernanceEvent>) -> Vec<GovernanceEvent> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

// =============================================================================
// Cache
// =============================================================================

#[test]
fn cache_eviction_under_pressure_demotes_lru() {
    let cache: TieredCache<&'static str, String> = TieredCache::new(TieredCacheConfig {
        max_hot: 2,
        ..Default::default()
    })
    .unwrap();

    cache.set("A", "a".into(), Tier::Hot);
    cache.set("B", "b".into(), Tier::Hot);
    cache.set("C", "c".into(), Tier::Hot);

    assert_eq!(cache.tier_of(&"A"), Some(Tier::Warm));
    let mut hot = cache.keys_in(Tier::Hot);
    hot.sort_unstable();
    assert_eq!(hot, vec!["B", "C"]);
    assert_eq!(cache.stats().demotions, 1);
}

#[tokio::test(start_paused = true)]
async fn cache_ttl_demotion_moves_hot_to_warm() {
    let cache: TieredCache<&'static str, String> = TieredCache::new(TieredCacheConfig {
        ttl_hot: Duration::from_millis(1_000),
        ..Default::default()
    })
    .unwrap();

    cache.set("X", "x".into(), Tier::Hot);
    tokio::time::advance(Duration::from_millis(1_500)).await;
    let report = cache.sweep_expired();

    assert_eq!(report.demoted_to_warm, 1);
    assert_eq!(cache.tier_of(&"X"), Some(Tier::Warm));
    assert!(cache.keys_in(Tier::Hot).is_empty());
}

// =============================================================================
// Aggregator
// =============================================================================

#[test]
fn aggregator_flags_spike_after_steady_baseline() {
    let events = EventBus::default();
    let mut rx = events.subscribe();
    let aggregator = MetricsAggregator::new(AggregatorConfig::default(), gc(&events), events).unwrap();

    for i in 0..20u64 {
        let jitter = if i % 2 == 0 { 0.1 } else { -0.1 };
        aggregator.record_point(MetricPoint::new("latency_ms", 10.0 + jitter, 1_000 + i));
    }
    aggregator.record_point(MetricPoint::new("latency_ms", 100.0, 1_020));

    let found = aggregator.detect_anomalies();
    assert_eq!(found.len(), 1);
    assert!(found[0].severity >= AnomalySeverity::High);
    assert_eq!(found[0].value, 100.0);

    let emitted = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, GovernanceEvent::AnomalyDetected(_)))
        .count();
    assert_eq!(emitted, 1);
}

#[test]
fn aggregator_rolls_minutes_into_hours() {
    let events = EventBus::default();
    let aggregator = MetricsAggregator::new(AggregatorConfig::default(), gc(&events), events).unwrap();

    // One point per minute for the first hour
    for minute in 0..60u64 {
        aggregator.record_point(MetricPoint::new("tps", minute as f64, minute * 60_000 + 5));
    }
    assert_eq!(aggregator.aggregate_minute_at(3_600_000), 60);
    assert_eq!(aggregator.aggregate_hour_at(3_600_000), 1);

    let hours = aggregator.hour_aggregates("tps", 10);
    assert_eq!(hours.len(), 1);
    assert_eq!(hours[0].count, 60);
    assert_eq!(hours[0].min, 0.0);
    assert_eq!(hours[0].max, 59.0);
}

// =============================================================================
// Governor
// =============================================================================

fn governor(config: GovernorConfig) -> MemoryGovernor {
    let events = EventBus::default();
    let resource = ResourceManager::new(
        ResourceConfig {
            max_heap_mb: 1000,
            ..Default::default()
        },
        Arc::new(ScriptedSampler::from_used_mb([100.0])),
        gc(&events),
        events.clone(),
    )
    .unwrap();
    MemoryGovernor::new(config, Arc::new(resource), events).unwrap()
}

#[test]
fn governor_defers_third_shard_at_memory_ceiling() {
    let gov = governor(GovernorConfig {
        max_total_shard_memory_mb: 30.0,
        shard_memory_estimate_mb: 15.0,
        ..Default::default()
    });
    gov.register_shard("shard-1", None);
    gov.register_shard("shard-2", None);

    let decision = gov.should_defer_activation("shard-3");
    assert!(decision.defer);
    assert_eq!(decision.reason, DeferReason::ShardMemoryCeiling);
}

#[tokio::test(start_paused = true)]
async fn governor_hibernates_then_wakes_after_recovery() {
    let gov = governor(GovernorConfig::default());
    for id in ["a", "b", "c", "d", "e"] {
        gov.register_shard(id, None);
    }

    assert_eq!(gov.update_usage(90.0), GovernorState::Hibernating);
    assert_eq!(gov.stats().hibernated_shards, 2);
    let sleeping: Vec<String> = gov
        .shards()
        .into_iter()
        .filter(|s| s.is_hibernated)
        .map(|s| s.shard_id)
        .collect();

    assert!(matches!(
        gov.wakeup_shard(&sleeping[0]),
        WakeupResult::Refused { .. }
    ));

    // Relief: 90 -> 60 drops straight to normal (hysteresis only holds
    // values near a threshold)
    tokio::time::advance(Duration::from_secs(60)).await;
    assert_eq!(gov.update_usage(60.0), GovernorState::Normal);
    for _ in 0..5 {
        gov.update_usage(60.0);
    }
    assert_eq!(gov.wakeup_shard(&sleeping[0]), WakeupResult::Woken);
    assert_eq!(gov.stats().hibernated_shards, 1);
}

// =============================================================================
// Governance
// =============================================================================

fn governance(script: &[f64]) -> (Governance, Arc<ScriptedSampler>) {
    let mut config = GovernanceConfig::default();
    config.resource.max_heap_mb = 1000;
    let sampler = Arc::new(ScriptedSampler::from_used_mb(script.iter().copied()));
    let governance =
        Governance::with_parts(config, sampler.clone(), Arc::new(NoopCollector)).unwrap();
    (governance, sampler)
}

#[test]
fn governance_emergency_clears_cache_and_hibernates_critically() {
    let (governance, sampler) = governance(&[300.0]);
    let mut rx = governance.subscribe();
    for i in 0..50 {
        governance
            .block_cache()
            .add_block(Block::new(i, vec![0; 128]), Tier::Hot);
    }
    for i in 0..6 {
        governance.governor().register_shard(format!("shard-{i}"), None);
    }
    assert_eq!(governance.monitor_once().1, GovernorState::Normal);

    sampler.push_used_mb(960.0);
    let (snapshot, state) = governance.monitor_once();
    assert_eq!(snapshot.level, MemoryLevel::Emergency);
    assert_eq!(state, GovernorState::Critical);
    assert!(governance.block_cache().is_empty());
    assert_eq!(governance.governor().stats().hibernated_shards, 4);

    let kinds: Vec<&'static str> = drain(&mut rx).iter().map(GovernanceEvent::kind).collect();
    assert!(kinds.contains(&"memory_emergency"));
    assert!(kinds.contains(&"cache_cleared"));
    assert!(kinds.contains(&"cleanup_completed"));
    assert!(kinds.contains(&"state_change"));
    assert!(kinds.contains(&"shard_hibernated"));

    let health = governance.health();
    assert!(!health.healthy);
    assert!(!health.resource.recommendations.is_empty());
}

#[tokio::test(start_paused = true)]
async fn governance_lifecycle_runs_periodic_monitor() {
    let mut config = GovernanceConfig::default();
    config.resource.max_heap_mb = 1000;
    config.resource.check_interval_ms = 1_000;
    config.governor.monitor_interval_ms = 1_000;
    let sampler = Arc::new(ScriptedSampler::from_used_mb([100.0]));
    let governance = Governance::with_parts(config, sampler.clone(), Arc::new(NoopCollector)).unwrap();
    governance.governor().register_shard("s", None);

    assert!(governance.initialize());
    assert_eq!(governance.state(), LifecycleState::Running);
    assert_eq!(governance.governor().state(), GovernorState::Normal);

    // Pressure arrives; both periodic jobs pick it up within a few ticks
    sampler.push_used_mb(900.0);
    for _ in 0..5 {
        tokio::time::sleep(Duration::from_millis(1_000)).await;
    }
    assert_eq!(governance.resource().level(), MemoryLevel::Critical);
    assert_eq!(governance.governor().state(), GovernorState::Hibernating);

    assert!(governance.shutdown());
    assert_eq!(governance.state(), LifecycleState::Stopped);
    assert!(!governance.resource().is_running());
}
