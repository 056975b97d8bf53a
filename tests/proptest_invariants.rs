// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Property-based tests for structural invariants.
//!
//! Random operation sequences must never break the cache's tier or byte
//! accounting, the ring buffer's overwrite rule, percentile ordering or the
//! governor's hysteresis.
//!
//! Run with: `cargo test --test proptest_invariants`

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use resource_governor::{
    AggregatorConfig, EventBus, GcCoordinator, GovernorConfig, GovernorState, MetricPoint,
    MetricsAggregator, NoopCollector, RingBuffer, Tier, TieredCache, TieredCacheConfig,
};

// =============================================================================
// Strategies
// =============================================================================

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: u8, size: usize, tier: Tier },
    Get { key: u8 },
    Delete { key: u8 },
    EvictLru { count: usize },
    Sweep,
}

fn tier_strategy() -> impl Strategy<Value = Tier> {
    prop_oneof![Just(Tier::Hot), Just(Tier::Warm), Just(Tier::Cold)]
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        4 => (0u8..40, 0usize..400, tier_strategy())
            .prop_map(|(key, size, tier)| CacheOp::Set { key, size, tier }),
        3 => (0u8..40).prop_map(|key| CacheOp::Get { key }),
        1 => (0u8..40).prop_map(|key| CacheOp::Delete { key }),
        1 => (0usize..5).prop_map(|count| CacheOp::EvictLru { count }),
        1 => Just(CacheOp::Sweep),
    ]
}

fn small_cache() -> TieredCache<u8, Vec<u8>> {
    TieredCache::new(TieredCacheConfig {
        max_hot: 4,
        max_warm: 6,
        max_cold: 8,
        max_size_bytes: 4_000,
        ttl_hot: Duration::from_secs(300),
        ttl_warm: Duration::from_secs(1_800),
    })
    .unwrap()
}

fn apply(cache: &TieredCache<u8, Vec<u8>>, op: &CacheOp) {
    match op {
        CacheOp::Set { key, size, tier } => cache.set(*key, vec![0; *size], *tier),
        CacheOp::Get { key } => {
            cache.get(key);
        }
        CacheOp::Delete { key } => {
            cache.delete(key);
        }
        CacheOp::EvictLru { count } => {
            cache.evict_lru(*count);
        }
        CacheOp::Sweep => {
            cache.sweep_expired();
        }
    }
}

// =============================================================================
// Tiered cache
// =============================================================================

proptest! {
    /// A key never lives in two tiers, and no tier exceeds its capacity
    #[test]
    fn tier_invariant_holds(ops in prop::collection::vec(cache_op_strategy(), 1..200)) {
        let cache = small_cache();
        for op in &ops {
            apply(&cache, op);

            let mut seen = HashSet::new();
            for tier in Tier::ALL {
                for key in cache.keys_in(tier) {
                    prop_assert!(seen.insert(key), "key {} in two tiers", key);
                }
            }
            let stats = cache.stats();
            prop_assert!(stats.hot_entries <= 4);
            prop_assert!(stats.warm_entries <= 6);
            prop_assert!(stats.cold_entries <= 8);
            prop_assert_eq!(seen.len(), cache.len());
        }
    }

    /// The incremental byte counter always equals the sum of entry sizes
    #[test]
    fn byte_accounting_matches_entries(ops in prop::collection::vec(cache_op_strategy(), 1..200)) {
        let cache = small_cache();
        for op in &ops {
            apply(&cache, op);
            prop_assert_eq!(cache.size_bytes(), cache.recount_bytes());
        }
        cache.clear();
        prop_assert_eq!(cache.size_bytes(), 0);
    }

    /// Whatever was set last for a key is what a later get returns, if the
    /// key survived
    #[test]
    fn get_returns_latest_value(
        writes in prop::collection::vec((0u8..10, 1usize..50), 1..60),
    ) {
        let cache = small_cache();
        let mut latest = std::collections::HashMap::new();
        for (key, size) in &writes {
            cache.set(*key, vec![*key; *size], Tier::Hot);
            latest.insert(*key, *size);
        }
        for (key, size) in latest {
            if let Some(value) = cache.get(&key) {
                prop_assert_eq!(value.len(), size);
            }
        }
    }
}

// =============================================================================
// Ring buffer
// =============================================================================

proptest! {
    /// After n pushes into capacity c the buffer holds the last min(n, c)
    /// items in push order
    #[test]
    fn ring_buffer_keeps_newest(capacity in 1usize..64, n in 0u64..300) {
        let mut ring = RingBuffer::new(capacity).unwrap();
        for i in 0..n {
            ring.push(i);
        }
        let kept = (n as usize).min(capacity);
        prop_assert_eq!(ring.len(), kept);
        prop_assert_eq!(ring.overwrites(), n.saturating_sub(capacity as u64));

        let expected: Vec<u64> = (n - kept as u64..n).collect();
        prop_assert_eq!(ring.to_vec(), expected);
        if n > 0 {
            prop_assert_eq!(ring.last().copied(), Some(n - 1));
        }
    }
}

// =============================================================================
// Rollups
// =============================================================================

proptest! {
    /// min <= p50 <= p90 <= p95 <= p99 <= max for any minute bucket
    #[test]
    fn percentiles_are_monotonic(values in prop::collection::vec(-1.0e6f64..1.0e6, 1..300)) {
        let events = EventBus::default();
        let gc = Arc::new(GcCoordinator::new(Arc::new(NoopCollector), Duration::ZERO, events.clone()));
        let aggregator = MetricsAggregator::new(AggregatorConfig::default(), gc, events).unwrap();

        for (i, v) in values.iter().enumerate() {
            aggregator.record_point(MetricPoint::new("m", *v, 60_000 + i as u64));
        }
        prop_assert_eq!(aggregator.aggregate_minute_at(120_000), 1);

        let buckets = aggregator.minute_aggregates("m", 1);
        prop_assert_eq!(buckets.len(), 1);
        let m = &buckets[0];
        prop_assert_eq!(m.count, values.len() as u64);
        prop_assert!(m.min <= m.p50);
        prop_assert!(m.p50 <= m.p90);
        prop_assert!(m.p90 <= m.p95);
        prop_assert!(m.p95 <= m.p99);
        prop_assert!(m.p99 <= m.max);
        prop_assert!(m.std_dev >= 0.0);
    }
}

// =============================================================================
// Governor hysteresis
// =============================================================================

proptest! {
    /// Alternating between two samples closer together than the hysteresis
    /// settles after at most two transitions
    #[test]
    fn hysteresis_does_not_flap(
        base in 0.0f64..100.0,
        delta in 0.0f64..1.99,
        rising in any::<bool>(),
        rounds in 2usize..30,
    ) {
        let config = GovernorConfig::default();
        let other = if rising { base + delta } else { base - delta };
        let mut state = GovernorState::Normal;
        let mut transitions = 0;
        let mut settled = None;

        for i in 0..rounds * 2 {
            let usage = if i % 2 == 0 { base } else { other };
            let next = state.next(usage, &config);
            if next != state {
                transitions += 1;
            }
            state = next;
            if i == 1 {
                settled = Some(state);
            }
        }
        prop_assert!(transitions <= 2, "{} transitions", transitions);
        prop_assert_eq!(Some(state), settled);
    }

    /// Rising usage moves up as soon as the raw threshold is reached
    #[test]
    fn rising_usage_reaches_raw_state(usage in 0.0f64..100.0) {
        let config = GovernorConfig::default();
        let next = GovernorState::Normal.next(usage, &config);
        prop_assert_eq!(next, GovernorState::for_usage(usage, &config));
    }
}
