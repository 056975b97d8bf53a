// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Block retention on top of [`TieredCache`].
//!
//! Blocks are keyed by height. A monotonic watermark (highest height ever
//! added) anchors recency queries and retention: anything below
//! `watermark - in_memory_blocks` is pruned by [`BlockCache::evict_old_blocks`]
//! regardless of how recently it was read.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use super::entry::{SizedItem, Tier};
use super::tiered::{EvictionOutcome, SweepReport, TieredCache, TieredCacheStats};
use crate::config::RetentionPolicy;
use crate::error::ConfigError;
use crate::events::{EventBus, EvictionReason, GovernanceEvent};
use crate::prometheus::PromWriter;
use crate::scheduler::JobSlot;

const CACHE_LABEL: &str = "block";

/// Struct and bookkeeping overhead counted on top of the payload.
const BLOCK_OVERHEAD_BYTES: usize = 96;

/// An opaque block. Only its height and footprint matter here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
    pub timestamp_ms: u64,
    pub tx_count: u32,
    #[serde(skip)]
    pub payload: Vec<u8>,
}

impl Block {
    /// Convenience constructor for a block with a synthetic payload.
    #[must_use]
    pub fn new(number: u64, payload: Vec<u8>) -> Self {
        Self {
            number,
            hash: format!("{number:064x}"),
            parent_hash: format!("{:064x}", number.saturating_sub(1)),
            timestamp_ms: crate::clock::now_millis(),
            tx_count: 0,
            payload,
        }
    }
}

impl SizedItem for Block {
    fn size_bytes(&self) -> usize {
        BLOCK_OVERHEAD_BYTES + self.hash.len() + self.parent_hash.len() + self.payload.len()
    }
}

/// Block cache statistics.
#[derive(Debug, Clone, Serialize)]
pub struct BlockCacheStats {
    #[serde(flatten)]
    pub cache: TieredCacheStats,
    pub last_block_number: Option<u64>,
    pub in_memory_blocks: u64,
    pub retention_evictions: u64,
    pub pressure_evictions: u64,
}

/// Height-keyed block cache with a retention window.
pub struct BlockCache {
    policy: RetentionPolicy,
    cache: TieredCache<u64, Arc<Block>>,
    /// Highest height + 1; 0 means no block seen yet.
    watermark: AtomicU64,
    retention_evictions: AtomicU64,
    pressure_evictions: AtomicU64,
    events: EventBus,
    jobs: JobSlot,
}

impl BlockCache {
    pub fn new(policy: RetentionPolicy, events: EventBus) -> Result<Self, ConfigError> {
        policy.validate()?;
        let cache = TieredCache::new(policy.tiered_config())?;
        Ok(Self {
            policy,
            cache,
            watermark: AtomicU64::new(0),
            retention_evictions: AtomicU64::new(0),
            pressure_evictions: AtomicU64::new(0),
            events,
            jobs: JobSlot::default(),
        })
    }

    #[must_use]
    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    fn advance_watermark(&self, number: u64) {
        let prev = self.watermark.fetch_max(number.saturating_add(1), Ordering::AcqRel);
        if number.saturating_add(1) > prev {
            crate::metrics::set_block_watermark(number);
        }
    }

    /// Highest block height ever added.
    #[must_use]
    pub fn last_block_number(&self) -> Option<u64> {
        match self.watermark.load(Ordering::Acquire) {
            0 => None,
            w => Some(w - 1),
        }
    }

    /// Insert one block at `tier` and advance the watermark.
    pub fn add_block(&self, block: Block, tier: Tier) {
        let number = block.number;
        self.cache.set(number, Arc::new(block), tier);
        self.advance_watermark(number);
        self.events.emit(GovernanceEvent::BlockAdded { number, tier });
    }

    /// Bulk insert under one lock acquisition.
    ///
    /// Emits a single `BlockAdded` for the highest height in the batch.
    pub fn add_blocks(&self, blocks: Vec<Block>, tier: Tier) -> usize {
        let Some(highest) = blocks.iter().map(|b| b.number).max() else {
            return 0;
        };
        let inserted = self
            .cache
            .extend(blocks.into_iter().map(|b| (b.number, Arc::new(b))), tier);
        self.advance_watermark(highest);
        debug!(count = inserted, highest, tier = %tier, "Bulk block insert");
        self.events.emit(GovernanceEvent::BlockAdded {
            number: highest,
            tier,
        });
        inserted
    }

    pub fn get_block(&self, number: u64) -> Option<Arc<Block>> {
        let found = self.cache.get(&number);
        crate::metrics::record_cache_lookup(CACHE_LABEL, found.is_some());
        found
    }

    /// Blocks among the `n` heights ending at the watermark, ascending.
    /// Missing heights are skipped, so fewer than `n` may come back.
    pub fn get_recent_blocks(&self, n: usize) -> Vec<Arc<Block>> {
        let Some(top) = self.last_block_number() else {
            return Vec::new();
        };
        if n == 0 {
            return Vec::new();
        }
        let bottom = top.saturating_sub(n as u64 - 1);
        self.get_block_range(bottom, top)
    }

    /// Cached blocks with `from <= number <= to`, ascending.
    ///
    /// Range reads do not promote blocks, and gaps do not count as misses.
    pub fn get_block_range(&self, from: u64, to: u64) -> Vec<Arc<Block>> {
        let Some(top) = self.last_block_number() else {
            return Vec::new();
        };
        let to = to.min(top);
        if from > to {
            return Vec::new();
        }
        let span = to - from + 1;
        let found = if span <= self.cache.len() as u64 {
            self.cache.peek_many(from..=to)
        } else {
            // Sparse range: walk the cached keys instead of every height.
            let mut heights: Vec<u64> = Tier::ALL
                .into_iter()
                .flat_map(|t| self.cache.keys_in(t))
                .filter(|h| (from..=to).contains(h))
                .collect();
            heights.sort_unstable();
            self.cache.peek_many(heights)
        };
        for _ in &found {
            crate::metrics::record_cache_lookup(CACHE_LABEL, true);
        }
        found
    }

    /// Prune every block below `watermark - in_memory_blocks`.
    #[tracing::instrument(skip(self))]
    pub fn evict_old_blocks(&self) -> EvictionOutcome {
        let Some(top) = self.last_block_number() else {
            return EvictionOutcome::default();
        };
        if top < self.policy.in_memory_blocks {
            return EvictionOutcome::default();
        }
        let cutoff = top - self.policy.in_memory_blocks;
        let outcome = self.cache.evict_before(&cutoff);
        if outcome.entries > 0 {
            self.retention_evictions
                .fetch_add(outcome.entries as u64, Ordering::Relaxed);
            crate::metrics::record_eviction(
                CACHE_LABEL,
                "retention",
                outcome.entries,
                outcome.bytes,
            );
            debug!(count = outcome.entries, cutoff, "Evicted blocks below retention window");
            self.events.emit(GovernanceEvent::BlocksEvicted {
                count: outcome.entries,
                bytes: outcome.bytes,
                reason: EvictionReason::Retention,
            });
        }
        self.update_gauges();
        outcome
    }

    /// Evict `fraction` of the cached blocks, least recently used first.
    pub fn evict_fraction(&self, fraction: f64) -> EvictionOutcome {
        let fraction = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
        let count = (self.cache.len() as f64 * fraction).ceil() as usize;
        let outcome = self.cache.evict_lru(count);
        if outcome.entries > 0 {
            self.pressure_evictions
                .fetch_add(outcome.entries as u64, Ordering::Relaxed);
            crate::metrics::record_eviction(
                CACHE_LABEL,
                "pressure",
                outcome.entries,
                outcome.bytes,
            );
            info!(
                count = outcome.entries,
                bytes = outcome.bytes,
                fraction,
                "Evicted blocks under memory pressure"
            );
            self.events.emit(GovernanceEvent::BlocksEvicted {
                count: outcome.entries,
                bytes: outcome.bytes,
                reason: EvictionReason::Pressure,
            });
        }
        self.update_gauges();
        outcome
    }

    /// Drop every cached block. The watermark is kept.
    pub fn clear(&self) -> usize {
        let entries = self.cache.clear();
        info!(entries, "Block cache cleared");
        self.events.emit(GovernanceEvent::CacheCleared { entries });
        self.update_gauges();
        entries
    }

    /// Heights in the preload window below the watermark that are not cached.
    #[must_use]
    pub fn preload_candidates(&self) -> Vec<u64> {
        let Some(top) = self.last_block_number() else {
            return Vec::new();
        };
        if self.policy.preload_blocks == 0 {
            return Vec::new();
        }
        let bottom = top.saturating_sub(self.policy.preload_blocks - 1);
        (bottom..=top).filter(|h| !self.cache.has(h)).collect()
    }

    /// Run one TTL sweep.
    pub fn sweep_expired(&self) -> SweepReport {
        let report = self.cache.sweep_expired();
        let demoted = report.demoted_to_warm + report.demoted_to_cold;
        if demoted > 0 {
            crate::metrics::record_ttl_demotions(CACHE_LABEL, demoted);
        }
        if report.evicted > 0 {
            crate::metrics::record_eviction(CACHE_LABEL, "capacity", report.evicted, 0);
        }
        self.update_gauges();
        report
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.cache.size_bytes()
    }

    /// Tier currently holding `number`.
    #[must_use]
    pub fn tier_of(&self, number: u64) -> Option<Tier> {
        self.cache.tier_of(&number)
    }

    #[must_use]
    pub fn stats(&self) -> BlockCacheStats {
        BlockCacheStats {
            cache: self.cache.stats(),
            last_block_number: self.last_block_number(),
            in_memory_blocks: self.policy.in_memory_blocks,
            retention_evictions: self.retention_evictions.load(Ordering::Relaxed),
            pressure_evictions: self.pressure_evictions.load(Ordering::Relaxed),
        }
    }

    fn update_gauges(&self) {
        let stats = self.cache.stats();
        crate::metrics::set_cache_entries(CACHE_LABEL, "hot", stats.hot_entries);
        crate::metrics::set_cache_entries(CACHE_LABEL, "warm", stats.warm_entries);
        crate::metrics::set_cache_entries(CACHE_LABEL, "cold", stats.cold_entries);
        crate::metrics::set_cache_bytes(CACHE_LABEL, stats.size_bytes);
    }

    /// Prometheus text block for this cache.
    #[must_use]
    pub fn prometheus(&self) -> String {
        let s = self.stats();
        let capacity_evictions = s
            .cache
            .evictions
            .saturating_sub(s.retention_evictions + s.pressure_evictions);
        let mut w = PromWriter::new();
        w.gauge_vec(
            "resource_governor_block_cache_entries",
            "Cached blocks per tier",
            "tier",
            &[
                ("hot", s.cache.hot_entries as f64),
                ("warm", s.cache.warm_entries as f64),
                ("cold", s.cache.cold_entries as f64),
            ],
        )
        .gauge(
            "resource_governor_block_cache_bytes",
            "Estimated bytes held by the block cache",
            s.cache.size_bytes as f64,
        )
        .gauge(
            "resource_governor_block_cache_utilization",
            "Bytes used over the byte budget",
            s.cache.utilization,
        )
        .gauge(
            "resource_governor_block_cache_hit_rate",
            "Hits over lookups since start",
            s.cache.hit_rate,
        )
        .counter(
            "resource_governor_block_cache_hits_total",
            "Block cache hits",
            s.cache.hits as f64,
        )
        .counter(
            "resource_governor_block_cache_misses_total",
            "Block cache misses",
            s.cache.misses as f64,
        )
        .counter(
            "resource_governor_block_cache_promotions_total",
            "Entries moved one tier up on access",
            s.cache.promotions as f64,
        )
        .counter(
            "resource_governor_block_cache_demotions_total",
            "Entries moved one tier down",
            s.cache.demotions as f64,
        )
        .counter_vec(
            "resource_governor_block_cache_evictions_total",
            "Blocks removed from the cache",
            "reason",
            &[
                ("retention", s.retention_evictions as f64),
                ("pressure", s.pressure_evictions as f64),
                ("capacity", capacity_evictions as f64),
            ],
        )
        .gauge(
            "resource_governor_block_watermark",
            "Highest block height added",
            s.last_block_number.map_or(-1.0, |n| n as f64),
        );
        w.finish()
    }

    /// Start the TTL sweep and retention jobs. Idempotent.
    pub fn start(self: &Arc<Self>) -> bool {
        let sweep: Weak<Self> = Arc::downgrade(self);
        let evict = sweep.clone();
        let sweep_every = Duration::from_millis(self.policy.sweep_interval_ms);
        let evict_every = Duration::from_millis(self.policy.eviction_interval_ms);
        self.jobs.start("block_cache", |jobs| {
            jobs.every("block_ttl_sweep", sweep_every, move || {
                if let Some(cache) = sweep.upgrade() {
                    let _t = crate::time_job!("block_ttl_sweep");
                    cache.sweep_expired();
                }
            });
            jobs.every("block_retention", evict_every, move || {
                if let Some(cache) = evict.upgrade() {
                    let _t = crate::time_job!("block_retention");
                    cache.evict_old_blocks();
                }
            });
        })
    }

    /// Stop background jobs. Idempotent.
    pub fn stop(&self) -> bool {
        self.jobs.stop()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.jobs.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with(policy: RetentionPolicy) -> BlockCache {
        BlockCache::new(policy, EventBus::default()).unwrap()
    }

    fn small_policy() -> RetentionPolicy {
        RetentionPolicy {
            in_memory_blocks: 10,
            hot_cache_blocks: 4,
            warm_cache_blocks: 4,
            preload_blocks: 5,
            ..Default::default()
        }
    }

    fn block(n: u64) -> Block {
        Block::new(n, vec![0u8; 16])
    }

    #[test]
    fn test_watermark_is_monotonic() {
        let cache = cache_with(small_policy());
        assert_eq!(cache.last_block_number(), None);
        cache.add_block(block(5), Tier::Hot);
        cache.add_block(block(3), Tier::Hot);
        assert_eq!(cache.last_block_number(), Some(5));
        cache.add_block(block(0), Tier::Hot);
        assert_eq!(cache.last_block_number(), Some(5));
    }

    #[test]
    fn test_recent_blocks_skip_holes() {
        let cache = cache_with(small_policy());
        for n in [1, 2, 4, 5] {
            cache.add_block(block(n), Tier::Hot);
        }
        let recent: Vec<u64> = cache.get_recent_blocks(3).iter().map(|b| b.number).collect();
        assert_eq!(recent, vec![4, 5]);
        assert!(cache.get_recent_blocks(0).is_empty());
    }

    #[test]
    fn test_window_reads_leave_stats_and_tiers_alone() {
        let cache = cache_with(RetentionPolicy::default());
        cache.add_block(block(0), Tier::Cold);
        cache.add_block(block(99), Tier::Hot);

        assert_eq!(cache.get_recent_blocks(100).len(), 2);
        let stats = cache.stats().cache;
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.hit_rate, 1.0);
        assert_eq!(cache.tier_of(0), Some(Tier::Cold));

        // Point lookups still promote and count misses
        assert!(cache.get_block(0).is_some());
        assert_eq!(cache.tier_of(0), Some(Tier::Warm));
        assert!(cache.get_block(50).is_none());
        assert_eq!(cache.stats().cache.misses, 1);
    }

    #[test]
    fn test_block_range_clamps_to_watermark() {
        let cache = cache_with(small_policy());
        cache.add_blocks((0..6).map(block).collect(), Tier::Warm);
        let range: Vec<u64> = cache
            .get_block_range(3, u64::MAX)
            .iter()
            .map(|b| b.number)
            .collect();
        assert_eq!(range, vec![3, 4, 5]);
        assert!(cache.get_block_range(7, 2).is_empty());
    }

    #[test]
    fn test_evict_old_blocks_prunes_below_window() {
        let cache = cache_with(RetentionPolicy {
            in_memory_blocks: 10,
            hot_cache_blocks: 50,
            warm_cache_blocks: 50,
            ..Default::default()
        });
        let mut rx = cache.events.subscribe();
        cache.add_blocks((0..25).map(block).collect(), Tier::Hot);

        let out = cache.evict_old_blocks();
        // watermark 24, cutoff 14: heights 0..=13 go
        assert_eq!(out.entries, 14);
        assert!(cache.get_block(13).is_none());
        assert!(cache.get_block(14).is_some());

        let mut saw_eviction = false;
        while let Ok(event) = rx.try_recv() {
            if let GovernanceEvent::BlocksEvicted { count, reason, .. } = event {
                assert_eq!(count, 14);
                assert_eq!(reason, EvictionReason::Retention);
                saw_eviction = true;
            }
        }
        assert!(saw_eviction);
    }

    #[test]
    fn test_evict_fraction_rounds_up() {
        let cache = cache_with(small_policy());
        cache.add_blocks((0..8).map(block).collect(), Tier::Hot);
        let before = cache.len();
        let out = cache.evict_fraction(0.25);
        assert_eq!(out.entries, (before as f64 * 0.25).ceil() as usize);
        assert_eq!(cache.len(), before - out.entries);
        assert_eq!(cache.stats().pressure_evictions, out.entries as u64);
    }

    #[test]
    fn test_preload_candidates_are_missing_heights() {
        let cache = cache_with(small_policy());
        for n in [10, 8, 6] {
            cache.add_block(block(n), Tier::Hot);
        }
        assert_eq!(cache.preload_candidates(), vec![7, 9]);
    }

    #[test]
    fn test_clear_keeps_watermark() {
        let cache = cache_with(small_policy());
        cache.add_block(block(3), Tier::Hot);
        assert_eq!(cache.clear(), 1);
        assert!(cache.is_empty());
        assert_eq!(cache.size_bytes(), 0);
        assert_eq!(cache.last_block_number(), Some(3));
    }

    #[test]
    fn test_block_size_includes_payload() {
        let b = Block::new(1, vec![0u8; 1000]);
        assert!(b.size_bytes() > 1000);
    }

    #[test]
    fn test_prometheus_names_are_stable() {
        let cache = cache_with(small_policy());
        cache.add_block(block(1), Tier::Hot);
        cache.get_block(1);
        let text = cache.prometheus();
        assert!(text.contains("# TYPE resource_governor_block_cache_hits_total counter"));
        assert!(text.contains("resource_governor_block_cache_entries{tier=\"hot\"} 1"));
        assert!(text.contains("resource_governor_block_watermark 1"));
    }
}
