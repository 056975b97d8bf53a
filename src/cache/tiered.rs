// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Three-tier (hot/warm/cold) LRU cache with TTL demotion.
//!
//! # Placement
//!
//! ```text
//!   set(k, v, tier) ──► [ HOT ] ──demote──► [ WARM ] ──demote──► [ COLD ] ──evict──► ∅
//!                          ▲                    │  ▲                 │
//!                          └──── promote on get ┘  └─ promote on get ┘
//! ```
//!
//! - A key lives in exactly one tier; moving tiers moves the entry.
//! - Each tier has its own entry cap. A full tier demotes its least recently
//!   used entry one tier down before accepting a new one; a full cold tier
//!   evicts.
//! - The byte budget is enforced globally before insertion, evicting cold
//!   first, then warm, then hot.
//! - TTLs are measured from creation, not from last access: a hot entry older
//!   than `ttl_hot` is demoted by [`TieredCache::sweep_expired`] no matter how
//!   often it is read.
//!
//! Capacity handling never fails. When no victim exists the insert still
//! happens and the cache may sit one entry above its byte budget.
//!
//! # Thread Safety
//!
//! All tier maps live behind one `parking_lot::Mutex`, so every observation
//! sees a consistent set of tiers. Hit/miss counters are atomics.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use super::entry::{CacheEntry, SizedItem, Tier};
use crate::error::ConfigError;

/// Tiered cache limits.
#[derive(Debug, Clone)]
pub struct TieredCacheConfig {
    pub max_hot: usize,
    pub max_warm: usize,
    pub max_cold: usize,
    /// Soft byte budget across all tiers
    pub max_size_bytes: usize,
    /// Age after which a hot entry is demoted to warm
    pub ttl_hot: Duration,
    /// Age after which a warm entry is demoted to cold
    pub ttl_warm: Duration,
}

impl Default for TieredCacheConfig {
    fn default() -> Self {
        Self {
            max_hot: 1_000,
            max_warm: 5_000,
            max_cold: 20_000,
            max_size_bytes: 256 * 1024 * 1024,
            ttl_hot: Duration::from_secs(300),
            ttl_warm: Duration::from_secs(1_800),
        }
    }
}

impl TieredCacheConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::check_nonzero("max_hot", self.max_hot)?;
        ConfigError::check_nonzero("max_warm", self.max_warm)?;
        ConfigError::check_nonzero("max_cold", self.max_cold)?;
        ConfigError::check_nonzero("max_size_bytes", self.max_size_bytes)?;
        if self.ttl_hot.is_zero() || self.ttl_warm.is_zero() {
            return Err(ConfigError::Invalid {
                field: "ttl",
                reason: "tier TTLs must be non-zero".into(),
            });
        }
        Ok(())
    }

    fn capacity(&self, tier: Tier) -> usize {
        match tier {
            Tier::Hot => self.max_hot,
            Tier::Warm => self.max_warm,
            Tier::Cold => self.max_cold,
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Serialize)]
pub struct TieredCacheStats {
    pub hot_entries: usize,
    pub warm_entries: usize,
    pub cold_entries: usize,
    pub size_bytes: usize,
    pub max_size_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
    pub promotions: u64,
    pub demotions: u64,
    pub evictions: u64,
    /// Bytes used / byte budget
    pub utilization: f64,
}

impl TieredCacheStats {
    #[must_use]
    pub fn entries(&self) -> usize {
        self.hot_entries + self.warm_entries + self.cold_entries
    }
}

/// Outcome of one TTL sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub demoted_to_warm: usize,
    pub demoted_to_cold: usize,
    pub evicted: usize,
}

/// Entries and bytes removed by a bulk eviction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EvictionOutcome {
    pub entries: usize,
    pub bytes: usize,
}

/// Counter deltas produced while holding the lock.
#[derive(Default)]
struct Moves {
    demotions: u64,
    evictions: u64,
}

struct Tiers<K, V> {
    hot: HashMap<K, CacheEntry<V>>,
    warm: HashMap<K, CacheEntry<V>>,
    cold: HashMap<K, CacheEntry<V>>,
    size_bytes: usize,
    seq: u64,
}

impl<K: Eq + Hash + Clone, V> Tiers<K, V> {
    fn new() -> Self {
        Self {
            hot: HashMap::new(),
            warm: HashMap::new(),
            cold: HashMap::new(),
            size_bytes: 0,
            seq: 0,
        }
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn map(&self, tier: Tier) -> &HashMap<K, CacheEntry<V>> {
        match tier {
            Tier::Hot => &self.hot,
            Tier::Warm => &self.warm,
            Tier::Cold => &self.cold,
        }
    }

    fn map_mut(&mut self, tier: Tier) -> &mut HashMap<K, CacheEntry<V>> {
        match tier {
            Tier::Hot => &mut self.hot,
            Tier::Warm => &mut self.warm,
            Tier::Cold => &mut self.cold,
        }
    }

    fn locate(&self, key: &K) -> Option<Tier> {
        Tier::ALL.into_iter().find(|t| self.map(*t).contains_key(key))
    }

    /// Remove `key` from whichever tier holds it, releasing its bytes.
    fn remove_any(&mut self, key: &K) -> Option<CacheEntry<V>> {
        let tier = self.locate(key)?;
        let entry = self.map_mut(tier).remove(key)?;
        self.size_bytes = self.size_bytes.saturating_sub(entry.size_bytes);
        Some(entry)
    }

    fn lru_victim(&self, tier: Tier) -> Option<K> {
        self.map(tier)
            .iter()
            .min_by_key(|(_, e)| e.lru_key())
            .map(|(k, _)| k.clone())
    }

    /// Evict the single least recently used entry, cold tier first.
    fn evict_one(&mut self) -> Option<CacheEntry<V>> {
        for tier in [Tier::Cold, Tier::Warm, Tier::Hot] {
            if let Some(key) = self.lru_victim(tier) {
                return self.remove_any(&key);
            }
        }
        None
    }

    /// Move an entry into `tier` without any capacity check.
    fn place(&mut self, key: K, mut entry: CacheEntry<V>, tier: Tier) {
        entry.tier = tier;
        self.map_mut(tier).insert(key, entry);
    }

    /// Guarantee `tier` has room for one more entry, cascading demotions
    /// downward and evicting from cold.
    fn make_room(&mut self, tier: Tier, config: &TieredCacheConfig, moves: &mut Moves) {
        if self.map(tier).len() < config.capacity(tier) {
            return;
        }
        let Some(victim) = self.lru_victim(tier) else {
            return;
        };
        match tier.colder() {
            Some(colder) => {
                self.make_room(colder, config, moves);
                if let Some(entry) = self.map_mut(tier).remove(&victim) {
                    self.place(victim, entry, colder);
                    moves.demotions += 1;
                }
            }
            None => {
                if self.remove_any(&victim).is_some() {
                    moves.evictions += 1;
                }
            }
        }
    }

    /// Bring `tier` back under its cap in one sorted pass, pushing the
    /// excess one tier down (or out, for cold).
    fn enforce_capacity(&mut self, tier: Tier, config: &TieredCacheConfig, moves: &mut Moves) {
        let cap = config.capacity(tier);
        let len = self.map(tier).len();
        if len <= cap {
            return;
        }
        let mut order: Vec<(K, (Instant, u64))> = self
            .map(tier)
            .iter()
            .map(|(k, e)| (k.clone(), e.lru_key()))
            .collect();
        order.sort_by_key(|(_, lru)| *lru);

        for (key, _) in order.into_iter().take(len - cap) {
            match tier.colder() {
                Some(colder) => {
                    if let Some(entry) = self.map_mut(tier).remove(&key) {
                        self.place(key, entry, colder);
                        moves.demotions += 1;
                    }
                }
                None => {
                    if self.remove_any(&key).is_some() {
                        moves.evictions += 1;
                    }
                }
            }
        }
    }

    /// Evict until `extra` more bytes fit into the budget.
    fn fit_bytes(&mut self, extra: usize, max: usize, moves: &mut Moves) {
        while self.size_bytes + extra > max {
            if self.evict_one().is_none() {
                break;
            }
            moves.evictions += 1;
        }
    }

    fn total_len(&self) -> usize {
        self.hot.len() + self.warm.len() + self.cold.len()
    }
}

/// Generic hot/warm/cold cache.
pub struct TieredCache<K, V> {
    config: TieredCacheConfig,
    tiers: Mutex<Tiers<K, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
    promotions: AtomicU64,
    demotions: AtomicU64,
    evictions: AtomicU64,
}

impl<K, V> TieredCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + SizedItem,
{
    /// Create a cache, rejecting zero capacities or TTLs.
    pub fn new(config: TieredCacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            tiers: Mutex::new(Tiers::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            promotions: AtomicU64::new(0),
            demotions: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn config(&self) -> &TieredCacheConfig {
        &self.config
    }

    fn apply(&self, moves: Moves) {
        if moves.demotions > 0 {
            self.demotions.fetch_add(moves.demotions, Ordering::Relaxed);
        }
        if moves.evictions > 0 {
            self.evictions.fetch_add(moves.evictions, Ordering::Relaxed);
        }
    }

    /// Insert or replace `key` in `tier`.
    pub fn set(&self, key: K, value: V, tier: Tier) {
        let size = value.size_bytes();
        let mut moves = Moves::default();
        {
            let mut tiers = self.tiers.lock();
            // Drop any previous copy first so its bytes are not counted twice.
            tiers.remove_any(&key);
            tiers.fit_bytes(size, self.config.max_size_bytes, &mut moves);
            tiers.make_room(tier, &self.config, &mut moves);
            let seq = tiers.next_seq();
            tiers.place(key, CacheEntry::new(value, size, tier, seq), tier);
            tiers.size_bytes += size;
        }
        self.apply(moves);
    }

    /// Insert many entries into `tier` under one lock acquisition.
    ///
    /// Capacity is enforced once at the end with a single sorted pass per
    /// tier instead of one LRU scan per inserted entry.
    pub fn extend<I>(&self, items: I, tier: Tier) -> usize
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let mut moves = Moves::default();
        let mut inserted = 0;
        {
            let mut tiers = self.tiers.lock();
            for (key, value) in items {
                let size = value.size_bytes();
                tiers.remove_any(&key);
                let seq = tiers.next_seq();
                tiers.place(key, CacheEntry::new(value, size, tier, seq), tier);
                tiers.size_bytes += size;
                inserted += 1;
            }
            let mut t = Some(tier);
            while let Some(current) = t {
                tiers.enforce_capacity(current, &self.config, &mut moves);
                t = current.colder();
            }
            tiers.fit_bytes(0, self.config.max_size_bytes, &mut moves);
        }
        self.apply(moves);
        inserted
    }

    /// Look up `key`, promoting a warm or cold hit one tier up.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut moves = Moves::default();
        let found = {
            let mut tiers = self.tiers.lock();
            match tiers.locate(key) {
                None => None,
                Some(Tier::Hot) => {
                    let seq = tiers.next_seq();
                    tiers.hot.get_mut(key).map(|entry| {
                        entry.record_access(seq);
                        entry.value.clone()
                    })
                }
                Some(from) => {
                    let seq = tiers.next_seq();
                    let to = from.hotter().unwrap_or(Tier::Hot);
                    match tiers.map_mut(from).remove(key) {
                        Some(mut entry) => {
                            entry.record_access(seq);
                            let value = entry.value.clone();
                            tiers.make_room(to, &self.config, &mut moves);
                            tiers.place(key.clone(), entry, to);
                            self.promotions.fetch_add(1, Ordering::Relaxed);
                            Some(value)
                        }
                        None => None,
                    }
                }
            }
        };
        self.apply(moves);

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Read without touching recency, counters or placement.
    #[must_use]
    pub fn peek(&self, key: &K) -> Option<V> {
        let tiers = self.tiers.lock();
        let tier = tiers.locate(key)?;
        tiers.map(tier).get(key).map(|e| e.value.clone())
    }

    /// Bulk read under one lock, in key order given.
    ///
    /// Absent keys are skipped and not counted as misses; found entries count
    /// as hits. Recency and tier placement are left alone.
    pub fn peek_many<I>(&self, keys: I) -> Vec<V>
    where
        I: IntoIterator<Item = K>,
    {
        let found: Vec<V> = {
            let tiers = self.tiers.lock();
            keys.into_iter()
                .filter_map(|key| {
                    let tier = tiers.locate(&key)?;
                    tiers.map(tier).get(&key).map(|e| e.value.clone())
                })
                .collect()
        };
        self.hits.fetch_add(found.len() as u64, Ordering::Relaxed);
        found
    }

    /// Remove `key`. Returns whether it was present.
    pub fn delete(&self, key: &K) -> bool {
        self.tiers.lock().remove_any(key).is_some()
    }

    #[must_use]
    pub fn has(&self, key: &K) -> bool {
        self.tiers.lock().locate(key).is_some()
    }

    /// Tier currently holding `key`.
    #[must_use]
    pub fn tier_of(&self, key: &K) -> Option<Tier> {
        self.tiers.lock().locate(key)
    }

    /// Drop every entry and reset the byte count. Returns the number dropped.
    pub fn clear(&self) -> usize {
        let mut tiers = self.tiers.lock();
        let dropped = tiers.total_len();
        tiers.hot.clear();
        tiers.warm.clear();
        tiers.cold.clear();
        tiers.size_bytes = 0;
        dropped
    }

    /// Demote entries whose age exceeds their tier TTL, then re-enforce
    /// warm and cold capacity.
    pub fn sweep_expired(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let mut moves = Moves::default();
        {
            let mut tiers = self.tiers.lock();
            let now = Instant::now();

            let expired_hot: Vec<K> = tiers
                .hot
                .iter()
                .filter(|(_, e)| e.age(now) >= self.config.ttl_hot)
                .map(|(k, _)| k.clone())
                .collect();
            for key in expired_hot {
                if let Some(entry) = tiers.hot.remove(&key) {
                    tiers.place(key, entry, Tier::Warm);
                    report.demoted_to_warm += 1;
                }
            }

            let expired_warm: Vec<K> = tiers
                .warm
                .iter()
                .filter(|(_, e)| e.age(now) >= self.config.ttl_warm)
                .map(|(k, _)| k.clone())
                .collect();
            for key in expired_warm {
                if let Some(entry) = tiers.warm.remove(&key) {
                    tiers.place(key, entry, Tier::Cold);
                    report.demoted_to_cold += 1;
                }
            }

            tiers.enforce_capacity(Tier::Warm, &self.config, &mut moves);
            let before = moves.evictions;
            tiers.enforce_capacity(Tier::Cold, &self.config, &mut moves);
            report.evicted = (moves.evictions - before) as usize;
        }
        moves.demotions += (report.demoted_to_warm + report.demoted_to_cold) as u64;
        self.apply(moves);

        if report != SweepReport::default() {
            debug!(
                to_warm = report.demoted_to_warm,
                to_cold = report.demoted_to_cold,
                evicted = report.evicted,
                "TTL sweep demoted entries"
            );
        }
        report
    }

    /// Evict up to `count` least recently used entries, cold tier first.
    pub fn evict_lru(&self, count: usize) -> EvictionOutcome {
        let mut outcome = EvictionOutcome::default();
        if count == 0 {
            return outcome;
        }
        {
            let mut tiers = self.tiers.lock();
            for tier in [Tier::Cold, Tier::Warm, Tier::Hot] {
                let remaining = count - outcome.entries;
                if remaining == 0 {
                    break;
                }
                let mut order: Vec<(K, (Instant, u64))> = tiers
                    .map(tier)
                    .iter()
                    .map(|(k, e)| (k.clone(), e.lru_key()))
                    .collect();
                order.sort_by_key(|(_, lru)| *lru);
                for (key, _) in order.into_iter().take(remaining) {
                    if let Some(entry) = tiers.remove_any(&key) {
                        outcome.entries += 1;
                        outcome.bytes += entry.size_bytes;
                    }
                }
            }
        }
        self.evictions
            .fetch_add(outcome.entries as u64, Ordering::Relaxed);
        outcome
    }

    /// Evict every entry whose key matches `pred`, regardless of LRU order.
    pub fn evict_where<F>(&self, mut pred: F) -> EvictionOutcome
    where
        F: FnMut(&K) -> bool,
    {
        let mut outcome = EvictionOutcome::default();
        {
            let mut tiers = self.tiers.lock();
            for tier in Tier::ALL {
                let doomed: Vec<K> = tiers.map(tier).keys().filter(|k| pred(k)).cloned().collect();
                for key in doomed {
                    if let Some(entry) = tiers.remove_any(&key) {
                        outcome.entries += 1;
                        outcome.bytes += entry.size_bytes;
                    }
                }
            }
        }
        self.evictions
            .fetch_add(outcome.entries as u64, Ordering::Relaxed);
        outcome
    }

    /// Keys in `tier`, unordered.
    #[must_use]
    pub fn keys_in(&self, tier: Tier) -> Vec<K> {
        self.tiers.lock().map(tier).keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tiers.lock().total_len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tracked byte total across all tiers.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.tiers.lock().size_bytes
    }

    /// Sum of entry sizes recomputed from scratch (for verification).
    #[must_use]
    pub fn recount_bytes(&self) -> usize {
        let tiers = self.tiers.lock();
        Tier::ALL
            .into_iter()
            .flat_map(|t| tiers.map(t).values().map(|e| e.size_bytes))
            .sum()
    }

    #[must_use]
    pub fn stats(&self) -> TieredCacheStats {
        let (hot, warm, cold, size_bytes) = {
            let tiers = self.tiers.lock();
            (tiers.hot.len(), tiers.warm.len(), tiers.cold.len(), tiers.size_bytes)
        };
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        TieredCacheStats {
            hot_entries: hot,
            warm_entries: warm,
            cold_entries: cold,
            size_bytes,
            max_size_bytes: self.config.max_size_bytes,
            hits,
            misses,
            hit_rate: if lookups > 0 { hits as f64 / lookups as f64 } else { 0.0 },
            promotions: self.promotions.load(Ordering::Relaxed),
            demotions: self.demotions.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            utilization: size_bytes as f64 / self.config.max_size_bytes as f64,
        }
    }
}

impl<K, V> TieredCache<K, V>
where
    K: Eq + Hash + Clone + Ord,
    V: Clone + SizedItem,
{
    /// Evict every key strictly below `threshold`.
    pub fn evict_before(&self, threshold: &K) -> EvictionOutcome {
        self.evict_where(|k| k < threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(max_hot: usize, max_warm: usize, max_cold: usize) -> TieredCache<u32, Vec<u8>> {
        TieredCache::new(TieredCacheConfig {
            max_hot,
            max_warm,
            max_cold,
            max_size_bytes: 1024 * 1024,
            ttl_hot: Duration::from_millis(1_000),
            ttl_warm: Duration::from_millis(5_000),
        })
        .unwrap()
    }

    fn bytes(n: usize) -> Vec<u8> {
        vec![0u8; n]
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let config = TieredCacheConfig {
            max_warm: 0,
            ..Default::default()
        };
        assert!(TieredCache::<u32, Vec<u8>>::new(config).is_err());
    }

    #[test]
    fn test_full_hot_tier_demotes_oldest() {
        let c = cache(2, 10, 10);
        c.set(1, bytes(1), Tier::Hot);
        c.set(2, bytes(1), Tier::Hot);
        c.set(3, bytes(1), Tier::Hot);

        assert_eq!(c.tier_of(&1), Some(Tier::Warm));
        assert_eq!(c.tier_of(&2), Some(Tier::Hot));
        assert_eq!(c.tier_of(&3), Some(Tier::Hot));
        assert_eq!(c.stats().demotions, 1);
        assert_eq!(c.stats().evictions, 0);
    }

    #[test]
    fn test_full_cold_tier_evicts() {
        let c = cache(1, 1, 1);
        for k in 0..4 {
            c.set(k, bytes(10), Tier::Hot);
        }
        assert_eq!(c.len(), 3);
        assert!(!c.has(&0));
        assert_eq!(c.tier_of(&1), Some(Tier::Cold));
        assert_eq!(c.tier_of(&2), Some(Tier::Warm));
        assert_eq!(c.tier_of(&3), Some(Tier::Hot));
        assert_eq!(c.size_bytes(), 30);
        assert_eq!(c.stats().evictions, 1);
    }

    #[test]
    fn test_get_promotes_one_tier_per_hit() {
        let c = cache(10, 10, 10);
        c.set(7, bytes(4), Tier::Cold);

        assert!(c.get(&7).is_some());
        assert_eq!(c.tier_of(&7), Some(Tier::Warm));
        assert!(c.get(&7).is_some());
        assert_eq!(c.tier_of(&7), Some(Tier::Hot));
        assert!(c.get(&7).is_some());
        assert_eq!(c.tier_of(&7), Some(Tier::Hot));

        let stats = c.stats();
        assert_eq!(stats.promotions, 2);
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_promotion_into_full_tier_demotes_victim() {
        let c = cache(1, 10, 10);
        c.set(1, bytes(1), Tier::Hot);
        c.set(2, bytes(1), Tier::Warm);

        c.get(&2);
        assert_eq!(c.tier_of(&2), Some(Tier::Hot));
        assert_eq!(c.tier_of(&1), Some(Tier::Warm));
    }

    #[test]
    fn test_peek_many_counts_only_hits() {
        let c = cache(4, 4, 4);
        c.set(1, bytes(1), Tier::Cold);
        c.set(3, bytes(3), Tier::Hot);

        let found = c.peek_many([3, 2, 1]);
        assert_eq!(found.iter().map(Vec::len).collect::<Vec<_>>(), vec![3, 1]);
        assert_eq!(c.tier_of(&1), Some(Tier::Cold));
        let stats = c.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.promotions, 0);
    }

    #[test]
    fn test_miss_counts() {
        let c = cache(2, 2, 2);
        assert!(c.get(&99).is_none());
        let stats = c.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 0.0);
    }

    #[test]
    fn test_replace_does_not_double_count() {
        let c = cache(4, 4, 4);
        c.set(1, bytes(100), Tier::Hot);
        c.set(1, bytes(40), Tier::Cold);
        assert_eq!(c.size_bytes(), 40);
        assert_eq!(c.len(), 1);
        assert_eq!(c.tier_of(&1), Some(Tier::Cold));
    }

    #[test]
    fn test_byte_budget_evicts_cold_first() {
        let c: TieredCache<u32, Vec<u8>> = TieredCache::new(TieredCacheConfig {
            max_hot: 10,
            max_warm: 10,
            max_cold: 10,
            max_size_bytes: 100,
            ..Default::default()
        })
        .unwrap();
        c.set(1, bytes(40), Tier::Hot);
        c.set(2, bytes(40), Tier::Cold);
        c.set(3, bytes(40), Tier::Hot);

        assert!(c.has(&1));
        assert!(!c.has(&2));
        assert!(c.has(&3));
        assert_eq!(c.size_bytes(), 80);
    }

    #[test]
    fn test_oversized_value_still_inserted() {
        let c: TieredCache<u32, Vec<u8>> = TieredCache::new(TieredCacheConfig {
            max_size_bytes: 10,
            ..Default::default()
        })
        .unwrap();
        c.set(1, bytes(50), Tier::Hot);
        assert!(c.has(&1));
        assert_eq!(c.size_bytes(), 50);
    }

    #[test]
    fn test_clear_resets_bytes() {
        let c = cache(4, 4, 4);
        c.set(1, bytes(10), Tier::Hot);
        c.set(2, bytes(10), Tier::Warm);
        assert_eq!(c.clear(), 2);
        assert_eq!(c.size_bytes(), 0);
        assert!(c.is_empty());
    }

    #[test]
    fn test_delete_releases_bytes() {
        let c = cache(4, 4, 4);
        c.set(1, bytes(10), Tier::Warm);
        assert!(c.delete(&1));
        assert!(!c.delete(&1));
        assert_eq!(c.size_bytes(), 0);
    }

    #[test]
    fn test_peek_does_not_promote() {
        let c = cache(4, 4, 4);
        c.set(1, bytes(1), Tier::Cold);
        assert!(c.peek(&1).is_some());
        assert_eq!(c.tier_of(&1), Some(Tier::Cold));
        assert_eq!(c.stats().hits, 0);
    }

    #[test]
    fn test_evict_before() {
        let c = cache(4, 4, 4);
        for k in 0..6 {
            c.set(k, bytes(1), Tier::Hot);
        }
        let out = c.evict_before(&3);
        assert_eq!(out.entries, 3);
        assert!(!c.has(&2));
        assert!(c.has(&3));
        assert_eq!(c.size_bytes(), c.recount_bytes());
    }

    #[test]
    fn test_evict_lru_prefers_cold() {
        let c = cache(4, 4, 4);
        c.set(1, bytes(1), Tier::Hot);
        c.set(2, bytes(1), Tier::Cold);
        c.set(3, bytes(1), Tier::Warm);
        let out = c.evict_lru(2);
        assert_eq!(out.entries, 2);
        assert!(c.has(&1));
        assert!(!c.has(&2));
        assert!(!c.has(&3));
    }

    #[test]
    fn test_extend_trims_in_one_pass() {
        let c = cache(2, 3, 10);
        let inserted = c.extend((0..6).map(|k| (k, bytes(2))), Tier::Warm);
        assert_eq!(inserted, 6);

        let stats = c.stats();
        assert_eq!(stats.warm_entries, 3);
        assert_eq!(stats.cold_entries, 3);
        // Oldest inserts end up cold.
        assert_eq!(c.tier_of(&0), Some(Tier::Cold));
        assert_eq!(c.tier_of(&5), Some(Tier::Warm));
        assert_eq!(c.size_bytes(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_sweep_demotes_by_age_not_access() {
        let c = cache(10, 10, 10);
        c.set(1, bytes(1), Tier::Hot);

        tokio::time::advance(Duration::from_millis(900)).await;
        c.get(&1);
        assert_eq!(c.sweep_expired(), SweepReport::default());

        tokio::time::advance(Duration::from_millis(600)).await;
        c.get(&1);
        let report = c.sweep_expired();
        assert_eq!(report.demoted_to_warm, 1);
        assert_eq!(c.tier_of(&1), Some(Tier::Warm));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_sweep_enforces_cold_capacity() {
        let c = cache(10, 10, 1);
        c.set(1, bytes(1), Tier::Warm);
        c.set(2, bytes(1), Tier::Warm);

        tokio::time::advance(Duration::from_millis(5_500)).await;
        let report = c.sweep_expired();
        assert_eq!(report.demoted_to_cold, 2);
        assert_eq!(report.evicted, 1);
        assert_eq!(c.len(), 1);
        assert!(c.has(&2));
    }
}
