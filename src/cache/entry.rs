// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::Arc;

use serde::Serialize;
use tokio::time::Instant;

/// Anything with an estimable in-memory footprint.
pub trait SizedItem {
    /// Approximate size in bytes
    #[must_use]
    fn size_bytes(&self) -> usize;
}

impl<T: SizedItem + ?Sized> SizedItem for Arc<T> {
    fn size_bytes(&self) -> usize {
        (**self).size_bytes()
    }
}

impl SizedItem for Vec<u8> {
    fn size_bytes(&self) -> usize {
        self.len()
    }
}

impl SizedItem for String {
    fn size_bytes(&self) -> usize {
        self.len()
    }
}

/// Cache tier, ordered hottest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Hot = 0,
    Warm = 1,
    Cold = 2,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Hot, Tier::Warm, Tier::Cold];

    /// Next tier down, `None` for cold.
    #[must_use]
    pub fn colder(self) -> Option<Tier> {
        match self {
            Self::Hot => Some(Self::Warm),
            Self::Warm => Some(Self::Cold),
            Self::Cold => None,
        }
    }

    /// Next tier up, `None` for hot.
    #[must_use]
    pub fn hotter(self) -> Option<Tier> {
        match self {
            Self::Hot => None,
            Self::Warm => Some(Self::Hot),
            Self::Cold => Some(Self::Warm),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Warm => "warm",
            Self::Cold => "cold",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cached value plus the metadata eviction decisions are made on.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub size_bytes: usize,
    pub created_at: Instant,
    pub last_accessed: Instant,
    pub access_count: u64,
    pub tier: Tier,
    /// Monotonic touch sequence; orders entries whose `last_accessed` collide.
    pub(crate) touch_seq: u64,
}

impl<V> CacheEntry<V> {
    pub(crate) fn new(value: V, size_bytes: usize, tier: Tier, seq: u64) -> Self {
        let now = Instant::now();
        Self {
            value,
            size_bytes,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            tier,
            touch_seq: seq,
        }
    }

    pub(crate) fn record_access(&mut self, seq: u64) {
        self.last_accessed = Instant::now();
        self.access_count = self.access_count.saturating_add(1);
        self.touch_seq = seq;
    }

    /// Age since creation. Reads do not reset it.
    #[must_use]
    pub fn age(&self, now: Instant) -> std::time::Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// LRU ordering key: least recently touched sorts first.
    #[inline]
    pub(crate) fn lru_key(&self) -> (Instant, u64) {
        (self.last_accessed, self.touch_seq)
    }
}
