// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-shard memory bookkeeping.
//!
//! The governor never owns shard data, only these records.

use serde::Serialize;

/// Memory accounting for one logical shard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShardMemoryInfo {
    pub shard_id: String,
    pub estimated_mb: f64,
    /// Last reported sample
    pub actual_mb: Option<f64>,
    /// Exponentially weighted average of reported samples
    pub ewma_actual_mb: Option<f64>,
    pub last_accessed_ms: u64,
    pub access_count: u64,
    pub is_hibernated: bool,
    pub hibernated_at_ms: Option<u64>,
}

impl ShardMemoryInfo {
    pub(crate) fn new(shard_id: String, estimated_mb: f64, now_ms: u64) -> Self {
        Self {
            shard_id,
            estimated_mb,
            actual_mb: None,
            ewma_actual_mb: None,
            last_accessed_ms: now_ms,
            access_count: 0,
            is_hibernated: false,
            hibernated_at_ms: None,
        }
    }

    /// Best current guess: the smoothed sample, or the estimate before any
    /// sample arrived.
    #[must_use]
    pub fn effective_mb(&self) -> f64 {
        self.ewma_actual_mb.unwrap_or(self.estimated_mb)
    }

    /// Fold a sample into the EWMA. The first sample seeds it.
    pub(crate) fn observe(&mut self, sample_mb: f64, alpha: f64) {
        self.actual_mb = Some(sample_mb);
        self.ewma_actual_mb = Some(match self.ewma_actual_mb {
            Some(prev) => alpha * sample_mb + (1.0 - alpha) * prev,
            None => sample_mb,
        });
    }

    pub(crate) fn touch(&mut self, now_ms: u64) {
        self.last_accessed_ms = now_ms;
        self.access_count += 1;
    }

    /// Hibernation rank: last access time discounted by 1s per access.
    /// Lowest scores are hibernated first.
    #[must_use]
    pub fn coldness_score(&self) -> i128 {
        i128::from(self.last_accessed_ms) - i128::from(self.access_count) * 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ewma_seeds_then_smooths() {
        let mut shard = ShardMemoryInfo::new("s".into(), 15.0, 0);
        assert_eq!(shard.effective_mb(), 15.0);
        shard.observe(10.0, 0.3);
        assert_eq!(shard.effective_mb(), 10.0);
        shard.observe(20.0, 0.3);
        assert!((shard.effective_mb() - 13.0).abs() < 1e-9);
        assert_eq!(shard.actual_mb, Some(20.0));
    }

    #[test]
    fn test_score_discounts_recency_by_frequency() {
        let mut shard = ShardMemoryInfo::new("a".into(), 1.0, 10_000);
        assert_eq!(shard.coldness_score(), 10_000);
        for _ in 0..3 {
            shard.touch(10_000);
        }
        assert_eq!(shard.coldness_score(), 7_000);
        // Scores may go negative for old, busy shards.
        let mut early = ShardMemoryInfo::new("b".into(), 1.0, 0);
        early.touch(0);
        assert_eq!(early.coldness_score(), -1_000);
    }
}
