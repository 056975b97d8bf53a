// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Reports produced by the resource manager.

use std::collections::VecDeque;

use serde::Serialize;

use super::collector::GcStats;
use super::pool::PoolStats;
use super::sampler::ResourceSample;
use crate::aggregator::AggregatorStats;
use crate::cache::BlockCacheStats;
use crate::pressure::{CleanupKind, MemoryLevel};

/// Durations kept for cleanup statistics.
pub(crate) const MAX_CLEANUP_DURATIONS: usize = 100;

/// Memory state at one monitor tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemorySnapshot {
    /// Sample number, starting at 1
    pub seq: u64,
    pub at_ms: u64,
    pub sample: ResourceSample,
    pub heap_used_mb: f64,
    pub heap_total_mb: f64,
    pub rss_mb: f64,
    /// heap used / max heap
    pub usage_ratio: f64,
    pub level: MemoryLevel,
    /// GC threshold after growth-based adjustment
    pub effective_gc_threshold: f64,
    pub growth_rate_mb_per_min: f64,
}

impl MemorySnapshot {
    #[must_use]
    pub fn usage_percent(&self) -> f64 {
        self.usage_ratio * 100.0
    }
}

/// One entry in the bounded event history.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryEventRecord {
    pub at_ms: u64,
    pub kind: &'static str,
    pub level: MemoryLevel,
    pub message: String,
    pub heap_used_mb: f64,
    pub ratio: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freed_mb: Option<f64>,
}

/// Cumulative cleanup counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupStats {
    pub soft: u64,
    pub aggressive: u64,
    pub emergency: u64,
    pub gc_requests: u64,
    pub total_freed_mb: f64,
    pub last_kind: Option<CleanupKind>,
    pub last_cleanup_ms: Option<u64>,
    /// Most recent cleanup durations, oldest first
    pub recent_durations_ms: VecDeque<u64>,
}

impl CleanupStats {
    pub(crate) fn record(&mut self, kind: CleanupKind, freed_mb: f64, duration_ms: u64, at_ms: u64) {
        match kind {
            CleanupKind::Soft => self.soft += 1,
            CleanupKind::Aggressive => self.aggressive += 1,
            CleanupKind::Emergency => self.emergency += 1,
        }
        self.total_freed_mb += freed_mb.max(0.0);
        self.last_kind = Some(kind);
        self.last_cleanup_ms = Some(at_ms);
        if self.recent_durations_ms.len() >= MAX_CLEANUP_DURATIONS {
            self.recent_durations_ms.pop_front();
        }
        self.recent_durations_ms.push_back(duration_ms);
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.soft + self.aggressive + self.emergency
    }

    #[must_use]
    pub fn avg_duration_ms(&self) -> f64 {
        if self.recent_durations_ms.is_empty() {
            return 0.0;
        }
        self.recent_durations_ms.iter().sum::<u64>() as f64 / self.recent_durations_ms.len() as f64
    }
}

/// Result of one cleanup pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CleanupReport {
    pub kind: CleanupKind,
    pub freed_mb: f64,
    pub duration_ms: u64,
    pub evicted_blocks: usize,
    pub released_pooled: usize,
}

/// Per-level check counts and uptime accounting.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub(crate) struct SlaCounters {
    pub total: u64,
    pub healthy: u64,
    pub warning: u64,
    pub critical: u64,
    pub emergency: u64,
    pub downtime_ms: u64,
}

impl SlaCounters {
    pub fn record(&mut self, level: MemoryLevel, check_interval_ms: u64) {
        self.total += 1;
        match level {
            MemoryLevel::Healthy => self.healthy += 1,
            MemoryLevel::Warning => self.warning += 1,
            MemoryLevel::Critical => self.critical += 1,
            MemoryLevel::Emergency => self.emergency += 1,
        }
        if level != MemoryLevel::Healthy {
            self.downtime_ms += check_interval_ms;
        }
    }
}

/// Healthy-uptime report against the configured target.
#[derive(Debug, Clone, Serialize)]
pub struct SlaReport {
    pub total_checks: u64,
    pub healthy_checks: u64,
    pub warning_checks: u64,
    pub critical_checks: u64,
    pub emergency_checks: u64,
    pub uptime_ms: u64,
    pub downtime_ms: u64,
    pub uptime_percent: f64,
    pub healthy_percent: f64,
    pub target_uptime_percent: f64,
    pub meets_target: bool,
}

/// Heap statistics over the trend window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TrendAnalysis {
    pub samples: usize,
    pub avg_heap_mb: f64,
    pub max_heap_mb: f64,
    pub min_heap_mb: f64,
    pub growth_rate_mb_per_min: f64,
    /// Minutes until the effective GC threshold at the current growth rate
    pub minutes_to_gc_threshold: Option<f64>,
    /// Population standard deviation of heap used
    pub volatility_mb: f64,
}

/// Full structured status.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceMetrics {
    pub snapshot: Option<MemorySnapshot>,
    pub consecutive_critical: u32,
    pub max_heap_mb: u64,
    pub cleanup: CleanupStats,
    pub gc: GcStats,
    pub sla: SlaReport,
    pub trend: TrendAnalysis,
    pub pools: Vec<(&'static str, PoolStats)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_cache: Option<BlockCacheStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregator: Option<AggregatorStats>,
}

/// Level plus human-readable advice.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub level: MemoryLevel,
    pub healthy: bool,
    pub usage_percent: f64,
    pub growth_rate_mb_per_min: f64,
    pub recommendations: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_durations_are_bounded() {
        let mut stats = CleanupStats::default();
        for i in 0..150 {
            stats.record(CleanupKind::Soft, 1.0, i, i);
        }
        assert_eq!(stats.recent_durations_ms.len(), MAX_CLEANUP_DURATIONS);
        assert_eq!(stats.recent_durations_ms.front(), Some(&50));
        assert_eq!(stats.soft, 150);
        assert_eq!(stats.total_freed_mb, 150.0);
    }

    #[test]
    fn test_sla_downtime_accrues_on_unhealthy_checks() {
        let mut sla = SlaCounters::default();
        sla.record(MemoryLevel::Healthy, 1000);
        sla.record(MemoryLevel::Critical, 1000);
        sla.record(MemoryLevel::Warning, 1000);
        assert_eq!(sla.total, 3);
        assert_eq!(sla.downtime_ms, 2000);
        assert_eq!(sla.healthy, 1);
    }
}
