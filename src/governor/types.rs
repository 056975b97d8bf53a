// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use serde::Serialize;

use super::shard::ShardMemoryInfo;
use super::state::GovernorState;

/// Why an activation was (or was not) deferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeferReason {
    /// No pressure; activate
    Allowed,
    CriticalState,
    HibernatingState,
    /// Deferred state and one more shard would cross the hibernate threshold
    ProjectedUsage,
    /// Active shard memory plus one estimate exceeds the ceiling
    ShardMemoryCeiling,
    /// Projected peak usage exceeds the defer threshold
    PredictedPeak,
}

impl DeferReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::CriticalState => "critical_state",
            Self::HibernatingState => "hibernating_state",
            Self::ProjectedUsage => "projected_usage",
            Self::ShardMemoryCeiling => "shard_memory_ceiling",
            Self::PredictedPeak => "predicted_peak",
        }
    }
}

impl std::fmt::Display for DeferReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an activation check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DeferDecision {
    pub defer: bool,
    pub reason: DeferReason,
    pub state: GovernorState,
    pub usage_percent: f64,
    /// Memory of active shards other than the one being checked
    pub active_memory_mb: f64,
    pub shard_estimate_mb: f64,
    pub predicted_peak_percent: Option<f64>,
}

/// Result of a wakeup request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum WakeupResult {
    Woken,
    AlreadyActive,
    /// Pressure persists; retry later
    Refused { reason: DeferReason },
    UnknownShard,
}

/// Governor counters.
#[derive(Debug, Clone, Serialize)]
pub struct GovernorStats {
    pub state: GovernorState,
    pub usage_percent: f64,
    pub registered_shards: usize,
    pub active_shards: usize,
    pub hibernated_shards: usize,
    pub active_memory_mb: f64,
    pub transitions: u64,
    pub hibernation_rounds: u64,
    pub shards_hibernated: u64,
    pub wakeups: u64,
    pub wakeups_refused: u64,
    pub activations_deferred: u64,
}

/// Full structured status.
#[derive(Debug, Clone, Serialize)]
pub struct GovernorMetrics {
    pub stats: GovernorStats,
    pub predicted_peak_percent: Option<f64>,
    /// Recent usage samples, oldest first
    pub usage_history: Vec<f64>,
    pub shards: Vec<ShardMemoryInfo>,
}

/// State plus human-readable advice.
#[derive(Debug, Clone, Serialize)]
pub struct GovernorHealth {
    pub state: GovernorState,
    pub healthy: bool,
    pub usage_percent: f64,
    pub predicted_peak_percent: Option<f64>,
    pub recommendations: Vec<String>,
}
