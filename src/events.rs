// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! One-way event fan-out.
//!
//! Every component emits [`GovernanceEvent`]s into a shared [`EventBus`].
//! Emission never blocks and never fails: with no subscribers the event is
//! dropped, and a subscriber that falls behind sees `RecvError::Lagged`
//! instead of slowing the emitter down.

use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::aggregator::{Anomaly, Resolution};
use crate::cache::Tier;
use crate::governor::GovernorState;
use crate::pressure::{CleanupKind, MemoryLevel};

/// Why blocks left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionReason {
    /// Below the retention watermark
    Retention,
    /// Memory pressure shed a fraction of the cache
    Pressure,
}

/// Everything the governance core reports outward.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GovernanceEvent {
    BlockAdded {
        number: u64,
        tier: Tier,
    },
    BlocksEvicted {
        count: usize,
        bytes: usize,
        reason: EvictionReason,
    },
    CacheCleared {
        entries: usize,
    },
    Aggregated {
        resolution: Resolution,
        window_start_ms: u64,
        metrics: usize,
    },
    AnomalyDetected(Anomaly),
    MemoryWarning {
        heap_used_mb: f64,
        ratio: f64,
    },
    MemoryCritical {
        heap_used_mb: f64,
        ratio: f64,
    },
    MemoryEmergency {
        heap_used_mb: f64,
        ratio: f64,
    },
    PersistentCritical {
        consecutive: u32,
        time_to_oom_min: Option<f64>,
    },
    /// Result of the delayed check after an emergency cleanup
    EmergencyRecovery {
        recovered: bool,
        freed_mb: f64,
        ratio: f64,
    },
    /// Level returned to healthy from something worse
    MemoryRecovered {
        from: MemoryLevel,
        ratio: f64,
    },
    CleanupCompleted {
        kind: CleanupKind,
        freed_mb: f64,
        duration_ms: u64,
    },
    ShardHibernated {
        shard_id: String,
        freed_mb: f64,
    },
    ShardWoken {
        shard_id: String,
    },
    StateChange {
        from: GovernorState,
        to: GovernorState,
        usage_percent: f64,
    },
    GcCompleted {
        source: &'static str,
        collected: bool,
    },
    SnapshotCaptured {
        path: PathBuf,
    },
}

impl GovernanceEvent {
    /// Stable snake_case name, used for logging and metric labels.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BlockAdded { .. } => "block_added",
            Self::BlocksEvicted { .. } => "blocks_evicted",
            Self::CacheCleared { .. } => "cache_cleared",
            Self::Aggregated { resolution, .. } => match resolution {
                Resolution::Minute => "minute_aggregated",
                Resolution::Hour => "hour_aggregated",
                Resolution::Day => "day_aggregated",
            },
            Self::AnomalyDetected(_) => "anomaly_detected",
            Self::MemoryWarning { .. } => "memory_warning",
            Self::MemoryCritical { .. } => "memory_critical",
            Self::MemoryEmergency { .. } => "memory_emergency",
            Self::PersistentCritical { .. } => "persistent_critical",
            Self::EmergencyRecovery { .. } => "emergency_recovery",
            Self::MemoryRecovered { .. } => "memory_recovered",
            Self::CleanupCompleted { .. } => "cleanup_completed",
            Self::ShardHibernated { .. } => "shard_hibernated",
            Self::ShardWoken { .. } => "shard_woken",
            Self::StateChange { .. } => "state_change",
            Self::GcCompleted { .. } => "gc_completed",
            Self::SnapshotCaptured { .. } => "snapshot_captured",
        }
    }
}

/// Broadcast channel shared by all components.
///
/// Cloning is cheap; all clones publish to the same subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GovernanceEvent>,
}

impl EventBus {
    pub const DEFAULT_CAPACITY: usize = 1024;

    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GovernanceEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Returns the number of subscribers that received it.
    pub fn emit(&self, event: GovernanceEvent) -> usize {
        let kind = event.kind();
        match self.tx.send(event) {
            Ok(n) => n,
            Err(_) => {
                trace!(kind, "event dropped, no subscribers");
                0
            }
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::default();
        assert_eq!(bus.emit(GovernanceEvent::CacheCleared { entries: 3 }), 0);
    }

    #[test]
    fn test_all_clones_share_subscribers() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let clone = bus.clone();
        assert_eq!(clone.emit(GovernanceEvent::ShardWoken { shard_id: "s1".into() }), 1);

        match rx.try_recv().unwrap() {
            GovernanceEvent::ShardWoken { shard_id } => assert_eq!(shard_id, "s1"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_kind_names() {
        let e = GovernanceEvent::Aggregated {
            resolution: Resolution::Hour,
            window_start_ms: 0,
            metrics: 1,
        };
        assert_eq!(e.kind(), "hour_aggregated");
        assert_eq!(
            GovernanceEvent::GcCompleted { source: "test", collected: true }.kind(),
            "gc_completed"
        );
    }

    #[test]
    fn test_events_serialize_tagged() {
        let e = GovernanceEvent::BlocksEvicted {
            count: 2,
            bytes: 10,
            reason: EvictionReason::Retention,
        };
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["event"], "blocks_evicted");
        assert_eq!(json["reason"], "retention");
    }
}
