// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Resource Governor
//!
//! Memory-governance core for a high-throughput node process: keep resident
//! memory bounded while keeping recent blocks and telemetry hot, and shed
//! load before the process runs out of memory.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      MemoryGovernor                         │
//! │  • Normal → Warning → Deferred → Hibernating → Critical    │
//! │  • Hysteresis on the way down                              │
//! │  • Shard EWMA, activation deferral, cold-shard hibernation │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ usage samples
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ResourceManager                         │
//! │  • Adaptive GC threshold from heap growth                  │
//! │  • Soft / aggressive / emergency cleanup cascade           │
//! │  • Heap snapshots, object pools, SLA and trend reports     │
//! └─────────────────────────────────────────────────────────────┘
//!                │                               │
//!                ▼                               ▼
//! ┌───────────────────────────┐   ┌───────────────────────────┐
//! │        BlockCache         │   │     MetricsAggregator     │
//! │  • Hot/warm/cold LRU      │   │  • RingBuffer of points   │
//! │  • TTL demotion           │   │  • 1m / 1h / 1d rollups   │
//! │  • Retention watermark    │   │  • Trends and anomalies   │
//! └───────────────────────────┘   └───────────────────────────┘
//! ```
//!
//! Every component emits [`GovernanceEvent`]s onto one [`EventBus`] and
//! reports through the `metrics` facade (see [`metrics`]) plus a
//! Prometheus text block per component.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resource_governor::{Block, Governance, GovernanceConfig, Tier};
//!
//! #[tokio::main]
//! async fn main() {
//!     let governance = Governance::new(GovernanceConfig::default()).expect("valid config");
//!     governance.initialize();
//!
//!     governance.block_cache().add_block(Block::new(1, vec![0; 1024]), Tier::Hot);
//!     governance.aggregator().record("tx_per_sec", 1250.0, None);
//!
//!     let decision = governance.governor().should_defer_activation("shard-7");
//!     if !decision.defer {
//!         governance.governor().register_shard("shard-7", None);
//!     }
//!
//!     println!("{}", governance.prometheus());
//!     governance.shutdown();
//! }
//! ```
//!
//! ## Modules
//!
//! - [`coordinator`]: the [`Governance`] context owning every component
//! - [`cache`]: generic [`TieredCache`] and the height-keyed [`BlockCache`]
//! - [`ring_buffer`]: fixed-capacity [`RingBuffer`]
//! - [`aggregator`]: multi-resolution [`MetricsAggregator`]
//! - [`resource`]: [`ResourceManager`], collection, pools, snapshots
//! - [`governor`]: predictive [`MemoryGovernor`]
//! - [`config`]: serde configuration with defaults

pub mod aggregator;
pub mod cache;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod governor;
pub mod metrics;
pub mod pressure;
pub mod prometheus;
pub mod resource;
pub mod ring_buffer;
mod scheduler;

pub use aggregator::{
    AggregatedMetric, AggregatorStats, Anomaly, AnomalySeverity, MetricPoint, MetricsAggregator,
    Resolution, Trend,
};
pub use cache::{
    Block, BlockCache, BlockCacheStats, CacheEntry, SizedItem, Tier, TieredCache,
    TieredCacheConfig, TieredCacheStats,
};
pub use config::{
    AggregatorConfig, GovernanceConfig, GovernorConfig, ResourceConfig, RetentionPolicy,
};
pub use coordinator::{Governance, GovernanceHealth, LifecycleState};
pub use error::{ConfigError, SnapshotError};
pub use events::{EventBus, EvictionReason, GovernanceEvent};
pub use governor::{
    DeferDecision, DeferReason, GovernorHealth, GovernorState, MemoryGovernor, ShardMemoryInfo,
    WakeupResult,
};
pub use pressure::{CleanupKind, LevelThresholds, MemoryLevel};
pub use resource::{
    Collector, GcCoordinator, HealthReport, MemorySnapshot, NoopCollector, ProcessSampler,
    ResourceManager, ResourceSample, ResourceSampler, ScriptedSampler, TrimCollector,
};
pub use ring_buffer::RingBuffer;
