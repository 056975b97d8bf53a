// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Governance context.
//!
//! [`Governance`] owns one instance of each component and wires them in
//! dependency order (leaves first):
//!
//! ```text
//! EventBus, GcCoordinator
//!        │
//!        ├─► BlockCache ──────────┐
//!        ├─► MetricsAggregator ───┤
//!        │                        ▼
//!        └──────────────► ResourceManager ──► MemoryGovernor
//! ```
//!
//! # Lifecycle
//!
//! ```text
//! Created → Starting → Running → ShuttingDown → Stopped
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use resource_governor::{Governance, GovernanceConfig, LifecycleState};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let governance = Governance::new(GovernanceConfig::default()).unwrap();
//! assert_eq!(governance.state(), LifecycleState::Created);
//!
//! governance.initialize();
//! governance.governor().register_shard("shard-a", None);
//! // ...
//! governance.shutdown();
//! # }
//! ```

mod lifecycle;
mod types;

pub use types::{GovernanceHealth, LifecycleState};

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::aggregator::MetricsAggregator;
use crate::cache::BlockCache;
use crate::config::GovernanceConfig;
use crate::error::ConfigError;
use crate::events::{EventBus, GovernanceEvent};
use crate::governor::{GovernorState, MemoryGovernor};
use crate::resource::{
    Collector, GcCoordinator, MemorySnapshot, ProcessSampler, ResourceManager, ResourceSampler,
    TrimCollector,
};

/// Owns every component and their shared event bus.
///
/// There are no process-wide singletons: embed one `Governance` per node
/// process (or several in tests).
pub struct Governance {
    pub(super) config: GovernanceConfig,
    pub(super) events: EventBus,
    pub(super) gc: Arc<GcCoordinator>,
    pub(super) block_cache: Arc<BlockCache>,
    pub(super) aggregator: Arc<MetricsAggregator>,
    pub(super) resource: Arc<ResourceManager>,
    pub(super) governor: Arc<MemoryGovernor>,

    /// Lifecycle state (broadcast to watchers)
    pub(super) state: watch::Sender<LifecycleState>,
    pub(super) state_rx: watch::Receiver<LifecycleState>,

    /// Serializes initialize/shutdown
    pub(super) lifecycle: Mutex<()>,
}

impl Governance {
    /// Build against the real process: RSS sampling and allocator trimming.
    pub fn new(config: GovernanceConfig) -> Result<Self, ConfigError> {
        Self::with_parts(
            config,
            Arc::new(ProcessSampler::new()),
            Arc::new(TrimCollector),
        )
    }

    /// Build with a caller-supplied sampler and collector.
    pub fn with_parts(
        config: GovernanceConfig,
        sampler: Arc<dyn ResourceSampler>,
        collector: Arc<dyn Collector>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let events = EventBus::new(config.event_capacity);
        let gc = Arc::new(GcCoordinator::new(
            collector,
            Duration::from_millis(config.resource.min_gc_interval_ms),
            events.clone(),
        ));

        let block_cache = Arc::new(BlockCache::new(config.cache.clone(), events.clone())?);
        let aggregator = Arc::new(MetricsAggregator::new(
            config.aggregator.clone(),
            gc.clone(),
            events.clone(),
        )?);
        let resource = Arc::new(
            ResourceManager::new(config.resource.clone(), sampler, gc.clone(), events.clone())?
                .with_block_cache(block_cache.clone())
                .with_aggregator(aggregator.clone()),
        );
        let governor = Arc::new(MemoryGovernor::new(
            config.governor.clone(),
            resource.clone(),
            events.clone(),
        )?);

        let (state, state_rx) = watch::channel(LifecycleState::Created);
        debug!(
            max_heap_mb = config.resource.max_heap_mb,
            in_memory_blocks = config.cache.in_memory_blocks,
            "governance context built"
        );
        Ok(Self {
            config,
            events,
            gc,
            block_cache,
            aggregator,
            resource,
            governor,
            state,
            state_rx,
            lifecycle: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.state_rx.borrow()
    }

    /// Watch lifecycle changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<LifecycleState> {
        self.state_rx.clone()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Subscribe to every component's events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GovernanceEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn gc(&self) -> &Arc<GcCoordinator> {
        &self.gc
    }

    #[must_use]
    pub fn block_cache(&self) -> &Arc<BlockCache> {
        &self.block_cache
    }

    #[must_use]
    pub fn aggregator(&self) -> &Arc<MetricsAggregator> {
        &self.aggregator
    }

    #[must_use]
    pub fn resource(&self) -> &Arc<ResourceManager> {
        &self.resource
    }

    #[must_use]
    pub fn governor(&self) -> &Arc<MemoryGovernor> {
        &self.governor
    }

    /// One monitor cycle by hand: sample memory (which may trigger cleanup)
    /// and feed the result to the governor (which may hibernate shards).
    pub fn monitor_once(&self) -> (MemorySnapshot, GovernorState) {
        let snapshot = self.resource.check_memory();
        let state = self.governor.update_usage(snapshot.usage_percent());
        (snapshot, state)
    }

    #[must_use]
    pub fn health(&self) -> GovernanceHealth {
        let resource = self.resource.health_status();
        let governor = self.governor.health_status();
        GovernanceHealth {
            state: self.state(),
            healthy: resource.healthy && governor.healthy,
            resource,
            governor,
            block_cache: self.block_cache.stats(),
            aggregator: self.aggregator.stats(),
        }
    }

    /// Prometheus text for every component, concatenated.
    #[must_use]
    pub fn prometheus(&self) -> String {
        let mut out = self.block_cache.prometheus();
        out.push_str(&self.aggregator.prometheus());
        out.push_str(&self.resource.prometheus());
        out.push_str(&self.governor.prometheus());
        out
    }
}
