// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Governance lifecycle: initialize and shutdown.
//!
//! Components start leaves first and stop in reverse, so no periodic job
//! ever calls into a component whose own jobs are already gone.

use std::time::Instant;

use tracing::{debug, info, warn};

use super::{Governance, LifecycleState};

impl Governance {
    /// Start every component's periodic jobs.
    ///
    /// Startup order:
    /// 1. Block cache (TTL sweep, retention)
    /// 2. Metrics aggregator (rollups, anomaly scan)
    /// 3. Resource manager (memory check), primed with one sample
    /// 4. Memory governor (state machine tick), primed from that sample
    ///
    /// Idempotent. Returns `false` if already running or when called
    /// outside a tokio runtime.
    #[tracing::instrument(skip(self))]
    pub fn initialize(&self) -> bool {
        let _guard = self.lifecycle.lock();
        if self.state() == LifecycleState::Running {
            debug!("governance already running");
            return false;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("initialize() called outside a tokio runtime; nothing started");
            return false;
        }

        let started = Instant::now();
        let _ = self.state.send(LifecycleState::Starting);
        info!("Initializing governance...");

        let phase = Instant::now();
        self.block_cache.start();
        crate::metrics::record_lifecycle_phase("block_cache", phase.elapsed());

        let phase = Instant::now();
        self.aggregator.start();
        crate::metrics::record_lifecycle_phase("aggregator", phase.elapsed());

        let phase = Instant::now();
        self.resource.start();
        let snapshot = self.resource.check_memory();
        crate::metrics::record_lifecycle_phase("resource_manager", phase.elapsed());

        let phase = Instant::now();
        self.governor.start();
        let governor_state = self.governor.tick();
        crate::metrics::record_lifecycle_phase("governor", phase.elapsed());

        let _ = self.state.send(LifecycleState::Running);
        crate::metrics::record_lifecycle_phase("initialize", started.elapsed());
        info!(
            level = %snapshot.level,
            usage_percent = snapshot.usage_percent(),
            governor_state = ?governor_state,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Governance running"
        );
        true
    }

    /// Stop every periodic job in reverse dependency order.
    ///
    /// Idempotent. Component state (cache contents, rollups, shard records)
    /// is kept, so the context can be initialized again.
    #[tracing::instrument(skip(self))]
    pub fn shutdown(&self) -> bool {
        let _guard = self.lifecycle.lock();
        if self.state() != LifecycleState::Running {
            debug!(state = %self.state(), "governance not running");
            return false;
        }

        let started = Instant::now();
        let _ = self.state.send(LifecycleState::ShuttingDown);
        info!("Shutting down governance...");

        self.governor.stop();
        self.resource.stop();
        self.aggregator.stop();
        self.block_cache.stop();

        let _ = self.state.send(LifecycleState::Stopped);
        crate::metrics::record_lifecycle_phase("shutdown", started.elapsed());
        info!("Governance shutdown complete");
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::config::GovernanceConfig;
    use crate::resource::{NoopCollector, ScriptedSampler};

    use super::*;

    fn governance() -> Governance {
        Governance::with_parts(
            GovernanceConfig::default(),
            Arc::new(ScriptedSampler::from_used_mb([100.0])),
            Arc::new(NoopCollector),
        )
        .unwrap()
    }

    #[test]
    fn test_initialize_needs_runtime() {
        let governance = governance();
        assert!(!governance.initialize());
        assert_eq!(governance.state(), LifecycleState::Created);
        assert!(!governance.shutdown());
    }

    #[tokio::test]
    async fn test_initialize_and_shutdown_are_idempotent() {
        let governance = governance();
        let mut rx = governance.state_receiver();

        assert!(governance.initialize());
        assert!(!governance.initialize());
        assert!(governance.is_running());
        assert!(governance.block_cache().is_running());
        assert!(governance.aggregator().is_running());
        assert!(governance.resource().is_running());
        assert!(governance.governor().is_running());
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), LifecycleState::Running);

        // Primed on startup
        assert!(governance.resource().last_snapshot().is_some());

        assert!(governance.shutdown());
        assert!(!governance.shutdown());
        assert_eq!(governance.state(), LifecycleState::Stopped);
        assert!(!governance.block_cache().is_running());
        assert!(!governance.governor().is_running());
    }

    #[tokio::test]
    async fn test_restart_after_shutdown() {
        let governance = governance();
        assert!(governance.initialize());
        assert!(governance.shutdown());
        assert!(governance.initialize());
        assert!(governance.resource().is_running());
        assert!(governance.shutdown());
    }
}
