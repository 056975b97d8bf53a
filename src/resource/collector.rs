// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Forced-collection hook and its rate limiter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::events::{EventBus, GovernanceEvent};

/// Something that can be asked to return memory to the system.
pub trait Collector: Send + Sync {
    /// Returns `true` if a collection actually ran.
    fn request_collection(&self) -> bool;

    fn name(&self) -> &'static str {
        "collector"
    }
}

/// Collector that never collects. Counters still move.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCollector;

impl Collector for NoopCollector {
    fn request_collection(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// Returns freed heap pages to the OS with glibc's `malloc_trim(0)`.
///
/// On other targets this behaves like [`NoopCollector`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TrimCollector;

impl Collector for TrimCollector {
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    fn request_collection(&self) -> bool {
        // SAFETY: malloc_trim only walks allocator arenas; it takes no
        // pointers from us and is safe to call from any thread.
        unsafe { libc::malloc_trim(0) != 0 }
    }

    #[cfg(not(all(target_os = "linux", target_env = "gnu")))]
    fn request_collection(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "malloc_trim"
    }
}

/// What happened to a collection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GcOutcome {
    /// Collector ran and reported work done
    Collected,
    /// Collector ran but reported nothing collected
    NotCollected,
    /// Dropped: too soon after the previous request
    RateLimited,
}

impl GcOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collected => "collected",
            Self::NotCollected => "not_collected",
            Self::RateLimited => "rate_limited",
        }
    }
}

/// Collection request counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct GcStats {
    pub requested: u64,
    pub executed: u64,
    pub collected: u64,
    pub rate_limited: u64,
}

/// Rate-limited front for a [`Collector`].
///
/// Requests closer together than `min_interval` are dropped so sustained
/// pressure cannot turn into a collection storm.
pub struct GcCoordinator {
    collector: Arc<dyn Collector>,
    min_interval: Duration,
    last_run: Mutex<Option<Instant>>,
    requested: AtomicU64,
    executed: AtomicU64,
    collected: AtomicU64,
    rate_limited: AtomicU64,
    events: EventBus,
}

impl GcCoordinator {
    pub fn new(collector: Arc<dyn Collector>, min_interval: Duration, events: EventBus) -> Self {
        Self {
            collector,
            min_interval,
            last_run: Mutex::new(None),
            requested: AtomicU64::new(0),
            executed: AtomicU64::new(0),
            collected: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
            events,
        }
    }

    /// Ask for a collection on behalf of `source`.
    pub fn request(&self, source: &'static str) -> GcOutcome {
        self.requested.fetch_add(1, Ordering::Relaxed);
        {
            let mut last = self.last_run.lock();
            let now = Instant::now();
            if let Some(prev) = *last {
                if now.saturating_duration_since(prev) < self.min_interval {
                    self.rate_limited.fetch_add(1, Ordering::Relaxed);
                    crate::metrics::record_gc_request(source, GcOutcome::RateLimited.as_str());
                    trace!(source, "collection request rate limited");
                    return GcOutcome::RateLimited;
                }
            }
            *last = Some(now);
        }

        self.executed.fetch_add(1, Ordering::Relaxed);
        let collected = self.collector.request_collection();
        let outcome = if collected {
            self.collected.fetch_add(1, Ordering::Relaxed);
            GcOutcome::Collected
        } else {
            GcOutcome::NotCollected
        };
        crate::metrics::record_gc_request(source, outcome.as_str());
        debug!(source, collector = self.collector.name(), outcome = outcome.as_str(), "collection requested");
        self.events
            .emit(GovernanceEvent::GcCompleted { source, collected });
        outcome
    }

    #[must_use]
    pub fn stats(&self) -> GcStats {
        GcStats {
            requested: self.requested.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            collected: self.collected.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
        }
    }
}
