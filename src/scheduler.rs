// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Periodic background jobs.
//!
//! One tokio task per job. A job body runs to completion before the task
//! waits on its interval again, so a job never overlaps itself; ticks missed
//! while it was running are skipped rather than replayed.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Tasks started together and stopped together.
pub(crate) struct PeriodicJobs {
    shutdown: watch::Sender<bool>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl PeriodicJobs {
    fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            handles: Vec::new(),
        }
    }

    /// Run `job` every `period`, first firing one period from now.
    pub(crate) fn every<F>(&mut self, name: &'static str, period: Duration, mut job: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.every_async(name, period, move || {
            job();
            std::future::ready(())
        });
    }

    /// Async variant of [`every`](Self::every).
    pub(crate) fn every_async<F, Fut>(&mut self, name: &'static str, period: Duration, mut job: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        job().await;
                    }
                }
            }
            debug!(job = name, "periodic job stopped");
        });
        self.handles.push((name, handle));
    }

    fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for (name, handle) in self.handles {
            if !handle.is_finished() {
                debug!(job = name, "stopping periodic job");
            }
            handle.abort();
        }
    }
}

/// Start/stop slot for a component's job set. Both operations are idempotent.
#[derive(Default)]
pub(crate) struct JobSlot {
    jobs: Mutex<Option<PeriodicJobs>>,
}

impl JobSlot {
    /// Spawn the jobs registered by `register`. Returns `false` when already
    /// running or when called outside a tokio runtime.
    pub(crate) fn start<F>(&self, component: &'static str, register: F) -> bool
    where
        F: FnOnce(&mut PeriodicJobs),
    {
        let mut slot = self.jobs.lock();
        if slot.is_some() {
            return false;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            warn!(component, "start() called outside a tokio runtime; jobs not started");
            return false;
        }
        let mut jobs = PeriodicJobs::new();
        register(&mut jobs);
        debug!(component, jobs = jobs.handles.len(), "periodic jobs started");
        *slot = Some(jobs);
        true
    }

    /// Stop all jobs. Returns `false` if nothing was running.
    pub(crate) fn stop(&self) -> bool {
        match self.jobs.lock().take() {
            Some(jobs) => {
                jobs.shutdown();
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.jobs.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_job_fires_each_period() {
        let count = Arc::new(AtomicUsize::new(0));
        let slot = JobSlot::default();
        let c = count.clone();
        assert!(slot.start("test", |jobs| {
            jobs.every("tick", Duration::from_secs(1), move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }));

        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(1_001)).await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 3);

        assert!(slot.stop());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let slot = JobSlot::default();
        assert!(slot.start("test", |_| {}));
        assert!(!slot.start("test", |_| {}));
        assert!(slot.is_running());
        assert!(slot.stop());
        assert!(!slot.stop());
    }

    #[test]
    fn test_start_outside_runtime_refused() {
        let slot = JobSlot::default();
        assert!(!slot.start("test", |_| {}));
        assert!(!slot.is_running());
    }
}
