// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Process memory sampling.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::Serialize;
use sysinfo::{Pid, System};
use tracing::debug;

const MB: f64 = 1024.0 * 1024.0;

/// One memory reading, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ResourceSample {
    /// Memory attributed to the process heap
    pub used_bytes: u64,
    /// Memory reserved for the process (used plus slack)
    pub total_bytes: u64,
    /// Memory held outside the heap (mapped buffers, native allocations)
    pub external_bytes: u64,
    pub rss_bytes: u64,
}

impl ResourceSample {
    #[must_use]
    pub fn used_mb(&self) -> f64 {
        self.used_bytes as f64 / MB
    }

    #[must_use]
    pub fn total_mb(&self) -> f64 {
        self.total_bytes as f64 / MB
    }

    #[must_use]
    pub fn rss_mb(&self) -> f64 {
        self.rss_bytes as f64 / MB
    }
}

/// Source of memory readings for the resource manager.
pub trait ResourceSampler: Send + Sync {
    fn sample(&self) -> ResourceSample;
}

/// Reads the current process through `sysinfo`.
///
/// Rust has no managed heap, so resident set size stands in for heap use and
/// the virtual size for the reserved total.
pub struct ProcessSampler {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl ProcessSampler {
    #[must_use]
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(err) => {
                debug!(error = err, "current pid unavailable; samples will be zero");
                None
            }
        };
        Self {
            system: Mutex::new(System::new()),
            pid,
        }
    }
}

impl Default for ProcessSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler for ProcessSampler {
    fn sample(&self) -> ResourceSample {
        let Some(pid) = self.pid else {
            return ResourceSample::default();
        };
        let mut system = self.system.lock();
        if !system.refresh_process(pid) {
            return ResourceSample::default();
        }
        match system.process(pid) {
            Some(process) => {
                let rss = process.memory();
                ResourceSample {
                    used_bytes: rss,
                    total_bytes: process.virtual_memory().max(rss),
                    external_bytes: 0,
                    rss_bytes: rss,
                }
            }
            None => ResourceSample::default(),
        }
    }
}

/// Replays a fixed sequence of readings, then repeats the last one.
///
/// Useful for driving the manager through a known pressure profile.
pub struct ScriptedSampler {
    samples: Mutex<VecDeque<ResourceSample>>,
    last: Mutex<ResourceSample>,
}

impl ScriptedSampler {
    pub fn new(samples: impl IntoIterator<Item = ResourceSample>) -> Self {
        Self {
            samples: Mutex::new(samples.into_iter().collect()),
            last: Mutex::new(ResourceSample::default()),
        }
    }

    /// Script expressed as heap-used megabytes.
    pub fn from_used_mb(values: impl IntoIterator<Item = f64>) -> Self {
        Self::new(values.into_iter().map(|mb| {
            let bytes = (mb * MB) as u64;
            ResourceSample {
                used_bytes: bytes,
                total_bytes: bytes,
                external_bytes: 0,
                rss_bytes: bytes,
            }
        }))
    }

    /// Append further readings.
    pub fn push(&self, sample: ResourceSample) {
        self.samples.lock().push_back(sample);
    }

    pub fn push_used_mb(&self, mb: f64) {
        let bytes = (mb * MB) as u64;
        self.push(ResourceSample {
            used_bytes: bytes,
            total_bytes: bytes,
            external_bytes: 0,
            rss_bytes: bytes,
        });
    }
}

impl ResourceSampler for ScriptedSampler {
    fn sample(&self) -> ResourceSample {
        let mut last = self.last.lock();
        if let Some(next) = self.samples.lock().pop_front() {
            *last = next;
        }
        *last
    }
}
