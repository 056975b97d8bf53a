// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-metric rolling windows used for trend classification and anomaly
//! baselines.

use std::collections::{HashMap, VecDeque};

use super::stats::mean_std;
use super::types::Trend;

/// Compare the mean of the first third against the last third.
///
/// A relative change inside `±dead_band` is stable. Fewer than three values
/// is always stable.
pub(crate) fn classify(values: &VecDeque<f64>, dead_band: f64) -> Trend {
    let n = values.len();
    if n < 3 {
        return Trend::Stable;
    }
    let third = n / 3;
    let first = values.iter().take(third).sum::<f64>() / third as f64;
    let last = values.iter().skip(n - third).sum::<f64>() / third as f64;

    let change = if first.abs() > f64::EPSILON {
        (last - first) / first.abs()
    } else if last.abs() > f64::EPSILON {
        last.signum()
    } else {
        0.0
    };

    if change > dead_band {
        Trend::Up
    } else if change < -dead_band {
        Trend::Down
    } else {
        Trend::Stable
    }
}

struct Window {
    values: VecDeque<f64>,
    /// Total values ever pushed; lets the anomaly scan skip unchanged windows.
    pushed: u64,
    scanned: u64,
}

/// Bounded value history per metric name.
pub(crate) struct TrendWindows {
    capacity: usize,
    windows: HashMap<String, Window>,
}

impl TrendWindows {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            windows: HashMap::new(),
        }
    }

    pub fn push(&mut self, name: &str, value: f64) {
        let capacity = self.capacity;
        if !self.windows.contains_key(name) {
            self.windows.insert(
                name.to_string(),
                Window {
                    values: VecDeque::with_capacity(capacity),
                    pushed: 0,
                    scanned: 0,
                },
            );
        }
        if let Some(window) = self.windows.get_mut(name) {
            if window.values.len() >= capacity {
                window.values.pop_front();
            }
            window.values.push_back(value);
            window.pushed += 1;
        }
    }

    pub fn trend(&self, name: &str, dead_band: f64) -> Trend {
        self.windows
            .get(name)
            .map_or(Trend::Stable, |w| classify(&w.values, dead_band))
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Latest value plus the baseline (mean, std) of everything before it,
    /// for each metric with at least `min_samples` values that received
    /// new data since the previous call.
    pub fn take_unscanned(&mut self, min_samples: usize) -> Vec<(String, f64, f64, f64)> {
        let mut out = Vec::new();
        for (name, window) in &mut self.windows {
            if window.pushed == window.scanned || window.values.len() < min_samples {
                continue;
            }
            window.scanned = window.pushed;
            let Some(&latest) = window.values.back() else {
                continue;
            };
            let baseline: Vec<f64> = window
                .values
                .iter()
                .take(window.values.len() - 1)
                .copied()
                .collect();
            let (mean, std) = mean_std(&baseline);
            out.push((name.clone(), latest, mean, std));
        }
        out
    }

    /// Keep only the most recent `keep` values per metric.
    pub fn trim(&mut self, keep: usize) {
        for window in self.windows.values_mut() {
            while window.values.len() > keep {
                window.values.pop_front();
            }
            window.values.shrink_to_fit();
        }
    }
}
