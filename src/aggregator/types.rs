// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the metrics aggregator.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::clock::{DAY_MS, HOUR_MS, MINUTE_MS};
use crate::ring_buffer::{NumericSample, Timestamped};

/// One raw telemetry sample. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricPoint {
    pub timestamp_ms: u64,
    pub name: String,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
}

impl MetricPoint {
    #[must_use]
    pub fn new(name: impl Into<String>, value: f64, timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            name: name.into(),
            value,
            tags: None,
        }
    }

    #[must_use]
    pub fn with_tags(mut self, tags: BTreeMap<String, String>) -> Self {
        self.tags = Some(tags);
        self
    }
}

impl Timestamped for MetricPoint {
    fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }
}

impl NumericSample for MetricPoint {
    fn sample_name(&self) -> &str {
        &self.name
    }

    fn sample_value(&self) -> f64 {
        self.value
    }
}

/// Rollup resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Minute,
    Hour,
    Day,
}

impl Resolution {
    /// Window width in milliseconds.
    #[must_use]
    pub fn width_ms(&self) -> u64 {
        match self {
            Self::Minute => MINUTE_MS,
            Self::Hour => HOUR_MS,
            Self::Day => DAY_MS,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a metric over its trend window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    #[default]
    Stable,
}

/// Statistical summary of one metric over one window.
///
/// Keyed by `(name, window_start_ms)`; never modified after creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedMetric {
    pub name: String,
    pub resolution: Resolution,
    pub window_start_ms: u64,
    pub count: u64,
    pub sum: f64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub std_dev: f64,
    pub trend: Trend,
}

/// How far a sample strayed from its baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalySeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AnomalySeverity {
    /// Severity for a deviation already known to exceed the anomaly threshold.
    #[must_use]
    pub fn from_deviation(deviation: f64) -> Self {
        match deviation {
            d if d >= 5.0 => Self::Critical,
            d if d >= 4.0 => Self::High,
            d if d >= 3.5 => Self::Medium,
            _ => Self::Low,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// A sample that deviated from its metric's recent baseline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    pub name: String,
    pub value: f64,
    pub baseline_mean: f64,
    pub baseline_std_dev: f64,
    /// |value − mean| / max(std_dev, 1)
    pub deviation: f64,
    pub severity: AnomalySeverity,
    pub detected_at_ms: u64,
}

/// Aggregator statistics.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatorStats {
    pub raw_points: usize,
    pub raw_capacity: usize,
    pub raw_overwrites: u64,
    pub estimated_raw_bytes: usize,
    pub minute_buckets: usize,
    pub hour_buckets: usize,
    pub day_buckets: usize,
    pub tracked_metrics: usize,
    pub anomalies: usize,
    pub points_ingested: u64,
    pub points_rejected: u64,
    pub forced_cleanups: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_bands() {
        assert_eq!(AnomalySeverity::from_deviation(3.1), AnomalySeverity::Low);
        assert_eq!(AnomalySeverity::from_deviation(3.5), AnomalySeverity::Medium);
        assert_eq!(AnomalySeverity::from_deviation(4.0), AnomalySeverity::High);
        assert_eq!(AnomalySeverity::from_deviation(4.99), AnomalySeverity::High);
        assert_eq!(AnomalySeverity::from_deviation(5.0), AnomalySeverity::Critical);
        assert!(AnomalySeverity::High < AnomalySeverity::Critical);
    }

    #[test]
    fn test_resolution_widths() {
        assert_eq!(Resolution::Minute.width_ms(), 60_000);
        assert_eq!(Resolution::Hour.width_ms(), 3_600_000);
        assert_eq!(Resolution::Day.width_ms(), 86_400_000);
    }
}
