// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Process memory levels for the resource manager's cleanup cascade.
//!
//! # Example
//!
//! ```
//! use resource_governor::{MemoryLevel, LevelThresholds};
//!
//! let t = LevelThresholds { gc: 0.70, critical: 0.85, emergency: 0.92 };
//! assert_eq!(MemoryLevel::classify(0.50, &t), MemoryLevel::Healthy);
//! assert_eq!(MemoryLevel::classify(0.80, &t), MemoryLevel::Warning);
//! assert_eq!(MemoryLevel::classify(0.95, &t), MemoryLevel::Emergency);
//! assert!(MemoryLevel::Critical.is_critical_or_worse());
//! ```

use serde::Serialize;

/// Usage ratios (heap used / max heap) separating the levels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelThresholds {
    /// Above this a single collection is requested
    pub gc: f64,
    pub critical: f64,
    pub emergency: f64,
}

/// Memory level derived from the heap usage ratio.
///
/// Four-tier cascade:
/// - **Healthy** (≤ gc): nothing to do
/// - **Warning** (> gc): soft cleanup, one collection
/// - **Critical** (> critical): evict part of the block cache, release pools
/// - **Emergency** (> emergency): clear everything, staggered collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryLevel {
    Healthy = 0,
    Warning = 1,
    Critical = 2,
    Emergency = 3,
}

impl MemoryLevel {
    /// Classify a usage ratio. Comparisons are strict: a ratio exactly at a
    /// threshold stays at the lower level.
    #[must_use]
    pub fn classify(ratio: f64, thresholds: &LevelThresholds) -> Self {
        match ratio {
            r if r > thresholds.emergency => Self::Emergency,
            r if r > thresholds.critical => Self::Critical,
            r if r > thresholds.gc => Self::Warning,
            _ => Self::Healthy,
        }
    }

    #[must_use]
    pub fn is_critical_or_worse(&self) -> bool {
        *self >= Self::Critical
    }

    /// Cleanup this level triggers, if any.
    #[must_use]
    pub fn cleanup_kind(&self) -> Option<CleanupKind> {
        match self {
            Self::Healthy => None,
            Self::Warning => Some(CleanupKind::Soft),
            Self::Critical => Some(CleanupKind::Aggressive),
            Self::Emergency => Some(CleanupKind::Emergency),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Emergency => "emergency",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Healthy => "Memory usage within limits",
            Self::Warning => "Elevated memory usage - collection requested",
            Self::Critical => "Critical memory usage - evicting caches",
            Self::Emergency => "Emergency - clearing caches to avoid OOM",
        }
    }
}

impl std::fmt::Display for MemoryLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cleanup escalation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupKind {
    /// Single collection only
    Soft,
    /// Partial cache eviction, pool release, collection now and later
    Aggressive,
    /// Full cache clear, staggered collections, recovery verification
    Emergency,
}

impl CleanupKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Soft => "soft",
            Self::Aggressive => "aggressive",
            Self::Emergency => "emergency",
        }
    }
}

impl std::fmt::Display for CleanupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
