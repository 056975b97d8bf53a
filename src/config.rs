// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the governance core.
//!
//! # Example
//!
//! ```
//! use resource_governor::GovernanceConfig;
//!
//! // Minimal config (uses defaults)
//! let config = GovernanceConfig::default();
//! assert_eq!(config.resource.max_heap_mb, 2048);
//! assert!(config.validate().is_ok());
//!
//! // Partial config from JSON, everything else defaulted
//! let config: GovernanceConfig = serde_json::from_str(
//!     r#"{ "governor": { "max_total_shard_memory_mb": 30 } }"#,
//! ).unwrap();
//! assert_eq!(config.governor.max_total_shard_memory_mb, 30.0);
//! assert_eq!(config.governor.shard_memory_estimate_mb, 15.0);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::TieredCacheConfig;
use crate::error::ConfigError;

const MB: usize = 1024 * 1024;

/// Top-level configuration, one section per component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GovernanceConfig {
    #[serde(default)]
    pub cache: RetentionPolicy,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub resource: ResourceConfig,
    #[serde(default)]
    pub governor: GovernorConfig,
    /// Event bus buffer per subscriber
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_event_capacity() -> usize { 1024 }

impl GovernanceConfig {
    /// Validate every section. Nothing is clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cache.validate()?;
        self.aggregator.validate()?;
        self.resource.validate()?;
        self.governor.validate()?;
        ConfigError::check_nonzero("event_capacity", self.event_capacity)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Block retention
// ═══════════════════════════════════════════════════════════════════════════

/// How many blocks stay resident, and where.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Blocks kept below the watermark before retention eviction
    #[serde(default = "default_in_memory_blocks")]
    pub in_memory_blocks: u64,
    #[serde(default = "default_hot_cache_blocks")]
    pub hot_cache_blocks: usize,
    #[serde(default = "default_warm_cache_blocks")]
    pub warm_cache_blocks: usize,
    #[serde(default = "default_max_cache_size_mb")]
    pub max_cache_size_mb: usize,
    #[serde(default = "default_ttl_hot_ms")]
    pub ttl_hot_ms: u64,
    #[serde(default = "default_ttl_warm_ms")]
    pub ttl_warm_ms: u64,
    /// Heights below the watermark worth preloading when missing
    #[serde(default = "default_preload_blocks")]
    pub preload_blocks: u64,
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    #[serde(default = "default_eviction_interval_ms")]
    pub eviction_interval_ms: u64,
}

fn default_in_memory_blocks() -> u64 { 1000 }
fn default_hot_cache_blocks() -> usize { 100 }
fn default_warm_cache_blocks() -> usize { 400 }
fn default_max_cache_size_mb() -> usize { 256 }
fn default_ttl_hot_ms() -> u64 { 60_000 }
fn default_ttl_warm_ms() -> u64 { 300_000 }
fn default_preload_blocks() -> u64 { 20 }
fn default_sweep_interval_ms() -> u64 { 30_000 }
fn default_eviction_interval_ms() -> u64 { 60_000 }

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            in_memory_blocks: default_in_memory_blocks(),
            hot_cache_blocks: default_hot_cache_blocks(),
            warm_cache_blocks: default_warm_cache_blocks(),
            max_cache_size_mb: default_max_cache_size_mb(),
            ttl_hot_ms: default_ttl_hot_ms(),
            ttl_warm_ms: default_ttl_warm_ms(),
            preload_blocks: default_preload_blocks(),
            sweep_interval_ms: default_sweep_interval_ms(),
            eviction_interval_ms: default_eviction_interval_ms(),
        }
    }
}

impl RetentionPolicy {
    /// Tier limits for the underlying cache. The cold tier holds whatever
    /// the retention window allows beyond hot and warm.
    #[must_use]
    pub fn tiered_config(&self) -> TieredCacheConfig {
        TieredCacheConfig {
            max_hot: self.hot_cache_blocks,
            max_warm: self.warm_cache_blocks,
            max_cold: usize::try_from(self.in_memory_blocks)
                .unwrap_or(usize::MAX)
                .max(1),
            max_size_bytes: self.max_cache_size_mb.saturating_mul(MB),
            ttl_hot: Duration::from_millis(self.ttl_hot_ms),
            ttl_warm: Duration::from_millis(self.ttl_warm_ms),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::check_nonzero("cache.in_memory_blocks", self.in_memory_blocks)?;
        ConfigError::check_nonzero("cache.sweep_interval_ms", self.sweep_interval_ms)?;
        ConfigError::check_nonzero("cache.eviction_interval_ms", self.eviction_interval_ms)?;
        self.tiered_config().validate()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Metrics aggregator
// ═══════════════════════════════════════════════════════════════════════════

/// Rollup, retention and anomaly settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    #[serde(default = "default_raw_buffer_capacity")]
    pub raw_buffer_capacity: usize,
    #[serde(default = "default_minute_interval_ms")]
    pub minute_interval_ms: u64,
    #[serde(default = "default_hour_interval_ms")]
    pub hour_interval_ms: u64,
    #[serde(default = "default_day_interval_ms")]
    pub day_interval_ms: u64,
    #[serde(default = "default_anomaly_interval_ms")]
    pub anomaly_interval_ms: u64,

    /// Bucket caps per resolution (7 days / 30 days / 1 year)
    #[serde(default = "default_max_minute_buckets")]
    pub max_minute_buckets: usize,
    #[serde(default = "default_max_hour_buckets")]
    pub max_hour_buckets: usize,
    #[serde(default = "default_max_day_buckets")]
    pub max_day_buckets: usize,

    /// Per-metric rolling window used for trend and anomaly baselines
    #[serde(default = "default_trend_window")]
    pub trend_window: usize,
    /// Relative change below which a trend is stable
    #[serde(default = "default_trend_dead_band")]
    pub trend_dead_band: f64,
    #[serde(default = "default_min_anomaly_samples")]
    pub min_anomaly_samples: usize,
    /// Deviation (in standard deviations) above which a sample is anomalous
    #[serde(default = "default_anomaly_threshold")]
    pub anomaly_threshold: f64,
    #[serde(default = "default_max_anomalies")]
    pub max_anomalies: usize,

    /// Process memory budget the raw buffer is measured against
    #[serde(default = "default_memory_budget_bytes")]
    pub memory_budget_bytes: usize,
    #[serde(default = "default_raw_memory_fraction")]
    pub raw_memory_fraction: f64,
    /// Estimated footprint of one buffered point
    #[serde(default = "default_point_size_bytes")]
    pub point_size_bytes: usize,
}

fn default_raw_buffer_capacity() -> usize { 100_000 }
fn default_minute_interval_ms() -> u64 { 60_000 }
fn default_hour_interval_ms() -> u64 { 3_600_000 }
fn default_day_interval_ms() -> u64 { 86_400_000 }
fn default_anomaly_interval_ms() -> u64 { 30_000 }
fn default_max_minute_buckets() -> usize { 10_080 }
fn default_max_hour_buckets() -> usize { 720 }
fn default_max_day_buckets() -> usize { 365 }
fn default_trend_window() -> usize { 100 }
fn default_trend_dead_band() -> f64 { 0.10 }
fn default_min_anomaly_samples() -> usize { 10 }
fn default_anomaly_threshold() -> f64 { 3.0 }
fn default_max_anomalies() -> usize { 100 }
fn default_memory_budget_bytes() -> usize { 2048 * MB }
fn default_raw_memory_fraction() -> f64 { 0.10 }
fn default_point_size_bytes() -> usize { 128 }

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            raw_buffer_capacity: default_raw_buffer_capacity(),
            minute_interval_ms: default_minute_interval_ms(),
            hour_interval_ms: default_hour_interval_ms(),
            day_interval_ms: default_day_interval_ms(),
            anomaly_interval_ms: default_anomaly_interval_ms(),
            max_minute_buckets: default_max_minute_buckets(),
            max_hour_buckets: default_max_hour_buckets(),
            max_day_buckets: default_max_day_buckets(),
            trend_window: default_trend_window(),
            trend_dead_band: default_trend_dead_band(),
            min_anomaly_samples: default_min_anomaly_samples(),
            anomaly_threshold: default_anomaly_threshold(),
            max_anomalies: default_max_anomalies(),
            memory_budget_bytes: default_memory_budget_bytes(),
            raw_memory_fraction: default_raw_memory_fraction(),
            point_size_bytes: default_point_size_bytes(),
        }
    }
}

impl AggregatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::check_nonzero("aggregator.raw_buffer_capacity", self.raw_buffer_capacity)?;
        for (field, ms) in [
            ("aggregator.minute_interval_ms", self.minute_interval_ms),
            ("aggregator.hour_interval_ms", self.hour_interval_ms),
            ("aggregator.day_interval_ms", self.day_interval_ms),
            ("aggregator.anomaly_interval_ms", self.anomaly_interval_ms),
        ] {
            ConfigError::check_nonzero(field, ms)?;
        }
        ConfigError::check_nonzero("aggregator.max_minute_buckets", self.max_minute_buckets)?;
        ConfigError::check_nonzero("aggregator.max_hour_buckets", self.max_hour_buckets)?;
        ConfigError::check_nonzero("aggregator.max_day_buckets", self.max_day_buckets)?;
        ConfigError::check_nonzero("aggregator.trend_window", self.trend_window)?;
        ConfigError::check_nonzero("aggregator.max_anomalies", self.max_anomalies)?;
        ConfigError::check_ratio("aggregator.trend_dead_band", self.trend_dead_band)?;
        ConfigError::check_ratio("aggregator.raw_memory_fraction", self.raw_memory_fraction)?;
        if self.min_anomaly_samples < 2 {
            return Err(ConfigError::Invalid {
                field: "aggregator.min_anomaly_samples",
                reason: "need at least 2 samples to form a baseline".into(),
            });
        }
        if !(self.anomaly_threshold > 0.0) {
            return Err(ConfigError::Invalid {
                field: "aggregator.anomaly_threshold",
                reason: format!("must be positive, got {}", self.anomaly_threshold),
            });
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Resource manager
// ═══════════════════════════════════════════════════════════════════════════

/// Sampling, thresholds and cleanup escalation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
    #[serde(default = "default_max_heap_mb")]
    pub max_heap_mb: u64,

    /// Usage ratios, strictly ascending
    #[serde(default = "default_gc_threshold")]
    pub gc_threshold: f64,
    #[serde(default = "default_critical_threshold")]
    pub critical_threshold: f64,
    #[serde(default = "default_emergency_threshold")]
    pub emergency_threshold: f64,

    /// Lower the GC threshold when heap growth is fast
    #[serde(default = "default_true")]
    pub adaptive_thresholds: bool,
    #[serde(default = "default_fast_growth_mb_per_min")]
    pub fast_growth_mb_per_min: f64,
    #[serde(default = "default_fast_growth_reduction")]
    pub fast_growth_reduction: f64,
    #[serde(default = "default_moderate_growth_mb_per_min")]
    pub moderate_growth_mb_per_min: f64,
    #[serde(default = "default_moderate_growth_reduction")]
    pub moderate_growth_reduction: f64,
    /// Samples used for the growth-rate delta
    #[serde(default = "default_growth_window")]
    pub growth_window: usize,

    /// Sample and event history length
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    /// Samples used by trend analysis
    #[serde(default = "default_trend_window_size")]
    pub trend_window_size: usize,

    /// Fraction of the block cache evicted on critical
    #[serde(default = "default_critical_evict_fraction")]
    pub critical_evict_fraction: f64,
    #[serde(default = "default_persistent_critical_samples")]
    pub persistent_critical_samples: u32,
    /// Window in which a repeated alert for the same level is suppressed
    #[serde(default = "default_alert_cooldown_ms")]
    pub alert_cooldown_ms: u64,

    #[serde(default = "default_min_gc_interval_ms")]
    pub min_gc_interval_ms: u64,
    /// Delay of the second collection after a critical cleanup
    #[serde(default = "default_delayed_gc_ms")]
    pub delayed_gc_ms: u64,
    /// Offsets of emergency collections
    #[serde(default = "default_emergency_gc_delays_ms")]
    pub emergency_gc_delays_ms: Vec<u64>,
    #[serde(default = "default_recovery_check_ms")]
    pub recovery_check_ms: u64,

    /// Heap snapshot directory (None = snapshots disabled)
    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,
    #[serde(default = "default_snapshot_min_interval_ms")]
    pub snapshot_min_interval_ms: u64,
    #[serde(default = "default_max_snapshots")]
    pub max_snapshots: usize,

    /// Healthy-uptime percentage target
    #[serde(default = "default_sla_target_uptime")]
    pub sla_target_uptime: f64,

    /// Object pool bounds
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: usize,
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

fn default_true() -> bool { true }
fn default_check_interval_ms() -> u64 { 10_000 }
fn default_max_heap_mb() -> u64 { 2048 }
fn default_gc_threshold() -> f64 { 0.70 }
fn default_critical_threshold() -> f64 { 0.85 }
fn default_emergency_threshold() -> f64 { 0.92 }
fn default_fast_growth_mb_per_min() -> f64 { 10.0 }
fn default_fast_growth_reduction() -> f64 { 0.10 }
fn default_moderate_growth_mb_per_min() -> f64 { 5.0 }
fn default_moderate_growth_reduction() -> f64 { 0.05 }
fn default_growth_window() -> usize { 10 }
fn default_history_size() -> usize { 360 }
fn default_trend_window_size() -> usize { 30 }
fn default_critical_evict_fraction() -> f64 { 0.25 }
fn default_persistent_critical_samples() -> u32 { 5 }
fn default_alert_cooldown_ms() -> u64 { 60_000 }
fn default_min_gc_interval_ms() -> u64 { 100 }
fn default_delayed_gc_ms() -> u64 { 1_000 }
fn default_emergency_gc_delays_ms() -> Vec<u64> { vec![0, 100, 500, 1_000] }
fn default_recovery_check_ms() -> u64 { 5_000 }
fn default_snapshot_min_interval_ms() -> u64 { 60_000 }
fn default_max_snapshots() -> usize { 10 }
fn default_sla_target_uptime() -> f64 { 99.9 }
fn default_pool_max_size() -> usize { 256 }
fn default_buffer_capacity() -> usize { 64 * 1024 }

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: default_check_interval_ms(),
            max_heap_mb: default_max_heap_mb(),
            gc_threshold: default_gc_threshold(),
            critical_threshold: default_critical_threshold(),
            emergency_threshold: default_emergency_threshold(),
            adaptive_thresholds: true,
            fast_growth_mb_per_min: default_fast_growth_mb_per_min(),
            fast_growth_reduction: default_fast_growth_reduction(),
            moderate_growth_mb_per_min: default_moderate_growth_mb_per_min(),
            moderate_growth_reduction: default_moderate_growth_reduction(),
            growth_window: default_growth_window(),
            history_size: default_history_size(),
            trend_window_size: default_trend_window_size(),
            critical_evict_fraction: default_critical_evict_fraction(),
            persistent_critical_samples: default_persistent_critical_samples(),
            alert_cooldown_ms: default_alert_cooldown_ms(),
            min_gc_interval_ms: default_min_gc_interval_ms(),
            delayed_gc_ms: default_delayed_gc_ms(),
            emergency_gc_delays_ms: default_emergency_gc_delays_ms(),
            recovery_check_ms: default_recovery_check_ms(),
            snapshot_dir: None,
            snapshot_min_interval_ms: default_snapshot_min_interval_ms(),
            max_snapshots: default_max_snapshots(),
            sla_target_uptime: default_sla_target_uptime(),
            pool_max_size: default_pool_max_size(),
            buffer_capacity: default_buffer_capacity(),
        }
    }
}

impl ResourceConfig {
    #[must_use]
    pub fn max_heap_bytes(&self) -> u64 {
        self.max_heap_mb.saturating_mul(MB as u64)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::check_nonzero("resource.check_interval_ms", self.check_interval_ms)?;
        ConfigError::check_nonzero("resource.max_heap_mb", self.max_heap_mb)?;
        ConfigError::check_ratio("resource.gc_threshold", self.gc_threshold)?;
        ConfigError::check_ratio("resource.critical_threshold", self.critical_threshold)?;
        ConfigError::check_ratio("resource.emergency_threshold", self.emergency_threshold)?;
        ConfigError::check_order(
            "resource.gc_threshold",
            self.gc_threshold,
            "resource.critical_threshold",
            self.critical_threshold,
        )?;
        ConfigError::check_order(
            "resource.critical_threshold",
            self.critical_threshold,
            "resource.emergency_threshold",
            self.emergency_threshold,
        )?;
        ConfigError::check_ratio("resource.fast_growth_reduction", self.fast_growth_reduction)?;
        ConfigError::check_ratio(
            "resource.moderate_growth_reduction",
            self.moderate_growth_reduction,
        )?;
        ConfigError::check_order(
            "resource.moderate_growth_mb_per_min",
            self.moderate_growth_mb_per_min,
            "resource.fast_growth_mb_per_min",
            self.fast_growth_mb_per_min,
        )?;
        ConfigError::check_ratio("resource.critical_evict_fraction", self.critical_evict_fraction)?;
        ConfigError::check_percent("resource.sla_target_uptime", self.sla_target_uptime)?;
        if self.growth_window < 2 {
            return Err(ConfigError::Invalid {
                field: "resource.growth_window",
                reason: "need at least 2 samples for a delta".into(),
            });
        }
        ConfigError::check_nonzero("resource.history_size", self.history_size)?;
        ConfigError::check_nonzero("resource.trend_window_size", self.trend_window_size)?;
        ConfigError::check_nonzero(
            "resource.persistent_critical_samples",
            self.persistent_critical_samples,
        )?;
        ConfigError::check_nonzero("resource.max_snapshots", self.max_snapshots)?;
        ConfigError::check_nonzero("resource.pool_max_size", self.pool_max_size)?;
        ConfigError::check_nonzero("resource.buffer_capacity", self.buffer_capacity)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Memory governor
// ═══════════════════════════════════════════════════════════════════════════

/// State machine thresholds (percent of max heap) and shard policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernorConfig {
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
    #[serde(default = "default_warning_percent")]
    pub warning_percent: f64,
    #[serde(default = "default_defer_percent")]
    pub defer_percent: f64,
    #[serde(default = "default_hibernate_percent")]
    pub hibernate_percent: f64,
    #[serde(default = "default_critical_percent")]
    pub critical_percent: f64,
    /// Margin subtracted from a threshold when moving down
    #[serde(default = "default_hysteresis_percent")]
    pub hysteresis_percent: f64,
    /// EWMA smoothing factor for per-shard samples
    #[serde(default = "default_ewma_alpha")]
    pub ewma_alpha: f64,
    #[serde(default = "default_shard_memory_estimate_mb")]
    pub shard_memory_estimate_mb: f64,
    #[serde(default = "default_max_total_shard_memory_mb")]
    pub max_total_shard_memory_mb: f64,
    #[serde(default = "default_hibernation_cooldown_ms")]
    pub hibernation_cooldown_ms: u64,
    #[serde(default = "default_hibernate_batch")]
    pub hibernate_batch: usize,
    #[serde(default = "default_critical_hibernate_batch")]
    pub critical_hibernate_batch: usize,
    /// Usage samples used for the peak projection
    #[serde(default = "default_prediction_samples")]
    pub prediction_samples: usize,
    /// Samples ahead the projection looks
    #[serde(default = "default_prediction_horizon")]
    pub prediction_horizon: usize,
    #[serde(default = "default_usage_history_size")]
    pub usage_history_size: usize,
}

fn default_monitor_interval_ms() -> u64 { 5_000 }
fn default_warning_percent() -> f64 { 70.0 }
fn default_defer_percent() -> f64 { 80.0 }
fn default_hibernate_percent() -> f64 { 88.0 }
fn default_critical_percent() -> f64 { 95.0 }
fn default_hysteresis_percent() -> f64 { 2.0 }
fn default_ewma_alpha() -> f64 { 0.3 }
fn default_shard_memory_estimate_mb() -> f64 { 15.0 }
fn default_max_total_shard_memory_mb() -> f64 { 1024.0 }
fn default_hibernation_cooldown_ms() -> u64 { 30_000 }
fn default_hibernate_batch() -> usize { 2 }
fn default_critical_hibernate_batch() -> usize { 4 }
fn default_prediction_samples() -> usize { 5 }
fn default_prediction_horizon() -> usize { 5 }
fn default_usage_history_size() -> usize { 60 }

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            monitor_interval_ms: default_monitor_interval_ms(),
            warning_percent: default_warning_percent(),
            defer_percent: default_defer_percent(),
            hibernate_percent: default_hibernate_percent(),
            critical_percent: default_critical_percent(),
            hysteresis_percent: default_hysteresis_percent(),
            ewma_alpha: default_ewma_alpha(),
            shard_memory_estimate_mb: default_shard_memory_estimate_mb(),
            max_total_shard_memory_mb: default_max_total_shard_memory_mb(),
            hibernation_cooldown_ms: default_hibernation_cooldown_ms(),
            hibernate_batch: default_hibernate_batch(),
            critical_hibernate_batch: default_critical_hibernate_batch(),
            prediction_samples: default_prediction_samples(),
            prediction_horizon: default_prediction_horizon(),
            usage_history_size: default_usage_history_size(),
        }
    }
}

impl GovernorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::check_nonzero("governor.monitor_interval_ms", self.monitor_interval_ms)?;
        ConfigError::check_percent("governor.warning_percent", self.warning_percent)?;
        ConfigError::check_percent("governor.defer_percent", self.defer_percent)?;
        ConfigError::check_percent("governor.hibernate_percent", self.hibernate_percent)?;
        ConfigError::check_percent("governor.critical_percent", self.critical_percent)?;
        ConfigError::check_order(
            "governor.warning_percent",
            self.warning_percent,
            "governor.defer_percent",
            self.defer_percent,
        )?;
        ConfigError::check_order(
            "governor.defer_percent",
            self.defer_percent,
            "governor.hibernate_percent",
            self.hibernate_percent,
        )?;
        ConfigError::check_order(
            "governor.hibernate_percent",
            self.hibernate_percent,
            "governor.critical_percent",
            self.critical_percent,
        )?;
        ConfigError::check_percent("governor.hysteresis_percent", self.hysteresis_percent)?;
        if !(self.ewma_alpha > 0.0 && self.ewma_alpha <= 1.0) {
            return Err(ConfigError::Invalid {
                field: "governor.ewma_alpha",
                reason: format!("must be within (0, 1], got {}", self.ewma_alpha),
            });
        }
        if !(self.shard_memory_estimate_mb > 0.0) || !(self.max_total_shard_memory_mb > 0.0) {
            return Err(ConfigError::Invalid {
                field: "governor.shard_memory",
                reason: "shard estimate and ceiling must be positive".into(),
            });
        }
        ConfigError::check_nonzero("governor.hibernate_batch", self.hibernate_batch)?;
        ConfigError::check_nonzero("governor.critical_hibernate_batch", self.critical_hibernate_batch)?;
        if self.prediction_samples < 2 {
            return Err(ConfigError::Invalid {
                field: "governor.prediction_samples",
                reason: "need at least 2 samples for a slope".into(),
            });
        }
        ConfigError::check_nonzero("governor.usage_history_size", self.usage_history_size)
    }
}
