// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Governor state machine with hysteresis.

use serde::Serialize;

use crate::config::GovernorConfig;

/// Governor severity, ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernorState {
    #[default]
    Normal = 0,
    Warning = 1,
    /// New shard activations may be postponed
    Deferred = 2,
    /// Cold shards are being hibernated
    Hibernating = 3,
    Critical = 4,
}

impl GovernorState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Deferred => "deferred",
            Self::Hibernating => "hibernating",
            Self::Critical => "critical",
        }
    }

    /// State implied by `usage_percent` with no history.
    #[must_use]
    pub fn for_usage(usage_percent: f64, config: &GovernorConfig) -> Self {
        match usage_percent {
            u if u >= config.critical_percent => Self::Critical,
            u if u >= config.hibernate_percent => Self::Hibernating,
            u if u >= config.defer_percent => Self::Deferred,
            u if u >= config.warning_percent => Self::Warning,
            _ => Self::Normal,
        }
    }

    /// Next state from `self` given the latest usage.
    ///
    /// Rising usage moves up as soon as a raw threshold is reached. Falling
    /// usage only moves down once it is `hysteresis_percent` below the
    /// threshold of the current state, so a value hovering around one
    /// threshold cannot flap. Critical steps down to Hibernating only.
    #[must_use]
    pub fn next(self, usage_percent: f64, config: &GovernorConfig) -> Self {
        let raw = Self::for_usage(usage_percent, config);
        if raw >= self {
            return raw;
        }
        let margin = config.hysteresis_percent;
        if self == Self::Critical {
            return if usage_percent < config.critical_percent - margin {
                Self::Hibernating
            } else {
                Self::Critical
            };
        }
        Self::for_usage(usage_percent + margin, config).min(self)
    }
}

impl std::fmt::Display for GovernorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
