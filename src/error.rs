// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types.
//!
//! Steady-state conditions (full tiers, memory pressure, refused wakeups) are
//! never errors: they surface as return values, events and state. The only
//! errors this crate produces are configuration errors, raised at construction
//! time, and snapshot I/O errors, which are logged and swallowed by the
//! monitor loop.

use thiserror::Error;

/// Invalid configuration detected at construction time.
///
/// Values are never silently clamped; a component refuses to start instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    ZeroCapacity { field: &'static str },

    #[error("{field} must be within [0, 1], got {value}")]
    RatioOutOfRange { field: &'static str, value: f64 },

    #[error("{field} must be within [0, 100], got {value}")]
    PercentOutOfRange { field: &'static str, value: f64 },

    #[error("thresholds out of order: {lower} ({lower_value}) must be below {upper} ({upper_value})")]
    ThresholdOrder {
        lower: &'static str,
        lower_value: f64,
        upper: &'static str,
        upper_value: f64,
    },

    #[error("{field} is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn check_nonzero<T>(field: &'static str, value: T) -> Result<(), Self>
    where
        T: PartialEq + Default,
    {
        if value == T::default() {
            Err(Self::ZeroCapacity { field })
        } else {
            Ok(())
        }
    }

    pub(crate) fn check_ratio(field: &'static str, value: f64) -> Result<(), Self> {
        if (0.0..=1.0).contains(&value) {
            Ok(())
        } else {
            Err(Self::RatioOutOfRange { field, value })
        }
    }

    pub(crate) fn check_percent(field: &'static str, value: f64) -> Result<(), Self> {
        if (0.0..=100.0).contains(&value) {
            Ok(())
        } else {
            Err(Self::PercentOutOfRange { field, value })
        }
    }

    /// Check that `lower < upper`.
    pub(crate) fn check_order(
        lower: &'static str,
        lower_value: f64,
        upper: &'static str,
        upper_value: f64,
    ) -> Result<(), Self> {
        if lower_value < upper_value {
            Ok(())
        } else {
            Err(Self::ThresholdOrder {
                lower,
                lower_value,
                upper,
                upper_value,
            })
        }
    }
}

/// Failure while writing or pruning a heap snapshot.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}
