// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the governance context.

use serde::Serialize;

use crate::aggregator::AggregatorStats;
use crate::cache::BlockCacheStats;
use crate::governor::GovernorHealth;
use crate::resource::HealthReport;

/// Lifecycle of the governance context.
///
/// Use [`super::Governance::state()`] to check the current state or
/// [`super::Governance::state_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Built, no background jobs yet
    Created,
    /// Starting component jobs, leaves first
    Starting,
    /// All periodic jobs running
    Running,
    /// Stopping jobs in reverse dependency order
    ShuttingDown,
    /// Jobs stopped; may be initialized again
    Stopped,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Starting => write!(f, "Starting"),
            Self::Running => write!(f, "Running"),
            Self::ShuttingDown => write!(f, "ShuttingDown"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Combined health of every component.
#[derive(Debug, Clone, Serialize)]
pub struct GovernanceHealth {
    pub state: LifecycleState,
    /// Both the resource manager and the governor report healthy
    pub healthy: bool,
    pub resource: HealthReport,
    pub governor: GovernorHealth,
    pub block_cache: BlockCacheStats,
    pub aggregator: AggregatorStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_state_display() {
        assert_eq!(format!("{}", LifecycleState::Created), "Created");
        assert_eq!(format!("{}", LifecycleState::Running), "Running");
        assert_eq!(format!("{}", LifecycleState::ShuttingDown), "ShuttingDown");
    }

    #[test]
    fn test_lifecycle_state_serializes_snake_case() {
        let json = serde_json::to_string(&LifecycleState::ShuttingDown).unwrap();
        assert_eq!(json, "\"shutting_down\"");
    }
}
