// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Wall-clock helpers.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
#[inline]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub const MINUTE_MS: u64 = 60 * 1000;
pub const HOUR_MS: u64 = 60 * MINUTE_MS;
pub const DAY_MS: u64 = 24 * HOUR_MS;

/// Start of the window of length `width_ms` containing `at_ms`.
#[inline]
pub fn window_start(at_ms: u64, width_ms: u64) -> u64 {
    at_ms - (at_ms % width_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_start_aligns() {
        assert_eq!(window_start(0, MINUTE_MS), 0);
        assert_eq!(window_start(59_999, MINUTE_MS), 0);
        assert_eq!(window_start(60_000, MINUTE_MS), 60_000);
        assert_eq!(window_start(HOUR_MS + 5, HOUR_MS), HOUR_MS);
    }
}
