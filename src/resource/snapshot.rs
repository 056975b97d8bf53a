// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Lightweight heap snapshots.
//!
//! A snapshot is a small JSON summary (memory figures, recent growth, cleanup
//! counters), not a heap dump. Captures are rate limited and only the newest
//! `max_snapshots` files are kept.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use super::sampler::ResourceSample;
use crate::error::SnapshotError;
use crate::pressure::MemoryLevel;

const PREFIX: &str = "heap-";
const SUFFIX: &str = ".json";

/// Contents of one snapshot file.
#[derive(Debug, Clone, Serialize)]
pub struct HeapSnapshot {
    pub captured_at_ms: u64,
    pub reason: String,
    pub level: MemoryLevel,
    pub usage_ratio: f64,
    pub sample: ResourceSample,
    /// Heap used (MB) over the recent sample history, oldest first
    pub growth_history_mb: Vec<f64>,
    pub growth_rate_mb_per_min: f64,
    pub total_checks: u64,
    pub gc_requests: u64,
    pub cleanups: u64,
    pub total_freed_mb: f64,
}

/// Writes rate-limited snapshot files into one directory.
pub struct Snapshotter {
    dir: PathBuf,
    min_interval: Duration,
    max_snapshots: usize,
    last: Mutex<Option<Instant>>,
    /// Disambiguates captures within the same millisecond
    seq: AtomicU64,
}

impl Snapshotter {
    pub fn new(dir: impl Into<PathBuf>, min_interval: Duration, max_snapshots: usize) -> Self {
        Self {
            dir: dir.into(),
            min_interval,
            max_snapshots,
            last: Mutex::new(None),
            seq: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `snapshot` unless the previous capture was too recent.
    ///
    /// Returns the written path, or `None` when rate limited.
    pub fn capture(&self, snapshot: &HeapSnapshot) -> Result<Option<PathBuf>, SnapshotError> {
        {
            let mut last = self.last.lock();
            let now = Instant::now();
            if let Some(prev) = *last {
                if now.saturating_duration_since(prev) < self.min_interval {
                    return Ok(None);
                }
            }
            *last = Some(now);
        }

        std::fs::create_dir_all(&self.dir)?;
        // Zero-padded so lexical order is capture order.
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.join(format!(
            "{PREFIX}{:015}-{seq:010}{SUFFIX}",
            snapshot.captured_at_ms
        ));
        let body = serde_json::to_vec_pretty(snapshot)?;
        std::fs::write(&path, body)?;
        let pruned = self.prune()?;
        debug!(path = %path.display(), pruned, "heap snapshot written");
        Ok(Some(path))
    }

    /// Snapshot files currently on disk, oldest first.
    pub fn list(&self) -> Result<Vec<PathBuf>, SnapshotError> {
        let mut files = Vec::new();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(files),
            Err(err) => return Err(err.into()),
        };
        for entry in entries {
            let path = entry?.path();
            let is_snapshot = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(PREFIX) && n.ends_with(SUFFIX));
            if is_snapshot {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn prune(&self) -> Result<usize, SnapshotError> {
        let files = self.list()?;
        let excess = files.len().saturating_sub(self.max_snapshots);
        for path in &files[..excess] {
            std::fs::remove_file(path)?;
        }
        Ok(excess)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn snapshot(at: u64) -> HeapSnapshot {
        HeapSnapshot {
            captured_at_ms: at,
            reason: "test".into(),
            level: MemoryLevel::Critical,
            usage_ratio: 0.9,
            sample: ResourceSample::default(),
            growth_history_mb: vec![1.0, 2.0],
            growth_rate_mb_per_min: 0.5,
            total_checks: 3,
            gc_requests: 1,
            cleanups: 1,
            total_freed_mb: 0.0,
        }
    }

    #[tokio::test]
    async fn test_capture_writes_json() {
        let dir = tempdir().unwrap();
        let snap = Snapshotter::new(dir.path(), Duration::ZERO, 5);
        let path = snap.capture(&snapshot(42)).unwrap().unwrap();

        let body: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(body["captured_at_ms"], 42);
        assert_eq!(body["level"], "critical");
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_is_rate_limited() {
        let dir = tempdir().unwrap();
        let snap = Snapshotter::new(dir.path(), Duration::from_secs(60), 5);
        assert!(snap.capture(&snapshot(1)).unwrap().is_some());
        assert!(snap.capture(&snapshot(2)).unwrap().is_none());
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(snap.capture(&snapshot(3)).unwrap().is_some());
        assert_eq!(snap.list().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_oldest_pruned() {
        let dir = tempdir().unwrap();
        let snap = Snapshotter::new(dir.path(), Duration::ZERO, 2);
        for at in [10, 20, 30] {
            snap.capture(&snapshot(at)).unwrap();
        }
        let files = snap.list().unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].to_string_lossy().contains("000000000000020"));
    }

    #[tokio::test]
    async fn test_same_millisecond_captures_both_kept() {
        let dir = tempdir().unwrap();
        let snap = Snapshotter::new(dir.path(), Duration::ZERO, 5);
        let first = snap.capture(&snapshot(7)).unwrap().unwrap();
        let second = snap.capture(&snapshot(7)).unwrap().unwrap();
        assert_ne!(first, second);
        assert_eq!(snap.list().unwrap(), vec![first, second]);
    }

    #[test]
    fn test_missing_dir_lists_empty() {
        let dir = tempdir().unwrap();
        let snap = Snapshotter::new(dir.path().join("absent"), Duration::ZERO, 2);
        assert!(snap.list().unwrap().is_empty());
    }
}
