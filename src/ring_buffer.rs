// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Fixed-capacity ring buffer for time-series telemetry.
//!
//! Pushing never blocks and never grows the buffer: once full, the oldest item
//! is overwritten and the overwrite counter is bumped.
//!
//! # Example
//!
//! ```
//! use resource_governor::RingBuffer;
//!
//! let mut buf = RingBuffer::new(3).unwrap();
//! for i in 0..5 {
//!     buf.push(i);
//! }
//! assert_eq!(buf.latest(3), vec![2, 3, 4]);
//! assert_eq!(buf.overwrites(), 2);
//! ```

use std::collections::VecDeque;

use serde::Serialize;

use crate::error::ConfigError;

/// Items that carry an insertion timestamp (epoch millis).
pub trait Timestamped {
    fn timestamp_ms(&self) -> u64;
}

/// Items that carry a named numeric value.
pub trait NumericSample {
    fn sample_name(&self) -> &str;
    fn sample_value(&self) -> f64;
}

/// count/sum/avg/min/max over numeric items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SampleAggregate {
    pub count: usize,
    pub sum: f64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

/// Ring buffer statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RingBufferStats {
    pub len: usize,
    pub capacity: usize,
    pub overwrites: u64,
}

/// Fixed-capacity circular store.
///
/// Not internally synchronized; owners wrap it in a lock.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
    overwrites: u64,
}

impl<T> RingBuffer<T> {
    /// Create a buffer holding at most `capacity` items.
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        ConfigError::check_nonzero("ring_buffer.capacity", capacity)?;
        Ok(Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            overwrites: 0,
        })
    }

    /// Append an item, overwriting the oldest one when full.
    pub fn push(&mut self, item: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
            self.overwrites += 1;
        }
        self.items.push_back(item);
    }

    /// The i-th oldest surviving item.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// The most recently pushed item.
    #[must_use]
    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items silently dropped because the buffer was full.
    #[must_use]
    pub fn overwrites(&self) -> u64 {
        self.overwrites
    }

    /// Oldest-to-newest iterator.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    /// Drop all items. The overwrite counter is kept.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Change capacity, keeping the most recent `min(len, new_capacity)` items.
    pub fn resize(&mut self, new_capacity: usize) -> Result<(), ConfigError> {
        ConfigError::check_nonzero("ring_buffer.capacity", new_capacity)?;
        while self.items.len() > new_capacity {
            self.items.pop_front();
        }
        self.capacity = new_capacity;
        self.items.shrink_to(new_capacity);
        Ok(())
    }

    #[must_use]
    pub fn stats(&self) -> RingBufferStats {
        RingBufferStats {
            len: self.items.len(),
            capacity: self.capacity,
            overwrites: self.overwrites,
        }
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Up to `n` most recent items, oldest first.
    #[must_use]
    pub fn latest(&self, n: usize) -> Vec<T> {
        let skip = self.items.len().saturating_sub(n);
        self.items.iter().skip(skip).cloned().collect()
    }

    /// All items, oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }

    /// Items matching `pred`, oldest first.
    pub fn filter<F>(&self, mut pred: F) -> Vec<T>
    where
        F: FnMut(&T) -> bool,
    {
        self.items.iter().filter(|item| pred(item)).cloned().collect()
    }
}

impl<T: Clone + Timestamped> RingBuffer<T> {
    /// Items with `since <= timestamp <= until`, oldest first.
    ///
    /// Scans newest to oldest and stops at the first item older than `since`.
    /// This is only correct when items were pushed in non-decreasing
    /// timestamp order; an out-of-order push can hide older matches.
    #[must_use]
    pub fn filter_by_time_range(&self, since: u64, until: u64) -> Vec<T> {
        let mut out = Vec::new();
        for item in self.items.iter().rev() {
            let ts = item.timestamp_ms();
            if ts < since {
                break;
            }
            if ts <= until {
                out.push(item.clone());
            }
        }
        out.reverse();
        out
    }
}

impl<T: Timestamped> RingBuffer<T> {
    /// Drop items older than `cutoff` from the front. Returns how many went.
    ///
    /// Stops at the first item at or after `cutoff`, so the same ordering
    /// precondition as [`filter_by_time_range`](Self::filter_by_time_range)
    /// applies.
    pub fn drop_before(&mut self, cutoff: u64) -> usize {
        let mut dropped = 0;
        while self
            .items
            .front()
            .is_some_and(|item| item.timestamp_ms() < cutoff)
        {
            self.items.pop_front();
            dropped += 1;
        }
        dropped
    }
}

impl<T: NumericSample> RingBuffer<T> {
    /// Aggregate the values of items, optionally restricted to one name.
    #[must_use]
    pub fn aggregate(&self, name: Option<&str>) -> SampleAggregate {
        let mut agg = SampleAggregate {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            ..Default::default()
        };
        for item in &self.items {
            if let Some(name) = name {
                if item.sample_name() != name {
                    continue;
                }
            }
            let v = item.sample_value();
            if !v.is_finite() {
                continue;
            }
            agg.count += 1;
            agg.sum += v;
            agg.min = agg.min.min(v);
            agg.max = agg.max.max(v);
        }
        if agg.count == 0 {
            return SampleAggregate::default();
        }
        agg.avg = agg.sum / agg.count as f64;
        agg
    }
}
