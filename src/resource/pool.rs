// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bounded object pools.
//!
//! Pools trade a little retained memory for fewer allocations on hot paths.
//! Under pressure the resource manager calls [`Releasable::release_all`] to
//! hand that memory back.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

/// A pooled value that can be returned to its initial state.
pub trait Poolable: Send {
    fn reset(&mut self);
}

impl<T: Send> Poolable for Vec<T> {
    fn reset(&mut self) {
        self.clear();
    }
}

impl Poolable for String {
    fn reset(&mut self) {
        self.clear();
    }
}

/// Pool usage counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub idle: usize,
    pub max_size: usize,
    /// Acquires served from the idle list
    pub hits: u64,
    /// Acquires that had to construct a new value
    pub misses: u64,
    pub released: u64,
    /// Releases dropped because the pool was full
    pub discarded: u64,
}

impl PoolStats {
    #[must_use]
    pub fn reuse_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Type-erased view the resource manager uses during cleanup.
pub trait Releasable: Send + Sync {
    fn name(&self) -> &'static str;

    /// Drop every idle value. Returns how many were dropped.
    fn release_all(&self) -> usize;

    fn pool_stats(&self) -> PoolStats;
}

/// Bounded pool of reusable values.
pub struct ObjectPool<T: Poolable> {
    name: &'static str,
    idle: Mutex<Vec<T>>,
    max_size: usize,
    factory: Box<dyn Fn() -> T + Send + Sync>,
    hits: AtomicU64,
    misses: AtomicU64,
    released: AtomicU64,
    discarded: AtomicU64,
}

impl<T: Poolable> ObjectPool<T> {
    pub fn new(
        name: &'static str,
        max_size: usize,
        factory: impl Fn() -> T + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            idle: Mutex::new(Vec::with_capacity(max_size.min(64))),
            max_size,
            factory: Box::new(factory),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            released: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Take an idle value, or build a fresh one.
    pub fn acquire(&self) -> T {
        let reused = self.idle.lock().pop();
        crate::metrics::record_pool_acquire(self.name, reused.is_some());
        match reused {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                value
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                (self.factory)()
            }
        }
    }

    /// Reset `value` and keep it for reuse, unless the pool is full.
    pub fn release(&self, mut value: T) {
        value.reset();
        let mut idle = self.idle.lock();
        if idle.len() < self.max_size {
            idle.push(value);
            self.released.fetch_add(1, Ordering::Relaxed);
        } else {
            self.discarded.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }
}

impl<T: Poolable> Releasable for ObjectPool<T> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn release_all(&self) -> usize {
        let mut idle = self.idle.lock();
        let count = idle.len();
        idle.clear();
        idle.shrink_to_fit();
        count
    }

    fn pool_stats(&self) -> PoolStats {
        PoolStats {
            idle: self.idle(),
            max_size: self.max_size,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

/// Pool of byte buffers with a fixed initial capacity.
///
/// Buffers that grew past four times the initial capacity are not kept.
pub struct BufferPool {
    inner: ObjectPool<Vec<u8>>,
    buffer_capacity: usize,
}

impl BufferPool {
    pub fn new(name: &'static str, max_size: usize, buffer_capacity: usize) -> Self {
        Self {
            inner: ObjectPool::new(name, max_size, move || Vec::with_capacity(buffer_capacity)),
            buffer_capacity,
        }
    }

    pub fn acquire(&self) -> Vec<u8> {
        self.inner.acquire()
    }

    pub fn release(&self, buffer: Vec<u8>) {
        if buffer.capacity() > self.buffer_capacity.saturating_mul(4) {
            self.inner.discarded.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.inner.release(buffer);
    }

    #[must_use]
    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }
}

impl Releasable for BufferPool {
    fn name(&self) -> &'static str {
        self.inner.name
    }

    fn release_all(&self) -> usize {
        self.inner.release_all()
    }

    fn pool_stats(&self) -> PoolStats {
        self.inner.pool_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_resets_before_reuse() {
        let pool: ObjectPool<Vec<u32>> = ObjectPool::new("test", 4, Vec::new);
        let mut v = pool.acquire();
        v.extend([1, 2, 3]);
        pool.release(v);

        let v = pool.acquire();
        assert!(v.is_empty());
        let stats = pool.pool_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_pool_is_bounded() {
        let pool: ObjectPool<String> = ObjectPool::new("strings", 2, String::new);
        for _ in 0..5 {
            pool.release(String::from("x"));
        }
        let stats = pool.pool_stats();
        assert_eq!(stats.idle, 2);
        assert_eq!(stats.discarded, 3);
        assert_eq!(pool.release_all(), 2);
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn test_buffer_pool_drops_oversized() {
        let pool = BufferPool::new("buffers", 8, 16);
        let mut buf = pool.acquire();
        assert!(buf.capacity() >= 16);
        buf.resize(1024, 0);
        pool.release(buf);
        assert_eq!(pool.pool_stats().idle, 0);

        pool.release(pool.acquire());
        assert_eq!(pool.pool_stats().idle, 1);
    }
}
