// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Tiered caching: the generic hot/warm/cold cache and the block facade.

mod block_cache;
mod entry;
mod tiered;

pub use block_cache::{Block, BlockCache, BlockCacheStats};
pub use entry::{CacheEntry, SizedItem, Tier};
pub use tiered::{EvictionOutcome, SweepReport, TieredCache, TieredCacheConfig, TieredCacheStats};
