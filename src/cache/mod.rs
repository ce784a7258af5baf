//! Optional block cache (§4.8).
//!
//! A side cache keyed by logical block index, holding whole untransformed
//! blocks. Semantics are strictly best-effort: a miss is always a legal
//! answer to `try_read`, and `store` may silently refuse. The random-access
//! writer invalidates an entry on every mutation; the read paths populate
//! it on every fill-miss.

use std::collections::VecDeque;
use std::collections::HashMap;

/// Pluggable read-through cache of whole logical blocks.
///
/// Implementations must be safe to call from the single writer thread that
/// owns a random-access stream, or from behind the mutex the read-only
/// stream uses for its non-mmap fallback; this crate never calls a cache
/// from more than one thread at a time itself.
pub trait BlockCache: Send + Sync {
    /// Copies the cached block into `out` and returns `true` on a hit.
    /// `out.len()` is always the container's block size `B`.
    fn try_read(&mut self, index: usize, out: &mut [u8]) -> bool;

    /// Offers `bytes` (exactly `B` bytes) as the current contents of
    /// `index`. May be ignored.
    fn store(&mut self, index: usize, bytes: &[u8]);

    /// Drops any cached entry for `index`, if present.
    fn invalidate(&mut self, index: usize);

    /// Releases any resources held by the cache. Called once, when the
    /// owning container is torn down.
    fn dispose(&mut self) {}
}

/// Caches nothing; every `try_read` misses. The default when a container is
/// constructed without an explicit cache.
#[derive(Debug, Default)]
pub struct NullCache;

impl BlockCache for NullCache {
    fn try_read(&mut self, _index: usize, _out: &mut [u8]) -> bool {
        false
    }

    fn store(&mut self, _index: usize, _bytes: &[u8]) {}

    fn invalidate(&mut self, _index: usize) {}
}

/// A fixed-capacity FIFO-evicting block cache: the simplest reference
/// implementation of [`BlockCache`], not a tuned production LRU.
pub struct BoundedBlockCache {
    capacity: usize,
    entries: HashMap<usize, Vec<u8>>,
    order: VecDeque<usize>,
}

impl BoundedBlockCache {
    /// `capacity` is the maximum number of whole blocks held at once.
    pub fn new(capacity: usize) -> Self {
        BoundedBlockCache {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn evict_if_needed(&mut self) {
        while self.entries.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            } else {
                break;
            }
        }
    }
}

impl BlockCache for BoundedBlockCache {
    fn try_read(&mut self, index: usize, out: &mut [u8]) -> bool {
        match self.entries.get(&index) {
            Some(bytes) if bytes.len() == out.len() => {
                out.copy_from_slice(bytes);
                true
            }
            _ => false,
        }
    }

    fn store(&mut self, index: usize, bytes: &[u8]) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(index, bytes.to_vec()).is_none() {
            self.order.push_back(index);
        }
        self.evict_if_needed();
    }

    fn invalidate(&mut self, index: usize) {
        if self.entries.remove(&index).is_some() {
            self.order.retain(|&i| i != index);
        }
    }

    fn dispose(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}
