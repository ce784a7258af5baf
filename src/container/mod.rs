//! Shared container construction, validation, and the four stream modes
//! built on top of the extent map and footer codec (§4.3–§4.7).

pub mod random_access;
pub mod read_only;
pub mod sequential;
pub mod write_once;

pub use random_access::RandomAccessStream;
pub use read_only::{Cursor, ReadOnlyStream};
pub use sequential::{SequentialReader, SequentialWriter};
pub use write_once::WriteOnceStream;

use crate::cache::{BlockCache, NullCache};
use crate::error::{Error, Result};
use crate::transform::{BlockTransformer, Identity};

/// Smallest legal logical block size (§3).
pub const MIN_BLOCK_SIZE: usize = 512;
/// Largest legal logical block size (§3).
pub const MAX_BLOCK_SIZE: usize = 28671;
/// Block size used when the caller doesn't specify one (§6).
pub const DEFAULT_BLOCK_SIZE: usize = 16384;

pub(crate) fn validate_block_size(b: usize) -> Result<()> {
    if b < MIN_BLOCK_SIZE || b > MAX_BLOCK_SIZE {
        return Err(Error::OutOfRange(format!(
            "block size {b} outside the legal range [{MIN_BLOCK_SIZE}, {MAX_BLOCK_SIZE}]"
        )));
    }
    Ok(())
}

/// Configuration shared by every stream mode's constructor (§6): the
/// transformer pipeline, the logical block size, an optional read cache,
/// and whether teardown should leave the substrate open.
///
/// `cache` is consulted only by [`RandomAccessStream`](super::RandomAccessStream),
/// whose single-cursor fill path can safely call a `&mut self` cache through
/// one writer thread. The read-only stream's cursors are designed to run
/// concurrently without a lock over the mmap fast path (§4.5); threading a
/// `BlockCache` through them would force exactly the synchronization that
/// path exists to avoid, so [`ReadOnlyStream`](super::ReadOnlyStream) and the
/// sequential modes accept a `ContainerOptions` for builder uniformity but
/// disregard its `cache`.
///
/// `leave_open` governs teardown (§4.3: "release the substrate unless
/// leaveOpen"): every stream type's `Drop` impl releases (drops) the
/// substrate normally unless `leave_open` is set, in which case the
/// substrate's destructor is skipped so its underlying resource (e.g. an
/// open file descriptor) is left open rather than closed. Calling
/// `finish()`/`into_inner()` to reclaim the substrate before the stream is
/// dropped always leaves it open, regardless of this flag — `leave_open`
/// only matters for a stream that is dropped without being unwrapped first.
///
/// Constructed with [`ContainerOptions::new`] and customized with the
/// builder methods; passed by value into each stream's `open`/`create`
/// function alongside the substrate.
pub struct ContainerOptions {
    pub(crate) transformer: Box<dyn BlockTransformer>,
    pub(crate) block_size: usize,
    pub(crate) cache: Box<dyn BlockCache>,
    pub(crate) leave_open: bool,
}

impl ContainerOptions {
    pub fn new() -> Self {
        ContainerOptions {
            transformer: Box::new(Identity),
            block_size: DEFAULT_BLOCK_SIZE,
            cache: Box::new(NullCache),
            leave_open: false,
        }
    }

    pub fn transformer(mut self, transformer: Box<dyn BlockTransformer>) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn cache(mut self, cache: Box<dyn BlockCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn leave_open(mut self, leave_open: bool) -> Self {
        self.leave_open = leave_open;
        self
    }
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self::new()
    }
}
