//! Capabilities a wrapped stream may or may not offer beyond plain
//! `Read`/`Write`/`Seek`, used by the base container and the random-access
//! and write-once streams.
//!
//! The substrate itself is deliberately out of scope (§1): this module only
//! describes what the container needs from it, not a concrete transport.

use std::fs::File;
use std::io::{self, Cursor};

/// Truncate (or grow, zero-filled) the substrate to exactly `size` bytes.
///
/// Every writable stream mode needs this to rewrite the footer and to
/// implement `SetLength`; it is kept as its own trait rather than folded
/// into `Write` because not every `Seek + Write` type supports it.
pub trait Truncate {
    fn set_len(&mut self, size: u64) -> io::Result<()>;
}

impl Truncate for File {
    fn set_len(&mut self, size: u64) -> io::Result<()> {
        File::set_len(self, size)
    }
}

impl Truncate for Cursor<Vec<u8>> {
    fn set_len(&mut self, size: u64) -> io::Result<()> {
        self.get_mut().resize(size as usize, 0);
        Ok(())
    }
}

/// Request the substrate flush its writes, optionally down to durable
/// storage. Per the design notes (§9), the durable form is a no-op unless
/// the substrate actually offers one — this crate never pretends a plain
/// in-memory buffer became durable.
pub trait Durable {
    fn flush(&mut self, durable: bool) -> io::Result<()>;
}

impl Durable for File {
    fn flush(&mut self, durable: bool) -> io::Result<()> {
        if durable {
            self.sync_all()
        } else {
            Ok(())
        }
    }
}

impl Durable for Cursor<Vec<u8>> {
    fn flush(&mut self, _durable: bool) -> io::Result<()> {
        Ok(())
    }
}

/// Gates the memory-mapped fast path in the read-only stream (§4.5) to
/// substrates that are actually backed by a file descriptor. Anything else
/// falls back to mutex-serialized seek+read.
pub trait AsFileForMmap {
    fn as_file_for_mmap(&self) -> Option<&File>;
}

impl AsFileForMmap for File {
    fn as_file_for_mmap(&self) -> Option<&File> {
        Some(self)
    }
}

impl AsFileForMmap for Cursor<Vec<u8>> {
    fn as_file_for_mmap(&self) -> Option<&File> {
        None
    }
}
