//! Read-only random-access stream and independent positioned cursors
//! (§4.5), with a memory-mapped fast path for file-backed substrates.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex};

use memmap2::Mmap;

use crate::error::{Error, Result};
use crate::extent::{self, Extent, ExtentMap};
use crate::substrate::AsFileForMmap;
use crate::transform::BlockTransformer;

use super::{validate_block_size, ContainerOptions};

enum Backing<S> {
    /// Holds the substrate alongside the mapping (rather than dropping it
    /// once the mapping is established) purely so teardown can honor
    /// `leave_open`; reads are served from `Mmap` alone.
    Mapped(Mmap, Option<S>),
    Serialized(Mutex<Option<S>>),
}

/// Immutable state shared by every cursor over the same container: the
/// recovered extent map, the transformer, the block size, and either a
/// memory mapping or a mutex-serialized substrate handle.
struct Shared<S> {
    backing: Backing<S>,
    transformer: Box<dyn BlockTransformer>,
    extents: ExtentMap,
    logical_len: u64,
    block_size: usize,
    start: u64,
    leave_open: bool,
}

impl<S: Read + Seek> Shared<S> {
    fn read_extent(&self, extent: Extent, out: &mut Vec<u8>) -> Result<()> {
        out.clear();
        out.resize(extent.length as usize, 0);
        match &self.backing {
            Backing::Mapped(map, _) => {
                let begin = extent.offset as usize;
                let end = begin + extent.length as usize;
                let slice = map
                    .get(begin..end)
                    .ok_or_else(|| Error::Corruption("extent range falls outside the memory-mapped substrate".into()))?;
                out.copy_from_slice(slice);
                Ok(())
            }
            Backing::Serialized(mutex) => {
                let mut guard = mutex.lock().expect("substrate mutex poisoned");
                let substrate = guard.as_mut().expect("substrate already released");
                substrate.seek(SeekFrom::Start(extent.offset as u64))?;
                substrate.read_exact(out)?;
                Ok(())
            }
        }
    }
}

impl<S> Drop for Shared<S> {
    /// Releases the substrate unless `leave_open` was set (§4.3). When set,
    /// the substrate's destructor is skipped so its underlying resource
    /// (e.g. an open file descriptor) stays open.
    fn drop(&mut self) {
        if !self.leave_open {
            return;
        }
        match &mut self.backing {
            Backing::Mapped(_, substrate) => {
                if let Some(s) = substrate.take() {
                    std::mem::forget(s);
                }
            }
            Backing::Serialized(mutex) => {
                if let Ok(mut guard) = mutex.lock() {
                    if let Some(s) = guard.take() {
                        std::mem::forget(s);
                    }
                }
            }
        }
    }
}

/// Read-only container stream. Owns the default cursor; additional
/// independent cursors can be created with [`ReadOnlyStream::cursor`].
pub struct ReadOnlyStream<S> {
    shared: Arc<Shared<S>>,
    default_cursor: Cursor<S>,
}

impl<S: Read + Seek + AsFileForMmap> ReadOnlyStream<S> {
    /// Opens a read-only stream. When `substrate` is backed by a real file,
    /// establishes a read-only memory mapping and serves every cursor from
    /// it instead of seek+read.
    pub fn open(mut substrate: S, options: ContainerOptions) -> Result<Self> {
        validate_block_size(options.block_size)?;
        let start = substrate.stream_position()?;
        let contents = extent::read_footer_readonly(&mut substrate, start)?;
        log::debug!(
            "opened read-only stream at offset {start}: block_size={}, extents={}, logical_len={}",
            options.block_size,
            contents.extents.count(),
            contents.logical_len
        );

        let backing = match substrate.as_file_for_mmap() {
            Some(file) => {
                // SAFETY: the mapping is read-only and this crate never
                // writes through it; callers are responsible for not
                // concurrently truncating the backing file out from under
                // an open mapping, per the platform's usual mmap contract.
                let map = unsafe { Mmap::map(file) }?;
                Backing::Mapped(map, Some(substrate))
            }
            None => Backing::Serialized(Mutex::new(Some(substrate))),
        };

        let shared = Arc::new(Shared {
            backing,
            transformer: options.transformer,
            extents: contents.extents,
            logical_len: contents.logical_len,
            block_size: options.block_size,
            start,
            leave_open: options.leave_open,
        });

        Ok(ReadOnlyStream {
            default_cursor: Cursor::new(Arc::clone(&shared)),
            shared,
        })
    }

    pub fn len(&self) -> u64 {
        self.shared.logical_len
    }

    pub fn is_empty(&self) -> bool {
        self.shared.logical_len == 0
    }

    /// Creates a new, independently positioned cursor sharing this
    /// container's immutable extent map. Safe to use concurrently with the
    /// default cursor and any other cursor when the substrate was
    /// memory-mapped; otherwise substrate access is serialized by a mutex.
    pub fn cursor(&self) -> Cursor<S> {
        Cursor::new(Arc::clone(&self.shared))
    }
}

impl<S: Read + Seek + AsFileForMmap> Read for ReadOnlyStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.default_cursor.read(buf)
    }
}

impl<S: Read + Seek + AsFileForMmap> Seek for ReadOnlyStream<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.default_cursor.seek(pos)
    }
}

/// A lightweight positioned reader over a [`ReadOnlyStream`]'s shared,
/// immutable extent map (§9, "Cursors").
pub struct Cursor<S> {
    shared: Arc<Shared<S>>,
    current_block: Vec<u8>,
    idx: i64,
    position: u64,
}

impl<S: Read + Seek> Cursor<S> {
    fn new(shared: Arc<Shared<S>>) -> Self {
        let block_size = shared.block_size;
        Cursor {
            shared,
            current_block: vec![0u8; block_size],
            idx: -1,
            position: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.shared.logical_len
    }

    pub fn is_empty(&self) -> bool {
        self.shared.logical_len == 0
    }

    fn fill(&mut self, block: usize) -> Result<bool> {
        if self.idx == block as i64 {
            return Ok(true);
        }
        let extent = match self.shared.extents.get(block) {
            Some(e) => *e,
            None => return Ok(false),
        };
        if extent.length == 0 {
            if !self.shared.transformer.may_change_size() {
                return Err(Error::Corruption(
                    "zero-length placeholder extent under a fixed-size transformer".into(),
                ));
            }
            for b in self.current_block.iter_mut() {
                *b = 0;
            }
            self.idx = block as i64;
            return Ok(true);
        }
        let mut raw = Vec::new();
        self.shared.read_extent(extent, &mut raw)?;
        let n = self.shared.transformer.untransform(&raw, &mut self.current_block)?;
        if n != self.shared.block_size {
            return Err(Error::Corruption(format!(
                "block {block} decoded to {n} bytes, expected the configured block size {}",
                self.shared.block_size
            )));
        }
        self.idx = block as i64;
        Ok(true)
    }

    fn read_inner(&mut self, buf: &mut [u8]) -> Result<usize> {
        let logical_len = self.shared.logical_len;
        let block_size = self.shared.block_size;
        let mut total = 0usize;
        while total < buf.len() && self.position < logical_len {
            let block = (self.position / block_size as u64) as usize;
            let off = (self.position % block_size as u64) as usize;
            if !self.fill(block)? {
                break;
            }
            let want = buf.len() - total;
            let avail_in_block = block_size - off;
            let avail_in_stream = (logical_len - self.position) as usize;
            let n = want.min(avail_in_block).min(avail_in_stream);
            if n == 0 {
                break;
            }
            buf[total..total + n].copy_from_slice(&self.current_block[off..off + n]);
            total += n;
            self.position += n as u64;
        }
        Ok(total)
    }

    fn seek_inner(&mut self, pos: SeekFrom) -> Result<u64> {
        let target: i64 = match pos {
            SeekFrom::Start(n) => n as i64,
            SeekFrom::Current(delta) => self.position as i64 + delta,
            SeekFrom::End(delta) => self.shared.logical_len as i64 + delta,
        };
        if target < 0 {
            return Err(Error::OutOfRange(format!("seek to negative position {target}")));
        }
        self.position = target as u64;
        Ok(self.position)
    }
}

impl<S: Read + Seek> Read for Cursor<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_inner(buf).map_err(io::Error::from)
    }
}

impl<S: Read + Seek> Seek for Cursor<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.seek_inner(pos).map_err(io::Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::write_once::WriteOnceStream;
    use crate::transform::Identity;
    use std::io::Cursor as IoCursor;
    use std::io::Write;

    fn written_substrate(data: &[u8]) -> IoCursor<Vec<u8>> {
        let mut w = WriteOnceStream::create(
            IoCursor::new(Vec::new()),
            ContainerOptions::new().transformer(Box::new(Identity)).block_size(512),
        )
        .unwrap();
        w.write_all(data).unwrap();
        w.finish(false).unwrap()
    }

    #[test]
    fn reads_back_exactly_what_was_written() {
        let data: Vec<u8> = (0..3000u32).map(|i| i as u8).collect();
        let substrate = written_substrate(&data);
        let mut r = ReadOnlyStream::open(
            substrate,
            ContainerOptions::new().transformer(Box::new(Identity)).block_size(512),
        )
        .unwrap();
        assert_eq!(r.len(), data.len() as u64);
        let mut out = vec![0u8; data.len()];
        r.read_exact(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn independent_cursors_each_see_the_whole_stream() {
        let data: Vec<u8> = (0..4000u32).map(|i| (i % 251) as u8).collect();
        let substrate = written_substrate(&data);
        let r = ReadOnlyStream::open(
            substrate,
            ContainerOptions::new().transformer(Box::new(Identity)).block_size(512),
        )
        .unwrap();

        let mut a = r.cursor();
        let mut b = r.cursor();
        a.seek(SeekFrom::Start(0)).unwrap();
        b.seek(SeekFrom::Start(2000)).unwrap();

        let mut out_a = vec![0u8; data.len()];
        a.read_exact(&mut out_a).unwrap();
        assert_eq!(out_a, data);

        let mut out_b = vec![0u8; 2000];
        b.read_exact(&mut out_b).unwrap();
        assert_eq!(out_b, &data[2000..]);
    }
}
