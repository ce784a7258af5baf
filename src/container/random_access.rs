//! Random-access read/write stream (§4.4): a single dirty-block cache of
//! one, append, truncate, and the size-change overwrite restriction.

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::cache::BlockCache;
use crate::error::{Error, Result};
use crate::extent::{self, Extent, ExtentMap};
use crate::substrate::{Durable, Truncate};
use crate::transform::{BlockTransformer, MAX_TRANSFORMED_LEN};

use super::{validate_block_size, ContainerOptions};

/// `idx` sentinel meaning no block is currently materialized.
const IDX_UNUSED: i64 = -2;
/// `idx` sentinel meaning `current_block` holds a not-yet-extant block
/// being appended.
const IDX_FRESH: i64 = -1;

/// Random-access read/write container stream.
///
/// Owns a single reusable logical block buffer (`current_block`) rather
/// than materializing the whole logical stream in memory; at most one
/// block is ever dirty at a time (§3 invariant 6).
pub struct RandomAccessStream<S> {
    /// Wrapped in `Option` so [`RandomAccessStream::into_inner`] can take
    /// ownership without violating this type's `Drop` impl.
    substrate: Option<S>,
    start: u64,
    transformer: Box<dyn BlockTransformer>,
    block_size: usize,
    cache: Box<dyn BlockCache>,
    leave_open: bool,

    extents: ExtentMap,
    logical_len: u64,
    on_disk_logical_len: u64,

    current_block: Vec<u8>,
    idx: i64,
    dirty: bool,
    position: u64,
}

impl<S: Read + Write + Seek + Truncate> RandomAccessStream<S> {
    /// Opens (or initializes, if the substrate is empty past its current
    /// position) a random-access stream. `options.block_size` must match
    /// whatever wrote the substrate, if anything did — `B` is never
    /// recorded on disk.
    pub fn open(mut substrate: S, options: ContainerOptions) -> Result<Self> {
        validate_block_size(options.block_size)?;
        let start = substrate.stream_position()?;
        let contents = extent::read_footer_writable(&mut substrate, start)?;
        log::debug!(
            "opened random-access stream at offset {start}: block_size={}, extents={}, logical_len={}",
            options.block_size,
            contents.extents.count(),
            contents.logical_len
        );
        Ok(RandomAccessStream {
            substrate: Some(substrate),
            start,
            transformer: options.transformer,
            block_size: options.block_size,
            cache: options.cache,
            leave_open: options.leave_open,
            logical_len: contents.logical_len,
            on_disk_logical_len: contents.logical_len,
            extents: contents.extents,
            current_block: vec![0u8; options.block_size],
            idx: IDX_UNUSED,
            dirty: false,
            position: 0,
        })
    }

    /// Current logical stream length.
    pub fn len(&self) -> u64 {
        self.logical_len
    }

    pub fn is_empty(&self) -> bool {
        self.logical_len == 0
    }

    pub fn leave_open(&self) -> bool {
        self.leave_open
    }

    fn block_count(&self) -> usize {
        self.extents.count()
    }

    /// Fill procedure (§4.4): materializes block `block` into
    /// `current_block`, flushing any previously dirty block first. Returns
    /// `false` if `block` has no extent yet.
    fn fill(&mut self, block: usize) -> Result<bool> {
        if self.idx == block as i64 {
            return Ok(true);
        }
        self.flush_dirty()?;
        let extent = match self.extents.get(block) {
            Some(e) => *e,
            None => return Ok(false),
        };
        if extent.length == 0 {
            if !self.transformer.may_change_size() {
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
        if self.cache.try_read(block, &mut self.current_block) {
            self.idx = block as i64;
            return Ok(true);
        }
        self.substrate_mut().seek(SeekFrom::Start(extent.offset as u64))?;
        let mut raw = vec![0u8; extent.length as usize];
        self.substrate_mut().read_exact(&mut raw)?;
        let n = self.transformer.untransform(&raw, &mut self.current_block)?;
        if n != self.block_size {
            return Err(Error::Corruption(format!(
                "block {block} decoded to {n} bytes, expected the configured block size {}",
                self.block_size
            )));
        }
        self.cache.store(block, &self.current_block);
        self.idx = block as i64;
        Ok(true)
    }

    fn flush_dirty(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if self.idx >= 0 {
            self.flush_existing_block(self.idx as usize)?;
        } else if self.idx == IDX_FRESH {
            self.flush_new_block()?;
        }
        self.idx = IDX_UNUSED;
        self.dirty = false;
        Ok(())
    }

    fn flush_existing_block(&mut self, index: usize) -> Result<()> {
        let mut transformed = Vec::new();
        self.transformer.transform(&self.current_block, &mut transformed)?;
        let extent = *self
            .extents
            .get(index)
            .expect("a dirty existing block index always has an extent");
        let is_last = index + 1 == self.block_count();
        if transformed.len() as i16 > extent.length && !is_last {
            return Err(Error::IllegalWrite(
                "re-transformed block grew beyond its slot and is not the last extent",
            ));
        }
        self.substrate_mut().seek(SeekFrom::Start(extent.offset as u64))?;
        self.substrate_mut().write_all(&transformed)?;
        self.cache.invalidate(index);

        if transformed.len() as i16 != extent.length {
            if !is_last {
                return Err(Error::Corruption(
                    "a non-last extent changed size; the size-change precondition should have forbidden this write".into(),
                ));
            }
            self.extents.set(
                index,
                Extent {
                    offset: extent.offset,
                    length: transformed.len() as i16,
                },
            );
            extent::write_footer(self.substrate_mut(), self.start, &self.extents, &[], self.logical_len)?;
            self.on_disk_logical_len = self.logical_len;
            log::debug!("rewrote footer: block {index} changed size to {} bytes", transformed.len());
        } else if self.on_disk_logical_len != self.logical_len {
            extent::rewrite_length_trailer(self.substrate_mut(), self.logical_len)?;
            self.on_disk_logical_len = self.logical_len;
        }
        Ok(())
    }

    fn flush_new_block(&mut self) -> Result<()> {
        let offset = self.extents.end_offset(self.start);
        let mut transformed = Vec::new();
        self.transformer.transform(&self.current_block, &mut transformed)?;
        if transformed.len() > MAX_TRANSFORMED_LEN {
            return Err(Error::Corruption(format!(
                "transformed block is {} bytes, exceeding the {MAX_TRANSFORMED_LEN} byte extent limit",
                transformed.len()
            )));
        }
        // Crash-safety prelude (§4.4): commit a tombstone for this index
        // before writing the real payload. If the process dies before the
        // second footer write below, recovery sees the tombstone and
        // discards this half-committed append.
        extent::write_footer(
            self.substrate_mut(),
            self.start,
            &self.extents,
            &[(-1, transformed.len() as i16)],
            self.logical_len,
        )?;
        log::debug!("wrote tombstone prelude for new block at offset {offset}, length {}", transformed.len());

        self.substrate_mut().seek(SeekFrom::Start(offset))?;
        self.substrate_mut().write_all(&transformed)?;
        self.extents.push(Extent {
            offset: offset as i64,
            length: transformed.len() as i16,
        });
        extent::write_footer(self.substrate_mut(), self.start, &self.extents, &[], self.logical_len)?;
        self.on_disk_logical_len = self.logical_len;
        Ok(())
    }

    /// Commits the dirty block (if any) and asks the substrate to flush,
    /// optionally requesting durable storage.
    pub fn flush(&mut self, durable: bool) -> Result<()>
    where
        S: Durable,
    {
        self.flush_dirty()?;
        self.substrate_mut().flush(durable)?;
        Ok(())
    }

    /// Grows or shrinks the logical stream to exactly `v` bytes (§4.4).
    pub fn set_len(&mut self, v: i64) -> Result<()> {
        if v < 0 {
            return Err(Error::OutOfRange(format!("negative length {v}")));
        }
        let v = v as u64;
        if v == self.logical_len {
            return Ok(());
        }
        if v == 0 {
            self.flush_dirty()?;
            self.extents.clear();
            self.logical_len = 0;
            self.position = 0;
            extent::write_footer(self.substrate_mut(), self.start, &self.extents, &[], 0)?;
            self.on_disk_logical_len = 0;
            log::debug!("set_len(0): cleared all extents");
            return Ok(());
        }
        if v > self.logical_len {
            let saved_position = self.position;
            self.position = self.logical_len;
            let mut remaining = v - self.logical_len;
            let zeros = vec![0u8; self.block_size];
            while remaining > 0 {
                let chunk = remaining.min(self.block_size as u64) as usize;
                self.write_inner(&zeros[..chunk])?;
                remaining -= chunk as u64;
            }
            self.position = saved_position;
            return Ok(());
        }
        // v < logical_len: shrink.
        self.flush_dirty()?;
        let max_blocks = ((v + self.block_size as u64 - 1) / self.block_size as u64) as usize;
        self.extents.truncate(max_blocks);
        self.logical_len = v;
        if self.position > v {
            self.position = self.logical_len;
        }
        extent::write_footer(self.substrate_mut(), self.start, &self.extents, &[], self.logical_len)?;
        self.on_disk_logical_len = self.logical_len;
        log::debug!("set_len({v}): truncated to {max_blocks} blocks");
        Ok(())
    }

    fn read_inner(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut total = 0usize;
        while total < buf.len() && self.position < self.logical_len {
            let block = (self.position / self.block_size as u64) as usize;
            let off = (self.position % self.block_size as u64) as usize;
            if !self.fill(block)? {
                break;
            }
            let want = buf.len() - total;
            let avail_in_block = self.block_size - off;
            let avail_in_stream = (self.logical_len - self.position) as usize;
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

    fn write_inner(&mut self, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.transformer.may_change_size() && self.position < self.logical_len {
            return Err(Error::IllegalWrite(
                "random overwrite of already-written logical range is unsupported under a size-changing transformer",
            ));
        }
        let mut total = 0usize;
        while total < buf.len() {
            let block = (self.position / self.block_size as u64) as usize;
            let off = (self.position % self.block_size as u64) as usize;
            let n = (buf.len() - total).min(self.block_size - off);

            if block < self.block_count() {
                self.fill(block)?;
                self.current_block[off..off + n].copy_from_slice(&buf[total..total + n]);
                self.idx = block as i64;
                self.dirty = true;
                self.cache.invalidate(block);
            } else {
                if self.position > self.logical_len {
                    // A gap exists between the current end of the stream
                    // and this write's position (e.g. after a seek past
                    // the end); pad it with zero-filled blocks first.
                    self.set_len(self.position as i64)?;
                }
                if block < self.block_count() {
                    self.fill(block)?;
                    self.current_block[off..off + n].copy_from_slice(&buf[total..total + n]);
                    self.idx = block as i64;
                    self.dirty = true;
                    self.cache.invalidate(block);
                } else {
                    self.flush_dirty()?;
                    self.idx = IDX_FRESH;
                    for b in self.current_block.iter_mut() {
                        *b = 0;
                    }
                    self.current_block[off..off + n].copy_from_slice(&buf[total..total + n]);
                    self.dirty = true;
                    self.flush_dirty()?;
                }
            }

            total += n;
            self.position += n as u64;
            if self.position > self.logical_len {
                self.logical_len = self.position;
            }
        }
        Ok(total)
    }

    fn seek_inner(&mut self, pos: SeekFrom) -> Result<u64> {
        let target: i64 = match pos {
            SeekFrom::Start(n) => n as i64,
            SeekFrom::Current(delta) => self.position as i64 + delta,
            SeekFrom::End(delta) => self.logical_len as i64 + delta,
        };
        if target < 0 {
            return Err(Error::OutOfRange(format!("seek to negative position {target}")));
        }
        self.position = target as u64;
        Ok(self.position)
    }

    /// Releases the substrate without an explicit flush; callers that want
    /// committed data should call [`RandomAccessStream::flush`] first.
    pub fn into_inner(mut self) -> S {
        self.substrate.take().expect("substrate already taken")
    }

    fn substrate_mut(&mut self) -> &mut S {
        self.substrate.as_mut().expect("substrate already taken by into_inner")
    }
}

impl<S: Read + Write + Seek + Truncate> Read for RandomAccessStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_inner(buf).map_err(io::Error::from)
    }
}

impl<S: Read + Write + Seek + Truncate + Durable> Write for RandomAccessStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_inner(buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        RandomAccessStream::flush(self, false).map_err(io::Error::from)
    }
}

impl<S: Read + Write + Seek + Truncate> Seek for RandomAccessStream<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.seek_inner(pos).map_err(io::Error::from)
    }
}

impl<S: Read + Write + Seek + Truncate + Durable> Drop for RandomAccessStream<S> {
    /// Base-container teardown (§4.3): flush, clear the extent map, dispose
    /// the cache, and release the substrate unless `leave_open` is set.
    fn drop(&mut self) {
        if self.substrate.is_some() {
            if let Err(e) = self.flush_dirty() {
                log::warn!("random-access stream dropped with a dirty block: flush failed: {e}");
            }
        }
        self.extents.clear();
        self.cache.dispose();
        if self.leave_open {
            if let Some(s) = self.substrate.take() {
                // Skip S's destructor so its underlying resource (e.g. an
                // open file descriptor) stays open rather than closing.
                std::mem::forget(s);
            }
        }
    }
}
