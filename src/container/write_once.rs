//! Write-once (append-only) block stream (§4.6): the cheapest writer that
//! still produces the standard extent-indexed on-disk layout.

use std::io::{self, Seek, SeekFrom, Write};

use crate::error::{Error, Result};
use crate::extent::{self, Extent, ExtentMap};
use crate::substrate::{Durable, Truncate};
use crate::transform::{BlockTransformer, MAX_TRANSFORMED_LEN};

use super::{validate_block_size, ContainerOptions};

/// Append-only writer. Buffers logical bytes into a full-size block and
/// transforms + appends a new extent each time the buffer fills; never
/// reads back or seeks.
pub struct WriteOnceStream<S> {
    substrate: Option<S>,
    start: u64,
    transformer: Box<dyn BlockTransformer>,
    block_size: usize,
    leave_open: bool,

    extents: ExtentMap,
    logical_len: u64,

    buf: Vec<u8>,
    buf_len: usize,
    finished: bool,
}

impl<S: Seek + Write + Truncate> WriteOnceStream<S> {
    /// Creates a fresh write-once stream. The substrate is truncated to the
    /// current position so the writer never emits into a pre-populated
    /// tail (§4.6).
    pub fn create(mut substrate: S, options: ContainerOptions) -> Result<Self> {
        validate_block_size(options.block_size)?;
        let start = substrate.stream_position()?;
        substrate.set_len(start)?;
        log::debug!("created write-once stream at offset {start}: block_size={}", options.block_size);
        Ok(WriteOnceStream {
            substrate: Some(substrate),
            start,
            transformer: options.transformer,
            block_size: options.block_size,
            leave_open: options.leave_open,
            extents: ExtentMap::new(),
            logical_len: 0,
            buf: vec![0u8; options.block_size],
            buf_len: 0,
            finished: false,
        })
    }

    pub fn len(&self) -> u64 {
        self.logical_len
    }

    fn substrate_mut(&mut self) -> &mut S {
        self.substrate.as_mut().expect("substrate already taken by finish")
    }

    fn append_block(&mut self, plaintext: &[u8]) -> Result<()> {
        let mut transformed = Vec::new();
        self.transformer.transform(plaintext, &mut transformed)?;
        if transformed.len() > MAX_TRANSFORMED_LEN {
            return Err(Error::Corruption(format!(
                "transformed block is {} bytes, exceeding the {MAX_TRANSFORMED_LEN} byte extent limit",
                transformed.len()
            )));
        }
        let offset = self.extents.end_offset(self.start);
        self.substrate_mut().seek(SeekFrom::Start(offset))?;
        self.substrate_mut().write_all(&transformed)?;
        self.extents.push(Extent {
            offset: offset as i64,
            length: transformed.len() as i16,
        });
        Ok(())
    }

    fn write_inner(&mut self, buf: &[u8]) -> Result<usize> {
        if self.finished {
            return Err(Error::Unsupported("write after finish() on a write-once stream"));
        }
        let mut consumed = 0usize;
        while consumed < buf.len() {
            let want = (buf.len() - consumed).min(self.block_size - self.buf_len);
            self.buf[self.buf_len..self.buf_len + want].copy_from_slice(&buf[consumed..consumed + want]);
            self.buf_len += want;
            consumed += want;
            self.logical_len += want as u64;
            if self.buf_len == self.block_size {
                let block = std::mem::replace(&mut self.buf, vec![0u8; self.block_size]);
                self.append_block(&block)?;
                self.buf_len = 0;
            }
        }
        Ok(consumed)
    }

    /// Flushes any buffered trailing partial block (zero-padded up to the
    /// block size), writes the footer, optionally requests a durable
    /// flush, and returns the substrate. No further writes are possible.
    pub fn finish(mut self, durable: bool) -> Result<S>
    where
        S: Durable,
    {
        if self.buf_len > 0 {
            for b in self.buf[self.buf_len..].iter_mut() {
                *b = 0;
            }
            let block = std::mem::take(&mut self.buf);
            self.append_block(&block)?;
            self.buf_len = 0;
        }
        extent::write_footer(self.substrate_mut(), self.start, &self.extents, &[], self.logical_len)?;
        self.substrate_mut().flush(durable)?;
        self.finished = true;
        log::debug!(
            "finished write-once stream: {} extents, logical_len={}",
            self.extents.count(),
            self.logical_len
        );
        Ok(self.substrate.take().expect("substrate already taken"))
    }
}

impl<S: Seek + Write + Truncate> Write for WriteOnceStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_inner(buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: Seek + Write + Truncate + Durable> Drop for WriteOnceStream<S> {
    /// Best-effort finalization if the caller never called `finish`;
    /// errors are silently discarded, matching this crate's Drop
    /// convention elsewhere (call `finish` explicitly to observe them).
    fn drop(&mut self) {
        if self.finished || self.substrate.is_none() {
            return;
        }
        if self.buf_len > 0 {
            for b in self.buf[self.buf_len..].iter_mut() {
                *b = 0;
            }
            let block = std::mem::take(&mut self.buf);
            if let Err(e) = self.append_block(&block) {
                log::warn!("write-once stream dropped without finish(): trailing block flush failed: {e}");
            } else {
                self.buf_len = 0;
            }
        }
        if let Err(e) = extent::write_footer(self.substrate_mut(), self.start, &self.extents, &[], self.logical_len) {
            log::warn!("write-once stream dropped without finish(): footer write failed: {e}");
        } else if let Err(e) = self.substrate_mut().flush(false) {
            log::warn!("write-once stream dropped without finish(): substrate flush failed: {e}");
        }
        if self.leave_open {
            if let Some(s) = self.substrate.take() {
                std::mem::forget(s);
            }
        }
    }
}
