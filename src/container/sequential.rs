//! Sequential framed writer/reader (§4.7): a simpler variant with no
//! extent footer. Each transformed block is prefixed with its length as a
//! little-endian 16-bit integer; neither side supports seek.

use std::io::{self, Read, Write};

use crate::error::{Error, Result};
use crate::transform::{BlockTransformer, MAX_TRANSFORMED_LEN};

use super::{validate_block_size, ContainerOptions};

/// Buffers up to `B` logical bytes and emits a length-prefixed transformed
/// frame whenever the buffer fills, or when explicitly flushed early.
pub struct SequentialWriter<S> {
    inner: Option<S>,
    transformer: Box<dyn BlockTransformer>,
    block_size: usize,
    leave_open: bool,
    buf: Vec<u8>,
    buf_len: usize,
    finished: bool,
}

impl<S: Write> SequentialWriter<S> {
    pub fn create(inner: S, options: ContainerOptions) -> Result<Self> {
        validate_block_size(options.block_size)?;
        log::debug!("created sequential writer: block_size={}", options.block_size);
        Ok(SequentialWriter {
            inner: Some(inner),
            transformer: options.transformer,
            block_size: options.block_size,
            leave_open: options.leave_open,
            buf: vec![0u8; options.block_size],
            buf_len: 0,
            finished: false,
        })
    }

    fn inner_mut(&mut self) -> &mut S {
        self.inner.as_mut().expect("inner writer already taken by finish")
    }

    fn emit_frame(&mut self, plaintext: &[u8]) -> Result<()> {
        let mut transformed = Vec::new();
        self.transformer.transform(plaintext, &mut transformed)?;
        if transformed.is_empty() || transformed.len() > MAX_TRANSFORMED_LEN {
            return Err(Error::Corruption(format!(
                "transformed frame is {} bytes, must be in (0, {MAX_TRANSFORMED_LEN}]",
                transformed.len()
            )));
        }
        let len = transformed.len() as u16;
        self.inner_mut().write_all(&len.to_le_bytes())?;
        self.inner_mut().write_all(&transformed)?;
        Ok(())
    }

    fn write_inner(&mut self, buf: &[u8]) -> Result<usize> {
        if self.finished {
            return Err(Error::Unsupported("write after finish() on a sequential writer"));
        }
        let mut consumed = 0usize;
        while consumed < buf.len() {
            let want = (buf.len() - consumed).min(self.block_size - self.buf_len);
            self.buf[self.buf_len..self.buf_len + want].copy_from_slice(&buf[consumed..consumed + want]);
            self.buf_len += want;
            consumed += want;
            if self.buf_len == self.block_size {
                let block = std::mem::replace(&mut self.buf, vec![0u8; self.block_size]);
                self.emit_frame(&block)?;
                self.buf_len = 0;
            }
        }
        Ok(consumed)
    }

    /// Emits a short frame for whatever is currently buffered, without
    /// waiting for a full block. A no-op if nothing is buffered.
    pub fn flush_early(&mut self) -> Result<()> {
        if self.buf_len == 0 {
            return Ok(());
        }
        let buf_len = self.buf_len;
        let block = self.buf[..buf_len].to_vec();
        self.emit_frame(&block)?;
        self.buf_len = 0;
        Ok(())
    }

    /// Flushes any remaining buffered bytes as a final short frame and
    /// returns the inner writer.
    pub fn finish(mut self) -> Result<S> {
        self.flush_early()?;
        self.finished = true;
        log::debug!("finished sequential writer");
        Ok(self.inner.take().expect("inner writer already taken"))
    }
}

impl<S: Write> Write for SequentialWriter<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_inner(buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_early().map_err(io::Error::from)
    }
}

impl<S: Write> Drop for SequentialWriter<S> {
    /// Best-effort final-frame flush if the caller never called `finish`.
    fn drop(&mut self) {
        if self.finished || self.inner.is_none() {
            return;
        }
        if let Err(e) = self.flush_early() {
            log::warn!("sequential writer dropped without finish(): final frame flush failed: {e}");
        }
        if self.leave_open {
            if let Some(s) = self.inner.take() {
                std::mem::forget(s);
            }
        }
    }
}

/// Reads frames emitted by [`SequentialWriter`], decoding each into the
/// caller's buffer. Stops cleanly at EOF between frames; any other
/// truncation is reported as corruption.
///
/// Implements [`std::io::Read`] over the decoded byte stream: a decoded
/// frame that only partially fills the caller's buffer is held in an
/// internal cursor so the remainder is handed out on the next call,
/// mirroring how the teacher's `Lz4ReadFile` buffers partially-consumed
/// decompressed output between `read` calls.
pub struct SequentialReader<S> {
    inner: Option<S>,
    transformer: Box<dyn BlockTransformer>,
    scratch: Vec<u8>,
    pending: Vec<u8>,
    pending_pos: usize,
    pending_len: usize,
    leave_open: bool,
}

impl<S: Read> SequentialReader<S> {
    pub fn open(inner: S, options: ContainerOptions) -> Result<Self> {
        validate_block_size(options.block_size)?;
        log::debug!("opened sequential reader: block_size={}", options.block_size);
        Ok(SequentialReader {
            inner: Some(inner),
            transformer: options.transformer,
            scratch: vec![0u8; options.block_size],
            pending: vec![0u8; options.block_size],
            pending_pos: 0,
            pending_len: 0,
            leave_open: options.leave_open,
        })
    }

    fn inner_mut(&mut self) -> &mut S {
        self.inner.as_mut().expect("inner reader already taken")
    }

    /// Reads and decodes the next frame into `out`, returning the number
    /// of decoded bytes, or `Ok(0)` at a clean end-of-stream (no partial
    /// length prefix was read).
    pub fn read_frame(&mut self, out: &mut [u8]) -> Result<usize> {
        let mut len_buf = [0u8; 2];
        let mut got = 0usize;
        while got < 2 {
            let n = self.inner_mut().read(&mut len_buf[got..])?;
            if n == 0 {
                if got == 0 {
                    return Ok(0);
                }
                return Err(Error::TruncatedRead { expected: 2, got });
            }
            got += n;
        }
        let len = u16::from_le_bytes(len_buf) as usize;
        if len == 0 {
            return Err(Error::Corruption("sequential frame has a zero-length payload".into()));
        }
        let mut frame = vec![0u8; len];
        self.inner_mut().read_exact(&mut frame).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::Corruption(format!("sequential frame truncated: expected {len} payload bytes"))
            } else {
                Error::from(e)
            }
        })?;
        let n = self.transformer.untransform(&frame, &mut self.scratch)?;
        if n == 0 || n > self.scratch.len() {
            return Err(Error::Corruption(format!(
                "sequential frame decoded to {n} bytes, must be in (0, {}]",
                self.scratch.len()
            )));
        }
        if n > out.len() {
            return Err(Error::Corruption(format!(
                "decoded frame is {n} bytes, larger than the {}-byte caller buffer",
                out.len()
            )));
        }
        out[..n].copy_from_slice(&self.scratch[..n]);
        Ok(n)
    }

    /// Fills `buf` from the decoded byte stream, decoding as many frames as
    /// needed and carrying any unconsumed remainder of a frame across calls.
    /// Returns `0` only at a clean end-of-stream.
    fn read_inner(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pending_pos == self.pending_len {
            let n = self.read_frame_into_pending()?;
            if n == 0 {
                return Ok(0);
            }
        }
        let avail = self.pending_len - self.pending_pos;
        let n = avail.min(buf.len());
        buf[..n].copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + n]);
        self.pending_pos += n;
        Ok(n)
    }

    fn read_frame_into_pending(&mut self) -> Result<usize> {
        let block_size = self.scratch.len();
        if self.pending.len() < block_size {
            self.pending.resize(block_size, 0);
        }
        let n = {
            let pending = &mut self.pending[..block_size];
            self.read_frame(pending)?
        };
        self.pending_pos = 0;
        self.pending_len = n;
        Ok(n)
    }
}

impl<S: Read> Read for SequentialReader<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_inner(buf).map_err(io::Error::from)
    }
}

impl<S> Drop for SequentialReader<S> {
    /// Releases the inner reader unless `leave_open` was set, per §4.3.
    fn drop(&mut self) {
        if self.leave_open {
            if let Some(s) = self.inner.take() {
                std::mem::forget(s);
            }
        }
    }
}
