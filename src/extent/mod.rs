//! Extent map and footer codec (§4.2).
//!
//! # On-disk layout
//!
//! ```text
//!     start                                                          end
//!       |                                                             |
//!       +-----------+-----------+-----+-------------+-----------------+---------+
//!       | extent 0  | extent 1  | ... | extent N - 1 | footer body    | trailer |
//!       +-----------+-----------+-----+-------------+-----------------+---------+
//!                                                     \_____________/ \_______/
//!                                                      N * 10 bytes    16 bytes
//!
//!     footer body record (10 bytes), one per block index, ascending:
//!       +------------------+------------------+
//!       | offset: i64 LE   | length: i16 LE    |
//!       +------------------+------------------+
//!       offset < 0 or length < 0 marks a tombstone: a half-committed
//!       append, skipped on read and never assigned a block index.
//!
//!     trailer (16 bytes):
//!       +--------------------------+--------------------------+
//!       | footer body len: i64 LE  | logical stream len: i64 LE |
//!       +--------------------------+--------------------------+
//! ```

use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::{Error, Result};
use crate::substrate::Truncate;

/// On-disk representation of one logical block: where its transformed
/// bytes begin in the substrate, and how many bytes they occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub offset: i64,
    pub length: i16,
}

const RECORD_LEN: usize = 10;
const TRAILER_LEN: u64 = 16;

/// Dense, insertion-ordered map from block index to [`Extent`]. Block
/// indices are always `0..extents.len()` by construction — no gaps, no
/// hashing, matching the re-architecture hint to drop the source's
/// key/value map abstraction (§9).
#[derive(Debug, Default, Clone)]
pub struct ExtentMap {
    extents: Vec<Extent>,
}

impl ExtentMap {
    pub fn new() -> Self {
        ExtentMap { extents: Vec::new() }
    }

    pub fn get(&self, index: usize) -> Option<&Extent> {
        self.extents.get(index)
    }

    /// Appends a new extent, which must land at the current end of the map.
    pub fn push(&mut self, extent: Extent) {
        self.extents.push(extent);
    }

    /// Overwrites the extent at `index`, which must already exist.
    pub fn set(&mut self, index: usize, extent: Extent) {
        self.extents[index] = extent;
    }

    /// Drops every extent with index `>= len`, used by `SetLength` shrink.
    pub fn truncate(&mut self, len: usize) {
        self.extents.truncate(len);
    }

    pub fn clear(&mut self) {
        self.extents.clear();
    }

    pub fn count(&self) -> usize {
        self.extents.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Extent> {
        self.extents.iter()
    }

    /// The substrate offset one past the last extent's payload — where the
    /// footer body starts, and where a newly appended extent's payload
    /// would begin.
    pub fn end_offset(&self, start: u64) -> u64 {
        let sum: i64 = self.extents.iter().map(|e| e.length as i64).sum();
        start + sum as u64
    }
}

fn encode_record(out: &mut Vec<u8>, offset: i64, length: i16) {
    out.extend_from_slice(&offset.to_le_bytes());
    out.extend_from_slice(&length.to_le_bytes());
}

fn decode_record(bytes: &[u8]) -> (i64, i16) {
    let offset = i64::from_le_bytes(bytes[0..8].try_into().unwrap());
    let length = i16::from_le_bytes(bytes[8..10].try_into().unwrap());
    (offset, length)
}

/// Serializes `extents` in ascending block-index order, appends the
/// `(tombstones...)` tail already present in `extra_tail` (used by the
/// two-phase append prelude to inject a tombstone record past the map's
/// committed entries), and appends the trailer.
fn build_footer_bytes(extents: &ExtentMap, extra_tail: &[(i64, i16)], logical_len: u64) -> Vec<u8> {
    let mut body = Vec::with_capacity((extents.count() + extra_tail.len()) * RECORD_LEN);
    for e in extents.iter() {
        encode_record(&mut body, e.offset, e.length);
    }
    for &(offset, length) in extra_tail {
        encode_record(&mut body, offset, length);
    }
    let body_len = body.len() as i64;
    let mut footer = body;
    footer.extend_from_slice(&body_len.to_le_bytes());
    footer.extend_from_slice(&(logical_len as i64).to_le_bytes());
    footer
}

/// Writes the whole footer (body + trailer) to the substrate immediately
/// after the last committed extent, then truncates the substrate to end
/// exactly there. `extra_tail` lets the caller inject tombstone records
/// (negative offset/length) past the committed extents without mutating
/// `extents` itself — the two-phase append prelude in §4.4 relies on this.
pub fn write_footer<S: Write + Seek + Truncate>(
    substrate: &mut S,
    start: u64,
    extents: &ExtentMap,
    extra_tail: &[(i64, i16)],
    logical_len: u64,
) -> Result<()> {
    let footer = build_footer_bytes(extents, extra_tail, logical_len);
    let footer_pos = extents.end_offset(start);
    substrate.seek(SeekFrom::Start(footer_pos))?;
    substrate.write_all(&footer)?;
    let end = footer_pos + footer.len() as u64;
    substrate.set_len(end)?;
    Ok(())
}

/// Rewrites only the 8-byte logical-length field of the trailer, leaving
/// the footer body untouched. Legal only when the body bytes have not
/// changed since the last full footer write (§4.2).
pub fn rewrite_length_trailer<S: Write + Seek>(substrate: &mut S, logical_len: u64) -> Result<()> {
    let end = substrate.seek(SeekFrom::End(0))?;
    if end < TRAILER_LEN {
        return Err(Error::Corruption(format!(
            "substrate is {end} bytes, too short to contain a footer trailer"
        )));
    }
    substrate.seek(SeekFrom::Start(end - 8))?;
    substrate.write_all(&(logical_len as i64).to_le_bytes())?;
    Ok(())
}

/// Result of reading the footer on construction: the recovered extent map,
/// the logical stream length, and that same length recorded as the
/// "last known on-disk value" a writable stream tracks to decide whether a
/// flush needs a full footer rewrite or just the length trailer.
pub struct FooterContents {
    pub extents: ExtentMap,
    pub logical_len: u64,
}

/// Decodes the footer that already exists between `start` and `end` (the
/// substrate is known to be non-empty past `start`). Shared by both the
/// writable and read-only entry points below; needs only `Read + Seek`.
fn decode_existing_footer<S: Read + Seek>(substrate: &mut S, start: u64, end: u64) -> Result<FooterContents> {
    if end < start + TRAILER_LEN {
        return Err(Error::Corruption(format!(
            "substrate has {} bytes past start, too short for a footer trailer",
            end - start
        )));
    }
    substrate.seek(SeekFrom::Start(end - TRAILER_LEN))?;
    let mut trailer = [0u8; TRAILER_LEN as usize];
    substrate.read_exact(&mut trailer)?;
    let body_len = i64::from_le_bytes(trailer[0..8].try_into().unwrap());
    let logical_len = i64::from_le_bytes(trailer[8..16].try_into().unwrap());
    if body_len < 0 {
        return Err(Error::Corruption(format!("negative footer body length {body_len}")));
    }
    if logical_len < 0 {
        return Err(Error::Corruption(format!("negative logical stream length {logical_len}")));
    }
    let body_len = body_len as u64;
    let body_start = (end - TRAILER_LEN)
        .checked_sub(body_len)
        .ok_or_else(|| Error::Corruption(format!("footer body length {body_len} exceeds substrate size")))?;
    if body_start < start {
        return Err(Error::Corruption(format!(
            "footer body length {body_len} extends before the container's start offset"
        )));
    }
    if body_len % RECORD_LEN as u64 != 0 {
        return Err(Error::Corruption(format!(
            "footer body length {body_len} is not a multiple of the {RECORD_LEN}-byte record size"
        )));
    }
    substrate.seek(SeekFrom::Start(body_start))?;
    let mut body = vec![0u8; body_len as usize];
    substrate.read_exact(&mut body)?;

    let mut extents = ExtentMap::new();
    for chunk in body.chunks_exact(RECORD_LEN) {
        let (offset, length) = decode_record(chunk);
        if offset < 0 || length < 0 {
            // Tombstone: a half-committed append, discarded without
            // allocating a block index. Only legitimate at the tail, but
            // we don't enforce that on read — a tombstone anywhere simply
            // never becomes a block.
            log::debug!("footer recovery: skipping tombstone record (offset={offset}, length={length})");
            continue;
        }
        extents.push(Extent { offset, length });
    }

    Ok(FooterContents {
        extents,
        logical_len: logical_len as u64,
    })
}

/// Reads the footer on construction of a writable stream. If the substrate
/// is empty past `start`, a fresh empty footer is written and an empty map
/// is returned.
pub fn read_footer_writable<S: Read + Write + Seek + Truncate>(
    substrate: &mut S,
    start: u64,
) -> Result<FooterContents> {
    let end = substrate.seek(SeekFrom::End(0))?;
    if end == start {
        log::debug!("initializing fresh empty footer at offset {start}");
        write_footer(substrate, start, &ExtentMap::new(), &[], 0)?;
        return Ok(FooterContents {
            extents: ExtentMap::new(),
            logical_len: 0,
        });
    }
    decode_existing_footer(substrate, start, end)
}

/// Reads the footer on construction of a read-only stream. If the substrate
/// is empty past `start`, an empty map is returned without writing anything
/// (a read-only stream has nothing legal to initialize).
pub fn read_footer_readonly<S: Read + Seek>(substrate: &mut S, start: u64) -> Result<FooterContents> {
    let end = substrate.seek(SeekFrom::End(0))?;
    if end == start {
        return Ok(FooterContents {
            extents: ExtentMap::new(),
            logical_len: 0,
        });
    }
    decode_existing_footer(substrate, start, end)
}
