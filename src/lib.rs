//! A block-oriented container over an arbitrary seekable byte stream.
//!
//! A caller writes a logical byte stream; the container chunks it into
//! fixed-size logical blocks, pipes each block through a pluggable
//! [`transform::BlockTransformer`] (identity, checksum, compression,
//! authenticated encryption, or any ordered composition of these), and
//! stores the transformed bytes as extents in the wrapped stream together
//! with a trailing index footer mapping logical block indices to on-disk
//! extents.
//!
//! # Access modes
//!
//! Four access modes share the same extent-indexed on-disk layout, plus one
//! simpler framed variant:
//!
//! - [`container::random_access::RandomAccessStream`] — random-access
//!   read/write, implementing [`std::io::Read`], [`std::io::Write`], and
//!   [`std::io::Seek`].
//! - [`container::read_only::ReadOnlyStream`] — random-access read-only,
//!   with a memory-mapped fast path and independent
//!   [`container::read_only::Cursor`]s.
//! - [`container::write_once::WriteOnceStream`] — append-only writer
//!   producing the same on-disk format more cheaply.
//! - [`container::sequential::SequentialWriter`] /
//!   [`container::sequential::SequentialReader`] — a simpler length-prefixed
//!   framed stream with no extent footer, for pure sequential use.
//!
//! # Module layout
//!
//! - [`error`] — the crate-wide typed error enum.
//! - [`transform`] — the block transformer contract and concrete
//!   transformers (identity, checksum, LZ4, AEAD, composite pipelines).
//! - [`extent`] — the in-memory extent map and on-disk footer codec.
//! - [`container`] — the base container and the four stream modes built on
//!   top of the extent map.
//! - [`cache`] — the optional pluggable block cache.
//! - [`substrate`] — capability traits (`Truncate`, `Durable`,
//!   `AsFileForMmap`) describing what this crate needs from a wrapped
//!   stream beyond plain `Read`/`Write`/`Seek`.
//!
//! This crate has no CLI, no environment-driven configuration, and no
//! persistent state beyond the substrate content it is given.

pub mod cache;
pub mod container;
pub mod error;
pub mod extent;
pub mod substrate;
pub mod transform;

pub use cache::{BlockCache, BoundedBlockCache, NullCache};
pub use container::{
    ContainerOptions, Cursor, RandomAccessStream, ReadOnlyStream, SequentialReader,
    SequentialWriter, WriteOnceStream, DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE,
};
pub use error::{Error, Result};
pub use extent::{Extent, ExtentMap};
pub use transform::{Aead, AeadKind, BlockTransformer, Checksum, Composite, Identity, Lz4Compressor};
