//! Crate-wide typed error enum.
//!
//! One `Error` covers every failure mode described in the container's error
//! handling design: invalid arguments, operations a stream mode does not
//! support, writes the size-changing restriction forbids, corrupted data
//! recovered from the substrate, short reads, and substrate I/O failures.
//!
//! Mirrors the teacher's per-module error shape (a small enum with a manual
//! `Display`/`std::error::Error` impl) rather than pulling in `thiserror`:
//! this crate has no CLI layer to justify an `anyhow`-style opaque error,
//! and the variant set is small and stable.

use std::fmt;
use std::io;

/// Errors surfaced by any stream mode or transformer in this crate.
#[derive(Debug)]
pub enum Error {
    /// An argument fell outside its legal range: invalid block size,
    /// a negative seek target, a negative `set_len`.
    OutOfRange(String),
    /// The operation is not supported by this stream mode (e.g. writing to
    /// a read-only stream, seeking a sequential stream).
    Unsupported(&'static str),
    /// A write was rejected by the size-change restriction, or would have
    /// overflowed a non-last extent's slot.
    IllegalWrite(&'static str),
    /// Data recovered from the substrate failed validation: a negative
    /// footer length, a decoded block of the wrong length, a checksum or
    /// AEAD tag mismatch, an LZ4 decode failure, a truncated payload, or a
    /// negative sequential frame length.
    Corruption(String),
    /// The substrate returned fewer bytes than required before reaching
    /// its own EOF.
    TruncatedRead { expected: usize, got: usize },
    /// Any error returned directly by the substrate stream.
    SubstrateIo(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfRange(msg) => write!(f, "argument out of range: {msg}"),
            Error::Unsupported(op) => write!(f, "unsupported operation: {op}"),
            Error::IllegalWrite(msg) => write!(f, "illegal write: {msg}"),
            Error::Corruption(msg) => write!(f, "corruption: {msg}"),
            Error::TruncatedRead { expected, got } => write!(
                f,
                "truncated read: expected {expected} bytes, got {got}"
            ),
            Error::SubstrateIo(e) => write!(f, "substrate I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::SubstrateIo(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::SubstrateIo(e)
    }
}

impl From<Error> for io::Error {
    /// Allows this crate's stream modes to implement `std::io::Read` /
    /// `Write` / `Seek`, whose methods must return `io::Result`.
    fn from(e: Error) -> Self {
        match e {
            Error::SubstrateIo(inner) => inner,
            other => io::Error::new(io::ErrorKind::Other, other.to_string()),
        }
    }
}

/// Internal result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
