//! CRC-64 checksum transformer.
//!
//! Appends an 8-byte little-endian checksum to each block. The particular
//! CRC variant (polynomial, reflection, init/xorout) is a standard building
//! block delegated to the `crc` crate rather than a hand-rolled table, per
//! §4.1: "their low-level primitives... are standard building blocks that
//! the implementation delegates to".

use crc::{Algorithm, Crc};

use super::BlockTransformer;
use crate::error::{Error, Result};

const CHECKSUM_LEN: usize = 8;

/// The CRC-64 variant prescribed by §4.1: polynomial `0xD800000000000000`,
/// all-ones initial value, reflected input/output, all-ones final XOR.
const ALGORITHM: Algorithm<u64> = Algorithm {
    width: 64,
    poly: 0xD800_0000_0000_0000,
    init: 0xFFFF_FFFF_FFFF_FFFF,
    refin: true,
    refout: true,
    xorout: 0xFFFF_FFFF_FFFF_FFFF,
    check: 0,
    residue: 0,
};

/// Appends an 8-byte little-endian CRC-64 trailer over the input; verifies
/// and strips it on decode. `may_change_size` is `true`.
pub struct Checksum {
    crc: Crc<u64>,
}

impl Checksum {
    pub fn new() -> Self {
        Checksum {
            crc: Crc::<u64>::new(&ALGORITHM),
        }
    }
}

impl Default for Checksum {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockTransformer for Checksum {
    fn transform(&self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        out.clear();
        out.extend_from_slice(input);
        let digest = self.crc.checksum(input);
        out.extend_from_slice(&digest.to_le_bytes());
        Ok(())
    }

    fn untransform(&self, input: &[u8], scratch: &mut [u8]) -> Result<usize> {
        if input.len() < CHECKSUM_LEN {
            return Err(Error::Corruption(format!(
                "checksum block too short: {} bytes, need at least {CHECKSUM_LEN}",
                input.len()
            )));
        }
        let payload_len = input.len() - CHECKSUM_LEN;
        let (payload, trailer) = input.split_at(payload_len);
        let expected = u64::from_le_bytes(trailer.try_into().unwrap());
        let actual = self.crc.checksum(payload);
        if actual != expected {
            return Err(Error::Corruption(format!(
                "checksum mismatch: expected {expected:#018x}, computed {actual:#018x}"
            )));
        }
        if payload_len > scratch.len() {
            return Err(Error::Corruption(format!(
                "checksum untransform: {payload_len} payload bytes do not fit in a {}-byte scratch buffer",
                scratch.len()
            )));
        }
        if payload.as_ptr() != scratch.as_ptr() {
            scratch[..payload_len].copy_from_slice(payload);
        }
        Ok(payload_len)
    }

    fn may_change_size(&self) -> bool {
        true
    }
}
