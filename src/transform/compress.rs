//! LZ4 block-compression transformer.
//!
//! The LZ4 codec itself — the particular match-finding and encoding
//! algorithm — is a standard building block delegated to `lz4_flex` (a
//! pure-Rust LZ4 implementation used for the same purpose in several crates
//! in this corpus, e.g. `kimberlitedb-kimberlite` and `boa-dev-boa`) rather
//! than re-derived here.

use super::{BlockTransformer, MAX_TRANSFORMED_LEN};
use crate::error::{Error, Result};

/// Compresses each block with the LZ4 block format. `may_change_size` is
/// `true`: compressed length varies with input redundancy.
#[derive(Debug, Default, Clone, Copy)]
pub struct Lz4Compressor;

impl Lz4Compressor {
    pub fn new() -> Self {
        Lz4Compressor
    }
}

impl BlockTransformer for Lz4Compressor {
    fn transform(&self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        let bound = lz4_flex::block::get_maximum_output_size(input.len());
        out.clear();
        out.resize(bound, 0);
        let n = lz4_flex::block::compress_into(input, out)
            .map_err(|e| Error::Corruption(format!("lz4 compress failed: {e}")))?;
        out.truncate(n);
        if out.len() > MAX_TRANSFORMED_LEN {
            return Err(Error::Corruption(format!(
                "lz4-compressed block is {} bytes, exceeding the {MAX_TRANSFORMED_LEN} byte extent limit",
                out.len()
            )));
        }
        Ok(())
    }

    fn untransform(&self, input: &[u8], scratch: &mut [u8]) -> Result<usize> {
        lz4_flex::block::decompress_into(input, scratch)
            .map_err(|e| Error::Corruption(format!("lz4 decompress failed: {e}")))
    }

    fn may_change_size(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_compressible_block() {
        let lz4 = Lz4Compressor::new();
        let input = vec![0x42u8; 8192];
        let mut out = Vec::new();
        lz4.transform(&input, &mut out).unwrap();
        assert!(out.len() < input.len(), "repetitive input should shrink");
        let mut scratch = vec![0u8; input.len()];
        let n = lz4.untransform(&out, &mut scratch).unwrap();
        assert_eq!(&scratch[..n], &input[..]);
    }

    #[test]
    fn round_trips_incompressible_block() {
        let lz4 = Lz4Compressor::new();
        let input: Vec<u8> = (0..4096u32).map(|i| (i * 2654435761u32) as u8).collect();
        let mut out = Vec::new();
        lz4.transform(&input, &mut out).unwrap();
        let mut scratch = vec![0u8; input.len()];
        let n = lz4.untransform(&out, &mut scratch).unwrap();
        assert_eq!(n, input.len());
        assert_eq!(&scratch[..n], &input[..]);
    }

    #[test]
    fn corrupt_payload_fails_to_decompress() {
        let lz4 = Lz4Compressor::new();
        let input = vec![0x99u8; 2048];
        let mut out = Vec::new();
        lz4.transform(&input, &mut out).unwrap();
        // Truncating a valid LZ4 block makes it undecodeable.
        let truncated = &out[..out.len() / 2];
        let mut scratch = vec![0u8; input.len()];
        assert!(lz4.untransform(truncated, &mut scratch).is_err());
    }

    #[test]
    fn may_change_size_is_true() {
        assert!(Lz4Compressor::new().may_change_size());
    }
}
