//! Block transformer contract and the concrete transformers built on it.
//!
//! A transformer is a pair of pure functions over byte ranges plus a
//! `may_change_size` flag (§4.1). It is modeled as a trait rather than an
//! inheritance hierarchy per the spec's re-architecture hint; `Composite`
//! holds an ordered list of the same trait object so pipelines can be
//! assembled at runtime.

pub mod aead;
pub mod checksum;
pub mod compress;
pub mod identity;

pub use aead::{Aead, AeadKind};
pub use checksum::Checksum;
pub use compress::Lz4Compressor;
pub use identity::Identity;

use crate::error::{Error, Result};

/// Maximum transformed length of a single extent payload (§3).
pub const MAX_TRANSFORMED_LEN: usize = 32767;

/// A bidirectional codec applied to each logical block.
///
/// Implementations must satisfy the round-trip law: for every legal-length
/// `x`, `untransform(transform(x)) == x`. `untransform` must tolerate `input`
/// and `scratch` aliasing when they start at the same address; otherwise it
/// must detect overlap and copy to a fresh buffer before decoding.
pub trait BlockTransformer: Send + Sync {
    /// Produce the on-disk representation of a logical block into `out`
    /// (which is cleared first). `out.len()` must not exceed
    /// [`MAX_TRANSFORMED_LEN`] for any legal input.
    fn transform(&self, input: &[u8], out: &mut Vec<u8>) -> Result<()>;

    /// Reverse the transformation of `input` into `scratch`, returning the
    /// number of valid bytes written. Extent-indexed callers reject a result
    /// that doesn't equal the logical block size as corruption; the
    /// sequential reader only requires `0 < n <= scratch.len()`.
    fn untransform(&self, input: &[u8], scratch: &mut [u8]) -> Result<usize>;

    /// Whether `transform` can produce an output length different from the
    /// input length. Size-changing transformers forbid in-place random
    /// overwrite of already-written logical range (§4.4).
    fn may_change_size(&self) -> bool;
}

/// Ordered pipeline of transformers, applied forward on encode and in
/// reverse on decode. `may_change_size` is the disjunction of its stages.
pub struct Composite {
    stages: Vec<Box<dyn BlockTransformer>>,
}

impl Composite {
    pub fn new(stages: Vec<Box<dyn BlockTransformer>>) -> Self {
        Composite { stages }
    }
}

impl BlockTransformer for Composite {
    fn transform(&self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        if self.stages.is_empty() {
            out.clear();
            out.extend_from_slice(input);
            return Ok(());
        }
        let mut current = input.to_vec();
        let mut next = Vec::new();
        for (i, stage) in self.stages.iter().enumerate() {
            stage.transform(&current, &mut next)?;
            if next.len() > MAX_TRANSFORMED_LEN {
                return Err(Error::Corruption(format!(
                    "composite stage {i} produced {} bytes, exceeding the {MAX_TRANSFORMED_LEN} byte extent limit",
                    next.len()
                )));
            }
            std::mem::swap(&mut current, &mut next);
        }
        out.clear();
        out.extend_from_slice(&current);
        Ok(())
    }

    fn untransform(&self, input: &[u8], scratch: &mut [u8]) -> Result<usize> {
        if self.stages.is_empty() {
            let n = input.len();
            if n > scratch.len() {
                return Err(Error::Corruption(
                    "composite untransform: input larger than scratch buffer".into(),
                ));
            }
            scratch[..n].copy_from_slice(input);
            return Ok(n);
        }
        // Apply stages in reverse order, threading the current valid bytes
        // through an intermediate buffer sized like `scratch`.
        let mut current = input.to_vec();
        let mut buf = vec![0u8; scratch.len()];
        let mut n = 0usize;
        for stage in self.stages.iter().rev() {
            n = stage.untransform(&current, &mut buf)?;
            current = buf[..n].to_vec();
        }
        scratch[..n].copy_from_slice(&current);
        Ok(n)
    }

    fn may_change_size(&self) -> bool {
        self.stages.iter().any(|s| s.may_change_size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(t: &dyn BlockTransformer, input: &[u8]) {
        let mut out = Vec::new();
        t.transform(input, &mut out).unwrap();
        let mut scratch = vec![0u8; input.len().max(64) * 4 + 64];
        let n = t.untransform(&out, &mut scratch).unwrap();
        assert_eq!(&scratch[..n], input);
    }

    #[test]
    fn empty_composite_is_identity() {
        let c = Composite::new(vec![]);
        round_trip(&c, b"hello world");
        assert!(!c.may_change_size());
    }

    #[test]
    fn composite_of_identity_and_checksum_round_trips() {
        let c = Composite::new(vec![Box::new(Identity), Box::new(Checksum::new())]);
        round_trip(&c, b"the quick brown fox");
        assert!(c.may_change_size());
    }

    #[test]
    fn composite_of_checksum_and_lz4_round_trips() {
        let c = Composite::new(vec![Box::new(Checksum::new()), Box::new(Lz4Compressor::new())]);
        let data = vec![7u8; 4096];
        round_trip(&c, &data);
        assert!(c.may_change_size());
    }
}
