//! The no-op transformer: `out == in`, `untransform` is a copy.

use super::BlockTransformer;
use crate::error::{Error, Result};

/// Passes blocks through unchanged. `may_change_size` is `false`, so the
/// random-access stream permits in-place overwrite of any written block.
#[derive(Debug, Default, Clone, Copy)]
pub struct Identity;

impl BlockTransformer for Identity {
    fn transform(&self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        out.clear();
        out.extend_from_slice(input);
        Ok(())
    }

    fn untransform(&self, input: &[u8], scratch: &mut [u8]) -> Result<usize> {
        if input.len() > scratch.len() {
            return Err(Error::Corruption(format!(
                "identity untransform: {} input bytes do not fit in a {}-byte scratch buffer",
                input.len(),
                scratch.len()
            )));
        }
        // `copy_from_slice` requires non-overlapping slices when `input` and
        // `scratch` alias at the same address; a same-address, same-length
        // copy is a no-op, so skip it rather than calling into a method that
        // would panic on overlap.
        if input.as_ptr() != scratch.as_ptr() {
            scratch[..input.len()].copy_from_slice(input);
        }
        Ok(input.len())
    }

    fn may_change_size(&self) -> bool {
        false
    }
}
