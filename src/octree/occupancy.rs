//! Bitwise occupancy coding.
//!
//! Eight bits per node in a fixed child order, each conditioned on the
//! reduced neighbour pattern, the bits already coded for this node, the
//! child position and, on inter slices, the predicted occupancy. The
//! context flows through one of two OBUF families; the caller picks
//! sparse or dense from the running level statistics.

use crate::entropy::{EntropyDecoder, EntropyEncoder};
use crate::error::{Error, Result};
use crate::obuf::{CtxMap, CtxModelPool};

/// The OBUF key pair for one occupancy bit.
fn occ_ctx(r9: u8, partial: u8, child: u8, pred_occ: u8, pred_valid: bool) -> (usize, usize) {
    let i = (r9 as usize) << 8 | partial as usize;
    let pred_bit = (pred_occ >> child & 1) as usize;
    let j = (child as usize) << 2 | (pred_valid as usize) << 1 | pred_bit;
    (i, j)
}

/// Codes a node's occupancy byte. `valid_mask` collapses children on
/// non-split axes; bits outside it are never coded. The final valid bit
/// is inferred when everything before it was empty, so an all-zero byte
/// is unrepresentable by construction.
#[allow(clippy::too_many_arguments)]
pub(crate) fn encode_occupancy(
    enc: &mut EntropyEncoder,
    map: &mut CtxMap,
    pool: &mut CtxModelPool,
    occupancy: u8,
    valid_mask: u8,
    r9: u8,
    pred_occ: u8,
    pred_valid: bool,
) -> Result<()> {
    if occupancy == 0 || occupancy & !valid_mask != 0 {
        return Err(Error::Semantic(format!(
            "occupancy {:#04x} outside valid mask {:#04x}",
            occupancy, valid_mask
        )));
    }
    let last_valid = 7 - valid_mask.leading_zeros() as u8;
    let mut partial = 0u8;
    for child in 0..8u8 {
        if valid_mask >> child & 1 == 0 {
            continue;
        }
        let bit = occupancy >> child & 1 != 0;
        if child == last_valid && partial == 0 {
            // Inferred one; a node must have at least one child.
            debug_assert!(bit);
            partial |= 1 << child;
            continue;
        }
        let (i, j) = occ_ctx(r9, partial, child, pred_occ, pred_valid);
        let c = map.lookup(i, j);
        enc.encode_bit(bit, &mut pool.models[c as usize]);
        map.observe(bit, i, j);
        if bit {
            partial |= 1 << child;
        }
    }
    Ok(())
}

/// Decodes a node's occupancy byte; the mirror of `encode_occupancy`.
pub(crate) fn decode_occupancy(
    dec: &mut EntropyDecoder,
    map: &mut CtxMap,
    pool: &mut CtxModelPool,
    valid_mask: u8,
    r9: u8,
    pred_occ: u8,
    pred_valid: bool,
) -> u8 {
    let last_valid = 7 - valid_mask.leading_zeros() as u8;
    let mut partial = 0u8;
    for child in 0..8u8 {
        if valid_mask >> child & 1 == 0 {
            continue;
        }
        if child == last_valid && partial == 0 {
            partial |= 1 << child;
            continue;
        }
        let (i, j) = occ_ctx(r9, partial, child, pred_occ, pred_valid);
        let c = map.lookup(i, j);
        let bit = dec.decode_bit(&mut pool.models[c as usize]);
        map.observe(bit, i, j);
        if bit {
            partial |= 1 << child;
        }
    }
    partial
}
