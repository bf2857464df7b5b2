//! Inferred direct coding mode.
//!
//! Sparse, isolated branches short-circuit the recursion: up to two
//! points are coded as raw position bits instead of descending further.

use crate::entropy::{EntropyDecoder, EntropyEncoder};
use crate::error::{Error, Result};
use crate::point::Vec3;
use crate::quant::{AngPosScaler, QuantizerGeom};
use crate::slice::GeomContexts;

use super::node::OctreeNode;

/// The eligibility predicate, graded by the configured intensity.
///
/// A predictable occupancy suppresses direct mode unconditionally: a
/// branch the reference frame tracks is not isolated.
pub(crate) fn is_direct_mode_eligible(
    intensity: u8,
    node_size_log2: i32,
    node_neigh_pattern: u8,
    node: &OctreeNode,
    child_siblings_plus1: u8,
    occupancy_is_predictable: bool,
) -> bool {
    if intensity == 0 || occupancy_is_predictable {
        return false;
    }
    match intensity {
        1 => {
            node_size_log2 >= 2
                && node_neigh_pattern == 0
                && child_siblings_plus1 == 1
                && node.siblings_plus1 <= 2
        }
        2 => node_size_log2 >= 2 && node_neigh_pattern == 0,
        _ => node_size_log2 >= 2 && child_siblings_plus1 > 1,
    }
}

/// Context for the direct-mode flag, graded by how crowded the parent is.
fn flag_ctx(child_siblings_plus1: u8) -> usize {
    (child_siblings_plus1 as usize - 1).min(2)
}

/// Codes the points of a direct-mode node: a count bit, then for every
/// point the remaining position bits, bypassed, with the node quantiser
/// applied to the low bits.
pub(crate) fn encode_idcm_points(
    enc: &mut EntropyEncoder,
    ctxs: &mut GeomContexts,
    node_origin: Vec3,
    size_log2: Vec3,
    points: &[Vec3],
    dup_counts: &[u32],
    unique_points: bool,
) {
    debug_assert!(!points.is_empty() && points.len() <= crate::constants::IDCM_MAX_POINTS);
    enc.encode_bit(points.len() == 2, &mut ctxs.idcm_two_points);
    for (k, p) in points.iter().enumerate() {
        for a in 0..3 {
            let rel = p[a] - (node_origin[a] << size_log2[a] as u32);
            enc.encode_bypass_bits(rel as u64, size_log2[a] as u32);
        }
        if !unique_points {
            super::encode_dup_count(enc, ctxs, dup_counts[k]);
        }
    }
}

/// Decodes a direct-mode node into `out`, applying the node quantiser.
pub(crate) fn decode_idcm_points(
    dec: &mut EntropyDecoder,
    ctxs: &mut GeomContexts,
    node: &OctreeNode,
    size_log2: Vec3,
    unique_points: bool,
    out: &mut Vec<Vec3>,
) -> Result<()> {
    let two = dec.decode_bit(&mut ctxs.idcm_two_points);
    let count = if two { 2 } else { 1 };
    tracing::trace!(count, pos = ?node.pos, "direct mode node");
    let quant = QuantizerGeom::new(node.qp);
    for _ in 0..count {
        let mut p = Vec3::splat(0);
        for a in 0..3 {
            let bits = size_log2[a] as u32;
            let rel = dec.decode_bypass_bits(bits) as i32;
            let abs = (node.pos[a] << bits) + rel;
            p[a] = if node.qp > 0 {
                AngPosScaler::new(quant, node.qp_size[a] as u32).scale_ns(abs as i64) as i32
            } else {
                abs
            };
        }
        let extra = if unique_points {
            0
        } else {
            super::decode_dup_count(dec, ctxs)
        };
        if dec.exhausted() {
            return Err(Error::Syntax {
                offset: dec.consumed(),
                reason: "truncated direct-mode node".to_owned(),
            });
        }
        for _ in 0..=extra {
            out.push(p);
        }
    }
    Ok(())
}

pub(crate) fn encode_idcm_flag(
    enc: &mut EntropyEncoder,
    ctxs: &mut GeomContexts,
    used: bool,
    child_siblings_plus1: u8,
) {
    enc.encode_bit(used, &mut ctxs.idcm_flag[flag_ctx(child_siblings_plus1)]);
}

pub(crate) fn decode_idcm_flag(
    dec: &mut EntropyDecoder,
    ctxs: &mut GeomContexts,
    child_siblings_plus1: u8,
) -> bool {
    dec.decode_bit(&mut ctxs.idcm_flag[flag_ctx(child_siblings_plus1)])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lone_node() -> OctreeNode {
        OctreeNode::root(1, 0, 0)
    }

    #[test]
    fn intensity_zero_never_eligible() {
        let n = lone_node();
        assert!(!is_direct_mode_eligible(0, 4, 0, &n, 1, false));
    }

    #[test]
    fn predictable_occupancy_suppresses() {
        let n = lone_node();
        assert!(is_direct_mode_eligible(2, 4, 0, &n, 1, false));
        assert!(!is_direct_mode_eligible(2, 4, 0, &n, 1, true));
    }

    #[test]
    fn intensity_one_wants_isolation() {
        let mut n = lone_node();
        assert!(is_direct_mode_eligible(1, 2, 0, &n, 1, false));
        assert!(!is_direct_mode_eligible(1, 1, 0, &n, 1, false));
        assert!(!is_direct_mode_eligible(1, 2, 3, &n, 1, false));
        assert!(!is_direct_mode_eligible(1, 2, 0, &n, 2, false));
        n.siblings_plus1 = 3;
        assert!(!is_direct_mode_eligible(1, 2, 0, &n, 1, false));
    }

    #[test]
    fn intensity_three_wants_company() {
        let n = lone_node();
        assert!(!is_direct_mode_eligible(3, 2, 0, &n, 1, false));
        assert!(is_direct_mode_eligible(3, 2, 0, &n, 2, false));
    }
}
