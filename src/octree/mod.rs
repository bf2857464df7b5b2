//! Octree geometry coding.
//!
//! Recursive partitioning of the slice volume into occupied child
//! octants. Nodes traverse breadth-first per level and depth-first
//! across levels: the current level drains while the next one fills, so
//! every neighbour pattern a child needs is complete before its level is
//! coded. That ordering is part of the bitstream contract.
//!
//! The encoder and decoder loops mirror each other statement for
//! statement; every derived quantity (neighbour patterns, predicted
//! occupancy, family selection) comes from already-coded data only.

pub(crate) mod idcm;
pub(crate) mod neigh;
pub(crate) mod node;
pub(crate) mod occupancy;

use crate::entropy::{EntropyDecoder, EntropyEncoder};
use crate::error::{Error, Result};
use crate::motion;
use crate::params::GeometryParams;
use crate::point::Vec3;
use crate::quant::{AngPosScaler, QuantizerGeom};
use crate::slice::GeomContexts;

use neigh::LevelMap;
use node::{
    derive_level_sizes, leaf_target, level_sort_key, split_axes, valid_child_mask, OctreeNode,
};

/// A leaf handed to the surface coder when trisoup terminates descent.
#[derive(Clone, Copy, Debug)]
pub(crate) struct LeafNode {
    /// Absolute minimum corner.
    pub origin: Vec3,
    /// Working point range (encoder side).
    pub start: usize,
    pub end: usize,
    /// Reference range; into the compensated arena when `pred_comp`.
    pub pred_start: usize,
    pub pred_end: usize,
    pub pred_comp: bool,
}

/// Result of one octree pass.
pub(crate) struct OctreeResult {
    pub points: Vec<Vec3>,
    pub leaves: Vec<LeafNode>,
    /// Compensated reference points for the surface coder's inter path.
    pub compensated: Vec<Vec3>,
}

/// Average-occupancy threshold above which a level uses the dense OBUF
/// family: a mean child count of at least 4.8 out of 8.
fn level_is_dense(sum_children: u64, nodes: u64) -> bool {
    nodes > 0 && sum_children * 10 >= nodes * 48
}

/// Child octant of `p`, honouring collapsed axes.
fn octant_of(p: Vec3, child_size: Vec3, split: u8) -> u8 {
    let mut oct = 0u8;
    for a in 0..3 {
        let bit = 1u8 << (2 - a);
        if split & bit != 0 && p[a] >> child_size[a] & 1 != 0 {
            oct |= bit;
        }
    }
    oct
}

/// Child-range boundaries of a sorted range: `bounds[c]..bounds[c+1]`
/// holds octant `c`.
fn partition_bounds(sorted: &[Vec3], child_size: Vec3, split: u8) -> [usize; 9] {
    let mut bounds = [0usize; 9];
    let mut idx = 0usize;
    for child in 0..8u8 {
        bounds[child as usize] = idx;
        while idx < sorted.len() && octant_of(sorted[idx], child_size, split) == child {
            idx += 1;
        }
    }
    bounds[8] = sorted.len();
    bounds
}

fn occupancy_from_bounds(bounds: &[usize; 9]) -> u8 {
    let mut occ = 0u8;
    for child in 0..8 {
        if bounds[child + 1] > bounds[child] {
            occ |= 1 << child;
        }
    }
    occ
}

fn child_position(pos: Vec3, child: u8, split: u8) -> Vec3 {
    let mut child_pos = pos;
    for a in 0..3 {
        let bit = 1u8 << (2 - a);
        if split & bit != 0 {
            child_pos[a] = pos[a] << 1 | (child >> (2 - a) & 1) as i32;
        }
    }
    child_pos
}

/// Extra-duplicate count at a leaf: gt0, gt1, then an order-0 tail.
pub(crate) fn encode_dup_count(enc: &mut EntropyEncoder, ctxs: &mut GeomContexts, extra: u32) {
    enc.encode_bit(extra > 0, &mut ctxs.dup_gt0);
    if extra > 0 {
        enc.encode_bit(extra > 1, &mut ctxs.dup_gt1);
        if extra > 1 {
            enc.encode_ue(extra - 2, 0, &mut ctxs.dup_tail);
        }
    }
}

pub(crate) fn decode_dup_count(dec: &mut EntropyDecoder, ctxs: &mut GeomContexts) -> u32 {
    if !dec.decode_bit(&mut ctxs.dup_gt0) {
        return 0;
    }
    if !dec.decode_bit(&mut ctxs.dup_gt1) {
        return 1;
    }
    // A corrupt tail must not balloon the output; the slice-level count
    // check rejects the stream either way.
    dec.decode_ue(0, &mut ctxs.dup_tail).saturating_add(2).min(1 << 20)
}

fn encode_qp_offset(enc: &mut EntropyEncoder, ctxs: &mut GeomContexts, offset: i32) {
    enc.encode_bit(offset != 0, &mut ctxs.qp_nonzero);
    if offset != 0 {
        enc.encode_bit(offset < 0, &mut ctxs.qp_sign);
        enc.encode_ue(offset.abs() as u32 - 1, 0, &mut ctxs.qp_tail);
    }
}

fn decode_qp_offset(dec: &mut EntropyDecoder, ctxs: &mut GeomContexts) -> i32 {
    if !dec.decode_bit(&mut ctxs.qp_nonzero) {
        return 0;
    }
    let neg = dec.decode_bit(&mut ctxs.qp_sign);
    let mag = dec.decode_ue(0, &mut ctxs.qp_tail) as i32 + 1;
    if neg {
        -mag
    } else {
        mag
    }
}

/// Pre-quantises the low bits of every point in a range and restores the
/// level ordering the quantisation may have disturbed.
fn prequantize_range(
    points: &mut [Vec3],
    quant: QuantizerGeom,
    size_log2: Vec3,
    level_sizes: &[Vec3],
) {
    for p in points.iter_mut() {
        for a in 0..3 {
            let mask = (1i64 << size_log2[a]) - 1;
            let high = p[a] as i64 & !mask;
            let low = quant.quantize(p[a] as i64 & mask).min(mask);
            p[a] = (high | low) as i32;
        }
    }
    points.sort_by_key(|&p| level_sort_key(p, level_sizes));
}

/// Scales a reconstructed position back out of the quantised domain.
fn scale_position(p: Vec3, qp: i32, qp_size: Vec3) -> Vec3 {
    if qp <= 0 {
        return p;
    }
    let quant = QuantizerGeom::new(qp);
    let mut out = p;
    for a in 0..3 {
        out[a] = AngPosScaler::new(quant, qp_size[a] as u32).scale_ns(p[a] as i64) as i32;
    }
    out
}

fn count_distinct(points: &[Vec3]) -> usize {
    let mut n = 0;
    let mut prev = None;
    for &p in points {
        if Some(p) != prev {
            n += 1;
            prev = Some(p);
        }
    }
    n
}

fn distinct_points(points: &[Vec3]) -> (Vec<Vec3>, Vec<u32>) {
    let mut pts: Vec<Vec3> = Vec::new();
    let mut dups: Vec<u32> = Vec::new();
    for &p in points {
        if pts.last() == Some(&p) {
            *dups.last_mut().unwrap() += 1;
        } else {
            pts.push(p);
            dups.push(0);
        }
    }
    (pts, dups)
}

/// Per-level quantities shared by both directions.
struct LevelGeom {
    node_size: Vec3,
    child_size: Vec3,
    split: u8,
    valid_mask: u8,
    child_is_leaf: bool,
    child_is_surface: bool,
    dense: bool,
}

fn level_geom(
    level_sizes: &[Vec3],
    level: usize,
    trisoup_active: bool,
    prev_sum: u64,
    prev_nodes: u64,
) -> LevelGeom {
    let node_size = level_sizes[level];
    let child_size = level_sizes[level + 1];
    let split = split_axes(node_size, child_size);
    let child_is_leaf = child_size == Vec3::splat(0);
    LevelGeom {
        node_size,
        child_size,
        split,
        valid_mask: valid_child_mask(split),
        child_is_leaf,
        child_is_surface: trisoup_active && level + 2 == level_sizes.len() && !child_is_leaf,
        dense: level_is_dense(prev_sum, prev_nodes),
    }
}

fn root_qp(params: &GeometryParams) -> i32 {
    if params.qp_offset_depth.is_none() {
        params.qp
    } else {
        0
    }
}

/// Encodes one slice's octree. `points` is sorted (and, with geometry
/// scaling, re-quantised) in place; `ref_points` likewise.
pub(crate) fn encode_tree(
    enc: &mut EntropyEncoder,
    ctxs: &mut GeomContexts,
    params: &GeometryParams,
    points: &mut Vec<Vec3>,
    ref_points: &mut Vec<Vec3>,
) -> Result<OctreeResult> {
    let root = params.root_size_log2;
    for p in points.iter() {
        for a in 0..3 {
            if p[a] < 0 || p[a] >> root[a] != 0 {
                return Err(Error::Semantic(format!(
                    "input point {:?} outside the slice volume",
                    p
                )));
            }
        }
    }

    let target = leaf_target(params);
    let level_sizes = derive_level_sizes(root, target, params.qtbt);
    points.sort_by_key(|&p| level_sort_key(p, &level_sizes));
    ref_points.sort_by_key(|&p| level_sort_key(p, &level_sizes));

    let qp = root_qp(params);
    if qp > 0 {
        prequantize_range(points, QuantizerGeom::new(qp), root, &level_sizes);
    }
    let mut root_node = OctreeNode::root(points.len(), ref_points.len(), qp);
    if qp > 0 {
        root_node.qp_size = root;
    }

    let trisoup_active = params.trisoup.is_some();
    let idcm_intensity = if trisoup_active { 0 } else { params.idcm_intensity };

    let mut leaves: Vec<LeafNode> = Vec::new();
    let mut compensated: Vec<Vec3> = Vec::new();
    let mut current = vec![root_node];
    let (mut prev_sum, mut prev_nodes) = (0u64, 0u64);

    for level in 0..level_sizes.len() - 1 {
        let geom = level_geom(&level_sizes, level, trisoup_active, prev_sum, prev_nodes);
        let level_map = LevelMap::build(current.iter().map(|n| n.pos));
        let mut next: Vec<OctreeNode> = Vec::new();
        let mut sum_children = 0u64;

        for node_idx in 0..current.len() {
            let mut node = current[node_idx];
            node.neigh_pattern = level_map.neigh_pattern(node.pos);

            if params.qp_offset_depth == Some(level as u32) {
                let offset = 0;
                encode_qp_offset(enc, ctxs, offset);
                node.qp = params.qp + offset;
                node.qp_size = geom.node_size;
                if node.qp > 0 {
                    prequantize_range(
                        &mut points[node.start..node.end],
                        QuantizerGeom::new(node.qp),
                        geom.node_size,
                        &level_sizes,
                    );
                }
            }

            if let Some(m) = &params.motion {
                if !node.pred_comp
                    && node.pred_end > node.pred_start
                    && geom.node_size.max_component() as u32 <= m.pu_size_log2
                {
                    let origin = node_origin(&node, geom.node_size);
                    let comp_start = compensated.len();
                    motion::encode_pu_tree(
                        enc,
                        ctxs,
                        m,
                        &points[node.start..node.end],
                        &ref_points[node.pred_start..node.pred_end],
                        origin,
                        geom.node_size,
                        &level_sizes,
                        &mut compensated,
                    )?;
                    node.pred_start = comp_start;
                    node.pred_end = compensated.len();
                    node.pred_comp = true;
                }
            }

            let pred_slice: &[Vec3] = if node.pred_comp {
                &compensated[node.pred_start..node.pred_end]
            } else {
                &ref_points[node.pred_start..node.pred_end]
            };
            let pred_bounds = partition_bounds(pred_slice, geom.child_size, geom.split);
            let pred_occ = occupancy_from_bounds(&pred_bounds);
            let pred_valid = node.pred_end > node.pred_start;
            let occupancy_is_predictable = pred_valid && pred_occ != 0;

            let r9 = if geom.dense {
                neigh::neigh_pattern_to_9(node.neigh_pattern)
            } else {
                neigh::neigh_pattern_to_6(node.neigh_pattern)
            };

            let child_bounds =
                partition_bounds(&points[node.start..node.end], geom.child_size, geom.split);
            let occupancy = occupancy_from_bounds(&child_bounds);
            {
                let (map, pool) = if geom.dense {
                    (&mut ctxs.occ_dense, &mut ctxs.occ_dense_pool)
                } else {
                    (&mut ctxs.occ_sparse, &mut ctxs.occ_sparse_pool)
                };
                occupancy::encode_occupancy(
                    enc,
                    map,
                    pool,
                    occupancy,
                    geom.valid_mask,
                    r9,
                    pred_occ,
                    pred_valid,
                )?;
            }
            sum_children += occupancy.count_ones() as u64;
            let siblings = occupancy.count_ones() as u8;

            for child in 0..8u8 {
                if occupancy >> child & 1 == 0 {
                    continue;
                }
                let child_pos = child_position(node.pos, child, geom.split);
                let c_start = node.start + child_bounds[child as usize];
                let c_end = node.start + child_bounds[child as usize + 1];
                let p_start = node.pred_start + pred_bounds[child as usize];
                let p_end = node.pred_start + pred_bounds[child as usize + 1];

                let child_node = OctreeNode {
                    pos: child_pos,
                    start: c_start,
                    end: c_end,
                    pred_start: p_start,
                    pred_end: p_end,
                    pred_comp: node.pred_comp,
                    siblings_plus1: siblings,
                    neigh_pattern: 0,
                    qp: node.qp,
                    qp_size: node.qp_size,
                };

                if geom.child_is_leaf {
                    let span = c_end - c_start;
                    if params.unique_points {
                        if span != 1 {
                            return Err(Error::Semantic(format!(
                                "{} duplicate points at {:?} in a unique-points slice",
                                span, child_pos
                            )));
                        }
                    } else {
                        encode_dup_count(enc, ctxs, span as u32 - 1);
                    }
                    continue;
                }
                if geom.child_is_surface {
                    leaves.push(LeafNode {
                        origin: node_origin(&child_node, geom.child_size),
                        start: c_start,
                        end: c_end,
                        pred_start: p_start,
                        pred_end: p_end,
                        pred_comp: node.pred_comp,
                    });
                    continue;
                }

                let eligible = idcm::is_direct_mode_eligible(
                    idcm_intensity,
                    geom.child_size.min_component(),
                    node.neigh_pattern,
                    &node,
                    siblings,
                    occupancy_is_predictable,
                );
                if eligible {
                    let distinct = count_distinct(&points[c_start..c_end]);
                    if params.unique_points && distinct != c_end - c_start {
                        return Err(Error::Semantic(format!(
                            "duplicate points at {:?} in a unique-points slice",
                            child_pos
                        )));
                    }
                    let used = distinct <= 2;
                    idcm::encode_idcm_flag(enc, ctxs, used, siblings);
                    if used {
                        let (pts, dups) = distinct_points(&points[c_start..c_end]);
                        idcm::encode_idcm_points(
                            enc,
                            ctxs,
                            child_pos,
                            geom.child_size,
                            &pts,
                            &dups,
                            params.unique_points,
                        );
                        continue;
                    }
                }

                next.push(child_node);
            }
        }

        prev_sum = sum_children;
        prev_nodes = current.len() as u64;
        current = next;
    }

    Ok(OctreeResult {
        points: Vec::new(),
        leaves,
        compensated,
    })
}

/// Decodes one slice's octree; the mirror of `encode_tree`.
pub(crate) fn decode_tree(
    dec: &mut EntropyDecoder,
    ctxs: &mut GeomContexts,
    params: &GeometryParams,
    ref_points: &mut Vec<Vec3>,
) -> Result<OctreeResult> {
    let root = params.root_size_log2;
    let target = leaf_target(params);
    let level_sizes = derive_level_sizes(root, target, params.qtbt);
    ref_points.sort_by_key(|&p| level_sort_key(p, &level_sizes));

    let qp = root_qp(params);
    let mut root_node = OctreeNode::root(0, ref_points.len(), qp);
    if qp > 0 {
        root_node.qp_size = root;
    }

    let trisoup_active = params.trisoup.is_some();
    let idcm_intensity = if trisoup_active { 0 } else { params.idcm_intensity };

    let mut out_points: Vec<Vec3> = Vec::new();
    let mut leaves: Vec<LeafNode> = Vec::new();
    let mut compensated: Vec<Vec3> = Vec::new();
    let mut current = vec![root_node];
    let (mut prev_sum, mut prev_nodes) = (0u64, 0u64);

    for level in 0..level_sizes.len() - 1 {
        let geom = level_geom(&level_sizes, level, trisoup_active, prev_sum, prev_nodes);
        let level_map = LevelMap::build(current.iter().map(|n| n.pos));
        let mut next: Vec<OctreeNode> = Vec::new();
        let mut sum_children = 0u64;

        for node_idx in 0..current.len() {
            let mut node = current[node_idx];
            node.neigh_pattern = level_map.neigh_pattern(node.pos);

            if params.qp_offset_depth == Some(level as u32) {
                let offset = decode_qp_offset(dec, ctxs);
                node.qp = params.qp + offset;
                node.qp_size = geom.node_size;
            }

            if let Some(m) = &params.motion {
                if !node.pred_comp
                    && node.pred_end > node.pred_start
                    && geom.node_size.max_component() as u32 <= m.pu_size_log2
                {
                    let origin = node_origin(&node, geom.node_size);
                    let comp_start = compensated.len();
                    motion::decode_pu_tree(
                        dec,
                        ctxs,
                        m,
                        &ref_points[node.pred_start..node.pred_end],
                        origin,
                        geom.node_size,
                        &level_sizes,
                        &mut compensated,
                    )?;
                    node.pred_start = comp_start;
                    node.pred_end = compensated.len();
                    node.pred_comp = true;
                }
            }

            let pred_slice: &[Vec3] = if node.pred_comp {
                &compensated[node.pred_start..node.pred_end]
            } else {
                &ref_points[node.pred_start..node.pred_end]
            };
            let pred_bounds = partition_bounds(pred_slice, geom.child_size, geom.split);
            let pred_occ = occupancy_from_bounds(&pred_bounds);
            let pred_valid = node.pred_end > node.pred_start;
            let occupancy_is_predictable = pred_valid && pred_occ != 0;

            let r9 = if geom.dense {
                neigh::neigh_pattern_to_9(node.neigh_pattern)
            } else {
                neigh::neigh_pattern_to_6(node.neigh_pattern)
            };

            let occupancy = {
                let (map, pool) = if geom.dense {
                    (&mut ctxs.occ_dense, &mut ctxs.occ_dense_pool)
                } else {
                    (&mut ctxs.occ_sparse, &mut ctxs.occ_sparse_pool)
                };
                occupancy::decode_occupancy(
                    dec,
                    map,
                    pool,
                    geom.valid_mask,
                    r9,
                    pred_occ,
                    pred_valid,
                )
            };
            if dec.exhausted() {
                return Err(Error::Syntax {
                    offset: dec.consumed(),
                    reason: "payload ended inside an occupancy byte".to_owned(),
                });
            }
            sum_children += occupancy.count_ones() as u64;
            let siblings = occupancy.count_ones() as u8;

            for child in 0..8u8 {
                if occupancy >> child & 1 == 0 {
                    continue;
                }
                let child_pos = child_position(node.pos, child, geom.split);
                let p_start = node.pred_start + pred_bounds[child as usize];
                let p_end = node.pred_start + pred_bounds[child as usize + 1];

                let child_node = OctreeNode {
                    pos: child_pos,
                    start: 0,
                    end: 0,
                    pred_start: p_start,
                    pred_end: p_end,
                    pred_comp: node.pred_comp,
                    siblings_plus1: siblings,
                    neigh_pattern: 0,
                    qp: node.qp,
                    qp_size: node.qp_size,
                };

                if geom.child_is_leaf {
                    let extra = if params.unique_points {
                        0
                    } else {
                        decode_dup_count(dec, ctxs)
                    };
                    let p = scale_position(child_pos, node.qp, node.qp_size);
                    for _ in 0..=extra {
                        out_points.push(p);
                    }
                    continue;
                }
                if geom.child_is_surface {
                    leaves.push(LeafNode {
                        origin: node_origin(&child_node, geom.child_size),
                        start: 0,
                        end: 0,
                        pred_start: p_start,
                        pred_end: p_end,
                        pred_comp: node.pred_comp,
                    });
                    continue;
                }

                let eligible = idcm::is_direct_mode_eligible(
                    idcm_intensity,
                    geom.child_size.min_component(),
                    node.neigh_pattern,
                    &node,
                    siblings,
                    occupancy_is_predictable,
                );
                if eligible {
                    let used = idcm::decode_idcm_flag(dec, ctxs, siblings);
                    if used {
                        idcm::decode_idcm_points(
                            dec,
                            ctxs,
                            &child_node,
                            geom.child_size,
                            params.unique_points,
                            &mut out_points,
                        )?;
                        continue;
                    }
                }

                next.push(child_node);
            }
        }

        prev_sum = sum_children;
        prev_nodes = current.len() as u64;
        current = next;
    }

    Ok(OctreeResult {
        points: out_points,
        leaves,
        compensated,
    })
}

fn node_origin(node: &OctreeNode, size: Vec3) -> Vec3 {
    Vec3([
        node.pos[0] << size[0],
        node.pos[1] << size[1],
        node.pos[2] << size[2],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_follows_sort_order() {
        let sizes = derive_level_sizes(Vec3::splat(2), Vec3::splat(0), false);
        let mut pts = vec![
            Vec3::new(0, 0, 0),
            Vec3::new(3, 3, 3),
            Vec3::new(0, 3, 0),
            Vec3::new(2, 0, 1),
        ];
        pts.sort_by_key(|&p| level_sort_key(p, &sizes));
        let split = split_axes(sizes[0], sizes[1]);
        let bounds = partition_bounds(&pts, sizes[1], split);
        let occ = occupancy_from_bounds(&bounds);
        // Octants: (0,0,0) -> 0, (0,3,0) -> 2, (2,0,1) -> 4, (3,3,3) -> 7.
        assert_eq!(occ, 0b1001_0101);
        for c in 0..8 {
            for i in bounds[c]..bounds[c + 1] {
                assert_eq!(octant_of(pts[i], sizes[1], split), c as u8);
            }
        }
    }

    #[test]
    fn distinct_runs_collapse() {
        let pts = vec![
            Vec3::splat(1),
            Vec3::splat(1),
            Vec3::splat(2),
            Vec3::splat(2),
            Vec3::splat(2),
        ];
        assert_eq!(count_distinct(&pts), 2);
        let (d, dups) = distinct_points(&pts);
        assert_eq!(d.len(), 2);
        assert_eq!(dups, vec![1, 2]);
    }
}
