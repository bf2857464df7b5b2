//! Motion search and compensation.
//!
//! Inter slices partition octree subtrees into prediction units, each
//! carrying one displacement vector. The decoder never searches: it
//! parses split flags and vectors and translates reference points. The
//! encoder's search is a heuristic; only the PU-tree syntax and the
//! compensation it implies are normative.

use crate::entropy::{BitEstimator, EntropyDecoder, EntropyEncoder};
use crate::error::{Error, Result};
use crate::math::bit_width;
use crate::octree::node::level_sort_key;
use crate::params::MotionParams;
use crate::point::Vec3;
use crate::slice::GeomContexts;

/// Prefix contexts available for one MV magnitude.
const MV_MAX_PREFIX: u32 = 7;

/// Suffix width derived from the slice-level motion window.
pub(crate) fn derive_motion_max_suffix_bits(window_size: i32) -> u32 {
    bit_width(window_size as u64).saturating_sub(3)
}

/// Upper bound on prefix length before the exp-golomb escape.
pub(crate) fn derive_motion_max_prefix_bits(_window_size: i32) -> u32 {
    MV_MAX_PREFIX
}

fn encode_mv_residual(
    enc: &mut EntropyEncoder,
    ctxs: &mut GeomContexts,
    res: Vec3,
    window_size: i32,
) {
    let suffix_bits = derive_motion_max_suffix_bits(window_size);
    for a in 0..3 {
        let q = res[a].unsigned_abs();
        let prefix = (q >> suffix_bits).min(MV_MAX_PREFIX);
        for k in 0..prefix {
            enc.encode_bit(true, &mut ctxs.mv_prefix[k as usize]);
        }
        if prefix < MV_MAX_PREFIX {
            enc.encode_bit(false, &mut ctxs.mv_prefix[prefix as usize]);
        } else {
            enc.encode_ue((q >> suffix_bits) - MV_MAX_PREFIX, 1, &mut ctxs.mv_tail);
        }
        enc.encode_bypass_bits((q & ((1 << suffix_bits) - 1)) as u64, suffix_bits);
        if q != 0 {
            enc.encode_bypass(res[a] < 0);
        }
    }
}

fn decode_mv_residual(
    dec: &mut EntropyDecoder,
    ctxs: &mut GeomContexts,
    window_size: i32,
) -> Vec3 {
    let suffix_bits = derive_motion_max_suffix_bits(window_size);
    let mut res = Vec3::splat(0);
    for a in 0..3 {
        let mut prefix = 0u32;
        while prefix < MV_MAX_PREFIX && dec.decode_bit(&mut ctxs.mv_prefix[prefix as usize]) {
            prefix += 1;
        }
        let mut high = prefix;
        if prefix == MV_MAX_PREFIX {
            high += dec.decode_ue(1, &mut ctxs.mv_tail);
        }
        let q = (high << suffix_bits) | dec.decode_bypass_bits(suffix_bits) as u32;
        res[a] = if q != 0 && dec.decode_bypass() {
            -(q as i32)
        } else {
            q as i32
        };
    }
    res
}

/// Translates the reference points that land inside a PU box.
fn compensate(refs: &[Vec3], mv: Vec3, origin: Vec3, size: Vec3, out: &mut Vec<Vec3>) {
    for &r in refs {
        let c = r + mv;
        let inside = (0..3).all(|a| {
            let rel = c[a] - origin[a];
            rel >= 0 && rel >> size[a] == 0
        });
        if inside {
            out.push(c);
        }
    }
}

fn in_box(p: Vec3, origin: Vec3, size: Vec3) -> bool {
    (0..3).all(|a| {
        let rel = p[a] - origin[a];
        rel >= 0 && rel >> size[a] == 0
    })
}

/// Motion-search octree over a reference range, held at its depth bound:
/// sparse 2^cell_log2 leaf cells keyed by position, answering
/// approximate nearest-neighbour queries over the surrounding shell.
/// Encoder only, so nothing here is normative.
pub(crate) struct MsOctree {
    cells: std::collections::HashMap<Vec3, Vec<Vec3>>,
    cell_log2: u32,
}

impl MsOctree {
    pub fn build(points: &[Vec3]) -> Self {
        let cell_log2 = 2;
        let mut cells: std::collections::HashMap<Vec3, Vec<Vec3>> =
            std::collections::HashMap::new();
        for &p in points {
            cells.entry(p >> cell_log2).or_default().push(p);
        }
        MsOctree { cells, cell_log2 }
    }

    /// Squared distance to the nearest reference point, searching the
    /// query's cell shell and capping at the shell radius when empty.
    pub fn nn_dist2(&self, q: Vec3) -> i64 {
        let cell = q >> self.cell_log2;
        let mut best = i64::MAX;
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let key = cell + Vec3::new(dx, dy, dz);
                    if let Some(pts) = self.cells.get(&key) {
                        for &p in pts {
                            best = best.min((p - q).norm2());
                        }
                    }
                }
            }
        }
        let cap = 1i64 << (2 * self.cell_log2 + 2);
        best.min(cap)
    }
}

/// Shadow-probability estimate of the residual rate in Q8 bits.
fn mv_rate_estimate(ctxs: &GeomContexts, res: Vec3, window_size: i32) -> u32 {
    let suffix_bits = derive_motion_max_suffix_bits(window_size);
    let mut rate = 0u32;
    for a in 0..3 {
        let q = res[a].unsigned_abs();
        let prefix = (q >> suffix_bits).min(MV_MAX_PREFIX);
        for k in 0..prefix {
            rate += BitEstimator::from_model(&ctxs.mv_prefix[k as usize]).cost(true);
        }
        if prefix < MV_MAX_PREFIX {
            rate += BitEstimator::from_model(&ctxs.mv_prefix[prefix as usize]).cost(false);
        } else {
            rate += 8 << 8;
        }
        rate += (suffix_bits + (q != 0) as u32) << 8;
    }
    rate
}

/// One leaf's search: greedy descent from the best seed candidate.
fn search_mv(
    ctxs: &GeomContexts,
    mso: &MsOctree,
    cur: &[Vec3],
    pred: Vec3,
    m: &MotionParams,
) -> (Vec3, i64) {
    let step = (cur.len() / 64).max(1);
    let sample: Vec<Vec3> = cur.iter().step_by(step).copied().collect();
    let dist = |mv: Vec3| -> i64 {
        sample.iter().map(|&p| mso.nn_dist2(p - mv)).sum::<i64>()
    };
    let cost = |mv: Vec3, d: i64| -> i64 {
        let r = mv_rate_estimate(ctxs, mv - pred, m.window_size) as i64;
        d + ((m.lambda as i64 * r) >> 16)
    };

    let mut best = Vec3::splat(0);
    let mut best_d = dist(best);
    let mut best_c = cost(best, best_d);
    if pred != best {
        let d = dist(pred);
        let c = cost(pred, d);
        if c < best_c {
            best = pred;
            best_d = d;
            best_c = c;
        }
    }

    let mut radius = 4i32;
    while radius > 0 {
        let mut improved = false;
        for a in 0..3 {
            for &s in &[-radius, radius] {
                let mut cand = best;
                cand[a] += s;
                if cand[a].abs() > m.window_size {
                    continue;
                }
                let d = dist(cand);
                let c = cost(cand, d);
                if c < best_c {
                    best = cand;
                    best_d = d;
                    best_c = c;
                    improved = true;
                }
            }
        }
        if !improved {
            radius >>= 1;
        }
    }
    (best, best_d)
}

/// Encodes the PU tree of one octree node and appends the compensated
/// points it implies, sorted back into level order.
#[allow(clippy::too_many_arguments)]
pub(crate) fn encode_pu_tree(
    enc: &mut EntropyEncoder,
    ctxs: &mut GeomContexts,
    m: &MotionParams,
    cur: &[Vec3],
    refs: &[Vec3],
    origin: Vec3,
    size: Vec3,
    level_sizes: &[Vec3],
    comp_out: &mut Vec<Vec3>,
) -> Result<()> {
    let comp_start = comp_out.len();
    let mso = MsOctree::build(refs);
    let mut pred = Vec3::splat(0);
    encode_pu_rec(
        enc, ctxs, m, &mso, cur, refs, origin, size[0] as u32, 0, &mut pred, comp_out,
    )?;
    comp_out[comp_start..].sort_by_key(|&p| level_sort_key(p, level_sizes));
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn encode_pu_rec(
    enc: &mut EntropyEncoder,
    ctxs: &mut GeomContexts,
    m: &MotionParams,
    mso: &MsOctree,
    cur: &[Vec3],
    refs: &[Vec3],
    origin: Vec3,
    size_log2: u32,
    depth: usize,
    pred: &mut Vec3,
    comp_out: &mut Vec<Vec3>,
) -> Result<()> {
    let size = Vec3::splat(size_log2 as i32);
    let cur_here: Vec<Vec3> = cur.iter().filter(|&&p| in_box(p, origin, size)).copied().collect();

    let can_split = size_log2 > m.min_pu_size_log2;
    let (mv, leaf_d) = search_mv(ctxs, mso, &cur_here, *pred, m);
    let split = can_split && leaf_d > (cur_here.len().max(1) as i64) * 9 && cur_here.len() > 16;

    if can_split {
        enc.encode_bit(split, &mut ctxs.pu_split[depth.min(2)]);
    }
    if split {
        let half = 1 << (size_log2 - 1);
        for child in 0..8u8 {
            let child_origin = origin
                + Vec3::new(
                    (child >> 2 & 1) as i32 * half,
                    (child >> 1 & 1) as i32 * half,
                    (child & 1) as i32 * half,
                );
            encode_pu_rec(
                enc,
                ctxs,
                m,
                mso,
                cur,
                refs,
                child_origin,
                size_log2 - 1,
                depth + 1,
                pred,
                comp_out,
            )?;
        }
        return Ok(());
    }

    encode_mv_residual(enc, ctxs, mv - *pred, m.window_size);
    *pred = mv;
    compensate(refs, mv, origin, size, comp_out);
    Ok(())
}

/// Decodes the PU tree of one octree node; the mirror of
/// `encode_pu_tree`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn decode_pu_tree(
    dec: &mut EntropyDecoder,
    ctxs: &mut GeomContexts,
    m: &MotionParams,
    refs: &[Vec3],
    origin: Vec3,
    size: Vec3,
    level_sizes: &[Vec3],
    comp_out: &mut Vec<Vec3>,
) -> Result<()> {
    let comp_start = comp_out.len();
    let mut pred = Vec3::splat(0);
    decode_pu_rec(dec, ctxs, m, refs, origin, size[0] as u32, 0, &mut pred, comp_out)?;
    if dec.exhausted() {
        return Err(Error::Syntax {
            offset: dec.consumed(),
            reason: "payload ended inside a prediction-unit tree".to_owned(),
        });
    }
    comp_out[comp_start..].sort_by_key(|&p| level_sort_key(p, level_sizes));
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn decode_pu_rec(
    dec: &mut EntropyDecoder,
    ctxs: &mut GeomContexts,
    m: &MotionParams,
    refs: &[Vec3],
    origin: Vec3,
    size_log2: u32,
    depth: usize,
    pred: &mut Vec3,
    comp_out: &mut Vec<Vec3>,
) -> Result<()> {
    let size = Vec3::splat(size_log2 as i32);
    let can_split = size_log2 > m.min_pu_size_log2;
    let split = can_split && dec.decode_bit(&mut ctxs.pu_split[depth.min(2)]);

    if split {
        let half = 1 << (size_log2 - 1);
        for child in 0..8u8 {
            let child_origin = origin
                + Vec3::new(
                    (child >> 2 & 1) as i32 * half,
                    (child >> 1 & 1) as i32 * half,
                    (child & 1) as i32 * half,
                );
            decode_pu_rec(
                dec,
                ctxs,
                m,
                refs,
                child_origin,
                size_log2 - 1,
                depth + 1,
                pred,
                comp_out,
            )?;
        }
        return Ok(());
    }

    let res = decode_mv_residual(dec, ctxs, m.window_size);
    let mv = *pred + res;
    *pred = mv;
    compensate(refs, mv, origin, size, comp_out);
    Ok(())
}
