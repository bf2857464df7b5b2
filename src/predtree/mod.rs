//! Predictive-tree geometry coding.
//!
//! A forest of trees where every node is predicted from its ancestors,
//! or from a reference frame's points on inter slices. Nodes code their
//! child count, a prediction, and a residual; angular slices work in
//! spherical coordinates with an optional secondary cartesian residual.
//! The forest ends when the end-of-trees flag reads true.

pub(crate) mod spherical;

use crate::entropy::{EntropyDecoder, EntropyEncoder};
use crate::error::{Error, Result};
use crate::math::div_approx;
use crate::params::{AngularParams, GeometryParams};
use crate::point::{morton_code, RefFrame, Vec3};
use crate::quant::QuantizerGeom;
use crate::slice::GeomContexts;

use spherical::{azimuth_step, cart_to_sph, sph_to_cart, PredRing, RefSphIndex};

/// Exp-golomb orders for the residual tails: radius, azimuth, laser in
/// angular mode; uniform in cartesian mode.
const K_ANGULAR: [u32; 3] = [2, 1, 0];
const K_CARTESIAN: [u32; 3] = [1, 1, 1];

/// One decoded node. Ancestors are reached through parent indices; the
/// arena outlives nothing and shares nothing.
#[derive(Clone, Copy)]
struct PtNode {
    cart: Vec3,
    parent: Option<usize>,
}

/// Result of a predictive-tree pass.
pub(crate) struct PredTreeResult {
    pub points: Vec<Vec3>,
    /// Spherical positions per emitted point on angular slices, for the
    /// attribute coders downstream.
    pub sph: Vec<Vec3>,
}

fn sign_class(v: i32) -> usize {
    match v.signum() {
        -1 => 0,
        0 => 1,
        _ => 2,
    }
}

fn encode_res_comp(
    enc: &mut EntropyEncoder,
    ctxs: &mut GeomContexts,
    comp: usize,
    inter: bool,
    prev_sign: usize,
    v: i32,
    k: u32,
) {
    let it = inter as usize;
    enc.encode_bit(v == 0, &mut ctxs.pt_res_zero[comp][it]);
    if v == 0 {
        return;
    }
    enc.encode_bit(v < 0, &mut ctxs.pt_res_sign[comp][it][prev_sign]);
    let m = v.unsigned_abs();
    enc.encode_bit(m == 1, &mut ctxs.pt_res_one[comp][it]);
    if m == 1 {
        return;
    }
    enc.encode_bit(m == 2, &mut ctxs.pt_res_two[comp][it]);
    if m == 2 {
        return;
    }
    enc.encode_ue(m - 3, k, &mut ctxs.pt_res_tail[comp]);
}

fn decode_res_comp(
    dec: &mut EntropyDecoder,
    ctxs: &mut GeomContexts,
    comp: usize,
    inter: bool,
    prev_sign: usize,
    k: u32,
) -> i32 {
    let it = inter as usize;
    if dec.decode_bit(&mut ctxs.pt_res_zero[comp][it]) {
        return 0;
    }
    let neg = dec.decode_bit(&mut ctxs.pt_res_sign[comp][it][prev_sign]);
    let m = if dec.decode_bit(&mut ctxs.pt_res_one[comp][it]) {
        1
    } else if dec.decode_bit(&mut ctxs.pt_res_two[comp][it]) {
        2
    } else {
        3 + dec.decode_ue(k, &mut ctxs.pt_res_tail[comp])
    };
    if neg {
        -(m as i32)
    } else {
        m as i32
    }
}

fn encode_residual(
    enc: &mut EntropyEncoder,
    ctxs: &mut GeomContexts,
    res: Vec3,
    inter: bool,
    k: &[u32; 3],
) {
    let mut prev_sign = 1usize;
    for comp in 0..3 {
        encode_res_comp(enc, ctxs, comp, inter, prev_sign, res[comp], k[comp]);
        prev_sign = sign_class(res[comp]);
    }
}

fn decode_residual(
    dec: &mut EntropyDecoder,
    ctxs: &mut GeomContexts,
    inter: bool,
    k: &[u32; 3],
) -> Vec3 {
    let mut res = Vec3::splat(0);
    let mut prev_sign = 1usize;
    for comp in 0..3 {
        res[comp] = decode_res_comp(dec, ctxs, comp, inter, prev_sign, k[comp]);
        prev_sign = sign_class(res[comp]);
    }
    res
}

fn encode_res2(enc: &mut EntropyEncoder, ctxs: &mut GeomContexts, res: Vec3) {
    for comp in 0..3 {
        let v = res[comp];
        enc.encode_bit(v == 0, &mut ctxs.pt_res2_zero[comp]);
        if v == 0 {
            continue;
        }
        enc.encode_bit(v < 0, &mut ctxs.pt_res2_sign[comp]);
        enc.encode_ue(v.unsigned_abs() - 1, 1, &mut ctxs.pt_res2_tail[comp]);
    }
}

fn decode_res2(dec: &mut EntropyDecoder, ctxs: &mut GeomContexts) -> Vec3 {
    let mut res = Vec3::splat(0);
    for comp in 0..3 {
        if dec.decode_bit(&mut ctxs.pt_res2_zero[comp]) {
            continue;
        }
        let neg = dec.decode_bit(&mut ctxs.pt_res2_sign[comp]);
        let m = dec.decode_ue(1, &mut ctxs.pt_res2_tail[comp]) as i32 + 1;
        res[comp] = if neg { -m } else { m };
    }
    res
}

fn encode_num_children(enc: &mut EntropyEncoder, ctxs: &mut GeomContexts, n: u8) {
    enc.encode_bit(n > 0, &mut ctxs.pt_num_children[0]);
    if n > 0 {
        enc.encode_bit(n > 1, &mut ctxs.pt_num_children[1]);
        if n > 1 {
            enc.encode_bit(n > 2, &mut ctxs.pt_num_children[2]);
        }
    }
}

fn decode_num_children(dec: &mut EntropyDecoder, ctxs: &mut GeomContexts) -> u8 {
    if !dec.decode_bit(&mut ctxs.pt_num_children[0]) {
        return 0;
    }
    if !dec.decode_bit(&mut ctxs.pt_num_children[1]) {
        return 1;
    }
    if !dec.decode_bit(&mut ctxs.pt_num_children[2]) {
        return 2;
    }
    3
}

fn encode_pred_mode(enc: &mut EntropyEncoder, ctxs: &mut GeomContexts, mode: u8) {
    let hi = mode >= 2;
    enc.encode_bit(hi, &mut ctxs.pt_mode[0]);
    enc.encode_bit(mode & 1 != 0, &mut ctxs.pt_mode[1 + hi as usize]);
}

fn decode_pred_mode(dec: &mut EntropyDecoder, ctxs: &mut GeomContexts) -> u8 {
    let hi = dec.decode_bit(&mut ctxs.pt_mode[0]);
    let lo = dec.decode_bit(&mut ctxs.pt_mode[1 + hi as usize]);
    (hi as u8) << 1 | lo as u8
}

fn encode_pred_idx(enc: &mut EntropyEncoder, ctxs: &mut GeomContexts, idx: usize, max: usize) {
    for k in 0..idx {
        enc.encode_bit(true, &mut ctxs.pt_pred_idx[k]);
    }
    if idx < max {
        enc.encode_bit(false, &mut ctxs.pt_pred_idx[idx]);
    }
}

fn decode_pred_idx(dec: &mut EntropyDecoder, ctxs: &mut GeomContexts, max: usize) -> usize {
    let mut idx = 0usize;
    while idx < max && dec.decode_bit(&mut ctxs.pt_pred_idx[idx]) {
        idx += 1;
    }
    idx
}

/// Ancestor positions, with missing ancestors replicating the deepest
/// one available. Keeps all four modes decodable everywhere: a chain of
/// length two sees its grandparent as the parent, so mode 2 degrades to
/// mode 1 instead of being undecodable.
fn ancestors(arena: &[PtNode], parent: Option<usize>) -> [Vec3; 3] {
    let mut out = [Vec3::splat(0); 3];
    let mut cur = parent;
    let mut last = Vec3::splat(0);
    for slot in out.iter_mut() {
        if let Some(i) = cur {
            last = arena[i].cart;
            cur = arena[i].parent;
        }
        *slot = last;
    }
    out
}

fn predict(mode: u8, anc: &[Vec3; 3]) -> Vec3 {
    let [p, g, gg] = *anc;
    match mode {
        0 => Vec3::splat(0),
        1 => p,
        2 => (p + p) - g,
        3 => (p + p + p) - (g + g + g) + gg,
        _ => unreachable!(),
    }
}

/// Shared per-slice coding state.
struct PtState<'a> {
    ang: Option<&'a AngularParams>,
    ref_idx: Option<RefSphIndex>,
    ring: PredRing,
    quant: QuantizerGeom,
    qp_counter: u32,
}

impl<'a> PtState<'a> {
    fn new(params: &'a GeometryParams, ref_frame: Option<&RefFrame>) -> Self {
        let ang = params.angular.as_ref();
        let ref_idx = match (ang, ref_frame) {
            (Some(a), Some(rf)) if !rf.sph.is_empty() => {
                Some(RefSphIndex::build(&rf.sph, a.laser_tan_theta.len()))
            }
            _ => None,
        };
        PtState {
            ang,
            ref_idx,
            ring: PredRing::new(),
            quant: QuantizerGeom::new(params.qp),
            qp_counter: params.qp_offset_interval.unwrap_or(0),
        }
    }
}

/// Encodes a predictive-tree forest over `points`; sorts them into the
/// chain order first.
pub(crate) fn encode_forest(
    enc: &mut EntropyEncoder,
    ctxs: &mut GeomContexts,
    params: &GeometryParams,
    points: &mut Vec<Vec3>,
    ref_frame: Option<&RefFrame>,
) -> Result<PredTreeResult> {
    let mut state = PtState::new(params, ref_frame);

    // Chain order: azimuthal scan for LIDAR input, morton otherwise.
    match state.ang {
        Some(a) => {
            points.sort_by_key(|&p| {
                let s = cart_to_sph(p, a);
                (s[2], s[1], s[0])
            });
        }
        None => {
            let bits = params.max_root_node_dim_log2;
            points.sort_by_key(|&p| morton_code(p, bits));
        }
    }

    // Merge duplicates into per-node extra counts.
    let mut uniq: Vec<(Vec3, u32)> = Vec::new();
    for &p in points.iter() {
        match uniq.last_mut() {
            Some((q, extra)) if *q == p => *extra += 1,
            _ => uniq.push((p, 0)),
        }
    }
    if params.unique_points && uniq.len() != points.len() {
        return Err(Error::Semantic(
            "duplicate points in a unique-points slice".to_owned(),
        ));
    }

    let mut arena: Vec<PtNode> = Vec::new();
    let mut out = PredTreeResult {
        points: Vec::new(),
        sph: Vec::new(),
    };

    if !uniq.is_empty() {
        enc.encode_bit(false, &mut ctxs.pt_end_of_trees);
        // One chain per slice: node i is the only child of node i-1.
        for (i, &(p, extra)) in uniq.iter().enumerate() {
            let parent = if i == 0 { None } else { Some(i - 1) };
            let num_children = if i + 1 < uniq.len() { 1 } else { 0 };
            encode_node(
                enc, ctxs, params, &mut state, &mut arena, parent, p, extra, num_children,
                &mut out,
            )?;
        }
    }
    enc.encode_bit(true, &mut ctxs.pt_end_of_trees);
    Ok(out)
}

/// Decodes a predictive-tree forest; the mirror of `encode_forest`.
pub(crate) fn decode_forest(
    dec: &mut EntropyDecoder,
    ctxs: &mut GeomContexts,
    params: &GeometryParams,
    ref_frame: Option<&RefFrame>,
    max_points: usize,
) -> Result<PredTreeResult> {
    let mut state = PtState::new(params, ref_frame);
    let mut arena: Vec<PtNode> = Vec::new();
    let mut out = PredTreeResult {
        points: Vec::new(),
        sph: Vec::new(),
    };

    while !dec.decode_bit(&mut ctxs.pt_end_of_trees) {
        // One tree, depth first; the stack holds pending child slots.
        let mut stack: Vec<(usize, u8)> = Vec::new();
        let (root, root_children) =
            decode_node(dec, ctxs, params, &mut state, &mut arena, None, &mut out)?;
        stack.push((root, root_children));
        while let Some(top) = stack.last_mut() {
            if top.1 == 0 {
                stack.pop();
                continue;
            }
            top.1 -= 1;
            let parent = top.0;
            let (idx, n) =
                decode_node(dec, ctxs, params, &mut state, &mut arena, Some(parent), &mut out)?;
            stack.push((idx, n));
            if out.points.len() > max_points {
                return Err(Error::Semantic(format!(
                    "predictive forest produced {} points, header allows {}",
                    out.points.len(),
                    max_points
                )));
            }
        }
        if out.points.len() > max_points {
            return Err(Error::Semantic(format!(
                "predictive forest produced {} points, header allows {}",
                out.points.len(),
                max_points
            )));
        }
        if dec.exhausted() {
            return Err(Error::Syntax {
                offset: dec.consumed(),
                reason: "payload ended inside a predictive tree".to_owned(),
            });
        }
    }
    Ok(out)
}

/// Everything one node codes, encoder side.
#[allow(clippy::too_many_arguments)]
fn encode_node(
    enc: &mut EntropyEncoder,
    ctxs: &mut GeomContexts,
    params: &GeometryParams,
    state: &mut PtState,
    arena: &mut Vec<PtNode>,
    parent: Option<usize>,
    p: Vec3,
    extra: u32,
    num_children: u8,
    out: &mut PredTreeResult,
) -> Result<()> {
    if !params.unique_points {
        enc.encode_bit(extra > 0, &mut ctxs.pt_dup_gt0);
        if extra > 0 {
            enc.encode_ue(extra - 1, 0, &mut ctxs.pt_dup_tail);
        }
    }
    encode_num_children(enc, ctxs, num_children);

    let recon = match state.ang {
        Some(ang) => {
            let s = cart_to_sph(p, ang);
            let inter_avail = state.ref_idx.is_some() && !state.ring.is_empty();

            // Intra candidate: the ring entry closest in radius.
            let mut pred_idx = 0usize;
            if params.azimuth_scaling && state.ring.len() > 1 {
                let max = state.ring.len().min(crate::constants::N_PRED_DELTA) - 1;
                let mut best = i32::MAX;
                for i in 0..=max {
                    let d = (state.ring.get(i)[0] - s[0]).abs();
                    if d < best {
                        best = d;
                        pred_idx = i;
                    }
                }
            }

            // Inter candidates come from the reference azimuth nearest
            // to where the previous node plus the phi multiplier lands;
            // the derivation must match the decoder, which knows the
            // true azimuth only after the residual.
            let (inter, ref_choice) = if inter_avail {
                let prev = state.ring.get(0);
                let n_inter =
                    div_approx((s[1] - prev[1]) as i64, ang.azimuth_speed as u64) as i32;
                let target = prev[1] + n_inter * ang.azimuth_speed;
                let (c1, c2) = state
                    .ref_idx
                    .as_ref()
                    .unwrap()
                    .closest_pred(target, prev[2]);
                let d = |c: Option<Vec3>| c.map_or(i32::MAX, |c| (c[0] - s[0]).abs());
                let intra_base = if params.azimuth_scaling && state.ring.len() > 1 {
                    state.ring.get(pred_idx)
                } else {
                    prev
                };
                let ref_choice = d(c2) < d(c1);
                let best_ref = d(c1).min(d(c2));
                (best_ref < (intra_base[0] - s[0]).abs(), ref_choice)
            } else {
                (false, false)
            };
            if inter_avail {
                enc.encode_bit(inter, &mut ctxs.pt_inter);
                if inter {
                    enc.encode_bit(ref_choice, &mut ctxs.pt_ref_node);
                }
            }
            if !inter && params.azimuth_scaling && state.ring.len() > 1 {
                let max = state.ring.len().min(crate::constants::N_PRED_DELTA) - 1;
                encode_pred_idx(enc, ctxs, pred_idx, max);
            }

            // The phi multiplier is relative to the previous node on
            // inter slices and to the chosen ring entry otherwise.
            let n_base = if inter {
                state.ring.get(0)
            } else if state.ring.is_empty() {
                Vec3::splat(0)
            } else {
                state.ring.get(pred_idx)
            };
            let n = div_approx((s[1] - n_base[1]) as i64, ang.azimuth_speed as u64) as i32;
            enc.encode_se(n, 0, &mut ctxs.pt_phi_mul);

            let base = if inter {
                let prev = state.ring.get(0);
                let target = prev[1] + n * ang.azimuth_speed;
                let (c1, c2) = state
                    .ref_idx
                    .as_ref()
                    .unwrap()
                    .closest_pred(target, prev[2]);
                let cand = if ref_choice { c2.or(c1) } else { c1 };
                cand.unwrap_or(prev)
            } else {
                n_base
            };
            // A reference candidate already sits at the target azimuth;
            // the multiplier only advances intra predictors.
            let pred = if inter {
                base
            } else {
                Vec3::new(base[0], base[1] + n * ang.azimuth_speed, base[2])
            };

            let step = if params.azimuth_scaling {
                azimuth_step(pred[0], ang)
            } else {
                1
            };
            let res_phi = div_approx((s[1] - pred[1]) as i64, step as u64) as i32;
            let res = Vec3::new(s[0] - pred[0], res_phi, s[2] - pred[2]);
            encode_residual(enc, ctxs, res, inter, &K_ANGULAR);

            // The reconstruction the decoder will see, which is what
            // every later prediction must come from.
            let s_rec = Vec3::new(
                pred[0] + res[0],
                pred[1] + res[1] * step,
                pred[2] + res[2],
            );
            let coarse = sph_to_cart(s_rec, ang);
            let cart = if params.residual2_disabled {
                coarse
            } else {
                encode_res2(enc, ctxs, p - coarse);
                p
            };
            let cart = Vec3::new(cart[0].max(0), cart[1].max(0), cart[2].max(0));

            state.ring.reset_if_jump(s_rec[0] - base[0], params.th_obj);
            state.ring.push(s_rec);
            out.sph.push(s_rec);
            for _ in 0..extra {
                out.sph.push(s_rec);
            }
            arena.push(PtNode { cart, parent });
            cart
        }
        None => {
            // QP retune on the configured cadence.
            if let Some(interval) = params.qp_offset_interval {
                if state.qp_counter == 0 {
                    let offset = 0i32;
                    enc.encode_bit(offset != 0, &mut ctxs.qp_nonzero);
                    state.quant = QuantizerGeom::new(params.qp + offset);
                    state.qp_counter = interval;
                }
                state.qp_counter -= 1;
            }

            let anc = ancestors(arena, parent);
            let mut mode = 0u8;
            let mut best = i64::MAX;
            for m in 0..4u8 {
                let pr = predict(m, &anc);
                let cost = (p - pr).0.iter().map(|&v| v.abs() as i64).sum::<i64>();
                if cost < best {
                    best = cost;
                    mode = m;
                }
            }
            encode_pred_mode(enc, ctxs, mode);

            let pred = predict(mode, &anc);
            let raw = p - pred;
            let res = Vec3::new(
                state.quant.quantize(raw[0] as i64) as i32,
                state.quant.quantize(raw[1] as i64) as i32,
                state.quant.quantize(raw[2] as i64) as i32,
            );
            encode_residual(enc, ctxs, res, false, &K_CARTESIAN);

            let cart = Vec3::new(
                pred[0] + state.quant.scale(res[0] as i64) as i32,
                pred[1] + state.quant.scale(res[1] as i64) as i32,
                pred[2] + state.quant.scale(res[2] as i64) as i32,
            );
            arena.push(PtNode { cart, parent });
            cart
        }
    };

    out.points.push(recon);
    for _ in 0..extra {
        out.points.push(recon);
    }
    Ok(())
}

/// Everything one node codes, decoder side. Returns the arena index and
/// the child count.
fn decode_node(
    dec: &mut EntropyDecoder,
    ctxs: &mut GeomContexts,
    params: &GeometryParams,
    state: &mut PtState,
    arena: &mut Vec<PtNode>,
    parent: Option<usize>,
    out: &mut PredTreeResult,
) -> Result<(usize, u8)> {
    let extra = if params.unique_points {
        0
    } else if dec.decode_bit(&mut ctxs.pt_dup_gt0) {
        dec.decode_ue(0, &mut ctxs.pt_dup_tail).saturating_add(1).min(1 << 20)
    } else {
        0
    };
    let num_children = decode_num_children(dec, ctxs);

    let cart = match state.ang {
        Some(ang) => {
            let inter_avail = state.ref_idx.is_some() && !state.ring.is_empty();
            let (inter, ref_choice) = if inter_avail {
                let inter = dec.decode_bit(&mut ctxs.pt_inter);
                let rc = inter && dec.decode_bit(&mut ctxs.pt_ref_node);
                (inter, rc)
            } else {
                (false, false)
            };

            let mut pred_idx = 0usize;
            if !inter && params.azimuth_scaling && state.ring.len() > 1 {
                let max = state.ring.len().min(crate::constants::N_PRED_DELTA) - 1;
                pred_idx = decode_pred_idx(dec, ctxs, max);
            }

            let n = dec.decode_se(0, &mut ctxs.pt_phi_mul);

            let base = if inter {
                let prev = state.ring.get(0);
                let target = prev[1] + n * ang.azimuth_speed;
                let (c1, c2) = state
                    .ref_idx
                    .as_ref()
                    .unwrap()
                    .closest_pred(target, prev[2]);
                let cand = if ref_choice { c2.or(c1) } else { c1 };
                cand.unwrap_or(prev)
            } else if state.ring.is_empty() {
                Vec3::splat(0)
            } else {
                state.ring.get(pred_idx)
            };
            let pred = if inter {
                base
            } else {
                Vec3::new(base[0], base[1] + n * ang.azimuth_speed, base[2])
            };

            let step = if params.azimuth_scaling {
                azimuth_step(pred[0], ang)
            } else {
                1
            };
            let res = decode_residual(dec, ctxs, inter, &K_ANGULAR);
            let s_rec = Vec3::new(
                pred[0] + res[0],
                pred[1] + res[1] * step,
                pred[2] + res[2],
            );

            let coarse = sph_to_cart(s_rec, ang);
            let cart = if params.residual2_disabled {
                coarse
            } else {
                coarse + decode_res2(dec, ctxs)
            };
            let cart = Vec3::new(cart[0].max(0), cart[1].max(0), cart[2].max(0));

            state.ring.reset_if_jump(s_rec[0] - base[0], params.th_obj);
            state.ring.push(s_rec);
            out.sph.push(s_rec);
            for _ in 0..extra {
                out.sph.push(s_rec);
            }
            arena.push(PtNode { cart, parent });
            cart
        }
        None => {
            if let Some(interval) = params.qp_offset_interval {
                if state.qp_counter == 0 {
                    let nonzero = dec.decode_bit(&mut ctxs.qp_nonzero);
                    let offset = if nonzero {
                        let neg = dec.decode_bit(&mut ctxs.qp_sign);
                        let mag = dec.decode_ue(0, &mut ctxs.qp_tail) as i32 + 1;
                        if neg {
                            -mag
                        } else {
                            mag
                        }
                    } else {
                        0
                    };
                    state.quant = QuantizerGeom::new(params.qp + offset);
                    state.qp_counter = interval;
                }
                state.qp_counter -= 1;
            }

            let mode = decode_pred_mode(dec, ctxs);
            let anc = ancestors(arena, parent);
            let pred = predict(mode, &anc);
            let res = decode_residual(dec, ctxs, false, &K_CARTESIAN);
            let cart = Vec3::new(
                pred[0] + state.quant.scale(res[0] as i64) as i32,
                pred[1] + state.quant.scale(res[1] as i64) as i32,
                pred[2] + state.quant.scale(res[2] as i64) as i32,
            );
            arena.push(PtNode { cart, parent });
            cart
        }
    };

    out.points.push(cart);
    for _ in 0..extra {
        out.points.push(cart);
    }
    Ok((arena.len() - 1, num_children))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::GeomCoder;

    fn pt_params(dim: u32) -> GeometryParams {
        let mut p = GeometryParams::octree(dim);
        p.coder = GeomCoder::Predictive;
        p
    }

    fn roundtrip(params: &GeometryParams, points: &[Vec3]) -> Vec<Vec3> {
        let mut enc = EntropyEncoder::new();
        let mut ctxs = GeomContexts::new();
        let mut work = points.to_vec();
        encode_forest(&mut enc, &mut ctxs, params, &mut work, None).unwrap();
        let bytes = enc.flush();

        let mut dec = EntropyDecoder::new(&bytes);
        let mut ctxs = GeomContexts::new();
        decode_forest(&mut dec, &mut ctxs, params, None, points.len())
            .unwrap()
            .points
    }

    #[test]
    fn empty_forest_is_one_flag() {
        let params = pt_params(8);
        let got = roundtrip(&params, &[]);
        assert!(got.is_empty());
    }

    #[test]
    fn linear_chain_roundtrips_exactly() {
        let params = pt_params(8);
        let pts: Vec<Vec3> = (0..5).map(|i| Vec3::new(i, 0, 0)).collect();
        let mut got = roundtrip(&params, &pts);
        got.sort();
        assert_eq!(got, pts);
    }

    #[test]
    fn scattered_points_roundtrip() {
        let params = pt_params(10);
        let mut pts: Vec<Vec3> = (0..200)
            .map(|i| {
                Vec3::new(
                    (i * 37) % 1000,
                    (i * 91) % 1000,
                    (i * 13) % 1000,
                )
            })
            .collect();
        let mut got = roundtrip(&params, &pts);
        got.sort();
        pts.sort();
        pts.dedup();
        let mut expect = pts;
        expect.sort();
        assert_eq!(got, expect);
    }

    #[test]
    fn mode_two_zeroes_collinear_residuals() {
        // A constant-velocity chain must cost almost nothing after the
        // first two nodes.
        let params = pt_params(12);
        let short: Vec<Vec3> = (0..3).map(|i| Vec3::new(i * 3, i * 5, i * 7)).collect();
        let long: Vec<Vec3> = (0..100).map(|i| Vec3::new(i * 3, i * 5, i * 7)).collect();

        let bytes_of = |pts: &[Vec3]| {
            let mut enc = EntropyEncoder::new();
            let mut ctxs = GeomContexts::new();
            let mut work = pts.to_vec();
            encode_forest(&mut enc, &mut ctxs, &params, &mut work, None).unwrap();
            enc.flush().len()
        };
        let grow = bytes_of(&long) as i64 - bytes_of(&short) as i64;
        assert!(
            grow < 120,
            "97 zero-residual nodes grew the payload by {} bytes",
            grow
        );
    }

    #[test]
    fn angular_chain_roundtrips() {
        let mut params = pt_params(10);
        params.angular = Some(AngularParams {
            origin: Vec3::new(512, 512, 32),
            laser_tan_theta: vec![-(1 << 15), 0, 1 << 15],
            laser_correction: vec![-2, 0, 2],
            azimuth_two_pi_log2: 12,
            azimuth_speed: 16,
        });
        params.azimuth_scaling = true;
        params.th_obj = 64;

        let mut pts: Vec<Vec3> = (0..60)
            .map(|i| {
                let r = 200 + (i % 7) * 10;
                let phi_turn = (i as i64 * (1 << 26)) & 0xFFFF_FFFF;
                let (c, s) = crate::math::cos_sin_turn(phi_turn);
                Vec3::new(
                    512 + ((r as i64 * c) >> 30) as i32,
                    512 + ((r as i64 * s) >> 30) as i32,
                    32 + (i % 3),
                )
            })
            .collect();
        let mut got = roundtrip(&params, &pts);
        got.sort();
        pts.sort();
        pts.dedup();
        assert_eq!(got, pts);
    }
}
