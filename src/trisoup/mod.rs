//! TriSoup surface coding.
//!
//! The octree stops at a configured node size; each leaf's edges carry
//! at most one vertex, and the decoder tiles the vertex fan around a
//! (possibly drifted) centroid into triangles which it rasterises back
//! to voxels. The coded syntax is: one presence bit per unique segment,
//! vertex offsets for the present ones, then one drift per eligible
//! leaf, in leaf order.

pub(crate) mod edges;
pub(crate) mod raster;

use crate::entropy::{EntropyDecoder, EntropyEncoder};
use crate::error::{Error, Result};
use crate::octree::LeafNode;
use crate::params::TrisoupParams;
use crate::point::Vec3;
use crate::slice::GeomContexts;

use edges::{build_segments, presence_ctx, vertex_ctx, SegmentCtx, SegmentSet};
use raster::{
    apply_drift, centroid, drift_dequant, order_by_dominant_axis, polygon_normal_q6,
    raster_triangle, to_q8, VtxQ8,
};

/// Unary cap before the drift magnitude escapes to exp-golomb.
const DRIFT_UNARY_CAP: u32 = 8;

/// Per-segment reference-side summary driving the inter contexts.
struct RefInfo {
    votes: Vec<(u32, u32)>,
    active: bool,
}

fn ref_info(
    set: &SegmentSet,
    leaves: &[LeafNode],
    ref_points: &[Vec3],
    compensated: &[Vec3],
    size_log2: u32,
) -> RefInfo {
    let active = leaves.iter().any(|l| l.pred_end > l.pred_start);
    if !active {
        return RefInfo {
            votes: vec![(0, 0); set.segments.len()],
            active,
        };
    }
    // Flatten each leaf's reference range so one array serves the votes.
    let mut flat: Vec<Vec3> = Vec::new();
    let mut ranges: Vec<std::ops::Range<usize>> = Vec::with_capacity(leaves.len());
    for leaf in leaves {
        let src: &[Vec3] = if leaf.pred_comp {
            &compensated[leaf.pred_start..leaf.pred_end]
        } else {
            &ref_points[leaf.pred_start..leaf.pred_end]
        };
        let start = flat.len();
        flat.extend_from_slice(src);
        ranges.push(start..flat.len());
    }
    let votes = edges::vertex_votes(set, leaves, |i| ranges[i].clone(), &flat, size_log2);
    RefInfo { votes, active }
}

fn seg_inter_ctx(info: &RefInfo, idx: usize) -> usize {
    if !info.active {
        0
    } else if info.votes[idx].1 == 0 {
        1
    } else {
        2
    }
}

/// Dequantised vertex position on a segment, in Q8.
fn vertex_q8(seg: &edges::Segment, offset: u32, bit_dropped: u32) -> VtxQ8 {
    let raw = ((offset << bit_dropped)
        + if bit_dropped > 0 { 1 << (bit_dropped - 1) } else { 0 }) as i64;
    let mut v = to_q8(seg.start);
    v[seg.dir as usize] += raw << 8;
    v
}

#[allow(clippy::too_many_arguments)]
fn encode_vertex_offset(
    enc: &mut EntropyEncoder,
    ctxs: &mut GeomContexts,
    seg: &edges::Segment,
    shares: (usize, usize),
    ctx_inter: usize,
    value: u32,
    nbits: u32,
) {
    let mut prev = 0u32;
    for pos in 0..nbits {
        let bit = value >> (nbits - 1 - pos) & 1;
        match pos {
            0 | 1 => {
                let (i, j) = vertex_ctx(seg, shares, ctx_inter, pos as usize, prev);
                let c = ctxs.vtx_map.lookup(i, j);
                enc.encode_bit(bit != 0, &mut ctxs.vtx_pool.models[c as usize]);
                ctxs.vtx_map.observe(bit != 0, i, j);
            }
            2 => {
                enc.encode_bit(bit != 0, &mut ctxs.vtx_bit2[(prev & 3) as usize]);
            }
            _ => enc.encode_bypass(bit != 0),
        }
        prev = prev << 1 | bit;
    }
}

fn decode_vertex_offset(
    dec: &mut EntropyDecoder,
    ctxs: &mut GeomContexts,
    seg: &edges::Segment,
    shares: (usize, usize),
    ctx_inter: usize,
    nbits: u32,
) -> u32 {
    let mut prev = 0u32;
    for pos in 0..nbits {
        let bit = match pos {
            0 | 1 => {
                let (i, j) = vertex_ctx(seg, shares, ctx_inter, pos as usize, prev);
                let c = ctxs.vtx_map.lookup(i, j);
                let b = dec.decode_bit(&mut ctxs.vtx_pool.models[c as usize]);
                ctxs.vtx_map.observe(b, i, j);
                b as u32
            }
            2 => dec.decode_bit(&mut ctxs.vtx_bit2[(prev & 3) as usize]) as u32,
            _ => dec.decode_bypass() as u32,
        };
        prev = prev << 1 | bit;
    }
    prev
}

fn encode_drift(
    enc: &mut EntropyEncoder,
    ctxs: &mut GeomContexts,
    q: i32,
    bound: i32,
    inter_ctx: usize,
) {
    let ctx_minmax = (bound.min(4)) as usize;
    enc.encode_bit(q == 0, &mut ctxs.drift_zero[ctx_minmax][inter_ctx]);
    if q == 0 {
        return;
    }
    enc.encode_bit(q < 0, &mut ctxs.drift_sign);
    let m = q.unsigned_abs() - 1;
    let unary = m.min(DRIFT_UNARY_CAP);
    for k in 0..unary {
        enc.encode_bit(true, &mut ctxs.drift_mag[(k as usize).min(3)][inter_ctx]);
    }
    if unary < DRIFT_UNARY_CAP {
        enc.encode_bit(false, &mut ctxs.drift_mag[(unary as usize).min(3)][inter_ctx]);
    } else {
        enc.encode_ue(m - DRIFT_UNARY_CAP, 0, &mut ctxs.drift_tail);
    }
}

fn decode_drift(
    dec: &mut EntropyDecoder,
    ctxs: &mut GeomContexts,
    bound: i32,
    inter_ctx: usize,
) -> i32 {
    let ctx_minmax = (bound.min(4)) as usize;
    if dec.decode_bit(&mut ctxs.drift_zero[ctx_minmax][inter_ctx]) {
        return 0;
    }
    let neg = dec.decode_bit(&mut ctxs.drift_sign);
    let mut m = 0u32;
    while m < DRIFT_UNARY_CAP
        && dec.decode_bit(&mut ctxs.drift_mag[(m as usize).min(3)][inter_ctx])
    {
        m += 1;
    }
    if m == DRIFT_UNARY_CAP {
        m += dec.decode_ue(0, &mut ctxs.drift_tail);
    }
    let q = (m as i32 + 1).min(bound);
    if neg {
        -q
    } else {
        q
    }
}

/// One leaf's reconstruction state shared by both directions.
struct LeafFan {
    verts: Vec<VtxQ8>,
    order: Vec<usize>,
    center: VtxQ8,
    normal: VtxQ8,
    drift_eligible: bool,
}

fn leaf_fan(
    set: &SegmentSet,
    leaf_idx: usize,
    ts: &TrisoupParams,
) -> Option<LeafFan> {
    let mut verts: Vec<VtxQ8> = Vec::new();
    for &seg_idx in &set.leaf_segments[leaf_idx] {
        if seg_idx == usize::MAX {
            continue;
        }
        let seg = &set.segments[seg_idx];
        if seg.present {
            verts.push(vertex_q8(seg, seg.offset, ts.bit_dropped));
        }
    }
    if verts.is_empty() {
        return None;
    }
    if verts.len() < 3 {
        return Some(LeafFan {
            verts,
            order: Vec::new(),
            center: [0; 3],
            normal: [0, 0, 64],
            drift_eligible: false,
        });
    }
    let center = centroid(&verts);
    let (_axis, order) = order_by_dominant_axis(&verts, center);
    let normal = polygon_normal_q6(&verts, &order, center);
    let drift_eligible =
        ts.centroid_drift && verts.len() > 3 && ts.sampling_value <= 4;
    Some(LeafFan {
        verts,
        order,
        center,
        normal,
        drift_eligible,
    })
}

fn drift_bound(size_log2: u32) -> i32 {
    ((1 << size_log2) >> 1).max(1)
}

fn halo_eff(ts: &TrisoupParams) -> i64 {
    let mut halo = ts.halo;
    if ts.adaptive_halo && ts.sampling_value > 1 {
        halo += (ts.sampling_value as i64 - 1) << 6;
    }
    halo
}

/// Rasterises one fan into `out`.
fn raster_fan(
    fan: &LeafFan,
    center: VtxQ8,
    ts: &TrisoupParams,
    leaf: &LeafNode,
    box_max: Vec3,
    out: &mut Vec<Vec3>,
) {
    let size = 1 << ts.node_size_log2;
    let leaf_min = leaf.origin;
    let leaf_max = Vec3([
        (leaf.origin[0] + size).min(box_max[0]) - 1,
        (leaf.origin[1] + size).min(box_max[1]) - 1,
        (leaf.origin[2] + size).min(box_max[2]) - 1,
    ]);

    for v in &fan.verts {
        let p = Vec3([
            (v[0] >> 8) as i32,
            (v[1] >> 8) as i32,
            (v[2] >> 8) as i32,
        ]);
        out.push(Vec3([
            p[0].max(leaf_min[0]).min(leaf_max[0]),
            p[1].max(leaf_min[1]).min(leaf_max[1]),
            p[2].max(leaf_min[2]).min(leaf_max[2]),
        ]));
    }
    if fan.verts.len() < 3 {
        return;
    }
    let halo = halo_eff(ts);
    let n = fan.order.len();
    for k in 0..n {
        let tri = [
            center,
            fan.verts[fan.order[k]],
            fan.verts[fan.order[(k + 1) % n]],
        ];
        raster_triangle(
            tri,
            ts.sampling_value,
            halo,
            ts.fine_ray,
            leaf_min,
            leaf_max,
            out,
        );
    }
}

/// Encodes the surface layer and returns the reconstruction, which is
/// also what the decoder will produce; the slice header's point count
/// comes from it.
#[allow(clippy::too_many_arguments)]
pub(crate) fn encode_surface(
    enc: &mut EntropyEncoder,
    ctxs: &mut GeomContexts,
    ts: &TrisoupParams,
    leaves: &[LeafNode],
    points: &[Vec3],
    ref_points: &[Vec3],
    compensated: &[Vec3],
    box_max: Vec3,
) -> Result<Vec<Vec3>> {
    let mut set = build_segments(leaves, ts.node_size_log2, box_max);
    let info = ref_info(&set, leaves, ref_points, compensated, ts.node_size_log2);
    let votes = edges::vertex_votes(
        &set,
        leaves,
        |i| leaves[i].start..leaves[i].end,
        points,
        ts.node_size_log2,
    );

    let nbits = ts.node_size_log2 - ts.bit_dropped;
    let mut segctx = SegmentCtx::new();
    for idx in 0..set.segments.len() {
        let seg = set.segments[idx];
        let shares = segctx.shares(&seg);
        let ctx_inter = seg_inter_ctx(&info, idx);
        let present = votes[idx].1 > 0;

        let (i, j) = presence_ctx(&seg, shares, ctx_inter);
        let c = ctxs.seg_presence.lookup(i, j);
        enc.encode_bit(present, &mut ctxs.seg_presence_pool.models[c as usize]);
        ctxs.seg_presence.observe(present, i, j);

        if present {
            let value = (votes[idx].0 >> ts.bit_dropped).min((1 << nbits) - 1);
            encode_vertex_offset(enc, ctxs, &seg, shares, ctx_inter, value, nbits);
            set.segments[idx].present = true;
            set.segments[idx].offset = value;
        }
        segctx.record(&seg, present);
    }

    // Drift pass plus reconstruction, leaf by leaf.
    let mut out = Vec::new();
    for (leaf_idx, leaf) in leaves.iter().enumerate() {
        let fan = match leaf_fan(&set, leaf_idx, ts) {
            Some(fan) => fan,
            None => continue,
        };
        let mut center = fan.center;
        if fan.drift_eligible {
            let bound = drift_bound(ts.node_size_log2);
            let inter_ctx = if info.active { 1 } else { 0 };
            // True drift: mean signed offset of the leaf's points along
            // the polygon normal, in whole voxels.
            let pts = &points[leaf.start..leaf.end];
            let mut acc = 0i64;
            for &p in pts {
                let d = to_q8(p);
                let rel = [
                    d[0] - fan.center[0],
                    d[1] - fan.center[1],
                    d[2] - fan.center[2],
                ];
                acc += (rel[0] * fan.normal[0]
                    + rel[1] * fan.normal[1]
                    + rel[2] * fan.normal[2])
                    >> 6;
            }
            let mean_q8 = if pts.is_empty() {
                0
            } else {
                acc / pts.len() as i64
            };
            let q = crate::math::div_exp2_round_half_inf(mean_q8, 8)
                .max(-(bound as i64))
                .min(bound as i64) as i32;
            encode_drift(enc, ctxs, q, bound, inter_ctx);
            center = apply_drift(
                fan.center,
                fan.normal,
                drift_dequant(q, ts.bit_dropped),
                ts.bit_dropped,
            );
        }
        raster_fan(&fan, center, ts, leaf, box_max, &mut out);
    }

    out.sort();
    out.dedup();
    Ok(out)
}

/// Decodes the surface layer; the mirror of `encode_surface`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn decode_surface(
    dec: &mut EntropyDecoder,
    ctxs: &mut GeomContexts,
    ts: &TrisoupParams,
    leaves: &[LeafNode],
    ref_points: &[Vec3],
    compensated: &[Vec3],
    box_max: Vec3,
) -> Result<Vec<Vec3>> {
    let mut set = build_segments(leaves, ts.node_size_log2, box_max);
    let info = ref_info(&set, leaves, ref_points, compensated, ts.node_size_log2);

    let nbits = ts.node_size_log2 - ts.bit_dropped;
    let mut segctx = SegmentCtx::new();
    for idx in 0..set.segments.len() {
        let seg = set.segments[idx];
        let shares = segctx.shares(&seg);
        let ctx_inter = seg_inter_ctx(&info, idx);

        let (i, j) = presence_ctx(&seg, shares, ctx_inter);
        let c = ctxs.seg_presence.lookup(i, j);
        let present = dec.decode_bit(&mut ctxs.seg_presence_pool.models[c as usize]);
        ctxs.seg_presence.observe(present, i, j);

        if present {
            let value = decode_vertex_offset(dec, ctxs, &seg, shares, ctx_inter, nbits);
            set.segments[idx].present = true;
            set.segments[idx].offset = value;
        }
        segctx.record(&seg, present);
    }
    if dec.exhausted() {
        return Err(Error::Syntax {
            offset: dec.consumed(),
            reason: "payload ended inside the segment list".to_owned(),
        });
    }

    let mut out = Vec::new();
    for (leaf_idx, leaf) in leaves.iter().enumerate() {
        let fan = match leaf_fan(&set, leaf_idx, ts) {
            Some(fan) => fan,
            None => continue,
        };
        let mut center = fan.center;
        if fan.drift_eligible {
            let bound = drift_bound(ts.node_size_log2);
            let inter_ctx = if info.active { 1 } else { 0 };
            let q = decode_drift(dec, ctxs, bound, inter_ctx);
            center = apply_drift(
                fan.center,
                fan.normal,
                drift_dequant(q, ts.bit_dropped),
                ts.bit_dropped,
            );
        }
        raster_fan(&fan, center, ts, leaf, box_max, &mut out);
    }

    out.sort();
    out.dedup();
    Ok(out)
}
