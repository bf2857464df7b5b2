//! TriSoup edges and unique segments.
//!
//! Every leaf at the trisoup depth contributes twelve edges; duplicates
//! from neighbouring leaves merge into unique segments keyed by their
//! packed endpoints. Segment order after the merge is the coding order,
//! so the sort is part of the bitstream contract.

use std::collections::HashMap;

use crate::octree::LeafNode;
use crate::point::Vec3;

/// Packs a coordinate triple at 21 bits per axis for lexicographic
/// segment keys.
fn pack(p: Vec3) -> u64 {
    debug_assert!((0..3).all(|a| p[a] >= 0 && p[a] < 1 << 21));
    (p[0] as u64) << 42 | (p[1] as u64) << 21 | p[2] as u64
}

/// One unique segment after merging.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Segment {
    pub start: Vec3,
    pub end: Vec3,
    /// Axis the segment runs along.
    pub dir: u8,
    /// Leaves sharing this segment, capped at 4.
    pub touch_count: u8,
    pub present: bool,
    /// Quantised vertex offset along the edge, valid when present.
    pub offset: u32,
}

/// Unique segments plus each leaf's view of them.
pub(crate) struct SegmentSet {
    pub segments: Vec<Segment>,
    /// Indices into `segments`, twelve per leaf; `usize::MAX` marks an
    /// edge that degenerated under box clamping.
    pub leaf_segments: Vec<[usize; 12]>,
}

/// The twelve cube edges of a leaf clamped to the slice box. Degenerate
/// edges are returned as `None`.
fn leaf_edges(origin: Vec3, size: i32, box_max: Vec3) -> [Option<(Vec3, Vec3, u8)>; 12] {
    let clamp = |p: Vec3| -> Vec3 {
        Vec3([
            p[0].min(box_max[0]),
            p[1].min(box_max[1]),
            p[2].min(box_max[2]),
        ])
    };
    let mut edges: [Option<(Vec3, Vec3, u8)>; 12] = [None; 12];
    let mut slot = 0usize;
    for dir in 0..3usize {
        let a1 = (dir + 1) % 3;
        let a2 = (dir + 2) % 3;
        for u in 0..2 {
            for v in 0..2 {
                let mut s = origin;
                s[a1] += u * size;
                s[a2] += v * size;
                let mut e = s;
                e[dir] += size;
                let (s, e) = (clamp(s), clamp(e));
                if s != e {
                    edges[slot] = Some((s, e, dir as u8));
                }
                slot += 1;
            }
        }
    }
    edges
}

/// Enumerates and merges the edges of every leaf.
pub(crate) fn build_segments(leaves: &[LeafNode], size_log2: u32, box_max: Vec3) -> SegmentSet {
    let size = 1 << size_log2;
    let mut keyed: Vec<(u64, u64, Vec3, Vec3, u8)> = Vec::new();
    let mut raw_per_leaf: Vec<[Option<(Vec3, Vec3)>; 12]> = Vec::with_capacity(leaves.len());

    for leaf in leaves {
        let edges = leaf_edges(leaf.origin, size, box_max);
        let mut raw: [Option<(Vec3, Vec3)>; 12] = [None; 12];
        for (slot, e) in edges.iter().enumerate() {
            if let Some((s, e2, dir)) = e {
                keyed.push((pack(*s), pack(*e2), *s, *e2, *dir));
                raw[slot] = Some((*s, *e2));
            }
        }
        raw_per_leaf.push(raw);
    }

    keyed.sort_by_key(|&(a, b, ..)| (a, b));

    let mut segments: Vec<Segment> = Vec::new();
    let mut index: HashMap<(u64, u64), usize> = HashMap::new();
    for (a, b, s, e, dir) in keyed {
        match index.get(&(a, b)) {
            Some(&i) => {
                let t = &mut segments[i].touch_count;
                *t = (*t + 1).min(4);
            }
            None => {
                index.insert((a, b), segments.len());
                segments.push(Segment {
                    start: s,
                    end: e,
                    dir,
                    touch_count: 1,
                    present: false,
                    offset: 0,
                });
            }
        }
    }

    let leaf_segments = raw_per_leaf
        .iter()
        .map(|raw| {
            let mut out = [usize::MAX; 12];
            for (slot, e) in raw.iter().enumerate() {
                if let Some((s, e2)) = e {
                    out[slot] = index[&(pack(*s), pack(*e2))];
                }
            }
            out
        })
        .collect();

    SegmentSet {
        segments,
        leaf_segments,
    }
}

/// Vertex votes cast by a point set: a point within one unit of an edge
/// line pulls the vertex toward its projection on the edge.
///
/// Used three ways with identical arithmetic: by the encoder on the
/// input points, by both sides on the compensated reference points for
/// inter contexts, and by the tests as an oracle.
pub(crate) fn vertex_votes(
    set: &SegmentSet,
    leaves: &[LeafNode],
    points_of: impl Fn(usize) -> std::ops::Range<usize>,
    points: &[Vec3],
    size_log2: u32,
) -> Vec<(u32, u32)> {
    let mut votes: Vec<(u64, u32)> = vec![(0, 0); set.segments.len()];
    let len = 1i32 << size_log2;
    for (leaf_idx, _leaf) in leaves.iter().enumerate() {
        for &seg_idx in &set.leaf_segments[leaf_idx] {
            if seg_idx == usize::MAX {
                continue;
            }
            let seg = set.segments[seg_idx];
            let d = seg.dir as usize;
            let a1 = (d + 1) % 3;
            let a2 = (d + 2) % 3;
            for pi in points_of(leaf_idx) {
                let p = points[pi];
                if (p[a1] - seg.start[a1]).abs() <= 1 && (p[a2] - seg.start[a2]).abs() <= 1 {
                    let t = (p[d] - seg.start[d]).max(0).min(len - 1) as u32;
                    let v = &mut votes[seg_idx];
                    v.0 += t as u64;
                    v.1 += 1;
                }
            }
        }
    }
    votes
        .into_iter()
        .map(|(sum, count)| {
            if count == 0 {
                (0, 0)
            } else {
                ((sum / count as u64) as u32, count)
            }
        })
        .collect()
}

/// Running endpoint statistics that condition presence and vertex
/// coding; updated in coding order on both sides.
pub(crate) struct SegmentCtx {
    present_at: HashMap<u64, u8>,
}

impl SegmentCtx {
    pub fn new() -> Self {
        SegmentCtx {
            present_at: HashMap::new(),
        }
    }

    /// `(start_share, end_share)`: present segments already coded that
    /// share each endpoint, capped at 3.
    pub fn shares(&self, seg: &Segment) -> (usize, usize) {
        let s = *self.present_at.get(&pack(seg.start)).unwrap_or(&0);
        let e = *self.present_at.get(&pack(seg.end)).unwrap_or(&0);
        (s.min(3) as usize, e.min(3) as usize)
    }

    pub fn record(&mut self, seg: &Segment, present: bool) {
        if present {
            for key in [pack(seg.start), pack(seg.end)].iter() {
                let c = self.present_at.entry(*key).or_insert(0);
                *c = c.saturating_add(1);
            }
        }
    }
}

/// OBUF key for the presence bit.
pub(crate) fn presence_ctx(
    seg: &Segment,
    shares: (usize, usize),
    ctx_inter: usize,
) -> (usize, usize) {
    let i = shares.0 << 4 | shares.1 << 2 | (seg.touch_count as usize - 1).min(3);
    let j = seg.dir as usize * 3 + ctx_inter;
    (i, j)
}

/// OBUF key for one of the two leading vertex-offset bits.
pub(crate) fn vertex_ctx(
    seg: &Segment,
    shares: (usize, usize),
    ctx_inter: usize,
    bit_pos: usize,
    prev_bit: u32,
) -> (usize, usize) {
    let i = (prev_bit as usize) << 6
        | shares.0 << 4
        | shares.1 << 2
        | (seg.touch_count as usize - 1).min(3);
    let j = bit_pos * 9 + seg.dir as usize * 3 + ctx_inter;
    (i, j)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(origin: Vec3) -> LeafNode {
        LeafNode {
            origin,
            start: 0,
            end: 0,
            pred_start: 0,
            pred_end: 0,
            pred_comp: false,
        }
    }

    #[test]
    fn neighbouring_leaves_share_four_segments() {
        // Two leaves meeting on a face share the four edges of that face.
        let leaves = vec![leaf(Vec3::new(0, 0, 0)), leaf(Vec3::new(4, 0, 0))];
        let set = build_segments(&leaves, 2, Vec3::splat(1 << 20));
        assert_eq!(set.segments.len(), 24 - 4);
        let shared = set
            .segments
            .iter()
            .filter(|s| s.touch_count == 2)
            .count();
        assert_eq!(shared, 4);
    }

    #[test]
    fn segment_keys_are_unique_and_sorted() {
        let leaves = vec![
            leaf(Vec3::new(0, 0, 0)),
            leaf(Vec3::new(4, 0, 0)),
            leaf(Vec3::new(0, 4, 0)),
            leaf(Vec3::new(4, 4, 4)),
        ];
        let set = build_segments(&leaves, 2, Vec3::splat(1 << 20));
        for w in set.segments.windows(2) {
            let a = (pack(w[0].start), pack(w[0].end));
            let b = (pack(w[1].start), pack(w[1].end));
            assert!(a < b, "{:?} !< {:?}", a, b);
        }
    }

    #[test]
    fn clamped_leaf_drops_degenerate_edges() {
        // A leaf straddling the box edge keeps only clamped geometry.
        let leaves = vec![leaf(Vec3::new(6, 0, 0))];
        let set = build_segments(&leaves, 2, Vec3::new(6, 8, 8));
        // All four x-direction edges collapse to points.
        assert!(set.segments.iter().all(|s| s.dir != 0));
        assert!(set.leaf_segments[0].iter().filter(|&&i| i == usize::MAX).count() >= 4);
    }

    #[test]
    fn votes_find_edge_midpoint() {
        let leaves = vec![leaf(Vec3::new(0, 0, 0))];
        let set = build_segments(&leaves, 4, Vec3::splat(1 << 20));
        // Points hugging the x-axis edge at x = 7..9.
        let pts = vec![
            Vec3::new(7, 0, 1),
            Vec3::new(8, 1, 0),
            Vec3::new(9, 1, 1),
        ];
        let votes = vertex_votes(&set, &leaves, |_| 0..pts.len(), &pts, 4);
        // The x edge at (y, z) = (0, 0) is the first x-direction slot.
        let idx = set.leaf_segments[0][0];
        assert!(votes[idx].1 >= 3);
        assert_eq!(votes[idx].0, 8);
    }
}
