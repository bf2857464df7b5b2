//! Slice-level state.
//!
//! One `GeomContexts` bundle holds every adaptive model a slice touches:
//! the arithmetic context arrays, the OBUF maps and their shared model
//! pools. The bundle lives for the duration of a slice and, when the
//! header sets `entropy_continuation`, carries over to the next one.

use crate::constants::N_PRED_DELTA;
use crate::entropy::golomb::GolombCtx;
use crate::entropy::AdaptiveBitModel;
use crate::obuf::{CtxMap, CtxModelPool};

/// Header fields the core consumes. Byte-exact layout of the full header
/// is owned by the caller; only the coded geometry payload comes here.
#[derive(Clone, Copy, Debug)]
pub struct SliceHeader {
    /// Point count minus one; -1 encodes an empty slice.
    pub geom_num_points_minus1: i32,
    /// Carries context state over from the previous slice instead of
    /// resetting it.
    pub entropy_continuation: bool,
}

impl SliceHeader {
    pub fn num_points(&self) -> usize {
        (self.geom_num_points_minus1 + 1).max(0) as usize
    }
}

/// Occupancy OBUF geometry: `i` packs the reduced neighbour pattern with
/// the partial occupancy, `j` packs child index and prediction bits.
pub(crate) const OCC_S1_BITS: u32 = 12;
pub(crate) const OCC_S2_BITS: u32 = 5;

/// TriSoup segment-presence map geometry.
pub(crate) const SEG_S1_BITS: u32 = 6;
pub(crate) const SEG_S2_BITS: u32 = 4;

/// TriSoup vertex-offset map geometry.
pub(crate) const VTX_S1_BITS: u32 = 8;
pub(crate) const VTX_S2_BITS: u32 = 5;

/// Every adaptive context the geometry coders use, in one owning bundle.
///
/// Do not share across threads; parallel decode happens across slices,
/// each with its own bundle.
pub(crate) struct GeomContexts {
    // Octree occupancy, one OBUF family for sparse and one for dense
    // regions, each with its own 256-model pool.
    pub occ_sparse: CtxMap,
    pub occ_sparse_pool: CtxModelPool,
    pub occ_dense: CtxMap,
    pub occ_dense_pool: CtxModelPool,

    // Direct coding mode.
    pub idcm_flag: [AdaptiveBitModel; 3],
    pub idcm_two_points: AdaptiveBitModel,

    // Duplicate-point counts at octree leaves.
    pub dup_gt0: AdaptiveBitModel,
    pub dup_gt1: AdaptiveBitModel,
    pub dup_tail: GolombCtx,

    // Per-node QP offsets.
    pub qp_nonzero: AdaptiveBitModel,
    pub qp_sign: AdaptiveBitModel,
    pub qp_tail: GolombCtx,

    // Motion PU trees.
    pub pu_split: [AdaptiveBitModel; 3],
    pub mv_prefix: [AdaptiveBitModel; 8],
    pub mv_tail: GolombCtx,

    // Predictive tree structure.
    pub pt_num_children: [AdaptiveBitModel; 3],
    pub pt_end_of_trees: AdaptiveBitModel,
    pub pt_mode: [AdaptiveBitModel; 3],
    pub pt_dup_gt0: AdaptiveBitModel,
    pub pt_dup_tail: GolombCtx,
    pub pt_inter: AdaptiveBitModel,
    pub pt_ref_node: AdaptiveBitModel,
    pub pt_pred_idx: [AdaptiveBitModel; N_PRED_DELTA - 1],
    pub pt_phi_mul: GolombCtx,

    // Predictive-tree residuals: [component][inter], sign further by the
    // sign of the previous component (negative, zero, positive).
    pub pt_res_zero: [[AdaptiveBitModel; 2]; 3],
    pub pt_res_sign: [[[AdaptiveBitModel; 3]; 2]; 3],
    pub pt_res_one: [[AdaptiveBitModel; 2]; 3],
    pub pt_res_two: [[AdaptiveBitModel; 2]; 3],
    pub pt_res_tail: [GolombCtx; 3],

    // Secondary cartesian residual in angular mode.
    pub pt_res2_zero: [AdaptiveBitModel; 3],
    pub pt_res2_sign: [AdaptiveBitModel; 3],
    pub pt_res2_tail: [GolombCtx; 3],

    // TriSoup segments.
    pub seg_presence: CtxMap,
    pub seg_presence_pool: CtxModelPool,
    pub vtx_map: CtxMap,
    pub vtx_pool: CtxModelPool,
    pub vtx_bit2: [AdaptiveBitModel; 4],

    // TriSoup centroid drift.
    pub drift_zero: [[AdaptiveBitModel; 3]; 5],
    pub drift_sign: AdaptiveBitModel,
    pub drift_mag: [[AdaptiveBitModel; 3]; 4],
    pub drift_tail: GolombCtx,
}

impl GeomContexts {
    pub fn new() -> Self {
        GeomContexts {
            occ_sparse: CtxMap::new(OCC_S1_BITS, OCC_S2_BITS, &[127; 1 << OCC_S2_BITS]),
            occ_sparse_pool: CtxModelPool::default(),
            occ_dense: CtxMap::new(OCC_S1_BITS, OCC_S2_BITS, &[127; 1 << OCC_S2_BITS]),
            occ_dense_pool: CtxModelPool::default(),
            idcm_flag: Default::default(),
            idcm_two_points: Default::default(),
            dup_gt0: Default::default(),
            dup_gt1: Default::default(),
            dup_tail: Default::default(),
            qp_nonzero: Default::default(),
            qp_sign: Default::default(),
            qp_tail: Default::default(),
            pu_split: Default::default(),
            mv_prefix: Default::default(),
            mv_tail: Default::default(),
            pt_num_children: Default::default(),
            pt_end_of_trees: Default::default(),
            pt_mode: Default::default(),
            pt_dup_gt0: Default::default(),
            pt_dup_tail: Default::default(),
            pt_inter: Default::default(),
            pt_ref_node: Default::default(),
            pt_pred_idx: Default::default(),
            pt_phi_mul: Default::default(),
            pt_res_zero: Default::default(),
            pt_res_sign: Default::default(),
            pt_res_one: Default::default(),
            pt_res_two: Default::default(),
            pt_res_tail: Default::default(),
            pt_res2_zero: Default::default(),
            pt_res2_sign: Default::default(),
            pt_res2_tail: Default::default(),
            seg_presence: CtxMap::new(SEG_S1_BITS, SEG_S2_BITS, &[127; 1 << SEG_S2_BITS]),
            seg_presence_pool: CtxModelPool::default(),
            vtx_map: CtxMap::new(VTX_S1_BITS, VTX_S2_BITS, &[127; 1 << VTX_S2_BITS]),
            vtx_pool: CtxModelPool::default(),
            vtx_bit2: Default::default(),
            drift_zero: Default::default(),
            drift_sign: Default::default(),
            drift_mag: Default::default(),
            drift_tail: Default::default(),
        }
    }
}
