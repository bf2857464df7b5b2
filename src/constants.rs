// Internal constants.

/// Number of entries resolved by one OBUF leaf (2^K_LEAF_DEPTH).
pub(crate) const K_LEAF_DEPTH: u32 = 4;

/// Size of the shared OBUF leaf pool, per map instance.
pub(crate) const K_LEAF_BUFFER_SIZE: usize = 20000;

/// Window scanned for a reusable leaf once the pool has wrapped.
pub(crate) const K_LEAF_REUSE_WINDOW: usize = 20;

/// Fixed-point precision used throughout the trisoup rasteriser.
pub(crate) const K_TRISOUP_FP_BITS: u32 = 8;
pub(crate) const K_TRISOUP_FP_HALF: i64 = 1 << (K_TRISOUP_FP_BITS - 1);

/// Number of candidate predictors kept by the predictive-tree azimuth ring.
pub(crate) const N_PRED_DELTA: usize = 4;

/// Contexts allocated for an exp-golomb prefix.
pub(crate) const EG_PREFIX_CTX_COUNT: usize = 6;

// API constants.

/// Maximum number of points coded by one direct-mode node.
pub const IDCM_MAX_POINTS: usize = 2;
