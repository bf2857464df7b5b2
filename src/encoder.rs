//! The slice-level geometry encoder.

use crate::decoder::slice_box;
use crate::entropy::EntropyEncoder;
use crate::error::{Error, Result};
use crate::octree;
use crate::params::{GeomCoder, GeometryParams};
use crate::point::{RefFrame, Vec3};
use crate::predtree;
use crate::slice::{GeomContexts, SliceHeader};
use crate::trisoup;

/// An encoded slice: the payload bytes plus the header fields the
/// encoder decided.
///
/// For trisoup (and any lossy setting) `reconstructed` is the point set
/// the decoder will produce, which is also where the header's point
/// count comes from; callers feeding attribute coders want it.
pub struct EncodedSlice {
    pub payload: Vec<u8>,
    pub header: SliceHeader,
    pub reconstructed: Vec<Vec3>,
    pub sph: Vec<Vec3>,
}

/// Encoder is a geometry encoder instance, symmetric to
/// `GeometryDecoder`.
pub struct GeometryEncoder {
    ctxs: Option<GeomContexts>,
}

impl Default for GeometryEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl GeometryEncoder {
    pub fn new() -> Self {
        GeometryEncoder { ctxs: None }
    }

    /// Encodes one slice.
    ///
    /// `points` is caller-owned and reordered (and under geometry
    /// scaling re-quantised) in place; the coded order is what attribute
    /// coders must follow.
    pub fn encode_slice(
        &mut self,
        params: &GeometryParams,
        points: &mut Vec<Vec3>,
        ref_frame: Option<&RefFrame>,
        entropy_continuation: bool,
    ) -> Result<EncodedSlice> {
        params.validate()?;
        let bound = slice_box(params);
        for p in points.iter() {
            for a in 0..3 {
                if p[a] < 0 || p[a] >= bound[a] {
                    return Err(Error::Semantic(format!(
                        "input point {:?} outside [0, {:?})",
                        p, bound
                    )));
                }
            }
        }

        if !entropy_continuation || self.ctxs.is_none() {
            self.ctxs = Some(GeomContexts::new());
        }
        let ctxs = self.ctxs.as_mut().unwrap();

        if points.is_empty() {
            let enc = EntropyEncoder::new();
            return Ok(EncodedSlice {
                payload: enc.flush(),
                header: SliceHeader {
                    geom_num_points_minus1: -1,
                    entropy_continuation,
                },
                reconstructed: Vec::new(),
                sph: Vec::new(),
            });
        }

        let mut ref_points: Vec<Vec3> =
            ref_frame.map(|rf| rf.points.clone()).unwrap_or_default();
        let mut enc = EntropyEncoder::new();

        let (count, reconstructed, sph) = match params.coder {
            GeomCoder::Octree => {
                octree::encode_tree(&mut enc, ctxs, params, points, &mut ref_points)?;
                (points.len(), Vec::new(), Vec::new())
            }
            GeomCoder::Trisoup => {
                let res =
                    octree::encode_tree(&mut enc, ctxs, params, points, &mut ref_points)?;
                let ts = params.trisoup.as_ref().unwrap();
                let recon = trisoup::encode_surface(
                    &mut enc,
                    ctxs,
                    ts,
                    &res.leaves,
                    points,
                    &ref_points,
                    &res.compensated,
                    slice_box(params),
                )?;
                (recon.len(), recon, Vec::new())
            }
            GeomCoder::Predictive => {
                let res =
                    predtree::encode_forest(&mut enc, ctxs, params, points, ref_frame)?;
                (res.points.len(), res.points, res.sph)
            }
        };

        let payload = enc.flush();
        tracing::debug!(points = count, bytes = payload.len(), "slice encoded");
        Ok(EncodedSlice {
            payload,
            header: SliceHeader {
                geom_num_points_minus1: count as i32 - 1,
                entropy_continuation,
            },
            reconstructed,
            sph,
        })
    }
}
