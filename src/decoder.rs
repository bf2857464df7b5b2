//! The slice-level geometry decoder.

use crate::entropy::EntropyDecoder;
use crate::error::{Error, Result};
use crate::octree;
use crate::params::{GeomCoder, GeometryParams};
use crate::point::{RefFrame, Vec3};
use crate::predtree;
use crate::slice::{GeomContexts, SliceHeader};
use crate::trisoup;

/// A decoded slice: the reconstructed points, plus the spherical
/// positions the angular predictive tree produced for the attribute
/// coders.
pub struct DecodedSlice {
    pub points: Vec<Vec3>,
    pub sph: Vec<Vec3>,
}

/// Decoder is a geometry decoder instance.
///
/// One instance decodes a sequence of slices; context state survives
/// between them only when a header sets `entropy_continuation`. Slices
/// without continuation may equally be decoded on separate instances in
/// parallel.
pub struct GeometryDecoder {
    ctxs: Option<GeomContexts>,
}

impl Default for GeometryDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl GeometryDecoder {
    pub fn new() -> Self {
        GeometryDecoder { ctxs: None }
    }

    /// Decodes one slice payload.
    ///
    /// The caller parsed the byte-exact header already; `params` and
    /// `header` arrive as structs and `payload` holds only the coded
    /// geometry bytes.
    pub fn decode_slice(
        &mut self,
        params: &GeometryParams,
        header: &SliceHeader,
        payload: &[u8],
        ref_frame: Option<&RefFrame>,
    ) -> Result<DecodedSlice> {
        params.validate()?;

        if !header.entropy_continuation || self.ctxs.is_none() {
            self.ctxs = Some(GeomContexts::new());
        }
        let ctxs = self.ctxs.as_mut().unwrap();

        let expected = header.num_points();
        if expected == 0 {
            tracing::debug!("empty slice");
            return Ok(DecodedSlice {
                points: Vec::new(),
                sph: Vec::new(),
            });
        }

        let mut ref_points: Vec<Vec3> = ref_frame.map(|rf| rf.points.clone()).unwrap_or_default();
        let mut dec = EntropyDecoder::new(payload);

        let (points, sph) = match params.coder {
            GeomCoder::Octree => {
                let res = octree::decode_tree(&mut dec, ctxs, params, &mut ref_points)?;
                (res.points, Vec::new())
            }
            GeomCoder::Trisoup => {
                let res = octree::decode_tree(&mut dec, ctxs, params, &mut ref_points)?;
                let ts = params.trisoup.as_ref().unwrap();
                let box_max = slice_box(params);
                let points = trisoup::decode_surface(
                    &mut dec,
                    ctxs,
                    ts,
                    &res.leaves,
                    &ref_points,
                    &res.compensated,
                    box_max,
                )?;
                (points, Vec::new())
            }
            GeomCoder::Predictive => {
                let res =
                    predtree::decode_forest(&mut dec, ctxs, params, ref_frame, expected)?;
                (res.points, res.sph)
            }
        };

        if points.len() != expected {
            return Err(Error::Semantic(format!(
                "decoded {} points, header promises {}",
                points.len(),
                expected
            )));
        }
        let bound = slice_box(params);
        for p in &points {
            for a in 0..3 {
                if p[a] < 0 || p[a] >= bound[a] {
                    return Err(Error::Semantic(format!(
                        "decoded point {:?} outside [0, {:?})",
                        p, bound
                    )));
                }
            }
        }

        tracing::debug!(points = points.len(), "slice decoded");
        Ok(DecodedSlice { points, sph })
    }
}

/// The exclusive per-axis bound of the slice volume.
pub(crate) fn slice_box(params: &GeometryParams) -> Vec3 {
    Vec3([
        1 << params.root_size_log2[0],
        1 << params.root_size_log2[1],
        1 << params.root_size_log2[2],
    ])
}
