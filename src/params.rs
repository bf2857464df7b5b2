//! Per-slice geometry parameters.
//!
//! The surrounding application parses the parameter sets and hands the
//! core fully-populated structs; nothing here touches bytes. Impossible
//! combinations are rejected before a single payload byte is read.

use crate::error::{Error, Result};
use crate::point::Vec3;

/// Which geometry coder a slice uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeomCoder {
    Octree,
    Predictive,
    Trisoup,
}

/// Angular (rotating-LIDAR) parameters shared by the predictive tree.
#[derive(Clone, Debug, Default)]
pub struct AngularParams {
    /// Sensor origin the spherical coordinates are referenced to.
    pub origin: Vec3,
    /// Per-laser elevation as tan(theta) in Q18.
    pub laser_tan_theta: Vec<i32>,
    /// Per-laser vertical correction.
    pub laser_correction: Vec<i32>,
    /// log2 of the integer azimuth range covering one full turn.
    pub azimuth_two_pi_log2: u32,
    /// Expected azimuth advance between successive points.
    pub azimuth_speed: i32,
}

/// Motion parameters for inter-coded slices.
#[derive(Clone, Copy, Debug)]
pub struct MotionParams {
    /// Node size (log2) at which prediction-unit trees start.
    pub pu_size_log2: u32,
    /// Smallest PU the tree may split down to (log2).
    pub min_pu_size_log2: u32,
    /// Search window radius; also derives the MV suffix width.
    pub window_size: i32,
    /// Rate weight in Q8 for the encoder search. Not normative.
    pub lambda: i32,
}

impl Default for MotionParams {
    fn default() -> Self {
        MotionParams {
            pu_size_log2: 4,
            min_pu_size_log2: 2,
            window_size: 8,
            lambda: 256,
        }
    }
}

/// TriSoup parameters.
#[derive(Clone, Copy, Debug)]
pub struct TrisoupParams {
    /// Octree depth where leaves hand over to the surface coder (log2 of
    /// the leaf edge length).
    pub node_size_log2: u32,
    /// Vertex position bits dropped by quantisation.
    pub bit_dropped: u32,
    /// Rasterisation grid step.
    pub sampling_value: u32,
    /// Enables the signed centroid displacement along the face normal.
    pub centroid_drift: bool,
    /// Widens ray-triangle acceptance to close seams, Q8.
    pub halo: i64,
    /// Extra halo growth when sampling coarsens the grid.
    pub adaptive_halo: bool,
    /// Casts extra sub-voxel rays.
    pub fine_ray: bool,
}

impl Default for TrisoupParams {
    fn default() -> Self {
        TrisoupParams {
            node_size_log2: 2,
            bit_dropped: 0,
            sampling_value: 1,
            centroid_drift: false,
            halo: 32,
            adaptive_halo: true,
            fine_ray: false,
        }
    }
}

/// Everything the geometry coder needs for one slice.
#[derive(Clone, Debug)]
pub struct GeometryParams {
    pub coder: GeomCoder,
    /// Cubic root size unless `root_size_log2` overrides per axis.
    pub max_root_node_dim_log2: u32,
    /// Per-axis root size for non-cubic slices; equal components make a
    /// cubic slice.
    pub root_size_log2: Vec3,
    /// Whether implicit QtBt partitioning may split axis subsets.
    pub qtbt: bool,
    /// Direct coding mode intensity, 0 disables.
    pub idcm_intensity: u8,
    /// True when input points are deduplicated upstream.
    pub unique_points: bool,
    /// Base QP; 0 is lossless.
    pub qp: i32,
    /// Depth at which per-node QP offsets are signalled; None disables.
    pub qp_offset_depth: Option<u32>,
    /// Interval between predictive-tree QP offsets; None disables.
    pub qp_offset_interval: Option<u32>,
    pub trisoup: Option<TrisoupParams>,
    pub angular: Option<AngularParams>,
    pub motion: Option<MotionParams>,
    /// Azimuth scaling of the predictive-tree phi residual.
    pub azimuth_scaling: bool,
    /// Radius jump that resets the azimuth predictor ring.
    pub th_obj: i32,
    /// Disables the secondary cartesian residual in angular mode.
    pub residual2_disabled: bool,
    /// Non-cubic trisoup leaves clamped to the slice box.
    pub non_cubic_node: bool,
}

impl Default for GeometryParams {
    fn default() -> Self {
        GeometryParams {
            coder: GeomCoder::Octree,
            max_root_node_dim_log2: 10,
            root_size_log2: Vec3::splat(10),
            qtbt: false,
            idcm_intensity: 0,
            unique_points: true,
            qp: 0,
            qp_offset_depth: None,
            qp_offset_interval: None,
            trisoup: None,
            angular: None,
            motion: None,
            azimuth_scaling: false,
            th_obj: 1 << 16,
            residual2_disabled: false,
            non_cubic_node: false,
        }
    }
}

impl GeometryParams {
    /// Convenience constructor for a cubic octree slice.
    pub fn octree(dim_log2: u32) -> Self {
        GeometryParams {
            coder: GeomCoder::Octree,
            max_root_node_dim_log2: dim_log2,
            root_size_log2: Vec3::splat(dim_log2 as i32),
            ..Default::default()
        }
    }

    /// Rejects unsupported combinations up front.
    ///
    /// See: section 7, configuration errors.
    pub fn validate(&self) -> Result<()> {
        if self.max_root_node_dim_log2 == 0 || self.max_root_node_dim_log2 > 24 {
            return Err(Error::Config(format!(
                "root node dim log2 {} out of range 1..=24",
                self.max_root_node_dim_log2
            )));
        }
        for axis in 0..3 {
            let d = self.root_size_log2[axis];
            if d < 0 || d as u32 > self.max_root_node_dim_log2 {
                return Err(Error::Config(format!(
                    "axis {} size log2 {} exceeds root dim",
                    axis, d
                )));
            }
        }
        if self.idcm_intensity > 3 {
            return Err(Error::Config(format!(
                "IDCM intensity {} out of range 0..=3",
                self.idcm_intensity
            )));
        }
        let cubic = self.root_size_log2[0] == self.root_size_log2[1]
            && self.root_size_log2[1] == self.root_size_log2[2];
        if let Some(ts) = &self.trisoup {
            if self.coder != GeomCoder::Trisoup {
                return Err(Error::Config(
                    "trisoup parameters present on a non-trisoup slice".to_owned(),
                ));
            }
            if !cubic && !self.non_cubic_node {
                return Err(Error::Config(
                    "trisoup on a non-cubic slice requires the non-cubic-node feature"
                        .to_owned(),
                ));
            }
            if self.max_root_node_dim_log2 > 21 {
                return Err(Error::Config(
                    "trisoup segment keys pack 21 bits per axis".to_owned(),
                ));
            }
            if ts.node_size_log2 == 0 || ts.node_size_log2 >= self.max_root_node_dim_log2 {
                return Err(Error::Config(format!(
                    "trisoup node size log2 {} out of range",
                    ts.node_size_log2
                )));
            }
            if ts.bit_dropped >= ts.node_size_log2 {
                return Err(Error::Config(
                    "bit_dropped leaves no vertex precision".to_owned(),
                ));
            }
            if ts.sampling_value == 0 {
                return Err(Error::Config("sampling value must be positive".to_owned()));
            }
        } else if self.coder == GeomCoder::Trisoup {
            return Err(Error::Config(
                "trisoup slice without trisoup parameters".to_owned(),
            ));
        }
        if let Some(ang) = &self.angular {
            if ang.laser_tan_theta.is_empty()
                || ang.laser_tan_theta.len() != ang.laser_correction.len()
            {
                return Err(Error::Config("inconsistent laser tables".to_owned()));
            }
            if ang.azimuth_two_pi_log2 < 8 || ang.azimuth_two_pi_log2 > 24 {
                return Err(Error::Config(format!(
                    "azimuth two-pi log2 {} out of range 8..=24",
                    ang.azimuth_two_pi_log2
                )));
            }
            if ang.azimuth_speed <= 0 {
                return Err(Error::Config("azimuth speed must be positive".to_owned()));
            }
        }
        if self.azimuth_scaling && self.angular.is_none() {
            return Err(Error::Config(
                "azimuth scaling requires angular parameters".to_owned(),
            ));
        }
        if let Some(m) = &self.motion {
            if m.min_pu_size_log2 > m.pu_size_log2 {
                return Err(Error::Config(
                    "minimum PU size exceeds PU tree root size".to_owned(),
                ));
            }
            if m.window_size <= 0 {
                return Err(Error::Config("motion window must be positive".to_owned()));
            }
            if self.qtbt || !cubic {
                return Err(Error::Config(
                    "motion requires a cubic slice without QtBt".to_owned(),
                ));
            }
        }
        if self.qp_offset_interval == Some(0) {
            return Err(Error::Config(
                "QP offset interval must be positive".to_owned(),
            ));
        }
        if (self.qp > 0 || self.qp_offset_depth.is_some()) && self.unique_points {
            return Err(Error::Config(
                "geometry scaling requires duplicate-point coding".to_owned(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_octree_is_valid() {
        assert!(GeometryParams::octree(10).validate().is_ok());
    }

    #[test]
    fn trisoup_non_cubic_needs_feature() {
        let mut p = GeometryParams::octree(6);
        p.coder = GeomCoder::Trisoup;
        p.trisoup = Some(TrisoupParams::default());
        p.root_size_log2 = Vec3::new(6, 6, 5);
        assert!(matches!(p.validate(), Err(Error::Config(_))));
        p.non_cubic_node = true;
        assert!(p.validate().is_ok());
    }

    #[test]
    fn idcm_intensity_bounded() {
        let mut p = GeometryParams::octree(8);
        p.idcm_intensity = 4;
        assert!(p.validate().is_err());
    }
}
