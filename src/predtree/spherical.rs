//! Spherical geometry for the angular predictive-tree mode.
//!
//! Positions are `(radius, azimuth, laser index)` relative to the slice
//! angular origin. Azimuth lives on an integer circle of
//! `2^azimuth_two_pi_log2` steps. Conversions are fixed point end to
//! end; the secondary cartesian residual absorbs whatever error the
//! forward/backward pair leaves, so the pair only has to be identical on
//! both sides, not exact.

use crate::constants::N_PRED_DELTA;
use crate::math::{atan2_turn, cos_sin_turn, div_approx, div_exp2_round_half_inf, isqrt};
use crate::params::AngularParams;
use crate::point::Vec3;

/// Converts a cartesian position into spherical coordinates.
pub(crate) fn cart_to_sph(p: Vec3, ang: &AngularParams) -> Vec3 {
    let rel = p - ang.origin;
    let (x, y, z) = (rel[0] as i64, rel[1] as i64, rel[2] as i64);
    let r = isqrt((x * x + y * y) as u64) as i64;

    let turn = atan2_turn(y, x);
    let phi = (turn.rem_euclid(1 << 32) >> (32 - ang.azimuth_two_pi_log2)) as i32;

    let mut laser = 0usize;
    let mut best = i64::MAX;
    for (l, &tan) in ang.laser_tan_theta.iter().enumerate() {
        let zl = ((r * tan as i64) >> 18) + ang.laser_correction[l] as i64;
        let d = (z - zl).abs();
        if d < best {
            best = d;
            laser = l;
        }
    }
    Vec3::new(r as i32, phi, laser as i32)
}

/// Converts a spherical position back to cartesian, relative to the
/// angular origin.
pub(crate) fn sph_to_cart(s: Vec3, ang: &AngularParams) -> Vec3 {
    let r = s[0] as i64;
    let turn_q32 = (s[1] as i64) << (32 - ang.azimuth_two_pi_log2);
    let (c, sn) = cos_sin_turn(turn_q32);
    let x = div_exp2_round_half_inf(r * c, 30);
    let y = div_exp2_round_half_inf(r * sn, 30);
    let laser = (s[2] as usize).min(ang.laser_tan_theta.len() - 1);
    let z = ((r * ang.laser_tan_theta[laser] as i64) >> 18) + ang.laser_correction[laser] as i64;
    ang.origin + Vec3::new(x as i32, y as i32, z as i32)
}

/// Azimuth quantisation step at a given radius: about one position unit
/// of arc, never below one azimuth step.
pub(crate) fn azimuth_step(r: i32, ang: &AngularParams) -> i32 {
    let full = 1i64 << ang.azimuth_two_pi_log2;
    // 2*pi ~ 710/113; the fixed-point reciprocal keeps both sides in
    // agreement on ties.
    let arc = div_approx(full * 113, (710 * r.max(1) as i64) as u64);
    arc.max(1) as i32
}

/// The ring of recent nodes the azimuth predictor draws from.
pub(crate) struct PredRing {
    entries: Vec<Vec3>,
}

impl PredRing {
    pub fn new() -> Self {
        PredRing {
            entries: Vec::with_capacity(N_PRED_DELTA),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Most recent first.
    pub fn get(&self, idx: usize) -> Vec3 {
        self.entries[idx.min(self.entries.len() - 1)]
    }

    pub fn push(&mut self, s: Vec3) {
        if self.entries.len() == N_PRED_DELTA {
            self.entries.pop();
        }
        self.entries.insert(0, s);
    }

    /// The new-object reset: a radius jump means the sensor moved on to
    /// a different surface and the ring no longer predicts anything.
    pub fn reset_if_jump(&mut self, dr: i32, th_obj: i32) {
        if dr.abs() > th_obj {
            self.entries.clear();
        }
    }
}

/// Reference-frame spherical positions, indexed per laser and sorted by
/// azimuth for closest-predecessor queries.
pub(crate) struct RefSphIndex {
    per_laser: Vec<Vec<(i32, Vec3)>>,
}

impl RefSphIndex {
    pub fn build(sph: &[Vec3], laser_count: usize) -> Self {
        let mut per_laser: Vec<Vec<(i32, Vec3)>> = vec![Vec::new(); laser_count];
        for &s in sph {
            let l = s[2] as usize;
            if l < laser_count {
                per_laser[l].push((s[1], s));
            }
        }
        for row in &mut per_laser {
            row.sort_by_key(|&(phi, s)| (phi, s[0]));
        }
        RefSphIndex { per_laser }
    }

    /// The reference position with the nearest azimuth on a laser, and
    /// the runner-up, in that order.
    pub fn closest_pred(&self, phi: i32, laser: i32) -> (Option<Vec3>, Option<Vec3>) {
        let row = match self.per_laser.get(laser as usize) {
            Some(row) if !row.is_empty() => row,
            _ => return (None, None),
        };
        let pos = row.partition_point(|&(p, _)| p < phi);
        let mut cands: Vec<Vec3> = Vec::new();
        if pos < row.len() {
            cands.push(row[pos].1);
        }
        if pos > 0 {
            cands.push(row[pos - 1].1);
        }
        cands.sort_by_key(|s| (s[1] - phi).abs());
        (cands.first().copied(), cands.get(1).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> AngularParams {
        AngularParams {
            origin: Vec3::new(100, 100, 10),
            laser_tan_theta: vec![-(1 << 16), 0, 1 << 16],
            laser_correction: vec![0, 0, 0],
            azimuth_two_pi_log2: 16,
            azimuth_speed: 64,
        }
    }

    #[test]
    fn sph_cart_pair_is_close() {
        let ang = params();
        // All on the flat laser so the cone snap costs nothing.
        for &p in &[
            Vec3::new(400, 100, 10),
            Vec3::new(100, 500, 10),
            Vec3::new(350, 350, 10),
            Vec3::new(40, 160, 10),
        ] {
            let s = cart_to_sph(p, &ang);
            let q = sph_to_cart(s, &ang);
            let err = (p - q).norm2();
            assert!(err < 64, "p {:?} -> s {:?} -> q {:?}", p, s, q);
        }
    }

    #[test]
    fn azimuth_step_shrinks_with_radius() {
        let ang = params();
        let near = azimuth_step(4, &ang);
        let far = azimuth_step(4000, &ang);
        assert!(near > far);
        assert!(far >= 1);
    }

    #[test]
    fn ring_resets_on_radius_jump() {
        let mut ring = PredRing::new();
        ring.push(Vec3::new(100, 0, 0));
        ring.push(Vec3::new(110, 5, 0));
        ring.reset_if_jump(3, 1000);
        assert_eq!(ring.len(), 2);
        ring.reset_if_jump(5000, 1000);
        assert!(ring.is_empty());
    }

    #[test]
    fn closest_pred_orders_by_distance() {
        let sph = vec![
            Vec3::new(10, 100, 0),
            Vec3::new(11, 200, 0),
            Vec3::new(12, 350, 0),
        ];
        let idx = RefSphIndex::build(&sph, 2);
        let (a, b) = idx.closest_pred(190, 0);
        assert_eq!(a.unwrap()[1], 200);
        assert_eq!(b.unwrap()[1], 100);
        assert_eq!(idx.closest_pred(0, 1), (None, None));
    }
}
