//! Geometry quantisation.
//!
//! QP follows the usual six-steps-per-octave ladder: the step doubles
//! every 6 QP units, with a Q8 mantissa from a fixed table. QP 0 is the
//! identity and the only lossless setting.

use crate::math::div_exp2_round_half_inf;

const K_QP_SHIFT: u32 = 8;

/// 2^(i/6) in Q8 for i in 0..6.
const LEVEL_SCALE: [i64; 6] = [256, 287, 322, 362, 406, 456];

/// Scalar quantiser for geometry residuals and position low bits.
#[derive(Clone, Copy, Debug)]
pub struct QuantizerGeom {
    qp: i32,
}

impl QuantizerGeom {
    pub fn new(qp: i32) -> Self {
        QuantizerGeom { qp: qp.max(0) }
    }

    pub fn qp(&self) -> i32 {
        self.qp
    }

    /// The quantisation step in Q8.
    fn step(&self) -> i64 {
        LEVEL_SCALE[(self.qp % 6) as usize] << (self.qp / 6) as u32
    }

    /// Maps a value to its quantised level.
    pub fn quantize(&self, x: i64) -> i64 {
        if self.qp == 0 {
            return x;
        }
        let step = self.step();
        let sign = if x < 0 { -1 } else { 1 };
        sign * ((x.abs() << K_QP_SHIFT) + step / 2) / step
    }

    /// Maps a quantised level back to a reconstruction.
    pub fn scale(&self, level: i64) -> i64 {
        if self.qp == 0 {
            return level;
        }
        div_exp2_round_half_inf(level * self.step(), K_QP_SHIFT)
    }
}

/// Applies a node quantiser to the quantised low bits of a position while
/// leaving the already-descended high bits alone.
///
/// The split point is the node size at which the QP was signalled; only
/// bits below it were coded post-quantisation.
#[derive(Clone, Copy, Debug)]
pub struct AngPosScaler {
    quant: QuantizerGeom,
    low_bits: u32,
}

impl AngPosScaler {
    pub fn new(quant: QuantizerGeom, low_bits: u32) -> Self {
        AngPosScaler { quant, low_bits }
    }

    /// Scales the quantised low bits of `v` to their final magnitude.
    pub fn scale_ns(&self, v: i64) -> i64 {
        let mask = (1i64 << self.low_bits) - 1;
        let high = v & !mask;
        high | self.quant.scale(v & mask).min(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qp_zero_is_identity() {
        let q = QuantizerGeom::new(0);
        for v in [-100i64, -1, 0, 1, 7, 123456] {
            assert_eq!(q.quantize(v), v);
            assert_eq!(q.scale(v), v);
        }
    }

    #[test]
    fn step_doubles_every_six() {
        let a = QuantizerGeom::new(6);
        let b = QuantizerGeom::new(12);
        assert_eq!(a.scale(100) * 2, b.scale(100));
    }

    #[test]
    fn roundtrip_error_bounded_by_step() {
        for qp in [1, 4, 7, 13] {
            let q = QuantizerGeom::new(qp);
            let step = (LEVEL_SCALE[(qp % 6) as usize] << (qp / 6) as u32) >> 7;
            for v in [0i64, 3, 17, 100, 999, 4095] {
                let r = q.scale(q.quantize(v));
                assert!(
                    (r - v).abs() <= step.max(1),
                    "qp {} v {} r {}",
                    qp,
                    v,
                    r
                );
            }
        }
    }
}
