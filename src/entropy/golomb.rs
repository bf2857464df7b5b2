//! Exp-golomb codes layered over the range coder.
//!
//! The prefix is a unary run of continue-bits, each coded with an
//! adaptive context from a small array (the run position saturates into
//! the last context); suffix bits are equiprobable and bypassed. `k`
//! escalates with the prefix, so long residual tails stay cheap.

use crate::constants::EG_PREFIX_CTX_COUNT;
use crate::entropy::range::{AdaptiveBitModel, EntropyDecoder, EntropyEncoder};

/// Contexts for one exp-golomb prefix.
#[derive(Clone, Copy, Default)]
pub struct GolombCtx {
    prefix: [AdaptiveBitModel; EG_PREFIX_CTX_COUNT],
}

impl EntropyEncoder {
    /// Codes an unsigned value, order `k`.
    pub fn encode_ue(&mut self, value: u32, k: u32, ctx: &mut GolombCtx) {
        let mut v = value as u64;
        let mut k = k;
        let mut run = 0usize;
        while v >= 1 << k {
            self.encode_bit(true, &mut ctx.prefix[run.min(EG_PREFIX_CTX_COUNT - 1)]);
            v -= 1 << k;
            k += 1;
            run += 1;
        }
        self.encode_bit(false, &mut ctx.prefix[run.min(EG_PREFIX_CTX_COUNT - 1)]);
        self.encode_bypass_bits(v, k);
    }

    /// Codes a signed value by zigzag mapping, order `k`.
    pub fn encode_se(&mut self, value: i32, k: u32, ctx: &mut GolombCtx) {
        let mapped = (value << 1) ^ (value >> 31);
        self.encode_ue(mapped as u32, k, ctx);
    }
}

impl<'a> EntropyDecoder<'a> {
    /// Decodes an unsigned value, order `k`.
    pub fn decode_ue(&mut self, k: u32, ctx: &mut GolombCtx) -> u32 {
        let mut base = 0u64;
        let mut k = k;
        let mut run = 0usize;
        while self.decode_bit(&mut ctx.prefix[run.min(EG_PREFIX_CTX_COUNT - 1)]) {
            base += 1 << k;
            k += 1;
            run += 1;
            // 32 prefix bits would put the value past u32 range; the
            // stream is broken and the caller will notice the overflow.
            if run > 32 {
                return u32::MAX;
            }
        }
        (base + self.decode_bypass_bits(k)) as u32
    }

    /// Decodes a signed value by zigzag mapping, order `k`.
    pub fn decode_se(&mut self, k: u32, ctx: &mut GolombCtx) -> i32 {
        let mapped = self.decode_ue(k, ctx);
        (mapped >> 1) as i32 ^ -((mapped & 1) as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ue_roundtrip() {
        let values: Vec<u32> =
            (0..200).chain([1000, 65535, 1 << 20, u32::MAX >> 8].iter().copied()).collect();
        for k in 0..4 {
            let mut enc = EntropyEncoder::new();
            let mut ctx = GolombCtx::default();
            for &v in &values {
                enc.encode_ue(v, k, &mut ctx);
            }
            let bytes = enc.flush();

            let mut dec = EntropyDecoder::new(&bytes);
            let mut ctx = GolombCtx::default();
            for &v in &values {
                assert_eq!(dec.decode_ue(k, &mut ctx), v, "k = {}", k);
            }
        }
    }

    #[test]
    fn se_roundtrip() {
        let values: Vec<i32> = (-100..100).chain([-40000, 40000].iter().copied()).collect();
        let mut enc = EntropyEncoder::new();
        let mut ctx = GolombCtx::default();
        for &v in &values {
            enc.encode_se(v, 1, &mut ctx);
        }
        let bytes = enc.flush();

        let mut dec = EntropyDecoder::new(&bytes);
        let mut ctx = GolombCtx::default();
        for &v in &values {
            assert_eq!(dec.decode_se(1, &mut ctx), v);
        }
    }
}
