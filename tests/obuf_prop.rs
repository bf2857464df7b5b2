// Property tests for the OBUF context map: the state of the map must be
// a pure function of the observation sequence, no matter how the keys
// and bits are distributed.

extern crate gpcc;

use gpcc::obuf::CtxMap;
use proptest::prelude::*;

const S1_BITS: u32 = 10;
const S2_BITS: u32 = 3;

fn seed() -> Vec<u8> {
    (0..1u32 << S2_BITS).map(|j| 96 + (j as u8) * 8).collect()
}

proptest! {
    #[test]
    fn independent_observers_reach_identical_state(
        obs in prop::collection::vec(
            (any::<bool>(), 0usize..1 << S1_BITS, 0usize..1 << S2_BITS),
            1..4000,
        )
    ) {
        let mut a = CtxMap::new(S1_BITS, S2_BITS, &seed());
        let mut b = CtxMap::new(S1_BITS, S2_BITS, &seed());
        for &(bit, i, j) in &obs {
            prop_assert_eq!(a.observe(bit, i, j), b.observe(bit, i, j));
        }
        for i in 0..1usize << S1_BITS {
            for j in 0..1usize << S2_BITS {
                prop_assert_eq!(a.lookup(i, j), b.lookup(i, j));
            }
        }
    }

    #[test]
    fn lookup_never_disturbs_state(
        obs in prop::collection::vec(
            (any::<bool>(), 0usize..1 << S1_BITS, 0usize..1 << S2_BITS),
            1..1000,
        )
    ) {
        let mut a = CtxMap::new(S1_BITS, S2_BITS, &seed());
        let mut b = CtxMap::new(S1_BITS, S2_BITS, &seed());
        for &(bit, i, j) in &obs {
            // Interleave redundant lookups on one side only.
            let before = a.lookup(i, j);
            let evolved = a.observe(bit, i, j);
            prop_assert_eq!(before, evolved);
            prop_assert_eq!(b.observe(bit, i, j), evolved);
        }
    }
}

// Exp-golomb round trips under arbitrary values and orders.
mod golomb {
    use gpcc::entropy::golomb::GolombCtx;
    use gpcc::{EntropyDecoder, EntropyEncoder};
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn ue_roundtrips(values in prop::collection::vec(any::<u32>(), 1..200), k in 0u32..5) {
            let mut enc = EntropyEncoder::new();
            let mut ctx = GolombCtx::default();
            for &v in &values {
                enc.encode_ue(v, k, &mut ctx);
            }
            let bytes = enc.flush();

            let mut dec = EntropyDecoder::new(&bytes);
            let mut ctx = GolombCtx::default();
            for &v in &values {
                prop_assert_eq!(dec.decode_ue(k, &mut ctx), v);
            }
        }

        #[test]
        fn se_roundtrips(values in prop::collection::vec(-1_000_000i32..1_000_000, 1..200)) {
            let mut enc = EntropyEncoder::new();
            let mut ctx = GolombCtx::default();
            for &v in &values {
                enc.encode_se(v, 2, &mut ctx);
            }
            let bytes = enc.flush();

            let mut dec = EntropyDecoder::new(&bytes);
            let mut ctx = GolombCtx::default();
            for &v in &values {
                prop_assert_eq!(dec.decode_se(2, &mut ctx), v);
            }
        }
    }
}
