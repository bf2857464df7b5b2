// gpcc crate
extern crate gpcc;

use gpcc::{
    GeomCoder, GeometryDecoder, GeometryEncoder, GeometryParams, RefFrame, TrisoupParams, Vec3,
};

fn roundtrip(params: &GeometryParams, points: &[Vec3]) -> Vec<Vec3> {
    let mut enc = GeometryEncoder::new();
    let mut work = points.to_vec();
    let slice = enc.encode_slice(params, &mut work, None, false).unwrap();

    let mut dec = GeometryDecoder::new();
    let decoded = dec
        .decode_slice(params, &slice.header, &slice.payload, None)
        .unwrap();
    decoded.points
}

fn sorted(mut v: Vec<Vec3>) -> Vec<Vec3> {
    v.sort();
    v
}

#[test]
fn empty_slice_roundtrips_with_minimal_payload() {
    let params = GeometryParams::octree(4);
    let mut enc = GeometryEncoder::new();
    let mut work = Vec::new();
    let slice = enc.encode_slice(&params, &mut work, None, false).unwrap();
    assert_eq!(slice.header.geom_num_points_minus1, -1);
    assert_eq!(slice.payload.len(), 5);

    let mut dec = GeometryDecoder::new();
    let decoded = dec
        .decode_slice(&params, &slice.header, &slice.payload, None)
        .unwrap();
    assert!(decoded.points.is_empty());
}

#[test]
fn single_point_octree() {
    let params = GeometryParams::octree(4);
    let pts = gpcc::point::positions_from::<u16>(&[[1, 2, 3]]);
    let got = roundtrip(&params, &pts);
    assert_eq!(got, vec![Vec3::new(1, 2, 3)]);
}

#[test]
fn eight_cube_corners() {
    let params = GeometryParams::octree(2);
    let mut pts = Vec::new();
    for x in [0, 3] {
        for y in [0, 3] {
            for z in [0, 3] {
                pts.push(Vec3::new(x, y, z));
            }
        }
    }
    let got = sorted(roundtrip(&params, &pts));
    assert_eq!(got, sorted(pts));
}

#[test]
fn octree_scattered_cloud() {
    let params = GeometryParams::octree(8);
    let pts: Vec<Vec3> = (0u32..700)
        .map(|i| {
            Vec3::new(
                (i.wrapping_mul(97) % 256) as i32,
                (i.wrapping_mul(193) % 256) as i32,
                (i.wrapping_mul(41) % 256) as i32,
            )
        })
        .collect();
    let mut dedup = pts.clone();
    dedup.sort();
    dedup.dedup();
    let got = sorted(roundtrip(&params, &dedup));
    assert_eq!(got, dedup);
}

#[test]
fn octree_with_idcm() {
    let mut params = GeometryParams::octree(9);
    params.idcm_intensity = 2;
    // A sparse cloud: isolated branches everywhere, so direct mode fires.
    let pts: Vec<Vec3> = (0u32..40)
        .map(|i| {
            Vec3::new(
                (i.wrapping_mul(131) % 512) as i32,
                (i.wrapping_mul(269) % 512) as i32,
                (i.wrapping_mul(59) % 512) as i32,
            )
        })
        .collect();
    let mut dedup = pts;
    dedup.sort();
    dedup.dedup();
    let got = sorted(roundtrip(&params, &dedup));
    assert_eq!(got, dedup);
}

#[test]
fn octree_duplicate_points() {
    let mut params = GeometryParams::octree(4);
    params.unique_points = false;
    let pts = vec![
        Vec3::new(1, 1, 1),
        Vec3::new(1, 1, 1),
        Vec3::new(1, 1, 1),
        Vec3::new(9, 4, 2),
        Vec3::new(9, 4, 2),
        Vec3::new(15, 15, 15),
    ];
    let got = sorted(roundtrip(&params, &pts));
    assert_eq!(got, sorted(pts));
}

#[test]
fn octree_qtbt_non_cubic() {
    let mut params = GeometryParams::octree(6);
    params.qtbt = true;
    params.root_size_log2 = Vec3::new(6, 5, 4);
    let pts: Vec<Vec3> = (0u32..150)
        .map(|i| {
            Vec3::new(
                (i.wrapping_mul(37) % 64) as i32,
                (i.wrapping_mul(17) % 32) as i32,
                (i.wrapping_mul(11) % 16) as i32,
            )
        })
        .collect();
    let mut dedup = pts;
    dedup.sort();
    dedup.dedup();
    let got = sorted(roundtrip(&params, &dedup));
    assert_eq!(got, dedup);
}

#[test]
fn octree_random_cloud_roundtrips() {
    use rand::{Rng, SeedableRng};
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(0x5eed);
    let mut pts: Vec<Vec3> = (0..2000)
        .map(|_| {
            Vec3::new(
                rng.gen_range(0..512),
                rng.gen_range(0..512),
                rng.gen_range(0..512),
            )
        })
        .collect();
    pts.sort();
    pts.dedup();
    let params = GeometryParams::octree(9);
    assert_eq!(sorted(roundtrip(&params, &pts)), pts);
}

#[test]
fn octree_quantised_slice_stays_within_step() {
    let mut params = GeometryParams::octree(8);
    params.qp = 6;
    params.unique_points = false;
    let mut pts: Vec<Vec3> = (0u32..400)
        .map(|i| {
            Vec3::new(
                (i.wrapping_mul(89) % 256) as i32,
                (i.wrapping_mul(27) % 256) as i32,
                (i.wrapping_mul(63) % 256) as i32,
            )
        })
        .collect();
    pts.sort();

    let got = sorted(roundtrip(&params, &pts));
    assert_eq!(got.len(), pts.len());
    // QP 6 doubles the step: everything lands within 2 units of the
    // original cloud, in both directions.
    assert_hausdorff(&pts, &got, 2);
}

fn assert_hausdorff(a: &[Vec3], b: &[Vec3], tol: i32) {
    let near = |p: Vec3, set: &[Vec3]| {
        set.iter()
            .any(|q| (0..3).all(|ax| (p[ax] - q[ax]).abs() <= tol))
    };
    for &p in a {
        assert!(near(p, b), "{:?} has no counterpart within {}", p, tol);
    }
    for &p in b {
        assert!(near(p, a), "{:?} has no counterpart within {}", p, tol);
    }
}

#[test]
fn octree_per_node_qp_offsets() {
    let mut params = GeometryParams::octree(8);
    params.qp = 4;
    params.qp_offset_depth = Some(1);
    params.unique_points = false;
    let mut pts: Vec<Vec3> = (0u32..300)
        .map(|i| {
            Vec3::new(
                (i.wrapping_mul(113) % 256) as i32,
                (i.wrapping_mul(57) % 256) as i32,
                (i.wrapping_mul(201) % 256) as i32,
            )
        })
        .collect();
    pts.sort();

    let got = sorted(roundtrip(&params, &pts));
    assert_eq!(got.len(), pts.len());
    assert_hausdorff(&pts, &got, 2);
}

#[test]
fn predictive_chain_of_five() {
    let mut params = GeometryParams::octree(4);
    params.coder = GeomCoder::Predictive;
    let pts: Vec<Vec3> = (0..5).map(|i| Vec3::new(i, 0, 0)).collect();
    let got = sorted(roundtrip(&params, &pts));
    assert_eq!(got, pts);
}

#[test]
fn context_determinism_across_runs() {
    let params = GeometryParams::octree(7);
    let pts: Vec<Vec3> = (0u32..300)
        .map(|i| {
            Vec3::new(
                (i.wrapping_mul(53) % 128) as i32,
                (i.wrapping_mul(101) % 128) as i32,
                (i.wrapping_mul(23) % 128) as i32,
            )
        })
        .collect();
    let mut dedup = pts;
    dedup.sort();
    dedup.dedup();

    let run = || {
        let mut enc = GeometryEncoder::new();
        let mut work = dedup.clone();
        enc.encode_slice(&params, &mut work, None, false)
            .unwrap()
            .payload
    };
    assert_eq!(run(), run());
}

#[test]
fn decoded_points_stay_in_bounds() {
    let params = GeometryParams::octree(5);
    let pts: Vec<Vec3> = (0u32..80)
        .map(|i| {
            Vec3::new(
                (i.wrapping_mul(7) % 32) as i32,
                (i.wrapping_mul(13) % 32) as i32,
                (i.wrapping_mul(29) % 32) as i32,
            )
        })
        .collect();
    let mut dedup = pts;
    dedup.sort();
    dedup.dedup();
    let got = roundtrip(&params, &dedup);
    for p in got {
        for a in 0..3 {
            assert!(p[a] >= 0 && p[a] < 32);
        }
    }
}

#[test]
fn inter_reference_shrinks_payload() {
    let params = GeometryParams::octree(6);
    // A dense structured surface so the occupancy statistics matter.
    let mut pts: Vec<Vec3> = Vec::new();
    for x in 0..64 {
        for y in 0..64 {
            pts.push(Vec3::new(x, y, (x * 3 + y * 5) % 64));
        }
    }
    pts.sort();
    pts.dedup();

    let intra = {
        let mut enc = GeometryEncoder::new();
        let mut work = pts.clone();
        enc.encode_slice(&params, &mut work, None, false)
            .unwrap()
            .payload
            .len()
    };
    let reference = RefFrame {
        points: pts.clone(),
        sph: Vec::new(),
    };
    let (inter, header, payload) = {
        let mut enc = GeometryEncoder::new();
        let mut work = pts.clone();
        let slice = enc
            .encode_slice(&params, &mut work, Some(&reference), false)
            .unwrap();
        (slice.payload.len(), slice.header, slice.payload)
    };
    assert!(
        inter < intra,
        "inter payload {} not smaller than intra {}",
        inter,
        intra
    );

    let mut dec = GeometryDecoder::new();
    let decoded = dec
        .decode_slice(&params, &header, &payload, Some(&reference))
        .unwrap();
    assert_eq!(sorted(decoded.points), pts);
}

#[test]
fn motion_compensated_slice_roundtrips() {
    let mut params = GeometryParams::octree(6);
    params.motion = Some(Default::default());
    let refs: Vec<Vec3> = (0u32..300)
        .map(|i| {
            Vec3::new(
                ((i.wrapping_mul(29) % 60) + 2) as i32,
                ((i.wrapping_mul(31) % 60) + 2) as i32,
                ((i.wrapping_mul(37) % 60) + 2) as i32,
            )
        })
        .collect();
    let mut refs = refs;
    refs.sort();
    refs.dedup();
    // The current frame is the reference shifted by one.
    let pts: Vec<Vec3> = refs.iter().map(|&p| p + Vec3::new(1, 0, 0)).collect();
    let reference = RefFrame {
        points: refs,
        sph: Vec::new(),
    };

    let mut enc = GeometryEncoder::new();
    let mut work = pts.clone();
    let slice = enc
        .encode_slice(&params, &mut work, Some(&reference), false)
        .unwrap();

    let mut dec = GeometryDecoder::new();
    let decoded = dec
        .decode_slice(&params, &slice.header, &slice.payload, Some(&reference))
        .unwrap();
    assert_eq!(sorted(decoded.points), sorted(pts));
}

#[test]
fn trisoup_plane_stays_planar() {
    let mut params = GeometryParams::octree(5);
    params.coder = GeomCoder::Trisoup;
    params.trisoup = Some(TrisoupParams {
        node_size_log2: 4,
        ..Default::default()
    });

    // A diagonal plane x + y = 15 through the first 16^3 leaf.
    let mut pts = Vec::new();
    for x in 0..16 {
        for z in 0..16 {
            pts.push(Vec3::new(x, 15 - x, z));
        }
    }

    let mut enc = GeometryEncoder::new();
    let mut work = pts.clone();
    let slice = enc.encode_slice(&params, &mut work, None, false).unwrap();

    let mut dec = GeometryDecoder::new();
    let decoded = dec
        .decode_slice(&params, &slice.header, &slice.payload, None)
        .unwrap();

    assert_eq!(decoded.points.len(), slice.header.geom_num_points_minus1 as usize + 1);
    assert!(!decoded.points.is_empty());
    for p in &decoded.points {
        let d = (p[0] + p[1] - 15).abs();
        assert!(d <= 2, "point {:?} is {} off the plane", p, d);
    }
    // Sampling 1: bounded by the leaf's projected pixel area across the
    // two ray directions, plus the vertices.
    assert!(decoded.points.len() <= 3 * 17 * 17);
    // Encoder-side reconstruction must be exactly the decoded set.
    assert_eq!(slice.reconstructed, decoded.points);
}

#[test]
fn trisoup_decode_matches_encode_reconstruction() {
    let mut params = GeometryParams::octree(5);
    params.coder = GeomCoder::Trisoup;
    params.trisoup = Some(TrisoupParams {
        node_size_log2: 3,
        bit_dropped: 1,
        centroid_drift: true,
        ..Default::default()
    });

    // A bumpy surface z = f(x, y) over several leaves.
    let mut pts = Vec::new();
    for x in 0..32 {
        for y in 0..32 {
            let z = 8 + ((x * 3 + y * 5) % 7) as i32;
            pts.push(Vec3::new(x as i32, y as i32, z));
        }
    }

    let mut enc = GeometryEncoder::new();
    let mut work = pts.clone();
    let slice = enc.encode_slice(&params, &mut work, None, false).unwrap();

    let mut dec = GeometryDecoder::new();
    let decoded = dec
        .decode_slice(&params, &slice.header, &slice.payload, None)
        .unwrap();
    assert_eq!(slice.reconstructed, decoded.points);
    assert!(!decoded.points.is_empty());
}

#[test]
fn entropy_continuation_carries_state() {
    let params = GeometryParams::octree(6);
    let a: Vec<Vec3> = (0u32..200)
        .map(|i| {
            Vec3::new(
                (i.wrapping_mul(11) % 64) as i32,
                (i.wrapping_mul(19) % 64) as i32,
                (i.wrapping_mul(3) % 64) as i32,
            )
        })
        .collect();
    let mut a = a;
    a.sort();
    a.dedup();
    let b: Vec<Vec3> = a.iter().map(|&p| Vec3::new(p[0] ^ 1, p[1], p[2])).collect();
    let mut b = b;
    b.sort();
    b.dedup();

    let mut enc = GeometryEncoder::new();
    let mut wa = a.clone();
    let sa = enc.encode_slice(&params, &mut wa, None, false).unwrap();
    let mut wb = b.clone();
    let sb = enc.encode_slice(&params, &mut wb, None, true).unwrap();
    assert!(sb.header.entropy_continuation);

    let mut dec = GeometryDecoder::new();
    let da = dec.decode_slice(&params, &sa.header, &sa.payload, None).unwrap();
    let db = dec.decode_slice(&params, &sb.header, &sb.payload, None).unwrap();
    assert_eq!(sorted(da.points), a);
    assert_eq!(sorted(db.points), b);
}

#[test]
fn truncated_payload_fails_cleanly() {
    let params = GeometryParams::octree(6);
    let pts: Vec<Vec3> = (0u32..300)
        .map(|i| {
            Vec3::new(
                (i.wrapping_mul(43) % 64) as i32,
                (i.wrapping_mul(57) % 64) as i32,
                (i.wrapping_mul(5) % 64) as i32,
            )
        })
        .collect();
    let mut pts = pts;
    pts.sort();
    pts.dedup();

    let mut enc = GeometryEncoder::new();
    let mut work = pts.clone();
    let slice = enc.encode_slice(&params, &mut work, None, false).unwrap();

    let cut = slice.payload.len() / 3;
    let mut dec = GeometryDecoder::new();
    let err = dec.decode_slice(&params, &slice.header, &slice.payload[..cut], None);
    assert!(err.is_err());
}
