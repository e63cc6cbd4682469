// End-to-end registration behavior

use volreg::config::RegistrationConfig;
use volreg::core::Volume;
use volreg::registration::transform::{Affine, SpatialTransform};
use volreg::registration::register;
use volreg::resample::warp_volume;

/// Deterministic field of anisotropic Gaussian blobs
fn blob_volume(n: usize, num_blobs: usize, seed: u64) -> Volume {
    let mut state = seed;
    let mut next = move || {
        state = state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (state >> 33) as f64 / (1u64 << 31) as f64
    };

    let margin = 9.0;
    let span = n as f64 - 2.0 * margin;
    let blobs: Vec<[f64; 7]> = (0..num_blobs)
        .map(|_| {
            [
                margin + next() * span,
                margin + next() * span,
                margin + next() * span,
                1.5 + next() * 1.5,
                1.5 + next() * 1.5,
                1.5 + next() * 1.5,
                0.5 + next() * 0.5,
            ]
        })
        .collect();

    let mut vol = Volume::new(n, n, n, 1).unwrap();
    for z in 0..n {
        for y in 0..n {
            for x in 0..n {
                let mut acc = 0.0f64;
                for b in &blobs {
                    let dx = (x as f64 - b[0]) / b[3];
                    let dy = (y as f64 - b[1]) / b[4];
                    let dz = (z as f64 - b[2]) / b[5];
                    acc += b[6] * (-(dx * dx + dy * dy + dz * dz) / 2.0).exp();
                }
                vol.set(x, y, z, 0, acc.min(1.0) as f32);
            }
        }
    }
    vol
}

fn frobenius_to_identity(a: &[[f64; 3]; 3]) -> f64 {
    let mut sum = 0.0;
    for i in 0..3 {
        for j in 0..3 {
            let target = if i == j { 1.0 } else { 0.0 };
            sum += (a[i][j] - target).powi(2);
        }
    }
    sum.sqrt()
}

fn frobenius_diff(a: &[[f64; 3]; 3], b: &[[f64; 3]; 3]) -> f64 {
    let mut sum = 0.0;
    for i in 0..3 {
        for j in 0..3 {
            sum += (a[i][j] - b[i][j]).powi(2);
        }
    }
    sum.sqrt()
}

fn norm3(v: &[f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

#[test]
fn test_identity_registration() {
    let vol = blob_volume(36, 12, 21);
    let config = RegistrationConfig::default();

    let (transform, report) = register(&vol, &vol, &config).unwrap();

    assert!(report.matches >= 4, "self-registration needs matches");
    assert_eq!(report.keypoints_source, report.keypoints_reference);

    let drift = frobenius_to_identity(&transform.linear()) + norm3(&transform.translation());
    assert!(
        drift < 1e-3,
        "self-registration must give the identity, drift {drift}"
    );

    // Bit-identical on a repeated run with the same seed
    let (again, _) = register(&vol, &vol, &config).unwrap();
    assert_eq!(transform.parameters(), again.parameters());
}

#[test]
fn test_translation_recovery() {
    let vol = blob_volume(36, 12, 5);

    // Forward shift by an exact voxel offset keeps sampling lossless
    let shift = [3.0, -2.0, 1.0];
    let moved = warp_volume(
        &vol,
        &Affine::from_translation(shift),
        vol.dims(),
        vol.spacing(),
    )
    .unwrap();

    let config = RegistrationConfig::default();
    let (transform, report) = register(&moved, &vol, &config).unwrap();

    assert!(report.inliers >= 4);
    assert!(
        frobenius_to_identity(&transform.linear()) < 0.05,
        "pure translation must keep the linear part near identity"
    );

    // Content moved by +s, so mapping back to the reference subtracts it
    let t = transform.translation();
    let expected = [-shift[0], -shift[1], -shift[2]];
    let err = norm3(&[t[0] - expected[0], t[1] - expected[1], t[2] - expected[2]]);
    assert!(err < 1.0, "recovered translation {t:?}, expected {expected:?}");
}

#[test]
fn test_rotation_recovery() {
    let n = 36;
    let vol = blob_volume(n, 12, 33);

    // Quarter turn about z through the volume center, an exact voxel
    // permutation of a cubic grid
    let c = (n - 1) as f64 / 2.0;
    let lin = Affine::rotation_z(std::f64::consts::FRAC_PI_2).linear();
    let centered_t = [
        c - (lin[0][0] * c + lin[0][1] * c + lin[0][2] * c),
        c - (lin[1][0] * c + lin[1][1] * c + lin[1][2] * c),
        c - (lin[2][0] * c + lin[2][1] * c + lin[2][2] * c),
    ];
    let forward = Affine::from_parts(lin, centered_t);
    let rotated = warp_volume(&vol, &forward, vol.dims(), vol.spacing()).unwrap();

    let config = RegistrationConfig::default();
    let (transform, report) = register(&rotated, &vol, &config).unwrap();
    assert!(report.inliers >= 4);

    let expected = forward.inverse().unwrap();
    let lin_err = frobenius_diff(&transform.linear(), &expected.linear());
    assert!(
        lin_err < 0.1,
        "recovered rotation off by {lin_err} in Frobenius norm"
    );

    let t = transform.translation();
    let te = expected.translation();
    let t_err = norm3(&[t[0] - te[0], t[1] - te[1], t[2] - te[2]]);
    assert!(t_err < 2.0, "recovered translation off by {t_err} voxels");
}
