// Detector, descriptor and matcher behavior on synthetic volumes

use volreg::config::RegistrationConfig;
use volreg::core::Volume;
use volreg::features::{DescriptorExtractor, KeypointDetector, Matcher};
use volreg::mesh::IcosahedralMesh;
use volreg::pyramid::{build_dog_pyramid, build_gaussian_pyramid, PyramidParams};
use volreg::registration::extract_features;
use volreg::registration::transform::{Affine, SpatialTransform};
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

    let margin = 8.0;
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

#[test]
fn test_icosahedron_tessellation() {
    let mesh = IcosahedralMesh::new(1).unwrap();
    assert_eq!(mesh.num_vertices(), 42);
    assert_eq!(mesh.num_faces(), 80);

    for v in mesh.vertices() {
        assert!(
            (v.norm() - 1.0).abs() < 1e-6,
            "tessellation vertices must be unit vectors"
        );
    }
}

#[test]
fn test_detector_localizes_blob() {
    let n = 32;
    let center = 15.5f64;
    let mut vol = Volume::new(n, n, n, 1).unwrap();
    for z in 0..n {
        for y in 0..n {
            for x in 0..n {
                let dx = (x as f64 - center) / 2.0;
                let dy = (y as f64 - center) / 2.5;
                let dz = (z as f64 - center) / 3.0;
                vol.set(x, y, z, 0, (-(dx * dx + dy * dy + dz * dz) / 2.0).exp() as f32);
            }
        }
    }

    let gss = build_gaussian_pyramid(&vol, &PyramidParams::default()).unwrap();
    let dog = build_dog_pyramid(&gss).unwrap();
    let keypoints = KeypointDetector::default().detect(&gss, &dog).unwrap();

    assert!(!keypoints.is_empty(), "a clear blob must yield keypoints");

    // Coordinate-range invariant in the base frame
    for kp in &keypoints {
        assert!(kp.x >= 0.0 && kp.x < n as f64);
        assert!(kp.y >= 0.0 && kp.y < n as f64);
        assert!(kp.z >= 0.0 && kp.z < n as f64);
        assert!(kp.sigma > 0.0);
    }

    let closest = keypoints
        .iter()
        .map(|kp| {
            ((kp.x - center).powi(2) + (kp.y - center).powi(2) + (kp.z - center).powi(2)).sqrt()
        })
        .fold(f64::INFINITY, f64::min);
    assert!(
        closest < 2.0,
        "blob center should be localized, nearest keypoint at {closest} voxels"
    );
}

#[test]
fn test_detector_silent_on_flat_volume() {
    let vol = Volume::from_raw(vec![0.5; 24 * 24 * 24], 24, 24, 24, 1).unwrap();
    let params = PyramidParams {
        num_octaves: 2,
        ..PyramidParams::default()
    };
    let gss = build_gaussian_pyramid(&vol, &params).unwrap();
    let dog = build_dog_pyramid(&gss).unwrap();

    let keypoints = KeypointDetector::default().detect(&gss, &dog).unwrap();
    assert!(keypoints.is_empty(), "flat input has no extrema");
}

#[test]
fn test_descriptor_normalization_and_provenance() {
    let vol = blob_volume(32, 10, 11);
    let gss = build_gaussian_pyramid(&vol, &PyramidParams::default()).unwrap();
    let dog = build_dog_pyramid(&gss).unwrap();

    let keypoints = KeypointDetector::default().detect(&gss, &dog).unwrap();
    assert!(!keypoints.is_empty());

    let extractor = DescriptorExtractor::new(1).unwrap();
    let descriptors = extractor.extract(&gss, &keypoints).unwrap();
    assert!(!descriptors.is_empty());

    for desc in &descriptors {
        assert_eq!(desc.hist.len(), 64 * 42);

        let norm: f32 = desc.hist.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!(
            (0.999..=1.001).contains(&norm),
            "descriptor norm {norm} outside unit tolerance"
        );
        assert!(desc.hist.iter().all(|&v| v <= 0.2 + 1e-4));
        assert!(desc.hist.iter().all(|&v| v >= 0.0));

        // Provenance back into the keypoint store
        let kp = &keypoints[desc.keypoint];
        assert_eq!(desc.x, kp.x);
        assert_eq!(desc.sigma, kp.sigma);
    }
}

#[test]
fn test_match_symmetry_under_cross_check() {
    let vol_a = blob_volume(32, 10, 3);
    let vol_b = blob_volume(32, 10, 4);

    let config = RegistrationConfig::default();
    let features_a = extract_features(&vol_a, &config).unwrap();
    let features_b = extract_features(&vol_b, &config).unwrap();

    let matcher = Matcher::new(0.95, true);
    let forward = matcher
        .match_indices(&features_a.descriptors, &features_b.descriptors)
        .unwrap();
    let backward = matcher
        .match_indices(&features_b.descriptors, &features_a.descriptors)
        .unwrap();

    for (i, m) in forward.iter().enumerate() {
        if let Some(j) = m {
            assert_eq!(
                backward[*j],
                Some(i),
                "cross-checked matches must be mutual"
            );
        }
    }
}

#[test]
fn test_descriptor_rotation_covariance() {
    let n = 36;
    let vol = blob_volume(n, 12, 9);

    // Quarter turn about z through the volume center: an exact voxel
    // permutation, so the only variation left is the pipeline's own
    let c = (n - 1) as f64 / 2.0;
    let lin = Affine::rotation_z(std::f64::consts::FRAC_PI_2).linear();
    let centered_t = [
        c - (lin[0][0] * c + lin[0][1] * c + lin[0][2] * c),
        c - (lin[1][0] * c + lin[1][1] * c + lin[1][2] * c),
        c - (lin[2][0] * c + lin[2][1] * c + lin[2][2] * c),
    ];
    let about_center = Affine::from_parts(lin, centered_t);
    let rotated = warp_volume(&vol, &about_center, vol.dims(), vol.spacing()).unwrap();

    let config = RegistrationConfig::default();
    let original = extract_features(&vol, &config).unwrap();
    let turned = extract_features(&rotated, &config).unwrap();

    let matcher = Matcher::default();
    let matches = matcher
        .matches(&original.descriptors, &turned.descriptors)
        .unwrap();
    assert!(
        matches.len() >= 4,
        "rotation-covariant descriptors must keep matching, got {}",
        matches.len()
    );

    // Matched positions must agree with the applied rotation
    let mut errors: Vec<f64> = matches
        .iter()
        .map(|m| {
            let s = &original.descriptors[m.src_idx];
            let t = &turned.descriptors[m.ref_idx];
            let p = about_center.apply([s.x, s.y, s.z]);
            ((p[0] - t.x).powi(2) + (p[1] - t.y).powi(2) + (p[2] - t.z).powi(2)).sqrt()
        })
        .collect();
    errors.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let median = errors[errors.len() / 2];
    assert!(
        median < 1.5,
        "median matched-keypoint displacement {median} exceeds tolerance"
    );
}
