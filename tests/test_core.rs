// Container and linear-algebra invariants

use volreg::core::matrix::{eigen_symmetric3, mat3_vec, Matrix};
use volreg::core::Volume;

#[test]
fn test_volume_buffer_and_strides() {
    let vol = Volume::new(7, 5, 3, 2).unwrap();
    let (xs, ys, zs, cs) = vol.strides();

    assert_eq!(cs, 1);
    assert_eq!(xs, vol.nc());
    assert_eq!(ys, vol.nc() * vol.nx());
    assert_eq!(zs, vol.nc() * vol.nx() * vol.ny());
    assert_eq!(
        vol.data().len(),
        vol.nc() * vol.nx() * vol.ny() * vol.nz(),
        "buffer length must equal nc*nx*ny*nz"
    );
}

#[test]
fn test_default_volume_owns_no_buffer() {
    let vol = Volume::default();
    assert!(vol.is_empty());
    assert_eq!(vol.data().len(), 0);
}

#[test]
fn test_trilinear_sampling_matches_hand_computation() {
    let mut vol = Volume::new(2, 2, 2, 1).unwrap();
    vol.set(0, 0, 0, 0, 0.0);
    vol.set(1, 0, 0, 0, 1.0);
    vol.set(0, 1, 0, 0, 2.0);
    vol.set(1, 1, 0, 0, 3.0);
    vol.set(0, 0, 1, 0, 4.0);
    vol.set(1, 0, 1, 0, 5.0);
    vol.set(0, 1, 1, 0, 6.0);
    vol.set(1, 1, 1, 0, 7.0);

    // The chosen values make the interpolant v = x + 2y + 4z
    let v = vol.sample_trilinear(0.5, 0.25, 0.75, 0);
    assert!((v - (0.5 + 0.5 + 3.0)).abs() < 1e-6);
}

#[test]
fn test_channel_extraction() {
    let mut vol = Volume::new(3, 3, 3, 2).unwrap();
    vol.set(1, 1, 1, 0, 0.25);
    vol.set(1, 1, 1, 1, 0.75);

    let first = vol.extract_channel(0).unwrap();
    assert_eq!(first.nc(), 1);
    assert_eq!(first.get(1, 1, 1, 0), 0.25);

    assert!(vol.extract_channel(2).is_err());
}

#[test]
fn test_lstsq_overdetermined_noise_free_plane() {
    // z = 3x - 2y + 5 on six sample points
    let design = Matrix::from_rows(&[
        vec![0.0, 0.0, 1.0],
        vec![1.0, 0.0, 1.0],
        vec![0.0, 1.0, 1.0],
        vec![1.0, 1.0, 1.0],
        vec![2.0, 1.0, 1.0],
        vec![1.0, 2.0, 1.0],
    ])
    .unwrap();
    let rhs = Matrix::from_rows(&[
        vec![5.0],
        vec![8.0],
        vec![3.0],
        vec![6.0],
        vec![9.0],
        vec![4.0],
    ])
    .unwrap();

    let x = design.lstsq(&rhs).unwrap();
    assert!((x.get(0, 0) - 3.0).abs() < 1e-8);
    assert!((x.get(1, 0) + 2.0).abs() < 1e-8);
    assert!((x.get(2, 0) - 5.0).abs() < 1e-8);
}

#[test]
fn test_eigenvectors_are_orthonormal() {
    let m = [[2.0, 0.4, -0.1], [0.4, 1.5, 0.3], [-0.1, 0.3, 0.8]];
    let (vals, vecs) = eigen_symmetric3(&m);

    assert!(vals[0] >= vals[1] && vals[1] >= vals[2]);

    for j in 0..3 {
        let col = [vecs[0][j], vecs[1][j], vecs[2][j]];
        let norm: f64 = col.iter().map(|v| v * v).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9, "eigenvector {} not unit", j);

        let mv = mat3_vec(&m, &col);
        for i in 0..3 {
            assert!((mv[i] - vals[j] * col[i]).abs() < 1e-8);
        }
    }
}
