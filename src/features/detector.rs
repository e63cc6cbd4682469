use crate::core::matrix::{det3, eigen_symmetric3, Matrix};
use crate::core::Volume;
use crate::error::Result;
use crate::features::keypoints::{Keypoint, KeypointStore};
use crate::pyramid::{DogPyramid, GaussianPyramid};

const MAX_REFINE_ITERS: usize = 5;

/// DoG extremum detector with sub-voxel refinement and orientation
/// assignment
pub struct KeypointDetector {
    /// Minimum absolute DoG response, on the [0, 1] intensity scale
    pub peak_thresh: f64,
    /// Principal-curvature ratio bound for the edge test
    pub edge_thresh: f64,
}

impl Default for KeypointDetector {
    fn default() -> Self {
        Self {
            peak_thresh: 0.04,
            edge_thresh: 10.0,
        }
    }
}

impl KeypointDetector {
    #[must_use]
    pub fn new(peak_thresh: f64, edge_thresh: f64) -> Self {
        Self {
            peak_thresh,
            edge_thresh,
        }
    }

    /// Scan the DoG pyramid for keypoints.
    ///
    /// Candidates failing any pruning step vanish silently; the detector
    /// never errors on data.
    pub fn detect(&self, gss: &GaussianPyramid, dog: &DogPyramid) -> Result<KeypointStore> {
        let mut keypoints = KeypointStore::new();
        let num_intervals = dog.num_intervals;

        for (octave_idx, octave) in dog.octaves.iter().enumerate() {
            for level_idx in 1..=num_intervals {
                let prev = &octave.levels[level_idx - 1];
                let curr = &octave.levels[level_idx];
                let next = &octave.levels[level_idx + 1];

                let (nx, ny, nz) = curr.dims();
                if nx < 3 || ny < 3 || nz < 3 {
                    continue;
                }

                for z in 1..nz - 1 {
                    for y in 1..ny - 1 {
                        for x in 1..nx - 1 {
                            let val = curr.get(x, y, z, 0);

                            if (f64::from(val)).abs() < self.peak_thresh {
                                continue;
                            }
                            if !is_extremum(prev, curr, next, x, y, z, val) {
                                continue;
                            }
                            if !self.passes_edge_check(curr, x, y, z) {
                                continue;
                            }

                            let Some((xf, yf, zf, sf)) =
                                refine(&octave.levels, x, y, z, level_idx, num_intervals)
                            else {
                                continue;
                            };

                            // Octave-relative blur drives the window sizes
                            let sigma_rel = gss.sigma0
                                * 2.0f64.powf(sf / num_intervals as f64);
                            let gss_level = (sf.round() as usize)
                                .min(gss.octaves[octave_idx].levels.len() - 1);
                            let Some(rotation) = assign_orientation(
                                gss.level(octave_idx, gss_level),
                                xf,
                                yf,
                                zf,
                                sigma_rel,
                            ) else {
                                continue;
                            };

                            // Back to base-frame coordinates; the pyramid
                            // starts from a 2x upsampled image
                            let factor = 2.0f64.powi(octave_idx as i32 - 1);
                            keypoints.push(Keypoint {
                                x: xf * factor,
                                y: yf * factor,
                                z: zf * factor,
                                octave: octave_idx,
                                level: sf,
                                sigma: gss.sigma0
                                    * 2.0f64.powf(
                                        octave_idx as f64 + sf / num_intervals as f64,
                                    ),
                                rotation,
                                response: val.abs(),
                            });
                        }
                    }
                }
            }
        }

        Ok(keypoints)
    }

    /// Reject edge-like responses from the spatial Hessian curvature ratio.
    ///
    /// The curvature ratio is evaluated on the 8-bit dynamic-range scale the
    /// thresholds were calibrated for, and the Hessian is negated at maxima
    /// so both extremum polarities see a positive-definite blob profile.
    fn passes_edge_check(&self, vol: &Volume, x: usize, y: usize, z: usize) -> bool {
        const RANGE_SCALE: f64 = 255.0;

        let v = |dx: i64, dy: i64, dz: i64| -> f64 {
            RANGE_SCALE
                * f64::from(vol.get(
                    (x as i64 + dx) as usize,
                    (y as i64 + dy) as usize,
                    (z as i64 + dz) as usize,
                    0,
                ))
        };

        let c = v(0, 0, 0);
        let polarity = if c > 0.0 { -1.0 } else { 1.0 };

        let dxx = polarity * (v(1, 0, 0) + v(-1, 0, 0) - 2.0 * c);
        let dyy = polarity * (v(0, 1, 0) + v(0, -1, 0) - 2.0 * c);
        let dzz = polarity * (v(0, 0, 1) + v(0, 0, -1) - 2.0 * c);
        let dxy = polarity * (v(1, 1, 0) - v(1, -1, 0) - v(-1, 1, 0) + v(-1, -1, 0)) / 4.0;
        let dxz = polarity * (v(1, 0, 1) - v(1, 0, -1) - v(-1, 0, 1) + v(-1, 0, -1)) / 4.0;
        let dyz = polarity * (v(0, 1, 1) - v(0, 1, -1) - v(0, -1, 1) + v(0, -1, -1)) / 4.0;

        let hessian = [
            [dxx, dxy, dxz],
            [dxy, dyy, dyz],
            [dxz, dyz, dzz],
        ];
        let det = det3(&hessian);
        if det <= 0.0 {
            return false;
        }

        let trace = dxx + dyy + dzz;
        let r = self.edge_thresh;
        trace * trace / det < (r + 1.0) * (r + 1.0) / r
    }
}

/// Strict local extremum over the 3x3x3 neighborhoods of the level and its
/// two scale neighbors
fn is_extremum(
    prev: &Volume,
    curr: &Volume,
    next: &Volume,
    x: usize,
    y: usize,
    z: usize,
    val: f32,
) -> bool {
    let mut is_max = true;
    let mut is_min = true;

    for (level_idx, vol) in [prev, curr, next].iter().enumerate() {
        for dz in -1i64..=1 {
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    if level_idx == 1 && dx == 0 && dy == 0 && dz == 0 {
                        continue;
                    }
                    let neighbor = vol.get(
                        (x as i64 + dx) as usize,
                        (y as i64 + dy) as usize,
                        (z as i64 + dz) as usize,
                        0,
                    );
                    if neighbor >= val {
                        is_max = false;
                    }
                    if neighbor <= val {
                        is_min = false;
                    }
                    if !is_max && !is_min {
                        return false;
                    }
                }
            }
        }
    }

    is_max || is_min
}

/// Quadratic sub-voxel refinement over (x, y, z, s).
///
/// Solves the 4x4 Newton step on the finite-difference gradient and
/// Hessian; shifts the integer position when any offset exceeds half a
/// voxel, for at most five attempts. Returns None when the fit does not
/// converge or the candidate walks out of the interior.
fn refine(
    levels: &[Volume],
    mut x: usize,
    mut y: usize,
    mut z: usize,
    mut l: usize,
    num_intervals: usize,
) -> Option<(f64, f64, f64, f64)> {
    let (nx, ny, nz) = levels[0].dims();

    for _ in 0..MAX_REFINE_ITERS {
        let v = |dx: i64, dy: i64, dz: i64, dl: i64| -> f64 {
            f64::from(levels[(l as i64 + dl) as usize].get(
                (x as i64 + dx) as usize,
                (y as i64 + dy) as usize,
                (z as i64 + dz) as usize,
                0,
            ))
        };

        let c = v(0, 0, 0, 0);
        let gx = (v(1, 0, 0, 0) - v(-1, 0, 0, 0)) / 2.0;
        let gy = (v(0, 1, 0, 0) - v(0, -1, 0, 0)) / 2.0;
        let gz = (v(0, 0, 1, 0) - v(0, 0, -1, 0)) / 2.0;
        let gs = (v(0, 0, 0, 1) - v(0, 0, 0, -1)) / 2.0;

        let dxx = v(1, 0, 0, 0) + v(-1, 0, 0, 0) - 2.0 * c;
        let dyy = v(0, 1, 0, 0) + v(0, -1, 0, 0) - 2.0 * c;
        let dzz = v(0, 0, 1, 0) + v(0, 0, -1, 0) - 2.0 * c;
        let dss = v(0, 0, 0, 1) + v(0, 0, 0, -1) - 2.0 * c;

        let dxy = (v(1, 1, 0, 0) - v(1, -1, 0, 0) - v(-1, 1, 0, 0) + v(-1, -1, 0, 0)) / 4.0;
        let dxz = (v(1, 0, 1, 0) - v(1, 0, -1, 0) - v(-1, 0, 1, 0) + v(-1, 0, -1, 0)) / 4.0;
        let dyz = (v(0, 1, 1, 0) - v(0, 1, -1, 0) - v(0, -1, 1, 0) + v(0, -1, -1, 0)) / 4.0;
        let dxs = (v(1, 0, 0, 1) - v(1, 0, 0, -1) - v(-1, 0, 0, 1) + v(-1, 0, 0, -1)) / 4.0;
        let dys = (v(0, 1, 0, 1) - v(0, 1, 0, -1) - v(0, -1, 0, 1) + v(0, -1, 0, -1)) / 4.0;
        let dzs = (v(0, 0, 1, 1) - v(0, 0, 1, -1) - v(0, 0, -1, 1) + v(0, 0, -1, -1)) / 4.0;

        let hessian = Matrix::from_rows(&[
            vec![dxx, dxy, dxz, dxs],
            vec![dxy, dyy, dyz, dys],
            vec![dxz, dyz, dzz, dzs],
            vec![dxs, dys, dzs, dss],
        ])
        .ok()?;

        let offset = hessian.solve(&[-gx, -gy, -gz, -gs]).ok()?;

        if offset.iter().all(|o| o.abs() <= 0.5) {
            return Some((
                x as f64 + offset[0],
                y as f64 + offset[1],
                z as f64 + offset[2],
                l as f64 + offset[3],
            ));
        }

        let step = |p: usize, o: f64| -> i64 {
            if o > 0.5 {
                p as i64 + 1
            } else if o < -0.5 {
                p as i64 - 1
            } else {
                p as i64
            }
        };

        let nx_new = step(x, offset[0]);
        let ny_new = step(y, offset[1]);
        let nz_new = step(z, offset[2]);
        let nl_new = step(l, offset[3]);

        if nx_new < 1
            || ny_new < 1
            || nz_new < 1
            || nx_new as usize >= nx - 1
            || ny_new as usize >= ny - 1
            || nz_new as usize >= nz - 1
            || nl_new < 1
            || nl_new as usize > num_intervals
        {
            return None;
        }

        x = nx_new as usize;
        y = ny_new as usize;
        z = nz_new as usize;
        l = nl_new as usize;
    }

    None
}

/// Dominant local frame from the weighted gradient structure tensor.
///
/// Eigenvectors are ordered by descending eigenvalue; the first two axes
/// have their sign fixed by the third moment of the projected gradients and
/// the third is their cross product, so the frame is always right-handed.
/// Returns None when the window carries no gradient structure.
fn assign_orientation(
    level: &Volume,
    cx: f64,
    cy: f64,
    cz: f64,
    sigma_rel: f64,
) -> Option<[[f64; 3]; 3]> {
    let win = 1.5 * sigma_rel;
    let radius = win.ceil().max(1.0) as i64;
    let (nx, ny, nz) = level.dims();

    let cxi = cx.round() as i64;
    let cyi = cy.round() as i64;
    let czi = cz.round() as i64;

    let mut tensor = [[0.0f64; 3]; 3];
    let mut samples: Vec<([f64; 3], f64)> = Vec::new();

    for dz in -radius..=radius {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let px = cxi + dx;
                let py = cyi + dy;
                let pz = czi + dz;
                if px < 1
                    || py < 1
                    || pz < 1
                    || px as usize >= nx - 1
                    || py as usize >= ny - 1
                    || pz as usize >= nz - 1
                {
                    continue;
                }

                let fx = px as f64 - cx;
                let fy = py as f64 - cy;
                let fz = pz as f64 - cz;
                let dist2 = fx * fx + fy * fy + fz * fz;
                if dist2 > win * win {
                    continue;
                }

                let (ux, uy, uz) = (px as usize, py as usize, pz as usize);
                let g = [
                    f64::from(level.get(ux + 1, uy, uz, 0) - level.get(ux - 1, uy, uz, 0)) / 2.0,
                    f64::from(level.get(ux, uy + 1, uz, 0) - level.get(ux, uy - 1, uz, 0)) / 2.0,
                    f64::from(level.get(ux, uy, uz + 1, 0) - level.get(ux, uy, uz - 1, 0)) / 2.0,
                ];

                let w = (-dist2 / (2.0 * win * win)).exp();
                for i in 0..3 {
                    for j in 0..3 {
                        tensor[i][j] += w * g[i] * g[j];
                    }
                }
                samples.push((g, w));
            }
        }
    }

    let (vals, vecs) = eigen_symmetric3(&tensor);
    if vals[0] <= 1e-12 {
        return None;
    }

    let mut e1 = [vecs[0][0], vecs[1][0], vecs[2][0]];
    let mut e2 = [vecs[0][1], vecs[1][1], vecs[2][1]];

    // Disambiguate eigenvector signs by gradient skewness along each axis
    for e in [&mut e1, &mut e2] {
        let mut moment = 0.0;
        for (g, w) in &samples {
            let p = g[0] * e[0] + g[1] * e[1] + g[2] * e[2];
            moment += w * p * p * p;
        }
        if moment < 0.0 {
            e[0] = -e[0];
            e[1] = -e[1];
            e[2] = -e[2];
        }
    }

    let e3 = [
        e1[1] * e2[2] - e1[2] * e2[1],
        e1[2] * e2[0] - e1[0] * e2[2],
        e1[0] * e2[1] - e1[1] * e2[0],
    ];

    Some([
        [e1[0], e2[0], e3[0]],
        [e1[1], e2[1], e3[1]],
        [e1[2], e2[2], e3[2]],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::matrix::det3;

    fn volume_with(vals: &[(usize, usize, usize, f32)], n: usize) -> Volume {
        let mut vol = Volume::new(n, n, n, 1).unwrap();
        for &(x, y, z, v) in vals {
            vol.set(x, y, z, 0, v);
        }
        vol
    }

    #[test]
    fn test_is_extremum_detects_peak() {
        let n = 5;
        let prev = Volume::new(n, n, n, 1).unwrap();
        let next = Volume::new(n, n, n, 1).unwrap();
        let curr = volume_with(&[(2, 2, 2, 1.0)], n);

        assert!(is_extremum(&prev, &curr, &next, 2, 2, 2, 1.0));
        // A neighbor equal to the candidate defeats strictness
        let curr_tied = volume_with(&[(2, 2, 2, 1.0), (3, 2, 2, 1.0)], n);
        assert!(!is_extremum(&prev, &curr_tied, &next, 2, 2, 2, 1.0));
    }

    #[test]
    fn test_is_extremum_detects_valley() {
        let n = 5;
        let fill = |v: f32| Volume::from_raw(vec![v; n * n * n], n, n, n, 1).unwrap();
        let prev = fill(0.5);
        let next = fill(0.5);
        let mut curr = fill(0.5);
        curr.set(2, 2, 2, 0, -1.0);

        assert!(is_extremum(&prev, &curr, &next, 2, 2, 2, -1.0));
    }

    #[test]
    fn test_edge_check_rejects_ridge() {
        let detector = KeypointDetector::default();
        let n = 5;

        // A blob curves equally in all directions and passes
        let mut blob = Volume::new(n, n, n, 1).unwrap();
        for z in 0..n {
            for y in 0..n {
                for x in 0..n {
                    let d2 = (x as f64 - 2.0).powi(2)
                        + (y as f64 - 2.0).powi(2)
                        + (z as f64 - 2.0).powi(2);
                    blob.set(x, y, z, 0, (-d2 / 2.0).exp() as f32);
                }
            }
        }
        assert!(detector.passes_edge_check(&blob, 2, 2, 2));

        // A ridge extended along x has negligible curvature on that axis
        let mut ridge = Volume::new(n, n, n, 1).unwrap();
        for z in 0..n {
            for y in 0..n {
                for x in 0..n {
                    let d2 = (y as f64 - 2.0).powi(2) + (z as f64 - 2.0).powi(2);
                    ridge.set(x, y, z, 0, (-d2 / 2.0).exp() as f32);
                }
            }
        }
        assert!(!detector.passes_edge_check(&ridge, 2, 2, 2));
    }

    #[test]
    fn test_orientation_frame_is_right_handed() {
        let n = 9;
        let mut vol = Volume::new(n, n, n, 1).unwrap();
        // Anisotropic blob: strongest variation along x, then y, then z
        for z in 0..n {
            for y in 0..n {
                for x in 0..n {
                    let d2 = (x as f64 - 4.0).powi(2) / 1.0
                        + (y as f64 - 4.0).powi(2) / 4.0
                        + (z as f64 - 4.0).powi(2) / 9.0;
                    vol.set(x, y, z, 0, (-d2 / 2.0).exp() as f32);
                }
            }
        }

        let r = assign_orientation(&vol, 4.0, 4.0, 4.0, 2.0).unwrap();
        assert!((det3(&r) - 1.0).abs() < 1e-6, "frame must be right-handed");

        // Columns orthonormal
        for j in 0..3 {
            let norm: f64 = (0..3).map(|i| r[i][j] * r[i][j]).sum();
            assert!((norm - 1.0).abs() < 1e-6);
        }
        let dot01: f64 = (0..3).map(|i| r[i][0] * r[i][1]).sum();
        assert!(dot01.abs() < 1e-6);
    }

    #[test]
    fn test_orientation_rejects_flat_region() {
        let vol = Volume::from_raw(vec![0.3; 9 * 9 * 9], 9, 9, 9, 1).unwrap();
        assert!(assign_orientation(&vol, 4.0, 4.0, 4.0, 2.0).is_none());
    }
}
