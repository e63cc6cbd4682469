use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{Error, Result};
use crate::registration::transform::SpatialTransform;

/// Consensus-loop parameters
#[derive(Debug, Clone)]
pub struct RansacParams {
    /// Fraction of correspondences that must end up inliers
    pub min_inlier_ratio: f64,
    /// Inlier residual bound in voxels
    pub err_thresh: f64,
    pub num_iter: usize,
    /// Sampler seed; identical seed and input reproduce the result exactly
    pub seed: u64,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            min_inlier_ratio: 0.001,
            err_thresh: 5.0,
            num_iter: 500,
            seed: 0,
        }
    }
}

/// Robust fit result: the refined transform, the consensus set and its
/// mean residual under the refined transform
#[derive(Debug, Clone)]
pub struct RansacFit<T> {
    pub transform: T,
    pub inliers: Vec<usize>,
    pub mean_residual: f64,
}

/// Fit a transform to matched point lists by random sample consensus.
///
/// Each iteration samples a minimal set without replacement, fits a
/// candidate, and scores it by inlier count with mean inlier residual as
/// the tie-break. Candidates that fail to fit are skipped silently. Fails
/// with `InsufficientInliers` when the best consensus set is smaller than
/// `ceil(min_inlier_ratio · N)`.
pub fn fit_transform<T: SpatialTransform>(
    src: &[[f64; 3]],
    dst: &[[f64; 3]],
    params: &RansacParams,
) -> Result<RansacFit<T>> {
    if src.len() != dst.len() {
        return Err(Error::InvalidParameter(
            "Matched point lists must have equal length".to_string(),
        ));
    }

    let n = src.len();
    let m = T::min_samples();
    let required = ((params.min_inlier_ratio * n as f64).ceil() as usize).max(1);

    if n < m {
        return Err(Error::InsufficientInliers {
            found: 0,
            required: required.max(m),
        });
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut best: Option<(usize, f64, T)> = None;

    for _ in 0..params.num_iter {
        let picked = rand::seq::index::sample(&mut rng, n, m);
        let sample_src: Vec<[f64; 3]> = picked.iter().map(|i| src[i]).collect();
        let sample_dst: Vec<[f64; 3]> = picked.iter().map(|i| dst[i]).collect();

        let candidate = match T::fit(&sample_src, &sample_dst) {
            Ok(c) => c,
            Err(_) => continue,
        };

        let (count, mean) = score(&candidate, src, dst, params.err_thresh);
        if count == 0 {
            continue;
        }

        let better = match &best {
            None => true,
            Some((best_count, best_mean, _)) => {
                count > *best_count || (count == *best_count && mean < *best_mean)
            }
        };
        if better {
            best = Some((count, mean, candidate));
        }
    }

    let Some((count, _, candidate)) = best else {
        return Err(Error::InsufficientInliers {
            found: 0,
            required,
        });
    };

    if count < required {
        return Err(Error::InsufficientInliers {
            found: count,
            required,
        });
    }

    let inliers: Vec<usize> = (0..n)
        .filter(|&i| residual(&candidate, src[i], dst[i]) < params.err_thresh)
        .collect();

    // Final polish on the complete consensus set
    let refined = if inliers.len() >= m {
        let in_src: Vec<[f64; 3]> = inliers.iter().map(|&i| src[i]).collect();
        let in_dst: Vec<[f64; 3]> = inliers.iter().map(|&i| dst[i]).collect();
        T::fit(&in_src, &in_dst)?
    } else {
        candidate
    };

    let mean_residual = if inliers.is_empty() {
        0.0
    } else {
        inliers
            .iter()
            .map(|&i| residual(&refined, src[i], dst[i]))
            .sum::<f64>()
            / inliers.len() as f64
    };

    Ok(RansacFit {
        transform: refined,
        inliers,
        mean_residual,
    })
}

fn residual<T: SpatialTransform>(t: &T, src: [f64; 3], dst: [f64; 3]) -> f64 {
    let p = t.apply(src);
    let dx = p[0] - dst[0];
    let dy = p[1] - dst[1];
    let dz = p[2] - dst[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

fn score<T: SpatialTransform>(
    t: &T,
    src: &[[f64; 3]],
    dst: &[[f64; 3]],
    err_thresh: f64,
) -> (usize, f64) {
    let mut count = 0;
    let mut sum = 0.0;
    for (s, d) in src.iter().zip(dst.iter()) {
        let r = residual(t, *s, *d);
        if r < err_thresh {
            count += 1;
            sum += r;
        }
    }
    let mean = if count > 0 { sum / count as f64 } else { f64::MAX };
    (count, mean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::transform::Affine;

    fn grid_points() -> Vec<[f64; 3]> {
        let mut pts = Vec::new();
        for x in 0..4 {
            for y in 0..4 {
                for z in 0..3 {
                    pts.push([x as f64 * 10.0, y as f64 * 10.0, z as f64 * 10.0]);
                }
            }
        }
        pts
    }

    #[test]
    fn test_recovers_transform_with_outliers() {
        let truth = Affine::from_parts(
            [[1.0, 0.05, 0.0], [-0.05, 1.0, 0.0], [0.0, 0.0, 1.0]],
            [2.0, -3.0, 1.0],
        );

        let src = grid_points();
        let mut dst: Vec<[f64; 3]> = src.iter().map(|&p| truth.apply(p)).collect();

        // Corrupt a quarter of the correspondences
        for (i, d) in dst.iter_mut().enumerate() {
            if i % 4 == 0 {
                d[0] += 100.0 + i as f64;
                d[1] -= 50.0;
            }
        }

        let params = RansacParams {
            min_inlier_ratio: 0.5,
            err_thresh: 1.0,
            ..RansacParams::default()
        };
        let fit = fit_transform::<Affine>(&src, &dst, &params).unwrap();

        assert!(fit.inliers.len() >= src.len() * 3 / 4 - 1);
        for (got, want) in fit
            .transform
            .parameters()
            .iter()
            .zip(truth.parameters().iter())
        {
            assert!((got - want).abs() < 1e-6);
        }
    }

    #[test]
    fn test_deterministic_under_fixed_seed() {
        let src = grid_points();
        let mut dst: Vec<[f64; 3]> = src
            .iter()
            .map(|&p| [p[0] + 1.0, p[1] - 2.0, p[2] + 0.5])
            .collect();
        for (i, d) in dst.iter_mut().enumerate() {
            if i % 5 == 0 {
                d[2] += 40.0;
            }
        }

        let params = RansacParams {
            seed: 7,
            ..RansacParams::default()
        };
        let a = fit_transform::<Affine>(&src, &dst, &params).unwrap();
        let b = fit_transform::<Affine>(&src, &dst, &params).unwrap();

        assert_eq!(a.transform.parameters(), b.transform.parameters());
        assert_eq!(a.inliers, b.inliers);
        assert_eq!(a.mean_residual, b.mean_residual);
    }

    #[test]
    fn test_all_noise_fails_threshold() {
        // Deterministic pseudo-noise with no consistent affine structure
        let mut state = 0x2545_f491_4f6c_dd1du64;
        let mut noise = || {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            ((state >> 33) as f64 / (1u64 << 31) as f64) * 200.0 - 100.0
        };

        let src: Vec<[f64; 3]> = (0..40).map(|_| [noise(), noise(), noise()]).collect();
        let dst: Vec<[f64; 3]> = (0..40).map(|_| [noise(), noise(), noise()]).collect();

        let params = RansacParams {
            min_inlier_ratio: 0.5,
            err_thresh: 1.0,
            num_iter: 100,
            ..RansacParams::default()
        };
        match fit_transform::<Affine>(&src, &dst, &params) {
            Err(Error::InsufficientInliers { found, required }) => {
                assert!(found < required);
            }
            other => panic!("expected InsufficientInliers, got {:?}", other.map(|f| f.inliers)),
        }
    }

    #[test]
    fn test_too_few_points() {
        let pts = vec![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]];
        let result = fit_transform::<Affine>(&pts, &pts, &RansacParams::default());
        assert!(matches!(result, Err(Error::InsufficientInliers { .. })));
    }
}
