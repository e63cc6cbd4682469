use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pyramid::PyramidParams;
use crate::registration::ransac::RansacParams;

/// Recognized registration options.
///
/// Every field has a documented default; unknown keys in a configuration
/// file are rejected as configuration errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistrationConfig {
    /// Minimum absolute DoG response for a keypoint, on the [0, 1] scale
    pub peak_thresh: f64,
    /// Principal-curvature ratio bound of the edge test
    pub edge_thresh: f64,
    /// Sampled intervals per octave doubling
    pub num_intervals: usize,
    /// Octave count; values <= 0 select automatically
    pub num_octaves: i32,
    /// Blur at the base level of octave 0
    pub sigma0: f64,
    /// Nominal blur assumed in the input
    pub sigma_n: f64,
    /// Nearest-neighbor ratio-test threshold
    pub nn_thresh: f32,
    /// Fraction of matches that must end up RANSAC inliers
    pub min_inlier_ratio: f64,
    /// Inlier residual bound in voxels
    pub err_thresh: f64,
    /// Consensus iterations
    pub num_iter: usize,
    /// Subdivision level of the orientation tessellation
    pub icosahedron_subdivisions: usize,
    /// Consensus sampler seed
    pub seed: u64,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            peak_thresh: 0.04,
            edge_thresh: 10.0,
            num_intervals: 3,
            num_octaves: -1,
            sigma0: 1.6,
            sigma_n: 0.5,
            nn_thresh: 0.8,
            min_inlier_ratio: 0.001,
            err_thresh: 5.0,
            num_iter: 500,
            icosahedron_subdivisions: 1,
            seed: 0,
        }
    }
}

impl RegistrationConfig {
    /// Load from a TOML file; missing keys take their defaults
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::IoRead(format!("{}: {}", path.as_ref().display(), e))
        })?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| Error::InvalidParameter(format!("Configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.peak_thresh < 0.0 {
            return Err(Error::InvalidParameter(
                "peak_thresh must be non-negative".to_string(),
            ));
        }
        if self.edge_thresh <= 0.0 {
            return Err(Error::InvalidParameter(
                "edge_thresh must be positive".to_string(),
            ));
        }
        if self.num_intervals == 0 {
            return Err(Error::InvalidParameter(
                "num_intervals must be at least 1".to_string(),
            ));
        }
        if self.sigma0 <= 0.0 || self.sigma_n < 0.0 {
            return Err(Error::InvalidParameter(
                "sigma0 must be positive and sigma_n non-negative".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.nn_thresh) {
            return Err(Error::InvalidParameter(
                "nn_thresh must lie in [0, 1]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_inlier_ratio) {
            return Err(Error::InvalidParameter(
                "min_inlier_ratio must lie in [0, 1]".to_string(),
            ));
        }
        if self.err_thresh <= 0.0 {
            return Err(Error::InvalidParameter(
                "err_thresh must be positive".to_string(),
            ));
        }
        if self.num_iter == 0 {
            return Err(Error::InvalidParameter(
                "num_iter must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn pyramid_params(&self) -> PyramidParams {
        PyramidParams {
            sigma_n: self.sigma_n,
            sigma0: self.sigma0,
            num_octaves: self.num_octaves,
            num_intervals: self.num_intervals,
        }
    }

    #[must_use]
    pub fn ransac_params(&self) -> RansacParams {
        RansacParams {
            min_inlier_ratio: self.min_inlier_ratio,
            err_thresh: self.err_thresh,
            num_iter: self.num_iter,
            seed: self.seed,
        }
    }
}
