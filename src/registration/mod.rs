pub mod ransac;
pub mod transform;

pub use ransac::{fit_transform, RansacFit, RansacParams};
pub use transform::{Affine, SpatialTransform};

use tracing::{debug, info};

use crate::config::RegistrationConfig;
use crate::core::Volume;
use crate::error::Result;
use crate::features::{DescriptorExtractor, DescriptorStore, KeypointDetector, KeypointStore, Matcher};
use crate::pyramid::{build_dog_pyramid, build_gaussian_pyramid};

/// Keypoints and descriptors extracted from one volume
#[derive(Debug)]
pub struct VolumeFeatures {
    pub keypoints: KeypointStore,
    pub descriptors: DescriptorStore,
}

/// Summary counters from an end-to-end registration
#[derive(Debug, Clone)]
pub struct RegistrationReport {
    pub keypoints_source: usize,
    pub keypoints_reference: usize,
    pub matches: usize,
    pub inliers: usize,
    pub mean_residual: f64,
}

/// Detect and describe keypoints in a volume.
///
/// Multi-channel input is reduced to channel 0. The scale-space pyramids
/// are released before this returns; features carry no references into
/// them.
pub fn extract_features(
    volume: &Volume,
    config: &RegistrationConfig,
) -> Result<VolumeFeatures> {
    config.validate()?;

    let channel = if volume.nc() == 1 {
        volume.clone()
    } else {
        volume.extract_channel(0)?
    };

    let gss = build_gaussian_pyramid(&channel, &config.pyramid_params())?;
    let dog = build_dog_pyramid(&gss)?;
    debug!(octaves = gss.num_octaves(), "scale space built");

    let detector = KeypointDetector::new(config.peak_thresh, config.edge_thresh);
    let keypoints = detector.detect(&gss, &dog)?;
    drop(dog);

    let extractor = DescriptorExtractor::new(config.icosahedron_subdivisions)?;
    let descriptors = extractor.extract(&gss, &keypoints)?;
    debug!(
        keypoints = keypoints.len(),
        descriptors = descriptors.len(),
        "features extracted"
    );

    Ok(VolumeFeatures {
        keypoints,
        descriptors,
    })
}

/// Register a source volume onto a reference volume.
///
/// Runs the full pipeline: scale space, detection, description, ratio-test
/// matching with cross-check, and seeded consensus fitting of an affine
/// map from source to reference base-frame coordinates.
pub fn register(
    source: &Volume,
    reference: &Volume,
    config: &RegistrationConfig,
) -> Result<(Affine, RegistrationReport)> {
    let source_features = extract_features(source, config)?;
    let reference_features = extract_features(reference, config)?;

    let matcher = Matcher::new(config.nn_thresh, true);
    let matches = matcher.matches(&source_features.descriptors, &reference_features.descriptors)?;
    debug!(matches = matches.len(), "correspondences kept");

    let src_points: Vec<[f64; 3]> = matches
        .iter()
        .map(|m| {
            let d = &source_features.descriptors[m.src_idx];
            [d.x, d.y, d.z]
        })
        .collect();
    let ref_points: Vec<[f64; 3]> = matches
        .iter()
        .map(|m| {
            let d = &reference_features.descriptors[m.ref_idx];
            [d.x, d.y, d.z]
        })
        .collect();

    let fit = fit_transform::<Affine>(&src_points, &ref_points, &config.ransac_params())?;

    let report = RegistrationReport {
        keypoints_source: source_features.keypoints.len(),
        keypoints_reference: reference_features.keypoints.len(),
        matches: matches.len(),
        inliers: fit.inliers.len(),
        mean_residual: fit.mean_residual,
    };
    info!(
        keypoints_source = report.keypoints_source,
        keypoints_reference = report.keypoints_reference,
        matches = report.matches,
        inliers = report.inliers,
        "registration complete"
    );

    Ok((fit.transform, report))
}
