//! # Volreg
//!
//! A pure Rust engine for 3D keypoint detection, description and
//! volumetric image registration.
//!
//! Given a source and a reference volume, volreg detects scale- and
//! rotation-covariant interest points in a difference-of-Gaussians scale
//! space, describes them with rotation-normalized gradient histograms over
//! an icosahedral orientation tessellation, matches the descriptors, and
//! robustly fits a 3D affine transform aligning source to reference.
//!
//! ## Features
//!
//! - **Core**: dense volume container, small linear algebra, orientation mesh
//! - **Scale space**: Gaussian and DoG pyramids over 3D volumes
//! - **Features**: DoG keypoint detector, descriptor extractor, ratio-test matcher
//! - **Registration**: seeded consensus fitting of affine transforms, resampling
//! - **I/O**: NIFTI-1 volumes and ASCII transform files
//!
//! ## Example
//!
//! ```rust,no_run
//! use volreg::config::RegistrationConfig;
//! use volreg::io::{read_nifti, write_affine};
//! use volreg::registration::register;
//!
//! # fn main() -> volreg::error::Result<()> {
//! let source = read_nifti("source.nii.gz")?;
//! let reference = read_nifti("reference.nii.gz")?;
//!
//! let config = RegistrationConfig::default();
//! let (transform, report) = register(&source, &reference, &config)?;
//! println!("{} inliers of {} matches", report.inliers, report.matches);
//!
//! write_affine("transform.txt", &transform)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod features;
pub mod io;
pub mod mesh;
pub mod pyramid;
pub mod registration;
pub mod resample;

pub mod prelude {
    //! Convenience module that re-exports commonly used items
    pub use crate::config::RegistrationConfig;
    pub use crate::core::{Matrix, Point3d, Point3f, Volume};
    pub use crate::error::{Error, Result};
    pub use crate::features::{
        Descriptor, DescriptorExtractor, Keypoint, KeypointDetector, Matcher,
    };
    pub use crate::registration::{register, Affine, SpatialTransform};
}
