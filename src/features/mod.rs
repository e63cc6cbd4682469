pub mod descriptor;
pub mod detector;
pub mod keypoints;
pub mod matching;

pub use descriptor::{Descriptor, DescriptorExtractor, DescriptorStore};
pub use detector::KeypointDetector;
pub use keypoints::{Keypoint, KeypointStore};
pub use matching::{DescriptorMatch, Matcher};
