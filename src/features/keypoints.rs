/// A scale- and orientation-tagged interest point.
///
/// Coordinates live in the base image frame (the input volume before the
/// pyramid's initial 2x upsampling). The rotation matrix holds the dominant
/// local frame as columns and is orthonormal and right-handed.
#[derive(Debug, Clone)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Octave the point was detected in
    pub octave: usize,
    /// Fractional sub-level index within the octave
    pub level: f64,
    /// Absolute scale: `sigma0 · 2^(octave + level/num_intervals)`
    pub sigma: f64,
    /// Dominant local frame, columns are the frame axes
    pub rotation: [[f64; 3]; 3],
    /// DoG magnitude at detection
    pub response: f32,
}

impl Keypoint {
    #[must_use]
    pub fn position(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

/// Append-only collection of detected keypoints
pub type KeypointStore = Vec<Keypoint>;
