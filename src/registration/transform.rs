use crate::core::matrix::{invert3, mat3_vec, Matrix};
use crate::error::{Error, Result};

/// Capability set shared by parametric spatial transform families.
///
/// The consensus fitter is generic over this trait; adding a new family
/// means implementing it and nothing else.
pub trait SpatialTransform: Sized {
    /// Correspondences needed for a stable minimal fit
    fn min_samples() -> usize;

    /// Map a point through the transform
    fn apply(&self, p: [f64; 3]) -> [f64; 3];

    /// Inverse map; fails on a singular transform
    fn inverse(&self) -> Result<Self>;

    /// Flattened parameter vector
    fn parameters(&self) -> Vec<f64>;

    /// Spatial Jacobian at a point
    fn jacobian(&self, p: [f64; 3]) -> [[f64; 3]; 3];

    /// Least-squares fit mapping `src` points onto `dst` points
    fn fit(src: &[[f64; 3]], dst: &[[f64; 3]]) -> Result<Self>;
}

/// 3D affine transform `y = A·x + t`, stored as the 3x4 matrix `[A | t]`
#[derive(Debug, Clone, PartialEq)]
pub struct Affine {
    pub m: [[f64; 4]; 3],
}

impl Affine {
    #[must_use]
    pub fn identity() -> Self {
        Self {
            m: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
            ],
        }
    }

    #[must_use]
    pub fn new(m: [[f64; 4]; 3]) -> Self {
        Self { m }
    }

    #[must_use]
    pub fn from_parts(linear: [[f64; 3]; 3], translation: [f64; 3]) -> Self {
        let mut m = [[0.0; 4]; 3];
        for i in 0..3 {
            m[i][..3].copy_from_slice(&linear[i]);
            m[i][3] = translation[i];
        }
        Self { m }
    }

    /// The linear part A
    #[must_use]
    pub fn linear(&self) -> [[f64; 3]; 3] {
        let mut a = [[0.0; 3]; 3];
        for i in 0..3 {
            a[i].copy_from_slice(&self.m[i][..3]);
        }
        a
    }

    /// The translation part t
    #[must_use]
    pub fn translation(&self) -> [f64; 3] {
        [self.m[0][3], self.m[1][3], self.m[2][3]]
    }

    /// Pure translation transform
    #[must_use]
    pub fn from_translation(t: [f64; 3]) -> Self {
        let mut out = Self::identity();
        for i in 0..3 {
            out.m[i][3] = t[i];
        }
        out
    }

    /// Rotation about the z axis by an angle in radians, about the origin
    #[must_use]
    pub fn rotation_z(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self::from_parts(
            [[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]],
            [0.0, 0.0, 0.0],
        )
    }
}

impl SpatialTransform for Affine {
    fn min_samples() -> usize {
        // Three correspondences would determine an affine map; a fourth
        // guards against coplanar degeneracy in the least-squares fit
        4
    }

    fn apply(&self, p: [f64; 3]) -> [f64; 3] {
        let a = self.linear();
        let lin = mat3_vec(&a, &p);
        [
            lin[0] + self.m[0][3],
            lin[1] + self.m[1][3],
            lin[2] + self.m[2][3],
        ]
    }

    fn inverse(&self) -> Result<Self> {
        let a_inv = invert3(&self.linear())?;
        let t = self.translation();
        let t_inv = mat3_vec(&a_inv, &t);
        Ok(Self::from_parts(a_inv, [-t_inv[0], -t_inv[1], -t_inv[2]]))
    }

    fn parameters(&self) -> Vec<f64> {
        self.m.iter().flatten().copied().collect()
    }

    fn jacobian(&self, _p: [f64; 3]) -> [[f64; 3]; 3] {
        self.linear()
    }

    fn fit(src: &[[f64; 3]], dst: &[[f64; 3]]) -> Result<Self> {
        if src.len() != dst.len() {
            return Err(Error::InvalidParameter(
                "Point lists must have equal length".to_string(),
            ));
        }
        if src.len() < Self::min_samples() {
            return Err(Error::Numeric(format!(
                "Affine fit needs at least {} correspondences, got {}",
                Self::min_samples(),
                src.len()
            )));
        }

        // Solve the overdetermined system [x y z 1]·W = dst per output axis
        let design: Vec<Vec<f64>> = src
            .iter()
            .map(|p| vec![p[0], p[1], p[2], 1.0])
            .collect();
        let rhs: Vec<Vec<f64>> = dst.iter().map(|p| p.to_vec()).collect();

        let design = Matrix::from_rows(&design)?;
        let rhs = Matrix::from_rows(&rhs)?;
        let w = design.lstsq(&rhs)?;

        let mut m = [[0.0; 4]; 3];
        for (i, row) in m.iter_mut().enumerate() {
            for j in 0..3 {
                row[j] = w.get(j, i);
            }
            row[3] = w.get(3, i);
        }
        Ok(Self { m })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_apply() {
        let t = Affine::identity();
        assert_eq!(t.apply([1.0, 2.0, 3.0]), [1.0, 2.0, 3.0]);
        assert_eq!(t.jacobian([0.0; 3]), [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
    }

    #[test]
    fn test_inverse_round_trip() {
        let t = Affine::from_parts(
            [[2.0, 0.0, 0.0], [0.0, 1.0, 0.5], [0.0, 0.0, 1.0]],
            [3.0, -1.0, 2.0],
        );
        let inv = t.inverse().unwrap();

        let p = [1.5, -2.0, 4.0];
        let back = inv.apply(t.apply(p));
        for i in 0..3 {
            assert!((back[i] - p[i]).abs() < 1e-10);
        }
    }

    #[test]
    fn test_singular_inverse_fails() {
        let t = Affine::from_parts(
            [[1.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 0.0, 1.0]],
            [0.0; 3],
        );
        assert!(t.inverse().is_err());
    }

    #[test]
    fn test_parameters_layout() {
        let t = Affine::from_translation([1.0, 2.0, 3.0]);
        let p = t.parameters();
        assert_eq!(p.len(), 12);
        assert_eq!(p[3], 1.0);
        assert_eq!(p[7], 2.0);
        assert_eq!(p[11], 3.0);
    }

    #[test]
    fn test_fit_recovers_known_transform() {
        let truth = Affine::from_parts(
            [[0.9, 0.1, 0.0], [-0.1, 1.1, 0.05], [0.0, 0.02, 0.95]],
            [4.0, -2.5, 1.0],
        );

        let src: Vec<[f64; 3]> = vec![
            [0.0, 0.0, 0.0],
            [10.0, 0.0, 0.0],
            [0.0, 10.0, 0.0],
            [0.0, 0.0, 10.0],
            [5.0, 7.0, 3.0],
            [-4.0, 2.0, 8.0],
        ];
        let dst: Vec<[f64; 3]> = src.iter().map(|&p| truth.apply(p)).collect();

        let fitted = Affine::fit(&src, &dst).unwrap();
        for (got, want) in fitted.parameters().iter().zip(truth.parameters().iter()) {
            assert!((got - want).abs() < 1e-8, "fitted {} vs true {}", got, want);
        }
    }

    #[test]
    fn test_fit_underdetermined_fails() {
        let pts = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        assert!(Affine::fit(&pts, &pts).is_err());
    }

    #[test]
    fn test_rotation_z_preserves_z() {
        let rot = Affine::rotation_z(std::f64::consts::FRAC_PI_2);
        let p = rot.apply([1.0, 0.0, 5.0]);
        assert!((p[0]).abs() < 1e-12);
        assert!((p[1] - 1.0).abs() < 1e-12);
        assert!((p[2] - 5.0).abs() < 1e-12);
    }
}
