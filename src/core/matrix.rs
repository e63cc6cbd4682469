use crate::error::{Error, Result};

/// Small dense row-major matrix of f64
///
/// Covers the solver needs of the registration core: square systems up to
/// 4x4, least squares through a Jacobi SVD, and symmetric 3x3 eigenpairs.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    #[must_use]
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    #[must_use]
    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m.set(i, i, 1.0);
        }
        m
    }

    /// Build from row slices; rows must share one length
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let nrows = rows.len();
        let ncols = rows.first().map_or(0, Vec::len);
        if nrows == 0 || ncols == 0 {
            return Err(Error::InvalidDimensions("Empty matrix".to_string()));
        }

        let mut m = Self::zeros(nrows, ncols);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != ncols {
                return Err(Error::InvalidDimensions(
                    "Ragged rows in matrix constructor".to_string(),
                ));
            }
            for (j, &v) in row.iter().enumerate() {
                m.set(i, j, v);
            }
        }
        Ok(m)
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    #[must_use]
    pub fn get(&self, r: usize, c: usize) -> f64 {
        self.data[r * self.cols + c]
    }

    #[inline]
    pub fn set(&mut self, r: usize, c: usize, v: f64) {
        self.data[r * self.cols + c] = v;
    }

    #[must_use]
    pub fn transpose(&self) -> Self {
        let mut out = Self::zeros(self.cols, self.rows);
        for r in 0..self.rows {
            for c in 0..self.cols {
                out.set(c, r, self.get(r, c));
            }
        }
        out
    }

    pub fn matmul(&self, other: &Matrix) -> Result<Matrix> {
        if self.cols != other.rows {
            return Err(Error::InvalidDimensions(format!(
                "Cannot multiply {}x{} by {}x{}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }

        let mut out = Matrix::zeros(self.rows, other.cols);
        for i in 0..self.rows {
            for k in 0..self.cols {
                let a = self.get(i, k);
                if a == 0.0 {
                    continue;
                }
                for j in 0..other.cols {
                    out.set(i, j, out.get(i, j) + a * other.get(k, j));
                }
            }
        }
        Ok(out)
    }

    /// Solve the square system `self * x = b` by Gaussian elimination
    /// with partial pivoting
    pub fn solve(&self, b: &[f64]) -> Result<Vec<f64>> {
        let n = self.rows;
        if self.cols != n || b.len() != n {
            return Err(Error::InvalidDimensions(
                "solve requires a square system".to_string(),
            ));
        }

        let mut a = self.data.clone();
        let mut x = b.to_vec();

        for col in 0..n {
            // Pivot selection
            let mut pivot = col;
            for r in col + 1..n {
                if a[r * n + col].abs() > a[pivot * n + col].abs() {
                    pivot = r;
                }
            }
            if a[pivot * n + col].abs() < 1e-12 {
                return Err(Error::Numeric("Singular linear system".to_string()));
            }
            if pivot != col {
                for c in 0..n {
                    a.swap(col * n + c, pivot * n + c);
                }
                x.swap(col, pivot);
            }

            let diag = a[col * n + col];
            for r in col + 1..n {
                let factor = a[r * n + col] / diag;
                if factor == 0.0 {
                    continue;
                }
                for c in col..n {
                    a[r * n + c] -= factor * a[col * n + c];
                }
                x[r] -= factor * x[col];
            }
        }

        for col in (0..n).rev() {
            let mut sum = x[col];
            for c in col + 1..n {
                sum -= a[col * n + c] * x[c];
            }
            x[col] = sum / a[col * n + col];
        }

        Ok(x)
    }

    /// Thin SVD `A = U·diag(s)·Vᵀ` by one-sided Jacobi rotations.
    ///
    /// Requires rows >= cols. U is rows x cols with orthonormal columns,
    /// V is cols x cols, singular values are sorted descending.
    pub fn svd(&self) -> Result<(Matrix, Vec<f64>, Matrix)> {
        let m = self.rows;
        let n = self.cols;
        if m < n {
            return Err(Error::InvalidDimensions(
                "svd requires rows >= cols".to_string(),
            ));
        }

        let mut u = self.clone();
        let mut v = Matrix::identity(n);

        for _sweep in 0..60 {
            let mut converged = true;

            for p in 0..n {
                for q in p + 1..n {
                    let mut alpha = 0.0;
                    let mut beta = 0.0;
                    let mut gamma = 0.0;
                    for i in 0..m {
                        let up = u.get(i, p);
                        let uq = u.get(i, q);
                        alpha += up * up;
                        beta += uq * uq;
                        gamma += up * uq;
                    }

                    if gamma.abs() <= 1e-14 * (alpha * beta).sqrt() {
                        continue;
                    }
                    converged = false;

                    let zeta = (beta - alpha) / (2.0 * gamma);
                    let t = zeta.signum() / (zeta.abs() + (1.0 + zeta * zeta).sqrt());
                    let c = 1.0 / (1.0 + t * t).sqrt();
                    let s = c * t;

                    for i in 0..m {
                        let up = u.get(i, p);
                        let uq = u.get(i, q);
                        u.set(i, p, c * up - s * uq);
                        u.set(i, q, s * up + c * uq);
                    }
                    for i in 0..n {
                        let vp = v.get(i, p);
                        let vq = v.get(i, q);
                        v.set(i, p, c * vp - s * vq);
                        v.set(i, q, s * vp + c * vq);
                    }
                }
            }

            if converged {
                break;
            }
        }

        // Column norms are the singular values
        let mut order: Vec<usize> = (0..n).collect();
        let mut sigma = vec![0.0; n];
        for (j, s) in sigma.iter_mut().enumerate() {
            let mut sum = 0.0;
            for i in 0..m {
                sum += u.get(i, j) * u.get(i, j);
            }
            *s = sum.sqrt();
        }
        order.sort_by(|&a, &b| sigma[b].partial_cmp(&sigma[a]).unwrap());

        let mut u_sorted = Matrix::zeros(m, n);
        let mut v_sorted = Matrix::zeros(n, n);
        let mut s_sorted = vec![0.0; n];
        for (dst, &src) in order.iter().enumerate() {
            s_sorted[dst] = sigma[src];
            let inv = if sigma[src] > 1e-300 { 1.0 / sigma[src] } else { 0.0 };
            for i in 0..m {
                u_sorted.set(i, dst, u.get(i, src) * inv);
            }
            for i in 0..n {
                v_sorted.set(i, dst, v.get(i, src));
            }
        }

        Ok((u_sorted, s_sorted, v_sorted))
    }

    /// Least-squares solution of `self * X = B` via the SVD pseudoinverse
    pub fn lstsq(&self, b: &Matrix) -> Result<Matrix> {
        if b.rows != self.rows {
            return Err(Error::InvalidDimensions(
                "Right-hand side row count mismatch".to_string(),
            ));
        }

        let (u, s, v) = self.svd()?;
        let rank_tol = s.first().copied().unwrap_or(0.0) * 1e-10;
        if s.first().copied().unwrap_or(0.0) <= 0.0 {
            return Err(Error::Numeric("Zero system in least squares".to_string()));
        }

        // X = V * diag(1/s) * Uᵀ * B
        let utb = u.transpose().matmul(b)?;
        let mut scaled = utb;
        for r in 0..scaled.rows {
            let f = if s[r] > rank_tol { 1.0 / s[r] } else { 0.0 };
            for c in 0..scaled.cols {
                scaled.set(r, c, scaled.get(r, c) * f);
            }
        }
        v.matmul(&scaled)
    }
}

/// Eigenvalues and eigenvectors of a symmetric 3x3 matrix by cyclic Jacobi.
///
/// Returns values sorted descending with eigenvectors as the columns of the
/// second result (`vecs[i][j]` is component i of eigenvector j).
#[must_use]
pub fn eigen_symmetric3(mat: &[[f64; 3]; 3]) -> ([f64; 3], [[f64; 3]; 3]) {
    let mut a = *mat;
    let mut v = [[0.0; 3]; 3];
    for (i, row) in v.iter_mut().enumerate() {
        row[i] = 1.0;
    }

    for _sweep in 0..50 {
        let off = a[0][1] * a[0][1] + a[0][2] * a[0][2] + a[1][2] * a[1][2];
        if off < 1e-30 {
            break;
        }

        for &(p, q) in &[(0usize, 1usize), (0, 2), (1, 2)] {
            let apq = a[p][q];
            if apq.abs() < 1e-30 {
                continue;
            }

            let theta = (a[q][q] - a[p][p]) / (2.0 * apq);
            let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
            let c = 1.0 / (t * t + 1.0).sqrt();
            let s = t * c;

            a[p][p] -= t * apq;
            a[q][q] += t * apq;
            a[p][q] = 0.0;
            a[q][p] = 0.0;

            for r in 0..3 {
                if r == p || r == q {
                    continue;
                }
                let arp = a[r][p];
                let arq = a[r][q];
                a[r][p] = c * arp - s * arq;
                a[p][r] = a[r][p];
                a[r][q] = s * arp + c * arq;
                a[q][r] = a[r][q];
            }

            for row in &mut v {
                let vp = row[p];
                let vq = row[q];
                row[p] = c * vp - s * vq;
                row[q] = s * vp + c * vq;
            }
        }
    }

    let mut vals = [a[0][0], a[1][1], a[2][2]];
    let mut order = [0usize, 1, 2];
    order.sort_by(|&i, &j| vals[j].partial_cmp(&vals[i]).unwrap());

    let sorted_vals = [vals[order[0]], vals[order[1]], vals[order[2]]];
    let mut sorted_vecs = [[0.0; 3]; 3];
    for (dst, &src) in order.iter().enumerate() {
        for i in 0..3 {
            sorted_vecs[i][dst] = v[i][src];
        }
    }
    vals = sorted_vals;

    (vals, sorted_vecs)
}

/// Invert a 3x3 matrix via the adjugate
pub fn invert3(m: &[[f64; 3]; 3]) -> Result<[[f64; 3]; 3]> {
    let det = m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0]);

    if det.abs() < 1e-12 {
        return Err(Error::Numeric(
            "Matrix is singular, cannot invert".to_string(),
        ));
    }

    let inv_det = 1.0 / det;

    Ok([
        [
            (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det,
            (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det,
        ],
        [
            (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det,
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det,
        ],
        [
            (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det,
            (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det,
        ],
    ])
}

/// Determinant of a 3x3 matrix
#[must_use]
pub fn det3(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// Multiply a 3x3 matrix by a 3-vector
#[must_use]
pub fn mat3_vec(m: &[[f64; 3]; 3], v: &[f64; 3]) -> [f64; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}
