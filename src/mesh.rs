use std::collections::HashMap;

use crate::core::matrix::{invert3, mat3_vec};
use crate::core::types::Point3d;
use crate::error::{Error, Result};

/// Subdivided icosahedral tessellation of the unit sphere.
///
/// Vertices are unit vectors; faces are spherical triangles indexed into the
/// vertex table. Each subdivision step splits every face into four, pushing
/// edge midpoints onto the sphere, so level `n` has `20·4^n` faces and
/// `10·4^n + 2` vertices.
#[derive(Debug, Clone)]
pub struct IcosahedralMesh {
    vertices: Vec<Point3d>,
    faces: Vec<[usize; 3]>,
    // Per-face inverse of the vertex column matrix, for barycentric lookup
    inv_bases: Vec<[[f64; 3]; 3]>,
}

impl IcosahedralMesh {
    /// Build the tessellation at the given subdivision level
    pub fn new(subdivisions: usize) -> Result<Self> {
        let phi = (1.0 + 5.0f64.sqrt()) / 2.0;

        let mut vertices: Vec<Point3d> = [
            [-1.0, phi, 0.0],
            [1.0, phi, 0.0],
            [-1.0, -phi, 0.0],
            [1.0, -phi, 0.0],
            [0.0, -1.0, phi],
            [0.0, 1.0, phi],
            [0.0, -1.0, -phi],
            [0.0, 1.0, -phi],
            [phi, 0.0, -1.0],
            [phi, 0.0, 1.0],
            [-phi, 0.0, -1.0],
            [-phi, 0.0, 1.0],
        ]
        .iter()
        .map(|v| Point3d::from_array(*v).normalized())
        .collect();

        let mut faces: Vec<[usize; 3]> = vec![
            [0, 11, 5],
            [0, 5, 1],
            [0, 1, 7],
            [0, 7, 10],
            [0, 10, 11],
            [1, 5, 9],
            [5, 11, 4],
            [11, 10, 2],
            [10, 7, 6],
            [7, 1, 8],
            [3, 9, 4],
            [3, 4, 2],
            [3, 2, 6],
            [3, 6, 8],
            [3, 8, 9],
            [4, 9, 5],
            [2, 4, 11],
            [6, 2, 10],
            [8, 6, 7],
            [9, 8, 1],
        ];

        for _ in 0..subdivisions {
            let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();
            let mut next_faces = Vec::with_capacity(faces.len() * 4);

            for face in &faces {
                let [a, b, c] = *face;
                let ab = midpoint(&mut vertices, &mut midpoints, a, b);
                let bc = midpoint(&mut vertices, &mut midpoints, b, c);
                let ca = midpoint(&mut vertices, &mut midpoints, c, a);

                next_faces.push([a, ab, ca]);
                next_faces.push([b, bc, ab]);
                next_faces.push([c, ca, bc]);
                next_faces.push([ab, bc, ca]);
            }

            faces = next_faces;
        }

        let mut inv_bases = Vec::with_capacity(faces.len());
        for face in &faces {
            let basis = [
                [
                    vertices[face[0]].x,
                    vertices[face[1]].x,
                    vertices[face[2]].x,
                ],
                [
                    vertices[face[0]].y,
                    vertices[face[1]].y,
                    vertices[face[2]].y,
                ],
                [
                    vertices[face[0]].z,
                    vertices[face[1]].z,
                    vertices[face[2]].z,
                ],
            ];
            let inv = invert3(&basis)
                .map_err(|_| Error::Numeric("Degenerate tessellation face".to_string()))?;
            inv_bases.push(inv);
        }

        Ok(Self {
            vertices,
            faces,
            inv_bases,
        })
    }

    #[must_use]
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    #[must_use]
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    #[must_use]
    pub fn vertices(&self) -> &[Point3d] {
        &self.vertices
    }

    #[must_use]
    pub fn faces(&self) -> &[[usize; 3]] {
        &self.faces
    }

    /// Locate the spherical triangle containing a direction.
    ///
    /// Returns the face index and the barycentric coordinates of the hit
    /// point, clamped non-negative and normalized to sum 1. The direction
    /// need not be normalized but must be nonzero.
    #[must_use]
    pub fn locate(&self, dir: [f64; 3]) -> Option<(usize, [f64; 3])> {
        if dir[0] == 0.0 && dir[1] == 0.0 && dir[2] == 0.0 {
            return None;
        }

        // The containing face is the one whose barycentric expansion of the
        // direction has no negative component; numerically, take the face
        // maximizing the smallest coordinate.
        let mut best_face = 0;
        let mut best_min = f64::NEG_INFINITY;
        let mut best_bary = [0.0; 3];

        for (idx, inv) in self.inv_bases.iter().enumerate() {
            let b = mat3_vec(inv, &dir);
            let min = b[0].min(b[1]).min(b[2]);
            if min > best_min {
                best_min = min;
                best_face = idx;
                best_bary = b;
                // A fully non-negative expansion is the containing face
                if min >= -1e-12 {
                    break;
                }
            }
        }

        let mut b = [
            best_bary[0].max(0.0),
            best_bary[1].max(0.0),
            best_bary[2].max(0.0),
        ];
        let sum = b[0] + b[1] + b[2];
        if sum <= 0.0 {
            return None;
        }
        for v in &mut b {
            *v /= sum;
        }

        Some((best_face, b))
    }
}

fn midpoint(
    vertices: &mut Vec<Point3d>,
    cache: &mut HashMap<(usize, usize), usize>,
    a: usize,
    b: usize,
) -> usize {
    let key = (a.min(b), a.max(b));
    if let Some(&idx) = cache.get(&key) {
        return idx;
    }

    let mid = ((vertices[a] + vertices[b]) * 0.5).normalized();
    vertices.push(mid);
    let idx = vertices.len() - 1;
    cache.insert(key, idx);
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_icosahedron_counts() {
        let mesh = IcosahedralMesh::new(0).unwrap();
        assert_eq!(mesh.num_vertices(), 12);
        assert_eq!(mesh.num_faces(), 20);
    }

    #[test]
    fn test_subdivision_counts() {
        let mesh = IcosahedralMesh::new(1).unwrap();
        assert_eq!(mesh.num_vertices(), 42);
        assert_eq!(mesh.num_faces(), 80);

        let mesh2 = IcosahedralMesh::new(2).unwrap();
        assert_eq!(mesh2.num_vertices(), 162);
        assert_eq!(mesh2.num_faces(), 320);
    }

    #[test]
    fn test_vertices_unit_length() {
        let mesh = IcosahedralMesh::new(1).unwrap();
        for v in mesh.vertices() {
            assert!((v.norm() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_locate_vertex_direction() {
        let mesh = IcosahedralMesh::new(1).unwrap();

        // A direction straight at a vertex concentrates its barycentric mass there
        let target = mesh.vertices()[7];
        let (face, bary) = mesh.locate(target.to_array()).unwrap();

        let verts = mesh.faces()[face];
        let hit = (0..3)
            .find(|&i| verts[i] == 7)
            .expect("containing face must include the vertex");
        assert!(bary[hit] > 0.99, "expected dominant weight, got {:?}", bary);
    }

    #[test]
    fn test_locate_barycentric_sums_to_one() {
        let mesh = IcosahedralMesh::new(1).unwrap();
        let dirs = [
            [0.3, -0.7, 0.2],
            [1.0, 0.0, 0.0],
            [-0.5, -0.5, -0.5],
            [0.0, 0.0, 1.0],
        ];

        for dir in dirs {
            let (_, bary) = mesh.locate(dir).unwrap();
            let sum: f64 = bary.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9);
            assert!(bary.iter().all(|&b| b >= 0.0));
        }
    }

    #[test]
    fn test_locate_rejects_zero() {
        let mesh = IcosahedralMesh::new(0).unwrap();
        assert!(mesh.locate([0.0, 0.0, 0.0]).is_none());
    }
}
