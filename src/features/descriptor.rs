use crate::error::Result;
use crate::features::keypoints::Keypoint;
use crate::mesh::IcosahedralMesh;
use crate::pyramid::GaussianPyramid;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Spatial bins per axis of the descriptor grid
pub const SPATIAL_BINS: usize = 4;

/// Histogram components are clipped here before renormalization
const CLIP_THRESH: f32 = 0.2;

/// Rotation-normalized local gradient-orientation histogram.
///
/// The histogram is laid out spatial-bin major: entry
/// `((bx·4 + by)·4 + bz)·V + vertex` for a mesh with `V` vertices.
#[derive(Debug, Clone)]
pub struct Descriptor {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub sigma: f64,
    /// Index of the originating keypoint in its store
    pub keypoint: usize,
    pub hist: Vec<f32>,
}

/// Contiguous collection of descriptors sharing one histogram length
pub type DescriptorStore = Vec<Descriptor>;

/// Computes descriptors over a rotated 4x4x4 spatial grid with icosahedral
/// orientation bins
pub struct DescriptorExtractor {
    mesh: IcosahedralMesh,
}

impl DescriptorExtractor {
    pub fn new(subdivisions: usize) -> Result<Self> {
        Ok(Self {
            mesh: IcosahedralMesh::new(subdivisions)?,
        })
    }

    #[must_use]
    pub fn mesh(&self) -> &IcosahedralMesh {
        &self.mesh
    }

    /// Histogram length: `4·4·4 · V` orientation-vertex bins
    #[must_use]
    pub fn descriptor_len(&self) -> usize {
        SPATIAL_BINS * SPATIAL_BINS * SPATIAL_BINS * self.mesh.num_vertices()
    }

    /// Extract a descriptor for every keypoint.
    ///
    /// Keypoints whose support region carries no gradient energy are
    /// dropped silently. Output order follows keypoint order regardless of
    /// thread count.
    pub fn extract(
        &self,
        gss: &GaussianPyramid,
        keypoints: &[Keypoint],
    ) -> Result<DescriptorStore> {
        #[cfg(feature = "rayon")]
        let computed: Vec<Option<Descriptor>> = keypoints
            .par_iter()
            .enumerate()
            .map(|(idx, kp)| self.extract_one(gss, kp, idx))
            .collect();

        #[cfg(not(feature = "rayon"))]
        let computed: Vec<Option<Descriptor>> = keypoints
            .iter()
            .enumerate()
            .map(|(idx, kp)| self.extract_one(gss, kp, idx))
            .collect();

        Ok(computed.into_iter().flatten().collect())
    }

    fn extract_one(
        &self,
        gss: &GaussianPyramid,
        kp: &Keypoint,
        index: usize,
    ) -> Option<Descriptor> {
        let octave = &gss.octaves[kp.octave];

        // Gaussian level nearest to the keypoint scale on the log axis
        let level_idx = kp
            .level
            .round()
            .clamp(0.0, (octave.levels.len() - 1) as f64) as usize;
        let vol = &octave.levels[level_idx];
        let (nx, ny, nz) = vol.dims();

        // Keypoint position in this octave's voxel coordinates
        let factor = 2.0f64.powi(kp.octave as i32 - 1);
        let cx = kp.x / factor;
        let cy = kp.y / factor;
        let cz = kp.z / factor;

        let sigma_rel = gss.sigma0 * 2.0f64.powf(kp.level / gss.num_intervals as f64);
        let r_desc = 3.0f64.sqrt() * 2.0 * sigma_rel;
        let sigma_w = r_desc / 2.0;

        // Circumscribed radius of the rotated sampling cube
        let bound = r_desc * 3.0f64.sqrt();
        let rot = &kp.rotation;

        let num_vertices = self.mesh.num_vertices();
        let mut hist = vec![0.0f32; self.descriptor_len()];

        let lo = |c: f64| (c - bound).ceil() as i64;
        let hi = |c: f64| (c + bound).floor() as i64;

        for pz in lo(cz)..=hi(cz) {
            for py in lo(cy)..=hi(cy) {
                for px in lo(cx)..=hi(cx) {
                    // Samples outside the level contribute nothing
                    if px < 1
                        || py < 1
                        || pz < 1
                        || px as usize >= nx - 1
                        || py as usize >= ny - 1
                        || pz as usize >= nz - 1
                    {
                        continue;
                    }

                    let d = [px as f64 - cx, py as f64 - cy, pz as f64 - cz];

                    // Offset in the keypoint's local frame
                    let u = [
                        rot[0][0] * d[0] + rot[1][0] * d[1] + rot[2][0] * d[2],
                        rot[0][1] * d[0] + rot[1][1] * d[1] + rot[2][1] * d[2],
                        rot[0][2] * d[0] + rot[1][2] * d[1] + rot[2][2] * d[2],
                    ];
                    if u.iter().any(|c| c.abs() >= r_desc) {
                        continue;
                    }

                    let (ux, uy, uz) = (px as usize, py as usize, pz as usize);
                    let g = [
                        f64::from(vol.get(ux + 1, uy, uz, 0) - vol.get(ux - 1, uy, uz, 0)) / 2.0,
                        f64::from(vol.get(ux, uy + 1, uz, 0) - vol.get(ux, uy - 1, uz, 0)) / 2.0,
                        f64::from(vol.get(ux, uy, uz + 1, 0) - vol.get(ux, uy, uz - 1, 0)) / 2.0,
                    ];
                    let rotated = [
                        rot[0][0] * g[0] + rot[1][0] * g[1] + rot[2][0] * g[2],
                        rot[0][1] * g[0] + rot[1][1] * g[1] + rot[2][1] * g[2],
                        rot[0][2] * g[0] + rot[1][2] * g[1] + rot[2][2] * g[2],
                    ];
                    let mag =
                        (rotated[0] * rotated[0] + rotated[1] * rotated[1] + rotated[2] * rotated[2])
                            .sqrt();
                    if mag <= 0.0 {
                        continue;
                    }
                    let dir = [rotated[0] / mag, rotated[1] / mag, rotated[2] / mag];

                    let Some((face, bary)) = self.mesh.locate(dir) else {
                        continue;
                    };
                    let verts = self.mesh.faces()[face];

                    let dist2 = d[0] * d[0] + d[1] * d[1] + d[2] * d[2];
                    let weight = mag * (-dist2 / (2.0 * sigma_w * sigma_w)).exp();

                    // Fractional spatial bin position in [-0.5, 3.5]
                    let b: Vec<f64> = u
                        .iter()
                        .map(|&c| (c + r_desc) / (2.0 * r_desc) * SPATIAL_BINS as f64 - 0.5)
                        .collect();
                    let base: Vec<i64> = b.iter().map(|&c| c.floor() as i64).collect();
                    let frac: Vec<f64> =
                        b.iter().zip(&base).map(|(&c, &i)| c - i as f64).collect();

                    for corner in 0..8 {
                        let ox = corner & 1;
                        let oy = (corner >> 1) & 1;
                        let oz = (corner >> 2) & 1;

                        let bx = base[0] + ox as i64;
                        let by = base[1] + oy as i64;
                        let bz = base[2] + oz as i64;
                        if bx < 0
                            || by < 0
                            || bz < 0
                            || bx >= SPATIAL_BINS as i64
                            || by >= SPATIAL_BINS as i64
                            || bz >= SPATIAL_BINS as i64
                        {
                            continue;
                        }

                        let wx = if ox == 1 { frac[0] } else { 1.0 - frac[0] };
                        let wy = if oy == 1 { frac[1] } else { 1.0 - frac[1] };
                        let wz = if oz == 1 { frac[2] } else { 1.0 - frac[2] };
                        let spatial_w = weight * wx * wy * wz;
                        if spatial_w <= 0.0 {
                            continue;
                        }

                        let spatial = ((bx as usize * SPATIAL_BINS + by as usize)
                            * SPATIAL_BINS
                            + bz as usize)
                            * num_vertices;
                        for (k, &vert) in verts.iter().enumerate() {
                            hist[spatial + vert] += (spatial_w * bary[k]) as f32;
                        }
                    }
                }
            }
        }

        if !normalize_histogram(&mut hist) {
            return None;
        }

        Some(Descriptor {
            x: kp.x,
            y: kp.y,
            z: kp.z,
            sigma: kp.sigma,
            keypoint: index,
            hist,
        })
    }
}

/// L2-normalize, clip each component, renormalize. Returns false for an
/// empty histogram.
fn normalize_histogram(hist: &mut [f32]) -> bool {
    let norm: f32 = hist.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm <= 0.0 {
        return false;
    }

    for val in hist.iter_mut() {
        *val /= norm;
        *val = val.min(CLIP_THRESH);
    }

    let norm2: f32 = hist.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm2 > 0.0 {
        for val in hist.iter_mut() {
            *val /= norm2;
        }
    }

    true
}
