use crate::error::{Error, Result};
use ndarray::Array4;

/// Dense volumetric image: a 4D (x, y, z, channel) buffer of f32 samples
/// with element strides and per-axis voxel spacing in physical units.
///
/// The channel index varies fastest: `index = c + x·nc + y·nc·nx + z·nc·nx·ny`.
#[derive(Debug, Clone, Default)]
pub struct Volume {
    data: Vec<f32>,
    nx: usize,
    ny: usize,
    nz: usize,
    nc: usize,
    ux: f32,
    uy: f32,
    uz: f32,
}

impl Volume {
    /// Create a zero-filled volume with unit voxel spacing
    pub fn new(nx: usize, ny: usize, nz: usize, nc: usize) -> Result<Self> {
        if nx == 0 || ny == 0 || nz == 0 || nc == 0 {
            return Err(Error::InvalidDimensions(
                "Volume dimensions must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            data: vec![0.0; nx * ny * nz * nc],
            nx,
            ny,
            nz,
            nc,
            ux: 1.0,
            uy: 1.0,
            uz: 1.0,
        })
    }

    /// Create a volume from an existing buffer in (x, y, z, c) order
    pub fn from_raw(data: Vec<f32>, nx: usize, ny: usize, nz: usize, nc: usize) -> Result<Self> {
        let expected = nx * ny * nz * nc;
        if data.len() != expected {
            return Err(Error::InvalidDimensions(format!(
                "Buffer length {} doesn't match expected {}",
                data.len(),
                expected
            )));
        }

        let mut vol = Self::new(nx, ny, nz, nc)?;
        vol.data = data;
        Ok(vol)
    }

    /// Zero-filled volume with the same geometry as `self`
    #[must_use]
    pub fn zeros_like(&self) -> Self {
        Self {
            data: vec![0.0; self.data.len()],
            ..*self
        }
    }

    pub fn set_spacing(&mut self, ux: f32, uy: f32, uz: f32) {
        self.ux = ux;
        self.uy = uy;
        self.uz = uz;
    }

    #[must_use]
    pub fn spacing(&self) -> (f32, f32, f32) {
        (self.ux, self.uy, self.uz)
    }

    #[must_use]
    pub fn nx(&self) -> usize {
        self.nx
    }

    #[must_use]
    pub fn ny(&self) -> usize {
        self.ny
    }

    #[must_use]
    pub fn nz(&self) -> usize {
        self.nz
    }

    #[must_use]
    pub fn nc(&self) -> usize {
        self.nc
    }

    #[must_use]
    pub fn dims(&self) -> (usize, usize, usize) {
        (self.nx, self.ny, self.nz)
    }

    /// Smallest spatial dimension
    #[must_use]
    pub fn min_dim(&self) -> usize {
        self.nx.min(self.ny).min(self.nz)
    }

    /// Element strides (xs, ys, zs, cs)
    #[must_use]
    pub fn strides(&self) -> (usize, usize, usize, usize) {
        (self.nc, self.nc * self.nx, self.nc * self.nx * self.ny, 1)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    #[inline]
    #[must_use]
    pub fn index(&self, x: usize, y: usize, z: usize, c: usize) -> usize {
        c + self.nc * (x + self.nx * (y + self.ny * z))
    }

    /// Sample value at an integer voxel; panics when out of range
    #[inline]
    #[must_use]
    pub fn get(&self, x: usize, y: usize, z: usize, c: usize) -> f32 {
        self.data[self.index(x, y, z, c)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, z: usize, c: usize, value: f32) {
        let idx = self.index(x, y, z, c);
        self.data[idx] = value;
    }

    /// Whether a signed voxel coordinate lies inside the spatial bounds
    #[inline]
    #[must_use]
    pub fn contains(&self, x: i64, y: i64, z: i64) -> bool {
        x >= 0
            && y >= 0
            && z >= 0
            && (x as usize) < self.nx
            && (y as usize) < self.ny
            && (z as usize) < self.nz
    }

    /// Trilinear interpolation at a continuous position; 0 outside the volume
    #[must_use]
    pub fn sample_trilinear(&self, x: f64, y: f64, z: f64, c: usize) -> f32 {
        if self.is_empty()
            || x < 0.0
            || y < 0.0
            || z < 0.0
            || x > (self.nx - 1) as f64
            || y > (self.ny - 1) as f64
            || z > (self.nz - 1) as f64
        {
            return 0.0;
        }
        self.trilinear_clamped(x, y, z, c)
    }

    /// Trilinear interpolation with coordinates clamped to the volume bounds
    #[must_use]
    pub fn sample_trilinear_clamp(&self, x: f64, y: f64, z: f64, c: usize) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let x = x.max(0.0).min((self.nx - 1) as f64);
        let y = y.max(0.0).min((self.ny - 1) as f64);
        let z = z.max(0.0).min((self.nz - 1) as f64);
        self.trilinear_clamped(x, y, z, c)
    }

    fn trilinear_clamped(&self, x: f64, y: f64, z: f64, c: usize) -> f32 {
        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let z0 = z.floor() as usize;
        let x1 = (x0 + 1).min(self.nx - 1);
        let y1 = (y0 + 1).min(self.ny - 1);
        let z1 = (z0 + 1).min(self.nz - 1);

        let dx = (x - x0 as f64) as f32;
        let dy = (y - y0 as f64) as f32;
        let dz = (z - z0 as f64) as f32;

        let c000 = self.get(x0, y0, z0, c);
        let c100 = self.get(x1, y0, z0, c);
        let c010 = self.get(x0, y1, z0, c);
        let c110 = self.get(x1, y1, z0, c);
        let c001 = self.get(x0, y0, z1, c);
        let c101 = self.get(x1, y0, z1, c);
        let c011 = self.get(x0, y1, z1, c);
        let c111 = self.get(x1, y1, z1, c);

        let c00 = c000 + (c100 - c000) * dx;
        let c10 = c010 + (c110 - c010) * dx;
        let c01 = c001 + (c101 - c001) * dx;
        let c11 = c011 + (c111 - c011) * dx;

        let c0 = c00 + (c10 - c00) * dy;
        let c1 = c01 + (c11 - c01) * dy;

        c0 + (c1 - c0) * dz
    }

    /// Extract a single channel as a new single-channel volume
    pub fn extract_channel(&self, c: usize) -> Result<Volume> {
        if c >= self.nc {
            return Err(Error::InvalidParameter(format!(
                "Channel {} out of range for {}-channel volume",
                c, self.nc
            )));
        }

        let mut out = Volume::new(self.nx, self.ny, self.nz, 1)?;
        out.set_spacing(self.ux, self.uy, self.uz);
        for z in 0..self.nz {
            for y in 0..self.ny {
                for x in 0..self.nx {
                    out.set(x, y, z, 0, self.get(x, y, z, c));
                }
            }
        }
        Ok(out)
    }

    /// Minimum and maximum sample values
    #[must_use]
    pub fn min_max(&self) -> (f32, f32) {
        let mut lo = f32::INFINITY;
        let mut hi = f32::NEG_INFINITY;
        for &v in &self.data {
            lo = lo.min(v);
            hi = hi.max(v);
        }
        (lo, hi)
    }

    /// Linearly rescale samples to [0, 1]; constant volumes become all zeros
    pub fn normalize(&mut self) {
        let (lo, hi) = self.min_max();
        let range = hi - lo;
        if range <= 0.0 {
            self.data.iter_mut().for_each(|v| *v = 0.0);
            return;
        }
        for v in &mut self.data {
            *v = (*v - lo) / range;
        }
    }

    /// Convert to ndarray for easier manipulation, shape (z, y, x, c)
    pub fn to_array4(&self) -> Result<Array4<f32>> {
        let shape = (self.nz, self.ny, self.nx, self.nc);
        Array4::from_shape_vec(shape, self.data.clone())
            .map_err(|e| Error::InvalidDimensions(e.to_string()))
    }

    /// Create a volume from an ndarray with shape (z, y, x, c)
    pub fn from_array4(arr: Array4<f32>) -> Result<Self> {
        let shape = arr.shape().to_vec();
        let data = arr.into_iter().collect::<Vec<_>>();
        Self::from_raw(data, shape[2], shape[1], shape[0], shape[3])
    }
}
