use crate::core::Volume;
use crate::error::{Error, Result};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Scale-space construction parameters
#[derive(Debug, Clone)]
pub struct PyramidParams {
    /// Nominal blur already present in the input
    pub sigma_n: f64,
    /// Blur at the base level of octave 0
    pub sigma0: f64,
    /// Octave count; values <= 0 select the deepest pyramid whose last
    /// octave keeps every dimension >= 8 voxels
    pub num_octaves: i32,
    /// Sampled intervals per octave doubling
    pub num_intervals: usize,
}

impl Default for PyramidParams {
    fn default() -> Self {
        Self {
            sigma_n: 0.5,
            sigma0: 1.6,
            num_octaves: -1,
            num_intervals: 3,
        }
    }
}

/// One octave: a run of levels sharing a spatial resolution
#[derive(Debug, Clone)]
pub struct Octave {
    pub levels: Vec<Volume>,
    /// Absolute blur per level, `sigma0 · 2^(o + l/num_intervals)`
    pub sigmas: Vec<f64>,
}

/// Gaussian scale space: octaves of progressively blurred volumes
#[derive(Debug, Clone)]
pub struct GaussianPyramid {
    pub octaves: Vec<Octave>,
    pub num_intervals: usize,
    pub sigma0: f64,
}

impl GaussianPyramid {
    #[must_use]
    pub fn num_octaves(&self) -> usize {
        self.octaves.len()
    }

    #[must_use]
    pub fn level(&self, octave: usize, level: usize) -> &Volume {
        &self.octaves[octave].levels[level]
    }

    #[must_use]
    pub fn sigma(&self, octave: usize, level: usize) -> f64 {
        self.octaves[octave].sigmas[level]
    }
}

/// Difference-of-Gaussians pyramid, one fewer level per octave than its GSS
#[derive(Debug, Clone)]
pub struct DogPyramid {
    pub octaves: Vec<Octave>,
    pub num_intervals: usize,
}

impl DogPyramid {
    #[must_use]
    pub fn level(&self, octave: usize, level: usize) -> &Volume {
        &self.octaves[octave].levels[level]
    }
}

/// Build the Gaussian scale space of a single-channel volume.
///
/// The input is first upsampled 2x per axis (its assumed blur becomes
/// `2·sigma_n`), brought to `sigma0`, then blurred incrementally so level
/// `l` of octave `o` carries absolute blur `sigma0 · 2^(o + l/num_intervals)`.
/// Each octave holds `num_intervals + 3` levels; the next octave starts from
/// the level at index `num_intervals`, decimated by stride 2.
pub fn build_gaussian_pyramid(base: &Volume, params: &PyramidParams) -> Result<GaussianPyramid> {
    if base.nc() != 1 {
        return Err(Error::InvalidParameter(
            "Scale space requires a single-channel volume".to_string(),
        ));
    }
    if params.num_intervals == 0 {
        return Err(Error::InvalidParameter(
            "num_intervals must be at least 1".to_string(),
        ));
    }

    let upsampled = upsample2x(base)?;

    let num_octaves = if params.num_octaves > 0 {
        params.num_octaves as usize
    } else {
        auto_octave_count(upsampled.min_dim())
    };

    // Bring the upsampled input (blur 2·sigma_n) to sigma0
    let initial = (params.sigma0 * params.sigma0
        - 4.0 * params.sigma_n * params.sigma_n)
        .max(0.0)
        .sqrt();
    let mut current = if initial > 1e-6 {
        gaussian_blur(&upsampled, initial)?
    } else {
        upsampled
    };

    let num_levels = params.num_intervals + 3;
    let k = 2.0f64.powf(1.0 / params.num_intervals as f64);

    let mut octaves = Vec::with_capacity(num_octaves);
    for octave in 0..num_octaves {
        let mut levels = Vec::with_capacity(num_levels);
        levels.push(current);

        for l in 1..num_levels {
            let sigma_inc =
                params.sigma0 * k.powi(l as i32 - 1) * (k * k - 1.0).sqrt();
            let next = gaussian_blur(&levels[l - 1], sigma_inc)?;
            levels.push(next);
        }

        // The level at num_intervals carries twice the octave base blur
        current = if octave + 1 < num_octaves {
            downsample2x(&levels[params.num_intervals])?
        } else {
            Volume::default()
        };

        let sigmas = (0..num_levels)
            .map(|l| {
                params.sigma0
                    * 2.0f64.powf(octave as f64 + l as f64 / params.num_intervals as f64)
            })
            .collect();

        octaves.push(Octave { levels, sigmas });
    }

    Ok(GaussianPyramid {
        octaves,
        num_intervals: params.num_intervals,
        sigma0: params.sigma0,
    })
}

/// Build the DoG pyramid by voxel-wise subtraction of adjacent GSS levels
pub fn build_dog_pyramid(gss: &GaussianPyramid) -> Result<DogPyramid> {
    let mut octaves = Vec::with_capacity(gss.octaves.len());

    for octave in &gss.octaves {
        let mut levels = Vec::with_capacity(octave.levels.len() - 1);
        let mut sigmas = Vec::with_capacity(octave.levels.len() - 1);

        for l in 0..octave.levels.len() - 1 {
            let a = &octave.levels[l];
            let b = &octave.levels[l + 1];
            let mut diff = a.zeros_like();
            for ((d, &hi), &lo) in diff
                .data_mut()
                .iter_mut()
                .zip(b.data().iter())
                .zip(a.data().iter())
            {
                *d = hi - lo;
            }
            levels.push(diff);
            sigmas.push(octave.sigmas[l]);
        }

        octaves.push(Octave { levels, sigmas });
    }

    Ok(DogPyramid {
        octaves,
        num_intervals: gss.num_intervals,
    })
}

/// Separable Gaussian blur with kernel radius `ceil(3·sigma)` and mirrored
/// boundaries
pub fn gaussian_blur(src: &Volume, sigma: f64) -> Result<Volume> {
    if src.nc() != 1 {
        return Err(Error::InvalidParameter(
            "gaussian_blur requires a single-channel volume".to_string(),
        ));
    }
    if sigma <= 0.0 {
        return Ok(src.clone());
    }

    let kernel = gaussian_kernel(sigma);
    let mut out = convolve_axis(src, &kernel, 0);
    out = convolve_axis(&out, &kernel, 1);
    out = convolve_axis(&out, &kernel, 2);
    Ok(out)
}

fn gaussian_kernel(sigma: f64) -> Vec<f32> {
    let radius = (3.0 * sigma).ceil() as usize;
    let mut kernel = Vec::with_capacity(2 * radius + 1);
    let denom = 2.0 * sigma * sigma;

    let mut sum = 0.0f64;
    for i in 0..2 * radius + 1 {
        let x = i as f64 - radius as f64;
        let w = (-x * x / denom).exp();
        sum += w;
        kernel.push(w);
    }

    kernel.into_iter().map(|w| (w / sum) as f32).collect()
}

/// Mirror an out-of-range coordinate back inside `[0, n)`, repeating the
/// edge sample
#[inline]
fn reflect(mut i: i64, n: usize) -> usize {
    let n = n as i64;
    loop {
        if i < 0 {
            i = -i - 1;
        } else if i >= n {
            i = 2 * n - 1 - i;
        } else {
            return i as usize;
        }
    }
}

fn convolve_axis(src: &Volume, kernel: &[f32], axis: usize) -> Volume {
    let (nx, ny, nz) = src.dims();
    let radius = (kernel.len() / 2) as i64;
    let mut out = src.zeros_like();
    let slice_len = nx * ny;

    let fill_slice = |z: usize, out_slice: &mut [f32]| {
        for y in 0..ny {
            for x in 0..nx {
                let mut acc = 0.0f32;
                for (k, &w) in kernel.iter().enumerate() {
                    let off = k as i64 - radius;
                    let v = match axis {
                        0 => src.get(reflect(x as i64 + off, nx), y, z, 0),
                        1 => src.get(x, reflect(y as i64 + off, ny), z, 0),
                        _ => src.get(x, y, reflect(z as i64 + off, nz), 0),
                    };
                    acc += w * v;
                }
                out_slice[y * nx + x] = acc;
            }
        }
    };

    #[cfg(feature = "rayon")]
    out.data_mut()
        .par_chunks_mut(slice_len)
        .enumerate()
        .for_each(|(z, out_slice)| fill_slice(z, out_slice));

    #[cfg(not(feature = "rayon"))]
    out.data_mut()
        .chunks_mut(slice_len)
        .enumerate()
        .for_each(|(z, out_slice)| fill_slice(z, out_slice));

    out
}

/// Trilinear 2x upsampling per axis
pub fn upsample2x(src: &Volume) -> Result<Volume> {
    let (nx, ny, nz) = src.dims();
    let mut out = Volume::new(nx * 2, ny * 2, nz * 2, 1)?;
    let (ux, uy, uz) = src.spacing();
    out.set_spacing(ux / 2.0, uy / 2.0, uz / 2.0);

    for z in 0..nz * 2 {
        for y in 0..ny * 2 {
            for x in 0..nx * 2 {
                let v = src.sample_trilinear_clamp(
                    x as f64 / 2.0,
                    y as f64 / 2.0,
                    z as f64 / 2.0,
                    0,
                );
                out.set(x, y, z, 0, v);
            }
        }
    }
    Ok(out)
}

/// Stride-2 decimation, no additional blur
pub fn downsample2x(src: &Volume) -> Result<Volume> {
    let (nx, ny, nz) = src.dims();
    let (mx, my, mz) = ((nx / 2).max(1), (ny / 2).max(1), (nz / 2).max(1));
    let mut out = Volume::new(mx, my, mz, 1)?;
    let (ux, uy, uz) = src.spacing();
    out.set_spacing(ux * 2.0, uy * 2.0, uz * 2.0);

    for z in 0..mz {
        for y in 0..my {
            for x in 0..mx {
                out.set(x, y, z, 0, src.get(x * 2, y * 2, z * 2, 0));
            }
        }
    }
    Ok(out)
}

fn auto_octave_count(upsampled_min_dim: usize) -> usize {
    let mut count = 1;
    let mut dim = upsampled_min_dim;
    while dim / 2 >= 8 {
        dim /= 2;
        count += 1;
    }
    count
}
