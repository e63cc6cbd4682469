use crate::core::Volume;
use crate::error::Result;
use crate::registration::transform::SpatialTransform;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Resample a volume through the inverse of a spatial transform.
///
/// Computes `out(x) = src(T⁻¹(x))` with trilinear interpolation; inverse
/// samples outside the source yield 0. Output dimensions and spacing are
/// caller-supplied, never inferred.
pub fn warp_volume<T: SpatialTransform + Sync>(
    src: &Volume,
    transform: &T,
    dims: (usize, usize, usize),
    spacing: (f32, f32, f32),
) -> Result<Volume> {
    let inverse = transform.inverse()?;
    let (nx, ny, nz) = dims;
    let nc = src.nc();

    let mut out = Volume::new(nx, ny, nz, nc)?;
    out.set_spacing(spacing.0, spacing.1, spacing.2);

    let slice_len = nx * ny * nc;
    let fill_slice = |z: usize, out_slice: &mut [f32]| {
        for y in 0..ny {
            for x in 0..nx {
                let p = inverse.apply([x as f64, y as f64, z as f64]);
                for c in 0..nc {
                    out_slice[(y * nx + x) * nc + c] =
                        src.sample_trilinear(p[0], p[1], p[2], c);
                }
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

    Ok(out)
}
