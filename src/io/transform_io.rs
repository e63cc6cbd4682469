use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};
use crate::registration::transform::Affine;

/// Write an affine transform as 3x4 row-major whitespace-separated ASCII,
/// one row per line
pub fn write_affine<P: AsRef<Path>>(path: P, transform: &Affine) -> Result<()> {
    let path = path.as_ref();
    let mut file =
        File::create(path).map_err(|e| Error::IoWrite(format!("{}: {}", path.display(), e)))?;

    for row in &transform.m {
        writeln!(file, "{} {} {} {}", row[0], row[1], row[2], row[3])
            .map_err(|e| Error::IoWrite(format!("{}: {}", path.display(), e)))?;
    }
    Ok(())
}

/// Read an affine transform written by [`write_affine`]
pub fn read_affine<P: AsRef<Path>>(path: P) -> Result<Affine> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::IoRead(format!("{}: {}", path.display(), e)))?;

    let values: Vec<f64> = text
        .split_whitespace()
        .map(str::parse)
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| Error::UnsupportedFormat("Malformed transform file".to_string()))?;

    if values.len() != 12 {
        return Err(Error::UnsupportedFormat(format!(
            "Transform file must hold 12 values, found {}",
            values.len()
        )));
    }

    let mut m = [[0.0; 4]; 3];
    for (i, row) in m.iter_mut().enumerate() {
        row.copy_from_slice(&values[4 * i..4 * i + 4]);
    }
    Ok(Affine::new(m))
}
