use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::core::Volume;
use crate::error::{Error, Result};

const HEADER_SIZE: i32 = 348;
const DATA_OFFSET: usize = 352;
const DT_INT16: i16 = 4;
const DT_FLOAT32: i16 = 16;
const UNITS_MM: u8 = 2;

fn is_gzipped(path: &Path) -> bool {
    path.extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("gz"))
}

/// Read a NIFTI-1 volume from `.nii` or `.nii.gz`.
///
/// Supports int16 and float32 voxel data in either byte order (detected
/// from the header's dimension count), honors `pixdim`, `vox_offset` and
/// the `scl_slope`/`scl_inter` scaling, and rescales intensities to
/// [0, 1].
pub fn read_nifti<P: AsRef<Path>>(path: P) -> Result<Volume> {
    let path = path.as_ref();
    let file =
        File::open(path).map_err(|e| Error::IoRead(format!("{}: {}", path.display(), e)))?;

    let mut bytes = Vec::new();
    let read = if is_gzipped(path) {
        GzDecoder::new(file).read_to_end(&mut bytes)
    } else {
        BufReader::new(file).read_to_end(&mut bytes)
    };
    read.map_err(|e| Error::IoRead(format!("{}: {}", path.display(), e)))?;

    parse_nifti(&bytes)
}

fn parse_nifti(bytes: &[u8]) -> Result<Volume> {
    if bytes.len() < DATA_OFFSET {
        return Err(Error::UnsupportedFormat(
            "Truncated NIFTI header".to_string(),
        ));
    }

    // Byte order is detected from dim[0], which a valid header keeps in 1..=7
    let big_endian = !(1..=7).contains(&LittleEndian::read_i16(&bytes[40..42]));
    let rd_i16 = |off: usize| -> i16 {
        if big_endian {
            BigEndian::read_i16(&bytes[off..off + 2])
        } else {
            LittleEndian::read_i16(&bytes[off..off + 2])
        }
    };
    let rd_f32 = |off: usize| -> f32 {
        if big_endian {
            BigEndian::read_f32(&bytes[off..off + 4])
        } else {
            LittleEndian::read_f32(&bytes[off..off + 4])
        }
    };

    let magic = &bytes[344..348];
    if magic == &b"ni1\0"[..] {
        return Err(Error::UnsupportedFormat(
            "Detached NIFTI image data (.hdr/.img) is not supported".to_string(),
        ));
    }
    if magic != &b"n+1\0"[..] {
        return Err(Error::UnsupportedFormat(
            "Missing NIFTI-1 magic".to_string(),
        ));
    }

    let ndim = rd_i16(40);
    if !(1..=7).contains(&ndim) {
        return Err(Error::UnsupportedFormat(format!(
            "Bad NIFTI dimension count {ndim}"
        )));
    }

    let dim = |i: usize| -> usize { rd_i16(40 + 2 * i).max(1) as usize };
    let nx = dim(1);
    let ny = dim(2);
    let nz = dim(3);
    let nc = if ndim >= 4 { dim(4) } else { 1 };

    let datatype = rd_i16(70);
    let bytes_per_voxel = match datatype {
        DT_INT16 => 2,
        DT_FLOAT32 => 4,
        other => {
            return Err(Error::UnsupportedFormat(format!(
                "NIFTI datatype {other} (only int16 and float32 are supported)"
            )))
        }
    };

    let spacing = |i: usize| -> f32 {
        let u = rd_f32(76 + 4 * i);
        if u > 0.0 {
            u
        } else {
            1.0
        }
    };
    let (ux, uy, uz) = (spacing(1), spacing(2), spacing(3));

    let offset = (rd_f32(108) as usize).max(DATA_OFFSET);
    let slope = {
        let s = rd_f32(112);
        if s == 0.0 {
            1.0
        } else {
            s
        }
    };
    let inter = rd_f32(116);

    let nvox = nx * ny * nz * nc;
    let end = offset + nvox * bytes_per_voxel;
    if bytes.len() < end {
        return Err(Error::UnsupportedFormat(
            "Truncated NIFTI voxel data".to_string(),
        ));
    }

    let raw = &bytes[offset..end];
    let mut values = Vec::with_capacity(nvox);
    match datatype {
        DT_INT16 => {
            for chunk in raw.chunks_exact(2) {
                let v = if big_endian {
                    BigEndian::read_i16(chunk)
                } else {
                    LittleEndian::read_i16(chunk)
                };
                values.push(f32::from(v) * slope + inter);
            }
        }
        _ => {
            for chunk in raw.chunks_exact(4) {
                let v = if big_endian {
                    BigEndian::read_f32(chunk)
                } else {
                    LittleEndian::read_f32(chunk)
                };
                values.push(v * slope + inter);
            }
        }
    }

    // NIFTI stores x fastest, then y, z, t; our buffer is channel-fastest
    let mut vol = if nc == 1 {
        Volume::from_raw(values, nx, ny, nz, 1)?
    } else {
        let mut vol = Volume::new(nx, ny, nz, nc)?;
        for c in 0..nc {
            for z in 0..nz {
                for y in 0..ny {
                    for x in 0..nx {
                        let src = x + nx * (y + ny * (z + nz * c));
                        vol.set(x, y, z, c, values[src]);
                    }
                }
            }
        }
        vol
    };

    vol.set_spacing(ux, uy, uz);
    vol.normalize();
    Ok(vol)
}

/// Write a volume as float32 NIFTI-1 (`.nii`, gzipped when the path ends
/// in `.gz`), preserving voxel spacing
pub fn write_nifti<P: AsRef<Path>>(path: P, vol: &Volume) -> Result<()> {
    let path = path.as_ref();
    let (nx, ny, nz) = vol.dims();
    let nc = vol.nc();
    let (ux, uy, uz) = vol.spacing();

    let mut header = vec![0u8; DATA_OFFSET];
    LittleEndian::write_i32(&mut header[0..4], HEADER_SIZE);

    let ndim: i16 = if nc > 1 { 4 } else { 3 };
    let dims = [ndim, nx as i16, ny as i16, nz as i16, nc as i16, 1, 1, 1];
    for (i, &d) in dims.iter().enumerate() {
        LittleEndian::write_i16(&mut header[40 + 2 * i..42 + 2 * i], d);
    }

    LittleEndian::write_i16(&mut header[70..72], DT_FLOAT32);
    LittleEndian::write_i16(&mut header[72..74], 32);

    let pixdims = [1.0f32, ux, uy, uz, 1.0, 0.0, 0.0, 0.0];
    for (i, &u) in pixdims.iter().enumerate() {
        LittleEndian::write_f32(&mut header[76 + 4 * i..80 + 4 * i], u);
    }

    LittleEndian::write_f32(&mut header[108..112], DATA_OFFSET as f32);
    LittleEndian::write_f32(&mut header[112..116], 1.0);
    LittleEndian::write_f32(&mut header[116..120], 0.0);
    header[123] = UNITS_MM;
    header[344..348].copy_from_slice(b"n+1\0");

    let nvox = nx * ny * nz * nc;
    let mut data = vec![0u8; nvox * 4];
    let mut cursor = 0;
    for c in 0..nc {
        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    LittleEndian::write_f32(
                        &mut data[cursor..cursor + 4],
                        vol.get(x, y, z, c),
                    );
                    cursor += 4;
                }
            }
        }
    }

    let io_err = |e: std::io::Error| Error::IoWrite(format!("{}: {}", path.display(), e));
    let file = File::create(path).map_err(io_err)?;
    if is_gzipped(path) {
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(&header).map_err(io_err)?;
        encoder.write_all(&data).map_err(io_err)?;
        encoder.finish().map_err(io_err)?;
    } else {
        let mut writer = BufWriter::new(file);
        writer.write_all(&header).map_err(io_err)?;
        writer.write_all(&data).map_err(io_err)?;
        writer.flush().map_err(io_err)?;
    }

    Ok(())
}
