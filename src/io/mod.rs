pub mod nifti;
pub mod transform_io;

pub use nifti::{read_nifti, write_nifti};
pub use transform_io::{read_affine, write_affine};
