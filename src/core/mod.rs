pub mod matrix;
pub mod types;
pub mod volume;

pub use matrix::Matrix;
pub use types::{Point3, Point3d, Point3f};
pub use volume::Volume;
