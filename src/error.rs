use thiserror::Error;

/// Registration error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Read error: {0}")]
    IoRead(String),

    #[error("Write error: {0}")]
    IoWrite(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Numeric failure: {0}")]
    Numeric(String),

    #[error("Insufficient inliers: {found} found, {required} required")]
    InsufficientInliers { found: usize, required: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Process exit code used by the CLI driver (0 = success, 1 = usage)
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::IoRead(_) | Error::Io(_) => 2,
            Error::IoWrite(_) => 3,
            Error::UnsupportedFormat(_) => 4,
            Error::InvalidDimensions(_) => 5,
            Error::InvalidParameter(_) => 6,
            Error::Numeric(_) => 7,
            Error::InsufficientInliers { .. } => 8,
        }
    }
}
