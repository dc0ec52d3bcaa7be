//! Error types for pipeline construction.

/// Configuration errors reported when a stage is constructed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("resampling from {src} to {dst} Hz is not supported; {ratio} must be divisible by 2 or 3")]
    UnsupportedRatio { src: i64, dst: i64, ratio: i64 },

    #[error("unknown conversion profile `{0}`")]
    UnknownProfile(String),

    #[error("dither type {id} is not available for destination sampling frequency {fs} Hz")]
    UnknownShaper { fs: i32, id: i32 },

    #[error("channel mix matrix row {row} has {got} entries, expected {expected}")]
    MatrixShape {
        row: usize,
        got: usize,
        expected: usize,
    },

    #[error("unsupported output bit depth {0}")]
    BadBitDepth(i64),
}

pub type Result<T> = std::result::Result<T, Error>;
