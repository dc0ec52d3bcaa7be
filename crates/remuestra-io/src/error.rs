//! Error types for WAV I/O.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// WAV encoding/decoding error.
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// Underlying file I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream format cannot be mapped onto a WAV encoding.
    #[error("unsupported sample format: {bits} bits ({tag:?})")]
    UnsupportedFormat {
        bits: u16,
        tag: remuestra_core::FormatTag,
    },

    /// The writer was given the wrong number of channel outlets.
    #[error("channel count mismatch: format has {expected} channels, got {got} outlets")]
    ChannelMismatch { expected: usize, got: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
