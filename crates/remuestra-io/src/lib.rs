//! Remuestra IO - WAV container collaborator
//!
//! Bridges WAV files into the pull-based graph: [`WavReader`] exposes one
//! float outlet per channel (optionally fed by a prefetch thread), and
//! [`WavWriter`] drives a finished graph to exhaustion, interleaving
//! per-channel outlets into the output file.

mod error;
mod wav;

pub use error::{Error, Result};
pub use wav::{WavReader, WavSample, WavWriter};
