//! Precision genericity of the pipeline.
//!
//! Every stage is generic over [`Sample`], which is implemented for exactly
//! `f32` and `f64`. The bound combines what the FFT layer needs
//! (`rustfft::FftNum`) with ordinary float arithmetic, plus the f64
//! round-trips used wherever filter design happens in double precision.

use num_traits::{Float, NumAssign};
use rustfft::FftNum;

/// A pipeline sample type: `f32` or `f64`.
pub trait Sample: FftNum + Float + NumAssign {
    /// Name used in plan cache keys.
    const NAME: &'static str;

    fn from_f64(v: f64) -> Self;
    fn to_f64(self) -> f64;
}

impl Sample for f32 {
    const NAME: &'static str = "f32";

    fn from_f64(v: f64) -> Self {
        v as f32
    }

    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Sample for f64 {
    const NAME: &'static str = "f64";

    fn from_f64(v: f64) -> Self {
        v
    }

    fn to_f64(self) -> f64 {
        self
    }
}
