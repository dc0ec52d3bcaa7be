//! Remuestra DSP - the sample-rate conversion pipeline
//!
//! This crate implements the streaming converter on top of the stage
//! protocol from `remuestra-core`:
//!
//! - [`Ssrc`] orchestrates one channel's conversion: Kaiser-window FIR
//!   design, a polyphase rational resampler and an overlap-save DFT filter
//! - [`FastPp`] polyphase rational-ratio FIR
//! - [`DftFilter`] and [`PartDftFilter`] frequency-domain convolution
//! - [`minimum_phase`] cepstral transformation of designed filters
//! - [`Dither`] noise-shaped quantization with the shaper table
//! - [`ChannelMixer`] matrix down/up-mixing
//! - [`Soxifier`] push-pull adapter for streaming callers
//!
//! ## Example
//!
//! ```rust
//! use remuestra_core::shared;
//! use remuestra_dsp::{collect, Ssrc, SsrcParams, VecSource};
//!
//! let input: Vec<f32> = (0..44100)
//!     .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44100.0).sin())
//!     .collect();
//!
//! let params = SsrcParams { log2_dft_len: 10, ..SsrcParams::default() };
//! let ssrc = Ssrc::new(shared(VecSource::new(input)), 44100, 48000, &params).unwrap();
//! let resampled = collect(&shared(ssrc), 65536);
//! assert!(resampled.len() >= 48000);
//! ```

pub mod dft_filter;
pub mod dither;
pub mod error;
pub mod fastpp;
pub mod fft;
pub mod kaiser;
pub mod minphase;
pub mod mixer;
pub mod part_dft_filter;
pub mod profile;
pub mod sample;
pub mod shaper;
pub mod source;
pub mod soxifier;
pub mod ssrc;

pub use dft_filter::DftFilter;
pub use dither::{Dither, Quantizer};
pub use error::{Error, Result};
pub use fastpp::FastPp;
pub use fft::{RealDft, RealDftScratch};
pub use minphase::minimum_phase;
pub use mixer::ChannelMixer;
pub use part_dft_filter::PartDftFilter;
pub use profile::{find_profile, Profile, PROFILES};
pub use sample::Sample;
pub use shaper::{find_shaper, NoiseShaperCoef, SHAPERS};
pub use source::{collect, ImpulseGenerator, SweepGenerator, VecSource};
pub use soxifier::Soxifier;
pub use ssrc::{Ssrc, SsrcParams};
