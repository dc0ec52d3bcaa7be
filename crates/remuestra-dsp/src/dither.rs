//! Noise-shaped quantization to integer samples.
//!
//! Each output sample is `clip(round(gain*in + offset + feedback + noise))`
//! where the feedback term is an FIR over recent quantization errors and
//! the noise is drawn from a rectangular or triangular PDF. Clipping clamps
//! the newest error to `[-1, +1]` so a hard-clipped passage cannot wind up
//! the feedback register.

use remuestra_core::{DoubleRng, Outlet, SharedOutlet, TriangularRng};

use crate::error::{Error, Result};
use crate::sample::Sample;
use crate::shaper::{find_shaper, NoiseShaperCoef};

/// Quantization range and scaling derived from the output bit depth.
#[derive(Debug, Clone, Copy)]
pub struct Quantizer {
    pub gain: f64,
    pub offset: i32,
    pub clip_min: i32,
    pub clip_max: i32,
}

impl Quantizer {
    /// Standard mapping for signed PCM of 2..=32 bits; 8-bit output is
    /// unsigned with a 0x80 offset.
    pub fn for_bits(bits: i64) -> Result<Self> {
        if !(2..=32).contains(&bits) {
            return Err(Error::BadBitDepth(bits));
        }
        let full = 1i64 << (bits - 1);
        Ok(if bits == 8 {
            Self {
                gain: (full - 1) as f64,
                offset: 0x80,
                clip_min: 0x00,
                clip_max: 0xff,
            }
        } else {
            Self {
                gain: (full - 1) as f64,
                offset: 0,
                clip_min: (-full) as i32,
                clip_max: (full - 1) as i32,
            }
        })
    }
}

/// Quantizing sink stage: consumes float samples, produces `i32`.
pub struct Dither<T> {
    inlet: SharedOutlet<T>,
    quant: Quantizer,
    coefs: &'static [f64],
    rng: Box<dyn DoubleRng>,
    /// FIFO of recent quantization errors, newest first.
    err: Vec<f64>,
    in_buf: Vec<T>,
    noise: Vec<f64>,
}

impl<T: Sample> Dither<T> {
    /// Shaperless construction with an explicit noise source.
    pub fn new(inlet: SharedOutlet<T>, quant: Quantizer, rng: Box<dyn DoubleRng>) -> Self {
        Self::with_coefs(inlet, quant, &[], rng)
    }

    /// Looks the shaper up by `(dst_fs, id)`.
    pub fn with_shaper(
        inlet: SharedOutlet<T>,
        quant: Quantizer,
        dst_fs: i32,
        shaper_id: i32,
        rng: Box<dyn DoubleRng>,
    ) -> Result<Self> {
        let shaper = find_shaper(dst_fs, shaper_id)
            .ok_or(Error::UnknownShaper {
                fs: dst_fs,
                id: shaper_id,
            })?;
        Ok(Self::from_shaper(inlet, quant, shaper, rng))
    }

    pub fn from_shaper(
        inlet: SharedOutlet<T>,
        quant: Quantizer,
        shaper: &'static NoiseShaperCoef,
        rng: Box<dyn DoubleRng>,
    ) -> Self {
        Self::with_coefs(inlet, quant, shaper.coefs, rng)
    }

    fn with_coefs(
        inlet: SharedOutlet<T>,
        quant: Quantizer,
        coefs: &'static [f64],
        rng: Box<dyn DoubleRng>,
    ) -> Self {
        Self {
            inlet,
            quant,
            coefs,
            rng,
            err: vec![0.0; coefs.len()],
            in_buf: Vec::new(),
            noise: Vec::new(),
        }
    }

    /// Default triangular dither of one LSB peak, seeded.
    pub fn triangular_rng(seed: u64) -> Box<dyn DoubleRng> {
        Box::new(TriangularRng::new(1.0, seed))
    }
}

impl<T: Sample> Outlet<i32> for Dither<T> {
    fn at_end(&mut self) -> bool {
        self.inlet.lock().unwrap().at_end()
    }

    fn read(&mut self, out: &mut [i32]) -> usize {
        let want = out.len();
        if self.in_buf.len() < want {
            self.in_buf.resize(want, T::zero());
        }
        let n = self.inlet.lock().unwrap().read(&mut self.in_buf[..want]);

        if self.noise.len() < n {
            self.noise.resize(n, 0.0);
        }
        self.rng.fill(&mut self.noise[..n]);

        let q = &self.quant;
        if self.coefs.is_empty() {
            for p in 0..n {
                let x = q.gain * self.in_buf[p].to_f64() + q.offset as f64 + self.noise[p];
                let v = x.round_ties_even();
                out[p] = (v.clamp(q.clip_min as f64, q.clip_max as f64)) as i32;
            }
            return n;
        }

        let len = self.coefs.len();
        for p in 0..n {
            let mut feedback = self.coefs[len - 1] * self.err[len - 1];
            for i in (0..len - 1).rev() {
                feedback += self.coefs[i] * self.err[i];
                self.err[i + 1] = self.err[i];
            }

            let x = q.gain * self.in_buf[p].to_f64() + q.offset as f64 + feedback;
            let mut v = (x + self.noise[p]).round_ties_even();
            self.err[0] = v - x;

            if v < q.clip_min as f64 || v > q.clip_max as f64 {
                v = v.clamp(q.clip_min as f64, q.clip_max as f64);
                self.err[0] = (v - x).clamp(-1.0, 1.0);
            }

            out[p] = v as i32;
        }
        n
    }
}
