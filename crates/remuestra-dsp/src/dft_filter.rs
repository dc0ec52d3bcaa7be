//! Overlap-save FIR convolution through the real DFT.
//!
//! The block length is twice the filter length rounded up to a power of
//! two: each round consumes N/2 input samples, convolves them in the
//! frequency domain and emits N/2 output samples, with the upper half of
//! the inverse transform saved as the next round's overlap. The filter
//! spectrum is precomputed once, scaled by `1/(N/2)` to cancel the inverse
//! transform's scaling, so the stage output equals direct convolution.
//!
//! On end-of-stream the input is extended with `firlen` zero samples to
//! flush the convolution tail, so the stage emits exactly `input + firlen`
//! samples overall.

use rustfft::num_complex::Complex;

use remuestra_core::{Outlet, SharedOutlet};

use crate::fft::{RealDft, RealDftScratch};
use crate::sample::Sample;

/// Streaming FIR convolution stage.
pub struct DftFilter<T: Sample> {
    inlet: SharedOutlet<T>,
    firlen: usize,
    /// N/2: samples consumed and emitted per round.
    half: usize,
    rdft: RealDft<T>,
    scratch: RealDftScratch<T>,
    filter_spec: Vec<Complex<T>>,
    spec: Vec<Complex<T>>,
    /// Time-domain work buffer of length N.
    block: Vec<T>,
    overlap: Vec<T>,
    fraction: Vec<T>,
    fraction_len: usize,
    zero_pad: usize,
    end_reached: bool,
}

impl<T: Sample> DftFilter<T> {
    pub fn new(inlet: SharedOutlet<T>, taps: &[T]) -> Self {
        let firlen = taps.len();
        let half = firlen.next_power_of_two();
        let len = half * 2;

        let rdft = RealDft::new(len);
        let mut scratch = rdft.make_scratch();

        let scale = <T as Sample>::from_f64(1.0 / half as f64);
        let mut padded = vec![T::zero(); len];
        for (dst, &src) in padded.iter_mut().zip(taps.iter()) {
            *dst = src * scale;
        }
        let mut filter_spec = vec![Complex::new(T::zero(), T::zero()); rdft.spectrum_len()];
        rdft.forward(&padded, &mut filter_spec, &mut scratch);

        Self {
            inlet,
            firlen,
            half,
            spec: vec![Complex::new(T::zero(), T::zero()); filter_spec.len()],
            filter_spec,
            scratch,
            block: vec![T::zero(); len],
            overlap: vec![T::zero(); half],
            fraction: vec![T::zero(); len],
            fraction_len: 0,
            zero_pad: 0,
            end_reached: false,
            rdft,
        }
    }

    fn drain_fraction(&mut self, out: &mut [T], opos: &mut usize) {
        let n = (out.len() - *opos).min(self.fraction_len);
        out[*opos..*opos + n].copy_from_slice(&self.fraction[..n]);
        self.fraction.copy_within(n..self.fraction_len, 0);
        self.fraction_len -= n;
        *opos += n;
    }
}

impl<T: Sample> Outlet<T> for DftFilter<T> {
    fn at_end(&mut self) -> bool {
        self.end_reached && self.zero_pad == 0 && self.fraction_len == 0
    }

    fn read(&mut self, out: &mut [T]) -> usize {
        let mut opos = 0;
        self.drain_fraction(out, &mut opos);

        while opos < out.len() && (!self.end_reached || self.zero_pad != 0) {
            // Fill the lower half of the block; after end-of-stream the
            // remaining firlen tail samples are zeros.
            let mut nread = 0;
            while nread < self.half {
                if !self.end_reached {
                    let r = self
                        .inlet
                        .lock()
                        .unwrap()
                        .read(&mut self.block[nread..self.half]);
                    if r == 0 {
                        self.end_reached = true;
                        self.zero_pad = self.firlen;
                    }
                    nread += r;
                } else {
                    let r = (self.half - nread).min(self.zero_pad);
                    self.block[nread..nread + r].fill(T::zero());
                    nread += r;
                    self.zero_pad -= r;
                    if self.zero_pad == 0 {
                        break;
                    }
                }
            }
            self.block[nread..].fill(T::zero());

            self.rdft
                .forward(&self.block, &mut self.spec, &mut self.scratch);
            for (s, f) in self.spec.iter_mut().zip(self.filter_spec.iter()) {
                *s *= *f;
            }
            self.rdft
                .inverse(&self.spec, &mut self.block, &mut self.scratch);

            let n_out = nread.min(out.len() - opos);
            for i in 0..n_out {
                out[opos + i] = self.block[i] + self.overlap[i];
            }
            if n_out < nread {
                for i in 0..nread - n_out {
                    self.fraction[i] = self.block[n_out + i] + self.overlap[n_out + i];
                }
                self.fraction_len = nread - n_out;
            }
            self.overlap.copy_from_slice(&self.block[self.half..]);

            opos += n_out;
            if self.fraction_len > 0 {
                break;
            }
        }

        opos
    }
}
