//! Real-valued DFT layer over `rustfft`.
//!
//! The convolution stages only ever transform real signals, so the complex
//! FFT is driven at half length with the usual even/odd packing: N real
//! samples become N/2 complex samples, one complex FFT, and a twiddle
//! recombination yields the N/2+1 hermitian bins of the true DFT. The
//! inverse runs the same steps backwards and returns the time signal scaled
//! by N/2; the convolution stages fold the matching 1/(N/2) into their
//! precomputed filter spectra.
//!
//! The underlying `rustfft` plans are shared process-wide through the
//! object cache, keyed by precision, direction and length. A plan is
//! thread-compatible but each caller owns its own [`RealDftScratch`].

use std::sync::Arc;

use remuestra_core::cache;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftDirection, FftPlanner};

use crate::sample::Sample;

struct PlanHolder<T: Sample>(Arc<dyn Fft<T>>);

fn plan<T: Sample>(direction: FftDirection, len: usize) -> Arc<dyn Fft<T>> {
    let dir = match direction {
        FftDirection::Forward => "fwd",
        FftDirection::Inverse => "inv",
    };
    let key = format!("fft<{}>({dir},{len})", T::NAME);
    let holder = cache::get_or_insert_with(&key, || {
        let plan = FftPlanner::<T>::new().plan_fft(len, direction);
        Arc::new(PlanHolder(plan))
    });
    Arc::clone(&holder.0)
}

/// Scratch buffers for one caller of a [`RealDft`].
pub struct RealDftScratch<T: Sample> {
    packed: Vec<Complex<T>>,
    fft: Vec<Complex<T>>,
}

/// Real-input DFT of a fixed even length.
pub struct RealDft<T: Sample> {
    len: usize,
    half: usize,
    fwd: Arc<dyn Fft<T>>,
    inv: Arc<dyn Fft<T>>,
    /// e^(-2πik/len) for k = 0..=len/2.
    twiddles: Vec<Complex<T>>,
}

impl<T: Sample> RealDft<T> {
    /// Builds a transform of real length `len` (even, at least 2).
    pub fn new(len: usize) -> Self {
        assert!(len >= 2 && len % 2 == 0, "real DFT length must be even");
        let half = len / 2;
        let twiddles = (0..=half)
            .map(|k| {
                let angle = -2.0 * std::f64::consts::PI * k as f64 / len as f64;
                Complex::new(<T as Sample>::from_f64(angle.cos()), <T as Sample>::from_f64(angle.sin()))
            })
            .collect();
        Self {
            len,
            half,
            fwd: plan::<T>(FftDirection::Forward, half),
            inv: plan::<T>(FftDirection::Inverse, half),
            twiddles,
        }
    }

    /// Real length of the transform.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Number of spectrum bins, `len/2 + 1`.
    pub fn spectrum_len(&self) -> usize {
        self.half + 1
    }

    pub fn make_scratch(&self) -> RealDftScratch<T> {
        let fft_len = self
            .fwd
            .get_inplace_scratch_len()
            .max(self.inv.get_inplace_scratch_len());
        RealDftScratch {
            packed: vec![Complex::new(T::zero(), T::zero()); self.half],
            fft: vec![Complex::new(T::zero(), T::zero()); fft_len],
        }
    }

    /// Forward transform: `time` (len N) to the true DFT bins 0..=N/2.
    pub fn forward(&self, time: &[T], spec: &mut [Complex<T>], scratch: &mut RealDftScratch<T>) {
        assert_eq!(time.len(), self.len);
        assert_eq!(spec.len(), self.half + 1);

        let m = self.half;
        for (j, z) in scratch.packed.iter_mut().enumerate() {
            *z = Complex::new(time[2 * j], time[2 * j + 1]);
        }
        self.fwd
            .process_with_scratch(&mut scratch.packed, &mut scratch.fft);

        let z0 = scratch.packed[0];
        let half_one = <T as Sample>::from_f64(0.5);
        for k in 0..=m {
            let zk = if k == m { z0 } else { scratch.packed[k] };
            let zmk = if k == 0 { z0 } else { scratch.packed[m - k] };
            let a = zk + zmk.conj();
            let b = zk - zmk.conj();
            let wb = self.twiddles[k] * b;
            spec[k] = Complex::new((a.re + wb.im) * half_one, (a.im - wb.re) * half_one);
        }
    }

    /// Inverse transform of hermitian bins 0..=N/2.
    ///
    /// Produces the time signal scaled by N/2; the imaginary parts of the
    /// DC and Nyquist bins are ignored, as the forward transform leaves
    /// them zero.
    pub fn inverse(&self, spec: &[Complex<T>], time: &mut [T], scratch: &mut RealDftScratch<T>) {
        assert_eq!(spec.len(), self.half + 1);
        assert_eq!(time.len(), self.len);

        let m = self.half;
        let half_one = <T as Sample>::from_f64(0.5);
        for k in 0..m {
            let sk = spec[k];
            let smk = spec[m - k].conj();
            let xe = (sk + smk) * half_one;
            let xo = self.twiddles[k].conj() * (sk - smk) * half_one;
            scratch.packed[k] = Complex::new(xe.re - xo.im, xe.im + xo.re);
        }
        self.inv
            .process_with_scratch(&mut scratch.packed, &mut scratch.fft);

        for (j, z) in scratch.packed.iter().enumerate() {
            time[2 * j] = z.re;
            time[2 * j + 1] = z.im;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive_dft(x: &[f64]) -> Vec<Complex<f64>> {
        let n = x.len();
        (0..=n / 2)
            .map(|k| {
                let mut acc = Complex::new(0.0, 0.0);
                for (i, &v) in x.iter().enumerate() {
                    let angle = -2.0 * std::f64::consts::PI * k as f64 * i as f64 / n as f64;
                    acc += Complex::new(angle.cos(), angle.sin()) * v;
                }
                acc
            })
            .collect()
    }

    #[test]
    fn forward_matches_naive_dft() {
        let n = 32;
        let x: Vec<f64> = (0..n)
            .map(|i| (i as f64 * 0.37).sin() + 0.25 * (i as f64 * 1.1).cos())
            .collect();
        let rdft = RealDft::<f64>::new(n);
        let mut scratch = rdft.make_scratch();
        let mut spec = vec![Complex::new(0.0, 0.0); rdft.spectrum_len()];
        rdft.forward(&x, &mut spec, &mut scratch);

        for (got, want) in spec.iter().zip(naive_dft(&x)) {
            assert!(
                (got - want).norm() < 1e-9,
                "bin mismatch: {got} vs {want}"
            );
        }
        // DC and Nyquist bins are purely real.
        assert!(spec[0].im.abs() < 1e-12);
        assert!(spec[n / 2].im.abs() < 1e-12);
    }

    #[test]
    fn round_trip_scales_by_half_length() {
        let n = 64;
        let x: Vec<f64> = (0..n).map(|i| ((i * 7 + 3) % 11) as f64 - 5.0).collect();
        let rdft = RealDft::<f64>::new(n);
        let mut scratch = rdft.make_scratch();
        let mut spec = vec![Complex::new(0.0, 0.0); rdft.spectrum_len()];
        let mut back = vec![0.0f64; n];
        rdft.forward(&x, &mut spec, &mut scratch);
        rdft.inverse(&spec, &mut back, &mut scratch);

        let scale = (n / 2) as f64;
        for (a, b) in x.iter().zip(back.iter()) {
            assert!((a * scale - b).abs() < 1e-9);
        }
    }

    #[test]
    fn round_trip_f32() {
        let n = 16;
        let x: Vec<f32> = (0..n).map(|i| (i as f32 * 0.73).sin()).collect();
        let rdft = RealDft::<f32>::new(n);
        let mut scratch = rdft.make_scratch();
        let mut spec = vec![Complex::new(0.0f32, 0.0); rdft.spectrum_len()];
        let mut back = vec![0.0f32; n];
        rdft.forward(&x, &mut spec, &mut scratch);
        rdft.inverse(&spec, &mut back, &mut scratch);
        for (a, b) in x.iter().zip(back.iter()) {
            assert!((a * (n as f32 / 2.0) - b).abs() < 1e-4);
        }
    }

    #[test]
    fn plans_are_cached_per_length() {
        let a = RealDft::<f64>::new(256);
        let b = RealDft::<f64>::new(256);
        assert!(Arc::ptr_eq(&a.fwd, &b.fwd));
        assert!(Arc::ptr_eq(&a.inv, &b.inv));
    }
}
