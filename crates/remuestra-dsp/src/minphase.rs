//! Minimum-phase transformation of linear-phase FIR filters.
//!
//! Works through the real cepstrum: the log-magnitude spectrum of the
//! input filter is inverted back to the cepstral domain, folded onto its
//! causal half, and the minimum-phase impulse response is synthesized with
//! the exponential recursion. A gentle exponential pre-emphasis
//! (alpha = 1 - 2^-20) keeps the log well-conditioned near spectral zeros, and
//! the tail is shaped by the right half of a 7-term Blackman-Harris window
//! before the result is renormalized to the input's DC sum.
//!
//! Reference: A. D. Smith and R. J. Ferguson, "Minimum-phase signal
//! calculation using the real cepstrum", CREWES Research Report 26, 2014.

use rustfft::num_complex::Complex;

use crate::fft::RealDft;
use crate::sample::Sample;

/// 7-term Blackman-Harris coefficients, normalized by the first below.
const BH7: [f64; 7] = [
    0.27105140069342,
    -0.43329793923448,
    0.21812299954311,
    -0.06592544638803,
    0.01081174209837,
    -0.00077658482522,
    0.00001388721735,
];

/// Right half of the 7-term Blackman-Harris window of total length `2n`.
fn half_window(n: usize) -> Vec<f64> {
    let mut w = vec![0.0; n];
    for (i, v) in w.iter_mut().enumerate() {
        for (k, &b) in BH7.iter().enumerate() {
            let phase = std::f64::consts::PI * k as f64 * (i + n) as f64 / n as f64;
            *v += b / BH7[0] * phase.cos();
        }
    }
    w
}

/// Converts symmetric linear-phase taps into their minimum-phase
/// equivalent of the same length and DC gain.
pub fn minimum_phase<T: Sample>(taps: &[T]) -> Vec<T> {
    let n = taps.len();
    let l = n.next_power_of_two();
    let alpha = 1.0 - (0.5f64).powi(20);

    let rdft = RealDft::<f64>::new(l);
    let mut scratch = rdft.make_scratch();
    let mut buf = vec![0.0f64; l];
    let mut spec = vec![Complex::new(0.0, 0.0); rdft.spectrum_len()];

    // Pre-emphasized copy; remember the input's DC sum for the final
    // renormalization.
    let mut a = 1.0;
    let mut e_in = 0.0;
    for (dst, &src) in buf.iter_mut().zip(taps.iter()) {
        let v = src.to_f64();
        *dst = v * a;
        e_in += v;
        a *= alpha;
    }

    rdft.forward(&buf, &mut spec, &mut scratch);

    // Log-magnitude spectrum, then back to the cepstral domain. The
    // inverse leaves a factor of L/2 which is divided out so `cep` is the
    // true real cepstrum.
    for s in spec.iter_mut() {
        *s = Complex::new(s.norm().ln(), 0.0);
    }
    let mut cep = vec![0.0f64; l];
    rdft.inverse(&spec, &mut cep, &mut scratch);
    let scale = 2.0 / l as f64;
    for c in cep.iter_mut() {
        *c *= scale;
    }

    // Fold the anti-causal half onto the causal half: the interior
    // coefficients become the minimum-phase complex cepstrum.
    for i in 1..l / 2 {
        cep[i] += cep[l - i];
    }

    // Exponential recursion synthesizing the impulse response, undoing the
    // pre-emphasis as it goes.
    let window = half_window(n);
    let mut out = vec![0.0f64; n];
    out[0] = (cep[0] / 2.0).exp() * window[0];
    let mut e_out = out[0];
    let inv_alpha = 1.0 / alpha;
    let mut a = inv_alpha;
    for i in 1..n {
        let mut sum = 0.0;
        for k in 1..=i {
            sum += k as f64 / i as f64 * cep[k] * out[i - k];
        }
        out[i] = sum * a * window[i];
        e_out += out[i];
        a *= inv_alpha;
    }

    let norm = e_in / e_out;
    out.iter().map(|&v| <T as Sample>::from_f64(v * norm)).collect()
}
