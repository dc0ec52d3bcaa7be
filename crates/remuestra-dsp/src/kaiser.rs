//! Kaiser-window FIR design.
//!
//! Classic windowed-sinc design: given a stop-band attenuation and a
//! transition band width the Kaiser formulas pick the window shape
//! parameter and the filter length, and the taps are the ideal low-pass
//! impulse response under that window. All design math runs in `f64`; the
//! taps are cast to the pipeline precision at the end.
//!
//! Reference: J. F. Kaiser, "Nonrecursive digital filter design using the
//! I0-sinh window function", Proc. IEEE ISCAS, 1974.

use crate::sample::Sample;

/// Normalized sinc, `sin(x)/x` with the removable singularity filled.
pub fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        x.sin() / x
    }
}

/// Kaiser window shape parameter for a stop-band attenuation in dB.
pub fn alpha(aa: f64) -> f64 {
    if aa <= 21.0 {
        0.0
    } else if aa <= 50.0 {
        0.5842 * (aa - 21.0).powf(0.4) + 0.07886 * (aa - 21.0)
    } else {
        0.1102 * (aa - 8.7)
    }
}

/// Zeroth-order modified Bessel function of the first kind, 30-term series.
pub fn izero(x: f64) -> f64 {
    let mut sum = 1.0;
    let mut term = 1.0;
    for m in 1..=30 {
        term *= (x / 2.0) / m as f64;
        sum += term * term;
    }
    sum
}

fn kaiser_d(aa: f64) -> f64 {
    if aa <= 21.0 {
        0.9222
    } else {
        (aa - 7.95) / 14.36
    }
}

/// Filter length (odd) for attenuation `aa` dB, sampling rate `fs` and
/// transition band width `df`, both in Hz.
pub fn length(aa: f64, fs: f64, df: f64) -> usize {
    let mut len = (fs * kaiser_d(aa) / df) as i64 + 1;
    if len % 2 == 0 {
        len += 1;
    }
    len as usize
}

/// Transition band width achieved by a filter of `len` taps; the inverse
/// of [`length`].
pub fn transition_band_width(aa: f64, fs: f64, len: usize) -> f64 {
    fs * kaiser_d(aa) / (len - 1) as f64
}

/// Kaiser window value at offset `n` from the center of a `len`-tap filter.
pub fn window(n: i64, len: i64, alp: f64, iza: f64) -> f64 {
    if n > len - 1 {
        return 0.0;
    }
    let l = (len - 1) as f64;
    izero(alp * (1.0 - 4.0 * (n * n) as f64 / (l * l)).sqrt()) / iza
}

/// Ideal low-pass impulse response at tap offset `n`: pass-band edge `fp`,
/// sampling rate `fs`, both Hz.
pub fn hn_lpf(n: i64, fp: f64, fs: f64) -> f64 {
    let t = 1.0 / fs;
    let omega = 2.0 * std::f64::consts::PI * fp;
    2.0 * fp * t * sinc(n as f64 * omega * t)
}

/// Designs a low-pass FIR with the length derived from the transition band
/// width `df`.
pub fn make_lpf<T: Sample>(fs: f64, fp: f64, df: f64, aa: f64, gain: f64) -> Vec<T> {
    let len = length(aa, fs, df);
    make_lpf_with_len(fs, fp, len, aa, gain)
}

/// Designs a low-pass FIR of an explicit length (forced odd).
pub fn make_lpf_with_len<T: Sample>(fs: f64, fp: f64, len: usize, aa: f64, gain: f64) -> Vec<T> {
    let len = if len % 2 == 0 { len + 1 } else { len };
    let alp = alpha(aa);
    let iza = izero(alp);
    let half = (len / 2) as i64;
    let mut taps = vec![T::zero(); len];
    for i in 0..=half {
        let v = window(i, len as i64, alp, iza) * hn_lpf(i, fp, fs) * gain;
        taps[(half + i) as usize] = <T as Sample>::from_f64(v);
        taps[(half - i) as usize] = <T as Sample>::from_f64(v);
    }
    taps
}

/// Ideal band-pass response as a sum of `k` sub-band low-pass differences
/// with an exponential gain ramp from `g0` at `fp0` to `g1` at `fp1`.
pub fn hn_bpf(n: i64, fp0: f64, g0: f64, fp1: f64, g1: f64, fs: f64, k: u32) -> f64 {
    let mut sum = 0.0;
    for i in 0..k {
        let fl = i as f64 * (fp1 - fp0) / k as f64 + fp0;
        let fh = (i + 1) as f64 * (fp1 - fp0) / k as f64 + fp0;
        let g = (i as f64 * (g1.ln() - g0.ln()) / k as f64 + g0.ln()).exp();
        sum += (hn_lpf(n, fh, fs) - hn_lpf(n, fl, fs)) * g;
    }
    sum
}

/// Designs a band-pass FIR of an explicit length (forced odd) from `k`
/// equal sub-bands with gains ramping exponentially `g0` to `g1`.
#[allow(clippy::too_many_arguments)]
pub fn make_bpf<T: Sample>(
    fs: f64,
    fp0: f64,
    g0: f64,
    fp1: f64,
    g1: f64,
    len: usize,
    aa: f64,
    k: u32,
    gain: f64,
) -> Vec<T> {
    let len = if len % 2 == 0 { len + 1 } else { len };
    let alp = alpha(aa);
    let iza = izero(alp);
    let half = (len / 2) as i64;
    let mut taps = vec![T::zero(); len];
    for i in 0..=half {
        let v = window(i, len as i64, alp, iza) * hn_bpf(i, fp0, g0, fp1, g1, fs, k) * gain;
        taps[(half + i) as usize] = <T as Sample>::from_f64(v);
        taps[(half - i) as usize] = <T as Sample>::from_f64(v);
    }
    taps
}
