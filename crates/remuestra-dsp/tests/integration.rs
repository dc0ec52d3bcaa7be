//! End-to-end conversion scenarios for remuestra-dsp.
//!
//! These tests drive complete pipelines (generator or buffer source,
//! SSRC, optionally mixer and dither) and verify signal-level outcomes:
//! frame accounting, tone amplitudes via projection, stop-band attenuation
//! via direct DFT probes, and the equivalence of the partitioned
//! convolution path.

use remuestra_core::{shared, FormatTag, OutletProvider, SharedOutlet, StreamFormat};
use remuestra_dsp::{
    collect, ChannelMixer, Dither, ImpulseGenerator, Quantizer, Ssrc, SsrcParams, VecSource,
};

fn sine(n: usize, freq: f64, fs: f64, amp: f64) -> Vec<f64> {
    (0..n)
        .map(|i| amp * (2.0 * std::f64::consts::PI * freq * i as f64 / fs).sin())
        .collect()
}

/// Magnitude of `signal` at `freq` via a direct DFT probe.
fn probe(signal: &[f64], freq: f64, fs: f64) -> f64 {
    let w = 2.0 * std::f64::consts::PI * freq / fs;
    let mut re = 0.0;
    let mut im = 0.0;
    for (i, &s) in signal.iter().enumerate() {
        re += s * (w * i as f64).cos();
        im += s * (w * i as f64).sin();
    }
    2.0 * re.hypot(im) / signal.len() as f64
}

/// Least-squares tone amplitude plus the RMS of what the fit leaves.
fn tone_fit(signal: &[f64], freq: f64, fs: f64) -> (f64, f64) {
    let w = 2.0 * std::f64::consts::PI * freq / fs;
    let n = signal.len() as f64;
    let mut a = 0.0;
    let mut b = 0.0;
    for (i, &s) in signal.iter().enumerate() {
        a += s * (w * i as f64).sin();
        b += s * (w * i as f64).cos();
    }
    a *= 2.0 / n;
    b *= 2.0 / n;
    let mut residual = 0.0;
    for (i, &s) in signal.iter().enumerate() {
        let fit = a * (w * i as f64).sin() + b * (w * i as f64).cos();
        residual += (s - fit) * (s - fit);
    }
    (a.hypot(b), (residual / n).sqrt())
}

fn collect_i32(outlet: &mut dyn remuestra_core::Outlet<i32>) -> Vec<i32> {
    let mut all = Vec::new();
    let mut buf = [0i32; 4096];
    loop {
        let n = outlet.read(&mut buf);
        if n == 0 {
            break;
        }
        all.extend_from_slice(&buf[..n]);
    }
    all
}

// ============================================================================
// 1. Frame accounting and quantized silence (44.1 kHz -> 48 kHz, 16-bit)
// ============================================================================

#[test]
fn silence_converts_to_quantized_silence() {
    let n = 44100;
    let params = SsrcParams {
        log2_dft_len: 14,
        aa: 145.0,
        guard: 2.0,
        ..SsrcParams::default()
    };
    let ssrc = Ssrc::<f64>::new(
        shared(VecSource::new(vec![0.0f64; n])),
        44100,
        48000,
        &params,
    )
    .unwrap();
    let mut dither = Dither::with_shaper(
        shared(ssrc),
        Quantizer::for_bits(16).unwrap(),
        48000,
        98,
        Dither::<f64>::triangular_rng(42),
    )
    .unwrap();
    let out = collect_i32(&mut dither);

    // One second of input yields at least one second of output; the
    // convolution tail rings past it.
    assert!(out.len() >= 48000, "only {} frames", out.len());
    assert!(out.len() < 48000 + 8000, "tail too long: {}", out.len());

    // Dithered silence stays within a couple of LSB and carries no DC.
    assert!(out.iter().all(|&v| v.abs() <= 2));
    let dc = out.iter().map(|&v| v as f64).sum::<f64>() / out.len() as f64;
    assert!(dc.abs() < 0.5, "DC offset {dc} LSB");
}

// ============================================================================
// 2. Tone fidelity on a high-quality downsample (96 kHz -> 44.1 kHz)
// ============================================================================

#[test]
fn downsampled_tone_keeps_its_level() {
    let input = sine(96000, 440.0, 96000.0, 0.5);
    let params = SsrcParams {
        log2_dft_len: 16,
        aa: 170.0,
        guard: 4.0,
        ..SsrcParams::default()
    };
    let ssrc = Ssrc::<f64>::new(shared(VecSource::new(input)), 96000, 44100, &params).unwrap();
    let out = collect(&shared(ssrc), 8192);
    assert!(out.len() >= 44100);

    // 440 Hz is periodic in 2205 samples at 44.1 kHz; a window of whole
    // periods makes the projection exact.
    let window = &out[4410..4410 + 2205 * 12];
    let (amp, residual) = tone_fit(window, 440.0, 44100.0);
    // Within 0.02 dB of -6 dBFS.
    assert!((amp - 0.5).abs() < 0.0012, "tone amplitude {amp}");
    assert!(residual < 1e-6, "distortion residual {residual}");
}

// ============================================================================
// 3. Stop-band attenuation of an upsampled impulse (44.1 kHz -> 96 kHz)
// ============================================================================

#[test]
fn upsampled_impulse_spectrum_is_clean() {
    // A single unit impulse through the converter produces its combined
    // impulse response; everything above the source Nyquist is imaging
    // residue the filters must keep below the design attenuation.
    // Trailing zeros after the pulse keep the full ring-out inside the
    // output window.
    let fmt = StreamFormat::new(FormatTag::IeeeFloat, 1, 44100, 32);
    let gen = ImpulseGenerator::<f64>::new(fmt, 1.0, 8192, 12288);
    let params = SsrcParams {
        log2_dft_len: 14,
        aa: 145.0,
        guard: 2.0,
        ..SsrcParams::default()
    };
    let ssrc = Ssrc::<f64>::new(gen.outlet(0), 44100, 96000, &params).unwrap();
    let out = collect(&shared(ssrc), 8192);

    let reference = probe(&out, 1000.0, 96000.0);
    for stop_freq in [23000.0, 30000.0, 44000.0] {
        let leak = probe(&out, stop_freq, 96000.0);
        let att = -20.0 * (leak / reference).log10();
        assert!(
            att > 135.0,
            "stop band at {stop_freq} Hz only {att:.1} dB down"
        );
    }
}

// ============================================================================
// 4. Anti-phase stereo collapses to digital zero through the mixer
// ============================================================================

struct Stereo {
    outlets: Vec<SharedOutlet<f64>>,
}

impl OutletProvider<f64> for Stereo {
    fn outlet(&self, channel: u32) -> SharedOutlet<f64> {
        self.outlets[channel as usize].clone()
    }

    fn format(&self) -> StreamFormat {
        StreamFormat::new(FormatTag::IeeeFloat, 2, 44100, 32)
    }
}

#[test]
fn antiphase_downmix_is_exactly_zero() {
    let a = sine(22050, 997.0, 44100.0, 0.8);
    let neg: Vec<f64> = a.iter().map(|v| -v).collect();
    let stereo = Stereo {
        outlets: vec![shared(VecSource::new(a)), shared(VecSource::new(neg))],
    };
    let mixer = ChannelMixer::new(&stereo, vec![vec![0.5, 0.5]]).unwrap();

    // Resample the mono mix; zero in, zero out.
    let params = SsrcParams {
        log2_dft_len: 10,
        ..SsrcParams::default()
    };
    let ssrc = Ssrc::<f64>::new(mixer.outlet(0), 44100, 48000, &params).unwrap();
    let out = collect(&shared(ssrc), 4096);
    assert!(!out.is_empty());
    assert!(out.iter().all(|&v| v == 0.0));
}

#[test]
fn mixing_is_linear() {
    let x = sine(4000, 313.0, 44100.0, 0.4);
    let y = sine(4000, 1021.0, 44100.0, 0.3);
    let (alpha, beta) = (0.7, -1.3);

    let mix = |l: Vec<f64>, r: Vec<f64>| -> Vec<f64> {
        let stereo = Stereo {
            outlets: vec![shared(VecSource::new(l)), shared(VecSource::new(r))],
        };
        let mixer = ChannelMixer::new(&stereo, vec![vec![0.25, 0.75]]).unwrap();
        collect(&mixer.outlet(0), 512)
    };

    let combined: Vec<f64> = x
        .iter()
        .zip(y.iter())
        .map(|(a, b)| alpha * a + beta * b)
        .collect();
    let lhs = mix(combined.clone(), combined);
    let sep_x = mix(x.clone(), x);
    let sep_y = mix(y.clone(), y);
    for i in 0..lhs.len() {
        let rhs = alpha * sep_x[i] + beta * sep_y[i];
        assert!((lhs[i] - rhs).abs() < 1e-12, "frame {i}");
    }
}

// ============================================================================
// 5. Partitioned convolution equals the monolithic filter in a full chain
// ============================================================================

#[test]
fn partitioned_conversion_matches_monolithic() {
    let input = sine(48000, 1234.0, 48000.0, 0.9);

    let run = |log2_min: Option<u32>| -> Vec<f64> {
        let params = SsrcParams {
            log2_dft_len: 12,
            log2_min_dft_len: log2_min,
            ..SsrcParams::default()
        };
        let ssrc = Ssrc::<f64>::new(
            shared(VecSource::new(input.clone())),
            48000,
            96000,
            &params,
        )
        .unwrap();
        collect(&shared(ssrc), 8192)
    };

    let mono = run(None);
    let part = run(Some(8));
    assert_eq!(mono.len(), part.len());
    for (i, (a, b)) in mono.iter().zip(part.iter()).enumerate() {
        assert!((a - b).abs() < 1e-6, "sample {i}: {a} vs {b}");
    }
}

// ============================================================================
// 6. Minimum phase front-loads the impulse response
// ============================================================================

#[test]
fn minimum_phase_response_arrives_early() {
    let mut impulse = vec![0.0f64; 4096];
    impulse[0] = 1.0;

    let run = |min_phase: bool| -> Vec<f64> {
        let params = SsrcParams {
            log2_dft_len: 12,
            min_phase,
            ..SsrcParams::default()
        };
        let ssrc = Ssrc::<f64>::new(
            shared(VecSource::new(impulse.clone())),
            48000,
            96000,
            &params,
        )
        .unwrap();
        collect(&shared(ssrc), 4096)
    };

    let peak_index = |v: &[f64]| -> usize {
        v.iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.abs().partial_cmp(&b.abs()).unwrap())
            .map(|(i, _)| i)
            .unwrap()
    };

    let linear = run(false);
    let minimum = run(true);
    let linear_peak = peak_index(&linear);
    let minimum_peak = peak_index(&minimum);
    assert!(
        minimum_peak * 4 < linear_peak,
        "minimum-phase peak at {minimum_peak}, linear at {linear_peak}"
    );

    // Nearly all of the energy sits in the leading half of the
    // minimum-phase response.
    let total: f64 = minimum.iter().map(|v| v * v).sum();
    let head: f64 = minimum[..minimum.len() / 2].iter().map(|v| v * v).sum();
    assert!(head / total > 0.99, "head energy {}", head / total);
}

// ============================================================================
// 7. Dither keeps hot signals inside the clip range end to end
// ============================================================================

#[test]
fn hot_signal_survives_conversion_and_dither() {
    // 0 dBFS input overshoots slightly after resampling; the dither stage
    // must clip without letting the error feedback run away.
    let input = sine(44100, 997.0, 44100.0, 1.0);
    let params = SsrcParams {
        log2_dft_len: 12,
        ..SsrcParams::default()
    };
    let ssrc = Ssrc::<f64>::new(shared(VecSource::new(input)), 44100, 48000, &params).unwrap();
    let mut dither = Dither::with_shaper(
        shared(ssrc),
        Quantizer::for_bits(16).unwrap(),
        48000,
        98,
        Dither::<f64>::triangular_rng(1),
    )
    .unwrap();
    let out = collect_i32(&mut dither);
    assert!(out.len() > 48000);
    assert!(out.iter().all(|&v| (-32768..=32767).contains(&v)));

    // The tone is still there at roughly full scale.
    let floats: Vec<f64> = out.iter().map(|&v| v as f64 / 32767.0).collect();
    let window = &floats[4800..4800 + 32000];
    let (amp, _) = tone_fit(window, 997.0, 48000.0);
    assert!((amp - 1.0).abs() < 0.01, "tone amplitude {amp}");
}
