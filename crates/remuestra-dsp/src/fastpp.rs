//! Rational polyphase FIR resampling.
//!
//! The filter is designed on the LCM-rate grid, the implicit high-rate
//! lattice both the source and destination rates divide, and split into
//! `sstep = lcm/src_fs` subfilters, each holding every `sstep`-th tap in
//! time-reversed order. For destination index `d` the source read pointer
//! is `s = ceil(d * dstep / sstep)` and the subfilter is
//! `s * sstep - d * dstep`; the dot product runs over the
//! `ceil(len / sstep)` source samples ending at `s`,
//! so the filter is causal and the zero-stuffed LCM-rate signal is never
//! materialized. At unit ratio this reduces to ordinary FIR convolution
//! with its usual `(len - 1) / 2` group delay.
//!
//! The input ring is seeded with one subfilter length of zero history and
//! refilled in blocks of up to 65 536 output samples. The stream ends once
//! `src_len * sstep / dstep` samples have been emitted.

use remuestra_core::{Outlet, SharedOutlet};

use crate::sample::Sample;

/// Output block cap per refill round.
const BLOCK: usize = 65536;

/// Streaming rational-ratio FIR resampler.
pub struct FastPp<T> {
    inlet: SharedOutlet<T>,
    sstep: usize,
    dstep: usize,
    taps_per_phase: usize,
    fircoef: Vec<Vec<T>>,
    /// Ring of source samples; index 0 is the oldest sample still needed.
    buf: Vec<T>,
    buflast: usize,
    /// Destination samples emitted so far.
    dpos: usize,
    /// Source samples consumed so far.
    ssize: usize,
    /// Total destination samples derivable from `ssize`.
    dsize: usize,
    saw_eos: bool,
}

impl<T: Sample> FastPp<T> {
    /// `src_fs` and `dst_fs` must both divide `lcm_fs`; `taps` is the
    /// filter designed at the LCM rate.
    pub fn new(inlet: SharedOutlet<T>, src_fs: i64, lcm_fs: i64, dst_fs: i64, taps: &[T]) -> Self {
        assert!(
            lcm_fs % src_fs == 0 && lcm_fs % dst_fs == 0,
            "rates must divide the LCM rate"
        );
        let sstep = (lcm_fs / src_fs) as usize;
        let dstep = (lcm_fs / dst_fs) as usize;
        let firlen = taps.len();
        let taps_per_phase = firlen.div_ceil(sstep);

        let mut fircoef = vec![vec![T::zero(); taps_per_phase]; sstep];
        for i in 0..firlen {
            fircoef[i % sstep][i / sstep] = taps[firlen - 1 - i];
        }

        Self {
            inlet,
            sstep,
            dstep,
            taps_per_phase,
            fircoef,
            buf: vec![T::zero(); (firlen + BLOCK * dstep) / sstep + taps_per_phase + 2],
            // Zero history in front of the first sample keeps the window
            // causal.
            buflast: taps_per_phase - 1,
            dpos: 0,
            ssize: 0,
            dsize: 0,
            saw_eos: false,
        }
    }
}

impl<T: Sample> Outlet<T> for FastPp<T> {
    fn at_end(&mut self) -> bool {
        self.saw_eos && self.dpos >= self.dsize
    }

    fn read(&mut self, out: &mut [T]) -> usize {
        let tpp = self.taps_per_phase;
        let mut opos = 0;

        while opos < out.len() {
            // Top up the input ring. A full ring reads nothing and is not
            // end-of-stream; the consumption below frees space for the
            // next round.
            let nread = if self.buflast < self.buf.len() {
                self.inlet.lock().unwrap().read(&mut self.buf[self.buflast..])
            } else {
                0
            };
            let end_reached = self.buflast < self.buf.len() && nread == 0;
            if end_reached {
                self.saw_eos = true;
            }
            self.ssize += nread;
            self.dsize = self.ssize * self.sstep / self.dstep;

            if self.dpos >= self.dsize {
                return opos;
            }

            self.buflast += nread;
            for s in &mut self.buf[self.buflast..] {
                *s = T::zero();
            }

            let sorg = (self.dpos * self.dstep).div_ceil(self.sstep);
            let bs = (out.len() - opos).min(BLOCK);

            for _ in 0..bs {
                if self.dpos >= self.dsize {
                    break;
                }
                let spos = (self.dpos * self.dstep).div_ceil(self.sstep);
                let phase = spos * self.sstep - self.dpos * self.dstep;
                // Window of tpp samples ending at source position spos,
                // expressed relative to the ring origin sorg.
                let start = spos - sorg;

                if tpp - 1 + start >= self.buflast && !end_reached {
                    break;
                }

                let span = &self.buf[start..(start + tpp).min(self.buf.len())];
                let mut sum = T::zero();
                for (&c, &s) in self.fircoef[phase].iter().zip(span.iter()) {
                    sum = sum + c * s;
                }

                out[opos] = sum;
                opos += 1;
                self.dpos += 1;
            }

            let slast = (self.dpos * self.dstep).div_ceil(self.sstep);
            self.buf.copy_within(slast - sorg.., 0);
            self.buflast -= slast - sorg;
        }

        opos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{collect, VecSource};
    use remuestra_core::shared;

    /// Unit ratio with a centered unit-impulse filter of length `2d+1`
    /// reduces to a pure delay of `d` samples.
    #[test]
    fn unit_ratio_impulse_filter_is_a_delay() {
        let delay = 8;
        let len = 2 * delay + 1;
        let mut taps = vec![0.0f64; len];
        taps[delay] = 1.0;

        let input: Vec<f64> = (0..200).map(|i| (i as f64 * 0.1).sin()).collect();
        let src = shared(VecSource::new(input.clone()));
        let pp = FastPp::new(src, 48000, 48000, 48000, &taps);
        let out = collect(&shared(pp), 33);

        assert_eq!(out.len(), input.len());
        for i in 0..out.len() {
            let expected = if i < delay { 0.0 } else { input[i - delay] };
            assert!(
                (out[i] - expected).abs() < 1e-12,
                "sample {i}: {} vs {expected}",
                out[i]
            );
        }
    }

    /// 1:2 upsampling against direct convolution of the zero-stuffed
    /// signal. With 63 taps and sstep = 2 the streaming output aligns
    /// exactly with the causal convolution.
    #[test]
    fn upsample_matches_direct_convolution() {
        let taps = crate::kaiser::make_lpf_with_len::<f64>(96000.0, 20000.0, 63, 96.0, 2.0);
        let input: Vec<f64> = (0..128).map(|i| ((i * 13 + 5) % 17) as f64 / 17.0).collect();

        let src = shared(VecSource::new(input.clone()));
        let pp = FastPp::new(src, 48000, 96000, 96000, &taps);
        let out = collect(&shared(pp), 50);

        let mut stuffed = vec![0.0f64; input.len() * 2];
        for (i, &v) in input.iter().enumerate() {
            stuffed[2 * i] = v;
        }
        assert_eq!(out.len(), stuffed.len());

        for (d, &got) in out.iter().enumerate() {
            let mut want = 0.0;
            for (j, &h) in taps.iter().enumerate() {
                if d >= j {
                    want += h * stuffed[d - j];
                }
            }
            assert!(
                (got - want).abs() < 1e-12,
                "sample {d}: {got} vs {want}"
            );
        }
    }

    /// Output length is src_len * sstep / dstep, independent of read sizes.
    #[test]
    fn output_length_follows_the_ratio() {
        let taps = vec![1.0f32; 31];
        for (sfs, dfs, n) in [(44100i64, 48000i64, 441usize), (48000, 44100, 480)] {
            let g = gcd(sfs, dfs);
            let lcm = sfs / g * dfs;
            let src = shared(VecSource::new(vec![0.25f32; n]));
            let pp = FastPp::new(src, sfs, lcm, dfs, &taps);
            let out = collect(&shared(pp), 17);
            let expected = n * (lcm / sfs) as usize / (lcm / dfs) as usize;
            assert_eq!(out.len(), expected, "{sfs} -> {dfs}");
        }
    }

    fn gcd(mut a: i64, mut b: i64) -> i64 {
        while b != 0 {
            let t = a % b;
            a = b;
            b = t;
        }
        a
    }
}
