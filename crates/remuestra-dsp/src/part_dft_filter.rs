//! Partitioned overlap-save convolution.
//!
//! A long filter convolved with one big DFT makes the block containing the
//! transform arbitrarily expensive. Here the filter is split into
//! log-staggered partitions of `2^l2min, 2^l2min, 2^(l2min+1), ...` taps:
//! the first partition runs every block over the newest samples, and the
//! level-k partition runs every `2^k` blocks over a correspondingly larger
//! span of input history, adding its contribution into a single rolling
//! overlap accumulator. The largest transform executed in any one block is
//! bounded by the smallest partition plus whichever staggered levels fall
//! due, which keeps per-block latency smooth while still convolving the
//! full filter.
//!
//! Partitions falling due in the same block are independent and may be
//! dispatched to the shared worker pool; their additions into the overlap
//! buffer stay serialized at block completion.

use std::sync::{Arc, Mutex};

use rustfft::num_complex::Complex;

use remuestra_core::{BgExecutor, Outlet, SharedOutlet};

use crate::fft::{RealDft, RealDftScratch};
use crate::sample::Sample;

/// One sub-filter: a self-contained overlap-save convolution unit with its
/// own staging buffers, so partitions can run on worker threads.
struct Partition<T: Sample> {
    rdft: RealDft<T>,
    scratch: RealDftScratch<T>,
    filter_spec: Vec<Complex<T>>,
    spec: Vec<Complex<T>>,
    /// Staged input, `half` samples.
    input: Vec<T>,
    /// Convolution result, `2 * half` samples.
    output: Vec<T>,
}

impl<T: Sample> Partition<T> {
    fn new(sub_taps: &[T], half: usize) -> Self {
        let len = half * 2;
        let rdft = RealDft::new(len);
        let mut scratch = rdft.make_scratch();

        let scale = <T as Sample>::from_f64(1.0 / half as f64);
        let mut padded = vec![T::zero(); len];
        for (dst, &src) in padded.iter_mut().zip(sub_taps.iter()) {
            *dst = src * scale;
        }
        let mut filter_spec = vec![Complex::new(T::zero(), T::zero()); rdft.spectrum_len()];
        rdft.forward(&padded, &mut filter_spec, &mut scratch);

        Self {
            spec: vec![Complex::new(T::zero(), T::zero()); filter_spec.len()],
            filter_spec,
            scratch,
            input: vec![T::zero(); half],
            output: vec![T::zero(); len],
            rdft,
        }
    }

    fn convolve(&mut self) {
        let half = self.input.len();
        self.output[..half].copy_from_slice(&self.input);
        self.output[half..].fill(T::zero());
        self.rdft
            .forward(&self.output, &mut self.spec, &mut self.scratch);
        for (s, f) in self.spec.iter_mut().zip(self.filter_spec.iter()) {
            *s *= *f;
        }
        self.rdft
            .inverse(&self.spec, &mut self.output, &mut self.scratch);
    }
}

/// Streaming FIR convolution with log-staggered partitions.
pub struct PartDftFilter<T: Sample> {
    inlet: SharedOutlet<T>,
    firlen: usize,
    min_half: usize,
    max_half: usize,
    /// Partition processed every block over the newest samples.
    part0: Arc<Mutex<Partition<T>>>,
    /// Staggered partitions; level k holds `min_half << k` taps.
    parts: Vec<Arc<Mutex<Partition<T>>>>,
    executor: Option<BgExecutor>,
    /// Input history; the newest `min_half` samples live at the tail.
    in_buf: Vec<T>,
    /// Rolling accumulator of length `2 * max_half`.
    overlap: Vec<T>,
    fraction: Vec<T>,
    fraction_len: usize,
    zero_pad: usize,
    end_reached: bool,
    dft_count: u64,
}

impl<T: Sample> PartDftFilter<T> {
    /// `min_dft_len` bounds the per-block transform (rounded up to a power
    /// of two); `multithread` dispatches due partitions to the worker pool.
    pub fn new(
        inlet: SharedOutlet<T>,
        taps: &[T],
        min_dft_len: usize,
        multithread: bool,
    ) -> Self {
        let firlen = taps.len();
        assert!(firlen >= 2, "partitioned filter needs at least 2 taps");
        let max_len = firlen.next_power_of_two();
        let max_half = max_len / 2;
        let min_len = min_dft_len.next_power_of_two();
        assert!(
            min_len <= max_len,
            "minimum DFT length exceeds the filter's DFT length"
        );
        let min_half = min_len / 2;
        let levels = (max_len.trailing_zeros() - min_len.trailing_zeros() + 1) as usize;

        // Slice the taps: min_half for the every-block partition, then
        // min_half, 2*min_half, ... for the staggered levels.
        let mut offset = min_half.min(firlen);
        let part0 = Arc::new(Mutex::new(Partition::new(&taps[..offset], min_half)));
        let parts = (0..levels)
            .map(|level| {
                let half = min_half << level;
                let end = (offset + half).min(firlen);
                let part = Arc::new(Mutex::new(Partition::new(&taps[offset..end], half)));
                offset = end;
                part
            })
            .collect();

        Self {
            inlet,
            firlen,
            min_half,
            max_half,
            part0,
            parts,
            executor: multithread.then(BgExecutor::new),
            in_buf: vec![T::zero(); max_half + min_half],
            overlap: vec![T::zero(); max_len],
            fraction: vec![T::zero(); min_half],
            fraction_len: 0,
            zero_pad: 0,
            end_reached: false,
            dft_count: 0,
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

impl<T: Sample> Outlet<T> for PartDftFilter<T> {
    fn at_end(&mut self) -> bool {
        self.end_reached && self.zero_pad == 0 && self.fraction_len == 0
    }

    fn read(&mut self, out: &mut [T]) -> usize {
        let mut opos = 0;
        self.drain_fraction(out, &mut opos);

        while opos < out.len() && (!self.end_reached || self.zero_pad != 0) {
            // Append a block of min_half samples at the tail of the
            // history; after end-of-stream the firlen tail is zeros.
            let base = self.max_half;
            let mut nread = 0;
            while nread < self.min_half {
                if !self.end_reached {
                    let r = self
                        .inlet
                        .lock()
                        .unwrap()
                        .read(&mut self.in_buf[base + nread..base + self.min_half]);
                    if r == 0 {
                        self.end_reached = true;
                        self.zero_pad = self.firlen;
                    }
                    nread += r;
                } else {
                    let r = (self.min_half - nread).min(self.zero_pad);
                    self.in_buf[base + nread..base + nread + r].fill(T::zero());
                    nread += r;
                    self.zero_pad -= r;
                    if self.zero_pad == 0 {
                        break;
                    }
                }
            }
            self.in_buf[base + nread..].fill(T::zero());

            // Stage every partition that falls due this block: the first
            // partition sees the newest samples, level k a window of
            // history ending just before them.
            let mut active = Vec::with_capacity(self.parts.len() + 1);
            self.part0
                .lock()
                .unwrap()
                .input
                .copy_from_slice(&self.in_buf[base..]);
            active.push(Arc::clone(&self.part0));
            for (level, part) in self.parts.iter().enumerate() {
                if level != 0 && self.dft_count & ((1 << level) - 1) != 0 {
                    continue;
                }
                let half = self.min_half << level;
                part.lock()
                    .unwrap()
                    .input
                    .copy_from_slice(&self.in_buf[self.max_half - half..self.max_half]);
                active.push(Arc::clone(part));
            }

            if let Some(exec) = &self.executor {
                for part in &active {
                    let part = Arc::clone(part);
                    exec.push_fn(move || part.lock().unwrap().convolve());
                }
                for _ in &active {
                    exec.pop();
                }
            } else {
                for part in &active {
                    part.lock().unwrap().convolve();
                }
            }

            // Additions into the accumulator are serialized here, after
            // every partition of the block has completed.
            for part in &active {
                let part = part.lock().unwrap();
                for (acc, &v) in self.overlap.iter_mut().zip(part.output.iter()) {
                    *acc = *acc + v;
                }
            }

            let n_out = nread.min(out.len() - opos);
            out[opos..opos + n_out].copy_from_slice(&self.overlap[..n_out]);
            if n_out < nread {
                for i in 0..nread - n_out {
                    self.fraction[i] = self.overlap[n_out + i];
                }
                self.fraction_len = nread - n_out;
            }

            // Slide history and accumulator one block forward.
            self.in_buf.copy_within(self.min_half.., 0);
            self.overlap.copy_within(self.min_half.., 0);
            let tail = self.overlap.len() - self.min_half;
            self.overlap[tail..].fill(T::zero());

            opos += n_out;
            self.dft_count += 1;
            if self.fraction_len > 0 {
                break;
            }
        }

        opos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dft_filter::DftFilter;
    use crate::source::{collect, VecSource};
    use remuestra_core::shared;

    fn compare_against_monolithic(taps: &[f64], input: &[f64], min_len: usize, mt: bool) {
        let part = PartDftFilter::new(
            shared(VecSource::new(input.to_vec())),
            taps,
            min_len,
            mt,
        );
        let full = DftFilter::new(shared(VecSource::new(input.to_vec())), taps);

        let got = collect(&shared(part), 61);
        let want = collect(&shared(full), 61);
        assert_eq!(got.len(), want.len());
        for (i, (g, w)) in got.iter().zip(want.iter()).enumerate() {
            assert!((g - w).abs() < 1e-9, "sample {i}: {g} vs {w}");
        }
    }

    #[test]
    fn matches_monolithic_filter() {
        let taps = crate::kaiser::make_lpf_with_len::<f64>(48000.0, 10000.0, 255, 96.0, 1.0);
        let input: Vec<f64> = (0..2000).map(|i| (i as f64 * 0.043).sin()).collect();
        compare_against_monolithic(&taps, &input, 32, false);
    }

    #[test]
    fn matches_monolithic_filter_multithreaded() {
        let taps = crate::kaiser::make_lpf_with_len::<f64>(48000.0, 10000.0, 511, 96.0, 1.0);
        let input: Vec<f64> = (0..3000).map(|i| (i as f64 * 0.029).sin()).collect();
        compare_against_monolithic(&taps, &input, 64, true);
    }

    #[test]
    fn single_level_degenerate_case() {
        // min length equal to the filter's own DFT length still works.
        let taps = vec![0.4f64, 0.3, 0.2, 0.1];
        let input: Vec<f64> = (0..64).map(|i| i as f64 * 0.1).collect();
        compare_against_monolithic(&taps, &input, 4, false);
    }

    #[test]
    fn short_input_flushes_full_tail() {
        let taps = crate::kaiser::make_lpf_with_len::<f64>(48000.0, 8000.0, 127, 80.0, 1.0);
        let input = vec![1.0f64; 16];
        compare_against_monolithic(&taps, &input, 16, false);
    }
}
