//! Sample-rate conversion orchestration.
//!
//! [`Ssrc`] designs the two low-pass filters and wires the per-channel
//! pipeline. With `lcm = lcm(src, dst)`, `hi`/`lo` the larger and smaller
//! rate, an oversampling multiplier `m ∈ {1, 2, 3}` dividing `lcm/hi`
//! picks the internal rate `fs_os = hi * m`:
//!
//! - upsampling: `src -> FastPp(src -> lcm -> fs_os) -> DFT filter ->
//!   Undersample(fs_os -> dst)`
//! - downsampling: `src -> Oversample(src -> fs_os) -> DFT filter ->
//!   FastPp(fs_os -> lcm -> dst)`
//! - equal rates: pass-through.
//!
//! The polyphase anti-image filter runs on the LCM grid with its pass band
//! set by the `guard` factor; the anti-alias filter runs at `fs_os` with
//! the transition width its DFT length affords. Minimum-phase mode
//! replaces both filters by their cepstral equivalents.

use remuestra_core::{shared, Outlet, SharedOutlet};

use crate::dft_filter::DftFilter;
use crate::error::{Error, Result};
use crate::fastpp::FastPp;
use crate::kaiser;
use crate::minphase::minimum_phase;
use crate::part_dft_filter::PartDftFilter;
use crate::sample::Sample;

const BLOCK: usize = 65536;

/// Conversion parameters; the quality profiles map onto this.
#[derive(Debug, Clone)]
pub struct SsrcParams {
    /// log2 of the anti-alias DFT filter length.
    pub log2_dft_len: u32,
    /// Stop-band attenuation in dB.
    pub aa: f64,
    /// Guard factor trading transition width for pass-band margin.
    pub guard: f64,
    /// Linear output gain folded into the anti-image filter.
    pub gain: f64,
    /// Replace both filters by their minimum-phase equivalents.
    pub min_phase: bool,
    /// Bound per-block transform cost with a partitioned convolution of
    /// this minimum log2 length.
    pub log2_min_dft_len: Option<u32>,
    /// Run partitions of the partitioned convolution on the worker pool.
    pub multithread: bool,
}

impl Default for SsrcParams {
    fn default() -> Self {
        Self {
            log2_dft_len: 12,
            aa: 96.0,
            guard: 1.0,
            gain: 1.0,
            min_phase: false,
            log2_min_dft_len: None,
            multithread: false,
        }
    }
}

/// Inserts `m - 1` zeros after every input sample.
struct Oversample<T> {
    inlet: SharedOutlet<T>,
    m: usize,
    remaining: usize,
    buf: Vec<T>,
    end: bool,
}

impl<T: Sample> Oversample<T> {
    fn new(inlet: SharedOutlet<T>, src_fs: i64, dst_fs: i64) -> Self {
        Self {
            inlet,
            m: (dst_fs / src_fs) as usize,
            remaining: 0,
            buf: vec![T::zero(); BLOCK],
            end: false,
        }
    }
}

impl<T: Sample> Outlet<T> for Oversample<T> {
    fn at_end(&mut self) -> bool {
        self.end
    }

    fn read(&mut self, out: &mut [T]) -> usize {
        let mut opos = 0;

        while opos < out.len() && self.remaining > 0 {
            out[opos] = T::zero();
            opos += 1;
            self.remaining -= 1;
        }

        while opos < out.len() {
            let want = (out.len() - opos).div_ceil(self.m).min(BLOCK);
            let nread = self.inlet.lock().unwrap().read(&mut self.buf[..want]);
            if nread == 0 {
                self.end = true;
                break;
            }

            for i in 0..nread - 1 {
                out[opos] = self.buf[i];
                opos += 1;
                for _ in 0..self.m - 1 {
                    out[opos] = T::zero();
                    opos += 1;
                }
            }

            out[opos] = self.buf[nread - 1];
            opos += 1;
            for j in 0..self.m - 1 {
                if opos == out.len() {
                    self.remaining = self.m - 1 - j;
                    break;
                }
                out[opos] = T::zero();
                opos += 1;
            }
        }

        opos
    }
}

/// Keeps every `m`-th sample.
struct Undersample<T> {
    inlet: SharedOutlet<T>,
    m: usize,
    buf: Vec<T>,
    end: bool,
}

impl<T: Sample> Undersample<T> {
    fn new(inlet: SharedOutlet<T>, src_fs: i64, dst_fs: i64) -> Self {
        let m = (src_fs / dst_fs) as usize;
        Self {
            inlet,
            m,
            buf: vec![T::zero(); BLOCK * m],
            end: false,
        }
    }
}

impl<T: Sample> Outlet<T> for Undersample<T> {
    fn at_end(&mut self) -> bool {
        self.end
    }

    fn read(&mut self, out: &mut [T]) -> usize {
        let mut opos = 0;

        while opos < out.len() && !self.end {
            let to_read = (out.len() - opos).min(BLOCK) * self.m;
            let mut nread = 0;
            while nread < to_read {
                let r = self.inlet.lock().unwrap().read(&mut self.buf[nread..to_read]);
                if r == 0 {
                    self.end = true;
                    break;
                }
                nread += r;
            }

            let mut i = 0;
            while i < nread {
                out[opos] = self.buf[i];
                opos += 1;
                i += self.m;
            }
        }

        opos
    }
}

enum Tail<T> {
    Pass(SharedOutlet<T>),
    Stage(Box<dyn Outlet<T>>),
}

/// Streaming sample-rate converter for one channel.
pub struct Ssrc<T: Sample> {
    tail: Tail<T>,
    delay: f64,
}

impl<T: Sample> std::fmt::Debug for Ssrc<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ssrc").field("delay", &self.delay).finish()
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

impl<T: Sample> Ssrc<T> {
    pub fn new(
        inlet: SharedOutlet<T>,
        src_fs: i64,
        dst_fs: i64,
        params: &SsrcParams,
    ) -> Result<Self> {
        if src_fs == dst_fs {
            return Ok(Self {
                tail: Tail::Pass(inlet),
                delay: 0.0,
            });
        }

        let lcm = src_fs / gcd(src_fs, dst_fs) * dst_fs;
        let lo = src_fs.min(dst_fs);
        let hi = src_fs.max(dst_fs);

        let ratio = lcm / hi;
        let osm = if ratio == 1 {
            1
        } else if ratio % 2 == 0 {
            2
        } else if ratio % 3 == 0 {
            3
        } else {
            return Err(Error::UnsupportedRatio {
                src: src_fs,
                dst: dst_fs,
                ratio,
            });
        };
        let fs_os = hi * osm;

        let dft_len = 1i64 << params.log2_dft_len;

        // Anti-image low pass on the LCM grid. The guard factor
        // interpolates the pass edge between lo/2 (no guard) and fs_os/2
        // (infinite guard), narrowing the transition band to match.
        let fp = (fs_os as f64 + (lo - fs_os) as f64 / (1.0 + params.guard)) / 2.0;
        let df = (fs_os - lo) as f64 / (1.0 + params.guard);
        let ppf_gain = lcm as f64 / src_fs as f64 * params.gain;
        let mut ppfv = kaiser::make_lpf::<T>(lcm as f64, fp, df, params.aa, ppf_gain);

        // Anti-alias low pass at the oversampled rate, sized by the DFT
        // length the profile affords.
        let df2 = kaiser::transition_band_width(params.aa, fs_os as f64, (dft_len - 1) as usize);
        let mut dftfv = kaiser::make_lpf_with_len::<T>(
            fs_os as f64,
            lo as f64 / 2.0 - df2,
            (dft_len - 1) as usize,
            params.aa,
            1.0,
        );

        if params.min_phase {
            ppfv = minimum_phase(&ppfv);
            dftfv = minimum_phase(&dftfv);
        }

        // Linear-phase group delay of both filters in destination samples.
        // Minimum-phase mode concentrates the response near zero delay;
        // the value reported here is then an upper bound.
        let delay = ((ppfv.len() as f64 * 0.5 - 1.0) / lcm as f64
            + (dftfv.len() as f64 * 0.5 - 1.0) / fs_os as f64)
            * dst_fs as f64;

        log::debug!(
            "ssrc {src_fs} -> {dst_fs} Hz: lcm {lcm}, oversample x{osm}, \
             anti-image {} taps, anti-alias {} taps, delay {delay:.1}",
            ppfv.len(),
            dftfv.len(),
        );

        let part_min_len = params.log2_min_dft_len.and_then(|l2| {
            let min_len = 1usize << l2;
            (min_len < dft_len as usize).then_some(min_len)
        });
        let make_filter = |inlet: SharedOutlet<T>| -> SharedOutlet<T> {
            match part_min_len {
                Some(min_len) => shared(PartDftFilter::new(
                    inlet,
                    &dftfv,
                    min_len,
                    params.multithread,
                )),
                None => shared(DftFilter::new(inlet, &dftfv)),
            }
        };

        let tail: Box<dyn Outlet<T>> = if dst_fs > src_fs {
            let ppf = shared(FastPp::new(inlet, src_fs, lcm, fs_os, &ppfv));
            let filt = make_filter(ppf);
            Box::new(Undersample::new(filt, fs_os, dst_fs))
        } else {
            let ov = shared(Oversample::new(inlet, src_fs, fs_os));
            let filt = make_filter(ov);
            Box::new(FastPp::new(filt, fs_os, lcm, dst_fs, &ppfv))
        };

        Ok(Self {
            tail: Tail::Stage(tail),
            delay,
        })
    }

    /// Reported pipeline delay in destination samples.
    pub fn delay(&self) -> f64 {
        self.delay
    }
}

impl<T: Sample> Outlet<T> for Ssrc<T> {
    fn at_end(&mut self) -> bool {
        match &mut self.tail {
            Tail::Pass(inlet) => inlet.lock().unwrap().at_end(),
            Tail::Stage(stage) => stage.at_end(),
        }
    }

    fn read(&mut self, out: &mut [T]) -> usize {
        match &mut self.tail {
            Tail::Pass(inlet) => inlet.lock().unwrap().read(out),
            Tail::Stage(stage) => stage.read(out),
        }
    }
}
