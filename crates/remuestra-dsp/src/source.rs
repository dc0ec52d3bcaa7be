//! Signal sources: buffers, impulse trains and sweeps.
//!
//! These stages sit at the root of a graph. The generators mirror the
//! original converter's test-signal options and give end-to-end scenarios
//! a source that needs no container I/O.

use remuestra_core::{shared, Outlet, OutletProvider, SharedOutlet, StreamFormat};

use crate::sample::Sample;

/// Replays an owned buffer.
pub struct VecSource<T> {
    data: Vec<T>,
    pos: usize,
}

impl<T> VecSource<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self { data, pos: 0 }
    }
}

impl<T: Sample> Outlet<T> for VecSource<T> {
    fn at_end(&mut self) -> bool {
        self.pos >= self.data.len()
    }

    fn read(&mut self, buf: &mut [T]) -> usize {
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        n
    }
}

/// Pulls an outlet to exhaustion and returns everything it produced.
pub fn collect<T: Sample>(outlet: &SharedOutlet<T>, block: usize) -> Vec<T> {
    let mut all = Vec::new();
    let mut buf = vec![T::zero(); block];
    loop {
        let n = outlet.lock().unwrap().read(&mut buf);
        if n == 0 {
            break;
        }
        all.extend_from_slice(&buf[..n]);
    }
    all
}

struct ImpulseOutlet<T> {
    amp: f64,
    period: usize,
    remaining: usize,
    left: usize,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Sample> Outlet<T> for ImpulseOutlet<T> {
    fn at_end(&mut self) -> bool {
        self.left == 0
    }

    fn read(&mut self, buf: &mut [T]) -> usize {
        let total = buf.len().min(self.left);
        let mut done = 0;
        while done < total {
            while self.remaining > 0 && done < total {
                buf[done] = T::zero();
                done += 1;
                self.remaining -= 1;
            }
            if done == total {
                break;
            }
            buf[done] = <T as Sample>::from_f64(self.amp);
            done += 1;
            self.remaining = self.period - 1;
        }
        self.left -= total;
        total
    }
}

/// Periodic unit impulses: `period - 1` zeros, then a pulse of amplitude
/// `amp`, repeated until `total` samples have been produced per channel.
pub struct ImpulseGenerator<T> {
    format: StreamFormat,
    outlets: Vec<SharedOutlet<T>>,
}

impl<T: Sample> ImpulseGenerator<T> {
    pub fn new(format: StreamFormat, amp: f64, period: usize, total: usize) -> Self {
        let outlets = (0..format.channels)
            .map(|_| {
                shared(ImpulseOutlet::<T> {
                    amp,
                    period,
                    remaining: period - 1,
                    left: total,
                    _marker: std::marker::PhantomData,
                })
            })
            .collect();
        Self { format, outlets }
    }
}

impl<T: Sample> OutletProvider<T> for ImpulseGenerator<T> {
    fn outlet(&self, channel: u32) -> SharedOutlet<T> {
        self.outlets[channel as usize].clone()
    }

    fn format(&self) -> StreamFormat {
        self.format.clone()
    }
}

struct SweepOutlet<T> {
    fs: f64,
    ch_offset: f64,
    start: f64,
    end: f64,
    amp: f64,
    total: usize,
    left: usize,
    phase: f64,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Sample> Outlet<T> for SweepOutlet<T> {
    fn at_end(&mut self) -> bool {
        self.left == 0
    }

    fn read(&mut self, buf: &mut [T]) -> usize {
        let n = buf.len().min(self.left);
        for (i, s) in buf[..n].iter_mut().enumerate() {
            *s = <T as Sample>::from_f64(self.amp * (self.phase + self.ch_offset).sin());
            let f = self.end + (self.start - self.end) * (self.left - i) as f64 / self.total as f64;
            self.phase += 2.0 * std::f64::consts::PI * f / self.fs;
        }
        self.left -= n;
        n
    }
}

/// Linear frequency sweep from `start` to `end` Hz over `total` samples.
///
/// Channels beyond the first get a constant phase offset so that a
/// multi-channel sweep is not perfectly correlated across channels.
pub struct SweepGenerator<T> {
    format: StreamFormat,
    outlets: Vec<SharedOutlet<T>>,
}

impl<T: Sample> SweepGenerator<T> {
    pub fn new(format: StreamFormat, start: f64, end: f64, amp: f64, total: usize) -> Self {
        let fs = format.sample_rate as f64;
        let outlets = (0..format.channels)
            .map(|ch| {
                shared(SweepOutlet::<T> {
                    fs,
                    ch_offset: if start == 0.0 && end == 0.0 { 0.0 } else { ch as f64 },
                    start,
                    end,
                    amp,
                    total,
                    left: total,
                    phase: 0.0,
                    _marker: std::marker::PhantomData,
                })
            })
            .collect();
        Self { format, outlets }
    }
}

impl<T: Sample> OutletProvider<T> for SweepGenerator<T> {
    fn outlet(&self, channel: u32) -> SharedOutlet<T> {
        self.outlets[channel as usize].clone()
    }

    fn format(&self) -> StreamFormat {
        self.format.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remuestra_core::FormatTag;

    #[test]
    fn vec_source_round_trips() {
        let data: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let src = shared(VecSource::new(data.clone()));
        assert_eq!(collect(&src, 7), data);
    }

    #[test]
    fn impulse_generator_places_pulses() {
        let fmt = StreamFormat::new(FormatTag::IeeeFloat, 1, 44100, 32);
        let gen = ImpulseGenerator::<f64>::new(fmt, 1.0, 8, 40);
        let out = collect(&gen.outlet(0), 16);
        assert_eq!(out.len(), 40);
        for (i, &v) in out.iter().enumerate() {
            let expected = if i % 8 == 7 { 1.0 } else { 0.0 };
            assert_eq!(v, expected, "sample {i}");
        }
    }

    #[test]
    fn sweep_stays_within_amplitude() {
        let fmt = StreamFormat::new(FormatTag::IeeeFloat, 2, 48000, 32);
        let gen = SweepGenerator::<f32>::new(fmt, 20.0, 20000.0, 0.5, 4800);
        let left = collect(&gen.outlet(0), 1024);
        assert_eq!(left.len(), 4800);
        assert!(left.iter().all(|v| v.abs() <= 0.5 + 1e-6));
    }
}
