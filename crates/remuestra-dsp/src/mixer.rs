//! Matrix channel mixing.
//!
//! Maps an N-channel upstream provider onto M output channels through a
//! gain matrix: `out[c] = sum_i matrix[c][i] * in[i]` per frame. All outlets
//! share one refill path under a single mutex so pulls across channels
//! stay frame-aligned regardless of which outlet is read first.

use std::sync::{Arc, Mutex};

use remuestra_core::{ArrayQueue, Outlet, OutletProvider, SharedOutlet, StreamFormat};

use crate::error::{Error, Result};
use crate::sample::Sample;

struct MixerCore<T> {
    inputs: Vec<SharedOutlet<T>>,
    matrix: Vec<Vec<f64>>,
    queues: Vec<ArrayQueue<T>>,
    in_bufs: Vec<Vec<T>>,
    out_buf: Vec<T>,
}

impl<T: Sample> MixerCore<T> {
    /// Pulls `n` frames from every input, zero-padding ragged ends, mixes
    /// them and appends the result to every output queue. Returns the
    /// number of frames produced.
    fn refill(&mut self, n: usize) -> usize {
        let snch = self.inputs.len();
        let dnch = self.matrix.len();

        let mut n_read = 0;
        for (ic, input) in self.inputs.iter().enumerate() {
            let buf = &mut self.in_bufs[ic];
            buf.resize(n, T::zero());
            let z = input.lock().unwrap().read(&mut buf[..n]);
            buf[z..n].fill(T::zero());
            n_read = n_read.max(z);
        }

        for oc in 0..dnch {
            self.out_buf.resize(n_read, T::zero());
            for (pos, out) in self.out_buf.iter_mut().enumerate() {
                let mut acc = 0.0;
                for ic in 0..snch {
                    acc += self.in_bufs[ic][pos].to_f64() * self.matrix[oc][ic];
                }
                *out = <T as Sample>::from_f64(acc);
            }
            self.queues[oc].write(&self.out_buf);
        }

        n_read
    }

    fn all_inputs_at_end(&mut self) -> bool {
        self.inputs
            .iter()
            .all(|input| input.lock().unwrap().at_end())
    }
}

struct MixerOutlet<T> {
    core: Arc<Mutex<MixerCore<T>>>,
    channel: usize,
}

impl<T: Sample> Outlet<T> for MixerOutlet<T> {
    fn at_end(&mut self) -> bool {
        let mut core = self.core.lock().unwrap();
        core.queues[self.channel].is_empty() && core.all_inputs_at_end()
    }

    fn read(&mut self, buf: &mut [T]) -> usize {
        let mut core = self.core.lock().unwrap();
        let mut have = core.queues[self.channel].len();
        if have < buf.len() {
            have += core.refill(buf.len() - have);
        }
        let n = have.min(buf.len());
        core.queues[self.channel].read(&mut buf[..n])
    }
}

/// N-in, M-out matrix mixer exposing one outlet per output channel.
pub struct ChannelMixer<T> {
    outlets: Vec<SharedOutlet<T>>,
    format: StreamFormat,
}

impl<T> std::fmt::Debug for ChannelMixer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelMixer")
            .field("outlets", &self.outlets.len())
            .field("format", &self.format)
            .finish()
    }
}

impl<T: Sample> ChannelMixer<T> {
    /// Builds a mixer over `input`'s outlets. Every matrix row must have
    /// exactly one entry per input channel.
    pub fn new(input: &dyn OutletProvider<T>, matrix: Vec<Vec<f64>>) -> Result<Self> {
        let mut format = input.format();
        let snch = format.channels as usize;
        for (row, coefs) in matrix.iter().enumerate() {
            if coefs.len() != snch {
                return Err(Error::MatrixShape {
                    row,
                    got: coefs.len(),
                    expected: snch,
                });
            }
        }
        let dnch = matrix.len();
        format.channels = dnch as u16;

        let inputs = (0..snch as u32).map(|c| input.outlet(c)).collect();
        let core = Arc::new(Mutex::new(MixerCore {
            inputs,
            matrix,
            queues: (0..dnch).map(|_| ArrayQueue::new()).collect(),
            in_bufs: vec![Vec::new(); snch],
            out_buf: Vec::new(),
        }));
        let outlets = (0..dnch)
            .map(|channel| {
                let outlet: SharedOutlet<T> = Arc::new(Mutex::new(MixerOutlet {
                    core: Arc::clone(&core),
                    channel,
                }));
                outlet
            })
            .collect();

        Ok(Self { outlets, format })
    }
}

impl<T: Sample> OutletProvider<T> for ChannelMixer<T> {
    fn outlet(&self, channel: u32) -> SharedOutlet<T> {
        self.outlets[channel as usize].clone()
    }

    fn format(&self) -> StreamFormat {
        self.format.clone()
    }
}
