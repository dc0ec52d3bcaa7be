//! Push-pull adapter over the pull-based graph.
//!
//! The graph is pull-driven from its sink, but streaming callers want a
//! `process(in, out)` shape. The adapter exposes one inlet outlet per
//! channel for the graph to pull from, runs one tail thread per channel
//! pulling the graph's final outlets into result queues, and recombines
//! the per-channel results frame-by-frame.
//!
//! Lifecycle is a strict state machine:
//!
//! ```text
//! Init --clamp--> Clamped --start--> Started --drain--> Draining --stop--> Stopped
//! ```
//!
//! [`flow`](Soxifier::flow) is valid in `Started` and `Draining`; calling
//! anything out of order is a programmer error and panics.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use remuestra_core::{shared, ArrayQueue, Outlet, OutletProvider, SharedOutlet, StreamFormat};

use crate::sample::Sample;

const BLOCK: usize = 65536;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Init,
    Clamped,
    Started,
    Draining,
    Stopped,
}

struct ChanState<T> {
    in_queue: ArrayQueue<T>,
    out_queue: ArrayQueue<T>,
    draining: bool,
    shutdown: bool,
    finished: bool,
}

struct Channel<T> {
    state: Mutex<ChanState<T>>,
    cond: Condvar,
}

impl<T: Sample> Channel<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(ChanState {
                in_queue: ArrayQueue::new(),
                out_queue: ArrayQueue::new(),
                draining: false,
                shutdown: false,
                finished: false,
            }),
            cond: Condvar::new(),
        }
    }
}

/// Graph-side source outlet of one adapter channel.
struct SoxInlet<T> {
    chan: Arc<Channel<T>>,
}

impl<T: Sample> Outlet<T> for SoxInlet<T> {
    fn at_end(&mut self) -> bool {
        let state = self.chan.state.lock().unwrap();
        state.in_queue.is_empty() && (state.draining || state.shutdown)
    }

    fn read(&mut self, buf: &mut [T]) -> usize {
        let mut state = self.chan.state.lock().unwrap();
        while state.in_queue.is_empty() && !state.draining && !state.shutdown {
            state = self.chan.cond.wait(state).unwrap();
        }
        let n = state.in_queue.read(buf);
        if state.in_queue.is_empty() {
            self.chan.cond.notify_all();
        }
        n
    }
}

/// Push-pull adapter; `T` is the sample type on both sides.
pub struct Soxifier<T: Sample> {
    nch: usize,
    format: StreamFormat,
    channels: Vec<Arc<Channel<T>>>,
    inlets: Vec<SharedOutlet<T>>,
    tails: Vec<SharedOutlet<T>>,
    threads: Vec<JoinHandle<()>>,
    state: State,
}

impl<T: Sample> Soxifier<T> {
    pub fn new(nch: usize) -> Self {
        let channels: Vec<_> = (0..nch).map(|_| Arc::new(Channel::new())).collect();
        let inlets = channels
            .iter()
            .map(|chan| {
                shared(SoxInlet {
                    chan: Arc::clone(chan),
                })
            })
            .collect();
        Self {
            nch,
            format: StreamFormat::new(remuestra_core::FormatTag::IeeeFloat, nch as u16, 0, 32),
            channels,
            inlets,
            tails: Vec::new(),
            threads: Vec::new(),
            state: State::Init,
        }
    }

    /// Attaches the graph's tail outlets, one per channel.
    pub fn clamp(&mut self, tails: Vec<SharedOutlet<T>>) {
        assert_eq!(self.state, State::Init, "clamp requires the Init state");
        assert_eq!(tails.len(), self.nch, "one tail outlet per channel");
        self.tails = tails;
        self.state = State::Clamped;
    }

    /// Starts the per-channel tail threads and begins streaming.
    pub fn start(&mut self, format: StreamFormat) {
        assert_eq!(self.state, State::Clamped, "start requires the Clamped state");
        assert_eq!(
            format.channels as usize, self.nch,
            "format channel count must match"
        );
        self.format = format;

        for (ch, chan) in self.channels.iter().enumerate() {
            let chan = Arc::clone(chan);
            let tail = Arc::clone(&self.tails[ch]);
            let handle = std::thread::Builder::new()
                .name(format!("soxifier-tail-{ch}"))
                .spawn(move || {
                    let mut buf = vec![T::zero(); BLOCK];
                    loop {
                        let n = tail.lock().unwrap().read(&mut buf);
                        if n == 0 {
                            break;
                        }
                        let mut state = chan.state.lock().unwrap();
                        if state.shutdown {
                            continue;
                        }
                        state.out_queue.write(&buf[..n]);
                    }
                    let mut state = chan.state.lock().unwrap();
                    state.finished = true;
                    chan.cond.notify_all();
                })
                .expect("failed to spawn tail thread");
            self.threads.push(handle);
        }

        self.state = State::Started;
    }

    /// Interleaved frames available across every channel's result queue.
    fn collectable(&self) -> usize {
        self.channels
            .iter()
            .map(|chan| chan.state.lock().unwrap().out_queue.len())
            .min()
            .unwrap_or(0)
    }

    /// Moves up to `frames` interleaved frames into `out`; returns the
    /// count moved.
    fn collect_output(&self, out: &mut [T], frames: usize) -> usize {
        let n = self.collectable().min(frames);
        if n == 0 {
            return 0;
        }
        let mut chbuf = vec![T::zero(); n];
        for (ch, chan) in self.channels.iter().enumerate() {
            {
                let mut state = chan.state.lock().unwrap();
                state.out_queue.read(&mut chbuf);
            }
            for (i, &v) in chbuf.iter().enumerate() {
                out[i * self.nch + ch] = v;
            }
        }
        n
    }

    /// Pushes `input` (interleaved frames) through the graph and collects
    /// whatever output is ready into `output`. Returns `(frames_consumed,
    /// frames_produced)`; the input is always fully consumed.
    pub fn flow(&mut self, input: &[T], output: &mut [T]) -> (usize, usize) {
        assert!(
            self.state == State::Started || self.state == State::Draining,
            "flow requires the Started or Draining state"
        );
        let in_frames = input.len() / self.nch;
        let out_capacity = output.len() / self.nch;
        let mut produced = 0;

        produced += self.collect_output(output, out_capacity);

        for (ch, chan) in self.channels.iter().enumerate() {
            let mut v = vec![T::zero(); in_frames];
            for (i, s) in v.iter_mut().enumerate() {
                *s = input[i * self.nch + ch];
            }
            let mut state = chan.state.lock().unwrap();
            if !v.is_empty() {
                state.in_queue.write_buf(v);
            }
            chan.cond.notify_all();
        }

        // Wait until the graph has pulled everything we just pushed.
        for chan in &self.channels {
            let mut state = chan.state.lock().unwrap();
            while !state.in_queue.is_empty() {
                state = chan.cond.wait(state).unwrap();
            }
        }

        produced += self.collect_output(&mut output[produced * self.nch..], out_capacity - produced);

        (in_frames, produced)
    }

    /// Signals end-of-input, waits for every tail thread to observe
    /// end-of-stream, and collects remaining output. Call repeatedly until
    /// it produces 0 frames.
    pub fn drain(&mut self, output: &mut [T]) -> usize {
        assert!(
            self.state == State::Started || self.state == State::Draining,
            "drain requires the Started or Draining state"
        );

        if self.state != State::Draining {
            self.state = State::Draining;
            for chan in &self.channels {
                let mut state = chan.state.lock().unwrap();
                state.draining = true;
                chan.cond.notify_all();
                while !state.finished {
                    state = chan.cond.wait(state).unwrap();
                }
            }
        }

        let (_, produced) = self.flow(&[], output);
        produced
    }

    /// Stops streaming; outstanding output is discarded.
    pub fn stop(&mut self) {
        assert!(
            self.state == State::Started || self.state == State::Draining,
            "stop requires the Started or Draining state"
        );
        self.state = State::Stopped;
        for chan in &self.channels {
            let mut state = chan.state.lock().unwrap();
            state.draining = true;
            chan.cond.notify_all();
        }
    }

    pub fn channels(&self) -> usize {
        self.nch
    }
}

impl<T: Sample> OutletProvider<T> for Soxifier<T> {
    fn outlet(&self, channel: u32) -> SharedOutlet<T> {
        self.inlets[channel as usize].clone()
    }

    fn format(&self) -> StreamFormat {
        self.format.clone()
    }
}

impl<T: Sample> Drop for Soxifier<T> {
    fn drop(&mut self) {
        for chan in &self.channels {
            let mut state = chan.state.lock().unwrap();
            state.shutdown = true;
            chan.cond.notify_all();
        }
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssrc::{Ssrc, SsrcParams};
    use remuestra_core::FormatTag;

    fn float_format(nch: u16, rate: u32) -> StreamFormat {
        StreamFormat::new(FormatTag::IeeeFloat, nch, rate, 32)
    }

    /// Identity graph: the adapter's own inlets are clamped directly as
    /// tails, so flow() echoes its input.
    #[test]
    fn echo_round_trip() {
        let mut sox = Soxifier::<f32>::new(2);
        let tails: Vec<_> = (0..2).map(|c| sox.outlet(c)).collect();
        sox.clamp(tails);
        sox.start(float_format(2, 48000));

        let input: Vec<f32> = (0..512).map(|i| i as f32).collect();
        let mut output = vec![0.0f32; 1024];
        let mut got = Vec::new();

        let (consumed, produced) = sox.flow(&input, &mut output);
        assert_eq!(consumed, 256);
        got.extend_from_slice(&output[..produced * 2]);

        loop {
            let produced = sox.drain(&mut output);
            if produced == 0 {
                break;
            }
            got.extend_from_slice(&output[..produced * 2]);
        }

        assert_eq!(got, input);
        sox.stop();
    }

    /// Full push-pull resampling: two channels of a 44.1 kHz tone through
    /// per-channel SSRC stages to 48 kHz.
    #[test]
    fn resampling_through_the_adapter() {
        let mut sox = Soxifier::<f32>::new(2);
        let params = SsrcParams {
            log2_dft_len: 10,
            ..SsrcParams::default()
        };
        let tails: Vec<SharedOutlet<f32>> = (0..2)
            .map(|c| {
                let ssrc = Ssrc::new(sox.outlet(c), 44100, 48000, &params).unwrap();
                shared(ssrc)
            })
            .collect();
        sox.clamp(tails);
        sox.start(float_format(2, 48000));

        let frames = 44100;
        let input: Vec<f32> = (0..frames * 2)
            .map(|i| {
                let frame = i / 2;
                (2.0 * std::f32::consts::PI * 440.0 * frame as f32 / 44100.0).sin() * 0.5
            })
            .collect();

        let mut output = vec![0.0f32; 32768];
        let mut total = 0usize;
        for chunk in input.chunks(8192) {
            let (_, produced) = sox.flow(chunk, &mut output);
            total += produced;
        }
        loop {
            let produced = sox.drain(&mut output);
            if produced == 0 {
                break;
            }
            total += produced;
        }

        // 1 second in, ~1 second out at the new rate plus the filter tail.
        assert!(total >= 48000, "only {total} frames out");
        sox.stop();
    }

    #[test]
    #[should_panic(expected = "flow requires")]
    fn flow_before_start_panics() {
        let mut sox = Soxifier::<f64>::new(1);
        let mut out = [0.0f64; 8];
        sox.flow(&[], &mut out);
    }

    #[test]
    #[should_panic(expected = "start requires")]
    fn start_before_clamp_panics() {
        let mut sox = Soxifier::<f64>::new(1);
        sox.start(float_format(1, 44100));
    }
}
