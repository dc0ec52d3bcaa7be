//! WAV reading and writing over the stage protocol.
//!
//! [`WavReader`] decodes integer or float WAV data into per-channel float
//! outlets in `[-1, +1]`. In multithreaded mode a prefetch thread decodes
//! ahead into a bounded blocking queue so the pipeline never stalls on
//! file I/O. [`WavWriter`] is the sink: `execute` pulls every channel
//! outlet to exhaustion (one worker-pool task per channel when
//! multithreaded), interleaves the results frame by frame and writes them
//! out.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use hound::SampleFormat;

use remuestra_core::{
    ArrayQueue, BgExecutor, BlockingArrayQueue, ContainerFormat, FormatTag, Outlet,
    OutletProvider, SharedOutlet, StreamFormat,
};
use remuestra_dsp::Sample;

use crate::error::{Error, Result};

/// Frames decoded or written per block.
const BLOCK_FRAMES: usize = 65536;

type HoundReader = hound::WavReader<BufReader<File>>;
type HoundWriter = hound::WavWriter<BufWriter<File>>;

fn decode_block<T: Sample>(
    reader: &mut HoundReader,
    spec: hound::WavSpec,
    dst: &mut Vec<T>,
    max_frames: usize,
) -> Result<usize> {
    let nch = spec.channels as usize;
    let want = max_frames * nch;
    dst.clear();

    match spec.sample_format {
        SampleFormat::Float => {
            for s in reader.samples::<f32>().take(want) {
                dst.push(<T as Sample>::from_f64(s? as f64));
            }
        }
        SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f64;
            for s in reader.samples::<i32>().take(want) {
                dst.push(<T as Sample>::from_f64(s? as f64 * scale));
            }
        }
    }

    // Drop any ragged trailing partial frame.
    let frames = dst.len() / nch;
    dst.truncate(frames * nch);
    Ok(frames)
}

enum ReaderSource<T> {
    /// Decode on the pulling thread.
    Direct(HoundReader),
    /// Decoded interleaved blocks arriving from the prefetch thread.
    Prefetch(Arc<BlockingArrayQueue<T>>),
}

struct ReaderCore<T> {
    source: ReaderSource<T>,
    spec: hound::WavSpec,
    queues: Vec<ArrayQueue<T>>,
    scratch: Vec<T>,
    done: bool,
    error: Arc<Mutex<Option<Error>>>,
}

impl<T: Sample> ReaderCore<T> {
    /// Decodes up to `frames` frames and distributes them to the
    /// per-channel queues. Returns the frame count.
    fn refill(&mut self, frames: usize) -> usize {
        if self.done {
            return 0;
        }
        let nch = self.spec.channels as usize;
        let frames = frames.min(BLOCK_FRAMES);

        let got = match &mut self.source {
            ReaderSource::Direct(reader) => {
                match decode_block(reader, self.spec, &mut self.scratch, frames) {
                    Ok(n) => n,
                    Err(e) => {
                        log::error!("wav read failed: {e}");
                        *self.error.lock().unwrap() = Some(e);
                        0
                    }
                }
            }
            ReaderSource::Prefetch(queue) => {
                self.scratch.resize(frames * nch, T::zero());
                let n = queue.read(&mut self.scratch) / nch;
                self.scratch.truncate(n * nch);
                n
            }
        };

        if got == 0 {
            self.done = true;
            return 0;
        }

        for (ch, queue) in self.queues.iter_mut().enumerate() {
            let v: Vec<T> = self.scratch.iter().skip(ch).step_by(nch).copied().collect();
            queue.write_buf(v);
        }
        got
    }
}

struct WavOutlet<T> {
    core: Arc<Mutex<ReaderCore<T>>>,
    channel: usize,
}

impl<T: Sample> Outlet<T> for WavOutlet<T> {
    fn at_end(&mut self) -> bool {
        let mut core = self.core.lock().unwrap();
        core.queues[self.channel].is_empty() && core.done
    }

    fn read(&mut self, buf: &mut [T]) -> usize {
        let mut core = self.core.lock().unwrap();
        let mut have = core.queues[self.channel].len();
        while have < buf.len() {
            let got = core.refill(buf.len() - have);
            if got == 0 {
                break;
            }
            have += got;
        }
        let n = have.min(buf.len());
        core.queues[self.channel].read(&mut buf[..n])
    }
}

/// Streaming WAV source exposing one float outlet per channel.
pub struct WavReader<T: Copy> {
    outlets: Vec<SharedOutlet<T>>,
    format: StreamFormat,
    frames: u64,
    error: Arc<Mutex<Option<Error>>>,
    prefetch: Option<JoinHandle<()>>,
    prefetch_queue: Option<Arc<BlockingArrayQueue<T>>>,
}

impl<T: Sample> WavReader<T> {
    /// Opens a WAV file. With `multithread`, a prefetch thread decodes
    /// ahead of the pipeline into a bounded queue.
    pub fn open<P: AsRef<Path>>(path: P, multithread: bool) -> Result<Self> {
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        let nch = spec.channels as usize;
        let frames = reader.duration() as u64;

        let tag = match spec.sample_format {
            SampleFormat::Float => FormatTag::IeeeFloat,
            SampleFormat::Int => FormatTag::Pcm,
        };
        let format = StreamFormat::new(tag, spec.channels, spec.sample_rate, spec.bits_per_sample);

        let error = Arc::new(Mutex::new(None));
        let mut prefetch = None;
        let mut prefetch_queue = None;

        let source = if multithread {
            let queue = Arc::new(BlockingArrayQueue::new(4 * BLOCK_FRAMES * nch));
            let thread_queue = Arc::clone(&queue);
            let thread_error = Arc::clone(&error);
            let handle = std::thread::Builder::new()
                .name("wav-prefetch".to_owned())
                .spawn(move || {
                    let mut block = Vec::new();
                    loop {
                        match decode_block::<T>(&mut reader, spec, &mut block, BLOCK_FRAMES) {
                            Ok(0) => break,
                            Ok(_) => thread_queue.write_buf(std::mem::take(&mut block)),
                            Err(e) => {
                                log::error!("wav prefetch failed: {e}");
                                *thread_error.lock().unwrap() = Some(e);
                                break;
                            }
                        }
                    }
                    thread_queue.close();
                })
                .expect("failed to spawn wav prefetch thread");
            prefetch = Some(handle);
            prefetch_queue = Some(Arc::clone(&queue));
            ReaderSource::Prefetch(queue)
        } else {
            ReaderSource::Direct(reader)
        };

        let core = Arc::new(Mutex::new(ReaderCore {
            source,
            spec,
            queues: (0..nch).map(|_| ArrayQueue::new()).collect(),
            scratch: Vec::new(),
            done: false,
            error: Arc::clone(&error),
        }));
        let outlets = (0..nch)
            .map(|channel| {
                let outlet: SharedOutlet<T> = Arc::new(Mutex::new(WavOutlet {
                    core: Arc::clone(&core),
                    channel,
                }));
                outlet
            })
            .collect();

        Ok(Self {
            outlets,
            format,
            frames,
            error,
            prefetch,
            prefetch_queue,
        })
    }

    /// Total frames declared by the header.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Takes the first decoding error observed, if any. Streams end early
    /// on a decoding error; the caller decides whether that is fatal.
    pub fn take_error(&self) -> Option<Error> {
        self.error.lock().unwrap().take()
    }
}

impl<T: Sample> OutletProvider<T> for WavReader<T> {
    fn outlet(&self, channel: u32) -> SharedOutlet<T> {
        self.outlets[channel as usize].clone()
    }

    fn format(&self) -> StreamFormat {
        self.format.clone()
    }

    fn container(&self) -> ContainerFormat {
        ContainerFormat::Riff
    }
}

impl<T: Copy> Drop for WavReader<T> {
    fn drop(&mut self) {
        if let Some(queue) = &self.prefetch_queue {
            queue.close();
        }
        if let Some(handle) = self.prefetch.take() {
            let _ = handle.join();
        }
    }
}

/// A sample type the writer can put into a WAV file.
///
/// `i32` writes quantized PCM (the dither stage's output), the float types
/// write IEEE float.
pub trait WavSample: Copy + Send + 'static {
    fn zero() -> Self;
    fn write_to(self, writer: &mut HoundWriter) -> std::result::Result<(), hound::Error>;
}

impl WavSample for i32 {
    fn zero() -> Self {
        0
    }

    fn write_to(self, writer: &mut HoundWriter) -> std::result::Result<(), hound::Error> {
        writer.write_sample(self)
    }
}

impl WavSample for f32 {
    fn zero() -> Self {
        0.0
    }

    fn write_to(self, writer: &mut HoundWriter) -> std::result::Result<(), hound::Error> {
        writer.write_sample(self)
    }
}

impl WavSample for f64 {
    fn zero() -> Self {
        0.0
    }

    fn write_to(self, writer: &mut HoundWriter) -> std::result::Result<(), hound::Error> {
        writer.write_sample(self as f32)
    }
}

struct ChannelBuf<T> {
    outlet: SharedOutlet<T>,
    data: Vec<T>,
    filled: usize,
}

/// WAV sink: drives per-channel outlets to exhaustion and interleaves.
pub struct WavWriter<T> {
    writer: HoundWriter,
    channels: Vec<Arc<Mutex<ChannelBuf<T>>>>,
    multithread: bool,
}

impl<T: WavSample> WavWriter<T> {
    /// Creates the output file. The stream format must map onto a WAV
    /// encoding: PCM at 8..=32 bits or IEEE float at 32 bits.
    pub fn create<P: AsRef<Path>>(
        path: P,
        format: &StreamFormat,
        inputs: Vec<SharedOutlet<T>>,
        multithread: bool,
    ) -> Result<Self> {
        if inputs.len() != format.channels as usize {
            return Err(Error::ChannelMismatch {
                expected: format.channels as usize,
                got: inputs.len(),
            });
        }
        let sample_format = match (format.tag, format.bits_per_sample) {
            (FormatTag::IeeeFloat, 32) => SampleFormat::Float,
            (FormatTag::Pcm | FormatTag::Extensible, 8..=32) => SampleFormat::Int,
            (tag, bits) => return Err(Error::UnsupportedFormat { bits, tag }),
        };
        let spec = hound::WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: format.bits_per_sample,
            sample_format,
        };
        let writer = hound::WavWriter::create(path, spec)?;

        let channels = inputs
            .into_iter()
            .map(|outlet| {
                Arc::new(Mutex::new(ChannelBuf {
                    outlet,
                    data: vec![T::zero(); BLOCK_FRAMES],
                    filled: 0,
                }))
            })
            .collect();

        Ok(Self {
            writer,
            channels,
            multithread,
        })
    }

    /// Pulls every channel to end-of-stream, interleaving block by block.
    /// Channels that end early are zero-padded to the longest channel.
    pub fn execute(mut self) -> Result<()> {
        let executor = self.multithread.then(BgExecutor::new);
        let nch = self.channels.len();
        let mut frame = vec![T::zero(); BLOCK_FRAMES * nch];

        loop {
            if let Some(exec) = &executor {
                for chan in &self.channels {
                    let chan = Arc::clone(chan);
                    exec.push_fn(move || {
                        let mut chan = chan.lock().unwrap();
                        let chan = &mut *chan;
                        chan.filled = chan.outlet.lock().unwrap().read(&mut chan.data);
                    });
                }
                for _ in 0..nch {
                    exec.pop();
                }
            } else {
                for chan in &self.channels {
                    let mut chan = chan.lock().unwrap();
                    let chan = &mut *chan;
                    chan.filled = chan.outlet.lock().unwrap().read(&mut chan.data);
                }
            }

            let mut zmax = 0;
            for (ch, chan) in self.channels.iter().enumerate() {
                let chan = chan.lock().unwrap();
                for (i, &v) in chan.data[..chan.filled].iter().enumerate() {
                    frame[i * nch + ch] = v;
                }
                for i in chan.filled..BLOCK_FRAMES {
                    frame[i * nch + ch] = T::zero();
                }
                zmax = zmax.max(chan.filled);
            }
            if zmax == 0 {
                break;
            }

            for f in frame[..zmax * nch].iter() {
                f.write_to(&mut self.writer)?;
            }
        }

        self.writer.finalize()?;
        Ok(())
    }
}
