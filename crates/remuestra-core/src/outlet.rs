//! The stage/outlet protocol of the pull-based processing graph.
//!
//! A *stage* is a node in an acyclic graph that owns one or more *outlets*.
//! Consumers drive the graph by calling [`Outlet::read`] on an outlet, which
//! blocks until samples are produced or end-of-stream is observed. Stages
//! compose by reference: a downstream stage holds [`SharedOutlet`] handles to
//! its upstream outlets and pulls on demand.

use std::sync::{Arc, Mutex};

use crate::format::{ContainerFormat, StreamFormat};

/// Single-consumer streaming port producing typed samples on demand.
///
/// # Contract
///
/// `read` fills a prefix of `buf` and returns the number of samples written.
/// A return of `0` signals permanent end-of-stream; it is returned if and
/// only if the upstream has ended *and* no residual samples remain. A
/// non-zero return may be short of `buf.len()`, but only when producing more
/// would require the upstream to block; consumers iterate until `0`.
///
/// `at_end` is advisory: when it returns `true`, the next `read` is certain
/// to return `0`.
pub trait Outlet<T>: Send {
    /// Returns whether the next `read` is certain to return `0`.
    fn at_end(&mut self) -> bool;

    /// Reads up to `buf.len()` samples into `buf`, returning the count.
    fn read(&mut self, buf: &mut [T]) -> usize;
}

/// Shared handle to an outlet.
///
/// The graph is acyclic and shared at the outlet level, so plain reference
/// counting suffices; the mutex serializes access when an outlet is observed
/// from more than one thread (worker fan-outs, the push-pull adapter).
pub type SharedOutlet<T> = Arc<Mutex<dyn Outlet<T>>>;

/// Wraps a stage into a [`SharedOutlet`] handle.
pub fn shared<T: 'static, S: Outlet<T> + 'static>(stage: S) -> SharedOutlet<T> {
    Arc::new(Mutex::new(stage))
}

/// A stage exposing one outlet per channel, plus stream metadata.
///
/// Requesting an out-of-range channel is a programmer error and panics.
pub trait OutletProvider<T> {
    /// Returns the outlet of the given channel.
    fn outlet(&self, channel: u32) -> SharedOutlet<T>;

    /// Returns the stream format describing all channels.
    fn format(&self) -> StreamFormat;

    /// Returns the container the stream originated from, when known.
    fn container(&self) -> ContainerFormat {
        ContainerFormat::Riff
    }
}
