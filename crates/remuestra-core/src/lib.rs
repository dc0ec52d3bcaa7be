//! Remuestra Core - streaming primitives for the remuestra resampler
//!
//! This crate provides the foundational building blocks of the pull-based
//! processing graph:
//!
//! - [`Outlet`] trait, the single-consumer streaming port every stage exposes
//! - [`OutletProvider`] for multi-channel stages
//! - [`ArrayQueue`] and [`BlockingArrayQueue`] sample queues
//! - [`Rng`] and its derived dither distributions
//! - [`BgExecutor`] shared worker pool with reentrant completion waits
//! - [`cache`] process-wide memoization of expensive plan objects
//!
//! ## Example
//!
//! ```rust
//! use remuestra_core::{Outlet, shared};
//!
//! struct Ramp { next: f32, left: usize }
//!
//! impl Outlet<f32> for Ramp {
//!     fn at_end(&mut self) -> bool { self.left == 0 }
//!     fn read(&mut self, buf: &mut [f32]) -> usize {
//!         let n = buf.len().min(self.left);
//!         for s in &mut buf[..n] {
//!             *s = self.next;
//!             self.next += 1.0;
//!         }
//!         self.left -= n;
//!         n
//!     }
//! }
//!
//! let outlet = shared(Ramp { next: 0.0, left: 4 });
//! let mut buf = [0.0f32; 8];
//! assert_eq!(outlet.lock().unwrap().read(&mut buf), 4);
//! ```

pub mod cache;
pub mod executor;
pub mod format;
pub mod outlet;
pub mod queue;
pub mod rng;

pub use executor::{BgExecutor, Task};
pub use format::{ContainerFormat, FormatTag, StreamFormat};
pub use outlet::{shared, Outlet, OutletProvider, SharedOutlet};
pub use queue::{ArrayQueue, BlockingArrayQueue};
pub use rng::{DoubleRng, Lcg64, RectangularRng, Rng, SaltedLcg64, TriangularRng};
