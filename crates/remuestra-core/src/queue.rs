//! Sample queues used by multi-channel stages and prefetch threads.
//!
//! [`ArrayQueue`] is a FIFO of owned sample buffers with a head offset:
//! writing moves a whole buffer in (amortized O(1)), reading spans buffer
//! boundaries. [`BlockingArrayQueue`] adds a capacity bound, a mutex and a
//! condition variable on top, for handing sample blocks between threads.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// FIFO of owned sample buffers with a read offset into the front buffer.
///
/// `size` is kept as a running sum so it never traverses the queue.
#[derive(Default)]
pub struct ArrayQueue<T> {
    bufs: VecDeque<Vec<T>>,
    pos: usize,
    sum: usize,
}

impl<T: Copy> ArrayQueue<T> {
    pub fn new() -> Self {
        Self {
            bufs: VecDeque::new(),
            pos: 0,
            sum: 0,
        }
    }

    /// Number of samples currently queued.
    pub fn len(&self) -> usize {
        self.sum - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends a buffer by move.
    pub fn write_buf(&mut self, v: Vec<T>) {
        self.sum += v.len();
        self.bufs.push_back(v);
    }

    /// Appends a copy of `src`.
    pub fn write(&mut self, src: &[T]) {
        self.write_buf(src.to_vec());
    }

    /// Reads up to `dst.len()` samples, spanning buffer boundaries.
    pub fn read(&mut self, dst: &mut [T]) -> usize {
        let total = self.len().min(dst.len());
        let mut done = 0;
        while done < total {
            let front = self.bufs.front().expect("non-empty by size accounting");
            let chunk = (front.len() - self.pos).min(total - done);
            dst[done..done + chunk].copy_from_slice(&front[self.pos..self.pos + chunk]);
            self.pos += chunk;
            done += chunk;
            if self.pos >= front.len() {
                self.sum -= front.len();
                self.pos = 0;
                self.bufs.pop_front();
            }
        }
        total
    }
}

struct BaqState<T> {
    queue: ArrayQueue<T>,
    closed: bool,
}

/// Bounded, thread-safe [`ArrayQueue`].
///
/// `write` blocks while the queue is at capacity, `read` blocks while it is
/// empty; [`close`](BlockingArrayQueue::close) wakes every waiter, after
/// which reads drain the residue and then return 0 and writes are discarded.
pub struct BlockingArrayQueue<T> {
    capacity: usize,
    state: Mutex<BaqState<T>>,
    cond: Condvar,
}

impl<T: Copy> BlockingArrayQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(BaqState {
                queue: ArrayQueue::new(),
                closed: false,
            }),
            cond: Condvar::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Marks the queue closed and wakes all blocked readers and writers.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        self.cond.notify_all();
    }

    /// Moves `v` into the queue, blocking while the queue is at capacity.
    ///
    /// The buffer is dropped if the queue has been closed.
    pub fn write_buf(&self, v: Vec<T>) {
        let mut state = self.state.lock().unwrap();
        while state.queue.len() >= self.capacity && !state.closed {
            state = self.cond.wait(state).unwrap();
        }
        if state.closed {
            return;
        }
        state.queue.write_buf(v);
        self.cond.notify_all();
    }

    /// Copies as much of `src` as currently fits, blocking while full.
    ///
    /// Returns the number of samples written; 0 after close.
    pub fn write(&self, src: &[T]) -> usize {
        let mut state = self.state.lock().unwrap();
        while state.queue.len() >= self.capacity && !state.closed {
            state = self.cond.wait(state).unwrap();
        }
        if state.closed {
            return 0;
        }
        let n = src.len().min(self.capacity - state.queue.len());
        state.queue.write(&src[..n]);
        self.cond.notify_all();
        n
    }

    /// Reads up to `dst.len()` samples, blocking while the queue is empty
    /// and not closed. Returns 0 only after close with nothing queued.
    pub fn read(&self, dst: &mut [T]) -> usize {
        let mut state = self.state.lock().unwrap();
        while state.queue.is_empty() && !state.closed {
            state = self.cond.wait(state).unwrap();
        }
        let n = state.queue.read(dst);
        self.cond.notify_all();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn array_queue_spans_buffers() {
        let mut q = ArrayQueue::new();
        q.write(&[1i32, 2, 3]);
        q.write_buf(vec![4, 5]);
        assert_eq!(q.len(), 5);

        let mut dst = [0i32; 4];
        assert_eq!(q.read(&mut dst), 4);
        assert_eq!(dst, [1, 2, 3, 4]);
        assert_eq!(q.len(), 1);

        let mut rest = [0i32; 4];
        assert_eq!(q.read(&mut rest), 1);
        assert_eq!(rest[0], 5);
        assert!(q.is_empty());
    }

    #[test]
    fn array_queue_partial_front_accounting() {
        let mut q = ArrayQueue::new();
        q.write(&[1u8, 2, 3, 4]);
        let mut one = [0u8; 1];
        q.read(&mut one);
        assert_eq!(q.len(), 3);
        q.write(&[5, 6]);
        assert_eq!(q.len(), 5);
        let mut dst = [0u8; 5];
        assert_eq!(q.read(&mut dst), 5);
        assert_eq!(dst, [2, 3, 4, 5, 6]);
    }

    #[test]
    fn blocking_queue_rendezvous() {
        let q = Arc::new(BlockingArrayQueue::new(8));
        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                for block in 0..16 {
                    let base = block * 4;
                    q.write_buf((base..base + 4).collect());
                }
                q.close();
            })
        };

        let mut collected = Vec::new();
        let mut buf = [0usize; 5];
        loop {
            let n = q.read(&mut buf);
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&buf[..n]);
        }
        producer.join().unwrap();
        assert_eq!(collected, (0..64).collect::<Vec<_>>());
    }

    #[test]
    fn close_wakes_reader() {
        let q = Arc::new(BlockingArrayQueue::<f32>::new(4));
        let reader = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                let mut buf = [0.0f32; 4];
                q.read(&mut buf)
            })
        };
        thread::sleep(std::time::Duration::from_millis(20));
        q.close();
        assert_eq!(reader.join().unwrap(), 0);
    }
}
