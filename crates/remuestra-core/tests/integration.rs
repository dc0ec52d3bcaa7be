//! Integration tests for remuestra-core: the stage protocol, queues and
//! the worker pool working together.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use remuestra_core::{shared, BgExecutor, BlockingArrayQueue, Outlet};

struct Ramp {
    next: usize,
    left: usize,
}

impl Outlet<f64> for Ramp {
    fn at_end(&mut self) -> bool {
        self.left == 0
    }

    fn read(&mut self, buf: &mut [f64]) -> usize {
        let n = buf.len().min(self.left);
        for s in &mut buf[..n] {
            *s = self.next as f64;
            self.next += 1;
        }
        self.left -= n;
        n
    }
}

/// A producer thread pushes blocks through a bounded queue; a consumer
/// outlet-style loop drains it. Order and count must survive.
#[test]
fn bounded_queue_preserves_stream_order() {
    let queue = Arc::new(BlockingArrayQueue::new(1000));
    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            let source = shared(Ramp {
                next: 0,
                left: 100_000,
            });
            let mut buf = vec![0.0f64; 1536];
            loop {
                let n = source.lock().unwrap().read(&mut buf);
                if n == 0 {
                    break;
                }
                queue.write_buf(buf[..n].to_vec());
            }
            queue.close();
        })
    };

    let mut expected = 0usize;
    let mut buf = vec![0.0f64; 701];
    loop {
        let n = queue.read(&mut buf);
        if n == 0 {
            break;
        }
        for &v in &buf[..n] {
            assert_eq!(v, expected as f64);
            expected += 1;
        }
    }
    producer.join().unwrap();
    assert_eq!(expected, 100_000);
}

/// Recursive fan-out over the shared pool: outer tasks wait on inner tasks
/// pushed to the same pool. Progress requires the reentrant pop.
#[test]
fn nested_parallel_regions_make_progress() {
    let workers = thread::available_parallelism().map_or(1, |n| n.get());
    let outer = BgExecutor::new();
    let sum = Arc::new(AtomicUsize::new(0));

    // More outer tasks than workers guarantees every worker is inside an
    // outer task while inner tasks are still queued.
    let outer_tasks = workers * 3;
    for t in 0..outer_tasks {
        let sum = Arc::clone(&sum);
        outer.push_fn(move || {
            let inner = BgExecutor::new();
            for i in 0..8 {
                let sum = Arc::clone(&sum);
                inner.push_fn(move || {
                    sum.fetch_add(t + i, Ordering::SeqCst);
                });
            }
            for _ in 0..8 {
                inner.pop();
            }
        });
    }
    for _ in 0..outer_tasks {
        outer.pop();
    }

    let want: usize = (0..outer_tasks).map(|t| (0..8).map(|i| t + i).sum::<usize>()).sum();
    assert_eq!(sum.load(Ordering::SeqCst), want);
}
