//! Shared background worker pool.
//!
//! A process-wide pool of `available_parallelism()` threads services a
//! single global run queue. Each [`BgExecutor`] owns a private completion
//! queue: [`push`](BgExecutor::push) stamps a task with the executor's
//! completion sender and enqueues it globally; [`pop`](BgExecutor::pop)
//! blocks until one of the executor's own tasks completes.
//!
//! When `pop` is called from a worker thread, i.e. a nested parallel
//! region, it opportunistically executes other global tasks while waiting. Without
//! this, a task that fans out sub-tasks and waits for them would occupy its
//! worker forever and the pool would deadlock once all workers are parked
//! in nested waits.
//!
//! A task that panics has its payload carried back to the owning executor
//! and resumed on the consumer thread at the next `pop`.

use std::any::Any;
use std::cell::Cell;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::OnceLock;
use std::thread;

use crossbeam_channel::{select, unbounded, Receiver, Sender};

/// A unit of background work. The task object is returned to the owner's
/// completion queue after `run`, so results can be carried in its fields.
pub trait Task: Send {
    fn run(&mut self);
}

impl<F: FnMut() + Send> Task for F {
    fn run(&mut self) {
        self()
    }
}

type Completion = Result<Box<dyn Task>, Box<dyn Any + Send>>;

struct Job {
    task: Box<dyn Task>,
    owner: Sender<Completion>,
}

struct Pool {
    inject: Sender<Job>,
    steal: Receiver<Job>,
}

static POOL: OnceLock<Pool> = OnceLock::new();

thread_local! {
    static IS_WORKER: Cell<bool> = const { Cell::new(false) };
}

fn run_and_complete(mut job: Job) {
    let outcome = catch_unwind(AssertUnwindSafe(|| job.task.run()));
    // The owner may already be gone; a dropped completion is fine then.
    let _ = match outcome {
        Ok(()) => job.owner.send(Ok(job.task)),
        Err(payload) => job.owner.send(Err(payload)),
    };
}

fn pool() -> &'static Pool {
    POOL.get_or_init(|| {
        let (inject, steal) = unbounded::<Job>();
        let workers = thread::available_parallelism().map_or(1, |n| n.get());
        log::debug!("starting worker pool with {workers} threads");
        for i in 0..workers {
            let rx = steal.clone();
            thread::Builder::new()
                .name(format!("remuestra-worker-{i}"))
                .spawn(move || {
                    IS_WORKER.with(|w| w.set(true));
                    while let Ok(job) = rx.recv() {
                        run_and_complete(job);
                    }
                })
                .expect("failed to spawn worker thread");
        }
        Pool { inject, steal }
    })
}

/// Handle to the shared pool with a private completion queue.
///
/// Tasks pushed through one executor are popped from the same executor, in
/// completion order. Dropping the executor abandons outstanding tasks; they
/// still run, their completions are discarded.
pub struct BgExecutor {
    done_tx: Sender<Completion>,
    done_rx: Receiver<Completion>,
}

impl Default for BgExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl BgExecutor {
    pub fn new() -> Self {
        pool();
        let (done_tx, done_rx) = unbounded();
        Self { done_tx, done_rx }
    }

    /// Enqueues a task on the global run queue.
    pub fn push(&self, task: Box<dyn Task>) {
        let job = Job {
            task,
            owner: self.done_tx.clone(),
        };
        pool()
            .inject
            .send(job)
            .expect("worker pool run queue closed");
    }

    /// Waits for the next completed task of this executor.
    ///
    /// On a worker thread this steals and runs other global tasks while
    /// waiting. If the completed task panicked, the panic is resumed here.
    pub fn pop(&self) -> Box<dyn Task> {
        let completion = if IS_WORKER.with(|w| w.get()) {
            loop {
                select! {
                    recv(self.done_rx) -> c => break c.expect("completion queue closed"),
                    recv(pool().steal) -> j => {
                        if let Ok(job) = j {
                            run_and_complete(job);
                        }
                    }
                }
            }
        } else {
            self.done_rx.recv().expect("completion queue closed")
        };
        match completion {
            Ok(task) => task,
            Err(payload) => resume_unwind(payload),
        }
    }

    /// Pushes a closure; the returned task box is the closure itself.
    pub fn push_fn<F: FnMut() + Send + 'static>(&self, f: F) {
        self.push(Box::new(f));
    }
}
