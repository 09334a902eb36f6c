//! Fixed-size worker pool with per-worker hand-off slots.
//!
//! Every worker owns one slot with a tri-state flag:
//!
//! ```text
//! IDLE (0) --producer CAS--> CLAIMED (1) --producer store--> ASSIGNED (2)
//!    ^                                                           |
//!    +----------------- worker resets after running -------------+
//! ```
//!
//! The producer writes the task into the slot before the release-store of
//! `ASSIGNED`; the worker only takes the task after an acquire-load observes
//! `ASSIGNED`. Workers spin (yielding) while their slot is empty.
//!
//! Dropping the pool stops the workers once their slots are idle, so every
//! task `enqueue` accepted still runs before the join completes.
//!
//! If every slot is busy, [`WorkerPool::enqueue`] keeps rescanning, except
//! when the caller is itself one of this pool's workers: then the task runs
//! inline on the calling thread. Without that fallback a worker waiting on a
//! nested fan-out could wait forever on the slot it is occupying.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

/// A unit of work accepted by the pool.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

const IDLE: u8 = 0;
const CLAIMED: u8 = 1;
const ASSIGNED: u8 = 2;

/// Errors raised while building a pool.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The operating system refused to start a worker thread.
    #[error("failed to spawn worker thread {index}: {source}")]
    Spawn {
        /// Index of the worker that could not be started.
        index: usize,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

struct Slot {
    state: AtomicU8,
    task: Mutex<Option<Task>>,
}

impl Slot {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(IDLE),
            task: Mutex::new(None),
        }
    }
}

struct PoolState {
    slots: Vec<Slot>,
    running: AtomicBool,
}

/// A fixed set of long-lived worker threads, each executing at most one task
/// at a time.
pub struct WorkerPool {
    state: Arc<PoolState>,
    workers: Vec<JoinHandle<()>>,
    worker_ids: Vec<ThreadId>,
}

impl WorkerPool {
    /// Start `worker_count` workers (at least one).
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Spawn`] if a worker thread cannot be created.
    /// Workers started before the failure are stopped again.
    pub fn new(worker_count: usize) -> Result<Self, PoolError> {
        let worker_count = worker_count.max(1);
        let state = Arc::new(PoolState {
            slots: (0..worker_count).map(|_| Slot::new()).collect(),
            running: AtomicBool::new(true),
        });

        let mut pool = Self {
            state,
            workers: Vec::with_capacity(worker_count),
            worker_ids: Vec::with_capacity(worker_count),
        };

        for index in 0..worker_count {
            let state = Arc::clone(&pool.state);
            let handle = thread::Builder::new()
                .name(format!("engine-worker-{index}"))
                .spawn(move || worker_loop(&state, index))
                .map_err(|source| PoolError::Spawn { index, source })?;
            pool.worker_ids.push(handle.thread().id());
            pool.workers.push(handle);
        }

        debug!(workers = worker_count, "worker pool started");
        Ok(pool)
    }

    /// Number of worker threads.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.state.slots.len()
    }

    /// Number of workers whose slot is currently claimed or assigned.
    #[must_use]
    pub fn busy_workers(&self) -> usize {
        self.state
            .slots
            .iter()
            .filter(|slot| slot.state.load(Ordering::Relaxed) != IDLE)
            .count()
    }

    /// Returns `true` if the calling thread is one of this pool's workers.
    #[must_use]
    pub fn is_worker_thread(&self) -> bool {
        let current = thread::current().id();
        self.worker_ids.contains(&current)
    }

    /// Hand `task` to the first idle worker.
    ///
    /// Blocks (spinning with yields) until a worker accepts it. When called
    /// from one of this pool's own workers and no slot is free, the task is
    /// executed inline before returning.
    pub fn enqueue<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue_boxed(Box::new(task));
    }

    /// [`WorkerPool::enqueue`] for an already boxed task.
    pub fn enqueue_boxed(&self, task: Task) {
        let on_worker = self.is_worker_thread();

        loop {
            for (index, slot) in self.state.slots.iter().enumerate() {
                if slot
                    .state
                    .compare_exchange(IDLE, CLAIMED, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
                {
                    *slot.task.lock() = Some(task);
                    slot.state.store(ASSIGNED, Ordering::Release);
                    trace!(worker = index, "task assigned");
                    return;
                }
            }

            if on_worker {
                trace!("all workers busy, running task inline");
                run_task(task);
                return;
            }

            thread::yield_now();
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.worker_count())
            .field("busy", &self.busy_workers())
            .finish()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.state.running.store(false, Ordering::Release);

        // The last handle can be released from inside a task; a worker
        // cannot join itself.
        let current = thread::current().id();
        for handle in self.workers.drain(..) {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!("worker thread exited with a panic");
            }
        }

        debug!("worker pool stopped");
    }
}

fn worker_loop(state: &PoolState, index: usize) {
    trace!(worker = index, "worker running");
    let slot = &state.slots[index];

    // An accepted task always runs: shutdown only exits from an idle slot.
    loop {
        match slot.state.load(Ordering::Acquire) {
            ASSIGNED => {
                let task = slot.task.lock().take();
                if let Some(task) = task {
                    run_task(task);
                }
                slot.state.store(IDLE, Ordering::Release);
            }
            IDLE if !state.running.load(Ordering::Acquire) => break,
            _ => thread::yield_now(),
        }
    }

    trace!(worker = index, "worker exiting");
}

fn run_task(task: Task) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
        warn!(message = panic_message(payload.as_ref()), "task panicked");
    }
}

/// Best-effort text of a panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
