//! Scheduler sessions: fan tasks out on a pool and fold their results.
//!
//! A [`Scheduler`] lives for a single fan-out. Every enqueued task bumps an
//! outstanding counter; the wrapped task folds its result into the
//! session's [`Combiner`] under one mutex and then decrements the counter.
//! [`Scheduler::wait_for_completion`] spins (yielding) until the counter is
//! back to zero and hands the combiner back.
//!
//! Results are combined in completion order, not submission order.

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use parking_lot::Mutex;
use tracing::trace;

use crate::pool::WorkerPool;
use crate::shared::Shared;

/// Folds task results into an accumulator.
pub trait Combiner<R>: Send {
    /// Fold one task result. Called under the session's combiner lock.
    fn combine(&mut self, result: R);
}

/// The default combiner: keeps only the most recently combined result.
#[derive(Debug)]
pub struct Latest<R> {
    result: Option<R>,
}

impl<R> Latest<R> {
    /// A combiner that has not seen any result yet.
    #[must_use]
    pub fn new() -> Self {
        Self { result: None }
    }

    /// The most recent result, if any task completed.
    #[must_use]
    pub fn into_inner(self) -> Option<R> {
        self.result
    }
}

impl<R> Default for Latest<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Send> Combiner<R> for Latest<R> {
    fn combine(&mut self, result: R) {
        self.result = Some(result);
    }
}

/// Keeps every result, in completion order.
#[derive(Debug)]
pub struct Collect<R> {
    results: Vec<R>,
}

impl<R> Collect<R> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            results: Vec::new(),
        }
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<R> {
        self.results
    }
}

impl<R> Default for Collect<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Send> Combiner<R> for Collect<R> {
    fn combine(&mut self, result: R) {
        self.results.push(result);
    }
}

struct Session<C> {
    outstanding: AtomicUsize,
    combiner: Mutex<C>,
}

/// Decrements the outstanding counter when dropped, so a panicking task
/// still completes its session.
struct Completion<'a, C>(&'a Session<C>);

impl<C> Drop for Completion<'_, C> {
    fn drop(&mut self) {
        self.0.outstanding.fetch_sub(1, Ordering::Release);
    }
}

/// A single fan-out over a [`WorkerPool`].
pub struct Scheduler<R, C = Latest<R>> {
    pool: Shared<WorkerPool>,
    session: Arc<Session<C>>,
    _result: PhantomData<fn(R)>,
}

impl<R: Send + 'static> Scheduler<R, Latest<R>> {
    /// A session using the default [`Latest`] combiner.
    #[must_use]
    pub fn new(pool: Shared<WorkerPool>) -> Self {
        Self::with_combiner(pool, Latest::new())
    }
}

impl<R, C> Scheduler<R, C>
where
    R: Send + 'static,
    C: Combiner<R> + 'static,
{
    /// A session folding results into `combiner`.
    #[must_use]
    pub fn with_combiner(pool: Shared<WorkerPool>, combiner: C) -> Self {
        Self {
            pool,
            session: Arc::new(Session {
                outstanding: AtomicUsize::new(0),
                combiner: Mutex::new(combiner),
            }),
            _result: PhantomData,
        }
    }

    /// Number of enqueued tasks that have not finished yet.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.session.outstanding.load(Ordering::Acquire)
    }

    /// Submit `task` to the pool; its result is folded into the combiner.
    pub fn enqueue<F>(&self, task: F)
    where
        F: FnOnce() -> R + Send + 'static,
    {
        self.session.outstanding.fetch_add(1, Ordering::AcqRel);

        let session = Arc::clone(&self.session);
        self.pool.enqueue(move || {
            let _completion = Completion(&*session);
            let result = task();
            session.combiner.lock().combine(result);
        });
    }

    /// Spin until every enqueued task has finished, then return the
    /// combiner.
    #[must_use]
    pub fn wait_for_completion(self) -> C {
        while self.session.outstanding.load(Ordering::Acquire) != 0 {
            thread::yield_now();
        }
        trace!("scheduler session drained");

        // Finished tasks may still be dropping their handle on the session.
        let mut session = self.session;
        loop {
            match Arc::try_unwrap(session) {
                Ok(session) => return session.combiner.into_inner(),
                Err(still_shared) => {
                    session = still_shared;
                    thread::yield_now();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use super::*;

    fn pool(workers: usize) -> Shared<WorkerPool> {
        Shared::new(WorkerPool::new(workers).unwrap())
    }

    #[test]
    fn test_wait_with_no_tasks_returns_immediately() {
        let scheduler: Scheduler<u32> = Scheduler::new(pool(2));
        assert_eq!(scheduler.outstanding(), 0);
        assert!(scheduler.wait_for_completion().into_inner().is_none());
    }

    #[test]
    fn test_every_result_is_combined_exactly_once() {
        let executed = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::with_combiner(pool(4), Collect::new());

        for i in 0..500usize {
            let executed = Arc::clone(&executed);
            scheduler.enqueue(move || {
                executed.fetch_add(1, Ordering::SeqCst);
                i
            });
        }

        let mut results = scheduler.wait_for_completion().into_inner();
        assert_eq!(executed.load(Ordering::SeqCst), 500);
        assert_eq!(results.len(), 500);

        results.sort_unstable();
        assert_eq!(results, (0..500).collect::<Vec<_>>());
    }

    #[test]
    fn test_latest_keeps_one_result() {
        let scheduler = Scheduler::new(pool(2));
        for i in 0..10u32 {
            scheduler.enqueue(move || i);
        }
        let latest = scheduler.wait_for_completion().into_inner();
        assert!(matches!(latest, Some(v) if v < 10));
    }

    #[test]
    fn test_nested_sessions_on_single_worker_do_not_deadlock() {
        // The outer task occupies the only worker; the inner session has no
        // free slot and must run its tasks inline.
        let pool = pool(1);
        let outer = Scheduler::with_combiner(pool.clone(), Collect::new());

        let inner_pool = pool.clone();
        outer.enqueue(move || {
            let inner = Scheduler::with_combiner(inner_pool, Collect::new());
            for i in 0..8u32 {
                inner.enqueue(move || i);
            }
            inner.wait_for_completion().into_inner().into_iter().sum::<u32>()
        });

        assert_eq!(outer.wait_for_completion().into_inner(), vec![28]);
    }

    #[test]
    fn test_panicking_task_still_completes_session() {
        let scheduler = Scheduler::with_combiner(pool(2), Collect::new());
        let ran = Arc::new(AtomicBool::new(false));

        scheduler.enqueue(|| -> u8 { panic!("task failure") });
        let flag = Arc::clone(&ran);
        scheduler.enqueue(move || {
            flag.store(true, Ordering::SeqCst);
            1u8
        });

        let results = scheduler.wait_for_completion().into_inner();
        assert_eq!(results, vec![1]);
        assert!(ran.load(Ordering::SeqCst));
    }

    struct Sum(u64);

    impl Combiner<u64> for Sum {
        fn combine(&mut self, result: u64) {
            self.0 += result;
        }
    }

    #[test]
    fn test_custom_combiner_folds_all_results() {
        let scheduler = Scheduler::with_combiner(pool(3), Sum(0));
        for i in 1..=100u64 {
            scheduler.enqueue(move || i);
        }
        assert_eq!(scheduler.wait_for_completion().0, 5050);
    }
}
