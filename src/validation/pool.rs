//! Bounded fan-out for per-entity checks.
//!
//! Rules with a lot of independent work (one check per trip, say) hand the
//! items to [`for_each_bounded`], which runs them on a fixed number of
//! workers and waits for all of them. A failing or panicking task is counted
//! and logged; it never stops the remaining tasks.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};
use workerpool::thunk::{Thunk, ThunkWorker};
use workerpool::Pool;

use super::config::ValidationConfig;

/// What happened to the submitted tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolOutcome {
    /// Tasks that ran to completion.
    pub completed: usize,
    /// Tasks that returned an error or panicked.
    pub failed: usize,
    /// Tasks not started because the run was cancelled.
    pub skipped: usize,
}

impl PoolOutcome {
    pub fn total(&self) -> usize {
        self.completed + self.failed + self.skipped
    }

    /// True when every task ran and none failed.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

/// Run `task` once per item on at most `config.workers()` threads and block
/// until every item has been handled.
///
/// The cancellation flag is checked before each item starts; items picked up
/// after cancellation are skipped.
pub fn for_each_bounded<T, F>(config: &ValidationConfig, items: Vec<T>, task: F) -> PoolOutcome
where
    T: Send + 'static,
    F: Fn(T) -> anyhow::Result<()> + Send + Sync + 'static,
{
    let total = items.len();
    if total == 0 {
        return PoolOutcome::default();
    }

    let workers = config.workers().min(total);
    let pool = Pool::<ThunkWorker<()>>::new(workers);
    let outcome = Arc::new(Mutex::new(PoolOutcome::default()));
    let task = Arc::new(task);

    for item in items {
        let task = Arc::clone(&task);
        let outcome = Arc::clone(&outcome);
        let cancel = config.cancel.clone();
        pool.execute(Thunk::of(move || {
            if cancel.is_cancelled() {
                outcome.lock().skipped += 1;
                return;
            }
            match task(item) {
                Ok(()) => outcome.lock().completed += 1,
                Err(e) => {
                    warn!(error = %e, "validation task failed");
                    outcome.lock().failed += 1;
                }
            }
        }));
    }
    pool.join();

    let mut outcome = *outcome.lock();
    // Panicked tasks never record themselves.
    let panicked = total - outcome.total();
    if panicked > 0 {
        warn!(panicked, "validation tasks panicked");
        outcome.failed += panicked;
    }
    debug!(
        workers,
        completed = outcome.completed,
        failed = outcome.failed,
        skipped = outcome.skipped,
        "pool finished"
    );
    outcome
}
