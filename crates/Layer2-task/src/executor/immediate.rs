//! Immediate executor - runs jobs inline on the calling thread
//!
//! Jobs submitted from inside a running inline job also run inline, up to
//! `MAX_INLINE_DEPTH` nested levels. Past that they are parked on the
//! thread and run once the outermost job returns, still before its
//! `execute` call returns. A job parked this way must not be waited on by
//! the job that submitted it.

use super::r#trait::{Executor, Job};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use taskq_foundation::Result;
use tracing::trace;

/// Nested inline jobs allowed before new ones are deferred
pub const MAX_INLINE_DEPTH: usize = 32;

thread_local! {
    static DEPTH: Cell<usize> = Cell::new(0);
    static DEFERRED: RefCell<VecDeque<Job>> = RefCell::new(VecDeque::new());
}

/// Inline jobs currently on this thread's stack
fn depth() -> usize {
    DEPTH.with(Cell::get)
}

struct DepthGuard;

impl DepthGuard {
    fn enter() -> Self {
        DEPTH.with(|d| d.set(d.get() + 1));
        DepthGuard
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DEPTH.with(|d| d.set(d.get() - 1));
    }
}

fn run_inline(job: Job) {
    let _guard = DepthGuard::enter();
    job();
}

/// Runs every job synchronously, before `execute` returns
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateExecutor;

impl ImmediateExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Executor for ImmediateExecutor {
    fn execute(&self, job: Job) -> Result<()> {
        let depth = depth();
        if depth >= MAX_INLINE_DEPTH {
            trace!(depth, "inline job deferred");
            DEFERRED.with(|q| q.borrow_mut().push_back(job));
            return Ok(());
        }

        run_inline(job);
        if depth == 0 {
            // Parked jobs left by a panicking outer job run on the next call.
            while let Some(next) = DEFERRED.with(|q| q.borrow_mut().pop_front()) {
                run_inline(next);
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "immediate"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_runs_before_returning() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        ImmediateExecutor::new()
            .execute(Box::new(move || flag.store(true, Ordering::SeqCst)))
            .unwrap();

        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_runs_on_calling_thread() {
        let caller = std::thread::current().id();
        let seen = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);

        ImmediateExecutor::new()
            .execute(Box::new(move || *slot.lock() = Some(std::thread::current().id())))
            .unwrap();

        assert_eq!(*seen.lock(), Some(caller));
    }

    #[test]
    fn test_shallow_nesting_runs_inline() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let outer = Arc::clone(&log);

        ImmediateExecutor::new()
            .execute(Box::new(move || {
                let inner = Arc::clone(&outer);
                ImmediateExecutor::new()
                    .execute(Box::new(move || inner.lock().push("inner")))
                    .unwrap();
                outer.lock().push("outer");
            }))
            .unwrap();

        assert_eq!(*log.lock(), vec!["inner", "outer"]);
    }

    fn nest(remaining: usize, ran: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) {
        ImmediateExecutor::new()
            .execute(Box::new(move || {
                ran.fetch_add(1, Ordering::SeqCst);
                peak.fetch_max(depth(), Ordering::SeqCst);
                if remaining > 0 {
                    nest(remaining - 1, ran, peak);
                }
            }))
            .unwrap();
    }

    #[test]
    fn test_deep_nesting_is_bounded() {
        let ran = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        nest(10_000, Arc::clone(&ran), Arc::clone(&peak));

        assert_eq!(ran.load(Ordering::SeqCst), 10_001);
        assert_eq!(peak.load(Ordering::SeqCst), MAX_INLINE_DEPTH);
        assert_eq!(depth(), 0);
        assert!(DEFERRED.with(|q| q.borrow().is_empty()));
    }
}
