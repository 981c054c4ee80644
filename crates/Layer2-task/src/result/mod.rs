//! ExecuteResult adapters
//!
//! One adapter wraps one listener (or continuation) plus the executor it is
//! delivered on. When its task completes the adapter checks whether the
//! outcome is one it cares about and, if so, schedules a single invocation.
//!
//! `cancel()` detaches the listener: a scheduled invocation that has not
//! taken the listener yet becomes a no-op. It never cancels the executor job.
//!
//! Delivery is fire-and-forget. When the executor refuses the job there is
//! no caller left to report to, so the listener is dropped uncalled and the
//! refusal is logged. Continuations differ: a refused continuation fails its
//! continuation task.

mod continuation;
mod listener;

pub use continuation::{ContinuationExecuteResult, ContinuationWithTaskExecuteResult};
pub use listener::{
    CanceledExecuteResult, CompleteExecuteResult, FailureExecuteResult, SuccessExecuteResult,
};

use crate::executor::{Executor, Job};
use crate::task::Task;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::warn;

/// Per-listener adapter dispatched by `ExecuteResultQueue`
pub trait ExecuteResult<T>: Send + Sync {
    /// Called once the owning task is terminal
    fn on_complete(&self, task: &Task<T>);

    /// Detach the wrapped listener
    fn cancel(&self);
}

/// Listener reference shared between the adapter and its scheduled job
pub(crate) struct ListenerSlot<F> {
    listener: Arc<Mutex<Option<F>>>,
}

impl<F> ListenerSlot<F> {
    pub(crate) fn new(listener: F) -> Self {
        Self {
            listener: Arc::new(Mutex::new(Some(listener))),
        }
    }

    /// Take the listener; `None` if it was detached or already delivered
    pub(crate) fn take(&self) -> Option<F> {
        self.listener.lock().take()
    }

    pub(crate) fn clear(&self) {
        self.listener.lock().take();
    }

    #[cfg(test)]
    pub(crate) fn is_attached(&self) -> bool {
        self.listener.lock().is_some()
    }
}

impl<F> Clone for ListenerSlot<F> {
    fn clone(&self) -> Self {
        Self {
            listener: Arc::clone(&self.listener),
        }
    }
}

/// Hand a listener job to its executor; a refused job is logged and dropped
pub(crate) fn post(executor: &Arc<dyn Executor>, job: Job) {
    if let Err(e) = executor.execute(job) {
        warn!(executor = executor.name(), error = %e, "listener dispatch rejected");
    }
}
