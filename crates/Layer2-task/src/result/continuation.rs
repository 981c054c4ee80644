//! Continuation adapters
//!
//! Both adapters own the continuation task and are the only party that
//! completes it.

use super::{ExecuteResult, ListenerSlot};
use crate::executor::{Executor, ImmediateExecutor};
use crate::state::TaskState;
use crate::task::{Task, TaskCompletionSource};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use taskq_foundation::{Error, Result};
use tracing::debug;

type Transform<T, R> = Box<dyn FnOnce(&Task<T>) -> Result<R> + Send + 'static>;
type TaskTransform<T, R> = Box<dyn FnOnce(&Task<T>) -> Result<Task<R>> + Send + 'static>;

/// Run a transform, turning a panic into an execution failure
fn run_transform<T, R>(transform: impl FnOnce(&Task<T>) -> Result<R>, task: &Task<T>) -> Result<R> {
    panic::catch_unwind(AssertUnwindSafe(|| transform(task)))
        .unwrap_or_else(|payload| Err(Error::from_panic(payload)))
}

/// Completes the continuation with the transform's value or error
pub struct ContinuationExecuteResult<T, R> {
    executor: Arc<dyn Executor>,
    transform: ListenerSlot<Transform<T, R>>,
    continuation: TaskCompletionSource<R>,
}

impl<T, R> ContinuationExecuteResult<T, R>
where
    R: Clone + Send + 'static,
{
    pub fn new<F>(executor: Arc<dyn Executor>, transform: F, continuation: TaskCompletionSource<R>) -> Self
    where
        F: FnOnce(&Task<T>) -> Result<R> + Send + 'static,
    {
        Self {
            executor,
            transform: ListenerSlot::new(Box::new(transform)),
            continuation,
        }
    }
}

impl<T, R> ExecuteResult<T> for ContinuationExecuteResult<T, R>
where
    T: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    fn on_complete(&self, task: &Task<T>) {
        let task = task.clone();
        let slot = self.transform.clone();
        let continuation = self.continuation.clone();

        let job = Box::new(move || {
            let Some(transform) = slot.take() else {
                return;
            };
            match run_transform(transform, &task) {
                Ok(value) => {
                    continuation.try_set_result(value);
                }
                Err(err) => {
                    continuation.try_set_error(err);
                }
            }
        });

        if let Err(err) = self.executor.execute(job) {
            debug!(executor = self.executor.name(), error = %err, "continuation rejected");
            self.continuation.try_set_error(err);
        }
    }

    fn cancel(&self) {
        self.transform.clear();
    }
}

/// Completes the continuation the same way as the task the transform returns
pub struct ContinuationWithTaskExecuteResult<T, R> {
    executor: Arc<dyn Executor>,
    transform: ListenerSlot<TaskTransform<T, R>>,
    continuation: TaskCompletionSource<R>,
}

impl<T, R> ContinuationWithTaskExecuteResult<T, R>
where
    R: Clone + Send + 'static,
{
    pub fn new<F>(executor: Arc<dyn Executor>, transform: F, continuation: TaskCompletionSource<R>) -> Self
    where
        F: FnOnce(&Task<T>) -> Result<Task<R>> + Send + 'static,
    {
        Self {
            executor,
            transform: ListenerSlot::new(Box::new(transform)),
            continuation,
        }
    }
}

/// Copy the terminal outcome of `inner` onto `outer`
fn mirror<R>(inner: &Task<R>, outer: &TaskCompletionSource<R>)
where
    R: Clone + Send + 'static,
{
    match inner.state() {
        TaskState::Succeeded(value) => {
            outer.try_set_result(value);
        }
        TaskState::Failed(err) => {
            outer.try_set_error(err);
        }
        TaskState::Canceled => {
            outer.try_set_canceled();
        }
        TaskState::Pending => {}
    }
}

impl<T, R> ExecuteResult<T> for ContinuationWithTaskExecuteResult<T, R>
where
    T: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    fn on_complete(&self, task: &Task<T>) {
        let task = task.clone();
        let slot = self.transform.clone();
        let continuation = self.continuation.clone();

        let job = Box::new(move || {
            let Some(transform) = slot.take() else {
                return;
            };
            match run_transform(transform, &task) {
                Ok(inner) => {
                    inner.add_on_complete_listener_on(Arc::new(ImmediateExecutor), move |inner| {
                        mirror(&inner, &continuation);
                    });
                }
                Err(err) => {
                    continuation.try_set_error(err);
                }
            }
        });

        if let Err(err) = self.executor.execute(job) {
            debug!(executor = self.executor.name(), error = %err, "continuation rejected");
            self.continuation.try_set_error(err);
        }
    }

    fn cancel(&self) {
        self.transform.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Job;

    struct RejectingExecutor;

    impl Executor for RejectingExecutor {
        fn execute(&self, _job: Job) -> Result<()> {
            Err(Error::Rejected("closed".into()))
        }

        fn name(&self) -> &'static str {
            "rejecting"
        }
    }

    fn succeeded(value: i32) -> Task<i32> {
        let source = TaskCompletionSource::new();
        source.set_result(value).unwrap();
        source.task()
    }

    #[test]
    fn test_rejected_continuation_fails() {
        let continuation = TaskCompletionSource::<i32>::new();
        let adapter = ContinuationExecuteResult::new(
            Arc::new(RejectingExecutor),
            |t: &Task<i32>| t.result(),
            continuation.clone(),
        );

        adapter.on_complete(&succeeded(1));
        let err = continuation.task().result().unwrap_err();
        assert!(matches!(err, Error::Rejected(_)));
    }

    #[test]
    fn test_canceled_continuation_stays_pending() {
        let continuation = TaskCompletionSource::<i32>::new();
        let adapter = ContinuationExecuteResult::new(
            Arc::new(ImmediateExecutor),
            |t: &Task<i32>| t.result(),
            continuation.clone(),
        );

        adapter.cancel();
        adapter.on_complete(&succeeded(1));
        assert!(!continuation.task().is_complete());
    }

    #[test]
    fn test_with_task_waits_for_inner() {
        let inner = TaskCompletionSource::<&'static str>::new();
        let continuation = TaskCompletionSource::<&'static str>::new();

        let inner_task = inner.task();
        let adapter = ContinuationWithTaskExecuteResult::new(
            Arc::new(ImmediateExecutor),
            move |_: &Task<i32>| Ok(inner_task),
            continuation.clone(),
        );

        adapter.on_complete(&succeeded(1));
        assert!(!continuation.task().is_complete());

        inner.set_result("done").unwrap();
        assert_eq!(continuation.task().result().unwrap(), "done");
    }
}
