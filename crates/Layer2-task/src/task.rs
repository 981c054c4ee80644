//! Task - handle to an eventually available result
//!
//! A `Task<T>` is created pending by a `TaskCompletionSource<T>` (or by one
//! of the `Tasks` helpers) and moves exactly once to `Succeeded`, `Failed` or
//! `Canceled`. Listeners and continuations registered on it are delivered
//! once, on the executor they were registered with.

use crate::executor::{Executor, ImmediateExecutor};
use crate::result::{
    CanceledExecuteResult, CompleteExecuteResult, ContinuationExecuteResult,
    ContinuationWithTaskExecuteResult, ExecuteResult, FailureExecuteResult,
    SuccessExecuteResult,
};
use crate::result_queue::ExecuteResultQueue;
use crate::state::TaskState;
use parking_lot::{Condvar, Mutex};
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use taskq_foundation::{Error, Result};
use tokio::sync::oneshot;
use tracing::trace;

struct TaskInner<T> {
    state: Mutex<TaskState<T>>,
    completed: Condvar,
    listeners: ExecuteResultQueue<T>,
    default_executor: Arc<dyn Executor>,
}

/// Eventually available result of type `T`
pub struct Task<T> {
    inner: Arc<TaskInner<T>>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("state", &self.inner.state.lock().display_name())
            .field("executor", &self.inner.default_executor.name())
            .finish()
    }
}

impl<T> Task<T>
where
    T: Clone + Send + 'static,
{
    fn pending(default_executor: Arc<dyn Executor>) -> Self {
        Self {
            inner: Arc::new(TaskInner {
                state: Mutex::new(TaskState::Pending),
                completed: Condvar::new(),
                listeners: ExecuteResultQueue::new(),
                default_executor,
            }),
        }
    }

    // ========== Queries ==========

    pub fn is_complete(&self) -> bool {
        self.inner.state.lock().is_terminal()
    }

    pub fn is_successful(&self) -> bool {
        self.inner.state.lock().is_success()
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.state.lock().is_canceled()
    }

    /// Snapshot of the current state
    pub fn state(&self) -> TaskState<T> {
        self.inner.state.lock().clone()
    }

    /// Result of a completed task.
    ///
    /// Failed tasks return their stored error, canceled ones `Error::Canceled`.
    /// Asking while the task is still pending is a contract violation.
    pub fn result(&self) -> Result<T> {
        match &*self.inner.state.lock() {
            TaskState::Pending => Err(Error::illegal_state("task is not yet complete")),
            TaskState::Succeeded(value) => Ok(value.clone()),
            TaskState::Failed(err) => Err(err.clone()),
            TaskState::Canceled => Err(Error::Canceled),
        }
    }

    /// Stored error of a failed task
    pub fn error(&self) -> Option<Error> {
        match &*self.inner.state.lock() {
            TaskState::Failed(err) => Some(err.clone()),
            _ => None,
        }
    }

    /// Executor used by listeners registered without one
    pub fn default_executor(&self) -> Arc<dyn Executor> {
        Arc::clone(&self.inner.default_executor)
    }

    // ========== Completion ==========

    fn complete(&self, outcome: TaskState<T>) -> bool {
        {
            let mut state = self.inner.state.lock();
            if state.is_terminal() {
                return false;
            }
            trace!(state = outcome.display_name(), "task completed");
            *state = outcome;
            self.inner.completed.notify_all();
        }

        self.inner.listeners.dispatch_all(self);
        true
    }

    /// Block until the task is terminal; returns false if `timeout` elapsed first
    pub(crate) fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut state = self.inner.state.lock();
        match timeout {
            None => {
                while !state.is_terminal() {
                    self.inner.completed.wait(&mut state);
                }
                true
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while !state.is_terminal() {
                    if self
                        .inner
                        .completed
                        .wait_until(&mut state, deadline)
                        .timed_out()
                    {
                        return state.is_terminal();
                    }
                }
                true
            }
        }
    }

    // ========== Listeners ==========

    fn register(&self, adapter: Arc<dyn ExecuteResult<T>>) -> ListenerHandle<T> {
        self.inner.listeners.enqueue(Arc::clone(&adapter));
        if self.is_complete() {
            self.inner.listeners.dispatch_all(self);
        }
        ListenerHandle { adapter }
    }

    /// Called with the value if the task succeeds, on the default executor
    pub fn add_on_success_listener<F>(&self, listener: F) -> ListenerHandle<T>
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.add_on_success_listener_on(self.default_executor(), listener)
    }

    /// Like `add_on_success_listener`, delivered on `executor`.
    ///
    /// If `executor` refuses the delivery job the listener is dropped
    /// uncalled and a warning is logged. The task's outcome and its other
    /// listeners are unaffected. The same holds for every `*_on` variant.
    pub fn add_on_success_listener_on<F>(
        &self,
        executor: Arc<dyn Executor>,
        listener: F,
    ) -> ListenerHandle<T>
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.register(Arc::new(SuccessExecuteResult::new(executor, listener)))
    }

    /// Called with the error if the task fails, on the default executor
    pub fn add_on_failure_listener<F>(&self, listener: F) -> ListenerHandle<T>
    where
        F: FnOnce(Error) + Send + 'static,
    {
        self.add_on_failure_listener_on(self.default_executor(), listener)
    }

    pub fn add_on_failure_listener_on<F>(
        &self,
        executor: Arc<dyn Executor>,
        listener: F,
    ) -> ListenerHandle<T>
    where
        F: FnOnce(Error) + Send + 'static,
    {
        self.register(Arc::new(FailureExecuteResult::new(executor, listener)))
    }

    /// Called if the task is canceled, on the default executor
    pub fn add_on_canceled_listener<F>(&self, listener: F) -> ListenerHandle<T>
    where
        F: FnOnce() + Send + 'static,
    {
        self.add_on_canceled_listener_on(self.default_executor(), listener)
    }

    pub fn add_on_canceled_listener_on<F>(
        &self,
        executor: Arc<dyn Executor>,
        listener: F,
    ) -> ListenerHandle<T>
    where
        F: FnOnce() + Send + 'static,
    {
        self.register(Arc::new(CanceledExecuteResult::new(executor, listener)))
    }

    /// Called with the task once it is terminal, whatever the outcome
    pub fn add_on_complete_listener<F>(&self, listener: F) -> ListenerHandle<T>
    where
        F: FnOnce(Task<T>) + Send + 'static,
    {
        self.add_on_complete_listener_on(self.default_executor(), listener)
    }

    pub fn add_on_complete_listener_on<F>(
        &self,
        executor: Arc<dyn Executor>,
        listener: F,
    ) -> ListenerHandle<T>
    where
        F: FnOnce(Task<T>) + Send + 'static,
    {
        self.register(Arc::new(CompleteExecuteResult::new(executor, listener)))
    }

    // ========== Continuations ==========

    /// New task completed with `transform(self)` once this task is terminal.
    ///
    /// The transform runs whatever the outcome; a canceled source does not
    /// cancel the continuation unless the transform reports it. Errors and
    /// panics from the transform fail the continuation.
    pub fn continue_with<R, F>(&self, executor: Arc<dyn Executor>, transform: F) -> Task<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(&Task<T>) -> Result<R> + Send + 'static,
    {
        let continuation = TaskCompletionSource::with_default_executor(self.default_executor());
        let task = continuation.task();
        self.register(Arc::new(ContinuationExecuteResult::new(
            executor,
            transform,
            continuation,
        )));
        task
    }

    /// New task mirroring the task returned by `transform(self)`.
    ///
    /// An `Err` from the transform stands in for "no task" and fails the
    /// continuation.
    pub fn continue_with_task<R, F>(&self, executor: Arc<dyn Executor>, transform: F) -> Task<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(&Task<T>) -> Result<Task<R>> + Send + 'static,
    {
        let continuation = TaskCompletionSource::with_default_executor(self.default_executor());
        let task = continuation.task();
        self.register(Arc::new(ContinuationWithTaskExecuteResult::new(
            executor,
            transform,
            continuation,
        )));
        task
    }
}

impl<T> IntoFuture for Task<T>
where
    T: Clone + Send + 'static,
{
    type Output = Result<T>;
    type IntoFuture = Pin<Box<dyn Future<Output = Result<T>> + Send + 'static>>;

    /// Await the task without blocking a thread
    fn into_future(self) -> Self::IntoFuture {
        let (sender, receiver) = oneshot::channel();
        self.add_on_complete_listener_on(Arc::new(ImmediateExecutor), move |task| {
            let _ = sender.send(task.result());
        });

        Box::pin(async move {
            receiver.await.unwrap_or_else(|_| {
                Err(Error::Internal(
                    "task dropped before completing".to_string(),
                ))
            })
        })
    }
}

/// Detaches a registered listener
pub struct ListenerHandle<T> {
    adapter: Arc<dyn ExecuteResult<T>>,
}

impl<T> ListenerHandle<T> {
    /// Stop the listener from being invoked.
    ///
    /// Has no effect once the listener has been handed its outcome.
    pub fn detach(&self) {
        self.adapter.cancel();
    }
}

/// Producer side of a `Task`
pub struct TaskCompletionSource<T> {
    task: Task<T>,
}

impl<T> Clone for TaskCompletionSource<T> {
    fn clone(&self) -> Self {
        Self {
            task: self.task.clone(),
        }
    }
}

impl<T> TaskCompletionSource<T>
where
    T: Clone + Send + 'static,
{
    /// Source whose task delivers listeners inline by default
    pub fn new() -> Self {
        Self::with_default_executor(Arc::new(ImmediateExecutor))
    }

    pub fn with_default_executor(executor: Arc<dyn Executor>) -> Self {
        Self {
            task: Task::pending(executor),
        }
    }

    pub fn task(&self) -> Task<T> {
        self.task.clone()
    }

    pub fn try_set_result(&self, value: T) -> bool {
        self.task.complete(TaskState::Succeeded(value))
    }

    pub fn try_set_error(&self, error: Error) -> bool {
        self.task.complete(TaskState::Failed(error))
    }

    pub fn try_set_canceled(&self) -> bool {
        self.task.complete(TaskState::Canceled)
    }

    /// Like `try_set_result`, but completing twice is a contract violation
    pub fn set_result(&self, value: T) -> Result<()> {
        if self.try_set_result(value) {
            Ok(())
        } else {
            Err(Error::illegal_state("task is already complete"))
        }
    }

    /// Like `try_set_error`, but completing twice is a contract violation
    pub fn set_error(&self, error: Error) -> Result<()> {
        if self.try_set_error(error) {
            Ok(())
        } else {
            Err(Error::illegal_state("task is already complete"))
        }
    }
}

impl<T> Default for TaskCompletionSource<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
