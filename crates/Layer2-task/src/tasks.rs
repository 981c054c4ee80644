//! Task factory and blocking helpers

use crate::executor::{on_serial_thread, Executor, ImmediateExecutor};
use crate::state::TaskState;
use crate::task::{Task, TaskCompletionSource};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taskq_foundation::{Error, Result};
use tracing::debug;

/// Static helpers creating, combining and awaiting tasks
pub struct Tasks;

impl Tasks {
    /// Run `work` on `executor` and expose its outcome as a task.
    ///
    /// The task delivers listeners inline unless they name an executor.
    pub fn call<T, F>(executor: &Arc<dyn Executor>, work: F) -> Task<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        Self::call_with_default(executor, Arc::new(ImmediateExecutor), work)
    }

    /// Like `call`, with an explicit default listener executor for the task
    pub fn call_with_default<T, F>(
        executor: &Arc<dyn Executor>,
        default_executor: Arc<dyn Executor>,
        work: F,
    ) -> Task<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let source = TaskCompletionSource::with_default_executor(default_executor);
        let task = source.task();

        let producer = source.clone();
        let job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(work))
                .unwrap_or_else(|payload| Err(Error::from_panic(payload)));
            match outcome {
                Ok(value) => {
                    producer.try_set_result(value);
                }
                Err(err) => {
                    producer.try_set_error(err);
                }
            }
        });

        if let Err(err) = executor.execute(job) {
            debug!(executor = executor.name(), error = %err, "call rejected");
            source.try_set_error(err);
        }
        task
    }

    pub fn for_result<T>(value: T) -> Task<T>
    where
        T: Clone + Send + 'static,
    {
        let source = TaskCompletionSource::new();
        source.try_set_result(value);
        source.task()
    }

    pub fn for_error<T>(error: Error) -> Task<T>
    where
        T: Clone + Send + 'static,
    {
        let source = TaskCompletionSource::new();
        source.try_set_error(error);
        source.task()
    }

    pub fn for_canceled<T>() -> Task<T>
    where
        T: Clone + Send + 'static,
    {
        let source = TaskCompletionSource::new();
        source.try_set_canceled();
        source.task()
    }

    /// Task completing once every input is terminal.
    ///
    /// Fails with the first error observed, else ends canceled if any input
    /// was canceled, else succeeds. No inputs means immediate success.
    pub fn when_all<T>(tasks: Vec<Task<T>>) -> Task<()>
    where
        T: Clone + Send + 'static,
    {
        Self::join(tasks, |_| ())
    }

    /// Like `when_all`, yielding the values in input order
    pub fn when_all_success<T>(tasks: Vec<Task<T>>) -> Task<Vec<T>>
    where
        T: Clone + Send + 'static,
    {
        Self::join(tasks, |values| values)
    }

    fn join<T, R, F>(tasks: Vec<Task<T>>, finish: F) -> Task<R>
    where
        T: Clone + Send + 'static,
        R: Clone + Send + 'static,
        F: FnOnce(Vec<T>) -> R + Send + 'static,
    {
        let source = TaskCompletionSource::new();
        let result = source.task();
        if tasks.is_empty() {
            source.try_set_result(finish(Vec::new()));
            return result;
        }

        let finish: Finish<T, R> = Box::new(finish);
        let join = Arc::new(JoinState {
            remaining: AtomicUsize::new(tasks.len()),
            values: Mutex::new(vec![None; tasks.len()]),
            first_error: Mutex::new(None),
            any_canceled: AtomicBool::new(false),
            finish: Mutex::new(Some(finish)),
            source,
        });

        for (index, task) in tasks.into_iter().enumerate() {
            let join = Arc::clone(&join);
            task.add_on_complete_listener_on(Arc::new(ImmediateExecutor), move |task| {
                join.record(index, task.state());
            });
        }
        result
    }

    // ========== Blocking ==========

    /// Block until `task` is terminal and return its result.
    ///
    /// Refuses to block the serial executor thread.
    pub fn await_task<T>(task: &Task<T>) -> Result<T>
    where
        T: Clone + Send + 'static,
    {
        Self::ensure_may_block()?;
        task.wait(None);
        task.result()
    }

    /// Block at most `timeout`.
    ///
    /// Returns `Error::Timeout` if the task is still pending afterwards; the
    /// task itself is left untouched.
    pub fn await_timeout<T>(task: &Task<T>, timeout: Duration) -> Result<T>
    where
        T: Clone + Send + 'static,
    {
        Self::ensure_may_block()?;
        if !task.wait(Some(timeout)) {
            return Err(Error::Timeout(format!(
                "task still pending after {:?}",
                timeout
            )));
        }
        task.result()
    }

    fn ensure_may_block() -> Result<()> {
        if on_serial_thread() {
            return Err(Error::illegal_state(
                "blocking wait on the serial executor thread",
            ));
        }
        Ok(())
    }
}

type Finish<T, R> = Box<dyn FnOnce(Vec<T>) -> R + Send + 'static>;

struct JoinState<T, R> {
    remaining: AtomicUsize,
    values: Mutex<Vec<Option<T>>>,
    first_error: Mutex<Option<Error>>,
    any_canceled: AtomicBool,
    finish: Mutex<Option<Finish<T, R>>>,
    source: TaskCompletionSource<R>,
}

impl<T, R> JoinState<T, R>
where
    T: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    fn record(&self, index: usize, state: TaskState<T>) {
        match state {
            TaskState::Succeeded(value) => self.values.lock()[index] = Some(value),
            TaskState::Failed(err) => {
                self.first_error.lock().get_or_insert(err);
            }
            TaskState::Canceled => self.any_canceled.store(true, Ordering::SeqCst),
            TaskState::Pending => return,
        }

        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.settle();
        }
    }

    fn settle(&self) {
        if let Some(err) = self.first_error.lock().take() {
            self.source.try_set_error(err);
            return;
        }
        if self.any_canceled.load(Ordering::SeqCst) {
            self.source.try_set_canceled();
            return;
        }

        let values: Vec<T> = std::mem::take(&mut *self.values.lock())
            .into_iter()
            .flatten()
            .collect();
        if let Some(finish) = self.finish.lock().take() {
            self.source.try_set_result(finish(values));
        }
    }
}
