//! Outcome-filtering listener adapters

use super::{post, ExecuteResult, ListenerSlot};
use crate::executor::Executor;
use crate::state::TaskState;
use crate::task::Task;
use std::sync::Arc;
use taskq_foundation::Error;

type SuccessListener<T> = Box<dyn FnOnce(T) + Send + 'static>;
type FailureListener = Box<dyn FnOnce(Error) + Send + 'static>;
type CanceledListener = Box<dyn FnOnce() + Send + 'static>;
type CompleteListener<T> = Box<dyn FnOnce(Task<T>) + Send + 'static>;

/// Delivers the value of a successful task
pub struct SuccessExecuteResult<T> {
    executor: Arc<dyn Executor>,
    listener: ListenerSlot<SuccessListener<T>>,
}

impl<T> SuccessExecuteResult<T> {
    pub fn new<F>(executor: Arc<dyn Executor>, listener: F) -> Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        Self {
            executor,
            listener: ListenerSlot::new(Box::new(listener)),
        }
    }
}

impl<T> ExecuteResult<T> for SuccessExecuteResult<T>
where
    T: Clone + Send + 'static,
{
    fn on_complete(&self, task: &Task<T>) {
        let TaskState::Succeeded(value) = task.state() else {
            return;
        };
        let slot = self.listener.clone();
        post(
            &self.executor,
            Box::new(move || {
                if let Some(listener) = slot.take() {
                    listener(value);
                }
            }),
        );
    }

    fn cancel(&self) {
        self.listener.clear();
    }
}

/// Delivers the error of a failed task
pub struct FailureExecuteResult {
    executor: Arc<dyn Executor>,
    listener: ListenerSlot<FailureListener>,
}

impl FailureExecuteResult {
    pub fn new<F>(executor: Arc<dyn Executor>, listener: F) -> Self
    where
        F: FnOnce(Error) + Send + 'static,
    {
        Self {
            executor,
            listener: ListenerSlot::new(Box::new(listener)),
        }
    }
}

impl<T> ExecuteResult<T> for FailureExecuteResult
where
    T: Clone + Send + 'static,
{
    fn on_complete(&self, task: &Task<T>) {
        let Some(error) = task.error() else {
            return;
        };
        let slot = self.listener.clone();
        post(
            &self.executor,
            Box::new(move || {
                if let Some(listener) = slot.take() {
                    listener(error);
                }
            }),
        );
    }

    fn cancel(&self) {
        self.listener.clear();
    }
}

/// Notifies that a task was canceled
pub struct CanceledExecuteResult {
    executor: Arc<dyn Executor>,
    listener: ListenerSlot<CanceledListener>,
}

impl CanceledExecuteResult {
    pub fn new<F>(executor: Arc<dyn Executor>, listener: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            executor,
            listener: ListenerSlot::new(Box::new(listener)),
        }
    }
}

impl<T> ExecuteResult<T> for CanceledExecuteResult
where
    T: Clone + Send + 'static,
{
    fn on_complete(&self, task: &Task<T>) {
        if !task.is_canceled() {
            return;
        }
        let slot = self.listener.clone();
        post(
            &self.executor,
            Box::new(move || {
                if let Some(listener) = slot.take() {
                    listener();
                }
            }),
        );
    }

    fn cancel(&self) {
        self.listener.clear();
    }
}

/// Hands the terminal task to the listener, whatever the outcome
pub struct CompleteExecuteResult<T> {
    executor: Arc<dyn Executor>,
    listener: ListenerSlot<CompleteListener<T>>,
}

impl<T> CompleteExecuteResult<T> {
    pub fn new<F>(executor: Arc<dyn Executor>, listener: F) -> Self
    where
        F: FnOnce(Task<T>) + Send + 'static,
    {
        Self {
            executor,
            listener: ListenerSlot::new(Box::new(listener)),
        }
    }
}

impl<T> ExecuteResult<T> for CompleteExecuteResult<T>
where
    T: Clone + Send + 'static,
{
    fn on_complete(&self, task: &Task<T>) {
        let task = task.clone();
        let slot = self.listener.clone();
        post(
            &self.executor,
            Box::new(move || {
                if let Some(listener) = slot.take() {
                    listener(task);
                }
            }),
        );
    }

    fn cancel(&self) {
        self.listener.clear();
    }
}
