//! Executor nodes - single-shot, cancellation-aware units of work
//!
//! A node is tracked by at most one `ExecutorNodeQueue` at a time and runs at
//! most once. It removes itself from its queue when it completes, fails or is
//! canceled, which frees the slot for the next pending node.

use crate::cancel::{CancellationRegistration, CancellationToken};
use crate::executor::{Executor, ImmediateExecutor};
use crate::node_queue::WeakNodeQueue;
use crate::task::{Task, TaskCompletionSource};
use crate::tasks::Tasks;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use taskq_foundation::{Error, Result};
use tracing::{debug, warn};
use uuid::Uuid;

/// Unique identifier for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Generate a new random NodeId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Unit of work scheduled by an `ExecutorNodeQueue`
pub trait ExecutorNode: Send + Sync + 'static {
    fn id(&self) -> NodeId;

    /// Whether the node already reached a terminal outcome
    fn is_completed(&self) -> bool;

    /// Record the queue that tracks this node.
    ///
    /// Fails while the node is bound to a different live queue.
    fn bind_queue(&self, queue: WeakNodeQueue) -> Result<()>;

    /// Execute the node on the current thread
    fn run(self: Arc<Self>);

    /// Fail the node without running it (rejected submission, re-submission)
    fn handle_error(&self, error: Error);
}

/// Cancellation view shared by node implementations
#[derive(Debug, Clone, Default)]
pub struct ExecutorNodeItem {
    token: Option<CancellationToken>,
}

impl ExecutorNodeItem {
    pub fn new(token: Option<CancellationToken>) -> Self {
        Self { token }
    }

    pub fn token(&self) -> Option<&CancellationToken> {
        self.token.as_ref()
    }

    pub fn is_cancellation_requested(&self) -> bool {
        self.token
            .as_ref()
            .map(|t| t.is_cancellation_requested())
            .unwrap_or(false)
    }
}

type Work<T> = Box<dyn FnOnce() -> Result<T> + Send + 'static>;
type ResponseCallback<T> = Arc<dyn Fn(T) + Send + Sync + 'static>;
type FailureCallback = Arc<dyn Fn(Error) + Send + Sync + 'static>;

/// Node wrapping a zero-argument computation.
///
/// The outcome is delivered to `on_response` / `on_failure` on the callback
/// executor, whichever thread ran the work. A canceled token completes the
/// node as canceled and reports `Error::Canceled` to `on_failure`; the work
/// itself is only interrupted cooperatively (a parked worker is unparked).
pub struct CallableExecutorNode<T> {
    id: NodeId,
    item: ExecutorNodeItem,
    work: Mutex<Option<Work<T>>>,
    completion: TaskCompletionSource<T>,
    callback_executor: Arc<dyn Executor>,
    on_response: Option<ResponseCallback<T>>,
    on_failure: Option<FailureCallback>,
    queue: Mutex<WeakNodeQueue>,
    worker: Mutex<Option<std::thread::Thread>>,
    /// Dropped with the node, which unregisters the token callback
    registration: Mutex<Option<CancellationRegistration>>,
}

impl<T> CallableExecutorNode<T>
where
    T: Clone + Send + 'static,
{
    pub fn builder<F>(work: F) -> CallableNodeBuilder<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        CallableNodeBuilder {
            work: Box::new(work),
            token: None,
            callback_executor: Arc::new(ImmediateExecutor),
            on_response: None,
            on_failure: None,
        }
    }

    /// Task completed with the node's outcome
    pub fn task(&self) -> Task<T> {
        self.completion.task()
    }

    pub fn item(&self) -> &ExecutorNodeItem {
        &self.item
    }

    /// Block until the node finishes, then release its queue slot
    pub fn get(&self) -> Result<T> {
        let outcome = Tasks::await_task(&self.completion.task());
        self.detach_from_queue();
        outcome
    }

    /// Block at most `timeout`, then release the node's queue slot.
    ///
    /// A timeout does not cancel the work, and a node still waiting for a
    /// slot stays queued.
    pub fn get_timeout(&self, timeout: Duration) -> Result<T> {
        let outcome = Tasks::await_timeout(&self.completion.task(), timeout);
        self.detach_from_queue();
        outcome
    }

    fn detach_from_queue(&self) {
        let queue = self.queue.lock().upgrade();
        if let Some(queue) = queue {
            queue.remove(self.id);
        }
    }

    fn withdraw_from_queue(&self) {
        let queue = self.queue.lock().upgrade();
        if let Some(queue) = queue {
            queue.withdraw(self.id);
        }
    }

    fn deliver_response(&self, value: T) {
        if let Some(callback) = self.on_response.clone() {
            self.post(Box::new(move || callback(value)));
        }
    }

    fn deliver_failure(&self, error: Error) {
        if let Some(callback) = self.on_failure.clone() {
            self.post(Box::new(move || callback(error)));
        }
    }

    fn post(&self, job: crate::executor::Job) {
        if let Err(e) = self.callback_executor.execute(job) {
            warn!(node = %self.id, error = %e, "node callback rejected");
        }
    }

    /// Cancellation requested through the token
    fn interrupt(&self) {
        if !self.completion.try_set_canceled() {
            return;
        }
        debug!(node = %self.id, "node canceled");

        if let Some(worker) = self.worker.lock().as_ref() {
            worker.unpark();
        }
        self.deliver_failure(Error::Canceled);
        self.withdraw_from_queue();
    }
}

impl<T> ExecutorNode for CallableExecutorNode<T>
where
    T: Clone + Send + 'static,
{
    fn id(&self) -> NodeId {
        self.id
    }

    fn is_completed(&self) -> bool {
        self.completion.task().is_complete()
    }

    fn bind_queue(&self, queue: WeakNodeQueue) -> Result<()> {
        let mut bound = self.queue.lock();
        if !bound.ptr_eq(&queue) && bound.upgrade().is_some() {
            return Err(Error::illegal_state(format!(
                "node {} is tracked by another queue",
                self.id
            )));
        }
        *bound = queue;
        Ok(())
    }

    fn run(self: Arc<Self>) {
        let work = self.work.lock().take();
        let Some(work) = work else {
            self.handle_error(Error::illegal_state(format!(
                "node {} already executed",
                self.id
            )));
            return;
        };

        if self.item.is_cancellation_requested() {
            self.interrupt();
        }
        if self.is_completed() {
            self.detach_from_queue();
            return;
        }

        *self.worker.lock() = Some(std::thread::current());
        let outcome = panic::catch_unwind(AssertUnwindSafe(work))
            .unwrap_or_else(|payload| Err(Error::from_panic(payload)));
        *self.worker.lock() = None;

        match outcome {
            Ok(value) => {
                if self.completion.try_set_result(value.clone()) {
                    self.deliver_response(value);
                }
            }
            Err(err) => {
                debug!(node = %self.id, error = %err, "node work failed");
                if self.completion.try_set_error(err.clone()) {
                    self.deliver_failure(err);
                }
            }
        }

        self.detach_from_queue();
    }

    fn handle_error(&self, error: Error) {
        warn!(node = %self.id, error = %error, "node failed without running");
        self.completion.try_set_error(error.clone());
        self.deliver_failure(error);
        self.detach_from_queue();
    }
}

/// Builder for `CallableExecutorNode`
pub struct CallableNodeBuilder<T> {
    work: Work<T>,
    token: Option<CancellationToken>,
    callback_executor: Arc<dyn Executor>,
    on_response: Option<ResponseCallback<T>>,
    on_failure: Option<FailureCallback>,
}

impl<T> CallableNodeBuilder<T>
where
    T: Clone + Send + 'static,
{
    pub fn token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Executor `on_response` / `on_failure` are delivered on
    pub fn callback_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.callback_executor = executor;
        self
    }

    pub fn on_response<F>(mut self, callback: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.on_response = Some(Arc::new(callback));
        self
    }

    pub fn on_failure<F>(mut self, callback: F) -> Self
    where
        F: Fn(Error) + Send + Sync + 'static,
    {
        self.on_failure = Some(Arc::new(callback));
        self
    }

    pub fn build(self) -> Arc<CallableExecutorNode<T>> {
        let node = Arc::new(CallableExecutorNode {
            id: NodeId::new(),
            item: ExecutorNodeItem::new(self.token.clone()),
            work: Mutex::new(Some(self.work)),
            completion: TaskCompletionSource::with_default_executor(Arc::clone(
                &self.callback_executor,
            )),
            callback_executor: self.callback_executor,
            on_response: self.on_response,
            on_failure: self.on_failure,
            queue: Mutex::new(WeakNodeQueue::default()),
            worker: Mutex::new(None),
            registration: Mutex::new(None),
        });

        if let Some(token) = self.token {
            let weak = Arc::downgrade(&node);
            let registration = token.on_canceled_requested(move || {
                if let Some(node) = weak.upgrade() {
                    node.interrupt();
                }
            });
            *node.registration.lock() = Some(registration);
        }

        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationTokenSource;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_run_delivers_response() {
        let seen = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);
        let node = CallableExecutorNode::builder(|| Ok(21 * 2))
            .on_response(move |v| *slot.lock() = Some(v))
            .build();

        Arc::clone(&node).run();
        assert_eq!(*seen.lock(), Some(42));
        assert_eq!(node.get().unwrap(), 42);
    }

    #[test]
    fn test_panicking_work_fails_node() {
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&failures);
        let node: Arc<CallableExecutorNode<i32>> =
            CallableExecutorNode::builder(|| panic!("bad input"))
                .on_failure(move |e| sink.lock().push(e.to_string()))
                .build();

        Arc::clone(&node).run();
        assert!(node.get().unwrap_err().to_string().contains("bad input"));
        assert_eq!(failures.lock().len(), 1);
    }

    #[test]
    fn test_second_run_is_contract_violation() {
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&failures);
        let node = CallableExecutorNode::builder(|| Ok(1))
            .on_failure(move |e| sink.lock().push(e))
            .build();

        Arc::clone(&node).run();
        Arc::clone(&node).run();

        assert_eq!(node.get().unwrap(), 1);
        let failures = failures.lock();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].is_contract_violation());
    }

    #[test]
    fn test_cancel_before_run_skips_work() {
        let source = CancellationTokenSource::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(Mutex::new(Vec::new()));

        let r = Arc::clone(&ran);
        let sink = Arc::clone(&failures);
        let node = CallableExecutorNode::builder(move || {
            r.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .token(source.token())
        .on_failure(move |e| sink.lock().push(e))
        .build();

        source.cancel();
        assert!(node.task().is_canceled());
        assert!(node.item().is_cancellation_requested());

        Arc::clone(&node).run();
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert!(failures.lock()[0].is_canceled());
    }

    #[test]
    fn test_already_canceled_token_completes_at_build() {
        let node = CallableExecutorNode::builder(|| Ok(1))
            .token(CancellationToken::canceled())
            .build();
        assert!(node.is_completed());
        assert!(node.get().unwrap_err().is_canceled());
    }

    #[test]
    fn test_node_id_display_is_short() {
        assert_eq!(NodeId::new().to_string().len(), 8);
    }
}
