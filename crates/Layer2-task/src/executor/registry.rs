//! Executors - the named executors and queues callers pick from

use super::background::BackgroundExecutor;
use super::immediate::ImmediateExecutor;
use super::r#trait::Executor;
use super::serial::SerialExecutor;
use crate::node::{CallableExecutorNode, CallableNodeBuilder};
use crate::node_queue::ExecutorNodeQueue;
use crate::task::{Task, TaskCompletionSource};
use crate::tasks::Tasks;
use std::sync::Arc;
use taskq_foundation::{ExecutorsConfig, Result};
use tracing::info;

/// Name of the IO-bounded queue
pub const IO_QUEUE: &str = "io";

/// Name of the unbounded bookkeeping queue
pub const IMMEDIATE_QUEUE: &str = "immediate";

/// Named executor context.
///
/// Cheap to clone; clones share the same threads and queues.
#[derive(Clone)]
pub struct Executors {
    config: ExecutorsConfig,
    main: Arc<dyn Executor>,
    immediate: Arc<dyn Executor>,
    background: Arc<dyn Executor>,
    io_queue: ExecutorNodeQueue,
    immediate_queue: ExecutorNodeQueue,
}

impl Executors {
    /// Start the serial thread and the background pool described by `config`
    pub fn new(config: ExecutorsConfig) -> Result<Self> {
        config.validate()?;

        let main: Arc<dyn Executor> = Arc::new(SerialExecutor::new(
            config.serial_thread_name.clone(),
        )?);
        let background: Arc<dyn Executor> = Arc::new(BackgroundExecutor::new(&config)?);

        info!(
            io_max_concurrent = config.io_max_concurrent,
            background_max_threads = config.background_max_threads,
            "executors started"
        );

        Ok(Self::assemble(config, main, background))
    }

    /// Context running everything inline on the caller's thread
    pub fn deterministic() -> Self {
        let immediate: Arc<dyn Executor> = Arc::new(ImmediateExecutor);
        Self::assemble(ExecutorsConfig::default(), Arc::clone(&immediate), immediate)
    }

    fn assemble(
        config: ExecutorsConfig,
        main: Arc<dyn Executor>,
        background: Arc<dyn Executor>,
    ) -> Self {
        let immediate: Arc<dyn Executor> = Arc::new(ImmediateExecutor);
        let io_queue =
            ExecutorNodeQueue::new(IO_QUEUE, Arc::clone(&background), config.io_max_concurrent);
        let immediate_queue = ExecutorNodeQueue::new(
            IMMEDIATE_QUEUE,
            Arc::clone(&immediate),
            config.immediate_queue_limit(),
        );

        Self {
            config,
            main,
            immediate,
            background,
            io_queue,
            immediate_queue,
        }
    }

    /// Replace the serial executor
    pub fn with_main(mut self, main: Arc<dyn Executor>) -> Self {
        self.main = main;
        self
    }

    /// Replace the background executor; the queues are rebuilt on top of it
    pub fn with_background(self, background: Arc<dyn Executor>) -> Self {
        Self::assemble(self.config, self.main, background)
    }

    // ========== Accessors ==========

    pub fn config(&self) -> &ExecutorsConfig {
        &self.config
    }

    /// Serial "main" executor
    pub fn main(&self) -> Arc<dyn Executor> {
        Arc::clone(&self.main)
    }

    pub fn immediate(&self) -> Arc<dyn Executor> {
        Arc::clone(&self.immediate)
    }

    pub fn background(&self) -> Arc<dyn Executor> {
        Arc::clone(&self.background)
    }

    pub fn io_queue(&self) -> &ExecutorNodeQueue {
        &self.io_queue
    }

    pub fn immediate_queue(&self) -> &ExecutorNodeQueue {
        &self.immediate_queue
    }

    /// Look up a queue by name
    pub fn queue(&self, name: &str) -> Option<&ExecutorNodeQueue> {
        match name {
            IO_QUEUE => Some(&self.io_queue),
            IMMEDIATE_QUEUE => Some(&self.immediate_queue),
            _ => None,
        }
    }

    // ========== Factories ==========

    /// Completion source whose task delivers listeners on `main`
    pub fn completion_source<T>(&self) -> TaskCompletionSource<T>
    where
        T: Clone + Send + 'static,
    {
        TaskCompletionSource::with_default_executor(self.main())
    }

    /// Run `work` on the background executor
    pub fn call<T, F>(&self, work: F) -> Task<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        Tasks::call_with_default(&self.background, self.main(), work)
    }

    /// Node builder delivering its callbacks on `main`
    pub fn node<T, F>(&self, work: F) -> CallableNodeBuilder<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        CallableExecutorNode::builder(work).callback_executor(self.main())
    }
}

impl std::fmt::Debug for Executors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executors")
            .field("main", &self.main.name())
            .field("background", &self.background.name())
            .field("io_queue", &self.io_queue)
            .field("immediate_queue", &self.immediate_queue)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::on_serial_thread;
    use crate::node::ExecutorNode;
    use std::time::Duration;

    #[test]
    fn test_deterministic_runs_inline() {
        let executors = Executors::deterministic();
        let task = executors.call(|| Ok("inline"));
        assert_eq!(task.result().unwrap(), "inline");
    }

    #[test]
    fn test_queue_lookup() {
        let executors = Executors::deterministic();
        assert_eq!(executors.queue(IO_QUEUE).unwrap().max_concurrent(), 64);
        assert_eq!(
            executors.queue(IMMEDIATE_QUEUE).unwrap().max_concurrent(),
            usize::MAX
        );
        assert!(executors.queue("missing").is_none());
    }

    #[test]
    fn test_node_on_deterministic_io_queue() {
        let executors = Executors::deterministic();
        let node = executors.node(|| Ok(5)).build();

        executors.io_queue().enqueue(node.clone());
        assert!(node.is_completed());
        assert_eq!(node.get().unwrap(), 5);
        assert_eq!(executors.io_queue().running_count(), 0);
        assert_eq!(executors.io_queue().stats().completed, 1);
    }

    #[test]
    fn test_with_background_rebuilds_queues() {
        let executors = Executors::deterministic();
        let old = executors.io_queue().clone();
        let rebuilt = executors.with_background(Arc::new(ImmediateExecutor));

        let node = rebuilt.node(|| Ok(1)).build();
        rebuilt.io_queue().enqueue(node);
        assert_eq!(rebuilt.io_queue().stats().admitted, 1);
        assert_eq!(old.stats().admitted, 0);
    }

    #[test]
    fn test_threaded_context_delivers_on_main() {
        let config = ExecutorsConfig::default().serial_thread_name("test-registry-main");
        let executors = Executors::new(config).unwrap();

        let task = executors.call(|| Ok(on_serial_thread()));
        let (tx, rx) = std::sync::mpsc::channel();
        task.add_on_success_listener(move |ran_on_main| {
            tx.send((ran_on_main, on_serial_thread())).unwrap();
        });

        let (ran_on_main, listener_on_main) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(!ran_on_main);
        assert!(listener_on_main);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ExecutorsConfig::default().io_max_concurrent(0);
        assert!(Executors::new(config).is_err());
    }
}
