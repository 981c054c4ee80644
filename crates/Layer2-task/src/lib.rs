//! # taskq-task
//!
//! Task/future primitives and bounded-concurrency execution queues.
//!
//! ## Features
//!
//! - `Task` / `TaskCompletionSource` - single-assignment results with
//!   listeners and continuations delivered on a chosen executor
//! - `CancellationTokenSource` - cooperative, callback-based cancellation
//! - `ExecutorNodeQueue` - admission-controlled dispatch of executor nodes
//! - `Executors` - serial "main", immediate and background executors plus
//!   the `io` and `immediate` queues
//! - Blocking (`Tasks::await_task`) and async (`task.await`) consumption

pub mod cancel;
pub mod executor;
pub mod node;
pub mod node_queue;
pub mod result;
pub mod result_queue;
pub mod state;
pub mod task;
pub mod tasks;

// Tasks
pub use state::TaskState;
pub use task::{ListenerHandle, Task, TaskCompletionSource};
pub use tasks::Tasks;

// Listener adapters
pub use result::ExecuteResult;
pub use result_queue::ExecuteResultQueue;

// Cancellation
pub use cancel::{CancellationRegistration, CancellationToken, CancellationTokenSource};

// Executors
pub use executor::{
    on_serial_thread, BackgroundExecutor, Executor, Executors, ImmediateExecutor, Job,
    SerialExecutor, IMMEDIATE_QUEUE, IO_QUEUE,
};

// Nodes
pub use node::{CallableExecutorNode, CallableNodeBuilder, ExecutorNode, ExecutorNodeItem, NodeId};
pub use node_queue::{ExecutorNodeQueue, NodeQueueStats, WeakNodeQueue};

pub use taskq_foundation::{Error, ExecutorsConfig, Result};
