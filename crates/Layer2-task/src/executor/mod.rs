//! Task executors
//!
//! Provides the scheduling policies tasks and nodes run on:
//! - `SerialExecutor` - one named "main" thread, FIFO delivery
//! - `ImmediateExecutor` - inline on the calling thread
//! - `BackgroundExecutor` - elastic blocking pool with a lazily built
//!   overflow pool
//!
//! ## Registry
//! - `Executors` - the named executors plus the `io` and `immediate`
//!   node queues layered on top of them

pub mod background;
pub mod immediate;
pub mod registry;
pub mod serial;
pub mod r#trait;

pub use background::BackgroundExecutor;
pub use immediate::ImmediateExecutor;
pub use r#trait::{Executor, Job};
pub use registry::{Executors, IMMEDIATE_QUEUE, IO_QUEUE};
pub use serial::{on_serial_thread, SerialExecutor};
