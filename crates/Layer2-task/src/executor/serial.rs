//! Serial executor - one named thread, FIFO delivery
//!
//! Plays the role of the "main" thread: every listener that does not name an
//! executor is delivered here, in submission order.

use super::r#trait::{Executor, Job};
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::thread::ThreadId;
use taskq_foundation::{Error, Result};
use tokio::sync::mpsc;
use tracing::{debug, warn};

thread_local! {
    static ON_SERIAL_THREAD: Cell<bool> = const { Cell::new(false) };
}

/// Check whether the current thread is the thread of any serial executor
pub fn on_serial_thread() -> bool {
    ON_SERIAL_THREAD.with(|flag| flag.get())
}

/// Single-threaded FIFO executor.
///
/// The thread stops once the executor is dropped and every job queued before
/// that has run.
#[derive(Debug)]
pub struct SerialExecutor {
    sender: mpsc::UnboundedSender<Job>,
    thread_id: ThreadId,
    thread_name: String,
}

impl SerialExecutor {
    /// Spawn the serial thread
    pub fn new(thread_name: impl Into<String>) -> Result<Self> {
        let thread_name = thread_name.into();
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();

        let name = thread_name.clone();
        let handle = std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                ON_SERIAL_THREAD.with(|flag| flag.set(true));
                debug!(thread = %name, "serial executor started");

                while let Some(job) = receiver.blocking_recv() {
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                        let err = Error::from_panic(payload);
                        warn!(thread = %name, error = %err, "job panicked on serial executor");
                    }
                }

                debug!(thread = %name, "serial executor stopped");
            })?;

        Ok(Self {
            sender,
            thread_id: handle.thread().id(),
            thread_name,
        })
    }

    /// Check whether the caller runs on this executor's thread
    pub fn is_current_thread(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }
}

impl Executor for SerialExecutor {
    fn execute(&self, job: Job) -> Result<()> {
        self.sender
            .send(job)
            .map_err(|_| Error::Rejected(format!("serial executor {} stopped", self.thread_name)))
    }

    fn name(&self) -> &'static str {
        "serial"
    }
}
