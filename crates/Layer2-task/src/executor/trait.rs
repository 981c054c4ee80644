//! Executor trait

use taskq_foundation::Result;

/// A unit of work handed to an executor
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Executor trait - implement to add new scheduling policies
pub trait Executor: Send + Sync {
    /// Schedule a job.
    ///
    /// Returns `Error::Rejected` when the executor cannot accept the job; the
    /// job is dropped without running in that case.
    fn execute(&self, job: Job) -> Result<()>;

    /// Get executor name
    fn name(&self) -> &'static str;
}
