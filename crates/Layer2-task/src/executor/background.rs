//! Background executor - elastic blocking pool with an overflow pool
//!
//! Jobs go to the blocking pool of a tokio runtime, which spawns a thread per
//! job on demand and retires idle ones. Once `background_max_threads` jobs are
//! in flight the executor stops handing off and routes new jobs to a
//! fixed-size rayon pool with an unbounded queue. The rayon pool is built the
//! first time it is needed.

use super::r#trait::{Executor, Job};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taskq_foundation::{Error, ExecutorsConfig, Result};
use tokio::runtime::{Handle, Runtime};
use tracing::{debug, warn};

/// Idle time after which a blocking worker thread exits
const KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Decrements the in-flight counter when the job finishes, panicking or not
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn run_guarded(job: Job, pool: &'static str) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
        let err = Error::from_panic(payload);
        warn!(pool = pool, error = %err, "job panicked on background executor");
    }
}

/// Unbounded-with-overflow background executor
pub struct BackgroundExecutor {
    /// Owned runtime, if this executor created it
    runtime: Mutex<Option<Runtime>>,

    handle: Handle,

    in_flight: Arc<AtomicUsize>,

    max_in_flight: usize,

    /// Lazily built overflow pool
    backup: Mutex<Option<Arc<rayon::ThreadPool>>>,

    backup_threads: usize,

    backup_thread_name: String,
}

impl BackgroundExecutor {
    /// Build an executor that owns its own runtime
    pub fn new(config: &ExecutorsConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(config.background_max_threads)
            .thread_keep_alive(KEEP_ALIVE)
            .thread_name(config.background_thread_name.clone())
            .build()?;
        let handle = runtime.handle().clone();

        debug!(
            max_threads = config.background_max_threads,
            "background executor started"
        );

        Ok(Self::from_parts(Some(runtime), handle, config))
    }

    /// Build an executor on top of an existing runtime
    pub fn with_handle(handle: Handle, config: &ExecutorsConfig) -> Self {
        Self::from_parts(None, handle, config)
    }

    fn from_parts(runtime: Option<Runtime>, handle: Handle, config: &ExecutorsConfig) -> Self {
        Self {
            runtime: Mutex::new(runtime),
            handle,
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: config.background_max_threads,
            backup: Mutex::new(None),
            backup_threads: config.backup_pool_threads,
            backup_thread_name: config.backup_thread_name.clone(),
        }
    }

    /// Jobs currently running or waiting on the blocking pool
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Whether the overflow pool has been built
    pub fn has_backup_pool(&self) -> bool {
        self.backup.lock().is_some()
    }

    fn backup_pool(&self) -> Result<Arc<rayon::ThreadPool>> {
        let mut backup = self.backup.lock();
        if let Some(pool) = backup.as_ref() {
            return Ok(Arc::clone(pool));
        }

        let prefix = self.backup_thread_name.clone();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.backup_threads)
            .thread_name(move |i| format!("{}-{}", prefix, i))
            .panic_handler(|payload| {
                let err = Error::from_panic(payload);
                warn!(error = %err, "job panicked on backup pool");
            })
            .build()
            .map_err(|e| Error::Rejected(format!("backup pool unavailable: {}", e)))?;

        warn!(
            threads = self.backup_threads,
            "background executor saturated, backup pool created"
        );

        let pool = Arc::new(pool);
        *backup = Some(Arc::clone(&pool));
        Ok(pool)
    }

    fn overflow(&self, job: Job) -> Result<()> {
        let pool = self.backup_pool()?;
        debug!(in_flight = self.in_flight(), "job routed to backup pool");
        pool.spawn(move || run_guarded(job, "backup"));
        Ok(())
    }
}

impl Executor for BackgroundExecutor {
    fn execute(&self, job: Job) -> Result<()> {
        let previous = self.in_flight.fetch_add(1, Ordering::SeqCst);
        if previous >= self.max_in_flight {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            return self.overflow(job);
        }

        let guard = InFlightGuard(Arc::clone(&self.in_flight));
        self.handle.spawn_blocking(move || {
            let _guard = guard;
            run_guarded(job, "blocking");
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "background"
    }
}

impl Drop for BackgroundExecutor {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for BackgroundExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundExecutor")
            .field("in_flight", &self.in_flight())
            .field("max_in_flight", &self.max_in_flight)
            .field("has_backup_pool", &self.has_backup_pool())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_runs_jobs_off_caller_thread() {
        let executor = BackgroundExecutor::new(&ExecutorsConfig::default()).unwrap();
        let caller = std::thread::current().id();
        let (tx, rx) = mpsc::channel();

        executor
            .execute(Box::new(move || tx.send(std::thread::current().id()).unwrap()))
            .unwrap();

        let worker = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_ne!(worker, caller);
    }

    #[test]
    fn test_overflow_goes_to_backup_pool() {
        let config = ExecutorsConfig::default()
            .background_max_threads(1)
            .backup_pool_threads(1);
        let executor = BackgroundExecutor::new(&config).unwrap();
        assert!(!executor.has_backup_pool());

        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel::<()>();
        executor
            .execute(Box::new(move || {
                started_tx.send(()).unwrap();
                let _ = release_rx.recv_timeout(Duration::from_secs(5));
            }))
            .unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let (tx, rx) = mpsc::channel();
        executor.execute(Box::new(move || tx.send(42).unwrap())).unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
        assert!(executor.has_backup_pool());
        release_tx.send(()).unwrap();
    }

    #[test]
    fn test_in_flight_released_after_panic() {
        let executor = BackgroundExecutor::new(&ExecutorsConfig::default()).unwrap();
        executor.execute(Box::new(|| panic!("job bug"))).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while executor.in_flight() > 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(executor.in_flight(), 0);
    }
}
