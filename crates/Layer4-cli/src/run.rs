//! `taskq run` - sleeping nodes through a bounded queue

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use taskq_foundation::ExecutorsConfig;
use taskq_task::{
    CancellationTokenSource, ExecutorNode, ExecutorNodeQueue, Executors, TaskState, Tasks,
};
use tracing::info;

pub struct RunOptions {
    pub nodes: usize,
    pub max_concurrent: usize,
    pub work_ms: u64,
    pub cancel_after: Option<usize>,
}

/// Concurrently running works, and the highest count seen
#[derive(Default)]
struct Gauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

pub async fn run(config: ExecutorsConfig, options: RunOptions) -> anyhow::Result<()> {
    let executors = Executors::new(config)?;
    let queue = ExecutorNodeQueue::new("run", executors.background(), options.max_concurrent);

    let gauge = Arc::new(Gauge::default());
    let responses = Arc::new(AtomicUsize::new(0));
    let source = Arc::new(CancellationTokenSource::new());
    let work = Duration::from_millis(options.work_ms);

    let nodes: Vec<_> = (0..options.nodes)
        .map(|i| {
            let gauge = Arc::clone(&gauge);
            let responses = Arc::clone(&responses);
            let source = Arc::clone(&source);
            let cancel_after = options.cancel_after;

            executors
                .node(move || {
                    gauge.enter();
                    std::thread::sleep(work);
                    gauge.leave();
                    Ok(i)
                })
                .token(source.token())
                .on_response(move |_| {
                    let seen = responses.fetch_add(1, Ordering::SeqCst) + 1;
                    if cancel_after == Some(seen) && source.cancel() {
                        info!(responses = seen, "cancellation requested");
                    }
                })
                .build()
        })
        .collect();

    let started = Instant::now();
    queue.enqueue_all(nodes.iter().map(|n| Arc::clone(n) as Arc<dyn ExecutorNode>));

    // Outcome only; a canceled node ends the combined task canceled.
    let _ = Tasks::when_all(nodes.iter().map(|n| n.task()).collect()).await;
    let elapsed = started.elapsed();

    let (mut succeeded, mut failed, mut canceled) = (0, 0, 0);
    for node in &nodes {
        match node.task().state() {
            TaskState::Succeeded(_) => succeeded += 1,
            TaskState::Failed(_) => failed += 1,
            TaskState::Canceled => canceled += 1,
            TaskState::Pending => {}
        }
    }

    let stats = queue.stats();
    println!("\nRun\n");
    println!("{:<16} {}", "nodes", options.nodes);
    println!("{:<16} {}", "max concurrent", stats.max_concurrent);
    println!("{:<16} {}", "peak", gauge.peak.load(Ordering::SeqCst));
    println!("{:<16} {}", "succeeded", succeeded);
    println!("{:<16} {}", "failed", failed);
    println!("{:<16} {}", "canceled", canceled);
    println!("{:<16} {}", "admitted", stats.admitted);
    println!("{:<16} {}", "completed", stats.completed);
    println!("{:<16} {}", "still running", stats.running);
    println!("{:<16} {:.1?}", "elapsed", elapsed);
    println!();

    Ok(())
}
