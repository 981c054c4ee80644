//! Node queue integration tests - real background threads, bounded admission
//!
//! `cargo test -p taskq-task --test node_queue_test -- --nocapture`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use taskq_task::{
    BackgroundExecutor, CallableExecutorNode, CancellationTokenSource, Error, Executor,
    ExecutorNode, ExecutorNodeQueue, Executors, ExecutorsConfig,
};

const WAIT: Duration = Duration::from_secs(10);

/// Tracks how many works run at the same time
#[derive(Default)]
struct Gauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn work(&self, duration: Duration) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(duration);
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

fn background() -> Arc<dyn Executor> {
    Arc::new(BackgroundExecutor::new(&ExecutorsConfig::default()).expect("background executor"))
}

#[test]
fn test_bounded_queue_on_background_threads() {
    let queue = ExecutorNodeQueue::new("bounded", background(), 4);
    let gauge = Arc::new(Gauge::default());

    let nodes: Vec<_> = (0..16)
        .map(|i| {
            let gauge = Arc::clone(&gauge);
            CallableExecutorNode::builder(move || {
                gauge.work(Duration::from_millis(20));
                Ok(i)
            })
            .build()
        })
        .collect();

    queue.enqueue_all(nodes.iter().map(|n| Arc::clone(n) as Arc<dyn ExecutorNode>));

    let mut results: Vec<i32> = nodes
        .iter()
        .map(|n| n.get_timeout(WAIT).expect("node result"))
        .collect();
    results.sort();

    println!("peak concurrency: {}", gauge.peak.load(Ordering::SeqCst));
    assert_eq!(results, (0..16).collect::<Vec<_>>());
    assert!(gauge.peak.load(Ordering::SeqCst) <= 4, "limit exceeded");

    let stats = queue.stats();
    assert_eq!(stats.running, 0);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.admitted, 16);
    assert_eq!(stats.completed, 16);
}

#[test]
fn test_cancel_pending_node() {
    let executors = Executors::new(ExecutorsConfig::default().serial_thread_name("test-cancel-main"))
        .expect("executors");
    let queue = ExecutorNodeQueue::new("single", executors.background(), 1);

    let blocker = executors
        .node(|| {
            std::thread::sleep(Duration::from_millis(200));
            Ok("blocker")
        })
        .build();

    let source = CancellationTokenSource::new();
    let (tx, rx) = mpsc::channel();
    let ran = Arc::new(AtomicUsize::new(0));
    let ran_in_work = Arc::clone(&ran);
    let canceled = executors
        .node(move || {
            ran_in_work.fetch_add(1, Ordering::SeqCst);
            Ok("never")
        })
        .token(source.token())
        .on_failure(move |err| {
            let _ = tx.send(err);
        })
        .build();

    queue.enqueue(blocker.clone());
    queue.enqueue(canceled.clone());
    assert_eq!(queue.pending_count(), 1);

    assert!(source.cancel());
    let err = rx.recv_timeout(WAIT).expect("failure callback");
    assert!(err.is_canceled());
    assert!(canceled.task().is_canceled());
    assert_eq!(queue.pending_count(), 0);

    assert_eq!(blocker.get_timeout(WAIT).expect("blocker"), "blocker");
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(queue.stats().admitted, 1);
}

#[test]
fn test_failing_work_reports_failure_on_main() {
    let executors = Executors::new(ExecutorsConfig::default().serial_thread_name("test-fail-main"))
        .expect("executors");

    let (tx, rx) = mpsc::channel();
    let node = executors
        .node(|| -> taskq_task::Result<()> { Err(Error::Internal("disk gone".into())) })
        .on_failure(move |err| {
            let _ = tx.send((err.to_string(), taskq_task::on_serial_thread()));
        })
        .build();

    executors.io_queue().enqueue(node.clone());

    let (message, on_main) = rx.recv_timeout(WAIT).expect("failure callback");
    assert!(message.contains("disk gone"));
    assert!(on_main, "callbacks are delivered on the main executor");
    assert!(node.get_timeout(WAIT).is_err());
    assert_eq!(executors.io_queue().running_count(), 0);
}

#[test]
fn test_get_timeout_does_not_cancel() {
    let queue = ExecutorNodeQueue::new("slow", background(), 2);
    let node = CallableExecutorNode::builder(|| {
        std::thread::sleep(Duration::from_millis(300));
        Ok(7)
    })
    .build();

    queue.enqueue(node.clone());
    let err = node.get_timeout(Duration::from_millis(20)).unwrap_err();
    assert!(err.is_timeout());
    assert!(!node.task().is_complete());

    assert_eq!(node.get_timeout(WAIT).expect("late result"), 7);
}
