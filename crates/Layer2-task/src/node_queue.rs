//! ExecutorNodeQueue - admission-controlled dispatch of executor nodes
//!
//! Nodes wait in *pending* until a *running* slot is free, then their run is
//! submitted to the backing executor. Every removal frees a slot and admits
//! the next pending node, so the queue drives itself.
//!
//! Admission pops the tail of *pending*: the most recently enqueued node is
//! admitted first. *pending* is unbounded; only *running* is limited.

use crate::executor::Executor;
use crate::node::{ExecutorNode, NodeId};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use taskq_foundation::Error;
use tracing::{debug, trace, warn};

/// Queue statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeQueueStats {
    pub name: String,
    /// Nodes occupying a slot
    pub running: usize,
    /// Nodes waiting for a slot
    pub pending: usize,
    pub max_concurrent: usize,
    /// Nodes ever admitted to a slot
    pub admitted: u64,
    /// Nodes that left a slot
    pub completed: u64,
}

struct NodeQueueState {
    pending: VecDeque<Arc<dyn ExecutorNode>>,
    running: HashMap<NodeId, Arc<dyn ExecutorNode>>,
    admitted: u64,
    completed: u64,
    /// A thread is admitting nodes
    draining: bool,
    /// Another admission pass was requested while draining
    redispatch: bool,
}

impl NodeQueueState {
    fn is_tracked(&self, id: NodeId) -> bool {
        self.running.contains_key(&id) || self.pending.iter().any(|n| n.id() == id)
    }
}

struct NodeQueueInner {
    name: String,
    executor: Arc<dyn Executor>,
    max_concurrent: usize,
    state: Mutex<NodeQueueState>,
}

enum Admission {
    Run(Arc<dyn ExecutorNode>),
    Resubmitted(Arc<dyn ExecutorNode>),
}

/// Bounded-concurrency dispatcher of `ExecutorNode`s
#[derive(Clone)]
pub struct ExecutorNodeQueue {
    inner: Arc<NodeQueueInner>,
}

impl ExecutorNodeQueue {
    /// Create a queue admitting at most `max_concurrent` nodes at once
    pub fn new(name: impl Into<String>, executor: Arc<dyn Executor>, max_concurrent: usize) -> Self {
        let name = name.into();
        let max_concurrent = if max_concurrent == 0 {
            warn!(queue = %name, "max_concurrent of 0 raised to 1");
            1
        } else {
            max_concurrent
        };

        Self {
            inner: Arc::new(NodeQueueInner {
                name,
                executor,
                max_concurrent,
                state: Mutex::new(NodeQueueState {
                    pending: VecDeque::new(),
                    running: HashMap::new(),
                    admitted: 0,
                    completed: 0,
                    draining: false,
                    redispatch: false,
                }),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.max_concurrent
    }

    pub fn running_count(&self) -> usize {
        self.inner.state.lock().running.len()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn stats(&self) -> NodeQueueStats {
        let state = self.inner.state.lock();
        NodeQueueStats {
            name: self.inner.name.clone(),
            running: state.running.len(),
            pending: state.pending.len(),
            max_concurrent: self.inner.max_concurrent,
            admitted: state.admitted,
            completed: state.completed,
        }
    }

    pub fn downgrade(&self) -> WeakNodeQueue {
        WeakNodeQueue(Arc::downgrade(&self.inner))
    }

    // ========== Submission ==========

    /// Add a node to *pending* and admit as many nodes as slots allow.
    ///
    /// Submission problems never surface here: they fail the node through
    /// its own failure path.
    pub fn enqueue(&self, node: Arc<dyn ExecutorNode>) {
        if self.track(node) {
            self.dispatch();
        }
    }

    /// Enqueue a batch, admitting once after all are pending
    pub fn enqueue_all<I>(&self, nodes: I)
    where
        I: IntoIterator<Item = Arc<dyn ExecutorNode>>,
    {
        let mut added = false;
        for node in nodes {
            added |= self.track(node);
        }
        if added {
            self.dispatch();
        }
    }

    fn track(&self, node: Arc<dyn ExecutorNode>) -> bool {
        let id = node.id();
        if node.is_completed() {
            node.handle_error(Error::illegal_state(format!(
                "node {} already completed",
                id
            )));
            return false;
        }

        if let Err(err) = node.bind_queue(self.downgrade()) {
            warn!(queue = %self.inner.name, node = %id, error = %err, "node refused");
            return false;
        }

        let mut state = self.inner.state.lock();
        if state.is_tracked(id) {
            debug!(queue = %self.inner.name, node = %id, "node already queued");
            return false;
        }
        state.pending.push_back(node);
        trace!(queue = %self.inner.name, node = %id, pending = state.pending.len(), "node enqueued");
        true
    }

    /// Release the running slot of a node and admit the next pending one.
    ///
    /// Safe to call for nodes that do not hold a slot. A node still waiting
    /// in *pending* keeps its place. Returns whether a slot was released.
    pub fn remove(&self, id: NodeId) -> bool {
        let removed = {
            let mut state = self.inner.state.lock();
            let removed = state.running.remove(&id).is_some();
            if removed {
                state.completed += 1;
            }
            removed
        };

        if removed {
            debug!(queue = %self.inner.name, node = %id, "node removed");
        }
        self.dispatch();
        removed
    }

    /// Drop a node wherever it is tracked, *pending* included.
    ///
    /// Used for canceled nodes, which must never be admitted.
    pub fn withdraw(&self, id: NodeId) -> bool {
        let withdrawn = {
            let mut state = self.inner.state.lock();
            let before = state.pending.len();
            state.pending.retain(|n| n.id() != id);
            state.pending.len() != before
        };

        if withdrawn {
            debug!(queue = %self.inner.name, node = %id, "pending node withdrawn");
        }
        self.remove(id) || withdrawn
    }

    // ========== Admission ==========

    fn next_admission(&self, state: &mut NodeQueueState) -> Option<Admission> {
        if state.running.len() >= self.inner.max_concurrent {
            return None;
        }
        let node = state.pending.pop_back()?;
        if node.is_completed() {
            return Some(Admission::Resubmitted(node));
        }
        state.running.insert(node.id(), Arc::clone(&node));
        state.admitted += 1;
        Some(Admission::Run(node))
    }

    /// Admit pending nodes while slots are free.
    ///
    /// One thread drains at a time; a request arriving meanwhile makes the
    /// draining thread take another pass, so nested calls from an inline
    /// executor do not recurse.
    fn dispatch(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.draining {
                state.redispatch = true;
                return;
            }
            state.draining = true;
        }

        loop {
            let admission = {
                let mut state = self.inner.state.lock();
                match self.next_admission(&mut state) {
                    Some(admission) => admission,
                    None if state.redispatch => {
                        state.redispatch = false;
                        continue;
                    }
                    None => {
                        state.draining = false;
                        return;
                    }
                }
            };

            match admission {
                Admission::Run(node) => self.submit(node),
                Admission::Resubmitted(node) => {
                    let id = node.id();
                    node.handle_error(Error::illegal_state(format!(
                        "node {} already completed",
                        id
                    )));
                }
            }
        }
    }

    fn submit(&self, node: Arc<dyn ExecutorNode>) {
        let id = node.id();
        debug!(
            queue = %self.inner.name,
            node = %id,
            executor = self.inner.executor.name(),
            "node admitted"
        );

        let runnable = Arc::clone(&node);
        if let Err(err) = self.inner.executor.execute(Box::new(move || runnable.run())) {
            warn!(queue = %self.inner.name, node = %id, error = %err, "node submission failed");
            node.handle_error(err);
            // handle_error deregisters through the node's bound queue; make
            // sure the slot is released even for nodes that do not.
            let mut state = self.inner.state.lock();
            if state.running.remove(&id).is_some() {
                state.completed += 1;
                state.redispatch = true;
            }
        }
    }
}

impl std::fmt::Debug for ExecutorNodeQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorNodeQueue")
            .field("stats", &self.stats())
            .finish()
    }
}

/// Non-owning reference to an `ExecutorNodeQueue`, held by its nodes
#[derive(Clone, Default)]
pub struct WeakNodeQueue(Weak<NodeQueueInner>);

impl WeakNodeQueue {
    pub fn upgrade(&self) -> Option<ExecutorNodeQueue> {
        self.0.upgrade().map(|inner| ExecutorNodeQueue { inner })
    }

    /// Whether both refer to the same queue
    pub fn ptr_eq(&self, other: &WeakNodeQueue) -> bool {
        Weak::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for WeakNodeQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WeakNodeQueue")
    }
}
