//! ExecuteResultQueue - pending listener adapters of one task
//!
//! Adapters are popped from the tail, so a single dispatch pass delivers the
//! most recently registered adapter first. Callers must not rely on any
//! ordering between independently registered listeners.

use crate::result::ExecuteResult;
use crate::task::Task;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

struct QueueState<T> {
    pending: VecDeque<Arc<dyn ExecuteResult<T>>>,
    dispatching: bool,
}

pub struct ExecuteResultQueue<T> {
    state: Mutex<QueueState<T>>,
}

impl<T> ExecuteResultQueue<T>
where
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                dispatching: false,
            }),
        }
    }

    pub fn enqueue(&self, adapter: Arc<dyn ExecuteResult<T>>) {
        self.state.lock().pending.push_back(adapter);
    }

    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver every pending adapter to a terminal `task`.
    ///
    /// Only one pass runs at a time; adapters enqueued while a pass is running
    /// are picked up by that pass. The lock is released around each
    /// invocation so adapters may register further listeners.
    pub fn dispatch_all(&self, task: &Task<T>) {
        if !task.is_complete() {
            return;
        }

        {
            let mut state = self.state.lock();
            if state.dispatching {
                return;
            }
            state.dispatching = true;
        }

        let mut guard = DispatchGuard {
            queue: self,
            armed: true,
        };
        loop {
            let next = {
                let mut state = self.state.lock();
                match state.pending.pop_back() {
                    Some(adapter) => adapter,
                    None => {
                        state.dispatching = false;
                        guard.armed = false;
                        return;
                    }
                }
            };
            next.on_complete(task);
        }
    }
}

/// Clears the dispatching flag if an adapter unwinds out of a pass
struct DispatchGuard<'a, T> {
    queue: &'a ExecuteResultQueue<T>,
    armed: bool,
}

impl<T> Drop for DispatchGuard<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            self.queue.state.lock().dispatching = false;
        }
    }
}

impl<T> Default for ExecuteResultQueue<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
