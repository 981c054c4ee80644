//! Cooperative cancellation
//!
//! A `CancellationTokenSource` owns the right to cancel; the `CancellationToken`
//! it hands out can only observe. Cancellation carries no enforcement power:
//! whoever holds a token decides when to stop working.
//!
//! Callbacks are registered through scoped handles. Dropping a
//! `CancellationRegistration` removes its callback, so nothing fires on
//! behalf of an owner that has gone away.

use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::trace;

type Callback = Box<dyn FnOnce() + Send + 'static>;

struct TokenState {
    requested: bool,
    next_id: u64,
    callbacks: Vec<(u64, Callback)>,
}

struct TokenInner {
    state: Mutex<TokenState>,
}

impl TokenInner {
    fn unregister(&self, id: u64) {
        let mut state = self.state.lock();
        state.callbacks.retain(|(cb_id, _)| *cb_id != id);
    }
}

/// Read-only view of a cancellation signal
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                state: Mutex::new(TokenState {
                    requested: false,
                    next_id: 0,
                    callbacks: Vec::new(),
                }),
            }),
        }
    }

    /// A token whose cancellation was already requested
    pub fn canceled() -> Self {
        let source = CancellationTokenSource::new();
        source.cancel();
        source.token()
    }

    pub fn is_cancellation_requested(&self) -> bool {
        self.inner.state.lock().requested
    }

    /// Register a callback for the cancellation request.
    ///
    /// If cancellation was already requested the callback runs synchronously
    /// on the calling thread before this returns. Otherwise it runs on the
    /// thread that calls `cancel()`, after every earlier registration.
    #[must_use = "dropping the registration removes the callback"]
    pub fn on_canceled_requested<F>(&self, callback: F) -> CancellationRegistration
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        if state.requested {
            drop(state);
            callback();
            return CancellationRegistration::detached();
        }

        let id = state.next_id;
        state.next_id += 1;
        state.callbacks.push((id, Box::new(callback)));

        CancellationRegistration {
            token: Arc::downgrade(&self.inner),
            id: Some(id),
        }
    }

    fn request(&self) -> bool {
        let callbacks = {
            let mut state = self.inner.state.lock();
            if state.requested {
                return false;
            }
            state.requested = true;
            std::mem::take(&mut state.callbacks)
        };

        trace!(callbacks = callbacks.len(), "cancellation requested");
        for (_, callback) in callbacks {
            callback();
        }
        true
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("requested", &self.is_cancellation_requested())
            .finish()
    }
}

/// Owner side of a cancellation signal
#[derive(Debug)]
pub struct CancellationTokenSource {
    token: CancellationToken,
}

impl CancellationTokenSource {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Token bound to this source
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Request cancellation.
    ///
    /// Only the first call changes state; it runs every registered callback,
    /// in registration order, on the calling thread. Returns whether this call
    /// was the one that requested cancellation.
    pub fn cancel(&self) -> bool {
        self.token.request()
    }

    pub fn is_cancellation_requested(&self) -> bool {
        self.token.is_cancellation_requested()
    }
}

impl Default for CancellationTokenSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped callback registration; dropping it unregisters the callback
#[derive(Debug)]
pub struct CancellationRegistration {
    token: Weak<TokenInner>,
    id: Option<u64>,
}

impl CancellationRegistration {
    fn detached() -> Self {
        Self {
            token: Weak::new(),
            id: None,
        }
    }

    /// Remove the callback now
    pub fn unregister(mut self) {
        self.release();
    }

    /// Keep the callback registered for as long as the token lives
    pub fn forget(mut self) {
        self.id = None;
    }

    fn release(&mut self) {
        if let Some(id) = self.id.take() {
            if let Some(inner) = self.token.upgrade() {
                inner.unregister(id);
            }
        }
    }
}

impl Drop for CancellationRegistration {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_cancel_twice_fires_callbacks_once() {
        let source = CancellationTokenSource::new();
        let token = source.token();
        let fired = Arc::new(AtomicUsize::new(0));

        let mut registrations = Vec::new();
        for _ in 0..3 {
            let fired = Arc::clone(&fired);
            registrations.push(token.on_canceled_requested(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            }));
        }

        assert!(source.cancel());
        assert!(!source.cancel());
        assert_eq!(fired.load(Ordering::SeqCst), 3);
        assert!(token.is_cancellation_requested());
    }

    #[test]
    fn test_callbacks_fire_in_registration_order() {
        let source = CancellationTokenSource::new();
        let token = source.token();
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut registrations = Vec::new();
        for i in 0..4 {
            let order = Arc::clone(&order);
            registrations.push(token.on_canceled_requested(move || order.lock().push(i)));
        }

        source.cancel();
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_register_after_cancel_runs_immediately() {
        let token = CancellationToken::canceled();
        let fired = Arc::new(AtomicUsize::new(0));

        let f = Arc::clone(&fired);
        let _registration = token.on_canceled_requested(move || {
            f.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_registration_does_not_fire() {
        let source = CancellationTokenSource::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let f = Arc::clone(&fired);
        let registration = source.token().on_canceled_requested(move || {
            f.fetch_add(1, Ordering::SeqCst);
        });
        drop(registration);

        source.cancel();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_forgotten_registration_still_fires() {
        let source = CancellationTokenSource::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let f = Arc::clone(&fired);
        source
            .token()
            .on_canceled_requested(move || {
                f.fetch_add(1, Ordering::SeqCst);
            })
            .forget();

        source.cancel();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_may_register_on_same_token() {
        let source = CancellationTokenSource::new();
        let token = source.token();
        let fired = Arc::new(AtomicUsize::new(0));

        let inner_token = token.clone();
        let f = Arc::clone(&fired);
        let _registration = token.on_canceled_requested(move || {
            let f = Arc::clone(&f);
            inner_token
                .on_canceled_requested(move || {
                    f.fetch_add(1, Ordering::SeqCst);
                })
                .forget();
        });

        source.cancel();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
