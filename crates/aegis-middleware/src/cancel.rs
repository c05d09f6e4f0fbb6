//! Request cancellation.
//!
//! Every request carries a [`CancellationSignal`]. The recovery boundary
//! fires it when the handler finishes (normally or by panicking) and holds a
//! [`FireOnDrop`] guard, so a request future dropped mid-flight fires it too.
//! The server fires the connection-level parent when the connection closes,
//! which cascades to every child signal derived from it.
//!
//! ```rust
//! use aegis_middleware::CancellationSignal;
//!
//! let connection = CancellationSignal::new();
//! let request = connection.child();
//!
//! assert!(connection.fire());
//! assert!(request.is_fired());
//! assert!(!request.fire());
//! ```

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;

type Listener = Box<dyn FnOnce() + Send>;

struct Inner {
    fired: AtomicBool,
    notify: Notify,
    listeners: Mutex<Vec<Listener>>,
    children: Mutex<Vec<Weak<Inner>>>,
}

impl Inner {
    fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
            notify: Notify::new(),
            listeners: Mutex::new(Vec::new()),
            children: Mutex::new(Vec::new()),
        }
    }

    fn fire(&self) -> bool {
        if self
            .fired
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        self.notify.notify_waiters();

        let listeners = std::mem::take(&mut *self.listeners.lock());
        for listener in listeners {
            listener();
        }

        let children = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.fire();
        }
        true
    }
}

/// A one-shot cancellation flag shared between clones.
///
/// The signal moves from pending to fired exactly once. Clones observe the
/// same state.
#[derive(Clone)]
pub struct CancellationSignal {
    inner: Arc<Inner>,
}

impl CancellationSignal {
    /// Creates a pending root signal.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::new()),
        }
    }

    /// Creates a signal that fires when `self` fires.
    ///
    /// Firing the child does not affect the parent. A child of an already
    /// fired signal starts fired.
    #[must_use]
    pub fn child(&self) -> Self {
        let child = Self::new();
        {
            // Checked under the lock so a concurrent `fire` cannot miss us.
            let mut children = self.inner.children.lock();
            if !self.is_fired() {
                children.retain(|weak| weak.strong_count() > 0);
                children.push(Arc::downgrade(&child.inner));
                return child;
            }
        }
        child.fire();
        child
    }

    /// Fires the signal.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn fire(&self) -> bool {
        self.inner.fire()
    }

    /// Returns true once the signal has fired.
    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }

    /// Registers a listener that runs exactly once when the signal fires.
    ///
    /// If the signal has already fired the listener runs immediately.
    pub fn on_fire<F>(&self, listener: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut listeners = self.inner.listeners.lock();
            if !self.is_fired() {
                listeners.push(Box::new(listener));
                return;
            }
        }
        listener();
    }

    /// Returns a guard that fires the signal when dropped.
    pub fn fire_on_drop(&self) -> FireOnDrop {
        FireOnDrop {
            signal: self.clone(),
        }
    }

    /// Completes when the signal fires.
    pub async fn fired(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_fired() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationSignal")
            .field("fired", &self.is_fired())
            .finish()
    }
}

/// Fires its signal when dropped.
///
/// Created by [`CancellationSignal::fire_on_drop`].
#[must_use = "the signal fires as soon as the guard is dropped"]
#[derive(Debug)]
pub struct FireOnDrop {
    signal: CancellationSignal,
}

impl Drop for FireOnDrop {
    fn drop(&mut self) {
        self.signal.fire();
    }
}
