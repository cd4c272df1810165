//! Cooperative, single-fire cancellation signal with ordered observers.
//!
//! Each session owns one [`CancellationToken`]. Drivers get a
//! [`CancellationObserver`], which can watch the signal but never trigger it.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Callback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct State {
    cancelled: bool,
    callbacks: Vec<Callback>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    signal: tokio_util::sync::CancellationToken,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    fn on_cancelled(&self, callback: Callback) {
        let mut state = self.lock();
        if state.cancelled {
            drop(state);
            callback();
        } else {
            state.callbacks.push(callback);
        }
    }
}

/// Write-once cancellation flag owned by a session.
#[derive(Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Create an untriggered token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Trigger cancellation.
    ///
    /// The first call runs every queued callback once, in registration
    /// order, and returns `true`. Later calls do nothing and return `false`.
    pub fn cancel(&self) -> bool {
        let callbacks = {
            let mut state = self.inner.lock();
            if state.cancelled {
                return false;
            }
            state.cancelled = true;
            std::mem::take(&mut state.callbacks)
        };
        self.inner.signal.cancel();
        for callback in callbacks {
            callback();
        }
        true
    }

    /// Run `callback` on cancellation, or right away if already cancelled.
    pub fn on_cancelled<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.on_cancelled(Box::new(callback));
    }

    /// Wait until the token is cancelled.
    pub async fn cancelled(&self) {
        self.inner.signal.cancelled().await;
    }

    /// Read-only handle on this token.
    #[must_use]
    pub fn observer(&self) -> CancellationObserver {
        CancellationObserver {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Observe-only view of a session's [`CancellationToken`].
#[derive(Clone)]
pub struct CancellationObserver {
    inner: Arc<Inner>,
}

impl CancellationObserver {
    /// Whether the session has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Run `callback` on cancellation, or right away if already cancelled.
    pub fn on_cancelled<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.on_cancelled(Box::new(callback));
    }

    /// Wait until the session is cancelled.
    pub async fn cancelled(&self) {
        self.inner.signal.cancelled().await;
    }
}

impl fmt::Debug for CancellationObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationObserver")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
