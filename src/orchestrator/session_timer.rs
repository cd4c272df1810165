//! Per-session progress tick and absolute deadline.
//!
//! Each active session gets a [`SessionTimer`] task that invokes a tick
//! callback on a fixed period and a timeout callback once when the session
//! deadline passes. Dropping or [`stop`](SessionTimerHandle::stop)ping the
//! handle ends the task; the deadline can therefore never fire after the
//! session reached a terminal stage.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

/// Builder for a per-session timer task.
///
/// Call [`spawn`](Self::spawn) to start it.
pub struct SessionTimer {
    session_id: String,
    tick_interval: Duration,
    timeout: Duration,
}

impl SessionTimer {
    /// Construct a timer (does not start it yet).
    #[must_use]
    pub fn new(session_id: String, tick_interval: Duration, timeout: Duration) -> Self {
        Self {
            session_id,
            tick_interval,
            timeout,
        }
    }

    /// Spawn the timer task on the current Tokio runtime.
    ///
    /// The first tick fires one interval after this call and the deadline
    /// is measured from it, not from when the task is first polled.
    #[must_use]
    pub fn spawn<T, E>(self, on_tick: T, on_timeout: E) -> SessionTimerHandle
    where
        T: Fn() + Send + 'static,
        E: FnOnce() + Send + 'static,
    {
        let started = Instant::now();
        let stop = CancellationToken::new();
        let span = info_span!("session_timer", session_id = %self.session_id);
        let join_handle = tokio::spawn(
            Self::run(
                self.session_id.clone(),
                started,
                self.tick_interval,
                self.timeout,
                stop.clone(),
                on_tick,
                on_timeout,
            )
            .instrument(span),
        );

        SessionTimerHandle {
            session_id: self.session_id,
            stop,
            join_handle: Some(join_handle),
        }
    }

    async fn run<T, E>(
        session_id: String,
        started: Instant,
        tick_interval: Duration,
        timeout: Duration,
        stop: CancellationToken,
        on_tick: T,
        on_timeout: E,
    ) where
        T: Fn(),
        E: FnOnce(),
    {
        let mut ticks = tokio::time::interval_at(started + tick_interval, tick_interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let deadline = tokio::time::sleep_until(started + timeout);
        tokio::pin!(deadline);
        let mut on_timeout = Some(on_timeout);

        loop {
            tokio::select! {
                biased;
                () = stop.cancelled() => {
                    debug!(session_id, "session timer stopped");
                    return;
                }
                () = &mut deadline, if on_timeout.is_some() => {
                    if let Some(fire) = on_timeout.take() {
                        info!(session_id, ?timeout, "session deadline reached");
                        fire();
                    }
                }
                _ = ticks.tick() => on_tick(),
            }
        }
    }
}

/// Handle returned from [`SessionTimer::spawn`].
pub struct SessionTimerHandle {
    session_id: String,
    stop: CancellationToken,
    join_handle: Option<JoinHandle<()>>,
}

impl Drop for SessionTimerHandle {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

impl SessionTimerHandle {
    /// Signal the task to stop; no further ticks or timeouts are delivered.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Whether [`stop`](Self::stop) has been requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// The session this timer drives.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Stop the task and wait for it to exit.
    pub async fn await_completion(mut self) {
        self.stop.cancel();
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.await;
        }
    }
}
