//! Processing session lifecycle: start, stage updates, errors, cancellation,
//! periodic ticks, timeout, restart, and cleanup.
//!
//! Every session lives behind its own mutex; driver calls and the session's
//! timer task serialize on it. The registry map is only locked long enough
//! to insert, look up, or remove a session. No operation here returns an
//! error to the driver: failures become recorded [`SessionError`]s and
//! status changes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::TrackerConfig;
use crate::estimator::system::sample_process_memory;
use crate::estimator::{calculate_remaining, SystemProfile, TimeEstimator};
use crate::models::error::{ProcessingError, SessionError};
use crate::models::estimation::ImageMetadata;
use crate::models::progress::{completion_at, elapsed_ms, ProcessingProgress};
use crate::models::session::{ProcessingSession, SessionMetrics, SessionStatus};
use crate::models::stage::Stage;
use crate::persistence::ProgressPersistence;
use crate::registry::{clamp_percent, StageRegistry};
use crate::Result;

use super::cancellation::{CancellationObserver, CancellationToken};
use super::events::{EventBus, ProgressEvent};
use super::session_timer::{SessionTimer, SessionTimerHandle};

/// Result of a [`SessionManager::cancel_session`] request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The session moved to `cancelled`.
    Cancelled,
    /// The current stage cannot be interrupted; the session keeps running.
    Rejected,
    /// No active session with that id.
    NotActive,
}

/// Everything owned for one session.
struct SessionSlot {
    session: ProcessingSession,
    token: Arc<CancellationToken>,
    timer: Option<SessionTimerHandle>,
    stage_started_at: DateTime<Utc>,
    initial_estimate_ms: u64,
}

impl SessionSlot {
    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop();
        }
    }
}

type SlotRef = Arc<Mutex<SessionSlot>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared state the timer tasks also need.
struct Core {
    config: TrackerConfig,
    registry: Arc<StageRegistry>,
    estimator: TimeEstimator,
    clock: Arc<dyn Clock>,
    persistence: ProgressPersistence,
    events: EventBus,
}

/// Builder for [`SessionManager`] with injectable collaborators.
pub struct SessionManagerBuilder {
    config: TrackerConfig,
    registry: Option<StageRegistry>,
    clock: Option<Arc<dyn Clock>>,
    persistence: Option<ProgressPersistence>,
    profile: Option<SystemProfile>,
}

impl SessionManagerBuilder {
    /// Use `config` instead of the defaults.
    #[must_use]
    pub fn config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom stage table.
    #[must_use]
    pub fn registry(mut self, registry: StageRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use `clock` for all timestamps.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use `persistence` instead of the store selected by configuration.
    #[must_use]
    pub fn persistence(mut self, persistence: ProgressPersistence) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Use a fixed host profile instead of probing the machine.
    #[must_use]
    pub fn system_profile(mut self, profile: SystemProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Build the manager.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the configuration is invalid, or
    /// `AppError::Io` if the configured snapshot store cannot be opened.
    pub fn build(self) -> Result<SessionManager> {
        self.config.validate()?;
        let persistence = match self.persistence {
            Some(persistence) => persistence,
            None => ProgressPersistence::from_config(&self.config.persistence)?,
        };
        let registry = Arc::new(self.registry.unwrap_or_default());
        let estimator = TimeEstimator::new(
            Arc::clone(&registry),
            self.profile.unwrap_or_else(SystemProfile::detect),
        );
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock::new()) as Arc<dyn Clock>);

        Ok(SessionManager {
            core: Arc::new(Core {
                config: self.config,
                registry,
                estimator,
                clock,
                persistence,
                events: EventBus::default(),
            }),
            sessions: Mutex::new(HashMap::new()),
        })
    }
}

/// Owner of all processing sessions.
pub struct SessionManager {
    core: Arc<Core>,
    sessions: Mutex<HashMap<String, SlotRef>>,
}

impl SessionManager {
    /// Start configuring a manager.
    #[must_use]
    pub fn builder() -> SessionManagerBuilder {
        SessionManagerBuilder {
            config: TrackerConfig::default(),
            registry: None,
            clock: None,
            persistence: None,
            profile: None,
        }
    }

    /// Manager with `config` and default collaborators.
    ///
    /// # Errors
    ///
    /// See [`SessionManagerBuilder::build`].
    pub fn new(config: TrackerConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    /// Stage table in use.
    #[must_use]
    pub fn registry(&self) -> &StageRegistry {
        &self.core.registry
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &TrackerConfig {
        &self.core.config
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ProgressEvent> {
        self.core.events.subscribe()
    }

    /// Begin tracking session `id` at `idle`.
    ///
    /// A session already registered under `id` is force-cancelled (stage
    /// gating does not apply) and replaced. Must be called from within a
    /// Tokio runtime because it spawns the session timer.
    pub fn start_session(&self, id: &str, metadata: Option<ImageMetadata>) -> ProcessingSession {
        let span = info_span!("start_session", session_id = id);
        let _guard = span.enter();

        if let Some(existing) = self.slot(id) {
            warn!(session_id = id, "session id already in use, cancelling previous run");
            let token = {
                let mut slot = lock(&existing);
                if slot.session.is_active() {
                    self.core.apply_stage(&mut slot, Stage::Cancelled, 0.0);
                }
                slot.stop_timer();
                Arc::clone(&slot.token)
            };
            token.cancel();
        }

        let now = self.core.clock.now();
        let estimate = self.core.estimator.calculate_initial_estimate(metadata.as_ref());
        let initial_estimate_ms = estimate.estimated_time_ms;
        let session = ProcessingSession::new(
            id,
            now,
            estimate,
            metadata,
            self.core.registry.is_cancellable(Stage::Idle),
        );
        let slot = Arc::new(Mutex::new(SessionSlot {
            session,
            token: Arc::new(CancellationToken::new()),
            timer: None,
            stage_started_at: now,
            initial_estimate_ms,
        }));

        let snapshot = {
            let mut guard = lock(&slot);
            guard.timer = Some(self.core.spawn_timer(id, &slot));
            self.core
                .events
                .publish(&ProgressEvent::Progress(guard.session.progress.clone()));
            self.core.persistence.save(id, &guard.session);
            guard.session.clone()
        };

        lock(&self.sessions).insert(id.to_owned(), slot);
        info!(
            session_id = id,
            estimated_ms = initial_estimate_ms,
            confidence = snapshot.time_estimation.confidence,
            "session started"
        );
        snapshot
    }

    /// Move session `id` to `stage` at `stage_progress` percent.
    ///
    /// Ignored for unknown or inactive sessions. Illegal transitions are
    /// recorded as `InvalidStageTransition` and fail the session.
    pub fn update_stage(&self, id: &str, stage: Stage, stage_progress: f64) {
        let Some(slot) = self.slot(id) else {
            debug!(session_id = id, %stage, "update for unknown session ignored");
            return;
        };
        let mut slot = lock(&slot);
        self.core.update_stage(&mut slot, stage, stage_progress);
    }

    /// Report progress within the current stage.
    pub fn update_stage_progress(&self, id: &str, stage_progress: f64) {
        let Some(slot) = self.slot(id) else {
            return;
        };
        let mut slot = lock(&slot);
        let stage = slot.session.current_stage();
        self.core
            .update_stage(&mut slot, stage, clamp_percent(stage_progress));
    }

    /// Record `error` against session `id`.
    ///
    /// Recoverable errors are absorbed as retries up to
    /// [`TrackerConfig::max_retries`]; anything else fails the session.
    pub fn handle_error(&self, id: &str, error: ProcessingError) {
        let Some(slot) = self.slot(id) else {
            warn!(session_id = id, %error, "error reported for unknown session");
            return;
        };
        let mut slot = lock(&slot);
        self.core.handle_error(&mut slot, error);
    }

    /// Request cancellation of session `id`.
    ///
    /// Succeeds or is rejected immediately; a rejected request is never
    /// deferred to a later cancellable stage.
    pub fn cancel_session(&self, id: &str) -> CancelOutcome {
        let Some(slot) = self.slot(id) else {
            return CancelOutcome::NotActive;
        };
        let token = {
            let mut slot = lock(&slot);
            if !slot.session.is_active() {
                return CancelOutcome::NotActive;
            }
            let stage = slot.session.current_stage();
            if !self.core.registry.is_cancellable(stage) {
                info!(session_id = id, %stage, "cancellation rejected");
                self.core
                    .handle_error(&mut slot, ProcessingError::cancellation_not_allowed(stage));
                return CancelOutcome::Rejected;
            }
            self.core.apply_stage(&mut slot, Stage::Cancelled, 0.0);
            Arc::clone(&slot.token)
        };
        // Callbacks run outside the session lock so they may query the manager.
        token.cancel();
        info!(session_id = id, "session cancelled");
        CancelOutcome::Cancelled
    }

    /// Start a new run of a finished session under the same id.
    ///
    /// Returns `None` if the session is unknown or still active. The error
    /// history carries over; progress, estimate, metrics, token, and
    /// deadline start fresh.
    pub fn restart_session(&self, id: &str) -> Option<ProcessingSession> {
        let slot_ref = self.slot(id)?;
        let mut slot = lock(&slot_ref);
        let from = slot.session.current_stage();
        if slot.session.is_active() || !self.core.registry.is_valid_transition(from, Stage::Idle) {
            debug!(session_id = id, %from, "restart ignored");
            return None;
        }

        let now = self.core.clock.now();
        let metadata = slot.session.image_metadata.clone();
        let estimate = self.core.estimator.calculate_initial_estimate(metadata.as_ref());
        let mut session = ProcessingSession::new(
            id,
            now,
            estimate,
            metadata,
            self.core.registry.is_cancellable(Stage::Idle),
        );
        session.errors = std::mem::take(&mut slot.session.errors);

        slot.initial_estimate_ms = session.time_estimation.estimated_time_ms;
        slot.session = session;
        slot.stage_started_at = now;
        slot.token = Arc::new(CancellationToken::new());
        slot.stop_timer();
        slot.timer = Some(self.core.spawn_timer(id, &slot_ref));

        self.core.events.publish(&ProgressEvent::StageChanged {
            session_id: id.to_owned(),
            from,
            to: Stage::Idle,
            at: now,
        });
        self.core
            .events
            .publish(&ProgressEvent::Progress(slot.session.progress.clone()));
        self.core.persistence.save(id, &slot.session);
        info!(session_id = id, %from, "session restarted");
        Some(slot.session.clone())
    }

    /// Snapshot of session `id`.
    #[must_use]
    pub fn get_session(&self, id: &str) -> Option<ProcessingSession> {
        self.slot(id).map(|slot| lock(&slot).session.clone())
    }

    /// Snapshots of every active session.
    #[must_use]
    pub fn get_active_sessions(&self) -> Vec<ProcessingSession> {
        self.slots()
            .into_iter()
            .filter_map(|slot| {
                let slot = lock(&slot);
                slot.session.is_active().then(|| slot.session.clone())
            })
            .collect()
    }

    /// Read-only view of session `id`'s cancellation token.
    #[must_use]
    pub fn cancellation_observer(&self, id: &str) -> Option<CancellationObserver> {
        self.slot(id).map(|slot| lock(&slot).token.observer())
    }

    /// Last persisted snapshot of session `id`, if persistence holds one.
    #[must_use]
    pub fn load_snapshot(&self, id: &str) -> Option<ProcessingSession> {
        self.core.persistence.load(id)
    }

    /// Stop timers and forget sessions.
    ///
    /// With an id, that session is removed whatever its status. Without
    /// one, every session that is no longer active is removed. Safe to call
    /// repeatedly.
    pub fn cleanup(&self, id: Option<&str>) {
        let removed: Vec<(String, SlotRef)> = {
            let mut sessions = lock(&self.sessions);
            match id {
                Some(id) => sessions
                    .remove_entry(id)
                    .into_iter()
                    .collect(),
                None => {
                    let finished: Vec<String> = sessions
                        .iter()
                        .filter(|(_, slot)| !lock(slot).session.is_active())
                        .map(|(key, _)| key.clone())
                        .collect();
                    finished
                        .into_iter()
                        .filter_map(|key| sessions.remove_entry(&key))
                        .collect()
                }
            }
        };

        for (key, slot) in removed {
            lock(&slot).stop_timer();
            self.core.persistence.clear(&key);
            debug!(session_id = %key, "session cleaned up");
        }
    }

    /// Stop every session timer without removing any session.
    pub fn shutdown(&self) {
        for slot in self.slots() {
            lock(&slot).stop_timer();
        }
        info!("session manager shut down");
    }

    fn slot(&self, id: &str) -> Option<SlotRef> {
        lock(&self.sessions).get(id).cloned()
    }

    fn slots(&self) -> Vec<SlotRef> {
        lock(&self.sessions).values().cloned().collect()
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        for slot in lock(&self.sessions).values() {
            lock(slot).stop_timer();
        }
    }
}

impl Core {
    fn spawn_timer(self: &Arc<Self>, id: &str, slot: &SlotRef) -> SessionTimerHandle {
        let tick_core = Arc::clone(self);
        let tick_slot: Weak<Mutex<SessionSlot>> = Arc::downgrade(slot);
        let timeout_core = Arc::clone(self);
        let timeout_slot = Arc::downgrade(slot);

        SessionTimer::new(
            id.to_owned(),
            self.config.tick_interval(),
            self.config.session_timeout(),
        )
        .spawn(
            move || {
                if let Some(slot) = tick_slot.upgrade() {
                    tick_core.tick(&mut lock(&slot));
                }
            },
            move || {
                if let Some(slot) = timeout_slot.upgrade() {
                    timeout_core.expire(&mut lock(&slot));
                }
            },
        )
    }

    fn update_stage(&self, slot: &mut SessionSlot, stage: Stage, stage_progress: f64) {
        if !slot.session.is_active() {
            debug!(session_id = %slot.session.id, %stage, "update for inactive session ignored");
            return;
        }
        let current = slot.session.current_stage();
        if stage != current && !self.registry.is_valid_transition(current, stage) {
            warn!(
                session_id = %slot.session.id,
                from = %current,
                to = %stage,
                "invalid stage transition"
            );
            self.handle_error(slot, ProcessingError::invalid_transition(current, stage));
            return;
        }
        self.apply_stage(slot, stage, stage_progress);
    }

    /// Apply an already-validated update to an active session.
    #[allow(clippy::cast_precision_loss)]
    fn apply_stage(&self, slot: &mut SessionSlot, stage: Stage, stage_progress: f64) {
        let now = self.clock.now();
        let id = slot.session.id.clone();
        let previous = slot.session.progress.clone();
        let changed = stage != previous.current_stage;

        if changed {
            let spent = elapsed_ms(slot.stage_started_at, now);
            *slot
                .session
                .metrics
                .stage_timings_ms
                .entry(previous.current_stage)
                .or_insert(0) += spent;
            slot.stage_started_at = now;
        }

        let stage_progress = if stage == Stage::Completed {
            100.0
        } else {
            clamp_percent(stage_progress)
        };
        let elapsed = elapsed_ms(slot.session.start_time, now);

        // Side-terminals carry no weight; the last figure is frozen.
        let overall = if stage.is_side_terminal() {
            previous.overall_progress
        } else {
            self.registry
                .calculate_overall_progress(stage, stage_progress)
                .max(previous.overall_progress)
        };

        if !stage.is_side_terminal() {
            slot.session.time_estimation = self.estimator.update_estimate(
                &slot.session.time_estimation,
                elapsed,
                stage,
                stage_progress,
            );
        }
        let remaining = if stage.is_terminal() {
            0
        } else {
            calculate_remaining(&slot.session.time_estimation, elapsed, overall)
        };

        slot.session.progress = ProcessingProgress {
            session_id: id.clone(),
            current_stage: stage,
            overall_progress: overall,
            stage_progress,
            start_time: slot.session.start_time,
            current_time: now,
            estimated_completion: completion_at(now, remaining),
            elapsed_time_ms: elapsed,
            remaining_time_ms: remaining,
            processing_speed: speed(overall, elapsed),
            cancellable: self.registry.is_cancellable(stage),
            delayed: previous.delayed,
        };

        if changed {
            info!(
                session_id = %id,
                from = %previous.current_stage,
                to = %stage,
                overall,
                "stage changed"
            );
            self.events.publish(&ProgressEvent::StageChanged {
                session_id: id.clone(),
                from: previous.current_stage,
                to: stage,
                at: now,
            });
        }
        self.events
            .publish(&ProgressEvent::Progress(slot.session.progress.clone()));

        if stage.is_terminal() {
            self.finish(slot, stage, now, elapsed);
        }

        self.persistence.save(&id, &slot.session);
    }

    #[allow(clippy::cast_precision_loss)]
    fn finish(&self, slot: &mut SessionSlot, stage: Stage, now: DateTime<Utc>, elapsed: u64) {
        slot.stop_timer();
        let session = &mut slot.session;
        session.status = SessionStatus::for_stage(stage);
        session.end_time = Some(now);
        session.metrics.total_time_ms = Some(elapsed);

        if stage == Stage::Completed {
            if elapsed > 0 {
                session.metrics.efficiency = Some(slot.initial_estimate_ms as f64 / elapsed as f64);
                session.metrics.throughput_bytes_per_sec = session
                    .image_metadata
                    .as_ref()
                    .map(|m| m.size as f64 / (elapsed as f64 / 1000.0));
            }
            info!(
                session_id = %session.id,
                total_ms = elapsed,
                errors = session.metrics.error_count,
                retries = session.metrics.retry_count,
                "session completed"
            );
            self.events
                .publish(&ProgressEvent::Completed(Box::new(session.clone())));
        } else {
            info!(
                session_id = %session.id,
                status = ?session.status,
                total_ms = elapsed,
                "session ended"
            );
        }
    }

    fn handle_error(&self, slot: &mut SessionSlot, error: ProcessingError) {
        let now = self.clock.now();
        let active = slot.session.is_active();
        let metrics: &mut SessionMetrics = &mut slot.session.metrics;
        let retry = active && error.recoverable && metrics.retry_count < self.config.max_retries;
        if retry {
            metrics.retry_count += 1;
        }
        metrics.error_count += 1;

        let recorded = SessionError {
            error,
            stage: slot.session.progress.current_stage,
            timestamp: now,
            retry_count: metrics.retry_count,
        };
        warn!(
            session_id = %slot.session.id,
            stage = %recorded.stage,
            code = %recorded.error.code,
            recoverable = recorded.error.recoverable,
            retry,
            "processing error recorded"
        );
        let ends_session = recorded.error.ends_session();
        slot.session.errors.push(recorded.clone());
        self.events.publish(&ProgressEvent::ErrorRecorded {
            session_id: slot.session.id.clone(),
            error: recorded,
        });

        if active && !retry && ends_session {
            self.apply_stage(slot, Stage::Error, 0.0);
        } else {
            self.persistence.save(&slot.session.id, &slot.session);
        }
    }

    fn tick(&self, slot: &mut SessionSlot) {
        if !slot.session.is_active() {
            return;
        }
        let now = self.clock.now();
        let elapsed = elapsed_ms(slot.session.start_time, now);
        let estimated_ms = slot.session.time_estimation.estimated_time_ms;
        let progress = &mut slot.session.progress;
        let remaining = calculate_remaining(
            &slot.session.time_estimation,
            elapsed,
            progress.overall_progress,
        );
        progress.current_time = now;
        progress.elapsed_time_ms = elapsed;
        progress.remaining_time_ms = remaining;
        progress.estimated_completion = completion_at(now, remaining);
        progress.processing_speed = speed(progress.overall_progress, elapsed);

        if self.config.sample_memory {
            if let Some(sample) = sample_process_memory() {
                let metrics = &mut slot.session.metrics;
                metrics.memory_usage_bytes = Some(sample);
                metrics.peak_memory_bytes =
                    Some(metrics.peak_memory_bytes.map_or(sample, |p| p.max(sample)));
            }
        }

        if !progress.delayed && is_delayed(elapsed, estimated_ms, self.config.delay_tolerance) {
            progress.delayed = true;
            warn!(
                session_id = %slot.session.id,
                elapsed_ms = elapsed,
                estimated_ms,
                "session running behind estimate"
            );
            self.events.publish(&ProgressEvent::Delayed {
                session_id: slot.session.id.clone(),
                elapsed_ms: elapsed,
                estimated_ms,
            });
        }

        self.events
            .publish(&ProgressEvent::Progress(slot.session.progress.clone()));
    }

    fn expire(&self, slot: &mut SessionSlot) {
        if !slot.session.is_active() {
            return;
        }
        self.handle_error(slot, ProcessingError::timeout(self.config.session_timeout_ms));
    }
}

/// Overall percent gained per second.
#[allow(clippy::cast_precision_loss)]
fn speed(overall_progress: f64, elapsed_ms: u64) -> f64 {
    if elapsed_ms == 0 {
        0.0
    } else {
        overall_progress / (elapsed_ms as f64 / 1000.0)
    }
}

#[allow(clippy::cast_precision_loss)]
fn is_delayed(elapsed_ms: u64, estimated_ms: u64, tolerance: f64) -> bool {
    estimated_ms > 0 && elapsed_ms as f64 > estimated_ms as f64 * tolerance
}
