//! Periodic sync engine.
//!
//! The engine owns the polling timer, the start trigger and the listener
//! that turns local writes into sync requests. Each tick is delegated to
//! [`SyncResolver`]; its outcome drives [`SyncStatus`], [`SyncStats`] and
//! [`SyncEvent`] notifications.

use crate::config::{clamp_interval, SyncConfig};
use crate::database::LocalDatabase;
use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, EventHandler, EventKind, SubscriptionId, SyncEvent};
use crate::resolver::{SyncResolver, TickOutcome};
use crate::settings::ConfigStore;
use crate::trigger::DebouncedTrigger;
use crate::watch::MutationSubscription;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Lifecycle status reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
    /// Not running.
    #[default]
    Wait,
    /// A sync session is starting.
    Begin,
    /// The last tick succeeded.
    Success,
    /// The last tick failed; the timer keeps running.
    Fail,
}

impl SyncStatus {
    /// Returns true if a session has been started and not stopped.
    pub fn is_started(&self) -> bool {
        !matches!(self, SyncStatus::Wait)
    }
}

/// Counters describing engine activity.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Ticks that finished without error.
    pub ticks_completed: u64,
    /// Ticks that returned an error.
    pub ticks_failed: u64,
    /// Snapshots imported from other devices.
    pub snapshots_received: u64,
    /// Snapshots written by this device.
    pub snapshots_uploaded: u64,
    /// Ticks not started because another one was running.
    pub overlapping_ticks_skipped: u64,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
    /// Completion time of the most recent successful tick.
    pub last_success: Option<DateTime<Utc>>,
}

/// Drives periodic snapshot exchange for one installation.
///
/// Construction subscribes to local writes and immediately attempts to start
/// a session. Dropping the engine stops every background task.
///
/// Must be created inside a tokio runtime.
pub struct SyncEngine {
    inner: Arc<EngineInner>,
    listener: MutationSubscription,
}

impl SyncEngine {
    /// Creates the engine and requests a first start.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn new(config: &SyncConfig, resolver: SyncResolver, database: Arc<dyn LocalDatabase>) -> Self {
        let settings = resolver.adapter().settings().clone();
        let interval = clamp_interval(config.sync_interval);
        let window = config.throttle_window;

        let inner = Arc::new_cyclic(|weak: &Weak<EngineInner>| {
            let weak = weak.clone();
            let trigger = DebouncedTrigger::spawn(window, move || {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.start_sync().await;
                    }
                }
            });

            EngineInner {
                resolver,
                settings,
                interval,
                trigger,
                timer: Mutex::new(None),
                generation: AtomicU64::new(0),
                status: RwLock::new(SyncStatus::Wait),
                stats: RwLock::new(SyncStats::default()),
                in_flight: AtomicBool::new(false),
                events: EventBus::new(),
            }
        });

        let listener = {
            let weak = Arc::downgrade(&inner);
            MutationSubscription::spawn(database.as_ref(), config.mutation_throttle, move || {
                let Some(inner) = weak.upgrade() else { return };
                if inner.settings.is_auto_sync() {
                    inner.try_start_sync();
                } else {
                    tracing::trace!("local change ignored, auto-sync is off");
                }
            })
        };

        inner.try_start_sync();
        Self { inner, listener }
    }

    /// Requests a session start if a remote is configured.
    ///
    /// Requests are coalesced by the throttle window. Returns false when
    /// the remote is not configured or the request joined a pending one.
    pub fn try_start_sync(&self) -> bool {
        self.inner.try_start_sync()
    }

    /// Restarts the session now: stops the timer, runs one tick, then
    /// restarts the timer.
    pub async fn start_sync(&self) {
        self.inner.start_sync().await;
    }

    /// Stops the timer and reports [`SyncStatus::Wait`].
    ///
    /// A tick already running is allowed to finish.
    pub fn stop_sync(&self) {
        self.inner.stop_sync();
    }

    /// Runs one tick outside the timer.
    ///
    /// Returns `Ok(None)` if another tick was running.
    pub async fn sync_now(&self) -> SyncResult<Option<TickOutcome>> {
        self.inner.tick().await.transpose()
    }

    /// Current status.
    pub fn status(&self) -> SyncStatus {
        *self.inner.status.read()
    }

    /// Snapshot of the activity counters.
    pub fn stats(&self) -> SyncStats {
        self.inner.stats.read().clone()
    }

    /// Returns true while the polling timer is armed.
    pub fn is_running(&self) -> bool {
        self.inner
            .timer
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Effective polling interval.
    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Registers an event handler.
    pub fn on(&self, kind: EventKind, handler: EventHandler) -> SubscriptionId {
        self.inner.events.on(kind, handler)
    }

    /// Removes an event handler. Unknown ids are ignored.
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.inner.events.off(id)
    }

    /// Returns a channel receiving every event.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    /// Stops the timer, the trigger and the mutation listener.
    pub fn shutdown(&self) {
        self.inner.stop_sync();
        self.inner.trigger.shutdown();
        self.listener.unsubscribe();
        tracing::debug!("sync engine shut down");
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("status", &self.status())
            .field("interval", &self.inner.interval)
            .finish_non_exhaustive()
    }
}

struct EngineInner {
    resolver: SyncResolver,
    settings: ConfigStore,
    interval: Duration,
    trigger: DebouncedTrigger,
    timer: Mutex<Option<JoinHandle<()>>>,
    // Bumped on every start/stop; a start only arms the timer if no
    // other start or stop happened during its first tick.
    generation: AtomicU64,
    status: RwLock<SyncStatus>,
    stats: RwLock<SyncStats>,
    in_flight: AtomicBool,
    events: EventBus,
}

impl EngineInner {
    fn try_start_sync(&self) -> bool {
        if !self.settings.is_configured() {
            tracing::debug!("remote not configured, sync not started");
            return false;
        }
        self.trigger.fire()
    }

    async fn start_sync(self: &Arc<Self>) {
        let generation = {
            let mut timer = self.timer.lock();
            if let Some(handle) = timer.take() {
                handle.abort();
            }
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        self.set_status(SyncStatus::Begin);
        tracing::info!(interval = ?self.interval, "sync session starting");

        self.detached_tick().await;

        let mut timer = self.timer.lock();
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!("session superseded before timer start");
            return;
        }
        *timer = Some(tokio::spawn(Self::run_timer(
            Arc::downgrade(self),
            self.interval,
        )));
    }

    fn stop_sync(&self) {
        let mut timer = self.timer.lock();
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = timer.take() {
            handle.abort();
            tracing::info!("sync session stopped");
        }
        drop(timer);
        self.set_status(SyncStatus::Wait);
    }

    async fn run_timer(weak: Weak<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let Some(inner) = weak.upgrade() else { break };
            inner.detached_tick().await;
        }
    }

    /// Runs a tick in its own task and waits for it.
    ///
    /// Aborting the caller (stop, shutdown, drop) never cancels the tick
    /// midway. Failures are recorded in status and stats.
    async fn detached_tick(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        let tick = tokio::spawn(async move {
            let _ = inner.tick().await;
        });
        if let Err(e) = tick.await {
            if !e.is_cancelled() {
                tracing::error!(error = %e, "sync tick task failed");
            }
        }
    }

    /// Runs one guarded tick. `None` means another tick was in flight.
    async fn tick(&self) -> Option<SyncResult<TickOutcome>> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            tracing::warn!("previous sync tick still running, skipping");
            self.stats.write().overlapping_ticks_skipped += 1;
            return None;
        }
        let _guard = InFlight(&self.in_flight);

        let result = self.resolver.run_tick().await;
        match &result {
            Ok(outcome) => self.record_success(outcome),
            Err(e) => self.record_failure(e),
        }
        Some(result)
    }

    fn record_success(&self, outcome: &TickOutcome) {
        {
            let mut stats = self.stats.write();
            stats.ticks_completed += 1;
            stats.last_success = Some(Utc::now());
            if outcome.received() {
                stats.snapshots_received += 1;
            }
            if outcome.uploaded_path().is_some() {
                stats.snapshots_uploaded += 1;
            }
        }
        self.set_status(SyncStatus::Success);

        match outcome {
            TickOutcome::Received { from_device, .. } => {
                self.events.emit(&SyncEvent::Received {
                    from_device: from_device.clone(),
                });
            }
            TickOutcome::Seeded { path } | TickOutcome::Refreshed { path } => {
                self.events.emit(&SyncEvent::Uploaded { path: path.clone() });
            }
            TickOutcome::Skipped { .. } => {}
        }
    }

    fn record_failure(&self, error: &SyncError) {
        tracing::warn!(error = %error, retryable = error.is_retryable(), "sync tick failed");
        {
            let mut stats = self.stats.write();
            stats.ticks_failed += 1;
            stats.last_error = Some(error.to_string());
        }
        self.set_status(SyncStatus::Fail);
    }

    fn set_status(&self, status: SyncStatus) {
        *self.status.write() = status;
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().take() {
            handle.abort();
        }
    }
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
