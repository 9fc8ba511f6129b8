//! Activity scheduler
//!
//! Owns the recurring keepalive timer. On each tick it decides, from
//! elapsed idle time, page visibility, and the active safety profile,
//! whether to emit one synthetic activity and which kind.
//!
//! # Architecture
//!
//! ```text
//! real input ──┐
//! visibility ──┼──▶ SchedulerHandle ──▶ event channel ──┐
//! settings UI ─┘                                        ▼
//!                                        run loop (tokio::select!)
//!                                          │ tick: should_act?
//!                                          ▼
//!                                     select_action ──▶ HostPage
//! ```
//!
//! The run loop is the only writer of the scheduler state; watchers and
//! the UI reach it exclusively through the event channel, so ticks and
//! callbacks interleave at await points and never preempt each other.

use crate::host::{perform_action, HostPage};
use crate::settings::{Settings, SettingsBackend, SettingsPatch, SettingsStore};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, trace, warn};

pub mod policy;

pub use policy::{random_chooser, select_action, should_act, ActionKind, Chooser};

/// Fixed delay between page load and scheduler start, letting any
/// login redirect settle before the first watcher attaches.
pub const STARTUP_DELAY: Duration = Duration::from_secs(5);

/// Delay before the extra "welcome back" action after the page
/// transitions hidden → visible.
pub const WELCOME_BACK_DELAY: Duration = Duration::from_secs(2);

/// Events delivered to the scheduler run loop.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// A real user-input event arrived on the page.
    RealInput,
    /// The page's visibility changed.
    VisibilityChanged(bool),
    /// Deferred follow-up to a hidden → visible transition.
    WelcomeBack,
    /// A new settings snapshot is in effect; restart the tick timer.
    SettingsChanged(Settings),
    /// Cancel the recurring timer and end the run loop.
    Stop,
}

/// Cloneable sender half used by watchers and the session layer.
///
/// Every send is a no-op once the scheduler has stopped; the watchers
/// stay attached and simply stop mattering, as the design requires.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<SchedulerEvent>,
}

impl SchedulerHandle {
    /// Record a real user-input event.
    pub fn real_input(&self) {
        self.send(SchedulerEvent::RealInput);
    }

    /// Record a page visibility change.
    pub fn visibility_changed(&self, visible: bool) {
        self.send(SchedulerEvent::VisibilityChanged(visible));
    }

    fn send(&self, event: SchedulerEvent) {
        if self.tx.send(event).is_err() {
            trace!("scheduler event dropped, run loop has stopped");
        }
    }
}

/// Point-in-time view of the scheduler for the settings UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStatus {
    /// Whether the recurring timer is active.
    pub running: bool,
    /// Timestamp of the most recent real or synthetic activity.
    pub last_activity_at: DateTime<Utc>,
    /// Whether the page is currently foregrounded.
    pub page_visible: bool,
    /// The settings snapshot the scheduler is acting on.
    pub settings: Settings,
}

/// Mutable scheduler state, written by the run loop and the event
/// handlers, read by `status()`.
#[derive(Debug)]
struct SchedulerState {
    running: bool,
    page_visible: bool,
    /// Monotonic instant for idle arithmetic.
    last_activity: Instant,
    /// Wall-clock twin of `last_activity`, reported in status.
    last_activity_at: DateTime<Utc>,
    settings: Settings,
}

/// The activity scheduler.
///
/// Create one per page with [`ActivityScheduler::new`], start it once
/// after the page settles, and stop it when the page goes away. A
/// stopped scheduler is done; make a new one for a new page.
pub struct ActivityScheduler<H, B> {
    host: Arc<H>,
    store: Arc<SettingsStore<B>>,
    state: Arc<RwLock<SchedulerState>>,
    chooser: Arc<dyn Fn(usize) -> usize + Send + Sync>,
    tx: mpsc::UnboundedSender<SchedulerEvent>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<SchedulerEvent>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<H: HostPage, B: SettingsBackend> ActivityScheduler<H, B> {
    /// Create a scheduler over the given host page and settings store,
    /// acting on the given settings snapshot.
    pub fn new(host: Arc<H>, store: SettingsStore<B>, settings: Settings) -> Self {
        Self::with_chooser(host, store, settings, Arc::new(random_chooser))
    }

    /// Like [`ActivityScheduler::new`] with an injected uniform chooser,
    /// so tests can pin the randomized action selection.
    pub fn with_chooser(
        host: Arc<H>,
        store: SettingsStore<B>,
        settings: Settings,
        chooser: Arc<dyn Fn(usize) -> usize + Send + Sync>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = SchedulerState {
            running: false,
            page_visible: true,
            last_activity: Instant::now(),
            last_activity_at: Utc::now(),
            settings,
        };
        Self {
            host,
            store: Arc::new(store),
            state: Arc::new(RwLock::new(state)),
            chooser,
            tx,
            rx: Mutex::new(Some(rx)),
            task: Mutex::new(None),
        }
    }

    /// A handle for feeding real-input and visibility events in.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            tx: self.tx.clone(),
        }
    }

    /// Start the recurring timer. Idempotent: a second call while
    /// running is a logged no-op.
    #[instrument(skip(self))]
    pub fn start(&self) {
        let Some(rx) = self.rx.lock().take() else {
            debug!("scheduler already started, ignoring");
            return;
        };

        {
            let mut state = self.state.write();
            state.running = true;
            state.last_activity = Instant::now();
            state.last_activity_at = Utc::now();
        }

        let host = Arc::clone(&self.host);
        let state = Arc::clone(&self.state);
        let chooser = Arc::clone(&self.chooser);
        let tx = self.tx.clone();
        let task = tokio::spawn(run_loop(host, state, chooser, tx, rx));
        *self.task.lock() = Some(task);
        info!("activity scheduler started");
    }

    /// Cancel the recurring timer. Watchers stay attached; their events
    /// become no-ops once the loop exits.
    #[instrument(skip(self))]
    pub fn stop(&self) {
        if self.tx.send(SchedulerEvent::Stop).is_err() {
            debug!("scheduler already stopped");
        }
    }

    /// Current status for the settings UI.
    pub fn status(&self) -> SchedulerStatus {
        let state = self.state.read();
        SchedulerStatus {
            running: state.running,
            last_activity_at: state.last_activity_at,
            page_visible: state.page_visible,
            settings: state.settings.clone(),
        }
    }

    /// The settings snapshot the scheduler is acting on.
    pub fn settings(&self) -> Settings {
        self.state.read().settings.clone()
    }

    /// Merge a partial update into the current settings, persist the
    /// full record, and restart the tick timer so the new interval takes
    /// effect immediately. An empty patch still restarts the timer.
    #[instrument(skip(self, patch))]
    pub async fn update_settings(&self, patch: &SettingsPatch) -> Settings {
        let merged = self.settings().merged(patch);
        self.store.save(&merged).await;
        self.state.write().settings = merged.clone();
        if self
            .tx
            .send(SchedulerEvent::SettingsChanged(merged.clone()))
            .is_err()
        {
            debug!("settings updated while scheduler stopped; persisted only");
        }
        merged
    }

    /// Wait for the run loop to finish after [`ActivityScheduler::stop`].
    pub async fn join(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

/// The scheduler run loop: one recurring ticker plus the event channel,
/// multiplexed on the same task so state is only ever touched from here.
async fn run_loop<H: HostPage>(
    host: Arc<H>,
    state: Arc<RwLock<SchedulerState>>,
    chooser: Arc<dyn Fn(usize) -> usize + Send + Sync>,
    tx: mpsc::UnboundedSender<SchedulerEvent>,
    mut rx: mpsc::UnboundedReceiver<SchedulerEvent>,
) {
    let mut settings = state.read().settings.clone();
    let mut ticker = make_ticker(settings.tick_interval());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tick(&host, &state, &settings, chooser.as_ref()).await;
            }
            event = rx.recv() => match event {
                Some(SchedulerEvent::RealInput) => {
                    trace!("real input observed");
                    mark_activity(&state);
                }
                Some(SchedulerEvent::VisibilityChanged(visible)) => {
                    let was_visible = {
                        let mut state = state.write();
                        std::mem::replace(&mut state.page_visible, visible)
                    };
                    if visible {
                        mark_activity(&state);
                        if !was_visible {
                            debug!("page became visible, scheduling welcome-back action");
                            let tx = tx.clone();
                            tokio::spawn(async move {
                                tokio::time::sleep(WELCOME_BACK_DELAY).await;
                                let _ = tx.send(SchedulerEvent::WelcomeBack);
                            });
                        }
                    }
                }
                Some(SchedulerEvent::WelcomeBack) => {
                    // Bypasses the idle check on purpose; the visibility
                    // policy still applies, since the page may have gone
                    // hidden again during the delay.
                    let (visible, profile, background) = {
                        let state = state.read();
                        (
                            state.page_visible,
                            state.settings.safety_profile,
                            state.settings.background_mode_enabled,
                        )
                    };
                    if !visible && !background {
                        debug!("page hidden again before welcome-back action, skipping");
                        continue;
                    }
                    let action = select_action(profile, visible, background, chooser.as_ref());
                    if execute(&host, &settings, action).await {
                        mark_activity(&state);
                    }
                }
                Some(SchedulerEvent::SettingsChanged(new_settings)) => {
                    settings = new_settings;
                    ticker = make_ticker(settings.tick_interval());
                    info!(
                        profile = %settings.safety_profile,
                        interval_secs = settings.tick_interval().as_secs(),
                        "settings changed, tick timer restarted"
                    );
                }
                Some(SchedulerEvent::Stop) | None => break,
            }
        }
    }

    state.write().running = false;
    info!("activity scheduler stopped");
}

/// One timer tick: consult the idle policy and perform at most one
/// synthetic action.
async fn tick<H: HostPage>(
    host: &Arc<H>,
    state: &Arc<RwLock<SchedulerState>>,
    settings: &Settings,
    chooser: &Chooser,
) {
    let (visible, idle_for) = {
        let state = state.read();
        (state.page_visible, state.last_activity.elapsed())
    };

    if !should_act(settings, visible, idle_for) {
        trace!(
            idle_secs = idle_for.as_secs(),
            visible,
            "tick: idle policy says no action"
        );
        return;
    }

    let action = select_action(
        settings.safety_profile,
        visible,
        settings.background_mode_enabled,
        chooser,
    );
    if execute(host, settings, action).await {
        mark_activity(state);
    }
}

/// Perform one action, swallowing any failure. Returns whether the
/// action succeeded and the activity clock should advance.
async fn execute<H: HostPage>(host: &Arc<H>, settings: &Settings, action: ActionKind) -> bool {
    match perform_action(host.as_ref(), action).await {
        Ok(()) => {
            if settings.debug_logging_enabled {
                debug!(?action, "synthetic action performed");
            } else {
                trace!(?action, "synthetic action performed");
            }
            true
        }
        Err(err) => {
            // Never propagates; the next tick proceeds normally.
            warn!(?action, "synthetic action failed: {err}");
            false
        }
    }
}

fn mark_activity(state: &Arc<RwLock<SchedulerState>>) {
    let mut state = state.write();
    state.last_activity = Instant::now();
    state.last_activity_at = Utc::now();
}

fn make_ticker(period: Duration) -> tokio::time::Interval {
    // First tick one full period out; a settings change must not fire
    // an immediate tick.
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}
