use std::{
    sync::{Arc, Mutex as StdMutex, MutexGuard, Weak},
    time::Duration,
};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, Mutex};

use crate::{
    db::{Database, Phase, Session, SessionMode},
    settings::SettingsStore,
};

use super::{
    state::{RunMode, TimerEvent, TimerSnapshot, TimerState},
    ticker::{TickSource, DEFAULT_TICK_PERIOD},
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error};

const NOTIFICATION_CAPACITY: usize = 64;

/// Source of wall-clock time for every transition.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum TimerNotification {
    StateChanged(TimerSnapshot),
    PhaseChanged {
        phase: Phase,
        cycle_index: u32,
        long_break: bool,
    },
    SessionRecorded(Session),
    Chime,
    RunEnded {
        stopped_manually: bool,
    },
}

/// Owns the timer state and serializes every mutation on it: user actions
/// and ticks each take the state lock and run to completion before the next
/// one is applied.
#[derive(Clone)]
pub struct TimerController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    state: Mutex<TimerState>,
    ticker: StdMutex<Option<TickSource>>,
    db: Database,
    settings: Arc<SettingsStore>,
    user_id: String,
    clock: Clock,
    tick_period: Duration,
    notifications: broadcast::Sender<TimerNotification>,
}

impl TimerController {
    pub fn new(db: Database, settings: Arc<SettingsStore>, user_id: String) -> Self {
        Self::with_clock(db, settings, user_id, system_clock(), DEFAULT_TICK_PERIOD)
    }

    pub fn with_clock(
        db: Database,
        settings: Arc<SettingsStore>,
        user_id: String,
        clock: Clock,
        tick_period: Duration,
    ) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        Self {
            inner: Arc::new(ControllerInner {
                state: Mutex::new(TimerState::new()),
                ticker: StdMutex::new(None),
                db,
                settings,
                user_id,
                clock,
                tick_period,
                notifications,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimerNotification> {
        self.inner.notifications.subscribe()
    }

    pub async fn snapshot(&self) -> TimerSnapshot {
        self.inner.state.lock().await.snapshot()
    }

    pub fn is_ticking(&self) -> bool {
        self.ticker_guard()
            .as_ref()
            .map_or(false, TickSource::is_running)
    }

    pub async fn start(&self, mode: SessionMode) -> Result<TimerSnapshot> {
        let prefs = self.inner.settings.preferences();
        let run_mode = match mode {
            SessionMode::FixedCycle => RunMode::fixed_cycle(prefs.fixed_cycle),
            SessionMode::Freeform => RunMode::freeform(prefs.freeform),
        };

        let mut state = self.inner.state.lock().await;
        if !state.start(run_mode, self.now()) {
            return Err(anyhow!("timer already active"));
        }
        self.start_ticker();

        let snapshot = self.publish(&state);
        log_debug!("Started {} run ({}s)", mode.as_str(), snapshot.total_sec);
        Ok(snapshot)
    }

    pub async fn pause(&self) -> TimerSnapshot {
        let mut state = self.inner.state.lock().await;
        if state.pause(self.now()) {
            self.stop_ticker();
        } else {
            log_debug!("pause ignored: timer is not running");
        }
        self.publish(&state)
    }

    pub async fn resume(&self) -> Result<TimerSnapshot> {
        let mut state = self.inner.state.lock().await;
        if !state.resume(self.now()) {
            return Err(anyhow!("timer is not paused"));
        }
        self.start_ticker();
        Ok(self.publish(&state))
    }

    pub async fn adjust(&self, delta_sec: i64) -> TimerSnapshot {
        let mut state = self.inner.state.lock().await;
        if !state.adjust(delta_sec, self.now()) {
            log_debug!("adjust ignored: timer is not running");
        }
        self.publish(&state)
    }

    /// Manual stop from any active state. Returns the session that was
    /// recorded, if any time had elapsed in the current phase.
    pub async fn stop(&self) -> Option<Session> {
        let events = {
            let mut state = self.inner.state.lock().await;
            self.stop_ticker();
            let events = state.stop(self.now());
            self.publish(&state);
            events
        };

        let recorded = self.handle_events(events).await;
        recorded.into_iter().next()
    }

    /// Tick handler. Recomputes remaining time from the deadline and drives
    /// phase transitions when it reaches zero.
    pub async fn tick(&self) {
        let events = {
            let mut state = self.inner.state.lock().await;
            let events = state.tick(self.now());
            if !state.is_running() {
                self.stop_ticker();
            }
            self.publish(&state);
            events
        };

        self.handle_events(events).await;
    }

    async fn handle_events(&self, events: Vec<TimerEvent>) -> Vec<Session> {
        let mut recorded = Vec::new();

        for event in events {
            match event {
                TimerEvent::Expired { phase } => {
                    log_debug!(
                        "Phase expired ({})",
                        phase.map_or("freeform", |phase| phase.as_str())
                    );
                    if self.inner.settings.preferences().chime_enabled {
                        self.notify(TimerNotification::Chime);
                    }
                }
                TimerEvent::SessionFinalized(interval) => {
                    let session = interval.into_session(&self.inner.user_id);
                    match self.inner.db.append_session(&session).await {
                        Ok(()) => {
                            log_debug!(
                                "Recorded {}s {} session {}",
                                session.duration_sec,
                                session.mode.as_str(),
                                session.id
                            );
                            self.notify(TimerNotification::SessionRecorded(session.clone()));
                            recorded.push(session);
                        }
                        Err(err) => {
                            log_error!("Failed to record session: {err:?}");
                        }
                    }
                }
                TimerEvent::PhaseChanged {
                    phase,
                    cycle_index,
                    long_break,
                } => {
                    self.notify(TimerNotification::PhaseChanged {
                        phase,
                        cycle_index,
                        long_break,
                    });
                }
                TimerEvent::RunEnded { stopped_manually } => {
                    self.notify(TimerNotification::RunEnded { stopped_manually });
                }
            }
        }

        recorded
    }

    fn now(&self) -> DateTime<Utc> {
        (self.inner.clock)()
    }

    /// Broadcasts the current snapshot. Called with the state lock held so
    /// snapshots go out in the order the transitions were applied.
    fn publish(&self, state: &TimerState) -> TimerSnapshot {
        let snapshot = state.snapshot();
        self.notify(TimerNotification::StateChanged(snapshot.clone()));
        snapshot
    }

    fn notify(&self, notification: TimerNotification) {
        // No subscribers is fine.
        let _ = self.inner.notifications.send(notification);
    }

    fn ticker_guard(&self) -> MutexGuard<'_, Option<TickSource>> {
        self.inner
            .ticker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Lazily creates the tick source and the task that feeds its ticks back
    /// into `tick`.
    fn start_ticker(&self) {
        let mut guard = self.ticker_guard();
        let ticker = guard.get_or_insert_with(|| {
            let (tick_tx, tick_rx) = mpsc::channel(1);
            spawn_tick_pump(Arc::downgrade(&self.inner), tick_rx);
            TickSource::new(self.inner.tick_period, tick_tx)
        });
        ticker.start();
    }

    fn stop_ticker(&self) {
        if let Some(ticker) = self.ticker_guard().as_mut() {
            ticker.stop();
        }
    }
}

fn spawn_tick_pump(inner: Weak<ControllerInner>, mut ticks: mpsc::Receiver<()>) {
    tokio::spawn(async move {
        while ticks.recv().await.is_some() {
            let Some(inner) = inner.upgrade() else {
                break;
            };
            TimerController { inner }.tick().await;
        }
    });
}
