use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::{day_key, Phase, Session, SessionMode},
    settings::{CyclePrefs, FreeformPrefs},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TimerStatus {
    #[default]
    Idle,
    Running,
    Paused,
}

/// What the current run is doing. Fixed-cycle runs carry their phase and
/// 1-based cycle index; both are meaningless for freeform runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    FixedCycle {
        phase: Phase,
        cycle_index: u32,
        prefs: CyclePrefs,
    },
    Freeform {
        prefs: FreeformPrefs,
    },
}

impl RunMode {
    pub fn fixed_cycle(prefs: CyclePrefs) -> Self {
        RunMode::FixedCycle {
            phase: Phase::Work,
            cycle_index: 1,
            prefs,
        }
    }

    pub fn freeform(prefs: FreeformPrefs) -> Self {
        RunMode::Freeform { prefs }
    }

    pub fn session_mode(&self) -> SessionMode {
        match self {
            RunMode::FixedCycle { .. } => SessionMode::FixedCycle,
            RunMode::Freeform { .. } => SessionMode::Freeform,
        }
    }

    pub fn phase(&self) -> Option<Phase> {
        match self {
            RunMode::FixedCycle { phase, .. } => Some(*phase),
            RunMode::Freeform { .. } => None,
        }
    }

    pub fn cycle_index(&self) -> u32 {
        match self {
            RunMode::FixedCycle { cycle_index, .. } => *cycle_index,
            RunMode::Freeform { .. } => 1,
        }
    }

    fn tag(&self) -> Option<String> {
        match self {
            RunMode::FixedCycle { .. } => None,
            RunMode::Freeform { prefs } => prefs.normalized_tag(),
        }
    }

    fn initial_total_sec(&self) -> u64 {
        match self {
            RunMode::FixedCycle { prefs, .. } => minutes_to_sec(prefs.work_minutes),
            RunMode::Freeform { prefs } => minutes_to_sec(prefs.length_minutes),
        }
    }
}

/// A finished stretch of a single phase, ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedInterval {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_sec: u64,
    pub mode: SessionMode,
    pub tag: Option<String>,
    pub cycles: u32,
    pub phase: Option<Phase>,
    pub stopped_manually: bool,
}

impl CompletedInterval {
    pub fn into_session(self, user_id: &str) -> Session {
        Session {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            day: day_key(self.started_at),
            started_at: self.started_at,
            ended_at: self.ended_at,
            duration_sec: self.duration_sec,
            mode: self.mode,
            tag: self.tag,
            cycles: self.cycles,
            phase: self.phase,
            stopped_manually: self.stopped_manually,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimerEvent {
    /// The countdown of the current phase reached zero.
    Expired { phase: Option<Phase> },
    SessionFinalized(CompletedInterval),
    PhaseChanged {
        phase: Phase,
        cycle_index: u32,
        long_break: bool,
    },
    RunEnded { stopped_manually: bool },
}

/// Read-only projection handed to the UI after every transition.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub status: TimerStatus,
    pub running: bool,
    pub mode: Option<SessionMode>,
    pub phase: Option<Phase>,
    pub cycle_index: u32,
    pub cycles_per_set: Option<u32>,
    pub total_sec: u64,
    pub remaining_sec: u64,
    pub progress: f64,
    pub tag: Option<String>,
}

/// The live countdown. All transitions take the current wall-clock instant
/// so the remaining time is always derived from `deadline - now`.
#[derive(Debug, Clone, Default)]
pub struct TimerState {
    status: TimerStatus,
    mode: Option<RunMode>,
    total_sec: u64,
    remaining_sec: u64,
    deadline: Option<DateTime<Utc>>,
}

impl TimerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> TimerStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == TimerStatus::Running
    }

    pub fn mode(&self) -> Option<&RunMode> {
        self.mode.as_ref()
    }

    pub fn total_sec(&self) -> u64 {
        self.total_sec
    }

    pub fn remaining_sec(&self) -> u64 {
        self.remaining_sec
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    pub fn progress(&self) -> f64 {
        if self.total_sec == 0 {
            return 0.0;
        }
        (1.0 - self.remaining_sec as f64 / self.total_sec as f64).clamp(0.0, 1.0)
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        let cycles_per_set = match &self.mode {
            Some(RunMode::FixedCycle { prefs, .. }) => Some(prefs.cycles_per_set()),
            _ => None,
        };

        TimerSnapshot {
            status: self.status,
            running: self.is_running(),
            mode: self.mode.as_ref().map(RunMode::session_mode),
            phase: self.mode.as_ref().and_then(RunMode::phase),
            cycle_index: self.mode.as_ref().map_or(1, RunMode::cycle_index),
            cycles_per_set,
            total_sec: self.total_sec,
            remaining_sec: self.remaining_sec,
            progress: self.progress(),
            tag: self.mode.as_ref().and_then(RunMode::tag),
        }
    }

    /// Idle -> Running. Returns false when a run is already active.
    pub fn start(&mut self, mode: RunMode, now: DateTime<Utc>) -> bool {
        if self.status != TimerStatus::Idle {
            return false;
        }

        let total_sec = mode.initial_total_sec();
        *self = Self {
            status: TimerStatus::Running,
            mode: Some(mode),
            total_sec,
            remaining_sec: total_sec,
            deadline: Some(deadline_after(now, total_sec)),
        };
        true
    }

    /// Running -> Paused. The remaining time is frozen as of `now`.
    pub fn pause(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != TimerStatus::Running {
            return false;
        }
        self.sync_remaining(now);
        self.status = TimerStatus::Paused;
        self.deadline = None;
        true
    }

    /// Paused -> Running with a fresh deadline built from the frozen
    /// remaining time, so time spent paused is not counted.
    pub fn resume(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != TimerStatus::Paused {
            return false;
        }
        self.deadline = Some(deadline_after(now, self.remaining_sec));
        self.status = TimerStatus::Running;
        true
    }

    /// Shift the remaining time by `delta_sec`, clamped at zero. The phase
    /// total moves by the same applied amount so elapsed time is unchanged.
    pub fn adjust(&mut self, delta_sec: i64, now: DateTime<Utc>) -> bool {
        if self.status != TimerStatus::Running {
            return false;
        }
        self.sync_remaining(now);

        let before = self.remaining_sec as i64;
        let target = before.saturating_add(delta_sec).max(0) as u64;
        // Past the last representable instant the deadline saturates and the
        // remaining time is whatever is left until it.
        let deadline = deadline_after(now, target);
        let after = target.min(remaining_until(deadline, now)) as i64;
        let applied = after - before;

        self.remaining_sec = after as u64;
        self.total_sec = (self.total_sec as i64).saturating_add(applied).max(0) as u64;
        self.deadline = Some(deadline);
        true
    }

    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<TimerEvent> {
        if self.status != TimerStatus::Running {
            return Vec::new();
        }
        self.sync_remaining(now);
        if self.remaining_sec > 0 {
            return Vec::new();
        }
        self.expire(now)
    }

    /// Running|Paused -> Idle. Elapsed time in the current phase is
    /// finalized as a manually stopped interval.
    pub fn stop(&mut self, now: DateTime<Utc>) -> Vec<TimerEvent> {
        if self.status == TimerStatus::Idle {
            return Vec::new();
        }
        if self.status == TimerStatus::Running {
            self.sync_remaining(now);
        }

        let mut events = Vec::new();
        if let Some(interval) = self.finalize(now, true) {
            events.push(TimerEvent::SessionFinalized(interval));
        }
        self.reset();
        events.push(TimerEvent::RunEnded {
            stopped_manually: true,
        });
        events
    }

    fn expire(&mut self, now: DateTime<Utc>) -> Vec<TimerEvent> {
        let Some(mode) = self.mode.clone() else {
            self.reset();
            return Vec::new();
        };

        let mut events = vec![TimerEvent::Expired {
            phase: mode.phase(),
        }];

        match mode {
            RunMode::Freeform { .. } => {
                if let Some(interval) = self.finalize(now, false) {
                    events.push(TimerEvent::SessionFinalized(interval));
                }
                self.reset();
                events.push(TimerEvent::RunEnded {
                    stopped_manually: false,
                });
            }
            RunMode::FixedCycle {
                phase: Phase::Work,
                cycle_index,
                prefs,
            } => {
                if let Some(interval) = self.finalize(now, false) {
                    events.push(TimerEvent::SessionFinalized(interval));
                }

                let long_break = cycle_index % prefs.cycles_per_set() == 0;
                let break_minutes = if long_break {
                    prefs.long_break_minutes
                } else {
                    prefs.short_break_minutes
                };

                self.mode = Some(RunMode::FixedCycle {
                    phase: Phase::Break,
                    cycle_index,
                    prefs,
                });
                self.begin_phase(minutes_to_sec(break_minutes), now);
                events.push(TimerEvent::PhaseChanged {
                    phase: Phase::Break,
                    cycle_index,
                    long_break,
                });
            }
            RunMode::FixedCycle {
                phase: Phase::Break,
                cycle_index,
                prefs,
            } => {
                if cycle_index >= prefs.cycles_per_set() {
                    self.reset();
                    events.push(TimerEvent::RunEnded {
                        stopped_manually: false,
                    });
                } else {
                    let next_cycle = cycle_index + 1;
                    self.mode = Some(RunMode::FixedCycle {
                        phase: Phase::Work,
                        cycle_index: next_cycle,
                        prefs,
                    });
                    self.begin_phase(minutes_to_sec(prefs.work_minutes), now);
                    events.push(TimerEvent::PhaseChanged {
                        phase: Phase::Work,
                        cycle_index: next_cycle,
                        long_break: false,
                    });
                }
            }
        }

        events
    }

    fn begin_phase(&mut self, total_sec: u64, now: DateTime<Utc>) {
        self.total_sec = total_sec;
        self.remaining_sec = total_sec;
        self.deadline = Some(deadline_after(now, total_sec));
    }

    fn finalize(&self, now: DateTime<Utc>, stopped_manually: bool) -> Option<CompletedInterval> {
        let mode = self.mode.as_ref()?;
        let elapsed = self.total_sec.saturating_sub(self.remaining_sec);
        if elapsed == 0 {
            return None;
        }

        Some(CompletedInterval {
            started_at: now - Duration::seconds(elapsed as i64),
            ended_at: now,
            duration_sec: elapsed,
            mode: mode.session_mode(),
            tag: mode.tag(),
            cycles: mode.cycle_index(),
            phase: mode.phase(),
            stopped_manually,
        })
    }

    fn sync_remaining(&mut self, now: DateTime<Utc>) {
        if let Some(deadline) = self.deadline {
            self.remaining_sec = remaining_until(deadline, now);
        }
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

fn minutes_to_sec(minutes: u32) -> u64 {
    u64::from(minutes) * 60
}

fn deadline_after(now: DateTime<Utc>, seconds: u64) -> DateTime<Utc> {
    i64::try_from(seconds)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|offset| now.checked_add_signed(offset))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Whole seconds left until `deadline`, rounded to nearest and never negative.
pub fn remaining_until(deadline: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let millis = (deadline - now).num_milliseconds();
    if millis <= 0 {
        return 0;
    }
    ((millis + 500) / 1000) as u64
}
