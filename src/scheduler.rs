//! Report scheduling state machine.
//!
//! ```text
//!            start                fire              outcome
//!   Idle ──────────▶ Scheduled ─────────▶ InFlight ─────────▶ Scheduled
//!    ▲                   │                   │
//!    └──── stop ─────────┘                   └── (halted) ──▶ Idle
//! ```
//!
//! The scheduler owns at most one timer handle and knows whether a dispatch is
//! in flight; it never spawns or sends anything itself. Callers pass an `arm`
//! closure that starts a timer for a given delay and generation and returns its
//! handle.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Delay before the first dispatch after start.
pub const WARMUP_DELAY: Duration = Duration::from_secs(10);

/// Deadline used when `now + delay` is not representable (about 30 years).
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// A pending timer that can be cancelled by its owner.
pub trait TimerHandle {
    fn cancel(self);
}

impl TimerHandle for JoinHandle<()> {
    fn cancel(self) {
        self.abort();
    }
}

#[derive(Debug)]
pub enum SchedulerState<H> {
    Idle,
    Scheduled {
        timer: H,
        due_at: Instant,
        generation: u64,
    },
    InFlight,
}

/// Observable phase of a scheduler, without its timer handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Scheduled { due_at: Instant },
    InFlight,
}

#[derive(Debug)]
pub struct Scheduler<H> {
    state: SchedulerState<H>,
    interval: Duration,
    warmup: Duration,
    halted: bool,
    next_generation: u64,
}

impl<H: TimerHandle> Scheduler<H> {
    pub fn new(interval: Duration) -> Self {
        Self {
            state: SchedulerState::Idle,
            interval,
            warmup: WARMUP_DELAY,
            halted: false,
            next_generation: 0,
        }
    }

    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    pub fn phase(&self) -> Phase {
        match &self.state {
            SchedulerState::Idle => Phase::Idle,
            SchedulerState::Scheduled { due_at, .. } => Phase::Scheduled { due_at: *due_at },
            SchedulerState::InFlight => Phase::InFlight,
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Delay before the next dispatch given how the previous one went.
    /// Failure halves the interval once; it does not compound.
    pub fn next_delay(&self, failed: bool) -> Duration {
        if failed {
            self.interval / 2
        } else {
            self.interval
        }
    }

    /// Arm the warm-up timer. Only valid once, from Idle; returns whether a
    /// timer was armed.
    pub fn start<F>(&mut self, arm: F) -> bool
    where
        F: FnOnce(Duration, u64) -> H,
    {
        if self.halted || !matches!(self.state, SchedulerState::Idle) {
            return false;
        }
        self.arm(self.warmup, arm);
        true
    }

    /// Scheduled → InFlight. Returns whether the caller should dispatch.
    ///
    /// A timer whose generation no longer matches (cancelled, or superseded
    /// after it already fired) is ignored.
    pub fn on_timer_fire(&mut self, generation: u64) -> bool {
        let due = matches!(
            &self.state,
            SchedulerState::Scheduled { generation: current, .. } if *current == generation
        );
        if !due || self.halted {
            return false;
        }

        // the handle belongs to the timer that is firing right now
        self.state = SchedulerState::InFlight;
        true
    }

    /// InFlight → Scheduled with the outcome-dependent delay, or → Idle when
    /// halted meanwhile. Returns the armed delay.
    pub fn on_dispatch_outcome<F>(&mut self, failed: bool, arm: F) -> Option<Duration>
    where
        F: FnOnce(Duration, u64) -> H,
    {
        if !matches!(self.state, SchedulerState::InFlight) {
            return None;
        }
        if self.halted {
            self.state = SchedulerState::Idle;
            return None;
        }

        let delay = self.next_delay(failed);
        self.arm(delay, arm);
        Some(delay)
    }

    /// Halt scheduling. Cancels a pending timer and returns true if there was
    /// one; an in-flight dispatch is left to finish but will not re-arm.
    pub fn stop(&mut self) -> bool {
        self.halted = true;
        match std::mem::replace(&mut self.state, SchedulerState::Idle) {
            SchedulerState::Scheduled { timer, .. } => {
                timer.cancel();
                true
            }
            SchedulerState::InFlight => {
                self.state = SchedulerState::InFlight;
                false
            }
            SchedulerState::Idle => false,
        }
    }

    fn arm<F>(&mut self, delay: Duration, arm: F)
    where
        F: FnOnce(Duration, u64) -> H,
    {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.state = SchedulerState::Scheduled {
            timer: arm(delay, generation),
            due_at: deadline(delay),
            generation,
        };
    }
}

fn deadline(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay).unwrap_or_else(|| now + FAR_FUTURE)
}
