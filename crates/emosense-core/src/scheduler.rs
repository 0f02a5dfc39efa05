//! Adaptive gating of inference invocations.
//!
//! The pipeline ticks at display-refresh cadence; actually running the
//! expression model is far more expensive than a tick. The scheduler
//! decides, per tick, whether an invocation is due, enforces the
//! single-in-flight rule, and widens effective spacing when inference is
//! persistently slower than the processing budget.

use std::time::{Duration, Instant};

use tracing::debug;

/// Per-tick invocation gate with slow-frame backpressure.
///
/// An invocation is issued on a tick iff no call is in flight, at least
/// `min_interval` has elapsed since the last invocation, and the
/// consecutive slow-frame count is within the skip budget. Once the count
/// exceeds the budget, each further elapsed interval consumes one count
/// instead of invoking, so sustained overload stretches the effective
/// spacing by whole intervals and the gate always recovers.
#[derive(Debug)]
pub struct AdaptiveScheduler {
    min_interval: Duration,
    min_processing_time: Duration,
    max_consecutive_skips: u32,

    last_invocation: Option<Instant>,
    consecutive_slow_frames: u32,
    busy: bool,

    total_ticks: u64,
    invocations: u64,
}

/// Utilization snapshot for status surfaces.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerStats {
    pub total_ticks: u64,
    pub invocations: u64,
    /// Invocations per tick, 0.0 before the first tick.
    pub invocation_rate: f32,
    pub consecutive_slow_frames: u32,
    pub busy: bool,
}

impl AdaptiveScheduler {
    pub fn new(
        min_interval: Duration,
        min_processing_time: Duration,
        max_consecutive_skips: u32,
    ) -> Self {
        Self {
            min_interval,
            min_processing_time,
            max_consecutive_skips,
            last_invocation: None,
            consecutive_slow_frames: 0,
            busy: false,
            total_ticks: 0,
            invocations: 0,
        }
    }

    /// One display-refresh tick. Returns true when the caller must issue
    /// exactly one inference invocation now; the scheduler is then busy
    /// until [`complete`](Self::complete), [`fail`](Self::fail) or
    /// [`abort`](Self::abort) is called.
    pub fn tick(&mut self, now: Instant) -> bool {
        self.total_ticks += 1;

        if self.busy {
            return false;
        }

        let due = match self.last_invocation {
            None => true,
            Some(at) => now.saturating_duration_since(at) >= self.min_interval,
        };
        if !due {
            return false;
        }

        if self.consecutive_slow_frames > self.max_consecutive_skips {
            // Overloaded: this cycle pays down one slow frame instead of
            // running, pushing the next chance a full interval out.
            self.consecutive_slow_frames -= 1;
            self.last_invocation = Some(now);
            debug!(
                remaining = self.consecutive_slow_frames,
                "skipping inference cycle under overload"
            );
            return false;
        }

        self.begin(now)
    }

    /// Explicit invocation request outside the tick cadence (manual
    /// detection). Bypasses the interval gate but still honors the busy
    /// flag and the overload budget.
    pub fn request(&mut self, now: Instant) -> bool {
        if self.busy || self.consecutive_slow_frames > self.max_consecutive_skips {
            return false;
        }
        self.begin(now)
    }

    fn begin(&mut self, now: Instant) -> bool {
        self.busy = true;
        self.last_invocation = Some(now);
        self.invocations += 1;
        true
    }

    /// Record the wall-clock duration of a completed inference call.
    /// Durations over the processing budget count as slow frames; a call
    /// within budget clears the streak.
    pub fn complete(&mut self, duration: Duration) {
        self.busy = false;
        if duration > self.min_processing_time {
            self.consecutive_slow_frames += 1;
            debug!(
                duration_ms = duration.as_millis() as u64,
                streak = self.consecutive_slow_frames,
                "slow inference completion"
            );
        } else {
            self.consecutive_slow_frames = 0;
        }
    }

    /// Record a failed inference call. Failures count as slow frames; the
    /// loop itself keeps running.
    pub fn fail(&mut self) {
        self.busy = false;
        self.consecutive_slow_frames += 1;
    }

    /// Roll back an invocation that never started (no frame was
    /// available). Clears the busy flag without touching the slow-frame
    /// streak; the interval gate still applies to the next attempt.
    pub fn abort(&mut self) {
        self.busy = false;
        self.invocations = self.invocations.saturating_sub(1);
    }

    /// Restore the initial state (detection stream restart).
    pub fn reset(&mut self) {
        self.last_invocation = None;
        self.consecutive_slow_frames = 0;
        self.busy = false;
        self.total_ticks = 0;
        self.invocations = 0;
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            total_ticks: self.total_ticks,
            invocations: self.invocations,
            invocation_rate: if self.total_ticks > 0 {
                self.invocations as f32 / self.total_ticks as f32
            } else {
                0.0
            },
            consecutive_slow_frames: self.consecutive_slow_frames,
            busy: self.busy,
        }
    }
}
