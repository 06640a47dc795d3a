//! Simulation Clock
//!
//! Simulation time is a millisecond counter derived from the tick count,
//! never from the wall clock. Wall time only feeds the fixed-step
//! accumulator that decides how many ticks to run.

use serde::{Serialize, Deserialize};

/// Simulation time in milliseconds since the simulation started.
pub type SimTime = u64;

/// Deterministic tick counter with its derived millisecond time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimClock {
    tick: u64,
    tick_rate: u32,
}

impl SimClock {
    /// Create a clock at tick 0. A zero rate is bumped to 1 Hz.
    pub fn new(tick_rate: u32) -> Self {
        Self {
            tick: 0,
            tick_rate: tick_rate.max(1),
        }
    }

    /// Current tick.
    #[inline]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Ticks per second.
    #[inline]
    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    /// Fixed timestep in seconds.
    #[inline]
    pub fn dt(&self) -> f32 {
        1.0 / self.tick_rate as f32
    }

    /// Current simulation time. Integer math so every tick lands on the
    /// same millisecond on every platform.
    #[inline]
    pub fn now(&self) -> SimTime {
        self.tick * 1000 / self.tick_rate as u64
    }

    /// Advance by one tick and return the new tick number.
    #[inline]
    pub fn advance(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Tick and time together.
    #[inline]
    pub fn stamp(&self) -> TickStamp {
        TickStamp { tick: self.tick, now: self.now() }
    }
}

/// The tick being processed and its simulation time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TickStamp {
    /// Tick number
    pub tick: u64,
    /// Simulation time (ms)
    pub now: SimTime,
}

impl TickStamp {
    /// Stamp for an explicit tick and time.
    pub const fn new(tick: u64, now: SimTime) -> Self {
        Self { tick, now }
    }
}

/// Fixed-step accumulator.
///
/// Collects variable wall-clock deltas and hands out whole steps. Leftover
/// time carries into the next call; anything beyond `max_steps` is dropped
/// so a long stall cannot trigger a spiral of catch-up work.
#[derive(Clone, Copy, Debug)]
pub struct FixedStep {
    step: f64,
    accumulated: f64,
    max_steps: u32,
}

impl FixedStep {
    /// Create an accumulator for a fixed step of `step` seconds.
    pub fn new(step: f64, max_steps: u32) -> Self {
        Self {
            step,
            accumulated: 0.0,
            max_steps: max_steps.max(1),
        }
    }

    /// Add elapsed seconds and return how many whole steps to run.
    pub fn accumulate(&mut self, elapsed: f64) -> u32 {
        if !elapsed.is_finite() || elapsed <= 0.0 || self.step <= 0.0 {
            return 0;
        }
        self.accumulated += elapsed;

        let mut steps = 0;
        while self.accumulated >= self.step && steps < self.max_steps {
            self.accumulated -= self.step;
            steps += 1;
        }

        if steps == self.max_steps && self.accumulated >= self.step {
            // Drop the backlog, keep the sub-step remainder
            self.accumulated %= self.step;
        }
        steps
    }

    /// Time accumulated but not yet consumed, in seconds.
    pub fn remainder(&self) -> f64 {
        self.accumulated
    }
}

// =============================================================================
// TESTS
// =============================================================================
