//! High-resolution timer for frame timing.

use std::time::{Duration, Instant};

/// Upper bound applied to a single frame's delta.
///
/// A long stall (window drag, breakpoint, minimize) would otherwise feed a
/// huge step into the particle simulation.
pub const MAX_FRAME_TIME: f32 = 0.25;

/// High-resolution timer for measuring elapsed and per-frame time.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
}

impl Timer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
        }
    }

    /// Get the total elapsed time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get the elapsed time in seconds since the timer was created.
    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed().as_secs_f32()
    }

    /// Get the time elapsed since the last call to `tick()`.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        delta
    }

    /// Delta time in seconds since the last tick, clamped to [`MAX_FRAME_TIME`].
    pub fn frame_time(&mut self) -> f32 {
        self.tick().as_secs_f32().min(MAX_FRAME_TIME)
    }

    /// Reset the timer to the current time.
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.start = now;
        self.last_tick = now;
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
