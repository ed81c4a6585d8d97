//! Time management utilities
//!
//! The scene works in milliseconds of simulated time. [`Timer`] bridges the
//! wall clock to that unit for real-time frame drivers.

use std::time::{Duration, Instant};

/// Wall-clock frame timer reporting milliseconds
pub struct Timer {
    start: Instant,
    last_frame: Instant,
    delta_ms: f64,
    frame_count: u64,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Create a new timer
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_frame: now,
            delta_ms: 0.0,
            frame_count: 0,
        }
    }

    /// Update the timer (should be called once per frame)
    pub fn update(&mut self) {
        let now = Instant::now();
        self.delta_ms = millis(now.duration_since(self.last_frame));
        self.last_frame = now;
        self.frame_count += 1;
    }

    /// Milliseconds elapsed since the timer was created
    pub fn now_ms(&self) -> f64 {
        millis(self.start.elapsed())
    }

    /// Time between the two most recent updates, in milliseconds
    pub fn delta_ms(&self) -> f64 {
        self.delta_ms
    }

    /// Get the current frame count
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Get the average FPS since timer creation
    pub fn average_fps(&self) -> f64 {
        let total = self.now_ms();
        if total > 0.0 {
            self.frame_count as f64 * 1000.0 / total
        } else {
            0.0
        }
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
