//! Clock and timing utilities for rendering.
//!
//! Export runs on a virtual time base that is independent of wall time:
//! frame `i` is always rendered at `trim_start + i * step`, so two exports
//! of the same segment visit exactly the same timestamps. Interactive
//! playback is driven by display refresh ticks instead and uses
//! [`RateController`] to gate them.

use std::time::Instant;

/// Deterministic virtual time base for one export pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameClock {
    start_secs: f64,
    end_secs: f64,
    step_secs: f64,
}

impl FrameClock {
    /// Build a clock covering `[start_secs, end_secs)` at `fps` output frames
    /// per second, advancing `speed` source seconds per output second.
    ///
    /// Returns `None` for a non-positive frame rate or speed, or an empty range.
    pub fn new(start_secs: f64, end_secs: f64, fps: u32, speed: f64) -> Option<Self> {
        if fps == 0 || !(speed > 0.0) || !(end_secs > start_secs) {
            return None;
        }
        Some(Self {
            start_secs,
            end_secs,
            step_secs: speed / fps as f64,
        })
    }

    /// Source seconds between consecutive output frames.
    pub fn step_secs(&self) -> f64 {
        self.step_secs
    }

    pub fn start_secs(&self) -> f64 {
        self.start_secs
    }

    pub fn end_secs(&self) -> f64 {
        self.end_secs
    }

    /// Source time of output frame `index`.
    ///
    /// Computed from the index rather than accumulated, so no drift builds up.
    pub fn time_at(&self, index: u64) -> f64 {
        self.start_secs + index as f64 * self.step_secs
    }

    /// Number of frames `i` with `time_at(i) < end_secs`.
    pub fn frame_count(&self) -> u64 {
        let span = self.end_secs - self.start_secs;
        // Tolerance keeps an exact multiple (e.g. 2.0 / (1/30)) from gaining a frame.
        ((span / self.step_secs) - 1e-9).ceil().max(0.0) as u64
    }

    /// Fraction of the virtual range covered once frame `index` is done.
    pub fn progress_at(&self, index: u64) -> f64 {
        let span = self.end_secs - self.start_secs;
        ((self.time_at(index) + self.step_secs - self.start_secs) / span).clamp(0.0, 1.0)
    }

    /// Iterate `(index, time)` pairs for the whole range.
    pub fn frames(&self) -> impl Iterator<Item = (u64, f64)> + '_ {
        (0..self.frame_count()).map(move |i| (i, self.time_at(i)))
    }
}

/// Wall clock for one run (export or playback), used for ETA and reports.
#[derive(Debug, Clone)]
pub struct RunClock {
    started: Instant,
    started_wall: String,
}

impl RunClock {
    /// Start a new run clock anchored to now.
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            started_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Seconds elapsed since the run started.
    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Wall-clock start time (RFC 3339).
    pub fn started_wall(&self) -> &str {
        &self.started_wall
    }

    /// Estimated seconds remaining given a completed fraction.
    pub fn eta_secs(&self, progress: f64) -> f64 {
        if progress <= 0.0 {
            return 0.0;
        }
        let elapsed = self.elapsed_secs();
        ((elapsed / progress) - elapsed).max(0.0)
    }
}

/// Convert seconds to nanoseconds (negative input saturates to zero).
pub fn secs_to_ns(secs: f64) -> u64 {
    (secs.max(0.0) * 1_000_000_000.0) as u64
}

/// Rate gate for display-driven ticks.
#[derive(Debug)]
pub struct RateController {
    target_interval_ns: u64,
    last_tick_ns: Option<u64>,
}

impl RateController {
    /// Create a controller targeting the given Hz rate.
    pub fn new(target_hz: u32) -> Self {
        Self {
            target_interval_ns: secs_to_ns(1.0 / target_hz.max(1) as f64),
            last_tick_ns: None,
        }
    }

    /// Check if enough time has passed for the next tick.
    /// Returns true and updates internal state if ready.
    /// The first call always returns true.
    pub fn should_tick(&mut self, current_ns: u64) -> bool {
        match self.last_tick_ns {
            None => {
                self.last_tick_ns = Some(current_ns);
                true
            }
            Some(last) if current_ns >= last + self.target_interval_ns => {
                self.last_tick_ns = Some(current_ns);
                true
            }
            _ => false,
        }
    }
}
