//! Cursor overlay smoothing.
//!
//! Produces the trajectory used to draw the cursor glyph. This is separate
//! from the camera path, which works from raw look-ahead telemetry.
//!
//! Pipeline:
//! 1. Catmull-Rom resample to a fixed rate.
//! 2. N Gaussian moving-average passes, N derived from the smoothness level.
//! 3. Deadband collapse so sub-pixel noise never moves the glyph.

use serde::{Deserialize, Serialize};

use flowcam_project_model::event::{CursorKind, PointerSample};

/// Timestamps closer than this resolve to the sample itself.
const EXACT_MATCH_SECS: f64 = 0.001;

/// Window size the deadband threshold is expressed against.
const REFERENCE_WINDOW: f64 = 5.0;

/// Configuration for the cursor smoother.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CursorSmoothConfig {
    /// Resampling rate in Hz.
    pub resample_hz: f64,

    /// Smoothing level in `[0, 1]`.
    pub smoothness: f64,

    /// Gaussian window size in samples (odd).
    pub window: usize,

    /// Gaussian sigma in samples.
    pub sigma: f64,

    /// Minimum displacement (px) at the reference window size for the
    /// glyph to move.
    pub deadband_px: f64,
}

impl Default for CursorSmoothConfig {
    fn default() -> Self {
        Self {
            resample_hz: 120.0,
            smoothness: 0.5,
            window: 5,
            sigma: 1.0,
            deadband_px: 0.5,
        }
    }
}

impl CursorSmoothConfig {
    /// Default config at the given smoothness level.
    pub fn from_smoothness(smoothness: f64) -> Self {
        Self {
            smoothness,
            ..Default::default()
        }
    }

    /// Number of Gaussian passes.
    pub fn passes(&self) -> usize {
        (self.smoothness.clamp(0.0, 1.0) * 4.0).round() as usize
    }

    /// Displacement needed to move the glyph, scaled by window size.
    pub fn deadband_threshold(&self) -> f64 {
        self.deadband_px.max(0.0) * self.window.max(1) as f64 / REFERENCE_WINDOW
    }
}

/// Cursor position resolved for one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedCursor {
    pub x: f64,
    pub y: f64,
    pub is_clicked: bool,
    pub kind: CursorKind,
}

/// A smoothed cursor trajectory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SmoothedCursor {
    samples: Vec<PointerSample>,
}

impl SmoothedCursor {
    pub fn samples(&self) -> &[PointerSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Cursor at `time`, interpolated between the bracketing samples.
    ///
    /// Click state and glyph come from the earlier sample. Returns `None`
    /// for an empty trajectory.
    pub fn resolve_position(&self, time: f64) -> Option<ResolvedCursor> {
        let first = self.samples.first()?;
        let last = self.samples.last()?;

        if time <= first.timestamp {
            return Some(resolved(first));
        }
        if time >= last.timestamp {
            return Some(resolved(last));
        }

        let idx = self.samples.partition_point(|s| s.timestamp <= time);
        let a = &self.samples[idx - 1];
        let b = &self.samples[idx];

        if (time - a.timestamp).abs() < EXACT_MATCH_SECS {
            return Some(resolved(a));
        }
        if (b.timestamp - time).abs() < EXACT_MATCH_SECS {
            return Some(resolved(b));
        }

        let t = (time - a.timestamp) / (b.timestamp - a.timestamp);
        Some(ResolvedCursor {
            x: a.x + (b.x - a.x) * t,
            y: a.y + (b.y - a.y) * t,
            is_clicked: a.is_clicked,
            kind: a.cursor_kind,
        })
    }
}

fn resolved(s: &PointerSample) -> ResolvedCursor {
    ResolvedCursor {
        x: s.x,
        y: s.y,
        is_clicked: s.is_clicked,
        kind: s.cursor_kind,
    }
}

/// Cursor smoothing engine.
pub struct CursorSmoother {
    config: CursorSmoothConfig,
}

impl CursorSmoother {
    pub fn new(config: CursorSmoothConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(CursorSmoothConfig::default())
    }

    pub fn config(&self) -> &CursorSmoothConfig {
        &self.config
    }

    /// Smooth a time-ordered pointer trace.
    pub fn smooth(&self, raw: &[PointerSample]) -> SmoothedCursor {
        let mut samples: Vec<PointerSample> = raw
            .iter()
            .filter(|s| s.timestamp.is_finite() && s.x.is_finite() && s.y.is_finite())
            .copied()
            .collect();
        samples.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        samples.dedup_by(|b, a| (b.timestamp - a.timestamp).abs() < f64::EPSILON);

        if samples.len() < 2 {
            return SmoothedCursor { samples };
        }

        let mut resampled = self.resample(&samples);
        for _ in 0..self.config.passes() {
            resampled = self.gaussian_pass(&resampled);
        }
        self.deadband(&mut resampled);

        tracing::trace!(
            raw = raw.len(),
            smoothed = resampled.len(),
            passes = self.config.passes(),
            "Smoothed cursor trace"
        );

        SmoothedCursor { samples: resampled }
    }

    /// Catmull-Rom resample at the configured rate.
    fn resample(&self, samples: &[PointerSample]) -> Vec<PointerSample> {
        let hz = if self.config.resample_hz > 0.0 {
            self.config.resample_hz
        } else {
            120.0
        };
        let step = 1.0 / hz;
        let (first, last) = (samples[0], samples[samples.len() - 1]);
        let count = ((last.timestamp - first.timestamp) / step + 1e-9).floor() as usize;

        let mut out = Vec::with_capacity(count + 2);
        let mut seg = 0usize;

        for k in 0..=count {
            let t = first.timestamp + k as f64 * step;
            while seg + 2 < samples.len() && samples[seg + 1].timestamp <= t {
                seg += 1;
            }

            let p1 = &samples[seg];
            let p2 = &samples[seg + 1];
            let span = p2.timestamp - p1.timestamp;
            let u = if span > 0.0 {
                ((t - p1.timestamp) / span).clamp(0.0, 1.0)
            } else {
                0.0
            };

            // Reflect at the ends so straight lines stay straight.
            let p0 = if seg > 0 {
                (samples[seg - 1].x, samples[seg - 1].y)
            } else {
                (2.0 * p1.x - p2.x, 2.0 * p1.y - p2.y)
            };
            let p3 = if seg + 2 < samples.len() {
                (samples[seg + 2].x, samples[seg + 2].y)
            } else {
                (2.0 * p2.x - p1.x, 2.0 * p2.y - p1.y)
            };

            let nearest = if u < 0.5 { p1 } else { p2 };
            out.push(PointerSample {
                timestamp: t,
                x: catmull_rom(p0.0, p1.x, p2.x, p3.0, u),
                y: catmull_rom(p0.1, p1.y, p2.y, p3.1, u),
                is_clicked: nearest.is_clicked,
                cursor_kind: nearest.cursor_kind,
            });
        }

        if last.timestamp - out.last().map(|s| s.timestamp).unwrap_or(f64::MIN) > EXACT_MATCH_SECS {
            out.push(last);
        }
        out
    }

    /// One Gaussian moving-average pass over a symmetric window.
    ///
    /// The window shrinks near the ends so it stays symmetric.
    fn gaussian_pass(&self, samples: &[PointerSample]) -> Vec<PointerSample> {
        let half = self.config.window.max(1) / 2;
        let sigma = self.config.sigma.max(0.01);
        let weights: Vec<f64> = (0..=half)
            .map(|d| (-((d * d) as f64) / (2.0 * sigma * sigma)).exp())
            .collect();

        let n = samples.len();
        (0..n)
            .map(|i| {
                let reach = half.min(i).min(n - 1 - i);
                let mut sum_w = weights[0];
                let mut sum_x = samples[i].x * weights[0];
                let mut sum_y = samples[i].y * weights[0];
                for d in 1..=reach {
                    let w = weights[d];
                    sum_w += 2.0 * w;
                    sum_x += (samples[i - d].x + samples[i + d].x) * w;
                    sum_y += (samples[i - d].y + samples[i + d].y) * w;
                }
                PointerSample {
                    x: sum_x / sum_w,
                    y: sum_y / sum_w,
                    ..samples[i]
                }
            })
            .collect()
    }

    /// Hold the last significant position until movement or a click change.
    fn deadband(&self, samples: &mut [PointerSample]) {
        let threshold = self.config.deadband_threshold();
        let Some(first) = samples.first() else {
            return;
        };
        let mut anchor = *first;

        for s in samples.iter_mut().skip(1) {
            if s.is_clicked != anchor.is_clicked || s.distance_to(&anchor) > threshold {
                anchor = *s;
            } else {
                s.x = anchor.x;
                s.y = anchor.y;
            }
        }
    }
}

fn catmull_rom(p0: f64, p1: f64, p2: f64, p3: f64, t: f64) -> f64 {
    let t2 = t * t;
    let t3 = t2 * t;
    0.5 * ((2.0 * p1)
        + (-p0 + p2) * t
        + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t2
        + (-p0 + 3.0 * p1 - 3.0 * p2 + p3) * t3)
}
