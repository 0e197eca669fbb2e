//! Camera state and viewport types.
//!
//! All coordinates are normalized to `[0.0, 1.0]` relative to the cropped
//! source frame.

use serde::{Deserialize, Serialize};

/// Absolute lower zoom bound applied at every derivation step.
pub const MIN_ZOOM_BOUND: f64 = 1.0;

/// Absolute upper zoom bound applied at every derivation step.
pub const MAX_ZOOM_BOUND: f64 = 5.0;

/// Clamp a zoom factor into the absolute safety bounds.
///
/// Non-finite input collapses to no zoom.
pub fn clamp_zoom(zoom: f64) -> f64 {
    if zoom.is_finite() {
        zoom.clamp(MIN_ZOOM_BOUND, MAX_ZOOM_BOUND)
    } else {
        MIN_ZOOM_BOUND
    }
}

/// Valid range for a camera center on one axis at the given zoom.
///
/// The visible span is `1 / zoom`, so its center must stay at least half a
/// span away from either edge.
pub fn center_bounds(zoom: f64) -> (f64, f64) {
    let half = 0.5 / clamp_zoom(zoom);
    (half, 1.0 - half)
}

/// The resolved virtual camera for one instant.
///
/// Never persisted; recomputed per frame or sampled from a dense path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraState {
    /// Seconds on the source timeline.
    pub time: f64,
    /// Zoom factor (1.0 = whole frame visible).
    pub zoom_factor: f64,
    /// Camera center, horizontal (normalized).
    pub position_x: f64,
    /// Camera center, vertical (normalized).
    pub position_y: f64,
}

impl CameraState {
    /// Centered, unzoomed camera at `time`.
    pub fn identity(time: f64) -> Self {
        Self {
            time,
            zoom_factor: 1.0,
            position_x: 0.5,
            position_y: 0.5,
        }
    }

    /// Create a camera state with zoom and position clamped.
    ///
    /// When zoom and position conflict at a boundary, the position moves.
    pub fn new(time: f64, zoom_factor: f64, position_x: f64, position_y: f64) -> Self {
        Self {
            time,
            zoom_factor,
            position_x,
            position_y,
        }
        .clamped()
    }

    /// Same state with zoom in safety bounds and the viewport inside the frame.
    pub fn clamped(&self) -> Self {
        let zoom = clamp_zoom(self.zoom_factor);
        let (lo, hi) = center_bounds(zoom);
        let fix = |v: f64| if v.is_finite() { v.clamp(lo, hi) } else { 0.5 };
        Self {
            time: self.time,
            zoom_factor: zoom,
            position_x: fix(self.position_x),
            position_y: fix(self.position_y),
        }
    }

    /// Visible region of the frame for this camera.
    pub fn viewport(&self) -> Viewport {
        let s = self.clamped();
        let span = 1.0 / s.zoom_factor;
        Viewport {
            x: s.position_x - span / 2.0,
            y: s.position_y - span / 2.0,
            w: span,
            h: span,
        }
    }

    /// Linearly interpolate zoom and position, taking `time` from the argument.
    pub fn lerp(a: &CameraState, b: &CameraState, t: f64, time: f64) -> CameraState {
        let t = t.clamp(0.0, 1.0);
        CameraState {
            time,
            zoom_factor: a.zoom_factor + (b.zoom_factor - a.zoom_factor) * t,
            position_x: a.position_x + (b.position_x - a.position_x) * t,
            position_y: a.position_y + (b.position_y - a.position_y) * t,
        }
    }

    /// Scale the deviation from the neutral camera (centered, zoom 1.0).
    ///
    /// `amount = 0` yields the neutral camera; `amount = 1` leaves the state unchanged.
    pub fn with_influence(&self, amount: f64) -> CameraState {
        let v = amount.clamp(0.0, 1.0);
        CameraState {
            time: self.time,
            zoom_factor: 1.0 + (self.zoom_factor - 1.0) * v,
            position_x: 0.5 + (self.position_x - 0.5) * v,
            position_y: 0.5 + (self.position_y - 0.5) * v,
        }
        .clamped()
    }
}

impl Default for CameraState {
    fn default() -> Self {
        Self::identity(0.0)
    }
}

/// A rectangular visible region within the cropped frame.
///
/// Coordinates are normalized: `(0.0, 0.0)` is top-left,
/// `(1.0, 1.0)` is bottom-right.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Left edge (normalized).
    pub x: f64,
    /// Top edge (normalized).
    pub y: f64,
    /// Width (normalized).
    pub w: f64,
    /// Height (normalized).
    pub h: f64,
}

impl Viewport {
    /// Full-frame viewport (no zoom).
    pub const FULL: Viewport = Viewport {
        x: 0.0,
        y: 0.0,
        w: 1.0,
        h: 1.0,
    };

    /// Right edge.
    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    /// Whether this viewport lies within the unit frame (with float tolerance).
    pub fn is_within_frame(&self) -> bool {
        const EPS: f64 = 1e-9;
        self.x >= -EPS && self.y >= -EPS && self.right() <= 1.0 + EPS && self.bottom() <= 1.0 + EPS
    }

    /// Check if a normalized point is within this viewport.
    pub fn contains(&self, px: f64, py: f64) -> bool {
        px >= self.x && px <= self.right() && py >= self.y && py <= self.bottom()
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::FULL
    }
}

/// A 2D point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: &Point2D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Linear interpolation between two points.
    pub fn lerp(a: &Point2D, b: &Point2D, t: f64) -> Point2D {
        let t = t.clamp(0.0, 1.0);
        Point2D {
            x: a.x + (b.x - a.x) * t,
            y: a.y + (b.y - a.y) * t,
        }
    }
}
