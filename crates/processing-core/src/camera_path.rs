//! Camera path generation: the physical camera simulation.
//!
//! Converts pointer telemetry, manual keyframes and framing heuristics into
//! a dense camera path, one [`CameraState`] per simulation tick.
//!
//! # Algorithm
//!
//! Per fixed tick over `[trimStart, trimEnd]`:
//!
//! 1. **Target position** = telemetry sampled `look_ahead_secs` ahead.
//! 2. **Target zoom** = base zoom, adjusted in order by velocity penalty,
//!    click focus, dwell deepening and edge pull-back.
//! 3. **Keyframe magnetism** blends the target toward the nearest manual
//!    keyframe with a raised-cosine weight.
//! 4. **Springs** track the target per axis (heavier mass on zoom).
//! 5. **Hard constraints** clamp zoom to the safety bounds and the center
//!    so the viewport stays in frame; clamped axes lose their velocity.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use flowcam_project_model::camera::{
    center_bounds, CameraState, Point2D, MAX_ZOOM_BOUND, MIN_ZOOM_BOUND,
};
use flowcam_project_model::segment::{MotionPoint, PixelRect, VideoSegment, ZoomKeyframe};

use crate::camera_resolve::{influence_at, interpolate_path};
use crate::spring::{Spring, SpringParams};
use crate::telemetry::TelemetrySampler;

/// Configuration for the camera path generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraPathConfig {
    /// Simulation step in seconds.
    pub tick_secs: f64,

    /// How far ahead of the current time telemetry is sampled.
    pub look_ahead_secs: f64,

    /// Zoom with no rule active.
    pub base_zoom: f64,

    /// Zoom the velocity and edge rules pull toward.
    pub min_zoom: f64,

    /// Zoom reached after a long dwell.
    pub max_zoom: f64,

    /// Pointer speed (px/s) at which the velocity penalty is total.
    pub velocity_ceiling: f64,

    /// Zoom floor while a click is nearby.
    pub click_zoom: f64,

    /// Width of the centered click window (seconds).
    pub click_window_secs: f64,

    /// Stillness required before dwell deepening (seconds).
    pub dwell_threshold_secs: f64,

    /// Radius around the dwell anchor within which the pointer counts as still (px).
    pub dwell_movement_px: f64,

    /// Distance from a frame edge (normalized) where pull-back starts.
    pub edge_margin: f64,

    /// Fraction of the base-to-min zoom range removed at the very edge.
    pub edge_strength: f64,

    /// Time window over which a keyframe attracts the camera (seconds).
    pub keyframe_window_secs: f64,

    pub position_spring: SpringParams,

    pub zoom_spring: SpringParams,
}

impl Default for CameraPathConfig {
    fn default() -> Self {
        Self {
            tick_secs: 1.0 / 60.0,
            look_ahead_secs: 0.2,
            base_zoom: 1.4,
            min_zoom: 1.0,
            max_zoom: 2.2,
            velocity_ceiling: 400.0,
            click_zoom: 1.9,
            click_window_secs: 0.5,
            dwell_threshold_secs: 1.5,
            dwell_movement_px: 2.0,
            edge_margin: 0.10,
            edge_strength: 0.6,
            keyframe_window_secs: 1.5,
            position_spring: SpringParams::new(170.0, 26.0, 1.0),
            zoom_spring: SpringParams::new(170.0, 45.0, 3.0),
        }
    }
}

impl CameraPathConfig {
    /// Defaults with the zoom levels and velocity ceiling from the app config.
    pub fn from_defaults(defaults: &flowcam_common::config::CameraDefaults) -> Self {
        Self {
            base_zoom: defaults.base_zoom,
            min_zoom: defaults.min_zoom,
            max_zoom: defaults.max_zoom,
            velocity_ceiling: defaults.velocity_ceiling,
            ..Self::default()
        }
    }

    /// Same config with zoom levels inside the absolute bounds and ordered.
    fn sanitized(&self) -> Self {
        let bound = |z: f64| {
            if z.is_finite() {
                z.clamp(MIN_ZOOM_BOUND, MAX_ZOOM_BOUND)
            } else {
                MIN_ZOOM_BOUND
            }
        };
        let min_zoom = bound(self.min_zoom);
        let max_zoom = bound(self.max_zoom).max(min_zoom);
        Self {
            tick_secs: if self.tick_secs > 0.0 { self.tick_secs } else { 1.0 / 60.0 },
            min_zoom,
            max_zoom,
            base_zoom: bound(self.base_zoom).clamp(min_zoom, max_zoom),
            click_zoom: bound(self.click_zoom).clamp(min_zoom, max_zoom),
            velocity_ceiling: self.velocity_ceiling.max(1.0),
            edge_margin: self.edge_margin.clamp(0.0, 0.5),
            edge_strength: self.edge_strength.clamp(0.0, 1.0),
            ..self.clone()
        }
    }
}

/// One sample of the influence curve along a generated path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InfluenceSample {
    pub time: f64,
    pub value: f64,
}

/// A generated dense camera path.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CameraPath {
    /// One state per simulation tick, ordered by time.
    pub states: Vec<CameraState>,
    /// Influence curve sampled on the same ticks.
    pub influence: Vec<InfluenceSample>,
}

impl CameraPath {
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Raw (un-influenced) camera at `time`, interpolated between ticks.
    pub fn state_at(&self, time: f64) -> Option<CameraState> {
        if self.states.is_empty() {
            None
        } else {
            Some(interpolate_path(&self.states, time))
        }
    }

    /// Export as an editor `smoothMotionPath`.
    pub fn to_motion_points(&self) -> Vec<MotionPoint> {
        self.states.iter().map(MotionPoint::from).collect()
    }

    /// Rebuild from an editor `smoothMotionPath`.
    pub fn from_motion_points(points: &[MotionPoint]) -> Self {
        let mut states: Vec<CameraState> = points.iter().map(CameraState::from).collect();
        states.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self {
            states,
            influence: vec![],
        }
    }

    /// Smallest and largest zoom along the path.
    pub fn zoom_range(&self) -> Option<(f64, f64)> {
        let mut iter = self.states.iter().map(|s| s.zoom_factor);
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), z| (lo.min(z), hi.max(z))))
    }
}

/// Simulation state carried between ticks for the dwell rule.
///
/// Stillness accrues while the pointer stays within `radius_px` of the
/// anchor. Leaving the radius re-anchors and decays at twice the rate.
#[derive(Debug, Clone, Copy)]
struct DwellTracker {
    still_secs: f64,
    anchor: Point2D,
}

impl DwellTracker {
    fn new(anchor: Point2D) -> Self {
        Self {
            still_secs: 0.0,
            anchor,
        }
    }

    fn update(&mut self, current: Point2D, radius_px: f64, dt: f64) -> f64 {
        if current.distance_to(&self.anchor) <= radius_px {
            self.still_secs += dt;
        } else {
            self.anchor = current;
            self.still_secs = (self.still_secs - 2.0 * dt).max(0.0);
        }
        self.still_secs
    }
}

/// The camera path generator.
pub struct CameraPathGenerator {
    config: CameraPathConfig,
}

impl CameraPathGenerator {
    /// Create a new generator with the given configuration.
    pub fn new(config: CameraPathConfig) -> Self {
        Self {
            config: config.sanitized(),
        }
    }

    /// Create a generator with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(CameraPathConfig::default())
    }

    pub fn config(&self) -> &CameraPathConfig {
        &self.config
    }

    /// Run the simulation over the segment.
    ///
    /// Returns `None` when the telemetry cannot drive motion (fewer than two
    /// samples) or the segment is empty.
    pub fn generate(&self, sampler: &TelemetrySampler, segment: &VideoSegment) -> Option<CameraPath> {
        if !sampler.has_motion() || segment.duration() <= 0.0 {
            return None;
        }

        let cfg = &self.config;
        let (frame_w, frame_h) = sampler.frame_size();
        let crop = segment.crop_or_full().to_pixels(frame_w, frame_h);

        let mut keyframes: Vec<ZoomKeyframe> = segment.zoom_keyframes.clone();
        keyframes.sort_by(|a, b| a.time.total_cmp(&b.time));

        let dt = cfg.tick_secs;
        let start = segment.trim_start;
        let end = segment.trim_end;
        let ticks = ((end - start) / dt - 1e-9).ceil().max(0.0) as usize;

        let first_target = sampler.normalized(start + cfg.look_ahead_secs, &crop);
        let mut spring_x = Spring::new(first_target.x, cfg.position_spring);
        let mut spring_y = Spring::new(first_target.y, cfg.position_spring);
        let mut spring_zoom = Spring::new(cfg.base_zoom, cfg.zoom_spring);
        let mut dwell = DwellTracker::new(sampler.sample(start + cfg.look_ahead_secs));

        let mut path = CameraPath {
            states: Vec::with_capacity(ticks + 1),
            influence: Vec::with_capacity(ticks + 1),
        };

        for i in 0..=ticks {
            let time = (start + i as f64 * dt).min(end);
            let look_ahead = time + cfg.look_ahead_secs;

            let target = sampler.normalized(look_ahead, &crop);
            let mut target_zoom = self.target_zoom(sampler, look_ahead, &crop, &mut dwell);
            let (mut target_x, mut target_y) = (target.x, target.y);

            if let Some((kf, weight)) = self.keyframe_pull(&keyframes, time) {
                let pinned = kf.camera_state();
                target_x += (pinned.position_x - target_x) * weight;
                target_y += (pinned.position_y - target_y) * weight;
                target_zoom += (pinned.zoom_factor - target_zoom) * weight;
            }

            spring_x.step(target_x, dt);
            spring_y.step(target_y, dt);
            spring_zoom.step(target_zoom, dt);

            spring_zoom.constrain(MIN_ZOOM_BOUND, MAX_ZOOM_BOUND);
            let (lo, hi) = center_bounds(spring_zoom.position);
            spring_x.constrain(lo, hi);
            spring_y.constrain(lo, hi);

            let state = CameraState {
                time,
                zoom_factor: spring_zoom.position,
                position_x: spring_x.position,
                position_y: spring_y.position,
            };
            debug_assert!(state.viewport().is_within_frame());
            path.states.push(state);
            path.influence.push(InfluenceSample {
                time,
                value: influence_at(&segment.zoom_influence_points, time),
            });
        }

        if let Some((lo, hi)) = path.zoom_range() {
            tracing::debug!(
                ticks = path.len(),
                keyframes = keyframes.len(),
                min_zoom = lo,
                max_zoom = hi,
                "Generated camera path"
            );
        }

        Some(path)
    }

    /// Target zoom for one tick, from the heuristic rules.
    fn target_zoom(
        &self,
        sampler: &TelemetrySampler,
        look_ahead: f64,
        crop: &PixelRect,
        dwell: &mut DwellTracker,
    ) -> f64 {
        let cfg = &self.config;
        let mut zoom = cfg.base_zoom;

        // Velocity penalty
        let speed_ratio = (sampler.velocity(look_ahead) / cfg.velocity_ceiling).clamp(0.0, 1.0);
        zoom += (cfg.min_zoom - zoom) * speed_ratio;

        // Click focus
        if sampler.is_click_near(look_ahead, cfg.click_window_secs) {
            zoom = zoom.max(cfg.click_zoom);
        }

        // Dwell deepening
        let still = dwell.update(sampler.sample(look_ahead), cfg.dwell_movement_px, cfg.tick_secs);
        if still >= cfg.dwell_threshold_secs {
            zoom = cfg.max_zoom;
        }

        // Edge pull-back, as a ceiling
        if cfg.edge_margin > 0.0 {
            let p = sampler.normalized(look_ahead, crop);
            let edge_distance = p.x.min(1.0 - p.x).min(p.y).min(1.0 - p.y);
            if edge_distance < cfg.edge_margin {
                let proximity = 1.0 - edge_distance / cfg.edge_margin;
                let ceiling = zoom + (cfg.min_zoom - zoom) * proximity * cfg.edge_strength;
                zoom = zoom.min(ceiling);
            }
        }

        zoom.clamp(cfg.min_zoom, cfg.max_zoom)
    }

    /// The nearest keyframe inside the influence window and its weight.
    fn keyframe_pull<'a>(
        &self,
        keyframes: &'a [ZoomKeyframe],
        time: f64,
    ) -> Option<(&'a ZoomKeyframe, f64)> {
        let window = self.config.keyframe_window_secs;
        if window <= 0.0 {
            return None;
        }

        let nearest = keyframes
            .iter()
            .min_by(|a, b| (a.time - time).abs().total_cmp(&(b.time - time).abs()))?;
        let ratio = (nearest.time - time).abs() / window;
        if ratio >= 1.0 {
            return None;
        }
        Some((nearest, (1.0 + (PI * ratio).cos()) / 2.0))
    }
}
