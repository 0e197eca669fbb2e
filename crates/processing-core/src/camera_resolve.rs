//! Per-instant camera resolution.
//!
//! Resolves the camera for one timestamp from either a dense path or the
//! segment's manual keyframes, then applies the influence curve.

use std::borrow::Cow;
use std::f64::consts::PI;

use flowcam_common::clock::FrameClock;
use flowcam_project_model::camera::CameraState;
use flowcam_project_model::segment::{InfluencePoint, VideoSegment, ZoomKeyframe};

/// Longest keyframe gap that is eased across; longer gaps hold first.
pub const KEYFRAME_TRANSITION_SECS: f64 = 1.0;

/// Resolve the camera at `time`.
///
/// With a non-empty `dense_path` the bracketing samples are interpolated;
/// otherwise the segment keyframes are used. Influence points, if any, scale
/// the deviation from the neutral camera.
pub fn resolve_camera_state(
    segment: &VideoSegment,
    dense_path: Option<&[CameraState]>,
    time: f64,
) -> CameraState {
    let state = match dense_path {
        Some(path) if !path.is_empty() => interpolate_path(path, time),
        _ => resolve_keyframes(&segment.zoom_keyframes, time),
    };

    if segment.zoom_influence_points.is_empty() {
        state.clamped()
    } else {
        state.with_influence(influence_at(&segment.zoom_influence_points, time))
    }
}

/// Linear interpolation between the samples of a time-ordered path.
///
/// Holds the first/last sample outside the path; an empty path yields the
/// identity camera.
pub fn interpolate_path(path: &[CameraState], time: f64) -> CameraState {
    let (first, last) = match (path.first(), path.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return CameraState::identity(time),
    };

    if time <= first.time {
        return CameraState { time, ..*first };
    }
    if time >= last.time {
        return CameraState { time, ..*last };
    }

    let idx = path.partition_point(|s| s.time <= time);
    let a = &path[idx - 1];
    let b = &path[idx];
    let span = b.time - a.time;
    if span <= f64::EPSILON {
        return CameraState { time, ..*b };
    }
    CameraState::lerp(a, b, (time - a.time) / span, time)
}

/// Resolve the camera from manual keyframes alone.
///
/// Before the first keyframe the camera is neutral. Between two keyframes
/// the previous one is held; the final `KEYFRAME_TRANSITION_SECS` before the
/// next keyframe (or the whole gap, when shorter) ease toward it using the
/// next keyframe's easing.
///
/// Keyframes are expected in time order, as left by
/// [`VideoSegment::normalize`]; an unordered slice is sorted into a copy.
pub fn resolve_keyframes(keyframes: &[ZoomKeyframe], time: f64) -> CameraState {
    let ordered: Cow<'_, [ZoomKeyframe]> = if is_time_ordered(keyframes) {
        Cow::Borrowed(keyframes)
    } else {
        let mut sorted = keyframes.to_vec();
        sorted.sort_by(|a, b| a.time.total_cmp(&b.time));
        Cow::Owned(sorted)
    };

    let idx = ordered.partition_point(|kf| kf.time <= time);
    if idx == 0 {
        return CameraState::identity(time);
    }

    let prev = ordered[idx - 1].camera_state();
    let Some(next_kf) = ordered.get(idx) else {
        return CameraState { time, ..prev };
    };
    let next = next_kf.camera_state();

    let gap = next.time - prev.time;
    let transition = gap.min(KEYFRAME_TRANSITION_SECS);
    let transition_start = next.time - transition;
    if transition <= f64::EPSILON || time < transition_start {
        return CameraState { time, ..prev };
    }

    let progress = (time - transition_start) / transition;
    CameraState::lerp(&prev, &next, next_kf.easing.apply(progress), time)
}

fn is_time_ordered(keyframes: &[ZoomKeyframe]) -> bool {
    keyframes.windows(2).all(|w| w[0].time <= w[1].time)
}

/// Influence at `time`, cosine-eased between points.
///
/// Returns 1.0 (full automatic framing) when there are no points.
pub fn influence_at(points: &[InfluencePoint], time: f64) -> f64 {
    let (first, last) = match (points.first(), points.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return 1.0,
    };

    if time <= first.time {
        return first.value.clamp(0.0, 1.0);
    }
    if time >= last.time {
        return last.value.clamp(0.0, 1.0);
    }

    let idx = points.partition_point(|p| p.time <= time);
    let a = &points[idx - 1];
    let b = &points[idx];
    let span = b.time - a.time;
    if span <= f64::EPSILON {
        return b.value.clamp(0.0, 1.0);
    }

    let progress = (time - a.time) / span;
    let eased = (1.0 - (PI * progress).cos()) / 2.0;
    (a.value + (b.value - a.value) * eased).clamp(0.0, 1.0)
}

/// Resolve the camera at every export timestamp of the segment.
///
/// Uses the same virtual time base as the export driver, so two calls with
/// the same inputs produce identical sequences.
pub fn sample_camera_states(
    segment: &VideoSegment,
    dense_path: Option<&[CameraState]>,
    fps: u32,
) -> Vec<CameraState> {
    let Some(clock) = FrameClock::new(segment.trim_start, segment.trim_end, fps, segment.speed)
    else {
        return vec![];
    };
    clock
        .frames()
        .map(|(_, t)| resolve_camera_state(segment, dense_path, t))
        .collect()
}
