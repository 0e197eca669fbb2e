//! Pointer telemetry sampling.
//!
//! Turns a sparse, irregularly-timed stream of [`PointerSample`]s into a
//! continuous signal that the camera simulation can query at any instant.

use flowcam_project_model::camera::Point2D;
use flowcam_project_model::event::{ingest_mouse_positions, MousePosition, PointerSample};
use flowcam_project_model::segment::PixelRect;

/// Half-width of the finite-difference window used by [`TelemetrySampler::velocity`].
pub const VELOCITY_HALF_WINDOW_SECS: f64 = 0.1;

/// Queryable view over recorded pointer samples.
#[derive(Debug, Clone)]
pub struct TelemetrySampler {
    samples: Vec<PointerSample>,
    clicks: Vec<f64>,
    frame_width: u32,
    frame_height: u32,
}

impl TelemetrySampler {
    /// Build a sampler over samples recorded on a `frame_width × frame_height` source.
    ///
    /// Samples are stably sorted by timestamp; duplicates are kept.
    pub fn new(mut samples: Vec<PointerSample>, frame_width: u32, frame_height: u32) -> Self {
        samples.retain(|s| s.timestamp.is_finite() && s.x.is_finite() && s.y.is_finite());
        samples.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        let clicks = samples
            .iter()
            .filter(|s| s.is_clicked)
            .map(|s| s.timestamp)
            .collect();
        Self {
            samples,
            clicks,
            frame_width: frame_width.max(1),
            frame_height: frame_height.max(1),
        }
    }

    /// Build a sampler straight from editor mouse positions.
    pub fn from_mouse_positions(
        positions: &[MousePosition],
        frame_width: u32,
        frame_height: u32,
    ) -> Self {
        Self::new(ingest_mouse_positions(positions), frame_width, frame_height)
    }

    pub fn samples(&self) -> &[PointerSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Whether there is enough data to drive camera motion.
    pub fn has_motion(&self) -> bool {
        self.samples.len() >= 2
    }

    /// Source frame size in pixels.
    pub fn frame_size(&self) -> (u32, u32) {
        (self.frame_width, self.frame_height)
    }

    /// Pointer position at `time` in source pixels.
    ///
    /// Linearly interpolates between the bracketing samples and holds the
    /// first/last sample outside the recorded range. With no samples at all
    /// the frame center is returned.
    pub fn sample(&self, time: f64) -> Point2D {
        let (first, last) = match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                return Point2D::new(
                    self.frame_width as f64 / 2.0,
                    self.frame_height as f64 / 2.0,
                )
            }
        };

        if time <= first.timestamp {
            return Point2D::new(first.x, first.y);
        }
        if time >= last.timestamp {
            return Point2D::new(last.x, last.y);
        }

        // First sample strictly after `time`; both neighbours exist here.
        let idx = self.samples.partition_point(|s| s.timestamp <= time);
        let a = &self.samples[idx - 1];
        let b = &self.samples[idx];

        let span = b.timestamp - a.timestamp;
        if span <= f64::EPSILON {
            return Point2D::new(b.x, b.y);
        }

        let t = (time - a.timestamp) / span;
        Point2D::lerp(&Point2D::new(a.x, a.y), &Point2D::new(b.x, b.y), t)
    }

    /// Instantaneous pointer speed at `time` in pixels per second.
    ///
    /// Symmetric finite difference over `±VELOCITY_HALF_WINDOW_SECS`.
    pub fn velocity(&self, time: f64) -> f64 {
        if !self.has_motion() {
            return 0.0;
        }
        let h = VELOCITY_HALF_WINDOW_SECS;
        let before = self.sample(time - h);
        let after = self.sample(time + h);
        before.distance_to(&after) / (2.0 * h)
    }

    /// Whether any recorded click falls within a `window`-wide span centered on `time`.
    pub fn is_click_near(&self, time: f64, window: f64) -> bool {
        let half = window.abs() / 2.0;
        let idx = self.clicks.partition_point(|&c| c < time - half);
        self.clicks.get(idx).is_some_and(|&c| c <= time + half)
    }

    /// Pointer position at `time`, normalized to `[0, 1]²` inside `crop`.
    pub fn normalized(&self, time: f64, crop: &PixelRect) -> Point2D {
        let p = self.sample(time);
        let w = crop.width.max(1) as f64;
        let h = crop.height.max(1) as f64;
        Point2D::new(
            ((p.x - crop.x as f64) / w).clamp(0.0, 1.0),
            ((p.y - crop.y as f64) / h).clamp(0.0, 1.0),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_sampler() -> TelemetrySampler {
        TelemetrySampler::new(
            vec![
                PointerSample::new(0.0, 0.0, 0.0),
                PointerSample::new(2.0, 1000.0, 0.0),
            ],
            1920,
            1080,
        )
    }

    #[test]
    fn test_sample_interpolates_and_clamps() {
        let sampler = line_sampler();
        assert!((sampler.sample(1.0).x - 500.0).abs() < 1e-9);
        assert_eq!(sampler.sample(-1.0).x, 0.0);
        assert_eq!(sampler.sample(5.0).x, 1000.0);
    }

    #[test]
    fn test_sample_never_fails_on_sparse_input() {
        let empty = TelemetrySampler::new(vec![], 1920, 1080);
        assert!(!empty.has_motion());
        assert_eq!(empty.sample(1.0), Point2D::new(960.0, 540.0));
        assert_eq!(empty.velocity(1.0), 0.0);

        let single = TelemetrySampler::new(vec![PointerSample::new(1.0, 5.0, 6.0)], 100, 100);
        assert!(!single.has_motion());
        assert_eq!(single.sample(0.0), Point2D::new(5.0, 6.0));
    }

    #[test]
    fn test_duplicate_timestamps_take_later_sample() {
        let sampler = TelemetrySampler::new(
            vec![
                PointerSample::new(0.0, 0.0, 0.0),
                PointerSample::new(1.0, 10.0, 0.0),
                PointerSample::new(1.0, 20.0, 0.0),
                PointerSample::new(2.0, 20.0, 0.0),
            ],
            100,
            100,
        );
        assert!((sampler.sample(1.5).x - 20.0).abs() < 1e-9);
        assert!((sampler.sample(0.5).x - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_velocity_symmetric_difference() {
        let sampler = line_sampler();
        assert!((sampler.velocity(1.0) - 500.0).abs() < 1e-6);
        // Half the window lies past the last sample.
        assert!((sampler.velocity(2.0) - 250.0).abs() < 1e-6);
        assert!(sampler.velocity(3.0).abs() < 1e-9);
    }

    #[test]
    fn test_click_window_is_centered() {
        let sampler = TelemetrySampler::new(
            vec![
                PointerSample::new(0.0, 0.0, 0.0),
                PointerSample::new(1.0, 0.0, 0.0).clicked(),
                PointerSample::new(2.0, 0.0, 0.0),
            ],
            100,
            100,
        );
        assert!(sampler.is_click_near(1.0, 0.5));
        assert!(sampler.is_click_near(0.8, 0.5));
        assert!(sampler.is_click_near(1.25, 0.5));
        assert!(!sampler.is_click_near(0.7, 0.5));
        assert!(!sampler.is_click_near(1.3, 0.5));
    }

    #[test]
    fn test_normalized_respects_crop() {
        let sampler = TelemetrySampler::new(vec![PointerSample::new(0.0, 1440.0, 270.0)], 1920, 1080);
        let crop = PixelRect {
            x: 960,
            y: 0,
            width: 960,
            height: 540,
        };
        let p = sampler.normalized(0.0, &crop);
        assert!((p.x - 0.5).abs() < 1e-9);
        assert!((p.y - 0.5).abs() < 1e-9);

        let outside = sampler.normalized(0.0, &PixelRect { x: 0, y: 0, width: 100, height: 100 });
        assert_eq!(outside, Point2D::new(1.0, 1.0));
    }
}
