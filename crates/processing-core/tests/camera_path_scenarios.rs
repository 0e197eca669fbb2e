use flowcam_processing_core::camera_path::{CameraPath, CameraPathConfig, CameraPathGenerator};
use flowcam_processing_core::camera_resolve::{resolve_camera_state, sample_camera_states};
use flowcam_processing_core::cursor_smooth::{CursorSmoothConfig, CursorSmoother};
use flowcam_processing_core::telemetry::TelemetrySampler;
use flowcam_project_model::camera::{MAX_ZOOM_BOUND, MIN_ZOOM_BOUND};
use flowcam_project_model::event::PointerSample;
use flowcam_project_model::segment::{InfluencePoint, VideoSegment, ZoomKeyframe};
use proptest::prelude::*;

fn still_trace(duration: f64, click_at: Option<f64>) -> Vec<PointerSample> {
    (0..=(duration * 10.0).round() as usize)
        .map(|i| {
            let t = i as f64 * 0.1;
            let sample = PointerSample::new(t, 960.0, 540.0);
            match click_at {
                Some(c) if (c - t).abs() < 1e-9 => sample.clicked(),
                _ => sample,
            }
        })
        .collect()
}

fn generate(samples: Vec<PointerSample>, segment: &VideoSegment) -> CameraPath {
    let sampler = TelemetrySampler::new(samples, 1920, 1080);
    CameraPathGenerator::with_defaults()
        .generate(&sampler, segment)
        .expect("trace has motion")
}

#[test]
fn velocity_penalty_pulls_zoom_down_then_recovers() {
    let segment = VideoSegment::new(0.0, 2.0);
    let path = generate(
        vec![
            PointerSample::new(0.0, 0.0, 0.0),
            PointerSample::new(2.0, 1000.0, 0.0),
        ],
        &segment,
    );

    let early: Vec<f64> = path
        .states
        .iter()
        .filter(|s| s.time <= 1.6)
        .map(|s| s.zoom_factor)
        .collect();
    assert!(early[0] > 1.35, "starts near base zoom, got {}", early[0]);
    for pair in early.windows(2) {
        assert!(pair[1] <= pair[0] + 1e-9, "zoom rose from {} to {}", pair[0], pair[1]);
    }

    let (lowest, _) = path.zoom_range().unwrap();
    assert!(lowest < 1.05, "expected zoom near minimum, got {lowest}");

    let last = path.states.last().unwrap().zoom_factor;
    assert!(last > lowest + 0.02, "zoom should recover as velocity subsides");
}

#[test]
fn velocity_penalty_overrides_high_base_zoom() {
    let segment = VideoSegment::new(0.0, 1.9);
    let sampler = TelemetrySampler::new(
        vec![
            PointerSample::new(0.0, 0.0, 540.0),
            PointerSample::new(1.9, 1900.0, 540.0),
        ],
        1920,
        1080,
    );
    let generator = CameraPathGenerator::new(CameraPathConfig {
        base_zoom: 2.0,
        ..Default::default()
    });
    let path = generator.generate(&sampler, &segment).unwrap();
    let zoom = path.state_at(1.0).unwrap().zoom_factor;
    assert!(zoom < 1.05, "fast pointer should drive zoom to minimum, got {zoom}");
}

#[test]
fn click_focus_raises_zoom_near_click() {
    let segment = VideoSegment::new(0.0, 2.0);
    let clicked = generate(still_trace(2.0, Some(1.0)), &segment);
    let unclicked = generate(still_trace(2.0, None), &segment);

    let with_click = clicked.state_at(1.0).unwrap().zoom_factor;
    let without = unclicked.state_at(1.0).unwrap().zoom_factor;
    assert!(with_click >= 1.7, "zoom at click was {with_click}");
    assert!(with_click > without + 0.2);
}

#[test]
fn dwell_converges_to_max_zoom() {
    let segment = VideoSegment::new(0.0, 4.0);
    let path = generate(still_trace(4.0, None), &segment);
    let max_zoom = CameraPathConfig::default().max_zoom;
    let last = path.states.last().unwrap();
    assert!(
        (last.zoom_factor - max_zoom).abs() < 0.01,
        "expected {max_zoom}, got {}",
        last.zoom_factor
    );
}

#[test]
fn slow_drag_never_counts_as_dwell() {
    let segment = VideoSegment::new(0.0, 4.0);
    let samples = (0..=40)
        .map(|i| {
            let t = i as f64 * 0.1;
            PointerSample::new(t, 780.0 + 90.0 * t, 540.0)
        })
        .collect();
    let path = generate(samples, &segment);
    let click_zoom = CameraPathConfig::default().click_zoom;

    let (_, highest) = path.zoom_range().unwrap();
    assert!(highest < click_zoom, "drag reached zoom {highest}");
    assert!(path.state_at(3.9).unwrap().zoom_factor < click_zoom);
}

#[test]
fn keyframe_magnetism_is_continuous() {
    let mut segment = VideoSegment::new(0.0, 4.0);
    segment.zoom_keyframes = vec![ZoomKeyframe::new(2.0, 2.0, 0.3, 0.3)];
    let path = generate(still_trace(4.0, None), &segment);

    for pair in path.states.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!((b.zoom_factor - a.zoom_factor).abs() < 0.05, "zoom jump at {}", b.time);
        assert!((b.position_x - a.position_x).abs() < 0.05, "pan jump at {}", b.time);
        assert!((b.position_y - a.position_y).abs() < 0.05, "pan jump at {}", b.time);
    }

    let pinned = path.state_at(2.0).unwrap();
    assert!(pinned.position_x < 0.4);
    assert!((pinned.zoom_factor - 2.0).abs() < 0.2);
}

#[test]
fn identical_inputs_give_identical_paths() {
    let mut segment = VideoSegment::new(0.0, 3.0);
    segment.zoom_keyframes = vec![ZoomKeyframe::new(1.5, 1.8, 0.4, 0.6)];
    segment.zoom_influence_points = vec![
        InfluencePoint { time: 0.0, value: 1.0 },
        InfluencePoint { time: 3.0, value: 0.2 },
    ];
    let trace = vec![
        PointerSample::new(0.0, 100.0, 100.0),
        PointerSample::new(1.0, 900.0, 300.0).clicked(),
        PointerSample::new(3.0, 1500.0, 900.0),
    ];

    let a = generate(trace.clone(), &segment);
    let b = generate(trace, &segment);
    assert_eq!(a, b);

    let frames_a = sample_camera_states(&segment, Some(a.states.as_slice()), 30);
    let frames_b = sample_camera_states(&segment, Some(b.states.as_slice()), 30);
    assert_eq!(frames_a.len(), 90);
    assert_eq!(frames_a, frames_b);
}

#[test]
fn motion_path_survives_segment_json() {
    let mut segment = VideoSegment::new(0.0, 1.0);
    let path = generate(still_trace(1.0, Some(0.5)), &segment);
    segment.smooth_motion_path = Some(path.to_motion_points());

    let json = serde_json::to_string(&segment).unwrap();
    let parsed: VideoSegment = serde_json::from_str(&json).unwrap();
    let rebuilt = CameraPath::from_motion_points(parsed.smooth_motion_path.as_deref().unwrap());

    assert_eq!(rebuilt.len(), path.len());
    for (a, b) in rebuilt.states.iter().zip(&path.states) {
        assert!((a.zoom_factor - b.zoom_factor).abs() < 1e-9);
        assert!((a.position_x - b.position_x).abs() < 1e-9);
    }
}

#[test]
fn smoother_is_idempotent_on_dense_linear_trace() {
    let trace: Vec<PointerSample> = (0..=240)
        .map(|i| {
            let t = i as f64 / 120.0;
            PointerSample::new(t, 100.0 + 300.0 * t, 200.0 + 150.0 * t)
        })
        .collect();

    let smoothed = CursorSmoother::new(CursorSmoothConfig::from_smoothness(0.5)).smooth(&trace);
    for sample in &trace {
        let resolved = smoothed.resolve_position(sample.timestamp).unwrap();
        assert!((resolved.x - sample.x).abs() < 1e-6, "x drift at {}", sample.timestamp);
        assert!((resolved.y - sample.y).abs() < 1e-6, "y drift at {}", sample.timestamp);
    }

    let between = smoothed.resolve_position(0.5 + 1.0 / 240.0).unwrap();
    assert!((between.x - (100.0 + 300.0 * (0.5 + 1.0 / 240.0))).abs() < 1e-6);
}

fn arb_trace() -> impl Strategy<Value = Vec<PointerSample>> {
    prop::collection::vec(
        (0.01f64..0.5, 0.0f64..1920.0, 0.0f64..1080.0, any::<bool>()),
        2..40,
    )
    .prop_map(|steps| {
        let mut t = 0.0;
        steps
            .into_iter()
            .map(|(dt, x, y, click)| {
                t += dt;
                let sample = PointerSample::new(t, x, y);
                if click {
                    sample.clicked()
                } else {
                    sample
                }
            })
            .collect()
    })
}

fn arb_keyframes() -> impl Strategy<Value = Vec<ZoomKeyframe>> {
    prop::collection::vec(
        (0.0f64..5.0, 0.5f64..8.0, -0.5f64..1.5, -0.5f64..1.5),
        0..4,
    )
    .prop_map(|kfs| {
        kfs.into_iter()
            .map(|(t, z, x, y)| ZoomKeyframe::new(t, z, x, y))
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn generated_states_stay_in_bounds(trace in arb_trace(), keyframes in arb_keyframes()) {
        let end = trace.last().map(|s| s.timestamp).unwrap_or(1.0).max(0.5);
        let mut segment = VideoSegment::new(0.0, end);
        segment.zoom_keyframes = keyframes;

        let sampler = TelemetrySampler::new(trace, 1920, 1080);
        let path = CameraPathGenerator::with_defaults().generate(&sampler, &segment).unwrap();

        for state in &path.states {
            prop_assert!(state.zoom_factor >= MIN_ZOOM_BOUND && state.zoom_factor <= MAX_ZOOM_BOUND);
            prop_assert!(state.viewport().is_within_frame(), "viewport out of frame: {:?}", state);
        }
    }

    #[test]
    fn resolved_states_stay_in_bounds(
        keyframes in arb_keyframes(),
        influence in prop::collection::vec((0.0f64..5.0, -0.5f64..1.5), 0..4),
        t in -1.0f64..6.0,
    ) {
        let mut segment = VideoSegment::new(0.0, 5.0);
        segment.zoom_keyframes = keyframes;
        segment.zoom_influence_points = influence
            .into_iter()
            .map(|(time, value)| InfluencePoint { time, value })
            .collect();
        segment.normalize();

        let state = resolve_camera_state(&segment, None, t);
        prop_assert!(state.zoom_factor >= MIN_ZOOM_BOUND && state.zoom_factor <= MAX_ZOOM_BOUND);
        prop_assert!(state.viewport().is_within_frame());
    }
}
