use std::time::Duration;

use dotspot::detect::ScriptedBackend;
use dotspot::feedback::FeedbackCall;
use dotspot::{
    BoundingBox, CueCurve, Detection, DetectorSet, DwellPhase, DwellSettings, EngineSettings,
    FeedbackRecorder, Frame, Pipeline, PipelineSettings, PipelineSnapshot, SchedulerSettings,
};

const WAIT: Duration = Duration::from_secs(5);

fn settings(required_secs: f32, camera_fps: f32, detect_every: u32) -> PipelineSettings {
    PipelineSettings {
        engine: EngineSettings {
            dwell: DwellSettings { required_secs },
            ..EngineSettings::default()
        },
        scheduler: SchedulerSettings {
            camera_fps,
            detect_every,
        },
        cue_curve: CueCurve::FadeOut,
        local_enabled: true,
    }
}

fn start(settings: &PipelineSettings, backend: ScriptedBackend) -> (Pipeline, FeedbackRecorder) {
    let recorder = FeedbackRecorder::new();
    let pipeline = Pipeline::new(
        settings,
        DetectorSet::new().with_local(backend),
        Box::new(recorder.clone()),
        Box::new(recorder.clone()),
    )
    .expect("pipeline");
    (pipeline, recorder)
}

fn frame() -> Frame {
    Frame::solid(8, 6, [40, 40, 40]).expect("frame")
}

/// One camera frame, then wait for the detection it may have dispatched.
fn step(pipeline: &mut Pipeline) -> PipelineSnapshot {
    let snapshot = pipeline.on_frame(frame());
    pipeline.wait_for_detection(WAIT);
    snapshot
}

fn cup() -> Detection {
    Detection::new("cup", 0.9, BoundingBox::from_center(0.5, 0.5, 0.2, 0.2))
}

#[test]
fn cup_under_aim_is_announced_once() {
    // 5 fps, detection every frame, 1 s dwell: announced on the fifth cycle.
    let backend = ScriptedBackend::new().repeating(vec![cup()]);
    let (mut pipeline, recorder) = start(&settings(1.0, 5.0, 1), backend);

    // Frame 1 only dispatches; frames 2..=5 apply cycles 1..=4.
    for _ in 0..5 {
        step(&mut pipeline);
    }
    assert!(recorder.spoken().is_empty());

    let snapshot = step(&mut pipeline);
    assert_eq!(recorder.spoken(), vec!["cup".to_string()]);
    assert_eq!(snapshot.phase, DwellPhase::Announced);
    assert_eq!(snapshot.dwell_progress, 1.0);
    assert!(snapshot.objects[0].announced);
    assert!(snapshot.objects[0].is_target);

    for _ in 0..10 {
        step(&mut pipeline);
    }
    assert_eq!(recorder.spoken(), vec!["cup".to_string()]);
    let cues = recorder
        .calls()
        .into_iter()
        .filter(|c| *c == FeedbackCall::AnnouncementCue)
        .count();
    assert_eq!(cues, 1);
}

#[test]
fn continuous_cue_follows_dwell_progress() {
    let backend = ScriptedBackend::new().repeating(vec![cup()]);
    let (mut pipeline, recorder) = start(&settings(1.0, 5.0, 1), backend);
    for _ in 0..3 {
        step(&mut pipeline);
    }
    let intensities: Vec<f32> = recorder
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            FeedbackCall::Continuous(i) => Some(i),
            _ => None,
        })
        .collect();
    // Acquired (full volume), then fading as dwell accumulates.
    assert_eq!(intensities.len(), 2);
    assert_eq!(intensities[0], 1.0);
    assert!(intensities[1] < 1.0);
}

#[test]
fn missing_object_is_evicted_after_six_empty_cycles() {
    let backend = ScriptedBackend::new();
    backend.script().push(vec![cup()]).unwrap();
    let (mut pipeline, recorder) = start(&settings(10.0, 5.0, 1), backend);

    step(&mut pipeline);
    let snapshot = step(&mut pipeline);
    let id = snapshot.target.expect("cup acquired");

    // Five empty cycles keep the object and the target.
    for _ in 0..5 {
        let snapshot = step(&mut pipeline);
        assert_eq!(snapshot.objects.len(), 1);
        assert_eq!(snapshot.target, Some(id));
    }

    let snapshot = step(&mut pipeline);
    assert!(snapshot.objects.is_empty());
    assert_eq!(snapshot.target, None);
    assert_eq!(snapshot.phase, DwellPhase::Idle);
    assert_eq!(recorder.calls().last(), Some(&FeedbackCall::Stop));
    assert!(recorder.spoken().is_empty());
}

#[test]
fn labels_are_spoken_with_spaces() {
    let phone = Detection::new(
        "cell_phone",
        0.8,
        BoundingBox::from_center(0.5, 0.5, 0.3, 0.4),
    );
    let backend = ScriptedBackend::new().repeating(vec![phone]);
    let (mut pipeline, recorder) = start(&settings(0.4, 5.0, 1), backend);
    for _ in 0..4 {
        step(&mut pipeline);
    }
    assert_eq!(recorder.spoken(), vec!["cell phone".to_string()]);
}

#[test]
fn disabling_discards_in_flight_results() {
    let backend = ScriptedBackend::new()
        .repeating(vec![cup()])
        .with_latency(Duration::from_millis(30));
    let (mut pipeline, recorder) = start(&settings(1.0, 5.0, 1), backend);

    pipeline.on_frame(frame());
    pipeline.set_enabled(false);
    assert!(pipeline.wait_for_detection(WAIT));

    let snapshot = pipeline.on_frame(frame());
    assert!(!snapshot.enabled);
    assert!(snapshot.objects.is_empty());
    assert_eq!(snapshot.telemetry.stale_results, 1);
    assert_eq!(snapshot.telemetry.completed_cycles, 0);

    pipeline.set_enabled(true);
    step(&mut pipeline);
    let snapshot = step(&mut pipeline);
    assert_eq!(snapshot.objects.len(), 1);
    assert!(snapshot.target.is_some());
    assert!(recorder.spoken().is_empty());
}

#[test]
fn reset_allows_the_same_object_to_be_announced_again() {
    let backend = ScriptedBackend::new().repeating(vec![cup()]);
    let (mut pipeline, recorder) = start(&settings(0.4, 5.0, 1), backend);
    for _ in 0..3 {
        step(&mut pipeline);
    }
    assert_eq!(recorder.spoken().len(), 1);

    pipeline.reset();
    assert!(pipeline.snapshot().objects.is_empty());
    for _ in 0..4 {
        step(&mut pipeline);
    }
    assert_eq!(recorder.spoken(), vec!["cup".to_string(), "cup".to_string()]);
    assert!(pipeline.telemetry().stale_results >= 1);
}

#[test]
fn busy_detector_drops_due_frames() {
    let backend = ScriptedBackend::new()
        .repeating(vec![cup()])
        .with_latency(Duration::from_millis(100));
    let (mut pipeline, _recorder) = start(&settings(1.0, 30.0, 1), backend);

    pipeline.on_frame(frame());
    let snapshot = pipeline.on_frame(frame());
    assert_eq!(snapshot.telemetry.dropped_frames, 1);

    assert!(pipeline.wait_for_detection(WAIT));
    let snapshot = pipeline.on_frame(frame());
    assert_eq!(snapshot.objects.len(), 1);
    assert_eq!(snapshot.telemetry.completed_cycles, 1);
}

#[test]
fn detection_runs_on_every_nth_frame() {
    let backend = ScriptedBackend::new().repeating(vec![cup()]);
    let script = backend.script();
    let (mut pipeline, _recorder) = start(&settings(1.0, 30.0, 3), backend);
    for _ in 0..9 {
        step(&mut pipeline);
    }
    assert_eq!(script.served(), 3);
}

#[test]
fn dwell_advances_between_detection_cycles() {
    let backend = ScriptedBackend::new().repeating(vec![cup()]);
    let (mut pipeline, _recorder) = start(&settings(1.0, 10.0, 3), backend);
    let dispatched = step(&mut pipeline);
    assert!(dispatched.target.is_none());

    // Frame 2 applies the first cycle; frame 3 is not a detection frame.
    let first = step(&mut pipeline);
    assert!(first.target.is_some());
    let later = step(&mut pipeline);
    assert!(later.dwell_progress > first.dwell_progress);
    assert_eq!(later.telemetry.completed_cycles, 1);
}

#[test]
fn pipeline_without_detectors_stays_idle() {
    let recorder = FeedbackRecorder::new();
    let mut pipeline = Pipeline::new(
        &settings(1.0, 5.0, 1),
        DetectorSet::new(),
        Box::new(recorder.clone()),
        Box::new(recorder.clone()),
    )
    .unwrap();
    for _ in 0..4 {
        let snapshot = step(&mut pipeline);
        assert!(snapshot.objects.is_empty());
        assert_eq!(snapshot.telemetry.mode, None);
    }
    assert!(recorder.calls().is_empty());
}

#[test]
fn object_age_counts_every_frame_since_first_tracked() {
    let backend = ScriptedBackend::new().repeating(vec![cup()]);
    let (mut pipeline, _recorder) = start(&settings(5.0, 10.0, 3), backend);
    step(&mut pipeline);

    // Created on frame 2, then aged by each later frame, detection cycle or not.
    let mut ages = Vec::new();
    for _ in 0..4 {
        let snapshot = step(&mut pipeline);
        assert_eq!(snapshot.objects.len(), 1);
        ages.push(snapshot.objects[0].age_secs);
    }
    for (age, expected) in ages.iter().zip([0.0, 0.1, 0.2, 0.3]) {
        assert!((age - expected).abs() < 1e-4, "ages {:?}", ages);
    }
}
