use std::net::TcpListener;
use std::thread::JoinHandle;
use std::time::Duration;

use tungstenite::Message;

use dotspot::detect::{DetectorMode, RemoteBackend, RemoteSettings, ScriptedBackend, WsLink};
use dotspot::{
    BoundingBox, CueCurve, Detection, DetectorBackend, DetectorSet, DwellSettings, EngineSettings,
    FeedbackRecorder, Frame, Pipeline, PipelineSettings, SchedulerSettings,
};

const WAIT: Duration = Duration::from_secs(5);

const CUP_RESPONSE: &str = r#"{
    "detections": [
        {"label": "cup", "confidence": 0.91, "x": 0.4, "y": 0.4, "width": 0.2, "height": 0.2},
        {"label": "person", "confidence": 0.05, "x": 0.0, "y": 0.0, "width": 0.5, "height": 0.9}
    ],
    "inference_time_ms": 12.5
}"#;

/// Loopback WebSocket detection server. Answers up to `limit` binary requests on
/// the first connection with `body` as a text message, then drops the socket.
/// Returns the number served.
fn spawn_server(body: &'static str, limit: usize) -> (String, JoinHandle<usize>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = format!("ws://{}", listener.local_addr().expect("addr"));
    let handle = std::thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let mut socket = tungstenite::accept(stream).expect("handshake");
        let mut served = 0;
        while served < limit {
            let request = match socket.read() {
                Ok(Message::Binary(bytes)) => bytes,
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
                _ => break,
            };
            // Requests are JPEG images.
            assert_eq!(&request[..2], &[0xFF, 0xD8]);
            if socket.send(Message::Text(body.to_string())).is_err() {
                break;
            }
            served += 1;
        }
        served
    });
    (addr, handle)
}

fn frame() -> Frame {
    Frame::solid(16, 12, [120, 80, 40]).expect("frame")
}

fn unreachable_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("addr").to_string()
}

fn pipeline_settings() -> PipelineSettings {
    PipelineSettings {
        engine: EngineSettings {
            dwell: DwellSettings { required_secs: 0.4 },
            ..EngineSettings::default()
        },
        scheduler: SchedulerSettings {
            camera_fps: 5.0,
            detect_every: 1,
        },
        cue_curve: CueCurve::RampUp,
        local_enabled: true,
    }
}

#[test]
fn remote_backend_round_trip() {
    let (addr, server) = spawn_server(CUP_RESPONSE, 1);
    let mut backend = RemoteBackend::new(WsLink::new(addr), RemoteSettings::default());

    // The low-confidence person is filtered out.
    let detections = backend.detect(&frame()).unwrap();
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].label, "cup");
    assert_eq!(detections[0].confidence, 0.91);
    assert!((detections[0].bbox.x - 0.4).abs() < 1e-6);
    assert!((detections[0].bbox.width - 0.2).abs() < 1e-6);
    assert_eq!(backend.last_server_ms(), Some(12.5));
    assert!(backend.connection_status().unwrap().is_connected());
    drop(backend);
    assert_eq!(server.join().unwrap(), 1);
}

#[test]
fn server_going_away_resolves_empty() {
    let (addr, server) = spawn_server(CUP_RESPONSE, 1);
    let mut backend = RemoteBackend::new(
        WsLink::new(addr).with_io_timeout(Duration::from_secs(2)),
        RemoteSettings::default(),
    );
    assert_eq!(backend.detect(&frame()).unwrap().len(), 1);
    assert_eq!(server.join().unwrap(), 1);

    let detections = backend.detect(&frame()).unwrap();
    assert!(detections.is_empty());
    assert!(!backend.connection_status().unwrap().is_connected());
}

#[test]
fn malformed_response_resolves_empty() {
    let (addr, server) = spawn_server("not json", 1);
    let mut backend = RemoteBackend::new(WsLink::new(addr), RemoteSettings::default());
    assert!(backend.detect(&frame()).unwrap().is_empty());
    drop(backend);
    server.join().unwrap();
}

#[test]
fn bare_host_port_address_connects() {
    let (addr, server) = spawn_server(CUP_RESPONSE, 1);
    let bare = addr.trim_start_matches("ws://").to_string();
    let mut backend = RemoteBackend::new(WsLink::new(bare), RemoteSettings::default());
    assert_eq!(backend.detect(&frame()).unwrap().len(), 1);
    drop(backend);
    assert_eq!(server.join().unwrap(), 1);
}

#[test]
fn unreachable_server_resolves_empty() {
    let mut backend = RemoteBackend::new(
        WsLink::new(unreachable_addr()).with_io_timeout(Duration::from_secs(1)),
        RemoteSettings::default(),
    );
    assert!(backend.detect(&frame()).unwrap().is_empty());
    assert!(!backend.connection_status().unwrap().is_connected());
}

#[test]
fn pipeline_announces_from_remote_detections() {
    let (addr, server) = spawn_server(CUP_RESPONSE, usize::MAX);
    let recorder = FeedbackRecorder::new();
    let detectors = DetectorSet::new().with_remote(RemoteBackend::new(
        WsLink::new(addr),
        RemoteSettings::default(),
    ));
    let mut pipeline = Pipeline::new(
        &pipeline_settings(),
        detectors,
        Box::new(recorder.clone()),
        Box::new(recorder.clone()),
    )
    .unwrap();

    for _ in 0..4 {
        pipeline.on_frame(frame());
        pipeline.wait_for_detection(WAIT);
    }
    assert_eq!(recorder.spoken(), vec!["cup".to_string()]);
    assert_eq!(pipeline.telemetry().mode, Some(DetectorMode::Remote));

    drop(pipeline);
    assert!(server.join().unwrap() >= 3);
}

#[test]
fn local_detector_serves_while_remote_is_down() {
    let local = ScriptedBackend::new().repeating(vec![Detection::new(
        "book",
        0.7,
        BoundingBox::from_center(0.5, 0.5, 0.4, 0.4),
    )]);
    let detectors = DetectorSet::new()
        .with_remote(RemoteBackend::new(
            WsLink::new(unreachable_addr()).with_io_timeout(Duration::from_secs(1)),
            RemoteSettings::default(),
        ))
        .with_local(local);
    let recorder = FeedbackRecorder::new();
    let mut pipeline = Pipeline::new(
        &pipeline_settings(),
        detectors,
        Box::new(recorder.clone()),
        Box::new(recorder.clone()),
    )
    .unwrap();

    for _ in 0..4 {
        pipeline.on_frame(frame());
        pipeline.wait_for_detection(WAIT);
    }
    assert_eq!(pipeline.telemetry().mode, Some(DetectorMode::Local));
    assert_eq!(recorder.spoken(), vec!["book".to_string()]);
}
