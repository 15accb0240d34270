//! dotspot - pointing assistant demo loop
//!
//! This binary:
//! 1. Loads configuration (file, env overrides, CLI flags)
//! 2. Registers the remote detector and/or a local one
//! 3. Feeds a synthetic camera stream through the pointing pipeline
//! 4. Logs cues and spoken announcements

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dotspot::detect::{RemoteBackend, ScriptedBackend, WsLink};
use dotspot::feedback::{LogCueOutput, LogSpeechOutput};
use dotspot::{
    BoundingBox, Detection, DetectorSet, DotspotConfig, Frame, Pipeline, PipelineSnapshot,
};

const CAMERA_WIDTH: u32 = 160;
const CAMERA_HEIGHT: u32 = 120;

#[derive(Parser, Debug)]
#[command(author, version, about = "Point a camera at an object to hear its name")]
struct Args {
    /// Number of camera frames to process.
    #[arg(long, default_value = "300")]
    frames: u64,

    /// Camera frame rate (overrides the config file).
    #[arg(long)]
    fps: Option<f32>,

    /// Remote detection server, host:port.
    #[arg(long)]
    remote: Option<String>,

    /// Enable the local detector fallback.
    #[arg(long)]
    local: bool,

    /// Config file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "DOTSPOT_CONFIG")]
    config: Option<PathBuf>,

    /// Pace frames at the camera rate instead of waiting on each detection.
    #[arg(long)]
    realtime: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = DotspotConfig::load_from(args.config.as_deref())?;
    if let Some(fps) = args.fps {
        cfg.scheduler.camera_fps = fps;
        cfg.scheduler.validate()?;
    }
    if let Some(addr) = args.remote {
        cfg.detector.remote_addr = Some(addr);
    }
    if args.local {
        cfg.detector.local_enabled = true;
    }

    let mut detectors = DetectorSet::new();
    if let Some(addr) = cfg.detector.remote_addr.as_deref() {
        log::info!("remote detector at {}", addr);
        detectors = detectors.with_remote(RemoteBackend::new(
            WsLink::new(addr),
            cfg.detector.remote.clone(),
        ));
    } else if !cfg.detector.local_enabled {
        log::info!("no remote detector configured; enabling the local detector");
        cfg.detector.local_enabled = true;
    }
    let detectors = with_local_detector(detectors, &cfg)?;

    let mut pipeline = Pipeline::new(
        &cfg.pipeline_settings(),
        detectors,
        Box::new(LogCueOutput),
        Box::new(LogSpeechOutput),
    )?;

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        handler_flag.store(false, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let frame_delta = Duration::from_secs_f32(1.0 / cfg.scheduler.camera_fps);
    let telemetry_every = (cfg.scheduler.camera_fps.round() as u64).max(1);
    let mut last_target = None;

    log::info!(
        "dotspot running: {} frames at {} fps, detection every {} frames, dwell {}s",
        args.frames,
        cfg.scheduler.camera_fps,
        cfg.scheduler.detect_every,
        cfg.dwell.required_secs
    );
    for index in 0..args.frames {
        if !running.load(Ordering::SeqCst) {
            log::info!("shutdown signal received");
            break;
        }
        let frame = Frame::solid(CAMERA_WIDTH, CAMERA_HEIGHT, [90, 90, 90])?;
        let snapshot = pipeline.on_frame(frame);
        if snapshot.target != last_target {
            log_target(&snapshot);
            last_target = snapshot.target;
        }
        if index % telemetry_every == 0 {
            log_telemetry(&snapshot);
        }

        if args.realtime {
            std::thread::sleep(frame_delta);
        } else {
            pipeline.wait_for_detection(Duration::from_secs(2));
        }
    }

    log_telemetry(&pipeline.snapshot());
    Ok(())
}

fn with_local_detector(detectors: DetectorSet, cfg: &DotspotConfig) -> Result<DetectorSet> {
    match cfg.detector.model_path.as_deref() {
        #[cfg(feature = "backend-tract")]
        Some(path) => {
            let backend = dotspot::detect::backends::TractBackend::new(path, cfg.detector.model_input)?
                .with_threshold(cfg.detector.remote.min_confidence);
            log::info!("local detector model {}", path.display());
            Ok(detectors.with_local(backend))
        }
        #[cfg(not(feature = "backend-tract"))]
        Some(path) => Err(anyhow!(
            "model {} requires building with --features backend-tract",
            path.display()
        )),
        None => {
            log::info!("no model configured; local detector replays a demo script");
            Ok(detectors.with_local(demo_backend()?))
        }
    }
}

/// A cup held under the aim point, a pause, then a phone.
fn demo_backend() -> Result<ScriptedBackend> {
    let backend = ScriptedBackend::new();
    let script = backend.script();
    let cup = Detection::new("cup", 0.88, BoundingBox::from_center(0.5, 0.52, 0.22, 0.3));
    let phone = Detection::new(
        "cell_phone",
        0.81,
        BoundingBox::from_center(0.48, 0.5, 0.18, 0.34),
    );
    let bottle = Detection::new("bottle", 0.7, BoundingBox::from_center(0.15, 0.4, 0.1, 0.4));
    for _ in 0..20 {
        script.push(vec![cup.clone(), bottle.clone()])?;
    }
    for _ in 0..8 {
        script.push(vec![bottle.clone()])?;
    }
    for _ in 0..20 {
        script.push(vec![phone.clone(), bottle.clone()])?;
    }
    script.set_repeating(vec![bottle])?;
    Ok(backend)
}

fn log_target(snapshot: &PipelineSnapshot) {
    match snapshot.objects.iter().find(|o| o.is_target) {
        Some(target) => log::info!(
            "pointing at {} ({}, confidence {:.2}, tracked {:.1}s)",
            target.label,
            target.id,
            target.confidence,
            target.age_secs
        ),
        None => log::info!("pointing at nothing"),
    }
}

fn log_telemetry(snapshot: &PipelineSnapshot) {
    let t = &snapshot.telemetry;
    log::debug!(
        "frame {}: {} objects, phase {:?}, dwell {:.0}%, mode {}, latency {:?}, cycles {}, dropped {}, stale {}",
        snapshot.frame_count,
        snapshot.objects.len(),
        snapshot.phase,
        snapshot.dwell_progress * 100.0,
        t.mode.map_or_else(|| "none".to_string(), |m| m.to_string()),
        t.last_latency,
        t.completed_cycles,
        t.dropped_frames,
        t.stale_results
    );
}
