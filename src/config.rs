use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::RemoteSettings;
use crate::dwell::{DwellSettings, DEFAULT_REQUIRED_DWELL_SECS};
use crate::engine::EngineSettings;
use crate::feedback::CueCurve;
use crate::frame::DEFAULT_JPEG_QUALITY;
use crate::geometry::Point;
use crate::pipeline::PipelineSettings;
use crate::pointing::{AimSettings, OverlapSampler, DEFAULT_AIM_RADIUS, DEFAULT_GRID_SAMPLES};
use crate::scheduler::{SchedulerSettings, DEFAULT_CAMERA_FPS, DEFAULT_DETECT_EVERY};
use crate::track::{
    TrackerSettings, DEFAULT_CENTROID_THRESHOLD, DEFAULT_IOU_THRESHOLD,
    DEFAULT_MAX_FRAMES_UNSEEN,
};

const DEFAULT_RECONNECT_SECS: u64 = 2;
const DEFAULT_MIN_CONFIDENCE: f32 = 0.25;
const DEFAULT_MODEL_INPUT: u32 = 640;

#[derive(Debug, Deserialize, Default)]
struct DotspotConfigFile {
    tracker: Option<TrackerConfigFile>,
    dwell: Option<DwellConfigFile>,
    scheduler: Option<SchedulerConfigFile>,
    aim: Option<AimConfigFile>,
    detector: Option<DetectorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct TrackerConfigFile {
    iou_threshold: Option<f32>,
    centroid_threshold: Option<f32>,
    max_frames_unseen: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DwellConfigFile {
    required_secs: Option<f32>,
    cue_curve: Option<CueCurve>,
}

#[derive(Debug, Deserialize, Default)]
struct SchedulerConfigFile {
    camera_fps: Option<f32>,
    detect_every: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
enum SamplerKind {
    #[default]
    Grid,
    Random,
}

#[derive(Debug, Deserialize)]
struct AimConfigFile {
    x: Option<f32>,
    y: Option<f32>,
    /// Absent keeps the default; an explicit `null` selects the point policy.
    #[serde(default = "default_radius")]
    radius: Option<f32>,
    sampler: Option<SamplerKind>,
    /// Grid side length for the grid sampler, point count for the random sampler.
    samples: Option<u32>,
    seed: Option<u64>,
}

impl Default for AimConfigFile {
    fn default() -> Self {
        Self {
            x: None,
            y: None,
            radius: default_radius(),
            sampler: None,
            samples: None,
            seed: None,
        }
    }
}

fn default_radius() -> Option<f32> {
    Some(DEFAULT_AIM_RADIUS)
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    remote_addr: Option<String>,
    local_enabled: Option<bool>,
    jpeg_quality: Option<u8>,
    reconnect_secs: Option<u64>,
    min_confidence: Option<f32>,
    model_path: Option<PathBuf>,
    model_input: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct DotspotConfig {
    pub tracker: TrackerSettings,
    pub dwell: DwellSettings,
    pub cue_curve: CueCurve,
    pub scheduler: SchedulerSettings,
    pub aim: AimSettings,
    pub detector: DetectorSettings,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// `ws://host:port` URL (or bare `host:port`) of the remote detection server.
    pub remote_addr: Option<String>,
    pub local_enabled: bool,
    pub remote: RemoteSettings,
    /// ONNX model for the on-device detector.
    pub model_path: Option<PathBuf>,
    pub model_input: u32,
}

impl DotspotConfig {
    /// Read `DOTSPOT_CONFIG` (if set), apply env overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DOTSPOT_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Like `load`, but with an explicit config file.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DotspotConfigFile) -> Self {
        let tracker_file = file.tracker.unwrap_or_default();
        let tracker = TrackerSettings {
            iou_threshold: tracker_file.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
            centroid_threshold: tracker_file
                .centroid_threshold
                .unwrap_or(DEFAULT_CENTROID_THRESHOLD),
            max_frames_unseen: tracker_file
                .max_frames_unseen
                .unwrap_or(DEFAULT_MAX_FRAMES_UNSEEN),
        };

        let dwell_file = file.dwell.unwrap_or_default();
        let dwell = DwellSettings {
            required_secs: dwell_file
                .required_secs
                .unwrap_or(DEFAULT_REQUIRED_DWELL_SECS),
        };
        let cue_curve = dwell_file.cue_curve.unwrap_or_default();

        let scheduler_file = file.scheduler.unwrap_or_default();
        let scheduler = SchedulerSettings {
            camera_fps: scheduler_file.camera_fps.unwrap_or(DEFAULT_CAMERA_FPS),
            detect_every: scheduler_file.detect_every.unwrap_or(DEFAULT_DETECT_EVERY),
        };

        let aim_file = file.aim.unwrap_or_default();
        let samples = aim_file.samples.unwrap_or(DEFAULT_GRID_SAMPLES);
        let sampler = match aim_file.sampler.unwrap_or_default() {
            SamplerKind::Grid => OverlapSampler::Grid { n: samples },
            SamplerKind::Random => OverlapSampler::Random {
                count: samples,
                seed: aim_file.seed.unwrap_or(0),
            },
        };
        let aim = AimSettings {
            point: Point::new(aim_file.x.unwrap_or(0.5), aim_file.y.unwrap_or(0.5)),
            radius: aim_file.radius,
            sampler,
        };

        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            remote_addr: detector_file.remote_addr,
            local_enabled: detector_file.local_enabled.unwrap_or(false),
            remote: RemoteSettings {
                jpeg_quality: detector_file.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
                reconnect_interval: Duration::from_secs(
                    detector_file
                        .reconnect_secs
                        .unwrap_or(DEFAULT_RECONNECT_SECS),
                ),
                min_confidence: detector_file
                    .min_confidence
                    .unwrap_or(DEFAULT_MIN_CONFIDENCE),
            },
            model_path: detector_file.model_path,
            model_input: detector_file.model_input.unwrap_or(DEFAULT_MODEL_INPUT),
        };

        Self {
            tracker,
            dwell,
            cue_curve,
            scheduler,
            aim,
            detector,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("DOTSPOT_REMOTE_ADDR") {
            if !addr.trim().is_empty() {
                self.detector.remote_addr = Some(addr.trim().to_string());
            }
        }
        if let Ok(flag) = std::env::var("DOTSPOT_LOCAL_DETECTOR") {
            self.detector.local_enabled = parse_flag(&flag)
                .ok_or_else(|| anyhow!("DOTSPOT_LOCAL_DETECTOR must be 1/0/true/false"))?;
        }
        if let Ok(secs) = std::env::var("DOTSPOT_DWELL_SECS") {
            self.dwell.required_secs = secs
                .trim()
                .parse()
                .map_err(|_| anyhow!("DOTSPOT_DWELL_SECS must be a number of seconds"))?;
        }
        if let Ok(every) = std::env::var("DOTSPOT_DETECT_EVERY") {
            self.scheduler.detect_every = every
                .trim()
                .parse()
                .map_err(|_| anyhow!("DOTSPOT_DETECT_EVERY must be a positive integer"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.tracker.validate()?;
        self.dwell.validate()?;
        self.scheduler.validate()?;
        self.aim.validate()?;

        let remote = &self.detector.remote;
        if !(1..=100).contains(&remote.jpeg_quality) {
            return Err(anyhow!(
                "jpeg_quality must be within 1..=100, got {}",
                remote.jpeg_quality
            ));
        }
        if remote.reconnect_interval.is_zero() {
            return Err(anyhow!("reconnect_secs must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&remote.min_confidence) {
            return Err(anyhow!(
                "min_confidence must be within [0, 1], got {}",
                remote.min_confidence
            ));
        }
        if self.detector.model_input == 0 {
            return Err(anyhow!("model_input must be greater than zero"));
        }
        if let Some(addr) = self.detector.remote_addr.as_deref() {
            if addr.trim().is_empty() {
                self.detector.remote_addr = None;
            }
        }
        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            tracker: self.tracker.clone(),
            aim: self.aim.clone(),
            dwell: self.dwell.clone(),
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            engine: self.engine_settings(),
            scheduler: self.scheduler.clone(),
            cue_curve: self.cue_curve,
            local_enabled: self.detector.local_enabled,
        }
    }
}

fn read_config_file(path: &Path) -> Result<DotspotConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
