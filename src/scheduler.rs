//! Frame scheduler.
//!
//! Camera frames arrive at the native rate. Detection runs on every
//! `detect_every`-th frame (the first frame included); a due frame is dropped
//! while a previous request is still outstanding. Every frame carries a nominal
//! delta of `1 / camera_fps` that advances dwell for the held target.

use anyhow::{anyhow, Result};

pub const DEFAULT_CAMERA_FPS: f32 = 30.0;
pub const DEFAULT_DETECT_EVERY: u32 = 3;

#[derive(Clone, Debug, PartialEq)]
pub struct SchedulerSettings {
    pub camera_fps: f32,
    pub detect_every: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            camera_fps: DEFAULT_CAMERA_FPS,
            detect_every: DEFAULT_DETECT_EVERY,
        }
    }
}

impl SchedulerSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.camera_fps > 0.0 && self.camera_fps.is_finite()) {
            return Err(anyhow!("camera_fps must be positive, got {}", self.camera_fps));
        }
        if self.detect_every == 0 {
            return Err(anyhow!("detect_every must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameDecision {
    /// Submit this frame for detection.
    Detect,
    /// Detection was due but a request is outstanding; the frame is dropped.
    Backpressure,
    /// Not a detection frame.
    Skip,
}

pub struct FrameScheduler {
    settings: SchedulerSettings,
    frame_count: u64,
}

impl FrameScheduler {
    pub fn new(settings: SchedulerSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            frame_count: 0,
        })
    }

    /// Nominal seconds between camera frames.
    pub fn frame_delta(&self) -> f32 {
        1.0 / self.settings.camera_fps
    }

    /// Effective detection period in seconds.
    pub fn detection_period(&self) -> f32 {
        self.frame_delta() * self.settings.detect_every as f32
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Count a frame and decide what to do with it.
    pub fn on_frame(&mut self, detection_busy: bool) -> FrameDecision {
        let due = self.frame_count % self.settings.detect_every as u64 == 0;
        self.frame_count += 1;
        match (due, detection_busy) {
            (false, _) => FrameDecision::Skip,
            (true, true) => FrameDecision::Backpressure,
            (true, false) => FrameDecision::Detect,
        }
    }

    pub fn reset(&mut self) {
        self.frame_count = 0;
    }
}
