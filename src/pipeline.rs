//! Frame-processing pipeline.
//!
//! ```text
//! frame -> scheduler -> detection service (worker thread)
//!                               |
//!        completion (next frame) v
//!        tracker -> resolver -> dwell state machine -> feedback outputs
//! ```
//!
//! The pipeline owns every stateful component and is driven from a single
//! frame stream. Detection completions are only ever applied inside `on_frame`,
//! so tracking state is never touched from the worker thread.

use std::time::Duration;

use anyhow::Result;

use crate::detect::{
    DetectionService, DetectionTelemetry, DetectorSet, SubmitOutcome,
};
use crate::dwell::DwellPhase;
use crate::engine::{EngineSettings, PointingEngine};
use crate::feedback::{CueCurve, CueOutput, FeedbackDriver, SpeechOutput};
use crate::frame::Frame;
use crate::geometry::BoundingBox;
use crate::scheduler::{FrameDecision, FrameScheduler, SchedulerSettings};
use crate::track::TrackId;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PipelineSettings {
    pub engine: EngineSettings,
    pub scheduler: SchedulerSettings,
    pub cue_curve: CueCurve,
    /// Allow the local detector when the remote one is not connected.
    pub local_enabled: bool,
}

/// Debug-overlay view of one tracked object.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackedObjectView {
    pub id: TrackId,
    pub label: String,
    pub bbox: BoundingBox,
    pub confidence: f32,
    /// Seconds since the object was first tracked.
    pub age_secs: f32,
    pub announced: bool,
    pub is_target: bool,
}

/// State exposed to the UI after each frame.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineSnapshot {
    pub enabled: bool,
    pub objects: Vec<TrackedObjectView>,
    pub target: Option<TrackId>,
    pub dwell_progress: f32,
    pub phase: DwellPhase,
    pub frame_count: u64,
    pub telemetry: DetectionTelemetry,
}

pub struct Pipeline {
    engine: PointingEngine,
    scheduler: FrameScheduler,
    detection: DetectionService,
    feedback: FeedbackDriver,
    enabled: bool,
}

impl Pipeline {
    /// Validate settings, start the detection worker and wire the outputs.
    pub fn new(
        settings: &PipelineSettings,
        detectors: DetectorSet,
        cue: Box<dyn CueOutput>,
        speech: Box<dyn SpeechOutput>,
    ) -> Result<Self> {
        let engine = PointingEngine::new(&settings.engine)?;
        let scheduler = FrameScheduler::new(settings.scheduler.clone())?;
        if detectors.is_empty() {
            log::warn!("pipeline started without any detector");
        }
        let detection = DetectionService::spawn(detectors, settings.local_enabled)?;
        Ok(Self {
            engine,
            scheduler,
            detection,
            feedback: FeedbackDriver::new(cue, speech, settings.cue_curve),
            enabled: true,
        })
    }

    /// Feed one camera frame. Never blocks on detection.
    pub fn on_frame(&mut self, frame: Frame) -> PipelineSnapshot {
        if !self.enabled {
            // Clears the busy flag once the invalidated request lands.
            let _ = self.detection.try_complete();
            return self.snapshot();
        }

        let delta = self.scheduler.frame_delta();
        let mut events = match self.detection.try_complete() {
            Some(batch) => {
                log::trace!(
                    "{} detections from {} detector",
                    batch.detections.len(),
                    batch.mode
                );
                self.engine.process_detections(&batch.detections, delta)
            }
            None => self.engine.tick(delta),
        };

        match self.scheduler.on_frame(self.detection.is_busy()) {
            FrameDecision::Detect => match self.detection.submit(frame) {
                SubmitOutcome::Dispatched(_) | SubmitOutcome::Busy => {}
                SubmitOutcome::NoDetector => {
                    // Nothing can serve the cycle: count it as zero detections.
                    events.extend(self.engine.process_detections(&[], 0.0));
                }
            },
            FrameDecision::Backpressure => {
                log::trace!("detector busy; dropping frame {}", self.scheduler.frame_count());
                self.detection.record_dropped();
            }
            FrameDecision::Skip => {}
        }

        self.feedback.dispatch(&events);
        self.snapshot()
    }

    /// Block until the outstanding detection lands; it is applied on the next frame.
    pub fn wait_for_detection(&mut self, timeout: Duration) -> bool {
        self.detection.wait_ready(timeout)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turning the feature off clears all pointing state and silences output.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        if !enabled {
            self.reset();
        }
        log::info!("pointing {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn set_local_enabled(&mut self, enabled: bool) {
        self.detection.set_local_enabled(enabled);
    }

    /// Drop tracked objects and pointing state. In-flight results are discarded.
    pub fn reset(&mut self) {
        self.detection.invalidate();
        self.engine.reset();
        self.scheduler.reset();
        self.feedback.silence();
    }

    pub fn engine(&self) -> &PointingEngine {
        &self.engine
    }

    pub fn telemetry(&self) -> &DetectionTelemetry {
        self.detection.telemetry()
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        let target = self.engine.target();
        let objects = self
            .engine
            .objects()
            .iter()
            .map(|o| TrackedObjectView {
                id: o.id,
                label: o.label.clone(),
                bbox: o.bbox,
                confidence: o.confidence,
                age_secs: o.age_secs,
                announced: o.announced,
                is_target: Some(o.id) == target,
            })
            .collect();
        PipelineSnapshot {
            enabled: self.enabled,
            objects,
            target,
            dwell_progress: self.engine.state().dwell_progress,
            phase: self.engine.phase(),
            frame_count: self.scheduler.frame_count(),
            telemetry: self.detection.telemetry().clone(),
        }
    }
}
