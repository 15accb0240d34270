//! Dotspot pointing core
//!
//! Real-time "point at an object to hear its name" assistance. Camera frames
//! feed an object detector; detections are reconciled into stable tracked
//! objects; a fixed aim point picks the object being pointed at; once the user
//! has held it long enough the label is spoken, exactly once per visit.
//!
//! # Module Structure
//!
//! - `geometry`: normalized points and bounding boxes, IoU and containment
//! - `frame`: RGB camera frames and JPEG encoding for the remote detector
//! - `detect`: detector backends (remote, on-device, scripted) and the
//!   background detection service with stale-result rejection
//! - `track`: IoU/centroid object tracker with per-object dwell bookkeeping
//! - `pointing`: aim-circle overlap resolver and the point-containment policy
//! - `dwell`: dwell-to-announce state machine
//! - `feedback`: cue and speech output seams
//! - `scheduler`: detection cadence and backpressure
//! - `engine`: synchronous tracker + resolver + dwell composition
//! - `pipeline`: frame-driven orchestration and UI snapshots
//! - `config`: file and environment configuration for the binary

pub mod config;
pub mod detect;
pub mod dwell;
pub mod engine;
pub mod feedback;
pub mod frame;
pub mod geometry;
pub mod pipeline;
pub mod pointing;
pub mod scheduler;
pub mod track;

pub use config::{DetectorSettings, DotspotConfig};
pub use detect::{
    Detection, DetectionService, DetectionTelemetry, DetectorBackend, DetectorMode, DetectorSet,
};
pub use dwell::{DwellEvent, DwellPhase, DwellSettings, DwellStateMachine, PointingState};
pub use engine::{EngineSettings, PointingEngine};
pub use feedback::{
    announcement_text, CueCurve, CueOutput, FeedbackDriver, FeedbackRecorder, SpeechOutput,
};
pub use frame::Frame;
pub use geometry::{BoundingBox, Point};
pub use pipeline::{Pipeline, PipelineSettings, PipelineSnapshot, TrackedObjectView};
pub use pointing::{AimSettings, OverlapSampler, PointingResolver};
pub use scheduler::{FrameDecision, FrameScheduler, SchedulerSettings};
pub use track::{ObjectTracker, TrackId, TrackedObject, TrackerSettings};
