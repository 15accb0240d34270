//! Detection source adapter.
//!
//! - `DetectorBackend`: uniform `detect(frame)` contract for remote and local detectors.
//! - `DetectorSet` + `select_mode`: which detector serves a cycle.
//! - `DetectionService`: non-blocking dispatch with one request in flight.

mod backend;
pub mod backends;
mod registry;
mod result;
mod service;

pub use backend::{ConnectionStatus, DetectorBackend};
pub use backends::{DetectionScript, RemoteBackend, RemoteSettings, ScriptedBackend, WsLink};
pub use registry::{select_mode, DetectorSet};
pub use result::{normalize_detections, Detection, DetectorMode};
pub use service::{DetectionBatch, DetectionService, DetectionTelemetry, SubmitOutcome};
