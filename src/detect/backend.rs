use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Shared connection flag published by a networked backend.
///
/// The backend lives on the detection worker thread; the frame stream keeps a
/// clone so it can pick a detector mode without touching the backend.
#[derive(Clone, Debug, Default)]
pub struct ConnectionStatus(Arc<AtomicBool>);

impl ConnectionStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set_connected(&self, connected: bool) {
        self.0.store(connected, Ordering::SeqCst);
    }
}

/// Detector backend trait.
///
/// Implementations run on the detection worker thread, never on the frame stream.
/// `detect` may block for as long as inference or the network takes.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame. Returned boxes are normalized to the frame.
    ///
    /// Transient unavailability should resolve to an empty list rather than an error;
    /// the worker downgrades errors to empty results regardless.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Connection flag for networked backends. Local backends are always available.
    fn connection_status(&self) -> Option<ConnectionStatus> {
        None
    }

    /// Warm-up hook, run on the worker thread before the first request. Networked
    /// backends also get it while another backend serves, to re-establish their link.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
