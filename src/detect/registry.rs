use anyhow::{anyhow, Result};

use crate::detect::result::{Detection, DetectorMode};
use crate::frame::Frame;

use super::backend::{ConnectionStatus, DetectorBackend};

/// The remote and local detector slots.
///
/// Either slot may be empty. The set is moved onto the detection worker thread once
/// the service starts; take `remote_status()` beforehand to observe the link.
#[derive(Default)]
pub struct DetectorSet {
    remote: Option<Box<dyn DetectorBackend>>,
    local: Option<Box<dyn DetectorBackend>>,
}

impl DetectorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_remote<B: DetectorBackend + 'static>(mut self, backend: B) -> Self {
        self.remote = Some(Box::new(backend));
        self
    }

    pub fn with_local<B: DetectorBackend + 'static>(mut self, backend: B) -> Self {
        self.local = Some(Box::new(backend));
        self
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn has_local(&self) -> bool {
        self.local.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.remote.is_none() && self.local.is_none()
    }

    /// Connection flag of the remote backend, if one is registered and reports one.
    pub fn remote_status(&self) -> Option<ConnectionStatus> {
        self.remote.as_ref().and_then(|b| b.connection_status())
    }

    /// Warm up every registered backend. Failures are logged, not fatal.
    pub fn warm_up(&mut self) {
        for backend in [self.remote.as_mut(), self.local.as_mut()].into_iter().flatten() {
            if let Err(err) = backend.warm_up() {
                log::warn!("detector '{}' warm-up failed: {}", backend.name(), err);
            }
        }
    }

    /// Give a disconnected remote backend a (rate-limited) chance to reconnect
    /// while the local backend is serving.
    pub fn poll_remote(&mut self) {
        let Some(remote) = self.remote.as_mut() else {
            return;
        };
        if remote.connection_status().is_some_and(|s| s.is_connected()) {
            return;
        }
        if let Err(err) = remote.warm_up() {
            log::trace!("remote reconnect pending: {}", err);
        }
    }

    /// Run detection on the backend serving `mode`.
    pub fn detect(&mut self, mode: DetectorMode, frame: &Frame) -> Result<Vec<Detection>> {
        let backend = match mode {
            DetectorMode::Remote => self.remote.as_mut(),
            DetectorMode::Local => self.local.as_mut(),
        }
        .ok_or_else(|| anyhow!("no {} detector registered", mode))?;
        backend.detect(frame)
    }
}

/// Mode selection policy, evaluated once per cycle.
///
/// - Remote whenever it is connected.
/// - Local only when enabled and Remote is not connected.
/// - Otherwise Remote (if registered) so it gets a chance to reconnect.
pub fn select_mode(
    has_remote: bool,
    remote_connected: bool,
    has_local: bool,
    local_enabled: bool,
) -> Option<DetectorMode> {
    if has_remote && remote_connected {
        return Some(DetectorMode::Remote);
    }
    if has_local && local_enabled {
        return Some(DetectorMode::Local);
    }
    if has_remote {
        return Some(DetectorMode::Remote);
    }
    None
}
