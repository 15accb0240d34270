//! Background detection worker.
//!
//! The frame stream submits frames; a dedicated thread owns the backends and runs
//! them; completions come back over a channel and are applied by the frame stream
//! on its next turn. At most one request is in flight. Each request carries the
//! generation current at dispatch, and completions from an older generation
//! (after a reset) or from a mode that no longer serves the stream are discarded
//! without touching tracking state.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use crate::detect::backend::ConnectionStatus;
use crate::detect::registry::{select_mode, DetectorSet};
use crate::detect::result::{Detection, DetectorMode};
use crate::frame::Frame;

struct DetectionRequest {
    generation: u64,
    mode: DetectorMode,
    frame: Frame,
}

#[derive(Debug)]
struct DetectionResponse {
    generation: u64,
    mode: DetectorMode,
    detections: Vec<Detection>,
    latency: Duration,
}

/// Outcome of offering a frame to the service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    Dispatched(DetectorMode),
    /// A request is still outstanding; the frame was dropped.
    Busy,
    /// No backend can serve this cycle.
    NoDetector,
}

/// Debug telemetry. Observability only.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionTelemetry {
    pub last_latency: Option<Duration>,
    pub completed_cycles: u64,
    pub dropped_frames: u64,
    pub stale_results: u64,
    pub mode: Option<DetectorMode>,
}

/// Completed detections ready for the tracker.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionBatch {
    pub mode: DetectorMode,
    pub detections: Vec<Detection>,
}

pub struct DetectionService {
    requests: Option<Sender<DetectionRequest>>,
    responses: Receiver<DetectionResponse>,
    join: Option<JoinHandle<()>>,
    remote_status: Option<ConnectionStatus>,
    has_remote: bool,
    has_local: bool,
    local_enabled: bool,
    in_flight: bool,
    generation: u64,
    ready: Option<DetectionResponse>,
    telemetry: DetectionTelemetry,
}

impl DetectionService {
    /// Move the detectors onto a worker thread and start serving.
    pub fn spawn(mut detectors: DetectorSet, local_enabled: bool) -> Result<Self> {
        let remote_status = detectors.remote_status();
        let has_remote = detectors.has_remote();
        let has_local = detectors.has_local();
        let (req_tx, req_rx) = mpsc::channel::<DetectionRequest>();
        let (resp_tx, resp_rx) = mpsc::channel::<DetectionResponse>();

        let join = std::thread::Builder::new()
            .name("dotspot-detect".to_string())
            .spawn(move || {
                detectors.warm_up();
                for request in req_rx {
                    let started = Instant::now();
                    let detections = match detectors.detect(request.mode, &request.frame) {
                        Ok(detections) => detections,
                        Err(err) => {
                            log::warn!("{} detection failed: {}", request.mode, err);
                            Vec::new()
                        }
                    };
                    let response = DetectionResponse {
                        generation: request.generation,
                        mode: request.mode,
                        detections,
                        latency: started.elapsed(),
                    };
                    if resp_tx.send(response).is_err() {
                        break;
                    }
                    if request.mode == DetectorMode::Local {
                        detectors.poll_remote();
                    }
                }
                log::debug!("detection worker stopped");
            })
            .map_err(|e| anyhow!("failed to start detection worker: {}", e))?;

        Ok(Self {
            requests: Some(req_tx),
            responses: resp_rx,
            join: Some(join),
            remote_status,
            has_remote,
            has_local,
            local_enabled,
            in_flight: false,
            generation: 0,
            ready: None,
            telemetry: DetectionTelemetry::default(),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight
    }

    pub fn remote_connected(&self) -> bool {
        self.remote_status
            .as_ref()
            .is_some_and(ConnectionStatus::is_connected)
    }

    pub fn local_enabled(&self) -> bool {
        self.local_enabled
    }

    pub fn set_local_enabled(&mut self, enabled: bool) {
        self.local_enabled = enabled;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn telemetry(&self) -> &DetectionTelemetry {
        &self.telemetry
    }

    /// Mode that would serve a cycle started now.
    pub fn select_mode(&self) -> Option<DetectorMode> {
        select_mode(
            self.has_remote,
            self.remote_connected(),
            self.has_local,
            self.local_enabled,
        )
    }

    /// Offer a frame for detection. Never blocks.
    pub fn submit(&mut self, frame: Frame) -> SubmitOutcome {
        if self.in_flight {
            self.telemetry.dropped_frames += 1;
            return SubmitOutcome::Busy;
        }
        let Some(mode) = self.select_mode() else {
            return SubmitOutcome::NoDetector;
        };
        if self.telemetry.mode.is_some_and(|m| m != mode) {
            log::info!("detector mode switched to {}", mode);
        }
        self.telemetry.mode = Some(mode);

        let Some(requests) = self.requests.as_ref() else {
            return SubmitOutcome::NoDetector;
        };
        let request = DetectionRequest {
            generation: self.generation,
            mode,
            frame,
        };
        if requests.send(request).is_err() {
            log::warn!("detection worker is gone; dropping frame");
            return SubmitOutcome::NoDetector;
        }
        self.in_flight = true;
        SubmitOutcome::Dispatched(mode)
    }

    /// Count a due frame the scheduler dropped because a request was outstanding.
    pub fn record_dropped(&mut self) {
        self.telemetry.dropped_frames += 1;
    }

    /// Take the completed batch, if any. Never blocks.
    ///
    /// Stale completions clear the busy flag and are dropped.
    pub fn try_complete(&mut self) -> Option<DetectionBatch> {
        loop {
            let response = match self.ready.take() {
                Some(response) => response,
                None => match self.responses.try_recv() {
                    Ok(response) => response,
                    Err(TryRecvError::Empty) => return None,
                    Err(TryRecvError::Disconnected) => {
                        self.in_flight = false;
                        return None;
                    }
                },
            };
            if let Some(batch) = self.accept(response) {
                return Some(batch);
            }
        }
    }

    /// Block until the outstanding request completes, keeping the result for the
    /// next `try_complete`. Returns false on timeout or when nothing is in flight.
    pub fn wait_ready(&mut self, timeout: Duration) -> bool {
        if self.ready.is_some() {
            return true;
        }
        if !self.in_flight {
            return false;
        }
        match self.responses.recv_timeout(timeout) {
            Ok(response) => {
                self.ready = Some(response);
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => {
                self.in_flight = false;
                false
            }
        }
    }

    /// Invalidate everything dispatched so far.
    ///
    /// The outstanding request (if any) still holds the busy flag until it lands.
    pub fn invalidate(&mut self) {
        self.generation += 1;
    }

    fn accept(&mut self, response: DetectionResponse) -> Option<DetectionBatch> {
        self.in_flight = false;
        let switched = self.select_mode() != Some(response.mode);
        if response.generation != self.generation || switched {
            self.telemetry.stale_results += 1;
            log::debug!(
                "discarding stale {} result (generation {}, current {}, mode switched: {})",
                response.mode,
                response.generation,
                self.generation,
                switched
            );
            return None;
        }
        self.telemetry.completed_cycles += 1;
        self.telemetry.last_latency = Some(response.latency);
        Some(DetectionBatch {
            mode: response.mode,
            detections: response.detections,
        })
    }
}

impl Drop for DetectionService {
    fn drop(&mut self) {
        // Closing the request channel ends the worker loop.
        self.requests.take();
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::error!("detection worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backend::DetectorBackend;
    use crate::detect::backends::ScriptedBackend;
    use crate::geometry::BoundingBox;

    const WAIT: Duration = Duration::from_secs(5);

    fn cup() -> Detection {
        Detection::new("cup", 0.9, BoundingBox::new(0.45, 0.45, 0.1, 0.1))
    }

    fn frame() -> Frame {
        Frame::solid(4, 4, [0, 0, 0]).unwrap()
    }

    /// Remote slot whose link state the test flips by hand.
    struct LinkedRemote {
        status: ConnectionStatus,
    }

    impl DetectorBackend for LinkedRemote {
        fn name(&self) -> &'static str {
            "remote"
        }

        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
            Ok(Vec::new())
        }

        fn connection_status(&self) -> Option<ConnectionStatus> {
            Some(self.status.clone())
        }
    }

    #[test]
    fn single_request_in_flight() {
        let backend = ScriptedBackend::new()
            .repeating(vec![cup()])
            .with_latency(Duration::from_millis(20));
        let mut service = DetectionService::spawn(DetectorSet::new().with_local(backend), true)
            .unwrap();

        assert_eq!(
            service.submit(frame()),
            SubmitOutcome::Dispatched(DetectorMode::Local)
        );
        assert_eq!(service.submit(frame()), SubmitOutcome::Busy);
        assert_eq!(service.telemetry().dropped_frames, 1);

        assert!(service.wait_ready(WAIT));
        let batch = service.try_complete().unwrap();
        assert_eq!(batch.detections, vec![cup()]);
        assert!(!service.is_busy());
        assert_eq!(service.telemetry().completed_cycles, 1);
        assert!(service.telemetry().last_latency.is_some());
    }

    #[test]
    fn results_from_before_invalidate_are_discarded() {
        let backend = ScriptedBackend::new().repeating(vec![cup()]);
        let mut service = DetectionService::spawn(DetectorSet::new().with_local(backend), true)
            .unwrap();

        service.submit(frame());
        service.invalidate();
        assert!(service.wait_ready(WAIT));
        assert!(service.try_complete().is_none());
        assert!(!service.is_busy());
        assert_eq!(service.telemetry().stale_results, 1);
        assert_eq!(service.telemetry().completed_cycles, 0);

        service.submit(frame());
        assert!(service.wait_ready(WAIT));
        assert!(service.try_complete().is_some());
    }

    #[test]
    fn local_result_is_stale_once_remote_reconnects() {
        let status = ConnectionStatus::new();
        let remote = LinkedRemote {
            status: status.clone(),
        };
        let local = ScriptedBackend::new()
            .repeating(vec![cup()])
            .with_latency(Duration::from_millis(200));
        let detectors = DetectorSet::new().with_remote(remote).with_local(local);
        let mut service = DetectionService::spawn(detectors, true).unwrap();

        assert_eq!(
            service.submit(frame()),
            SubmitOutcome::Dispatched(DetectorMode::Local)
        );
        status.set_connected(true);

        assert!(service.wait_ready(WAIT));
        assert!(service.try_complete().is_none());
        assert!(!service.is_busy());
        assert_eq!(service.telemetry().stale_results, 1);
        assert_eq!(service.telemetry().completed_cycles, 0);

        assert_eq!(
            service.submit(frame()),
            SubmitOutcome::Dispatched(DetectorMode::Remote)
        );
    }

    #[test]
    fn detector_errors_become_empty_batches() {
        let backend = ScriptedBackend::new().failing(1);
        let mut service = DetectionService::spawn(DetectorSet::new().with_local(backend), true)
            .unwrap();
        service.submit(frame());
        assert!(service.wait_ready(WAIT));
        let batch = service.try_complete().unwrap();
        assert!(batch.detections.is_empty());
    }

    #[test]
    fn no_detector_when_local_disabled_and_no_remote() {
        let backend = ScriptedBackend::new();
        let mut service = DetectionService::spawn(DetectorSet::new().with_local(backend), false)
            .unwrap();
        assert_eq!(service.submit(frame()), SubmitOutcome::NoDetector);
        assert!(!service.is_busy());

        service.set_local_enabled(true);
        assert_eq!(
            service.submit(frame()),
            SubmitOutcome::Dispatched(DetectorMode::Local)
        );
    }
}
