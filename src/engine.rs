//! Synchronous tracking core: tracker, pointing resolver and dwell state machine.
//!
//! Not thread-safe by contract; the owning pipeline mutates it from the frame
//! stream only.

use anyhow::Result;

use crate::detect::Detection;
use crate::dwell::{DwellEvent, DwellPhase, DwellSettings, DwellStateMachine, PointingState};
use crate::pointing::{AimSettings, PointingResolver};
use crate::track::{ObjectTracker, TrackId, TrackedObject, TrackerSettings};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EngineSettings {
    pub tracker: TrackerSettings,
    pub aim: AimSettings,
    pub dwell: DwellSettings,
}

pub struct PointingEngine {
    tracker: ObjectTracker,
    resolver: PointingResolver,
    machine: DwellStateMachine,
}

impl PointingEngine {
    pub fn new(settings: &EngineSettings) -> Result<Self> {
        Ok(Self {
            tracker: ObjectTracker::new(settings.tracker.clone())?,
            resolver: PointingResolver::new(&settings.aim)?,
            machine: DwellStateMachine::new(settings.dwell.clone())?,
        })
    }

    /// One detection cycle: reconcile, resolve the target, advance dwell.
    pub fn process_detections(
        &mut self,
        detections: &[Detection],
        delta_secs: f32,
    ) -> Vec<DwellEvent> {
        self.tracker.update(detections, delta_secs);
        let target = self.resolver.resolve(self.tracker.objects()).map(|o| o.id);
        self.machine.advance(&mut self.tracker, target, delta_secs)
    }

    /// Between detection cycles: advance dwell for the held target.
    pub fn tick(&mut self, delta_secs: f32) -> Vec<DwellEvent> {
        self.tracker.age(delta_secs);
        self.machine.tick(&mut self.tracker, delta_secs)
    }

    pub fn reset(&mut self) {
        self.tracker.reset();
        self.machine.reset();
    }

    pub fn objects(&self) -> &[TrackedObject] {
        self.tracker.objects()
    }

    pub fn tracker(&self) -> &ObjectTracker {
        &self.tracker
    }

    pub fn resolver(&self) -> &PointingResolver {
        &self.resolver
    }

    pub fn state(&self) -> &PointingState {
        self.machine.state()
    }

    pub fn phase(&self) -> DwellPhase {
        self.machine.phase()
    }

    pub fn target(&self) -> Option<TrackId> {
        self.machine.state().current_target
    }
}
