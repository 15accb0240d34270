//! Dwell and announcement state machine.
//!
//! ```text
//! Idle -> Acquiring -> Dwelling -> Announced
//!   ^         |            |           |
//!   +---------+------------+-----------+   target lost
//! ```
//!
//! - Same target as last cycle: dwell accumulates; crossing the threshold announces
//!   exactly once and records the object as last announced.
//! - New target equal to the last announced object: no cue, progress shown as 1.0,
//!   no new dwell.
//! - Same unannounced target again after a brief loss: dwell resumes where it was.
//! - Any other new target: its announced flag and dwell are cleared, the last
//!   announced memory is dropped, and a fresh acquisition starts.
//! - No target: back to Idle, progress 0.

use anyhow::{anyhow, Result};

use crate::track::{ObjectTracker, TrackId};

pub const DEFAULT_REQUIRED_DWELL_SECS: f32 = 1.5;

/// Absorbs f32 drift when many small deltas add up to the threshold.
const DWELL_EPSILON: f32 = 1e-4;

#[derive(Clone, Debug, PartialEq)]
pub struct DwellSettings {
    pub required_secs: f32,
}

impl Default for DwellSettings {
    fn default() -> Self {
        Self {
            required_secs: DEFAULT_REQUIRED_DWELL_SECS,
        }
    }
}

impl DwellSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.required_secs > 0.0 && self.required_secs.is_finite()) {
            return Err(anyhow!(
                "required dwell must be a positive number of seconds, got {}",
                self.required_secs
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DwellPhase {
    #[default]
    Idle,
    Acquiring,
    Dwelling,
    Announced,
}

/// Pointing state. Targets are looked up by id in the tracker, never owned.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointingState {
    pub current_target: Option<TrackId>,
    pub last_announced: Option<TrackId>,
    /// 0..=1, for UI feedback.
    pub dwell_progress: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DwellEvent {
    /// A new target started a fresh dwell.
    Acquired { id: TrackId, label: String },
    /// The previous unannounced target came back after a brief loss.
    Resumed { id: TrackId, progress: f32 },
    Progress { id: TrackId, progress: f32 },
    /// Fired exactly once per acquisition.
    Announced { id: TrackId, label: String },
    /// Aim returned to the object announced last; nothing to say.
    Suppressed { id: TrackId },
    Lost { id: TrackId },
}

enum Step {
    Gone,
    AlreadyAnnounced,
    Progress(f32),
    Announced(String),
}

pub struct DwellStateMachine {
    settings: DwellSettings,
    state: PointingState,
    phase: DwellPhase,
    /// Most recent non-empty target, kept across a loss.
    last_target: Option<TrackId>,
}

impl DwellStateMachine {
    pub fn new(settings: DwellSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            state: PointingState::default(),
            phase: DwellPhase::Idle,
            last_target: None,
        })
    }

    pub fn state(&self) -> &PointingState {
        &self.state
    }

    pub fn phase(&self) -> DwellPhase {
        self.phase
    }

    pub fn required_secs(&self) -> f32 {
        self.settings.required_secs
    }

    /// Advance with the target resolved this cycle.
    pub fn advance(
        &mut self,
        tracker: &mut ObjectTracker,
        target: Option<TrackId>,
        delta_secs: f32,
    ) -> Vec<DwellEvent> {
        let mut events = Vec::new();
        let Some(id) = target.filter(|id| tracker.get(*id).is_some()) else {
            self.lose(&mut events);
            return events;
        };

        if self.state.current_target == Some(id) {
            self.continue_dwell(tracker, id, delta_secs, &mut events);
            return events;
        }

        if let Some(previous) = self.state.current_target {
            log::debug!("aim moved from {} to {}", previous, id);
        }

        if self.state.last_announced == Some(id) {
            self.state.current_target = Some(id);
            self.last_target = Some(id);
            self.state.dwell_progress = 1.0;
            self.phase = DwellPhase::Announced;
            events.push(DwellEvent::Suppressed { id });
            return events;
        }

        let resuming = self.state.current_target.is_none()
            && self.last_target == Some(id)
            && tracker.get(id).is_some_and(|o| !o.announced);
        self.state.current_target = Some(id);
        self.last_target = Some(id);

        if resuming {
            let progress = self.progress_of(tracker, id);
            self.state.dwell_progress = progress;
            self.phase = DwellPhase::Dwelling;
            events.push(DwellEvent::Resumed { id, progress });
            self.continue_dwell(tracker, id, delta_secs, &mut events);
            return events;
        }

        tracker.clear_announced(id);
        tracker.reset_dwell(id);
        self.state.last_announced = None;
        self.state.dwell_progress = 0.0;
        self.phase = DwellPhase::Acquiring;
        let label = tracker
            .get(id)
            .map(|o| o.label.clone())
            .unwrap_or_default();
        events.push(DwellEvent::Acquired { id, label });

        // The acquiring cycle counts toward dwell but keeps the "just acquired" cue.
        match self.accumulate(tracker, id, delta_secs) {
            Step::Announced(label) => events.push(DwellEvent::Announced { id, label }),
            Step::Progress(progress) => self.state.dwell_progress = progress,
            Step::Gone | Step::AlreadyAnnounced => {}
        }
        events
    }

    /// Advance the held target between detection cycles.
    pub fn tick(&mut self, tracker: &mut ObjectTracker, delta_secs: f32) -> Vec<DwellEvent> {
        match self.state.current_target {
            Some(id) => self.advance(tracker, Some(id), delta_secs),
            None => Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.state = PointingState::default();
        self.phase = DwellPhase::Idle;
        self.last_target = None;
    }

    fn continue_dwell(
        &mut self,
        tracker: &mut ObjectTracker,
        id: TrackId,
        delta_secs: f32,
        events: &mut Vec<DwellEvent>,
    ) {
        match self.accumulate(tracker, id, delta_secs) {
            Step::Gone => self.lose(events),
            Step::AlreadyAnnounced => {
                self.state.dwell_progress = 1.0;
                self.phase = DwellPhase::Announced;
            }
            Step::Progress(progress) => {
                self.state.dwell_progress = progress;
                self.phase = DwellPhase::Dwelling;
                events.push(DwellEvent::Progress { id, progress });
            }
            Step::Announced(label) => events.push(DwellEvent::Announced { id, label }),
        }
    }

    fn accumulate(&mut self, tracker: &mut ObjectTracker, id: TrackId, delta_secs: f32) -> Step {
        let already = match tracker.get(id) {
            Some(object) => object.announced,
            None => return Step::Gone,
        };
        if already {
            return Step::AlreadyAnnounced;
        }
        let Some(dwell) = tracker.dwell_tick(id, delta_secs) else {
            return Step::Gone;
        };
        if dwell + DWELL_EPSILON < self.settings.required_secs {
            return Step::Progress(dwell / self.settings.required_secs);
        }
        tracker.mark_announced(id);
        self.state.last_announced = Some(id);
        self.state.dwell_progress = 1.0;
        self.phase = DwellPhase::Announced;
        let label = tracker
            .get(id)
            .map(|o| o.label.clone())
            .unwrap_or_default();
        log::info!("announcing {} ({}) after {:.2}s", id, label, dwell);
        Step::Announced(label)
    }

    fn progress_of(&self, tracker: &ObjectTracker, id: TrackId) -> f32 {
        tracker
            .get(id)
            .map(|o| (o.dwell_secs / self.settings.required_secs).min(1.0))
            .unwrap_or(0.0)
    }

    fn lose(&mut self, events: &mut Vec<DwellEvent>) {
        if let Some(id) = self.state.current_target.take() {
            events.push(DwellEvent::Lost { id });
        }
        self.state.dwell_progress = 0.0;
        self.phase = DwellPhase::Idle;
    }
}
