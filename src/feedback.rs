//! Audio/haptic and speech output seams.
//!
//! The core never renders sound itself. It drives two collaborators:
//! `CueOutput` (continuous cue, announcement cue) and `SpeechOutput` (spoken label).
//! `FeedbackDriver` turns dwell events into calls on them and keeps the continuous
//! cue from being stopped twice or left running after an announcement.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::dwell::DwellEvent;

pub trait CueOutput {
    /// Start or update the continuous cue. `intensity` is within 0..=1.
    fn play_continuous_cue(&mut self, intensity: f32);
    fn stop_continuous_cue(&mut self);
    fn play_announcement_cue(&mut self);
}

pub trait SpeechOutput {
    fn speak(&mut self, text: &str);
}

/// Mapping from dwell progress to continuous cue intensity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CueCurve {
    /// Loud when just acquired, fading out as the threshold nears.
    #[default]
    FadeOut,
    /// Quiet when just acquired, rising toward the threshold.
    RampUp,
}

impl CueCurve {
    pub fn intensity(self, progress: f32) -> f32 {
        let progress = progress.clamp(0.0, 1.0);
        match self {
            CueCurve::FadeOut => 1.0 - progress,
            CueCurve::RampUp => progress,
        }
    }
}

/// User-facing text for a detector label: `cell_phone` -> `cell phone`.
pub fn announcement_text(label: &str) -> String {
    label
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct FeedbackDriver {
    cue: Box<dyn CueOutput>,
    speech: Box<dyn SpeechOutput>,
    curve: CueCurve,
    cue_playing: bool,
}

impl FeedbackDriver {
    pub fn new(cue: Box<dyn CueOutput>, speech: Box<dyn SpeechOutput>, curve: CueCurve) -> Self {
        Self {
            cue,
            speech,
            curve,
            cue_playing: false,
        }
    }

    pub fn curve(&self) -> CueCurve {
        self.curve
    }

    pub fn is_cue_playing(&self) -> bool {
        self.cue_playing
    }

    pub fn dispatch(&mut self, events: &[DwellEvent]) {
        for event in events {
            match event {
                DwellEvent::Acquired { .. } => self.play(0.0),
                DwellEvent::Resumed { progress, .. } | DwellEvent::Progress { progress, .. } => {
                    self.play(*progress)
                }
                DwellEvent::Announced { label, .. } => {
                    self.silence();
                    self.cue.play_announcement_cue();
                    self.speech.speak(&announcement_text(label));
                }
                DwellEvent::Suppressed { .. } | DwellEvent::Lost { .. } => self.silence(),
            }
        }
    }

    /// Stop the continuous cue if it is running.
    pub fn silence(&mut self) {
        if self.cue_playing {
            self.cue.stop_continuous_cue();
            self.cue_playing = false;
        }
    }

    fn play(&mut self, progress: f32) {
        self.cue.play_continuous_cue(self.curve.intensity(progress));
        self.cue_playing = true;
    }
}

// ----------------------------------------------------------------------------
// Log-backed outputs
// ----------------------------------------------------------------------------

/// Writes cues to the log. Useful headless and in demos.
#[derive(Default)]
pub struct LogCueOutput;

impl CueOutput for LogCueOutput {
    fn play_continuous_cue(&mut self, intensity: f32) {
        log::trace!("cue intensity {:.2}", intensity);
    }

    fn stop_continuous_cue(&mut self) {
        log::debug!("cue stopped");
    }

    fn play_announcement_cue(&mut self) {
        log::info!("announcement cue");
    }
}

#[derive(Default)]
pub struct LogSpeechOutput;

impl SpeechOutput for LogSpeechOutput {
    fn speak(&mut self, text: &str) {
        log::info!("speak: \"{}\"", text);
    }
}

// ----------------------------------------------------------------------------
// Recording output
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub enum FeedbackCall {
    Continuous(f32),
    Stop,
    AnnouncementCue,
    Speak(String),
}

/// Records every call. Clone it before handing it to the driver to inspect later.
#[derive(Clone, Default)]
pub struct FeedbackRecorder {
    calls: Arc<Mutex<Vec<FeedbackCall>>>,
}

impl FeedbackRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<FeedbackCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn spoken(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                FeedbackCall::Speak(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: FeedbackCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl CueOutput for FeedbackRecorder {
    fn play_continuous_cue(&mut self, intensity: f32) {
        self.record(FeedbackCall::Continuous(intensity));
    }

    fn stop_continuous_cue(&mut self) {
        self.record(FeedbackCall::Stop);
    }

    fn play_announcement_cue(&mut self) {
        self.record(FeedbackCall::AnnouncementCue);
    }
}

impl SpeechOutput for FeedbackRecorder {
    fn speak(&mut self, text: &str) {
        self.record(FeedbackCall::Speak(text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::{ObjectTracker, TrackerSettings};
    use crate::detect::Detection;
    use crate::geometry::BoundingBox;

    fn some_id() -> crate::track::TrackId {
        let mut tracker = ObjectTracker::new(TrackerSettings::default()).unwrap();
        tracker.update(
            &[Detection::new("cup", 0.9, BoundingBox::new(0.1, 0.1, 0.1, 0.1))],
            0.0,
        )[0]
        .id
    }

    #[test]
    fn label_normalization() {
        assert_eq!(announcement_text("cell_phone"), "cell phone");
        assert_eq!(announcement_text("  teddy__bear "), "teddy bear");
        assert_eq!(announcement_text("cup"), "cup");
    }

    #[test]
    fn curves_hit_their_extremes() {
        assert_eq!(CueCurve::FadeOut.intensity(0.0), 1.0);
        assert_eq!(CueCurve::FadeOut.intensity(1.0), 0.0);
        assert_eq!(CueCurve::RampUp.intensity(0.0), 0.0);
        assert_eq!(CueCurve::RampUp.intensity(2.0), 1.0);
    }

    #[test]
    fn announcement_silences_cue_then_speaks() {
        let recorder = FeedbackRecorder::new();
        let mut driver = FeedbackDriver::new(
            Box::new(recorder.clone()),
            Box::new(recorder.clone()),
            CueCurve::FadeOut,
        );
        let id = some_id();
        driver.dispatch(&[
            DwellEvent::Acquired {
                id,
                label: "cell_phone".into(),
            },
            DwellEvent::Progress { id, progress: 0.5 },
            DwellEvent::Announced {
                id,
                label: "cell_phone".into(),
            },
            DwellEvent::Lost { id },
        ]);
        assert_eq!(
            recorder.calls(),
            vec![
                FeedbackCall::Continuous(1.0),
                FeedbackCall::Continuous(0.5),
                FeedbackCall::Stop,
                FeedbackCall::AnnouncementCue,
                FeedbackCall::Speak("cell phone".into()),
            ]
        );
        assert!(!driver.is_cue_playing());
    }

    #[test]
    fn silence_is_idempotent() {
        let recorder = FeedbackRecorder::new();
        let mut driver = FeedbackDriver::new(
            Box::new(recorder.clone()),
            Box::new(recorder.clone()),
            CueCurve::RampUp,
        );
        driver.silence();
        let id = some_id();
        driver.dispatch(&[DwellEvent::Suppressed { id }, DwellEvent::Lost { id }]);
        assert!(recorder.calls().is_empty());
    }
}
