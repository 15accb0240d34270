//! Object tracker.
//!
//! Keeps stable identities for detected objects across detection cycles:
//!
//! 1. Each existing object, in insertion order, takes the best unmatched detection
//!    with the same label. A detection is eligible when its IoU with the tracked box
//!    exceeds `iou_threshold` or its centroid lies closer than `centroid_threshold`;
//!    the eligible one with the highest IoU wins (earliest on ties). Greedy, no global
//!    assignment.
//! 2. Matched objects take the new box and confidence; identity, dwell and the
//!    announced flag are kept.
//! 3. Leftover detections become new objects.
//! 4. Objects unseen for more than `max_frames_unseen` cycles are evicted.

use std::fmt;

use anyhow::{anyhow, Result};

use crate::detect::Detection;
use crate::geometry::BoundingBox;

pub const DEFAULT_IOU_THRESHOLD: f32 = 0.3;
pub const DEFAULT_CENTROID_THRESHOLD: f32 = 0.1;
/// About one second at the nominal detection rate.
pub const DEFAULT_MAX_FRAMES_UNSEEN: u64 = 5;

/// Opaque identity of a tracked object. Never reused within a tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "track-{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrackedObject {
    pub id: TrackId,
    pub label: String,
    pub bbox: BoundingBox,
    pub confidence: f32,
    /// Tracker cycle in which the object was last matched.
    pub last_seen_frame: u64,
    /// Seconds accumulated while this object was the pointing target.
    pub dwell_secs: f32,
    pub announced: bool,
    /// Seconds since the object was first tracked.
    pub age_secs: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrackerSettings {
    pub iou_threshold: f32,
    pub centroid_threshold: f32,
    pub max_frames_unseen: u64,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            centroid_threshold: DEFAULT_CENTROID_THRESHOLD,
            max_frames_unseen: DEFAULT_MAX_FRAMES_UNSEEN,
        }
    }
}

impl TrackerSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.iou_threshold > 0.0 && self.iou_threshold <= 1.0) {
            return Err(anyhow!(
                "iou_threshold must be within (0, 1], got {}",
                self.iou_threshold
            ));
        }
        if !(self.centroid_threshold > 0.0 && self.centroid_threshold.is_finite()) {
            return Err(anyhow!(
                "centroid_threshold must be positive, got {}",
                self.centroid_threshold
            ));
        }
        if self.max_frames_unseen == 0 {
            return Err(anyhow!("max_frames_unseen must be at least 1"));
        }
        Ok(())
    }
}

pub struct ObjectTracker {
    settings: TrackerSettings,
    objects: Vec<TrackedObject>,
    frame: u64,
    next_id: u64,
}

impl ObjectTracker {
    pub fn new(settings: TrackerSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            objects: Vec::new(),
            frame: 0,
            next_id: 1,
        })
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    /// Current tracker cycle.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn objects(&self) -> &[TrackedObject] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Advance the age of every tracked object.
    pub fn age(&mut self, delta_secs: f32) {
        for object in &mut self.objects {
            object.age_secs += delta_secs.max(0.0);
        }
    }

    /// Reconcile one detection cycle with the tracked set.
    pub fn update(&mut self, detections: &[Detection], delta_secs: f32) -> &[TrackedObject] {
        self.frame += 1;
        let frame = self.frame;
        let mut used = vec![false; detections.len()];
        let mut matched = vec![false; self.objects.len()];

        for (slot, object) in self.objects.iter_mut().enumerate() {
            let Some(best) = best_candidate(object, detections, &used, &self.settings) else {
                continue;
            };
            used[best] = true;
            matched[slot] = true;
            let det = &detections[best];
            object.bbox = det.bbox;
            object.confidence = det.confidence;
            object.last_seen_frame = frame;
        }

        let max_unseen = self.settings.max_frames_unseen;
        let mut slot = 0;
        self.objects.retain(|object| {
            let keep = matched[slot] || frame - object.last_seen_frame <= max_unseen;
            if !keep {
                log::debug!("evicting {} ({})", object.id, object.label);
            }
            slot += 1;
            keep
        });

        self.age(delta_secs);

        for (det, _) in detections.iter().zip(&used).filter(|(_, used)| !**used) {
            let id = TrackId(self.next_id);
            self.next_id += 1;
            log::debug!("tracking {} ({})", id, det.label);
            self.objects.push(TrackedObject {
                id,
                label: det.label.clone(),
                bbox: det.bbox,
                confidence: det.confidence,
                last_seen_frame: frame,
                dwell_secs: 0.0,
                announced: false,
                age_secs: 0.0,
            });
        }

        &self.objects
    }

    /// Advance one object's dwell without a new detection. Returns the new dwell.
    pub fn dwell_tick(&mut self, id: TrackId, delta_secs: f32) -> Option<f32> {
        let object = self.get_mut(id)?;
        object.dwell_secs += delta_secs.max(0.0);
        Some(object.dwell_secs)
    }

    pub fn mark_announced(&mut self, id: TrackId) -> bool {
        self.set_announced(id, true)
    }

    pub fn clear_announced(&mut self, id: TrackId) -> bool {
        self.set_announced(id, false)
    }

    pub fn reset_dwell(&mut self, id: TrackId) -> bool {
        match self.get_mut(id) {
            Some(object) => {
                object.dwell_secs = 0.0;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: TrackId) -> Option<&TrackedObject> {
        self.objects.iter().find(|o| o.id == id)
    }

    /// Drop every tracked object. Identities are not reused afterwards.
    pub fn reset(&mut self) {
        self.objects.clear();
        self.frame = 0;
    }

    fn get_mut(&mut self, id: TrackId) -> Option<&mut TrackedObject> {
        self.objects.iter_mut().find(|o| o.id == id)
    }

    fn set_announced(&mut self, id: TrackId, announced: bool) -> bool {
        match self.get_mut(id) {
            Some(object) => {
                object.announced = announced;
                true
            }
            None => false,
        }
    }
}

/// Index of the best eligible unmatched detection for `object`.
fn best_candidate(
    object: &TrackedObject,
    detections: &[Detection],
    used: &[bool],
    settings: &TrackerSettings,
) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, det) in detections.iter().enumerate() {
        if used[idx] || det.label != object.label {
            continue;
        }
        let iou = object.bbox.iou(&det.bbox);
        let eligible = iou > settings.iou_threshold
            || object.bbox.centroid_distance(&det.bbox) < settings.centroid_threshold;
        if !eligible {
            continue;
        }
        if best.map_or(true, |(_, best_iou)| iou > best_iou) {
            best = Some((idx, iou));
        }
    }
    best.map(|(idx, _)| idx)
}
