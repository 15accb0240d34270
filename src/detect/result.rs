use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::BoundingBox;

/// One labeled object found in a single image.
///
/// Ephemeral: produced by a backend and consumed by one tracker update.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }

    /// Clamp to the unit frame and drop unusable detections.
    pub fn normalized(self, min_confidence: f32) -> Option<Detection> {
        if !self.confidence.is_finite() || self.label.trim().is_empty() {
            return None;
        }
        let confidence = self.confidence.clamp(0.0, 1.0);
        if confidence < min_confidence {
            return None;
        }
        let bbox = self.bbox.clamped()?;
        Some(Detection {
            label: self.label,
            confidence,
            bbox,
        })
    }
}

/// Normalize a whole detection batch, preserving order.
pub fn normalize_detections(detections: Vec<Detection>, min_confidence: f32) -> Vec<Detection> {
    detections
        .into_iter()
        .filter_map(|d| d.normalized(min_confidence))
        .collect()
}

/// Which detector serves a cycle.
///
/// Remote wins whenever its connection is live; Local is used only when enabled
/// and Remote is down.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorMode {
    Remote,
    Local,
}

impl fmt::Display for DetectorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorMode::Remote => f.write_str("remote"),
            DetectorMode::Local => f.write_str("local"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_clamps_and_filters() {
        let batch = vec![
            Detection::new("cup", 1.4, BoundingBox::new(0.9, 0.9, 0.3, 0.3)),
            Detection::new("book", 0.1, BoundingBox::new(0.1, 0.1, 0.1, 0.1)),
            Detection::new("", 0.9, BoundingBox::new(0.1, 0.1, 0.1, 0.1)),
            Detection::new("chair", 0.8, BoundingBox::new(0.2, 0.2, 0.0, 0.1)),
        ];
        let out = normalize_detections(batch, 0.25);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].label, "cup");
        assert_eq!(out[0].confidence, 1.0);
        assert!(out[0].bbox.right() <= 1.0);
    }
}
