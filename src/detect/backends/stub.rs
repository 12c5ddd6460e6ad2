use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{anyhow, Result};

use crate::detect::backend::{AuxiliaryClassifier, ClassScores, ImageClassifier, ObjectDetector};
use crate::detect::result::{AuxiliaryLabel, BoundingBox, RawDetection};
use crate::frame::Frame;

/// Scripted detector for tests and the demo. Returns the same detections
/// for every frame, with boxes clamped to the frame.
pub struct StubDetector {
    detections: Vec<RawDetection>,
    fail: bool,
    calls: AtomicUsize,
}

impl StubDetector {
    pub fn new(detections: Vec<RawDetection>) -> Self {
        Self {
            detections,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Detector that finds nothing.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// One full-frame detection of `label_id`.
    pub fn single(label_id: u32, confidence: f32) -> Self {
        Self::new(vec![RawDetection {
            label_id,
            confidence,
            bbox: BoundingBox::new(0.0, 0.0, f32::MAX, f32::MAX),
        }])
    }

    /// Detector whose every call errors.
    pub fn failing() -> Self {
        Self {
            detections: Vec::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `detect` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ObjectDetector for StubDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&self, frame: &Frame) -> Result<Vec<RawDetection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(anyhow!("stub detector configured to fail"));
        }
        Ok(self
            .detections
            .iter()
            .map(|d| RawDetection {
                bbox: d.bbox.clamped(frame.width, frame.height),
                ..*d
            })
            .collect())
    }
}

/// Scripted primary classifier.
pub struct StubClassifier {
    scores: ClassScores,
}

impl StubClassifier {
    pub fn new(scores: ClassScores) -> Self {
        Self { scores }
    }

    /// Distribution over `label_count` ids putting `confidence` on `label_id`
    /// and spreading the rest evenly.
    pub fn peaked(label_id: u32, confidence: f32, label_count: usize) -> Self {
        let label_count = label_count.max(label_id as usize + 1);
        let rest = if label_count > 1 {
            (1.0 - confidence) / (label_count - 1) as f32
        } else {
            0.0
        };
        let mut probabilities = vec![rest; label_count];
        probabilities[label_id as usize] = confidence;
        Self::new(ClassScores::Probabilities(probabilities))
    }
}

impl ImageClassifier for StubClassifier {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn classify(&self, _frame: &Frame) -> Result<ClassScores> {
        Ok(self.scores.clone())
    }
}

/// Scripted auxiliary classifier.
pub struct StubAuxiliaryClassifier {
    label: Option<AuxiliaryLabel>,
}

impl StubAuxiliaryClassifier {
    pub fn new(label: &str, score: f32) -> Self {
        Self {
            label: Some(AuxiliaryLabel {
                label: label.to_string(),
                score,
            }),
        }
    }

    /// Auxiliary classifier whose every call errors.
    pub fn failing() -> Self {
        Self { label: None }
    }
}

impl AuxiliaryClassifier for StubAuxiliaryClassifier {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn classify(&self, _frame: &Frame) -> Result<AuxiliaryLabel> {
        self.label
            .clone()
            .ok_or_else(|| anyhow!("stub auxiliary classifier configured to fail"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_detector_clamps_boxes_and_counts_calls() -> Result<()> {
        let detector = StubDetector::single(401, 0.9);
        let frame = Frame::filled(4, 3, [0, 0, 0])?;

        let detections = detector.detect(&frame)?;
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].bbox, BoundingBox::new(0.0, 0.0, 4.0, 3.0));
        assert_eq!(detector.calls(), 1);

        assert!(StubDetector::failing().detect(&frame).is_err());
        Ok(())
    }

    #[test]
    fn peaked_classifier_puts_mass_on_label() -> Result<()> {
        let classifier = StubClassifier::peaked(401, 0.8, 1000);
        let frame = Frame::filled(1, 1, [0, 0, 0])?;
        let (label, p) = classifier.classify(&frame)?.top().unwrap();
        assert_eq!(label, 401);
        assert!((p - 0.8).abs() < 1e-6);
        Ok(())
    }
}
