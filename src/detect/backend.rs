use anyhow::Result;

use crate::detect::result::{AuxiliaryLabel, RawDetection};
use crate::frame::Frame;

/// Object detector contract.
///
/// Implementations are loaded once at startup and shared across analysis
/// calls, so inference takes `&self`. Thresholds and device placement are
/// fixed at construction and MUST NOT change afterwards.
pub trait ObjectDetector: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame. May return an empty vector.
    ///
    /// Confidences must be in `[0, 1]`; boxes are in the frame's pixel space.
    fn detect(&self, frame: &Frame) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook.
    fn warm_up(&self) -> Result<()> {
        Ok(())
    }
}

/// Primary classifier contract: one score per label id.
pub trait ImageClassifier: Send + Sync {
    fn name(&self) -> &'static str;

    fn classify(&self, frame: &Frame) -> Result<ClassScores>;

    fn warm_up(&self) -> Result<()> {
        Ok(())
    }
}

/// Auxiliary classifier contract: the single best guess from an independent
/// vocabulary.
pub trait AuxiliaryClassifier: Send + Sync {
    fn name(&self) -> &'static str;

    fn classify(&self, frame: &Frame) -> Result<AuxiliaryLabel>;
}

/// Scores over the primary classifier's label ids, indexed by label id.
#[derive(Clone, Debug, PartialEq)]
pub enum ClassScores {
    /// Already a probability distribution.
    Probabilities(Vec<f32>),
    /// Raw logits; normalised with softmax before use.
    Logits(Vec<f32>),
}

impl ClassScores {
    /// Probability distribution over label ids.
    pub fn probabilities(&self) -> Vec<f32> {
        match self {
            ClassScores::Probabilities(p) => p.clone(),
            ClassScores::Logits(logits) => softmax(logits),
        }
    }

    /// Highest-probability label id and its probability.
    ///
    /// Ties resolve to the lowest label id. `None` for an empty distribution.
    pub fn top(&self) -> Option<(u32, f32)> {
        let probabilities = self.probabilities();
        let mut best: Option<(usize, f32)> = None;
        for (index, p) in probabilities.iter().copied().enumerate() {
            if !p.is_finite() {
                continue;
            }
            match best {
                Some((_, best_p)) if p <= best_p => {}
                _ => best = Some((index, p)),
            }
        }
        best.map(|(index, p)| (index as u32, p))
    }
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return vec![0.0; logits.len()];
    }
    let exps: Vec<f32> = logits
        .iter()
        .map(|v| if v.is_finite() { (v - max).exp() } else { 0.0 })
        .collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
