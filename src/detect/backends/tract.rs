#![cfg(feature = "backend-tract")]

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::{softmax, AuxiliaryClassifier, ClassScores, ImageClassifier, ObjectDetector};
use crate::detect::result::{merge_overlapping, AuxiliaryLabel, BoundingBox, RawDetection};
use crate::frame::Frame;

type Plan = TypedRunnableModel<TypedModel>;

/// Per-channel normalisation applied after scaling pixels to `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Normalization {
    /// Plain `[0, 1]` scaling.
    pub const UNIT: Normalization = Normalization {
        mean: [0.0, 0.0, 0.0],
        std: [1.0, 1.0, 1.0],
    };

    pub const IMAGENET: Normalization = Normalization {
        mean: [0.485, 0.456, 0.406],
        std: [0.229, 0.224, 0.225],
    };

    /// Symmetric `[-1, 1]` scaling used by ViT checkpoints.
    pub const HALF: Normalization = Normalization {
        mean: [0.5, 0.5, 0.5],
        std: [0.5, 0.5, 0.5],
    };
}

fn load_plan(model_path: &Path, width: u32, height: u32) -> Result<Plan> {
    tract_onnx::onnx()
        .model_for_path(model_path)
        .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
        .with_input_fact(
            0,
            InferenceFact::dt_shape(
                f32::datum_type(),
                tvec!(1, 3, height as usize, width as usize),
            ),
        )
        .context("failed to set input fact")?
        .into_optimized()
        .context("failed to optimize ONNX model")?
        .into_runnable()
        .context("failed to build runnable ONNX model")
}

/// Resize a frame to the model input and lay it out as NCHW f32.
fn build_input(frame: &Frame, width: u32, height: u32, norm: Normalization) -> Result<Tensor> {
    let resized = frame.resized(width, height)?;
    let pixels = resized.pixels();
    let w = width as usize;
    let input = tract_ndarray::Array4::from_shape_fn(
        (1, 3, height as usize, w),
        |(_, channel, y, x)| {
            let value = pixels[(y * w + x) * 3 + channel] as f32 / 255.0;
            (value - norm.mean[channel]) / norm.std[channel]
        },
    );
    Ok(input.into_tensor())
}

fn first_output(outputs: &TVec<TValue>) -> Result<Vec<f32>> {
    let output = outputs
        .first()
        .ok_or_else(|| anyhow!("model produced no outputs"))?;
    let view = output
        .to_array_view::<f32>()
        .context("model output tensor was not f32")?;
    Ok(view.iter().copied().collect())
}

/// Decoder for YOLOv8 output tensors.
///
/// Expects a single output of shape `[1, 4 + classes, anchors]` with
/// centre-format boxes in model input pixels followed by per-class scores.
#[derive(Clone, Debug)]
struct YoloDecoder {
    input_width: u32,
    input_height: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
    max_detections: usize,
    class_map: HashMap<u32, u32>,
}

impl YoloDecoder {
    fn new(input_width: u32, input_height: u32) -> Self {
        Self {
            input_width,
            input_height,
            confidence_threshold: 0.55,
            iou_threshold: 0.45,
            max_detections: 10,
            class_map: HashMap::new(),
        }
    }

    /// Boxes in `frame_width` x `frame_height` pixels, merged and truncated.
    fn decode(
        &self,
        raw: &[f32],
        shape: &[usize],
        frame_width: u32,
        frame_height: u32,
    ) -> Result<Vec<RawDetection>> {
        let (rows, anchors) = match shape {
            [1, rows, anchors] if *rows > 4 => (*rows, *anchors),
            other => return Err(anyhow!("unexpected detector output shape {:?}", other)),
        };
        if raw.len() != rows * anchors {
            return Err(anyhow!(
                "detector output has {} values, shape {:?} needs {}",
                raw.len(),
                shape,
                rows * anchors
            ));
        }
        let scale_x = frame_width as f32 / self.input_width as f32;
        let scale_y = frame_height as f32 / self.input_height as f32;
        let at = |row: usize, anchor: usize| raw[row * anchors + anchor];

        let mut candidates = Vec::new();
        for anchor in 0..anchors {
            let mut best: Option<(usize, f32)> = None;
            for class in 0..rows - 4 {
                let score = at(4 + class, anchor);
                if best.map_or(true, |(_, s)| score > s) {
                    best = Some((class, score));
                }
            }
            let Some((class, score)) = best else { continue };
            if score < self.confidence_threshold {
                continue;
            }
            let (cx, cy, w, h) = (at(0, anchor), at(1, anchor), at(2, anchor), at(3, anchor));
            let bbox = BoundingBox::new(
                (cx - w / 2.0) * scale_x,
                (cy - h / 2.0) * scale_y,
                (cx + w / 2.0) * scale_x,
                (cy + h / 2.0) * scale_y,
            )
            .clamped(frame_width, frame_height);
            let class = class as u32;
            candidates.push(RawDetection {
                label_id: self.class_map.get(&class).copied().unwrap_or(class),
                confidence: score.clamp(0.0, 1.0),
                bbox,
            });
        }

        let mut kept = merge_overlapping(candidates, self.iou_threshold);
        kept.truncate(self.max_detections);
        Ok(kept)
    }
}

/// YOLOv8-style ONNX detector.
pub struct TractDetector {
    plan: Plan,
    decoder: YoloDecoder,
}

impl TractDetector {
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        Ok(Self {
            plan: load_plan(model_path.as_ref(), width, height)?,
            decoder: YoloDecoder::new(width, height),
        })
    }

    pub fn with_thresholds(mut self, confidence: f32, iou: f32) -> Self {
        self.decoder.confidence_threshold = confidence;
        self.decoder.iou_threshold = iou;
        self
    }

    pub fn with_max_detections(mut self, max_detections: usize) -> Self {
        self.decoder.max_detections = max_detections;
        self
    }

    /// Translate model class ids into label ids. Unmapped ids pass through.
    pub fn with_class_map(mut self, class_map: HashMap<u32, u32>) -> Self {
        self.decoder.class_map = class_map;
        self
    }
}

impl ObjectDetector for TractDetector {
    fn name(&self) -> &'static str {
        "tract-yolo"
    }

    fn detect(&self, frame: &Frame) -> Result<Vec<RawDetection>> {
        let input = build_input(
            frame,
            self.decoder.input_width,
            self.decoder.input_height,
            Normalization::UNIT,
        )?;
        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .context("detector inference failed")?;
        let shape = outputs
            .first()
            .map(|o| o.shape().to_vec())
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let raw = first_output(&outputs)?;
        self.decoder.decode(&raw, &shape, frame.width, frame.height)
    }
}

/// ImageNet-style ONNX classifier producing one logit per label id.
pub struct TractClassifier {
    plan: Plan,
    size: u32,
}

impl TractClassifier {
    pub fn new<P: AsRef<Path>>(model_path: P, size: u32) -> Result<Self> {
        Ok(Self {
            plan: load_plan(model_path.as_ref(), size, size)?,
            size,
        })
    }
}

impl ImageClassifier for TractClassifier {
    fn name(&self) -> &'static str {
        "tract-classifier"
    }

    fn classify(&self, frame: &Frame) -> Result<ClassScores> {
        let input = build_input(frame, self.size, self.size, Normalization::IMAGENET)?;
        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .context("classifier inference failed")?;
        Ok(ClassScores::Logits(first_output(&outputs)?))
    }
}

/// ONNX classifier with its own label vocabulary read from a text file
/// (one label per line, line number = class index).
pub struct TractAuxiliaryClassifier {
    plan: Plan,
    size: u32,
    labels: Vec<String>,
}

impl TractAuxiliaryClassifier {
    pub fn new<P: AsRef<Path>, L: AsRef<Path>>(model_path: P, labels_path: L, size: u32) -> Result<Self> {
        let labels_path = labels_path.as_ref();
        let raw = std::fs::read_to_string(labels_path)
            .with_context(|| format!("failed to read labels file {}", labels_path.display()))?;
        let labels: Vec<String> = raw.lines().map(|l| l.trim().to_string()).collect();
        if labels.is_empty() {
            return Err(anyhow!("labels file {} is empty", labels_path.display()));
        }
        Ok(Self {
            plan: load_plan(model_path.as_ref(), size, size)?,
            size,
            labels,
        })
    }
}

impl AuxiliaryClassifier for TractAuxiliaryClassifier {
    fn name(&self) -> &'static str {
        "tract-auxiliary"
    }

    fn classify(&self, frame: &Frame) -> Result<AuxiliaryLabel> {
        let input = build_input(frame, self.size, self.size, Normalization::HALF)?;
        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .context("auxiliary inference failed")?;
        let probabilities = softmax(&first_output(&outputs)?);
        let (index, score) = ClassScores::Probabilities(probabilities)
            .top()
            .ok_or_else(|| anyhow!("auxiliary model produced no scores"))?;
        let label = self
            .labels
            .get(index as usize)
            .cloned()
            .unwrap_or_else(|| format!("LABEL_{}", index));
        Ok(AuxiliaryLabel { label, score })
    }
}
