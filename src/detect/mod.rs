//! Model adapters consumed by the analyzer.
//!
//! The analyzer only sees the traits in `backend`; concrete models live in
//! `backends` (scripted stubs, and ONNX via tract behind `backend-tract`).

mod backend;
pub mod backends;
mod context;
mod result;

pub use backend::{softmax, AuxiliaryClassifier, ClassScores, ImageClassifier, ObjectDetector};
pub use backends::{StubAuxiliaryClassifier, StubClassifier, StubDetector};
pub use context::ModelContext;
pub use result::{iou, merge_overlapping, AuxiliaryLabel, BoundingBox, RawDetection};
