//! Garment Lens
//!
//! Turns a single clothing photo into a structured description: whether a
//! garment is present, its detections, a coarse category and subcategory,
//! a dominant color palette, and a style label.
//!
//! # Architecture
//!
//! Models are loaded once into a [`ModelContext`] and handed to an
//! [`OutfitAnalyzer`], which owns the bounded result cache:
//!
//! 1. cache lookup by image identity (hit returns immediately)
//! 2. object detection, filtered to the known clothing labels
//! 3. primary classification (top label, ties to the lowest id)
//! 4. k-means palette extraction
//! 5. rule-based category / subcategory / style mapping
//! 6. optional auxiliary classification
//! 7. result assembly and FIFO cache insert
//!
//! # Module Structure
//!
//! - `frame`: decoded RGB images and pixel masks
//! - `detect`: model traits, stub and ONNX backends, IoU helpers
//! - `color`: palette extraction
//! - `mapper`: label and style tables
//! - `cache`: FIFO result cache
//! - `analysis`: result types and JSON schema
//! - `analyzer`: the pipeline
//! - `config`: file + environment configuration

pub mod analysis;
pub mod analyzer;
pub mod cache;
pub mod color;
pub mod config;
pub mod detect;
pub mod frame;
pub mod mapper;

pub use analysis::{
    AnalysisResult, Detection, DetectionSummary, GarmentAnalysis, GarmentReport, WardrobeEntry,
};
pub use analyzer::OutfitAnalyzer;
pub use cache::{CacheStats, FifoCache};
pub use color::{ColorExtractor, ColorSwatch};
pub use config::{AnalyzerConfig, CacheKeyMode, ColorSettings};
pub use detect::{
    iou, merge_overlapping, AuxiliaryClassifier, AuxiliaryLabel, BoundingBox, ClassScores,
    ImageClassifier, ModelContext, ObjectDetector, RawDetection,
};
pub use frame::{Frame, Mask};
