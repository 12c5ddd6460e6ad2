//! Analysis result types and their JSON shape.
//!
//! ```json
//! {
//!   "present": true,
//!   "detections": { "labels": [{"class": "...", "confidence": 0.9, "box": [x1, y1, x2, y2]}],
//!                   "topConfidence": 0.8 },
//!   "analysis": { "category": "...", "subcategory": "...", "colors": ["#rrggbb"],
//!                 "style": "...", "auxiliary": {"label": "...", "score": 0.5} }
//! }
//! ```
//!
//! A not-present result serializes as `{"present": false}` and nothing else.

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::color::ColorSwatch;
use crate::detect::{AuxiliaryLabel, BoundingBox};

/// A qualifying detection, labelled with its category.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "class")]
    pub label: String,
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub labels: Vec<Detection>,
    /// Probability of the primary classifier's top label.
    #[serde(rename = "topConfidence")]
    pub top_confidence: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GarmentAnalysis {
    pub category: String,
    pub subcategory: String,
    /// Palette in clustering order; empty when no color information exists.
    pub colors: Vec<ColorSwatch>,
    pub style: String,
    pub auxiliary: Option<AuxiliaryLabel>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GarmentReport {
    pub detections: DetectionSummary,
    pub analysis: GarmentAnalysis,
}

/// Outcome of one analysis call. Either a full report or "not present".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAnalysisResult")]
pub struct AnalysisResult {
    present: bool,
    #[serde(flatten)]
    report: Option<GarmentReport>,
}

#[derive(Deserialize)]
struct RawAnalysisResult {
    present: bool,
    #[serde(flatten)]
    report: Option<GarmentReport>,
}

impl TryFrom<RawAnalysisResult> for AnalysisResult {
    type Error = anyhow::Error;

    fn try_from(raw: RawAnalysisResult) -> anyhow::Result<Self> {
        match (raw.present, raw.report) {
            (true, Some(report)) => Ok(Self::found(report)),
            (false, _) => Ok(Self::not_present()),
            (true, None) => Err(anyhow!("present result is missing detections/analysis")),
        }
    }
}

impl AnalysisResult {
    /// The canonical "no garment" result.
    pub fn not_present() -> Self {
        Self {
            present: false,
            report: None,
        }
    }

    pub fn found(report: GarmentReport) -> Self {
        Self {
            present: true,
            report: Some(report),
        }
    }

    pub fn is_present(&self) -> bool {
        self.present
    }

    pub fn report(&self) -> Option<&GarmentReport> {
        self.report.as_ref()
    }

    pub fn detections(&self) -> &[Detection] {
        self.report
            .as_ref()
            .map(|r| r.detections.labels.as_slice())
            .unwrap_or(&[])
    }

    pub fn top_confidence(&self) -> Option<f32> {
        self.report.as_ref().map(|r| r.detections.top_confidence)
    }

    pub fn category(&self) -> Option<&str> {
        self.report.as_ref().map(|r| r.analysis.category.as_str())
    }

    pub fn subcategory(&self) -> Option<&str> {
        self.report.as_ref().map(|r| r.analysis.subcategory.as_str())
    }

    pub fn colors(&self) -> &[ColorSwatch] {
        self.report
            .as_ref()
            .map(|r| r.analysis.colors.as_slice())
            .unwrap_or(&[])
    }

    /// First palette entry.
    pub fn dominant_color(&self) -> Option<&ColorSwatch> {
        self.colors().first()
    }

    pub fn style(&self) -> Option<&str> {
        self.report.as_ref().map(|r| r.analysis.style.as_str())
    }

    pub fn auxiliary(&self) -> Option<&AuxiliaryLabel> {
        self.report.as_ref().and_then(|r| r.analysis.auxiliary.as_ref())
    }
}

/// The fields the wardrobe store persists for an analysed garment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WardrobeEntry {
    pub category: String,
    pub subcategory: String,
    pub color: Option<ColorSwatch>,
    pub style: String,
    pub image_ref: String,
}

impl WardrobeEntry {
    /// `None` when no garment was found.
    pub fn from_analysis(result: &AnalysisResult, image_ref: impl Into<String>) -> Option<Self> {
        let report = result.report()?;
        Some(Self {
            category: report.analysis.category.clone(),
            subcategory: report.analysis.subcategory.clone(),
            color: report.analysis.colors.first().cloned(),
            style: report.analysis.style.clone(),
            image_ref: image_ref.into(),
        })
    }
}
