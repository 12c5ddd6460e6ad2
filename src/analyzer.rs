//! Analyzer pipeline.
//!
//! cache lookup -> detect -> (no qualifying box: not present) -> classify ->
//! palette -> category/subcategory/style -> auxiliary label -> cache insert.
//!
//! `analyze` never fails. Unreadable images and model errors are logged and
//! collapse into the not-present result. Only successful analyses are
//! cached, so a not-present image is recomputed on every call.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use sha2::{Digest, Sha256};

use crate::analysis::{AnalysisResult, Detection, DetectionSummary, GarmentAnalysis, GarmentReport};
use crate::cache::{CacheStats, FifoCache};
use crate::color::ColorExtractor;
use crate::config::{AnalyzerConfig, CacheKeyMode};
use crate::detect::ModelContext;
use crate::frame::Frame;
use crate::mapper;

pub struct OutfitAnalyzer {
    models: ModelContext,
    colors: ColorExtractor,
    key_mode: CacheKeyMode,
    cache: Mutex<FifoCache<String, AnalysisResult>>,
}

impl OutfitAnalyzer {
    pub fn new(models: ModelContext, config: &AnalyzerConfig) -> Self {
        Self {
            models,
            colors: ColorExtractor::new(config.color.clone()),
            key_mode: config.cache.key_mode,
            cache: Mutex::new(FifoCache::new(config.cache.capacity)),
        }
    }

    /// Analyzer with default settings (capacity 100, path keys, 3 colors).
    pub fn with_defaults(models: ModelContext) -> Self {
        Self::new(models, &AnalyzerConfig::default())
    }

    /// Analyze the image at `path`.
    pub fn analyze<P: AsRef<Path>>(&self, path: P) -> AnalysisResult {
        let path = path.as_ref();
        let key = match self.cache_key(path) {
            Ok(key) => key,
            Err(e) => {
                log::warn!("analysis of {} failed: {:#}", path.display(), e);
                return AnalysisResult::not_present();
            }
        };
        self.analyze_cached(key, || Frame::open(path))
    }

    /// Analyze an already decoded frame under a caller-chosen identity.
    pub fn analyze_frame(&self, identity: &str, frame: &Frame) -> AnalysisResult {
        self.analyze_cached(identity.to_string(), || Ok(frame.clone()))
    }

    /// Analyze and, when a garment is present, write the JSON result to `out`.
    pub fn analyze_to_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        path: P,
        out: Q,
    ) -> Result<AnalysisResult> {
        let result = self.analyze(path);
        if result.is_present() {
            let out = out.as_ref();
            let json = serde_json::to_string_pretty(&result)?;
            std::fs::write(out, json)
                .with_context(|| format!("failed to write analysis to {}", out.display()))?;
        }
        Ok(result)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.lock_cache().stats()
    }

    pub fn cached_entries(&self) -> usize {
        self.lock_cache().len()
    }

    pub fn is_cached(&self, identity: &str) -> bool {
        self.lock_cache().contains(&identity.to_string())
    }

    /// Cache identity for `path` under the configured key mode.
    pub fn cache_key(&self, path: &Path) -> Result<String> {
        match self.key_mode {
            CacheKeyMode::Path => Ok(path.to_string_lossy().into_owned()),
            CacheKeyMode::Content => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                Ok(hex::encode(Sha256::digest(&bytes)))
            }
        }
    }

    fn analyze_cached(&self, key: String, load: impl FnOnce() -> Result<Frame>) -> AnalysisResult {
        if let Some(hit) = self.lock_cache().get(&key) {
            log::debug!("cache hit for {}", key);
            return hit;
        }

        // The lock is not held during inference; concurrent misses on the
        // same key both compute and the later insert replaces the earlier.
        let outcome = load().and_then(|frame| self.run(&frame));
        match outcome {
            Ok(Some(result)) => {
                if let Some(evicted) = self.lock_cache().put(key, result.clone()) {
                    log::debug!("cache full; evicted {}", evicted);
                }
                result
            }
            Ok(None) => {
                log::debug!("no garment detected in {}", key);
                AnalysisResult::not_present()
            }
            Err(e) => {
                log::warn!("analysis of {} failed: {:#}", key, e);
                AnalysisResult::not_present()
            }
        }
    }

    /// The uncached pipeline. `Ok(None)` means no qualifying detection.
    fn run(&self, frame: &Frame) -> Result<Option<AnalysisResult>> {
        let detections: Vec<Detection> = self
            .models
            .detector()
            .detect(frame)
            .context("detector failed")?
            .into_iter()
            .filter(|d| mapper::is_known_label(d.label_id))
            .map(|d| Detection {
                label: mapper::category(d.label_id).to_string(),
                confidence: d.confidence,
                bbox: d.bbox,
            })
            .collect();
        if detections.is_empty() {
            return Ok(None);
        }

        let (label_id, top_confidence) = self
            .models
            .classifier()
            .classify(frame)
            .context("classifier failed")?
            .top()
            .ok_or_else(|| anyhow!("classifier returned no scores"))?;

        let colors = self
            .colors
            .extract(frame, None)
            .context("color extraction failed")?;

        let category = mapper::category(label_id);
        let subcategory = mapper::subcategory(label_id);
        let style = mapper::style(label_id, colors.first());

        let auxiliary = self.models.auxiliary().and_then(|aux| {
            aux.classify(frame)
                .map_err(|e| log::warn!("auxiliary classifier {} failed: {:#}", aux.name(), e))
                .ok()
        });

        Ok(Some(AnalysisResult::found(GarmentReport {
            detections: DetectionSummary {
                labels: detections,
                top_confidence,
            },
            analysis: GarmentAnalysis {
                category: category.to_string(),
                subcategory: subcategory.to_string(),
                colors,
                style: style.to_string(),
                auxiliary,
            },
        })))
    }

    fn lock_cache(&self) -> MutexGuard<'_, FifoCache<String, AnalysisResult>> {
        // Cache operations cannot panic midway, so a poisoned lock still
        // guards a consistent cache.
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{StubAuxiliaryClassifier, StubClassifier, StubDetector};

    fn frame() -> Frame {
        Frame::filled(6, 4, [0, 17, 34]).unwrap()
    }

    fn analyzer(detector: StubDetector) -> OutfitAnalyzer {
        OutfitAnalyzer::with_defaults(ModelContext::new(
            detector,
            StubClassifier::peaked(401, 0.8, 1000),
        ))
    }

    #[test]
    fn bottom_wear_scenario() {
        let analyzer = analyzer(StubDetector::single(401, 0.9));
        let result = analyzer.analyze_frame("navy-trousers", &frame());

        assert!(result.is_present());
        assert_eq!(result.category(), Some("bottom-wear"));
        assert_eq!(result.subcategory(), Some("trousers"));
        assert_eq!(result.style(), Some("classic"));
        assert_eq!(result.dominant_color().map(|c| c.as_str()), Some("#001122"));
        assert_eq!(result.colors().len(), 3);
        assert_eq!(result.detections().len(), 1);
        assert_eq!(result.detections()[0].label, "bottom-wear");
        assert!(result.auxiliary().is_none());
    }

    #[test]
    fn detections_outside_label_set_are_dropped() {
        let analyzer = analyzer(StubDetector::single(0, 0.99));
        let result = analyzer.analyze_frame("person", &frame());
        assert_eq!(result, AnalysisResult::not_present());
        assert_eq!(analyzer.cached_entries(), 0);
    }

    #[test]
    fn detector_failure_degrades_to_not_present() {
        let analyzer = analyzer(StubDetector::failing());
        assert_eq!(
            analyzer.analyze_frame("broken", &frame()),
            AnalysisResult::not_present()
        );
    }

    #[test]
    fn auxiliary_failure_keeps_primary_fields() {
        let models = ModelContext::new(
            StubDetector::single(401, 0.9),
            StubClassifier::peaked(401, 0.8, 1000),
        )
        .with_auxiliary(StubAuxiliaryClassifier::failing());
        let analyzer = OutfitAnalyzer::with_defaults(models);

        let result = analyzer.analyze_frame("aux-down", &frame());
        assert!(result.is_present());
        assert_eq!(result.style(), Some("classic"));
        assert!(result.auxiliary().is_none());
    }

    #[test]
    fn auxiliary_label_is_attached() {
        let models = ModelContext::new(
            StubDetector::single(398, 0.9),
            StubClassifier::peaked(398, 0.6, 1000),
        )
        .with_auxiliary(StubAuxiliaryClassifier::new("jersey, T-shirt, tee shirt", 0.42));
        let analyzer = OutfitAnalyzer::with_defaults(models);

        let result = analyzer.analyze_frame("tee", &frame());
        let aux = result.auxiliary().unwrap();
        assert_eq!(aux.label, "jersey, T-shirt, tee shirt");
        assert_eq!(aux.score, 0.42);
        // Navy red channel "#00" upgrades casual.
        assert_eq!(result.style(), Some("smart-casual"));
    }

    #[test]
    fn content_keys_hash_file_bytes() {
        let mut config = AnalyzerConfig::default();
        config.cache.key_mode = CacheKeyMode::Content;
        let analyzer = OutfitAnalyzer::new(
            ModelContext::new(StubDetector::empty(), StubClassifier::peaked(0, 1.0, 1)),
            &config,
        );

        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        std::fs::write(&a, b"same bytes").unwrap();
        std::fs::write(&b, b"same bytes").unwrap();

        let key_a = analyzer.cache_key(&a).unwrap();
        assert_eq!(key_a.len(), 64);
        assert_eq!(key_a, analyzer.cache_key(&b).unwrap());
        assert!(analyzer.cache_key(&dir.path().join("missing")).is_err());
    }
}
