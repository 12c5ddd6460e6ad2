use std::sync::Arc;

use anyhow::Result;

use super::backend::{AuxiliaryClassifier, ImageClassifier, ObjectDetector};
use crate::config::ModelSettings;

/// Long-lived holder of the loaded models.
///
/// Built once at startup and handed to the analyzer. Loading is the only
/// expensive step, so callers share one context (it is cheap to clone)
/// instead of rebuilding per request.
#[derive(Clone)]
pub struct ModelContext {
    detector: Arc<dyn ObjectDetector>,
    classifier: Arc<dyn ImageClassifier>,
    auxiliary: Option<Arc<dyn AuxiliaryClassifier>>,
}

impl ModelContext {
    pub fn new<D, C>(detector: D, classifier: C) -> Self
    where
        D: ObjectDetector + 'static,
        C: ImageClassifier + 'static,
    {
        Self::from_shared(Arc::new(detector), Arc::new(classifier))
    }

    /// Build from models that are already shared elsewhere.
    pub fn from_shared(
        detector: Arc<dyn ObjectDetector>,
        classifier: Arc<dyn ImageClassifier>,
    ) -> Self {
        Self {
            detector,
            classifier,
            auxiliary: None,
        }
    }

    pub fn with_auxiliary<A: AuxiliaryClassifier + 'static>(self, auxiliary: A) -> Self {
        self.with_shared_auxiliary(Arc::new(auxiliary))
    }

    pub fn with_shared_auxiliary(mut self, auxiliary: Arc<dyn AuxiliaryClassifier>) -> Self {
        self.auxiliary = Some(auxiliary);
        self
    }

    pub fn detector(&self) -> &dyn ObjectDetector {
        self.detector.as_ref()
    }

    pub fn classifier(&self) -> &dyn ImageClassifier {
        self.classifier.as_ref()
    }

    pub fn auxiliary(&self) -> Option<&dyn AuxiliaryClassifier> {
        self.auxiliary.as_deref()
    }

    /// Run every model's warm-up hook. A failure here is a startup failure.
    pub fn warm_up(&self) -> Result<()> {
        self.detector.warm_up()?;
        self.classifier.warm_up()?;
        Ok(())
    }

    /// Load the ONNX models named in `settings`.
    ///
    /// Any required model failing to load aborts startup; there is no
    /// partially loaded context. The auxiliary model is optional.
    #[cfg(feature = "backend-tract")]
    pub fn load(settings: &ModelSettings) -> Result<Self> {
        use anyhow::anyhow;

        use super::backends::{TractAuxiliaryClassifier, TractClassifier, TractDetector};

        let detector_path = settings
            .detector
            .model_path
            .as_ref()
            .ok_or_else(|| anyhow!("detector model path is not configured"))?;
        let classifier_path = settings
            .classifier
            .model_path
            .as_ref()
            .ok_or_else(|| anyhow!("classifier model path is not configured"))?;

        log::info!("loading detector model from {}", detector_path.display());
        let detector = TractDetector::new(
            detector_path,
            settings.detector.input_width,
            settings.detector.input_height,
        )?
        .with_thresholds(
            settings.detector.confidence_threshold,
            settings.detector.iou_threshold,
        )
        .with_max_detections(settings.detector.max_detections)
        .with_class_map(settings.detector.class_map.clone());

        log::info!("loading classifier model from {}", classifier_path.display());
        let classifier = TractClassifier::new(classifier_path, settings.classifier.input_size)?;

        let mut context = Self::new(detector, classifier);
        if let Some(aux) = &settings.auxiliary {
            log::info!("loading auxiliary model from {}", aux.model_path.display());
            context = context.with_auxiliary(TractAuxiliaryClassifier::new(
                &aux.model_path,
                &aux.labels_path,
                aux.input_size,
            )?);
        } else {
            log::info!("no auxiliary model configured; auxiliary labels disabled");
        }
        context.warm_up()?;
        log::info!("all models loaded");
        Ok(context)
    }

    #[cfg(not(feature = "backend-tract"))]
    pub fn load(_settings: &ModelSettings) -> Result<Self> {
        Err(anyhow::anyhow!(
            "loading ONNX models requires the backend-tract feature"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::{StubAuxiliaryClassifier, StubClassifier, StubDetector};

    #[test]
    fn context_exposes_models() {
        let context = ModelContext::new(StubDetector::empty(), StubClassifier::peaked(0, 1.0, 1));
        assert_eq!(context.detector().name(), "stub");
        assert_eq!(context.classifier().name(), "stub");
        assert!(context.auxiliary().is_none());

        let context = context.with_auxiliary(StubAuxiliaryClassifier::new("jeans", 0.7));
        assert!(context.auxiliary().is_some());
        assert!(context.warm_up().is_ok());
    }

    #[cfg(not(feature = "backend-tract"))]
    #[test]
    fn load_without_backend_is_an_error() {
        assert!(ModelContext::load(&ModelSettings::default()).is_err());
    }
}
