use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const DEFAULT_DETECTOR_INPUT: u32 = 640;
const DEFAULT_DETECTOR_THRESHOLD: f32 = 0.55;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const DEFAULT_MAX_DETECTIONS: usize = 10;
const DEFAULT_CLASSIFIER_INPUT: u32 = 224;
const DEFAULT_CACHE_CAPACITY: usize = 100;
const DEFAULT_COLOR_CLUSTERS: usize = 3;
const DEFAULT_COLOR_ATTEMPTS: usize = 10;
const DEFAULT_COLOR_MAX_ITERATIONS: usize = 10;
const DEFAULT_COLOR_EPSILON: f32 = 1.0;

#[derive(Debug, Deserialize, Default)]
struct AnalyzerConfigFile {
    detector: Option<DetectorConfigFile>,
    classifier: Option<ClassifierConfigFile>,
    auxiliary: Option<AuxiliaryConfigFile>,
    cache: Option<CacheConfigFile>,
    color: Option<ColorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    model_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    max_detections: Option<usize>,
    /// Keys are strings so TOML tables can carry them.
    class_map: Option<HashMap<String, u32>>,
}

#[derive(Debug, Deserialize, Default)]
struct ClassifierConfigFile {
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct AuxiliaryConfigFile {
    model_path: PathBuf,
    labels_path: PathBuf,
    input_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct CacheConfigFile {
    capacity: Option<usize>,
    key: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ColorConfigFile {
    clusters: Option<usize>,
    attempts: Option<usize>,
    max_iterations: Option<usize>,
    epsilon: Option<f32>,
    seed: Option<u64>,
}

/// Fully resolved analyzer configuration.
#[derive(Debug, Clone, Default)]
pub struct AnalyzerConfig {
    pub models: ModelSettings,
    pub cache: CacheSettings,
    pub color: ColorSettings,
}

#[derive(Debug, Clone, Default)]
pub struct ModelSettings {
    pub detector: DetectorSettings,
    pub classifier: ClassifierSettings,
    pub auxiliary: Option<AuxiliarySettings>,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub model_path: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    /// Model class id -> label id.
    pub class_map: HashMap<u32, u32>,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            model_path: None,
            input_width: DEFAULT_DETECTOR_INPUT,
            input_height: DEFAULT_DETECTOR_INPUT,
            confidence_threshold: DEFAULT_DETECTOR_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            max_detections: DEFAULT_MAX_DETECTIONS,
            class_map: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub model_path: Option<PathBuf>,
    pub input_size: u32,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            model_path: None,
            input_size: DEFAULT_CLASSIFIER_INPUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuxiliarySettings {
    pub model_path: PathBuf,
    pub labels_path: PathBuf,
    pub input_size: u32,
}

/// How an analysis request is turned into a cache key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheKeyMode {
    /// The path string as given. A file rewritten under the same path keeps
    /// serving the old result.
    #[default]
    Path,
    /// SHA-256 of the file bytes. Costs a full read before every lookup.
    Content,
}

impl CacheKeyMode {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "path" => Ok(Self::Path),
            "content" => Ok(Self::Content),
            other => Err(anyhow!(
                "unknown cache key mode '{}'; expected 'path' or 'content'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub capacity: usize,
    pub key_mode: CacheKeyMode,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
            key_mode: CacheKeyMode::Path,
        }
    }
}

/// K-means parameters for palette extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorSettings {
    pub clusters: usize,
    pub attempts: usize,
    pub max_iterations: usize,
    /// Stop refining once no centroid moves further than this.
    pub epsilon: f32,
    /// Fixed RNG seed for reproducible palettes; random when unset.
    pub seed: Option<u64>,
}

impl Default for ColorSettings {
    fn default() -> Self {
        Self {
            clusters: DEFAULT_COLOR_CLUSTERS,
            attempts: DEFAULT_COLOR_ATTEMPTS,
            max_iterations: DEFAULT_COLOR_MAX_ITERATIONS,
            epsilon: DEFAULT_COLOR_EPSILON,
            seed: None,
        }
    }
}

impl AnalyzerConfig {
    /// Load from the file named by `GARMENT_CONFIG` (if any), then apply
    /// `GARMENT_*` environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("GARMENT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from an explicit file, then apply environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AnalyzerConfigFile) -> Result<Self> {
        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            model_path: detector_file.model_path,
            input_width: detector_file.input_width.unwrap_or(DEFAULT_DETECTOR_INPUT),
            input_height: detector_file.input_height.unwrap_or(DEFAULT_DETECTOR_INPUT),
            confidence_threshold: detector_file
                .confidence_threshold
                .unwrap_or(DEFAULT_DETECTOR_THRESHOLD),
            iou_threshold: detector_file.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
            max_detections: detector_file
                .max_detections
                .unwrap_or(DEFAULT_MAX_DETECTIONS),
            class_map: parse_class_map(detector_file.class_map.unwrap_or_default())?,
        };

        let classifier_file = file.classifier.unwrap_or_default();
        let classifier = ClassifierSettings {
            model_path: classifier_file.model_path,
            input_size: classifier_file
                .input_size
                .unwrap_or(DEFAULT_CLASSIFIER_INPUT),
        };

        let auxiliary = file.auxiliary.map(|aux| AuxiliarySettings {
            model_path: aux.model_path,
            labels_path: aux.labels_path,
            input_size: aux.input_size.unwrap_or(DEFAULT_CLASSIFIER_INPUT),
        });

        let cache_file = file.cache.unwrap_or_default();
        let cache = CacheSettings {
            capacity: cache_file.capacity.unwrap_or(DEFAULT_CACHE_CAPACITY),
            key_mode: match cache_file.key.as_deref() {
                Some(key) => CacheKeyMode::parse(key)?,
                None => CacheKeyMode::Path,
            },
        };

        let color_file = file.color.unwrap_or_default();
        let color = ColorSettings {
            clusters: color_file.clusters.unwrap_or(DEFAULT_COLOR_CLUSTERS),
            attempts: color_file.attempts.unwrap_or(DEFAULT_COLOR_ATTEMPTS),
            max_iterations: color_file
                .max_iterations
                .unwrap_or(DEFAULT_COLOR_MAX_ITERATIONS),
            epsilon: color_file.epsilon.unwrap_or(DEFAULT_COLOR_EPSILON),
            seed: color_file.seed,
        };

        Ok(Self {
            models: ModelSettings {
                detector,
                classifier,
                auxiliary,
            },
            cache,
            color,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = non_empty_env("GARMENT_DETECTOR_MODEL") {
            self.models.detector.model_path = Some(PathBuf::from(path));
        }
        if let Some(path) = non_empty_env("GARMENT_CLASSIFIER_MODEL") {
            self.models.classifier.model_path = Some(PathBuf::from(path));
        }
        match (
            non_empty_env("GARMENT_AUX_MODEL"),
            non_empty_env("GARMENT_AUX_LABELS"),
        ) {
            (Some(model), Some(labels)) => {
                let input_size = self
                    .models
                    .auxiliary
                    .as_ref()
                    .map(|aux| aux.input_size)
                    .unwrap_or(DEFAULT_CLASSIFIER_INPUT);
                self.models.auxiliary = Some(AuxiliarySettings {
                    model_path: PathBuf::from(model),
                    labels_path: PathBuf::from(labels),
                    input_size,
                });
            }
            (None, None) => {}
            _ => {
                return Err(anyhow!(
                    "GARMENT_AUX_MODEL and GARMENT_AUX_LABELS must be set together"
                ))
            }
        }
        if let Some(threshold) = non_empty_env("GARMENT_DETECTOR_THRESHOLD") {
            self.models.detector.confidence_threshold = threshold
                .parse()
                .map_err(|_| anyhow!("GARMENT_DETECTOR_THRESHOLD must be a number"))?;
        }
        if let Some(capacity) = non_empty_env("GARMENT_CACHE_CAPACITY") {
            self.cache.capacity = capacity
                .parse()
                .map_err(|_| anyhow!("GARMENT_CACHE_CAPACITY must be a positive integer"))?;
        }
        if let Some(key) = non_empty_env("GARMENT_CACHE_KEY") {
            self.cache.key_mode = CacheKeyMode::parse(&key)?;
        }
        if let Some(seed) = non_empty_env("GARMENT_COLOR_SEED") {
            self.color.seed = Some(
                seed.parse()
                    .map_err(|_| anyhow!("GARMENT_COLOR_SEED must be an unsigned integer"))?,
            );
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.cache.capacity == 0 {
            return Err(anyhow!("cache capacity must be greater than zero"));
        }
        let detector = &self.models.detector;
        for (name, value) in [
            ("detector confidence threshold", detector.confidence_threshold),
            ("detector iou threshold", detector.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within [0, 1], got {}", name, value));
            }
        }
        if detector.input_width == 0 || detector.input_height == 0 {
            return Err(anyhow!("detector input size must be non-zero"));
        }
        if self.models.classifier.input_size == 0 {
            return Err(anyhow!("classifier input size must be non-zero"));
        }
        if self.color.clusters != DEFAULT_COLOR_CLUSTERS {
            return Err(anyhow!(
                "color clusters must be {}, got {}",
                DEFAULT_COLOR_CLUSTERS,
                self.color.clusters
            ));
        }
        if self.color.attempts == 0 {
            return Err(anyhow!("color attempts must be greater than zero"));
        }
        if !(self.color.epsilon >= 0.0) {
            return Err(anyhow!("color epsilon must be non-negative"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<AnalyzerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_class_map(raw: HashMap<String, u32>) -> Result<HashMap<u32, u32>> {
    raw.into_iter()
        .map(|(class, label)| -> Result<(u32, u32)> {
            let class = class.trim().parse::<u32>().map_err(|_| {
                anyhow!("detector class_map key '{}' is not a class id", class)
            })?;
            Ok((class, label))
        })
        .collect()
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}
