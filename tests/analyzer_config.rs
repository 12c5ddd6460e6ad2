use std::sync::Mutex;

use tempfile::NamedTempFile;

use garment_lens::config::{AnalyzerConfig, CacheKeyMode};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "GARMENT_CONFIG",
        "GARMENT_DETECTOR_MODEL",
        "GARMENT_CLASSIFIER_MODEL",
        "GARMENT_AUX_MODEL",
        "GARMENT_AUX_LABELS",
        "GARMENT_CACHE_CAPACITY",
        "GARMENT_CACHE_KEY",
        "GARMENT_DETECTOR_THRESHOLD",
        "GARMENT_COLOR_SEED",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "detector": {
            "model_path": "models/yolov8n.onnx",
            "input_width": 320,
            "input_height": 320,
            "confidence_threshold": 0.4,
            "class_map": { "0": 398, "1": 401 }
        },
        "classifier": {
            "model_path": "models/resnet50.onnx"
        },
        "auxiliary": {
            "model_path": "models/vit.onnx",
            "labels_path": "models/vit_labels.txt"
        },
        "cache": { "capacity": 25, "key": "path" },
        "color": { "attempts": 4 }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("GARMENT_CONFIG", file.path());
    std::env::set_var("GARMENT_CLASSIFIER_MODEL", "/opt/models/resnet50-int8.onnx");
    std::env::set_var("GARMENT_CACHE_KEY", "content");
    std::env::set_var("GARMENT_COLOR_SEED", "99");

    let cfg = AnalyzerConfig::load().expect("load config");

    let detector = &cfg.models.detector;
    assert_eq!(
        detector.model_path.as_deref().unwrap().to_str(),
        Some("models/yolov8n.onnx")
    );
    assert_eq!((detector.input_width, detector.input_height), (320, 320));
    assert_eq!(detector.confidence_threshold, 0.4);
    assert_eq!(detector.iou_threshold, 0.45);
    assert_eq!(detector.class_map.get(&1), Some(&401));
    assert_eq!(
        cfg.models.classifier.model_path.as_deref().unwrap().to_str(),
        Some("/opt/models/resnet50-int8.onnx")
    );
    assert_eq!(cfg.models.classifier.input_size, 224);
    let aux = cfg.models.auxiliary.as_ref().expect("auxiliary settings");
    assert_eq!(aux.labels_path.to_str(), Some("models/vit_labels.txt"));
    assert_eq!(aux.input_size, 224);
    assert_eq!(cfg.cache.capacity, 25);
    assert_eq!(cfg.cache.key_mode, CacheKeyMode::Content);
    assert_eq!(cfg.color.attempts, 4);
    assert_eq!(cfg.color.clusters, 3);
    assert_eq!(cfg.color.seed, Some(99));

    clear_env();
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = AnalyzerConfig::load().expect("load config");
    assert_eq!(cfg.cache.capacity, 100);
    assert_eq!(cfg.cache.key_mode, CacheKeyMode::Path);
    assert!(cfg.models.detector.model_path.is_none());
    assert!(cfg.models.auxiliary.is_none());

    clear_env();
}

#[test]
fn rejects_invalid_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();

    for (key, value) in [
        ("GARMENT_CACHE_CAPACITY", "0"),
        ("GARMENT_CACHE_CAPACITY", "lots"),
        ("GARMENT_DETECTOR_THRESHOLD", "1.7"),
        ("GARMENT_CACHE_KEY", "lru"),
        ("GARMENT_AUX_MODEL", "models/vit.onnx"),
    ] {
        clear_env();
        std::env::set_var(key, value);
        assert!(
            AnalyzerConfig::load().is_err(),
            "{}={} should be rejected",
            key,
            value
        );
    }

    clear_env();
}

#[test]
fn toml_file_carries_class_map_and_pins_palette_size() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("garment.toml");
    std::fs::write(
        &path,
        "[detector]\nmodel_path = \"models/yolov8n.onnx\"\n\n\
         [detector.class_map]\n0 = 398\n24 = 406\n",
    )
    .expect("write config");
    let cfg = AnalyzerConfig::load_from(&path).expect("load toml config");
    assert_eq!(cfg.models.detector.class_map.get(&24), Some(&406));
    assert_eq!(cfg.models.detector.class_map.len(), 2);

    std::fs::write(&path, "[color]\nclusters = 5\n").expect("write config");
    assert!(AnalyzerConfig::load_from(&path).is_err());

    clear_env();
}
