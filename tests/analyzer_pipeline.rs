//! End-to-end pipeline behaviour against the public API.
//!
//! Covers cache accounting (no negative caching, hit on repeat, FIFO bound),
//! failure degradation, and the trousers scenario on real image files.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use image::{Rgb, RgbImage};
use tempfile::TempDir;

use garment_lens::detect::{StubAuxiliaryClassifier, StubClassifier, StubDetector};
use garment_lens::{AnalysisResult, AnalyzerConfig, CacheStats, ModelContext, OutfitAnalyzer};

const NAVY: [u8; 3] = [0x00, 0x11, 0x22];

fn write_png(dir: &Path, name: &str, rgb: [u8; 3]) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_pixel(6, 4, Rgb(rgb))
        .save(&path)
        .expect("write png");
    path
}

fn trousers_analyzer() -> OutfitAnalyzer {
    OutfitAnalyzer::with_defaults(ModelContext::new(
        StubDetector::single(401, 0.9),
        StubClassifier::peaked(401, 0.8, 1000),
    ))
}

fn empty_analyzer() -> OutfitAnalyzer {
    OutfitAnalyzer::with_defaults(ModelContext::new(
        StubDetector::empty(),
        StubClassifier::peaked(401, 0.8, 1000),
    ))
}

#[test]
fn trousers_on_navy_are_classic_bottom_wear() {
    let dir = TempDir::new().unwrap();
    let path = write_png(dir.path(), "trousers.png", NAVY);

    let result = trousers_analyzer().analyze(&path);

    assert!(result.is_present());
    assert_eq!(result.category(), Some("bottom-wear"));
    assert_eq!(result.subcategory(), Some("trousers"));
    assert_eq!(result.style(), Some("classic"));
    assert_eq!(result.dominant_color().unwrap().as_str(), "#001122");
    assert_eq!(result.colors().len(), 3);
    assert!((result.top_confidence().unwrap() - 0.8).abs() < 1e-6);

    let detection = &result.detections()[0];
    assert_eq!(detection.label, "bottom-wear");
    assert_eq!(detection.confidence, 0.9);
    assert_eq!(<[f32; 4]>::from(detection.bbox), [0.0, 0.0, 6.0, 4.0]);
}

#[test]
fn no_detection_is_not_present_and_never_cached() {
    let dir = TempDir::new().unwrap();
    let path = write_png(dir.path(), "wall.png", [200, 200, 200]);
    let analyzer = empty_analyzer();

    assert_eq!(analyzer.analyze(&path), AnalysisResult::not_present());
    assert_eq!(analyzer.analyze(&path), AnalysisResult::not_present());

    assert_eq!(analyzer.cache_stats(), CacheStats { hits: 0, misses: 2 });
    assert_eq!(analyzer.cached_entries(), 0);
    assert_eq!(
        serde_json::to_string(&analyzer.analyze(&path)).unwrap(),
        r#"{"present":false}"#
    );
}

#[test]
fn repeat_call_is_served_from_cache() {
    let dir = TempDir::new().unwrap();
    let path = write_png(dir.path(), "tee.png", NAVY);
    let detector = Arc::new(StubDetector::single(398, 0.7));
    let analyzer = OutfitAnalyzer::with_defaults(ModelContext::from_shared(
        detector.clone(),
        Arc::new(StubClassifier::peaked(398, 0.6, 1000)),
    ));

    let first = analyzer.analyze(&path);
    let before = analyzer.cache_stats();
    let second = analyzer.analyze(&path);
    let after = analyzer.cache_stats();

    assert_eq!(first, second);
    assert_eq!(after.hits, before.hits + 1);
    assert_eq!(after.misses, before.misses);
    assert_eq!(detector.calls(), 1);
}

#[test]
fn cache_evicts_first_inserted_at_capacity() {
    let dir = TempDir::new().unwrap();
    let analyzer = trousers_analyzer();
    let paths: Vec<PathBuf> = (0..101)
        .map(|i| write_png(dir.path(), &format!("img{:03}.png", i), NAVY))
        .collect();

    for path in &paths {
        assert!(analyzer.analyze(path).is_present());
    }
    assert_eq!(analyzer.cached_entries(), 100);
    assert!(!analyzer.is_cached(&paths[0].to_string_lossy()));
    assert!(analyzer.is_cached(&paths[1].to_string_lossy()));
    assert!(analyzer.is_cached(&paths[100].to_string_lossy()));
}

#[test]
fn fifo_ignores_recent_hits() {
    let dir = TempDir::new().unwrap();
    let mut cfg = AnalyzerConfig::default();
    cfg.cache.capacity = 2;
    let analyzer = OutfitAnalyzer::new(
        ModelContext::new(
            StubDetector::single(401, 0.9),
            StubClassifier::peaked(401, 0.8, 1000),
        ),
        &cfg,
    );
    let a = write_png(dir.path(), "a.png", NAVY);
    let b = write_png(dir.path(), "b.png", NAVY);
    let c = write_png(dir.path(), "c.png", NAVY);

    analyzer.analyze(&a);
    analyzer.analyze(&b);
    analyzer.analyze(&a);
    analyzer.analyze(&c);

    assert!(!analyzer.is_cached(&a.to_string_lossy()));
    assert!(analyzer.is_cached(&b.to_string_lossy()));
    assert!(analyzer.is_cached(&c.to_string_lossy()));
}

#[test]
fn unreadable_image_degrades_to_not_present() {
    let dir = TempDir::new().unwrap();
    let broken = dir.path().join("broken.jpg");
    std::fs::write(&broken, b"\xff\xd8 definitely not a jpeg").unwrap();
    let analyzer = trousers_analyzer();

    assert_eq!(analyzer.analyze(&broken), AnalysisResult::not_present());
    assert_eq!(
        analyzer.analyze(dir.path().join("missing.png")),
        AnalysisResult::not_present()
    );
    assert_eq!(analyzer.cached_entries(), 0);
}

#[test]
fn auxiliary_failure_does_not_change_primary_result() {
    let dir = TempDir::new().unwrap();
    let path = write_png(dir.path(), "coat.png", [0xff, 0xff, 0xff]);
    let healthy = OutfitAnalyzer::with_defaults(
        ModelContext::new(
            StubDetector::single(399, 0.8),
            StubClassifier::peaked(399, 0.7, 1000),
        )
        .with_auxiliary(StubAuxiliaryClassifier::new("trench coat", 0.66)),
    );
    let degraded = OutfitAnalyzer::with_defaults(
        ModelContext::new(
            StubDetector::single(399, 0.8),
            StubClassifier::peaked(399, 0.7, 1000),
        )
        .with_auxiliary(StubAuxiliaryClassifier::failing()),
    );

    let with_aux = healthy.analyze(&path);
    let without_aux = degraded.analyze(&path);

    assert_eq!(with_aux.auxiliary().unwrap().label, "trench coat");
    assert!(without_aux.auxiliary().is_none());
    assert!(without_aux.is_present());
    assert_eq!(with_aux.category(), without_aux.category());
    // White red channel upgrades formal.
    assert_eq!(without_aux.style(), Some("business-casual"));
}

#[test]
fn analyze_to_file_writes_only_present_results() {
    let dir = TempDir::new().unwrap();
    let path = write_png(dir.path(), "shorts.png", NAVY);
    let out = dir.path().join("shorts.json");

    let result = trousers_analyzer().analyze_to_file(&path, &out).unwrap();
    let written: AnalysisResult =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(written, result);

    let skipped = dir.path().join("none.json");
    let result = empty_analyzer().analyze_to_file(&path, &skipped).unwrap();
    assert!(!result.is_present());
    assert!(!skipped.exists());
}

#[test]
fn concurrent_callers_share_one_bounded_cache() {
    let dir = TempDir::new().unwrap();
    let paths: Vec<PathBuf> = (0..4)
        .map(|i| write_png(dir.path(), &format!("p{}.png", i), NAVY))
        .collect();
    let analyzer = Arc::new(trousers_analyzer());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let analyzer = Arc::clone(&analyzer);
            let paths = paths.clone();
            thread::spawn(move || {
                for path in &paths {
                    assert!(analyzer.analyze(path).is_present());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stats = analyzer.cache_stats();
    assert_eq!(stats.hits + stats.misses, 32);
    assert!(stats.misses >= 4);
    assert_eq!(analyzer.cached_entries(), 4);
}
