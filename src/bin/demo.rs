//! demo - end-to-end synthetic run of the analyzer with stub models

use anyhow::{Context, Result};
use clap::Parser;
use image::{Rgb, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};

use garment_lens::detect::{StubAuxiliaryClassifier, StubClassifier, StubDetector};
use garment_lens::{
    AnalyzerConfig, ColorSettings, ModelContext, OutfitAnalyzer, WardrobeEntry,
};

const TROUSERS_LABEL: u32 = 401;
const NAVY: [u8; 3] = [0x00, 0x11, 0x22];

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Output directory for the synthetic image and results.
    #[arg(long, default_value = "demo_out")]
    out: String,
    /// Optional deterministic seed for palette extraction.
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let out_dir = PathBuf::from(&args.out);
    fs::create_dir_all(&out_dir)?;

    stage("render synthetic trousers photo");
    let image_path = out_dir.join("trousers.png");
    render_trousers(&image_path)?;

    stage("load stub models");
    let models = ModelContext::new(
        StubDetector::single(TROUSERS_LABEL, 0.91),
        StubClassifier::peaked(TROUSERS_LABEL, 0.83, 1000),
    )
    .with_auxiliary(StubAuxiliaryClassifier::new("jean, blue jean, denim", 0.57));
    let cfg = AnalyzerConfig {
        color: ColorSettings {
            seed: args.seed,
            ..ColorSettings::default()
        },
        ..AnalyzerConfig::default()
    };
    let analyzer = OutfitAnalyzer::new(models, &cfg);

    stage("analyze (cold)");
    let result_path = out_dir.join("trousers.json");
    let result = analyzer.analyze_to_file(&image_path, &result_path)?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    stage("analyze again (served from cache)");
    let again = analyzer.analyze(&image_path);
    let stats = analyzer.cache_stats();
    eprintln!(
        "demo: identical={} hits={} misses={}",
        again == result,
        stats.hits,
        stats.misses
    );

    stage("build wardrobe entry");
    if let Some(entry) = WardrobeEntry::from_analysis(&result, image_path.display().to_string()) {
        let entry_path = out_dir.join("wardrobe_entry.json");
        fs::write(&entry_path, serde_json::to_string_pretty(&entry)?)
            .with_context(|| format!("writing {}", entry_path.display()))?;
        eprintln!("demo: wardrobe entry written to {}", entry_path.display());
    }

    eprintln!("demo: results in {}", out_dir.display());
    Ok(())
}

fn stage(msg: &str) {
    eprintln!("demo: {}", msg);
}

/// Navy trouser silhouette on a navy-tinted backdrop so the dominant
/// palette entry lands in the dark range.
fn render_trousers(path: &Path) -> Result<()> {
    let (w, h) = (120u32, 160u32);
    let img = RgbImage::from_fn(w, h, |x, y| {
        let left_leg = (30..58).contains(&x) && y >= 20;
        let right_leg = (62..90).contains(&x) && y >= 20;
        let waist = (30..90).contains(&x) && (10..40).contains(&y);
        if left_leg || right_leg || waist {
            Rgb(NAVY)
        } else {
            Rgb([0x10, 0x18, 0x30])
        }
    });
    img.save(path)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
