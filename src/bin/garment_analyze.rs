//! garment_analyze - analyze clothing photos with the configured ONNX models
//!
//! Models are loaded once, then every path is analyzed in order. Results
//! are printed to stdout as JSON lines, or written to `--out-dir` as one
//! pretty JSON file per garment found.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use garment_lens::{AnalyzerConfig, ModelContext, OutfitAnalyzer};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Image files to analyze.
    #[arg(required = true)]
    paths: Vec<PathBuf>,
    /// Config file (JSON, or TOML by extension).
    #[arg(long, env = "GARMENT_CONFIG")]
    config: Option<PathBuf>,
    /// Write one `<stem>.json` per garment found instead of printing.
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// Log cache hit/miss counters when done.
    #[arg(long)]
    stats: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = match &args.config {
        Some(path) => AnalyzerConfig::load_from(path)?,
        None => AnalyzerConfig::load()?,
    };
    log::info!(
        "cache capacity={}, key mode={:?}, colors={}",
        cfg.cache.capacity,
        cfg.cache.key_mode,
        cfg.color.clusters
    );

    // Fatal on failure: no degraded mode without models.
    let models = ModelContext::load(&cfg.models)?;
    let analyzer = OutfitAnalyzer::new(models, &cfg);

    if let Some(dir) = &args.out_dir {
        std::fs::create_dir_all(dir)
            .map_err(|e| anyhow!("failed to create {}: {}", dir.display(), e))?;
    }

    let mut found = 0usize;
    for path in &args.paths {
        let result = match &args.out_dir {
            Some(dir) => analyzer.analyze_to_file(path, output_path(dir, path))?,
            None => {
                let result = analyzer.analyze(path);
                println!("{}", serde_json::to_string(&result)?);
                result
            }
        };
        if result.is_present() {
            found += 1;
        }
        log::info!(
            "{}: present={} category={} style={}",
            path.display(),
            result.is_present(),
            result.category().unwrap_or("-"),
            result.style().unwrap_or("-")
        );
    }

    log::info!("{} of {} images contained a garment", found, args.paths.len());
    if args.stats {
        let stats = analyzer.cache_stats();
        log::info!("cache hits={} misses={}", stats.hits, stats.misses);
    }
    Ok(())
}

fn output_path(dir: &Path, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    dir.join(format!("{}.json", stem))
}
