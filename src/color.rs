//! Dominant color palette extraction.
//!
//! Pixel colors are clustered with k-means (random initial centers, several
//! restarts, lowest-compactness run wins). Centroids are emitted in cluster
//! index order of the winning run; the palette is not ranked by cluster size.

use std::fmt;
use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::ColorSettings;
use crate::frame::{Frame, Mask};

/// Lowercase `#rrggbb` color.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ColorSwatch(String);

fn swatch_pattern() -> &'static regex::Regex {
    static SWATCH_RE: OnceLock<regex::Regex> = OnceLock::new();
    SWATCH_RE.get_or_init(|| regex::Regex::new(r"^#[0-9a-f]{6}$").unwrap())
}

impl ColorSwatch {
    /// Parse a `#rrggbb` string. Uppercase digits are folded to lowercase.
    pub fn parse(value: &str) -> Result<Self> {
        let lowered = value.trim().to_ascii_lowercase();
        if !swatch_pattern().is_match(&lowered) {
            return Err(anyhow!("invalid color swatch '{}'", value));
        }
        Ok(Self(lowered))
    }

    pub fn from_rgb(rgb: [u8; 3]) -> Self {
        Self(format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2]))
    }

    /// Round a float centroid to the nearest integer channel values.
    pub fn from_centroid(centroid: [f32; 3]) -> Self {
        let channel = |v: f32| v.round().clamp(0.0, 255.0) as u8;
        Self::from_rgb([channel(centroid[0]), channel(centroid[1]), channel(centroid[2])])
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn rgb(&self) -> [u8; 3] {
        let byte = |i: usize| u8::from_str_radix(&self.0[i..i + 2], 16).unwrap_or(0);
        [byte(1), byte(3), byte(5)]
    }
}

impl fmt::Display for ColorSwatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ColorSwatch {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ColorSwatch> for String {
    fn from(swatch: ColorSwatch) -> Self {
        swatch.0
    }
}

/// K-means palette extractor.
#[derive(Clone, Debug, Default)]
pub struct ColorExtractor {
    settings: ColorSettings,
}

impl ColorExtractor {
    pub fn new(settings: ColorSettings) -> Self {
        Self { settings }
    }

    /// Cluster the frame's colors (restricted to `mask` when given).
    ///
    /// Returns exactly three swatches, or an empty palette when the mask
    /// selects no pixel. A mask of the wrong size is an error.
    pub fn extract(&self, frame: &Frame, mask: Option<&Mask>) -> Result<Vec<ColorSwatch>> {
        let pixels: Vec<[f32; 3]> = match mask {
            Some(mask) => {
                if !mask.matches(frame) {
                    return Err(anyhow!(
                        "mask {}x{} does not match frame {}x{}",
                        mask.width,
                        mask.height,
                        frame.width,
                        frame.height
                    ));
                }
                frame
                    .rgb_iter()
                    .enumerate()
                    .filter(|(index, _)| mask.is_set(*index))
                    .map(|(_, px)| to_float(px))
                    .collect()
            }
            None => frame.rgb_iter().map(to_float).collect(),
        };

        if pixels.is_empty() {
            return Ok(Vec::new());
        }

        let mut rng = match self.settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let centroids = kmeans(&pixels, &self.settings, &mut rng);
        Ok(centroids.into_iter().map(ColorSwatch::from_centroid).collect())
    }
}

fn to_float(px: [u8; 3]) -> [f32; 3] {
    [px[0] as f32, px[1] as f32, px[2] as f32]
}

fn distance_sq(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    let dr = a[0] - b[0];
    let dg = a[1] - b[1];
    let db = a[2] - b[2];
    dr * dr + dg * dg + db * db
}

fn nearest(point: &[f32; 3], centroids: &[[f32; 3]]) -> (usize, f32) {
    let mut best = (0, f32::INFINITY);
    for (index, centroid) in centroids.iter().enumerate() {
        let d = distance_sq(point, centroid);
        if d < best.1 {
            best = (index, d);
        }
    }
    best
}

/// Best-of-`attempts` k-means. `pixels` must be non-empty.
fn kmeans(pixels: &[[f32; 3]], settings: &ColorSettings, rng: &mut StdRng) -> Vec<[f32; 3]> {
    let k = settings.clusters.max(1);
    let mut best: Option<(f32, Vec<[f32; 3]>)> = None;

    for _ in 0..settings.attempts.max(1) {
        let (compactness, centroids) = kmeans_attempt(pixels, k, settings, rng);
        if best.as_ref().map_or(true, |(c, _)| compactness < *c) {
            best = Some((compactness, centroids));
        }
    }

    best.map(|(_, centroids)| centroids).unwrap_or_default()
}

/// Single k-means run from uniformly random centers inside the data's
/// bounding box. Returns (sum of squared distances, centroids).
fn kmeans_attempt(
    pixels: &[[f32; 3]],
    k: usize,
    settings: &ColorSettings,
    rng: &mut StdRng,
) -> (f32, Vec<[f32; 3]>) {
    let mut lo = [f32::INFINITY; 3];
    let mut hi = [f32::NEG_INFINITY; 3];
    for px in pixels {
        for c in 0..3 {
            lo[c] = lo[c].min(px[c]);
            hi[c] = hi[c].max(px[c]);
        }
    }

    let mut centroids: Vec<[f32; 3]> = (0..k)
        .map(|_| {
            [
                rng.gen_range(lo[0]..=hi[0]),
                rng.gen_range(lo[1]..=hi[1]),
                rng.gen_range(lo[2]..=hi[2]),
            ]
        })
        .collect();
    let mut labels = vec![0usize; pixels.len()];
    let epsilon_sq = settings.epsilon * settings.epsilon;

    for _ in 0..settings.max_iterations.max(1) {
        for (label, px) in labels.iter_mut().zip(pixels) {
            *label = nearest(px, &centroids).0;
        }

        let mut sums = vec![[0f64; 3]; k];
        let mut counts = vec![0usize; k];
        for (label, px) in labels.iter().zip(pixels) {
            for c in 0..3 {
                sums[*label][c] += px[c] as f64;
            }
            counts[*label] += 1;
        }

        let mut max_shift_sq = 0f32;
        for (index, centroid) in centroids.iter_mut().enumerate() {
            let updated = if counts[index] > 0 {
                let n = counts[index] as f64;
                [
                    (sums[index][0] / n) as f32,
                    (sums[index][1] / n) as f32,
                    (sums[index][2] / n) as f32,
                ]
            } else {
                // Empty cluster: reseed on a random pixel.
                pixels[rng.gen_range(0..pixels.len())]
            };
            max_shift_sq = max_shift_sq.max(distance_sq(centroid, &updated));
            *centroid = updated;
        }

        if max_shift_sq <= epsilon_sq {
            break;
        }
    }

    let compactness = pixels.iter().map(|px| nearest(px, &centroids).1).sum();
    (compactness, centroids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> ColorExtractor {
        ColorExtractor::new(ColorSettings {
            seed: Some(7),
            ..ColorSettings::default()
        })
    }

    fn two_tone_frame() -> Frame {
        // Left half navy, right half white.
        let (w, h) = (8u32, 4u32);
        let mut data = Vec::new();
        for _y in 0..h {
            for x in 0..w {
                data.extend_from_slice(if x < w / 2 { &[0, 17, 34] } else { &[255, 255, 255] });
            }
        }
        Frame::from_rgb(data, w, h).unwrap()
    }

    #[test]
    fn swatch_parse_normalises_case() {
        assert_eq!(ColorSwatch::parse("#FFEE00").unwrap().as_str(), "#ffee00");
        assert!(ColorSwatch::parse("ffee00").is_err());
        assert!(ColorSwatch::parse("#ffee0").is_err());
    }

    #[test]
    fn swatch_rounds_centroids() {
        assert_eq!(ColorSwatch::from_centroid([0.4, 16.6, 255.7]).as_str(), "#0011ff");
        assert_eq!(ColorSwatch::from_rgb([0, 17, 34]).rgb(), [0, 17, 34]);
    }

    #[test]
    fn extract_returns_three_swatches() {
        let palette = seeded().extract(&two_tone_frame(), None).unwrap();
        assert_eq!(palette.len(), 3);
        assert!(palette.iter().any(|s| s.as_str() == "#001122"));
        assert!(palette.iter().any(|s| s.as_str() == "#ffffff"));
    }

    #[test]
    fn extract_on_solid_frame_repeats_the_color() {
        let frame = Frame::filled(5, 5, [0, 17, 34]).unwrap();
        let palette = seeded().extract(&frame, None).unwrap();
        assert_eq!(palette.len(), 3);
        assert!(palette.iter().all(|s| s.as_str() == "#001122"));
    }

    #[test]
    fn mask_restricts_population() {
        let frame = two_tone_frame();
        let mask = Mask::from_fn(frame.width, frame.height, |x, _| x >= frame.width / 2);
        let palette = seeded().extract(&frame, Some(&mask)).unwrap();
        assert!(palette.iter().all(|s| s.as_str() == "#ffffff"));
    }

    #[test]
    fn empty_mask_yields_empty_palette() {
        let frame = two_tone_frame();
        let mask = Mask::empty(frame.width, frame.height);
        assert!(seeded().extract(&frame, Some(&mask)).unwrap().is_empty());
    }

    #[test]
    fn mismatched_mask_is_an_error() {
        let frame = two_tone_frame();
        let mask = Mask::full(1, 1);
        assert!(seeded().extract(&frame, Some(&mask)).is_err());
    }

    #[test]
    fn seeded_extraction_is_reproducible() {
        let frame = two_tone_frame();
        let a = seeded().extract(&frame, None).unwrap();
        let b = seeded().extract(&frame, None).unwrap();
        assert_eq!(a, b);
    }
}
