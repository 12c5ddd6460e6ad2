//! Decoded image containers.
//!
//! - `Frame`: owned 3-channel RGB pixel grid handed to every model adapter.
//! - `Mask`: boolean grid of the same dimensions restricting which pixels a
//!   consumer (the color extractor) looks at.
//!
//! Frames are decoded once per analysis call and dropped when the call ends.
//! Nothing in this module writes pixels back to disk.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader, RgbImage};

/// Owned RGB24 image, row-major, 3 bytes per pixel.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    /// Decode an image file and convert it to 3-channel RGB.
    ///
    /// The format is sniffed from the file contents, not the extension.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let decoded = ImageReader::open(path)
            .with_context(|| format!("failed to open image {}", path.display()))?
            .with_guessed_format()
            .with_context(|| format!("failed to sniff image format of {}", path.display()))?
            .decode()
            .with_context(|| format!("failed to decode image {}", path.display()))?;
        Self::from_dynamic(decoded)
    }

    /// Wrap an already decoded image.
    pub fn from_dynamic(image: DynamicImage) -> Result<Self> {
        let rgb = image.into_rgb8();
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Err(anyhow!("image has zero area ({}x{})", width, height));
        }
        Ok(Self {
            data: rgb.into_raw(),
            width,
            height,
        })
    }

    /// Build a frame from raw RGB24 bytes.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if expected == 0 {
            return Err(anyhow!("image has zero area ({}x{})", width, height));
        }
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Solid color frame. Mostly useful for fixtures and the demo.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Result<Self> {
        let pixels = (width as usize) * (height as usize);
        let data = rgb.iter().copied().cycle().take(pixels * 3).collect();
        Self::from_rgb(data, width, height)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Iterate pixels as `[r, g, b]` triples in row-major order.
    pub fn rgb_iter(&self) -> impl Iterator<Item = [u8; 3]> + '_ {
        self.data.chunks_exact(3).map(|px| [px[0], px[1], px[2]])
    }

    /// Resample to a model input size (bilinear, aspect ratio not preserved).
    pub fn resized(&self, width: u32, height: u32) -> Result<Frame> {
        if width == self.width && height == self.height {
            return Ok(self.clone());
        }
        let source = RgbImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))?;
        let resized = image::imageops::resize(&source, width, height, FilterType::Triangle);
        Frame::from_rgb(resized.into_raw(), width, height)
    }
}

/// Boolean pixel mask with the same dimensions as the frame it restricts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mask {
    bits: Vec<bool>,
    pub width: u32,
    pub height: u32,
}

impl Mask {
    pub fn new(bits: Vec<bool>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| anyhow!("mask dimensions overflow"))?;
        if bits.len() != expected {
            return Err(anyhow!(
                "mask length mismatch: expected {}, got {}",
                expected,
                bits.len()
            ));
        }
        Ok(Self {
            bits,
            width,
            height,
        })
    }

    /// Mask selecting every pixel.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            bits: vec![true; (width as usize) * (height as usize)],
            width,
            height,
        }
    }

    /// Mask selecting no pixel.
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            bits: vec![false; (width as usize) * (height as usize)],
            width,
            height,
        }
    }

    /// Build a mask from a per-coordinate predicate.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        let mut bits = Vec::with_capacity((width as usize) * (height as usize));
        for y in 0..height {
            for x in 0..width {
                bits.push(f(x, y));
            }
        }
        Self {
            bits,
            width,
            height,
        }
    }

    pub fn is_set(&self, index: usize) -> bool {
        self.bits.get(index).copied().unwrap_or(false)
    }

    pub fn count(&self) -> usize {
        self.bits.iter().filter(|bit| **bit).count()
    }

    pub fn matches(&self, frame: &Frame) -> bool {
        self.width == frame.width && self.height == frame.height
    }
}
