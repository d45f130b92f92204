//! Training summaries: metrics lines and preview images.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub epoch: usize,
    pub step: usize,
    pub img_loss: f32,
    pub reg_loss: Option<f32>,
    pub total_loss: f32,
    pub psnr: f32,
    pub elapsed_secs: f64,
}

/// Append one JSON line to `path`, creating the file if needed.
pub fn append_metrics(path: &Path, record: &MetricsRecord) -> anyhow::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open metrics file {}", path.display()))?;
    let line = serde_json::to_string(record)?;
    writeln!(file, "{line}")?;
    Ok(())
}

pub fn read_metrics(path: &Path) -> anyhow::Result<Vec<MetricsRecord>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read metrics file {}", path.display()))?;
    raw.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(anyhow::Error::from))
        .collect()
}

fn to_u8(v: f32) -> u8 {
    ((v.clamp(-1.0, 1.0) + 1.0) * 127.5).round() as u8
}

/// HWC `[-1, 1]` buffer to an 8-bit image.
pub fn to_rgb_image(rgb: &[f32], width: u32, height: u32) -> anyhow::Result<image::RgbImage> {
    let expected = (width * height * 3) as usize;
    if rgb.len() != expected {
        anyhow::bail!(
            "image buffer has {} values, expected {expected} for {width}x{height}",
            rgb.len()
        );
    }
    let bytes = rgb.iter().copied().map(to_u8).collect();
    image::RgbImage::from_raw(width, height, bytes)
        .ok_or_else(|| anyhow::anyhow!("failed to build {width}x{height} image"))
}

/// Prediction and ground truth side by side.
pub fn write_comparison_png(
    path: &Path,
    prediction: &[f32],
    ground_truth: &[f32],
    width: u32,
    height: u32,
) -> anyhow::Result<()> {
    let pred = to_rgb_image(prediction, width, height)?;
    let gt = to_rgb_image(ground_truth, width, height)?;
    let mut canvas = image::RgbImage::new(width * 2, height);
    image::imageops::replace(&mut canvas, &pred, 0, 0);
    image::imageops::replace(&mut canvas, &gt, i64::from(width), 0);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    canvas
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))
}
