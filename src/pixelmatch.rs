//! Built-in per-pixel comparison engine.

use crate::{
    CompareOptions, Comparison, ComparisonEngine, MismatchReason, RunnerError, ScreenshotKind,
    StorageAdapter,
};
use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use std::io::Cursor;

const DEFAULT_DIFF_COLOR: Rgba<u8> = Rgba([255, 0, 255, 255]);

/// Compares the `current` capture against the accepted `base` image pixel
/// by pixel and writes a highlighted diff image when the variant fails.
pub struct PixelmatchEngine {
    /// Per-channel delta below which two pixels still count as equal.
    /// Absorbs rounding differences from GPU anti-aliasing.
    channel_tolerance: u8,
}

impl Default for PixelmatchEngine {
    fn default() -> Self {
        Self {
            channel_tolerance: 0,
        }
    }
}

impl PixelmatchEngine {
    pub fn with_channel_tolerance(channel_tolerance: u8) -> Self {
        Self { channel_tolerance }
    }

    fn pixels_match(&self, a: Rgba<u8>, b: Rgba<u8>) -> bool {
        a.0.iter()
            .zip(b.0.iter())
            .all(|(x, y)| x.abs_diff(*y) <= self.channel_tolerance)
    }
}

fn parse_diff_color(spec: Option<&str>) -> Rgba<u8> {
    let Some(spec) = spec else {
        return DEFAULT_DIFF_COLOR;
    };

    let hex = spec.trim_start_matches('#');
    if hex.len() != 6 {
        return DEFAULT_DIFF_COLOR;
    }

    match (
        u8::from_str_radix(&hex[0..2], 16),
        u8::from_str_radix(&hex[2..4], 16),
        u8::from_str_radix(&hex[4..6], 16),
    ) {
        (Ok(r), Ok(g), Ok(b)) => Rgba([r, g, b, 255]),
        _ => DEFAULT_DIFF_COLOR,
    }
}

fn decode(bytes: &[u8], label: &str) -> Result<RgbaImage, RunnerError> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgba8())
        .map_err(|e| RunnerError::Comparison(format!("Failed to decode {label} image: {e}")))
}

fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, RunnerError> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
        .map_err(|e| RunnerError::Comparison(format!("Failed to encode diff image: {e}")))?;
    Ok(bytes)
}

#[async_trait]
impl ComparisonEngine for PixelmatchEngine {
    fn name(&self) -> &str {
        "pixelmatch"
    }

    async fn compare(
        &self,
        storage: &dyn StorageAdapter,
        filename: &str,
        opts: &CompareOptions,
    ) -> Result<Comparison, RunnerError> {
        // A storage failure here propagates as an error rather than being
        // mistaken for a missing image.
        if !storage.exists(ScreenshotKind::Current, filename).await? {
            return Ok(Comparison::mismatch(MismatchReason::MissingCurrent));
        }
        if !storage.exists(ScreenshotKind::Base, filename).await? {
            return Ok(Comparison::mismatch(MismatchReason::MissingBase));
        }

        let base = decode(
            &storage.read(ScreenshotKind::Base, filename).await?,
            "base",
        )?;
        let current = decode(
            &storage.read(ScreenshotKind::Current, filename).await?,
            "current",
        )?;

        // The diff canvas covers the union of both sizes; pixels outside
        // the overlap count as differing.
        let width = base.width().max(current.width());
        let height = base.height().max(current.height());
        let total = u64::from(width) * u64::from(height);

        let diff_color = parse_diff_color(opts.diff_color.as_deref());
        let mut diff = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));
        let mut differing: u64 = 0;

        for y in 0..height {
            for x in 0..width {
                let base_px = (x < base.width() && y < base.height()).then(|| *base.get_pixel(x, y));
                let current_px =
                    (x < current.width() && y < current.height()).then(|| *current.get_pixel(x, y));

                match (base_px, current_px) {
                    (Some(b), Some(c)) if self.pixels_match(b, c) => {
                        diff.put_pixel(x, y, b);
                    }
                    _ => {
                        differing += 1;
                        diff.put_pixel(x, y, diff_color);
                    }
                }
            }
        }

        if differing == 0 {
            return Ok(Comparison::matched());
        }

        let ratio = differing as f64 / total as f64;
        if ratio <= opts.threshold {
            return Ok(Comparison::matched());
        }

        storage
            .write(ScreenshotKind::Diff, filename, &encode_png(&diff)?)
            .await?;

        // Report two decimal places, the same precision the diff summary
        // prints.
        Ok(Comparison::pixel_diff((ratio * 10000.0).round() / 100.0))
    }
}
