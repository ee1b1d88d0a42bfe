use std::path::Path;

use image::{GrayImage, ImageFormat, Luma};
use ndarray::Array2;

use crate::error::Result;
use crate::stats::compute_stats;

use super::fits::read_fits;

/// Render a FITS image as an 8-bit PNG next to it (same stem, `.png`).
///
/// The image is binned by `bin` in both axes and stretched linearly between
/// `mean - 2 sigma` and `mean + 5 sigma` of the non-zero pixels. FITS row 0 is
/// the bottom of the frame, so rows are flipped for display.
pub fn write_preview(fits_path: &Path, bin: usize) -> Result<std::path::PathBuf> {
    let image = read_fits(fits_path)?;
    let binned = rebin(&image.data, bin.max(1));
    let stats = compute_stats(&binned, true);
    let lo = stats.mean - 2.0 * stats.stddev;
    let hi = stats.mean + 5.0 * stats.stddev;
    let span = if hi > lo { hi - lo } else { 1.0 };

    let (h, w) = binned.dim();
    let mut img = GrayImage::new(w as u32, h as u32);
    for row in 0..h {
        for col in 0..w {
            let v = ((binned[[row, col]] as f64 - lo) / span).clamp(0.0, 1.0);
            img.put_pixel(col as u32, (h - 1 - row) as u32, Luma([(v * 255.0) as u8]));
        }
    }

    let png_path = fits_path.with_extension("png");
    img.save_with_format(&png_path, ImageFormat::Png)?;
    Ok(png_path)
}

/// Block-average by `factor`, dropping any partial edge block.
fn rebin(data: &Array2<f32>, factor: usize) -> Array2<f32> {
    if factor == 1 {
        return data.clone();
    }
    let (h, w) = data.dim();
    let (bh, bw) = ((h / factor).max(1), (w / factor).max(1));
    let mut out = Array2::<f32>::zeros((bh, bw));
    for row in 0..bh {
        for col in 0..bw {
            let mut sum = 0.0f64;
            let mut n = 0usize;
            for r in row * factor..((row + 1) * factor).min(h) {
                for c in col * factor..((col + 1) * factor).min(w) {
                    sum += data[[r, c]] as f64;
                    n += 1;
                }
            }
            out[[row, col]] = if n > 0 { (sum / n as f64) as f32 } else { 0.0 };
        }
    }
    out
}
