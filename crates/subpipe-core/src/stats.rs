use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::consts::{
    PARALLEL_PIXEL_THRESHOLD, STATS_CLIP_PASSES, STATS_CLIP_SIGMA, STATS_MIN_CLIPPED_FRACTION,
};

/// Summary pixel statistics of one image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageStats {
    pub width: usize,
    pub height: usize,
    /// Mean of the sigma-clipped pixels.
    pub mean: f64,
    /// Standard deviation of the sigma-clipped pixels.
    pub stddev: f64,
    /// Standard deviation of all considered pixels.
    pub total_stddev: f64,
    pub min: f64,
    pub max: f64,
    /// `mean - 5 * stddev`, a floor for "real" pixel values.
    pub floor: f64,
}

/// Compute image statistics with two passes of 3-sigma clipping.
///
/// With `remove_zeros`, exact-zero pixels are ignored (non-overlap regions of
/// resampled and differenced frames). If clipping leaves fewer than 1% of the
/// image, the unclipped values are used instead.
pub fn compute_stats(data: &Array2<f32>, remove_zeros: bool) -> ImageStats {
    let (height, width) = data.dim();
    let values: Vec<f64> = data
        .iter()
        .filter(|&&v| !(remove_zeros && v == 0.0))
        .map(|&v| v as f64)
        .collect();

    if values.is_empty() {
        return ImageStats {
            width,
            height,
            ..Default::default()
        };
    }

    let (_, total_stddev) = mean_stddev(&values);
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });

    let mut clipped = values.clone();
    for _ in 0..STATS_CLIP_PASSES {
        let (mean, stddev) = mean_stddev(&clipped);
        let lo = mean - STATS_CLIP_SIGMA * stddev;
        let hi = mean + STATS_CLIP_SIGMA * stddev;
        clipped.retain(|&v| v >= lo && v <= hi);
        if clipped.is_empty() {
            break;
        }
    }

    if (clipped.len() as f64) < (width * height) as f64 * STATS_MIN_CLIPPED_FRACTION {
        tracing::warn!(
            kept = clipped.len(),
            "Clipped sample is small, using unclipped statistics"
        );
        clipped = values;
    }

    let (mean, stddev) = mean_stddev(&clipped);
    ImageStats {
        width,
        height,
        mean,
        stddev,
        total_stddev,
        min,
        max,
        floor: mean - 5.0 * stddev,
    }
}

/// Population mean and standard deviation.
pub fn mean_stddev(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    if n == 0.0 {
        return (0.0, 0.0);
    }
    let (sum, sum_sq) = if values.len() >= PARALLEL_PIXEL_THRESHOLD {
        values
            .par_iter()
            .map(|&v| (v, v * v))
            .reduce(|| (0.0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1))
    } else {
        values
            .iter()
            .fold((0.0, 0.0), |acc, &v| (acc.0 + v, acc.1 + v * v))
    };
    let mean = sum / n;
    let var = (sum_sq / n - mean * mean).max(0.0);
    (mean, var.sqrt())
}

/// Median of a sample, `None` when empty. NaNs sort last.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    Some(if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) * 0.5
    })
}
