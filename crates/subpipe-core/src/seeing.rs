use tracing::{debug, info, warn};

use crate::consts::{MAX_SEEING_ELONGATION, MAX_SEEING_PAIRS, SEEING_PAIR_RADIUS};
use crate::io::catalog::Catalog;
use crate::stats::median;

/// Median FWHM (pixels) of the clean, round point sources in a catalog.
pub fn median_seeing(catalog: &Catalog) -> Option<f64> {
    let widths: Vec<f64> = catalog
        .rows
        .iter()
        .filter(|r| r.is_clean_point_source(MAX_SEEING_ELONGATION) && r.fwhm > 0.0)
        .map(|r| r.fwhm)
        .collect();

    if widths.is_empty() {
        warn!("No clean point sources to estimate seeing from");
        return None;
    }
    if widths.len() == 1 {
        warn!("Seeing based on a single detected object");
    }
    let seeing = median(&widths)?;
    info!(seeing, measurements = widths.len(), "Median seeing");
    Some(seeing)
}

/// Image-to-template seeing ratio from detections present in both frames.
///
/// Each clean image source is paired with the first clean template source
/// within [`SEEING_PAIR_RADIUS`] pixels whose FWHM is usable; the median of
/// the per-pair width ratios is returned. `None` when nothing pairs up, which
/// usually means a bad alignment or too few point sources.
pub fn seeing_ratio(image: &Catalog, template: &Catalog) -> Option<f64> {
    if image.is_empty() {
        warn!("No objects detected in the image, cannot compare seeing");
        return None;
    }

    let clean_template: Vec<_> = template
        .rows
        .iter()
        .filter(|r| r.is_clean_point_source(MAX_SEEING_ELONGATION))
        .collect();

    let mut ratios = Vec::new();
    for src in image
        .rows
        .iter()
        .filter(|r| r.is_clean_point_source(MAX_SEEING_ELONGATION))
    {
        if ratios.len() >= MAX_SEEING_PAIRS {
            break;
        }
        if src.fwhm == 0.0 {
            continue;
        }
        if let Some(partner) = clean_template
            .iter()
            .find(|t| t.fwhm != 0.0 && src.distance_to(t) < SEEING_PAIR_RADIUS)
        {
            ratios.push(src.fwhm / partner.fwhm);
        }
    }

    debug!(pairs = ratios.len(), "Seeing ratio sample");
    median(&ratios)
}
