use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::detection::DetectionConfig;
use crate::error::Result;
use crate::header::{HeaderConfig, HeaderInfo};
use crate::io::catalog::Catalog;
use crate::io::fits::read_fits;
use crate::seeing::median_seeing;
use crate::stats::{compute_stats, ImageStats};
use crate::tools::SourceDetector;

/// Derived, read-only facts about one frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub path: PathBuf,
    pub stats: ImageStats,
    /// Median point-source FWHM in pixels; `None` when it could not be measured.
    pub fwhm: Option<f64>,
    pub header: HeaderInfo,
    /// Catalog used for the FWHM estimate, if the detector produced one.
    pub catalog: Option<PathBuf>,
}

impl ImageRecord {
    /// Read pixels and header, compute statistics and estimate the FWHM.
    ///
    /// A detector failure only costs the FWHM estimate; it is logged and the
    /// record is still produced.
    pub fn measure(
        path: &Path,
        detector: &dyn SourceDetector,
        detection: &DetectionConfig,
        headers: &HeaderConfig,
        remove_zeros: bool,
    ) -> Result<Self> {
        let image = read_fits(path)?;
        let stats = compute_stats(&image.data, remove_zeros);
        let header = HeaderInfo::from_header(&image.header, headers);
        drop(image);

        let star_list = path.with_extension("stars");
        let (fwhm, catalog) = match detector.detect(
            path,
            detection.fwhm_threshold,
            detection.fwhm_saturation,
            &star_list,
        ) {
            Ok(()) => {
                let fwhm = Catalog::read(&star_list, &detection.catalog_columns)
                    .map_err(|e| warn!(error = %e, "Could not read FWHM catalog"))
                    .ok()
                    .and_then(|c| median_seeing(&c));
                (fwhm, Some(star_list))
            }
            Err(e) => {
                warn!(error = %e, "Detector failed during FWHM estimate");
                (None, None)
            }
        };
        if fwhm.is_none() {
            warn!(
                default = detection.fwhm_default,
                "FWHM undetermined, the configured default will be reported"
            );
        }
        debug!(path = %path.display(), ?fwhm, mean = stats.mean, stddev = stats.stddev, "Measured frame");

        Ok(Self {
            path: path.to_path_buf(),
            stats,
            fwhm,
            header,
            catalog,
        })
    }

    /// Measured FWHM, or `default` when unknown.
    pub fn fwhm_or(&self, default: f64) -> f64 {
        self.fwhm.unwrap_or(default)
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}
