use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_DETECTION_SATURATION, DEFAULT_FWHM, DEFAULT_MAX_OBJECTS,
    DEFAULT_MAX_SEARCH_ATTEMPTS, DEFAULT_MIN_OBJECTS, DEFAULT_START_THRESHOLD,
    FWHM_DETECTION_THRESHOLD,
};
use crate::io::catalog::CatalogColumns;

/// Bounds for the object-count threshold search on one kind of frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_start_threshold")]
    pub start_threshold: f64,
    #[serde(default = "default_saturation")]
    pub saturation: f64,
    #[serde(default = "default_min_objects")]
    pub min_objects: usize,
    #[serde(default = "default_max_objects")]
    pub max_objects: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
}

fn default_start_threshold() -> f64 {
    DEFAULT_START_THRESHOLD
}
fn default_saturation() -> f64 {
    DEFAULT_DETECTION_SATURATION
}
fn default_min_objects() -> usize {
    DEFAULT_MIN_OBJECTS
}
fn default_max_objects() -> usize {
    DEFAULT_MAX_OBJECTS
}
fn default_max_attempts() -> usize {
    DEFAULT_MAX_SEARCH_ATTEMPTS
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            start_threshold: DEFAULT_START_THRESHOLD,
            saturation: DEFAULT_DETECTION_SATURATION,
            min_objects: DEFAULT_MIN_OBJECTS,
            max_objects: DEFAULT_MAX_OBJECTS,
            max_attempts: DEFAULT_MAX_SEARCH_ATTEMPTS,
        }
    }
}

/// Source-detection settings for the whole batch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetectionConfig {
    #[serde(default)]
    pub image: SearchConfig,
    #[serde(default)]
    pub template: SearchConfig,
    /// Fixed threshold for the FWHM estimate taken when a frame is measured.
    #[serde(default = "default_fwhm_threshold")]
    pub fwhm_threshold: f64,
    #[serde(default = "default_saturation")]
    pub fwhm_saturation: f64,
    /// FWHM recorded when no clean point source can be measured.
    #[serde(default = "default_fwhm")]
    pub fwhm_default: f64,
    #[serde(default)]
    pub catalog_columns: CatalogColumns,
}

fn default_fwhm_threshold() -> f64 {
    FWHM_DETECTION_THRESHOLD
}
fn default_fwhm() -> f64 {
    DEFAULT_FWHM
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            image: SearchConfig::default(),
            template: SearchConfig::default(),
            fwhm_threshold: FWHM_DETECTION_THRESHOLD,
            fwhm_saturation: DEFAULT_DETECTION_SATURATION,
            fwhm_default: DEFAULT_FWHM,
            catalog_columns: CatalogColumns::default(),
        }
    }
}
