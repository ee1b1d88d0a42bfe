use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::align::AlignmentConfig;
use crate::clean::CleaningConfig;
use crate::detection::{DetectionConfig, SearchConfig};
use crate::diff::{DifferencingConfig, DirectionHint};
use crate::error::{Result, SubpipeError};
use crate::header::HeaderConfig;
use crate::tools::ToolsConfig;

/// Everything one batch needs besides its inputs. Loaded once and shared
/// read-only by every image run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Convolution direction override, 0..=3.
    #[serde(default)]
    pub direction_hint: DirectionHint,
    /// Optional `x y` list of stamp centres handed to the engine.
    #[serde(default)]
    pub stamps: Option<PathBuf>,
    /// Write PNG previews of accepted aligned and difference images.
    #[serde(default = "default_true")]
    pub previews: bool,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub alignment: AlignmentConfig,
    #[serde(default)]
    pub differencing: DifferencingConfig,
    #[serde(default)]
    pub headers: HeaderConfig,
    #[serde(default)]
    pub cleaning: CleaningConfig,
    pub tools: ToolsConfig,
}

fn default_true() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            direction_hint: DirectionHint::default(),
            stamps: None,
            previews: true,
            detection: DetectionConfig::default(),
            alignment: AlignmentConfig::default(),
            differencing: DifferencingConfig::default(),
            headers: HeaderConfig::default(),
            cleaning: CleaningConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Reject settings no image could run with.
    pub fn validate(&self) -> Result<()> {
        check_search("detection.image", &self.detection.image)?;
        check_search("detection.template", &self.detection.template)?;

        let cols = &self.detection.catalog_columns;
        if [cols.x, cols.y, cols.flag, cols.elongation, cols.fwhm].contains(&0) {
            return Err(SubpipeError::Config(
                "catalog columns are 1-indexed, 0 is not a column".into(),
            ));
        }

        let align = &self.alignment;
        if align.min_matches == 0 {
            return Err(SubpipeError::Config("alignment.min_matches must be at least 1".into()));
        }
        if align.search_radius < 0.0 || !align.search_radius.is_finite() {
            return Err(SubpipeError::Config(format!(
                "alignment.search_radius must be a non-negative number, got {}",
                align.search_radius
            )));
        }

        let diff = &self.differencing;
        if diff.min_sum_kernel > diff.max_sum_kernel {
            return Err(SubpipeError::Config(format!(
                "differencing.min_sum_kernel ({}) exceeds max_sum_kernel ({})",
                diff.min_sum_kernel, diff.max_sum_kernel
            )));
        }

        if self.tools.timeout_secs == 0 {
            return Err(SubpipeError::Config("tools.timeout_secs must be positive".into()));
        }

        if let Some(stamps) = &self.stamps {
            if !stamps.is_file() {
                return Err(SubpipeError::Config(format!(
                    "stamp list {} not found",
                    stamps.display()
                )));
            }
        }
        Ok(())
    }
}

fn check_search(section: &str, search: &SearchConfig) -> Result<()> {
    if search.min_objects > search.max_objects {
        return Err(SubpipeError::Config(format!(
            "{section}: min_objects ({}) exceeds max_objects ({})",
            search.min_objects, search.max_objects
        )));
    }
    if search.max_attempts == 0 {
        return Err(SubpipeError::Config(format!(
            "{section}: max_attempts must be at least 1"
        )));
    }
    Ok(())
}
