use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::align::AlignmentOutcome;
use crate::detection::ObjectSearch;
use crate::diff::DifferencingOutcome;
use crate::record::ImageRecord;
use crate::stats::ImageStats;
use crate::template::TemplateRecord;

use super::types::PipelineStage;

/// Terminal status of one image run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Success,
    AlignmentFailed,
    SeeingRatioUndetermined,
    SubtractionQualityFailedBothDirections,
    /// The engine crashed or left no kernel-sum file.
    DifferencingFailed,
    /// Cleaning, measuring or object search hit a collaborator error.
    PreparationFailed,
}

impl RunStatus {
    /// Numeric code recorded in the ledger.
    pub fn fail_code(&self) -> u8 {
        match self {
            Self::Success => 0,
            Self::AlignmentFailed => 1,
            Self::SeeingRatioUndetermined => 2,
            Self::SubtractionQualityFailedBothDirections => 3,
            Self::DifferencingFailed => 4,
            Self::PreparationFailed => 5,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Status for a collaborator error raised while `stage` was running.
    pub fn for_error_in(stage: PipelineStage) -> Self {
        match stage {
            PipelineStage::Alignment => Self::AlignmentFailed,
            PipelineStage::Differencing | PipelineStage::Recording => Self::DifferencingFailed,
            _ => Self::PreparationFailed,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "Success"),
            Self::AlignmentFailed => write!(f, "Alignment failed"),
            Self::SeeingRatioUndetermined => write!(f, "Seeing ratio undetermined"),
            Self::SubtractionQualityFailedBothDirections => {
                write!(f, "Subtraction quality failed in both directions")
            }
            Self::DifferencingFailed => write!(f, "Differencing engine failed"),
            Self::PreparationFailed => write!(f, "Image preparation failed"),
        }
    }
}

/// Per-image state while the image is being processed. Consumed by
/// [`PipelineRun::finish`], so a run gets exactly one terminal status.
#[derive(Debug)]
pub struct PipelineRun {
    pub image: String,
    pub template: Arc<TemplateRecord>,
    pub stage: PipelineStage,
    pub record: Option<ImageRecord>,
    pub search: Option<ObjectSearch>,
    pub alignment: Option<AlignmentOutcome>,
    pub differencing: Option<DifferencingOutcome>,
    pub aligned_stats: Option<ImageStats>,
    pub difference_stats: Option<ImageStats>,
    /// FWHM of the frame that was not convolved.
    pub difference_fwhm: Option<f64>,
}

impl PipelineRun {
    pub fn new(image: impl Into<String>, template: Arc<TemplateRecord>) -> Self {
        Self {
            image: image.into(),
            template,
            stage: PipelineStage::Cleaning,
            record: None,
            search: None,
            alignment: None,
            differencing: None,
            aligned_stats: None,
            difference_stats: None,
            difference_fwhm: None,
        }
    }

    pub fn finish(self, status: RunStatus, detail: Option<String>) -> CompletedRun {
        CompletedRun {
            run: self,
            status,
            detail,
        }
    }
}

/// A run with its terminal status.
#[derive(Debug)]
pub struct CompletedRun {
    pub run: PipelineRun,
    pub status: RunStatus,
    /// Error text when a collaborator failure ended the run.
    pub detail: Option<String>,
}

impl CompletedRun {
    pub fn fail_code(&self) -> u8 {
        self.status.fail_code()
    }
}
