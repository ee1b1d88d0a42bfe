use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlignmentStrategy {
    /// Frames declared already aligned by configuration.
    Prealigned,
    DirectMatch,
    SearchRadiusReduction,
    ToleranceMatch,
    FrameResample,
}

impl AlignmentStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Prealigned => "prealigned",
            Self::DirectMatch => "direct-match",
            Self::SearchRadiusReduction => "search-radius-reduction",
            Self::ToleranceMatch => "tolerance-match",
            Self::FrameResample => "frame-resample",
        }
    }
}

impl fmt::Display for AlignmentStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a strategy, or the whole cascade, did not produce an aligned image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    InsufficientMatches,
    TransformError,
    NoStrategyAvailable,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientMatches => write!(f, "insufficient matches"),
            Self::TransformError => write!(f, "transform error"),
            Self::NoStrategyAvailable => write!(f, "no strategy available"),
        }
    }
}

/// One step of the cascade as it actually ran.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrategyAttempt {
    pub strategy: AlignmentStrategy,
    /// Matched pairs reported by the matcher, when it was called.
    pub matches: Option<usize>,
    /// `None` when this attempt produced the aligned image.
    pub failure: Option<FailureReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StrategyAttempt {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AlignmentOutcome {
    Success {
        method: AlignmentStrategy,
        image: PathBuf,
        attempts: Vec<StrategyAttempt>,
    },
    Failure {
        reason: FailureReason,
        attempts: Vec<StrategyAttempt>,
    },
}

impl AlignmentOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn attempts(&self) -> &[StrategyAttempt] {
        match self {
            Self::Success { attempts, .. } | Self::Failure { attempts, .. } => attempts,
        }
    }

    pub fn aligned_image(&self) -> Option<&PathBuf> {
        match self {
            Self::Success { image, .. } => Some(image),
            Self::Failure { .. } => None,
        }
    }

    /// Short label for reports: the winning method, or the failure reason.
    pub fn label(&self) -> String {
        match self {
            Self::Success { method, .. } => method.to_string(),
            Self::Failure { reason, .. } => format!("failed: {reason}"),
        }
    }
}
