use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SubpipeError;

/// Caller override for which frame gets convolved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DirectionHint {
    /// Follow the measured seeing ratio.
    #[default]
    Auto,
    /// Do the opposite of what the seeing ratio implies.
    Invert,
    ConvolveImage,
    ConvolveTemplate,
}

impl DirectionHint {
    /// Hints that fix the direction outright. These bypass the quality gate.
    pub fn forces_direction(&self) -> bool {
        matches!(self, Self::ConvolveImage | Self::ConvolveTemplate)
    }

    /// Final `reverse` flag (`true` convolves the template).
    ///
    /// A ratio below 1 means the image is the sharper frame, so it is the
    /// one convolved. `None` when the direction depends on a ratio that could
    /// not be measured.
    pub fn resolve(&self, seeing_ratio: Option<f64>) -> Option<bool> {
        let implied = seeing_ratio.filter(|r| r.is_finite()).map(|r| r >= 1.0);
        match self {
            Self::Auto => implied,
            Self::Invert => implied.map(|rev| !rev),
            Self::ConvolveImage => Some(false),
            Self::ConvolveTemplate => Some(true),
        }
    }
}

impl TryFrom<u8> for DirectionHint {
    type Error = SubpipeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Auto),
            1 => Ok(Self::Invert),
            2 => Ok(Self::ConvolveImage),
            3 => Ok(Self::ConvolveTemplate),
            other => Err(SubpipeError::Config(format!(
                "direction hint must be 0..=3, got {other}"
            ))),
        }
    }
}

impl From<DirectionHint> for u8 {
    fn from(hint: DirectionHint) -> Self {
        match hint {
            DirectionHint::Auto => 0,
            DirectionHint::Invert => 1,
            DirectionHint::ConvolveImage => 2,
            DirectionHint::ConvolveTemplate => 3,
        }
    }
}

impl fmt::Display for DirectionHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "Auto"),
            Self::Invert => write!(f, "Invert"),
            Self::ConvolveImage => write!(f, "Convolve image"),
            Self::ConvolveTemplate => write!(f, "Convolve template"),
        }
    }
}
