use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::consts::{THRESHOLD_FLOOR, THRESHOLD_STEP_DOWN, THRESHOLD_STEP_UP};
use crate::error::Result;
use crate::io::catalog::count_rows;
use crate::tools::SourceDetector;

use super::config::SearchConfig;

/// How the threshold search ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchStatus {
    /// The object count landed inside the requested window.
    Converged,
    /// The next threshold would drop below the floor; the last result stands.
    FloorReached,
    /// The attempt budget ran out; the last result stands.
    AttemptsExhausted,
}

impl SearchStatus {
    /// `false` when the count may lie outside the requested window.
    pub fn is_reliable(&self) -> bool {
        matches!(self, Self::Converged)
    }
}

impl fmt::Display for SearchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converged => write!(f, "Converged"),
            Self::FloorReached => write!(f, "Threshold floor reached"),
            Self::AttemptsExhausted => write!(f, "Attempts exhausted"),
        }
    }
}

/// Result of [`find_objects`]. `catalog` holds exactly `object_count` rows,
/// detected at `threshold`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectSearch {
    pub catalog: PathBuf,
    pub object_count: usize,
    pub threshold: f64,
    pub attempts: usize,
    pub status: SearchStatus,
}

/// Path of the persistent coordinate catalog kept next to `image`.
pub fn coordinate_catalog_path(image: &Path) -> PathBuf {
    image.with_extension("coo")
}

/// Run the detector repeatedly, nudging the threshold until the object count
/// lands in `[min_objects, max_objects]`.
///
/// Too many objects raises the threshold by 5, too few lowers it by 2. The
/// search gives up at the threshold floor or after `max_attempts` detections
/// and keeps whatever the last detection produced; object counts are not
/// monotonic in threshold on real data, so callers must accept counts outside
/// the window. The accepted catalog is copied to `<image>.coo`.
pub fn find_objects(
    detector: &dyn SourceDetector,
    image: &Path,
    params: &SearchConfig,
    scratch: &Path,
) -> Result<ObjectSearch> {
    let max_attempts = params.max_attempts.max(1);
    debug!(
        min = params.min_objects,
        max = params.max_objects,
        max_attempts,
        "Starting object-count threshold search"
    );

    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".into());
    let raw_catalog = scratch.join(format!("{stem}.cat"));

    let mut threshold = params.start_threshold;
    let mut attempts = 0;
    let (object_count, status) = loop {
        attempts += 1;
        detector.detect(image, threshold, params.saturation, &raw_catalog)?;
        let count = count_rows(&raw_catalog)?;
        debug!(attempt = attempts, threshold, objects = count, "Detection attempt");

        let next = if count > params.max_objects {
            threshold + THRESHOLD_STEP_UP
        } else if count < params.min_objects {
            threshold - THRESHOLD_STEP_DOWN
        } else {
            break (count, SearchStatus::Converged);
        };

        // The floor only bounds the downward step.
        if next < threshold && next < THRESHOLD_FLOOR {
            warn!(
                objects = count,
                threshold, "Low number of objects found at minimum threshold"
            );
            break (count, SearchStatus::FloorReached);
        }
        if attempts >= max_attempts {
            warn!(
                objects = count,
                threshold, "Reached max detection attempts, proceeding with last result"
            );
            break (count, SearchStatus::AttemptsExhausted);
        }
        threshold = next;
    };

    let catalog = coordinate_catalog_path(image);
    fs::copy(&raw_catalog, &catalog)?;
    info!(
        image = %image.display(),
        objects = object_count,
        threshold,
        "Object search finished"
    );

    Ok(ObjectSearch {
        catalog,
        object_count,
        threshold,
        attempts,
        status,
    })
}
