//! Seams to the external programs the pipeline drives.
//!
//! Every collaborator is a trait so the orchestration logic can run against
//! scripted stand-ins. [`Toolset::external`] wires the process-backed
//! implementations from [`ToolsConfig`].

pub mod command;
pub mod config;
mod external;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use command::{run_tool, CommandSpec, ToolOutput};
pub use config::ToolsConfig;
pub use external::{
    ExternalCleaner, ExternalDetector, ExternalEngine, ExternalMatcher, ExternalResampler,
};

/// Runs source extraction on one image.
pub trait SourceDetector {
    /// Detect sources in `image` and write a catalog, brightest first, to
    /// `catalog`. Any previous file at `catalog` is replaced.
    fn detect(&self, image: &Path, threshold: f64, saturation: f64, catalog: &Path)
        -> Result<()>;
}

/// Point-pattern algorithm used by the coordinate matcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchMode {
    /// Triangle-pattern matching, robust to rotation and offsets.
    Triangles,
    /// Plain point-set tolerance matching.
    Tolerance,
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Triangles => write!(f, "triangles"),
            Self::Tolerance => write!(f, "tolerance"),
        }
    }
}

/// One coordinate-matching call.
#[derive(Clone, Debug)]
pub struct MatchRequest<'a> {
    pub input: &'a Path,
    pub reference: &'a Path,
    /// Where the transform-ready coordinate pairs are written.
    pub output: &'a Path,
    pub mode: MatchMode,
    pub tolerance: f64,
    pub nmatch: usize,
    pub separation: f64,
}

/// Matches two coordinate lists.
pub trait CoordinateMatcher {
    /// Returns the number of matched coordinate pairs.
    fn match_coordinates(&self, request: &MatchRequest<'_>) -> Result<usize>;
}

/// Warps one image onto another image's pixel grid.
pub trait Resampler {
    /// Fit a geometric transform from the matched pairs in `matches` and
    /// resample `image` onto a `(width, height)` grid at `output`.
    fn apply_transform(
        &self,
        image: &Path,
        matches: &Path,
        reference_shape: (usize, usize),
        output: &Path,
        scratch: &Path,
    ) -> Result<()>;

    /// Resample `image` onto the world-coordinate frame of `template`.
    fn register_to_frame(
        &self,
        image: &Path,
        template: &Path,
        output: &Path,
        scratch: &Path,
    ) -> Result<()>;
}

/// One differencing-engine invocation.
#[derive(Clone, Debug)]
pub struct EngineRequest<'a> {
    /// Image the engine convolves with the fitted kernel.
    pub convolve: &'a Path,
    /// Image the convolved one is matched to and subtracted from.
    pub target: &'a Path,
    pub params: &'a Path,
    /// Working directory for the engine; its outputs land here.
    pub scratch: &'a Path,
}

/// Files produced by a differencing run, all inside the request's scratch.
#[derive(Clone, Debug)]
pub struct EngineOutput {
    pub difference: PathBuf,
    pub convolved: Option<PathBuf>,
    /// Absent when the engine did not write its kernel-sum file.
    pub kernel_sum: Option<PathBuf>,
    pub log: String,
}

/// Kernel-fitting image subtraction.
pub trait DifferencingEngine {
    fn run(&self, request: &EngineRequest<'_>) -> Result<EngineOutput>;
}

/// Parameters for cosmic-ray and bad-pixel cleaning.
#[derive(Clone, Debug)]
pub struct CosmeticsRequest<'a> {
    pub iterations: u32,
    pub bad_pixel_mask: Option<&'a Path>,
    pub gain: f64,
    pub read_noise: f64,
    pub saturation: f64,
    /// Border (pixels) ignored during detection.
    pub trim: usize,
}

/// Per-pixel cleanup operators. Both rewrite `image` in place.
pub trait ImageCleaner {
    fn remove_cosmetics(
        &self,
        image: &Path,
        request: &CosmeticsRequest<'_>,
        scratch: &Path,
    ) -> Result<()>;

    fn defringe(&self, image: &Path, fringe_frame: &Path, scratch: &Path) -> Result<()>;
}

/// The full set of collaborators used by one batch.
pub struct Toolset {
    pub detector: Box<dyn SourceDetector>,
    pub matcher: Box<dyn CoordinateMatcher>,
    pub resampler: Box<dyn Resampler>,
    pub engine: Box<dyn DifferencingEngine>,
    pub cleaner: Box<dyn ImageCleaner>,
}

impl Toolset {
    /// Process-backed collaborators driven by command templates.
    pub fn external(config: &ToolsConfig) -> Self {
        Self {
            detector: Box::new(ExternalDetector::new(config)),
            matcher: Box::new(ExternalMatcher::new(config)),
            resampler: Box::new(ExternalResampler::new(config)),
            engine: Box::new(ExternalEngine::new(config)),
            cleaner: Box::new(ExternalCleaner::new(config)),
        }
    }
}
