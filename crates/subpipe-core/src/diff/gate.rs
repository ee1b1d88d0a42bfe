use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::consts::{FIRST_ATTEMPT_SUFFIX, KERNEL_SUM_UNDETERMINED, SECOND_ATTEMPT_SUFFIX};
use crate::detection::DetectionConfig;
use crate::error::{Result, SubpipeError};
use crate::io::catalog::Catalog;
use crate::io::fits::{read_fits, read_header, write_fits};
use crate::seeing::{median_seeing, seeing_ratio};
use crate::tools::{DifferencingEngine, EngineRequest, SourceDetector};

use super::direction::DirectionHint;
use super::params::DifferencingConfig;
use super::selector::select_params;

/// Name of the stamp list inside the engine's working directory.
const STAMPS_FILE: &str = "STAMPS";
const PARAM_FILE: &str = "default_config";

/// Quality statistic written by the differencing engine.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum KernelSum {
    Value(f64),
    /// The engine's file could not be interpreted. Never passes the gate.
    Undetermined,
}

impl KernelSum {
    /// Parse the last token of the first line.
    pub fn parse(text: &str) -> Self {
        text.lines()
            .next()
            .and_then(|l| l.split_whitespace().last())
            .and_then(|t| t.parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .map_or(Self::Undetermined, Self::Value)
    }

    /// Numeric form for reports; the undetermined sentinel is -1.
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Value(v) => *v,
            Self::Undetermined => KERNEL_SUM_UNDETERMINED,
        }
    }

    pub fn passes(&self, config: &DifferencingConfig) -> bool {
        match self {
            Self::Value(v) => config.kernel_sum_in_bounds(*v),
            Self::Undetermined => false,
        }
    }
}

impl fmt::Display for KernelSum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{v:.4}"),
            Self::Undetermined => write!(f, "undetermined"),
        }
    }
}

/// Terminal state of the quality gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DifferencingState {
    Accepted,
    RetriedAccepted,
    DoubleFailure,
    /// Seeing ratio unknown and no explicit direction; the engine never ran.
    RatioUndetermined,
}

impl DifferencingState {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted | Self::RetriedAccepted)
    }
}

impl fmt::Display for DifferencingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted => write!(f, "Accepted"),
            Self::RetriedAccepted => write!(f, "Accepted after reversed retry"),
            Self::DoubleFailure => write!(f, "Rejected in both directions"),
            Self::RatioUndetermined => write!(f, "Seeing ratio undetermined"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DifferencingOutcome {
    /// `true` when the template was convolved. `None` if the engine never ran.
    pub reverse: Option<bool>,
    pub seeing_ratio: Option<f64>,
    pub kernel_sum: KernelSum,
    /// Difference image; present only when accepted.
    pub output: Option<PathBuf>,
    pub attempts: u8,
    pub state: DifferencingState,
}

/// Files involved in differencing one aligned image.
#[derive(Clone, Debug)]
pub struct SubtractRequest<'a> {
    /// The image, already on the template grid.
    pub image: &'a Path,
    pub template: &'a Path,
    /// Template detections used for the seeing comparison; regenerated when
    /// missing.
    pub template_stars: &'a Path,
    pub image_threshold: f64,
    pub template_threshold: f64,
    /// Output prefix: results land at `<artifacts>.sub.fits`,
    /// `<artifacts>.sum_kernel` and `<artifacts>.engine.log`.
    pub artifacts: &'a Path,
    pub stamps: Option<&'a Path>,
    pub scratch: &'a Path,
}

/// Seeing comparison, engine invocation and the kernel-sum quality gate.
pub struct Differencer<'t> {
    pub detector: &'t dyn SourceDetector,
    pub engine: &'t dyn DifferencingEngine,
    pub config: &'t DifferencingConfig,
    pub detection: &'t DetectionConfig,
}

impl Differencer<'_> {
    /// Difference the image against the template.
    ///
    /// At most two engine runs: a rejected first attempt is kept under a
    /// `.one` suffix and rerun in the opposite direction; a rejected retry is
    /// kept under `.two` and ends in [`DifferencingState::DoubleFailure`].
    /// Forced directions skip the gate. A missing kernel-sum file or an
    /// engine crash is returned as an error.
    pub fn subtract(
        &self,
        req: &SubtractRequest<'_>,
        hint: DirectionHint,
    ) -> Result<DifferencingOutcome> {
        let (image_stars, template_stars) = self.star_lists(req)?;
        let ratio = seeing_ratio(&image_stars, &template_stars);
        match ratio {
            Some(r) => info!(ratio = r, "Image to template seeing ratio"),
            None => warn!("Failed to determine seeing ratio between frames"),
        }

        let Some(mut reverse) = hint.resolve(ratio) else {
            error!("Alignment incorrect or not enough point sources, differencing aborted");
            return Ok(DifferencingOutcome {
                reverse: None,
                seeing_ratio: None,
                kernel_sum: KernelSum::Undetermined,
                output: None,
                attempts: 0,
                state: DifferencingState::RatioUndetermined,
            });
        };
        if ratio.is_none() {
            info!(%hint, "Subtraction direction given explicitly");
        }

        let seeing = median_seeing(&image_stars).unwrap_or(f64::NAN);
        let params = select_params(seeing, self.config);

        let stamps_by_xy = match req.stamps {
            Some(stamps) => {
                fs::copy(stamps, req.scratch.join(STAMPS_FILE))?;
                debug!(stamps = %stamps.display(), "Stamp list supplied");
                true
            }
            None => false,
        };

        let mut attempts = 1;
        let mut kernel_sum = self.run_engine(req, &params, reverse, stamps_by_xy)?;

        let state = if hint.forces_direction() {
            info!(%hint, %kernel_sum, "Direction forced, kernel sum not checked");
            DifferencingState::Accepted
        } else if kernel_sum.passes(&params) {
            DifferencingState::Accepted
        } else {
            warn!(%kernel_sum, "Subtraction is probably poor, running in reverse");
            rename_artifacts(req.artifacts, FIRST_ATTEMPT_SUFFIX)?;
            reverse = !reverse;
            attempts += 1;
            kernel_sum = self.run_engine(req, &params, reverse, stamps_by_xy)?;
            if kernel_sum.passes(&params) {
                DifferencingState::RetriedAccepted
            } else {
                warn!(%kernel_sum, "Subtraction was deemed poor in both directions");
                rename_artifacts(req.artifacts, SECOND_ATTEMPT_SUFFIX)?;
                DifferencingState::DoubleFailure
            }
        };

        let output = state
            .is_accepted()
            .then(|| artifact(req.artifacts, ".sub.fits"));
        Ok(DifferencingOutcome {
            reverse: Some(reverse),
            seeing_ratio: ratio,
            kernel_sum,
            output,
            attempts,
            state,
        })
    }

    /// Detections on the aligned image and on the template.
    fn star_lists(&self, req: &SubtractRequest<'_>) -> Result<(Catalog, Catalog)> {
        let columns = &self.detection.catalog_columns;
        let image_list = req.image.with_extension("stars");
        debug!("Detecting objects on aligned image");
        self.detector.detect(
            req.image,
            req.image_threshold,
            self.detection.image.saturation,
            &image_list,
        )?;
        if !req.template_stars.exists() {
            debug!("Detecting objects on template");
            self.detector.detect(
                req.template,
                req.template_threshold,
                self.detection.template.saturation,
                req.template_stars,
            )?;
        }
        Ok((
            Catalog::read(&image_list, columns)?,
            Catalog::read(req.template_stars, columns)?,
        ))
    }

    /// One engine run in the given direction; returns its kernel sum.
    fn run_engine(
        &self,
        req: &SubtractRequest<'_>,
        params: &DifferencingConfig,
        reverse: bool,
        stamps_by_xy: bool,
    ) -> Result<KernelSum> {
        let param_file = req.scratch.join(PARAM_FILE);
        params.write_param_file(&param_file, reverse, stamps_by_xy)?;

        let (convolve, target) = if reverse {
            (req.template, req.image)
        } else {
            (req.image, req.template)
        };
        info!(reverse, "Calling differencing engine");
        let output = self.engine.run(&EngineRequest {
            convolve,
            target,
            params: &param_file,
            scratch: req.scratch,
        })?;

        let mut log = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(artifact(req.artifacts, ".engine.log"))?;
        writeln!(log, "calling engine reverse = {}", u8::from(reverse))?;
        log.write_all(output.log.as_bytes())?;

        fs::rename(&output.difference, artifact(req.artifacts, ".sub.fits"))?;

        if let Some(convolved) = &output.convolved {
            if params.remove_convolved {
                fs::remove_file(convolved)?;
            } else {
                let frame = read_fits(convolved)?;
                let header = read_header(convolve)?;
                write_fits(&artifact(req.artifacts, ".conv.fits"), &frame.data, Some(&header))?;
                fs::remove_file(convolved)?;
            }
        }

        let Some(sum_file) = &output.kernel_sum else {
            return Err(SubpipeError::tool(
                "differencing engine",
                "no kernel-sum file",
                output.log,
            ));
        };
        let kept = artifact(req.artifacts, ".sum_kernel");
        fs::rename(sum_file, &kept)?;
        let kernel_sum = KernelSum::parse(&fs::read_to_string(&kept)?);
        if kernel_sum == KernelSum::Undetermined {
            error!("Could not deduce the kernel sum");
        }
        info!(%kernel_sum, reverse, "Differencing attempt finished");
        Ok(kernel_sum)
    }
}

/// `<base><suffix>` without treating any dot in `base` as an extension.
pub fn artifact(base: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Keep a rejected attempt's files under `.<tag>`.
fn rename_artifacts(base: &Path, tag: &str) -> Result<()> {
    for ext in [".sum_kernel", ".engine.log", ".sub.fits"] {
        let from = artifact(base, ext);
        if from.exists() {
            let to = artifact(&from, &format!(".{tag}"));
            debug!(from = %from.display(), to = %to.display(), "Keeping rejected attempt");
            fs::rename(from, to)?;
        }
    }
    Ok(())
}
