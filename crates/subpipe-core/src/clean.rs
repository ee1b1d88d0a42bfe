use std::fmt;
use std::path::{Path, PathBuf};

use ndarray::s;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::consts::DEFAULT_DETECTION_SATURATION;
use crate::error::Result;
use crate::io::fits::{read_fits, write_fits};
use crate::tools::{CosmeticsRequest, ImageCleaner};

/// How much of the cleaning chain the template goes through.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplateCleaning {
    /// Defringe, bad pixels, cosmic rays and border trim.
    Full,
    /// Cosmic rays and border trim only.
    #[default]
    CosmicRaysOnly,
    None,
}

impl fmt::Display for TemplateCleaning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "Full"),
            Self::CosmicRaysOnly => write!(f, "Cosmic rays only"),
            Self::None => write!(f, "None"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CleaningConfig {
    #[serde(default = "default_iterations")]
    pub image_iterations: u32,
    #[serde(default = "default_iterations")]
    pub template_iterations: u32,
    /// Border width (pixels) zeroed after cleaning.
    #[serde(default)]
    pub trim: usize,
    #[serde(default)]
    pub fringe_frame: Option<PathBuf>,
    #[serde(default)]
    pub bad_pixel_mask: Option<PathBuf>,
    /// Apply fringe and bad-pixel correction to the template as well.
    #[serde(default)]
    pub clean_template: bool,
    #[serde(default = "default_saturation")]
    pub image_saturation: f64,
    #[serde(default = "default_saturation")]
    pub template_saturation: f64,
}

fn default_iterations() -> u32 {
    2
}
fn default_saturation() -> f64 {
    DEFAULT_DETECTION_SATURATION
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            image_iterations: default_iterations(),
            template_iterations: default_iterations(),
            trim: 0,
            fringe_frame: None,
            bad_pixel_mask: None,
            clean_template: false,
            image_saturation: DEFAULT_DETECTION_SATURATION,
            template_saturation: DEFAULT_DETECTION_SATURATION,
        }
    }
}

impl CleaningConfig {
    pub fn template_policy(&self) -> TemplateCleaning {
        if self.clean_template {
            TemplateCleaning::Full
        } else if self.template_iterations > 0 {
            TemplateCleaning::CosmicRaysOnly
        } else {
            TemplateCleaning::None
        }
    }
}

/// Set a border of `trim` pixels to zero, rewriting the file in place.
pub fn trim_border(path: &Path, trim: usize) -> Result<()> {
    if trim == 0 {
        return Ok(());
    }
    let mut image = read_fits(path)?;
    let (h, w) = image.data.dim();
    let ty = trim.min(h);
    let tx = trim.min(w);
    image.data.slice_mut(s![..ty, ..]).fill(0.0);
    image.data.slice_mut(s![h - ty.., ..]).fill(0.0);
    image.data.slice_mut(s![.., ..tx]).fill(0.0);
    image.data.slice_mut(s![.., w - tx..]).fill(0.0);
    write_fits(path, &image.data, Some(&image.header))?;
    debug!(path = %path.display(), trim, "Trimmed border");
    Ok(())
}

/// Everything one cleaning pass needs besides the image itself.
#[derive(Clone, Debug)]
pub struct CleaningPass<'a> {
    pub fringe_frame: Option<&'a Path>,
    pub bad_pixel_mask: Option<&'a Path>,
    pub iterations: u32,
    pub trim: usize,
    pub gain: f64,
    pub read_noise: f64,
    pub saturation: f64,
}

impl<'a> CleaningPass<'a> {
    /// The pass applied to every science image.
    pub fn for_image(config: &'a CleaningConfig, gain: f64, read_noise: f64) -> Self {
        Self {
            fringe_frame: config.fringe_frame.as_deref(),
            bad_pixel_mask: config.bad_pixel_mask.as_deref(),
            iterations: config.image_iterations,
            trim: config.trim,
            gain,
            read_noise,
            saturation: config.image_saturation,
        }
    }

    /// The pass applied once to the template under `policy`.
    pub fn for_template(
        config: &'a CleaningConfig,
        policy: TemplateCleaning,
        gain: f64,
        read_noise: f64,
    ) -> Option<Self> {
        let full = match policy {
            TemplateCleaning::None => return None,
            TemplateCleaning::Full => true,
            TemplateCleaning::CosmicRaysOnly => false,
        };
        Some(Self {
            fringe_frame: config.fringe_frame.as_deref().filter(|_| full),
            bad_pixel_mask: config.bad_pixel_mask.as_deref().filter(|_| full),
            iterations: config.template_iterations,
            trim: config.trim,
            gain,
            read_noise,
            saturation: config.template_saturation,
        })
    }
}

/// Defringe, remove cosmetics and trim `image` in place.
pub fn clean_image(
    cleaner: &dyn ImageCleaner,
    image: &Path,
    pass: &CleaningPass<'_>,
    scratch: &Path,
) -> Result<()> {
    if let Some(fringe) = pass.fringe_frame {
        info!(fringe = %fringe.display(), "Defringing");
        cleaner.defringe(image, fringe, scratch)?;
    }

    if pass.bad_pixel_mask.is_some() || pass.iterations > 0 {
        info!(
            iterations = pass.iterations,
            bad_pixel_mask = pass.bad_pixel_mask.is_some(),
            "Removing cosmetics"
        );
        let request = CosmeticsRequest {
            iterations: pass.iterations,
            bad_pixel_mask: pass.bad_pixel_mask,
            gain: pass.gain,
            read_noise: pass.read_noise,
            saturation: pass.saturation,
            trim: pass.trim,
        };
        cleaner.remove_cosmetics(image, &request, scratch)?;
    }

    if pass.trim > 0 {
        info!(trim = pass.trim, "Trimming border");
        trim_border(image, pass.trim)?;
    }
    Ok(())
}
