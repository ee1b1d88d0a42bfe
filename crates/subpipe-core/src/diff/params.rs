use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_MAX_SUM_KERNEL, DEFAULT_MIN_SUM_KERNEL, HALF_STAMP_MARGIN};
use crate::error::Result;

/// The seeing-dependent part of the engine configuration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct KernelProfile {
    pub half_mesh_size: u32,
    pub half_stamp_size: u32,
    /// Widths of the three Gaussian basis components.
    pub sigmas: [f64; 3],
}

/// Differencing-engine parameters plus the quality-gate bounds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DifferencingConfig {
    #[serde(default = "default_nstamps")]
    pub nstamps_x: u32,
    #[serde(default = "default_nstamps")]
    pub nstamps_y: u32,
    #[serde(default = "default_one")]
    pub sub_x: u32,
    #[serde(default = "default_one")]
    pub sub_y: u32,
    #[serde(default = "default_half_mesh")]
    pub half_mesh_size: u32,
    /// `half_mesh_size + 6` when unset.
    #[serde(default)]
    pub half_stamp_size: Option<u32>,
    #[serde(default = "default_degree")]
    pub deg_bg: u32,
    #[serde(default = "default_engine_saturation")]
    pub image_saturation: f64,
    #[serde(default = "default_engine_saturation")]
    pub template_saturation: f64,
    #[serde(default = "default_pix_min")]
    pub pix_min: f64,
    #[serde(default = "default_min_stamp_center")]
    pub min_stamp_center: f64,
    #[serde(default = "default_sigmas")]
    pub sigmas: [f64; 3],
    #[serde(default = "default_degree")]
    pub deg_spatial: u32,
    #[serde(default = "default_degree")]
    pub iter_kernel_sig: u32,
    /// Pick mesh, stamp and sigma widths from the measured seeing.
    #[serde(default = "default_true")]
    pub adapt: bool,
    #[serde(default = "default_min_sum_kernel")]
    pub min_sum_kernel: f64,
    #[serde(default = "default_max_sum_kernel")]
    pub max_sum_kernel: f64,
    /// Delete the engine's convolved frame instead of keeping it.
    #[serde(default = "default_true")]
    pub remove_convolved: bool,
}

fn default_nstamps() -> u32 {
    9
}
fn default_one() -> u32 {
    1
}
fn default_half_mesh() -> u32 {
    9
}
fn default_degree() -> u32 {
    2
}
fn default_engine_saturation() -> f64 {
    50_000.0
}
fn default_pix_min() -> f64 {
    5.0
}
fn default_min_stamp_center() -> f64 {
    130.0
}
fn default_sigmas() -> [f64; 3] {
    [0.9, 1.5, 2.5]
}
fn default_true() -> bool {
    true
}
fn default_min_sum_kernel() -> f64 {
    DEFAULT_MIN_SUM_KERNEL
}
fn default_max_sum_kernel() -> f64 {
    DEFAULT_MAX_SUM_KERNEL
}

impl Default for DifferencingConfig {
    fn default() -> Self {
        Self {
            nstamps_x: default_nstamps(),
            nstamps_y: default_nstamps(),
            sub_x: 1,
            sub_y: 1,
            half_mesh_size: default_half_mesh(),
            half_stamp_size: None,
            deg_bg: default_degree(),
            image_saturation: default_engine_saturation(),
            template_saturation: default_engine_saturation(),
            pix_min: default_pix_min(),
            min_stamp_center: default_min_stamp_center(),
            sigmas: default_sigmas(),
            deg_spatial: default_degree(),
            iter_kernel_sig: default_degree(),
            adapt: true,
            min_sum_kernel: DEFAULT_MIN_SUM_KERNEL,
            max_sum_kernel: DEFAULT_MAX_SUM_KERNEL,
            remove_convolved: true,
        }
    }
}

impl DifferencingConfig {
    pub fn profile(&self) -> KernelProfile {
        KernelProfile {
            half_mesh_size: self.half_mesh_size,
            half_stamp_size: self
                .half_stamp_size
                .unwrap_or(self.half_mesh_size + HALF_STAMP_MARGIN),
            sigmas: self.sigmas,
        }
    }

    /// Copy of `self` with the kernel geometry replaced by `profile`.
    pub fn with_profile(&self, profile: KernelProfile) -> Self {
        Self {
            half_mesh_size: profile.half_mesh_size,
            half_stamp_size: Some(profile.half_stamp_size),
            sigmas: profile.sigmas,
            ..self.clone()
        }
    }

    /// Inclusive kernel-sum acceptance test.
    pub fn kernel_sum_in_bounds(&self, value: f64) -> bool {
        value >= self.min_sum_kernel && value <= self.max_sum_kernel
    }

    /// Render the engine's key/value parameter block.
    ///
    /// `reverse` convolves the template, which also swaps the two
    /// saturation levels so each stays with its frame.
    pub fn render_param_file(&self, reverse: bool, stamps_by_xy: bool) -> String {
        let profile = self.profile();
        let (sat1, sat2) = if reverse {
            (self.template_saturation, self.image_saturation)
        } else {
            (self.image_saturation, self.template_saturation)
        };

        let mut out = String::new();
        let mut line = |key: &str, value: String| {
            let _ = writeln!(out, "{key:<18}{value}");
        };
        line("nstamps_x", self.nstamps_x.to_string());
        line("nstamps_y", self.nstamps_y.to_string());
        line("sub_x", self.sub_x.to_string());
        line("sub_y", self.sub_y.to_string());
        line("half_mesh_size", profile.half_mesh_size.to_string());
        line("half_stamp_size", profile.half_stamp_size.to_string());
        line("deg_bg", self.deg_bg.to_string());
        line("saturation1", format!("{sat1:.0}"));
        line("saturation2", format!("{sat2:.0}"));
        line("pix_min", format!("{:.0}", self.pix_min));
        line("min_stamp_center", format!("{:.0}", self.min_stamp_center));
        line("ngauss", "3".into());
        line("deg_gauss1", "6".into());
        line("deg_gauss2", "4".into());
        line("deg_gauss3", "2".into());
        line("sigma_gauss1", format!("{:.2}", profile.sigmas[0]));
        line("sigma_gauss2", format!("{:.2}", profile.sigmas[1]));
        line("sigma_gauss3", format!("{:.2}", profile.sigmas[2]));
        line("deg_spatial", self.deg_spatial.to_string());
        line("reverse", u8::from(reverse).to_string());
        line("stampsbyxy", u8::from(stamps_by_xy).to_string());
        line("iter_kernal_sig", self.iter_kernel_sig.to_string());
        out
    }

    pub fn write_param_file(&self, path: &Path, reverse: bool, stamps_by_xy: bool) -> Result<()> {
        std::fs::write(path, self.render_param_file(reverse, stamps_by_xy))?;
        Ok(())
    }
}
