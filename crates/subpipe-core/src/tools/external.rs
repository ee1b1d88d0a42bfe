use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, SubpipeError};
use crate::io::catalog::sort_by_column;

use super::command::{run_tool, CommandSpec};
use super::config::{DifferencingCommand, ToolsConfig};
use super::{
    CoordinateMatcher, CosmeticsRequest, DifferencingEngine, EngineOutput, EngineRequest,
    ImageCleaner, MatchRequest, Resampler, SourceDetector,
};

fn path_var(key: &'static str, path: &Path) -> (&'static str, String) {
    (key, path.display().to_string())
}

/// Parent directory of `path`, used as the working directory of tools that
/// only touch files next to their output.
fn working_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

pub struct ExternalDetector {
    command: CommandSpec,
    sort_column: Option<usize>,
    timeout: Duration,
}

impl ExternalDetector {
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            command: config.detector.command.clone(),
            sort_column: config.detector.sort_column,
            timeout: config.timeout(),
        }
    }
}

impl SourceDetector for ExternalDetector {
    fn detect(
        &self,
        image: &Path,
        threshold: f64,
        saturation: f64,
        catalog: &Path,
    ) -> Result<()> {
        if catalog.exists() {
            std::fs::remove_file(catalog)?;
        }
        let vars = [
            path_var("image", image),
            ("threshold", format!("{threshold}")),
            ("saturation", format!("{saturation}")),
            path_var("catalog", catalog),
        ];
        let output = run_tool(
            "detector",
            &self.command,
            &vars,
            working_dir(catalog),
            self.timeout,
        )?;
        if !catalog.exists() {
            return Err(SubpipeError::tool(
                "detector",
                "no catalog written",
                output.diagnostics(),
            ));
        }
        if let Some(column) = self.sort_column {
            sort_by_column(catalog, column)?;
        }
        Ok(())
    }
}

pub struct ExternalMatcher {
    command: CommandSpec,
    timeout: Duration,
}

impl ExternalMatcher {
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            command: config.matcher.clone(),
            timeout: config.timeout(),
        }
    }
}

impl CoordinateMatcher for ExternalMatcher {
    fn match_coordinates(&self, request: &MatchRequest<'_>) -> Result<usize> {
        if request.output.exists() {
            std::fs::remove_file(request.output)?;
        }
        let vars = [
            path_var("input", request.input),
            path_var("reference", request.reference),
            path_var("output", request.output),
            ("mode", request.mode.to_string()),
            ("tolerance", format!("{}", request.tolerance)),
            ("nmatch", request.nmatch.to_string()),
            ("separation", format!("{}", request.separation)),
        ];
        let output = run_tool(
            "matcher",
            &self.command,
            &vars,
            working_dir(request.output),
            self.timeout,
        )?;
        parse_match_count(&output.stdout).ok_or_else(|| {
            SubpipeError::tool("matcher", "unreadable match count", output.diagnostics())
        })
    }
}

/// The matcher reports its match count as the first token of its last
/// non-empty output line.
pub(crate) fn parse_match_count(stdout: &str) -> Option<usize> {
    stdout
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .and_then(|l| l.split_whitespace().next())
        .and_then(|t| t.parse().ok())
}

pub struct ExternalResampler {
    transform: CommandSpec,
    register: CommandSpec,
    timeout: Duration,
}

impl ExternalResampler {
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            transform: config.transform.clone(),
            register: config.register.clone(),
            timeout: config.timeout(),
        }
    }

    fn expect_output(tool: &str, output: &Path, diagnostics: String) -> Result<()> {
        if output.exists() {
            Ok(())
        } else {
            Err(SubpipeError::tool(tool, "no output image", diagnostics))
        }
    }
}

impl Resampler for ExternalResampler {
    fn apply_transform(
        &self,
        image: &Path,
        matches: &Path,
        reference_shape: (usize, usize),
        output: &Path,
        scratch: &Path,
    ) -> Result<()> {
        let vars = [
            path_var("image", image),
            path_var("matches", matches),
            path_var("output", output),
            ("width", reference_shape.0.to_string()),
            ("height", reference_shape.1.to_string()),
            path_var("scratch", scratch),
        ];
        let out = run_tool("transform", &self.transform, &vars, scratch, self.timeout)?;
        Self::expect_output("transform", output, out.diagnostics())
    }

    fn register_to_frame(
        &self,
        image: &Path,
        template: &Path,
        output: &Path,
        scratch: &Path,
    ) -> Result<()> {
        let vars = [
            path_var("image", image),
            path_var("template", template),
            path_var("output", output),
            path_var("scratch", scratch),
        ];
        let out = run_tool("register", &self.register, &vars, scratch, self.timeout)?;
        Self::expect_output("register", output, out.diagnostics())
    }
}

pub struct ExternalEngine {
    command: DifferencingCommand,
    timeout: Duration,
}

impl ExternalEngine {
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            command: config.differencing.clone(),
            timeout: config.timeout(),
        }
    }

    fn existing(path: PathBuf) -> Option<PathBuf> {
        path.exists().then_some(path)
    }
}

impl DifferencingEngine for ExternalEngine {
    fn run(&self, request: &EngineRequest<'_>) -> Result<EngineOutput> {
        let vars = [
            path_var("convolve", request.convolve),
            path_var("target", request.target),
            path_var("params", request.params),
        ];
        let output = run_tool(
            "differencing",
            &self.command.command,
            &vars,
            request.scratch,
            self.timeout,
        )?;

        let difference = Self::existing(request.scratch.join(&self.command.difference_file))
            .ok_or_else(|| {
                SubpipeError::tool("differencing", "no difference image", output.diagnostics())
            })?;

        Ok(EngineOutput {
            difference,
            convolved: Self::existing(request.scratch.join(&self.command.convolved_file)),
            kernel_sum: Self::existing(request.scratch.join(&self.command.kernel_sum_file)),
            log: output.diagnostics(),
        })
    }
}

pub struct ExternalCleaner {
    cosmetics: CommandSpec,
    defringe: CommandSpec,
    timeout: Duration,
}

impl ExternalCleaner {
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            cosmetics: config.cosmetics.clone(),
            defringe: config.defringe.clone(),
            timeout: config.timeout(),
        }
    }
}

impl ImageCleaner for ExternalCleaner {
    fn remove_cosmetics(
        &self,
        image: &Path,
        request: &CosmeticsRequest<'_>,
        scratch: &Path,
    ) -> Result<()> {
        let vars = [
            path_var("image", image),
            ("iterations", request.iterations.to_string()),
            (
                "mask",
                request
                    .bad_pixel_mask
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            ),
            ("gain", format!("{}", request.gain)),
            ("readnoise", format!("{}", request.read_noise)),
            ("saturation", format!("{}", request.saturation)),
            ("trim", request.trim.to_string()),
        ];
        run_tool("cosmetics", &self.cosmetics, &vars, scratch, self.timeout)?;
        Ok(())
    }

    fn defringe(&self, image: &Path, fringe_frame: &Path, scratch: &Path) -> Result<()> {
        let vars = [
            path_var("image", image),
            path_var("fringe", fringe_frame),
            path_var("scratch", scratch),
        ];
        run_tool("defringe", &self.defringe, &vars, scratch, self.timeout)?;
        Ok(())
    }
}
