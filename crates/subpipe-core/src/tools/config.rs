use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::consts::DEFAULT_TOOL_TIMEOUT_SECS;

use super::command::CommandSpec;

/// Command templates for every external collaborator.
///
/// Placeholders available per tool:
/// - `detector`: `{image}` `{threshold}` `{saturation}` `{catalog}`
/// - `matcher`: `{input}` `{reference}` `{output}` `{mode}` `{tolerance}`
///   `{nmatch}` `{separation}`
/// - `transform`: `{image}` `{matches}` `{output}` `{width}` `{height}` `{scratch}`
/// - `register`: `{image}` `{template}` `{output}` `{scratch}`
/// - `differencing`: `{convolve}` `{target}` `{params}` (runs inside the scratch dir)
/// - `cosmetics`: `{image}` `{iterations}` `{mask}` `{gain}` `{readnoise}`
///   `{saturation}` `{trim}`
/// - `defringe`: `{image}` `{fringe}` `{scratch}`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Upper bound on any single tool invocation.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    pub detector: DetectorCommand,
    pub matcher: CommandSpec,
    pub transform: CommandSpec,
    pub register: CommandSpec,
    pub differencing: DifferencingCommand,
    pub cosmetics: CommandSpec,
    pub defringe: CommandSpec,
}

fn default_timeout() -> u64 {
    DEFAULT_TOOL_TIMEOUT_SECS
}

impl ToolsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetectorCommand {
    #[serde(flatten)]
    pub command: CommandSpec,
    /// 1-indexed magnitude column to sort the catalog on, for detectors
    /// that do not emit rows brightest first.
    #[serde(default)]
    pub sort_column: Option<usize>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DifferencingCommand {
    #[serde(flatten)]
    pub command: CommandSpec,
    #[serde(default = "default_difference_name")]
    pub difference_file: String,
    #[serde(default = "default_convolved_name")]
    pub convolved_file: String,
    #[serde(default = "default_kernel_sum_name")]
    pub kernel_sum_file: String,
}

fn default_difference_name() -> String {
    "conv.fits".into()
}
fn default_convolved_name() -> String {
    "conv0.fits".into()
}
fn default_kernel_sum_name() -> String {
    "sum_kernel".into()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TOOL_TIMEOUT_SECS,
            detector: DetectorCommand {
                command: CommandSpec::new(
                    "sex",
                    &[
                        "{image}",
                        "-DETECT_THRESH",
                        "{threshold}",
                        "-ANALYSIS_THRESH",
                        "{threshold}",
                        "-SATUR_LEVEL",
                        "{saturation}",
                        "-CATALOG_NAME",
                        "{catalog}",
                    ],
                ),
                sort_column: Some(4),
            },
            matcher: CommandSpec::new(
                "xyxymatch",
                &[
                    "{input}",
                    "{reference}",
                    "{output}",
                    "matching={mode}",
                    "tolerance={tolerance}",
                    "nmatch={nmatch}",
                    "separation={separation}",
                ],
            ),
            transform: CommandSpec::new(
                "geotran",
                &["{image}", "{output}", "{matches}", "{width}", "{height}"],
            ),
            register: CommandSpec::new("wregister", &["{image}", "{template}", "{output}"]),
            differencing: DifferencingCommand {
                command: CommandSpec::new("alardsub", &["{convolve}", "{target}"]),
                difference_file: default_difference_name(),
                convolved_file: default_convolved_name(),
                kernel_sum_file: default_kernel_sum_name(),
            },
            cosmetics: CommandSpec::new(
                "cosmics",
                &[
                    "{image}",
                    "--iterations",
                    "{iterations}",
                    "--mask",
                    "{mask}",
                    "--gain",
                    "{gain}",
                    "--readnoise",
                    "{readnoise}",
                    "--satlevel",
                    "{saturation}",
                    "--trim",
                    "{trim}",
                ],
            ),
            defringe: CommandSpec::new("rmfringe", &["{image}", "{fringe}"]),
        }
    }
}
