use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consts::TOOL_POLL_INTERVAL_MS;
use crate::error::{Result, SubpipeError};

/// A program plus an argument template. `{name}` placeholders in the
/// arguments are replaced at call time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Substitute every `{key}` in the argument template.
    pub fn render(&self, vars: &[(&str, String)]) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                vars.iter().fold(arg.clone(), |acc, (key, value)| {
                    acc.replace(&format!("{{{key}}}"), value)
                })
            })
            .collect()
    }
}

/// Captured output of a finished tool.
#[derive(Clone, Debug, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Everything the tool printed, stdout first.
    pub fn diagnostics(&self) -> String {
        match (self.stdout.trim(), self.stderr.trim()) {
            ("", err) => err.to_string(),
            (out, "") => out.to_string(),
            (out, err) => format!("{out}\n{err}"),
        }
    }
}

/// Run `spec` in `cwd` and block until it exits or `timeout` elapses.
///
/// Output is captured through unnamed files in `cwd` so a chatty tool can
/// never fill a pipe and stall. A non-zero exit or a spawn failure becomes
/// [`SubpipeError::ExternalTool`] carrying the captured diagnostics.
pub fn run_tool(
    name: &str,
    spec: &CommandSpec,
    vars: &[(&str, String)],
    cwd: &Path,
    timeout: Duration,
) -> Result<ToolOutput> {
    let args = spec.render(vars);
    debug!(tool = name, program = %spec.program.display(), ?args, "Running external tool");

    let mut stdout_file = tempfile::tempfile_in(cwd)?;
    let mut stderr_file = tempfile::tempfile_in(cwd)?;

    let mut child = Command::new(&spec.program)
        .args(&args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout_file.try_clone()?))
        .stderr(Stdio::from(stderr_file.try_clone()?))
        .spawn()
        .map_err(|e| SubpipeError::tool(name, "not started", e.to_string()))?;

    let start = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SubpipeError::ToolTimeout {
                tool: name.to_string(),
                seconds: timeout.as_secs(),
            });
        }
        std::thread::sleep(Duration::from_millis(TOOL_POLL_INTERVAL_MS));
    };

    let output = ToolOutput {
        stdout: read_back(&mut stdout_file)?,
        stderr: read_back(&mut stderr_file)?,
    };

    if !status.success() {
        return Err(SubpipeError::tool(
            name,
            status.to_string(),
            output.diagnostics(),
        ));
    }
    debug!(tool = name, output = %output.diagnostics(), "External tool finished");
    Ok(output)
}

fn read_back(file: &mut File) -> Result<String> {
    file.seek(SeekFrom::Start(0))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
