use std::cell::RefCell;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use subpipe_core::consts::LOG_FILE_NAME;
use subpipe_core::diff::DirectionHint;
use subpipe_core::pipeline::config::PipelineConfig;
use subpipe_core::pipeline::{
    prepare_workdir, run_batch_reported, BatchRequest, PipelineStage, ProgressReporter,
    WorkdirMode,
};
use subpipe_core::tools::Toolset;
use tracing::info;
use walkdir::WalkDir;

use crate::summary::{print_batch_summary, print_ledger};

#[derive(Args)]
pub struct RunArgs {
    /// Image file, or directory of images
    pub images: PathBuf,

    /// Template (reference) image
    pub template: PathBuf,

    /// Work directory for results
    pub workdir: PathBuf,

    /// Wildcard selecting images inside the image directory
    #[arg(short, long, default_value = "*.fits")]
    pub select: String,

    /// Extend an existing work directory instead of starting a new one
    #[arg(short, long, conflicts_with = "force")]
    pub update: bool,

    /// Remove an existing work directory first
    #[arg(long)]
    pub force: bool,

    /// Pipeline config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Fringe frame to remove from every image
    #[arg(short, long)]
    pub fringe: Option<PathBuf>,

    /// Bad pixel mask
    #[arg(short, long)]
    pub bpm: Option<PathBuf>,

    /// Also apply fringe and bad pixel correction to the template
    #[arg(short = 'c', long)]
    pub clean_template: bool,

    /// Cosmic-ray iterations on the template (0 disables)
    #[arg(long)]
    pub template_iterations: Option<u32>,

    /// Cosmic-ray iterations on each image (0 disables)
    #[arg(long)]
    pub image_iterations: Option<u32>,

    /// Pixel border to zero after cleaning
    #[arg(short, long)]
    pub trim: Option<usize>,

    /// Convolution direction: 0 auto, 1 invert, 2 always image, 3 always template
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=3))]
    pub reverse: Option<u8>,

    /// File of x y stamp centres for the differencing engine
    #[arg(long)]
    pub stamps: Option<PathBuf>,

    /// Skip PNG previews
    #[arg(long)]
    pub no_previews: bool,
}

pub fn run(args: &RunArgs, verbose: bool) -> Result<()> {
    let mut config: PipelineConfig = if let Some(ref config_path) = args.config {
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config {}", config_path.display()))?;
        toml::from_str(&contents).context("Invalid pipeline config")?
    } else {
        PipelineConfig::default()
    };
    apply_overrides(&mut config, args)?;

    if !args.template.is_file() {
        bail!("Template {} does not exist", args.template.display());
    }
    for (what, path) in [
        ("Fringe frame", &config.cleaning.fringe_frame),
        ("Bad pixel mask", &config.cleaning.bad_pixel_mask),
        ("Stamps file", &config.stamps),
    ] {
        if let Some(p) = path {
            if !p.is_file() {
                bail!("{what} {} does not exist", p.display());
            }
        }
    }

    let images = select_images(&args.images, &args.select)?;
    if images.is_empty() {
        bail!(
            "No images matching '{}' in {}",
            args.select,
            args.images.display()
        );
    }

    let mode = if args.update {
        WorkdirMode::Update
    } else if args.force {
        WorkdirMode::Overwrite
    } else {
        WorkdirMode::Create
    };
    prepare_workdir(&args.workdir, mode)
        .with_context(|| format!("Cannot use work directory {}", args.workdir.display()))?;
    crate::init_logging(verbose, Some(&args.workdir.join(LOG_FILE_NAME)))?;

    if let Some(stamps) = config.stamps.take() {
        let name = stamps.file_name().context("Stamps path has no file name")?;
        let copied = args.workdir.join(name);
        std::fs::copy(&stamps, &copied)
            .with_context(|| format!("Failed to copy stamps file {}", stamps.display()))?;
        config.stamps = Some(copied);
    }

    let request = BatchRequest {
        images,
        template: args.template.clone(),
        workdir: args.workdir.clone(),
        mode,
    };
    print_batch_summary(&config, &request);

    let tools = Toolset::external(&config.tools);
    let reporter = BarReporter::new(request.images.len())?;
    let ledger = run_batch_reported(&request, &config, &tools, &reporter)
        .context("Batch aborted")?;
    reporter.bar.finish_with_message("Done");

    info!(workdir = %args.workdir.display(), "Results written");
    print_ledger(&ledger);
    Ok(())
}

fn apply_overrides(config: &mut PipelineConfig, args: &RunArgs) -> Result<()> {
    let cleaning = &mut config.cleaning;
    if args.fringe.is_some() {
        cleaning.fringe_frame = args.fringe.clone();
    }
    if args.bpm.is_some() {
        cleaning.bad_pixel_mask = args.bpm.clone();
    }
    if args.clean_template {
        cleaning.clean_template = true;
    }
    if let Some(n) = args.template_iterations {
        cleaning.template_iterations = n;
    }
    if let Some(n) = args.image_iterations {
        cleaning.image_iterations = n;
    }
    if let Some(trim) = args.trim {
        cleaning.trim = trim;
    }
    if let Some(hint) = args.reverse {
        config.direction_hint = DirectionHint::try_from(hint)?;
    }
    if args.stamps.is_some() {
        config.stamps = args.stamps.clone();
    }
    if args.no_previews {
        config.previews = false;
    }
    Ok(())
}

/// A single file, or the files in `dir` whose names match `pattern`, sorted.
fn select_images(input: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        bail!("Image path {} does not exist", input.display());
    }
    let mut images = Vec::new();
    for entry in WalkDir::new(input).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("Failed to list {}", input.display()))?;
        if entry.file_type().is_file()
            && wildcard_match(pattern, &entry.file_name().to_string_lossy())
        {
            images.push(entry.into_path());
        }
    }
    images.sort();
    Ok(images)
}

/// Shell-style match supporting `*` and `?`.
fn wildcard_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    let (mut pi, mut ni) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ni));
            pi += 1;
        } else if let Some((sp, sn)) = star {
            pi = sp + 1;
            ni = sn + 1;
            star = Some((sp, sn + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

/// Drives an indicatif bar from batch progress.
struct BarReporter {
    bar: ProgressBar,
    current: RefCell<String>,
}

impl BarReporter {
    fn new(total: usize) -> Result<Self> {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg:40} [{bar:40}] {pos}/{len}")?
                .progress_chars("=> "),
        );
        Ok(Self {
            bar,
            current: RefCell::new(String::new()),
        })
    }
}

impl ProgressReporter for BarReporter {
    fn begin_image(&self, index: usize, _total: usize, name: &str) {
        self.bar.set_position(index as u64);
        *self.current.borrow_mut() = name.to_string();
        self.bar.set_message(name.to_string());
    }

    fn begin_stage(&self, stage: PipelineStage) {
        let current = self.current.borrow();
        if current.is_empty() {
            self.bar.set_message(stage.to_string());
        } else {
            self.bar.set_message(format!("{current}: {stage}"));
        }
    }

    fn finish_image(&self, _name: &str, _fail_code: u8) {
        self.bar.inc(1);
    }
}
