use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::align::{AlignRequest, Aligner};
use crate::clean::{clean_image, CleaningPass, TemplateCleaning};
use crate::consts::{LEDGER_FILE_NAME, TEMPLATE_SUBDIR};
use crate::detection::find_objects;
use crate::diff::{artifact, Differencer, DifferencingState, SubtractRequest};
use crate::error::{Result, SubpipeError};
use crate::header::HeaderInfo;
use crate::io::fits::{read_fits, read_header, write_fits};
use crate::io::preview::write_preview;
use crate::record::ImageRecord;
use crate::stats::compute_stats;
use crate::template::{TemplateCache, TemplateRecord};
use crate::tools::Toolset;

use super::config::PipelineConfig;
use super::ledger::{BatchLedger, LedgerEntry};
use super::run::{CompletedRun, PipelineRun, RunStatus};
use super::scratch::ScratchArena;
use super::types::{NoOpReporter, PipelineStage, ProgressReporter};

/// Binning applied to PNG previews.
const PREVIEW_BIN: usize = 2;

/// What to do with a work directory that already exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkdirMode {
    /// The directory must not exist yet.
    Create,
    /// Keep previous results and extend the ledger.
    Update,
    /// Remove the directory and start over.
    Overwrite,
}

/// Inputs of one batch.
#[derive(Clone, Debug)]
pub struct BatchRequest {
    pub images: Vec<PathBuf>,
    pub template: PathBuf,
    pub workdir: PathBuf,
    pub mode: WorkdirMode,
}

/// Create (or reuse) the work directory and its `template/` subdirectory.
pub fn prepare_workdir(workdir: &Path, mode: WorkdirMode) -> Result<()> {
    let exists = workdir.is_dir();
    match mode {
        WorkdirMode::Create if exists => {
            return Err(SubpipeError::Config(format!(
                "work directory {} already exists, use update or overwrite",
                workdir.display()
            )));
        }
        WorkdirMode::Update if !exists => {
            return Err(SubpipeError::Config(format!(
                "cannot update {}: directory does not exist",
                workdir.display()
            )));
        }
        WorkdirMode::Overwrite if exists => {
            info!(workdir = %workdir.display(), "Removing existing work directory");
            fs::remove_dir_all(workdir)?;
        }
        _ => {}
    }
    fs::create_dir_all(workdir.join(TEMPLATE_SUBDIR))?;
    Ok(())
}

/// Process a whole batch with no progress reporting.
pub fn run_batch(
    request: &BatchRequest,
    config: &PipelineConfig,
    tools: &Toolset,
) -> Result<BatchLedger> {
    run_batch_reported(request, config, tools, &NoOpReporter)
}

/// Process every image of a batch in order.
///
/// The work directory must already exist (see [`prepare_workdir`]). Only
/// batch-level problems return `Err`: invalid configuration, a missing work
/// directory, or a template that cannot be prepared. Each image's failure is
/// recorded in the ledger and the batch moves on.
pub fn run_batch_reported(
    request: &BatchRequest,
    config: &PipelineConfig,
    tools: &Toolset,
    reporter: &dyn ProgressReporter,
) -> Result<BatchLedger> {
    config.validate()?;
    if !request.workdir.join(TEMPLATE_SUBDIR).is_dir() {
        return Err(SubpipeError::Config(format!(
            "work directory {} has not been prepared",
            request.workdir.display()
        )));
    }

    let update = request.mode == WorkdirMode::Update;
    let ledger_path = request.workdir.join(LEDGER_FILE_NAME);
    let mut ledger = if update {
        BatchLedger::load(&ledger_path)?
    } else {
        BatchLedger::default()
    };

    let template = install_template(&request.template, &request.workdir)?;
    // A template left by a previous run has already been cleaned.
    let policy = if update {
        TemplateCleaning::None
    } else {
        config.cleaning.template_policy()
    };

    let arena = ScratchArena::new_in(&request.workdir)?;
    let mut templates = TemplateCache::new();
    reporter.begin_stage(PipelineStage::PreparingTemplate);
    let template_scratch = arena.child("template")?;
    let template_record =
        templates.get_or_prepare(&template, policy, tools, config, template_scratch.path())?;
    let template_shape = template_shape(&template)?;

    let ctx = ImageContext {
        config,
        tools,
        arena: &arena,
        template_shape,
    };

    let total = request.images.len();
    info!(images = total, template = %template.display(), "Starting batch");
    for (index, raw) in request.images.iter().enumerate() {
        let name = file_name(raw);
        reporter.begin_image(index, total, &name);
        info!(image = %name, "({}/{}) Processing image", index + 1, total);

        let image = request.workdir.join(&name);
        let done = match stage_image(raw, &image) {
            Ok(_) => {
                // Served from the cache; the policy only mattered the first time.
                let record = templates.get_or_prepare(
                    &template,
                    policy,
                    tools,
                    config,
                    template_scratch.path(),
                )?;
                process_image(&ctx, &image, record, reporter)
            }
            Err(e) => {
                error!(image = %raw.display(), error = %e, "Could not copy image to work directory");
                PipelineRun::new(&name, Arc::clone(&template_record))
                    .finish(RunStatus::PreparationFailed, Some(e.to_string()))
            }
        };

        reporter.finish_image(&name, done.fail_code());
        ledger.record(LedgerEntry::from(&done));
        ledger.save(&ledger_path)?;
    }

    info!(
        processed = total,
        failed = ledger.failures(),
        "Batch finished"
    );
    Ok(ledger)
}

/// Batch-wide values every image run reads.
struct ImageContext<'a> {
    config: &'a PipelineConfig,
    tools: &'a Toolset,
    arena: &'a ScratchArena,
    template_shape: (usize, usize),
}

/// Run one image through every stage and give it its terminal status.
fn process_image(
    ctx: &ImageContext<'_>,
    image: &Path,
    template: Arc<TemplateRecord>,
    reporter: &dyn ProgressReporter,
) -> CompletedRun {
    let mut run = PipelineRun::new(file_name(image), template);
    match drive(ctx, image, &mut run, reporter) {
        Ok(status) => {
            if status.is_success() {
                info!(image = %run.image, "Image processed successfully");
            } else {
                error!(image = %run.image, %status, "Image run failed");
            }
            run.finish(status, None)
        }
        Err(e) => {
            let status = RunStatus::for_error_in(run.stage);
            error!(image = %run.image, stage = %run.stage, error = %e, "Image run failed");
            run.finish(status, Some(e.to_string()))
        }
    }
}

fn enter(run: &mut PipelineRun, stage: PipelineStage, reporter: &dyn ProgressReporter) {
    debug!(image = %run.image, %stage, "Entering stage");
    run.stage = stage;
    reporter.begin_stage(stage);
}

/// The stage sequence. Returns early with the first failure status.
fn drive(
    ctx: &ImageContext<'_>,
    image: &Path,
    run: &mut PipelineRun,
    reporter: &dyn ProgressReporter,
) -> Result<RunStatus> {
    let config = ctx.config;
    let tools = ctx.tools;
    let scratch_dir = ctx.arena.child(&run.image)?;
    let scratch = scratch_dir.path();

    enter(run, PipelineStage::Cleaning, reporter);
    let header = HeaderInfo::from_header(&read_header(image)?, &config.headers);
    let pass = CleaningPass::for_image(&config.cleaning, header.gain, header.read_noise);
    clean_image(tools.cleaner.as_ref(), image, &pass, scratch)?;

    enter(run, PipelineStage::Measuring, reporter);
    let record = ImageRecord::measure(
        image,
        tools.detector.as_ref(),
        &config.detection,
        &config.headers,
        false,
    )?;
    let wcs_error = record.header.wcs_error;
    let image_fwhm = record.fwhm;
    run.record = Some(record);

    enter(run, PipelineStage::ObjectSearch, reporter);
    let search = find_objects(
        tools.detector.as_ref(),
        image,
        &config.detection.image,
        scratch,
    )?;
    if !search.status.is_reliable() {
        warn!(
            objects = search.object_count,
            threshold = search.threshold,
            status = %search.status,
            "Object count did not converge, continuing with best-effort threshold"
        );
    }
    let image_catalog = search.catalog.clone();
    let image_threshold = search.threshold;
    let image_objects = search.object_count;
    run.search = Some(search);

    enter(run, PipelineStage::Alignment, reporter);
    let template = Arc::clone(&run.template);
    let plan = config
        .alignment
        .plan(image_objects, template.search.object_count, wcs_error);
    let base = image.with_extension("");
    let aligned = artifact(&base, ".aligned.fits");
    let aligner = Aligner {
        matcher: tools.matcher.as_ref(),
        resampler: tools.resampler.as_ref(),
        config: &config.alignment,
        columns: &config.detection.catalog_columns,
    };
    let outcome = aligner.align(
        &AlignRequest {
            image,
            template: template.path(),
            image_catalog: &image_catalog,
            template_catalog: template.catalog(),
            template_shape: ctx.template_shape,
            output: &aligned,
            scratch,
        },
        &plan,
    )?;
    let aligned_ok = outcome.is_success();
    let aligned = outcome.aligned_image().cloned();
    run.alignment = Some(outcome);
    let Some(aligned) = aligned.filter(|_| aligned_ok) else {
        return Ok(RunStatus::AlignmentFailed);
    };

    enter(run, PipelineStage::Differencing, reporter);
    let template_stars = template
        .record
        .catalog
        .clone()
        .unwrap_or_else(|| template.path().with_extension("stars"));
    let differencer = Differencer {
        detector: tools.detector.as_ref(),
        engine: tools.engine.as_ref(),
        config: &config.differencing,
        detection: &config.detection,
    };
    let outcome = differencer.subtract(
        &SubtractRequest {
            image: &aligned,
            template: template.path(),
            template_stars: &template_stars,
            image_threshold,
            template_threshold: template.search.threshold,
            artifacts: &base,
            stamps: config.stamps.as_deref(),
            scratch,
        },
        config.direction_hint,
    )?;
    let state = outcome.state;
    let reverse = outcome.reverse;
    let kernel_sum = outcome.kernel_sum.as_f64();
    let difference = outcome.output.clone();
    run.differencing = Some(outcome);

    let difference = match (state, difference) {
        (DifferencingState::RatioUndetermined, _) => {
            return Ok(RunStatus::SeeingRatioUndetermined)
        }
        (DifferencingState::DoubleFailure, _) => {
            return Ok(RunStatus::SubtractionQualityFailedBothDirections)
        }
        (_, Some(path)) => path,
        (_, None) => {
            return Err(SubpipeError::Pipeline(
                "accepted subtraction without an output image".into(),
            ))
        }
    };

    enter(run, PipelineStage::Recording, reporter);
    let convolved_template = reverse.unwrap_or(false);
    let frame = read_fits(&difference)?;
    let mut diff_header = read_header(&aligned)?;
    diff_header.set_str(
        "CONVOLVD",
        if convolved_template { "TEMPLATE" } else { "IMAGE" },
    );
    diff_header.set_f64("KERNSUM", kernel_sum);
    write_fits(&difference, &frame.data, Some(&diff_header))?;

    run.difference_stats = Some(compute_stats(&frame.data, true));
    drop(frame);
    run.aligned_stats = Some(compute_stats(&read_fits(&aligned)?.data, true));
    // The difference keeps the PSF of whichever frame was left unconvolved.
    run.difference_fwhm = if convolved_template {
        image_fwhm
    } else {
        template.record.fwhm
    };

    if config.previews {
        for path in [&aligned, &difference] {
            if let Err(e) = write_preview(path, PREVIEW_BIN) {
                warn!(path = %path.display(), error = %e, "Could not write preview");
            }
        }
    }
    Ok(RunStatus::Success)
}

/// Copy the template into `<workdir>/template/` unless already there.
fn install_template(template: &Path, workdir: &Path) -> Result<PathBuf> {
    if !template.is_file() {
        return Err(SubpipeError::Config(format!(
            "template {} does not exist",
            template.display()
        )));
    }
    let installed = workdir.join(TEMPLATE_SUBDIR).join(file_name(template));
    if installed.exists() {
        debug!(template = %installed.display(), "Template already installed");
    } else {
        info!(to = %installed.display(), "Copying template");
        fs::copy(template, &installed)?;
    }
    Ok(installed)
}

/// Copy `raw` into the work directory unless it already is that file.
fn stage_image(raw: &Path, target: &Path) -> std::io::Result<()> {
    if let (Ok(from), Ok(to)) = (fs::canonicalize(raw), fs::canonicalize(target)) {
        if from == to {
            debug!(image = %raw.display(), "Image already in work directory");
            return Ok(());
        }
    }
    fs::copy(raw, target).map(|_| ())
}

/// `(width, height)` from the template's NAXIS cards.
fn template_shape(template: &Path) -> Result<(usize, usize)> {
    let header = read_header(template)?;
    match (header.get_i64("NAXIS1"), header.get_i64("NAXIS2")) {
        (Some(w), Some(h)) if w > 0 && h > 0 => Ok((w as usize, h as usize)),
        _ => Err(SubpipeError::InvalidFits(format!(
            "{}: missing image dimensions",
            template.display()
        ))),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
