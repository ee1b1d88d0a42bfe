use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::io::catalog::CatalogColumns;
use crate::tools::{CoordinateMatcher, MatchMode, MatchRequest, Resampler};

use super::config::{AlignmentConfig, AlignmentPlan};
use super::outcome::{AlignmentOutcome, AlignmentStrategy, FailureReason, StrategyAttempt};
use super::reduce::write_reduced_list;

/// Files involved in aligning one image.
#[derive(Clone, Debug)]
pub struct AlignRequest<'a> {
    pub image: &'a Path,
    pub template: &'a Path,
    pub image_catalog: &'a Path,
    pub template_catalog: &'a Path,
    /// Template `(width, height)`; the aligned image is resampled onto it.
    pub template_shape: (usize, usize),
    pub output: &'a Path,
    pub scratch: &'a Path,
}

/// The alignment primitives the cascade drives.
pub struct Aligner<'t> {
    pub matcher: &'t dyn CoordinateMatcher,
    pub resampler: &'t dyn Resampler,
    pub config: &'t AlignmentConfig,
    pub columns: &'t CatalogColumns,
}

impl Aligner<'_> {
    /// Run the strategy cascade for one image.
    ///
    /// Strategies run in order and the first one that yields a transformed
    /// image wins; nothing after it is invoked. Every attempt is recorded in
    /// the outcome. Only scratch-file I/O errors are returned as `Err`;
    /// collaborator failures end the attempt they belong to.
    pub fn align(&self, req: &AlignRequest<'_>, plan: &AlignmentPlan) -> Result<AlignmentOutcome> {
        let mut attempts = Vec::new();

        if plan.prealigned {
            fs::copy(req.image, req.output)?;
            attempts.push(success(AlignmentStrategy::Prealigned, None));
            info!("Frames declared prealigned, skipping alignment");
            return Ok(AlignmentOutcome::Success {
                method: AlignmentStrategy::Prealigned,
                image: req.output.to_path_buf(),
                attempts,
            });
        }

        if plan.coordinate_matching {
            if let Some(method) = self.match_cascade(req, plan, &mut attempts)? {
                return Ok(finish_success(method, req, attempts));
            }
            warn!("Coordinate matching failed to find a transformation");
        } else if let Some((image_objects, template_objects)) = plan.too_few_objects {
            warn!(
                image_objects,
                template_objects,
                min_matches = self.config.min_matches,
                "Too few objects for coordinate matching"
            );
            attempts.push(failed(
                AlignmentStrategy::DirectMatch,
                None,
                FailureReason::InsufficientMatches,
                Some(format!(
                    "skipped: {image_objects} image and {template_objects} template objects, need {}",
                    self.config.min_matches
                )),
            ));
        } else {
            debug!("Coordinate matching disabled");
        }

        if plan.frame_resampling {
            info!("Attempting reference-frame resampling");
            let attempt = match self.resampler.register_to_frame(
                req.image,
                req.template,
                req.output,
                req.scratch,
            ) {
                Ok(()) => success(AlignmentStrategy::FrameResample, None),
                Err(e) => {
                    error!(error = %e, "Reference-frame resampling failed");
                    failed(
                        AlignmentStrategy::FrameResample,
                        None,
                        FailureReason::TransformError,
                        Some(e.to_string()),
                    )
                }
            };
            let ok = attempt.succeeded();
            attempts.push(attempt);
            if ok {
                return Ok(finish_success(AlignmentStrategy::FrameResample, req, attempts));
            }
        }

        let reason = attempts
            .last()
            .and_then(|a| a.failure)
            .unwrap_or(FailureReason::NoStrategyAvailable);
        error!(%reason, attempts = attempts.len(), "Alignment failed");
        Ok(AlignmentOutcome::Failure { reason, attempts })
    }

    /// Direct match, then search-radius reduction, then tolerance match.
    fn match_cascade(
        &self,
        req: &AlignRequest<'_>,
        plan: &AlignmentPlan,
        attempts: &mut Vec<StrategyAttempt>,
    ) -> Result<Option<AlignmentStrategy>> {
        let cfg = self.config;

        info!("Trying direct coordinate matching");
        let direct = self.try_match(
            AlignmentStrategy::DirectMatch,
            req,
            req.image_catalog,
            MatchMode::Triangles,
            cfg.tolerance,
        );
        if push_attempt(attempts, direct) {
            return Ok(Some(AlignmentStrategy::DirectMatch));
        }

        if plan.search_radius > 0.0 {
            info!(
                radius = plan.search_radius,
                "Retrying with objects near template positions"
            );
            let reduced = scratch_file(req, "reduced.coo");
            let kept = write_reduced_list(
                req.image_catalog,
                req.template_catalog,
                self.columns,
                plan.search_radius,
                &reduced,
            )?;
            let attempt = if kept < cfg.min_matches {
                warn!(
                    coincident = kept,
                    min_matches = cfg.min_matches,
                    "Too few coincident objects, check min_matches and search_radius"
                );
                failed(
                    AlignmentStrategy::SearchRadiusReduction,
                    None,
                    FailureReason::InsufficientMatches,
                    Some(format!("{kept} coincident objects")),
                )
            } else {
                self.try_match(
                    AlignmentStrategy::SearchRadiusReduction,
                    req,
                    &reduced,
                    MatchMode::Triangles,
                    cfg.tolerance,
                )
            };
            if push_attempt(attempts, attempt) {
                return Ok(Some(AlignmentStrategy::SearchRadiusReduction));
            }
        } else {
            debug!("Search radius is zero, skipping coincidence filter");
        }

        info!("Trying tolerance matching");
        let tolerance = self.try_match(
            AlignmentStrategy::ToleranceMatch,
            req,
            req.image_catalog,
            MatchMode::Tolerance,
            cfg.tolerance_mode_tolerance,
        );
        if push_attempt(attempts, tolerance) {
            return Ok(Some(AlignmentStrategy::ToleranceMatch));
        }
        Ok(None)
    }

    /// Match `input` against the template catalog and, with enough pairs,
    /// transform the image.
    fn try_match(
        &self,
        strategy: AlignmentStrategy,
        req: &AlignRequest<'_>,
        input: &Path,
        mode: MatchMode,
        tolerance: f64,
    ) -> StrategyAttempt {
        let matches_file = scratch_file(req, &format!("{}.match", strategy.name()));
        let request = MatchRequest {
            input,
            reference: req.template_catalog,
            output: &matches_file,
            mode,
            tolerance,
            nmatch: self.config.nmatch,
            separation: self.config.separation,
        };
        let matches = match self.matcher.match_coordinates(&request) {
            Ok(n) => n,
            Err(e) => {
                error!(%strategy, error = %e, "Coordinate matcher failed");
                return failed(
                    strategy,
                    None,
                    FailureReason::InsufficientMatches,
                    Some(e.to_string()),
                );
            }
        };
        info!(%strategy, matches, "Coordinate matching finished");

        if matches < self.config.min_matches {
            return failed(strategy, Some(matches), FailureReason::InsufficientMatches, None);
        }

        match self.resampler.apply_transform(
            req.image,
            &matches_file,
            req.template_shape,
            req.output,
            req.scratch,
        ) {
            Ok(()) => success(strategy, Some(matches)),
            Err(e) => {
                error!(%strategy, error = %e, "Geometric transform failed");
                failed(
                    strategy,
                    Some(matches),
                    FailureReason::TransformError,
                    Some(e.to_string()),
                )
            }
        }
    }
}

fn scratch_file(req: &AlignRequest<'_>, suffix: &str) -> PathBuf {
    let stem = req
        .image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".into());
    req.scratch.join(format!("{stem}.{suffix}"))
}

fn push_attempt(attempts: &mut Vec<StrategyAttempt>, attempt: StrategyAttempt) -> bool {
    let ok = attempt.succeeded();
    attempts.push(attempt);
    ok
}

fn success(strategy: AlignmentStrategy, matches: Option<usize>) -> StrategyAttempt {
    StrategyAttempt {
        strategy,
        matches,
        failure: None,
        detail: None,
    }
}

fn failed(
    strategy: AlignmentStrategy,
    matches: Option<usize>,
    reason: FailureReason,
    detail: Option<String>,
) -> StrategyAttempt {
    StrategyAttempt {
        strategy,
        matches,
        failure: Some(reason),
        detail,
    }
}

fn finish_success(
    method: AlignmentStrategy,
    req: &AlignRequest<'_>,
    attempts: Vec<StrategyAttempt>,
) -> AlignmentOutcome {
    info!(%method, "Alignment successful");
    AlignmentOutcome::Success {
        method,
        image: req.output.to_path_buf(),
        attempts,
    }
}
