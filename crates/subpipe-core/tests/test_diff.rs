mod common;

use std::path::PathBuf;
use std::rc::Rc;

use approx::assert_relative_eq;
use common::{grid_rows, write_lines, EngineReply, StubDetector, StubEngine, Stubs};
use subpipe_core::detection::DetectionConfig;
use subpipe_core::diff::{
    artifact, profile_for_seeing, select_params, DifferencingConfig, DifferencingOutcome,
    DifferencingState, Differencer, DirectionHint, KernelSum, SubtractRequest,
};
use subpipe_core::error::Result;
use tempfile::{tempdir, TempDir};

struct Fixture {
    dir: TempDir,
    image: PathBuf,
    template: PathBuf,
    template_stars: PathBuf,
    base: PathBuf,
    scratch: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        let image = dir.path().join("img.aligned.fits");
        let template = dir.path().join("ref.fits");
        std::fs::write(&image, b"aligned image").unwrap();
        std::fs::write(&template, b"template").unwrap();
        let scratch = dir.path().join("scratch");
        std::fs::create_dir(&scratch).unwrap();
        Self {
            template_stars: dir.path().join("ref.stars"),
            base: dir.path().join("img"),
            image,
            template,
            scratch,
            dir,
        }
    }

    fn file(&self, suffix: &str) -> PathBuf {
        artifact(&self.base, suffix)
    }
}

/// Stubs whose detector reports the given widths for image and template.
fn stubs_with_seeing(image_fwhm: f64, template_fwhm: f64) -> Stubs {
    let stubs = Stubs::new();
    {
        let mut d = stubs.detector.borrow_mut();
        d.image_fwhm = image_fwhm;
        d.template_fwhm = template_fwhm;
    }
    stubs
}

fn script(stubs: &Stubs, replies: &[EngineReply]) {
    stubs.engine.borrow_mut().replies = replies.iter().cloned().collect();
}

fn subtract_with(
    stubs: &Stubs,
    fixture: &Fixture,
    config: &DifferencingConfig,
    hint: DirectionHint,
) -> Result<DifferencingOutcome> {
    let detector = StubDetector(Rc::clone(&stubs.detector));
    let engine = StubEngine(Rc::clone(&stubs.engine));
    let detection = DetectionConfig::default();
    let differencer = Differencer {
        detector: &detector,
        engine: &engine,
        config,
        detection: &detection,
    };
    let request = SubtractRequest {
        image: &fixture.image,
        template: &fixture.template,
        template_stars: &fixture.template_stars,
        image_threshold: 25.0,
        template_threshold: 25.0,
        artifacts: &fixture.base,
        stamps: None,
        scratch: &fixture.scratch,
    };
    differencer.subtract(&request, hint)
}

fn subtract(stubs: &Stubs, fixture: &Fixture, hint: DirectionHint) -> DifferencingOutcome {
    subtract_with(stubs, fixture, &DifferencingConfig::default(), hint).unwrap()
}

/// Which file the engine convolved on each call.
fn convolved(stubs: &Stubs) -> Vec<PathBuf> {
    stubs.engine.borrow().calls.iter().map(|c| c.0.clone()).collect()
}

fn param_value(block: &str, key: &str) -> Option<String> {
    block.lines().find_map(|l| {
        let mut parts = l.split_whitespace();
        (parts.next() == Some(key)).then(|| parts.next().map(str::to_string)).flatten()
    })
}

// ---------------------------------------------------------------------------
// Quality gate
// ---------------------------------------------------------------------------

#[test]
fn test_sharper_image_is_convolved_and_accepted() {
    let fixture = Fixture::new();
    let stubs = stubs_with_seeing(2.4, 3.0);
    script(&stubs, &[EngineReply::Sum(5.0)]);

    let outcome = subtract(&stubs, &fixture, DirectionHint::Auto);

    assert_eq!(outcome.state, DifferencingState::Accepted);
    assert_eq!(outcome.reverse, Some(false));
    assert_relative_eq!(outcome.seeing_ratio.unwrap(), 0.8, epsilon = 1e-9);
    assert_eq!(outcome.kernel_sum, KernelSum::Value(5.0));
    assert_eq!(outcome.attempts, 1);
    assert_eq!(convolved(&stubs), vec![fixture.image.clone()]);
    assert_eq!(outcome.output, Some(fixture.file(".sub.fits")));
    assert!(fixture.file(".sub.fits").exists());
    assert!(fixture.file(".sum_kernel").exists());
    assert!(!fixture.file(".sub.fits.one").exists());
}

#[test]
fn test_rejected_attempt_is_retried_in_reverse() {
    let fixture = Fixture::new();
    let stubs = stubs_with_seeing(3.9, 3.0);
    script(&stubs, &[EngineReply::Sum(40.0), EngineReply::Sum(10.0)]);

    let outcome = subtract(&stubs, &fixture, DirectionHint::Auto);

    assert_eq!(outcome.state, DifferencingState::RetriedAccepted);
    assert_eq!(outcome.attempts, 2);
    assert_eq!(outcome.reverse, Some(false));
    assert_eq!(outcome.kernel_sum, KernelSum::Value(10.0));
    assert_eq!(
        convolved(&stubs),
        vec![fixture.template.clone(), fixture.image.clone()]
    );

    for suffix in [".sum_kernel.one", ".sub.fits.one", ".engine.log.one"] {
        assert!(fixture.file(suffix).exists(), "missing {suffix}");
    }
    let first = std::fs::read_to_string(fixture.file(".sum_kernel.one")).unwrap();
    assert_eq!(KernelSum::parse(&first), KernelSum::Value(40.0));
    assert!(fixture.file(".sub.fits").exists());
    assert!(!fixture.file(".sub.fits.two").exists());
}

#[test]
fn test_rejection_in_both_directions() {
    let fixture = Fixture::new();
    let stubs = stubs_with_seeing(3.9, 3.0);
    script(&stubs, &[EngineReply::Sum(40.0), EngineReply::Sum(45.0)]);

    let outcome = subtract(&stubs, &fixture, DirectionHint::Auto);

    assert_eq!(outcome.state, DifferencingState::DoubleFailure);
    assert_eq!(outcome.attempts, 2);
    assert_eq!(outcome.output, None);
    assert_eq!(outcome.kernel_sum, KernelSum::Value(45.0));
    for suffix in [".sum_kernel.one", ".sum_kernel.two", ".sub.fits.one", ".sub.fits.two"] {
        assert!(fixture.file(suffix).exists(), "missing {suffix}");
    }
    assert!(!fixture.file(".sub.fits").exists());
}

#[test]
fn test_bounds_are_inclusive() {
    let fixture = Fixture::new();
    let stubs = stubs_with_seeing(2.4, 3.0);
    script(&stubs, &[EngineReply::Sum(28.0)]);

    let outcome = subtract(&stubs, &fixture, DirectionHint::Auto);
    assert_eq!(outcome.state, DifferencingState::Accepted);
}

#[test]
fn test_unparsable_kernel_sum_never_passes() {
    let fixture = Fixture::new();
    let stubs = stubs_with_seeing(2.4, 3.0);
    script(&stubs, &[EngineReply::Garbage, EngineReply::Garbage]);

    let outcome = subtract(&stubs, &fixture, DirectionHint::Auto);

    assert_eq!(outcome.state, DifferencingState::DoubleFailure);
    assert_eq!(outcome.kernel_sum, KernelSum::Undetermined);
    assert_eq!(outcome.kernel_sum.as_f64(), -1.0);
}

#[test]
fn test_missing_kernel_sum_file_is_an_error() {
    let fixture = Fixture::new();
    let stubs = stubs_with_seeing(2.4, 3.0);
    script(&stubs, &[EngineReply::Missing]);

    let err = subtract_with(
        &stubs,
        &fixture,
        &DifferencingConfig::default(),
        DirectionHint::Auto,
    )
    .unwrap_err();
    assert!(err.to_string().contains("kernel-sum"));
}

#[test]
fn test_engine_log_accumulates_across_attempts() {
    let fixture = Fixture::new();
    let stubs = stubs_with_seeing(2.4, 3.0);
    script(&stubs, &[EngineReply::Sum(40.0), EngineReply::Sum(3.0)]);

    subtract(&stubs, &fixture, DirectionHint::Auto);

    let first = std::fs::read_to_string(fixture.file(".engine.log.one")).unwrap();
    let second = std::fs::read_to_string(fixture.file(".engine.log")).unwrap();
    assert!(first.contains("reverse = 0"));
    assert!(second.contains("reverse = 1"));
}

// ---------------------------------------------------------------------------
// Direction hints
// ---------------------------------------------------------------------------

#[test]
fn test_forced_direction_skips_gate() {
    let fixture = Fixture::new();
    let stubs = stubs_with_seeing(2.4, 3.0);
    script(&stubs, &[EngineReply::Sum(40.0)]);

    let outcome = subtract(&stubs, &fixture, DirectionHint::ConvolveTemplate);

    assert_eq!(outcome.state, DifferencingState::Accepted);
    assert_eq!(outcome.reverse, Some(true));
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.kernel_sum, KernelSum::Value(40.0));
    assert_eq!(convolved(&stubs), vec![fixture.template.clone()]);
}

#[test]
fn test_invert_hint_flips_ratio_direction() {
    let fixture = Fixture::new();
    let stubs = stubs_with_seeing(2.4, 3.0);
    script(&stubs, &[EngineReply::Sum(5.0)]);

    let outcome = subtract(&stubs, &fixture, DirectionHint::Invert);

    assert_eq!(outcome.reverse, Some(true));
    assert_eq!(outcome.state, DifferencingState::Accepted);
}

#[test]
fn test_undetermined_ratio_aborts_without_engine() {
    let fixture = Fixture::new();
    let stubs = stubs_with_seeing(2.4, 3.0);
    // Nothing detected on the aligned image.
    stubs.detector.borrow_mut().counts = [0].into();

    let outcome = subtract(&stubs, &fixture, DirectionHint::Auto);

    assert_eq!(outcome.state, DifferencingState::RatioUndetermined);
    assert_eq!(outcome.reverse, None);
    assert_eq!(outcome.attempts, 0);
    assert!(stubs.engine.borrow().calls.is_empty());
}

#[test]
fn test_explicit_direction_runs_without_ratio() {
    let fixture = Fixture::new();
    let stubs = stubs_with_seeing(2.4, 3.0);
    stubs.detector.borrow_mut().counts = [0].into();
    script(&stubs, &[EngineReply::Sum(99.0)]);

    let outcome = subtract(&stubs, &fixture, DirectionHint::ConvolveImage);

    assert_eq!(outcome.state, DifferencingState::Accepted);
    assert_eq!(outcome.reverse, Some(false));
    assert_eq!(outcome.seeing_ratio, None);
    assert_eq!(convolved(&stubs), vec![fixture.image.clone()]);
}

#[test]
fn test_existing_template_stars_are_reused() {
    let fixture = Fixture::new();
    write_lines(&fixture.template_stars, &grid_rows(30, 3.0));
    let stubs = stubs_with_seeing(2.4, 3.0);

    subtract(&stubs, &fixture, DirectionHint::Auto);

    let calls = stubs.detector.borrow().calls.clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, fixture.image);
    assert!(fixture.dir.path().join("img.aligned.stars").exists());
}

#[test]
fn test_hint_resolution() {
    assert_eq!(DirectionHint::Auto.resolve(Some(0.8)), Some(false));
    assert_eq!(DirectionHint::Auto.resolve(Some(1.0)), Some(true));
    assert_eq!(DirectionHint::Invert.resolve(Some(1.3)), Some(false));
    assert_eq!(DirectionHint::Auto.resolve(None), None);
    assert_eq!(DirectionHint::Invert.resolve(Some(f64::NAN)), None);
    assert_eq!(DirectionHint::ConvolveImage.resolve(None), Some(false));
    assert_eq!(DirectionHint::ConvolveTemplate.resolve(Some(0.5)), Some(true));
    assert!(DirectionHint::try_from(4).is_err());
    assert_eq!(u8::from(DirectionHint::ConvolveTemplate), 3);
}

// ---------------------------------------------------------------------------
// Parameter selection
// ---------------------------------------------------------------------------

#[test]
fn test_seeing_selects_profile() {
    assert!(profile_for_seeing(4.0).is_none());
    assert!(profile_for_seeing(5.0).is_none());
    assert!(profile_for_seeing(f64::NAN).is_none());

    let p = profile_for_seeing(5.5).unwrap();
    assert_eq!((p.half_mesh_size, p.half_stamp_size), (13, 19));

    let p = profile_for_seeing(7.2).unwrap();
    assert_eq!((p.half_mesh_size, p.half_stamp_size), (17, 23));
    assert_eq!(p.sigmas, [1.0, 1.7, 3.4]);

    let p = profile_for_seeing(8.5).unwrap();
    assert_eq!(p.half_mesh_size, 21);

    let p = profile_for_seeing(14.0).unwrap();
    assert_eq!((p.half_mesh_size, p.half_stamp_size), (23, 29));
    assert_eq!(p.sigmas, [1.0, 2.5, 4.3]);
}

#[test]
fn test_select_params_respects_adapt_flag() {
    let base = DifferencingConfig::default();
    assert_eq!(select_params(3.0, &base).half_mesh_size, 9);
    assert_eq!(select_params(6.5, &base).half_mesh_size, 15);

    let fixed = DifferencingConfig {
        adapt: false,
        ..Default::default()
    };
    assert_eq!(select_params(9.0, &fixed).half_mesh_size, 9);
}

#[test]
fn test_engine_receives_adapted_params() {
    let fixture = Fixture::new();
    let stubs = stubs_with_seeing(7.2, 7.0);

    subtract(&stubs, &fixture, DirectionHint::Auto);

    let params = stubs.engine.borrow().calls[0].2.clone();
    assert_eq!(param_value(&params, "half_mesh_size").as_deref(), Some("17"));
    assert_eq!(param_value(&params, "half_stamp_size").as_deref(), Some("23"));
    assert_eq!(param_value(&params, "reverse").as_deref(), Some("1"));
    assert_eq!(param_value(&params, "stampsbyxy").as_deref(), Some("0"));
}

#[test]
fn test_kernel_sum_parsing() {
    assert_eq!(KernelSum::parse("sum_kernel 3.25\n"), KernelSum::Value(3.25));
    assert_eq!(KernelSum::parse("12.5"), KernelSum::Value(12.5));
    assert_eq!(KernelSum::parse(""), KernelSum::Undetermined);
    assert_eq!(KernelSum::parse("sum_kernel ???"), KernelSum::Undetermined);
    assert_eq!(KernelSum::parse("sum_kernel inf"), KernelSum::Undetermined);
    assert!(!KernelSum::Undetermined.passes(&DifferencingConfig::default()));
}
