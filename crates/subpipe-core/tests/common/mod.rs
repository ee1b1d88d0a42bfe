#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use ndarray::Array2;
use subpipe_core::error::{Result, SubpipeError};
use subpipe_core::io::fits::{write_fits, FitsHeader};
use subpipe_core::tools::{
    CoordinateMatcher, CosmeticsRequest, DifferencingEngine, EngineOutput, EngineRequest,
    ImageCleaner, MatchMode, MatchRequest, Resampler, SourceDetector, Toolset,
};

/// Write a `width x height` float image whose pixels come from `pixel(row, col)`.
pub fn write_image(
    path: &Path,
    width: usize,
    height: usize,
    cards: &[(&str, f64)],
    pixel: impl Fn(usize, usize) -> f32,
) {
    let data = Array2::from_shape_fn((height, width), |(r, c)| pixel(r, c));
    let mut header = FitsHeader::default();
    for (key, value) in cards {
        header.set_f64(key, *value);
    }
    write_fits(path, &data, Some(&header)).unwrap();
}

/// A 64x64 frame with a gentle gradient, so statistics are non-trivial.
pub fn write_frame(path: &Path) {
    write_image(path, 64, 64, &[("GAIN", 1.5), ("EXPTIME", 30.0)], |r, c| {
        100.0 + (r + c) as f32 * 0.5
    });
}

/// One catalog row in the default column layout
/// (x=1, y=2, flag=5, elongation=8, fwhm=9).
pub fn catalog_line(x: f64, y: f64, flag: i64, elongation: f64, fwhm: f64) -> String {
    format!("{x:10.3} {y:10.3} -12.000 0.010 {flag} 100.0 200.0 {elongation:.3} {fwhm:.3}")
}

/// `n` clean sources on a fixed grid, all with the same FWHM.
pub fn grid_rows(n: usize, fwhm: f64) -> Vec<String> {
    (0..n)
        .map(|i| {
            let x = 20.0 + (i % 10) as f64 * 30.0;
            let y = 20.0 + (i / 10) as f64 * 30.0;
            catalog_line(x, y, 0, 1.1, fwhm)
        })
        .collect()
}

pub fn write_lines(path: &Path, lines: &[String]) {
    let mut text = lines.join("\n");
    text.push('\n');
    fs::write(path, text).unwrap();
}

fn tool_error(tool: &str) -> SubpipeError {
    SubpipeError::tool(tool, "exit status: 1", "scripted failure")
}

// ---------------------------------------------------------------------------
// Scripted collaborators
// ---------------------------------------------------------------------------

/// Detector state. Frames whose file name starts with `ref` are treated as
/// the template and get `template_fwhm`; everything else gets `image_fwhm`.
#[derive(Debug)]
pub struct DetectorState {
    /// Row counts handed out in order; `default_count` once exhausted.
    pub counts: VecDeque<usize>,
    pub default_count: usize,
    pub image_fwhm: f64,
    pub template_fwhm: f64,
    pub fail: bool,
    pub calls: Vec<(PathBuf, f64)>,
}

impl Default for DetectorState {
    fn default() -> Self {
        Self {
            counts: VecDeque::new(),
            default_count: 40,
            image_fwhm: 3.0,
            template_fwhm: 3.0,
            fail: false,
            calls: Vec::new(),
        }
    }
}

pub struct StubDetector(pub Rc<RefCell<DetectorState>>);

impl SourceDetector for StubDetector {
    fn detect(&self, image: &Path, threshold: f64, _saturation: f64, catalog: &Path) -> Result<()> {
        let mut s = self.0.borrow_mut();
        s.calls.push((image.to_path_buf(), threshold));
        if s.fail {
            return Err(tool_error("detector"));
        }
        let n = s.counts.pop_front().unwrap_or(s.default_count);
        let is_template = image
            .file_name()
            .is_some_and(|n| n.to_string_lossy().starts_with("ref"));
        let fwhm = if is_template {
            s.template_fwhm
        } else {
            s.image_fwhm
        };
        write_lines(catalog, &grid_rows(n, fwhm));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MatcherState {
    pub responses: VecDeque<usize>,
    pub default_matches: usize,
    pub fail: bool,
    /// `(mode, input list, tolerance)` per call.
    pub calls: Vec<(MatchMode, PathBuf, f64)>,
}

pub struct StubMatcher(pub Rc<RefCell<MatcherState>>);

impl CoordinateMatcher for StubMatcher {
    fn match_coordinates(&self, request: &MatchRequest<'_>) -> Result<usize> {
        let mut s = self.0.borrow_mut();
        s.calls
            .push((request.mode, request.input.to_path_buf(), request.tolerance));
        if s.fail {
            return Err(tool_error("matcher"));
        }
        let n = s.responses.pop_front().unwrap_or(s.default_matches);
        fs::write(request.output, "1 1 1 1\n")?;
        Ok(n)
    }
}

#[derive(Debug, Default)]
pub struct ResamplerState {
    pub fail_transform: bool,
    pub fail_register: bool,
    pub transform_calls: usize,
    pub register_calls: usize,
}

pub struct StubResampler(pub Rc<RefCell<ResamplerState>>);

impl Resampler for StubResampler {
    fn apply_transform(
        &self,
        image: &Path,
        _matches: &Path,
        _reference_shape: (usize, usize),
        output: &Path,
        _scratch: &Path,
    ) -> Result<()> {
        let mut s = self.0.borrow_mut();
        s.transform_calls += 1;
        if s.fail_transform {
            return Err(tool_error("transform"));
        }
        fs::copy(image, output)?;
        Ok(())
    }

    fn register_to_frame(
        &self,
        image: &Path,
        _template: &Path,
        output: &Path,
        _scratch: &Path,
    ) -> Result<()> {
        let mut s = self.0.borrow_mut();
        s.register_calls += 1;
        if s.fail_register {
            return Err(tool_error("register"));
        }
        fs::copy(image, output)?;
        Ok(())
    }
}

/// What the scripted engine writes as its kernel-sum file.
#[derive(Clone, Debug)]
pub enum EngineReply {
    Sum(f64),
    /// A kernel-sum file with no parsable value.
    Garbage,
    /// No kernel-sum file at all.
    Missing,
}

#[derive(Debug, Default)]
pub struct EngineState {
    pub replies: VecDeque<EngineReply>,
    /// `(convolved, target, parameter block)` per call.
    pub calls: Vec<(PathBuf, PathBuf, String)>,
}

pub struct StubEngine(pub Rc<RefCell<EngineState>>);

impl DifferencingEngine for StubEngine {
    fn run(&self, request: &EngineRequest<'_>) -> Result<EngineOutput> {
        let mut s = self.0.borrow_mut();
        let params = fs::read_to_string(request.params)?;
        s.calls.push((
            request.convolve.to_path_buf(),
            request.target.to_path_buf(),
            params,
        ));
        let reply = s.replies.pop_front().unwrap_or(EngineReply::Sum(1.0));

        let difference = request.scratch.join("conv.fits");
        fs::copy(request.target, &difference)?;
        let sum_file = request.scratch.join("sum_kernel");
        let kernel_sum = match reply {
            EngineReply::Sum(v) => {
                fs::write(&sum_file, format!("sum_kernel {v}\n"))?;
                Some(sum_file)
            }
            EngineReply::Garbage => {
                fs::write(&sum_file, "sum_kernel nan\n")?;
                Some(sum_file)
            }
            EngineReply::Missing => None,
        };
        Ok(EngineOutput {
            difference,
            convolved: None,
            kernel_sum,
            log: format!("call {}\n", s.calls.len()),
        })
    }
}

#[derive(Debug, Default)]
pub struct CleanerState {
    pub cosmetics: Vec<(PathBuf, u32)>,
    pub defringe: Vec<PathBuf>,
}

pub struct StubCleaner(pub Rc<RefCell<CleanerState>>);

impl ImageCleaner for StubCleaner {
    fn remove_cosmetics(
        &self,
        image: &Path,
        request: &CosmeticsRequest<'_>,
        _scratch: &Path,
    ) -> Result<()> {
        self.0
            .borrow_mut()
            .cosmetics
            .push((image.to_path_buf(), request.iterations));
        Ok(())
    }

    fn defringe(&self, image: &Path, _fringe_frame: &Path, _scratch: &Path) -> Result<()> {
        self.0.borrow_mut().defringe.push(image.to_path_buf());
        Ok(())
    }
}

/// Shared handles on every stub's state, plus a way to build a [`Toolset`].
#[derive(Default)]
pub struct Stubs {
    pub detector: Rc<RefCell<DetectorState>>,
    pub matcher: Rc<RefCell<MatcherState>>,
    pub resampler: Rc<RefCell<ResamplerState>>,
    pub engine: Rc<RefCell<EngineState>>,
    pub cleaner: Rc<RefCell<CleanerState>>,
}

impl Stubs {
    pub fn new() -> Self {
        let stubs = Self::default();
        stubs.matcher.borrow_mut().default_matches = 20;
        stubs
    }

    pub fn toolset(&self) -> Toolset {
        Toolset {
            detector: Box::new(StubDetector(Rc::clone(&self.detector))),
            matcher: Box::new(StubMatcher(Rc::clone(&self.matcher))),
            resampler: Box::new(StubResampler(Rc::clone(&self.resampler))),
            engine: Box::new(StubEngine(Rc::clone(&self.engine))),
            cleaner: Box::new(StubCleaner(Rc::clone(&self.cleaner))),
        }
    }
}
