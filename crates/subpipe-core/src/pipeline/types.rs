/// Stage of one image run, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    PreparingTemplate,
    Cleaning,
    Measuring,
    ObjectSearch,
    Alignment,
    Differencing,
    Recording,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PreparingTemplate => write!(f, "Preparing template"),
            Self::Cleaning => write!(f, "Cleaning"),
            Self::Measuring => write!(f, "Measuring"),
            Self::ObjectSearch => write!(f, "Finding objects"),
            Self::Alignment => write!(f, "Aligning"),
            Self::Differencing => write!(f, "Differencing"),
            Self::Recording => write!(f, "Recording"),
        }
    }
}

/// Progress reporting for a batch.
///
/// All methods have default no-op implementations.
pub trait ProgressReporter {
    /// Image `index` (0-based) of `total` is starting.
    fn begin_image(&self, _index: usize, _total: usize, _name: &str) {}

    fn begin_stage(&self, _stage: PipelineStage) {}

    /// The image finished with the given fail code.
    fn finish_image(&self, _name: &str, _fail_code: u8) {}
}

/// Reporter that ignores everything.
pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}
