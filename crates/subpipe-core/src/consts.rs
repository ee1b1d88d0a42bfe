/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Threshold increment applied when the detector finds too many objects.
pub const THRESHOLD_STEP_UP: f64 = 5.0;

/// Threshold decrement applied when the detector finds too few objects.
pub const THRESHOLD_STEP_DOWN: f64 = 2.0;

/// The threshold search stops once the next threshold would fall below this.
pub const THRESHOLD_FLOOR: f64 = 8.0;

/// Default iteration cap for the object-count threshold search.
pub const DEFAULT_MAX_SEARCH_ATTEMPTS: usize = 20;

/// Default starting detection threshold for images and the template.
pub const DEFAULT_START_THRESHOLD: f64 = 25.0;

/// Default saturation level handed to the source detector.
pub const DEFAULT_DETECTION_SATURATION: f64 = 55_000.0;

/// Default acceptable object-count window.
pub const DEFAULT_MIN_OBJECTS: usize = 20;
pub const DEFAULT_MAX_OBJECTS: usize = 85;

/// Threshold used for the one-off FWHM estimate of an image.
pub const FWHM_DETECTION_THRESHOLD: f64 = 10.0;

/// FWHM (pixels) assumed when the detector cannot measure one.
pub const DEFAULT_FWHM: f64 = 3.5;

/// Objects at or above this elongation are excluded from seeing estimates.
pub const MAX_SEEING_ELONGATION: f64 = 2.0;

/// Pairing radius (pixels) between image and template detections.
pub const SEEING_PAIR_RADIUS: f64 = 2.0;

/// Upper bound on the number of paired detections used for the seeing ratio.
pub const MAX_SEEING_PAIRS: usize = 100;

/// Kernel-sum value written when the engine's result file cannot be parsed.
pub const KERNEL_SUM_UNDETERMINED: f64 = -1.0;

/// Default kernel-sum acceptance window.
pub const DEFAULT_MIN_SUM_KERNEL: f64 = 0.0;
pub const DEFAULT_MAX_SUM_KERNEL: f64 = 28.0;

/// Seeing (pixels) above which adaptive differencing profiles apply.
pub const ADAPTIVE_SEEING_LOWER_BOUND: f64 = 5.0;

/// Offset between half mesh size and half stamp size when the latter is unset.
pub const HALF_STAMP_MARGIN: u32 = 6;

/// Clipping factor and pass count used for image statistics.
pub const STATS_CLIP_SIGMA: f64 = 3.0;
pub const STATS_CLIP_PASSES: usize = 2;

/// Fraction of pixels that must survive clipping before clipped stats are used.
pub const STATS_MIN_CLIPPED_FRACTION: f64 = 0.01;

/// Default timeout for a single external tool invocation.
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 600;

/// Interval between polls of a running external tool.
pub const TOOL_POLL_INTERVAL_MS: u64 = 20;

/// Suffixes appended to differencing artifacts of rejected attempts.
pub const FIRST_ATTEMPT_SUFFIX: &str = "one";
pub const SECOND_ATTEMPT_SUFFIX: &str = "two";

/// File names inside the work directory.
pub const LEDGER_FILE_NAME: &str = "ledger.json";
pub const LOG_FILE_NAME: &str = "subpipe_log.txt";
pub const TEMPLATE_SUBDIR: &str = "template";
pub const SCRATCH_PREFIX: &str = ".scratch-";
