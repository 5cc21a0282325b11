//! System-wide default constants.
//!
//! Centralises the numbers the simulator falls back to when the config file
//! does not set them. Grouped by subsystem for easy discovery.

// ============================================================================
// Pipeline
// ============================================================================

/// Capacity of the bounded results queue between producer and consumer.
pub const RESULTS_QUEUE_CAPACITY: usize = 100;

/// Records drained from the results queue per consumer batch.
pub const BATCH_SIZE: usize = 10;

/// Ring-buffer capacity for every plotted series.
///
/// 1 130 samples spans one full loop of the bundled detuning trace.
pub const WINDOW_SAMPLES: usize = 1_130;

/// Minimum interval between plotting colour advances (seconds).
pub const COLOUR_INTERVAL_SECS: f64 = 0.2;

/// Refresh interval of the render loop (milliseconds).
pub const RENDER_INTERVAL_MS: u64 = 50;

/// Delay between produced samples (milliseconds). 0 = as fast as the consumer drains.
pub const SAMPLE_DELAY_MS: u64 = 0;

// ============================================================================
// Physics
// ============================================================================

/// Offset added to the raw dataset detuning before scaling.
///
/// Centres the normalised trace so that `raw + offset` spans roughly ±1.
pub const DETUNING_OFFSET: f64 = 0.034_688_375;

// ============================================================================
// Synthetic Dataset
// ============================================================================

/// Sample spacing of the synthetic microphonics trace (seconds).
pub const SYNTHETIC_SAMPLE_SPACING_SECS: f64 = 9.490_357_641_929_459e-5;

/// Pass duration of a one-sample trace, which has no spacing to measure.
pub const SINGLE_SAMPLE_PASS_SECS: f64 = SYNTHETIC_SAMPLE_SPACING_SECS;

/// Seed used when `--seed` is not given.
pub const SYNTHETIC_DEFAULT_SEED: u64 = 42;

// ============================================================================
// Controls
// ============================================================================

/// Full-scale value of a 7-bit controller message.
pub const CONTROLLER_FULL_SCALE: f64 = 127.0;

/// Controller numbers of the default control surface layout.
pub const CC_FOM: u8 = 36;
pub const CC_TUNING_RANGE: u8 = 37;
pub const CC_UPHONICS_RANGE: u8 = 38;
pub const CC_QE: u8 = 39;
pub const NOTE_FRT_TOGGLE: u8 = 40;

// ============================================================================
// Rendering
// ============================================================================

/// Axes rescale only when the extreme drops below this fraction of the bound.
pub const AXIS_RESCALE_HYSTERESIS: f64 = 0.8;

/// Headroom applied when an axis rescales.
pub const AXIS_MARGIN: f64 = 1.05;

/// Headroom of the live input bar chart.
pub const INPUT_PANEL_MARGIN: f64 = 1.2;

/// Opacity of the inactive feedback path.
pub const INACTIVE_PATH_ALPHA: f64 = 0.5;
