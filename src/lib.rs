//! # Cycle Slip
//!
//! Detection and repair of cycle slips in carrier-phase time series.
//!
//! A cycle slip is an abrupt, non-physical jump in a receiver's carrier-phase
//! measurements caused by a loss of signal tracking. Between slips the phase
//! evolves smoothly, so a low-order polynomial fitted to a few neighbouring
//! samples predicts the next one well and repeated differencing flattens it.
//!
//! ## Features
//!
//! - Sliding-window least squares prediction ([`WindowedFitter`]) with a
//!   goodness-of-fit gate on every window
//! - Finite-difference detection up to an arbitrary order ([`DifferenceDetector`])
//! - Repair by substituting the predicted phase ([`detect_and_repair`])
//! - Readers for receiver observation files and CSV, plus CSV/text reporting
//!
//! ## Example
//!
//! ```rust
//! use cycle_slip::{PhaseSeries, WindowedFitter};
//!
//! let times: Vec<f64> = (0..20).map(|t| t as f64).collect();
//! let mut phases: Vec<f64> = times.iter().map(|t| 2.0 * t).collect();
//! phases[10] += 5.0;
//!
//! let series = PhaseSeries::new(times, phases).expect("valid series");
//! let mut fitter = WindowedFitter::new(6, 4, 1.0).expect("valid parameters");
//! let jumps = fitter.detect(&series).expect("fit succeeded");
//! assert_eq!(jumps.len(), 1);
//! ```

mod config;
mod difference;
mod error;
mod fitter;
mod jump;
mod polyfit;
mod repair;
mod series;

pub mod io;
pub mod report;

pub use config::{DetectorConfig, FitErrorPolicy};
pub use difference::{difference_series, DifferenceDetector, DifferencePass, DifferenceSeries};
pub use error::{CycleSlipError, Result};
pub use fitter::{FitterPass, WindowOutcome, WindowedFitter};
pub use jump::{JumpRecord, JumpSource};
pub use polyfit::{
    evaluate_polynomial, fit_polynomial, FitCache, FittedModel, ResidualSet, FIT_CACHE_CAPACITY,
};
pub use repair::{detect_and_repair, repair, RepairOutcome};
pub use series::{PhaseSeries, Sample, Window, WindowFit};

/// Runs the windowed polynomial fitter with the default window (6) and
/// degree (4).
///
/// # Arguments
///
/// * `times` - Sample times, non-decreasing
/// * `phases` - Carrier-phase values, one per time
/// * `threshold` - Discrepancy that flags a slip
///
/// # Example
///
/// ```rust
/// use cycle_slip::detect_slips;
///
/// let times: Vec<f64> = (0..20).map(|t| t as f64).collect();
/// let phases: Vec<f64> = times.iter().map(|t| 2.0 * t).collect();
/// let jumps = detect_slips(&times, &phases, 1.0).expect("detection ran");
/// assert!(jumps.is_empty());
/// ```
pub fn detect_slips(times: &[f64], phases: &[f64], threshold: f64) -> Result<Vec<JumpRecord>> {
    let series = PhaseSeries::new(times.to_vec(), phases.to_vec())?;
    let config = DetectorConfig::default().with_threshold(threshold);
    WindowedFitter::with_config(config)?.detect(&series)
}

/// Runs the difference detector over orders 2 to 4 with a shared threshold.
pub fn difference_slips(times: &[f64], phases: &[f64], threshold: f64) -> Result<Vec<JumpRecord>> {
    let series = PhaseSeries::new(times.to_vec(), phases.to_vec())?;
    DifferenceDetector::new(4, threshold)?.detect(&series)
}
