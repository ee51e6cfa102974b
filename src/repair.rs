use log::debug;

use crate::config::DetectorConfig;
use crate::error::{CycleSlipError, Result};
use crate::fitter::WindowedFitter;
use crate::jump::JumpRecord;
use crate::series::PhaseSeries;

/// Detected slips together with the repaired series.
#[derive(Debug, Clone, PartialEq)]
pub struct RepairOutcome {
    pub jumps: Vec<JumpRecord>,
    /// Same length and timestamps as the input; phases differ only at jump indices
    pub repaired: PhaseSeries,
}

/// Replaces the phase at every jump's index with its predicted value.
///
/// Only records with an expected phase (predictions) can be repaired;
/// difference detections are rejected.
///
/// # Errors
///
/// `InvalidInput` if a record is not a prediction or points outside `series`.
pub fn repair(series: &PhaseSeries, jumps: &[JumpRecord]) -> Result<PhaseSeries> {
    let mut phases = series.phases().to_vec();

    for jump in jumps {
        let expected = jump.expected.ok_or_else(|| {
            CycleSlipError::InvalidInput(format!(
                "jump at index {} has no predicted value to repair with",
                jump.index
            ))
        })?;
        let slot = phases.get_mut(jump.index).ok_or_else(|| {
            CycleSlipError::InvalidInput(format!(
                "jump index {} is outside a series of {} samples",
                jump.index,
                series.len()
            ))
        })?;
        debug!("repairing index {}: {} -> {}", jump.index, *slot, expected);
        *slot = expected;
    }

    Ok(series.with_phases(phases))
}

/// Runs the windowed fitter over the original data and repairs every flagged
/// sample. Repaired values never feed back into later windows.
///
/// # Example
///
/// ```rust
/// use cycle_slip::{detect_and_repair, DetectorConfig, PhaseSeries};
///
/// let times: Vec<f64> = (0..20).map(|t| t as f64).collect();
/// let mut phases: Vec<f64> = times.iter().map(|t| 2.0 * t).collect();
/// phases[10] += 5.0;
/// let series = PhaseSeries::new(times, phases).expect("valid series");
///
/// let outcome = detect_and_repair(&series, &DetectorConfig::default()).expect("repair");
/// assert!((outcome.repaired.phases()[10] - 20.0).abs() < 1e-6);
/// ```
pub fn detect_and_repair(series: &PhaseSeries, config: &DetectorConfig) -> Result<RepairOutcome> {
    let mut fitter = WindowedFitter::with_config(config.clone())?;
    let jumps = fitter.detect(series)?;
    let repaired = repair(series, &jumps)?;
    Ok(RepairOutcome { jumps, repaired })
}
