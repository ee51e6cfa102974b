//! Finite-difference cycle slip detection.
//!
//! A smooth phase series flattens out under repeated differencing while a
//! slip of size Δ spreads into binomially growing spikes (Δ, 2Δ, 3Δ, ...), so
//! thresholding the higher-order differences isolates it. First differences
//! are computed for reference but never thresholded.

use std::collections::HashSet;

use log::debug;

use crate::config::DetectorConfig;
use crate::error::{CycleSlipError, Result};
use crate::jump::{JumpRecord, JumpSource};
use crate::series::PhaseSeries;

/// The series obtained by differencing the phases `order` times.
#[derive(Debug, Clone, PartialEq)]
pub struct DifferenceSeries {
    order: usize,
    values: Vec<f64>,
}

impl DifferenceSeries {
    pub fn order(&self) -> usize {
        self.order
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Index in the original series that local position `local` refers to
    pub fn original_index(&self, local: usize) -> usize {
        local + self.order
    }

    fn next_order(&self) -> Self {
        Self {
            order: self.order + 1,
            values: self.values.windows(2).map(|w| w[1] - w[0]).collect(),
        }
    }
}

/// Differences of orders `1..=max_order`. Order k has `len - k` values, and
/// no order beyond `len` is produced.
pub fn difference_series(phases: &[f64], max_order: usize) -> Vec<DifferenceSeries> {
    let base = DifferenceSeries {
        order: 0,
        values: phases.to_vec(),
    };
    std::iter::successors(Some(base), |prev| Some(prev.next_order()))
        .skip(1)
        .take(max_order.min(phases.len()))
        .collect()
}

/// Everything one pass of the difference detector produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DifferencePass {
    /// Difference series of orders 1..=max_order
    pub series: Vec<DifferenceSeries>,
    /// Flagged samples, by order then index
    pub jumps: Vec<JumpRecord>,
}

/// Detects slips by thresholding difference series of order 2 and above.
#[derive(Debug, Clone)]
pub struct DifferenceDetector {
    config: DetectorConfig,
}

impl DifferenceDetector {
    /// Creates a detector computing orders up to `max_order`, all sharing `threshold`
    pub fn new(max_order: usize, threshold: f64) -> Result<Self> {
        Self::with_config(
            DetectorConfig::default()
                .with_max_order(max_order)
                .with_threshold(threshold),
        )
    }

    /// Creates a detector from `config`. Window size, degree and acceptance
    /// bound are not read and not checked.
    pub fn with_config(config: DetectorConfig) -> Result<Self> {
        config.validate_difference()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn detect(&self, series: &PhaseSeries) -> Result<Vec<JumpRecord>> {
        Ok(self.run(series)?.jumps)
    }

    /// Computes every difference order and flags entries above the order's
    /// threshold.
    ///
    /// Each flagged entry at local position `j` of order `k` is reported at
    /// original index `j + k`, with the first difference at `j` as its
    /// discrepancy and no expected phase. An index may be reported once per order unless
    /// `deduplicate` is set, in which case only its lowest flagging order is kept.
    pub fn run(&self, series: &PhaseSeries) -> Result<DifferencePass> {
        let n = series.len();
        let needed = self.config.min_difference_samples();
        if n < needed {
            if self.config.require_attempt {
                return Err(CycleSlipError::InsufficientData(n, needed));
            }
            debug!("{} samples is too short for order {} differences", n, self.config.max_order);
            return Ok(DifferencePass::default());
        }

        let diffs = difference_series(series.phases(), self.config.max_order);
        let mut jumps = Vec::new();
        let mut seen: HashSet<usize, ahash::RandomState> = HashSet::default();

        if let Some((first, higher)) = diffs.split_first() {
            for diff in higher {
                let order = diff.order();
                let threshold = self.config.threshold_for_order(order);

                for (j, &value) in diff.values().iter().enumerate() {
                    if value.abs() <= threshold {
                        continue;
                    }
                    let index = diff.original_index(j);
                    if self.config.deduplicate && !seen.insert(index) {
                        continue;
                    }

                    let discrepancy = first.values()[j];
                    debug!(
                        "order {} difference {:.4} exceeds {} at index {}",
                        order, value, threshold, index
                    );
                    jumps.push(JumpRecord {
                        index,
                        time: series.times()[index],
                        observed: series.phases()[index],
                        expected: None,
                        discrepancy,
                        source: JumpSource::Difference { order, value },
                    });
                }
            }
        }

        Ok(DifferencePass {
            series: diffs,
            jumps,
        })
    }
}
