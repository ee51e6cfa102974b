use crate::error::{CycleSlipError, Result};
use crate::polyfit::{FitCache, FittedModel, ResidualSet};

/// One carrier-phase measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Epoch of the measurement (e.g. GPS seconds of week)
    pub time: f64,
    /// Carrier-phase observable
    pub phase: f64,
}

/// An ordered phase-vs-time series with finite samples and non-decreasing
/// timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseSeries {
    times: Vec<f64>,
    phases: Vec<f64>,
}

impl PhaseSeries {
    /// Creates a series from parallel time and phase columns.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the columns differ in length, contain non-finite
    /// values, or the timestamps decrease anywhere.
    pub fn new(times: Vec<f64>, phases: Vec<f64>) -> Result<Self> {
        if times.len() != phases.len() {
            return Err(CycleSlipError::InvalidInput(format!(
                "time and phase columns differ in length ({} vs {})",
                times.len(),
                phases.len()
            )));
        }
        if let Some(i) = times
            .iter()
            .zip(phases.iter())
            .position(|(t, p)| !t.is_finite() || !p.is_finite())
        {
            return Err(CycleSlipError::InvalidInput(format!(
                "sample {} is not finite",
                i
            )));
        }
        if let Some(i) = times.windows(2).position(|w| w[1] < w[0]) {
            return Err(CycleSlipError::InvalidInput(format!(
                "timestamps decrease between samples {} and {}",
                i,
                i + 1
            )));
        }
        Ok(Self { times, phases })
    }

    pub fn from_samples(samples: &[Sample]) -> Result<Self> {
        let (times, phases): (Vec<f64>, Vec<f64>) = samples.iter().map(|s| (s.time, s.phase)).unzip();
        Self::new(times, phases)
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn phases(&self) -> &[f64] {
        &self.phases
    }

    pub fn sample(&self, index: usize) -> Option<Sample> {
        Some(Sample {
            time: *self.times.get(index)?,
            phase: *self.phases.get(index)?,
        })
    }

    pub fn samples(&self) -> impl Iterator<Item = Sample> + '_ {
        self.times
            .iter()
            .zip(self.phases.iter())
            .map(|(&time, &phase)| Sample { time, phase })
    }

    /// Borrowed view of `len` samples starting at `start`, if in bounds.
    pub fn window(&self, start: usize, len: usize) -> Option<Window<'_>> {
        let end = start.checked_add(len)?;
        if end > self.len() {
            return None;
        }
        Some(Window {
            start,
            times: &self.times[start..end],
            phases: &self.phases[start..end],
        })
    }

    /// Same timestamps, new phase column. Caller guarantees equal length.
    pub(crate) fn with_phases(&self, phases: Vec<f64>) -> Self {
        debug_assert_eq!(phases.len(), self.phases.len());
        Self {
            times: self.times.clone(),
            phases,
        }
    }
}

/// A contiguous run of samples inside a [`PhaseSeries`].
#[derive(Debug, Clone, Copy)]
pub struct Window<'a> {
    start: usize,
    times: &'a [f64],
    phases: &'a [f64],
}

/// Polynomial fitted to a window together with its residual statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowFit {
    pub model: FittedModel,
    pub residuals: ResidualSet,
}

impl<'a> Window<'a> {
    /// Index of the first sample in the parent series
    pub fn start(&self) -> usize {
        self.start
    }

    /// One past the last sample's index in the parent series
    pub fn end(&self) -> usize {
        self.start + self.times.len()
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &'a [f64] {
        self.times
    }

    pub fn phases(&self) -> &'a [f64] {
        self.phases
    }

    /// Least squares fit against the window's first timestamp.
    pub fn fit(&self, degree: usize, cache: &mut FitCache) -> Result<WindowFit> {
        let model = FittedModel::fit_cached(cache, self.times, self.phases, degree)?;
        let residuals = model.residuals(self.times, self.phases)?;
        Ok(WindowFit { model, residuals })
    }
}
