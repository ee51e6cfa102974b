use log::{debug, trace, warn};

use crate::config::{DetectorConfig, FitErrorPolicy};
use crate::error::{CycleSlipError, Result};
use crate::jump::{JumpRecord, JumpSource};
use crate::polyfit::FitCache;
use crate::series::PhaseSeries;

/// What happened to one window of the sliding fit.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowOutcome {
    /// The fit was trusted and predicted the sample following the window
    Predicted {
        start: usize,
        sigma: f64,
        predicted: f64,
        actual: f64,
        flagged: bool,
    },
    /// Sigma reached the acceptance bound; no prediction was made
    Skipped { start: usize, sigma: f64 },
    /// The fit failed and the policy was to skip the window
    Failed { start: usize, error: CycleSlipError },
}

impl WindowOutcome {
    /// Index of the window's first sample
    pub fn start(&self) -> usize {
        match *self {
            WindowOutcome::Predicted { start, .. }
            | WindowOutcome::Skipped { start, .. }
            | WindowOutcome::Failed { start, .. } => start,
        }
    }
}

/// Everything one pass of the windowed fitter produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitterPass {
    /// One entry per window, by increasing start index
    pub outcomes: Vec<WindowOutcome>,
    /// Flagged samples, by increasing index
    pub jumps: Vec<JumpRecord>,
}

impl FitterPass {
    pub fn predicted_count(&self) -> usize {
        self.count(|o| matches!(o, WindowOutcome::Predicted { .. }))
    }

    pub fn skipped_count(&self) -> usize {
        self.count(|o| matches!(o, WindowOutcome::Skipped { .. }))
    }

    pub fn failed_count(&self) -> usize {
        self.count(|o| matches!(o, WindowOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&WindowOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }
}

/// Sliding-window polynomial predictor.
///
/// Each window of `window_size` samples is fitted with a polynomial of
/// `degree`; when the fit is trusted, the next sample is predicted and flagged
/// if it deviates by more than `threshold`. The window always advances by one
/// sample and only ever sees the original data.
#[derive(Debug)]
pub struct WindowedFitter {
    config: DetectorConfig,
    cache: FitCache,
}

impl WindowedFitter {
    /// Creates a fitter with the given window, degree and threshold.
    ///
    /// # Example
    ///
    /// ```rust
    /// use cycle_slip::{PhaseSeries, WindowedFitter};
    ///
    /// let times: Vec<f64> = (0..20).map(|t| t as f64).collect();
    /// let mut phases: Vec<f64> = times.iter().map(|t| 2.0 * t).collect();
    /// phases[10] += 5.0;
    /// let series = PhaseSeries::new(times, phases).expect("valid series");
    ///
    /// let mut fitter = WindowedFitter::new(6, 4, 1.0).expect("valid parameters");
    /// let jumps = fitter.detect(&series).expect("fit succeeded");
    /// assert_eq!(jumps[0].index, 10);
    /// ```
    pub fn new(window_size: usize, degree: usize, threshold: f64) -> Result<Self> {
        Self::with_config(DetectorConfig::new(window_size, degree, threshold)?)
    }

    /// Creates a fitter from a full configuration, validating the fields it reads
    pub fn with_config(config: DetectorConfig) -> Result<Self> {
        config.validate_fit()?;
        Ok(Self {
            config,
            cache: FitCache::new(),
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Flagged samples only
    pub fn detect(&mut self, series: &PhaseSeries) -> Result<Vec<JumpRecord>> {
        Ok(self.run(series)?.jumps)
    }

    /// Runs the full pass, returning per-window outcomes and flagged samples.
    pub fn run(&mut self, series: &PhaseSeries) -> Result<FitterPass> {
        let n = series.len();
        let m = self.config.window_size;
        let degree = self.config.degree;
        let mut pass = FitterPass::default();

        if n < self.config.min_fit_samples() {
            if self.config.require_attempt {
                return Err(CycleSlipError::InsufficientData(n, self.config.min_fit_samples()));
            }
            debug!("{} samples is too short for a window of {}; nothing to fit", n, m);
            return Ok(pass);
        }

        for start in 0..n - m {
            let Some(window) = series.window(start, m) else {
                break;
            };

            let fit = match window.fit(degree, &mut self.cache) {
                Ok(fit) => fit,
                Err(error) => match self.config.fit_error_policy {
                    FitErrorPolicy::Abort => return Err(error),
                    FitErrorPolicy::Skip => {
                        warn!("window {}..{} skipped: {}", start, window.end(), error);
                        pass.outcomes.push(WindowOutcome::Failed { start, error });
                        continue;
                    }
                },
            };

            let sigma = fit.residuals.sigma();
            trace!(
                "window {}..{} (t = {}..{}): sigma = {:.6}",
                start,
                window.end(),
                window.times()[0],
                window.times()[m - 1],
                sigma
            );

            if !self.accepts(sigma) {
                pass.outcomes.push(WindowOutcome::Skipped { start, sigma });
                continue;
            }

            let target = window.end();
            let time = series.times()[target];
            let actual = series.phases()[target];
            let predicted = fit.model.evaluate(time);
            let discrepancy = actual - predicted;
            let flagged = discrepancy.abs() > self.config.threshold;

            if flagged {
                debug!(
                    "cycle slip at index {} (t = {}): observed {}, predicted {}, discrepancy {:.4}",
                    target, time, actual, predicted, discrepancy
                );
                pass.jumps.push(JumpRecord {
                    index: target,
                    time,
                    observed: actual,
                    expected: Some(predicted),
                    discrepancy,
                    source: JumpSource::Prediction { sigma },
                });
            }

            pass.outcomes.push(WindowOutcome::Predicted {
                start,
                sigma,
                predicted,
                actual,
                flagged,
            });
        }

        Ok(pass)
    }

    fn accepts(&self, sigma: f64) -> bool {
        match self.config.acceptance_bound {
            Some(bound) => sigma < bound,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn series_from(phases: Vec<f64>) -> PhaseSeries {
        let times = (0..phases.len()).map(|i| i as f64).collect();
        PhaseSeries::new(times, phases).unwrap()
    }

    fn linear_with_slip(n: usize, slip_at: usize, offset: f64) -> PhaseSeries {
        let mut phases: Vec<f64> = (0..n).map(|i| 2.0 * i as f64).collect();
        phases[slip_at] += offset;
        series_from(phases)
    }

    #[test]
    fn test_smooth_quartic_has_no_jumps() {
        let phases = (0..30)
            .map(|i| {
                let t = i as f64;
                1e-3 * t.powi(4) - 0.02 * t.powi(3) + 0.5 * t * t - 3.0 * t + 100.0
            })
            .collect();
        let mut fitter = WindowedFitter::new(6, 4, 1.0).unwrap();
        let pass = fitter.run(&series_from(phases)).unwrap();

        assert!(pass.jumps.is_empty());
        assert_eq!(pass.outcomes.len(), 24);
        assert_eq!(pass.predicted_count(), 24);
    }

    #[test]
    fn test_single_slip_flagged_once() {
        let series = linear_with_slip(20, 10, 5.0);
        let mut fitter = WindowedFitter::new(6, 4, 1.0).unwrap();
        let pass = fitter.run(&series).unwrap();

        assert_eq!(pass.jumps.len(), 1);
        let jump = pass.jumps[0];
        assert_eq!(jump.index, 10);
        assert_eq!(jump.time, 10.0);
        assert_eq!(jump.observed, 25.0);
        assert_abs_diff_eq!(jump.expected.unwrap(), 20.0, epsilon = 1e-6);
        assert_abs_diff_eq!(jump.discrepancy, 5.0, epsilon = 1e-6);
        assert!(jump.is_prediction());

        // Every window containing the slip fits badly and is skipped
        let skipped: Vec<usize> = pass
            .outcomes
            .iter()
            .filter(|o| matches!(o, WindowOutcome::Skipped { .. }))
            .map(WindowOutcome::start)
            .collect();
        assert_eq!(skipped, vec![5, 6, 7, 8, 9, 10]);
        assert_eq!(pass.predicted_count(), 8);
    }

    #[test]
    fn test_ungated_windows_predict_through_slip() {
        let series = linear_with_slip(20, 10, 5.0);
        let config = DetectorConfig::default().with_acceptance_bound(None);
        let mut fitter = WindowedFitter::with_config(config).unwrap();
        let jumps = fitter.detect(&series).unwrap();

        assert_eq!(jumps[0].index, 10);
        assert!(jumps.len() > 1);
        assert!(jumps.windows(2).all(|w| w[0].index < w[1].index));
    }

    #[test]
    fn test_sub_threshold_slip_ignored() {
        let series = linear_with_slip(20, 10, 0.5);
        let mut fitter = WindowedFitter::new(6, 4, 1.0).unwrap();
        assert!(fitter.detect(&series).unwrap().is_empty());
    }

    #[test]
    fn test_short_series() {
        let series = series_from(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let mut fitter = WindowedFitter::new(6, 4, 1.0).unwrap();
        assert_eq!(fitter.run(&series).unwrap(), FitterPass::default());

        let config = DetectorConfig::default().with_require_attempt(true);
        let mut strict = WindowedFitter::with_config(config).unwrap();
        assert_eq!(
            strict.run(&series),
            Err(CycleSlipError::InsufficientData(6, 7))
        );
    }

    fn series_with_stalled_clock() -> PhaseSeries {
        // Timestamps stop advancing at index 8; the slip at 7 is seen first
        let times: Vec<f64> = (0..14).map(|i| (i as f64).min(8.0)).collect();
        let mut phases: Vec<f64> = (0..14).map(|i| 2.0 * i as f64).collect();
        phases[7] += 5.0;
        PhaseSeries::new(times, phases).unwrap()
    }

    #[test]
    fn test_degenerate_window_aborts() {
        let mut fitter = WindowedFitter::new(6, 4, 1.0).unwrap();
        assert!(matches!(
            fitter.run(&series_with_stalled_clock()),
            Err(CycleSlipError::Numerical(_))
        ));
    }

    #[test]
    fn test_degenerate_window_skipped_keeps_prior_jumps() {
        let config = DetectorConfig::default().with_fit_error_policy(FitErrorPolicy::Skip);
        let mut fitter = WindowedFitter::with_config(config).unwrap();
        let pass = fitter.run(&series_with_stalled_clock()).unwrap();

        assert_eq!(pass.outcomes.len(), 8);
        assert_eq!(pass.jumps[0].index, 7);
        assert_eq!(pass.failed_count(), 3);
        assert!(pass
            .outcomes
            .iter()
            .filter(|o| matches!(o, WindowOutcome::Failed { .. }))
            .all(|o| o.start() >= 5));
    }

    #[test]
    fn test_ignores_difference_settings() {
        let config = DetectorConfig::default().with_max_order(1);
        assert!(WindowedFitter::with_config(config).is_ok());
        assert!(WindowedFitter::with_config(DetectorConfig::default().with_degree(usize::MAX)).is_err());
    }

    #[test]
    fn test_repeated_runs_are_identical() {
        let series = linear_with_slip(40, 22, -3.0);
        let mut fitter = WindowedFitter::new(6, 4, 1.0).unwrap();
        let first = fitter.run(&series).unwrap();
        let second = fitter.run(&series).unwrap();
        let fresh = WindowedFitter::new(6, 4, 1.0).unwrap().run(&series).unwrap();

        assert_eq!(first, second);
        assert_eq!(first, fresh);
    }
}
