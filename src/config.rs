use std::collections::BTreeMap;
use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CycleSlipError, Result};

/// What the windowed fitter does when a window cannot be fitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitErrorPolicy {
    /// Return the numerical error to the caller immediately
    Abort,
    /// Record the window as failed, keep earlier jumps and advance by one sample
    Skip,
}

/// Parameters shared by the windowed fitter and the difference detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Samples per local fit (m)
    pub window_size: usize,
    /// Degree of the local polynomial (d)
    pub degree: usize,
    /// Discrepancy magnitude that flags a cycle slip
    pub threshold: f64,
    /// Highest difference order computed by the difference detector
    pub max_order: usize,
    /// Windows whose sigma reaches this bound are not trusted to predict.
    /// `None` lets every window predict.
    pub acceptance_bound: Option<f64>,
    /// Per-order threshold overrides for the difference detector
    pub order_thresholds: BTreeMap<usize, f64>,
    /// Report each index at most once across difference orders
    pub deduplicate: bool,
    pub fit_error_policy: FitErrorPolicy,
    /// Fail with `InsufficientData` instead of returning no jumps when the
    /// series is too short for a single window or difference pass
    pub require_attempt: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_size: 6,
            degree: 4,
            threshold: 1.0,
            max_order: 4,
            acceptance_bound: Some(0.1),
            order_thresholds: BTreeMap::new(),
            deduplicate: false,
            fit_error_policy: FitErrorPolicy::Abort,
            require_attempt: false,
        }
    }
}

impl DetectorConfig {
    /// Creates a validated configuration with the remaining fields at their defaults
    pub fn new(window_size: usize, degree: usize, threshold: f64) -> Result<Self> {
        let config = Self {
            window_size,
            degree,
            threshold,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON configuration file; missing fields take their defaults.
    ///
    /// Values are checked by the detector that consumes them, so a file tuned
    /// for one detector may leave the other's fields out of range.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> std::result::Result<Self, Box<dyn Error>> {
        let file = File::open(path)?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        check_threshold("threshold", config.threshold)?;
        Ok(config)
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn with_degree(mut self, degree: usize) -> Self {
        self.degree = degree;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_max_order(mut self, max_order: usize) -> Self {
        self.max_order = max_order;
        self
    }

    pub fn with_acceptance_bound(mut self, bound: Option<f64>) -> Self {
        self.acceptance_bound = bound;
        self
    }

    /// Overrides the threshold used for one difference order
    pub fn with_order_threshold(mut self, order: usize, threshold: f64) -> Self {
        self.order_thresholds.insert(order, threshold);
        self
    }

    pub fn with_deduplicate(mut self, deduplicate: bool) -> Self {
        self.deduplicate = deduplicate;
        self
    }

    pub fn with_fit_error_policy(mut self, policy: FitErrorPolicy) -> Self {
        self.fit_error_policy = policy;
        self
    }

    pub fn with_require_attempt(mut self, require: bool) -> Self {
        self.require_attempt = require;
        self
    }

    /// Threshold applied to difference series of the given order
    pub fn threshold_for_order(&self, order: usize) -> f64 {
        self.order_thresholds
            .get(&order)
            .copied()
            .unwrap_or(self.threshold)
    }

    /// Samples needed before the windowed fitter can make one prediction
    pub fn min_fit_samples(&self) -> usize {
        self.window_size.saturating_add(1)
    }

    /// Samples needed before the highest difference order has an entry
    pub fn min_difference_samples(&self) -> usize {
        self.max_order.saturating_add(1)
    }

    /// Checks every field, as needed by [`detect_and_repair`](crate::detect_and_repair).
    pub fn validate(&self) -> Result<()> {
        self.validate_fit()?;
        self.validate_difference()
    }

    /// Checks the fields read by the windowed fitter
    pub fn validate_fit(&self) -> Result<()> {
        check_threshold("threshold", self.threshold)?;

        if self.degree >= self.window_size.saturating_sub(1) {
            return Err(CycleSlipError::InvalidConfiguration(format!(
                "window size {} leaves no residual degrees of freedom for degree {} (need at least {})",
                self.window_size,
                self.degree,
                self.degree.saturating_add(2)
            )));
        }

        if let Some(bound) = self.acceptance_bound {
            check_threshold("acceptance bound", bound)?;
        }

        Ok(())
    }

    /// Checks the fields read by the difference detector
    pub fn validate_difference(&self) -> Result<()> {
        check_threshold("threshold", self.threshold)?;

        if self.max_order < 2 {
            return Err(CycleSlipError::InvalidConfiguration(format!(
                "max order {} is below 2; first differences are never thresholded",
                self.max_order
            )));
        }

        for (&order, &threshold) in &self.order_thresholds {
            if order < 2 || order > self.max_order {
                return Err(CycleSlipError::InvalidConfiguration(format!(
                    "threshold given for order {}, outside 2..={}",
                    order, self.max_order
                )));
            }
            check_threshold(&format!("order {} threshold", order), threshold)?;
        }

        Ok(())
    }
}

fn check_threshold(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(CycleSlipError::InvalidConfiguration(format!(
            "{} must be a positive finite number, got {}",
            name, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = DetectorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.window_size, 6);
        assert_eq!(config.degree, 4);
        assert_eq!(config.max_order, 4);
        assert_eq!(config.acceptance_bound, Some(0.1));
        assert_eq!(config.min_fit_samples(), 7);
        assert_eq!(config.min_difference_samples(), 5);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(DetectorConfig::new(6, 4, 0.0).is_err());
        assert!(DetectorConfig::new(6, 4, -1.0).is_err());
        assert!(DetectorConfig::new(6, 4, f64::NAN).is_err());
        assert!(DetectorConfig::new(5, 4, 1.0).is_err()); // degree >= window - 1
        assert!(DetectorConfig::new(6, 4, 1.0).is_ok());

        let config = DetectorConfig::default().with_max_order(1);
        assert!(matches!(
            config.validate(),
            Err(CycleSlipError::InvalidConfiguration(_))
        ));

        let config = DetectorConfig::default().with_acceptance_bound(Some(0.0));
        assert!(config.validate().is_err());
        let config = DetectorConfig::default().with_acceptance_bound(None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_order_thresholds() {
        let config = DetectorConfig::default()
            .with_threshold(2.0)
            .with_order_threshold(4, 8.0);
        assert!(config.validate().is_ok());
        assert_eq!(config.threshold_for_order(2), 2.0);
        assert_eq!(config.threshold_for_order(4), 8.0);

        assert!(DetectorConfig::default().with_order_threshold(1, 1.0).validate().is_err());
        assert!(DetectorConfig::default().with_order_threshold(5, 1.0).validate().is_err());
        assert!(DetectorConfig::default().with_order_threshold(3, -1.0).validate().is_err());
    }

    #[test]
    fn test_json_partial_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"threshold": 2.8, "order_thresholds": {{"3": 4.0}}, "fit_error_policy": "skip"}}"#
        )
        .unwrap();

        let config = DetectorConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.threshold, 2.8);
        assert_eq!(config.window_size, 6);
        assert_eq!(config.threshold_for_order(3), 4.0);
        assert_eq!(config.fit_error_policy, FitErrorPolicy::Skip);
    }

    #[test]
    fn test_json_rejects_invalid_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"threshold": -2.0}}"#).unwrap();
        assert!(DetectorConfig::from_json_file(file.path()).is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"window_size": 3}}"#).unwrap();
        let config = DetectorConfig::from_json_file(file.path()).unwrap();
        assert!(config.validate_fit().is_err());
        assert!(config.validate_difference().is_ok());
    }

    #[test]
    fn test_huge_sizes_rejected_without_overflow() {
        let config = DetectorConfig::default().with_degree(usize::MAX);
        assert!(matches!(
            config.validate_fit(),
            Err(CycleSlipError::InvalidConfiguration(_))
        ));

        let config = DetectorConfig::default()
            .with_window_size(usize::MAX)
            .with_degree(usize::MAX);
        assert!(config.validate_fit().is_err());

        let config = DetectorConfig::default()
            .with_window_size(usize::MAX)
            .with_max_order(usize::MAX);
        assert!(config.validate().is_ok());
        assert_eq!(config.min_fit_samples(), usize::MAX);
        assert_eq!(config.min_difference_samples(), usize::MAX);
    }

    #[test]
    fn test_detector_specific_validation() {
        let config = DetectorConfig::default().with_window_size(4);
        assert!(config.validate_fit().is_err());
        assert!(config.validate_difference().is_ok());
        assert!(config.validate().is_err());

        let config = DetectorConfig::default().with_max_order(1);
        assert!(config.validate_fit().is_ok());
        assert!(config.validate_difference().is_err());
    }
}
