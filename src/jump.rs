/// Which detector produced a [`JumpRecord`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JumpSource {
    /// One-step-ahead prediction from the windowed polynomial fitter
    Prediction {
        /// Goodness-of-fit of the window the prediction came from
        sigma: f64,
    },
    /// Threshold crossing in a difference series
    Difference {
        /// Difference order that crossed the threshold
        order: usize,
        /// Value of that order's difference at the flagged position
        value: f64,
    },
}

/// A flagged cycle slip.
///
/// For predictions `expected` is the fitted polynomial's value at `time` and
/// `discrepancy` is `observed - expected`. Difference detections have no
/// expected phase; their discrepancy is the first difference at the flagged
/// position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JumpRecord {
    /// Index into the original series
    pub index: usize,
    pub time: f64,
    /// Phase as measured
    pub observed: f64,
    /// Phase the fitter predicted, `None` for difference detections
    pub expected: Option<f64>,
    pub discrepancy: f64,
    pub source: JumpSource,
}

impl JumpRecord {
    /// Absolute discrepancy
    pub fn magnitude(&self) -> f64 {
        self.discrepancy.abs()
    }

    /// Difference order for difference detections, `None` for predictions
    pub fn order(&self) -> Option<usize> {
        match self.source {
            JumpSource::Prediction { .. } => None,
            JumpSource::Difference { order, .. } => Some(order),
        }
    }

    pub fn is_prediction(&self) -> bool {
        matches!(self.source, JumpSource::Prediction { .. })
    }
}
