use std::collections::HashMap;
use std::fmt;

use nalgebra::{DMatrix, DVector};

use crate::error::{CycleSlipError, Result};

/// Projections kept by a [`FitCache`] before it starts over.
pub const FIT_CACHE_CAPACITY: usize = 64;

/// Smallest accepted ratio between the smallest and largest LU pivot of the
/// normal matrix before the fit is rejected as ill-conditioned.
const MIN_PIVOT_RATIO: f64 = 1e-13;

/// Fits a polynomial of degree `degree` to the points `(x[i], y[i])` by ordinary
/// least squares.
///
/// The normal equations are formed on abscissae scaled into `[-1, 1]` and the
/// solution is unscaled afterwards, so the returned coefficients refer to the
/// caller's units: `y ≈ c[0] + c[1] x + ... + c[d] x^d`.
///
/// # Arguments
///
/// * `x` - Abscissae (e.g. sample times relative to a local origin)
/// * `y` - Ordinates, same length as `x`
/// * `degree` - Polynomial degree; `degree + 1` must not exceed the number of points
///
/// # Errors
///
/// * `InvalidInput` if the slices differ in length or contain non-finite values
/// * `InsufficientData` if there are fewer than `degree + 1` points
/// * `Numerical` if the abscissae cannot determine the polynomial (duplicate
///   timestamps, singular or ill-conditioned normal matrix)
///
/// # Example
///
/// ```rust
/// use cycle_slip::fit_polynomial;
///
/// let x = [0.0, 1.0, 2.0, 3.0];
/// let y = [1.0, 3.0, 5.0, 7.0];
/// let coeffs = fit_polynomial(&x, &y, 1).expect("well-posed fit");
/// assert!((coeffs[0] - 1.0).abs() < 1e-9);
/// assert!((coeffs[1] - 2.0).abs() < 1e-9);
/// ```
pub fn fit_polynomial(x: &[f64], y: &[f64], degree: usize) -> Result<Vec<f64>> {
    check_points(x, y)?;
    let projection = projection_matrix(x, degree)?;
    Ok(apply_projection(&projection, y))
}

/// Evaluates `c[0] + c[1] x + ... + c[d] x^d` with Horner's scheme.
pub fn evaluate_polynomial(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}

fn check_points(x: &[f64], y: &[f64]) -> Result<()> {
    if x.len() != y.len() {
        return Err(CycleSlipError::InvalidInput(format!(
            "abscissae and ordinates differ in length ({} vs {})",
            x.len(),
            y.len()
        )));
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(CycleSlipError::InvalidInput(
            "fit points must be finite".to_string(),
        ));
    }
    Ok(())
}

/// Builds the `(degree + 1) x L` matrix `P` with `coefficients = P * y`.
fn projection_matrix(x: &[f64], degree: usize) -> Result<DMatrix<f64>> {
    let num_points = x.len();
    let num_coeffs = degree.saturating_add(1);

    if num_coeffs > num_points {
        return Err(CycleSlipError::InsufficientData(num_points, num_coeffs));
    }

    let distinct = count_distinct(x);
    if distinct < num_coeffs {
        return Err(CycleSlipError::Numerical(format!(
            "{} distinct abscissae cannot determine a degree {} polynomial",
            distinct, degree
        )));
    }

    let max_abs = x.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let scale = if max_abs > 0.0 { max_abs } else { 1.0 };

    // Vandermonde matrix: one row per point, one column per power
    let mut vandermonde = DMatrix::<f64>::zeros(num_points, num_coeffs);
    for (i, &xi) in x.iter().enumerate() {
        let u = xi / scale;
        for j in 0..num_coeffs {
            vandermonde[(i, j)] = u.powi(j as i32);
        }
    }

    // Normal equations: (V^T V) P = V^T
    let vt = vandermonde.transpose();
    let ata = &vt * &vandermonde;
    let lu = ata.lu();

    let pivots = lu.u().diagonal();
    let max_pivot = pivots.iter().fold(0.0_f64, |acc, p| acc.max(p.abs()));
    let min_pivot = pivots.iter().fold(f64::INFINITY, |acc, p| acc.min(p.abs()));
    if max_pivot == 0.0 || min_pivot / max_pivot < MIN_PIVOT_RATIO {
        return Err(CycleSlipError::Numerical(
            "normal matrix is singular or ill-conditioned".to_string(),
        ));
    }

    let mut projection = lu.solve(&vt).ok_or_else(|| {
        CycleSlipError::Numerical("Failed to solve least squares system".to_string())
    })?;

    // Undo the abscissa scaling: c_j = c'_j / scale^j
    for j in 0..num_coeffs {
        let factor = scale.powi(j as i32);
        for i in 0..num_points {
            projection[(j, i)] /= factor;
        }
    }

    if projection.iter().any(|v| !v.is_finite()) {
        return Err(CycleSlipError::Numerical(
            "least squares solution is not finite".to_string(),
        ));
    }

    Ok(projection)
}

fn apply_projection(projection: &DMatrix<f64>, y: &[f64]) -> Vec<f64> {
    let rhs = DVector::from_column_slice(y);
    (projection * rhs).iter().copied().collect()
}

fn count_distinct(x: &[f64]) -> usize {
    let mut sorted = x.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted.dedup();
    sorted.len()
}

/// Memoised least squares projections keyed by the exact abscissae and degree.
///
/// Uniformly sampled series present the same local abscissae to every window,
/// so after the first window each fit reduces to one matrix-vector product.
/// Jittered timestamps give every window a new key, so the cache is cleared
/// once it holds [`FIT_CACHE_CAPACITY`] entries.
#[derive(Default)]
pub struct FitCache {
    projections: HashMap<(Vec<u64>, usize), DMatrix<f64>, ahash::RandomState>,
}

impl FitCache {
    /// Creates an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Same contract as [`fit_polynomial`], reusing a cached projection when
    /// the abscissae have been seen before.
    pub fn fit(&mut self, x: &[f64], y: &[f64], degree: usize) -> Result<Vec<f64>> {
        check_points(x, y)?;

        let key = (x.iter().map(|v| v.to_bits()).collect::<Vec<_>>(), degree);
        if let Some(projection) = self.projections.get(&key) {
            return Ok(apply_projection(projection, y));
        }

        let projection = projection_matrix(x, degree)?;
        let coeffs = apply_projection(&projection, y);
        if self.projections.len() >= FIT_CACHE_CAPACITY {
            self.projections.clear();
        }
        self.projections.insert(key, projection);
        Ok(coeffs)
    }

    /// Number of cached projections
    pub fn len(&self) -> usize {
        self.projections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projections.is_empty()
    }

    pub fn clear(&mut self) {
        self.projections.clear();
    }
}

impl fmt::Debug for FitCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FitCache")
            .field("entries", &self.projections.len())
            .finish()
    }
}

/// A polynomial fitted against a local time origin.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedModel {
    origin: f64,
    coefficients: Vec<f64>,
}

impl FittedModel {
    /// Fits `values` over `times`, using `times[0]` as the local origin.
    pub fn fit(times: &[f64], values: &[f64], degree: usize) -> Result<Self> {
        let origin = times.first().copied().unwrap_or(0.0);
        let local = local_abscissae(times, origin);
        let coefficients = fit_polynomial(&local, values, degree)?;
        Ok(Self { origin, coefficients })
    }

    /// Like [`FittedModel::fit`], going through a [`FitCache`].
    pub fn fit_cached(
        cache: &mut FitCache,
        times: &[f64],
        values: &[f64],
        degree: usize,
    ) -> Result<Self> {
        let origin = times.first().copied().unwrap_or(0.0);
        let local = local_abscissae(times, origin);
        let coefficients = cache.fit(&local, values, degree)?;
        Ok(Self { origin, coefficients })
    }

    /// Evaluates the model at absolute time `time`
    pub fn evaluate(&self, time: f64) -> f64 {
        evaluate_polynomial(&self.coefficients, time - self.origin)
    }

    /// Coefficients in ascending powers of `time - origin`
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn origin(&self) -> f64 {
        self.origin
    }

    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    /// Residuals (fitted − observed) of this model over the given samples.
    pub fn residuals(&self, times: &[f64], observed: &[f64]) -> Result<ResidualSet> {
        check_points(times, observed)?;
        let residuals = times
            .iter()
            .zip(observed)
            .map(|(&t, &y)| self.evaluate(t) - y)
            .collect();
        ResidualSet::new(residuals, self.degree())
    }
}

fn local_abscissae(times: &[f64], origin: f64) -> Vec<f64> {
    times.iter().map(|t| t - origin).collect()
}

/// Residuals of one local fit and the derived goodness-of-fit statistic.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidualSet {
    residuals: Vec<f64>,
    sigma: f64,
}

impl ResidualSet {
    /// Builds the set from fitted − observed values of a degree `degree` fit.
    ///
    /// `sigma = sqrt(Σ r² / (m − degree − 1))`; at least one residual degree of
    /// freedom is required.
    pub fn new(residuals: Vec<f64>, degree: usize) -> Result<Self> {
        let m = residuals.len();
        let needed = degree.saturating_add(2);
        if m < needed {
            return Err(CycleSlipError::InsufficientData(m, needed));
        }
        let dof = (m - degree - 1) as f64;
        let sum_sq: f64 = residuals.iter().map(|r| r * r).sum();
        Ok(Self {
            residuals,
            sigma: (sum_sq / dof).sqrt(),
        })
    }

    pub fn residuals(&self) -> &[f64] {
        &self.residuals
    }

    /// Root mean square residual normalised by the degrees of freedom
    pub fn sigma(&self) -> f64 {
        self.sigma
    }
}
