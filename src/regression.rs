//! Feature-vector to screen-point estimators.
//!
//! Three interchangeable models share one training set:
//! - [`RidgeModel`]: closed-form regularized least squares over the full vector.
//! - [`TpsModel`]: thin-plate smoothing spline over the 4-d pupil-offset subspace.
//! - [`HybridModel`]: ridge plus an inverse-distance kNN residual correction,
//!   optionally carrying a TPS sub-model.
//!
//! [`RegressionEngine`] owns the trained models and applies the downgrade
//! chain `TPS -> HYBRID -> RIDGE -> (0,0)` at prediction time.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::RegressionError;
use crate::features::{self, REDUCED_DIM};
use crate::matrix::Matrix;
use crate::types::{FeatureVector, Point2D};

pub const RIDGE_LAMBDA: f64 = 0.001;
pub const TPS_LAMBDA: f64 = 0.5;
pub const KNN_K: usize = 4;
pub const KNN_EPSILON: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegressionMethod {
    Ridge,
    #[default]
    Hybrid,
    Tps,
}

impl RegressionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ridge => "ridge",
            Self::Hybrid => "hybrid",
            Self::Tps => "tps",
        }
    }
}

fn targets_matrix(outputs: &[Point2D]) -> Matrix {
    let mut y = Matrix::zeros(outputs.len(), 2);
    for (i, p) in outputs.iter().enumerate() {
        y[(i, 0)] = p.x;
        y[(i, 1)] = p.y;
    }
    y
}

fn check_pairs(inputs: &[FeatureVector], outputs: &[Point2D]) -> Result<usize, RegressionError> {
    if inputs.is_empty() {
        return Err(RegressionError::Empty);
    }
    if inputs.len() != outputs.len() {
        return Err(RegressionError::DimensionMismatch { expected: inputs.len(), got: outputs.len() });
    }
    let dim = inputs[0].len();
    if let Some(bad) = inputs.iter().find(|f| f.len() != dim) {
        return Err(RegressionError::DimensionMismatch { expected: dim, got: bad.len() });
    }
    Ok(dim)
}

// =========================================================================
// Ridge
// =========================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct RidgeModel {
    /// F x 2
    weights: Matrix,
}

impl RidgeModel {
    /// Solves `(XtX + lambda*I) W = XtY` by explicit inversion.
    pub fn fit(inputs: &[FeatureVector], outputs: &[Point2D], lambda: f64) -> Result<Self, RegressionError> {
        check_pairs(inputs, outputs)?;
        let x = Matrix::from_rows(&inputs.iter().map(|f| f.as_slice()).collect::<Vec<_>>())?;
        let y = targets_matrix(outputs);

        let xt = x.transpose();
        let mut xtx = xt.mul(&x)?;
        xtx.add_diagonal(lambda);
        let inv = xtx.inverse()?;
        let weights = inv.mul(&xt.mul(&y)?)?;

        if !weights.is_finite() {
            return Err(RegressionError::SingularMatrix);
        }
        Ok(Self { weights })
    }

    pub fn dim(&self) -> usize {
        self.weights.rows()
    }

    pub fn predict(&self, input: &FeatureVector) -> Point2D {
        if input.len() != self.dim() {
            return Point2D::ZERO;
        }
        let mut out = Point2D::ZERO;
        for (i, v) in input.as_slice().iter().enumerate() {
            out.x += v * self.weights[(i, 0)];
            out.y += v * self.weights[(i, 1)];
        }
        out
    }
}

// =========================================================================
// Thin-plate spline
// =========================================================================

fn tps_kernel(r: f64) -> f64 {
    if r > 0.0 {
        r * r * r.ln()
    } else {
        0.0
    }
}

fn reduced_distance(a: &[f64; REDUCED_DIM], b: &[f64; REDUCED_DIM]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f64>().sqrt()
}

#[derive(Debug, Clone, PartialEq)]
pub struct TpsModel {
    /// Full feature length seen in training.
    dim: usize,
    /// N x D control points in the reduced subspace.
    control_points: Vec<[f64; REDUCED_DIM]>,
    /// (N + D + 1) x 2: radial weights followed by the affine part.
    weights: Matrix,
}

impl TpsModel {
    pub const MIN_POINTS: usize = REDUCED_DIM + 1;

    /// Builds and inverts `[[K + lambda*I, P], [Pt, 0]]`.
    pub fn fit(inputs: &[FeatureVector], outputs: &[Point2D]) -> Result<Self, RegressionError> {
        let dim = check_pairs(inputs, outputs)?;
        let n = inputs.len();
        if n < Self::MIN_POINTS {
            return Err(RegressionError::InsufficientSamples { needed: Self::MIN_POINTS, got: n });
        }

        let control_points = inputs
            .iter()
            .map(|f| {
                features::reduce(f).ok_or(RegressionError::DimensionMismatch {
                    expected: REDUCED_DIM + 1,
                    got: f.len(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let size = n + REDUCED_DIM + 1;
        let mut l = Matrix::zeros(size, size);
        for i in 0..n {
            for j in 0..n {
                l[(i, j)] = tps_kernel(reduced_distance(&control_points[i], &control_points[j]));
            }
            l[(i, i)] += TPS_LAMBDA;

            // P block and its transpose
            l[(i, n)] = 1.0;
            l[(n, i)] = 1.0;
            for d in 0..REDUCED_DIM {
                l[(i, n + 1 + d)] = control_points[i][d];
                l[(n + 1 + d, i)] = control_points[i][d];
            }
        }

        let mut rhs = Matrix::zeros(size, 2);
        for (i, p) in outputs.iter().enumerate() {
            rhs[(i, 0)] = p.x;
            rhs[(i, 1)] = p.y;
        }

        let weights = l.inverse()?.mul(&rhs)?;
        if !weights.is_finite() {
            return Err(RegressionError::SingularMatrix);
        }
        Ok(Self { dim, control_points, weights })
    }

    pub fn weights(&self) -> &Matrix {
        &self.weights
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// `(0, 0)` when `input` does not match the training feature length.
    pub fn predict(&self, input: &FeatureVector) -> Point2D {
        if input.len() != self.dim {
            return Point2D::ZERO;
        }
        let Some(q) = features::reduce(input) else {
            return Point2D::ZERO;
        };
        let n = self.control_points.len();
        let w = &self.weights;

        let mut out = Point2D::new(w[(n, 0)], w[(n, 1)]);
        for d in 0..REDUCED_DIM {
            out.x += w[(n + 1 + d, 0)] * q[d];
            out.y += w[(n + 1 + d, 1)] * q[d];
        }
        for (i, c) in self.control_points.iter().enumerate() {
            let phi = tps_kernel(reduced_distance(&q, c));
            out.x += w[(i, 0)] * phi;
            out.y += w[(i, 1)] * phi;
        }
        out
    }
}

// =========================================================================
// Hybrid (ridge + kNN residuals, optional TPS)
// =========================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Residual {
    pub input: FeatureVector,
    pub error: Point2D,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HybridModel {
    ridge: RidgeModel,
    residuals: Vec<Residual>,
    tps: Option<TpsModel>,
}

impl HybridModel {
    /// Ridge failure is an error; TPS failure only leaves `tps` empty.
    pub fn fit(inputs: &[FeatureVector], outputs: &[Point2D]) -> Result<Self, RegressionError> {
        let ridge = RidgeModel::fit(inputs, outputs, RIDGE_LAMBDA)?;

        let residuals = inputs
            .iter()
            .zip(outputs)
            .map(|(input, actual)| Residual {
                input: input.clone(),
                error: *actual - ridge.predict(input),
            })
            .collect();

        let tps = match TpsModel::fit(inputs, outputs) {
            Ok(model) => Some(model),
            Err(e) => {
                warn!("TPS training failed ({}), hybrid continues with ridge + kNN", e);
                None
            }
        };

        Ok(Self { ridge, residuals, tps })
    }

    pub fn ridge(&self) -> &RidgeModel {
        &self.ridge
    }

    pub fn tps(&self) -> Option<&TpsModel> {
        self.tps.as_ref()
    }

    pub fn residuals(&self) -> &[Residual] {
        &self.residuals
    }

    pub fn predict(&self, input: &FeatureVector) -> Point2D {
        let global = self.ridge.predict(input);
        if self.residuals.is_empty() || input.len() != self.ridge.dim() {
            return global;
        }

        let mut neighbours: Vec<(f64, Point2D)> = self
            .residuals
            .iter()
            .map(|r| (input.distance(&r.input), r.error))
            .collect();
        neighbours.sort_by(|a, b| a.0.total_cmp(&b.0));
        neighbours.truncate(KNN_K);

        let mut weight_sum = 0.0;
        let mut correction = Point2D::ZERO;
        for (dist, err) in &neighbours {
            let w = 1.0 / (dist + KNN_EPSILON);
            correction.x += w * err.x;
            correction.y += w * err.y;
            weight_sum += w;
        }

        Point2D::new(global.x + correction.x / weight_sum, global.y + correction.y / weight_sum)
    }
}

// =========================================================================
// Model selection
// =========================================================================

/// The estimator actually answering a prediction request.
#[derive(Debug, Clone, Copy)]
pub enum RegressionModel<'a> {
    Ridge(&'a RidgeModel),
    Tps(&'a TpsModel),
    Hybrid(&'a HybridModel),
}

impl RegressionModel<'_> {
    pub fn method(&self) -> RegressionMethod {
        match self {
            Self::Ridge(_) => RegressionMethod::Ridge,
            Self::Tps(_) => RegressionMethod::Tps,
            Self::Hybrid(_) => RegressionMethod::Hybrid,
        }
    }

    pub fn predict(&self, input: &FeatureVector) -> Point2D {
        match self {
            Self::Ridge(m) => m.predict(input),
            Self::Tps(m) => m.predict(input),
            Self::Hybrid(m) => m.predict(input),
        }
    }
}

/// Owns one trained model set. Retraining always replaces it wholesale.
#[derive(Debug, Clone, Default)]
pub struct RegressionEngine {
    model: Option<HybridModel>,
}

impl RegressionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trains ridge, residuals and (best effort) TPS on the full set.
    pub fn train(inputs: &[FeatureVector], outputs: &[Point2D]) -> Result<Self, RegressionError> {
        let model = HybridModel::fit(inputs, outputs)?;
        debug!(
            "Regression trained on {} samples (tps: {})",
            inputs.len(),
            model.tps.is_some()
        );
        Ok(Self { model: Some(model) })
    }

    pub fn is_ready(&self) -> bool {
        self.model.is_some()
    }

    pub fn model(&self) -> Option<&HybridModel> {
        self.model.as_ref()
    }

    pub fn is_tps_ready(&self) -> bool {
        self.model.as_ref().is_some_and(|m| m.tps.is_some())
    }

    pub fn is_hybrid_ready(&self) -> bool {
        self.model.as_ref().is_some_and(|m| !m.residuals.is_empty())
    }

    /// Resolves `requested` through the downgrade chain.
    pub fn select(&self, requested: RegressionMethod) -> Option<RegressionModel<'_>> {
        let model = self.model.as_ref()?;
        let mut method = requested;
        loop {
            match method {
                RegressionMethod::Tps => match &model.tps {
                    Some(tps) => return Some(RegressionModel::Tps(tps)),
                    None => method = RegressionMethod::Hybrid,
                },
                RegressionMethod::Hybrid => {
                    if model.residuals.is_empty() {
                        method = RegressionMethod::Ridge;
                    } else {
                        return Some(RegressionModel::Hybrid(model));
                    }
                }
                RegressionMethod::Ridge => return Some(RegressionModel::Ridge(&model.ridge)),
            }
        }
    }

    /// Never fails: an untrained engine answers `(0, 0)`.
    pub fn predict(&self, input: &FeatureVector, method: RegressionMethod) -> Point2D {
        match self.select(method) {
            Some(model) => model.predict(input),
            None => Point2D::ZERO,
        }
    }
}
