//! Batch regressors used behind [`AdaptivePredictor`](super::predictor::AdaptivePredictor).

use nalgebra::{DMatrix, DVector};

use crate::error::FitError;
use crate::models::predictor::Fittable;

const MAX_NEWTON_ITERATIONS: usize = 100;
const NEWTON_TOLERANCE: f64 = 1e-8;

fn check_shape(features: &DMatrix<f64>, labels: &DVector<f64>) -> Result<(), FitError> {
    if features.nrows() == 0 {
        return Err(FitError::Empty);
    }
    if features.nrows() != labels.len() {
        return Err(FitError::ShapeMismatch { rows: features.nrows(), labels: labels.len() });
    }
    if features.iter().chain(labels.iter()).any(|v| !v.is_finite()) {
        return Err(FitError::NonFinite);
    }
    Ok(())
}

fn column_means(features: &DMatrix<f64>) -> Vec<f64> {
    (0..features.ncols()).map(|j| features.column(j).mean()).collect()
}

/// Ordinary least squares with an intercept.
///
/// Solved on centred data through the SVD pseudo-inverse, so constant or
/// collinear features get zero weight instead of failing the fit.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearRegression {
    coefficients: Vec<f64>,
    intercept: f64,
}

impl LinearRegression {
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

impl Fittable for LinearRegression {
    fn fit(features: &DMatrix<f64>, labels: &DVector<f64>) -> Result<Self, FitError> {
        check_shape(features, labels)?;
        let (rows, cols) = features.shape();

        let x_means = column_means(features);
        let y_mean = labels.mean();
        let centred = DMatrix::from_fn(rows, cols, |i, j| features[(i, j)] - x_means[j]);
        let y_centred = labels.map(|y| y - y_mean);

        let svd = centred.svd(true, true);
        // Same cut-off numpy's lstsq uses for rank detection
        let tolerance = svd.singular_values.max() * f64::EPSILON * rows.max(cols) as f64;
        let weights = svd
            .solve(&y_centred, tolerance)
            .map_err(|e| FitError::Singular(e.to_string()))?;

        let coefficients: Vec<f64> = weights.iter().copied().collect();
        let intercept = y_mean - coefficients.iter().zip(&x_means).map(|(w, m)| w * m).sum::<f64>();
        Ok(Self { coefficients, intercept })
    }

    fn predict(&self, features: &[f64]) -> f64 {
        self.intercept + self.coefficients.iter().zip(features).map(|(w, x)| w * x).sum::<f64>()
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

// log(1 + e^z) without overflow
fn softplus(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

/// Binary logistic regression with an L2 penalty (`C = 1`) on the feature
/// weights, fitted by damped Newton iterations on standardised features.
///
/// Labels are read as `label > 0.5`. `predict` returns P(label = 1).
#[derive(Debug, Clone, PartialEq)]
pub struct LogisticRegression {
    means: Vec<f64>,
    scales: Vec<f64>,
    // [intercept, w_1, .., w_n] in standardised space
    weights: Vec<f64>,
}

impl LogisticRegression {
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    // One class only: nothing to separate, predict the smoothed class frequency
    fn intercept_only(cols: usize, probability: f64) -> Self {
        let mut weights = vec![0.0; cols + 1];
        weights[0] = (probability / (1.0 - probability)).ln();
        Self { means: vec![0.0; cols], scales: vec![1.0; cols], weights }
    }

    fn standardise(&self, j: usize, value: f64) -> f64 {
        (value - self.means[j]) / self.scales[j]
    }
}

fn penalised_loss(design: &DMatrix<f64>, labels: &DVector<f64>, beta: &DVector<f64>) -> f64 {
    let eta = design * beta;
    let data: f64 = eta.iter().zip(labels.iter()).map(|(z, y)| softplus(*z) - y * z).sum();
    let penalty: f64 = beta.iter().skip(1).map(|b| b * b).sum::<f64>() * 0.5;
    data + penalty
}

impl Fittable for LogisticRegression {
    fn fit(features: &DMatrix<f64>, labels: &DVector<f64>) -> Result<Self, FitError> {
        check_shape(features, labels)?;
        let (rows, cols) = features.shape();

        let y = labels.map(|l| if l > 0.5 { 1.0 } else { 0.0 });
        let positives = y.sum();
        if positives == 0.0 || positives == rows as f64 {
            return Ok(Self::intercept_only(cols, (positives + 0.5) / (rows as f64 + 1.0)));
        }

        let means = column_means(features);
        let scales: Vec<f64> = (0..cols)
            .map(|j| {
                let var = features.column(j).iter().map(|v| (v - means[j]).powi(2)).sum::<f64>() / rows as f64;
                let sd = var.sqrt();
                if sd > 0.0 { sd } else { 1.0 }
            })
            .collect();

        let p = cols + 1;
        let design = DMatrix::from_fn(rows, p, |i, j| {
            if j == 0 {
                1.0
            } else {
                (features[(i, j - 1)] - means[j - 1]) / scales[j - 1]
            }
        });
        // Penalty on weights only; a tiny ridge keeps the intercept row well posed.
        let mut ridge = DMatrix::<f64>::identity(p, p);
        ridge[(0, 0)] = 1e-10;

        let mut beta = DVector::<f64>::zeros(p);
        let mut loss = penalised_loss(&design, &y, &beta);
        for _ in 0..MAX_NEWTON_ITERATIONS {
            let mu = (&design * &beta).map(sigmoid);
            let mut grad = design.transpose() * (&mu - &y);
            for k in 1..p {
                grad[k] += beta[k];
            }
            let curvature = mu.map(|m| m * (1.0 - m));
            let weighted = DMatrix::from_fn(rows, p, |i, j| design[(i, j)] * curvature[i]);
            let hessian = design.transpose() * weighted + &ridge;

            let step = match hessian.clone().cholesky() {
                Some(chol) => chol.solve(&grad),
                None => hessian
                    .lu()
                    .solve(&grad)
                    .ok_or_else(|| FitError::Singular("Newton system".to_string()))?,
            };

            // Backtracking keeps each step a descent step
            let slope = grad.dot(&step);
            let mut t = 1.0;
            let mut candidate = &beta - &step * t;
            let mut candidate_loss = penalised_loss(&design, &y, &candidate);
            while candidate_loss > loss - 1e-4 * t * slope && t > 1e-8 {
                t *= 0.5;
                candidate = &beta - &step * t;
                candidate_loss = penalised_loss(&design, &y, &candidate);
            }

            let moved = (&candidate - &beta).norm();
            beta = candidate;
            loss = candidate_loss;
            if moved < NEWTON_TOLERANCE {
                break;
            }
        }

        if beta.iter().any(|b| !b.is_finite()) {
            return Err(FitError::NonFinite);
        }
        Ok(Self { means, scales, weights: beta.iter().copied().collect() })
    }

    fn predict(&self, features: &[f64]) -> f64 {
        let z = self.weights[0]
            + features
                .iter()
                .enumerate()
                .take(self.means.len())
                .map(|(j, x)| self.weights[j + 1] * self.standardise(j, *x))
                .sum::<f64>();
        sigmoid(z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: &[Vec<f64>]) -> DMatrix<f64> {
        DMatrix::from_fn(rows.len(), rows[0].len(), |i, j| rows[i][j])
    }

    #[test]
    fn test_linear_recovers_exact_relationship() {
        let rows: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64, (i % 7) as f64]).collect();
        let y = DVector::from_iterator(40, rows.iter().map(|r| 1.5 + 2.0 * r[0] - 0.5 * r[1]));
        let model = LinearRegression::fit(&matrix(&rows), &y).unwrap();

        assert!((model.intercept() - 1.5).abs() < 1e-8);
        assert!((model.coefficients()[0] - 2.0).abs() < 1e-8);
        assert!((model.coefficients()[1] + 0.5).abs() < 1e-8);
        assert!((model.predict(&[100.0, 3.0]) - (1.5 + 200.0 - 1.5)).abs() < 1e-6);
    }

    #[test]
    fn test_linear_constant_features_predict_mean() {
        let rows = vec![vec![100.0, 1.0, 0.02, 0.3]; 50];
        let y = DVector::from_element(50, 0.6);
        let model = LinearRegression::fit(&matrix(&rows), &y).unwrap();
        assert!((model.predict(&[100.0, 1.0, 0.02, 0.3]) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_linear_shape_errors() {
        let x = DMatrix::<f64>::zeros(3, 2);
        let y = DVector::<f64>::zeros(2);
        assert_eq!(
            LinearRegression::fit(&x, &y),
            Err(FitError::ShapeMismatch { rows: 3, labels: 2 })
        );
        let x = DMatrix::<f64>::zeros(0, 2);
        let y = DVector::<f64>::zeros(0);
        assert_eq!(LinearRegression::fit(&x, &y), Err(FitError::Empty));
    }

    #[test]
    fn test_logistic_separates_classes() {
        let rows: Vec<Vec<f64>> = (0..100)
            .map(|i| vec![if i % 5 == 0 { 10_000.0 } else { 100.0 }, 1.0, 0.1])
            .collect();
        let y = DVector::from_iterator(100, (0..100).map(|i| if i % 5 == 0 { 0.0 } else { 1.0 }));
        let model = LogisticRegression::fit(&matrix(&rows), &y).unwrap();

        assert!(model.predict(&[100.0, 1.0, 0.1]) > 0.7);
        assert!(model.predict(&[10_000.0, 1.0, 0.1]) < 0.3);
    }

    #[test]
    fn test_logistic_overlapping_classes_matches_frequency() {
        // Feature carries no signal: probability should sit at the base rate.
        let rows = vec![vec![1.0]; 40];
        let y = DVector::from_iterator(40, (0..40).map(|i| if i % 4 == 0 { 1.0 } else { 0.0 }));
        let model = LogisticRegression::fit(&matrix(&rows), &y).unwrap();
        assert!((model.predict(&[1.0]) - 0.25).abs() < 1e-4);
    }

    #[test]
    fn test_logistic_single_class_uses_smoothed_frequency() {
        let rows = vec![vec![1.0, 2.0]; 30];
        let model = LogisticRegression::fit(&matrix(&rows), &DVector::from_element(30, 1.0)).unwrap();
        assert!((model.predict(&[1.0, 2.0]) - 30.5 / 31.0).abs() < 1e-12);
        // Features carry no weight
        assert!((model.predict(&[1e9, -1e9]) - 30.5 / 31.0).abs() < 1e-12);

        let model = LogisticRegression::fit(&matrix(&rows), &DVector::zeros(30)).unwrap();
        assert!((model.predict(&[1.0, 2.0]) - 0.5 / 31.0).abs() < 1e-12);
    }

    #[test]
    fn test_sigmoid_is_stable() {
        assert_eq!(sigmoid(1_000.0), 1.0);
        assert_eq!(sigmoid(-1_000.0), 0.0);
        assert!((softplus(1_000.0) - 1_000.0).abs() < 1e-9);
    }
}
