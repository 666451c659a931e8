//! Forecast accuracy metrics and baseline comparison

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::error::ModelError;

/// Regression quality of a forecast against observed values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    /// Mean Absolute Error
    pub mae: f64,
    /// Mean Squared Error
    pub mse: f64,
    /// Root Mean Square Error
    pub rmse: f64,
    /// Mean Absolute Percentage Error (%), rows with a zero actual skipped
    pub mape: f64,
    /// MAE of a forecast that repeats the first actual value
    pub baseline_mae: f64,
    /// `(baseline_mae - mae) / baseline_mae * 100`, zero for a zero baseline
    pub mae_improvement_percent: f64,
    pub sample_count: usize,
}

/// Forecast quality classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForecastQuality {
    Excellent, // MAPE < 5%
    Good,      // MAPE 5-10%
    Fair,      // MAPE 10-20%
    Poor,      // MAPE 20-50%
    VeryPoor,  // MAPE > 50%
}

/// Stateless calculator for [`EvaluationMetrics`]
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator;

impl Evaluator {
    /// Compare `predicted` against `actual`.
    ///
    /// Sequences of different length are truncated to the shorter one.
    pub fn evaluate(actual: &[f64], predicted: &[f64]) -> Result<EvaluationMetrics, ModelError> {
        let n = actual.len().min(predicted.len());
        if actual.len() != predicted.len() {
            warn!(
                actual = actual.len(),
                predicted = predicted.len(),
                used = n,
                "Evaluation length mismatch, truncating"
            );
        }
        if n == 0 {
            return Err(ModelError::insufficient("evaluation", 1, 0));
        }

        let actual = &actual[..n];
        let predicted = &predicted[..n];

        let mut abs_sum = 0.0;
        let mut sq_sum = 0.0;
        let mut pct_sum = 0.0;
        let mut pct_count = 0usize;
        for (a, p) in actual.iter().zip(predicted) {
            let error = a - p;
            abs_sum += error.abs();
            sq_sum += error * error;
            if *a != 0.0 {
                pct_sum += (error / a).abs();
                pct_count += 1;
            }
        }

        let mae = abs_sum / n as f64;
        let mse = sq_sum / n as f64;
        let mape = if pct_count == 0 {
            0.0
        } else {
            pct_sum / pct_count as f64 * 100.0
        };

        let anchor = actual[0];
        let baseline_mae = actual.iter().map(|a| (a - anchor).abs()).sum::<f64>() / n as f64;
        let mae_improvement_percent = if baseline_mae == 0.0 {
            0.0
        } else {
            (baseline_mae - mae) / baseline_mae * 100.0
        };

        Ok(EvaluationMetrics {
            mae,
            mse,
            rmse: mse.sqrt(),
            mape,
            baseline_mae,
            mae_improvement_percent,
            sample_count: n,
        })
    }
}

impl EvaluationMetrics {
    /// Assess forecast quality based on MAPE
    pub fn quality(&self) -> ForecastQuality {
        if self.mape < 5.0 {
            ForecastQuality::Excellent
        } else if self.mape < 10.0 {
            ForecastQuality::Good
        } else if self.mape < 20.0 {
            ForecastQuality::Fair
        } else if self.mape < 50.0 {
            ForecastQuality::Poor
        } else {
            ForecastQuality::VeryPoor
        }
    }

    pub fn beats_baseline(&self) -> bool {
        self.mae < self.baseline_mae
    }
}

impl fmt::Display for EvaluationMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Metrics: MAE={:.3}, RMSE={:.3}, MAPE={:.2}%, vs baseline={:+.1}%, Quality={:?}",
            self.mae,
            self.rmse,
            self.mape,
            self.mae_improvement_percent,
            self.quality()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_forecast() {
        let actual = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let metrics = Evaluator::evaluate(&actual, &actual).unwrap();

        assert_eq!(metrics.mae, 0.0);
        assert_eq!(metrics.rmse, 0.0);
        assert_eq!(metrics.mape, 0.0);
        assert_eq!(metrics.baseline_mae, 2.0);
        assert_eq!(metrics.mae_improvement_percent, 100.0);
        assert_eq!(metrics.quality(), ForecastQuality::Excellent);
    }

    #[test]
    fn test_forecast_with_errors() {
        let actual = vec![100.0, 200.0, 300.0, 400.0, 500.0];
        let predicted = vec![110.0, 190.0, 310.0, 390.0, 510.0];

        let metrics = Evaluator::evaluate(&actual, &predicted).unwrap();

        assert_eq!(metrics.mae, 10.0);
        assert_eq!(metrics.mse, 100.0);
        assert!(metrics.mape < 10.0);
        assert!(metrics.beats_baseline());
        assert_eq!(metrics.quality(), ForecastQuality::Excellent);
    }

    #[test]
    fn test_zero_actuals_skipped_in_mape() {
        let metrics = Evaluator::evaluate(&[0.0, 10.0], &[1.0, 11.0]).unwrap();
        assert!((metrics.mape - 10.0).abs() < 1e-12);
        assert_eq!(metrics.mae, 1.0);
    }

    #[test]
    fn test_flat_baseline() {
        let metrics = Evaluator::evaluate(&[5.0, 5.0, 5.0], &[4.0, 6.0, 5.0]).unwrap();
        assert_eq!(metrics.baseline_mae, 0.0);
        assert_eq!(metrics.mae_improvement_percent, 0.0);
    }

    #[test]
    fn test_length_mismatch_truncates() {
        let metrics = Evaluator::evaluate(&[1.0, 2.0, 3.0], &[1.0, 2.0]).unwrap();
        assert_eq!(metrics.sample_count, 2);
        assert_eq!(metrics.mae, 0.0);
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(
            Evaluator::evaluate(&[], &[1.0]),
            Err(ModelError::InsufficientData { .. })
        ));
    }
}
