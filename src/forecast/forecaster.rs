use chrono::{DateTime, Utc};
use itertools::iproduct;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::arima::{ArimaFit, ArimaOrder};
use super::resample::{future_timestamps, resample, ResampledSeries};
use super::stationarity::{adf_test, StationarityReport};
use crate::capability::NumericBackend;
use crate::config::MlConfig;
use crate::domain::{ModelKey, Reading};
use crate::error::ModelError;
use crate::features::window::fill_missing;

/// Resampled history needed before the order is searched instead of defaulted
pub const MIN_SEARCH_SAMPLES: usize = 50;

/// Interval coverage of forecast bounds
pub const CONFIDENCE_LEVEL: f64 = 0.95;

/// Candidate orders in search order: p, then d, then q ascending
pub fn order_grid() -> Vec<ArimaOrder> {
    iproduct!(0..=3usize, 0..=2usize, 0..=3usize)
        .map(|(p, d, q)| ArimaOrder::new(p, d, q))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceIntervals {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastModelInfo {
    pub params: (usize, usize, usize),
    pub aic: f64,
    pub training_samples: usize,
}

/// Multi-step forecast for one (region, parameter)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastOutput {
    pub predictions: Vec<f64>,
    pub timestamps: Vec<DateTime<Utc>>,
    pub confidence_intervals: ConfidenceIntervals,
    pub model_info: ForecastModelInfo,
}

/// Trained ARIMA model for one key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastModel {
    pub key: ModelKey,
    pub fit: ArimaFit,
    /// Start of the last observed 5-minute bin
    pub last_timestamp: DateTime<Utc>,
    pub training_samples: usize,
    pub trained_at: DateTime<Utc>,
    pub stationarity: Option<StationarityReport>,
}

impl ForecastModel {
    pub fn order(&self) -> ArimaOrder {
        self.fit.order
    }

    pub fn aic(&self) -> f64 {
        self.fit.aic
    }

    pub fn forecast(&self, steps: usize) -> ForecastOutput {
        let forecast = self.fit.forecast(steps, CONFIDENCE_LEVEL);
        let order = self.order();
        ForecastOutput {
            predictions: forecast.mean,
            timestamps: future_timestamps(self.last_timestamp, steps),
            confidence_intervals: ConfidenceIntervals {
                lower: forecast.lower,
                upper: forecast.upper,
            },
            model_info: ForecastModelInfo {
                params: (order.p, order.d, order.q),
                aic: self.fit.aic,
                training_samples: self.training_samples,
            },
        }
    }
}

/// Linear-interpolated quantile of sorted values
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = (sorted.len() - 1) as f64 * q;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (position - lower as f64)
}

/// Lowest finite AIC in candidate order; a tie keeps the earlier candidate
fn lowest_aic(fits: Vec<(ArimaOrder, Result<f64, ModelError>)>) -> Option<(ArimaOrder, f64)> {
    let mut best: Option<(ArimaOrder, f64)> = None;
    for (order, result) in fits {
        match result {
            Ok(aic) if aic.is_finite() => {
                if best.map_or(true, |(_, best_aic)| aic < best_aic) {
                    best = Some((order, aic));
                }
            }
            Ok(_) => debug!(order = %order, "Skipping order with non-finite AIC"),
            Err(e) => debug!(order = %order, error = %e, "Order failed to fit"),
        }
    }
    best
}

/// Replace values outside the 1.5·IQR fences by the median
pub fn replace_outliers(values: &mut [f64]) {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.len() < 4 {
        return;
    }
    sorted.sort_by(f64::total_cmp);
    let q1 = quantile(&sorted, 0.25);
    let q3 = quantile(&sorted, 0.75);
    let median = quantile(&sorted, 0.5);
    let iqr = q3 - q1;
    let (low, high) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);
    for v in values.iter_mut() {
        if v.is_finite() && (*v < low || *v > high) {
            *v = median;
        }
    }
}

/// Per-key ARIMA training and prediction
#[derive(Debug, Clone)]
pub struct TimeSeriesForecaster {
    backend: Arc<dyn NumericBackend>,
    default_order: ArimaOrder,
    horizon_steps: usize,
}

impl TimeSeriesForecaster {
    pub fn new(config: &MlConfig, backend: Arc<dyn NumericBackend>) -> Self {
        Self {
            backend,
            default_order: config.default_order(),
            horizon_steps: config.horizon_steps(),
        }
    }

    pub fn default_order(&self) -> ArimaOrder {
        self.default_order
    }

    pub fn horizon_steps(&self) -> usize {
        self.horizon_steps
    }

    /// Gap-filled, outlier-cleaned and resampled series of `key`
    pub fn prepare(&self, readings: &[Reading], key: &ModelKey) -> ResampledSeries {
        let mut regional: Vec<&Reading> = readings.iter().filter(|r| r.region == key.region).collect();
        regional.sort_by_key(|r| r.timestamp);

        let raw: Vec<f64> = regional.iter().map(|r| r.value(key.parameter)).collect();
        let mut values = fill_missing(&raw);
        replace_outliers(&mut values);

        let points: Vec<(DateTime<Utc>, f64)> = regional
            .iter()
            .map(|r| r.timestamp)
            .zip(values)
            .collect();
        resample(&points)
    }

    /// Lowest-AIC order over [`order_grid`]; ties keep the earlier candidate
    pub fn select_order(&self, values: &[f64]) -> Option<(ArimaOrder, f64)> {
        let fits: Vec<(ArimaOrder, Result<f64, ModelError>)> = order_grid()
            .into_par_iter()
            .map(|order| (order, ArimaFit::fit(values, order).map(|fit| fit.aic)))
            .collect();
        lowest_aic(fits)
    }

    pub fn train(&self, readings: &[Reading], key: &ModelKey) -> Result<ForecastModel, ModelError> {
        self.backend.ensure_available()?;

        let series = self.prepare(readings, key);
        let last_timestamp = series
            .last_timestamp()
            .ok_or_else(|| ModelError::insufficient(format!("forecaster {}", key), self.default_order.min_samples(), 0))?;
        if series.len() < self.default_order.min_samples() {
            return Err(ModelError::insufficient(
                format!("forecaster {}", key),
                self.default_order.min_samples(),
                series.len(),
            ));
        }

        let stationarity = match adf_test(&series.values) {
            Ok(report) => {
                info!(
                    region = %key.region,
                    parameter = %key.parameter,
                    adf_statistic = report.adf_statistic,
                    p_value = report.p_value,
                    is_stationary = report.is_stationary,
                    "Stationarity test"
                );
                Some(report)
            }
            Err(e) => {
                warn!(region = %key.region, parameter = %key.parameter, error = %e, "Stationarity test skipped");
                None
            }
        };

        let order = if series.len() >= MIN_SEARCH_SAMPLES {
            match self.select_order(&series.values) {
                Some((order, _)) => order,
                None => {
                    warn!(region = %key.region, parameter = %key.parameter, "No order fitted, using default");
                    self.default_order
                }
            }
        } else {
            warn!(
                region = %key.region,
                parameter = %key.parameter,
                samples = series.len(),
                default_order = %self.default_order,
                "Short history, skipping order search"
            );
            self.default_order
        };

        let fit = ArimaFit::fit(&series.values, order)?;
        info!(
            region = %key.region,
            parameter = %key.parameter,
            order = %order,
            aic = fit.aic,
            samples = series.len(),
            "Trained ARIMA model"
        );

        Ok(ForecastModel {
            key: key.clone(),
            fit,
            last_timestamp,
            training_samples: series.len(),
            trained_at: Utc::now(),
            stationarity,
        })
    }

    /// Forecast `steps` bins, or the configured horizon when `None`
    pub fn predict(&self, model: &ForecastModel, steps: Option<usize>) -> Result<ForecastOutput, ModelError> {
        self.backend.ensure_available()?;
        Ok(model.forecast(steps.unwrap_or(self.horizon_steps)))
    }
}
