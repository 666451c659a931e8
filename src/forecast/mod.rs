//! Univariate ARIMA forecasting per (region, parameter)

pub mod arima;
pub mod forecaster;
pub mod metrics;
pub mod optimize;
pub mod resample;
pub mod stationarity;

pub use arima::{ArimaFit, ArimaForecast, ArimaOrder};
pub use forecaster::{
    order_grid, ConfidenceIntervals, ForecastModel, ForecastModelInfo, ForecastOutput,
    TimeSeriesForecaster, CONFIDENCE_LEVEL, MIN_SEARCH_SAMPLES,
};
pub use metrics::{EvaluationMetrics, Evaluator, ForecastQuality};
pub use resample::{resample, ResampledSeries, CADENCE_MINUTES};
pub use stationarity::{adf_test, CriticalValues, StationarityReport};
