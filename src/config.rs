use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::forecast::ArimaOrder;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ml: MlConfig,
    pub search: SearchSpace,
    pub data: DataConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlConfig {
    pub model_registry_path: PathBuf,
    pub arima_order: (usize, usize, usize),
    pub prediction_horizon_minutes: u32,
    pub retrain_interval_hours: u32,
    pub training_window_hours: u32,
    pub severe_weather_threshold: f64,
    pub xgboost_n_estimators: usize,
    pub xgboost_max_depth: usize,
    pub xgboost_learning_rate: f64,
    pub random_seed: u64,
}

impl Default for MlConfig {
    fn default() -> Self {
        Self {
            model_registry_path: PathBuf::from("models"),
            arima_order: (2, 1, 2),
            prediction_horizon_minutes: 360,
            retrain_interval_hours: 24,
            training_window_hours: 168,
            severe_weather_threshold: 0.7,
            xgboost_n_estimators: 100,
            xgboost_max_depth: 6,
            xgboost_learning_rate: 0.1,
            random_seed: 42,
        }
    }
}

impl MlConfig {
    pub fn default_order(&self) -> ArimaOrder {
        ArimaOrder::from(self.arima_order)
    }

    /// Forecast steps covering the configured horizon at the 5-minute cadence
    pub fn horizon_steps(&self) -> usize {
        (self.prediction_horizon_minutes / 5) as usize
    }

    pub fn retrain_interval(&self) -> chrono::Duration {
        chrono::Duration::hours(self.retrain_interval_hours as i64)
    }
}

/// Ensemble hyperparameter grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSpace {
    pub n_estimators: Vec<usize>,
    pub max_depth: Vec<usize>,
    pub learning_rate: Vec<f64>,
    pub subsample: Vec<f64>,
    pub colsample_bytree: Vec<f64>,
    pub cv_folds: usize,
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self {
            n_estimators: vec![50, 100, 200],
            max_depth: vec![3, 6, 9],
            learning_rate: vec![0.05, 0.1, 0.2],
            subsample: vec![0.8, 1.0],
            colsample_bytree: vec![0.8, 1.0],
            cv_folds: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub readings_path: PathBuf,
    pub retrain_check_minutes: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            readings_path: PathBuf::from("data/readings.json"),
            retrain_check_minutes: 30,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from("config/default.toml")
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("WXI__").split("__"));
        figment
            .extract()
            .with_context(|| format!("invalid configuration (file {})", path.display()))
    }
}
