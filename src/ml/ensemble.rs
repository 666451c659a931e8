use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use super::boosting::{GradientBoostedTrees, Objective};
use super::preprocess::Preprocessor;
use super::search::{grid_search, HyperParams};
use crate::capability::NumericBackend;
use crate::config::SearchSpace;
use crate::domain::ModelKey;
use crate::error::ModelError;
use crate::features::FeatureMatrix;

/// Rows a region needs before an ensemble model is trained
pub const MIN_ENSEMBLE_ROWS: usize = 100;

/// Held-out share of the chronological split
pub const TEST_FRACTION: f64 = 0.2;

/// Rows held out by an 80/20 split of `n` (at least one)
pub(crate) fn test_size(n: usize) -> usize {
    ((n as f64 * TEST_FRACTION).ceil() as usize).max(1)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleModel {
    pub key: ModelKey,
    /// Every engineered column except the raw target. Rolling means and
    /// physics indices that include the current value stay in.
    pub feature_columns: Vec<String>,
    /// Regions seen in training, in region-code order
    pub region_vocabulary: Vec<String>,
    pub preprocessor: Preprocessor,
    pub booster: GradientBoostedTrees,
    pub best_params: HyperParams,
    pub mae: f64,
    pub mse: f64,
    pub feature_importances: BTreeMap<String, f64>,
    pub training_samples: usize,
    pub trained_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleModelInfo {
    pub mae: f64,
    pub mse: f64,
    pub best_params: HyperParams,
    pub training_samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsemblePrediction {
    pub predictions: Vec<f64>,
    pub model_info: EnsembleModelInfo,
}

impl EnsembleModel {
    /// Predict the target for every row of `matrix`
    pub fn predict(&self, matrix: &FeatureMatrix) -> Result<EnsemblePrediction, ModelError> {
        let x = self
            .preprocessor
            .transform(&matrix.select_with_regions(&self.feature_columns, &self.region_vocabulary)?)?;
        Ok(EnsemblePrediction {
            predictions: self.booster.predict_batch(&x)?,
            model_info: EnsembleModelInfo {
                mae: self.mae,
                mse: self.mse,
                best_params: self.best_params,
                training_samples: self.training_samples,
            },
        })
    }
}

/// Per-key boosted regression on the engineered matrix
#[derive(Debug, Clone)]
pub struct EnsembleForecaster {
    backend: Arc<dyn NumericBackend>,
    search: SearchSpace,
    seed: u64,
}

impl EnsembleForecaster {
    pub fn new(search: SearchSpace, seed: u64, backend: Arc<dyn NumericBackend>) -> Self {
        Self { backend, search, seed }
    }

    pub fn train(&self, matrix: &FeatureMatrix, key: &ModelKey) -> Result<EnsembleModel, ModelError> {
        self.backend.ensure_available()?;

        let target_name = key.parameter.to_string();
        let regional = matrix.for_region(&key.region);
        let target = regional
            .column(&target_name)
            .ok_or_else(|| ModelError::InvalidInput(format!("missing target column '{}'", target_name)))?;

        let rows: Vec<usize> = (0..regional.len()).filter(|&i| target[i].is_finite()).collect();
        if rows.len() < MIN_ENSEMBLE_ROWS {
            return Err(ModelError::insufficient(
                format!("ensemble {}", key),
                MIN_ENSEMBLE_ROWS,
                rows.len(),
            ));
        }

        let feature_columns = regional.feature_columns_excluding(&[target_name.as_str()]);
        let usable = regional.subset(&rows);
        let region_vocabulary = usable.region_names();
        let x = usable.select_with_regions(&feature_columns, &region_vocabulary)?;
        let y: Vec<f64> = rows.iter().map(|&i| target[i]).collect();

        let split = x.len() - test_size(x.len());
        let (x_train, x_test) = x.split_at(split);
        let (y_train, y_test) = y.split_at(split);

        let preprocessor = Preprocessor::fit(x_train)?;
        let x_train = preprocessor.transform(x_train)?;
        let x_test = preprocessor.transform(x_test)?;

        let outcome = grid_search(&x_train, y_train, &self.search, self.seed)?;
        let booster = GradientBoostedTrees::fit(
            &x_train,
            y_train,
            &outcome.best.boosting(self.seed),
            Objective::SquaredError,
        )?;

        let predicted = booster.predict_batch(&x_test)?;
        let n_test = y_test.len() as f64;
        let mae = predicted.iter().zip(y_test).map(|(p, a)| (p - a).abs()).sum::<f64>() / n_test;
        let mse = predicted.iter().zip(y_test).map(|(p, a)| (p - a).powi(2)).sum::<f64>() / n_test;

        let feature_importances = feature_columns
            .iter()
            .cloned()
            .zip(booster.feature_importances())
            .collect();

        info!(
            region = %key.region,
            parameter = %key.parameter,
            mae,
            mse,
            cv_mae = outcome.best_score,
            n_estimators = outcome.best.n_estimators,
            max_depth = outcome.best.max_depth,
            learning_rate = outcome.best.learning_rate,
            "Trained ensemble model"
        );

        Ok(EnsembleModel {
            key: key.clone(),
            feature_columns,
            region_vocabulary,
            preprocessor,
            booster,
            best_params: outcome.best,
            mae,
            mse,
            feature_importances,
            training_samples: x_train.len(),
            trained_at: Utc::now(),
        })
    }

    pub fn predict(&self, model: &EnsembleModel, matrix: &FeatureMatrix) -> Result<EnsemblePrediction, ModelError> {
        self.backend.ensure_available()?;
        model.predict(matrix)
    }
}
