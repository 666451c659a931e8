//! Training orchestration, batch prediction and persistence over the registry

use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::classifier::{SeverityClassifier, SeverityPrediction};
use super::ensemble::{EnsembleForecaster, EnsemblePrediction};
use super::persistence::{
    load_bundle, save_bundle, ArimaBundle, BundleFamily, LearnerBundle, ARIMA_BUNDLE_FILE,
    LEARNER_BUNDLE_FILE,
};
use super::registry::ModelRegistry;
use crate::capability::NumericBackend;
use crate::config::Config;
use crate::domain::{ModelKey, Parameter, Reading};
use crate::error::{ModelError, PredictionError, PredictionOutcome};
use crate::features::{FeatureEngineer, FeatureMatrix};
use crate::forecast::{EvaluationMetrics, Evaluator, ForecastOutput, TimeSeriesForecaster};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    Forecast,
    Ensemble,
    Classifier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingFailure {
    pub family: ModelFamily,
    /// Absent for the classifier
    pub key: Option<ModelKey>,
    pub error: PredictionError,
}

/// What a training pass installed and what it left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub forecasts_trained: Vec<ModelKey>,
    pub ensembles_trained: Vec<ModelKey>,
    pub classifier_trained: bool,
    pub failures: Vec<TrainingFailure>,
}

impl TrainingSummary {
    pub fn trained_count(&self) -> usize {
        self.forecasts_trained.len() + self.ensembles_trained.len() + usize::from(self.classifier_trained)
    }

    fn fail(&mut self, family: ModelFamily, key: Option<&ModelKey>, err: &ModelError) {
        match key {
            Some(key) => error!(region = %key.region, parameter = %key.parameter, family = ?family, error = %err, "Training failed"),
            None => error!(family = ?family, error = %err, "Training failed"),
        }
        self.failures.push(TrainingFailure {
            family,
            key: key.cloned(),
            error: PredictionError::from(err),
        });
    }
}

/// Region → parameter → forecast or structured error
pub type BatchPredictions = BTreeMap<String, BTreeMap<Parameter, PredictionOutcome<ForecastOutput>>>;

/// Facade over feature engineering, the three model families and the registry
#[derive(Debug)]
pub struct ModelTrainer {
    config: Config,
    engineer: FeatureEngineer,
    forecaster: TimeSeriesForecaster,
    ensemble: EnsembleForecaster,
    classifier: SeverityClassifier,
    registry: ModelRegistry,
}

impl ModelTrainer {
    pub fn new(config: &Config, backend: Arc<dyn NumericBackend>) -> Self {
        Self {
            config: config.clone(),
            engineer: FeatureEngineer::new(),
            forecaster: TimeSeriesForecaster::new(&config.ml, backend.clone()),
            ensemble: EnsembleForecaster::new(config.search.clone(), config.ml.random_seed, backend.clone()),
            classifier: SeverityClassifier::new(&config.ml, backend),
            registry: ModelRegistry::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn features(&self, readings: &[Reading]) -> FeatureMatrix {
        self.engineer.transform(readings)
    }

    /// Readings within `training_window_hours` of the newest one
    pub fn training_window(&self, readings: &[Reading]) -> Vec<Reading> {
        let Some(newest) = readings.iter().map(|r| r.timestamp).max() else {
            return Vec::new();
        };
        let cutoff = newest - Duration::hours(self.config.ml.training_window_hours as i64);
        readings.iter().filter(|r| r.timestamp >= cutoff).cloned().collect()
    }

    pub fn train_forecast(&mut self, readings: &[Reading], key: &ModelKey) -> Result<(), ModelError> {
        let model = self.forecaster.train(readings, key)?;
        self.registry.install_forecast(model);
        Ok(())
    }

    pub fn train_ensemble(&mut self, matrix: &FeatureMatrix, key: &ModelKey) -> Result<(), ModelError> {
        let model = self.ensemble.train(matrix, key)?;
        self.registry.install_ensemble(model);
        Ok(())
    }

    /// Retrain both models of `key` on the training window; each is
    /// installed only if it trained.
    pub fn train_one(&mut self, readings: &[Reading], key: &ModelKey) -> TrainingSummary {
        let window = self.training_window(readings);
        let matrix = self.engineer.transform(&window);
        let mut summary = TrainingSummary::default();
        self.train_key(&window, &matrix, key, &mut summary);
        if summary.trained_count() > 0 {
            self.registry.mark_trained(Utc::now());
        }
        summary
    }

    fn train_key(&mut self, readings: &[Reading], matrix: &FeatureMatrix, key: &ModelKey, summary: &mut TrainingSummary) {
        match self.train_forecast(readings, key) {
            Ok(()) => summary.forecasts_trained.push(key.clone()),
            Err(e) => summary.fail(ModelFamily::Forecast, Some(key), &e),
        }
        match self.train_ensemble(matrix, key) {
            Ok(()) => summary.ensembles_trained.push(key.clone()),
            Err(e) => summary.fail(ModelFamily::Ensemble, Some(key), &e),
        }
    }

    pub fn train_classifier(&mut self, matrix: &FeatureMatrix) -> Result<(), ModelError> {
        let model = self.classifier.train(matrix)?;
        self.registry.install_classifier(model);
        Ok(())
    }

    /// Train every region × parameter found in the training window plus the
    /// classifier. Failures are collected, never propagated.
    pub fn train_all(&mut self, readings: &[Reading]) -> TrainingSummary {
        let window = self.training_window(readings);
        let matrix = self.engineer.transform(&window);
        let mut summary = TrainingSummary::default();

        for region in matrix.region_names() {
            for parameter in Parameter::all() {
                let key = ModelKey::new(region.clone(), parameter);
                self.train_key(&window, &matrix, &key, &mut summary);
            }
        }

        match self.train_classifier(&matrix) {
            Ok(()) => summary.classifier_trained = true,
            Err(e) => summary.fail(ModelFamily::Classifier, None, &e),
        }

        if summary.trained_count() > 0 {
            self.registry.mark_trained(Utc::now());
        }
        info!(
            readings = window.len(),
            forecasts = summary.forecasts_trained.len(),
            ensembles = summary.ensembles_trained.len(),
            classifier = summary.classifier_trained,
            failures = summary.failures.len(),
            "Training pass complete"
        );
        summary
    }

    pub fn predict_forecast(&self, key: &ModelKey, steps: Option<usize>) -> Result<ForecastOutput, ModelError> {
        let model = self.registry.forecast(key)?;
        self.forecaster.predict(model, steps)
    }

    /// Ensemble predictions for the rows of `key.region` in `matrix`
    pub fn predict_ensemble(&self, key: &ModelKey, matrix: &FeatureMatrix) -> Result<EnsemblePrediction, ModelError> {
        let model = self.registry.ensemble(key)?;
        self.ensemble.predict(model, &matrix.for_region(&key.region))
    }

    pub fn predict_severe_weather(&self, matrix: &FeatureMatrix) -> Result<SeverityPrediction, ModelError> {
        let model = self.registry.classifier()?;
        self.classifier.predict(model, matrix)
    }

    /// Forecast every known region for `parameters` over the configured horizon
    pub fn batch_predict_all(&self, parameters: &[Parameter]) -> BatchPredictions {
        let keys: Vec<ModelKey> = self
            .registry
            .regions()
            .into_iter()
            .flat_map(|region| parameters.iter().map(move |p| ModelKey::new(region.clone(), *p)))
            .collect();

        let outcomes: Vec<(ModelKey, PredictionOutcome<ForecastOutput>)> = keys
            .into_par_iter()
            .map(|key| {
                let outcome: PredictionOutcome<ForecastOutput> = self.predict_forecast(&key, None).into();
                (key, outcome)
            })
            .collect();

        let mut results = BatchPredictions::new();
        for (key, outcome) in outcomes {
            results.entry(key.region).or_default().insert(key.parameter, outcome);
        }
        results
    }

    /// Forecast `actual.len()` steps and score them against `actual`
    pub fn evaluate_forecast(&self, key: &ModelKey, actual: &[f64]) -> Result<EvaluationMetrics, ModelError> {
        let forecast = self.predict_forecast(key, Some(actual.len()))?;
        let metrics = Evaluator::evaluate(actual, &forecast.predictions)?;
        info!(region = %key.region, parameter = %key.parameter, %metrics, "Forecast evaluated");
        Ok(metrics)
    }

    /// Ensemble importances for `Some(key)`, classifier importances for `None`
    pub fn feature_importance(&self, key: Option<&ModelKey>) -> Result<BTreeMap<String, f64>, ModelError> {
        match key {
            Some(key) => Ok(self.registry.ensemble(key)?.feature_importances.clone()),
            None => Ok(self.registry.classifier()?.feature_importances.clone()),
        }
    }

    pub fn last_training_time(&self) -> Option<DateTime<Utc>> {
        self.registry.last_training_time()
    }

    pub fn needs_retrain(&self, now: DateTime<Utc>) -> bool {
        let stale = self.registry.is_stale(now, self.config.ml.retrain_interval());
        if stale {
            warn!(last_training_time = ?self.registry.last_training_time(), "Models are stale");
        }
        stale
    }

    pub fn evict(&mut self, key: &ModelKey) -> bool {
        self.registry.evict(key)
    }

    pub fn arima_bundle_path(&self) -> PathBuf {
        self.config.ml.model_registry_path.join(ARIMA_BUNDLE_FILE)
    }

    pub fn learner_bundle_path(&self) -> PathBuf {
        self.config.ml.model_registry_path.join(LEARNER_BUNDLE_FILE)
    }

    pub fn save_arima(&self, path: &Path) -> Result<(), ModelError> {
        let bundle = ArimaBundle {
            models: self.registry.forecast_models().cloned().collect(),
            last_training_time: self.registry.last_training_time(),
        };
        save_bundle(path, BundleFamily::Arima, &self.config, &bundle)?;
        Ok(())
    }

    pub fn save_learners(&self, path: &Path) -> Result<(), ModelError> {
        let bundle = LearnerBundle {
            ensembles: self.registry.ensemble_models().cloned().collect(),
            classifier: self.registry.classifier().ok().cloned(),
        };
        save_bundle(path, BundleFamily::Learners, &self.config, &bundle)?;
        Ok(())
    }

    /// Replace all forecast models with the bundle's; on error nothing changes
    pub fn load_arima(&mut self, path: &Path) -> Result<usize, ModelError> {
        let (_, bundle): (_, ArimaBundle) = load_bundle(path, BundleFamily::Arima)?;
        Ok(self.install_arima(bundle))
    }

    pub fn load_learners(&mut self, path: &Path) -> Result<usize, ModelError> {
        let (_, bundle): (_, LearnerBundle) = load_bundle(path, BundleFamily::Learners)?;
        Ok(self.install_learners(bundle))
    }

    fn install_arima(&mut self, bundle: ArimaBundle) -> usize {
        let count = bundle.models.len();
        self.registry.replace_forecasts(bundle.models);
        if let Some(at) = bundle.last_training_time {
            self.registry.mark_trained(at);
        }
        count
    }

    fn install_learners(&mut self, bundle: LearnerBundle) -> usize {
        let count = bundle.ensembles.len() + usize::from(bundle.classifier.is_some());
        self.registry.replace_learners(bundle.ensembles, bundle.classifier);
        count
    }

    pub fn save_all(&self) -> Result<(), ModelError> {
        self.save_arima(&self.arima_bundle_path())?;
        self.save_learners(&self.learner_bundle_path())
    }

    /// Load both bundles; the registry changes only if both decode
    pub fn load_all(&mut self) -> Result<usize, ModelError> {
        let (_, arima): (_, ArimaBundle) = load_bundle(&self.arima_bundle_path(), BundleFamily::Arima)?;
        let (_, learners): (_, LearnerBundle) = load_bundle(&self.learner_bundle_path(), BundleFamily::Learners)?;
        Ok(self.install_arima(arima) + self.install_learners(learners))
    }
}
