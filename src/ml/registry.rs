use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};

use super::classifier::ClassifierModel;
use super::ensemble::EnsembleModel;
use crate::domain::ModelKey;
use crate::error::ModelError;
use crate::forecast::ForecastModel;

/// Models held for one (region, parameter)
#[derive(Debug, Clone, Default)]
struct KeyedModels {
    forecast: Option<ForecastModel>,
    ensemble: Option<EnsembleModel>,
}

impl KeyedModels {
    fn is_empty(&self) -> bool {
        self.forecast.is_none() && self.ensemble.is_none()
    }
}

/// Owns every trained model.
///
/// No internal locking: readers borrow `&self`, replacement needs `&mut self`.
/// Each install is a single map insertion of a fully built model.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: BTreeMap<ModelKey, KeyedModels>,
    classifier: Option<ClassifierModel>,
    last_training_time: Option<DateTime<Utc>>,
}

fn not_found(what: &str, key: &ModelKey) -> ModelError {
    ModelError::ModelNotFound(format!("no trained {} model for {}", what, key))
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the forecast model of its key, returning the old one
    pub fn install_forecast(&mut self, model: ForecastModel) -> Option<ForecastModel> {
        self.models.entry(model.key.clone()).or_default().forecast.replace(model)
    }

    pub fn install_ensemble(&mut self, model: EnsembleModel) -> Option<EnsembleModel> {
        self.models.entry(model.key.clone()).or_default().ensemble.replace(model)
    }

    pub fn install_classifier(&mut self, model: ClassifierModel) -> Option<ClassifierModel> {
        self.classifier.replace(model)
    }

    pub fn forecast(&self, key: &ModelKey) -> Result<&ForecastModel, ModelError> {
        self.models
            .get(key)
            .and_then(|m| m.forecast.as_ref())
            .ok_or_else(|| not_found("forecast", key))
    }

    pub fn ensemble(&self, key: &ModelKey) -> Result<&EnsembleModel, ModelError> {
        self.models
            .get(key)
            .and_then(|m| m.ensemble.as_ref())
            .ok_or_else(|| not_found("ensemble", key))
    }

    pub fn classifier(&self) -> Result<&ClassifierModel, ModelError> {
        self.classifier
            .as_ref()
            .ok_or_else(|| ModelError::ModelNotFound("no trained classification model".into()))
    }

    /// Drop both models of `key`; returns whether anything was removed
    pub fn evict(&mut self, key: &ModelKey) -> bool {
        self.models.remove(key).map_or(false, |m| !m.is_empty())
    }

    pub fn keys(&self) -> Vec<ModelKey> {
        self.models.keys().cloned().collect()
    }

    pub fn regions(&self) -> Vec<String> {
        self.models
            .keys()
            .map(|k| k.region.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn forecast_models(&self) -> impl Iterator<Item = &ForecastModel> {
        self.models.values().filter_map(|m| m.forecast.as_ref())
    }

    pub fn ensemble_models(&self) -> impl Iterator<Item = &EnsembleModel> {
        self.models.values().filter_map(|m| m.ensemble.as_ref())
    }

    /// Swap in a restored set of forecast models, replacing all current ones
    pub fn replace_forecasts(&mut self, models: Vec<ForecastModel>) {
        let mut next = std::mem::take(&mut self.models);
        for entry in next.values_mut() {
            entry.forecast = None;
        }
        for model in models {
            let key = model.key.clone();
            next.entry(key).or_default().forecast = Some(model);
        }
        next.retain(|_, m| !m.is_empty());
        self.models = next;
    }

    /// Swap in restored ensemble models and classifier
    pub fn replace_learners(&mut self, ensembles: Vec<EnsembleModel>, classifier: Option<ClassifierModel>) {
        let mut next = std::mem::take(&mut self.models);
        for entry in next.values_mut() {
            entry.ensemble = None;
        }
        for model in ensembles {
            let key = model.key.clone();
            next.entry(key).or_default().ensemble = Some(model);
        }
        next.retain(|_, m| !m.is_empty());
        self.models = next;
        self.classifier = classifier;
    }

    pub fn last_training_time(&self) -> Option<DateTime<Utc>> {
        self.last_training_time
    }

    pub fn mark_trained(&mut self, at: DateTime<Utc>) {
        self.last_training_time = Some(at);
    }

    /// Never trained, or last trained longer than `max_age` before `now`
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.last_training_time.map_or(true, |t| now - t > max_age)
    }

    /// Keys whose forecast model is older than `max_age`
    pub fn stale_keys(&self, now: DateTime<Utc>, max_age: Duration) -> Vec<ModelKey> {
        self.forecast_models()
            .filter(|m| now - m.trained_at > max_age)
            .map(|m| m.key.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty() && self.classifier.is_none()
    }
}
