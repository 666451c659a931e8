use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use super::boosting::{BoostingParams, GradientBoostedTrees, Objective};
use super::ensemble::TEST_FRACTION;
use super::preprocess::Preprocessor;
use super::report::ClassificationReport;
use crate::capability::NumericBackend;
use crate::config::MlConfig;
use crate::domain::Parameter;
use crate::error::ModelError;
use crate::features::FeatureMatrix;

/// Rows needed before the severity classifier is trained
pub const MIN_CLASSIFIER_ROWS: usize = 100;

/// Probability above which a row is predicted severe
const DECISION_THRESHOLD: f64 = 0.5;

/// Per-class seeded shuffle, the first `round(test_fraction · n_c)` rows of
/// each class are held out. Both index lists come back sorted.
pub fn stratified_split(labels: &[u8], test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();
    for class in [0u8, 1u8] {
        let mut members: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, l)| **l == class)
            .map(|(i, _)| i)
            .collect();
        members.shuffle(&mut rng);
        let n_test = (members.len() as f64 * test_fraction).round() as usize;
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }
    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounts {
    pub negative: usize,
    pub positive: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierModel {
    pub feature_columns: Vec<String>,
    /// Regions seen in training, in region-code order
    pub region_vocabulary: Vec<String>,
    pub preprocessor: Preprocessor,
    pub booster: GradientBoostedTrees,
    pub scale_pos_weight: f64,
    /// Class counts of the training split
    pub class_counts: ClassCounts,
    pub report: ClassificationReport,
    pub feature_importances: BTreeMap<String, f64>,
    pub training_samples: usize,
    pub trained_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierModelInfo {
    pub accuracy: f64,
    pub training_samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityPrediction {
    pub predictions: Vec<u8>,
    pub probabilities: Vec<f64>,
    pub alerts: Vec<bool>,
    pub alert_threshold: f64,
    pub model_info: ClassifierModelInfo,
}

impl ClassifierModel {
    pub fn probabilities(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>, ModelError> {
        let x = self
            .preprocessor
            .transform(&matrix.select_with_regions(&self.feature_columns, &self.region_vocabulary)?)?;
        self.booster.predict_batch(&x)
    }

    pub fn predict(&self, matrix: &FeatureMatrix, alert_threshold: f64) -> Result<SeverityPrediction, ModelError> {
        let probabilities = self.probabilities(matrix)?;
        Ok(SeverityPrediction {
            predictions: probabilities.iter().map(|p| u8::from(*p > DECISION_THRESHOLD)).collect(),
            alerts: probabilities.iter().map(|p| *p > alert_threshold).collect(),
            probabilities,
            alert_threshold,
            model_info: ClassifierModelInfo {
                accuracy: self.report.accuracy,
                training_samples: self.training_samples,
            },
        })
    }
}

/// Global imbalance-aware severe-weather classifier
#[derive(Debug, Clone)]
pub struct SeverityClassifier {
    backend: Arc<dyn NumericBackend>,
    params: BoostingParams,
    alert_threshold: f64,
}

impl SeverityClassifier {
    pub fn new(config: &MlConfig, backend: Arc<dyn NumericBackend>) -> Self {
        Self {
            backend,
            params: BoostingParams {
                n_estimators: config.xgboost_n_estimators,
                max_depth: config.xgboost_max_depth,
                learning_rate: config.xgboost_learning_rate,
                seed: config.random_seed,
                ..Default::default()
            },
            alert_threshold: config.severe_weather_threshold,
        }
    }

    pub fn alert_threshold(&self) -> f64 {
        self.alert_threshold
    }

    pub fn train(&self, matrix: &FeatureMatrix) -> Result<ClassifierModel, ModelError> {
        self.backend.ensure_available()?;

        if matrix.len() < MIN_CLASSIFIER_ROWS {
            return Err(ModelError::insufficient("classifier", MIN_CLASSIFIER_ROWS, matrix.len()));
        }

        let excluded: Vec<String> = Parameter::all().iter().map(|p| p.to_string()).collect();
        let excluded: Vec<&str> = excluded.iter().map(String::as_str).collect();
        let feature_columns = matrix.feature_columns_excluding(&excluded);
        let region_vocabulary = matrix.region_names();
        let x = matrix.select_with_regions(&feature_columns, &region_vocabulary)?;

        let (train_idx, test_idx) = stratified_split(&matrix.labels, TEST_FRACTION, self.params.seed);
        let positive = train_idx.iter().filter(|&&i| matrix.labels[i] == 1).count();
        let negative = train_idx.len() - positive;
        if positive == 0 {
            return Err(ModelError::insufficient("classifier positive class", 1, 0));
        }
        if negative == 0 {
            return Err(ModelError::insufficient("classifier negative class", 1, 0));
        }
        let scale_pos_weight = negative as f64 / positive as f64;

        let pick = |idx: &[usize]| -> Vec<Vec<f64>> { idx.iter().map(|&i| x[i].clone()).collect() };
        let x_train = pick(&train_idx);
        let x_test = pick(&test_idx);
        let y_train: Vec<f64> = train_idx.iter().map(|&i| f64::from(matrix.labels[i])).collect();
        let y_test: Vec<u8> = test_idx.iter().map(|&i| matrix.labels[i]).collect();

        let preprocessor = Preprocessor::fit(&x_train)?;
        let x_train = preprocessor.transform(&x_train)?;
        let x_test = preprocessor.transform(&x_test)?;

        let booster = GradientBoostedTrees::fit(
            &x_train,
            &y_train,
            &self.params,
            Objective::Logistic { scale_pos_weight },
        )?;

        let predicted: Vec<u8> = booster
            .predict_batch(&x_test)?
            .into_iter()
            .map(|p| u8::from(p > DECISION_THRESHOLD))
            .collect();
        let report = ClassificationReport::compute(&y_test, &predicted);

        let feature_importances = feature_columns
            .iter()
            .cloned()
            .zip(booster.feature_importances())
            .collect();

        info!(
            positive,
            negative,
            scale_pos_weight,
            accuracy = report.accuracy,
            precision = report.severe.precision,
            recall = report.severe.recall,
            "Trained severity classifier"
        );

        Ok(ClassifierModel {
            feature_columns,
            region_vocabulary,
            preprocessor,
            booster,
            scale_pos_weight,
            class_counts: ClassCounts { negative, positive },
            report,
            feature_importances,
            training_samples: train_idx.len(),
            trained_at: Utc::now(),
        })
    }

    pub fn predict(&self, model: &ClassifierModel, matrix: &FeatureMatrix) -> Result<SeverityPrediction, ModelError> {
        self.backend.ensure_available()?;
        model.predict(matrix, self.alert_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::BuiltinBackend;
    use crate::domain::Reading;
    use crate::features::FeatureEngineer;
    use chrono::{Duration, TimeZone};

    fn readings(n: usize, severe_every: Option<usize>) -> Vec<Reading> {
        let start = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let mut r = Reading::new(if i % 2 == 0 { "north" } else { "south" }, start + Duration::minutes(5 * (i / 2) as i64));
                if severe_every.map_or(false, |k| i % k == 0) {
                    r.wind_speed = 28.0;
                    r.visibility = 1.0;
                }
                r
            })
            .collect()
    }

    fn classifier() -> SeverityClassifier {
        let config = MlConfig {
            xgboost_n_estimators: 30,
            xgboost_max_depth: 3,
            ..Default::default()
        };
        SeverityClassifier::new(&config, Arc::new(BuiltinBackend))
    }

    #[test]
    fn test_stratified_split_proportions() {
        let labels: Vec<u8> = (0..100).map(|i| u8::from(i % 10 == 0)).collect();
        let (train, test) = stratified_split(&labels, 0.2, 42);
        assert_eq!(test.len(), 20);
        assert_eq!(test.iter().filter(|&&i| labels[i] == 1).count(), 2);
        assert_eq!(train.len(), 80);
        assert!(train.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(stratified_split(&labels, 0.2, 42), (train, test));
    }

    #[test]
    fn test_scale_pos_weight_from_training_split() {
        let matrix = FeatureEngineer::new().transform(&readings(400, Some(8)));
        let model = classifier().train(&matrix).unwrap();
        let counts = model.class_counts;
        assert_eq!(counts.positive + counts.negative, model.training_samples);
        assert_eq!(model.scale_pos_weight, counts.negative as f64 / counts.positive as f64);
        assert_eq!(counts.positive, 40);
        assert!(model.feature_columns.iter().all(|c| c != "wind_speed" && c != "visibility"));
    }

    #[test]
    fn test_learns_severity_rule() {
        let matrix = FeatureEngineer::new().transform(&readings(400, Some(8)));
        let classifier = classifier();
        let model = classifier.train(&matrix).unwrap();
        assert!(model.report.accuracy > 0.95);

        let prediction = classifier.predict(&model, &matrix).unwrap();
        assert_eq!(prediction.probabilities.len(), 400);
        assert!(prediction.probabilities.iter().all(|p| (0.0..=1.0).contains(p)));
        assert_eq!(prediction.alert_threshold, 0.7);
        for (alert, p) in prediction.alerts.iter().zip(&prediction.probabilities) {
            assert_eq!(*alert, *p > 0.7);
        }
    }

    #[test]
    fn test_single_class_is_insufficient() {
        let matrix = FeatureEngineer::new().transform(&readings(200, None));
        assert!(matches!(
            classifier().train(&matrix),
            Err(ModelError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_too_few_rows() {
        let matrix = FeatureEngineer::new().transform(&readings(50, Some(5)));
        assert!(matches!(
            classifier().train(&matrix),
            Err(ModelError::InsufficientData { required: 100, actual: 50, .. })
        ));
    }
}
