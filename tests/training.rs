//! Training passes, the registry and bundle persistence

mod common;

use chrono::{Duration, Utc};
use std::sync::Arc;
use weather_intel::ml::{stratified_split, ModelFamily};
use weather_intel::{ErrorKind, ModelKey, ModelTrainer, Parameter, UnavailableBackend};

use common::{readings, region_readings, test_config, trainer};

const REGIONS: [&str; 2] = ["north", "south"];

#[test]
fn test_train_all_installs_every_family() {
    let tmp = tempfile::tempdir().unwrap();
    let mut trainer = trainer(tmp.path());
    assert!(trainer.needs_retrain(Utc::now()));

    let data = readings(&REGIONS, 300);
    let summary = trainer.train_all(&data);

    let expected = REGIONS.len() * Parameter::all().len();
    assert!(summary.failures.is_empty(), "{:?}", summary.failures);
    assert_eq!(summary.forecasts_trained.len(), expected);
    assert_eq!(summary.ensembles_trained.len(), expected);
    assert!(summary.classifier_trained);
    assert_eq!(trainer.registry().keys().len(), expected);
    assert_eq!(trainer.registry().regions(), vec!["north".to_string(), "south".to_string()]);
    assert!(!trainer.needs_retrain(Utc::now()));
    assert!(trainer.needs_retrain(Utc::now() + Duration::hours(25)));
}

#[test]
fn test_classifier_weights_follow_training_split() {
    let tmp = tempfile::tempdir().unwrap();
    let mut trainer = trainer(tmp.path());
    let data = readings(&REGIONS, 300);
    let matrix = trainer.features(&data);
    trainer.train_classifier(&matrix).unwrap();

    let (train_idx, _) = stratified_split(&matrix.labels, 0.2, 42);
    let positive = train_idx.iter().filter(|&&i| matrix.labels[i] == 1).count();
    let negative = train_idx.len() - positive;

    let model = trainer.registry().classifier().unwrap();
    assert_eq!(model.class_counts.positive, positive);
    assert_eq!(model.class_counts.negative, negative);
    assert!((model.scale_pos_weight - negative as f64 / positive as f64).abs() < 1e-12);
    assert!(model.feature_columns.iter().all(|c| c != "temperature" && c != "wind_speed"));

    let prediction = trainer.predict_severe_weather(&matrix).unwrap();
    assert_eq!(prediction.predictions.len(), matrix.len());
    assert!(prediction.probabilities.iter().all(|p| (0.0..=1.0).contains(p)));
    assert_eq!(prediction.alert_threshold, 0.7);
    for (p, alert) in prediction.probabilities.iter().zip(&prediction.alerts) {
        assert_eq!(*alert, *p > 0.7);
    }
}

#[test]
fn test_classifier_needs_both_classes() {
    let tmp = tempfile::tempdir().unwrap();
    let mut trainer = trainer(tmp.path());
    let mut data = readings(&["north"], 200);
    for r in data.iter_mut() {
        r.wind_speed = 5.0;
        r.visibility = 10.0;
        r.weather_condition = "Clear".to_string();
    }
    let matrix = trainer.features(&data);
    let err = trainer.train_classifier(&matrix).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientData);
    assert_eq!(trainer.registry().classifier().unwrap_err().kind(), ErrorKind::ModelNotFound);
}

#[test]
fn test_saved_bundles_reload_identically() {
    let tmp = tempfile::tempdir().unwrap();
    let mut original = trainer(tmp.path());
    let data = readings(&REGIONS, 300);
    let summary = original.train_all(&data);
    assert!(summary.failures.is_empty(), "{:?}", summary.failures);
    original.save_all().unwrap();

    let mut restored = trainer(tmp.path());
    let loaded = restored.load_all().unwrap();
    assert_eq!(loaded, 2 * REGIONS.len() * Parameter::all().len() + 1);
    assert_eq!(restored.last_training_time(), original.last_training_time());

    let matrix = original.features(&data);
    for key in original.registry().keys() {
        assert_eq!(
            restored.predict_forecast(&key, Some(12)).unwrap(),
            original.predict_forecast(&key, Some(12)).unwrap()
        );
        assert_eq!(
            restored.predict_ensemble(&key, &matrix).unwrap(),
            original.predict_ensemble(&key, &matrix).unwrap()
        );
    }
    assert_eq!(
        restored.predict_severe_weather(&matrix).unwrap(),
        original.predict_severe_weather(&matrix).unwrap()
    );
}

#[test]
fn test_failed_retrain_keeps_previous_model() {
    let tmp = tempfile::tempdir().unwrap();
    let mut trainer = trainer(tmp.path());
    let key = ModelKey::new("north", Parameter::Temperature);
    let data = region_readings("north", 300, 9);
    let first = trainer.train_one(&data, &key);
    assert_eq!(first.forecasts_trained, vec![key.clone()]);
    assert_eq!(first.ensembles_trained, vec![key.clone()]);
    let before = trainer.predict_forecast(&key, Some(6)).unwrap();
    let matrix = trainer.features(&data);
    let ensemble_before = trainer.predict_ensemble(&key, &matrix).unwrap();

    let retrain = trainer.train_one(&data[..4], &key);
    assert_eq!(retrain.trained_count(), 0);
    assert_eq!(retrain.failures.len(), 2);
    assert!(retrain
        .failures
        .iter()
        .all(|f| f.error.kind == ErrorKind::InsufficientData && f.key.as_ref() == Some(&key)));
    assert_eq!(trainer.predict_forecast(&key, Some(6)).unwrap(), before);
    assert_eq!(trainer.predict_ensemble(&key, &matrix).unwrap(), ensemble_before);
}

#[test]
fn test_failed_retrain_keeps_previous_classifier() {
    let tmp = tempfile::tempdir().unwrap();
    let mut trainer = trainer(tmp.path());
    let data = readings(&REGIONS, 300);
    let matrix = trainer.features(&data);
    trainer.train_classifier(&matrix).unwrap();
    let before = trainer.predict_severe_weather(&matrix).unwrap();

    let short = trainer.features(&data[..50]);
    let err = trainer.train_classifier(&short).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientData);

    let summary = trainer.train_all(&data[..50]);
    assert!(!summary.classifier_trained);
    assert!(summary
        .failures
        .iter()
        .any(|f| f.family == ModelFamily::Classifier && f.error.kind == ErrorKind::InsufficientData));
    assert_eq!(trainer.predict_severe_weather(&matrix).unwrap(), before);
}

#[test]
fn test_train_one_uses_training_window() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = test_config(tmp.path());
    config.ml.training_window_hours = 12;
    let mut trainer = ModelTrainer::new(&config, Arc::new(weather_intel::BuiltinBackend));
    let data = region_readings("north", 300, 21);
    let key = ModelKey::new("north", Parameter::Temperature);

    // 12 h of 5-minute readings, both ends inclusive
    let window = trainer.training_window(&data);
    assert_eq!(window.len(), 145);
    assert_eq!(window[0].timestamp, data[155].timestamp);

    let summary = trainer.train_one(&data, &key);
    assert!(summary.failures.is_empty(), "{:?}", summary.failures);
    let one = trainer.registry().forecast(&key).unwrap().training_samples;
    let ensemble_rows = trainer.registry().ensemble(&key).unwrap().training_samples;
    assert_eq!(one, 145);
    assert!((100..145).contains(&ensemble_rows));

    trainer.train_all(&data);
    assert_eq!(trainer.registry().forecast(&key).unwrap().training_samples, one);
    assert_eq!(trainer.registry().ensemble(&key).unwrap().training_samples, ensemble_rows);
}

#[test]
fn test_classifier_codes_regions_from_training() {
    let tmp = tempfile::tempdir().unwrap();
    let mut trainer = trainer(tmp.path());
    let data = readings(&REGIONS, 300);
    let matrix = trainer.features(&data);
    trainer.train_classifier(&matrix).unwrap();
    assert_eq!(
        trainer.registry().classifier().unwrap().region_vocabulary,
        vec!["north".to_string(), "south".to_string()]
    );

    let south: Vec<_> = data.iter().filter(|r| r.region == "south").cloned().collect();
    let alone = trainer.predict_severe_weather(&trainer.features(&south)).unwrap();
    let in_batch = trainer.predict_severe_weather(&matrix.for_region("south")).unwrap();
    assert_eq!(alone.probabilities, in_batch.probabilities);
}

#[test]
fn test_corrupt_learner_bundle_leaves_registry_untouched() {
    let tmp = tempfile::tempdir().unwrap();
    let saved_dir = tmp.path().join("saved");
    let mut saved = trainer(&saved_dir);
    let key = ModelKey::new("north", Parameter::Temperature);
    saved.train_one(&region_readings("north", 300, 31), &key);
    saved.save_all().unwrap();
    std::fs::write(saved.learner_bundle_path(), b"garbage").unwrap();

    let mut live = trainer(&saved_dir);
    live.train_one(&region_readings("north", 300, 32), &key);
    let forecast_before = live.predict_forecast(&key, Some(6)).unwrap();
    let trained_at = live.last_training_time();

    let err = live.load_all().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert_eq!(live.predict_forecast(&key, Some(6)).unwrap(), forecast_before);
    assert_eq!(live.last_training_time(), trained_at);
    assert!(live.registry().ensemble(&key).is_ok());
}

#[test]
fn test_untrained_key_is_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let trainer = trainer(tmp.path());
    let key = ModelKey::new("nowhere", Parameter::Humidity);
    assert_eq!(trainer.predict_forecast(&key, None).unwrap_err().kind(), ErrorKind::ModelNotFound);
    assert_eq!(trainer.feature_importance(Some(&key)).unwrap_err().kind(), ErrorKind::ModelNotFound);
    assert_eq!(trainer.feature_importance(None).unwrap_err().kind(), ErrorKind::ModelNotFound);
    assert!(trainer.batch_predict_all(&Parameter::batch_defaults()).is_empty());
}

#[test]
fn test_evicted_key_is_gone() {
    let tmp = tempfile::tempdir().unwrap();
    let mut trainer = trainer(tmp.path());
    let key = ModelKey::new("north", Parameter::Pressure);
    trainer.train_forecast(&region_readings("north", 120, 4), &key).unwrap();
    assert!(trainer.evict(&key));
    assert!(!trainer.evict(&key));
    assert_eq!(trainer.predict_forecast(&key, None).unwrap_err().kind(), ErrorKind::ModelNotFound);
}

#[test]
fn test_feature_importances_are_normalized() {
    let tmp = tempfile::tempdir().unwrap();
    let mut trainer = trainer(tmp.path());
    let data = readings(&["north"], 300);
    let key = ModelKey::new("north", Parameter::Humidity);
    let matrix = trainer.features(&data);
    trainer.train_ensemble(&matrix, &key).unwrap();

    let importances = trainer.feature_importance(Some(&key)).unwrap();
    assert!(!importances.contains_key("humidity"));
    assert!(importances.contains_key("temperature"));
    let total: f64 = importances.values().sum();
    assert!((total - 1.0).abs() < 1e-9);
    assert!(importances.values().all(|v| *v >= 0.0));
}

#[test]
fn test_unavailable_backend_fails_every_operation() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let data = readings(&["north"], 300);

    let mut offline = ModelTrainer::new(&config, Arc::new(UnavailableBackend::new("disabled for test")));
    let summary = offline.train_all(&data);
    assert_eq!(summary.trained_count(), 0);
    assert!(summary.failures.iter().all(|f| f.error.kind == ErrorKind::Unavailable));
    assert!(summary.failures.iter().any(|f| f.family == ModelFamily::Classifier));
    assert!(offline.last_training_time().is_none());

    let mut online = common::trainer(tmp.path());
    let key = ModelKey::new("north", Parameter::Temperature);
    online.train_forecast(&data, &key).unwrap();
    online.save_arima(&online.arima_bundle_path()).unwrap();

    offline.load_arima(&offline.arima_bundle_path()).unwrap();
    assert_eq!(offline.predict_forecast(&key, Some(3)).unwrap_err().kind(), ErrorKind::Unavailable);
    let batch = offline.batch_predict_all(&[Parameter::Temperature]);
    assert_eq!(batch["north"][&Parameter::Temperature].error().unwrap().kind, ErrorKind::Unavailable);
}

#[test]
fn test_loading_missing_bundle_is_persistence_error() {
    let tmp = tempfile::tempdir().unwrap();
    let mut trainer = trainer(tmp.path());
    let err = trainer.load_all().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Persistence);
}
