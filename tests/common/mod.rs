//! Seeded synthetic readings shared by the integration tests

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::path::Path;
use std::sync::Arc;
use weather_intel::config::{Config, SearchSpace};
use weather_intel::{BuiltinBackend, ModelTrainer, Reading};

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// `n` readings 5 minutes apart with a daily cycle, noise and periodic storms
pub fn region_readings(region: &str, n: usize, seed: u64) -> Vec<Reading> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 1.0).unwrap();
    (0..n)
        .map(|i| {
            let phase = 2.0 * std::f64::consts::PI * i as f64 / 288.0;
            let mut r = Reading::new(region, start() + Duration::minutes(5 * i as i64));
            r.temperature = 12.0 + 8.0 * phase.sin() + 0.5 * noise.sample(&mut rng);
            r.humidity = 65.0 - 10.0 * phase.sin() + noise.sample(&mut rng);
            r.pressure = 1013.0 + 3.0 * (i as f64 / 500.0).sin() + 0.2 * noise.sample(&mut rng);
            r.wind_speed = (5.0 + 2.0 * noise.sample(&mut rng)).abs();
            r.visibility = (10.0 + noise.sample(&mut rng)).max(0.5);
            if i % 37 == 0 {
                r.wind_speed = 25.0;
                r.visibility = 1.0;
                r.weather_condition = "Thunderstorm".to_string();
            }
            r
        })
        .collect()
}

pub fn readings(regions: &[&str], n: usize) -> Vec<Reading> {
    regions
        .iter()
        .enumerate()
        .flat_map(|(k, region)| region_readings(region, n, 100 + k as u64))
        .collect()
}

/// Configuration with a single-candidate grid to keep training fast
pub fn test_config(registry_path: &Path) -> Config {
    let mut config = Config::default();
    config.ml.model_registry_path = registry_path.to_path_buf();
    config.ml.xgboost_n_estimators = 20;
    config.ml.xgboost_max_depth = 3;
    config.search = SearchSpace {
        n_estimators: vec![15],
        max_depth: vec![3],
        learning_rate: vec![0.3],
        subsample: vec![1.0],
        colsample_bytree: vec![1.0],
        cv_folds: 3,
    };
    config
}

pub fn trainer(registry_path: &Path) -> ModelTrainer {
    ModelTrainer::new(&test_config(registry_path), Arc::new(BuiltinBackend))
}
