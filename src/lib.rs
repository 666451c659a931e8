//! Regional weather forecasting and severe-weather classification.
//!
//! Readings flow through [`features::FeatureEngineer`] into three model
//! families: per-key ARIMA forecasters, per-key boosted-tree ensembles and a
//! global severity classifier. [`ml::ModelTrainer`] owns them through a
//! [`ml::ModelRegistry`] and handles retraining, batch prediction and
//! persistence.

pub mod capability;
pub mod config;
pub mod domain;
pub mod error;
pub mod features;
pub mod forecast;
pub mod ml;
pub mod telemetry;

pub use capability::{Availability, BuiltinBackend, NumericBackend, UnavailableBackend};
pub use config::Config;
pub use domain::{AlertLevel, ModelKey, Parameter, Reading, SeverityRecord};
pub use error::{ErrorKind, ModelError, PredictionError, PredictionOutcome};
pub use ml::ModelTrainer;
