//! Gradient-boosted learners, the model registry and training orchestration
//!
//! - [`ensemble`]: per (region, parameter) regression with grid search
//! - [`classifier`]: global severe-weather classifier
//! - [`registry`] and [`persistence`]: model ownership and versioned bundles
//! - [`training`]: the [`ModelTrainer`] facade used by callers

pub mod boosting;
pub mod classifier;
pub mod ensemble;
pub mod persistence;
pub mod preprocess;
pub mod registry;
pub mod report;
pub mod search;
pub mod training;

pub use boosting::{BoostingParams, GradientBoostedTrees, Objective};
pub use classifier::{stratified_split, ClassifierModel, SeverityClassifier, SeverityPrediction};
pub use ensemble::{EnsembleForecaster, EnsembleModel, EnsemblePrediction};
pub use persistence::{ArimaBundle, BundleFamily, BundleHeader, LearnerBundle, SCHEMA_VERSION};
pub use registry::ModelRegistry;
pub use report::{ClassMetrics, ClassificationReport};
pub use search::{HyperParams, SearchOutcome};
pub use training::{BatchPredictions, ModelFamily, ModelTrainer, TrainingFailure, TrainingSummary};
