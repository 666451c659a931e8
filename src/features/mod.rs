//! Feature engineering shared by the ensemble and the severity classifier

pub mod engineer;
pub mod physics;
pub mod window;

pub use engineer::{FeatureEngineer, FeatureMatrix, TemporalFeatures, LAG_PERIODS, REGION_COLUMN, ROLLING_WINDOWS};
