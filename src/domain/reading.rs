use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// A single weather observation for one region, as delivered by ingestion.
///
/// Tracked numeric parameters may be missing in raw input; missing values are
/// represented as `NaN` and filled during feature engineering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub region: String,
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "lon")]
    pub longitude: f64,
    #[serde(default = "missing", deserialize_with = "nullable_f64")]
    pub temperature: f64,
    #[serde(default = "missing", deserialize_with = "nullable_f64")]
    pub humidity: f64,
    #[serde(default = "missing", deserialize_with = "nullable_f64")]
    pub pressure: f64,
    #[serde(default = "missing", deserialize_with = "nullable_f64")]
    pub wind_speed: f64,
    #[serde(default)]
    pub wind_direction: f64,
    #[serde(default = "missing", deserialize_with = "nullable_f64")]
    pub visibility: f64,
    #[serde(default)]
    pub weather_condition: String,
    #[serde(default)]
    pub cloud_coverage: f64,
    #[serde(default)]
    pub precipitation: f64,
    #[serde(default)]
    pub uv_index: f64,
    #[serde(default)]
    pub air_quality_index: Option<i32>,
}

fn missing() -> f64 {
    f64::NAN
}

fn nullable_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

impl Reading {
    /// Benign reading with typical mid-latitude values
    pub fn new(region: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            region: region.into(),
            latitude: 0.0,
            longitude: 0.0,
            temperature: 20.0,
            humidity: 60.0,
            pressure: 1013.25,
            wind_speed: 5.0,
            wind_direction: 180.0,
            visibility: 10.0,
            weather_condition: "Clear".to_string(),
            cloud_coverage: 0.0,
            precipitation: 0.0,
            uv_index: 0.0,
            air_quality_index: None,
        }
    }

    /// Value of a tracked parameter (may be NaN when missing)
    pub fn value(&self, parameter: Parameter) -> f64 {
        match parameter {
            Parameter::Temperature => self.temperature,
            Parameter::Humidity => self.humidity,
            Parameter::Pressure => self.pressure,
            Parameter::WindSpeed => self.wind_speed,
            Parameter::Visibility => self.visibility,
        }
    }

    pub fn set_value(&mut self, parameter: Parameter, value: f64) {
        match parameter {
            Parameter::Temperature => self.temperature = value,
            Parameter::Humidity => self.humidity = value,
            Parameter::Pressure => self.pressure = value,
            Parameter::WindSpeed => self.wind_speed = value,
            Parameter::Visibility => self.visibility = value,
        }
    }
}

/// Weather parameters that get per-region models
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Parameter {
    Temperature,
    Humidity,
    Pressure,
    WindSpeed,
    Visibility,
}

impl Parameter {
    pub fn all() -> Vec<Parameter> {
        Parameter::iter().collect()
    }

    /// Parameters predicted by default in batch runs (visibility excluded)
    pub fn batch_defaults() -> Vec<Parameter> {
        vec![
            Parameter::Temperature,
            Parameter::Humidity,
            Parameter::Pressure,
            Parameter::WindSpeed,
        ]
    }
}

/// Registry key: one model pair per region and parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelKey {
    pub region: String,
    pub parameter: Parameter,
}

impl ModelKey {
    pub fn new(region: impl Into<String>, parameter: Parameter) -> Self {
        Self {
            region: region.into(),
            parameter,
        }
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.region, self.parameter)
    }
}
