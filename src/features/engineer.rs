use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::f64::consts::PI;

use super::physics::{heat_index, pressure_temperature_ratio, wind_chill};
use super::window::{diff, fill_missing, lag, rolling_mean, rolling_std};
use crate::domain::{is_severe, Parameter, Reading};
use crate::error::ModelError;

/// Lag offsets in 5-minute steps (5 min .. 2 h)
pub const LAG_PERIODS: [usize; 5] = [1, 3, 6, 12, 24];
/// Rolling window sizes in rows
pub const ROLLING_WINDOWS: [usize; 4] = [3, 6, 12, 24];
/// Column holding the region code
pub const REGION_COLUMN: &str = "region_encoded";

/// Calendar features of a single timestamp
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemporalFeatures {
    /// Hour of day (0-23)
    pub hour: u32,
    /// Day of week (0=Monday, 6=Sunday)
    pub day_of_week: u32,
    /// Month (1-12)
    pub month: u32,
    /// Day of year (1-366)
    pub day_of_year: u32,
    pub is_weekend: bool,
}

impl TemporalFeatures {
    pub fn from_timestamp(timestamp: DateTime<Utc>) -> Self {
        let day_of_week = timestamp.weekday().num_days_from_monday();
        Self {
            hour: timestamp.hour(),
            day_of_week,
            month: timestamp.month(),
            day_of_year: timestamp.ordinal(),
            is_weekend: day_of_week >= 5,
        }
    }

    /// Raw and sin/cos-encoded values in column order
    fn values(&self) -> [f64; 9] {
        let hour_angle = 2.0 * PI * self.hour as f64 / 24.0;
        let month_angle = 2.0 * PI * self.month as f64 / 12.0;
        [
            self.hour as f64,
            self.day_of_week as f64,
            self.month as f64,
            self.day_of_year as f64,
            if self.is_weekend { 1.0 } else { 0.0 },
            hour_angle.sin(),
            hour_angle.cos(),
            month_angle.sin(),
            month_angle.cos(),
        ]
    }

    const COLUMNS: [&'static str; 9] = [
        "hour",
        "day_of_week",
        "month",
        "day_of_year",
        "is_weekend",
        "hour_sin",
        "hour_cos",
        "month_sin",
        "month_cos",
    ];
}

/// Row-major feature matrix, one row per reading, ordered by (region, timestamp)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    pub regions: Vec<String>,
    pub timestamps: Vec<DateTime<Utc>>,
    /// Rule-derived `severe_weather` label per row
    pub labels: Vec<u8>,
}

impl FeatureMatrix {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[idx]).collect())
    }

    /// Distinct regions in sorted order
    pub fn region_names(&self) -> Vec<String> {
        self.regions
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Rows at the given indices, in the given order
    pub fn subset(&self, indices: &[usize]) -> FeatureMatrix {
        FeatureMatrix {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
            regions: indices.iter().map(|&i| self.regions[i].clone()).collect(),
            timestamps: indices.iter().map(|&i| self.timestamps[i]).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }

    pub fn for_region(&self, region: &str) -> FeatureMatrix {
        let indices: Vec<usize> = self
            .regions
            .iter()
            .enumerate()
            .filter(|(_, r)| r.as_str() == region)
            .map(|(i, _)| i)
            .collect();
        self.subset(&indices)
    }

    /// Project the named columns, failing on unknown names
    pub fn select(&self, columns: &[String]) -> Result<Vec<Vec<f64>>, ModelError> {
        let indices = columns
            .iter()
            .map(|name| {
                self.column_index(name)
                    .ok_or_else(|| ModelError::InvalidInput(format!("unknown feature column '{}'", name)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i]).collect())
            .collect())
    }

    /// Like [`select`](Self::select), but codes each row's region by its
    /// position in `vocabulary` instead of this batch's own region set.
    /// Regions outside the vocabulary get `NaN`.
    pub fn select_with_regions(&self, columns: &[String], vocabulary: &[String]) -> Result<Vec<Vec<f64>>, ModelError> {
        let mut x = self.select(columns)?;
        if let Some(pos) = columns.iter().position(|c| c == REGION_COLUMN) {
            for (row, region) in x.iter_mut().zip(&self.regions) {
                row[pos] = vocabulary
                    .iter()
                    .position(|r| r == region)
                    .map_or(f64::NAN, |i| i as f64);
            }
        }
        Ok(x)
    }

    /// Column names that remain after removing `excluded`
    pub fn feature_columns_excluding(&self, excluded: &[&str]) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| !excluded.contains(&c.as_str()))
            .cloned()
            .collect()
    }
}

/// Turns readings into the shared feature matrix.
///
/// Lag and rolling features are computed per region on that region's
/// timestamp-ordered series only.
#[derive(Debug, Clone, Default)]
pub struct FeatureEngineer;

impl FeatureEngineer {
    pub fn new() -> Self {
        Self
    }

    /// Ordered list of generated column names
    pub fn column_names(&self) -> Vec<String> {
        let mut columns: Vec<String> = Parameter::all().iter().map(|p| p.to_string()).collect();
        columns.extend(TemporalFeatures::COLUMNS.iter().map(|c| c.to_string()));

        for parameter in Parameter::all() {
            for k in LAG_PERIODS {
                columns.push(format!("{}_lag_{}", parameter, k));
            }
        }
        for parameter in Parameter::all() {
            for window in ROLLING_WINDOWS {
                columns.push(format!("{}_ma_{}", parameter, window));
                columns.push(format!("{}_std_{}", parameter, window));
            }
        }

        columns.extend(
            [
                "heat_index",
                "wind_chill",
                "pressure_temp_ratio",
                "temp_extreme",
                "high_wind",
                "poor_visibility",
                "pressure_change",
                "pressure_change_rate",
                REGION_COLUMN,
            ]
            .iter()
            .map(|c| c.to_string()),
        );
        columns
    }

    pub fn transform(&self, readings: &[Reading]) -> FeatureMatrix {
        let mut order: Vec<usize> = (0..readings.len()).collect();
        order.sort_by(|&a, &b| {
            readings[a]
                .region
                .cmp(&readings[b].region)
                .then(readings[a].timestamp.cmp(&readings[b].timestamp))
        });

        let region_vocabulary: Vec<&str> = readings
            .iter()
            .map(|r| r.region.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut matrix = FeatureMatrix {
            columns: self.column_names(),
            rows: Vec::with_capacity(readings.len()),
            regions: Vec::with_capacity(readings.len()),
            timestamps: Vec::with_capacity(readings.len()),
            labels: Vec::with_capacity(readings.len()),
        };

        let mut start = 0;
        while start < order.len() {
            let region = readings[order[start]].region.as_str();
            let mut end = start;
            while end < order.len() && readings[order[end]].region == region {
                end += 1;
            }
            let group: Vec<&Reading> = order[start..end].iter().map(|&i| &readings[i]).collect();
            let encoded = region_vocabulary
                .iter()
                .position(|r| *r == region)
                .unwrap_or_default() as f64;
            self.transform_region(&group, encoded, &mut matrix);
            start = end;
        }

        matrix
    }

    fn transform_region(&self, group: &[&Reading], region_encoded: f64, matrix: &mut FeatureMatrix) {
        let parameters = Parameter::all();
        let filled: Vec<Vec<f64>> = parameters
            .iter()
            .map(|&p| {
                let raw: Vec<f64> = group.iter().map(|r| r.value(p)).collect();
                fill_missing(&raw)
            })
            .collect();

        let lags: Vec<Vec<Vec<f64>>> = filled
            .iter()
            .map(|series| LAG_PERIODS.iter().map(|&k| lag(series, k)).collect())
            .collect();
        let rolling: Vec<Vec<(Vec<f64>, Vec<f64>)>> = filled
            .iter()
            .map(|series| {
                ROLLING_WINDOWS
                    .iter()
                    .map(|&w| (rolling_mean(series, w, 1), rolling_std(series, w, 1)))
                    .collect()
            })
            .collect();

        let pressure_idx = parameter_index(Parameter::Pressure);
        let pressure_change = diff(&filled[pressure_idx]);
        let pressure_change_rate = rolling_mean(&pressure_change, 3, 3);

        let (t, h, w, v) = (
            parameter_index(Parameter::Temperature),
            parameter_index(Parameter::Humidity),
            parameter_index(Parameter::WindSpeed),
            parameter_index(Parameter::Visibility),
        );

        for (i, reading) in group.iter().enumerate() {
            let mut row = Vec::with_capacity(matrix.columns.len());
            row.extend(filled.iter().map(|series| series[i]));
            row.extend(TemporalFeatures::from_timestamp(reading.timestamp).values());

            for per_param in &lags {
                row.extend(per_param.iter().map(|series| series[i]));
            }
            for per_param in &rolling {
                for (mean, std) in per_param {
                    row.push(mean[i]);
                    row.push(std[i]);
                }
            }

            let temperature = filled[t][i];
            let wind = filled[w][i];
            let visibility = filled[v][i];
            row.push(heat_index(temperature, filled[h][i]));
            row.push(wind_chill(temperature, wind));
            row.push(pressure_temperature_ratio(filled[pressure_idx][i], temperature));
            row.push(indicator(temperature < 0.0 || temperature > 35.0));
            row.push(indicator(wind > 15.0));
            row.push(indicator(visibility < 5.0));
            row.push(pressure_change[i]);
            row.push(pressure_change_rate[i]);
            row.push(region_encoded);

            let mut effective = (*reading).clone();
            for (p, series) in parameters.iter().zip(filled.iter()) {
                effective.set_value(*p, series[i]);
            }

            matrix.rows.push(row);
            matrix.regions.push(reading.region.clone());
            matrix.timestamps.push(reading.timestamp);
            matrix.labels.push(is_severe(&effective) as u8);
        }
    }
}

fn parameter_index(parameter: Parameter) -> usize {
    Parameter::all()
        .iter()
        .position(|p| *p == parameter)
        .unwrap_or_default()
}

fn indicator(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn series(region: &str, n: usize, offset: f64) -> Vec<Reading> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let mut r = Reading::new(region, start + Duration::minutes(5 * i as i64));
                r.temperature = offset + i as f64;
                r.pressure = 1000.0 + (i % 7) as f64;
                r
            })
            .collect()
    }

    #[test]
    fn test_column_count_matches_rows() {
        let engineer = FeatureEngineer::new();
        let matrix = engineer.transform(&series("north", 30, 10.0));
        assert_eq!(matrix.len(), 30);
        assert_eq!(matrix.columns.len(), engineer.column_names().len());
        assert!(matrix.rows.iter().all(|r| r.len() == matrix.columns.len()));
    }

    #[test]
    fn test_lag_columns_follow_series() {
        let matrix = FeatureEngineer::new().transform(&series("north", 30, 10.0));
        let lag3 = matrix.column("temperature_lag_3").unwrap();
        assert!(lag3[2].is_nan());
        assert_eq!(lag3[3], 10.0);
        assert_eq!(lag3[29], 36.0);
        let ma3 = matrix.column("temperature_ma_3").unwrap();
        assert_eq!(ma3[0], 10.0);
        assert_eq!(ma3[5], 14.0);
    }

    #[test]
    fn test_rows_sorted_by_region_and_time() {
        let mut readings = series("south", 5, 0.0);
        readings.extend(series("north", 5, 0.0));
        readings.reverse();
        let matrix = FeatureEngineer::new().transform(&readings);
        assert_eq!(matrix.regions[0], "north");
        assert_eq!(matrix.regions[9], "south");
        assert!(matrix.timestamps[0] < matrix.timestamps[1]);
        let encoded = matrix.column("region_encoded").unwrap();
        assert_eq!(encoded[0], 0.0);
        assert_eq!(encoded[9], 1.0);
    }

    #[test]
    fn test_region_codes_follow_vocabulary() {
        let engineer = FeatureEngineer::new();
        let mut readings = series("north", 5, 0.0);
        readings.extend(series("south", 5, 0.0));
        let vocabulary = engineer.transform(&readings).region_names();
        let columns = vec![REGION_COLUMN.to_string(), "temperature".to_string()];

        let south_only = engineer.transform(&series("south", 5, 0.0));
        assert_eq!(south_only.column(REGION_COLUMN).unwrap()[0], 0.0);
        let x = south_only.select_with_regions(&columns, &vocabulary).unwrap();
        assert!(x.iter().all(|row| row[0] == 1.0));
        assert_eq!(x[2][1], 2.0);

        let west = engineer.transform(&series("west", 3, 0.0));
        let x = west.select_with_regions(&columns, &vocabulary).unwrap();
        assert!(x.iter().all(|row| row[0].is_nan()));
    }

    #[test]
    fn test_missing_values_filled_before_lags() {
        let mut readings = series("north", 10, 10.0);
        readings[4].temperature = f64::NAN;
        let matrix = FeatureEngineer::new().transform(&readings);
        let temps = matrix.column("temperature").unwrap();
        // mean of the 3-row trailing window [12, 13, NaN]
        assert_eq!(temps[4], 12.5);
        assert_eq!(matrix.column("temperature_lag_1").unwrap()[5], 12.5);
    }

    #[test]
    fn test_severity_label() {
        let mut readings = series("north", 3, 20.0);
        readings[0].temperature = -10.0;
        readings[1].temperature = 20.0;
        readings[1].wind_speed = 5.0;
        readings[1].visibility = 10.0;
        readings[2].weather_condition = "Tornado".to_string();
        let matrix = FeatureEngineer::new().transform(&readings);
        assert_eq!(matrix.labels, vec![1, 0, 1]);
    }

    #[test]
    fn test_transform_is_deterministic() {
        let readings = series("north", 40, 5.0);
        let engineer = FeatureEngineer::new();
        let a = engineer.transform(&readings);
        let b = engineer.transform(&readings);
        assert_eq!(format!("{:?}", a.rows), format!("{:?}", b.rows));
    }

    #[test]
    fn test_select_unknown_column() {
        let matrix = FeatureEngineer::new().transform(&series("north", 5, 0.0));
        assert!(matrix.select(&["no_such_column".to_string()]).is_err());
        let selected = matrix.select(&["hour".to_string(), "temperature".to_string()]).unwrap();
        assert_eq!(selected[0].len(), 2);
    }

    proptest! {
        #[test]
        fn prop_other_region_never_leaks(
            deltas in proptest::collection::vec(-50.0f64..50.0, 40)
        ) {
            let north = series("north", 40, 10.0);
            let south = series("south", 40, 0.0);

            let mut baseline = north.clone();
            baseline.extend(south.clone());

            let mut mutated_south = south.clone();
            for (r, d) in mutated_south.iter_mut().zip(deltas.iter()) {
                r.temperature += d;
                r.pressure -= d;
            }
            let mut mutated = north.clone();
            mutated.extend(mutated_south);

            let engineer = FeatureEngineer::new();
            let a = engineer.transform(&baseline).for_region("north");
            let b = engineer.transform(&mutated).for_region("north");
            let fmt = |rows: &Vec<Vec<f64>>| format!("{:?}", rows);
            prop_assert_eq!(fmt(&a.rows), fmt(&b.rows));
        }
    }
}
