//! Fixed-cadence resampling of irregular readings

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::BTreeMap;

/// Bin width used by the forecaster
pub const CADENCE_MINUTES: i64 = 5;

/// Evenly spaced series produced by [`resample`]
#[derive(Debug, Clone, PartialEq)]
pub struct ResampledSeries {
    pub timestamps: Vec<DateTime<Utc>>,
    pub values: Vec<f64>,
}

impl ResampledSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamps.last().copied()
    }
}

fn bin_start(timestamp: DateTime<Utc>, cadence_secs: i64) -> i64 {
    timestamp.timestamp().div_euclid(cadence_secs) * cadence_secs
}

/// Bin `(timestamp, value)` pairs into 5-minute buckets aligned to the epoch.
///
/// Each bin holds the mean of its non-NaN values and is labelled by its start.
/// Empty bins between the first and last observation take the previous bin's
/// value; leading bins without any value are dropped.
pub fn resample(points: &[(DateTime<Utc>, f64)]) -> ResampledSeries {
    let cadence_secs = CADENCE_MINUTES * 60;
    let mut bins: BTreeMap<i64, (f64, usize)> = BTreeMap::new();

    for (timestamp, value) in points {
        let entry = bins.entry(bin_start(*timestamp, cadence_secs)).or_insert((0.0, 0));
        if !value.is_nan() {
            entry.0 += value;
            entry.1 += 1;
        }
    }

    let (first, last) = match (bins.keys().next(), bins.keys().next_back()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => {
            return ResampledSeries {
                timestamps: Vec::new(),
                values: Vec::new(),
            }
        }
    };

    let mut timestamps = Vec::new();
    let mut values = Vec::new();
    let mut previous: Option<f64> = None;
    let mut start = first;

    while start <= last {
        let current = match bins.get(&start) {
            Some((sum, count)) if *count > 0 => Some(sum / *count as f64),
            _ => previous,
        };
        if let Some(value) = current {
            if let Some(ts) = Utc.timestamp_opt(start, 0).single() {
                timestamps.push(ts);
                values.push(value);
            }
            previous = Some(value);
        }
        start += cadence_secs;
    }

    ResampledSeries { timestamps, values }
}

/// `steps` timestamps one cadence apart, starting one cadence after `last`
pub fn future_timestamps(last: DateTime<Utc>, steps: usize) -> Vec<DateTime<Utc>> {
    (1..=steps as i64)
        .map(|i| last + Duration::minutes(CADENCE_MINUTES * i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(minute: i64, second: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
            + Duration::minutes(minute)
            + Duration::seconds(second)
    }

    #[test]
    fn test_bins_take_mean_and_start_label() {
        let series = resample(&[(at(0, 10), 1.0), (at(3, 0), 3.0), (at(5, 0), 10.0)]);
        assert_eq!(series.values, vec![2.0, 10.0]);
        assert_eq!(series.timestamps, vec![at(0, 0), at(5, 0)]);
    }

    #[test]
    fn test_empty_bins_forward_filled() {
        let series = resample(&[(at(0, 0), 1.0), (at(15, 0), 4.0)]);
        assert_eq!(series.values, vec![1.0, 1.0, 1.0, 4.0]);
        assert_eq!(series.timestamps[3], at(15, 0));
    }

    #[test]
    fn test_leading_missing_bins_dropped() {
        let series = resample(&[(at(0, 0), f64::NAN), (at(5, 0), 2.0), (at(10, 0), f64::NAN)]);
        assert_eq!(series.values, vec![2.0, 2.0]);
        assert_eq!(series.timestamps[0], at(5, 0));
    }

    #[test]
    fn test_unordered_input() {
        let series = resample(&[(at(10, 0), 3.0), (at(0, 0), 1.0), (at(5, 0), 2.0)]);
        assert_eq!(series.values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_empty() {
        assert!(resample(&[]).is_empty());
    }

    #[test]
    fn test_future_timestamps() {
        let ts = future_timestamps(at(0, 0), 3);
        assert_eq!(ts, vec![at(5, 0), at(10, 0), at(15, 0)]);
    }
}
