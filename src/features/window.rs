//! Lag and rolling-window helpers over a single ordered series.
//!
//! All outputs are aligned with the input: position `i` describes the series
//! up to and including `i`. Positions without enough history hold `NaN`.

/// Value `lag` steps back, aligned to the input length
pub fn lag(values: &[f64], lag: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| if i >= lag { values[i - lag] } else { f64::NAN })
        .collect()
}

/// First difference, `NaN` at the start
pub fn diff(values: &[f64]) -> Vec<f64> {
    (0..values.len())
        .map(|i| if i >= 1 { values[i] - values[i - 1] } else { f64::NAN })
        .collect()
}

fn window(values: &[f64], end: usize, size: usize) -> &[f64] {
    let start = (end + 1).saturating_sub(size);
    &values[start..=end]
}

/// Trailing mean over `size` rows, ignoring `NaN`, requiring at least
/// `min_periods` present values
pub fn rolling_mean(values: &[f64], size: usize, min_periods: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            let present: Vec<f64> = window(values, i, size)
                .iter()
                .copied()
                .filter(|v| !v.is_nan())
                .collect();
            if present.is_empty() || present.len() < min_periods {
                f64::NAN
            } else {
                present.iter().sum::<f64>() / present.len() as f64
            }
        })
        .collect()
}

/// Trailing sample standard deviation (ddof = 1) over `size` rows.
///
/// Needs two present values; a single value yields `NaN`.
pub fn rolling_std(values: &[f64], size: usize, min_periods: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            let present: Vec<f64> = window(values, i, size)
                .iter()
                .copied()
                .filter(|v| !v.is_nan())
                .collect();
            if present.len() < min_periods.max(2) {
                return f64::NAN;
            }
            let n = present.len() as f64;
            let mean = present.iter().sum::<f64>() / n;
            let variance = present.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
            variance.sqrt()
        })
        .collect()
}

/// Fill gaps with the trailing 3-row mean, then forward and backward fill
pub fn fill_missing(values: &[f64]) -> Vec<f64> {
    let smoothed = rolling_mean(values, 3, 1);
    let mut filled: Vec<f64> = values
        .iter()
        .zip(smoothed.iter())
        .map(|(v, s)| if v.is_nan() { *s } else { *v })
        .collect();

    let mut last = f64::NAN;
    for v in filled.iter_mut() {
        if v.is_nan() {
            *v = last;
        } else {
            last = *v;
        }
    }

    let mut next = f64::NAN;
    for v in filled.iter_mut().rev() {
        if v.is_nan() {
            *v = next;
        } else {
            next = *v;
        }
    }

    filled
}
