//! Column-wise preprocessing fitted on a training split

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

fn check_width(row: &[f64], expected: usize, what: &str) -> Result<(), ModelError> {
    if row.len() != expected {
        return Err(ModelError::ShapeMismatch(format!(
            "{} expects {} columns, got {}",
            what,
            expected,
            row.len()
        )));
    }
    Ok(())
}

/// Replaces missing values by per-column training medians
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedianImputer {
    pub medians: Vec<f64>,
}

impl MedianImputer {
    /// Columns with no present value impute to zero
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let width = rows.first().map_or(0, |r| r.len());
        let medians = (0..width)
            .map(|c| {
                let mut present: Vec<f64> = rows.iter().map(|r| r[c]).filter(|v| !v.is_nan()).collect();
                if present.is_empty() {
                    return 0.0;
                }
                present.sort_by(f64::total_cmp);
                let mid = present.len() / 2;
                if present.len() % 2 == 0 {
                    (present[mid - 1] + present[mid]) / 2.0
                } else {
                    present[mid]
                }
            })
            .collect();
        Self { medians }
    }

    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>, ModelError> {
        check_width(row, self.medians.len(), "imputer")?;
        Ok(row
            .iter()
            .zip(&self.medians)
            .map(|(v, m)| if v.is_nan() { *m } else { *v })
            .collect())
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ModelError> {
        rows.iter().map(|r| self.transform_row(r)).collect()
    }
}

/// Zero-mean, unit-variance scaling (population variance)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
}

impl StandardScaler {
    /// Constant columns keep a scale of 1
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let width = rows.first().map_or(0, |r| r.len());
        let n = rows.len().max(1) as f64;
        let mut means = vec![0.0; width];
        let mut scales = vec![1.0; width];
        for c in 0..width {
            let mean = rows.iter().map(|r| r[c]).sum::<f64>() / n;
            let variance = rows.iter().map(|r| (r[c] - mean).powi(2)).sum::<f64>() / n;
            means[c] = mean;
            if variance > 0.0 {
                scales[c] = variance.sqrt();
            }
        }
        Self { means, scales }
    }

    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>, ModelError> {
        check_width(row, self.means.len(), "scaler")?;
        Ok(row
            .iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(v, (m, s))| (v - m) / s)
            .collect())
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ModelError> {
        rows.iter().map(|r| self.transform_row(r)).collect()
    }
}

/// Imputer followed by scaler, both fitted on the same rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    pub imputer: MedianImputer,
    pub scaler: StandardScaler,
}

impl Preprocessor {
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self, ModelError> {
        let imputer = MedianImputer::fit(rows);
        let imputed = imputer.transform(rows)?;
        let scaler = StandardScaler::fit(&imputed);
        Ok(Self { imputer, scaler })
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ModelError> {
        rows.iter()
            .map(|r| self.scaler.transform_row(&self.imputer.transform_row(r)?))
            .collect()
    }
}
