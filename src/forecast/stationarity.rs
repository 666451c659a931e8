//! Augmented Dickey-Fuller unit-root test (constant, no trend).
//!
//! Lag length is chosen by AIC over `0..=maxlag` on a common sample, then the
//! regression is re-estimated on the full sample for the selected lag.
//! p-values use MacKinnon's (1994) response surface and critical values the
//! 2010 finite-sample coefficients.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use statrs::function::erf::erfc;

use crate::error::ModelError;

/// Significance level below which a series is treated as stationary
pub const SIGNIFICANCE: f64 = 0.05;

const TAU_MAX: f64 = 2.74;
const TAU_MIN: f64 = -18.83;
const TAU_STAR: f64 = -1.61;
const TAU_SMALLP: [f64; 3] = [2.1659, 1.4412, 0.038269];
const TAU_LARGEP: [f64; 4] = [1.7339, 0.93202, -0.12745, -0.010368];

const CRIT_1: [f64; 4] = [-3.43035, -6.5393, -16.786, -79.433];
const CRIT_5: [f64; 4] = [-2.86154, -2.8903, -4.234, -40.040];
const CRIT_10: [f64; 4] = [-2.56677, -1.5384, -2.809, 0.0];

/// Critical values of the test statistic
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriticalValues {
    pub one_percent: f64,
    pub five_percent: f64,
    pub ten_percent: f64,
}

/// Outcome of [`adf_test`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationarityReport {
    pub adf_statistic: f64,
    pub p_value: f64,
    pub critical_values: CriticalValues,
    pub used_lag: usize,
    pub n_obs: usize,
    pub is_stationary: bool,
}

struct OlsFit {
    coefficients: DVector<f64>,
    xtx_inv: DMatrix<f64>,
    ssr: f64,
    n: usize,
}

impl OlsFit {
    fn aic(&self) -> f64 {
        let n = self.n as f64;
        let llf = -n / 2.0 * ((2.0 * std::f64::consts::PI).ln() + (self.ssr / n).ln() + 1.0);
        -2.0 * llf + 2.0 * self.coefficients.len() as f64
    }

    fn t_value(&self, index: usize) -> f64 {
        let dof = self.n.saturating_sub(self.coefficients.len()).max(1) as f64;
        let sigma2 = self.ssr / dof;
        let se = (sigma2 * self.xtx_inv[(index, index)]).sqrt();
        self.coefficients[index] / se
    }
}

fn ols(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<OlsFit> {
    let xt = x.transpose();
    let xtx_inv = (&xt * x).try_inverse()?;
    let coefficients = &xtx_inv * (&xt * y);
    let residuals = y - x * &coefficients;
    Some(OlsFit {
        coefficients,
        xtx_inv,
        ssr: residuals.norm_squared(),
        n: y.len(),
    })
}

/// Design for `Δy_t = β·y_{t-1} + Σ γ_i·Δy_{t-i} + α`, rows `first..dy.len()`
fn design(levels: &[f64], dy: &[f64], lags: usize, first: usize) -> (DMatrix<f64>, DVector<f64>) {
    let rows = dy.len() - first;
    let cols = lags + 2;
    let x = DMatrix::from_fn(rows, cols, |r, c| {
        let t = first + r;
        match c {
            0 => levels[t],
            c if c <= lags => dy[t - c],
            _ => 1.0,
        }
    });
    let y = DVector::from_iterator(rows, dy[first..].iter().copied());
    (x, y)
}

fn normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

fn polyval(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Approximate p-value of an ADF statistic (constant, one series)
pub fn mackinnon_p_value(statistic: f64) -> f64 {
    if statistic > TAU_MAX {
        return 1.0;
    }
    if statistic < TAU_MIN {
        return 0.0;
    }
    if statistic <= TAU_STAR {
        normal_cdf(polyval(&TAU_SMALLP, statistic))
    } else {
        normal_cdf(polyval(&TAU_LARGEP, statistic))
    }
}

/// Finite-sample critical values for `n_obs` observations
pub fn critical_values(n_obs: usize) -> CriticalValues {
    let inv = 1.0 / n_obs.max(1) as f64;
    CriticalValues {
        one_percent: polyval(&CRIT_1, inv),
        five_percent: polyval(&CRIT_5, inv),
        ten_percent: polyval(&CRIT_10, inv),
    }
}

fn is_constant(values: &[f64]) -> bool {
    values.windows(2).all(|w| (w[0] - w[1]).abs() < 1e-12)
}

/// Run the test on a gap-free series.
///
/// A constant series cannot reject the unit root and reports `p_value = 1`.
pub fn adf_test(values: &[f64]) -> Result<StationarityReport, ModelError> {
    let n = values.len();
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::InvalidInput("stationarity test requires finite values".into()));
    }
    if n < 8 {
        return Err(ModelError::insufficient("stationarity test", 8, n));
    }

    if is_constant(values) {
        let n_obs = n - 1;
        return Ok(StationarityReport {
            adf_statistic: 0.0,
            p_value: 1.0,
            critical_values: critical_values(n_obs),
            used_lag: 0,
            n_obs,
            is_stationary: false,
        });
    }

    let dy: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    let schwert = (12.0 * (n as f64 / 100.0).powf(0.25)).ceil() as usize;
    let maxlag = schwert.min((n / 2).saturating_sub(2));

    let mut best: Option<(usize, f64)> = None;
    for lags in 0..=maxlag {
        let (x, y) = design(values, &dy, lags, maxlag);
        if let Some(fit) = ols(&x, &y) {
            let aic = fit.aic();
            if best.map_or(true, |(_, b)| aic < b) {
                best = Some((lags, aic));
            }
        }
    }

    let used_lag = best.map(|(lags, _)| lags).unwrap_or(0);
    let (x, y) = design(values, &dy, used_lag, used_lag);
    let fit = ols(&x, &y)
        .ok_or_else(|| ModelError::Training("singular stationarity regression".into()))?;

    let adf_statistic = fit.t_value(0);
    let p_value = mackinnon_p_value(adf_statistic);

    Ok(StationarityReport {
        adf_statistic,
        p_value,
        critical_values: critical_values(fit.n),
        used_lag,
        n_obs: fit.n,
        is_stationary: p_value < SIGNIFICANCE,
    })
}
