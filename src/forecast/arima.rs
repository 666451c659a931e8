//! ARIMA(p, d, q) estimated by conditional sum of squares.
//!
//! The series is differenced `d` times; a mean term is only estimated when
//! `d == 0`. AR and MA polynomials are kept inside the stationary/invertible
//! region during optimization, and forecast variance comes from the
//! psi-weights of the integrated AR polynomial.

use serde::{Deserialize, Serialize};
use statrs::function::erf::erf_inv;
use std::fmt;

use super::optimize::NelderMead;
use crate::error::ModelError;

/// Smallest innovation variance reported, keeps log-likelihoods finite
const MIN_VARIANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
}

impl ArimaOrder {
    pub const fn new(p: usize, d: usize, q: usize) -> Self {
        Self { p, d, q }
    }

    /// Shortest series that can be fitted with this order
    pub fn min_samples(&self) -> usize {
        self.p + self.d + self.q + 3
    }

    fn includes_mean(&self) -> bool {
        self.d == 0
    }

    /// Count of estimated parameters including the innovation variance
    pub fn parameter_count(&self) -> usize {
        self.p + self.q + usize::from(self.includes_mean()) + 1
    }
}

impl From<(usize, usize, usize)> for ArimaOrder {
    fn from((p, d, q): (usize, usize, usize)) -> Self {
        Self::new(p, d, q)
    }
}

impl fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.p, self.d, self.q)
    }
}

/// Point forecasts with symmetric interval bounds
#[derive(Debug, Clone, PartialEq)]
pub struct ArimaForecast {
    pub mean: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

/// A fitted model. Holds only the tail of the training series needed to
/// continue the recursion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArimaFit {
    pub order: ArimaOrder,
    /// Mean of the (undifferenced) series, zero when `d > 0`
    pub mean: f64,
    pub ar: Vec<f64>,
    pub ma: Vec<f64>,
    pub sigma2: f64,
    pub log_likelihood: f64,
    pub aic: f64,
    /// Observations that entered the conditional likelihood
    pub n_effective: usize,
    /// Last `p + d + 1` values of the training series
    history: Vec<f64>,
    /// Last `q` in-sample residuals
    residual_tail: Vec<f64>,
}

pub(crate) fn difference(values: &[f64], times: usize) -> Vec<f64> {
    let mut current = values.to_vec();
    for _ in 0..times {
        current = current.windows(2).map(|w| w[1] - w[0]).collect();
    }
    current
}

/// Reflection-coefficient test for `x_t = Σ a_i x_{t-i}` being stationary
pub(crate) fn is_stationary(coefficients: &[f64]) -> bool {
    let mut a = coefficients.to_vec();
    while let Some(&k) = a.last() {
        if !k.is_finite() || k.abs() >= 1.0 {
            return false;
        }
        let order = a.len();
        let denom = 1.0 - k * k;
        let reduced: Vec<f64> = (0..order - 1)
            .map(|i| (a[i] + k * a[order - 2 - i]) / denom)
            .collect();
        a = reduced;
    }
    true
}

/// `1 + θ_1 B + ... + θ_q B^q` has all roots outside the unit circle
pub(crate) fn is_invertible(ma: &[f64]) -> bool {
    let negated: Vec<f64> = ma.iter().map(|t| -t).collect();
    is_stationary(&negated)
}

/// Yule-Walker AR estimates via Levinson-Durbin
fn yule_walker(values: &[f64], p: usize) -> Vec<f64> {
    if p == 0 || values.len() <= p {
        return vec![0.0; p];
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let centered: Vec<f64> = values.iter().map(|x| x - mean).collect();
    let autocov: Vec<f64> = (0..=p)
        .map(|k| centered[k..].iter().zip(&centered).map(|(a, b)| a * b).sum::<f64>() / n)
        .collect();

    if autocov[0].abs() < 1e-12 {
        return vec![0.0; p];
    }

    let mut phi: Vec<f64> = Vec::with_capacity(p);
    let mut error = autocov[0];
    for k in 1..=p {
        let acc = autocov[k] - (1..k).map(|j| phi[j - 1] * autocov[k - j]).sum::<f64>();
        let reflection = acc / error;
        let previous = phi.clone();
        for j in 1..k {
            phi[j - 1] = previous[j - 1] - reflection * previous[k - j - 1];
        }
        phi.push(reflection);
        error *= 1.0 - reflection * reflection;
        if error <= 0.0 {
            break;
        }
    }
    phi.resize(p, 0.0);
    phi
}

struct Css<'a> {
    order: ArimaOrder,
    w: &'a [f64],
}

impl<'a> Css<'a> {
    fn unpack(&self, params: &[f64]) -> (f64, Vec<f64>, Vec<f64>) {
        let offset = usize::from(self.order.includes_mean());
        let mean = if offset == 1 { params[0] } else { 0.0 };
        let ar = params[offset..offset + self.order.p].to_vec();
        let ma = params[offset + self.order.p..].to_vec();
        (mean, ar, ma)
    }

    fn residuals(&self, mean: f64, ar: &[f64], ma: &[f64]) -> Vec<f64> {
        let p = ar.len();
        let mut residuals = vec![0.0; self.w.len()];
        for t in p..self.w.len() {
            let mut prediction = 0.0;
            for (i, phi) in ar.iter().enumerate() {
                prediction += phi * (self.w[t - i - 1] - mean);
            }
            for (j, theta) in ma.iter().enumerate() {
                if t >= j + 1 {
                    prediction += theta * residuals[t - j - 1];
                }
            }
            residuals[t] = self.w[t] - mean - prediction;
        }
        residuals
    }

    fn n_effective(&self) -> usize {
        self.w.len() - self.order.p
    }

    fn sigma2(&self, residuals: &[f64]) -> f64 {
        let sse: f64 = residuals[self.order.p..].iter().map(|e| e * e).sum();
        (sse / self.n_effective() as f64).max(MIN_VARIANCE)
    }

    fn objective(&self, params: &[f64]) -> f64 {
        let (mean, ar, ma) = self.unpack(params);
        if !is_stationary(&ar) || !is_invertible(&ma) {
            return f64::INFINITY;
        }
        self.sigma2(&self.residuals(mean, &ar, &ma)).ln()
    }
}

impl ArimaFit {
    /// Estimate the model on a gap-free series
    pub fn fit(values: &[f64], order: ArimaOrder) -> Result<Self, ModelError> {
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::InvalidInput("ARIMA input contains NaN or infinite values".into()));
        }
        if values.len() < order.min_samples() {
            return Err(ModelError::insufficient(
                format!("ARIMA{}", order),
                order.min_samples(),
                values.len(),
            ));
        }

        let w = difference(values, order.d);
        let css = Css { order, w: &w };

        let mut start = Vec::with_capacity(order.parameter_count());
        if order.includes_mean() {
            start.push(w.iter().sum::<f64>() / w.len() as f64);
        }
        let ar0 = yule_walker(&w, order.p);
        if is_stationary(&ar0) {
            start.extend(ar0);
        } else {
            start.extend(std::iter::repeat(0.0).take(order.p));
        }
        start.extend(std::iter::repeat(0.0).take(order.q));

        let optimizer = NelderMead {
            max_iterations: 200 * start.len().max(1),
            ..Default::default()
        };
        let minimum = optimizer.minimize(|x| css.objective(x), &start);
        if !minimum.value.is_finite() {
            return Err(ModelError::Training(format!(
                "ARIMA{} optimization did not reach a feasible point",
                order
            )));
        }

        let (mean, ar, ma) = css.unpack(&minimum.point);
        let residuals = css.residuals(mean, &ar, &ma);
        let sigma2 = css.sigma2(&residuals);
        let n_effective = css.n_effective();
        let log_likelihood =
            -(n_effective as f64) / 2.0 * ((2.0 * std::f64::consts::PI * sigma2).ln() + 1.0);
        let aic = -2.0 * log_likelihood + 2.0 * order.parameter_count() as f64;

        let history_len = (order.p + order.d + 1).min(values.len());
        let history = values[values.len() - history_len..].to_vec();
        let residual_tail = residuals[residuals.len() - order.q.min(residuals.len())..].to_vec();

        Ok(Self {
            order,
            mean,
            ar,
            ma,
            sigma2,
            log_likelihood,
            aic,
            n_effective,
            history,
            residual_tail,
        })
    }

    /// Psi-weights of the integrated ARMA process, `psi[0] = 1`
    fn psi_weights(&self, steps: usize) -> Vec<f64> {
        // φ(B)(1 - B)^d as 1 - Σ a_i B^i
        let mut poly: Vec<f64> = std::iter::once(1.0).chain(self.ar.iter().map(|a| -a)).collect();
        for _ in 0..self.order.d {
            let mut next = vec![0.0; poly.len() + 1];
            for (i, c) in poly.iter().enumerate() {
                next[i] += c;
                next[i + 1] -= c;
            }
            poly = next;
        }
        let a: Vec<f64> = poly[1..].iter().map(|c| -c).collect();

        let mut psi = vec![0.0; steps];
        for j in 0..steps {
            if j == 0 {
                psi[0] = 1.0;
                continue;
            }
            let mut value = if j <= self.ma.len() { self.ma[j - 1] } else { 0.0 };
            for i in 1..=j.min(a.len()) {
                value += a[i - 1] * psi[j - i];
            }
            psi[j] = value;
        }
        psi
    }

    /// Multi-step forecast with two-sided bounds at `confidence`
    pub fn forecast(&self, steps: usize, confidence: f64) -> ArimaForecast {
        let d = self.order.d;
        let levels: Vec<Vec<f64>> = (0..d).map(|k| difference(&self.history, k)).collect();
        let mut w = difference(&self.history, d);
        let mut residuals = self.residual_tail.clone();

        let mut predictions = Vec::with_capacity(steps);
        for _ in 0..steps {
            let mut value = self.mean;
            for (i, phi) in self.ar.iter().enumerate() {
                value += phi * (w[w.len() - i - 1] - self.mean);
            }
            for (j, theta) in self.ma.iter().enumerate() {
                if residuals.len() > j {
                    value += theta * residuals[residuals.len() - j - 1];
                }
            }
            w.push(value);
            residuals.push(0.0);
            predictions.push(value);
        }

        for level in levels.iter().rev() {
            let mut last = level.last().copied().unwrap_or(0.0);
            for value in predictions.iter_mut() {
                last += *value;
                *value = last;
            }
        }

        let z = std::f64::consts::SQRT_2 * erf_inv(confidence);
        let psi = self.psi_weights(steps);
        let mut cumulative = 0.0;
        let mut lower = Vec::with_capacity(steps);
        let mut upper = Vec::with_capacity(steps);
        for (point, weight) in predictions.iter().zip(&psi) {
            cumulative += weight * weight;
            let half_width = z * (self.sigma2 * cumulative).sqrt();
            lower.push(point - half_width);
            upper.push(point + half_width);
        }

        ArimaForecast {
            mean: predictions,
            lower,
            upper,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};
    use rstest::rstest;

    fn ar1(phi: f64, n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, 1.0).unwrap();
        let mut x = 0.0;
        (0..n)
            .map(|_| {
                x = phi * x + noise.sample(&mut rng);
                10.0 + x
            })
            .collect()
    }

    #[rstest]
    #[case(vec![0.5], true)]
    #[case(vec![1.2], false)]
    #[case(vec![0.5, 0.3], true)]
    #[case(vec![0.5, 0.6], false)]
    #[case(vec![], true)]
    fn test_stationarity_region(#[case] coefficients: Vec<f64>, #[case] expected: bool) {
        assert_eq!(is_stationary(&coefficients), expected);
    }

    #[test]
    fn test_recovers_ar1_coefficient() {
        let series = ar1(0.6, 800, 3);
        let fit = ArimaFit::fit(&series, ArimaOrder::new(1, 0, 0)).unwrap();
        assert!((fit.ar[0] - 0.6).abs() < 0.1, "phi = {}", fit.ar[0]);
        assert!((fit.mean - 10.0).abs() < 0.5);
        assert!((fit.sigma2 - 1.0).abs() < 0.2);
    }

    #[test]
    fn test_linear_trend_extrapolates() {
        let series: Vec<f64> = (0..100).map(|i| 2.0 * i as f64).collect();
        let fit = ArimaFit::fit(&series, ArimaOrder::new(0, 2, 0)).unwrap();
        let forecast = fit.forecast(3, 0.95);
        for (step, value) in forecast.mean.iter().enumerate() {
            assert!((value - 2.0 * (100 + step) as f64).abs() < 1e-6);
        }
    }

    #[test]
    fn test_intervals_widen_with_horizon() {
        let series = ar1(0.3, 400, 5);
        let fit = ArimaFit::fit(&series, ArimaOrder::new(2, 1, 2)).unwrap();
        let forecast = fit.forecast(12, 0.95);
        assert_eq!(forecast.mean.len(), 12);
        let widths: Vec<f64> = forecast.upper.iter().zip(&forecast.lower).map(|(u, l)| u - l).collect();
        assert!(widths.windows(2).all(|w| w[1] >= w[0] - 1e-12));
        for i in 0..12 {
            assert!(forecast.lower[i] <= forecast.mean[i] && forecast.mean[i] <= forecast.upper[i]);
        }
    }

    #[test]
    fn test_too_short_series() {
        let err = ArimaFit::fit(&[1.0, 2.0, 3.0], ArimaOrder::new(2, 1, 2)).unwrap_err();
        assert!(matches!(err, ModelError::InsufficientData { required: 8, actual: 3, .. }));
    }

    #[test]
    fn test_rejects_nan() {
        let mut series = ar1(0.5, 50, 1);
        series[10] = f64::NAN;
        assert!(matches!(
            ArimaFit::fit(&series, ArimaOrder::new(1, 0, 0)),
            Err(ModelError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_parameter_count_and_aic() {
        let series = ar1(0.5, 300, 9);
        let fit = ArimaFit::fit(&series, ArimaOrder::new(1, 0, 1)).unwrap();
        assert_eq!(fit.order.parameter_count(), 4);
        assert!((fit.aic - (-2.0 * fit.log_likelihood + 8.0)).abs() < 1e-9);
        assert!(is_invertible(&fit.ma));
    }
}
