use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Binary classification quality on a held-out split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub accuracy: f64,
    pub benign: ClassMetrics,
    pub severe: ClassMetrics,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn class_metrics(actual: &[u8], predicted: &[u8], class: u8) -> ClassMetrics {
    let tp = actual.iter().zip(predicted).filter(|(a, p)| **a == class && **p == class).count();
    let predicted_count = predicted.iter().filter(|p| **p == class).count();
    let support = actual.iter().filter(|a| **a == class).count();
    let precision = ratio(tp, predicted_count);
    let recall = ratio(tp, support);
    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };
    ClassMetrics {
        precision,
        recall,
        f1,
        support,
    }
}

impl ClassificationReport {
    /// Metrics with zero-division cases reported as 0
    pub fn compute(actual: &[u8], predicted: &[u8]) -> Self {
        let n = actual.len().min(predicted.len());
        let (actual, predicted) = (&actual[..n], &predicted[..n]);
        let correct = actual.iter().zip(predicted).filter(|(a, p)| a == p).count();

        let benign = class_metrics(actual, predicted, 0);
        let severe = class_metrics(actual, predicted, 1);
        let macro_avg = ClassMetrics {
            precision: (benign.precision + severe.precision) / 2.0,
            recall: (benign.recall + severe.recall) / 2.0,
            f1: (benign.f1 + severe.f1) / 2.0,
            support: n,
        };
        let weight = |b: f64, s: f64| {
            if n == 0 {
                0.0
            } else {
                (b * benign.support as f64 + s * severe.support as f64) / n as f64
            }
        };
        let weighted_avg = ClassMetrics {
            precision: weight(benign.precision, severe.precision),
            recall: weight(benign.recall, severe.recall),
            f1: weight(benign.f1, severe.f1),
            support: n,
        };

        Self {
            accuracy: ratio(correct, n),
            benign,
            severe,
            macro_avg,
            weighted_avg,
        }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "accuracy={:.3} severe: precision={:.3} recall={:.3} f1={:.3} support={}",
            self.accuracy, self.severe.precision, self.severe.recall, self.severe.f1, self.severe.support
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_values() {
        let actual = [0, 0, 0, 1, 1];
        let predicted = [0, 1, 0, 1, 0];
        let report = ClassificationReport::compute(&actual, &predicted);
        assert!((report.accuracy - 0.6).abs() < 1e-12);
        assert!((report.severe.precision - 0.5).abs() < 1e-12);
        assert!((report.severe.recall - 0.5).abs() < 1e-12);
        assert_eq!(report.severe.support, 2);
        assert!((report.benign.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((report.benign.recall - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(report.weighted_avg.support, 5);
    }

    #[test]
    fn test_no_positive_predictions() {
        let report = ClassificationReport::compute(&[0, 1], &[0, 0]);
        assert_eq!(report.severe.precision, 0.0);
        assert_eq!(report.severe.f1, 0.0);
        assert_eq!(report.accuracy, 0.5);
    }
}
