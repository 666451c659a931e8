//! Second-order gradient-boosted decision trees.
//!
//! Splits are searched over per-feature quantile histograms built once per
//! fit. Each tree is grown depth-first on a row subsample and a column
//! subsample drawn from a seeded generator, so a fit is a pure function of
//! its inputs and parameters.

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Upper bound on candidate thresholds per feature
pub const MAX_BINS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Objective {
    SquaredError,
    /// Binary log-loss; positive rows weighted by `scale_pos_weight`
    Logistic { scale_pos_weight: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    /// L2 regularization on leaf weights
    pub lambda: f64,
    /// Minimum hessian sum in each child
    pub min_child_weight: f64,
    pub seed: u64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 6,
            learning_rate: 0.1,
            subsample: 1.0,
            colsample_bytree: 1.0,
            lambda: 1.0,
            min_child_weight: 1.0,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// `x[feature] <= threshold` goes left
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

/// Candidate thresholds and the bin index of every training value
struct Histogram {
    thresholds: Vec<Vec<f64>>,
    /// `bins[feature][row]`; bin `b` holds values `<= thresholds[b]`, the last
    /// bin holds everything above
    bins: Vec<Vec<u16>>,
}

impl Histogram {
    fn build(x: &[Vec<f64>], n_features: usize) -> Self {
        let mut thresholds = Vec::with_capacity(n_features);
        let mut bins = Vec::with_capacity(n_features);

        for f in 0..n_features {
            let mut values: Vec<f64> = x.iter().map(|r| r[f]).filter(|v| !v.is_nan()).collect();
            values.sort_by(f64::total_cmp);
            values.dedup();

            let cuts: Vec<f64> = if values.len() <= MAX_BINS {
                values.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect()
            } else {
                let mut cuts: Vec<f64> = (1..MAX_BINS)
                    .map(|k| {
                        let pos = k * (values.len() - 1) / MAX_BINS;
                        (values[pos] + values[pos + 1]) / 2.0
                    })
                    .collect();
                cuts.dedup();
                cuts
            };

            let column: Vec<u16> = x
                .iter()
                .map(|r| {
                    let v = r[f];
                    if v.is_nan() {
                        cuts.len() as u16
                    } else {
                        cuts.partition_point(|t| *t < v) as u16
                    }
                })
                .collect();

            thresholds.push(cuts);
            bins.push(column);
        }

        Self { thresholds, bins }
    }
}

struct SplitCandidate {
    feature: usize,
    bin: usize,
    gain: f64,
}

struct TreeBuilder<'a> {
    histogram: &'a Histogram,
    grad: &'a [f64],
    hess: &'a [f64],
    features: &'a [usize],
    params: &'a BoostingParams,
    nodes: Vec<Node>,
    importance: Vec<f64>,
}

impl<'a> TreeBuilder<'a> {
    fn leaf_value(&self, g: f64, h: f64) -> f64 {
        -g / (h + self.params.lambda) * self.params.learning_rate
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.params.lambda)
    }

    fn best_split(&self, rows: &[usize], g_total: f64, h_total: f64) -> Option<SplitCandidate> {
        let mut best: Option<SplitCandidate> = None;
        let parent = self.score(g_total, h_total);

        for &f in self.features {
            let n_cuts = self.histogram.thresholds[f].len();
            if n_cuts == 0 {
                continue;
            }
            let mut g_bins = vec![0.0; n_cuts + 1];
            let mut h_bins = vec![0.0; n_cuts + 1];
            for &r in rows {
                let b = self.histogram.bins[f][r] as usize;
                g_bins[b] += self.grad[r];
                h_bins[b] += self.hess[r];
            }

            let (mut g_left, mut h_left) = (0.0, 0.0);
            for b in 0..n_cuts {
                g_left += g_bins[b];
                h_left += h_bins[b];
                let g_right = g_total - g_left;
                let h_right = h_total - h_left;
                if h_left < self.params.min_child_weight || h_right < self.params.min_child_weight {
                    continue;
                }
                let gain = self.score(g_left, h_left) + self.score(g_right, h_right) - parent;
                if gain > 1e-12 && best.as_ref().map_or(true, |s| gain > s.gain) {
                    best = Some(SplitCandidate { feature: f, bin: b, gain });
                }
            }
        }
        best
    }

    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let g: f64 = rows.iter().map(|&r| self.grad[r]).sum();
        let h: f64 = rows.iter().map(|&r| self.hess[r]).sum();
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: self.leaf_value(g, h),
        });

        if depth >= self.params.max_depth || rows.len() < 2 {
            return idx;
        }
        let Some(split) = self.best_split(&rows, g, h) else {
            return idx;
        };

        let bins = &self.histogram.bins[split.feature];
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&r| (bins[r] as usize) <= split.bin);

        self.importance[split.feature] += split.gain;
        let threshold = self.histogram.thresholds[split.feature][split.bin];
        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);
        self.nodes[idx] = Node::Split {
            feature: split.feature,
            threshold,
            left,
            right,
        };
        idx
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Boosted ensemble of regression trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    objective: Objective,
    base_margin: f64,
    trees: Vec<Tree>,
    n_features: usize,
    gain_importance: Vec<f64>,
}

impl GradientBoostedTrees {
    pub fn fit(
        x: &[Vec<f64>],
        y: &[f64],
        params: &BoostingParams,
        objective: Objective,
    ) -> Result<Self, ModelError> {
        if x.is_empty() {
            return Err(ModelError::insufficient("boosted trees", 1, 0));
        }
        if x.len() != y.len() {
            return Err(ModelError::ShapeMismatch(format!(
                "{} rows but {} targets",
                x.len(),
                y.len()
            )));
        }
        let n_features = x[0].len();
        if x.iter().any(|r| r.len() != n_features) {
            return Err(ModelError::ShapeMismatch("ragged feature rows".into()));
        }
        if params.n_estimators == 0 || params.learning_rate <= 0.0 {
            return Err(ModelError::InvalidInput(format!(
                "n_estimators and learning_rate must be positive, got {} and {}",
                params.n_estimators, params.learning_rate
            )));
        }

        let base_margin = match objective {
            Objective::SquaredError => y.iter().sum::<f64>() / y.len() as f64,
            Objective::Logistic { .. } => 0.0,
        };

        let histogram = Histogram::build(x, n_features);
        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut margins = vec![base_margin; x.len()];
        let mut grad = vec![0.0; x.len()];
        let mut hess = vec![0.0; x.len()];
        let mut trees = Vec::with_capacity(params.n_estimators);
        let mut gain_importance = vec![0.0; n_features];

        let n_columns = ((n_features as f64 * params.colsample_bytree).round() as usize).clamp(1, n_features.max(1));

        for _ in 0..params.n_estimators {
            for i in 0..x.len() {
                let (g, h) = match objective {
                    Objective::SquaredError => (margins[i] - y[i], 1.0),
                    Objective::Logistic { scale_pos_weight } => {
                        let p = sigmoid(margins[i]);
                        let w = if y[i] > 0.5 { scale_pos_weight } else { 1.0 };
                        (w * (p - y[i]), (w * p * (1.0 - p)).max(1e-16))
                    }
                };
                grad[i] = g;
                hess[i] = h;
            }

            let mut rows: Vec<usize> = if params.subsample < 1.0 {
                (0..x.len()).filter(|_| rng.gen::<f64>() < params.subsample).collect()
            } else {
                (0..x.len()).collect()
            };
            if rows.is_empty() {
                rows.push(rng.gen_range(0..x.len()));
            }

            let mut features: Vec<usize> = if n_columns < n_features {
                sample(&mut rng, n_features, n_columns).into_vec()
            } else {
                (0..n_features).collect()
            };
            features.sort_unstable();

            let mut builder = TreeBuilder {
                histogram: &histogram,
                grad: &grad,
                hess: &hess,
                features: &features,
                params,
                nodes: Vec::new(),
                importance: vec![0.0; n_features],
            };
            builder.grow(rows, 0);
            let tree = Tree { nodes: builder.nodes };
            for (total, gain) in gain_importance.iter_mut().zip(builder.importance) {
                *total += gain;
            }

            for (margin, row) in margins.iter_mut().zip(x) {
                *margin += tree.predict(row);
            }
            trees.push(tree);
        }

        Ok(Self {
            objective,
            base_margin,
            trees,
            n_features,
            gain_importance,
        })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    pub fn predict_margin(&self, row: &[f64]) -> Result<f64, ModelError> {
        if row.len() != self.n_features {
            return Err(ModelError::ShapeMismatch(format!(
                "model expects {} features, got {}",
                self.n_features,
                row.len()
            )));
        }
        Ok(self.base_margin + self.trees.iter().map(|t| t.predict(row)).sum::<f64>())
    }

    /// Regression value, or positive-class probability for the logistic objective
    pub fn predict(&self, row: &[f64]) -> Result<f64, ModelError> {
        let margin = self.predict_margin(row)?;
        Ok(match self.objective {
            Objective::SquaredError => margin,
            Objective::Logistic { .. } => sigmoid(margin),
        })
    }

    pub fn predict_batch(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        rows.iter().map(|r| self.predict(r)).collect()
    }

    /// Total split gain per feature, normalized to sum to one
    pub fn feature_importances(&self) -> Vec<f64> {
        let total: f64 = self.gain_importance.iter().sum();
        if total <= 0.0 {
            return vec![0.0; self.n_features];
        }
        self.gain_importance.iter().map(|g| g / total).collect()
    }
}
