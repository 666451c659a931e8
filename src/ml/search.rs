//! Exhaustive hyperparameter search with contiguous k-fold validation

use itertools::iproduct;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::boosting::{BoostingParams, GradientBoostedTrees, Objective};
use crate::config::SearchSpace;
use crate::error::ModelError;

/// One point of the ensemble search space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HyperParams {
    pub colsample_bytree: f64,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub n_estimators: usize,
    pub subsample: f64,
}

impl HyperParams {
    pub fn boosting(&self, seed: u64) -> BoostingParams {
        BoostingParams {
            n_estimators: self.n_estimators,
            max_depth: self.max_depth,
            learning_rate: self.learning_rate,
            subsample: self.subsample,
            colsample_bytree: self.colsample_bytree,
            seed,
            ..Default::default()
        }
    }
}

/// Candidates with keys in alphabetical order, the last key varying fastest
pub fn candidates(space: &SearchSpace) -> Vec<HyperParams> {
    iproduct!(
        space.colsample_bytree.iter(),
        space.learning_rate.iter(),
        space.max_depth.iter(),
        space.n_estimators.iter(),
        space.subsample.iter()
    )
    .map(|(&colsample_bytree, &learning_rate, &max_depth, &n_estimators, &subsample)| HyperParams {
        colsample_bytree,
        learning_rate,
        max_depth,
        n_estimators,
        subsample,
    })
    .collect()
}

/// Contiguous folds; the first `n % k` folds hold one extra row
pub fn kfold(n: usize, k: usize) -> Vec<(Vec<usize>, Vec<usize>)> {
    let base = n / k;
    let extra = n % k;
    let mut start = 0;
    (0..k)
        .map(|fold| {
            let size = base + usize::from(fold < extra);
            let test: Vec<usize> = (start..start + size).collect();
            let train: Vec<usize> = (0..start).chain(start + size..n).collect();
            start += size;
            (train, test)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub best: HyperParams,
    /// Mean validation MAE of `best`
    pub best_score: f64,
    pub scores: Vec<(HyperParams, f64)>,
}

fn take(rows: &[Vec<f64>], idx: &[usize]) -> Vec<Vec<f64>> {
    idx.iter().map(|&i| rows[i].clone()).collect()
}

fn cross_validate(
    x: &[Vec<f64>],
    y: &[f64],
    folds: &[(Vec<usize>, Vec<usize>)],
    params: &BoostingParams,
) -> Result<f64, ModelError> {
    let mut total = 0.0;
    for (train, test) in folds {
        let train_y: Vec<f64> = train.iter().map(|&i| y[i]).collect();
        let model = GradientBoostedTrees::fit(&take(x, train), &train_y, params, Objective::SquaredError)?;
        let mae = test
            .iter()
            .map(|&i| model.predict(&x[i]).map(|p| (p - y[i]).abs()))
            .sum::<Result<f64, ModelError>>()?
            / test.len() as f64;
        total += mae;
    }
    Ok(total / folds.len() as f64)
}

/// Evaluate every candidate in parallel and keep the lowest mean MAE.
///
/// Ties keep the earliest candidate, so the result does not depend on
/// thread scheduling.
pub fn grid_search(
    x: &[Vec<f64>],
    y: &[f64],
    space: &SearchSpace,
    seed: u64,
) -> Result<SearchOutcome, ModelError> {
    let k = space.cv_folds.max(2);
    if x.len() < k {
        return Err(ModelError::insufficient("cross-validation", k, x.len()));
    }
    let grid = candidates(space);
    if grid.is_empty() {
        return Err(ModelError::InvalidInput("empty hyperparameter grid".into()));
    }
    let folds = kfold(x.len(), k);

    let scores: Vec<(HyperParams, f64)> = grid
        .par_iter()
        .map(|candidate| {
            cross_validate(x, y, &folds, &candidate.boosting(seed)).map(|score| (*candidate, score))
        })
        .collect::<Result<_, _>>()?;

    let mut best_idx = 0;
    for (i, (_, score)) in scores.iter().enumerate() {
        if *score < scores[best_idx].1 {
            best_idx = i;
        }
    }
    let (best, best_score) = scores[best_idx];
    debug!(candidates = scores.len(), best_score, "Grid search complete");

    Ok(SearchOutcome {
        best,
        best_score,
        scores,
    })
}
