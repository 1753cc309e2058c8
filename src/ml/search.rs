//! Cross-validated grid search.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, error, info};

use super::models::{BoostingParams, ForestParams, ModelSpec};
use super::training::{select_best, ModelTrainer, TrainingDataset};
use crate::config::{BoostingGrid, ForestGrid};
use crate::error::{PipelineError, Result};

/// Shuffled k-fold splitter.
#[derive(Debug, Clone, Copy)]
pub struct KFold {
    pub n_splits: usize,
    pub seed: u64,
}

impl KFold {
    pub fn new(n_splits: usize, seed: u64) -> Self {
        Self { n_splits, seed }
    }

    /// `(train, test)` index sets. The first `n % k` folds hold one extra row.
    pub fn split(&self, n: usize) -> Result<Vec<(Vec<usize>, Vec<usize>)>> {
        if self.n_splits < 2 {
            return Err(PipelineError::InvalidConfig(format!(
                "k-fold needs at least 2 splits, got {}",
                self.n_splits
            )));
        }
        if n < self.n_splits {
            return Err(PipelineError::InsufficientData {
                required: self.n_splits,
                actual: n,
            });
        }

        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut StdRng::seed_from_u64(self.seed));

        let base = n / self.n_splits;
        let extra = n % self.n_splits;
        let mut folds = Vec::with_capacity(self.n_splits);
        let mut start = 0;
        for fold in 0..self.n_splits {
            let size = base + usize::from(fold < extra);
            let test = indices[start..start + size].to_vec();
            let train = indices[..start]
                .iter()
                .chain(&indices[start + size..])
                .copied()
                .collect();
            folds.push((train, test));
            start += size;
        }
        Ok(folds)
    }
}

/// Forest configurations with parameter names in sorted order
/// (`max_depth`, `min_samples_split`, `n_estimators`), the last varying
/// fastest. Enumeration order decides ties in [`GridSearch::search`].
pub fn forest_grid(grid: &ForestGrid, seed: u64) -> Vec<ModelSpec> {
    let mut specs = Vec::new();
    for &max_depth in &grid.max_depth {
        for &min_samples_split in &grid.min_samples_split {
            for &n_trees in &grid.n_trees {
                specs.push(ModelSpec::RandomForest(ForestParams {
                    n_trees,
                    max_depth: Some(max_depth),
                    min_samples_split,
                    seed,
                }));
            }
        }
    }
    specs
}

/// Boosting configurations as nested `n_estimators`, `learning_rate`,
/// `max_depth` loops, the last varying fastest.
pub fn boosting_grid(grid: &BoostingGrid) -> Vec<ModelSpec> {
    let mut specs = Vec::new();
    for &n_estimators in &grid.n_estimators {
        for &learning_rate in &grid.learning_rate {
            for &max_depth in &grid.max_depth {
                specs.push(ModelSpec::GradientBoosting(BoostingParams {
                    n_estimators,
                    learning_rate,
                    max_depth,
                }));
            }
        }
    }
    specs
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub best: ModelSpec,
    pub best_cv_mse: f64,
    /// Every configuration that scored, in enumeration order.
    pub evaluated: Vec<(ModelSpec, f64)>,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct GridSearch {
    kfold: KFold,
}

impl GridSearch {
    pub fn new(kfold: KFold) -> Self {
        Self { kfold }
    }

    /// Mean validation MSE of one configuration across the folds.
    pub fn cross_validate(&self, spec: &ModelSpec, data: &TrainingDataset) -> Result<f64> {
        let trainer = ModelTrainer::new();
        let folds = self.kfold.split(data.len())?;
        let mut total = 0.0;
        for (train, test) in &folds {
            let result = trainer.fit_and_evaluate(spec, &data.subset(train), &data.subset(test))?;
            total += result.metrics.mse;
        }
        Ok(total / folds.len() as f64)
    }

    /// Score every configuration in parallel and keep the lowest mean MSE.
    /// Ties go to the configuration enumerated first.
    pub fn search(&self, specs: &[ModelSpec], data: &TrainingDataset) -> Result<SearchOutcome> {
        info!(
            configurations = specs.len(),
            folds = self.kfold.n_splits,
            rows = data.len(),
            "starting grid search"
        );

        let scores: Vec<Result<f64>> = specs
            .par_iter()
            .map(|spec| self.cross_validate(spec, data))
            .collect();

        let mut evaluated = Vec::with_capacity(specs.len());
        let mut failed = 0;
        let mut last_error = None;
        for (spec, score) in specs.iter().zip(scores) {
            match score {
                Ok(mse) => {
                    debug!(params = ?spec.params(), cv_mse = mse, "scored configuration");
                    evaluated.push((*spec, mse));
                }
                Err(e) => {
                    error!(params = ?spec.params(), error = %e, "configuration failed");
                    failed += 1;
                    last_error = Some(e);
                }
            }
        }

        let (best, best_cv_mse) = match select_best(&evaluated, |(_, mse)| *mse) {
            Some(&(spec, mse)) => (spec, mse),
            None => {
                return Err(last_error
                    .unwrap_or_else(|| PipelineError::Model("empty parameter grid".to_string())))
            }
        };

        info!(
            model = %best.kind(),
            params = ?best.params(),
            cv_mse = best_cv_mse,
            failed,
            "grid search finished"
        );
        Ok(SearchOutcome {
            best,
            best_cv_mse,
            evaluated,
            failed,
        })
    }
}
