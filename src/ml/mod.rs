//! Machine learning
//!
//! - [`Regressor`]: the single trainable capability every model variant implements
//! - [`models`]: random forest, gradient-boosted trees and linear regression
//! - [`training`]: dataset extraction, train/validation split, candidate training and selection
//! - [`search`]: k-fold cross-validated grid search
//! - [`inference`]: request-time feature construction and prediction

use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::error::{PipelineError, Result};

pub mod inference;
pub mod models;
pub mod search;
pub mod training;

pub use inference::{LoadPredictor, LoadQuery};
pub use models::{BoostingParams, ForestParams, ModelArtifact, ModelKind, ModelSpec, TrainedModel};
pub use search::{GridSearch, KFold, SearchOutcome};
pub use training::{select_best, CandidateResult, ModelTrainer, TrainingDataset};

/// Dense row-major feature matrix with named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    names: Vec<String>,
    data: Vec<f64>,
    n_rows: usize,
}

impl FeatureMatrix {
    pub fn from_rows(names: Vec<String>, rows: &[Vec<f64>]) -> Result<Self> {
        let n_cols = names.len();
        let mut data = Vec::with_capacity(rows.len() * n_cols);
        for (idx, row) in rows.iter().enumerate() {
            if row.len() != n_cols {
                return Err(PipelineError::Schema(format!(
                    "feature row {} has {} values, expected {}",
                    idx,
                    row.len(),
                    n_cols
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            names,
            data,
            n_rows: rows.len(),
        })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn row(&self, idx: usize) -> &[f64] {
        let n = self.n_cols();
        &self.data[idx * n..(idx + 1) * n]
    }

    pub fn select_rows(&self, rows: &[usize]) -> FeatureMatrix {
        let mut data = Vec::with_capacity(rows.len() * self.n_cols());
        for &r in rows {
            data.extend_from_slice(self.row(r));
        }
        FeatureMatrix {
            names: self.names.clone(),
            data,
            n_rows: rows.len(),
        }
    }

    pub(crate) fn to_dense(&self) -> DenseMatrix<f64> {
        DenseMatrix::new(self.n_rows, self.n_cols(), self.data.clone(), false)
    }
}

/// A model that can be fitted to a feature matrix and a target vector.
pub trait Regressor: Send + Sync {
    fn kind(&self) -> ModelKind;

    fn fit(&mut self, x: &FeatureMatrix, y: &[f64]) -> Result<()>;

    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>>;

    /// Mean squared error of the predictions on `x` against `y`.
    fn score(&self, x: &FeatureMatrix, y: &[f64]) -> Result<f64> {
        Ok(ValidationMetrics::calculate(&self.predict(x)?, y)?.mse)
    }
}

/// Validation metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetrics {
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
}

impl ValidationMetrics {
    pub fn calculate(predictions: &[f64], targets: &[f64]) -> Result<Self> {
        if predictions.len() != targets.len() {
            return Err(PipelineError::Model(format!(
                "prediction and target count mismatch: {} vs {}",
                predictions.len(),
                targets.len()
            )));
        }
        if predictions.is_empty() {
            return Err(PipelineError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }

        let n = predictions.len() as f64;
        let mse = predictions
            .iter()
            .zip(targets)
            .map(|(p, t)| (p - t).powi(2))
            .sum::<f64>()
            / n;
        let mae = predictions
            .iter()
            .zip(targets)
            .map(|(p, t)| (p - t).abs())
            .sum::<f64>()
            / n;

        let mean_target = targets.iter().sum::<f64>() / n;
        let ss_tot: f64 = targets.iter().map(|t| (t - mean_target).powi(2)).sum();
        let ss_res = mse * n;
        let r2 = if ss_tot.abs() < 1e-10 {
            0.0
        } else {
            1.0 - ss_res / ss_tot
        };

        Ok(Self {
            mse,
            rmse: mse.sqrt(),
            mae,
            r2,
        })
    }
}
