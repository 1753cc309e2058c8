//! Concrete regressors
//!
//! Tree ensembles and the linear model are backed by smartcore; boosting
//! fits a sequence of smartcore regression trees to the running residuals.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{RandomForestRegressor, RandomForestRegressorParameters};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linear::linear_regression::{
    LinearRegression, LinearRegressionParameters, LinearRegressionSolverName,
};
use smartcore::tree::decision_tree_regressor::{DecisionTreeRegressor, DecisionTreeRegressorParameters};
use tracing::debug;

use super::{FeatureMatrix, Regressor, ValidationMetrics};
use crate::artifacts::{Artifact, ArtifactKind};
use crate::error::{PipelineError, Result};

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;
type Tree = DecisionTreeRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;
type Linear = LinearRegression<f64, f64, DenseMatrix<f64>, Vec<f64>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    RandomForest,
    GradientBoosting,
    LinearRegression,
}

impl ModelKind {
    pub fn name(self) -> &'static str {
        match self {
            ModelKind::RandomForest => "RandomForest",
            ModelKind::GradientBoosting => "GradientBoosting",
            ModelKind::LinearRegression => "LinearRegression",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn check_fit_input(x: &FeatureMatrix, y: &[f64]) -> Result<()> {
    if x.n_rows() != y.len() {
        return Err(PipelineError::Model(format!(
            "feature and target count mismatch: {} rows, {} targets",
            x.n_rows(),
            y.len()
        )));
    }
    if x.n_rows() < 2 {
        return Err(PipelineError::InsufficientData {
            required: 2,
            actual: x.n_rows(),
        });
    }
    Ok(())
}

fn not_fitted(kind: ModelKind) -> PipelineError {
    PipelineError::Model(format!("{} has not been fitted", kind))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: Option<u16>,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
            seed: 42,
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct RandomForestModel {
    params: ForestParams,
    fitted: Option<Forest>,
}

impl RandomForestModel {
    pub fn new(params: ForestParams) -> Self {
        Self { params, fitted: None }
    }

    fn parameters(&self) -> RandomForestRegressorParameters {
        RandomForestRegressorParameters {
            max_depth: self.params.max_depth,
            min_samples_leaf: 1,
            min_samples_split: self.params.min_samples_split,
            n_trees: self.params.n_trees,
            m: None,
            keep_samples: false,
            seed: self.params.seed,
        }
    }
}

impl fmt::Debug for RandomForestModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomForestModel")
            .field("params", &self.params)
            .field("fitted", &self.fitted.is_some())
            .finish()
    }
}

impl Regressor for RandomForestModel {
    fn kind(&self) -> ModelKind {
        ModelKind::RandomForest
    }

    fn fit(&mut self, x: &FeatureMatrix, y: &[f64]) -> Result<()> {
        check_fit_input(x, y)?;
        let forest = Forest::fit(&x.to_dense(), &y.to_vec(), self.parameters()).map_err(PipelineError::model)?;
        self.fitted = Some(forest);
        Ok(())
    }

    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>> {
        let forest = self.fitted.as_ref().ok_or_else(|| not_fitted(self.kind()))?;
        forest.predict(&x.to_dense()).map_err(PipelineError::model)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: u16,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 6,
        }
    }
}

/// Least-squares gradient boosting: starts from the target mean and adds
/// shrunken regression trees fitted to the current residuals.
#[derive(Serialize, Deserialize)]
pub struct GradientBoostingModel {
    params: BoostingParams,
    base: f64,
    trees: Vec<Tree>,
}

impl GradientBoostingModel {
    pub fn new(params: BoostingParams) -> Self {
        Self {
            params,
            base: 0.0,
            trees: Vec::new(),
        }
    }
}

impl fmt::Debug for GradientBoostingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GradientBoostingModel")
            .field("params", &self.params)
            .field("base", &self.base)
            .field("trees", &self.trees.len())
            .finish()
    }
}

impl Regressor for GradientBoostingModel {
    fn kind(&self) -> ModelKind {
        ModelKind::GradientBoosting
    }

    fn fit(&mut self, x: &FeatureMatrix, y: &[f64]) -> Result<()> {
        check_fit_input(x, y)?;
        let dense = x.to_dense();
        let base = y.iter().sum::<f64>() / y.len() as f64;
        let mut predictions = vec![base; y.len()];
        let mut trees = Vec::with_capacity(self.params.n_estimators);

        for round in 0..self.params.n_estimators {
            let residuals: Vec<f64> = y.iter().zip(&predictions).map(|(t, p)| t - p).collect();
            let params = DecisionTreeRegressorParameters::default().with_max_depth(self.params.max_depth);
            let tree = Tree::fit(&dense, &residuals, params).map_err(PipelineError::model)?;
            let step = tree.predict(&dense).map_err(PipelineError::model)?;
            for (p, s) in predictions.iter_mut().zip(&step) {
                *p += self.params.learning_rate * s;
            }
            trees.push(tree);

            if round % 25 == 0 {
                debug!(round, "boosting round fitted");
            }
        }

        self.base = base;
        self.trees = trees;
        Ok(())
    }

    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>> {
        if self.trees.is_empty() && self.params.n_estimators > 0 {
            return Err(not_fitted(self.kind()));
        }
        let dense = x.to_dense();
        let mut predictions = vec![self.base; x.n_rows()];
        for tree in &self.trees {
            let step = tree.predict(&dense).map_err(PipelineError::model)?;
            for (p, s) in predictions.iter_mut().zip(&step) {
                *p += self.params.learning_rate * s;
            }
        }
        Ok(predictions)
    }
}

/// Ordinary least squares with intercept.
#[derive(Serialize, Deserialize, Default)]
pub struct LinearModel {
    fitted: Option<Linear>,
}

impl fmt::Debug for LinearModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinearModel")
            .field("fitted", &self.fitted.is_some())
            .finish()
    }
}

impl Regressor for LinearModel {
    fn kind(&self) -> ModelKind {
        ModelKind::LinearRegression
    }

    fn fit(&mut self, x: &FeatureMatrix, y: &[f64]) -> Result<()> {
        check_fit_input(x, y)?;
        let params = LinearRegressionParameters::default().with_solver(LinearRegressionSolverName::SVD);
        let model = Linear::fit(&x.to_dense(), &y.to_vec(), params).map_err(PipelineError::model)?;
        self.fitted = Some(model);
        Ok(())
    }

    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>> {
        let model = self.fitted.as_ref().ok_or_else(|| not_fitted(self.kind()))?;
        model.predict(&x.to_dense()).map_err(PipelineError::model)
    }
}

/// Hyperparameters of one candidate; builds an unfitted model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ModelSpec {
    RandomForest(ForestParams),
    GradientBoosting(BoostingParams),
    LinearRegression,
}

impl ModelSpec {
    pub fn kind(&self) -> ModelKind {
        match self {
            ModelSpec::RandomForest(_) => ModelKind::RandomForest,
            ModelSpec::GradientBoosting(_) => ModelKind::GradientBoosting,
            ModelSpec::LinearRegression => ModelKind::LinearRegression,
        }
    }

    pub fn build(&self) -> TrainedModel {
        match *self {
            ModelSpec::RandomForest(p) => TrainedModel::RandomForest(RandomForestModel::new(p)),
            ModelSpec::GradientBoosting(p) => TrainedModel::GradientBoosting(GradientBoostingModel::new(p)),
            ModelSpec::LinearRegression => TrainedModel::LinearRegression(LinearModel::default()),
        }
    }

    /// Hyperparameters as key/value pairs for run tracking.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        match self {
            ModelSpec::RandomForest(p) => vec![
                ("n_estimators", p.n_trees.to_string()),
                (
                    "max_depth",
                    p.max_depth.map_or_else(|| "None".to_string(), |d| d.to_string()),
                ),
                ("min_samples_split", p.min_samples_split.to_string()),
                ("random_state", p.seed.to_string()),
            ],
            ModelSpec::GradientBoosting(p) => vec![
                ("n_estimators", p.n_estimators.to_string()),
                ("learning_rate", p.learning_rate.to_string()),
                ("max_depth", p.max_depth.to_string()),
            ],
            ModelSpec::LinearRegression => Vec::new(),
        }
    }

    /// Default candidates of a training run, in evaluation order.
    pub fn default_candidates(seed: u64) -> Vec<ModelSpec> {
        vec![
            ModelSpec::RandomForest(ForestParams {
                seed,
                ..ForestParams::default()
            }),
            ModelSpec::GradientBoosting(BoostingParams::default()),
            ModelSpec::LinearRegression,
        ]
    }
}

/// A model of any supported kind; the persisted form of a regressor.
#[derive(Debug, Serialize, Deserialize)]
pub enum TrainedModel {
    RandomForest(RandomForestModel),
    GradientBoosting(GradientBoostingModel),
    LinearRegression(LinearModel),
}

impl TrainedModel {
    fn inner(&self) -> &dyn Regressor {
        match self {
            TrainedModel::RandomForest(m) => m,
            TrainedModel::GradientBoosting(m) => m,
            TrainedModel::LinearRegression(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Regressor {
        match self {
            TrainedModel::RandomForest(m) => m,
            TrainedModel::GradientBoosting(m) => m,
            TrainedModel::LinearRegression(m) => m,
        }
    }
}

impl Regressor for TrainedModel {
    fn kind(&self) -> ModelKind {
        self.inner().kind()
    }

    fn fit(&mut self, x: &FeatureMatrix, y: &[f64]) -> Result<()> {
        self.inner_mut().fit(x, y)
    }

    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>> {
        self.inner().predict(x)
    }
}

/// Everything the inference service needs from a training run.
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub spec: ModelSpec,
    pub model: TrainedModel,
    /// Feature columns in the order the model expects them.
    pub feature_names: Vec<String>,
    pub target: String,
    pub metrics: ValidationMetrics,
    pub training_rows: usize,
}

impl ModelArtifact {
    /// Persist under the schema hash of the transforms the features came from.
    pub fn save(&self, path: &Path, transform_hash: &str) -> Result<()> {
        Artifact::new(ArtifactKind::Regressor, self.spec.kind().name(), transform_hash, self).save(path)
    }

    pub fn load(path: &Path) -> Result<Artifact<ModelArtifact>> {
        Artifact::load(path, ArtifactKind::Regressor)
    }
}
