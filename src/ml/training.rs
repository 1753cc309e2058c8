//! Training pipeline
//!
//! Extracts the feature matrix from the final dataset, splits it, trains
//! every candidate and picks the one with the lowest validation MSE.

use std::path::Path;

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use tracing::{error, info, warn};

use super::models::{ModelSpec, TrainedModel};
use super::{FeatureMatrix, Regressor, ValidationMetrics};
use crate::data::{ColumnData, Frame, PRICE_COLUMN, TARGET_COLUMN};
use crate::error::{PipelineError, Result};

/// Feature matrix and target vector with rows aligned.
#[derive(Debug, Clone)]
pub struct TrainingDataset {
    pub features: FeatureMatrix,
    pub targets: Vec<f64>,
    /// Rows dropped because a feature or the target was missing.
    pub skipped_rows: usize,
}

impl TrainingDataset {
    pub fn new(features: FeatureMatrix, targets: Vec<f64>) -> Result<Self> {
        if features.n_rows() != targets.len() {
            return Err(PipelineError::Model(format!(
                "feature and target count mismatch: {} features, {} targets",
                features.n_rows(),
                targets.len()
            )));
        }
        Ok(Self {
            features,
            targets,
            skipped_rows: 0,
        })
    }

    /// Features are every column except the target, the price and the timestamp.
    pub fn from_frame(frame: &Frame, source: &Path, timestamp_column: &str) -> Result<Self> {
        let targets = match &frame.require_column(TARGET_COLUMN, source)?.data {
            ColumnData::Numeric(v) => v,
            _ => {
                return Err(PipelineError::Schema(format!(
                    "target column '{}' is not numeric",
                    TARGET_COLUMN
                )))
            }
        };

        let excluded = [TARGET_COLUMN, PRICE_COLUMN, timestamp_column];
        let mut names = Vec::new();
        let mut columns = Vec::new();
        for column in frame.columns() {
            if excluded.contains(&column.name.as_str()) {
                continue;
            }
            match &column.data {
                ColumnData::Numeric(v) => {
                    names.push(column.name.clone());
                    columns.push(v.as_slice());
                }
                other => {
                    return Err(PipelineError::Schema(format!(
                        "feature column '{}' is {:?}, expected numeric",
                        column.name,
                        other.kind()
                    )))
                }
            }
        }

        let mut rows = Vec::with_capacity(frame.n_rows());
        let mut y = Vec::with_capacity(frame.n_rows());
        let mut skipped_rows = 0;
        for (row, target) in targets.iter().enumerate() {
            let values: Option<Vec<f64>> = columns.iter().map(|c| c[row]).collect();
            match (values, target) {
                (Some(values), Some(t)) => {
                    rows.push(values);
                    y.push(*t);
                }
                _ => skipped_rows += 1,
            }
        }
        if skipped_rows > 0 {
            warn!(skipped_rows, source = %source.display(), "skipped rows with missing values");
        }

        Ok(Self {
            features: FeatureMatrix::from_rows(names, &rows)?,
            targets: y,
            skipped_rows,
        })
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn feature_names(&self) -> &[String] {
        self.features.names()
    }

    pub fn subset(&self, rows: &[usize]) -> TrainingDataset {
        TrainingDataset {
            features: self.features.select_rows(rows),
            targets: rows.iter().map(|&r| self.targets[r]).collect(),
            skipped_rows: 0,
        }
    }

    /// Shuffled split; the validation part holds `ceil(n * ratio)` rows.
    pub fn split(&self, validation_ratio: f64, seed: u64) -> Result<(TrainingDataset, TrainingDataset)> {
        if validation_ratio <= 0.0 || validation_ratio >= 1.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "validation ratio must be between 0 and 1, got {}",
                validation_ratio
            )));
        }
        let n = self.len();
        let n_val = (n as f64 * validation_ratio).ceil() as usize;
        if n < 2 || n_val >= n {
            return Err(PipelineError::InsufficientData {
                required: 2,
                actual: n,
            });
        }

        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut StdRng::seed_from_u64(seed));
        let (val, train) = indices.split_at(n_val);
        Ok((self.subset(train), self.subset(val)))
    }
}

/// A fitted candidate and its validation metrics.
#[derive(Debug)]
pub struct CandidateResult {
    pub spec: ModelSpec,
    pub model: TrainedModel,
    pub metrics: ValidationMetrics,
}

/// First item with the lowest score; NaN scores never win.
pub fn select_best<T>(items: &[T], score: impl Fn(&T) -> f64) -> Option<&T> {
    let mut best: Option<(&T, f64)> = None;
    for item in items {
        let s = score(item);
        if s.is_nan() {
            continue;
        }
        match best {
            Some((_, current)) if s >= current => {}
            _ => best = Some((item, s)),
        }
    }
    best.map(|(item, _)| item)
}

#[derive(Debug, Default)]
pub struct ModelTrainer;

impl ModelTrainer {
    pub fn new() -> Self {
        Self
    }

    pub fn fit_and_evaluate(
        &self,
        spec: &ModelSpec,
        train: &TrainingDataset,
        validation: &TrainingDataset,
    ) -> Result<CandidateResult> {
        let mut model = spec.build();
        model.fit(&train.features, &train.targets)?;
        let predictions = model.predict(&validation.features)?;
        let metrics = ValidationMetrics::calculate(&predictions, &validation.targets)?;
        Ok(CandidateResult {
            spec: *spec,
            model,
            metrics,
        })
    }

    /// Train each candidate; one failing candidate does not stop the others.
    pub fn train_candidates(
        &self,
        specs: &[ModelSpec],
        train: &TrainingDataset,
        validation: &TrainingDataset,
    ) -> Result<Vec<CandidateResult>> {
        let mut results = Vec::with_capacity(specs.len());
        let mut last_error = None;
        for spec in specs {
            match self.fit_and_evaluate(spec, train, validation) {
                Ok(result) => {
                    info!(
                        model = %spec.kind(),
                        mse = result.metrics.mse,
                        rmse = result.metrics.rmse,
                        r2 = result.metrics.r2,
                        "trained candidate"
                    );
                    results.push(result);
                }
                Err(e) => {
                    error!(model = %spec.kind(), error = %e, "candidate failed");
                    last_error = Some(e);
                }
            }
        }

        match (results.is_empty(), last_error) {
            (true, Some(e)) => Err(e),
            (true, None) => Err(PipelineError::Model("no candidate models given".to_string())),
            _ => Ok(results),
        }
    }

    /// Train all candidates and keep the one with the lowest validation MSE.
    pub fn train_best(
        &self,
        specs: &[ModelSpec],
        train: &TrainingDataset,
        validation: &TrainingDataset,
    ) -> Result<(CandidateResult, Vec<(ModelSpec, ValidationMetrics)>)> {
        let results = self.train_candidates(specs, train, validation)?;
        let summary = results.iter().map(|r| (r.spec, r.metrics)).collect();
        let best_idx = select_best(&results.iter().enumerate().collect::<Vec<_>>(), |(_, r)| r.metrics.mse)
            .map(|(idx, _)| *idx)
            .ok_or_else(|| PipelineError::Model("every candidate produced a NaN score".to_string()))?;
        let best = results
            .into_iter()
            .nth(best_idx)
            .ok_or_else(|| PipelineError::Model("selected candidate vanished".to_string()))?;
        info!(model = %best.spec.kind(), mse = best.metrics.mse, "selected best model");
        Ok((best, summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Column;
    use crate::ml::{ForestParams, ModelKind};
    use chrono::{TimeZone, Utc};

    fn frame(n: usize) -> Frame {
        let x: Vec<Option<f64>> = (0..n).map(|i| Some(i as f64)).collect();
        Frame::from_columns(vec![
            Column::timestamp(
                "time",
                (0..n)
                    .map(|h| Some(Utc.with_ymd_and_hms(2015, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::hours(h as i64)))
                    .collect(),
            ),
            Column::numeric("hour", x.clone()),
            Column::numeric(PRICE_COLUMN, vec![Some(50.0); n]),
            Column::numeric(TARGET_COLUMN, x.iter().map(|v| v.map(|v| 2.0 * v + 1.0)).collect()),
        ])
        .unwrap()
    }

    #[test]
    fn test_from_frame_excludes_target_price_and_time() {
        let ds = TrainingDataset::from_frame(&frame(10), Path::new("final.csv"), "time").unwrap();
        assert_eq!(ds.feature_names(), &["hour".to_string()]);
        assert_eq!(ds.len(), 10);
        assert_eq!(ds.targets[3], 7.0);
    }

    #[test]
    fn test_from_frame_requires_target() {
        let mut f = frame(4);
        f.remove_column(TARGET_COLUMN);
        let err = TrainingDataset::from_frame(&f, Path::new("final.csv"), "time").unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn { ref column, .. } if column == TARGET_COLUMN));
    }

    #[test]
    fn test_from_frame_skips_incomplete_rows() {
        let mut f = frame(5);
        f.numeric_mut("hour").unwrap()[2] = None;
        let ds = TrainingDataset::from_frame(&f, Path::new("final.csv"), "time").unwrap();
        assert_eq!(ds.len(), 4);
        assert_eq!(ds.skipped_rows, 1);
    }

    #[test]
    fn test_from_frame_rejects_categorical_feature() {
        let mut f = frame(3);
        f.push_column(Column::categorical("season", vec![Some("Winter".into()); 3]))
            .unwrap();
        let err = TrainingDataset::from_frame(&f, Path::new("final.csv"), "time").unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
    }

    #[test]
    fn test_split_sizes_and_determinism() {
        let ds = TrainingDataset::from_frame(&frame(10), Path::new("final.csv"), "time").unwrap();
        let (train, val) = ds.split(0.2, 42).unwrap();
        assert_eq!(train.len(), 8);
        assert_eq!(val.len(), 2);

        let (train2, _) = ds.split(0.2, 42).unwrap();
        assert_eq!(train.targets, train2.targets);

        let mut all: Vec<f64> = train.targets.iter().chain(&val.targets).copied().collect();
        all.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(all, ds.targets);
    }

    #[test]
    fn test_split_too_small() {
        let ds = TrainingDataset::from_frame(&frame(1), Path::new("final.csv"), "time").unwrap();
        assert!(matches!(
            ds.split(0.2, 42),
            Err(PipelineError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_select_best_prefers_first_on_tie_and_skips_nan() {
        let scores = [3.0, f64::NAN, 1.0, 1.0, 2.0];
        let idx: Vec<usize> = (0..scores.len()).collect();
        assert_eq!(select_best(&idx, |&i| scores[i]), Some(&2));
        assert_eq!(select_best(&[f64::NAN], |&s| s), None);
        assert_eq!(select_best::<f64>(&[], |&s| s), None);
    }

    #[test]
    fn test_train_best_picks_linear_on_linear_data() {
        let ds = TrainingDataset::from_frame(&frame(40), Path::new("final.csv"), "time").unwrap();
        let (train, val) = ds.split(0.2, 42).unwrap();
        let specs = [
            ModelSpec::RandomForest(ForestParams {
                n_trees: 10,
                ..ForestParams::default()
            }),
            ModelSpec::LinearRegression,
        ];
        let (best, summary) = ModelTrainer::new().train_best(&specs, &train, &val).unwrap();
        assert_eq!(best.spec.kind(), ModelKind::LinearRegression);
        assert_eq!(summary.len(), 2);
        assert!(best.metrics.mse < 1e-6);
    }

    #[test]
    fn test_train_candidates_isolates_failures() {
        let ds = TrainingDataset::from_frame(&frame(10), Path::new("final.csv"), "time").unwrap();
        let (train, val) = ds.split(0.2, 42).unwrap();
        // a single training row cannot be fitted
        let tiny = train.subset(&[0]);

        let trainer = ModelTrainer::new();
        let err = trainer
            .train_candidates(&[ModelSpec::LinearRegression], &tiny, &val)
            .unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientData { .. }));

        let results = trainer
            .train_candidates(&[ModelSpec::LinearRegression], &train, &val)
            .unwrap();
        assert_eq!(results.len(), 1);
    }
}
