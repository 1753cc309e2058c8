//! Stage orchestration for the `elf` binary.
//!
//! Each stage reads the outputs of the previous one from the directories in
//! [`Config::paths`] and writes its own outputs next to them:
//!
//! ```text
//! raw_dir ──engineer──▶ processed_dir/processed_*.csv ──preprocess──▶ processed_dir/final_*.csv
//!                                                          │                      │
//!                                                     encoders_dir          train / tune ──▶ models_dir
//! ```

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::analysis::{self, AnalysisReport};
use crate::config::Config;
use crate::data::{load_csv, write_csv, Column, Dataset, Frame, LoadMode, TARGET_COLUMN};
use crate::error::{PipelineError, Result};
use crate::features::{FeatureEngineer, MissingValueReport};
use crate::forecast::{ForecastReport, HourlySeries, SeasonalForecaster};
use crate::ml::search::{boosting_grid, forest_grid};
use crate::ml::{
    select_best, CandidateResult, GridSearch, KFold, ModelArtifact, ModelKind, ModelSpec, ModelTrainer,
    SearchOutcome, TrainingDataset, ValidationMetrics,
};
use crate::preprocessing::{Preprocessor, TransformManifest, TransformSet};
use crate::tracking::{RunRecord, Trackers};

pub const SARIMA_MODEL_FILE: &str = "sarima_model.bin";
pub const FORECAST_FILE: &str = "sarima_forecast.csv";

fn load_dataset(path: &Path, dataset: Dataset, mode: LoadMode) -> Result<Frame> {
    let loaded = load_csv(path, dataset.schema(), mode)?;
    debug!(
        dataset = %dataset,
        rows_read = loaded.rows_read,
        quarantined = loaded.quarantined.len(),
        "dataset ready"
    );
    Ok(loaded.frame)
}

fn raw_path(cfg: &Config, dataset: Dataset) -> PathBuf {
    cfg.paths.raw_dir.join(dataset.raw_file())
}

fn processed_path(cfg: &Config, dataset: Dataset) -> PathBuf {
    cfg.paths.processed_dir.join(dataset.processed_file())
}

fn final_path(cfg: &Config, dataset: Dataset) -> PathBuf {
    cfg.paths.processed_dir.join(dataset.final_file())
}

pub fn model_file(kind: ModelKind) -> String {
    format!("{}_model.bin", kind.name())
}

pub fn best_model_file(kind: ModelKind) -> String {
    format!("{}_best_model.bin", kind.name())
}

/// Exploratory analysis of both raw datasets, written as
/// `<processed_dir>/<dataset>_analysis.json`.
pub fn analyze(cfg: &Config) -> Result<Vec<AnalysisReport>> {
    let mut reports = Vec::with_capacity(Dataset::ALL.len());
    for dataset in Dataset::ALL {
        let frame = load_dataset(&raw_path(cfg, dataset), dataset, LoadMode::Raw)?;
        let report = analysis::analyze(&frame, dataset.name(), dataset.schema().timestamp_column);

        let path = cfg.paths.processed_dir.join(format!("{}_analysis.json", dataset.name()));
        std::fs::create_dir_all(&cfg.paths.processed_dir)
            .map_err(|e| PipelineError::io(&cfg.paths.processed_dir, e))?;
        let file = File::create(&path).map_err(|e| PipelineError::io(&path, e))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &report)
            .map_err(|e| PipelineError::io(&path, e.into()))?;

        let missing_cells: usize = report.missing.iter().map(|m| m.missing).sum();
        info!(
            dataset = %dataset,
            rows = report.rows,
            columns = report.columns,
            missing_cells,
            top_outlier_column = report.outliers.first().map(|o| o.column.as_str()).unwrap_or("-"),
            report = %path.display(),
            "analysis written"
        );
        debug!(dataset = %dataset, "correlation matrix\n{}", report.correlation);
        reports.push(report);
    }
    Ok(reports)
}

/// Feature engineering of both raw datasets into the processed files.
pub fn engineer(cfg: &Config) -> Result<Vec<(Dataset, MissingValueReport)>> {
    let engineer = FeatureEngineer::new(&cfg.preprocessing);
    let mut summaries = Vec::with_capacity(Dataset::ALL.len());
    for dataset in Dataset::ALL {
        let source = raw_path(cfg, dataset);
        let frame = load_dataset(&source, dataset, LoadMode::Raw)?;
        let engineered = engineer.engineer(frame, dataset.schema(), &source)?;

        for outlier in engineered.outliers.iter().filter(|o| o.count > 0).take(5) {
            info!(dataset = %dataset, column = %outlier.column, count = outlier.count, "outliers clipped");
        }
        info!(
            dataset = %dataset,
            dropped_columns = ?engineered.missing.dropped_columns,
            dropped_rows = engineered.missing.dropped_rows,
            "missing values handled"
        );

        write_csv(&engineered.frame, &processed_path(cfg, dataset))?;
        summaries.push((dataset, engineered.missing));
    }
    Ok(summaries)
}

/// Fit encoders and the scaler on each processed dataset, persist them and
/// write the final feature files.
pub fn preprocess(cfg: &Config) -> Result<Vec<TransformManifest>> {
    let preprocessor = Preprocessor::new(&cfg.preprocessing);
    let mut manifests = Vec::with_capacity(Dataset::ALL.len());
    for dataset in Dataset::ALL {
        let frame = load_dataset(&processed_path(cfg, dataset), dataset, LoadMode::Derived)?;
        let (transformed, transforms) = preprocessor.fit_transform(&frame, dataset)?;

        transforms.save(&cfg.paths.encoders_dir)?;
        write_csv(&transformed, &final_path(cfg, dataset))?;
        info!(
            dataset = %dataset,
            encoded = transforms.manifest.encoded_columns.len(),
            scaled = transforms.manifest.scaled_columns.len(),
            output_columns = transforms.manifest.output_columns.len(),
            "preprocessing complete"
        );
        manifests.push(transforms.manifest);
    }
    Ok(manifests)
}

/// The energy training data together with the hash of the transforms that
/// produced it.
fn load_training_data(cfg: &Config) -> Result<(TrainingDataset, String)> {
    let path = final_path(cfg, Dataset::Energy);
    let frame = load_dataset(&path, Dataset::Energy, LoadMode::Derived)?;

    let transforms = TransformSet::load(&cfg.paths.encoders_dir, Dataset::Energy)?;
    let hash = transforms.schema_hash();
    if crate::artifacts::schema_hash(&frame.column_names()) != hash {
        return Err(PipelineError::IncompatibleArtifact {
            path,
            reason: "columns differ from the persisted transform manifest; rerun preprocess".to_string(),
        });
    }

    let data = TrainingDataset::from_frame(&frame, &path, Dataset::Energy.schema().timestamp_column)?;
    if data.skipped_rows > 0 {
        warn!(skipped = data.skipped_rows, "rows with missing values skipped");
    }
    Ok((data, hash))
}

fn run_record(stage: &str, spec: &ModelSpec, metrics: &ValidationMetrics, data_rows: usize) -> RunRecord {
    let mut run = RunRecord::new(spec.kind().name())
        .tag("stage", stage)
        .param("training_rows", data_rows)
        .metric("mse", metrics.mse)
        .metric("rmse", metrics.rmse)
        .metric("mae", metrics.mae)
        .metric("r2", metrics.r2);
    for (key, value) in spec.params() {
        run = run.param(key, value);
    }
    run
}

#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub candidates: Vec<(ModelKind, ValidationMetrics)>,
    pub best: ModelKind,
    pub best_metrics: ValidationMetrics,
}

/// Train the default candidates, persist each and the lowest-MSE one as the
/// served model.
pub fn train(cfg: &Config, trackers: &Trackers) -> Result<TrainingSummary> {
    let (data, hash) = load_training_data(cfg)?;
    let (train, validation) = data.split(cfg.training.validation_ratio, cfg.training.seed)?;
    info!(train = train.len(), validation = validation.len(), "split training data");

    let results = ModelTrainer::new().train_candidates(
        &ModelSpec::default_candidates(cfg.training.seed),
        &train,
        &validation,
    )?;

    let mut artifacts = Vec::with_capacity(results.len());
    for result in results {
        let artifact = ModelArtifact {
            spec: result.spec,
            model: result.model,
            feature_names: data.feature_names().to_vec(),
            target: TARGET_COLUMN.to_string(),
            metrics: result.metrics,
            training_rows: train.len(),
        };
        artifact.save(&cfg.paths.models_dir.join(model_file(result.spec.kind())), &hash)?;
        trackers.report(&run_record("train", &artifact.spec, &artifact.metrics, train.len()));
        artifacts.push(artifact);
    }

    let best = select_best(&artifacts, |a| a.metrics.mse)
        .ok_or_else(|| PipelineError::Model("every candidate produced a NaN score".to_string()))?;
    best.save(&cfg.model_path(), &hash)?;
    info!(
        model = %best.spec.kind(),
        mse = best.metrics.mse,
        r2 = best.metrics.r2,
        path = %cfg.model_path().display(),
        "saved best model"
    );

    Ok(TrainingSummary {
        candidates: artifacts.iter().map(|a| (a.spec.kind(), a.metrics)).collect(),
        best: best.spec.kind(),
        best_metrics: best.metrics,
    })
}

#[derive(Debug, Clone)]
pub enum FamilyOutcome {
    Tuned {
        spec: ModelSpec,
        cv_mse: f64,
        validation: ValidationMetrics,
        evaluated: usize,
        failed: usize,
    },
    /// No configuration of the family could be scored or refit.
    Failed { error: String },
}

#[derive(Debug, Clone)]
pub struct TunedFamily {
    pub kind: ModelKind,
    pub configurations: usize,
    pub outcome: FamilyOutcome,
}

impl TunedFamily {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, FamilyOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct TuningSummary {
    pub families: Vec<TunedFamily>,
    pub best: ModelKind,
}

/// Search one family's grid and refit its winner on the training split.
fn tune_family(
    search: &GridSearch,
    grid: &[ModelSpec],
    train: &TrainingDataset,
    validation: &TrainingDataset,
) -> Result<(SearchOutcome, CandidateResult)> {
    let outcome = search.search(grid, train)?;
    let refit = ModelTrainer::new().fit_and_evaluate(&outcome.best, train, validation)?;
    Ok((outcome, refit))
}

/// Cross-validated grid search over the forest and boosting families. Each
/// family's winner is refit on the training split, scored on validation and
/// persisted; the better family becomes the served model. A family that
/// fails is reported and skipped.
pub fn tune(cfg: &Config, trackers: &Trackers) -> Result<TuningSummary> {
    let (data, hash) = load_training_data(cfg)?;
    let (train, validation) = data.split(cfg.training.validation_ratio, cfg.training.seed)?;

    let search = GridSearch::new(KFold::new(cfg.training.cv_folds, cfg.training.seed));
    let grids = [
        (ModelKind::RandomForest, forest_grid(&cfg.training.forest_grid, cfg.training.seed)),
        (ModelKind::GradientBoosting, boosting_grid(&cfg.training.boosting_grid)),
    ];

    let mut families = Vec::new();
    let mut artifacts = Vec::new();
    for (kind, grid) in &grids {
        let (outcome, refit) = match tune_family(&search, grid, &train, &validation) {
            Ok(tuned) => tuned,
            Err(e) => {
                error!(model = %kind, configurations = grid.len(), error = %e, "model family could not be tuned");
                trackers.report(
                    &RunRecord::new(kind.name())
                        .tag("stage", "tune")
                        .tag("status", "failed")
                        .tag("error", e.to_string())
                        .param("configurations", grid.len()),
                );
                families.push(TunedFamily {
                    kind: *kind,
                    configurations: grid.len(),
                    outcome: FamilyOutcome::Failed { error: e.to_string() },
                });
                continue;
            }
        };

        let artifact = ModelArtifact {
            spec: refit.spec,
            model: refit.model,
            feature_names: data.feature_names().to_vec(),
            target: TARGET_COLUMN.to_string(),
            metrics: refit.metrics,
            training_rows: train.len(),
        };
        artifact.save(&cfg.paths.models_dir.join(best_model_file(*kind)), &hash)?;
        trackers.report(
            &run_record("tune", &artifact.spec, &artifact.metrics, train.len())
                .metric("cv_mse", outcome.best_cv_mse)
                .param("configurations", grid.len()),
        );
        info!(
            model = %kind,
            params = ?artifact.spec.params(),
            cv_mse = outcome.best_cv_mse,
            validation_mse = artifact.metrics.mse,
            "tuned model family"
        );

        families.push(TunedFamily {
            kind: *kind,
            configurations: grid.len(),
            outcome: FamilyOutcome::Tuned {
                spec: artifact.spec,
                cv_mse: outcome.best_cv_mse,
                validation: artifact.metrics,
                evaluated: outcome.evaluated.len(),
                failed: outcome.failed,
            },
        });
        artifacts.push(artifact);
    }

    let best = select_best(&artifacts, |a| a.metrics.mse)
        .ok_or_else(|| PipelineError::Model("no model family could be tuned".to_string()))?;
    best.save(&cfg.model_path(), &hash)?;
    info!(model = %best.spec.kind(), mse = best.metrics.mse, "saved tuned model");

    Ok(TuningSummary {
        best: best.spec.kind(),
        families,
    })
}

/// Fit the seasonal model on the processed load series and score it on the
/// held-out horizon.
pub fn forecast(cfg: &Config, trackers: &Trackers) -> Result<ForecastReport> {
    let path = processed_path(cfg, Dataset::Energy);
    let frame = load_dataset(&path, Dataset::Energy, LoadMode::Derived)?;
    let series = HourlySeries::from_frame(&frame, Dataset::Energy.schema().timestamp_column, TARGET_COLUMN, &path)?;
    if series.interpolated > 0 || series.duplicates > 0 {
        info!(
            interpolated = series.interpolated,
            duplicates = series.duplicates,
            "regularised hourly series"
        );
    }

    let report = SeasonalForecaster::new(&cfg.forecast).fit_and_evaluate(&series)?;
    report.model.save(&cfg.paths.models_dir.join(SARIMA_MODEL_FILE))?;

    let points = Frame::from_columns(vec![
        Column::timestamp("time", report.points.iter().map(|p| Some(p.timestamp)).collect()),
        Column::numeric("predicted", report.points.iter().map(|p| Some(p.predicted)).collect()),
        Column::numeric("actual", report.points.iter().map(|p| Some(p.actual)).collect()),
    ])?;
    write_csv(&points, &cfg.paths.processed_dir.join(FORECAST_FILE))?;

    trackers.report(
        &RunRecord::new("SARIMA")
            .tag("stage", "forecast")
            .param("order", report.model.order)
            .param("horizon_hours", cfg.forecast.horizon_hours)
            .param("observations", report.model.n_obs)
            .metric("mse", report.metrics.mse)
            .metric("rmse", report.metrics.rmse)
            .metric("mae", report.metrics.mae)
            .metric("mape", report.metrics.mape),
    );
    info!(
        quality = ?report.metrics.quality(),
        metrics = %report.metrics,
        "seasonal forecast evaluated"
    );
    Ok(report)
}
