//! Full batch pipeline on a synthetic two-week dataset.

mod common;

use common::{reference_query, test_config, trained_workspace, write_raw_data, HOURS};
use energy_load_forecaster::data::{load_csv, Dataset, LoadMode, TARGET_COLUMN};
use energy_load_forecaster::forecast::SarimaModel;
use energy_load_forecaster::ml::{LoadPredictor, ModelArtifact, ModelKind};
use energy_load_forecaster::pipeline::{self, FamilyOutcome};
use energy_load_forecaster::tracking::{RunRecord, Trackers};
use energy_load_forecaster::PipelineError;

#[test]
fn test_analyze_writes_reports() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    write_raw_data(&cfg.paths.raw_dir);

    let reports = pipeline::analyze(&cfg).unwrap();
    assert_eq!(reports.len(), 2);
    // one row carries a negative generation value and is quarantined
    assert_eq!(reports[0].rows, HOURS as usize - 1);
    assert_eq!(reports[1].rows, HOURS as usize);

    let json = std::fs::read_to_string(cfg.paths.processed_dir.join("energy_analysis.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["dataset"], "energy");
    assert!(cfg.paths.processed_dir.join("weather_analysis.json").exists());
}

#[test]
fn test_engineer_and_preprocess_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    write_raw_data(&cfg.paths.raw_dir);

    pipeline::engineer(&cfg).unwrap();
    let processed_path = cfg.paths.processed_dir.join(Dataset::Energy.processed_file());
    let processed = load_csv(&processed_path, Dataset::Energy.schema(), LoadMode::Derived)
        .unwrap()
        .frame;
    for column in ["hour", "day_of_week", "month", "year", "is_weekend", "season", "generation solar_percentage"] {
        assert!(processed.has_column(column), "missing engineered column {}", column);
    }
    assert!(processed.numeric("generation biomass").unwrap().iter().all(Option::is_some));

    let manifests = pipeline::preprocess(&cfg).unwrap();
    assert_eq!(manifests.len(), 2);
    let energy = &manifests[0];
    assert!(energy.encoded_columns.contains(&"is_weekend".to_string()));
    assert!(energy.scaled_columns.contains(&TARGET_COLUMN.to_string()));
    assert!(cfg.paths.encoders_dir.join("energy/manifest.bin").exists());
    assert!(cfg.paths.encoders_dir.join("weather/numeric_scaler.bin").exists());
    assert!(cfg.paths.processed_dir.join(Dataset::Weather.final_file()).exists());
}

#[test]
fn test_train_persists_candidates_and_serves_reference_record() {
    let (_dir, cfg) = trained_workspace();

    for kind in [ModelKind::RandomForest, ModelKind::GradientBoosting, ModelKind::LinearRegression] {
        assert!(cfg.paths.models_dir.join(pipeline::model_file(kind)).exists());
    }
    assert!(cfg.model_path().exists());

    let runs: Vec<RunRecord> = std::fs::read_to_string(cfg.runs_path())
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(runs.len(), 3);
    assert!(runs.iter().all(|r| r.metrics.contains_key("mse") && r.metrics.contains_key("r2")));

    let predictor = LoadPredictor::load(&cfg.model_path(), &cfg.paths.encoders_dir).unwrap();
    let prediction = predictor.predict(&reference_query()).unwrap();
    assert!(prediction.is_finite());
}

#[test]
fn test_model_with_foreign_schema_hash_is_rejected() {
    let (dir, cfg) = trained_workspace();

    let artifact = ModelArtifact::load(&cfg.model_path()).unwrap();
    let foreign = dir.path().join("foreign.bin");
    artifact.payload.save(&foreign, "0000000000000000").unwrap();

    let err = LoadPredictor::load(&foreign, &cfg.paths.encoders_dir).unwrap_err();
    assert!(matches!(err, PipelineError::IncompatibleArtifact { .. }));
}

#[test]
fn test_tune_keeps_one_model_per_family() {
    let (_dir, cfg) = trained_workspace();

    let summary = pipeline::tune(&cfg, &Trackers::default()).unwrap();
    assert_eq!(summary.families.len(), 2);
    assert_eq!(summary.families[0].kind, ModelKind::RandomForest);
    for family in &summary.families {
        match &family.outcome {
            FamilyOutcome::Tuned { cv_mse, evaluated, .. } => {
                assert!(cv_mse.is_finite());
                assert_eq!(*evaluated, family.configurations);
            }
            FamilyOutcome::Failed { error } => panic!("{} failed: {}", family.kind, error),
        }
    }
    assert_eq!(summary.families[0].configurations, 2);
    assert!(cfg
        .paths
        .models_dir
        .join(pipeline::best_model_file(ModelKind::RandomForest))
        .exists());
    assert!(cfg
        .paths
        .models_dir
        .join(pipeline::best_model_file(ModelKind::GradientBoosting))
        .exists());

    let served = ModelArtifact::load(&cfg.model_path()).unwrap();
    assert_eq!(served.payload.spec.kind(), summary.best);
}

#[test]
fn test_tune_reports_failed_family_and_serves_the_other() {
    let (_dir, mut cfg) = trained_workspace();
    cfg.training.forest_grid.n_trees.clear();

    let summary = pipeline::tune(&cfg, &Trackers::from_config(&cfg)).unwrap();
    assert_eq!(summary.families.len(), 2);

    let forest = &summary.families[0];
    assert_eq!(forest.kind, ModelKind::RandomForest);
    assert!(forest.is_failed());
    assert_eq!(forest.configurations, 0);
    assert!(!summary.families[1].is_failed());
    assert_eq!(summary.best, ModelKind::GradientBoosting);
    assert!(!cfg
        .paths
        .models_dir
        .join(pipeline::best_model_file(ModelKind::RandomForest))
        .exists());

    let runs: Vec<RunRecord> = std::fs::read_to_string(cfg.runs_path())
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let failed: Vec<&RunRecord> = runs
        .iter()
        .filter(|r| r.tags.get("status").map(String::as_str) == Some("failed"))
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].run_name, "RandomForest");
    assert_eq!(failed[0].tags["stage"], "tune");
}

#[test]
fn test_forecast_scores_held_out_day() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    write_raw_data(&cfg.paths.raw_dir);
    pipeline::engineer(&cfg).unwrap();

    let report = pipeline::forecast(&cfg, &Trackers::default()).unwrap();
    assert_eq!(report.points.len(), cfg.forecast.horizon_hours);
    assert!(report.metrics.mse.is_finite());
    assert!(report.metrics.mape.is_finite());

    let saved = SarimaModel::load(&cfg.paths.models_dir.join(pipeline::SARIMA_MODEL_FILE)).unwrap();
    assert_eq!(saved.last_timestamp, report.model.last_timestamp);
    assert!(cfg.paths.processed_dir.join(pipeline::FORECAST_FILE).exists());
}

#[test]
fn test_missing_raw_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());

    let err = pipeline::engineer(&cfg).unwrap_err();
    assert!(matches!(err, PipelineError::MissingFile(_)));
}
