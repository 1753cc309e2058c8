use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "config/default.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub paths: PathsConfig,
    pub preprocessing: PreprocessingConfig,
    pub training: TrainingConfig,
    pub forecast: ForecastConfig,
    pub server: ServerConfig,
    pub tracking: TrackingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub encoders_dir: PathBuf,
    pub models_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            processed_dir: PathBuf::from("data/processed"),
            encoders_dir: PathBuf::from("encoders"),
            models_dir: PathBuf::from("models"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// Categories rarer than this share of non-missing cells collapse into `RARE`.
    pub rare_category_threshold: f64,
    /// Rows keeping fewer than this share of non-missing cells are dropped.
    pub missing_row_threshold: f64,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            rare_category_threshold: 0.01,
            missing_row_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Share of rows held out for validation.
    pub validation_ratio: f64,
    pub seed: u64,
    pub cv_folds: usize,
    pub forest_grid: ForestGrid,
    pub boosting_grid: BoostingGrid,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            validation_ratio: 0.2,
            seed: 42,
            cv_folds: 3,
            forest_grid: ForestGrid::default(),
            boosting_grid: BoostingGrid::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestGrid {
    pub n_trees: Vec<usize>,
    pub max_depth: Vec<u16>,
    pub min_samples_split: Vec<usize>,
}

impl Default for ForestGrid {
    fn default() -> Self {
        Self {
            n_trees: vec![50, 100, 200],
            max_depth: vec![10, 20, 30],
            min_samples_split: vec![2, 5, 10],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostingGrid {
    pub n_estimators: Vec<usize>,
    pub learning_rate: Vec<f64>,
    pub max_depth: Vec<u16>,
}

impl Default for BoostingGrid {
    fn default() -> Self {
        Self {
            n_estimators: vec![50, 100, 200],
            learning_rate: vec![0.01, 0.1, 0.2],
            max_depth: vec![3, 5, 7],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Held-out tail length and forecast horizon.
    pub horizon_hours: usize,
    pub season_length: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon_hours: 24,
            season_length: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub enable_cors: bool,
    pub cors_origin: String,
    /// Refuse to start when the model artifact cannot be loaded.
    pub require_model: bool,
    /// Model file name inside `paths.models_dir`.
    pub model_file: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            request_timeout_secs: 10,
            enable_cors: true,
            cors_origin: "http://localhost:3000".to_string(),
            require_model: true,
            model_file: "trained_model.bin".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// JSON-lines run log inside `paths.models_dir`.
    pub runs_file: String,
    pub mlflow_uri: Option<String>,
    pub experiment_id: String,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            runs_file: "runs.jsonl".to_string(),
            mlflow_uri: None,
            experiment_id: "0".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("ELF__").split("__"));
        let cfg: Config = figment.extract()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        let ratio = self.training.validation_ratio;
        if ratio <= 0.0 || ratio >= 1.0 {
            anyhow::bail!("training.validation_ratio must be between 0 and 1, got {}", ratio);
        }
        if !(0.0..1.0).contains(&self.preprocessing.rare_category_threshold) {
            anyhow::bail!(
                "preprocessing.rare_category_threshold must be in [0, 1), got {}",
                self.preprocessing.rare_category_threshold
            );
        }
        if self.training.cv_folds < 2 {
            anyhow::bail!("training.cv_folds must be at least 2");
        }
        if self.forecast.horizon_hours == 0 || self.forecast.season_length == 0 {
            anyhow::bail!("forecast.horizon_hours and forecast.season_length must be positive");
        }
        Ok(())
    }

    pub fn model_path(&self) -> PathBuf {
        self.paths.models_dir.join(&self.server.model_file)
    }

    pub fn runs_path(&self) -> PathBuf {
        self.paths.models_dir.join(&self.tracking.runs_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_pipeline_conventions() {
        let cfg = Config::default();
        assert_eq!(cfg.preprocessing.rare_category_threshold, 0.01);
        assert_eq!(cfg.training.validation_ratio, 0.2);
        assert_eq!(cfg.training.seed, 42);
        assert_eq!(cfg.training.cv_folds, 3);
        assert_eq!(cfg.forecast.season_length, 24);
        assert_eq!(cfg.model_path(), PathBuf::from("models/trained_model.bin"));
    }

    #[test]
    fn test_load_merges_toml_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("elf.toml");
        std::fs::write(
            &path,
            "[training]\nseed = 7\n\n[server]\nport = 9100\n",
        )
        .unwrap();

        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.training.seed, 7);
        assert_eq!(cfg.server.port, 9100);
        assert_eq!(cfg.training.validation_ratio, 0.2);
    }

    #[test]
    fn test_invalid_split_ratio_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("elf.toml");
        std::fs::write(&path, "[training]\nvalidation_ratio = 1.5\n").unwrap();

        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_socket_addr() {
        let server = ServerConfig::default();
        assert_eq!(server.socket_addr().unwrap().port(), 8000);
    }
}
