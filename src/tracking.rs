//! Experiment tracking
//!
//! Every training run is appended to a JSON-lines log next to the models.
//! With the `mlflow` feature and `tracking.mlflow_uri` set, the run is also
//! reported to an MLflow tracking server over its REST API.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_name: String,
    pub started_at: DateTime<Utc>,
    pub params: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
    pub tags: BTreeMap<String, String>,
}

impl RunRecord {
    pub fn new(run_name: impl Into<String>) -> Self {
        Self {
            run_name: run_name.into(),
            started_at: Utc::now(),
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
            tags: BTreeMap::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    pub fn metric(mut self, key: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait RunTracker: Send + Sync {
    fn name(&self) -> &'static str;

    fn log_run(&self, run: &RunRecord) -> Result<()>;
}

pub struct JsonLinesTracker {
    path: PathBuf,
}

impl JsonLinesTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RunTracker for JsonLinesTracker {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn log_run(&self, run: &RunRecord) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }
        let line = serde_json::to_string(run).map_err(|e| PipelineError::Tracking(e.to_string()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| PipelineError::io(&self.path, e))?;
        writeln!(file, "{}", line).map_err(|e| PipelineError::io(&self.path, e))?;
        Ok(())
    }
}

#[cfg(feature = "mlflow")]
pub use mlflow::MlflowTracker;

#[cfg(feature = "mlflow")]
mod mlflow {
    use super::*;
    use serde_json::{json, Value};

    /// Client for the MLflow 2.0 REST API.
    pub struct MlflowTracker {
        client: reqwest::blocking::Client,
        base_url: String,
        experiment_id: String,
    }

    impl MlflowTracker {
        pub fn new(base_url: &str, experiment_id: impl Into<String>) -> Result<Self> {
            let client = reqwest::blocking::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .map_err(|e| PipelineError::Tracking(e.to_string()))?;
            Ok(Self {
                client,
                base_url: base_url.trim_end_matches('/').to_string(),
                experiment_id: experiment_id.into(),
            })
        }

        fn post(&self, endpoint: &str, body: Value) -> Result<Value> {
            let url = format!("{}/api/2.0/mlflow/{}", self.base_url, endpoint);
            let response = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .and_then(|r| r.error_for_status())
                .map_err(|e| PipelineError::Tracking(format!("{}: {}", endpoint, e)))?;
            response
                .json()
                .map_err(|e| PipelineError::Tracking(format!("{}: {}", endpoint, e)))
        }
    }

    impl RunTracker for MlflowTracker {
        fn name(&self) -> &'static str {
            "mlflow"
        }

        fn log_run(&self, run: &RunRecord) -> Result<()> {
            let tags: Vec<Value> = run
                .tags
                .iter()
                .map(|(k, v)| json!({ "key": k, "value": v }))
                .collect();
            let created = self.post(
                "runs/create",
                json!({
                    "experiment_id": self.experiment_id,
                    "run_name": run.run_name,
                    "start_time": run.started_at.timestamp_millis(),
                    "tags": tags,
                }),
            )?;
            let run_id = created["run"]["info"]["run_id"]
                .as_str()
                .ok_or_else(|| PipelineError::Tracking("runs/create returned no run_id".to_string()))?
                .to_string();

            for (key, value) in &run.params {
                self.post(
                    "runs/log-parameter",
                    json!({ "run_id": run_id, "key": key, "value": value }),
                )?;
            }
            let now = Utc::now().timestamp_millis();
            for (key, value) in &run.metrics {
                self.post(
                    "runs/log-metric",
                    json!({ "run_id": run_id, "key": key, "value": value, "timestamp": now, "step": 0 }),
                )?;
            }
            self.post(
                "runs/update",
                json!({ "run_id": run_id, "status": "FINISHED", "end_time": now }),
            )?;
            debug!(run_id = %run_id, run = %run.run_name, "reported run to mlflow");
            Ok(())
        }
    }
}

/// Fans a run out to every configured tracker. Tracker failures are logged
/// and never abort the training run.
#[derive(Default)]
pub struct Trackers {
    trackers: Vec<Box<dyn RunTracker>>,
}

impl Trackers {
    pub fn new(trackers: Vec<Box<dyn RunTracker>>) -> Self {
        Self { trackers }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut trackers: Vec<Box<dyn RunTracker>> = vec![Box::new(JsonLinesTracker::new(config.runs_path()))];

        if let Some(uri) = &config.tracking.mlflow_uri {
            #[cfg(feature = "mlflow")]
            match MlflowTracker::new(uri, config.tracking.experiment_id.clone()) {
                Ok(tracker) => trackers.push(Box::new(tracker)),
                Err(e) => warn!(error = %e, "mlflow tracker disabled"),
            }
            #[cfg(not(feature = "mlflow"))]
            warn!(uri = %uri, "tracking.mlflow_uri is set but the mlflow feature is disabled");
        }
        Self { trackers }
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }

    /// Returns the number of trackers that accepted the run.
    pub fn report(&self, run: &RunRecord) -> usize {
        let mut accepted = 0;
        for tracker in &self.trackers {
            match tracker.log_run(run) {
                Ok(()) => accepted += 1,
                Err(e) => warn!(tracker = tracker.name(), run = %run.run_name, error = %e, "failed to track run"),
            }
        }
        accepted
    }
}
