use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// Errors raised by the batch pipeline and the artifact layer.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("required column '{column}' not found in {}", path.display())]
    MissingColumn { column: String, path: PathBuf },

    #[error("schema error: {0}")]
    Schema(String),

    #[error("unknown category '{value}' for column '{column}'")]
    UnknownCategory { column: String, value: String },

    #[error("incompatible artifact {}: {reason}", path.display())]
    IncompatibleArtifact { path: PathBuf, reason: String },

    #[error("model error: {0}")]
    Model(String),

    #[error("insufficient data: need at least {required} rows, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("tracking error: {0}")]
    Tracking(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn model(err: impl std::fmt::Debug) -> Self {
        PipelineError::Model(format!("{:?}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_column_names_the_column() {
        let err = PipelineError::MissingColumn {
            column: "total load actual".to_string(),
            path: PathBuf::from("data/processed/final_energy_data.csv"),
        };
        let msg = err.to_string();
        assert!(msg.contains("'total load actual'"));
        assert!(msg.contains("final_energy_data.csv"));
    }

    #[test]
    fn test_model_error_from_debug() {
        let err = PipelineError::model("tree fit failed");
        assert_eq!(err.to_string(), "model error: \"tree fit failed\"");
    }
}
