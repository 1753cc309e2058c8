//! Request-time prediction
//!
//! A [`LoadPredictor`] holds the selected model together with the energy
//! transforms it was trained behind. Both are loaded once and only read
//! afterwards, so a predictor can be shared across request handlers.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::models::{ModelArtifact, ModelKind};
use super::{FeatureMatrix, Regressor};
use crate::data::{Column, Dataset, Frame};
use crate::error::{PipelineError, Result};
use crate::features::{flag_label, Season};
use crate::preprocessing::TransformSet;

/// One record to score, keyed by dataset column names.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadQuery {
    /// Generation and forecast quantities in MW.
    pub quantities: Vec<(String, f64)>,
    pub hour: u32,
    pub day_of_week: u32,
    pub month: u32,
    pub is_weekend: bool,
    pub season: Season,
}

impl LoadQuery {
    /// The query as a one-row engineered frame.
    ///
    /// Generation-mix percentages are not derived here: a request carries
    /// only some of the generation sources, so shares computed over them
    /// would not match the shares seen in training. The predictor fills
    /// those features like any other absent feature.
    pub fn to_frame(&self) -> Result<Frame> {
        let mut frame = Frame::new();
        for (name, value) in &self.quantities {
            frame.push_column(Column::numeric(name.clone(), vec![Some(*value)]))?;
        }
        frame.push_column(Column::numeric("hour", vec![Some(self.hour as f64)]))?;
        frame.push_column(Column::numeric("day_of_week", vec![Some(self.day_of_week as f64)]))?;
        frame.push_column(Column::numeric("month", vec![Some(self.month as f64)]))?;
        frame.push_column(Column::categorical(
            "is_weekend",
            vec![Some(flag_label(self.is_weekend).to_string())],
        ))?;
        frame.push_column(Column::categorical("season", vec![Some(self.season.as_str().to_string())]))?;
        Ok(frame)
    }
}

#[derive(Debug)]
pub struct LoadPredictor {
    model: ModelArtifact,
    transforms: TransformSet,
    source: PathBuf,
}

impl LoadPredictor {
    /// Load the model and the energy transforms, refusing a model that was
    /// trained against a different transform layout.
    pub fn load(model_path: &Path, encoders_dir: &Path) -> Result<Self> {
        let artifact = ModelArtifact::load(model_path)?;
        let transforms = TransformSet::load(encoders_dir, Dataset::Energy)?;

        let expected = transforms.schema_hash();
        if artifact.header.schema_hash != expected {
            return Err(PipelineError::IncompatibleArtifact {
                path: model_path.to_path_buf(),
                reason: format!(
                    "model trained against transform schema {}, encoders are {}",
                    artifact.header.schema_hash, expected
                ),
            });
        }

        info!(
            model = %artifact.payload.spec.kind(),
            features = artifact.payload.feature_names.len(),
            path = %model_path.display(),
            "loaded predictor"
        );
        Ok(Self::from_parts(artifact.payload, transforms, model_path))
    }

    pub fn from_parts(model: ModelArtifact, transforms: TransformSet, source: impl Into<PathBuf>) -> Self {
        Self {
            model,
            transforms,
            source: source.into(),
        }
    }

    pub fn model_kind(&self) -> ModelKind {
        self.model.spec.kind()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.model.feature_names
    }

    pub fn schema_hash(&self) -> String {
        self.transforms.schema_hash()
    }

    /// Predicted actual load in MW.
    pub fn predict(&self, query: &LoadQuery) -> Result<f64> {
        self.predict_frame(&query.to_frame()?)
    }

    fn predict_frame(&self, frame: &Frame) -> Result<f64> {
        let encoded = self.transforms.transform(frame)?;

        // absent features take 0, the training mean after scaling
        let row: Vec<f64> = self
            .model
            .feature_names
            .iter()
            .map(|name| encoded.numeric(name).and_then(|v| v[0]).unwrap_or(0.0))
            .collect();
        let x = FeatureMatrix::from_rows(self.model.feature_names.clone(), &[row])?;

        let scaled = self
            .model
            .model
            .predict(&x)?
            .first()
            .copied()
            .ok_or_else(|| PipelineError::Model("model returned no prediction".to_string()))?;
        let prediction = self
            .transforms
            .scaler
            .inverse_value(&self.model.target, scaled)
            .ok_or_else(|| PipelineError::IncompatibleArtifact {
                path: self.source.clone(),
                reason: format!("encoders have no scaling for target '{}'", self.model.target),
            })?;

        if !prediction.is_finite() {
            return Err(PipelineError::Model(format!(
                "non-finite prediction {} from {}",
                prediction,
                self.model_kind()
            )));
        }
        debug!(prediction, "scored request");
        Ok(prediction)
    }
}
