//! Categorical encoding and numeric scaling
//!
//! [`Preprocessor::fit_transform`] turns a processed dataset into its final,
//! model-ready form and returns the fitted [`TransformSet`]. The set is
//! persisted under `<encoders_dir>/<dataset>/` and reloaded by the inference
//! service so requests go through exactly the transforms the training data did.

pub mod encoders;
pub mod scaler;

pub use encoders::{CategoricalEncoder, ColumnEncoder, LabelEncoder, OneHotEncoder, RareCollapser, RARE_LABEL};
pub use scaler::{ScalerParams, StandardScaler};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::artifacts::{file_stem, schema_hash, Artifact, ArtifactKind};
use crate::config::PreprocessingConfig;
use crate::data::{Dataset, Frame};
use crate::error::Result;

const MANIFEST_FILE: &str = "manifest.bin";
const SCALER_FILE: &str = "numeric_scaler.bin";

/// Column layout of a fitted transform set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformManifest {
    pub dataset: Dataset,
    pub excluded_columns: Vec<String>,
    pub encoded_columns: Vec<String>,
    pub scaled_columns: Vec<String>,
    pub output_columns: Vec<String>,
}

impl TransformManifest {
    pub fn schema_hash(&self) -> String {
        schema_hash(&self.output_columns)
    }
}

#[derive(Debug, Clone)]
pub struct TransformSet {
    pub manifest: TransformManifest,
    pub encoders: Vec<ColumnEncoder>,
    pub scaler: StandardScaler,
}

pub fn transform_dir(encoders_dir: &Path, dataset: Dataset) -> PathBuf {
    encoders_dir.join(dataset.name())
}

fn encoder_file(column: &str) -> String {
    format!("{}.encoder.bin", file_stem(column))
}

impl TransformSet {
    pub fn schema_hash(&self) -> String {
        self.manifest.schema_hash()
    }

    /// Apply the fitted encoders and scaler to a frame.
    ///
    /// Columns the set was fitted on but that are absent from `frame` are
    /// skipped.
    pub fn transform(&self, frame: &Frame) -> Result<Frame> {
        let mut out = frame.clone();
        for encoder in &self.encoders {
            if out.has_column(&encoder.column) {
                encoder.apply(&mut out)?;
            }
        }
        self.scaler.transform(&out)
    }

    pub fn save(&self, encoders_dir: &Path) -> Result<()> {
        let dir = transform_dir(encoders_dir, self.manifest.dataset);
        let hash = self.schema_hash();

        for encoder in &self.encoders {
            Artifact::new(ArtifactKind::CategoricalEncoder, &encoder.column, &hash, encoder)
                .save(&dir.join(encoder_file(&encoder.column)))?;
        }
        Artifact::new(ArtifactKind::NumericScaler, "numeric_scaler", &hash, &self.scaler)
            .save(&dir.join(SCALER_FILE))?;
        Artifact::new(ArtifactKind::TransformManifest, "manifest", &hash, &self.manifest)
            .save(&dir.join(MANIFEST_FILE))?;

        info!(
            dataset = %self.manifest.dataset,
            dir = %dir.display(),
            encoders = self.encoders.len(),
            schema_hash = %hash,
            "saved transforms"
        );
        Ok(())
    }

    /// Load a dataset's transforms; every artifact must carry the manifest's schema hash.
    pub fn load(encoders_dir: &Path, dataset: Dataset) -> Result<Self> {
        let dir = transform_dir(encoders_dir, dataset);
        let manifest = Artifact::<TransformManifest>::load(&dir.join(MANIFEST_FILE), ArtifactKind::TransformManifest)?;
        let hash = manifest.header.schema_hash.clone();
        let manifest = manifest.payload;

        let encoders = manifest
            .encoded_columns
            .iter()
            .map(|column| {
                Artifact::<ColumnEncoder>::load_matching(
                    &dir.join(encoder_file(column)),
                    ArtifactKind::CategoricalEncoder,
                    &hash,
                )
                .map(|a| a.payload)
            })
            .collect::<Result<Vec<_>>>()?;
        let scaler =
            Artifact::<StandardScaler>::load_matching(&dir.join(SCALER_FILE), ArtifactKind::NumericScaler, &hash)?
                .payload;

        debug!(dataset = %dataset, encoders = encoders.len(), "loaded transforms");
        Ok(Self {
            manifest,
            encoders,
            scaler,
        })
    }
}

pub struct Preprocessor {
    rare_threshold: f64,
}

impl Preprocessor {
    pub fn new(config: &PreprocessingConfig) -> Self {
        Self {
            rare_threshold: config.rare_category_threshold,
        }
    }

    /// Fit encoders on the categorical columns and one scaler on the numeric
    /// columns, and return the transformed frame.
    pub fn fit_transform(&self, frame: &Frame, dataset: Dataset) -> Result<(Frame, TransformSet)> {
        let excluded = vec![dataset.schema().timestamp_column.to_string()];
        let categorical: Vec<String> = frame
            .categorical_column_names()
            .into_iter()
            .filter(|c| !excluded.contains(c))
            .collect();
        let numeric = frame.numeric_column_names();

        let mut out = frame.clone();
        let mut encoders = Vec::with_capacity(categorical.len());
        for column in &categorical {
            let values = out.categorical(column).unwrap_or_default();
            let encoder = ColumnEncoder::fit(column, values, self.rare_threshold);
            debug!(
                column = %column,
                rare = encoder.rare.rare.len(),
                outputs = encoder.output_columns().len(),
                "fitted categorical encoder"
            );
            encoder.apply(&mut out)?;
            encoders.push(encoder);
        }

        let scaler = StandardScaler::fit(&out, &numeric)?;
        let out = scaler.transform(&out)?;

        let manifest = TransformManifest {
            dataset,
            excluded_columns: excluded,
            encoded_columns: categorical,
            scaled_columns: numeric,
            output_columns: out.column_names().into_iter().map(str::to_string).collect(),
        };
        info!(
            dataset = %dataset,
            encoded = manifest.encoded_columns.len(),
            scaled = manifest.scaled_columns.len(),
            columns = manifest.output_columns.len(),
            "preprocessed dataset"
        );

        Ok((
            out,
            TransformSet {
                manifest,
                encoders,
                scaler,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Column, TARGET_COLUMN};
    use crate::error::PipelineError;
    use chrono::{TimeZone, Utc};

    fn processed() -> Frame {
        let seasons = ["Winter", "Spring", "Summer", "Fall"];
        Frame::from_columns(vec![
            Column::timestamp(
                "time",
                (0..8)
                    .map(|h| Some(Utc.with_ymd_and_hms(2015, 1, 1, h, 0, 0).unwrap()))
                    .collect(),
            ),
            Column::numeric(TARGET_COLUMN, (0..8).map(|i| Some(20000.0 + i as f64 * 100.0)).collect()),
            Column::categorical(
                "is_weekend",
                (0..8).map(|i| Some(if i % 2 == 0 { "True" } else { "False" }.to_string())).collect(),
            ),
            Column::categorical("season", (0..8).map(|i| Some(seasons[i % 4].to_string())).collect()),
        ])
        .unwrap()
    }

    fn preprocessor() -> Preprocessor {
        Preprocessor::new(&PreprocessingConfig::default())
    }

    #[test]
    fn test_fit_transform_layout() {
        let (out, set) = preprocessor().fit_transform(&processed(), Dataset::Energy).unwrap();
        assert_eq!(
            out.column_names(),
            vec![
                "time",
                TARGET_COLUMN,
                "is_weekend",
                "season_Fall",
                "season_Spring",
                "season_Summer",
                "season_Winter"
            ]
        );
        assert_eq!(set.manifest.scaled_columns, vec![TARGET_COLUMN.to_string()]);
        assert_eq!(set.manifest.encoded_columns, vec!["is_weekend", "season"]);

        let load = out.numeric(TARGET_COLUMN).unwrap();
        let mean: f64 = load.iter().flatten().sum::<f64>() / 8.0;
        assert!(mean.abs() < 1e-9);
        // encoder outputs are not scaled
        assert_eq!(out.numeric("is_weekend").unwrap()[0], Some(1.0));
    }

    #[test]
    fn test_saved_transforms_reproduce_output() {
        let dir = tempfile::tempdir().unwrap();
        let (out, set) = preprocessor().fit_transform(&processed(), Dataset::Energy).unwrap();
        set.save(dir.path()).unwrap();

        assert!(dir.path().join("energy/season.encoder.bin").exists());
        assert!(dir.path().join("energy/numeric_scaler.bin").exists());

        let loaded = TransformSet::load(dir.path(), Dataset::Energy).unwrap();
        assert_eq!(loaded.schema_hash(), set.schema_hash());
        assert_eq!(loaded.transform(&processed()).unwrap(), out);
    }

    #[test]
    fn test_load_rejects_mixed_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let (_, set) = preprocessor().fit_transform(&processed(), Dataset::Energy).unwrap();
        set.save(dir.path()).unwrap();

        // a scaler written for another layout
        let other = Artifact::new(ArtifactKind::NumericScaler, "numeric_scaler", "deadbeef", &set.scaler);
        other.save(&dir.path().join("energy").join(SCALER_FILE)).unwrap();

        let err = TransformSet::load(dir.path(), Dataset::Energy).unwrap_err();
        assert!(matches!(err, PipelineError::IncompatibleArtifact { .. }));
    }

    #[test]
    fn test_datasets_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let (_, set) = preprocessor().fit_transform(&processed(), Dataset::Energy).unwrap();
        set.save(dir.path()).unwrap();

        let err = TransformSet::load(dir.path(), Dataset::Weather).unwrap_err();
        assert!(matches!(err, PipelineError::MissingFile(_)));
    }
}
