//! Versioned on-disk artifacts
//!
//! Every fitted transform and model is written as a bincode [`Artifact`]
//! envelope. The envelope records a format version, the artifact kind and
//! the hash of the column layout it was fitted against, so a reader can
//! refuse an artifact from an older format or a different feature schema
//! before touching its payload.

use std::path::Path;

use chrono::{DateTime, Utc};
use ring::digest::{digest, SHA256};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, Result};

/// Bumped whenever an artifact payload changes shape.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactKind {
    CategoricalEncoder,
    NumericScaler,
    TransformManifest,
    Regressor,
    SeasonalModel,
}

/// Leading fields of every artifact; decodable without knowing the payload type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactHeader {
    pub format_version: u32,
    pub kind: ArtifactKind,
    pub name: String,
    pub schema_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact<T> {
    pub header: ArtifactHeader,
    pub payload: T,
}

impl<T: Serialize> Artifact<T> {
    pub fn new(kind: ArtifactKind, name: impl Into<String>, schema_hash: impl Into<String>, payload: T) -> Self {
        Self {
            header: ArtifactHeader {
                format_version: FORMAT_VERSION,
                kind,
                name: name.into(),
                schema_hash: schema_hash.into(),
                created_at: Utc::now(),
            },
            payload,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }
        let bytes = bincode::serialize(self)?;
        std::fs::write(path, bytes).map_err(|e| PipelineError::io(path, e))?;
        debug!(path = %path.display(), kind = ?self.header.kind, name = %self.header.name, "saved artifact");
        Ok(())
    }
}

impl<T: DeserializeOwned> Artifact<T> {
    /// Load an artifact, checking format version and kind.
    pub fn load(path: &Path, kind: ArtifactKind) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PipelineError::MissingFile(path.to_path_buf()),
            _ => PipelineError::io(path, e),
        })?;

        let incompatible = |reason: String| PipelineError::IncompatibleArtifact {
            path: path.to_path_buf(),
            reason,
        };

        let header: ArtifactHeader = bincode::deserialize(&bytes)
            .map_err(|e| incompatible(format!("unreadable header: {}", e)))?;
        if header.format_version != FORMAT_VERSION {
            return Err(incompatible(format!(
                "format version {} (expected {})",
                header.format_version, FORMAT_VERSION
            )));
        }
        if header.kind != kind {
            return Err(incompatible(format!("kind {:?} (expected {:?})", header.kind, kind)));
        }

        bincode::deserialize(&bytes).map_err(|e| incompatible(format!("unreadable payload: {}", e)))
    }

    /// Load an artifact and additionally require a schema hash.
    pub fn load_matching(path: &Path, kind: ArtifactKind, schema_hash: &str) -> Result<Self> {
        let artifact = Self::load(path, kind)?;
        if artifact.header.schema_hash != schema_hash {
            return Err(PipelineError::IncompatibleArtifact {
                path: path.to_path_buf(),
                reason: format!(
                    "schema hash {} does not match {}",
                    artifact.header.schema_hash, schema_hash
                ),
            });
        }
        Ok(artifact)
    }
}

/// SHA-256 (hex) of an ordered column layout.
pub fn schema_hash<S: AsRef<str>>(columns: &[S]) -> String {
    let mut buf = Vec::new();
    for column in columns {
        let name = column.as_ref().as_bytes();
        buf.extend_from_slice(&(name.len() as u64).to_le_bytes());
        buf.extend_from_slice(name);
    }
    digest(&SHA256, &buf)
        .as_ref()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// File-system safe stem for a column name.
pub fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
