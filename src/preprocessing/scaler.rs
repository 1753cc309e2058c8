//! Standard (z-score) scaling of numeric columns.

use serde::{Deserialize, Serialize};

use crate::data::{Column, Frame};
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalerParams {
    pub mean: f64,
    /// Population standard deviation; 1 for constant columns.
    pub scale: f64,
}

impl ScalerParams {
    fn fit(values: &[Option<f64>]) -> Self {
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        if present.is_empty() {
            return Self { mean: 0.0, scale: 1.0 };
        }
        let n = present.len() as f64;
        let mean = present.iter().sum::<f64>() / n;
        let variance = present.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt();
        Self {
            mean,
            scale: if std > 0.0 { std } else { 1.0 },
        }
    }

    pub fn transform(&self, value: f64) -> f64 {
        (value - self.mean) / self.scale
    }

    pub fn inverse(&self, value: f64) -> f64 {
        value * self.scale + self.mean
    }
}

/// One fitted scaler shared by a fixed, ordered set of numeric columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    columns: Vec<String>,
    params: Vec<ScalerParams>,
}

impl StandardScaler {
    /// Fit on the given numeric columns; missing cells are ignored.
    pub fn fit(frame: &Frame, columns: &[String]) -> Result<Self> {
        let params = columns
            .iter()
            .map(|name| {
                frame
                    .numeric(name)
                    .map(ScalerParams::fit)
                    .ok_or_else(|| PipelineError::Schema(format!("cannot scale non-numeric column '{}'", name)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            columns: columns.to_vec(),
            params,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn params(&self, column: &str) -> Option<ScalerParams> {
        let idx = self.columns.iter().position(|c| c == column)?;
        Some(self.params[idx])
    }

    /// Scaled copy of `frame`. Fitted columns absent from `frame` are skipped.
    pub fn transform(&self, frame: &Frame) -> Result<Frame> {
        let mut out = frame.clone();
        for (name, params) in self.columns.iter().zip(&self.params) {
            if !frame.has_column(name) {
                continue;
            }
            let values = frame
                .numeric(name)
                .ok_or_else(|| PipelineError::Schema(format!("cannot scale non-numeric column '{}'", name)))?;
            let scaled = values.iter().map(|v| v.map(|x| params.transform(x))).collect();
            out.push_column(Column::numeric(name.clone(), scaled))?;
        }
        Ok(out)
    }

    /// Map a scaled value of one column back to original units.
    pub fn inverse_value(&self, column: &str, value: f64) -> Option<f64> {
        self.params(column).map(|p| p.inverse(value))
    }
}
