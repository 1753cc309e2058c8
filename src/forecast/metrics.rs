//! Forecast accuracy metrics

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PipelineError, Result};

/// Accuracy of a forecast against the held-out actuals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetrics {
    pub mse: f64,
    pub mae: f64,
    pub rmse: f64,
    /// Mean absolute percentage error (%); zero actuals are skipped.
    pub mape: f64,
    pub max_error: f64,
    pub sample_count: usize,
}

impl ForecastMetrics {
    pub fn calculate(actual: &[f64], predicted: &[f64]) -> Result<Self> {
        if actual.len() != predicted.len() {
            return Err(PipelineError::Model(format!(
                "forecast length {} does not match {} actual values",
                predicted.len(),
                actual.len()
            )));
        }
        if actual.is_empty() {
            return Err(PipelineError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }

        let n = actual.len() as f64;
        let errors: Vec<f64> = actual.iter().zip(predicted).map(|(a, p)| a - p).collect();

        let mse = errors.iter().map(|e| e * e).sum::<f64>() / n;
        let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;
        let max_error = errors.iter().map(|e| e.abs()).fold(0.0f64, f64::max);

        let percentage: Vec<f64> = actual
            .iter()
            .zip(&errors)
            .filter(|(a, _)| a.abs() > 1e-6)
            .map(|(a, e)| (e / a).abs() * 100.0)
            .collect();
        let mape = if percentage.is_empty() {
            0.0
        } else {
            percentage.iter().sum::<f64>() / percentage.len() as f64
        };

        Ok(Self {
            mse,
            mae,
            rmse: mse.sqrt(),
            mape,
            max_error,
            sample_count: actual.len(),
        })
    }

    pub fn quality(&self) -> ForecastQuality {
        match self.mape {
            m if m < 5.0 => ForecastQuality::Excellent,
            m if m < 10.0 => ForecastQuality::Good,
            m if m < 20.0 => ForecastQuality::Fair,
            m if m < 50.0 => ForecastQuality::Poor,
            _ => ForecastQuality::VeryPoor,
        }
    }
}

impl fmt::Display for ForecastMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MSE={:.3}, MAE={:.3}, RMSE={:.3}, MAPE={:.2}% over {} hours ({:?})",
            self.mse,
            self.mae,
            self.rmse,
            self.mape,
            self.sample_count,
            self.quality()
        )
    }
}

/// MAPE bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForecastQuality {
    Excellent,
    Good,
    Fair,
    Poor,
    VeryPoor,
}
