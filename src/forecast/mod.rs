//! Seasonal load forecasting
//!
//! The processed energy data is regularised to an hourly series, a
//! [`SarimaModel`] is fitted on all but the last `horizon_hours` and scored
//! against that held-out tail.

pub mod metrics;
pub mod sarima;

pub use metrics::{ForecastMetrics, ForecastQuality};
pub use sarima::{SarimaModel, SeasonalOrder};

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::ForecastConfig;
use crate::data::{ColumnData, Frame};
use crate::error::{PipelineError, Result};

/// A gap-free hourly series.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlySeries {
    pub start: DateTime<Utc>,
    pub values: Vec<f64>,
    /// Hours that were absent or missing and filled by interpolation.
    pub interpolated: usize,
    /// Later rows sharing an earlier row's timestamp.
    pub duplicates: usize,
}

impl HourlySeries {
    /// Sort by time, keep the first row per timestamp, reindex to every hour
    /// between the first and last observation and interpolate the gaps
    /// linearly. Timestamps off the hourly grid are dropped.
    pub fn from_frame(frame: &Frame, timestamp_column: &str, value_column: &str, source: &Path) -> Result<Self> {
        let stamps = match &frame.require_column(timestamp_column, source)?.data {
            ColumnData::Timestamp(v) => v,
            _ => {
                return Err(PipelineError::Schema(format!(
                    "column '{}' is not a timestamp",
                    timestamp_column
                )))
            }
        };
        let values = match &frame.require_column(value_column, source)?.data {
            ColumnData::Numeric(v) => v,
            _ => return Err(PipelineError::Schema(format!("column '{}' is not numeric", value_column))),
        };

        let mut observations: Vec<(DateTime<Utc>, Option<f64>)> = stamps
            .iter()
            .zip(values)
            .filter_map(|(ts, v)| ts.map(|ts| (ts, *v)))
            .collect();
        observations.sort_by_key(|(ts, _)| *ts);
        let before = observations.len();
        observations.dedup_by_key(|(ts, _)| *ts);
        let duplicates = before - observations.len();

        let start = observations
            .first()
            .map(|(ts, _)| *ts)
            .ok_or(PipelineError::InsufficientData { required: 1, actual: 0 })?;
        let end = observations.last().map_or(start, |(ts, _)| *ts);
        let n_hours = (end - start).num_hours() as usize + 1;

        let mut grid: Vec<Option<f64>> = vec![None; n_hours];
        let mut off_grid = 0;
        for (ts, value) in observations {
            let offset = ts - start;
            if offset.num_seconds() % 3600 != 0 {
                off_grid += 1;
                continue;
            }
            grid[offset.num_hours() as usize] = value;
        }
        if off_grid > 0 {
            debug!(off_grid, "dropped timestamps off the hourly grid");
        }

        let interpolated = grid.iter().filter(|v| v.is_none()).count();
        let values = interpolate_linear(&grid)?;
        Ok(Self {
            start,
            values,
            interpolated,
            duplicates,
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn timestamp(&self, idx: usize) -> DateTime<Utc> {
        self.start + Duration::hours(idx as i64)
    }
}

/// Fill interior gaps linearly; leading and trailing gaps take the nearest value.
fn interpolate_linear(values: &[Option<f64>]) -> Result<Vec<f64>> {
    let known: Vec<(usize, f64)> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (i, v)))
        .collect();
    if known.is_empty() {
        return Err(PipelineError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }

    let mut out = Vec::with_capacity(values.len());
    let mut next = 0;
    for i in 0..values.len() {
        while next < known.len() && known[next].0 < i {
            next += 1;
        }
        let value = match (next.checked_sub(1).map(|p| known[p]), known.get(next)) {
            (_, Some(&(j, v))) if j == i => v,
            (Some((i0, v0)), Some(&(i1, v1))) => v0 + (v1 - v0) * (i - i0) as f64 / (i1 - i0) as f64,
            (Some((_, v0)), None) => v0,
            (None, Some(&(_, v1))) => v1,
            (None, None) => unreachable!("known is non-empty"),
        };
        out.push(value);
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    pub predicted: f64,
    pub actual: f64,
}

#[derive(Debug)]
pub struct ForecastReport {
    pub model: SarimaModel,
    pub points: Vec<ForecastPoint>,
    pub metrics: ForecastMetrics,
}

pub struct SeasonalForecaster {
    horizon: usize,
    order: SeasonalOrder,
}

impl SeasonalForecaster {
    pub fn new(config: &ForecastConfig) -> Self {
        Self {
            horizon: config.horizon_hours,
            order: SeasonalOrder {
                season_length: config.season_length,
            },
        }
    }

    /// Fit on everything but the last `horizon` hours and score the forecast
    /// of those hours.
    pub fn fit_and_evaluate(&self, series: &HourlySeries) -> Result<ForecastReport> {
        let required = self.order.min_observations() + self.horizon;
        if series.len() < required {
            return Err(PipelineError::InsufficientData {
                required,
                actual: series.len(),
            });
        }

        let split = series.len() - self.horizon;
        let (history, held_out) = series.values.split_at(split);
        let mut model = SarimaModel::fit(history, self.order, series.timestamp(split - 1))?;
        let predicted = model.forecast(self.horizon)?;
        let metrics = ForecastMetrics::calculate(held_out, &predicted)?;

        let points = predicted
            .iter()
            .zip(held_out)
            .enumerate()
            .map(|(i, (p, a))| ForecastPoint {
                timestamp: series.timestamp(split + i),
                predicted: *p,
                actual: *a,
            })
            .collect();

        info!(
            order = %self.order,
            observations = history.len(),
            horizon = self.horizon,
            mse = metrics.mse,
            mape = metrics.mape,
            "evaluated seasonal forecast"
        );
        Ok(ForecastReport { model, points, metrics })
    }
}
