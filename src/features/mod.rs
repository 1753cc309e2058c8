//! Feature engineering
//!
//! Turns a raw dataset into the processed file: missing values are dropped
//! or filled, calendar attributes are derived from the timestamp, the
//! generation mix is expressed as percentages, and numeric outliers are
//! clipped to their IQR fences.

pub mod outliers;

pub use outliers::{clip_outliers, outlier_summary, IqrFences, OutlierCount};

use std::path::Path;

use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::PreprocessingConfig;
use crate::data::{Column, ColumnData, Frame, Schema, TARGET_COLUMN};
use crate::error::{PipelineError, Result};

pub const PERCENTAGE_SUFFIX: &str = "_percentage";

/// Meteorological season of a calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Fall,
}

impl Season {
    /// Seasons in sorted label order; the index is the numeric season code.
    pub const BY_CODE: [Season; 4] = [Season::Fall, Season::Spring, Season::Summer, Season::Winter];

    pub fn from_month(month: u32) -> Self {
        match month {
            12 | 1 | 2 => Season::Winter,
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            _ => Season::Fall,
        }
    }

    pub fn from_code(code: usize) -> Option<Self> {
        Self::BY_CODE.get(code).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Season::Winter => "Winter",
            Season::Spring => "Spring",
            Season::Summer => "Summer",
            Season::Fall => "Fall",
        }
    }
}

/// Label written for boolean calendar flags.
pub fn flag_label(flag: bool) -> &'static str {
    if flag {
        "True"
    } else {
        "False"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MissingValueReport {
    pub dropped_columns: Vec<String>,
    pub dropped_rows: usize,
}

#[derive(Debug, Clone)]
pub struct EngineeredFrame {
    pub frame: Frame,
    pub missing: MissingValueReport,
    /// Outlier counts measured before clipping.
    pub outliers: Vec<OutlierCount>,
}

pub struct FeatureEngineer {
    missing_row_threshold: f64,
}

fn fill_forward_backward<T: Clone>(values: &mut [Option<T>]) {
    let mut last: Option<T> = None;
    for cell in values.iter_mut() {
        match cell {
            Some(v) => last = Some(v.clone()),
            None => *cell = last.clone(),
        }
    }
    let mut next: Option<T> = None;
    for cell in values.iter_mut().rev() {
        match cell {
            Some(v) => next = Some(v.clone()),
            None => *cell = next.clone(),
        }
    }
}

impl FeatureEngineer {
    pub fn new(config: &PreprocessingConfig) -> Self {
        Self {
            missing_row_threshold: config.missing_row_threshold,
        }
    }

    /// Drop empty columns and sparse rows, then forward/backward fill.
    pub fn handle_missing_values(&self, frame: &mut Frame) -> MissingValueReport {
        let dropped_columns: Vec<String> = frame
            .columns()
            .iter()
            .filter(|c| c.data.missing_count() == c.len())
            .map(|c| c.name.clone())
            .collect();
        let names: Vec<&str> = dropped_columns.iter().map(String::as_str).collect();
        frame.drop_columns(&names);

        let min_present = (frame.n_cols() as f64 * self.missing_row_threshold).floor() as usize;
        let keep: Vec<bool> = (0..frame.n_rows())
            .map(|row| frame.row_non_missing(row) >= min_present)
            .collect();
        let dropped_rows = keep.iter().filter(|k| !**k).count();
        if dropped_rows > 0 {
            frame.retain_rows(&keep);
        }

        let remaining: Vec<String> = frame.column_names().into_iter().map(str::to_string).collect();
        for name in &remaining {
            if let Some(column) = frame.column_mut(name) {
                match &mut column.data {
                    ColumnData::Timestamp(v) => fill_forward_backward(v),
                    ColumnData::Numeric(v) => fill_forward_backward(v),
                    ColumnData::Categorical(v) => fill_forward_backward(v),
                }
            }
        }

        debug!(
            dropped_columns = dropped_columns.len(),
            dropped_rows,
            shape = ?frame.shape(),
            "handled missing values"
        );
        MissingValueReport {
            dropped_columns,
            dropped_rows,
        }
    }

    /// Derive hour, day_of_week (Monday = 0), month, year, is_weekend and season.
    pub fn add_calendar_features(
        &self,
        frame: &mut Frame,
        timestamp_column: &str,
        source: &Path,
    ) -> Result<()> {
        let stamps = match &frame.require_column(timestamp_column, source)?.data {
            ColumnData::Timestamp(v) => v.clone(),
            _ => {
                return Err(PipelineError::Schema(format!(
                    "column '{}' is not a timestamp",
                    timestamp_column
                )))
            }
        };

        let numeric = |f: fn(&chrono::DateTime<chrono::Utc>) -> f64| -> Vec<Option<f64>> {
            stamps.iter().map(|ts| ts.as_ref().map(f)).collect()
        };
        let hour = numeric(|ts| ts.hour() as f64);
        let day_of_week = numeric(|ts| ts.weekday().num_days_from_monday() as f64);
        let month = numeric(|ts| ts.month() as f64);
        let year = numeric(|ts| ts.year() as f64);
        let is_weekend = stamps
            .iter()
            .map(|ts| ts.map(|t| flag_label(t.weekday().num_days_from_monday() >= 5).to_string()))
            .collect();
        let season = stamps
            .iter()
            .map(|ts| ts.map(|t| Season::from_month(t.month()).as_str().to_string()))
            .collect();

        frame.push_column(Column::numeric("hour", hour))?;
        frame.push_column(Column::numeric("day_of_week", day_of_week))?;
        frame.push_column(Column::numeric("month", month))?;
        frame.push_column(Column::numeric("year", year))?;
        frame.push_column(Column::categorical("is_weekend", is_weekend))?;
        frame.push_column(Column::categorical("season", season))?;
        Ok(())
    }

    /// Add `<source>_percentage` for every generation column when the frame
    /// carries actual load. Returns the names of the added columns.
    pub fn add_generation_percentages(&self, frame: &mut Frame) -> Result<Vec<String>> {
        if !frame.has_column(TARGET_COLUMN) {
            return Ok(Vec::new());
        }

        let sources = generation_sources(frame);
        let columns: Vec<&[Option<f64>]> = sources
            .iter()
            .filter_map(|name| frame.numeric(name))
            .collect();
        let percentages = generation_percentages(&columns, frame.n_rows());

        let mut added = Vec::with_capacity(sources.len());
        for (name, values) in sources.iter().zip(percentages) {
            let pct_name = format!("{}{}", name, PERCENTAGE_SUFFIX);
            frame.push_column(Column::numeric(pct_name.clone(), values))?;
            added.push(pct_name);
        }
        Ok(added)
    }

    /// Full engineering pass for one dataset.
    pub fn engineer(&self, mut frame: Frame, schema: &Schema, source: &Path) -> Result<EngineeredFrame> {
        let missing = self.handle_missing_values(&mut frame);
        self.add_calendar_features(&mut frame, schema.timestamp_column, source)?;
        let percentages = self.add_generation_percentages(&mut frame)?;

        let outliers = outlier_summary(&frame);
        let clipped = clip_outliers(&mut frame);

        info!(
            dataset = schema.name,
            rows = frame.n_rows(),
            columns = frame.n_cols(),
            percentage_columns = percentages.len(),
            clipped_columns = clipped.len(),
            "engineered features"
        );
        Ok(EngineeredFrame {
            frame,
            missing,
            outliers,
        })
    }
}

/// Numeric columns naming a generation source (derived percentages excluded).
pub fn generation_sources(frame: &Frame) -> Vec<String> {
    frame
        .numeric_column_names()
        .into_iter()
        .filter(|name| name.contains("generation") && !name.ends_with(PERCENTAGE_SUFFIX))
        .collect()
}

/// Row-wise share of each source in the summed generation, in percent.
///
/// Missing cells count as zero generation; a row whose total is zero gets 0
/// for every source.
pub fn generation_percentages(sources: &[&[Option<f64>]], n_rows: usize) -> Vec<Vec<Option<f64>>> {
    let totals: Vec<f64> = (0..n_rows)
        .map(|row| sources.iter().filter_map(|c| c[row]).sum())
        .collect();

    sources
        .iter()
        .map(|column| {
            column
                .iter()
                .zip(&totals)
                .map(|(value, total)| {
                    let pct = match value {
                        Some(v) if *total != 0.0 => v / total * 100.0,
                        _ => 0.0,
                    };
                    Some(if pct.is_finite() { pct } else { 0.0 })
                })
                .collect()
        })
        .collect()
}
