//! Exploratory analysis of a loaded dataset.
//!
//! Produces plain data (serialisable to JSON) rather than charts: missing
//! counts, a rounded correlation matrix, categorical value counts, monthly
//! means of the time series and the IQR outlier summary.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::Datelike;
use serde::Serialize;

use crate::data::{ColumnData, Frame};
use crate::features::{outlier_summary, OutlierCount};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingCount {
    pub column: String,
    pub missing: usize,
}

/// Pairwise Pearson correlation of the numeric columns, rounded to 2
/// decimals. `None` where the coefficient is undefined.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == a)?;
        let j = self.columns.iter().position(|c| c == b)?;
        self.values[i][j]
    }
}

impl fmt::Display for CorrelationMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, row) in self.columns.iter().zip(&self.values) {
            write!(f, "{:<40}", name)?;
            for value in row {
                match value {
                    Some(v) => write!(f, " {:>6.2}", v)?,
                    None => write!(f, " {:>6}", "N/A")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueCounts {
    pub column: String,
    /// Most frequent first; equal counts ordered by label.
    pub counts: Vec<(String, usize)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyMean {
    pub year: i32,
    pub month: u32,
    pub means: BTreeMap<String, Option<f64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub dataset: String,
    pub rows: usize,
    pub columns: usize,
    pub missing: Vec<MissingCount>,
    pub correlation: CorrelationMatrix,
    pub categorical: Vec<ValueCounts>,
    pub monthly_means: Vec<MonthlyMean>,
    pub outliers: Vec<OutlierCount>,
}

pub fn missing_values(frame: &Frame) -> Vec<MissingCount> {
    frame
        .columns()
        .iter()
        .map(|c| MissingCount {
            column: c.name.clone(),
            missing: c.data.missing_count(),
        })
        .collect()
}

fn pearson(x: &[Option<f64>], y: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
        .collect();
    if pairs.len() < 2 {
        return None;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in &pairs {
        let dx = a - mean_x;
        let dy = b - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    let r = (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0);
    Some((r * 100.0).round() / 100.0)
}

pub fn correlation_matrix(frame: &Frame) -> CorrelationMatrix {
    let columns = frame.numeric_column_names();
    let data: Vec<&[Option<f64>]> = columns.iter().filter_map(|c| frame.numeric(c)).collect();

    let mut values = vec![vec![None; columns.len()]; columns.len()];
    for i in 0..data.len() {
        for j in i..data.len() {
            let r = pearson(data[i], data[j]);
            values[i][j] = r;
            values[j][i] = r;
        }
    }
    CorrelationMatrix { columns, values }
}

pub fn categorical_counts(frame: &Frame) -> Vec<ValueCounts> {
    frame
        .columns()
        .iter()
        .filter_map(|column| match &column.data {
            ColumnData::Categorical(values) => {
                let mut counts: HashMap<&str, usize> = HashMap::new();
                for value in values.iter().flatten() {
                    *counts.entry(value.as_str()).or_default() += 1;
                }
                let mut counts: Vec<(String, usize)> =
                    counts.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
                counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                Some(ValueCounts {
                    column: column.name.clone(),
                    counts,
                })
            }
            _ => None,
        })
        .collect()
}

/// Mean of every numeric column per calendar month of `timestamp_column`.
/// Returns an empty list when the column is absent.
pub fn monthly_means(frame: &Frame, timestamp_column: &str) -> Vec<MonthlyMean> {
    let Some(stamps) = frame.timestamps(timestamp_column) else {
        return Vec::new();
    };
    let numeric = frame.numeric_column_names();

    let mut groups: BTreeMap<(i32, u32), Vec<usize>> = BTreeMap::new();
    for (row, ts) in stamps.iter().enumerate() {
        if let Some(ts) = ts {
            groups.entry((ts.year(), ts.month())).or_default().push(row);
        }
    }

    groups
        .into_iter()
        .map(|((year, month), rows)| {
            let means = numeric
                .iter()
                .map(|name| {
                    let values = frame.numeric(name).unwrap_or_default();
                    let present: Vec<f64> = rows.iter().filter_map(|&r| values[r]).collect();
                    let mean = (!present.is_empty())
                        .then(|| present.iter().sum::<f64>() / present.len() as f64);
                    (name.clone(), mean)
                })
                .collect();
            MonthlyMean { year, month, means }
        })
        .collect()
}

pub fn analyze(frame: &Frame, dataset: &str, timestamp_column: &str) -> AnalysisReport {
    AnalysisReport {
        dataset: dataset.to_string(),
        rows: frame.n_rows(),
        columns: frame.n_cols(),
        missing: missing_values(frame),
        correlation: correlation_matrix(frame),
        categorical: categorical_counts(frame),
        monthly_means: monthly_means(frame, timestamp_column),
        outliers: outlier_summary(frame),
    }
}
