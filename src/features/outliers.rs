//! IQR fencing of numeric columns.

use serde::Serialize;

use crate::data::{ColumnData, Frame};

/// Quantile with linear interpolation between the closest order statistics.
///
/// `sorted` must be ascending and non-empty.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IqrFences {
    pub q1: f64,
    pub q3: f64,
    pub lower: f64,
    pub upper: f64,
}

impl IqrFences {
    /// Fences over the non-missing values; `None` when every cell is missing.
    pub fn from_values(values: &[Option<f64>]) -> Option<Self> {
        let mut present: Vec<f64> = values.iter().flatten().copied().collect();
        if present.is_empty() {
            return None;
        }
        present.sort_by(f64::total_cmp);

        let q1 = quantile(&present, 0.25);
        let q3 = quantile(&present, 0.75);
        let iqr = q3 - q1;
        Some(Self {
            q1,
            q3,
            lower: q1 - 1.5 * iqr,
            upper: q3 + 1.5 * iqr,
        })
    }

    pub fn is_outlier(&self, value: f64) -> bool {
        value < self.lower || value > self.upper
    }

    pub fn clip(&self, value: f64) -> f64 {
        value.max(self.lower).min(self.upper)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutlierCount {
    pub column: String,
    pub count: usize,
}

/// Outliers per numeric column, most affected column first.
pub fn outlier_summary(frame: &Frame) -> Vec<OutlierCount> {
    let mut summary: Vec<OutlierCount> = frame
        .columns()
        .iter()
        .filter_map(|column| match &column.data {
            ColumnData::Numeric(values) => {
                let count = IqrFences::from_values(values).map_or(0, |fences| {
                    values
                        .iter()
                        .flatten()
                        .filter(|v| fences.is_outlier(**v))
                        .count()
                });
                Some(OutlierCount {
                    column: column.name.clone(),
                    count,
                })
            }
            _ => None,
        })
        .collect();
    summary.sort_by(|a, b| b.count.cmp(&a.count));
    summary
}

/// Clamp every numeric column into its fences. Missing cells stay missing.
pub fn clip_outliers(frame: &mut Frame) -> Vec<(String, IqrFences)> {
    let mut applied = Vec::new();
    for name in frame.numeric_column_names() {
        let Some(values) = frame.numeric_mut(&name) else {
            continue;
        };
        let Some(fences) = IqrFences::from_values(values) else {
            continue;
        };
        for value in values.iter_mut().flatten() {
            *value = fences.clip(*value);
        }
        applied.push((name, fences));
    }
    applied
}
