//! Categorical encoders.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::data::{Column, Frame};
use crate::error::{PipelineError, Result};

pub const RARE_LABEL: &str = "RARE";

/// Collapses labels rarer than a frequency threshold into [`RARE_LABEL`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RareCollapser {
    pub threshold: f64,
    pub rare: BTreeSet<String>,
}

impl RareCollapser {
    /// Frequencies are relative to the non-missing cells.
    pub fn fit(values: &[Option<String>], threshold: f64) -> Self {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for value in values.iter().flatten() {
            *counts.entry(value.as_str()).or_default() += 1;
        }
        let total: usize = counts.values().sum();
        let rare = counts
            .into_iter()
            .filter(|(_, n)| (*n as f64 / total as f64) < threshold)
            .map(|(label, _)| label.to_string())
            .collect();
        Self { threshold, rare }
    }

    pub fn apply<'a>(&self, value: &'a str) -> &'a str {
        if self.rare.contains(value) {
            RARE_LABEL
        } else {
            value
        }
    }
}

/// Binary label encoder: sorted labels map to 0 and 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        let classes: BTreeSet<&str> = labels.into_iter().collect();
        Self {
            classes: classes.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn encode(&self, column: &str, label: &str) -> Result<usize> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(label))
            .map_err(|_| PipelineError::UnknownCategory {
                column: column.to_string(),
                value: label.to_string(),
            })
    }

    pub fn decode(&self, code: usize) -> Option<&str> {
        self.classes.get(code).map(String::as_str)
    }
}

/// One indicator column per observed category; unseen labels encode to all zeros.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneHotEncoder {
    categories: Vec<String>,
}

impl OneHotEncoder {
    pub fn fit<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        let categories: BTreeSet<&str> = labels.into_iter().collect();
        Self {
            categories: categories.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn output_names(&self, column: &str) -> Vec<String> {
        self.categories
            .iter()
            .map(|c| format!("{}_{}", column, c))
            .collect()
    }

    pub fn encode(&self, label: Option<&str>) -> Vec<f64> {
        self.categories
            .iter()
            .map(|c| if Some(c.as_str()) == label { 1.0 } else { 0.0 })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CategoricalEncoder {
    Label(LabelEncoder),
    OneHot(OneHotEncoder),
}

/// Everything fitted for one categorical column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnEncoder {
    pub column: String,
    pub rare: RareCollapser,
    pub encoder: CategoricalEncoder,
}

impl ColumnEncoder {
    /// Collapse rare labels, then label-encode two-valued columns and
    /// one-hot expand the rest.
    pub fn fit(column: &str, values: &[Option<String>], rare_threshold: f64) -> Self {
        let rare = RareCollapser::fit(values, rare_threshold);
        let collapsed = values.iter().flatten().map(|v| rare.apply(v));
        let distinct: BTreeSet<&str> = collapsed.clone().collect();

        let encoder = if distinct.len() == 2 {
            CategoricalEncoder::Label(LabelEncoder::fit(collapsed))
        } else {
            CategoricalEncoder::OneHot(OneHotEncoder::fit(collapsed))
        };
        Self {
            column: column.to_string(),
            rare,
            encoder,
        }
    }

    pub fn output_columns(&self) -> Vec<String> {
        match &self.encoder {
            CategoricalEncoder::Label(_) => vec![self.column.clone()],
            CategoricalEncoder::OneHot(ohe) => ohe.output_names(&self.column),
        }
    }

    /// Replace the column in `frame` with its encoding. Label codes replace
    /// the column in place; indicator columns are appended.
    pub fn apply(&self, frame: &mut Frame) -> Result<()> {
        let values = frame
            .categorical(&self.column)
            .ok_or_else(|| PipelineError::Schema(format!("column '{}' is not categorical", self.column)))?
            .to_vec();

        match &self.encoder {
            CategoricalEncoder::Label(le) => {
                let codes = values
                    .iter()
                    .map(|v| match v {
                        Some(label) => le
                            .encode(&self.column, self.rare.apply(label))
                            .map(|code| Some(code as f64)),
                        None => Ok(None),
                    })
                    .collect::<Result<Vec<_>>>()?;
                frame.push_column(Column::numeric(self.column.clone(), codes))?;
            }
            CategoricalEncoder::OneHot(ohe) => {
                let encoded: Vec<Vec<f64>> = values
                    .iter()
                    .map(|v| ohe.encode(v.as_deref().map(|l| self.rare.apply(l))))
                    .collect();
                frame.remove_column(&self.column);
                for (idx, name) in ohe.output_names(&self.column).into_iter().enumerate() {
                    let indicator = encoded.iter().map(|row| Some(row[idx])).collect();
                    frame.push_column(Column::numeric(name, indicator))?;
                }
            }
        }
        Ok(())
    }
}
