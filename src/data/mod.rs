//! Typed columnar tables
//!
//! Every CSV in the pipeline is held as a [`Frame`]: an ordered set of named
//! columns, each with one declared element type. Missing cells are `None`.

pub mod loader;
pub mod schema;

pub use loader::*;
pub use schema::*;

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::{PipelineError, Result};

/// Column storage, one variant per declared [`ColumnKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Timestamp(Vec<Option<DateTime<Utc>>>),
    Numeric(Vec<Option<f64>>),
    Categorical(Vec<Option<String>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Timestamp(v) => v.len(),
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnData::Timestamp(_) => ColumnKind::Timestamp,
            ColumnData::Numeric(_) => ColumnKind::Numeric,
            ColumnData::Categorical(_) => ColumnKind::Categorical,
        }
    }

    pub fn is_missing(&self, row: usize) -> bool {
        match self {
            ColumnData::Timestamp(v) => v[row].is_none(),
            ColumnData::Numeric(v) => v[row].is_none(),
            ColumnData::Categorical(v) => v[row].is_none(),
        }
    }

    pub fn missing_count(&self) -> usize {
        (0..self.len()).filter(|&i| self.is_missing(i)).count()
    }

    fn select(&self, rows: &[usize]) -> ColumnData {
        match self {
            ColumnData::Timestamp(v) => ColumnData::Timestamp(rows.iter().map(|&i| v[i]).collect()),
            ColumnData::Numeric(v) => ColumnData::Numeric(rows.iter().map(|&i| v[i]).collect()),
            ColumnData::Categorical(v) => {
                ColumnData::Categorical(rows.iter().map(|&i| v[i].clone()).collect())
            }
        }
    }

    /// Render one cell the way it is written to CSV; missing cells are empty.
    pub fn render(&self, row: usize) -> String {
        match self {
            ColumnData::Timestamp(v) => v[row].map(format_timestamp).unwrap_or_default(),
            ColumnData::Numeric(v) => v[row].map(|x| x.to_string()).unwrap_or_default(),
            ColumnData::Categorical(v) => v[row].clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Numeric(values),
        }
    }

    pub fn categorical(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Categorical(values),
        }
    }

    pub fn timestamp(name: impl Into<String>, values: Vec<Option<DateTime<Utc>>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Timestamp(values),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Ordered collection of equally long, uniquely named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    columns: Vec<Column>,
    n_rows: usize,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let mut frame = Frame::new();
        for column in columns {
            frame.push_column(column)?;
        }
        Ok(frame)
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows, self.columns.len())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Look up a column that the caller cannot proceed without.
    pub fn require_column(&self, name: &str, source: &Path) -> Result<&Column> {
        self.column(name).ok_or_else(|| PipelineError::MissingColumn {
            column: name.to_string(),
            path: source.to_path_buf(),
        })
    }

    pub fn numeric(&self, name: &str) -> Option<&[Option<f64>]> {
        match self.column(name).map(|c| &c.data) {
            Some(ColumnData::Numeric(v)) => Some(v),
            _ => None,
        }
    }

    pub fn numeric_mut(&mut self, name: &str) -> Option<&mut Vec<Option<f64>>> {
        match self.column_mut(name).map(|c| &mut c.data) {
            Some(ColumnData::Numeric(v)) => Some(v),
            _ => None,
        }
    }

    pub fn categorical(&self, name: &str) -> Option<&[Option<String>]> {
        match self.column(name).map(|c| &c.data) {
            Some(ColumnData::Categorical(v)) => Some(v),
            _ => None,
        }
    }

    pub fn timestamps(&self, name: &str) -> Option<&[Option<DateTime<Utc>>]> {
        match self.column(name).map(|c| &c.data) {
            Some(ColumnData::Timestamp(v)) => Some(v),
            _ => None,
        }
    }

    pub fn column_names_of_kind(&self, kind: ColumnKind) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.data.kind() == kind)
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn numeric_column_names(&self) -> Vec<String> {
        self.column_names_of_kind(ColumnKind::Numeric)
    }

    pub fn categorical_column_names(&self) -> Vec<String> {
        self.column_names_of_kind(ColumnKind::Categorical)
    }

    /// Append a column, replacing an existing one of the same name in place.
    pub fn push_column(&mut self, column: Column) -> Result<()> {
        if self.columns.is_empty() {
            self.n_rows = column.len();
        } else if column.len() != self.n_rows {
            return Err(PipelineError::Schema(format!(
                "column '{}' has {} rows, frame has {}",
                column.name,
                column.len(),
                self.n_rows
            )));
        }

        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
        Ok(())
    }

    pub fn remove_column(&mut self, name: &str) -> Option<Column> {
        let idx = self.columns.iter().position(|c| c.name == name)?;
        let removed = self.columns.remove(idx);
        if self.columns.is_empty() {
            self.n_rows = 0;
        }
        Some(removed)
    }

    /// Drop the named columns; names that are absent are ignored.
    pub fn drop_columns(&mut self, names: &[&str]) {
        let drop: HashSet<&str> = names.iter().copied().collect();
        self.columns.retain(|c| !drop.contains(c.name.as_str()));
        if self.columns.is_empty() {
            self.n_rows = 0;
        }
    }

    pub fn select_rows(&self, rows: &[usize]) -> Frame {
        Frame {
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    data: c.data.select(rows),
                })
                .collect(),
            n_rows: rows.len(),
        }
    }

    pub fn retain_rows(&mut self, keep: &[bool]) {
        let rows: Vec<usize> = keep
            .iter()
            .enumerate()
            .filter(|(_, k)| **k)
            .map(|(i, _)| i)
            .collect();
        *self = self.select_rows(&rows);
    }

    /// Number of non-missing cells in one row.
    pub fn row_non_missing(&self, row: usize) -> usize {
        self.columns
            .iter()
            .filter(|c| !c.data.is_missing(row))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Frame {
        Frame::from_columns(vec![
            Column::numeric("load", vec![Some(1.0), None, Some(3.0)]),
            Column::categorical(
                "city",
                vec![Some("Madrid".into()), Some("Bilbao".into()), None],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_shape_and_lookup() {
        let frame = sample();
        assert_eq!(frame.shape(), (3, 2));
        assert_eq!(frame.numeric("load").unwrap()[2], Some(3.0));
        assert!(frame.categorical("load").is_none());
        assert_eq!(frame.numeric_column_names(), vec!["load".to_string()]);
        assert_eq!(frame.categorical_column_names(), vec!["city".to_string()]);
    }

    #[test]
    fn test_push_rejects_length_mismatch() {
        let mut frame = sample();
        let err = frame
            .push_column(Column::numeric("short", vec![Some(1.0)]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
    }

    #[test]
    fn test_push_replaces_same_name() {
        let mut frame = sample();
        frame
            .push_column(Column::numeric("load", vec![Some(9.0); 3]))
            .unwrap();
        assert_eq!(frame.n_cols(), 2);
        assert_eq!(frame.column_names(), vec!["load", "city"]);
        assert_eq!(frame.numeric("load").unwrap()[1], Some(9.0));
    }

    #[test]
    fn test_retain_rows_and_missing_counts() {
        let mut frame = sample();
        assert_eq!(frame.column("load").unwrap().data.missing_count(), 1);
        assert_eq!(frame.row_non_missing(1), 1);

        frame.retain_rows(&[true, false, true]);
        assert_eq!(frame.n_rows(), 2);
        assert_eq!(frame.numeric("load").unwrap(), &[Some(1.0), Some(3.0)]);
    }

    #[test]
    fn test_require_column_reports_name() {
        let frame = sample();
        let err = frame
            .require_column("total load actual", Path::new("final.csv"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn { ref column, .. } if column == "total load actual"));
    }

    #[test]
    fn test_drop_columns_ignores_absent() {
        let mut frame = sample();
        frame.drop_columns(&["city", "time"]);
        assert_eq!(frame.column_names(), vec!["load"]);
    }
}
