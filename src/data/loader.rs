//! CSV ingest and export.
//!
//! Declared columns are parsed with their schema type; rows that fail a
//! declared type are quarantined (skipped and reported) instead of being
//! carried downstream. Columns the schema does not declare, such as derived
//! features in processed files, are type-inferred.

use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use csv::StringRecord;
use tracing::{debug, info, warn};

use super::{Column, ColumnData, ColumnKind, Frame, Schema};
use crate::error::{PipelineError, Result};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%:z";

/// How strictly declared value constraints are enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Source data: declared types and value constraints (non-negative quantities).
    Raw,
    /// Pipeline output: declared types only; values may be scaled or centred.
    Derived,
}

/// A row rejected at the loading boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    /// 1-based line number in the file, header included.
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct LoadedFrame {
    pub frame: Frame,
    pub rows_read: usize,
    pub quarantined: Vec<RowError>,
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| !v.is_nan())
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => PipelineError::MissingFile(path.to_path_buf()),
        _ => PipelineError::io(path, e),
    })
}

/// Load a CSV file against a declared schema.
pub fn load_csv(path: &Path, schema: &Schema, mode: LoadMode) -> Result<LoadedFrame> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(open(path)?);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut seen = HashSet::new();
    for name in &headers {
        if !seen.insert(name.as_str()) {
            return Err(PipelineError::Schema(format!(
                "duplicate column '{}' in {}",
                name,
                path.display()
            )));
        }
    }

    for spec in schema.required_columns() {
        if !seen.contains(spec.name) {
            return Err(PipelineError::MissingColumn {
                column: spec.name.to_string(),
                path: path.to_path_buf(),
            });
        }
    }

    let mut quarantined = Vec::new();
    let mut records: Vec<(usize, StringRecord)> = Vec::new();
    let mut rows_read = 0;

    for (idx, result) in reader.records().enumerate() {
        rows_read += 1;
        let line = idx + 2;
        match result {
            Ok(record) if record.len() == headers.len() => records.push((line, record)),
            Ok(record) => quarantined.push(RowError {
                line,
                message: format!("expected {} fields, found {}", headers.len(), record.len()),
            }),
            Err(e) => quarantined.push(RowError {
                line,
                message: e.to_string(),
            }),
        }
    }

    let kinds: Vec<ColumnKind> = headers
        .iter()
        .enumerate()
        .map(|(col, name)| match schema.spec(name) {
            Some(spec) => spec.kind,
            None => infer_kind(records.iter().map(|(_, r)| &r[col])),
        })
        .collect();

    let mut columns: Vec<ColumnData> = kinds
        .iter()
        .map(|kind| match kind {
            ColumnKind::Timestamp => ColumnData::Timestamp(Vec::with_capacity(records.len())),
            ColumnKind::Numeric => ColumnData::Numeric(Vec::with_capacity(records.len())),
            ColumnKind::Categorical => ColumnData::Categorical(Vec::with_capacity(records.len())),
        })
        .collect();

    for (line, record) in &records {
        match parse_row(record, &headers, &kinds, schema, mode) {
            Ok(cells) => {
                for (column, cell) in columns.iter_mut().zip(cells) {
                    push_cell(column, cell);
                }
            }
            Err(message) => quarantined.push(RowError {
                line: *line,
                message,
            }),
        }
    }

    let frame = Frame::from_columns(
        headers
            .into_iter()
            .zip(columns)
            .map(|(name, data)| Column { name, data })
            .collect(),
    )?;

    if !quarantined.is_empty() {
        warn!(
            path = %path.display(),
            quarantined = quarantined.len(),
            first_line = quarantined[0].line,
            first_error = %quarantined[0].message,
            "rows failed schema validation and were quarantined"
        );
    }
    info!(
        path = %path.display(),
        schema = schema.name,
        rows = frame.n_rows(),
        columns = frame.n_cols(),
        "loaded CSV"
    );

    Ok(LoadedFrame {
        frame,
        rows_read,
        quarantined,
    })
}

enum Cell {
    Timestamp(Option<DateTime<Utc>>),
    Numeric(Option<f64>),
    Categorical(Option<String>),
}

fn push_cell(column: &mut ColumnData, cell: Cell) {
    match (column, cell) {
        (ColumnData::Timestamp(v), Cell::Timestamp(c)) => v.push(c),
        (ColumnData::Numeric(v), Cell::Numeric(c)) => v.push(c),
        (ColumnData::Categorical(v), Cell::Categorical(c)) => v.push(c),
        _ => unreachable!("cell kind follows column kind"),
    }
}

fn parse_row(
    record: &StringRecord,
    headers: &[String],
    kinds: &[ColumnKind],
    schema: &Schema,
    mode: LoadMode,
) -> std::result::Result<Vec<Cell>, String> {
    let mut cells = Vec::with_capacity(kinds.len());
    for ((raw, name), kind) in record.iter().zip(headers).zip(kinds) {
        let cell = if raw.is_empty() {
            match kind {
                ColumnKind::Timestamp => Cell::Timestamp(None),
                ColumnKind::Numeric => Cell::Numeric(None),
                ColumnKind::Categorical => Cell::Categorical(None),
            }
        } else {
            match kind {
                ColumnKind::Timestamp => Cell::Timestamp(Some(
                    parse_timestamp(raw)
                        .ok_or_else(|| format!("column '{}': invalid timestamp '{}'", name, raw))?,
                )),
                ColumnKind::Numeric => {
                    let value = if raw.eq_ignore_ascii_case("nan") {
                        None
                    } else {
                        Some(
                            parse_number(raw)
                                .ok_or_else(|| format!("column '{}': invalid number '{}'", name, raw))?,
                        )
                    };
                    if mode == LoadMode::Raw {
                        let non_negative = schema.spec(name).is_some_and(|s| s.non_negative);
                        if non_negative && value.is_some_and(|v| v < 0.0) {
                            return Err(format!("column '{}': negative quantity '{}'", name, raw));
                        }
                    }
                    Cell::Numeric(value)
                }
                ColumnKind::Categorical => Cell::Categorical(Some(raw.to_string())),
            }
        };
        cells.push(cell);
    }
    Ok(cells)
}

fn infer_kind<'a>(mut cells: impl Iterator<Item = &'a str>) -> ColumnKind {
    let numeric = cells.all(|raw| raw.is_empty() || raw.eq_ignore_ascii_case("nan") || parse_number(raw).is_some());
    if numeric {
        ColumnKind::Numeric
    } else {
        ColumnKind::Categorical
    }
}

/// Write a frame as UTF-8 CSV with a header row, creating the parent directory.
pub fn write_csv(frame: &Frame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(frame.column_names())?;
    for row in 0..frame.n_rows() {
        writer.write_record(frame.columns().iter().map(|c| c.data.render(row)))?;
    }
    writer.flush().map_err(|e| PipelineError::io(path, e))?;

    debug!(path = %path.display(), rows = frame.n_rows(), "wrote CSV");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ENERGY_SCHEMA, TARGET_COLUMN, WEATHER_SCHEMA};
    use chrono::{TimeZone, Timelike};
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let local = parse_timestamp("2015-01-01 00:00:00+01:00").unwrap();
        assert_eq!(local, Utc.with_ymd_and_hms(2014, 12, 31, 23, 0, 0).unwrap());

        let rfc = parse_timestamp("2015-06-01T12:00:00Z").unwrap();
        assert_eq!(rfc.hour(), 12);

        assert!(parse_timestamp("yesterday").is_none());
        assert_eq!(format_timestamp(rfc), "2015-06-01 12:00:00+00:00");
    }

    #[test]
    fn test_missing_file() {
        let err = load_csv(Path::new("/nonexistent/energy.csv"), &ENERGY_SCHEMA, LoadMode::Raw)
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingFile(_)));
    }

    #[test]
    fn test_missing_required_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "energy.csv",
            "time,generation solar\n2015-01-01 00:00:00+01:00,10\n",
        );
        let err = load_csv(&path, &ENERGY_SCHEMA, LoadMode::Raw).unwrap_err();
        match err {
            PipelineError::MissingColumn { column, .. } => assert_eq!(column, TARGET_COLUMN),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_quarantines_bad_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "energy.csv",
            "time,generation solar,total load actual\n\
             2015-01-01 00:00:00+01:00,10,25000\n\
             not-a-time,10,25000\n\
             2015-01-01 02:00:00+01:00,-5,25000\n\
             2015-01-01 03:00:00+01:00,abc,25000\n\
             2015-01-01 04:00:00+01:00,,24000\n",
        );

        let loaded = load_csv(&path, &ENERGY_SCHEMA, LoadMode::Raw).unwrap();
        assert_eq!(loaded.rows_read, 5);
        assert_eq!(loaded.frame.n_rows(), 2);
        let lines: Vec<usize> = loaded.quarantined.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![3, 4, 5]);
        assert_eq!(loaded.frame.numeric("generation solar").unwrap(), &[Some(10.0), None]);
    }

    #[test]
    fn test_derived_mode_allows_negative_scaled_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "final.csv",
            "time,generation solar,total load actual\n2015-01-01 00:00:00+00:00,-1.25,0.3\n",
        );
        let loaded = load_csv(&path, &ENERGY_SCHEMA, LoadMode::Derived).unwrap();
        assert_eq!(loaded.frame.numeric("generation solar").unwrap(), &[Some(-1.25)]);
    }

    #[test]
    fn test_infers_undeclared_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "weather.csv",
            "dt_iso,hour,season,is_weekend\n\
             2015-01-01 00:00:00+01:00,23,Winter,False\n\
             2015-01-01 01:00:00+01:00,0,Winter,True\n",
        );
        let frame = load_csv(&path, &WEATHER_SCHEMA, LoadMode::Derived).unwrap().frame;
        assert_eq!(frame.numeric("hour").unwrap(), &[Some(23.0), Some(0.0)]);
        assert_eq!(frame.categorical("season").unwrap()[0].as_deref(), Some("Winter"));
        assert!(frame.categorical("is_weekend").is_some());
    }

    #[test]
    fn test_write_then_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let frame = Frame::from_columns(vec![
            Column::timestamp(
                "time",
                vec![Some(Utc.with_ymd_and_hms(2015, 1, 1, 0, 0, 0).unwrap()), None],
            ),
            Column::numeric(TARGET_COLUMN, vec![Some(25000.5), Some(24000.0)]),
            Column::categorical("season", vec![Some("Winter".into()), None]),
        ])
        .unwrap();

        let path = dir.path().join("nested").join("out.csv");
        write_csv(&frame, &path).unwrap();
        let loaded = load_csv(&path, &ENERGY_SCHEMA, LoadMode::Derived).unwrap();
        assert_eq!(loaded.frame, frame);
    }
}
