// src/table/mod.rs
//! In-memory model of a headered wide table:
//!
//! ```text
//!  row 0..7   A | B | C | D | E | TYPE | UNITS    (one cell per column)
//!  row 7..    timestamp | value | value | ...
//! ```
//!
//! Column 0 is the index: role labels in the header block, timestamps below.

pub mod metadata;
pub mod timestamp;
pub mod value;

use chrono::NaiveDateTime;
use csv::{ReaderBuilder, WriterBuilder};
use serde::Serialize;
use std::{
    fs::{self, File},
    io::{Read, Write},
    path::Path,
};
use tracing::{debug, instrument, warn};

use crate::error::{Error, Result};
pub use metadata::{composite_key, ColumnKey, ColumnMeta, MetadataIndex, Role, HEADER_ROW_COUNT};
use timestamp::parse_timestamp;
pub use value::{Value, MISSING_TOKEN};

/// Inclusive `[start, end]` range of timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    pub fn contains(&self, ts: &NaiveDateTime) -> bool {
        *ts >= self.start && *ts <= self.end
    }
}

/// One data row: parsed timestamp, the index text it came from, and the raw
/// value cells in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct DataRow {
    pub timestamp: NaiveDateTime,
    raw_index: String,
    cells: Vec<String>,
}

impl DataRow {
    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    pub fn value(&self, pos: usize) -> Value {
        self.cells
            .get(pos)
            .map(|c| Value::coerce(c))
            .unwrap_or(Value::Missing)
    }
}

/// A parsed table. Immutable once built; filtering produces a new table.
///
/// Invariants held by every instance:
/// * exactly [`HEADER_ROW_COUNT`] header rows and at least one data row,
/// * every row (header or data) has the same width `N + 1`,
/// * timestamps strictly increasing.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderedTable {
    header: Vec<Vec<String>>,
    meta: MetadataIndex,
    rows: Vec<DataRow>,
}

impl HeaderedTable {
    /// Split raw rows into the header block and time-indexed data rows.
    #[instrument(level = "debug", skip(raw_rows), fields(rows = raw_rows.len()))]
    pub fn parse(raw_rows: Vec<Vec<String>>) -> Result<Self> {
        if raw_rows.len() < HEADER_ROW_COUNT + 1 {
            return Err(Error::format(
                None,
                format!(
                    "expected at least {} rows ({} header rows + data), found {}",
                    HEADER_ROW_COUNT + 1,
                    HEADER_ROW_COUNT,
                    raw_rows.len()
                ),
            ));
        }

        let width = raw_rows[0].len();
        if width == 0 {
            return Err(Error::format(Some(0), "first row is empty"));
        }
        if let Some((i, row)) = raw_rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(Error::format(
                Some(i),
                format!("row has {} cells, expected {}", row.len(), width),
            ));
        }

        let mut raw_rows = raw_rows;
        let data_raw = raw_rows.split_off(HEADER_ROW_COUNT);
        let header = raw_rows;

        for role in Role::ALL {
            let label = &header[role.row()][0];
            if !role.accepts_label(label) {
                warn!(
                    row = role.row(),
                    label = %label,
                    expected = role.label(),
                    "unexpected header label"
                );
            }
        }

        let mut rows: Vec<DataRow> = Vec::with_capacity(data_raw.len());
        for (offset, mut cells) in data_raw.into_iter().enumerate() {
            let row_no = HEADER_ROW_COUNT + offset;
            let raw_index = cells.remove(0);
            let timestamp = parse_timestamp(&raw_index).ok_or_else(|| {
                Error::format(Some(row_no), format!("unparsable timestamp `{}`", raw_index))
            })?;
            if let Some(prev) = rows.last() {
                if timestamp <= prev.timestamp {
                    let what = if timestamp == prev.timestamp {
                        "duplicate"
                    } else {
                        "out-of-order"
                    };
                    return Err(Error::format(
                        Some(row_no),
                        format!("{} timestamp `{}`", what, raw_index),
                    ));
                }
            }
            rows.push(DataRow {
                timestamp,
                raw_index,
                cells,
            });
        }

        let meta = MetadataIndex::build(&header);
        debug!(columns = meta.len(), rows = rows.len(), "parsed table");
        Ok(Self { header, meta, rows })
    }

    /// Header rows followed by data rows, original column order. Missing
    /// cells are rendered as [`MISSING_TOKEN`]; everything else verbatim.
    pub fn serialize(&self) -> Vec<Vec<String>> {
        let mut out = Vec::with_capacity(HEADER_ROW_COUNT + self.rows.len());
        out.extend(self.header.iter().cloned());
        for row in &self.rows {
            let mut line = Vec::with_capacity(self.width());
            line.push(row.raw_index.clone());
            line.extend(row.cells.iter().map(|c| {
                if Value::coerce(c).is_missing() {
                    MISSING_TOKEN.to_string()
                } else {
                    c.clone()
                }
            }));
            out.push(line);
        }
        out
    }

    /// Read a table from a CSV file with no header line of its own.
    #[instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
    pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path).map_err(|e| Error::io(path.as_ref(), e))?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        // flexible: width checks belong to `parse`, which names the row
        let mut rdr = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);
        let mut raw_rows = Vec::new();
        for record in rdr.records() {
            let record = record.map_err(csv_error)?;
            raw_rows.push(record.iter().map(str::to_string).collect());
        }
        Self::parse(raw_rows)
    }

    /// Write [`serialize`](Self::serialize) output as CSV, creating parent
    /// directories.
    #[instrument(level = "info", skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        }
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        self.to_writer(file)
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = WriterBuilder::new().has_headers(false).from_writer(writer);
        for row in self.serialize() {
            wtr.write_record(&row)?;
        }
        wtr.flush().map_err(|e| Error::io("<writer>", e))?;
        Ok(())
    }

    pub fn header(&self) -> &[Vec<String>] {
        &self.header
    }

    pub fn metadata(&self) -> &MetadataIndex {
        &self.meta
    }

    pub fn rows(&self) -> &[DataRow] {
        &self.rows
    }

    /// Number of data columns (index excluded).
    pub fn column_count(&self) -> usize {
        self.meta.len()
    }

    /// Row width including the index column.
    pub fn width(&self) -> usize {
        self.meta.len() + 1
    }

    pub fn timestamps(&self) -> impl Iterator<Item = &NaiveDateTime> {
        self.rows.iter().map(|r| &r.timestamp)
    }

    /// `(min, max)` of the index. Rows are sorted, so first and last.
    pub fn window(&self) -> TimeWindow {
        // at least one data row is a parse invariant
        let start = self.rows[0].timestamp;
        let end = self.rows[self.rows.len() - 1].timestamp;
        TimeWindow { start, end }
    }

    /// Position of the data row stamped `ts`, if any.
    pub fn row_index(&self, ts: &NaiveDateTime) -> Option<usize> {
        self.rows.binary_search_by(|r| r.timestamp.cmp(ts)).ok()
    }

    /// New table with the index column plus the data columns at `positions`
    /// (zero-based, taken in the order given).
    pub(crate) fn select_columns(&self, positions: &[usize]) -> Self {
        let header = self
            .header
            .iter()
            .map(|row| {
                let mut out = Vec::with_capacity(positions.len() + 1);
                out.push(row[0].clone());
                out.extend(positions.iter().map(|&p| row[p + 1].clone()));
                out
            })
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|r| DataRow {
                timestamp: r.timestamp,
                raw_index: r.raw_index.clone(),
                cells: positions.iter().map(|&p| r.cells[p].clone()).collect(),
            })
            .collect();
        Self {
            header,
            meta: self.meta.select(positions),
            rows,
        }
    }
}

/// Bad text encoding is a table format problem, not a CSV one.
fn csv_error(e: csv::Error) -> Error {
    if let csv::ErrorKind::Utf8 { pos, err } = e.kind() {
        return Error::format(
            pos.as_ref().map(|p| p.record() as usize),
            format!("invalid UTF-8 in field {}", err.field() + 1),
        );
    }
    Error::from(e)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::Result;
    use std::io::Cursor;
    use tempfile::tempdir;

    /// Build raw rows for a table whose columns are given as
    /// `(B, C, E, values)`; A/D/TYPE/UNITS are filled with fixed text.
    pub(crate) fn raw_table(
        timestamps: &[&str],
        columns: &[(&str, &str, &str, &[&str])],
    ) -> Vec<Vec<String>> {
        let mut rows: Vec<Vec<String>> = Role::ALL
            .iter()
            .map(|role| {
                let mut row = vec![role.label().to_string()];
                for (b, c, e, _) in columns {
                    row.push(
                        match role {
                            Role::A => "CALSIM",
                            Role::B => *b,
                            Role::C => *c,
                            Role::D => "1MON",
                            Role::E => *e,
                            Role::Type => "PER-AVER",
                            Role::Units => "CFS",
                        }
                        .to_string(),
                    );
                }
                row
            })
            .collect();
        for (i, ts) in timestamps.iter().enumerate() {
            let mut row = vec![ts.to_string()];
            row.extend(columns.iter().map(|(_, _, _, vals)| vals[i].to_string()));
            rows.push(row);
        }
        rows
    }

    pub(crate) fn table(
        timestamps: &[&str],
        columns: &[(&str, &str, &str, &[&str])],
    ) -> HeaderedTable {
        HeaderedTable::parse(raw_table(timestamps, columns)).unwrap()
    }

    #[test]
    fn parse_splits_header_and_data() {
        let t = table(
            &["1921-10-31", "1921-11-30"],
            &[("S_SHSTA", "STORAGE", "L2020A", &["1.0", "NaN"])],
        );
        assert_eq!(t.column_count(), 1);
        assert_eq!(t.rows().len(), 2);
        assert_eq!(t.metadata().value(0, Role::C), Some("STORAGE"));
        assert_eq!(t.rows()[1].value(0), Value::Missing);
        assert_eq!(t.window().start.to_string(), "1921-10-31 00:00:00");
    }

    #[test]
    fn too_few_rows_is_format_error() {
        let mut raw = raw_table(&["1921-10-31"], &[("X", "FLOW", "F", &["1"])]);
        raw.pop();
        let err = HeaderedTable::parse(raw).unwrap_err();
        assert!(matches!(err, Error::Format { row: None, .. }));
    }

    #[test]
    fn ragged_row_is_format_error_naming_row() {
        let mut raw = raw_table(
            &["1921-10-31", "1921-11-30"],
            &[("X", "FLOW", "F", &["1", "2"])],
        );
        raw[8].push("extra".into());
        match HeaderedTable::parse(raw).unwrap_err() {
            Error::Format { row, .. } => assert_eq!(row, Some(8)),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn bad_timestamp_names_row() {
        let raw = raw_table(
            &["1921-10-31", "yesterday"],
            &[("X", "FLOW", "F", &["1", "2"])],
        );
        let err = HeaderedTable::parse(raw).unwrap_err();
        assert!(matches!(err, Error::Format { row: Some(8), .. }));
        assert!(err.to_string().contains("yesterday"));
    }

    #[test]
    fn duplicate_timestamp_is_rejected() {
        let raw = raw_table(
            &["1921-10-31", "1921-10-31"],
            &[("X", "FLOW", "F", &["1", "2"])],
        );
        let err = HeaderedTable::parse(raw).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn serialize_round_trips_with_sentinel_canonicalised() {
        let raw = raw_table(
            &["1921-10-31", "1921-11-30 06:00:00"],
            &[
                ("A_SYS", "FLOW", "F", &["1.50", ""]),
                ("A_VAL", "FLOW", "F", &["NaN", "oops"]),
            ],
        );
        let t = HeaderedTable::parse(raw.clone()).unwrap();
        let mut expected = raw;
        expected[8][1] = MISSING_TOKEN.to_string();
        assert_eq!(t.serialize(), expected);
        // second pass is exact
        let again = HeaderedTable::parse(t.serialize()).unwrap();
        assert_eq!(again.serialize(), t.serialize());
    }

    #[test]
    fn csv_file_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("level0.csv");
        let t = table(
            &["1921-10-31", "1921-11-30"],
            &[("X", "FLOW", "F", &["1.0", "2.5"])],
        );
        t.write_csv(&path)?;
        let back = HeaderedTable::read_csv(&path)?;
        assert_eq!(back, t);
        Ok(())
    }

    #[test]
    fn from_reader_reports_width_as_format_error() {
        let text = "A,x\nB,x\nC,x\nD,x\nE,x\nTYPE,x\nUNITS,x\n1921-10-31,1,2\n";
        let err = HeaderedTable::from_reader(Cursor::new(text)).unwrap_err();
        assert!(matches!(err, Error::Format { row: Some(7), .. }));
    }

    #[test]
    fn invalid_utf8_is_format_error() {
        let mut bytes = b"A,x\nB,x\nC,x\nD,x\nE,x\nTYPE,x\nUNITS,x\n1921-10-31,".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe]);
        bytes.push(b'\n');
        let err = HeaderedTable::from_reader(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, Error::Format { .. }), "{err:?}");
        assert!(err.to_string().contains("UTF-8"));
    }

    #[test]
    fn select_columns_keeps_index_and_order() {
        let t = table(
            &["1921-10-31"],
            &[
                ("B0", "FLOW", "F", &["0"]),
                ("B1", "FLOW", "F", &["1"]),
                ("B2", "FLOW", "F", &["2"]),
            ],
        );
        let s = t.select_columns(&[0, 2]);
        assert_eq!(s.width(), 3);
        assert_eq!(s.header()[Role::B.row()], vec!["B", "B0", "B2"]);
        assert_eq!(s.rows()[0].cells(), &["0".to_string(), "2".to_string()]);
        assert_eq!(s.metadata().value(1, Role::B), Some("B2"));
    }
}
