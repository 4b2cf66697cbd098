// src/levels/level0.rs
//! Level 0: assemble one wide table from every series in a time-series
//! store. The store itself sits behind [`SeriesStore`].

use chrono::{NaiveDate, NaiveDateTime};
use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::table::{
    timestamp::{format_timestamp, previous_month_end},
    value::format_value,
    HeaderedTable, Role, MISSING_TOKEN,
};

/// Pattern selecting every pathname in a store.
pub const ALL_PATHS: &str = "/*/*/*/*/*/*/";

/// Raw value the store writes for "no data".
pub const STORE_MISSING_SENTINEL: f64 = -901.0;

/// One series as the store returns it.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRecord {
    pub timestamps: Vec<NaiveDateTime>,
    pub values: Vec<f64>,
    pub unit: String,
    pub kind: String,
}

/// Read access to a time-series store.
pub trait SeriesStore {
    /// Pathnames matching a `*` pattern such as [`ALL_PATHS`].
    fn list_paths(&self, pattern: &str) -> Result<Vec<String>>;
    fn read_series(&self, path: &str) -> Result<SeriesRecord>;
}

/// A store held in memory, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    series: Vec<(String, SeriesRecord)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, record: SeriesRecord) {
        let path = path.into();
        match self.series.iter_mut().find(|(p, _)| *p == path) {
            Some((_, existing)) => *existing = record,
            None => self.series.push((path, record)),
        }
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

impl SeriesStore for MemoryStore {
    fn list_paths(&self, pattern: &str) -> Result<Vec<String>> {
        let pat = Pattern::new(pattern).map_err(|e| Error::Store {
            path: pattern.to_string(),
            message: e.to_string(),
        })?;
        // `*` stays inside one path part
        let opts = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };
        Ok(self
            .series
            .iter()
            .filter(|(p, _)| pat.matches_with(p, opts))
            .map(|(p, _)| p.clone())
            .collect())
    }

    fn read_series(&self, path: &str) -> Result<SeriesRecord> {
        self.series
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, r)| r.clone())
            .ok_or_else(|| Error::Store {
                path: path.to_string(),
                message: "no such pathname".into(),
            })
    }
}

/// The six parts of a `/A/B/C/D/E/F/` pathname.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorePath {
    pub a: String,
    pub b: String,
    pub c: String,
    pub d: String,
    pub e: String,
    pub f: String,
}

impl StorePath {
    pub fn parse(path: &str) -> Option<Self> {
        let inner = path.strip_prefix('/')?;
        let inner = inner.strip_suffix('/').unwrap_or(inner);
        let parts: Vec<&str> = inner.split('/').collect();
        let [a, b, c, d, e, f] = parts.as_slice() else {
            return None;
        };
        Some(Self {
            a: a.to_string(),
            b: b.to_string(),
            c: c.to_string(),
            d: d.to_string(),
            e: e.to_string(),
            f: f.to_string(),
        })
    }

    /// Grouping key: paths differing only in D (the block date) are one
    /// series.
    pub fn series_key(&self) -> String {
        [self.b.as_str(), self.c.as_str(), self.e.as_str(), self.f.as_str()].join("_")
    }
}

/// How store values become Level-0 rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Level0Options {
    pub missing_sentinel: f64,
    pub shift_to_previous_month_end: bool,
    pub window_start: Option<NaiveDate>,
    pub window_end: Option<NaiveDate>,
    pub drop_empty_rows: bool,
}

impl Default for Level0Options {
    fn default() -> Self {
        Self {
            missing_sentinel: STORE_MISSING_SENTINEL,
            shift_to_previous_month_end: true,
            window_start: NaiveDate::from_ymd_opt(1921, 10, 31),
            window_end: NaiveDate::from_ymd_opt(2021, 9, 30),
            drop_empty_rows: true,
        }
    }
}

impl Level0Options {
    fn in_window(&self, ts: &NaiveDateTime) -> bool {
        let d = ts.date();
        self.window_start.map_or(true, |s| d >= s) && self.window_end.map_or(true, |e| d <= e)
    }
}

/// Apply the sentinel and timestamp rules to one record. `None` = missing.
/// Records whose timestamp and value counts differ are rejected.
pub fn normalize_record(
    path: &str,
    record: &SeriesRecord,
    opts: &Level0Options,
) -> Result<Vec<(NaiveDateTime, Option<f64>)>> {
    if record.timestamps.len() != record.values.len() {
        return Err(Error::Store {
            path: path.to_string(),
            message: format!(
                "{} timestamps but {} values",
                record.timestamps.len(),
                record.values.len()
            ),
        });
    }
    record
        .timestamps
        .iter()
        .zip(&record.values)
        .map(|(ts, &v)| {
            let ts = if opts.shift_to_previous_month_end {
                previous_month_end(ts).ok_or_else(|| Error::Store {
                    path: path.to_string(),
                    message: format!("cannot shift timestamp {ts}"),
                })?
            } else {
                *ts
            };
            let v = (v != opts.missing_sentinel && !v.is_nan()).then_some(v);
            Ok((ts, v))
        })
        .collect()
}

struct SeriesGroup {
    path: StorePath,
    unit: String,
    kind: String,
    data: BTreeMap<NaiveDateTime, Option<f64>>,
}

/// Build the Level-0 table for every path matching `pattern`.
///
/// Series sharing a key (`B_C_E_F`) are merged: the first path supplies the
/// metadata, later values overwrite earlier ones at the same timestamp.
/// Paths that cannot be parsed or read are logged and skipped.
#[instrument(level = "info", skip(store, opts))]
pub fn build_level0<S: SeriesStore + ?Sized>(
    store: &S,
    pattern: &str,
    opts: &Level0Options,
) -> Result<HeaderedTable> {
    let paths = store.list_paths(pattern)?;
    info!(paths = paths.len(), "listed store paths");

    // 1) read and group
    let mut groups: Vec<SeriesGroup> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();
    let mut all_ts: BTreeSet<NaiveDateTime> = BTreeSet::new();
    for path in &paths {
        let Some(parts) = StorePath::parse(path) else {
            warn!(path = %path, "not a six-part pathname; skipping");
            continue;
        };
        let points = match store
            .read_series(path)
            .and_then(|rec| normalize_record(path, &rec, opts).map(|pts| (rec, pts)))
        {
            Ok(ok) => ok,
            Err(e) => {
                warn!(path = %path, error = %e, "failed to read series; skipping");
                continue;
            }
        };
        let (record, points) = points;
        let idx = *by_key.entry(parts.series_key()).or_insert_with(|| {
            groups.push(SeriesGroup {
                path: parts.clone(),
                unit: record.unit.clone(),
                kind: record.kind.clone(),
                data: BTreeMap::new(),
            });
            groups.len() - 1
        });
        for (ts, v) in points {
            groups[idx].data.insert(ts, v);
            all_ts.insert(ts);
        }
    }

    // 2) column order: part B, then key for a stable tie-break
    groups.sort_by(|x, y| {
        x.path
            .b
            .cmp(&y.path.b)
            .then_with(|| x.path.series_key().cmp(&y.path.series_key()))
    });
    debug!(series = groups.len(), timestamps = all_ts.len(), "grouped series");

    // 3) header block: row D holds part E, row E holds part F
    let mut raw: Vec<Vec<String>> = Role::ALL
        .iter()
        .map(|role| {
            let mut row = Vec::with_capacity(groups.len() + 1);
            row.push(role.label().to_string());
            row.extend(groups.iter().map(|g| match role {
                Role::A => g.path.a.clone(),
                Role::B => g.path.b.clone(),
                Role::C => g.path.c.clone(),
                Role::D => g.path.e.clone(),
                Role::E => g.path.f.clone(),
                Role::Type => g.kind.clone(),
                Role::Units => g.unit.clone(),
            }));
            row
        })
        .collect();

    // 4) data rows, clipped and with all-missing rows dropped
    let header_rows = raw.len();
    for ts in all_ts.iter().filter(|ts| opts.in_window(ts)) {
        let values: Vec<Option<f64>> = groups
            .iter()
            .map(|g| g.data.get(ts).copied().flatten())
            .collect();
        if opts.drop_empty_rows && !values.is_empty() && values.iter().all(Option::is_none) {
            continue;
        }
        let mut row = Vec::with_capacity(values.len() + 1);
        row.push(format_timestamp(ts));
        row.extend(values.into_iter().map(|v| match v {
            Some(x) => format_value(x),
            None => MISSING_TOKEN.to_string(),
        }));
        raw.push(row);
    }
    if raw.len() == header_rows {
        return Err(Error::format(
            None,
            "no data rows left for Level 0 after windowing",
        ));
    }

    let table = HeaderedTable::parse(raw)?;
    info!(
        columns = table.column_count(),
        rows = table.rows().len(),
        "built level 0"
    );
    Ok(table)
}
