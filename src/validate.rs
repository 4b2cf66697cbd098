// src/validate.rs
//! Check a Level-0 table against the store it was exported from.

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::compare::{mismatches, Mismatch, Tolerance};
use crate::error::Result;
use crate::levels::level0::{normalize_record, Level0Options, SeriesStore, StorePath};
use crate::table::{ColumnKey, HeaderedTable, Value};

/// Store values are doubles written back as text, so the default is tight.
pub const VALIDATION_RTOL: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidateOptions {
    pub tolerance: Tolerance,
    /// Only the first `limit` listed paths are checked.
    pub limit: Option<usize>,
    pub level0: Level0Options,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            tolerance: Tolerance::new(VALIDATION_RTOL),
            limit: None,
            level0: Level0Options::default(),
        }
    }
}

/// Outcome for one store path that has a column in the table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathValidation {
    pub path: String,
    pub column_key: ColumnKey,
    pub column_position: usize,
    /// Timestamps present in both the store series and the table.
    pub compared: usize,
    /// Store value on the left, table value on the right.
    pub mismatches: Vec<Mismatch>,
}

impl PathValidation {
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }

    pub fn first_mismatch(&self) -> Option<&Mismatch> {
        self.mismatches.first()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub paths_listed: usize,
    pub columns_validated: usize,
    /// Paths with no column of the same (B, C, F) identity.
    pub unmatched_paths: Vec<String>,
    /// Paths that could not be parsed or read, with the reason.
    pub failures: Vec<(String, String)>,
    pub results: Vec<PathValidation>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.results.iter().all(PathValidation::is_clean)
    }

    pub fn mismatched_paths(&self) -> impl Iterator<Item = &PathValidation> {
        self.results.iter().filter(|r| !r.is_clean())
    }
}

/// Re-read each store path and compare it with the table column that carries
/// the same identity, on the timestamps both sides have.
#[instrument(level = "info", skip(store, table, opts), fields(columns = table.column_count()))]
pub fn validate_level0<S: SeriesStore + ?Sized>(
    store: &S,
    pattern: &str,
    table: &HeaderedTable,
    opts: &ValidateOptions,
) -> Result<ValidationReport> {
    let mut paths = store.list_paths(pattern)?;
    if let Some(limit) = opts.limit {
        paths.truncate(limit);
    }
    let mut report = ValidationReport {
        paths_listed: paths.len(),
        ..Default::default()
    };

    for path in paths {
        let Some(parts) = StorePath::parse(&path) else {
            report
                .failures
                .push((path, "not a six-part pathname".to_string()));
            continue;
        };
        let column = table
            .metadata()
            .iter()
            .find(|(_, m)| m.b == parts.b && m.c == parts.c && m.e == parts.f);
        let Some((pos, meta)) = column else {
            debug!(path = %path, "no matching column");
            report.unmatched_paths.push(path);
            continue;
        };

        let points = match store
            .read_series(&path)
            .and_then(|rec| normalize_record(&path, &rec, &opts.level0))
        {
            Ok(points) => points,
            Err(e) => {
                warn!(path = %path, error = %e, "failed to read series");
                report.failures.push((path, e.to_string()));
                continue;
            }
        };

        // inner join on timestamp
        let joined: Vec<(NaiveDateTime, Value, Value)> = points
            .into_iter()
            .filter_map(|(ts, v)| {
                let row = table.row_index(&ts)?;
                let stored = v.map_or(Value::Missing, Value::Numeric);
                Some((ts, stored, table.rows()[row].value(pos)))
            })
            .collect();
        let column_key = meta.composite_key();
        let found: Vec<Mismatch> =
            mismatches(&column_key, joined.iter().cloned(), opts.tolerance).collect();
        if !found.is_empty() {
            warn!(path = %path, mismatches = found.len(), "store and table disagree");
        }
        report.results.push(PathValidation {
            path,
            column_key,
            column_position: pos,
            compared: joined.len(),
            mismatches: found,
        });
    }

    report.columns_validated = report.results.len();
    info!(
        validated = report.columns_validated,
        unmatched = report.unmatched_paths.len(),
        failed = report.failures.len(),
        "validated level 0"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::level0::tests::{record, sample_store};
    use crate::levels::level0::{build_level0, ALL_PATHS};
    use anyhow::Result;

    #[test]
    fn exported_table_validates_clean() -> Result<()> {
        let store = sample_store();
        let table = build_level0(&store, ALL_PATHS, &Level0Options::default())?;
        let report = validate_level0(&store, ALL_PATHS, &table, &ValidateOptions::default())?;
        assert_eq!(report.paths_listed, 3);
        // both C_KSWCK blocks map onto the same column
        assert_eq!(report.columns_validated, 3);
        assert!(report.unmatched_paths.is_empty());
        assert!(report.is_clean(), "{report:?}");
        let shasta = report
            .results
            .iter()
            .find(|r| r.path.contains("S_SHSTA"))
            .unwrap();
        assert_eq!(shasta.compared, 2);
        assert_eq!(shasta.column_key.to_string(), "S_SHSTA_STORAGE_L2020A");
        Ok(())
    }

    #[test]
    fn changed_store_value_is_reported() -> Result<()> {
        let mut store = sample_store();
        let table = build_level0(&store, ALL_PATHS, &Level0Options::default())?;
        store.insert(
            "/CALSIM/S_SHSTA/STORAGE/01JAN1920/1MON/L2020A/",
            record(&[((1921, 11, 1), 100.5), ((1921, 12, 1), -901.0)], "TAF"),
        );
        store.insert(
            "/CALSIM/NEW_ONE/STORAGE/01JAN1920/1MON/L2020A/",
            record(&[((1921, 11, 1), 1.0)], "TAF"),
        );
        let report = validate_level0(&store, ALL_PATHS, &table, &ValidateOptions::default())?;
        assert!(!report.is_clean());
        assert_eq!(report.unmatched_paths.len(), 1);
        let bad: Vec<_> = report.mismatched_paths().collect();
        assert_eq!(bad.len(), 1);
        let first = bad[0].first_mismatch().unwrap();
        assert_eq!(first.left_value, Value::Numeric(100.5));
        assert_eq!(first.right_value, Value::Numeric(100.0));
        assert_eq!(first.abs_difference, Some(0.5));
        Ok(())
    }

    #[test]
    fn limit_caps_paths_checked() -> Result<()> {
        let store = sample_store();
        let table = build_level0(&store, ALL_PATHS, &Level0Options::default())?;
        let opts = ValidateOptions {
            limit: Some(1),
            ..Default::default()
        };
        let report = validate_level0(&store, ALL_PATHS, &table, &opts)?;
        assert_eq!(report.paths_listed, 1);
        assert_eq!(report.results.len(), 1);
        Ok(())
    }
}
