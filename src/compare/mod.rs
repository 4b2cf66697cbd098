// src/compare/mod.rs
//! Tolerant cross-file comparison of two headered tables over their shared
//! composite keys and overlapping time window.

pub mod align;
pub mod report;
pub mod tolerance;

use chrono::NaiveDateTime;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

use crate::table::{ColumnKey, HeaderedTable, Value};
pub use align::{aligned_rows, column_overlap, time_overlap, AlignedRow, ColumnOverlap};
pub use report::{
    ColumnComparison, ColumnWarning, ComparisonOutcome, ComparisonReport, DetailedReport,
    MismatchDetail, ReportCaps, Side, WarningKind,
};
pub use tolerance::{mismatches, Mismatch, Tolerance, UnparseablePolicy, DEFAULT_RTOL};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CompareOptions {
    pub tolerance: Tolerance,
    pub unparseable: UnparseablePolicy,
}

/// Compare `left` (reference) against `right` column by column.
///
/// Columns are matched by their (B, C, E) key; when a key repeats inside one table
/// the first column wins and the rest are reported as warnings. Only rows
/// inside the overlap window take part, outer-joined on timestamp so a row
/// present on one side only is compared against missing.
#[instrument(
    level = "info",
    skip_all,
    fields(left_cols = left.column_count(), right_cols = right.column_count())
)]
pub fn compare_tables(
    left: &HeaderedTable,
    right: &HeaderedTable,
    options: &CompareOptions,
) -> ComparisonOutcome {
    // 1) key sets, first occurrence wins
    let (left_keys, left_dups) = left.metadata().key_positions();
    let (right_keys, right_dups) = right.metadata().key_positions();

    let mut warnings: Vec<ColumnWarning> = Vec::new();
    for (side, dups) in [(Side::Left, left_dups), (Side::Right, right_dups)] {
        for (key, position) in dups {
            warn!(key = %key, ?side, position, "duplicate composite key; first column wins");
            warnings.push(ColumnWarning {
                column_key: key,
                kind: WarningKind::DuplicateKey { side, position },
            });
        }
    }

    // 2) column overlap
    let overlap = column_overlap(left_keys.keys(), right_keys.keys());
    info!(
        common = overlap.common.len(),
        only_left = overlap.only_in_left.len(),
        only_right = overlap.only_in_right.len(),
        "column overlap"
    );
    if overlap.is_empty() {
        return ComparisonOutcome::NoCommonColumns {
            left_columns: left.column_count(),
            right_columns: right.column_count(),
            overlap,
        };
    }

    // 3) time overlap
    let (left_window, right_window) = (left.window(), right.window());
    let Some(window) = time_overlap(left_window, right_window) else {
        return ComparisonOutcome::NoTimeOverlap {
            left_window,
            right_window,
            overlap,
        };
    };
    let rows = aligned_rows(left, right, window);
    let left_rows_in_window = rows.iter().filter(|r| r.left.is_some()).count();
    let right_rows_in_window = rows.iter().filter(|r| r.right.is_some()).count();
    info!(start = %window.start, end = %window.end, rows = rows.len(), "time overlap");

    // 4) per-key comparison, independent of each other
    let results: Vec<ColumnResult> = overlap
        .common
        .par_iter()
        .map(|key| {
            let side = ColumnSide {
                key,
                left,
                right,
                left_pos: left_keys[key],
                right_pos: right_keys[key],
            };
            compare_column(&side, &rows, options)
        })
        .collect();

    // 5) deterministic ordering: worst first, then key
    let mut columns_compared = 0;
    let mut mismatched = Vec::new();
    for result in results {
        warnings.extend(result.warnings);
        if let Some(col) = result.comparison {
            columns_compared += 1;
            if !col.mismatches.is_empty() {
                mismatched.push(col);
            }
        }
    }
    mismatched.sort_by(|a, b| {
        b.mismatch_count()
            .cmp(&a.mismatch_count())
            .then_with(|| a.column_key.cmp(&b.column_key))
    });
    warnings.sort_by(|a, b| a.column_key.cmp(&b.column_key));

    let report = ComparisonReport {
        tolerance: options.tolerance,
        left_columns: left.column_count(),
        right_columns: right.column_count(),
        overlap,
        left_window,
        right_window,
        window,
        left_rows_in_window,
        right_rows_in_window,
        columns_compared,
        mismatched,
        warnings,
    };
    info!(
        compared = report.columns_compared,
        with_mismatches = report.columns_with_mismatches(),
        total = report.total_mismatches(),
        "comparison finished"
    );
    ComparisonOutcome::Compared(report)
}

struct ColumnSide<'a> {
    key: &'a ColumnKey,
    left: &'a HeaderedTable,
    right: &'a HeaderedTable,
    left_pos: usize,
    right_pos: usize,
}

struct ColumnResult {
    comparison: Option<ColumnComparison>,
    warnings: Vec<ColumnWarning>,
}

fn compare_column(
    col: &ColumnSide<'_>,
    rows: &[AlignedRow],
    options: &CompareOptions,
) -> ColumnResult {
    let value_at = |table: &HeaderedTable, row: Option<usize>, pos: usize| -> Value {
        row.map(|i| table.rows()[i].value(pos)).unwrap_or(Value::Missing)
    };
    let observations: Vec<(NaiveDateTime, Value, Value)> = rows
        .iter()
        .map(|r| {
            (
                r.timestamp,
                value_at(col.left, r.left, col.left_pos),
                value_at(col.right, r.right, col.right_pos),
            )
        })
        .collect();

    // count unparsable cells per side, keeping the first timestamp
    let mut bad: BTreeMap<Side, (usize, NaiveDateTime)> = BTreeMap::new();
    for (ts, l, r) in &observations {
        for (side, v) in [(Side::Left, l), (Side::Right, r)] {
            if matches!(v, Value::Unparseable(_)) {
                bad.entry(side).or_insert((0, *ts)).0 += 1;
            }
        }
    }
    let skip = !bad.is_empty() && options.unparseable == UnparseablePolicy::SkipColumn;
    let warnings = bad
        .into_iter()
        .map(|(side, (count, first_timestamp))| {
            warn!(key = %col.key, ?side, count, "column has unparsable values");
            ColumnWarning {
                column_key: col.key.clone(),
                kind: WarningKind::Unparseable {
                    side,
                    count,
                    first_timestamp,
                    compared: !skip,
                },
            }
        })
        .collect();
    if skip {
        return ColumnResult {
            comparison: None,
            warnings,
        };
    }

    let found: Vec<Mismatch> = mismatches(col.key, observations, options.tolerance).collect();
    if !found.is_empty() {
        debug!(key = %col.key, count = found.len(), "mismatches");
    }
    ColumnResult {
        comparison: Some(ColumnComparison {
            column_key: col.key.clone(),
            left_position: col.left_pos,
            right_position: col.right_pos,
            mismatches: found,
        }),
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::tests::table;

    fn key(b: &str) -> ColumnKey {
        ColumnKey::new(b, "FLOW", "F")
    }

    fn opts(rtol: f64) -> CompareOptions {
        CompareOptions {
            tolerance: Tolerance::new(rtol),
            ..Default::default()
        }
    }

    #[test]
    fn single_mismatch_at_second_timestamp() {
        let reference = table(
            &["2000-01-31", "2000-02-29"],
            &[("X", "FLOW", "F", &["1.0", "2.0"])],
        );
        let comparison = table(
            &["2000-01-31", "2000-02-29"],
            &[("X", "FLOW", "F", &["1.00001", "2.5"])],
        );
        let outcome = compare_tables(&reference, &comparison, &opts(1e-4));
        let report = outcome.report().expect("tables overlap");
        assert_eq!(report.total_mismatches(), 1);
        let col = report.column(&key("X")).unwrap();
        assert_eq!(col.mismatches[0].timestamp.to_string(), "2000-02-29 00:00:00");
        assert_eq!(col.mismatches[0].abs_difference, Some(0.5));
        assert!(!outcome.is_match());
    }

    #[test]
    fn self_comparison_is_clean() {
        let t = table(
            &["2000-01-31", "2000-02-29", "2000-03-31"],
            &[
                ("A", "FLOW", "F", &["1.0", "NaN", "3.25"]),
                ("B", "STORAGE", "F", &["", "2", "x"]),
                ("C", "FLOW", "F", &["-1", "0", "1e9"]),
            ],
        );
        let outcome = compare_tables(&t, &t, &CompareOptions::default());
        let report = outcome.report().unwrap();
        assert_eq!(report.total_mismatches(), 0);
        assert_eq!(report.overlap.common.len(), t.column_count());
        assert!(outcome.is_match());
    }

    #[test]
    fn nan_symmetry() {
        let left = table(
            &["2000-01-31", "2000-02-29"],
            &[("X", "FLOW", "F", &["NaN", "NaN"])],
        );
        let right = table(
            &["2000-01-31", "2000-02-29"],
            &[("X", "FLOW", "F", &["NaN", "4.0"])],
        );
        let outcome = compare_tables(&left, &right, &CompareOptions::default());
        let col = outcome.report().unwrap().column(&key("X")).unwrap();
        assert_eq!(col.mismatch_count(), 1);
        assert_eq!(col.mismatches[0].timestamp.to_string(), "2000-02-29 00:00:00");
        assert_eq!(col.mismatches[0].abs_difference, None);
    }

    #[test]
    fn no_common_columns_is_an_outcome() {
        let left = table(&["2000-01-31"], &[("X", "FLOW", "F", &["1"])]);
        let right = table(&["2000-01-31"], &[("Y", "FLOW", "F", &["1"])]);
        match compare_tables(&left, &right, &CompareOptions::default()) {
            ComparisonOutcome::NoCommonColumns { overlap, .. } => {
                assert!(overlap.only_in_left.contains(&key("X")));
                assert!(overlap.only_in_right.contains(&key("Y")));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn disjoint_windows_is_an_outcome() {
        let left = table(&["2000-01-31"], &[("X", "FLOW", "F", &["1"])]);
        let right = table(&["2001-01-31"], &[("X", "FLOW", "F", &["1"])]);
        let outcome = compare_tables(&left, &right, &CompareOptions::default());
        assert!(matches!(outcome, ComparisonOutcome::NoTimeOverlap { .. }));
        assert!(!outcome.is_match());
    }

    #[test]
    fn rows_outside_window_are_never_reported() {
        let left = table(
            &["2000-01-31", "2000-02-29", "2000-03-31"],
            &[("X", "FLOW", "F", &["100", "2", "3"])],
        );
        let right = table(
            &["2000-02-29", "2000-03-31", "2000-04-30"],
            &[("X", "FLOW", "F", &["2", "3", "-50"])],
        );
        let outcome = compare_tables(&left, &right, &CompareOptions::default());
        let report = outcome.report().unwrap();
        assert!(report.is_match());
        assert_eq!(report.left_rows_in_window, 2);
        assert_eq!(report.right_rows_in_window, 2);
    }

    #[test]
    fn one_sided_timestamp_inside_window_is_a_mismatch() {
        let left = table(
            &["2000-01-31", "2000-02-29", "2000-03-31"],
            &[("X", "FLOW", "F", &["1", "2", "3"])],
        );
        let right = table(
            &["2000-01-31", "2000-03-15", "2000-03-31"],
            &[("X", "FLOW", "F", &["1", "9", "3"])],
        );
        let outcome = compare_tables(&left, &right, &CompareOptions::default());
        let report = outcome.report().unwrap();
        assert_eq!(report.left_rows_in_window, 3);
        assert_eq!(report.right_rows_in_window, 3);

        let col = report.column(&key("X")).unwrap();
        let stamps: Vec<String> = col
            .mismatches
            .iter()
            .map(|m| m.timestamp.date().to_string())
            .collect();
        assert_eq!(stamps, ["2000-02-29", "2000-03-15"]);
        // left only
        assert_eq!(col.mismatches[0].left_value, Value::Numeric(2.0));
        assert_eq!(col.mismatches[0].right_value, Value::Missing);
        // right only
        assert_eq!(col.mismatches[1].left_value, Value::Missing);
        assert_eq!(col.mismatches[1].right_value, Value::Numeric(9.0));
        assert!(col.mismatches.iter().all(|m| m.abs_difference.is_none()));
    }

    #[test]
    fn underscores_in_roles_never_pair_different_series() {
        // both columns display as `A_B_C_E`
        let left = table(
            &["2000-01-31"],
            &[("A_B", "C", "E", &["1"]), ("A", "B_C", "E", &["999"])],
        );
        let right = table(
            &["2000-01-31"],
            &[("A", "B_C", "E", &["999"]), ("A_B", "C", "E", &["1"])],
        );
        let outcome = compare_tables(&left, &right, &CompareOptions::default());
        let report = outcome.report().unwrap();
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
        assert_eq!(report.columns_compared, 2);
        assert!(outcome.is_match());

        let other = table(&["2000-01-31"], &[("A_B", "C", "E", &["1"])]);
        let lone = table(&["2000-01-31"], &[("A", "B_C", "E", &["999"])]);
        let outcome = compare_tables(&lone, &other, &CompareOptions::default());
        assert!(matches!(outcome, ComparisonOutcome::NoCommonColumns { .. }));
    }

    #[test]
    fn worst_first_ordering_and_caps_keep_counts() {
        let ts = ["2000-01-31", "2000-02-29", "2000-03-31", "2000-04-30", "2000-05-31"];
        let left = table(
            &ts,
            &[
                ("A", "FLOW", "F", &["1", "1", "1", "1", "1"]),
                ("B", "FLOW", "F", &["1", "1", "1", "1", "1"]),
                ("C", "FLOW", "F", &["1", "1", "1", "1", "1"]),
            ],
        );
        let right = table(
            &ts,
            &[
                ("A", "FLOW", "F", &["2", "1", "1", "1", "1"]),
                ("B", "FLOW", "F", &["2", "2", "2", "2", "1"]),
                ("C", "FLOW", "F", &["2", "2", "1", "1", "1"]),
            ],
        );
        let outcome = compare_tables(&left, &right, &CompareOptions::default());
        let report = outcome.report().unwrap();
        let order: Vec<String> = report
            .mismatched
            .iter()
            .map(|c| c.column_key.to_string())
            .collect();
        assert_eq!(order, ["B_FLOW_F", "C_FLOW_F", "A_FLOW_F"]);

        let detail = report.detailed(&ReportCaps {
            detail_columns: 2,
            sample_timestamps: 3,
        });
        assert_eq!(detail.entries.len(), 2);
        assert_eq!(detail.remaining_columns, 1);
        assert_eq!(detail.entries[0].mismatch_count, 4);
        assert_eq!(detail.entries[0].sample_timestamps.len(), 3);
        assert_eq!(report.total_mismatches(), 7);
    }

    #[test]
    fn unparseable_values_warn_separately() {
        let left = table(
            &["2000-01-31", "2000-02-29"],
            &[("X", "FLOW", "F", &["abc", "2"])],
        );
        let right = table(
            &["2000-01-31", "2000-02-29"],
            &[("X", "FLOW", "F", &["NaN", "2"])],
        );
        let outcome = compare_tables(&left, &right, &CompareOptions::default());
        let report = outcome.report().unwrap();
        assert!(report.is_match());
        assert_eq!(report.warnings.len(), 1);
        assert!(matches!(
            report.warnings[0].kind,
            WarningKind::Unparseable { side: Side::Left, count: 1, compared: true, .. }
        ));

        let skip = CompareOptions {
            unparseable: UnparseablePolicy::SkipColumn,
            ..Default::default()
        };
        let report = compare_tables(&left, &right, &skip).report().cloned().unwrap();
        assert_eq!(report.columns_compared, 0);
        assert!(matches!(
            report.warnings[0].kind,
            WarningKind::Unparseable { compared: false, .. }
        ));
    }

    #[test]
    fn duplicate_keys_first_wins() {
        let left = table(
            &["2000-01-31"],
            &[("X", "FLOW", "F", &["1"]), ("X", "FLOW", "F", &["99"])],
        );
        let right = table(&["2000-01-31"], &[("X", "FLOW", "F", &["1"])]);
        let outcome = compare_tables(&left, &right, &CompareOptions::default());
        let report = outcome.report().unwrap();
        assert!(report.is_match());
        assert!(matches!(
            report.warnings[0].kind,
            WarningKind::DuplicateKey { side: Side::Left, position: 1 }
        ));
    }

    #[test]
    fn tolerance_is_monotone_over_tables() {
        let left = table(
            &["2000-01-31", "2000-02-29", "2000-03-31"],
            &[("X", "FLOW", "F", &["1.0", "10.0", "100.0"])],
        );
        let right = table(
            &["2000-01-31", "2000-02-29", "2000-03-31"],
            &[("X", "FLOW", "F", &["1.0001", "10.1", "110.0"])],
        );
        let mut prev = usize::MAX;
        for rtol in [0.0, 1e-5, 1e-3, 2e-2, 0.2] {
            let n = compare_tables(&left, &right, &opts(rtol))
                .report()
                .unwrap()
                .total_mismatches();
            assert!(n <= prev);
            prev = n;
        }
        assert_eq!(prev, 0);
    }

    #[test]
    fn outcome_serializes_to_json() {
        let t = table(&["2000-01-31"], &[("X", "FLOW", "F", &["1"])]);
        let outcome = compare_tables(&t, &t, &CompareOptions::default());
        let json = serde_json::to_value(outcome).unwrap();
        assert_eq!(json["outcome"], "compared");
        assert_eq!(json["columns_compared"], 1);
    }
}
