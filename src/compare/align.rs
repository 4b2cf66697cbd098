// src/compare/align.rs

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::table::{ColumnKey, HeaderedTable, TimeWindow};

/// Partition of two key sets into shared and one-sided keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnOverlap {
    pub common: BTreeSet<ColumnKey>,
    pub only_in_left: BTreeSet<ColumnKey>,
    pub only_in_right: BTreeSet<ColumnKey>,
}

impl ColumnOverlap {
    /// No shared key: a reportable outcome, not a failure.
    pub fn is_empty(&self) -> bool {
        self.common.is_empty()
    }
}

/// Split two key sets into `(common, only_in_left, only_in_right)`.
/// Keys compare on their role tuple, never on the joined text.
pub fn column_overlap<'a, L, R>(left: L, right: R) -> ColumnOverlap
where
    L: IntoIterator<Item = &'a ColumnKey>,
    R: IntoIterator<Item = &'a ColumnKey>,
{
    let left: BTreeSet<ColumnKey> = left.into_iter().cloned().collect();
    let right: BTreeSet<ColumnKey> = right.into_iter().cloned().collect();
    ColumnOverlap {
        common: left.intersection(&right).cloned().collect(),
        only_in_left: left.difference(&right).cloned().collect(),
        only_in_right: right.difference(&left).cloned().collect(),
    }
}

/// `(max(starts), min(ends))`, or `None` when that range is empty.
pub fn time_overlap(a: TimeWindow, b: TimeWindow) -> Option<TimeWindow> {
    let start = a.start.max(b.start);
    let end = a.end.min(b.end);
    (start <= end).then_some(TimeWindow { start, end })
}

/// A timestamp inside the overlap window with the row it occupies on each
/// side, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignedRow {
    pub timestamp: NaiveDateTime,
    pub left: Option<usize>,
    pub right: Option<usize>,
}

/// Outer-join the two (sorted) indices, restricted to `window`.
pub fn aligned_rows(
    left: &HeaderedTable,
    right: &HeaderedTable,
    window: TimeWindow,
) -> Vec<AlignedRow> {
    let in_window = |t: &HeaderedTable| -> Vec<(usize, NaiveDateTime)> {
        t.timestamps()
            .enumerate()
            .filter(|(_, ts)| window.contains(ts))
            .map(|(i, ts)| (i, *ts))
            .collect()
    };
    let l = in_window(left);
    let r = in_window(right);

    let mut out = Vec::with_capacity(l.len().max(r.len()));
    let (mut i, mut j) = (0, 0);
    while i < l.len() || j < r.len() {
        match (l.get(i), r.get(j)) {
            (Some(&(li, lt)), Some(&(ri, rt))) if lt == rt => {
                out.push(AlignedRow {
                    timestamp: lt,
                    left: Some(li),
                    right: Some(ri),
                });
                i += 1;
                j += 1;
            }
            (Some(&(li, lt)), Some(&(_, rt))) if lt < rt => {
                out.push(AlignedRow {
                    timestamp: lt,
                    left: Some(li),
                    right: None,
                });
                i += 1;
            }
            (Some(&(li, lt)), None) => {
                out.push(AlignedRow {
                    timestamp: lt,
                    left: Some(li),
                    right: None,
                });
                i += 1;
            }
            (_, Some(&(ri, rt))) => {
                out.push(AlignedRow {
                    timestamp: rt,
                    left: None,
                    right: Some(ri),
                });
                j += 1;
            }
            (None, None) => break,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::tests::table;
    use chrono::NaiveDate;

    fn ts(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn keys(bs: &[&str]) -> Vec<ColumnKey> {
        bs.iter().map(|b| ColumnKey::new(*b, "FLOW", "F")).collect()
    }

    #[test]
    fn overlap_partitions_keys() {
        let (left, right) = (keys(&["a", "b", "c"]), keys(&["b", "c", "d"]));
        let o = column_overlap(&left, &right);
        let common: Vec<String> = o.common.iter().map(ToString::to_string).collect();
        assert_eq!(common, ["b_FLOW_F", "c_FLOW_F"]);
        assert_eq!(o.only_in_left.len(), 1);
        assert!(o.only_in_right.contains(&right[2]));
        assert!(!o.is_empty());
        assert!(column_overlap(&keys(&["a"]), &keys(&["z"])).is_empty());
    }

    #[test]
    fn overlap_uses_roles_not_joined_text() {
        let left = [ColumnKey::new("A", "B_C", "E")];
        let right = [ColumnKey::new("A_B", "C", "E")];
        assert_eq!(left[0].to_string(), right[0].to_string());
        let o = column_overlap(&left, &right);
        assert!(o.is_empty());
        assert_eq!(o.only_in_left.len(), 1);
        assert_eq!(o.only_in_right.len(), 1);
    }

    fn window(start: NaiveDateTime, end: NaiveDateTime) -> TimeWindow {
        TimeWindow { start, end }
    }

    #[test]
    fn time_overlap_intersects_or_signals_none() {
        let a = window(ts(2000, 1, 1), ts(2000, 6, 1));
        let b = window(ts(2000, 3, 1), ts(2001, 1, 1));
        assert_eq!(time_overlap(a, b), Some(window(ts(2000, 3, 1), ts(2000, 6, 1))));
        let c = window(ts(2002, 1, 1), ts(2003, 1, 1));
        assert_eq!(time_overlap(a, c), None);
        // single shared instant still overlaps
        let d = window(ts(2000, 6, 1), ts(2000, 7, 1));
        assert!(time_overlap(a, d).is_some());
    }

    #[test]
    fn aligned_rows_outer_joins_inside_window() {
        let left = table(
            &["2000-01-31", "2000-02-29", "2000-03-31"],
            &[("X", "FLOW", "F", &["1", "2", "3"])],
        );
        let right = table(
            &["2000-02-29", "2000-03-15", "2000-03-31", "2000-04-30"],
            &[("X", "FLOW", "F", &["2", "9", "3", "4"])],
        );
        let overlap = time_overlap(left.window(), right.window()).unwrap();
        let rows = aligned_rows(&left, &right, overlap);
        let summary: Vec<_> = rows.iter().map(|r| (r.left, r.right)).collect();
        assert_eq!(
            summary,
            vec![(Some(1), Some(0)), (None, Some(1)), (Some(2), Some(2))]
        );
    }
}
