// src/compare/report.rs

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::align::ColumnOverlap;
use super::tolerance::{Mismatch, Tolerance};
use crate::table::{ColumnKey, TimeWindow, Value};

/// Which input a finding belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

/// A per-column problem that is not a value mismatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnWarning {
    pub column_key: ColumnKey,
    pub kind: WarningKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WarningKind {
    /// Cells that are neither numbers nor the missing token.
    Unparseable {
        side: Side,
        count: usize,
        first_timestamp: NaiveDateTime,
        /// Whether the column was still compared.
        compared: bool,
    },
    /// A later column with a key already seen on the same side; ignored.
    DuplicateKey { side: Side, position: usize },
}

/// Every mismatch found for one composite key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnComparison {
    pub column_key: ColumnKey,
    pub left_position: usize,
    pub right_position: usize,
    /// Full set, in timestamp order.
    pub mismatches: Vec<Mismatch>,
}

impl ColumnComparison {
    pub fn mismatch_count(&self) -> usize {
        self.mismatches.len()
    }
}

/// How much of the report a presentation layer shows in full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportCaps {
    pub detail_columns: usize,
    pub sample_timestamps: usize,
}

impl Default for ReportCaps {
    fn default() -> Self {
        Self {
            detail_columns: 10,
            sample_timestamps: 3,
        }
    }
}

/// Result of comparing two tables that do overlap.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub tolerance: Tolerance,
    pub left_columns: usize,
    pub right_columns: usize,
    pub overlap: ColumnOverlap,
    pub left_window: TimeWindow,
    pub right_window: TimeWindow,
    pub window: TimeWindow,
    pub left_rows_in_window: usize,
    pub right_rows_in_window: usize,
    /// Columns actually compared (common keys minus skipped ones).
    pub columns_compared: usize,
    /// Columns with at least one mismatch, worst first, ties by key.
    pub mismatched: Vec<ColumnComparison>,
    pub warnings: Vec<ColumnWarning>,
}

impl ComparisonReport {
    pub fn total_mismatches(&self) -> usize {
        self.mismatched.iter().map(|c| c.mismatch_count()).sum()
    }

    pub fn columns_with_mismatches(&self) -> usize {
        self.mismatched.len()
    }

    pub fn is_match(&self) -> bool {
        self.mismatched.is_empty()
    }

    pub fn column(&self, key: &ColumnKey) -> Option<&ColumnComparison> {
        self.mismatched.iter().find(|c| &c.column_key == key)
    }

    /// Capped view for display. Counts stay exact; only detail is trimmed.
    pub fn detailed(&self, caps: &ReportCaps) -> DetailedReport {
        let entries = self
            .mismatched
            .iter()
            .take(caps.detail_columns)
            .filter_map(|col| {
                let first = col.mismatches.first()?;
                Some(MismatchDetail {
                    column_key: col.column_key.clone(),
                    mismatch_count: col.mismatch_count(),
                    first_timestamp: first.timestamp,
                    left_value: first.left_value.clone(),
                    right_value: first.right_value.clone(),
                    abs_difference: first.abs_difference,
                    sample_timestamps: col
                        .mismatches
                        .iter()
                        .take(caps.sample_timestamps)
                        .map(|m| m.timestamp)
                        .collect(),
                })
            })
            .collect::<Vec<_>>();
        DetailedReport {
            remaining_columns: self.mismatched.len().saturating_sub(entries.len()),
            entries,
        }
    }
}

/// First mismatch of one column plus a few sample timestamps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MismatchDetail {
    pub column_key: ColumnKey,
    pub mismatch_count: usize,
    pub first_timestamp: NaiveDateTime,
    pub left_value: Value,
    pub right_value: Value,
    pub abs_difference: Option<f64>,
    pub sample_timestamps: Vec<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailedReport {
    pub entries: Vec<MismatchDetail>,
    /// Mismatching columns left out by the column cap.
    pub remaining_columns: usize,
}

/// Outcome of [`super::compare_tables`]. The two `No*` variants are expected
/// results for unrelated exports, not errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ComparisonOutcome {
    Compared(ComparisonReport),
    NoCommonColumns {
        left_columns: usize,
        right_columns: usize,
        overlap: ColumnOverlap,
    },
    NoTimeOverlap {
        left_window: TimeWindow,
        right_window: TimeWindow,
        overlap: ColumnOverlap,
    },
}

impl ComparisonOutcome {
    pub fn report(&self) -> Option<&ComparisonReport> {
        match self {
            ComparisonOutcome::Compared(r) => Some(r),
            _ => None,
        }
    }

    /// True only when the tables overlap and no value disagrees.
    pub fn is_match(&self) -> bool {
        self.report().is_some_and(ComparisonReport::is_match)
    }
}
