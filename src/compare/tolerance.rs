// src/compare/tolerance.rs

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::table::{ColumnKey, Value};

/// Relative tolerance used when none is configured.
pub const DEFAULT_RTOL: f64 = 1e-5;

/// Value-level equality under a relative tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    pub rtol: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self { rtol: DEFAULT_RTOL }
    }
}

impl Tolerance {
    pub fn new(rtol: f64) -> Self {
        Self { rtol }
    }

    /// Equal iff both missing, or both numeric and either identical or
    /// within `rtol * max(|a|, |b|)`. Unparsable text counts as missing.
    /// Exactly one side missing is always a mismatch.
    pub fn values_match(&self, a: &Value, b: &Value) -> bool {
        match (a.arithmetic(), b.arithmetic()) {
            (Value::Missing, Value::Missing) => true,
            (Value::Numeric(x), Value::Numeric(y)) => {
                if x == y {
                    return true;
                }
                // inf - finite would pass the relative test
                if !x.is_finite() || !y.is_finite() {
                    return false;
                }
                (x - y).abs() <= self.rtol * x.abs().max(y.abs())
            }
            _ => false,
        }
    }
}

/// What to do with a column whose cells do not parse as numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnparseablePolicy {
    /// Compare the column, counting bad cells as missing.
    #[default]
    TreatAsMissing,
    /// Leave the column out of the comparison entirely.
    SkipColumn,
}

/// One disagreeing observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mismatch {
    pub column_key: ColumnKey,
    pub timestamp: NaiveDateTime,
    pub left_value: Value,
    pub right_value: Value,
    /// `|left - right|`, `None` when either side is missing.
    pub abs_difference: Option<f64>,
}

impl Mismatch {
    fn new(column_key: &ColumnKey, timestamp: NaiveDateTime, left: Value, right: Value) -> Self {
        let abs_difference = match (left.as_f64(), right.as_f64()) {
            (Some(x), Some(y)) => Some((x - y).abs()),
            _ => None,
        };
        Self {
            column_key: column_key.clone(),
            timestamp,
            left_value: left,
            right_value: right,
            abs_difference,
        }
    }
}

/// Lazily yield one [`Mismatch`] per disagreeing `(timestamp, left, right)`.
pub fn mismatches<'a, I>(
    column_key: &'a ColumnKey,
    observations: I,
    tolerance: Tolerance,
) -> impl Iterator<Item = Mismatch> + 'a
where
    I: IntoIterator<Item = (NaiveDateTime, Value, Value)>,
    I::IntoIter: 'a,
{
    observations
        .into_iter()
        .filter(move |(_, l, r)| !tolerance.values_match(l, r))
        .map(move |(ts, l, r)| Mismatch::new(column_key, ts, l, r))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn num(x: f64) -> Value {
        Value::Numeric(x)
    }

    #[test]
    fn missing_rules() {
        let t = Tolerance::default();
        assert!(t.values_match(&Value::Missing, &Value::Missing));
        assert!(!t.values_match(&Value::Missing, &num(1.0)));
        assert!(!t.values_match(&num(1.0), &Value::Missing));
        // unparsable on both sides behaves like both missing
        assert!(t.values_match(
            &Value::Unparseable("x".into()),
            &Value::Missing
        ));
    }

    #[test]
    fn relative_closeness() {
        let t = Tolerance::new(1e-4);
        assert!(t.values_match(&num(1.0), &num(1.00001)));
        assert!(!t.values_match(&num(2.0), &num(2.5)));
        assert!(t.values_match(&num(0.0), &num(0.0)));
        assert!(!t.values_match(&num(0.0), &num(1e-12)));
    }

    #[test]
    fn infinities_only_match_themselves() {
        let t = Tolerance::new(0.5);
        assert!(t.values_match(&num(f64::INFINITY), &num(f64::INFINITY)));
        assert!(!t.values_match(&num(f64::INFINITY), &num(1e300)));
    }

    #[test]
    fn larger_rtol_never_adds_mismatches() {
        let pairs = [(1.0, 1.001), (10.0, 10.5), (100.0, 100.0), (-3.0, -3.3)];
        let mut prev = usize::MAX;
        for rtol in [0.0, 1e-6, 1e-3, 1e-2, 0.1, 1.0] {
            let t = Tolerance::new(rtol);
            let count = pairs
                .iter()
                .filter(|(a, b)| !t.values_match(&num(*a), &num(*b)))
                .count();
            assert!(count <= prev);
            prev = count;
        }
        assert_eq!(prev, 0);
    }

    #[test]
    fn mismatch_iterator_reports_difference() {
        let ts = |d| {
            NaiveDate::from_ymd_opt(2000, 1, d)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        };
        let obs = vec![
            (ts(1), num(1.0), num(1.0)),
            (ts(2), num(2.0), num(2.5)),
            (ts(3), Value::Missing, num(3.0)),
        ];
        let key = ColumnKey::new("X", "FLOW", "F");
        let found: Vec<_> = mismatches(&key, obs, Tolerance::default()).collect();
        assert_eq!(found[0].column_key, key);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].timestamp, ts(2));
        assert_eq!(found[0].abs_difference, Some(0.5));
        assert_eq!(found[1].abs_difference, None);
    }
}
