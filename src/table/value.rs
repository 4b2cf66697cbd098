// src/table/value.rs

use serde::Serialize;
use std::fmt;

/// Token written for every missing cell.
pub const MISSING_TOKEN: &str = "NaN";

/// Result of coercing one raw cell to a number. Total: every string maps to
/// exactly one variant, so parse failures stay visible instead of turning
/// into NaN.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Numeric(f64),
    Missing,
    Unparseable(String),
}

impl Value {
    pub fn coerce(raw: &str) -> Self {
        let v = raw.trim().trim_matches('"').trim();
        if is_missing_token(v) {
            return Value::Missing;
        }
        match v.parse::<f64>() {
            // "nan" parses as f64 NaN; it is already caught above, but any
            // other NaN spelling also lands on Missing.
            Ok(x) if x.is_nan() => Value::Missing,
            Ok(x) => Value::Numeric(x),
            Err(_) => Value::Unparseable(v.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Numeric(x) => Some(*x),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Value used in arithmetic: unparsable text counts as missing.
    pub fn arithmetic(&self) -> Value {
        match self {
            Value::Unparseable(_) => Value::Missing,
            other => other.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Numeric(x) => write!(f, "{x}"),
            Value::Missing => f.write_str(MISSING_TOKEN),
            Value::Unparseable(s) => write!(f, "{s:?}"),
        }
    }
}

fn is_missing_token(v: &str) -> bool {
    v.is_empty()
        || ["nan", "na", "n/a", "null", "none", "-nan"]
            .iter()
            .any(|t| v.eq_ignore_ascii_case(t))
}

/// Render a float the way the exporter writes them: at least one decimal
/// place for integral values, shortest round-trip text otherwise.
pub fn format_value(x: f64) -> String {
    if x.is_nan() {
        MISSING_TOKEN.to_string()
    } else if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 {
        format!("{:.1}", x)
    } else {
        format!("{}", x)
    }
}
