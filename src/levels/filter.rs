// src/levels/filter.rs

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::Path,
};
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::table::{HeaderedTable, MetadataIndex};

/// Role-B patterns dropped by default at Level 1: system-internal and
/// validation-only series.
pub const DEFAULT_DROP_PATTERNS: &[&str] = &[r"_SYS$", r"_VAL$"];

static DEFAULT_DROP_RULES: Lazy<DropRules> = Lazy::new(|| {
    DropRules::new(DEFAULT_DROP_PATTERNS).expect("default drop patterns are valid regexes")
});

/// Per-column keep flags, aligned with the table's data columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeepMask(Vec<bool>);

impl KeepMask {
    pub fn all(len: usize) -> Self {
        Self(vec![true; len])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keeps(&self, pos: usize) -> bool {
        self.0.get(pos).copied().unwrap_or(false)
    }

    pub fn kept_positions(&self) -> Vec<usize> {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, keep)| **keep)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn kept_count(&self) -> usize {
        self.0.iter().filter(|k| **k).count()
    }
}

/// Level 1: drop every column whose role B matches any pattern
/// (case-insensitive, unanchored search).
#[derive(Debug, Clone)]
pub struct DropRules {
    patterns: Vec<Regex>,
}

impl DropRules {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p.as_ref())
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| Error::Pattern {
                        pattern: p.as_ref().to_string(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn defaults() -> Self {
        DEFAULT_DROP_RULES.clone()
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(Regex::as_str)
    }

    /// Whether any active pattern matches `part_b`.
    pub fn matches(&self, part_b: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(part_b))
    }

    /// `keep[col] = !any(pattern matches B[col])`; no patterns keeps all.
    pub fn mask(&self, index: &MetadataIndex) -> KeepMask {
        KeepMask(index.iter().map(|(_, m)| !self.matches(&m.b)).collect())
    }
}

/// Level 2: keep only columns whose `(C, B)` pair is listed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    pairs: BTreeSet<(String, String)>,
}

impl AllowList {
    pub fn from_mapping(mapping: &BTreeMap<String, Vec<String>>) -> Self {
        let pairs = mapping
            .iter()
            .flat_map(|(c, bs)| bs.iter().map(move |b| (c.clone(), b.clone())))
            .collect();
        Self { pairs }
    }

    /// Parse a YAML mapping `C: [B, ...]`. Any other shape is a config error.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let doc: serde_yaml::Value = serde_yaml::from_str(text)
            .map_err(|e| Error::Config(format!("allow-list is not valid YAML: {e}")))?;
        let map = match doc {
            serde_yaml::Value::Mapping(m) => m,
            serde_yaml::Value::Null => {
                return Err(Error::Config("allow-list mapping is empty".into()))
            }
            other => {
                return Err(Error::Config(format!(
                    "allow-list must be a mapping of C: [B, ...], found {}",
                    yaml_kind(&other)
                )))
            }
        };

        let mut mapping = BTreeMap::new();
        for (k, v) in map {
            let c = match k {
                serde_yaml::Value::String(s) => s,
                other => {
                    return Err(Error::Config(format!(
                        "allow-list key must be a string, found {}",
                        yaml_kind(&other)
                    )))
                }
            };
            let seq = match v {
                serde_yaml::Value::Sequence(seq) => seq,
                other => {
                    return Err(Error::Config(format!(
                        "allow-list entry `{c}` must be a list of strings, found {}",
                        yaml_kind(&other)
                    )))
                }
            };
            let bs = seq
                .into_iter()
                .map(|item| match item {
                    serde_yaml::Value::String(b) => Ok(b),
                    other => Err(Error::Config(format!(
                        "allow-list entry `{c}` contains a {}, expected strings",
                        yaml_kind(&other)
                    ))),
                })
                .collect::<Result<Vec<_>>>()?;
            mapping.insert(c, bs);
        }
        Ok(Self::from_mapping(&mapping))
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read allow-list {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&text)
    }

    /// Level 2 cannot run without a mapping.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_yaml_file(p),
            None => Err(Error::Config(
                "level 2 needs an allow-list mapping of C: [B, ...]".into(),
            )),
        }
    }

    pub fn contains(&self, part_c: &str, part_b: &str) -> bool {
        self.pairs.contains(&(part_c.to_string(), part_b.to_string()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn mask(&self, index: &MetadataIndex) -> KeepMask {
        KeepMask(
            index
                .iter()
                .map(|(_, m)| {
                    let (c, b) = m.part_c_b();
                    self.contains(c, b)
                })
                .collect(),
        )
    }
}

fn yaml_kind(v: &serde_yaml::Value) -> &'static str {
    match v {
        serde_yaml::Value::Null => "null",
        serde_yaml::Value::Bool(_) => "boolean",
        serde_yaml::Value::Number(_) => "number",
        serde_yaml::Value::String(_) => "string",
        serde_yaml::Value::Sequence(_) => "list",
        serde_yaml::Value::Mapping(_) => "mapping",
        serde_yaml::Value::Tagged(_) => "tagged value",
    }
}

/// New table with the index column plus every kept column, original order.
#[instrument(
    level = "debug",
    skip_all,
    fields(kept = mask.kept_count(), of = table.column_count())
)]
pub fn apply(table: &HeaderedTable, mask: &KeepMask) -> Result<HeaderedTable> {
    if mask.len() != table.column_count() {
        return Err(Error::format(
            None,
            format!(
                "keep mask covers {} columns, table has {}",
                mask.len(),
                table.column_count()
            ),
        ));
    }
    let kept = mask.kept_positions();
    debug!(dropped = table.column_count() - kept.len(), "applying keep mask");
    Ok(table.select_columns(&kept))
}
