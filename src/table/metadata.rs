// src/table/metadata.rs
//! Typed view over the seven header rows: one [`ColumnMeta`] per data column,
//! looked up by [`Role`] instead of by row offset.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Number of metadata rows at the top of every table.
pub const HEADER_ROW_COUNT: usize = 7;

/// Separator used when joining roles into a composite key.
pub const KEY_SEPARATOR: &str = "_";

/// The fixed semantic role of each header row, in row order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    A,
    B,
    C,
    D,
    E,
    Type,
    Units,
}

impl Role {
    pub const ALL: [Role; HEADER_ROW_COUNT] = [
        Role::A,
        Role::B,
        Role::C,
        Role::D,
        Role::E,
        Role::Type,
        Role::Units,
    ];

    /// Header row holding this role.
    pub fn row(self) -> usize {
        self as usize
    }

    /// Label written in the index column of the role's header row.
    pub fn label(self) -> &'static str {
        match self {
            Role::A => "A",
            Role::B => "B",
            Role::C => "C",
            Role::D => "D",
            Role::E => "E",
            Role::Type => "TYPE",
            Role::Units => "UNITS",
        }
    }

    /// Whether `label` is acceptable for this role's row. Older exports
    /// label the TYPE row `F`.
    pub fn accepts_label(self, label: &str) -> bool {
        let label = label.trim();
        label.eq_ignore_ascii_case(self.label()) || (self == Role::Type && label == "F")
    }

    pub fn from_name(name: &str) -> Option<Role> {
        Role::ALL
            .iter()
            .copied()
            .find(|r| r.label().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Metadata of one data column, one field per role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub a: String,
    pub b: String,
    pub c: String,
    pub d: String,
    pub e: String,
    pub kind: String,
    pub units: String,
}

impl ColumnMeta {
    pub fn get(&self, role: Role) -> &str {
        match role {
            Role::A => &self.a,
            Role::B => &self.b,
            Role::C => &self.c,
            Role::D => &self.d,
            Role::E => &self.e,
            Role::Type => &self.kind,
            Role::Units => &self.units,
        }
    }

    /// Comparison identity: the `(B, C, E)` roles.
    ///
    /// Row E carries the store's F path part, so the display form is the
    /// same name the Level-0 exporter gives the series (`b_c_f`).
    pub fn composite_key(&self) -> ColumnKey {
        composite_key(self)
    }

    /// Level-2 identity: the `(C, B)` pair.
    pub fn part_c_b(&self) -> (&str, &str) {
        (&self.c, &self.b)
    }
}

/// Canonical comparison key of a column. Equality and ordering are on the
/// role tuple, so an `_` inside a part never merges two series; the joined
/// `B_C_E` text is only for display.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColumnKey {
    pub b: String,
    pub c: String,
    pub e: String,
}

impl ColumnKey {
    pub fn new(b: impl Into<String>, c: impl Into<String>, e: impl Into<String>) -> Self {
        Self {
            b: b.into(),
            c: c.into(),
            e: e.into(),
        }
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{KEY_SEPARATOR}{}{KEY_SEPARATOR}{}", self.b, self.c, self.e)
    }
}

/// See [`ColumnMeta::composite_key`]. Case-sensitive, no trimming.
pub fn composite_key(meta: &ColumnMeta) -> ColumnKey {
    ColumnKey::new(meta.b.as_str(), meta.c.as_str(), meta.e.as_str())
}

/// Per-column metadata, built once when a table is parsed.
///
/// Positions are zero-based over the data columns, so position `i` is raw
/// column `i + 1` (column 0 is the index).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetadataIndex {
    columns: Vec<ColumnMeta>,
}

impl MetadataIndex {
    /// Read every data column's role values out of the header rows.
    /// `header` must hold exactly [`HEADER_ROW_COUNT`] rows of equal width,
    /// which [`crate::table::HeaderedTable::parse`] guarantees.
    pub fn build(header: &[Vec<String>]) -> Self {
        let width = header.first().map_or(0, |r| r.len());
        let cell = |role: Role, col: usize| -> String {
            header
                .get(role.row())
                .and_then(|row| row.get(col))
                .cloned()
                .unwrap_or_default()
        };
        let columns = (1..width)
            .map(|col| ColumnMeta {
                a: cell(Role::A, col),
                b: cell(Role::B, col),
                c: cell(Role::C, col),
                d: cell(Role::D, col),
                e: cell(Role::E, col),
                kind: cell(Role::Type, col),
                units: cell(Role::Units, col),
            })
            .collect();
        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column(&self, pos: usize) -> Option<&ColumnMeta> {
        self.columns.get(pos)
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &ColumnMeta)> {
        self.columns.iter().enumerate()
    }

    pub fn value(&self, pos: usize, role: Role) -> Option<&str> {
        self.columns.get(pos).map(|m| m.get(role))
    }

    /// Composite keys in column order (duplicates included).
    pub fn composite_keys(&self) -> Vec<ColumnKey> {
        self.columns.iter().map(composite_key).collect()
    }

    /// First column position for every distinct composite key, plus the
    /// positions of later duplicates.
    pub fn key_positions(&self) -> (BTreeMap<ColumnKey, usize>, Vec<(ColumnKey, usize)>) {
        let mut first = BTreeMap::new();
        let mut duplicates = Vec::new();
        for (pos, meta) in self.iter() {
            let key = meta.composite_key();
            if first.contains_key(&key) {
                duplicates.push((key, pos));
            } else {
                first.insert(key, pos);
            }
        }
        (first, duplicates)
    }

    /// Role value → positions sharing it. Both levels are ordered: values
    /// lexicographically, positions ascending.
    pub fn group_by(&self, role: Role) -> BTreeMap<String, BTreeSet<usize>> {
        let mut groups: BTreeMap<String, BTreeSet<usize>> = BTreeMap::new();
        for (pos, meta) in self.iter() {
            groups.entry(meta.get(role).to_string()).or_default().insert(pos);
        }
        groups
    }

    /// Positions whose `role` equals `value`.
    pub fn lookup(&self, role: Role, value: &str) -> Vec<usize> {
        self.iter()
            .filter(|(_, m)| m.get(role) == value)
            .map(|(pos, _)| pos)
            .collect()
    }

    /// Keep only the positions listed, in the given order.
    pub(crate) fn select(&self, positions: &[usize]) -> Self {
        Self {
            columns: positions
                .iter()
                .filter_map(|&p| self.columns.get(p).cloned())
                .collect(),
        }
    }
}
