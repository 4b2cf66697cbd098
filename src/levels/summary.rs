// src/levels/summary.rs

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::{fmt, fs, path::Path};
use tracing::{debug, instrument};

use super::filter::KeepMask;
use crate::error::{Error, Result};
use crate::table::{MetadataIndex, Role};

/// Part C → sorted, de-duplicated part B values of the surviving columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectionSummary {
    pub groups: BTreeMap<String, BTreeSet<String>>,
}

impl SelectionSummary {
    pub fn part_c_count(&self) -> usize {
        self.groups.len()
    }

    pub fn series_count(&self) -> usize {
        self.groups.values().map(BTreeSet::len).sum()
    }
}

/// `C:` header then one indented B per line, blank line between groups.
impl fmt::Display for SelectionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (c, bs) in &self.groups {
            writeln!(f, "{c}:")?;
            for b in bs {
                writeln!(f, "  {b}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Group the columns kept by `mask` by role C. Read-only view.
pub fn summary_by_partc(index: &MetadataIndex, mask: &KeepMask) -> SelectionSummary {
    let mut groups: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (pos, meta) in index.iter() {
        if mask.keeps(pos) {
            groups
                .entry(meta.get(Role::C).to_string())
                .or_default()
                .insert(meta.get(Role::B).to_string());
        }
    }
    SelectionSummary { groups }
}

/// Every part C with every part B it carries.
pub fn map_c_to_b(index: &MetadataIndex) -> SelectionSummary {
    summary_by_partc(index, &KeepMask::all(index.len()))
}

/// Sorted unique part C values.
pub fn list_part_c(index: &MetadataIndex) -> Vec<String> {
    index.group_by(Role::C).into_keys().collect()
}

/// Save the rendered summary as a text file, creating parent directories.
#[instrument(level = "debug", skip(summary), fields(path = %path.display()))]
pub fn write_summary(summary: &SelectionSummary, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    }
    fs::write(path, summary.to_string()).map_err(|e| Error::io(path, e))?;
    debug!(groups = summary.part_c_count(), "wrote summary");
    Ok(())
}
