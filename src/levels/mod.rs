// src/levels/mod.rs
//! Progressively smaller "levels" of the same table.
//!
//! ```text
//!   store ──build_level0──▶ Level 0 ──DropRules──▶ Level 1
//!                              │
//!                              └────AllowList──▶ Level 2
//! ```
//!
//! Each transition is one explicit call; nothing chains implicitly.

pub mod filter;
pub mod level0;
pub mod summary;

use serde::Serialize;
use tracing::{info, instrument};

use crate::error::Result;
use crate::table::{HeaderedTable, MetadataIndex};
pub use filter::{apply, AllowList, DropRules, KeepMask, DEFAULT_DROP_PATTERNS};
pub use level0::{
    build_level0, normalize_record, Level0Options, MemoryStore, SeriesRecord, SeriesStore,
    StorePath, ALL_PATHS, STORE_MISSING_SENTINEL,
};
pub use summary::{list_part_c, map_c_to_b, summary_by_partc, write_summary, SelectionSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Level {
    /// Raw store export.
    Raw = 0,
    /// Pattern-dropped.
    Dropped = 1,
    /// Allow-listed.
    Allowed = 2,
}

/// A column selection rule for one level transition.
#[derive(Debug, Clone)]
pub enum LevelFilterSpec {
    Drop(DropRules),
    Allow(AllowList),
}

impl LevelFilterSpec {
    /// Level the filtered table belongs to.
    pub fn level(&self) -> Level {
        match self {
            LevelFilterSpec::Drop(_) => Level::Dropped,
            LevelFilterSpec::Allow(_) => Level::Allowed,
        }
    }

    pub fn mask(&self, index: &MetadataIndex) -> KeepMask {
        match self {
            LevelFilterSpec::Drop(rules) => rules.mask(index),
            LevelFilterSpec::Allow(allow) => allow.mask(index),
        }
    }
}

/// Filtered table plus the grouping report of what survived.
#[derive(Debug, Clone)]
pub struct LevelOutput {
    pub level: Level,
    pub table: HeaderedTable,
    pub mask: KeepMask,
    pub summary: SelectionSummary,
}

/// Derive the next level of `table` under `spec`. The input is untouched.
#[instrument(level = "info", skip_all, fields(level = ?spec.level()))]
pub fn derive_level(table: &HeaderedTable, spec: &LevelFilterSpec) -> Result<LevelOutput> {
    let mask = spec.mask(table.metadata());
    let filtered = apply(table, &mask)?;
    let summary = summary_by_partc(table.metadata(), &mask);
    info!(
        kept = mask.kept_count(),
        dropped = mask.len() - mask.kept_count(),
        "derived level"
    );
    Ok(LevelOutput {
        level: spec.level(),
        table: filtered,
        mask,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::tests::table;
    use anyhow::Result;

    #[test]
    fn level_one_then_two() -> Result<()> {
        let l0 = table(
            &["2000-01-31", "2000-02-29"],
            &[
                ("GAGE1", "FLOW", "F", &["1", "2"]),
                ("GAGE1_SYS", "FLOW", "F", &["3", "4"]),
                ("GAGE2", "FLOW", "F", &["5", "6"]),
                ("S_SHSTA", "STORAGE", "F", &["7", "8"]),
            ],
        );
        let l1 = derive_level(&l0, &LevelFilterSpec::Drop(DropRules::defaults()))?;
        assert_eq!(l1.level, Level::Dropped);
        assert_eq!(l1.table.column_count(), 3);
        assert_eq!(l1.summary.series_count(), 3);

        let allow = AllowList::from_yaml_str("FLOW: [GAGE1]\nSTORAGE: [S_SHSTA]\n")?;
        let l2 = derive_level(&l1.table, &LevelFilterSpec::Allow(allow))?;
        assert_eq!(l2.level, Level::Allowed);
        let bs: Vec<_> = l2.table.metadata().iter().map(|(_, m)| m.b.as_str()).collect();
        assert_eq!(bs, ["GAGE1", "S_SHSTA"]);
        // rows and index untouched
        assert_eq!(l2.table.rows().len(), 2);
        assert_eq!(l2.table.rows()[1].cells(), &["2".to_string(), "8".to_string()]);
        // input not mutated
        assert_eq!(l0.column_count(), 4);
        Ok(())
    }
}
