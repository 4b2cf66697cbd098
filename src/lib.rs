// src/lib.rs
//! Headered time-series tables: parse, filter into levels, and compare.
//!
//! A table is a CSV whose first seven rows carry per-column metadata
//! (roles A, B, C, D, E, TYPE, UNITS) followed by timestamped rows of
//! numeric values. [`levels`] derives smaller tables from a store export;
//! [`compare`] checks two tables against each other within a tolerance.

pub mod compare;
pub mod config;
pub mod error;
pub mod levels;
pub mod table;
pub mod validate;

pub use compare::{compare_tables, CompareOptions, ComparisonOutcome, ComparisonReport};
pub use config::Settings;
pub use error::{Error, Result};
pub use levels::{derive_level, AllowList, DropRules, LevelFilterSpec};
pub use table::{HeaderedTable, MetadataIndex, Role, Value};
pub use validate::{validate_level0, ValidateOptions, ValidationReport};
