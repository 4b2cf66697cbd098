// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Fatal failures of the table engine.
///
/// Expected business outcomes (no common columns, no overlapping window,
/// a column whose values do not parse) are not errors; they are carried in
/// [`crate::compare::ComparisonOutcome`] and [`crate::compare::ColumnWarning`].
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed header block, inconsistent row width or bad timestamp.
    /// `row` is the zero-based row of the raw input, when one is to blame.
    #[error("format error{}: {message}", .row.map(|r| format!(" at row {r}")).unwrap_or_default())]
    Format { row: Option<usize>, message: String },

    /// Missing or malformed configuration (Level-2 allow-list, settings file).
    #[error("configuration error: {0}")]
    Config(String),

    /// A drop pattern that is not a valid regular expression.
    #[error("invalid drop pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The time-series store could not list or read a path.
    #[error("store error for `{path}`: {message}")]
    Store { path: String, message: String },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn format(row: Option<usize>, message: impl Into<String>) -> Self {
        Error::Format {
            row,
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
