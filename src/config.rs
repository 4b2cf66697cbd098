// src/config.rs

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tracing::{debug, info};

use crate::compare::{CompareOptions, ReportCaps, Tolerance, UnparseablePolicy, DEFAULT_RTOL};
use crate::error::{Error, Result};
use crate::levels::filter::{DropRules, DEFAULT_DROP_PATTERNS};
use crate::levels::level0::Level0Options;

/// Tunables shared by the binaries. Every field has a default, so an empty
/// or absent settings file means "use the defaults".
///
/// ```yaml
/// rtol: 1.0e-5
/// drop_patterns: ["_SYS$", "_VAL$"]
/// unparseable: treat_as_missing   # or skip_column
/// report:
///   detail_columns: 10
///   sample_timestamps: 3
/// level0:
///   missing_sentinel: -901.0
///   window_start: 1921-10-31
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub rtol: f64,
    pub drop_patterns: Vec<String>,
    pub unparseable: UnparseablePolicy,
    pub report: ReportCaps,
    pub level0: Level0Options,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rtol: DEFAULT_RTOL,
            drop_patterns: DEFAULT_DROP_PATTERNS.iter().map(|p| p.to_string()).collect(),
            unparseable: UnparseablePolicy::default(),
            report: ReportCaps::default(),
            level0: Level0Options::default(),
        }
    }
}

impl Settings {
    /// Defaults when `path` is `None`; otherwise the file must exist and parse.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            debug!("no settings file, using defaults");
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read settings {}: {e}", path.display()))
        })?;
        let settings = Self::from_yaml_str(&text).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {msg}", path.display())),
            other => other,
        })?;
        info!(path = %path.display(), rtol = settings.rtol, "loaded settings");
        Ok(settings)
    }

    /// Malformed YAML, unknown keys and out-of-range values are all
    /// [`Error::Config`].
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Self = serde_yaml::from_str(text)
            .map_err(|e| Error::Config(format!("invalid settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if !self.rtol.is_finite() || self.rtol < 0.0 {
            return Err(Error::Config(format!(
                "rtol must be a finite, non-negative number, got {}",
                self.rtol
            )));
        }
        Ok(())
    }

    pub fn compare_options(&self) -> CompareOptions {
        CompareOptions {
            tolerance: Tolerance::new(self.rtol),
            unparseable: self.unparseable,
        }
    }

    pub fn drop_rules(&self) -> Result<DropRules> {
        DropRules::new(&self.drop_patterns)
    }
}
