//! Oracle configuration
//!
//! Every field has a default, so an empty JSON object (or no file at all) is
//! a complete configuration. Command-line flags are applied on top of the
//! loaded value and the result is checked once with
//! [`OracleConfig::validate`].

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::buffer::Layout;
use crate::device::{PlatformInfo, SimulatedPlatforms};
use crate::error::{Error, Result};
use crate::numeric::{NumericProfile, ToleranceSpec};

/// Test suites the catalog can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuiteKind {
    Vector,
    Matrix,
}

impl fmt::Display for SuiteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuiteKind::Vector => write!(f, "vector"),
            SuiteKind::Matrix => write!(f, "matrix"),
        }
    }
}

impl FromStr for SuiteKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "vector" => Ok(SuiteKind::Vector),
            "matrix" => Ok(SuiteKind::Matrix),
            other => Err(Error::config(format!("unknown suite '{}'", other))),
        }
    }
}

/// Matrix dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dims {
    pub rows: usize,
    pub cols: usize,
}

impl Dims {
    pub const fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }
}

impl fmt::Display for Dims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

/// Full run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Element type under test
    pub profile: NumericProfile,
    /// Relative-error bound; the profile default when absent
    pub tolerance: Option<f64>,
    /// Seed for the random input buffers
    pub seed: u64,
    pub vector_size: usize,
    pub matrix: Dims,
    /// Replication pattern; must tile `matrix` exactly
    pub pattern: Dims,
    pub layouts: Vec<Layout>,
    pub suites: Vec<SuiteKind>,
    /// Regex over case names; non-matching cases are skipped
    pub filter: Option<String>,
    /// Simulated device catalog
    pub platforms: Vec<PlatformInfo>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            profile: NumericProfile::Double,
            tolerance: None,
            seed: 42,
            vector_size: 256,
            matrix: Dims::new(1024, 1024),
            pattern: Dims::new(256, 128),
            layouts: vec![Layout::RowMajor, Layout::ColumnMajor],
            suites: vec![SuiteKind::Vector, SuiteKind::Matrix],
            filter: None,
            platforms: SimulatedPlatforms::default_catalog(),
        }
    }
}

impl OracleConfig {
    /// Parse a configuration from JSON text.
    pub fn load(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::config(format!("failed to parse configuration: {}", e)))
    }

    /// Read and parse a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::load(&text)
    }

    /// Check the configuration for values no run can use.
    pub fn validate(&self) -> Result<()> {
        if self.vector_size == 0 {
            return Err(Error::config("vector_size must be positive"));
        }
        for (what, d) in [("matrix", self.matrix), ("pattern", self.pattern)] {
            if d.rows == 0 || d.cols == 0 {
                return Err(Error::config(format!("{} dimensions must be positive, got {}", what, d)));
            }
        }
        if self.matrix.rows % self.pattern.rows != 0 || self.matrix.cols % self.pattern.cols != 0 {
            return Err(Error::config(format!(
                "pattern {} does not tile matrix {}",
                self.pattern, self.matrix
            )));
        }
        if self.suites.is_empty() {
            return Err(Error::config("no suites selected"));
        }
        if self.suites.contains(&SuiteKind::Matrix) && self.layouts.is_empty() {
            return Err(Error::config("matrix suite selected with no layouts"));
        }
        self.tolerance_spec()?;
        self.filter_regex()?;
        if self.platforms.iter().all(|p| p.devices.is_empty()) {
            return Err(Error::config("device catalog is empty"));
        }
        Ok(())
    }

    /// Tolerance in effect for this run.
    pub fn tolerance_spec(&self) -> Result<ToleranceSpec> {
        match self.tolerance {
            Some(eps) => ToleranceSpec::new(eps),
            None => Ok(self.profile.default_tolerance()),
        }
    }

    /// Compiled case-name filter.
    pub fn filter_regex(&self) -> Result<Option<Regex>> {
        self.filter
            .as_deref()
            .map(|pattern| {
                Regex::new(pattern)
                    .map_err(|e| Error::config(format!("invalid filter '{}': {}", pattern, e)))
            })
            .transpose()
    }

    /// Device enumerator over the configured catalog.
    pub fn enumerator(&self) -> SimulatedPlatforms {
        SimulatedPlatforms::new(self.platforms.clone())
    }

    /// Pattern replication factors `(m, n)` so that `repmat(P, m, n)` fills
    /// the matrix.
    pub fn replication(&self) -> (usize, usize) {
        (
            self.matrix.rows / self.pattern.rows,
            self.matrix.cols / self.pattern.cols,
        )
    }
}
