//! Case outcomes, run reports, and console output.

use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

use super::{Suite, TestCase};
use crate::compare::ComparisonResult;
use crate::error::{Error, ErrorClass, Result};

// ---------------------------------------------------------------------------
// CaseOutcome
// ---------------------------------------------------------------------------

/// Result of one test case.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseOutcome {
    /// Every output within tolerance.
    Passed,
    /// `output` exceeded the tolerance.
    Mismatch {
        output: String,
        comparison: ComparisonResult,
        epsilon: f64,
    },
    /// The case could not be evaluated; `class` says which side failed.
    HarnessError { class: ErrorClass, message: String },
    /// Excluded by the case filter.
    Skipped,
}

impl CaseOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            CaseOutcome::Mismatch { .. } | CaseOutcome::HarnessError { .. }
        )
    }

    /// Whether this outcome stops the run.
    ///
    /// A harness defect only invalidates its own case; numeric mismatches
    /// and backend failures abort everything after them.
    pub fn is_fatal(&self) -> bool {
        match self {
            CaseOutcome::Mismatch { .. } => true,
            CaseOutcome::HarnessError { class, .. } => *class != ErrorClass::Harness,
            CaseOutcome::Passed | CaseOutcome::Skipped => false,
        }
    }
}

impl fmt::Display for CaseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseOutcome::Passed => write!(f, "PASSED"),
            CaseOutcome::Mismatch {
                output,
                comparison,
                epsilon,
            } => write!(
                f,
                "MISMATCH in '{}': max relative error {:e} exceeds {:e}",
                output, comparison.max_relative_error, epsilon
            ),
            CaseOutcome::HarnessError { class, message } => write!(f, "{}: {}", class, message),
            CaseOutcome::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// Report for one executed (or skipped) case.
#[derive(Debug, Clone)]
pub struct CaseReport {
    pub name: String,
    /// Rendered operation, as announced before execution.
    pub operation: String,
    pub outcome: CaseOutcome,
    /// Per-output comparison, in output order.
    pub comparisons: Vec<(String, ComparisonResult)>,
    pub duration: Duration,
}

impl CaseReport {
    pub fn skipped(case: &TestCase) -> Self {
        Self {
            name: case.name.clone(),
            operation: case.operation.to_string(),
            outcome: CaseOutcome::Skipped,
            comparisons: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    /// Largest relative error over all compared outputs.
    pub fn max_relative_error(&self) -> Option<f64> {
        self.comparisons
            .iter()
            .map(|(_, c)| c.max_relative_error)
            .reduce(f64::max)
    }

    /// Numeric mismatches as a typed error. Other failures are already
    /// rendered into the outcome message.
    pub fn error(&self) -> Option<Error> {
        match &self.outcome {
            CaseOutcome::Mismatch {
                comparison,
                epsilon,
                ..
            } => Some(Error::NumericMismatch {
                case: self.name.clone(),
                max_relative_error: comparison.max_relative_error,
                epsilon: *epsilon,
            }),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// SuiteReport / RunReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SuiteReport {
    pub name: String,
    pub cases: Vec<CaseReport>,
    pub duration: Duration,
}

impl SuiteReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cases: Vec::new(),
            duration: Duration::ZERO,
        }
    }
}

/// Summary of a whole run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Cases reached, skipped ones included.
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Cases never reached because the run aborted.
    pub not_run: usize,
    /// Name of the case that stopped the run.
    pub aborted_by: Option<String>,
    pub duration: Duration,
    pub suites: Vec<SuiteReport>,
}

impl RunReport {
    pub(crate) fn record(&mut self, case: &CaseReport) {
        self.total += 1;
        match case.outcome {
            CaseOutcome::Passed => self.passed += 1,
            CaseOutcome::Skipped => self.skipped += 1,
            _ => self.failed += 1,
        }
    }

    pub fn success(&self) -> bool {
        self.failed == 0 && self.aborted_by.is_none()
    }

    pub fn first_failure(&self) -> Option<&CaseReport> {
        self.suites
            .iter()
            .flat_map(|s| &s.cases)
            .find(|c| c.outcome.is_failure())
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(f, "  Oracle Report")?;
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;

        for suite in &self.suites {
            writeln!(f, "\n  {} ({:?})", suite.name, suite.duration)?;
            for case in &suite.cases {
                let icon = match case.outcome {
                    CaseOutcome::Passed => "✓",
                    CaseOutcome::Mismatch { .. } | CaseOutcome::HarnessError { .. } => "✗",
                    CaseOutcome::Skipped => "○",
                };
                write!(f, "    {} {}", icon, case.name)?;
                if let Some(err) = case.max_relative_error() {
                    write!(f, " [max rel. error {:e}]", err)?;
                }
                writeln!(f, " ({:?})", case.duration)?;
                if case.outcome.is_failure() {
                    writeln!(f, "      {}", case.outcome)?;
                }
            }
        }

        writeln!(f, "\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(
            f,
            "  Total: {}  Passed: {}  Failed: {}  Skipped: {}  Not run: {}",
            self.total, self.passed, self.failed, self.skipped, self.not_run
        )?;
        writeln!(f, "  Duration: {:?}", self.duration)?;
        match &self.aborted_by {
            Some(case) => writeln!(f, "  Result: FAILED (aborted at '{}')", case)?,
            None if self.failed > 0 => writeln!(f, "  Result: FAILED")?,
            None => writeln!(f, "  Result: PASSED")?,
        }
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Reporters
// ---------------------------------------------------------------------------

/// Progress callbacks from a [`Runner`](super::Runner).
pub trait Reporter {
    fn suite_started(&mut self, _suite: &Suite) -> Result<()> {
        Ok(())
    }

    /// Called before a selected case runs.
    fn case_started(&mut self, _case: &TestCase) -> Result<()> {
        Ok(())
    }

    fn case_finished(&mut self, _report: &CaseReport) -> Result<()> {
        Ok(())
    }

    fn run_finished(&mut self, _report: &RunReport) -> Result<()> {
        Ok(())
    }
}

/// Reporter that prints nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentReporter;

impl Reporter for SilentReporter {}

/// Human-readable progress on any writer.
#[derive(Debug)]
pub struct ConsoleReporter<W: Write> {
    out: W,
}

impl ConsoleReporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

const RULE: &str = "----------------------------------------------";

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn suite_started(&mut self, suite: &Suite) -> Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "{}", RULE)?;
        writeln!(self.out, "## Test :: {}", suite.name)?;
        writeln!(self.out, "{}", RULE)?;
        for (key, value) in &suite.setup {
            writeln!(self.out, "  {:<10} {}", format!("{}:", key), value)?;
        }
        writeln!(self.out)?;
        Ok(())
    }

    fn case_started(&mut self, case: &TestCase) -> Result<()> {
        write!(self.out, "Testing {}... ", case.operation)?;
        self.out.flush()?;
        Ok(())
    }

    fn case_finished(&mut self, report: &CaseReport) -> Result<()> {
        match &report.outcome {
            CaseOutcome::Passed => writeln!(self.out, "OK")?,
            CaseOutcome::Skipped => writeln!(self.out, "Skipping {}", report.name)?,
            CaseOutcome::Mismatch { .. } => {
                writeln!(self.out, "FAILED")?;
                writeln!(self.out, "# Error at operation: {}", report.name)?;
                if let Some(err) = report.max_relative_error() {
                    writeln!(self.out, "  diff: {:e}", err)?;
                }
                writeln!(self.out, "  {}", report.outcome)?;
            }
            CaseOutcome::HarnessError { .. } => {
                writeln!(self.out, "ERROR")?;
                writeln!(self.out, "# Error at operation: {}", report.name)?;
                writeln!(self.out, "  {}", report.outcome)?;
            }
        }
        Ok(())
    }

    fn run_finished(&mut self, report: &RunReport) -> Result<()> {
        write!(self.out, "{}", report)?;
        writeln!(self.out)?;
        writeln!(self.out, "{}", RULE)?;
        match &report.aborted_by {
            Some(case) => writeln!(self.out, "## Test FAILED at '{}'", case)?,
            None if !report.success() => {
                writeln!(self.out, "## Test FAILED ({} case(s) in error)", report.failed)?
            }
            None => writeln!(self.out, "## Test completed successfully")?,
        }
        writeln!(self.out, "{}", RULE)?;
        self.out.flush()?;
        Ok(())
    }
}
