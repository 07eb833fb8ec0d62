//! Fail-fast differential test orchestration
//!
//! A [`Runner`] drives each [`TestCase`] through the same pipeline: evaluate
//! the reference on a private copy of the inputs, upload the inputs to the
//! backend, submit the operation, wait on the barrier, read every output
//! back and compare it. The first numeric mismatch or backend failure stops
//! the run; a harness defect fails only its own case.
//!
//! # Example
//!
//! ```no_run
//! use fusion_oracle::backend::SimulatedDevice;
//! use fusion_oracle::device::{DeviceSelector, SimulatedPlatforms};
//! use fusion_oracle::numeric::NumericProfile;
//! use fusion_oracle::suite::{ConsoleReporter, Runner, Suite};
//!
//! let selector = DeviceSelector::new(&SimulatedPlatforms::default()).unwrap();
//! let device = SimulatedDevice::new(selector.activate(0).unwrap(), NumericProfile::Double).unwrap();
//! let mut runner = Runner::new(device, NumericProfile::Double);
//! let suites: Vec<Suite> = Vec::new();
//! let report = runner.run(&suites, &mut ConsoleReporter::stdout()).unwrap();
//! println!("{}", report);
//! ```

pub mod report;

pub use report::{
    CaseOutcome, CaseReport, ConsoleReporter, Reporter, RunReport, SilentReporter, SuiteReport,
};

use regex::Regex;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::backend::{Bindings, BufferUsage, KernelBackend};
use crate::buffer::{HostBuffer, Workspace};
use crate::compare::{compare, ComparisonResult};
use crate::error::Result;
use crate::expr::CustomOperation;
use crate::numeric::{NumericProfile, ToleranceSpec};
use crate::reference::ReferenceModel;

// ---------------------------------------------------------------------------
// TestCase / Suite
// ---------------------------------------------------------------------------

/// One operation checked against the reference.
#[derive(Debug, Clone)]
pub struct TestCase {
    pub name: String,
    pub operation: CustomOperation,
    /// Initial operand values, destinations included. Shared by every case
    /// of a suite; a run only ever copies the operands the case touches.
    pub inputs: Arc<Workspace>,
    /// Operands compared after the run, in order.
    pub outputs: Vec<String>,
    /// Overrides the runner's tolerance.
    pub tolerance: Option<ToleranceSpec>,
}

impl TestCase {
    /// Case whose outputs are the operation's destinations.
    pub fn new(
        name: impl Into<String>,
        operation: CustomOperation,
        inputs: impl Into<Arc<Workspace>>,
    ) -> Self {
        let outputs = operation
            .destinations()
            .into_iter()
            .map(|o| o.name.clone())
            .collect();
        Self {
            name: name.into(),
            operation,
            inputs: inputs.into(),
            outputs,
            tolerance: None,
        }
    }

    pub fn with_tolerance(mut self, tolerance: ToleranceSpec) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

}

/// Named, ordered group of cases sharing one setup.
#[derive(Debug, Clone)]
pub struct Suite {
    pub name: String,
    /// `(key, value)` lines describing the setup, printed in the suite banner.
    pub setup: Vec<(String, String)>,
    pub cases: Vec<TestCase>,
}

impl Suite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            setup: Vec::new(),
            cases: Vec::new(),
        }
    }

    pub fn with_setup(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.setup.push((key.into(), value.to_string()));
        self
    }

    pub fn add_case(&mut self, case: TestCase) {
        self.cases.push(case);
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Sequential fail-fast runner bound to one backend.
#[derive(Debug)]
pub struct Runner<B: KernelBackend> {
    backend: B,
    reference: ReferenceModel,
    tolerance: ToleranceSpec,
    filter: Option<Regex>,
}

impl<B: KernelBackend> Runner<B> {
    pub fn new(backend: B, profile: NumericProfile) -> Self {
        Self {
            backend,
            reference: ReferenceModel::new(profile),
            tolerance: profile.default_tolerance(),
            filter: None,
        }
    }

    /// Replace the default tolerance for cases that carry none.
    pub fn with_tolerance(mut self, tolerance: ToleranceSpec) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Only run cases whose name matches `filter`; the rest are skipped.
    pub fn with_filter(mut self, filter: Option<Regex>) -> Self {
        self.filter = filter;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run `suites` in order, stopping at the first fatal case outcome.
    ///
    /// Harness errors are recorded and the run moves on. Case failures are reported in the returned [`RunReport`]; an `Err`
    /// here means the reporter itself failed.
    pub fn run(&mut self, suites: &[Suite], reporter: &mut dyn Reporter) -> Result<RunReport> {
        let run_start = Instant::now();
        let mut report = RunReport::default();

        'suites: for suite in suites {
            info!(suite = %suite.name, cases = suite.cases.len(), "starting suite");
            reporter.suite_started(suite)?;
            let suite_start = Instant::now();
            let mut suite_report = SuiteReport::new(&suite.name);

            for case in &suite.cases {
                let case_report = if self.selected(case) {
                    reporter.case_started(case)?;
                    self.run_case(case)
                } else {
                    debug!(case = %case.name, "filtered out");
                    CaseReport::skipped(case)
                };
                reporter.case_finished(&case_report)?;
                report.record(&case_report);

                let failed = case_report.outcome.is_failure();
                let fatal = case_report.outcome.is_fatal();
                suite_report.cases.push(case_report);
                if failed && !fatal {
                    warn!(case = %case.name, "harness error, continuing with next case");
                }
                if fatal {
                    warn!(case = %case.name, "case failed, aborting run");
                    report.aborted_by = Some(case.name.clone());
                    suite_report.duration = suite_start.elapsed();
                    report.suites.push(suite_report);
                    break 'suites;
                }
            }
            suite_report.duration = suite_start.elapsed();
            report.suites.push(suite_report);
        }

        let planned: usize = suites.iter().map(|s| s.cases.len()).sum();
        report.not_run = planned - report.total;
        report.duration = run_start.elapsed();
        reporter.run_finished(&report)?;
        Ok(report)
    }

    fn selected(&self, case: &TestCase) -> bool {
        self.filter
            .as_ref()
            .map_or(true, |re| re.is_match(&case.name))
    }

    /// Run one case to completion and classify the result.
    pub fn run_case(&mut self, case: &TestCase) -> CaseReport {
        let start = Instant::now();
        let tolerance = case.tolerance.unwrap_or(self.tolerance);
        let (outcome, comparisons) = match self.check(case, tolerance) {
            Ok(comparisons) => {
                let outcome = match comparisons.iter().find(|(_, c)| !c.passed) {
                    Some((output, comparison)) => CaseOutcome::Mismatch {
                        output: output.clone(),
                        comparison: *comparison,
                        epsilon: tolerance.epsilon,
                    },
                    None => CaseOutcome::Passed,
                };
                (outcome, comparisons)
            }
            Err(e) => (
                CaseOutcome::HarnessError {
                    class: e.class(),
                    message: e.to_string(),
                },
                Vec::new(),
            ),
        };
        CaseReport {
            name: case.name.clone(),
            operation: case.operation.to_string(),
            outcome,
            comparisons,
            duration: start.elapsed(),
        }
    }

    fn check(
        &mut self,
        case: &TestCase,
        tolerance: ToleranceSpec,
    ) -> Result<Vec<(String, ComparisonResult)>> {
        let mut expected = working_set(case)?;
        self.reference.execute(&case.operation, &mut expected)?;

        let mut bindings = Bindings::new();
        let actual = self.run_on_device(case, &mut bindings);
        for buffer in bindings.into_buffers() {
            let id = buffer.id();
            if let Err(e) = self.backend.release(buffer) {
                warn!(case = %case.name, buffer = ?id, error = %e, "failed to release buffer");
            }
        }

        let mut comparisons = Vec::with_capacity(case.outputs.len());
        for (name, actual) in actual? {
            let result = compare(expected.get(&name)?, &actual, tolerance)?;
            debug!(case = %case.name, output = %name, result = %result, "compared");
            comparisons.push((name, result));
        }
        Ok(comparisons)
    }

    fn run_on_device(
        &mut self,
        case: &TestCase,
        bindings: &mut Bindings,
    ) -> Result<Vec<(String, HostBuffer)>> {
        let written: Vec<&str> = case
            .operation
            .destinations()
            .into_iter()
            .map(|o| o.name.as_str())
            .chain(case.outputs.iter().map(String::as_str))
            .collect();
        for name in case.operation.operands() {
            let usage = if written.contains(&name.as_str()) {
                BufferUsage::OUTPUT
            } else {
                BufferUsage::INPUT
            };
            let buffer = self.backend.upload(case.inputs.get(&name)?, usage)?;
            bindings.insert(name, buffer);
        }
        self.backend.execute(&case.operation, bindings)?;
        self.backend.finish()?;
        case.outputs
            .iter()
            .map(|name| {
                let host = self.backend.read_back(bindings.get(name)?)?;
                Ok((name.clone(), host))
            })
            .collect()
    }
}

/// Private copy of the operands `case` reads or writes.
fn working_set(case: &TestCase) -> Result<Workspace> {
    let mut set = Workspace::new();
    for name in case.operation.operands() {
        let buffer = case.inputs.get(&name)?.clone();
        set.insert(name, buffer);
    }
    Ok(set)
}
