//! Host reference model
//!
//! Computes the exact mathematical result of each expression on the host,
//! one statement at a time in declared order. A statement sees the values
//! written by earlier statements of the same [`CustomOperation`] and the
//! pre-operation values of everything else.

pub mod ops;

use tracing::trace;

use crate::buffer::{HostBuffer, Workspace};
use crate::error::{Error, Result};
use crate::expr::{AssignOp, BinaryOp, CustomOperation, Expr, Statement};
use crate::numeric::NumericProfile;

/// Sequential host evaluator for a single numeric profile.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceModel {
    profile: NumericProfile,
}

impl ReferenceModel {
    pub fn new(profile: NumericProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> NumericProfile {
        self.profile
    }

    /// Evaluate `expr` against `env` without modifying it.
    pub fn evaluate(&self, expr: &Expr, env: &Workspace) -> Result<HostBuffer> {
        match expr {
            Expr::Operand(o) => Ok(env.resolve(o)?.clone()),
            Expr::Literal(v) => Ok(HostBuffer::scalar(self.profile.quantize(*v))),
            Expr::Unary { op, arg } => Ok(ops::unary(*op, &self.evaluate(arg, env)?)),
            Expr::Binary { op, lhs, rhs } => {
                let l = self.evaluate(lhs, env)?;
                let r = self.evaluate(rhs, env)?;
                ops::binary(*op, &l, &r)
            }
            Expr::Shift { arg, offset } => ops::shift(&self.evaluate(arg, env)?, *offset),
            Expr::Repmat { arg, rows, cols } => {
                ops::repmat(&self.evaluate(arg, env)?, *rows, *cols)
            }
            Expr::Trans(arg) => ops::trans(&self.evaluate(arg, env)?),
            Expr::Diag(arg) => ops::diag(&self.evaluate(arg, env)?),
            Expr::Reduce { op, arg } => ops::reduce(*op, &self.evaluate(arg, env)?),
            Expr::InnerProd { lhs, rhs } => {
                let l = self.evaluate(lhs, env)?;
                let r = self.evaluate(rhs, env)?;
                ops::inner_prod(&l, &r)
            }
        }
    }

    /// Run one statement and store its result in `env`.
    pub fn execute_statement(&self, statement: &Statement, env: &mut Workspace) -> Result<()> {
        let dest = env.resolve(&statement.dest)?;
        let value = self.evaluate(&statement.value, env)?;
        let value = match statement.op {
            AssignOp::Assign => value,
            AssignOp::AddAssign => ops::binary(BinaryOp::Add, dest, &value)?,
        };
        let stored = store(dest, &value, &statement.to_string())?.quantized(self.profile);
        trace!(statement = %statement, "reference statement evaluated");
        env.insert(statement.dest.name.clone(), stored);
        Ok(())
    }

    /// Run every statement of `op` in order.
    pub fn execute(&self, op: &CustomOperation, env: &mut Workspace) -> Result<()> {
        if op.is_empty() {
            return Err(Error::invalid_expression("custom operation has no statements"));
        }
        for statement in op.statements() {
            self.execute_statement(statement, env)?;
        }
        Ok(())
    }
}

/// Fit `value` into the destination's shape.
///
/// Scalars broadcast into any destination; otherwise dimensions must match
/// and the value is re-laid-out into the destination's storage order.
fn store(dest: &HostBuffer, value: &HostBuffer, what: &str) -> Result<HostBuffer> {
    let target = dest.shape();
    if value.shape().is_scalar() && !target.is_scalar() {
        let v = value.scalar_value()?;
        return Ok(HostBuffer::zeros(target).map(|_| v));
    }
    if !value.shape().same_dims(&target) {
        return Err(Error::shape_mismatch(what, target, value.shape()));
    }
    value.relayout(target)
}
