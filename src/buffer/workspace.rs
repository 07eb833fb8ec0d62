//! Named host buffers owned by one test case.

use std::collections::BTreeMap;

use super::{HostBuffer, Shape};
use crate::error::{Error, Result};
use crate::expr::{Operand, OperandKind};

/// Set of named [`HostBuffer`]s.
///
/// Each test case builds its own workspace; buffers are never shared between
/// cases.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workspace {
    buffers: BTreeMap<String, HostBuffer>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, buffer: HostBuffer) -> Self {
        self.insert(name, buffer);
        self
    }

    /// Bind `name`, replacing any previous buffer.
    pub fn insert(&mut self, name: impl Into<String>, buffer: HostBuffer) {
        self.buffers.insert(name.into(), buffer);
    }

    pub fn get(&self, name: &str) -> Result<&HostBuffer> {
        self.buffers
            .get(name)
            .ok_or_else(|| Error::UnknownOperand(name.to_string()))
    }

    /// Look up `operand` and check that its binding matches the declared kind.
    pub fn resolve(&self, operand: &Operand) -> Result<&HostBuffer> {
        let buffer = self.get(&operand.name)?;
        check_kind(operand, buffer.shape())?;
        Ok(buffer)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.buffers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HostBuffer)> {
        self.buffers.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Verify that a bound shape agrees with an operand's declared kind.
pub fn check_kind(operand: &Operand, shape: Shape) -> Result<()> {
    let ok = matches!(
        (operand.kind, shape),
        (OperandKind::Scalar, Shape::Scalar)
            | (OperandKind::Vector, Shape::Vector(_))
            | (OperandKind::Matrix, Shape::Matrix { .. })
    );
    if ok {
        Ok(())
    } else {
        Err(Error::invalid_expression(format!(
            "'{}' is declared as a {} but bound to {}",
            operand.name, operand.kind, shape
        )))
    }
}
