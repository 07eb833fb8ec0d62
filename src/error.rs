//! Error types for the fusion oracle

use std::fmt;
use thiserror::Error;

use crate::buffer::Shape;

/// Broad classification of an [`Error`], used when reporting a case outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed invocation or configuration
    Usage,
    /// The requested device does not exist
    Device,
    /// The oracle itself was handed something it cannot evaluate
    Harness,
    /// Reference and device results disagree
    Numeric,
    /// The backend under test failed while running work
    Execution,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Usage => write!(f, "usage error"),
            ErrorClass::Device => write!(f, "device error"),
            ErrorClass::Harness => write!(f, "harness error"),
            ErrorClass::Numeric => write!(f, "numeric mismatch"),
            ErrorClass::Execution => write!(f, "device execution failure"),
        }
    }
}

/// Main error type for the oracle
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed command-line invocation
    #[error("UsageError: {0}")]
    Usage(String),

    /// Requested ordinal exceeds the enumerated devices
    #[error("DeviceNotFound: ordinal {ordinal} requested but only {available} device(s) available")]
    DeviceNotFound { ordinal: usize, available: usize },

    /// Operands of an operation have incompatible shapes
    #[error("ShapeMismatch: {operation} cannot combine {left} with {right}")]
    ShapeMismatch {
        operation: String,
        left: Shape,
        right: Shape,
    },

    /// Device result differs from the reference beyond tolerance
    #[error("NumericMismatch: {case}: max relative error {max_relative_error:e} exceeds {epsilon:e}")]
    NumericMismatch {
        case: String,
        max_relative_error: f64,
        epsilon: f64,
    },

    /// Failure reported by the backend under test
    #[error("DeviceExecutionFailure: {0}")]
    DeviceExecution(String),

    /// Expression the reference model cannot evaluate
    #[error("InvalidExpression: {0}")]
    InvalidExpression(String),

    /// Expression names an operand that was never bound
    #[error("UnknownOperand: '{0}' is not bound")]
    UnknownOperand(String),

    /// Invalid configuration value or file
    #[error("ConfigError: {0}")]
    Config(String),

    /// IO error
    #[error("IOError: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl Error {
    /// Create a shape mismatch for `operation`.
    pub fn shape_mismatch(operation: impl Into<String>, left: Shape, right: Shape) -> Self {
        Error::ShapeMismatch {
            operation: operation.into(),
            left,
            right,
        }
    }

    /// Create an invalid-expression error
    pub fn invalid_expression(message: impl Into<String>) -> Self {
        Error::InvalidExpression(message.into())
    }

    /// Create a device execution failure
    pub fn device(message: impl Into<String>) -> Self {
        Error::DeviceExecution(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Usage(_) | Error::Config(_) | Error::Io { .. } => ErrorClass::Usage,
            Error::DeviceNotFound { .. } => ErrorClass::Device,
            Error::ShapeMismatch { .. }
            | Error::InvalidExpression(_)
            | Error::UnknownOperand(_) => ErrorClass::Harness,
            Error::NumericMismatch { .. } => ErrorClass::Numeric,
            Error::DeviceExecution(_) => ErrorClass::Execution,
        }
    }

    /// True when the oracle, not the backend, is at fault.
    pub fn is_harness_defect(&self) -> bool {
        self.class() == ErrorClass::Harness
    }

    /// Process exit status for a run that terminated with this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Usage(_) => 2,
            Error::DeviceNotFound { .. } => 3,
            Error::Config(_) | Error::Io { .. } => 4,
            _ => 1,
        }
    }
}

/// Result type alias for oracle operations
pub type Result<T> = std::result::Result<T, Error>;
