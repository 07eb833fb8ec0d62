//! Prelude module for convenient imports
//!
//! ```no_run
//! use fusion_oracle::prelude::*;
//!
//! let (w, x, y) = (Operand::vector("w"), Operand::vector("x"), Operand::vector("y"));
//! let op = CustomOperation::new().with(w.assign(&x + &y));
//! println!("{}", op);
//! ```

// Error handling
pub use crate::error::{Error, ErrorClass, Result};

// Buffers and expressions
pub use crate::buffer::{HostBuffer, Layout, Shape, Workspace};
pub use crate::expr::{
    diag, element_prod, exp, inner_prod, reduce_max, reduce_min, reduce_sum, repmat, shift,
    trans, CustomOperation, Expr, Operand, Statement,
};
pub use crate::numeric::{NumericProfile, ToleranceSpec};

// Oracle
pub use crate::catalog::build_suites;
pub use crate::compare::{compare, ComparisonResult};
pub use crate::reference::ReferenceModel;
pub use crate::suite::{ConsoleReporter, Reporter, RunReport, Runner, Suite, TestCase};

// Devices and backends
pub use crate::backend::{Bindings, KernelBackend, SimulatedDevice};
pub use crate::config::OracleConfig;
pub use crate::device::{ActiveDevice, DeviceSelector, SimulatedPlatforms};
