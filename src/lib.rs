//! Fusion Oracle: differential-correctness testing for fused linear-algebra kernels
//!
//! The oracle checks that a kernel-generating backend computes the same
//! results as a plain sequential host reference, over a catalog of vector and
//! matrix expressions, on one selected compute device.
//!
//! # Quick Start
//!
//! ```no_run
//! use fusion_oracle::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let config = OracleConfig::default();
//!     let selector = DeviceSelector::new(&config.enumerator())?;
//!     let device = SimulatedDevice::new(selector.activate(0)?, config.profile)?;
//!     let mut runner = Runner::new(device, config.profile);
//!     let report = runner.run(&build_suites(&config), &mut ConsoleReporter::stdout())?;
//!     assert!(report.success());
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! Each case flows: [`catalog`] → [`reference`] ∥ [`backend`] → [`compare`] → [`suite`]
//!
//! | Category | Modules |
//! |----------|---------|
//! | **Data** | [`buffer`], [`expr`], [`numeric`] |
//! | **Oracle** | [`reference`], [`compare`], [`suite`], [`catalog`] |
//! | **Device** | [`device`], [`backend`] |
//! | **Setup** | [`config`], [`error`](Error) |

pub mod backend;
pub mod buffer;
pub mod catalog;
pub mod compare;
pub mod config;
pub mod device;
pub mod expr;
pub mod numeric;
pub mod prelude;
pub mod reference;
pub mod suite;

mod error;

pub use error::{Error, ErrorClass, Result};

/// Fusion Oracle version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
