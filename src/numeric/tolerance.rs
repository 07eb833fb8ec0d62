//! Tolerance policy: what "equal" means for a numeric profile.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::NumericProfile;
use crate::error::{Error, Result};

/// Default relative-error bound for double precision runs.
pub const DOUBLE_EPSILON: f64 = 1.0E-4;

/// Default relative-error bound for single precision runs.
pub const SINGLE_EPSILON: f64 = 1.0E-3;

/// A single relative-error bound applied to every element of a result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToleranceSpec {
    pub epsilon: f64,
}

impl ToleranceSpec {
    /// Build a tolerance from an explicit bound.
    ///
    /// The bound must be finite and strictly positive.
    pub fn new(epsilon: f64) -> Result<Self> {
        if !epsilon.is_finite() || epsilon <= 0.0 {
            return Err(Error::config(format!(
                "tolerance must be a positive finite number, got {}",
                epsilon
            )));
        }
        Ok(Self { epsilon })
    }

    /// Default tolerance for `profile`.
    pub fn for_profile(profile: NumericProfile) -> Self {
        let epsilon = match profile {
            NumericProfile::Double => DOUBLE_EPSILON,
            NumericProfile::Single => SINGLE_EPSILON,
        };
        Self { epsilon }
    }

    /// Whether a measured relative error is within bounds.
    pub fn accepts(&self, relative_error: f64) -> bool {
        relative_error <= self.epsilon
    }
}

impl Default for ToleranceSpec {
    fn default() -> Self {
        Self::for_profile(NumericProfile::default())
    }
}

impl fmt::Display for ToleranceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:e}", self.epsilon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_default_is_1e4() {
        assert_eq!(ToleranceSpec::for_profile(NumericProfile::Double).epsilon, 1.0E-4);
        assert_eq!(ToleranceSpec::default().epsilon, 1.0E-4);
    }

    #[test]
    fn test_single_default_is_looser() {
        let single = ToleranceSpec::for_profile(NumericProfile::Single);
        let double = ToleranceSpec::for_profile(NumericProfile::Double);
        assert!(single.epsilon > double.epsilon);
    }

    #[test]
    fn test_accepts_is_inclusive() {
        let tol = ToleranceSpec::new(1e-4).unwrap();
        assert!(tol.accepts(1e-4));
        assert!(tol.accepts(0.0));
        assert!(!tol.accepts(1.1e-4));
        assert!(!tol.accepts(f64::NAN));
    }

    #[test]
    fn test_rejects_invalid_bounds() {
        assert!(ToleranceSpec::new(0.0).is_err());
        assert!(ToleranceSpec::new(-1.0).is_err());
        assert!(ToleranceSpec::new(f64::INFINITY).is_err());
        assert!(ToleranceSpec::new(f64::NAN).is_err());
    }
}
