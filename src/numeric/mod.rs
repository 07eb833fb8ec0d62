//! Numeric profiles
//!
//! A run validates exactly one scalar element type. The profile fixes the
//! element width used on the device, the machine epsilon, and (through
//! [`tolerance`]) the default equality bound.

pub mod tolerance;

pub use tolerance::ToleranceSpec;

use num_traits::Float;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Scalar element type under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericProfile {
    /// IEEE-754 binary32
    Single,
    /// IEEE-754 binary64
    #[default]
    Double,
}

impl NumericProfile {
    /// Machine epsilon of the element type.
    pub fn machine_epsilon(self) -> f64 {
        match self {
            NumericProfile::Single => <f32 as Float>::epsilon() as f64,
            NumericProfile::Double => <f64 as Float>::epsilon(),
        }
    }

    /// Size of one element in device memory.
    pub fn element_size(self) -> usize {
        match self {
            NumericProfile::Single => std::mem::size_of::<f32>(),
            NumericProfile::Double => std::mem::size_of::<f64>(),
        }
    }

    /// Round `value` to the nearest representable element of this profile.
    pub fn quantize(self, value: f64) -> f64 {
        match self {
            NumericProfile::Single => value as f32 as f64,
            NumericProfile::Double => value,
        }
    }

    /// Whether the device must support 64-bit floating point.
    pub fn requires_fp64(self) -> bool {
        self == NumericProfile::Double
    }

    /// Default tolerance for this profile.
    pub fn default_tolerance(self) -> ToleranceSpec {
        ToleranceSpec::for_profile(self)
    }
}

impl fmt::Display for NumericProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumericProfile::Single => write!(f, "float"),
            NumericProfile::Double => write!(f, "double"),
        }
    }
}

impl FromStr for NumericProfile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "single" | "float" | "f32" => Ok(NumericProfile::Single),
            "double" | "f64" => Ok(NumericProfile::Double),
            other => Err(Error::config(format!("unknown numeric profile '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_epsilon() {
        assert_eq!(NumericProfile::Double.machine_epsilon(), f64::EPSILON);
        assert_eq!(NumericProfile::Single.machine_epsilon(), f32::EPSILON as f64);
    }

    #[test]
    fn test_element_size() {
        assert_eq!(NumericProfile::Single.element_size(), 4);
        assert_eq!(NumericProfile::Double.element_size(), 8);
    }

    #[test]
    fn test_quantize_single_rounds_through_f32() {
        let v = 0.1f64;
        assert_eq!(NumericProfile::Double.quantize(v), v);
        assert_eq!(NumericProfile::Single.quantize(v), 0.1f32 as f64);
        assert_ne!(NumericProfile::Single.quantize(v), v);
    }

    #[test]
    fn test_parse_profile() {
        assert_eq!("double".parse::<NumericProfile>().unwrap(), NumericProfile::Double);
        assert_eq!("F32".parse::<NumericProfile>().unwrap(), NumericProfile::Single);
        assert!("half".parse::<NumericProfile>().is_err());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&NumericProfile::Single).unwrap();
        assert_eq!(json, "\"single\"");
        let back: NumericProfile = serde_json::from_str("\"double\"").unwrap();
        assert_eq!(back, NumericProfile::Double);
    }
}
