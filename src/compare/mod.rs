//! Tolerance-based comparison of reference and device results
//!
//! The metric is the maximum per-element relative error (an L∞ norm), so one
//! badly wrong element cannot hide behind many good ones. There is no
//! absolute-error floor: a tiny nonzero reference compared against zero
//! yields a relative error of 1.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::buffer::HostBuffer;
use crate::error::{Error, Result};
use crate::numeric::ToleranceSpec;

/// Outcome of comparing one reference buffer against one device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub max_relative_error: f64,
    pub passed: bool,
    /// Storage offset of the element with the largest error.
    pub worst_index: Option<usize>,
    /// Number of elements compared.
    pub elements: usize,
}

impl fmt::Display for ComparisonResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.passed { "ok" } else { "MISMATCH" };
        write!(f, "{} (max rel. error {:e}", verdict, self.max_relative_error)?;
        if let Some(i) = self.worst_index {
            write!(f, " at element {}", i)?;
        }
        write!(f, ")")
    }
}

/// `|reference - actual| / max(|reference|, |actual|)`, or 0 when both are 0.
///
/// Equal values (including equal infinities) compare as 0. Any NaN, or a
/// non-finite difference, compares as infinitely wrong.
pub fn relative_error(reference: f64, actual: f64) -> f64 {
    if reference == actual {
        return 0.0;
    }
    let denom = reference.abs().max(actual.abs());
    if denom == 0.0 {
        return 0.0;
    }
    let err = (reference - actual).abs() / denom;
    if err.is_nan() {
        f64::INFINITY
    } else {
        err
    }
}

/// Compare two buffers element by element.
///
/// The shapes must be identical, storage order included; anything else is a
/// harness defect and never a silent pass.
pub fn compare(
    reference: &HostBuffer,
    actual: &HostBuffer,
    tolerance: ToleranceSpec,
) -> Result<ComparisonResult> {
    if reference.shape() != actual.shape() {
        return Err(Error::shape_mismatch(
            "compare",
            reference.shape(),
            actual.shape(),
        ));
    }

    let mut max_err = 0.0f64;
    let mut worst = None;
    for (i, (&r, &a)) in reference
        .as_slice()
        .iter()
        .zip(actual.as_slice())
        .enumerate()
    {
        let err = relative_error(r, a);
        if err > max_err {
            max_err = err;
            worst = Some(i);
        }
    }

    Ok(ComparisonResult {
        max_relative_error: max_err,
        passed: tolerance.accepts(max_err),
        worst_index: worst,
        elements: reference.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{Layout, Shape};

    fn tol() -> ToleranceSpec {
        ToleranceSpec::new(1e-4).unwrap()
    }

    #[test]
    fn test_equal_scalars_have_zero_error() {
        for v in [0.0, -0.0, 1.0, -3.5, 1e-300, 1e300, f64::INFINITY] {
            assert_eq!(relative_error(v, v), 0.0);
        }
        let res = compare(&HostBuffer::scalar(0.0), &HostBuffer::scalar(0.0), tol()).unwrap();
        assert_eq!(res.max_relative_error, 0.0);
        assert!(res.passed);
        assert_eq!(res.worst_index, None);
    }

    #[test]
    fn test_relative_error_is_symmetric() {
        assert_eq!(relative_error(1.0, 2.0), 0.5);
        assert_eq!(relative_error(2.0, 1.0), 0.5);
        assert_eq!(relative_error(-1.0, 1.0), 2.0);
    }

    #[test]
    fn test_no_absolute_floor_near_zero() {
        assert_eq!(relative_error(1e-20, 0.0), 1.0);
    }

    #[test]
    fn test_nan_never_passes() {
        assert_eq!(relative_error(f64::NAN, 1.0), f64::INFINITY);
        assert_eq!(relative_error(f64::NAN, f64::NAN), f64::INFINITY);
        let res = compare(
            &HostBuffer::vector(vec![1.0, 2.0]),
            &HostBuffer::vector(vec![1.0, f64::NAN]),
            tol(),
        )
        .unwrap();
        assert!(!res.passed);
        assert_eq!(res.worst_index, Some(1));
    }

    #[test]
    fn test_single_bad_element_is_not_averaged_away() {
        let n = 10_000;
        let reference = HostBuffer::vector(vec![1.0; n]);
        let mut values = vec![1.0; n];
        values[4321] = 1.5;
        let actual = HostBuffer::vector(values);
        let res = compare(&reference, &actual, tol()).unwrap();
        assert!(!res.passed);
        assert!((res.max_relative_error - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(res.worst_index, Some(4321));
        assert_eq!(res.elements, n);
    }

    #[test]
    fn test_within_tolerance_passes() {
        let reference = HostBuffer::vector(vec![1.0, 2.0, 3.0]);
        let actual = HostBuffer::vector(vec![1.0 + 1e-6, 2.0, 3.0 - 3e-6]);
        let res = compare(&reference, &actual, tol()).unwrap();
        assert!(res.passed);
        assert!(res.max_relative_error > 0.0);
    }

    #[test]
    fn test_shape_mismatch_is_an_error() {
        let a = HostBuffer::vector(vec![1.0, 2.0]);
        let b = HostBuffer::vector(vec![1.0, 2.0, 3.0]);
        assert!(matches!(compare(&a, &b, tol()), Err(Error::ShapeMismatch { .. })));

        let row = HostBuffer::zeros(Shape::matrix(2, 2, Layout::RowMajor));
        let col = HostBuffer::zeros(Shape::matrix(2, 2, Layout::ColumnMajor));
        assert!(compare(&row, &col, tol()).is_err());
    }
}
