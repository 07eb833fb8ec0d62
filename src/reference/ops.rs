//! Whole-buffer reference operations.
//!
//! Every function here is a plain sequential loop over logical indices. No
//! fusion, no reordering of reductions, no early exit.

use crate::buffer::{HostBuffer, Layout, Shape};
use crate::error::{Error, Result};
use crate::expr::{BinaryOp, ReduceOp, UnaryOp};

/// Elementwise binary operation with scalar broadcast.
pub fn binary(op: BinaryOp, lhs: &HostBuffer, rhs: &HostBuffer) -> Result<HostBuffer> {
    let (ls, rs) = (lhs.shape(), rhs.shape());
    match (ls.is_scalar(), rs.is_scalar()) {
        (true, true) => Ok(HostBuffer::scalar(
            op.apply(lhs.scalar_value()?, rhs.scalar_value()?),
        )),
        (true, false) => {
            let l = lhs.scalar_value()?;
            Ok(rhs.map(|r| op.apply(l, r)))
        }
        (false, true) => {
            let r = rhs.scalar_value()?;
            Ok(lhs.map(|l| op.apply(l, r)))
        }
        (false, false) => {
            if op == BinaryOp::Mul {
                return Err(Error::invalid_expression(format!(
                    "'*' needs a scalar operand, got {} and {}; use element_prod",
                    ls, rs
                )));
            }
            if !ls.same_dims(&rs) {
                return Err(Error::shape_mismatch(op.symbol(), ls, rs));
            }
            let (rows, cols) = ls.dims();
            let mut out = HostBuffer::zeros(ls);
            for i in 0..rows {
                for j in 0..cols {
                    out.set_at(i, j, op.apply(lhs.at(i, j), rhs.at(i, j)));
                }
            }
            Ok(out)
        }
    }
}

pub fn unary(op: UnaryOp, arg: &HostBuffer) -> HostBuffer {
    arg.map(|v| op.apply(v))
}

/// `out[i] = v[clamp(i + k, 0, n - 1)]`
pub fn shift(arg: &HostBuffer, offset: isize) -> Result<HostBuffer> {
    let n = match arg.shape() {
        Shape::Vector(n) => n,
        other => {
            return Err(Error::invalid_expression(format!(
                "shift expects a vector, got {}",
                other
            )))
        }
    };
    let mut out = HostBuffer::zeros(Shape::Vector(n));
    if n == 0 {
        return Ok(out);
    }
    let last = (n - 1) as isize;
    for i in 0..n {
        let src = (i as isize).saturating_add(offset).clamp(0, last) as usize;
        out.set_at(i, 0, arg.at(src, 0));
    }
    Ok(out)
}

/// Tile `pattern` `reps_rows × reps_cols` times.
///
/// `out(i, j) = pattern(i mod r, j mod c)`. A vector pattern is an `r × 1`
/// column. The result keeps the pattern's storage order.
pub fn repmat(pattern: &HostBuffer, reps_rows: usize, reps_cols: usize) -> Result<HostBuffer> {
    let layout = match pattern.shape() {
        Shape::Matrix { layout, .. } => layout,
        Shape::Vector(_) => Layout::RowMajor,
        Shape::Scalar => {
            return Err(Error::invalid_expression(
                "repmat expects a matrix or vector pattern, got scalar",
            ))
        }
    };
    let (r, c) = pattern.shape().dims();
    let (rows, cols) = (r * reps_rows, c * reps_cols);
    Ok(HostBuffer::matrix_from_fn(rows, cols, layout, |i, j| {
        pattern.at(i % r, j % c)
    }))
}

pub fn trans(arg: &HostBuffer) -> Result<HostBuffer> {
    match arg.shape() {
        Shape::Matrix { rows, cols, layout } => {
            Ok(HostBuffer::matrix_from_fn(cols, rows, layout, |i, j| arg.at(j, i)))
        }
        other => Err(Error::invalid_expression(format!(
            "trans expects a matrix, got {}",
            other
        ))),
    }
}

/// Main diagonal, `min(rows, cols)` long.
pub fn diag(arg: &HostBuffer) -> Result<HostBuffer> {
    match arg.shape() {
        Shape::Matrix { rows, cols, .. } => {
            Ok(HostBuffer::vector((0..rows.min(cols)).map(|i| arg.at(i, i)).collect()))
        }
        other => Err(Error::invalid_expression(format!(
            "diag expects a matrix, got {}",
            other
        ))),
    }
}

/// Fold every element with `op`, left to right, without early exit.
pub fn reduce(op: ReduceOp, arg: &HostBuffer) -> Result<HostBuffer> {
    if arg.is_empty() && op != ReduceOp::Sum {
        return Err(Error::invalid_expression(format!(
            "{} reduction over an empty operand",
            op.name()
        )));
    }
    let mut acc = op.identity();
    for &v in arg.as_slice() {
        acc = op.combine(acc, v);
    }
    Ok(HostBuffer::scalar(acc))
}

/// Elementwise product followed by a separate sum reduction.
pub fn inner_prod(lhs: &HostBuffer, rhs: &HostBuffer) -> Result<HostBuffer> {
    match (lhs.shape(), rhs.shape()) {
        (Shape::Vector(a), Shape::Vector(b)) if a == b => {}
        (l, r) => return Err(Error::shape_mismatch("inner_prod", l, r)),
    }
    let products = binary(BinaryOp::ElementProd, lhs, rhs)?;
    reduce(ReduceOp::Sum, &products)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ramp(n: usize) -> HostBuffer {
        HostBuffer::vector((0..n).map(|i| i as f64).collect())
    }

    #[test]
    fn test_shift_clamps_at_both_ends() {
        let v = ramp(8);
        let left = shift(&v, -5).unwrap();
        assert_eq!(left.as_slice(), &[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 2.0]);
        let right = shift(&v, 3).unwrap();
        assert_eq!(right.as_slice(), &[3.0, 4.0, 5.0, 6.0, 7.0, 7.0, 7.0, 7.0]);
    }

    #[test]
    fn test_shift_boundary_property() {
        let n = 16;
        let v = HostBuffer::vector((0..n).map(|i| (i * i) as f64 + 0.5).collect());
        for k in -(n as isize - 1)..(n as isize) {
            let s = shift(&v, k).unwrap();
            let clamp = |i: isize| i.clamp(0, n as isize - 1) as usize;
            assert_eq!(s.at(0, 0), v.at(clamp(k), 0));
            assert_eq!(s.at(n - 1, 0), v.at(clamp(n as isize - 1 + k), 0));
        }
    }

    #[test]
    fn test_shift_saturates_extreme_offsets() {
        let v = ramp(4);
        assert_eq!(shift(&v, isize::MAX).unwrap().as_slice(), &[3.0; 4]);
        assert_eq!(shift(&v, isize::MIN).unwrap().as_slice(), &[0.0; 4]);
        assert_eq!(shift(&v, 100).unwrap().as_slice(), &[3.0; 4]);
    }

    #[test]
    fn test_shift_rejects_matrix() {
        let m = HostBuffer::matrix_from_fn(2, 2, Layout::RowMajor, |_, _| 0.0);
        assert!(shift(&m, 1).is_err());
    }

    #[test]
    fn test_repmat_modular_tiling() {
        for layout in [Layout::RowMajor, Layout::ColumnMajor] {
            let p = HostBuffer::matrix_from_fn(3, 2, layout, |i, j| (10 * i + j) as f64);
            let out = repmat(&p, 4, 5).unwrap();
            assert_eq!(out.shape(), Shape::matrix(12, 10, layout));
            for i in 0..12 {
                for j in 0..10 {
                    assert_eq!(out.at(i, j), p.at(i % 3, j % 2));
                }
            }
        }
    }

    #[test]
    fn test_repmat_vector_as_column() {
        let x = ramp(3);
        let out = repmat(&x, 1, 4).unwrap();
        assert_eq!(out.shape().dims(), (3, 4));
        assert_eq!(out.at(2, 3), 2.0);
        assert!(repmat(&HostBuffer::scalar(1.0), 2, 2).is_err());
    }

    #[test]
    fn test_reduce_max_full_scan() {
        let v = HostBuffer::vector(vec![0.3, 0.9, -1.0, 0.9, 0.1]);
        assert_eq!(reduce(ReduceOp::Max, &v).unwrap().scalar_value().unwrap(), 0.9);
        assert_eq!(reduce(ReduceOp::Min, &v).unwrap().scalar_value().unwrap(), -1.0);
        let sum = reduce(ReduceOp::Sum, &v).unwrap().scalar_value().unwrap();
        assert!((sum - 1.2).abs() < 1e-12);
    }

    #[test]
    fn test_reduce_empty() {
        let empty = HostBuffer::vector(vec![]);
        assert!(reduce(ReduceOp::Max, &empty).is_err());
        assert_eq!(reduce(ReduceOp::Sum, &empty).unwrap().scalar_value().unwrap(), 0.0);
    }

    #[test]
    fn test_inner_prod_matches_loop() {
        let x = HostBuffer::vector(vec![1.0, 2.0, 3.0]);
        let y = HostBuffer::vector(vec![4.0, -5.0, 6.0]);
        let s = inner_prod(&x, &y).unwrap().scalar_value().unwrap();
        assert_eq!(s, 4.0 - 10.0 + 18.0);
        let z = ramp(4);
        assert!(matches!(inner_prod(&x, &z), Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_binary_shape_mismatch() {
        let err = binary(BinaryOp::Add, &ramp(3), &ramp(4)).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_binary_mixed_layouts_use_logical_indices() {
        let a = HostBuffer::matrix_from_fn(2, 3, Layout::RowMajor, |i, j| (i + j) as f64);
        let b = HostBuffer::matrix_from_fn(2, 3, Layout::ColumnMajor, |i, j| (i * j) as f64);
        let c = binary(BinaryOp::Add, &a, &b).unwrap();
        assert_eq!(c.at(1, 2), 3.0 + 2.0);
    }

    #[test]
    fn test_mul_requires_scalar_side() {
        assert!(binary(BinaryOp::Mul, &ramp(3), &ramp(3)).is_err());
        let scaled = binary(BinaryOp::Mul, &HostBuffer::scalar(2.0), &ramp(3)).unwrap();
        assert_eq!(scaled.as_slice(), &[0.0, 2.0, 4.0]);
    }

    #[test]
    fn test_trans_and_diag() {
        let a = HostBuffer::matrix_from_fn(2, 3, Layout::ColumnMajor, |i, j| (10 * i + j) as f64);
        let t = trans(&a).unwrap();
        assert_eq!(t.shape().dims(), (3, 2));
        assert_eq!(t.at(2, 1), a.at(1, 2));
        let d = diag(&a).unwrap();
        assert_eq!(d.as_slice(), &[0.0, 11.0]);
    }
}
