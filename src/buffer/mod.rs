//! Host-side containers
//!
//! A [`HostBuffer`] owns a dense run of elements described by a [`Shape`].
//! Matrices carry their storage [`Layout`]; all element access used by the
//! oracle goes through logical `(row, col)` indices so results never depend
//! on how a matrix happens to be stored.

pub mod workspace;

pub use workspace::Workspace;

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::numeric::NumericProfile;

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Storage order of a matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Layout {
    #[default]
    RowMajor,
    ColumnMajor,
}

impl Layout {
    /// Flat offset of `(row, col)` in a `rows × cols` matrix.
    #[inline]
    pub fn offset(self, row: usize, col: usize, rows: usize, cols: usize) -> usize {
        match self {
            Layout::RowMajor => row * cols + col,
            Layout::ColumnMajor => col * rows + row,
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layout::RowMajor => write!(f, "row-major"),
            Layout::ColumnMajor => write!(f, "column-major"),
        }
    }
}

impl FromStr for Layout {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "row" | "row-major" | "row_major" => Ok(Layout::RowMajor),
            "col" | "column" | "column-major" | "column_major" => Ok(Layout::ColumnMajor),
            other => Err(Error::config(format!("unknown matrix layout '{}'", other))),
        }
    }
}

// ---------------------------------------------------------------------------
// Shape
// ---------------------------------------------------------------------------

/// Dimensions of a buffer. Immutable once a buffer exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shape {
    Scalar,
    Vector(usize),
    Matrix {
        rows: usize,
        cols: usize,
        layout: Layout,
    },
}

impl Shape {
    /// Matrix shape with the given storage order.
    pub fn matrix(rows: usize, cols: usize, layout: Layout) -> Self {
        Shape::Matrix { rows, cols, layout }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match *self {
            Shape::Scalar => 1,
            Shape::Vector(n) => n,
            Shape::Matrix { rows, cols, .. } => rows * cols,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Shape::Scalar)
    }

    /// Logical `(rows, cols)`. Vectors are columns; a scalar is `1 × 1`.
    pub fn dims(&self) -> (usize, usize) {
        match *self {
            Shape::Scalar => (1, 1),
            Shape::Vector(n) => (n, 1),
            Shape::Matrix { rows, cols, .. } => (rows, cols),
        }
    }

    /// Storage layout; vectors and scalars are trivially row-major.
    pub fn layout(&self) -> Layout {
        match *self {
            Shape::Matrix { layout, .. } => layout,
            _ => Layout::RowMajor,
        }
    }

    /// Same kind and dimensions, ignoring matrix storage order.
    pub fn same_dims(&self, other: &Shape) -> bool {
        match (self, other) {
            (Shape::Scalar, Shape::Scalar) => true,
            (Shape::Vector(a), Shape::Vector(b)) => a == b,
            (Shape::Matrix { .. }, Shape::Matrix { .. }) => self.dims() == other.dims(),
            _ => false,
        }
    }

    /// Flat offset of logical `(row, col)`.
    #[inline]
    pub fn offset(&self, row: usize, col: usize) -> usize {
        match *self {
            Shape::Scalar => 0,
            Shape::Vector(_) => row,
            Shape::Matrix { rows, cols, layout } => layout.offset(row, col, rows, cols),
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Scalar => write!(f, "scalar"),
            Shape::Vector(n) => write!(f, "vector[{}]", n),
            Shape::Matrix { rows, cols, layout } => {
                write!(f, "matrix[{}x{}, {}]", rows, cols, layout)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// HostBuffer
// ---------------------------------------------------------------------------

/// Dense host-resident container of elements.
#[derive(Debug, Clone, PartialEq)]
pub struct HostBuffer {
    shape: Shape,
    data: Vec<f64>,
}

impl HostBuffer {
    /// Wrap existing storage; `data` must hold exactly `shape.len()` elements.
    pub fn from_vec(shape: Shape, data: Vec<f64>) -> Result<Self> {
        if data.len() != shape.len() {
            return Err(Error::invalid_expression(format!(
                "{} needs {} elements, got {}",
                shape,
                shape.len(),
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// Zero-filled buffer.
    pub fn zeros(shape: Shape) -> Self {
        Self {
            shape,
            data: vec![0.0; shape.len()],
        }
    }

    pub fn scalar(value: f64) -> Self {
        Self {
            shape: Shape::Scalar,
            data: vec![value],
        }
    }

    pub fn vector(values: Vec<f64>) -> Self {
        Self {
            shape: Shape::Vector(values.len()),
            data: values,
        }
    }

    /// Build a matrix from a function of logical `(row, col)`.
    pub fn matrix_from_fn(
        rows: usize,
        cols: usize,
        layout: Layout,
        mut f: impl FnMut(usize, usize) -> f64,
    ) -> Self {
        let shape = Shape::matrix(rows, cols, layout);
        let mut data = vec![0.0; rows * cols];
        for i in 0..rows {
            for j in 0..cols {
                data[layout.offset(i, j, rows, cols)] = f(i, j);
            }
        }
        Self { shape, data }
    }

    /// Uniform values in `[0, 1)`, rounded to `profile`.
    pub fn random(shape: Shape, profile: NumericProfile, rng: &mut impl Rng) -> Self {
        let data = (0..shape.len())
            .map(|_| profile.quantize(rng.gen::<f64>()))
            .collect();
        Self { shape, data }
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Elements in storage order.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Element at logical `(row, col)`; vectors use `col == 0`.
    #[inline]
    pub fn at(&self, row: usize, col: usize) -> f64 {
        self.data[self.shape.offset(row, col)]
    }

    #[inline]
    pub fn set_at(&mut self, row: usize, col: usize, value: f64) {
        let offset = self.shape.offset(row, col);
        self.data[offset] = value;
    }

    /// The single value of a scalar buffer.
    pub fn scalar_value(&self) -> Result<f64> {
        match self.shape {
            Shape::Scalar => Ok(self.data[0]),
            other => Err(Error::shape_mismatch("scalar read", Shape::Scalar, other)),
        }
    }

    /// Apply `f` to every element.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            shape: self.shape,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Round every element to `profile`.
    pub fn quantized(&self, profile: NumericProfile) -> Self {
        self.map(|v| profile.quantize(v))
    }

    /// Same logical contents stored with `target`'s shape.
    ///
    /// Only the storage order may differ between `self` and `target`.
    pub fn relayout(&self, target: Shape) -> Result<Self> {
        if !self.shape.same_dims(&target) {
            return Err(Error::shape_mismatch("relayout", self.shape, target));
        }
        if self.shape == target {
            return Ok(self.clone());
        }
        let (rows, cols) = target.dims();
        let mut out = HostBuffer::zeros(target);
        for i in 0..rows {
            for j in 0..cols {
                out.set_at(i, j, self.at(i, j));
            }
        }
        Ok(out)
    }
}
